//! Command interpreter.
//!
//! Turns one client line into one card operation and one reply. Parsing
//! validates every argument before anything reaches the card, so a rejected
//! command never changes state.

use std::sync::Arc;

use subtle::ConstantTimeEq;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use open8055_core::{Error, Result, WaitTimeout};
use open8055_hardware::{CardHandle, WaitOutcome};
use open8055_protocol::{Command, CommandParser, Reply};

/// Per-session interpreter state.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    username: Option<String>,
    authenticated: bool,
    last_error: String,
}

impl SessionContext {
    /// User name given with a successful `Login`.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Message of the most recent failed command.
    pub fn last_error(&self) -> &str {
        &self.last_error
    }
}

/// What the session should do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send the reply and read the next command.
    Reply(Reply),
    /// Send the reply and end the session.
    Close(Reply),
    /// The command was interrupted by the session stopping; send nothing.
    Cancelled,
}

/// Shared command interpreter; one clone per session.
#[derive(Debug, Clone)]
pub struct Interpreter {
    card: CardHandle,
    password: Option<Arc<str>>,
}

impl Interpreter {
    /// Create an interpreter; with a password set, sessions must `Login`
    /// before anything but `Close` and `LastError` is accepted.
    pub fn new(card: CardHandle, password: Option<String>) -> Self {
        Self {
            card,
            password: password.map(Arc::from),
        }
    }

    pub fn card(&self) -> &CardHandle {
        &self.card
    }

    /// A fresh context for a new session.
    pub fn new_session(&self) -> SessionContext {
        SessionContext {
            authenticated: self.password.is_none(),
            ..SessionContext::default()
        }
    }

    /// Parse and execute one command line.
    ///
    /// `cancel` interrupts a blocking wait; the result is then
    /// [`Action::Cancelled`].
    pub async fn execute_line(
        &self,
        ctx: &mut SessionContext,
        line: &str,
        cancel: &CancellationToken,
    ) -> Action {
        match CommandParser::parse(line) {
            Ok(command) => self.execute(ctx, command, cancel).await,
            Err(e) => {
                debug!(line, error = %e, "command rejected");
                fail(ctx, &e)
            }
        }
    }

    /// Execute an already parsed command.
    pub async fn execute(
        &self,
        ctx: &mut SessionContext,
        command: Command,
        cancel: &CancellationToken,
    ) -> Action {
        if !ctx.authenticated && !command.tag().allowed_unauthenticated() {
            return fail(ctx, &Error::AuthenticationRequired);
        }

        match command {
            Command::Close => Action::Close(Reply::Ok),
            Command::LastError => Action::Reply(Reply::Text(ctx.last_error.clone())),
            Command::Login { username, password } => match self.login(ctx, username, &password) {
                Ok(()) => Action::Reply(Reply::Ok),
                Err(e) => fail(ctx, &e),
            },
            other => match self.dispatch(other, cancel).await {
                Ok(reply) => Action::Reply(reply),
                Err(Error::Cancelled) => Action::Cancelled,
                Err(e) => fail(ctx, &e),
            },
        }
    }

    fn login(&self, ctx: &mut SessionContext, username: String, password: &str) -> Result<()> {
        if let Some(expected) = &self.password {
            let matches: bool = expected.as_bytes().ct_eq(password.as_bytes()).into();
            if !matches {
                warn!(%username, "login failed");
                ctx.authenticated = false;
                return Err(Error::AuthenticationFailed);
            }
        }

        info!(%username, "login");
        ctx.username = Some(username);
        ctx.authenticated = true;
        Ok(())
    }

    async fn dispatch(&self, command: Command, cancel: &CancellationToken) -> Result<Reply> {
        let card = &self.card;

        let reply = match command {
            Command::CardPresent(address) => Reply::flag(card.card_present(address).await?),
            Command::Reset => {
                card.reset().await?;
                Reply::Ok
            }
            Command::SaveConfig => {
                card.save_config().await?;
                Reply::Ok
            }
            Command::SaveAll => {
                card.save_all().await?;
                Reply::Ok
            }

            Command::Wait(timeout) => wait_reply(timeout, card.wait(timeout, cancel).await?),
            Command::WaitFor(mask, timeout) => {
                wait_reply(timeout, card.wait_for(mask, timeout, cancel).await?)
            }
            Command::GetAutoFlush => Reply::flag(card.auto_flush()),
            Command::SetAutoFlush(enabled) => {
                card.set_auto_flush(enabled).await?;
                Reply::Ok
            }
            Command::Flush => {
                card.flush().await?;
                Reply::Ok
            }

            Command::GetInputDigital(port) => Reply::flag(card.input_digital(port)),
            Command::GetInputDigitalAll => Reply::Value(i64::from(card.input_digital_all())),
            Command::GetInputCounter(port) => Reply::Value(i64::from(card.input_counter(port))),
            Command::ResetInputCounter(port) => {
                card.reset_input_counter(port).await?;
                Reply::Ok
            }
            Command::ResetInputCounterAll => {
                card.reset_input_counter_all().await?;
                Reply::Ok
            }
            Command::GetInputDebounce(port) => {
                Reply::Value(i64::from(card.input_debounce(port).as_millis()))
            }
            Command::SetInputDebounce(port, debounce) => {
                card.set_input_debounce(port, debounce).await?;
                Reply::Ok
            }
            Command::GetInputAdc(port) => Reply::Value(i64::from(card.input_adc(port))),

            Command::GetOutputDigital(port) => Reply::flag(card.output_digital(port)),
            Command::GetOutputDigitalAll => Reply::Value(i64::from(card.output_digital_all())),
            Command::GetOutputValue(port) => Reply::Value(i64::from(card.output_value(port))),
            Command::GetOutputPwm(port) => Reply::Value(i64::from(card.output_pwm(port))),
            Command::SetOutputDigital(port, on) => {
                card.set_output_digital(port, on).await?;
                Reply::Ok
            }
            Command::SetOutputDigitalAll(bits) => {
                card.set_output_digital_all(bits).await?;
                Reply::Ok
            }
            Command::SetOutputValue(port, value) => {
                card.set_output_value(port, value).await?;
                Reply::Ok
            }
            Command::SetOutputPwm(port, duty) => {
                card.set_output_pwm(port, duty).await?;
                Reply::Ok
            }

            // Session-level commands never reach the card
            Command::Close | Command::LastError | Command::Login { .. } => Reply::Ok,
        };

        Ok(reply)
    }
}

/// `Wait`/`WaitFor` reply: the changed events, `0` on timeout. A zero
/// timeout is a poll and answers with the current digital input bits.
fn wait_reply(timeout: WaitTimeout, outcome: WaitOutcome) -> Reply {
    if timeout.is_immediate() {
        Reply::Value(i64::from(outcome.input_bits))
    } else {
        Reply::Value(i64::from(outcome.changed.bits()))
    }
}

fn fail(ctx: &mut SessionContext, err: &Error) -> Action {
    ctx.last_error = err.to_string();
    Action::Reply(Reply::from(err))
}
