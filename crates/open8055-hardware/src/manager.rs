//! Card owner task.
//!
//! The owner is the only code that touches the transport. It serializes
//! client requests, ingests reports from the card, runs the debounce timer
//! and publishes state snapshots and input changes.
//!
//! ```text
//!  CardHandle ──request──►┌──────────────┐──send_report──► transport
//!  CardHandle ──request──►│  card owner  │◄─recv_report─── transport
//!                         │  (one task)  │
//!  snapshot   ◄──watch────│  CardState   │
//!  WaitHub    ◄─broadcast─└──────────────┘
//! ```
//!
//! # Examples
//!
//! ```
//! use open8055_hardware::manager::{CardConfig, CardManager};
//! use open8055_hardware::mock::MockCard;
//! use open8055_core::OutputPort;
//!
//! #[tokio::main]
//! async fn main() -> open8055_core::Result<()> {
//!     let (card, mock) = MockCard::new();
//!     let runtime = CardManager::new(card.into(), CardConfig::default()).start();
//!     let handle = runtime.handle();
//!
//!     handle.wait_connected().await?;
//!     handle.set_output_digital(OutputPort::new(0)?, true).await?;
//!     assert_eq!(mock.outputs().output_bits, 0b1);
//!
//!     runtime.shutdown().await;
//!     Ok(())
//! }
//! ```

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use open8055_core::{
    Error, InputMask, OutputPort, PortMode, PwmPort, Result,
    constants::{NUM_ADC, NUM_INPUTS, WAIT_ADC_SHIFT, WAIT_COUNT_SHIFT},
};
use open8055_protocol::{InputReport, Report};

use crate::card::{CardHandle, CardOp, CardRequest};
use crate::debounce::Debouncer;
use crate::devices::AnyCardTransport;
use crate::notify::{InputChange, WaitHub};
use crate::state::{CardState, Outputs};
use crate::traits::CardTransport;
use crate::HardwareError;

/// Settings of the card owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardConfig {
    /// Depth of the request queue shared by all sessions.
    pub request_queue: usize,

    /// Input changes buffered per waiter before it counts as lagged.
    pub notify_capacity: usize,

    /// Ask the card for its configuration, outputs and inputs at startup.
    pub startup_readback: bool,

    /// Initial auto-flush mode.
    pub auto_flush: bool,
}

impl Default for CardConfig {
    fn default() -> Self {
        Self {
            request_queue: 64,
            notify_capacity: 256,
            startup_readback: true,
            auto_flush: true,
        }
    }
}

/// Builds and starts the card owner.
pub struct CardManager {
    transport: AnyCardTransport,
    config: CardConfig,
}

impl CardManager {
    pub fn new(transport: AnyCardTransport, config: CardConfig) -> Self {
        Self { transport, config }
    }

    /// Spawn the owner task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(self) -> CardRuntime {
        let (request_tx, request_rx) = mpsc::channel(self.config.request_queue);
        let state = CardState {
            auto_flush: self.config.auto_flush,
            ..CardState::default()
        };
        let (state_tx, state_rx) = watch::channel(state.clone());
        let hub = WaitHub::new(self.config.notify_capacity);
        let shutdown = CancellationToken::new();

        let owner = CardOwner {
            transport: self.transport,
            requests: request_rx,
            state,
            state_tx,
            hub: hub.clone(),
            debouncer: Debouncer::default(),
            link_up: true,
            shutdown: shutdown.clone(),
        };
        let task = tokio::spawn(owner.run(self.config.startup_readback));

        CardRuntime {
            handle: CardHandle::new(request_tx, state_rx, hub),
            task,
            shutdown,
        }
    }
}

/// Running card owner.
pub struct CardRuntime {
    handle: CardHandle,
    task: JoinHandle<()>,
    shutdown: CancellationToken,
}

impl CardRuntime {
    /// A new handle for a session.
    #[must_use]
    pub fn handle(&self) -> CardHandle {
        self.handle.clone()
    }

    /// Stop the owner task and wait for it to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        match self.task.await {
            Ok(()) => debug!("card owner stopped"),
            Err(e) if e.is_cancelled() => debug!("card owner cancelled"),
            Err(e) => error!(error = %e, "card owner panicked"),
        }
    }
}

struct CardOwner {
    transport: AnyCardTransport,
    requests: mpsc::Receiver<CardRequest>,
    state: CardState,
    state_tx: watch::Sender<CardState>,
    hub: WaitHub,
    debouncer: Debouncer,
    /// Whether the receive side of the transport is still alive.
    link_up: bool,
    shutdown: CancellationToken,
}

impl CardOwner {
    async fn run(mut self, startup_readback: bool) {
        match self.transport.get_info().await {
            Ok(info) => info!(card = %info.name, kind = self.transport.kind(), "card owner started"),
            Err(e) => warn!(error = %e, "could not identify card"),
        }

        if startup_readback && let Err(e) = self.transport.send_report(&Report::GetConfig).await {
            warn!(error = %e, "startup readback failed");
        }

        loop {
            let deadline = self.debouncer.next_deadline(&self.state.debounce_all());

            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break,

                request = self.requests.recv() => match request {
                    Some(request) => self.handle_request(request).await,
                    None => break,
                },

                report = self.transport.recv_report(), if self.link_up => {
                    self.handle_report(report);
                }

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.on_debounce_timer();
                }
            }
        }

        info!("card owner exiting");
    }

    async fn handle_request(&mut self, request: CardRequest) {
        match request {
            CardRequest::Apply { op, reply } => {
                let result = self.apply(op).await;
                if let Err(e) = &result {
                    debug!(?op, error = %e, "card operation failed");
                }
                let _ = reply.send(result);
            }
            CardRequest::Probe { address, reply } => {
                let result = self
                    .transport
                    .card_present(address)
                    .await
                    .map_err(Error::from);
                let _ = reply.send(result);
            }
        }
    }

    async fn apply(&mut self, op: CardOp) -> Result<()> {
        match op {
            CardOp::SetOutputDigital(port, on) => {
                self.require_output_mode(port, PortMode::Output)?;
                self.write_outputs(|o| o.set_digital(port, on)).await
            }
            CardOp::SetOutputDigitalAll(bits) => {
                for port in OutputPort::all().filter(|p| bits & p.bit() != 0) {
                    self.require_output_mode(port, PortMode::Output)?;
                }
                self.write_outputs(|o| o.bits = bits).await
            }
            CardOp::SetOutputValue(port, value) => {
                match self.state.output_mode(port) {
                    Some(mode) if mode.is_servo() => {}
                    _ => {
                        return Err(Error::WrongPortMode {
                            port: port.index(),
                            required: "servo",
                        });
                    }
                }
                self.write_outputs(|o| o.values[port.index()] = value).await
            }
            CardOp::SetOutputPwm(port, duty) => {
                self.require_pwm_mode(port)?;
                self.write_outputs(|o| o.pwm[port.index()] = duty).await
            }
            CardOp::SetAutoFlush(enabled) => {
                if enabled {
                    self.flush().await?;
                }
                self.state.auto_flush = enabled;
                self.publish();
                Ok(())
            }
            CardOp::Flush => self.flush().await,
            CardOp::ResetCounters(mask) => {
                self.require_connected()?;
                let report = self.state.committed.to_report(mask);
                self.send(Report::Output(report)).await?;
                for index in 0..NUM_INPUTS {
                    if mask & (1 << index) != 0 {
                        self.state.counters[index] = 0;
                    }
                }
                self.publish();
                Ok(())
            }
            CardOp::SetDebounce(port, debounce) => {
                self.require_connected()?;
                let mut config = self.state.config;
                config.debounce[port.index()] = debounce.to_device_units();
                self.send(Report::SetConfig(config)).await?;
                self.state.config = config;
                self.publish();
                Ok(())
            }
            CardOp::Reset => {
                self.send(Report::Reset).await?;
                info!("card reset requested");
                self.state.connected = false;
                self.publish();
                Ok(())
            }
            CardOp::SaveConfig => {
                self.require_connected()?;
                self.send(Report::SaveConfig).await
            }
            CardOp::SaveAll => {
                self.require_connected()?;
                self.send(Report::SaveAll).await
            }
        }
    }

    /// Apply `change` to the outputs a client currently sees.
    ///
    /// With auto-flush on the whole report goes to the card and is committed
    /// only once sent; otherwise it lands in the pending shadow.
    async fn write_outputs(&mut self, change: impl FnOnce(&mut Outputs)) -> Result<()> {
        let mut outputs = self.state.effective_outputs();
        change(&mut outputs);

        if self.state.auto_flush {
            self.require_connected()?;
            self.send(Report::Output(outputs.to_report(0))).await?;
            self.state.committed = outputs;
        } else {
            self.state.pending = Some(outputs);
        }

        self.publish();
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        let Some(pending) = self.state.pending else {
            return Ok(());
        };

        self.require_connected()?;
        self.send(Report::Output(pending.to_report(0))).await?;
        self.state.committed = pending;
        self.state.pending = None;
        self.publish();
        Ok(())
    }

    async fn send(&mut self, report: Report) -> Result<()> {
        match self.transport.send_report(&report).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(msg_type = report.msg_type(), error = %e, "report not sent");
                if e.is_disconnect() && self.state.connected {
                    self.state.connected = false;
                    self.publish();
                }
                Err(Error::device_unavailable(e.to_string()))
            }
        }
    }

    fn require_connected(&self) -> Result<()> {
        if self.state.connected {
            Ok(())
        } else {
            Err(Error::device_unavailable("card not connected"))
        }
    }

    fn require_output_mode(&self, port: OutputPort, mode: PortMode) -> Result<()> {
        if self.state.output_mode(port) == Some(mode) {
            Ok(())
        } else {
            Err(Error::WrongPortMode {
                port: port.index(),
                required: "digital output",
            })
        }
    }

    fn require_pwm_mode(&self, port: PwmPort) -> Result<()> {
        if self.state.pwm_mode(port) == Some(PortMode::Pwm) {
            Ok(())
        } else {
            Err(Error::WrongPortMode {
                port: port.index(),
                required: "PWM",
            })
        }
    }

    fn handle_report(&mut self, report: std::result::Result<Report, HardwareError>) {
        match report {
            Ok(Report::Input(input)) => self.ingest_input(&input),
            Ok(Report::SetConfig(config)) => {
                debug!(card_address = config.card_address, "card configuration received");
                self.state.config = config;
                self.publish();
            }
            Ok(Report::Output(output)) => {
                debug!(output_bits = output.output_bits, "card outputs received");
                self.state.committed = Outputs::from(&output);
                self.publish();
            }
            Ok(other) => {
                warn!(msg_type = other.msg_type(), "unexpected report from card");
            }
            Err(e) if e.is_disconnect() => {
                error!(error = %e, "card disconnected");
                self.link_up = false;
                self.state.connected = false;
                self.publish();
            }
            Err(e) => {
                warn!(error = %e, "ignoring malformed report");
            }
        }
    }

    fn ingest_input(&mut self, input: &InputReport) {
        let old_bits = self.state.input_bits;
        let digital = if self.state.connected {
            let windows = self.state.debounce_all();
            self.debouncer.sample(input.input_bits, Instant::now(), &windows)
        } else {
            info!("card connected");
            self.state.connected = true;
            self.debouncer.seed(input.input_bits);
            old_bits ^ input.input_bits
        };

        let mut changed = u16::from(digital);
        for index in 0..NUM_INPUTS {
            if self.state.counters[index] != input.counters[index] {
                changed |= 1 << (WAIT_COUNT_SHIFT + index as u32);
            }
        }
        for index in 0..NUM_ADC {
            if self.state.adc[index] != input.adc[index] {
                changed |= 1 << (WAIT_ADC_SHIFT + index as u32);
            }
        }

        self.state.input_bits = self.debouncer.stable();
        self.state.apply_analog(input);
        self.publish();
        self.notify(changed);
    }

    fn on_debounce_timer(&mut self) {
        let windows = self.state.debounce_all();
        let changed = self.debouncer.poll(Instant::now(), &windows);
        if changed != 0 {
            self.state.input_bits = self.debouncer.stable();
            self.publish();
            self.notify(u16::from(changed));
        }
    }

    fn notify(&self, changed: u16) {
        if changed != 0 {
            self.hub.publish(InputChange {
                changed: InputMask::from_bits_truncate(changed),
                input_bits: self.state.input_bits,
            });
        }
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.state.clone());
    }
}
