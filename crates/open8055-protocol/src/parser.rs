//! Line parser for the client command protocol.
//!
//! A command line is a command name followed by whitespace-separated
//! arguments. Integers may be written in decimal or with a `0x` prefix;
//! flags are `0` or `1`. Port numbers are 0-based.
//!
//! Errors fall into two groups:
//! - the line does not follow the grammar: [`Error::UnknownCommand`] for an
//!   unknown name, [`Error::SyntaxError`] carrying the usage template for a
//!   wrong argument count or an argument that is not an integer;
//! - the line is well-formed but a value is out of range:
//!   [`Error::InvalidPort`] or [`Error::InvalidArgument`].
//!
//! # Examples
//!
//! ```
//! use open8055_protocol::{Command, CommandParser};
//! use open8055_core::{InputMask, WaitTimeout};
//!
//! let cmd = CommandParser::parse("WaitFor 0x1f -1").unwrap();
//! assert_eq!(
//!     cmd,
//!     Command::WaitFor(InputMask::new(0x1f).unwrap(), WaitTimeout::Infinite)
//! );
//!
//! let err = CommandParser::parse("SetOutputPWM 1").unwrap_err();
//! assert_eq!(err.to_string(), "usage: SetOutputPWM <channel> <dutyCycle>");
//! ```

use crate::commands::{Command, CommandTag};
use open8055_core::{
    AdcPort, CardAddress, Debounce, Error, InputMask, InputPort, OutputPort, PwmPort, Result,
    WaitTimeout,
    constants::{MAX_USERNAME, PWM_MAX},
};

/// Stateless parser turning a command line into a [`Command`].
pub struct CommandParser;

impl CommandParser {
    /// Parse one command line (without its newline).
    ///
    /// # Errors
    ///
    /// See the module documentation for the error classes.
    pub fn parse(line: &str) -> Result<Command> {
        let line = line.trim();
        let mut words = line.split_ascii_whitespace();

        let Some(name) = words.next() else {
            return Err(Error::UnknownCommand(String::new()));
        };
        let Some(tag) = CommandTag::lookup(name) else {
            return Err(Error::UnknownCommand(line.to_string()));
        };

        let args: Vec<&str> = words.collect();
        if args.len() != tag.arity() {
            return Err(syntax(tag));
        }

        let int = |i: usize| parse_int(args[i]).ok_or_else(|| syntax(tag));

        let command = match tag {
            CommandTag::LastError => Command::LastError,
            CommandTag::CardPresent => Command::CardPresent(CardAddress::new(int(0)?)?),
            CommandTag::Close => Command::Close,
            CommandTag::Reset => Command::Reset,
            CommandTag::Login => {
                if args[0].len() > MAX_USERNAME {
                    return Err(Error::invalid_argument(format!(
                        "username longer than {MAX_USERNAME} bytes"
                    )));
                }
                Command::Login {
                    username: args[0].to_string(),
                    password: args[1].to_string(),
                }
            }
            CommandTag::SaveConfig => Command::SaveConfig,
            CommandTag::SaveAll => Command::SaveAll,

            CommandTag::Wait => Command::Wait(WaitTimeout::from_millis(int(0)?)?),
            CommandTag::WaitFor => Command::WaitFor(
                InputMask::new(int(0)?)?,
                WaitTimeout::from_millis(int(1)?)?,
            ),
            CommandTag::GetAutoFlush => Command::GetAutoFlush,
            CommandTag::SetAutoFlush => Command::SetAutoFlush(parse_flag(int(0)?)?),
            CommandTag::Flush => Command::Flush,

            CommandTag::GetInputDigital => Command::GetInputDigital(InputPort::new(int(0)?)?),
            CommandTag::GetInputDigitalAll => Command::GetInputDigitalAll,
            CommandTag::GetInputCounter => Command::GetInputCounter(InputPort::new(int(0)?)?),
            CommandTag::ResetInputCounter => {
                Command::ResetInputCounter(InputPort::new(int(0)?)?)
            }
            CommandTag::ResetInputCounterAll => Command::ResetInputCounterAll,
            CommandTag::GetInputDebounce => Command::GetInputDebounce(InputPort::new(int(0)?)?),
            CommandTag::SetInputDebounce => Command::SetInputDebounce(
                InputPort::new(int(0)?)?,
                Debounce::from_millis(int(1)?)?,
            ),
            CommandTag::GetInputAdc => Command::GetInputAdc(AdcPort::new(int(0)?)?),

            CommandTag::GetOutputDigital => Command::GetOutputDigital(OutputPort::new(int(0)?)?),
            CommandTag::GetOutputDigitalAll => Command::GetOutputDigitalAll,
            CommandTag::GetOutputValue => Command::GetOutputValue(OutputPort::new(int(0)?)?),
            CommandTag::GetOutputPwm => Command::GetOutputPwm(PwmPort::new(int(0)?)?),
            CommandTag::SetOutputDigital => Command::SetOutputDigital(
                OutputPort::new(int(0)?)?,
                parse_flag(int(1)?)?,
            ),
            CommandTag::SetOutputDigitalAll => {
                let bits = bounded(int(0)?, u8::MAX.into(), "output bits")?;
                Command::SetOutputDigitalAll(bits as u8)
            }
            CommandTag::SetOutputValue => Command::SetOutputValue(
                OutputPort::new(int(0)?)?,
                bounded(int(1)?, u16::MAX.into(), "output value")? as u16,
            ),
            CommandTag::SetOutputPwm => Command::SetOutputPwm(
                PwmPort::new(int(0)?)?,
                bounded(int(1)?, PWM_MAX.into(), "duty cycle")? as u16,
            ),
        };

        Ok(command)
    }
}

fn syntax(tag: CommandTag) -> Error {
    Error::SyntaxError { usage: tag.usage() }
}

/// Parse a decimal or `0x`-prefixed hexadecimal integer, optionally signed.
fn parse_int(word: &str) -> Option<i64> {
    let (negative, digits) = match word.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, word.strip_prefix('+').unwrap_or(word)),
    };
    if digits.starts_with(['+', '-']) {
        return None;
    }

    let value = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i64>().ok()?,
    };

    Some(if negative { -value } else { value })
}

fn parse_flag(value: i64) -> Result<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(Error::invalid_argument(format!(
            "flag must be 0 or 1, got {other}"
        ))),
    }
}

fn bounded(value: i64, max: i64, what: &str) -> Result<i64> {
    if !(0..=max).contains(&value) {
        return Err(Error::invalid_argument(format!(
            "{what} must be 0-{max}, got {value}"
        )));
    }
    Ok(value)
}
