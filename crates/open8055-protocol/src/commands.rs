//! Client command set of the Open8055 server.
//!
//! Each command is one line of ASCII text: a case-insensitive command name
//! followed by whitespace-separated integer arguments. [`CommandTag`] holds
//! the static table of names, arities and usage strings; [`Command`] is a
//! fully validated command ready for execution.
//!
//! # Examples
//!
//! ```
//! use open8055_protocol::CommandTag;
//!
//! let tag = CommandTag::lookup("waitfor").unwrap();
//! assert_eq!(tag, CommandTag::WaitFor);
//! assert_eq!(tag.arity(), 2);
//! assert_eq!(tag.usage(), "WaitFor <inputMask> <milliseconds>");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use open8055_core::{
    AdcPort, CardAddress, Debounce, InputMask, InputPort, OutputPort, PwmPort, WaitTimeout,
};

/// Identifies one entry of the command table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandTag {
    // Session and card
    LastError,
    CardPresent,
    Close,
    Reset,
    Login,
    SaveConfig,
    SaveAll,

    // Waiting and flushing
    Wait,
    WaitFor,
    GetAutoFlush,
    SetAutoFlush,
    Flush,

    // Inputs
    GetInputDigital,
    GetInputDigitalAll,
    GetInputCounter,
    ResetInputCounter,
    ResetInputCounterAll,
    GetInputDebounce,
    SetInputDebounce,
    GetInputAdc,

    // Outputs
    GetOutputDigital,
    GetOutputDigitalAll,
    GetOutputValue,
    GetOutputPwm,
    SetOutputDigital,
    SetOutputDigitalAll,
    SetOutputValue,
    SetOutputPwm,
}

impl CommandTag {
    /// Every command, in the order usage help lists them.
    pub const ALL: [CommandTag; 28] = [
        CommandTag::LastError,
        CommandTag::CardPresent,
        CommandTag::Close,
        CommandTag::Reset,
        CommandTag::Login,
        CommandTag::SaveConfig,
        CommandTag::SaveAll,
        CommandTag::Wait,
        CommandTag::WaitFor,
        CommandTag::GetAutoFlush,
        CommandTag::SetAutoFlush,
        CommandTag::Flush,
        CommandTag::GetInputDigital,
        CommandTag::GetInputDigitalAll,
        CommandTag::GetInputCounter,
        CommandTag::ResetInputCounter,
        CommandTag::ResetInputCounterAll,
        CommandTag::GetInputDebounce,
        CommandTag::SetInputDebounce,
        CommandTag::GetInputAdc,
        CommandTag::GetOutputDigital,
        CommandTag::GetOutputDigitalAll,
        CommandTag::GetOutputValue,
        CommandTag::GetOutputPwm,
        CommandTag::SetOutputDigital,
        CommandTag::SetOutputDigitalAll,
        CommandTag::SetOutputValue,
        CommandTag::SetOutputPwm,
    ];

    /// Find a command by name, ignoring ASCII case.
    #[must_use]
    pub fn lookup(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|tag| tag.name().eq_ignore_ascii_case(name))
    }

    /// Canonical spelling of the command name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            CommandTag::LastError => "LastError",
            CommandTag::CardPresent => "CardPresent",
            CommandTag::Close => "Close",
            CommandTag::Reset => "Reset",
            CommandTag::Login => "Login",
            CommandTag::SaveConfig => "SaveConfig",
            CommandTag::SaveAll => "SaveAll",
            CommandTag::Wait => "Wait",
            CommandTag::WaitFor => "WaitFor",
            CommandTag::GetAutoFlush => "GetAutoFlush",
            CommandTag::SetAutoFlush => "SetAutoFlush",
            CommandTag::Flush => "Flush",
            CommandTag::GetInputDigital => "GetInputDigital",
            CommandTag::GetInputDigitalAll => "GetInputDigitalAll",
            CommandTag::GetInputCounter => "GetInputCounter",
            CommandTag::ResetInputCounter => "ResetInputCounter",
            CommandTag::ResetInputCounterAll => "ResetInputCounterAll",
            CommandTag::GetInputDebounce => "GetInputDebounce",
            CommandTag::SetInputDebounce => "SetInputDebounce",
            CommandTag::GetInputAdc => "GetInputADC",
            CommandTag::GetOutputDigital => "GetOutputDigital",
            CommandTag::GetOutputDigitalAll => "GetOutputDigitalAll",
            CommandTag::GetOutputValue => "GetOutputValue",
            CommandTag::GetOutputPwm => "GetOutputPWM",
            CommandTag::SetOutputDigital => "SetOutputDigital",
            CommandTag::SetOutputDigitalAll => "SetOutputDigitalAll",
            CommandTag::SetOutputValue => "SetOutputValue",
            CommandTag::SetOutputPwm => "SetOutputPWM",
        }
    }

    /// Usage template reported on a syntax error.
    #[must_use]
    pub fn usage(&self) -> &'static str {
        match self {
            CommandTag::LastError => "LastError",
            CommandTag::CardPresent => "CardPresent <cardNum>",
            CommandTag::Close => "Close",
            CommandTag::Reset => "Reset",
            CommandTag::Login => "Login <username> <password>",
            CommandTag::SaveConfig => "SaveConfig",
            CommandTag::SaveAll => "SaveAll",
            CommandTag::Wait => "Wait <milliseconds>",
            CommandTag::WaitFor => "WaitFor <inputMask> <milliseconds>",
            CommandTag::GetAutoFlush => "GetAutoFlush",
            CommandTag::SetAutoFlush => "SetAutoFlush <flag>",
            CommandTag::Flush => "Flush",
            CommandTag::GetInputDigital => "GetInputDigital <channel>",
            CommandTag::GetInputDigitalAll => "GetInputDigitalAll",
            CommandTag::GetInputCounter => "GetInputCounter <channel>",
            CommandTag::ResetInputCounter => "ResetInputCounter <channel>",
            CommandTag::ResetInputCounterAll => "ResetInputCounterAll",
            CommandTag::GetInputDebounce => "GetInputDebounce <channel>",
            CommandTag::SetInputDebounce => "SetInputDebounce <channel> <milliseconds>",
            CommandTag::GetInputAdc => "GetInputADC <channel>",
            CommandTag::GetOutputDigital => "GetOutputDigital <channel>",
            CommandTag::GetOutputDigitalAll => "GetOutputDigitalAll",
            CommandTag::GetOutputValue => "GetOutputValue <channel>",
            CommandTag::GetOutputPwm => "GetOutputPWM <channel>",
            CommandTag::SetOutputDigital => "SetOutputDigital <channel> <flag>",
            CommandTag::SetOutputDigitalAll => "SetOutputDigitalAll <bits>",
            CommandTag::SetOutputValue => "SetOutputValue <channel> <value>",
            CommandTag::SetOutputPwm => "SetOutputPWM <channel> <dutyCycle>",
        }
    }

    /// Number of arguments the command takes.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.usage().split_ascii_whitespace().count() - 1
    }

    /// Commands whose effect on the card cannot be repeated safely.
    #[inline]
    #[must_use]
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            CommandTag::Reset | CommandTag::ResetInputCounter | CommandTag::ResetInputCounterAll
        )
    }

    /// Commands accepted before a session has logged in.
    #[inline]
    #[must_use]
    pub fn allowed_unauthenticated(&self) -> bool {
        matches!(self, CommandTag::Login | CommandTag::Close | CommandTag::LastError)
    }
}

impl fmt::Display for CommandTag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A parsed command with validated arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    LastError,
    CardPresent(CardAddress),
    Close,
    Reset,
    Login { username: String, password: String },
    SaveConfig,
    SaveAll,

    Wait(WaitTimeout),
    WaitFor(InputMask, WaitTimeout),
    GetAutoFlush,
    SetAutoFlush(bool),
    Flush,

    GetInputDigital(InputPort),
    GetInputDigitalAll,
    GetInputCounter(InputPort),
    ResetInputCounter(InputPort),
    ResetInputCounterAll,
    GetInputDebounce(InputPort),
    SetInputDebounce(InputPort, Debounce),
    GetInputAdc(AdcPort),

    GetOutputDigital(OutputPort),
    GetOutputDigitalAll,
    GetOutputValue(OutputPort),
    GetOutputPwm(PwmPort),
    SetOutputDigital(OutputPort, bool),
    SetOutputDigitalAll(u8),
    SetOutputValue(OutputPort, u16),
    SetOutputPwm(PwmPort, u16),
}

impl Command {
    /// Table entry this command was parsed from.
    #[must_use]
    pub fn tag(&self) -> CommandTag {
        match self {
            Command::LastError => CommandTag::LastError,
            Command::CardPresent(_) => CommandTag::CardPresent,
            Command::Close => CommandTag::Close,
            Command::Reset => CommandTag::Reset,
            Command::Login { .. } => CommandTag::Login,
            Command::SaveConfig => CommandTag::SaveConfig,
            Command::SaveAll => CommandTag::SaveAll,
            Command::Wait(_) => CommandTag::Wait,
            Command::WaitFor(..) => CommandTag::WaitFor,
            Command::GetAutoFlush => CommandTag::GetAutoFlush,
            Command::SetAutoFlush(_) => CommandTag::SetAutoFlush,
            Command::Flush => CommandTag::Flush,
            Command::GetInputDigital(_) => CommandTag::GetInputDigital,
            Command::GetInputDigitalAll => CommandTag::GetInputDigitalAll,
            Command::GetInputCounter(_) => CommandTag::GetInputCounter,
            Command::ResetInputCounter(_) => CommandTag::ResetInputCounter,
            Command::ResetInputCounterAll => CommandTag::ResetInputCounterAll,
            Command::GetInputDebounce(_) => CommandTag::GetInputDebounce,
            Command::SetInputDebounce(..) => CommandTag::SetInputDebounce,
            Command::GetInputAdc(_) => CommandTag::GetInputAdc,
            Command::GetOutputDigital(_) => CommandTag::GetOutputDigital,
            Command::GetOutputDigitalAll => CommandTag::GetOutputDigitalAll,
            Command::GetOutputValue(_) => CommandTag::GetOutputValue,
            Command::GetOutputPwm(_) => CommandTag::GetOutputPwm,
            Command::SetOutputDigital(..) => CommandTag::SetOutputDigital,
            Command::SetOutputDigitalAll(_) => CommandTag::SetOutputDigitalAll,
            Command::SetOutputValue(..) => CommandTag::SetOutputValue,
            Command::SetOutputPwm(..) => CommandTag::SetOutputPwm,
        }
    }
}
