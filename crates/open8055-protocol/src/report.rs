//! Fixed-size HID reports exchanged with the Open8055 card.
//!
//! Every report is exactly [`HID_MESSAGE_SIZE`] bytes. Byte 0 carries the
//! message type and selects the layout of the rest; multi-byte fields are
//! little-endian and packed without padding, matching the firmware's C
//! structs. Unused trailing bytes are zero on encode and ignored on decode.
//!
//! # Examples
//!
//! ```
//! use open8055_protocol::report::{OutputReport, Report};
//!
//! let mut out = OutputReport::default();
//! out.output_bits = 0b0000_0101;
//! out.pwm[1] = 512;
//!
//! let bytes = Report::Output(out).encode();
//! assert_eq!(bytes[0], 0x01);
//! assert_eq!(bytes[1], 0b0000_0101);
//! assert_eq!(&bytes[20..22], &512u16.to_le_bytes());
//!
//! assert_eq!(Report::decode(&bytes).unwrap(), Report::Output(out));
//! ```

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use open8055_core::{
    Error, PortMode, Result,
    constants::{
        HID_MESSAGE_SIZE, MSG_GETCONFIG, MSG_GETINPUT, MSG_INPUT, MSG_OUTPUT, MSG_RESET,
        MSG_SAVEALL, MSG_SAVECONFIG, MSG_SETCONFIG1, NUM_ADC, NUM_INPUTS, NUM_OUTPUTS, NUM_PWM,
    },
};

/// Raw bytes of one HID report.
pub type RawReport = [u8; HID_MESSAGE_SIZE];

/// State of the card's inputs as sent in a `MSG_INPUT` report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InputReport {
    pub input_bits: u8,
    pub counters: [u16; NUM_INPUTS],
    pub adc: [u16; NUM_ADC],
}

/// Output values sent to (or echoed by) the card.
///
/// `reset_counters` carries one bit per input counter to clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutputReport {
    pub output_bits: u8,
    pub values: [u16; NUM_OUTPUTS],
    pub pwm: [u16; NUM_PWM],
    pub reset_counters: u8,
}

/// Port configuration of the card (`MSG_SETCONFIG1`).
///
/// Mode bytes are kept raw so a configuration written by newer firmware
/// survives a read-modify-write cycle untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigReport {
    pub mode_adc: [u8; NUM_ADC],
    pub mode_input: [u8; NUM_INPUTS],
    pub mode_output: [u8; NUM_OUTPUTS],
    pub mode_pwm: [u8; NUM_PWM],
    /// Debounce per input in 0.1 ms units.
    pub debounce: [u16; NUM_INPUTS],
    pub card_address: u8,
}

impl Default for ConfigReport {
    fn default() -> Self {
        Self {
            mode_adc: [PortMode::Adc.code(); NUM_ADC],
            mode_input: [PortMode::Input.code(); NUM_INPUTS],
            mode_output: [PortMode::Output.code(); NUM_OUTPUTS],
            mode_pwm: [PortMode::Pwm.code(); NUM_PWM],
            debounce: [100; NUM_INPUTS],
            card_address: 0,
        }
    }
}

impl ConfigReport {
    #[must_use]
    pub fn output_mode(&self, index: usize) -> Option<PortMode> {
        self.mode_output
            .get(index)
            .and_then(|&code| PortMode::from_code(code))
    }

    #[must_use]
    pub fn pwm_mode(&self, index: usize) -> Option<PortMode> {
        self.mode_pwm
            .get(index)
            .and_then(|&code| PortMode::from_code(code))
    }
}

/// A decoded HID report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Report {
    Output(OutputReport),
    GetInput,
    SetConfig(ConfigReport),
    GetConfig,
    SaveConfig,
    SaveAll,
    Reset,
    Input(InputReport),
}

impl Report {
    /// Message type byte of this report.
    #[must_use]
    pub fn msg_type(&self) -> u8 {
        match self {
            Report::Output(_) => MSG_OUTPUT,
            Report::GetInput => MSG_GETINPUT,
            Report::SetConfig(_) => MSG_SETCONFIG1,
            Report::GetConfig => MSG_GETCONFIG,
            Report::SaveConfig => MSG_SAVECONFIG,
            Report::SaveAll => MSG_SAVEALL,
            Report::Reset => MSG_RESET,
            Report::Input(_) => MSG_INPUT,
        }
    }

    /// Serialize into a zero-padded 32-byte report.
    #[must_use]
    pub fn encode(&self) -> RawReport {
        let mut raw = [0u8; HID_MESSAGE_SIZE];
        let mut buf = &mut raw[..];
        buf.put_u8(self.msg_type());

        match self {
            Report::Output(out) => {
                buf.put_u8(out.output_bits);
                out.values.iter().for_each(|v| buf.put_u16_le(*v));
                out.pwm.iter().for_each(|v| buf.put_u16_le(*v));
                buf.put_u8(out.reset_counters);
            }
            Report::Input(input) => {
                buf.put_u8(input.input_bits);
                input.counters.iter().for_each(|v| buf.put_u16_le(*v));
                input.adc.iter().for_each(|v| buf.put_u16_le(*v));
            }
            Report::SetConfig(cfg) => {
                buf.put_slice(&cfg.mode_adc);
                buf.put_slice(&cfg.mode_input);
                buf.put_slice(&cfg.mode_output);
                buf.put_slice(&cfg.mode_pwm);
                cfg.debounce.iter().for_each(|v| buf.put_u16_le(*v));
                buf.put_u8(cfg.card_address);
            }
            Report::GetInput
            | Report::GetConfig
            | Report::SaveConfig
            | Report::SaveAll
            | Report::Reset => {}
        }

        raw
    }

    /// Parse a report received from the card.
    ///
    /// # Errors
    ///
    /// Returns `Error::DeviceProtocolError` if the buffer is not exactly one
    /// report long or carries an unknown message type.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != HID_MESSAGE_SIZE {
            return Err(Error::DeviceProtocolError(format!(
                "report must be {HID_MESSAGE_SIZE} bytes, got {}",
                bytes.len()
            )));
        }

        let mut buf = bytes;
        let msg_type = buf.get_u8();

        let report = match msg_type {
            MSG_OUTPUT => {
                let output_bits = buf.get_u8();
                let values = std::array::from_fn(|_| buf.get_u16_le());
                let pwm = std::array::from_fn(|_| buf.get_u16_le());
                let reset_counters = buf.get_u8();
                Report::Output(OutputReport {
                    output_bits,
                    values,
                    pwm,
                    reset_counters,
                })
            }
            MSG_INPUT => {
                let input_bits = buf.get_u8();
                let counters = std::array::from_fn(|_| buf.get_u16_le());
                let adc = std::array::from_fn(|_| buf.get_u16_le());
                Report::Input(InputReport {
                    input_bits,
                    counters,
                    adc,
                })
            }
            MSG_SETCONFIG1 => {
                let mut cfg = ConfigReport::default();
                buf.copy_to_slice(&mut cfg.mode_adc);
                buf.copy_to_slice(&mut cfg.mode_input);
                buf.copy_to_slice(&mut cfg.mode_output);
                buf.copy_to_slice(&mut cfg.mode_pwm);
                cfg.debounce = std::array::from_fn(|_| buf.get_u16_le());
                cfg.card_address = buf.get_u8();
                Report::SetConfig(cfg)
            }
            MSG_GETINPUT => Report::GetInput,
            MSG_GETCONFIG => Report::GetConfig,
            MSG_SAVECONFIG => Report::SaveConfig,
            MSG_SAVEALL => Report::SaveAll,
            MSG_RESET => Report::Reset,
            other => {
                return Err(Error::DeviceProtocolError(format!(
                    "unknown message type {other:#04x}"
                )));
            }
        };

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_layout() {
        let mut raw = [0u8; HID_MESSAGE_SIZE];
        raw[0] = MSG_INPUT;
        raw[1] = 0b1_0010;
        raw[2..4].copy_from_slice(&300u16.to_le_bytes());
        raw[10..12].copy_from_slice(&7u16.to_le_bytes());
        raw[12..14].copy_from_slice(&1023u16.to_le_bytes());
        raw[14..16].copy_from_slice(&5u16.to_le_bytes());

        let Report::Input(input) = Report::decode(&raw).unwrap() else {
            panic!("expected input report");
        };
        assert_eq!(input.input_bits, 0b1_0010);
        assert_eq!(input.counters, [300, 0, 0, 0, 7]);
        assert_eq!(input.adc, [1023, 5]);
    }

    #[test]
    fn test_output_layout() {
        let out = OutputReport {
            output_bits: 0xA5,
            values: [1, 2, 3, 4, 5, 6, 7, 0xBEEF],
            pwm: [10, 1023],
            reset_counters: 0b1_0001,
        };
        let raw = Report::Output(out).encode();

        assert_eq!(raw[0], MSG_OUTPUT);
        assert_eq!(raw[1], 0xA5);
        assert_eq!(&raw[16..18], &[0xEF, 0xBE]);
        assert_eq!(&raw[18..20], &10u16.to_le_bytes());
        assert_eq!(&raw[20..22], &1023u16.to_le_bytes());
        assert_eq!(raw[22], 0b1_0001);
        assert!(raw[23..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_config_layout() {
        let mut cfg = ConfigReport::default();
        cfg.mode_output[3] = PortMode::Servo.code();
        cfg.debounce[4] = 50000;
        cfg.card_address = 2;

        let raw = Report::SetConfig(cfg).encode();
        assert_eq!(raw[0], MSG_SETCONFIG1);
        assert_eq!(&raw[1..3], &[10, 10]);
        assert_eq!(raw[3], 20);
        assert_eq!(raw[8 + 3], 31);
        assert_eq!(&raw[16..18], &[40, 40]);
        assert_eq!(&raw[26..28], &50000u16.to_le_bytes());
        assert_eq!(raw[28], 2);

        let decoded = Report::decode(&raw).unwrap();
        assert_eq!(decoded, Report::SetConfig(cfg));
        let Report::SetConfig(cfg) = decoded else {
            unreachable!()
        };
        assert_eq!(cfg.output_mode(3), Some(PortMode::Servo));
        assert_eq!(cfg.pwm_mode(0), Some(PortMode::Pwm));
    }

    #[test]
    fn test_bare_requests() {
        for (report, code) in [
            (Report::GetInput, MSG_GETINPUT),
            (Report::GetConfig, MSG_GETCONFIG),
            (Report::SaveConfig, MSG_SAVECONFIG),
            (Report::SaveAll, MSG_SAVEALL),
            (Report::Reset, MSG_RESET),
        ] {
            let raw = report.encode();
            assert_eq!(raw[0], code);
            assert!(raw[1..].iter().all(|b| *b == 0));
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        let mut raw = [0u8; HID_MESSAGE_SIZE];
        raw[0] = 0x42;
        assert!(matches!(
            Report::decode(&raw),
            Err(Error::DeviceProtocolError(_))
        ));
    }

    #[test]
    fn test_wrong_length_rejected() {
        assert!(Report::decode(&[MSG_INPUT; 8]).is_err());
        assert!(Report::decode(&[0u8; 33]).is_err());
    }
}
