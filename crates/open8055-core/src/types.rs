use crate::{
    Result,
    constants::{
        DEBOUNCE_MAX_MS, DEBOUNCE_UNITS_PER_MS, MAX_CARD_ADDRESS, NUM_ADC, NUM_INPUTS,
        NUM_OUTPUTS, NUM_PWM, TIMEOUT_INFINITE, WAIT_ADC_SHIFT, WAIT_ANY, WAIT_COUNT_SHIFT,
    },
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

macro_rules! port_type {
    ($(#[$meta:meta])* $name:ident, $count:expr, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(u8);

        impl $name {
            /// Number of ports of this kind on the card.
            pub const COUNT: usize = $count;

            /// Create a port from a 0-based channel number.
            ///
            /// # Errors
            #[doc = concat!("Returns `Error::InvalidPort` if the channel is not a valid ", $kind, " port.")]
            pub fn new(channel: i64) -> Result<Self> {
                if channel < 0 || channel >= $count as i64 {
                    return Err(Error::InvalidPort {
                        kind: $kind,
                        port: channel,
                    });
                }
                Ok($name(channel as u8))
            }

            /// 0-based index into the card's port arrays.
            #[inline]
            #[must_use]
            pub fn index(self) -> usize {
                self.0 as usize
            }

            /// Iterate every port of this kind in ascending order.
            pub fn all() -> impl Iterator<Item = Self> {
                (0..$count as u8).map($name)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

port_type!(
    /// Digital input channel (0-4).
    InputPort,
    NUM_INPUTS,
    "input"
);

port_type!(
    /// Digital / servo output channel (0-7).
    OutputPort,
    NUM_OUTPUTS,
    "output"
);

port_type!(
    /// Analog input channel (0-1).
    AdcPort,
    NUM_ADC,
    "ADC"
);

port_type!(
    /// PWM output channel (0-1).
    PwmPort,
    NUM_PWM,
    "PWM"
);

impl InputPort {
    /// Bit of this input inside `inputBits` and inside a wait mask.
    #[inline]
    #[must_use]
    pub fn bit(self) -> u8 {
        1 << self.0
    }
}

impl OutputPort {
    /// Bit of this output inside `outputBits`.
    #[inline]
    #[must_use]
    pub fn bit(self) -> u8 {
        1 << self.0
    }
}

/// Card address selected by the board jumpers (0-3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CardAddress(u8);

impl CardAddress {
    /// # Errors
    /// Returns `Error::InvalidArgument` if the address is above 3.
    pub fn new(address: i64) -> Result<Self> {
        if !(0..=i64::from(MAX_CARD_ADDRESS)).contains(&address) {
            return Err(Error::invalid_argument(format!(
                "card number must be 0-{MAX_CARD_ADDRESS}, got {address}"
            )));
        }
        Ok(CardAddress(address as u8))
    }

    #[must_use]
    pub fn as_u8(self) -> u8 {
        self.0
    }
}

impl fmt::Display for CardAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Twelve-bit selection of input events: digital inputs in bits 0-4,
/// counters in bits 5-9, ADC inputs in bits 10-11.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct InputMask(u16);

impl InputMask {
    pub const NONE: InputMask = InputMask(0);
    pub const ANY: InputMask = InputMask(WAIT_ANY);

    /// # Errors
    /// Returns `Error::InvalidArgument` if bits above bit 11 are set.
    pub fn new(bits: i64) -> Result<Self> {
        if !(0..=i64::from(WAIT_ANY)).contains(&bits) {
            return Err(Error::invalid_argument(format!(
                "input mask must be 0-{WAIT_ANY:#x}, got {bits}"
            )));
        }
        Ok(InputMask(bits as u16))
    }

    /// Build a mask from raw bits, dropping anything outside the twelve
    /// defined events.
    #[must_use]
    pub const fn from_bits_truncate(bits: u16) -> Self {
        InputMask(bits & WAIT_ANY)
    }

    #[must_use]
    pub fn digital(port: InputPort) -> Self {
        InputMask(u16::from(port.bit()))
    }

    #[must_use]
    pub fn counter(port: InputPort) -> Self {
        InputMask(1 << (WAIT_COUNT_SHIFT + port.index() as u32))
    }

    #[must_use]
    pub fn adc(port: AdcPort) -> Self {
        InputMask(1 << (WAIT_ADC_SHIFT + port.index() as u32))
    }

    #[inline]
    #[must_use]
    pub fn bits(self) -> u16 {
        self.0
    }

    #[inline]
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    #[must_use]
    pub fn intersects(self, other: InputMask) -> bool {
        self.0 & other.0 != 0
    }

    #[inline]
    #[must_use]
    pub fn union(self, other: InputMask) -> Self {
        InputMask(self.0 | other.0)
    }

    #[inline]
    #[must_use]
    pub fn intersection(self, other: InputMask) -> Self {
        InputMask(self.0 & other.0)
    }
}

impl fmt::Display for InputMask {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How long a `Wait`/`WaitFor` may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaitTimeout {
    Infinite,
    After(Duration),
}

impl WaitTimeout {
    /// Convert the client protocol representation (`-1` = forever).
    ///
    /// # Errors
    /// Returns `Error::InvalidArgument` for negative values other than `-1`.
    pub fn from_millis(ms: i64) -> Result<Self> {
        match ms {
            TIMEOUT_INFINITE => Ok(WaitTimeout::Infinite),
            ms if ms >= 0 => Ok(WaitTimeout::After(Duration::from_millis(ms as u64))),
            ms => Err(Error::invalid_argument(format!(
                "timeout must be -1 or >= 0, got {ms}"
            ))),
        }
    }

    /// `true` for a zero timeout, which polls without blocking.
    #[must_use]
    pub fn is_immediate(self) -> bool {
        matches!(self, WaitTimeout::After(d) if d.is_zero())
    }
}

/// Debounce time of a digital input, in milliseconds (0 disables filtering).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Debounce(u32);

impl Debounce {
    /// # Errors
    /// Returns `Error::InvalidArgument` outside 0-5000 ms.
    pub fn from_millis(ms: i64) -> Result<Self> {
        if !(0..=i64::from(DEBOUNCE_MAX_MS)).contains(&ms) {
            return Err(Error::invalid_argument(format!(
                "debounce must be 0-{DEBOUNCE_MAX_MS} ms, got {ms}"
            )));
        }
        Ok(Debounce(ms as u32))
    }

    /// Interpret the value stored in a SETCONFIG1 report (0.1 ms units).
    #[must_use]
    pub fn from_device_units(units: u16) -> Self {
        Debounce((u32::from(units) / DEBOUNCE_UNITS_PER_MS).min(DEBOUNCE_MAX_MS))
    }

    #[must_use]
    pub fn to_device_units(self) -> u16 {
        // 5000 ms * 10 still fits in a u16
        (self.0 * DEBOUNCE_UNITS_PER_MS) as u16
    }

    #[must_use]
    pub fn as_millis(self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn as_duration(self) -> Duration {
        Duration::from_millis(u64::from(self.0))
    }
}

/// Port function codes understood by the card firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PortMode {
    Adc = 10,
    Input = 20,
    Frequency = 21,
    Eusart = 22,
    Output = 30,
    Servo = 31,
    InvertedServo = 32,
    I2c = 33,
    Pwm = 40,
}

impl PortMode {
    #[inline]
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            10 => PortMode::Adc,
            20 => PortMode::Input,
            21 => PortMode::Frequency,
            22 => PortMode::Eusart,
            30 => PortMode::Output,
            31 => PortMode::Servo,
            32 => PortMode::InvertedServo,
            33 => PortMode::I2c,
            40 => PortMode::Pwm,
            _ => return None,
        })
    }

    #[inline]
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Output modes whose value lives in `outputValue[]`.
    #[must_use]
    pub fn is_servo(self) -> bool {
        matches!(self, PortMode::Servo | PortMode::InvertedServo)
    }
}

impl fmt::Display for PortMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            PortMode::Adc => "ADC",
            PortMode::Input => "input",
            PortMode::Frequency => "frequency",
            PortMode::Eusart => "EUSART",
            PortMode::Output => "digital output",
            PortMode::Servo => "servo",
            PortMode::InvertedServo => "inverted servo",
            PortMode::I2c => "I2C",
            PortMode::Pwm => "PWM",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::*;
    use rstest::rstest;

    #[rstest]
    #[case(0)]
    #[case(4)]
    fn test_input_port_valid(#[case] channel: i64) {
        let port = InputPort::new(channel).unwrap();
        assert_eq!(port.index(), channel as usize);
    }

    #[rstest]
    #[case(-1)]
    #[case(5)]
    #[case(255)]
    fn test_input_port_invalid(#[case] channel: i64) {
        assert!(matches!(
            InputPort::new(channel),
            Err(Error::InvalidPort { kind: "input", .. })
        ));
    }

    #[test]
    fn test_port_counts() {
        assert_eq!(OutputPort::all().count(), 8);
        assert_eq!(AdcPort::all().count(), 2);
        assert_eq!(PwmPort::all().count(), 2);
        assert!(OutputPort::new(7).is_ok());
        assert!(OutputPort::new(8).is_err());
        assert!(PwmPort::new(2).is_err());
    }

    #[test]
    fn test_mask_positions() {
        let i3 = InputPort::new(2).unwrap();
        assert_eq!(InputMask::digital(i3).bits(), WAIT_I3);
        assert_eq!(InputMask::counter(i3).bits(), WAIT_COUNT3);
        assert_eq!(InputMask::adc(AdcPort::new(1).unwrap()).bits(), WAIT_ADC2);
    }

    #[rstest]
    #[case(0, true)]
    #[case(0xFFF, true)]
    #[case(0x1000, false)]
    #[case(-3, false)]
    fn test_mask_range(#[case] bits: i64, #[case] ok: bool) {
        assert_eq!(InputMask::new(bits).is_ok(), ok);
    }

    #[test]
    fn test_wait_timeout() {
        assert_eq!(WaitTimeout::from_millis(-1).unwrap(), WaitTimeout::Infinite);
        assert!(WaitTimeout::from_millis(0).unwrap().is_immediate());
        assert_eq!(
            WaitTimeout::from_millis(50).unwrap(),
            WaitTimeout::After(Duration::from_millis(50))
        );
        assert!(WaitTimeout::from_millis(-2).is_err());
    }

    #[rstest]
    #[case(0, 0)]
    #[case(10, 100)]
    #[case(5000, 50000)]
    fn test_debounce_units(#[case] ms: i64, #[case] units: u16) {
        let debounce = Debounce::from_millis(ms).unwrap();
        assert_eq!(debounce.to_device_units(), units);
        assert_eq!(Debounce::from_device_units(units), debounce);
    }

    #[test]
    fn test_debounce_range() {
        assert!(Debounce::from_millis(5001).is_err());
        assert!(Debounce::from_millis(-1).is_err());
    }

    #[test]
    fn test_port_mode_codes() {
        assert_eq!(PortMode::from_code(40), Some(PortMode::Pwm));
        assert_eq!(PortMode::Servo.code(), 31);
        assert_eq!(PortMode::from_code(99), None);
        assert!(PortMode::InvertedServo.is_servo());
        assert!(!PortMode::Output.is_servo());
    }

    #[test]
    fn test_card_address() {
        assert_eq!(CardAddress::new(3).unwrap().as_u8(), 3);
        assert!(CardAddress::new(4).is_err());
    }
}
