//! Protocol-level constants for the Open8055 card and its server.
//!
//! The card talks in fixed 32-byte HID reports. Byte 0 of every report is the
//! message type; the remaining bytes are a packed little-endian struct whose
//! layout depends on that type:
//!
//! ```text
//! OUTPUT      | type | bits | value[8] u16 | pwm[2] u16 | resetCounter | pad
//! INPUT       | type | bits | counter[5] u16 | adc[2] u16 | pad
//! SETCONFIG1  | type | modeADC[2] | modeInput[5] | modeOutput[8] | modePWM[2]
//!             | debounce[5] u16 | cardAddress | pad
//! ```
//!
//! Clients address ports with 0-based channel numbers. The masks used by
//! `WaitFor` pack the five digital inputs, the five counters and the two ADC
//! inputs into twelve bits:
//!
//! ```
//! use open8055_core::constants::*;
//!
//! assert_eq!(WAIT_I_ANY | WAIT_COUNT_ANY | WAIT_ADC_ANY, WAIT_ANY);
//! assert_eq!(WAIT_COUNT1, 1 << 5);
//! ```

use std::time::Duration;

// ============================================================================
// HID report layout
// ============================================================================

/// Size of every HID report exchanged with the card.
pub const HID_MESSAGE_SIZE: usize = 32;

/// Host → card: set outputs (and optionally reset counters).
pub const MSG_OUTPUT: u8 = 0x01;

/// Host → card: request an INPUT report.
pub const MSG_GETINPUT: u8 = 0x02;

/// Host ↔ card: port configuration (modes, debounce, card address).
pub const MSG_SETCONFIG1: u8 = 0x03;

/// Host → card: ask the card to echo its configuration, outputs and inputs.
pub const MSG_GETCONFIG: u8 = 0x04;

/// Host → card: persist configuration to EEPROM.
pub const MSG_SAVECONFIG: u8 = 0x05;

/// Host → card: persist configuration and output values to EEPROM.
pub const MSG_SAVEALL: u8 = 0x06;

/// Host → card: reboot.
pub const MSG_RESET: u8 = 0x7F;

/// Card → host: current input state.
pub const MSG_INPUT: u8 = 0x81;

// ============================================================================
// Port counts and value ranges
// ============================================================================

pub const NUM_INPUTS: usize = 5;
pub const NUM_OUTPUTS: usize = 8;
pub const NUM_ADC: usize = 2;
pub const NUM_PWM: usize = 2;

/// Highest PWM duty cycle value (10-bit).
pub const PWM_MAX: u16 = 1023;

/// Highest ADC reading (10-bit).
pub const ADC_MAX: u16 = 1023;

/// Longest debounce time clients may configure, in milliseconds.
pub const DEBOUNCE_MAX_MS: u32 = 5000;

/// The card stores debounce in tenths of a millisecond.
pub const DEBOUNCE_UNITS_PER_MS: u32 = 10;

/// Highest card address selectable by the board jumpers.
pub const MAX_CARD_ADDRESS: u8 = 3;

/// USB vendor id of all Open8055 boards.
pub const USB_VENDOR_ID: u16 = 0x10cf;

/// USB product id of card 0; card N enumerates as `USB_PRODUCT_ID_BASE + N`.
pub const USB_PRODUCT_ID_BASE: u16 = 0x55f0;

// ============================================================================
// WaitFor masks
// ============================================================================

pub const WAIT_I1: u16 = 1 << 0;
pub const WAIT_I2: u16 = 1 << 1;
pub const WAIT_I3: u16 = 1 << 2;
pub const WAIT_I4: u16 = 1 << 3;
pub const WAIT_I5: u16 = 1 << 4;
pub const WAIT_I_ANY: u16 = 0x001F;

pub const WAIT_COUNT1: u16 = 1 << 5;
pub const WAIT_COUNT2: u16 = 1 << 6;
pub const WAIT_COUNT3: u16 = 1 << 7;
pub const WAIT_COUNT4: u16 = 1 << 8;
pub const WAIT_COUNT5: u16 = 1 << 9;
pub const WAIT_COUNT_ANY: u16 = 0x03E0;

pub const WAIT_ADC1: u16 = 1 << 10;
pub const WAIT_ADC2: u16 = 1 << 11;
pub const WAIT_ADC_ANY: u16 = 0x0C00;

/// Every input event the card can report.
pub const WAIT_ANY: u16 = 0x0FFF;

/// Bit offset of the counter flags inside a wait mask.
pub const WAIT_COUNT_SHIFT: u32 = 5;

/// Bit offset of the ADC flags inside a wait mask.
pub const WAIT_ADC_SHIFT: u32 = 10;

/// Client-side timeout value meaning "wait forever".
pub const TIMEOUT_INFINITE: i64 = -1;

// ============================================================================
// Client protocol limits
// ============================================================================

/// Longest command line a client may send, excluding the newline.
pub const MAX_CMDLINE: usize = 256;

/// Commands a client may queue behind the one being executed.
pub const MAX_PENDING_COMMANDS: usize = 1024;

/// Longest username accepted by `Login`.
pub const MAX_USERNAME: usize = 32;

/// Default TCP port of the server.
pub const DEFAULT_PORT: u16 = 8055;

/// How often the registry reaps stopped sessions.
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_millis(100);

/// Default cap on concurrent client sessions.
pub const DEFAULT_MAX_CONNECTIONS: usize = 64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_masks_are_disjoint() {
        assert_eq!(WAIT_I_ANY & WAIT_COUNT_ANY, 0);
        assert_eq!(WAIT_COUNT_ANY & WAIT_ADC_ANY, 0);
        assert_eq!(WAIT_I_ANY & WAIT_ADC_ANY, 0);
        assert_eq!(WAIT_I1 | WAIT_I2 | WAIT_I3 | WAIT_I4 | WAIT_I5, WAIT_I_ANY);
        assert_eq!(
            WAIT_COUNT1 | WAIT_COUNT2 | WAIT_COUNT3 | WAIT_COUNT4 | WAIT_COUNT5,
            WAIT_COUNT_ANY
        );
        assert_eq!(WAIT_ADC1 | WAIT_ADC2, WAIT_ADC_ANY);
    }

    #[test]
    fn test_shift_offsets() {
        assert_eq!(1u16 << WAIT_COUNT_SHIFT, WAIT_COUNT1);
        assert_eq!(1u16 << WAIT_ADC_SHIFT, WAIT_ADC1);
    }
}
