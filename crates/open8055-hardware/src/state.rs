//! Cached view of the card.
//!
//! The card owner keeps one [`CardState`] and publishes a copy after every
//! change, so readers always see a whole snapshot and never wait for device
//! I/O.

use serde::Serialize;

use open8055_core::{
    AdcPort, Debounce, InputPort, OutputPort, PortMode, PwmPort,
    constants::{NUM_INPUTS, NUM_OUTPUTS, NUM_PWM},
};
use open8055_protocol::{ConfigReport, InputReport, OutputReport};

/// Everything an OUTPUT report carries except the counter reset flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Outputs {
    pub bits: u8,
    pub values: [u16; NUM_OUTPUTS],
    pub pwm: [u16; NUM_PWM],
}

impl Outputs {
    #[must_use]
    pub fn to_report(&self, reset_counters: u8) -> OutputReport {
        OutputReport {
            output_bits: self.bits,
            values: self.values,
            pwm: self.pwm,
            reset_counters,
        }
    }

    pub fn set_digital(&mut self, port: OutputPort, on: bool) {
        if on {
            self.bits |= port.bit();
        } else {
            self.bits &= !port.bit();
        }
    }
}

impl From<&OutputReport> for Outputs {
    fn from(report: &OutputReport) -> Self {
        Self {
            bits: report.output_bits,
            values: report.values,
            pwm: report.pwm,
        }
    }
}

/// Snapshot of the card as last seen or last successfully written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardState {
    /// Outputs the card has acknowledged.
    pub committed: Outputs,

    /// Writes not yet flushed; only present while auto-flush is off.
    pub pending: Option<Outputs>,

    /// Debounced digital inputs.
    pub input_bits: u8,
    pub counters: [u16; NUM_INPUTS],
    pub adc: [u16; 2],

    /// Port configuration as stored on the card.
    pub config: ConfigReport,

    pub auto_flush: bool,

    /// `false` from startup or reset until the card sends fresh inputs.
    pub connected: bool,
}

impl Default for CardState {
    fn default() -> Self {
        Self {
            committed: Outputs::default(),
            pending: None,
            input_bits: 0,
            counters: [0; NUM_INPUTS],
            adc: [0; 2],
            config: ConfigReport::default(),
            auto_flush: true,
            connected: false,
        }
    }
}

impl CardState {
    /// Outputs as a client sees them: the pending shadow when one exists.
    #[must_use]
    pub fn effective_outputs(&self) -> Outputs {
        self.pending.unwrap_or(self.committed)
    }

    #[must_use]
    pub fn input_digital(&self, port: InputPort) -> bool {
        self.input_bits & port.bit() != 0
    }

    #[must_use]
    pub fn input_counter(&self, port: InputPort) -> u16 {
        self.counters[port.index()]
    }

    #[must_use]
    pub fn input_adc(&self, port: AdcPort) -> u16 {
        self.adc[port.index()]
    }

    #[must_use]
    pub fn input_debounce(&self, port: InputPort) -> Debounce {
        Debounce::from_device_units(self.config.debounce[port.index()])
    }

    /// Debounce windows of all inputs.
    #[must_use]
    pub fn debounce_all(&self) -> [Debounce; NUM_INPUTS] {
        self.config.debounce.map(Debounce::from_device_units)
    }

    #[must_use]
    pub fn output_digital(&self, port: OutputPort) -> bool {
        self.effective_outputs().bits & port.bit() != 0
    }

    #[must_use]
    pub fn output_digital_all(&self) -> u8 {
        self.effective_outputs().bits
    }

    #[must_use]
    pub fn output_value(&self, port: OutputPort) -> u16 {
        self.effective_outputs().values[port.index()]
    }

    #[must_use]
    pub fn output_pwm(&self, port: PwmPort) -> u16 {
        self.effective_outputs().pwm[port.index()]
    }

    #[must_use]
    pub fn output_mode(&self, port: OutputPort) -> Option<PortMode> {
        self.config.output_mode(port.index())
    }

    #[must_use]
    pub fn pwm_mode(&self, port: PwmPort) -> Option<PortMode> {
        self.config.pwm_mode(port.index())
    }

    /// Copy counters and ADC values from an input report.
    pub(crate) fn apply_analog(&mut self, input: &InputReport) {
        self.counters = input.counters;
        self.adc = input.adc;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_shadows_committed() {
        let mut state = CardState::default();
        let port = OutputPort::new(2).unwrap();
        state.committed.set_digital(port, true);
        assert!(state.output_digital(port));

        let mut pending = state.committed;
        pending.set_digital(port, false);
        state.pending = Some(pending);
        assert!(!state.output_digital(port));
        assert!(state.committed.bits & port.bit() != 0);
    }

    #[test]
    fn test_outputs_report() {
        let mut outputs = Outputs::default();
        outputs.set_digital(OutputPort::new(7).unwrap(), true);
        outputs.pwm[1] = 700;

        let report = outputs.to_report(0b11);
        assert_eq!(report.output_bits, 0x80);
        assert_eq!(report.pwm, [0, 700]);
        assert_eq!(report.reset_counters, 0b11);
        assert_eq!(Outputs::from(&report), outputs);
    }

    #[test]
    fn test_debounce_from_config() {
        let mut state = CardState::default();
        state.config.debounce[1] = 250;
        let port = InputPort::new(1).unwrap();
        assert_eq!(state.input_debounce(port).as_millis(), 25);
        assert_eq!(state.debounce_all()[1].as_millis(), 25);
    }

    #[test]
    fn test_snapshot_serializes() {
        let state = CardState::default();
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["auto_flush"], true);
        assert_eq!(json["connected"], false);
    }
}
