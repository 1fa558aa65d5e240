//! Simulated Open8055 board.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::trace;

use open8055_core::{CardAddress, constants::NUM_INPUTS};
use open8055_protocol::{ConfigReport, InputReport, OutputReport, RawReport, Report};

use crate::{DeviceInfo, HardwareError, Result, traits::CardTransport};

/// What the board looks like from the outside.
#[derive(Debug)]
struct MockBoard {
    address: CardAddress,
    connected: bool,
    fail_writes: bool,
    config: ConfigReport,
    outputs: OutputReport,
    inputs: InputReport,
    sent: Vec<Report>,
}

impl MockBoard {
    /// Apply a host report and return the reports the board answers with.
    fn apply(&mut self, report: &Report) -> Vec<Report> {
        self.sent.push(*report);

        match report {
            Report::Output(out) => {
                for index in 0..NUM_INPUTS {
                    if out.reset_counters & (1 << index) != 0 {
                        self.inputs.counters[index] = 0;
                    }
                }
                self.outputs = OutputReport {
                    reset_counters: 0,
                    ..*out
                };
                Vec::new()
            }
            Report::SetConfig(cfg) => {
                self.config = *cfg;
                Vec::new()
            }
            Report::GetInput | Report::Reset => vec![Report::Input(self.inputs)],
            Report::GetConfig => vec![
                Report::SetConfig(self.config),
                Report::Output(self.outputs),
                Report::Input(self.inputs),
            ],
            Report::SaveConfig | Report::SaveAll | Report::Input(_) => Vec::new(),
        }
    }
}

#[derive(Debug)]
enum MockEvent {
    Report(Report),
    Raw(RawReport),
    Disconnect,
}

/// Mock card for testing and development.
///
/// # Examples
///
/// ```
/// use open8055_hardware::mock::MockCard;
/// use open8055_hardware::traits::CardTransport;
/// use open8055_protocol::Report;
///
/// #[tokio::main]
/// async fn main() -> open8055_hardware::Result<()> {
///     let (mut card, handle) = MockCard::new();
///
///     handle.set_input_bits(0b00001);
///     let Report::Input(input) = card.recv_report().await? else {
///         unreachable!()
///     };
///     assert_eq!(input.input_bits, 0b00001);
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockCard {
    board: Arc<Mutex<MockBoard>>,
    event_tx: mpsc::UnboundedSender<MockEvent>,
    event_rx: mpsc::UnboundedReceiver<MockEvent>,
}

impl MockCard {
    /// Create a mock card at address 0 with the default configuration.
    pub fn new() -> (Self, MockCardHandle) {
        Self::with_config(ConfigReport::default())
    }

    /// Create a mock card that starts with `config`.
    pub fn with_config(config: ConfigReport) -> (Self, MockCardHandle) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let address = CardAddress::new(i64::from(config.card_address)).unwrap_or_default();

        let board = Arc::new(Mutex::new(MockBoard {
            address,
            connected: true,
            fail_writes: false,
            config,
            outputs: OutputReport::default(),
            inputs: InputReport::default(),
            sent: Vec::new(),
        }));

        let card = Self {
            board: Arc::clone(&board),
            event_tx: event_tx.clone(),
            event_rx,
        };
        let handle = MockCardHandle { board, event_tx };

        (card, handle)
    }
}

impl CardTransport for MockCard {
    async fn send_report(&mut self, report: &Report) -> Result<()> {
        let replies = {
            let mut board = lock(&self.board);
            if !board.connected {
                return Err(HardwareError::disconnected("mock card"));
            }
            if board.fail_writes {
                return Err(HardwareError::communication("mock write failure"));
            }
            board.apply(report)
        };

        trace!(msg_type = report.msg_type(), "mock card received report");
        for reply in replies {
            // The receiver lives in `self`, so this cannot fail
            let _ = self.event_tx.send(MockEvent::Report(reply));
        }
        Ok(())
    }

    async fn recv_report(&mut self) -> Result<Report> {
        match self.event_rx.recv().await {
            Some(MockEvent::Report(report)) => Ok(report),
            Some(MockEvent::Raw(raw)) => Ok(Report::decode(&raw)?),
            Some(MockEvent::Disconnect) | None => Err(HardwareError::disconnected("mock card")),
        }
    }

    async fn card_present(&self, address: CardAddress) -> Result<bool> {
        let board = lock(&self.board);
        Ok(board.connected && board.address == address)
    }

    async fn get_info(&self) -> Result<DeviceInfo> {
        let address = lock(&self.board).address;
        Ok(DeviceInfo::new(format!("Mock Open8055 card{address}"), address))
    }
}

/// Handle for driving a mock card from tests.
#[derive(Debug, Clone)]
pub struct MockCardHandle {
    board: Arc<Mutex<MockBoard>>,
    event_tx: mpsc::UnboundedSender<MockEvent>,
}

impl MockCardHandle {
    /// Change the raw digital input levels and send an INPUT report.
    pub fn set_input_bits(&self, bits: u8) {
        self.update_inputs(|inputs| inputs.input_bits = bits);
    }

    /// Set one counter and send an INPUT report.
    pub fn set_counter(&self, index: usize, value: u16) {
        self.update_inputs(|inputs| inputs.counters[index] = value);
    }

    /// Set one ADC reading and send an INPUT report.
    pub fn set_adc(&self, index: usize, value: u16) {
        self.update_inputs(|inputs| inputs.adc[index] = value);
    }

    /// Replace the whole input state and send an INPUT report.
    pub fn set_inputs(&self, inputs: InputReport) {
        self.update_inputs(|current| *current = inputs);
    }

    fn update_inputs(&self, f: impl FnOnce(&mut InputReport)) {
        let inputs = {
            let mut board = lock(&self.board);
            f(&mut board.inputs);
            board.inputs
        };
        self.send(MockEvent::Report(Report::Input(inputs)));
    }

    /// Deliver raw bytes as if the card had sent them.
    pub fn inject_raw(&self, raw: RawReport) {
        self.send(MockEvent::Raw(raw));
    }

    /// Simulate unplugging the card.
    pub fn disconnect(&self) {
        lock(&self.board).connected = false;
        self.send(MockEvent::Disconnect);
    }

    /// Make subsequent writes fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        lock(&self.board).fail_writes = fail;
    }

    /// Replace the configuration stored on the board.
    pub fn set_config(&self, config: ConfigReport) {
        lock(&self.board).config = config;
    }

    /// Every report the host has sent so far.
    pub fn sent_reports(&self) -> Vec<Report> {
        lock(&self.board).sent.clone()
    }

    /// OUTPUT reports the host has sent so far.
    pub fn sent_outputs(&self) -> Vec<OutputReport> {
        lock(&self.board)
            .sent
            .iter()
            .filter_map(|report| match report {
                Report::Output(out) => Some(*out),
                _ => None,
            })
            .collect()
    }

    pub fn clear_sent(&self) {
        lock(&self.board).sent.clear();
    }

    /// Output state currently applied on the board.
    pub fn outputs(&self) -> OutputReport {
        lock(&self.board).outputs
    }

    /// Configuration currently stored on the board.
    pub fn config(&self) -> ConfigReport {
        lock(&self.board).config
    }

    /// Input state currently seen by the board.
    pub fn inputs(&self) -> InputReport {
        lock(&self.board).inputs
    }

    fn send(&self, event: MockEvent) {
        // A dropped card is treated like an unplugged one
        let _ = self.event_tx.send(event);
    }
}

fn lock(board: &Mutex<MockBoard>) -> MutexGuard<'_, MockBoard> {
    board.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use open8055_core::PortMode;

    #[tokio::test]
    async fn test_output_applied_and_recorded() {
        let (mut card, handle) = MockCard::new();

        let out = OutputReport {
            output_bits: 0b1000_0001,
            ..Default::default()
        };
        card.send_report(&Report::Output(out)).await.unwrap();

        assert_eq!(handle.outputs().output_bits, 0b1000_0001);
        assert_eq!(handle.sent_outputs(), vec![out]);
    }

    #[tokio::test]
    async fn test_counter_reset_bits() {
        let (mut card, handle) = MockCard::new();
        handle.set_counter(0, 10);
        handle.set_counter(3, 20);
        let _ = card.recv_report().await.unwrap();
        let _ = card.recv_report().await.unwrap();

        let out = OutputReport {
            reset_counters: 1 << 3,
            ..Default::default()
        };
        card.send_report(&Report::Output(out)).await.unwrap();

        assert_eq!(handle.inputs().counters, [10, 0, 0, 0, 0]);
        assert_eq!(handle.outputs().reset_counters, 0);
    }

    #[tokio::test]
    async fn test_getconfig_readback() {
        let mut config = ConfigReport::default();
        config.mode_output[2] = PortMode::Servo.code();
        let (mut card, _handle) = MockCard::with_config(config);

        card.send_report(&Report::GetConfig).await.unwrap();

        assert_eq!(card.recv_report().await.unwrap(), Report::SetConfig(config));
        assert!(matches!(card.recv_report().await.unwrap(), Report::Output(_)));
        assert!(matches!(card.recv_report().await.unwrap(), Report::Input(_)));
    }

    #[tokio::test]
    async fn test_failing_writes() {
        let (mut card, handle) = MockCard::new();
        handle.fail_writes(true);

        let err = card.send_report(&Report::GetInput).await.unwrap_err();
        assert!(matches!(err, HardwareError::CommunicationError { .. }));
        assert!(handle.sent_reports().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect() {
        let (mut card, handle) = MockCard::new();
        handle.disconnect();

        assert!(card.recv_report().await.unwrap_err().is_disconnect());
        assert!(card.send_report(&Report::GetInput).await.is_err());
        assert!(!card.card_present(CardAddress::default()).await.unwrap());
    }

    #[tokio::test]
    async fn test_raw_garbage_is_invalid_data() {
        let (mut card, handle) = MockCard::new();
        let mut raw = [0u8; 32];
        raw[0] = 0x55;
        handle.inject_raw(raw);

        let err = card.recv_report().await.unwrap_err();
        assert!(matches!(err, HardwareError::InvalidData { .. }));
    }

    #[tokio::test]
    async fn test_card_present_by_address() {
        let config = ConfigReport {
            card_address: 2,
            ..Default::default()
        };
        let (card, _handle) = MockCard::with_config(config);

        assert!(card.card_present(CardAddress::new(2).unwrap()).await.unwrap());
        assert!(!card.card_present(CardAddress::new(0).unwrap()).await.unwrap());
        assert_eq!(card.get_info().await.unwrap().name, "Mock Open8055 card2");
    }
}
