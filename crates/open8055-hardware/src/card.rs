//! Client-side handle to the card owner task.
//!
//! [`CardHandle`] is cheap to clone; every session holds one. Reads are
//! served from the last published [`CardState`] snapshot. Anything that
//! changes the card or the cache is sent to the owner task as a
//! [`CardRequest`] and answered over a oneshot channel, so device
//! operations are serialized without any lock shared between sessions.

use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use open8055_core::{
    AdcPort, CardAddress, Debounce, Error, InputMask, InputPort, OutputPort, PwmPort, Result,
    WaitTimeout,
};

use crate::notify::{WaitHub, WaitOutcome};
use crate::state::CardState;

/// A mutation executed by the card owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardOp {
    SetOutputDigital(OutputPort, bool),
    SetOutputDigitalAll(u8),
    SetOutputValue(OutputPort, u16),
    SetOutputPwm(PwmPort, u16),
    SetAutoFlush(bool),
    Flush,
    /// Reset the counters whose bits are set.
    ResetCounters(u8),
    SetDebounce(InputPort, Debounce),
    Reset,
    SaveConfig,
    SaveAll,
}

/// Message sent to the card owner.
#[derive(Debug)]
pub enum CardRequest {
    Apply {
        op: CardOp,
        reply: oneshot::Sender<Result<()>>,
    },
    Probe {
        address: CardAddress,
        reply: oneshot::Sender<Result<bool>>,
    },
}

/// Shared access to the card.
#[derive(Debug, Clone)]
pub struct CardHandle {
    requests: mpsc::Sender<CardRequest>,
    state: watch::Receiver<CardState>,
    hub: WaitHub,
}

impl CardHandle {
    pub(crate) fn new(
        requests: mpsc::Sender<CardRequest>,
        state: watch::Receiver<CardState>,
        hub: WaitHub,
    ) -> Self {
        Self {
            requests,
            state,
            hub,
        }
    }

    /// Copy of the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> CardState {
        self.state.borrow().clone()
    }

    fn read<T>(&self, f: impl FnOnce(&CardState) -> T) -> T {
        f(&self.state.borrow())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn is_connected(&self) -> bool {
        self.read(|s| s.connected)
    }

    pub fn auto_flush(&self) -> bool {
        self.read(|s| s.auto_flush)
    }

    pub fn input_digital(&self, port: InputPort) -> bool {
        self.read(|s| s.input_digital(port))
    }

    pub fn input_digital_all(&self) -> u8 {
        self.read(|s| s.input_bits)
    }

    pub fn input_counter(&self, port: InputPort) -> u16 {
        self.read(|s| s.input_counter(port))
    }

    pub fn input_adc(&self, port: AdcPort) -> u16 {
        self.read(|s| s.input_adc(port))
    }

    pub fn input_debounce(&self, port: InputPort) -> Debounce {
        self.read(|s| s.input_debounce(port))
    }

    pub fn output_digital(&self, port: OutputPort) -> bool {
        self.read(|s| s.output_digital(port))
    }

    pub fn output_digital_all(&self) -> u8 {
        self.read(|s| s.output_digital_all())
    }

    pub fn output_value(&self, port: OutputPort) -> u16 {
        self.read(|s| s.output_value(port))
    }

    pub fn output_pwm(&self, port: PwmPort) -> u16 {
        self.read(|s| s.output_pwm(port))
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Run one operation on the card owner and wait for its result.
    ///
    /// # Errors
    ///
    /// Whatever the operation reports, or `Error::DeviceUnavailable` if the
    /// card owner is gone.
    pub async fn apply(&self, op: CardOp) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(CardRequest::Apply { op, reply })
            .await
            .map_err(|_| stopped())?;
        rx.await.map_err(|_| stopped())?
    }

    pub async fn set_output_digital(&self, port: OutputPort, on: bool) -> Result<()> {
        self.apply(CardOp::SetOutputDigital(port, on)).await
    }

    pub async fn set_output_digital_all(&self, bits: u8) -> Result<()> {
        self.apply(CardOp::SetOutputDigitalAll(bits)).await
    }

    pub async fn set_output_value(&self, port: OutputPort, value: u16) -> Result<()> {
        self.apply(CardOp::SetOutputValue(port, value)).await
    }

    pub async fn set_output_pwm(&self, port: PwmPort, duty: u16) -> Result<()> {
        self.apply(CardOp::SetOutputPwm(port, duty)).await
    }

    pub async fn set_auto_flush(&self, enabled: bool) -> Result<()> {
        self.apply(CardOp::SetAutoFlush(enabled)).await
    }

    pub async fn flush(&self) -> Result<()> {
        self.apply(CardOp::Flush).await
    }

    pub async fn reset_input_counter(&self, port: InputPort) -> Result<()> {
        self.apply(CardOp::ResetCounters(port.bit())).await
    }

    pub async fn reset_input_counter_all(&self) -> Result<()> {
        self.apply(CardOp::ResetCounters(0x1F)).await
    }

    pub async fn set_input_debounce(&self, port: InputPort, debounce: Debounce) -> Result<()> {
        self.apply(CardOp::SetDebounce(port, debounce)).await
    }

    pub async fn reset(&self) -> Result<()> {
        self.apply(CardOp::Reset).await
    }

    pub async fn save_config(&self) -> Result<()> {
        self.apply(CardOp::SaveConfig).await
    }

    pub async fn save_all(&self) -> Result<()> {
        self.apply(CardOp::SaveAll).await
    }

    /// Whether a card with `address` is attached to this host.
    pub async fn card_present(&self, address: CardAddress) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(CardRequest::Probe { address, reply })
            .await
            .map_err(|_| stopped())?;
        rx.await.map_err(|_| stopped())?
    }

    // ------------------------------------------------------------------
    // Waiting
    // ------------------------------------------------------------------

    /// Block until one of the events in `mask` changes, the timeout
    /// elapses or `cancel` fires.
    ///
    /// A zero timeout returns at once with the current inputs.
    ///
    /// # Errors
    ///
    /// `Error::Cancelled` when `cancel` fires first.
    pub async fn wait_for(
        &self,
        mask: InputMask,
        timeout: WaitTimeout,
        cancel: &CancellationToken,
    ) -> Result<WaitOutcome> {
        if timeout.is_immediate() {
            return Ok(WaitOutcome {
                changed: InputMask::NONE,
                input_bits: self.input_digital_all(),
            });
        }

        let registration = self.hub.register();
        let change = registration.wait(mask, timeout, cancel).await?;

        Ok(WaitOutcome {
            changed: change.map_or(InputMask::NONE, |c| c.changed.intersection(mask)),
            input_bits: self.input_digital_all(),
        })
    }

    /// `wait_for` on every input event.
    pub async fn wait(&self, timeout: WaitTimeout, cancel: &CancellationToken) -> Result<WaitOutcome> {
        self.wait_for(InputMask::ANY, timeout, cancel).await
    }

    /// Wait until the card has reported fresh inputs.
    ///
    /// # Errors
    ///
    /// `Error::DeviceUnavailable` if the card owner stops first.
    pub async fn wait_connected(&self) -> Result<()> {
        let mut state = self.state.clone();
        state
            .wait_for(|s| s.connected)
            .await
            .map(|_| ())
            .map_err(|_| stopped())
    }

    /// Number of sessions currently blocked in a wait.
    #[must_use]
    pub fn waiter_count(&self) -> usize {
        self.hub.waiter_count()
    }
}

fn stopped() -> Error {
    Error::device_unavailable("card task stopped")
}
