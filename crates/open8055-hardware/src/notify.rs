//! Wait/notify hub for input changes.
//!
//! The card owner publishes one [`InputChange`] per accepted change; every
//! registered waiter receives it and checks it against its own mask. A
//! waiter that falls behind the broadcast buffer treats the gap as a
//! matching change, so a transition is never silently lost.

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use open8055_core::{Error, InputMask, Result, WaitTimeout};

/// One accepted change of the card's inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputChange {
    /// Events that changed: digital inputs, counters and ADC values.
    pub changed: InputMask,

    /// Debounced digital inputs after the change.
    pub input_bits: u8,
}

/// Result of a `WaitFor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOutcome {
    /// Requested events that changed; empty when the wait timed out.
    pub changed: InputMask,

    /// Debounced digital inputs when the wait ended.
    pub input_bits: u8,
}

impl WaitOutcome {
    #[must_use]
    pub fn timed_out(&self) -> bool {
        self.changed.is_empty()
    }
}

/// Broadcast point for input changes.
#[derive(Debug, Clone)]
pub struct WaitHub {
    tx: broadcast::Sender<InputChange>,
}

impl WaitHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Wake every registered waiter.
    pub fn publish(&self, change: InputChange) {
        // No receivers simply means nobody is waiting
        let delivered = self.tx.send(change).unwrap_or(0);
        trace!(changed = change.changed.bits(), delivered, "input change published");
    }

    /// Subscribe to changes published from now on.
    #[must_use]
    pub fn register(&self) -> WaitRegistration {
        WaitRegistration {
            rx: self.tx.subscribe(),
        }
    }

    /// Number of live registrations.
    #[must_use]
    pub fn waiter_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Subscription held for the duration of one wait.
///
/// Dropping it removes the waiter from the hub.
#[derive(Debug)]
pub struct WaitRegistration {
    rx: broadcast::Receiver<InputChange>,
}

impl WaitRegistration {
    /// Block until a change intersecting `mask` arrives.
    ///
    /// Returns `Ok(None)` when `timeout` elapses first.
    ///
    /// # Errors
    ///
    /// `Error::Cancelled` if `cancel` fires, `Error::DeviceUnavailable` if
    /// the card owner has stopped.
    pub async fn wait(
        mut self,
        mask: InputMask,
        timeout: WaitTimeout,
        cancel: &CancellationToken,
    ) -> Result<Option<InputChange>> {
        let matching = async {
            loop {
                match self.rx.recv().await {
                    Ok(change) if change.changed.intersects(mask) => return Ok(change),
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        trace!(missed, "waiter lagged behind input changes");
                        return Ok(InputChange {
                            changed: mask,
                            input_bits: 0,
                        });
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(Error::device_unavailable("card task stopped"));
                    }
                }
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = matching_with_timeout(matching, timeout) => result,
        }
    }
}

async fn matching_with_timeout(
    matching: impl Future<Output = Result<InputChange>>,
    timeout: WaitTimeout,
) -> Result<Option<InputChange>> {
    match timeout {
        WaitTimeout::Infinite => matching.await.map(Some),
        WaitTimeout::After(duration) => match tokio::time::timeout(duration, matching).await {
            Ok(result) => result.map(Some),
            Err(_) => Ok(None),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use open8055_core::constants::{WAIT_ADC1, WAIT_I1, WAIT_I2};
    use std::time::Duration;

    fn change(bits: u16) -> InputChange {
        InputChange {
            changed: InputMask::from_bits_truncate(bits),
            input_bits: 0,
        }
    }

    #[tokio::test]
    async fn test_wakes_on_matching_change() {
        let hub = WaitHub::new(16);
        let cancel = CancellationToken::new();
        let registration = hub.register();
        assert_eq!(hub.waiter_count(), 1);

        hub.publish(change(WAIT_ADC1));
        hub.publish(change(WAIT_I2));

        let got = registration
            .wait(
                InputMask::from_bits_truncate(WAIT_I2),
                WaitTimeout::Infinite,
                &cancel,
            )
            .await
            .unwrap();
        assert_eq!(got, Some(change(WAIT_I2)));
        assert_eq!(hub.waiter_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out() {
        let hub = WaitHub::new(16);
        let cancel = CancellationToken::new();
        let registration = hub.register();
        hub.publish(change(WAIT_I2));

        let got = registration
            .wait(
                InputMask::from_bits_truncate(WAIT_I1),
                WaitTimeout::After(Duration::from_millis(50)),
                &cancel,
            )
            .await
            .unwrap();
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn test_cancelled() {
        let hub = WaitHub::new(16);
        let cancel = CancellationToken::new();
        let registration = hub.register();

        let waiter = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                registration
                    .wait(InputMask::ANY, WaitTimeout::Infinite, &cancel)
                    .await
            })
        };
        cancel.cancel();

        assert!(matches!(waiter.await.unwrap(), Err(Error::Cancelled)));
        assert_eq!(hub.waiter_count(), 0);
    }

    #[tokio::test]
    async fn test_lagged_waiter_wakes() {
        let hub = WaitHub::new(2);
        let cancel = CancellationToken::new();
        let registration = hub.register();
        for _ in 0..5 {
            hub.publish(change(WAIT_ADC1));
        }

        let mask = InputMask::from_bits_truncate(WAIT_I1);
        let got = registration
            .wait(mask, WaitTimeout::Infinite, &cancel)
            .await
            .unwrap();
        assert_eq!(got.map(|c| c.changed), Some(mask));
    }

    #[tokio::test]
    async fn test_closed_hub() {
        let hub = WaitHub::new(4);
        let registration = hub.register();
        drop(hub);

        let result = registration
            .wait(InputMask::ANY, WaitTimeout::Infinite, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(Error::DeviceUnavailable(_))));
    }
}
