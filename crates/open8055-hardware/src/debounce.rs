//! Software debounce of the digital inputs.
//!
//! A raw level change on an input is only accepted once it has persisted
//! for that input's debounce window. Returning to the accepted level before
//! the window elapses discards the pending change. Because a bounce may be
//! followed by silence from the card, pending changes also expire on a
//! timer: [`Debouncer::next_deadline`] tells the owner when to call
//! [`Debouncer::poll`].

use tokio::time::Instant;

use open8055_core::{Debounce, constants::NUM_INPUTS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingEdge {
    level: bool,
    since: Instant,
}

/// Debounce filter for the five digital inputs.
#[derive(Debug, Clone, Default)]
pub struct Debouncer {
    stable: u8,
    pending: [Option<PendingEdge>; NUM_INPUTS],
}

impl Debouncer {
    /// Accepted input levels.
    #[must_use]
    pub fn stable(&self) -> u8 {
        self.stable
    }

    /// Adopt `bits` as accepted without filtering and drop pending edges.
    pub fn seed(&mut self, bits: u8) {
        self.stable = bits;
        self.pending = [None; NUM_INPUTS];
    }

    /// Feed one raw sample; returns the bits whose accepted level changed.
    pub fn sample(&mut self, raw: u8, now: Instant, windows: &[Debounce; NUM_INPUTS]) -> u8 {
        let mut changed = 0;

        for (index, window) in windows.iter().enumerate() {
            let bit = 1u8 << index;
            let level = raw & bit != 0;

            if level == (self.stable & bit != 0) {
                self.pending[index] = None;
                continue;
            }

            let since = match self.pending[index] {
                Some(edge) if edge.level == level => edge.since,
                _ => now,
            };
            self.pending[index] = Some(PendingEdge { level, since });

            if now.duration_since(since) >= window.as_duration() {
                self.accept(index);
                changed |= bit;
            }
        }

        changed
    }

    /// Accept pending edges whose window has elapsed by `now`.
    pub fn poll(&mut self, now: Instant, windows: &[Debounce; NUM_INPUTS]) -> u8 {
        let mut changed = 0;

        for (index, window) in windows.iter().enumerate() {
            if let Some(edge) = self.pending[index]
                && now.duration_since(edge.since) >= window.as_duration()
            {
                self.accept(index);
                changed |= 1 << index;
            }
        }

        changed
    }

    /// Earliest instant at which a pending edge becomes acceptable.
    #[must_use]
    pub fn next_deadline(&self, windows: &[Debounce; NUM_INPUTS]) -> Option<Instant> {
        self.pending
            .iter()
            .zip(windows)
            .filter_map(|(edge, window)| edge.map(|e| e.since + window.as_duration()))
            .min()
    }

    fn accept(&mut self, index: usize) {
        if let Some(edge) = self.pending[index].take() {
            if edge.level {
                self.stable |= 1 << index;
            } else {
                self.stable &= !(1 << index);
            }
        }
    }
}
