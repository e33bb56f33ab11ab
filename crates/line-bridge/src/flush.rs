//! Per-Direction Flush Decisions
//!
//! A terminator match always wins. Only a scan that finds no terminator
//! consults the timeout, or the override strategy when one is installed.

use crate::config::DirectionSettings;
use ring_buffer::{RingBuffer, RingBufferError, TerminatorScanner};
use std::time::{Duration, Instant};

/// Outcome of the most recent [`FlushPolicy::poll`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushState {
    /// Waiting for a terminator or the timeout
    Accumulating,
    /// A complete line was flushed
    Terminated,
    /// The partial contents were flushed or discarded after going idle
    TimedOut,
}

/// Something leaving a buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushEvent {
    /// Complete line, terminator kept or stripped per configuration
    Line(Vec<u8>),
    /// Idle partial contents, or whatever the override computed from them
    Timeout(Vec<u8>),
    /// Idle partial contents dropped by the override; carries the byte count
    Discarded(usize),
}

/// What an override wants done with an unterminated partial
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverrideDecision {
    /// Keep accumulating
    Wait,
    /// Flush these bytes now and clear the buffer
    Flush(Vec<u8>),
    /// Clear the buffer without forwarding anything
    Discard,
}

/// Replaces the fixed-duration timeout comparison for one direction
pub trait TimeoutOverride {
    /// Called with the buffered partial and the time since its last byte
    fn decide(&mut self, partial: &[u8], idle: Duration) -> OverrideDecision;
}

impl<F> TimeoutOverride for F
where
    F: FnMut(&[u8], Duration) -> OverrideDecision,
{
    fn decide(&mut self, partial: &[u8], idle: Duration) -> OverrideDecision {
        self(partial, idle)
    }
}

/// Override that waits for `timeout` and then forwards `compute(partial)`.
/// An empty result discards the partial.
pub fn after_timeout<F>(
    timeout: Duration,
    mut compute: F,
) -> impl FnMut(&[u8], Duration) -> OverrideDecision
where
    F: FnMut(&[u8]) -> Vec<u8>,
{
    move |partial: &[u8], idle: Duration| {
        if idle < timeout {
            return OverrideDecision::Wait;
        }
        let out = compute(partial);
        if out.is_empty() {
            OverrideDecision::Discard
        } else {
            OverrideDecision::Flush(out)
        }
    }
}

/// Flush state machine for one direction
pub struct FlushPolicy {
    scanner: TerminatorScanner,
    timeout: Duration,
    include_terminator: bool,
    timeout_override: Option<Box<dyn TimeoutOverride>>,
    state: FlushState,
    last_byte_at: Option<Instant>,
}

impl FlushPolicy {
    /// Create a policy from validated direction settings
    pub fn new(settings: &DirectionSettings) -> Self {
        Self {
            scanner: TerminatorScanner::new(settings.terminator),
            timeout: settings.timeout,
            include_terminator: settings.include_terminator,
            timeout_override: None,
            state: FlushState::Accumulating,
            last_byte_at: None,
        }
    }

    /// Install or remove the timeout override
    pub fn set_override(&mut self, timeout_override: Option<Box<dyn TimeoutOverride>>) {
        self.timeout_override = timeout_override;
    }

    /// Whether an override is installed
    pub fn has_override(&self) -> bool {
        self.timeout_override.is_some()
    }

    /// Note that bytes entered the buffer at `now`
    pub fn record_arrival(&mut self, now: Instant) {
        self.last_byte_at = Some(now);
    }

    /// Outcome of the last poll
    pub fn state(&self) -> FlushState {
        self.state
    }

    /// Forget the arrival clock, e.g. after the buffer was cleared externally
    pub fn reset(&mut self) {
        self.state = FlushState::Accumulating;
        self.last_byte_at = None;
    }

    /// Decide whether anything leaves `buffer` now.
    ///
    /// Returns at most one event; call again after a [`FlushEvent::Line`] to
    /// pick up further lines from the same fill.
    pub fn poll(
        &mut self,
        buffer: &mut RingBuffer,
        now: Instant,
    ) -> Result<Option<FlushEvent>, RingBufferError> {
        self.state = FlushState::Accumulating;

        if let Some(end) = self.scanner.scan(buffer) {
            let mut line = buffer.take(end)?;
            if !self.include_terminator {
                line.truncate(end - self.scanner.terminator().len());
            }
            self.state = FlushState::Terminated;
            return Ok(Some(FlushEvent::Line(line)));
        }

        if buffer.is_empty() {
            return Ok(None);
        }

        let idle = self
            .last_byte_at
            .map(|at| now.saturating_duration_since(at))
            .unwrap_or_default();

        let decision = match self.timeout_override.as_mut() {
            Some(hook) => {
                let (first, second) = buffer.read_available();
                hook.decide(&[first, second].concat(), idle)
            }
            None if idle >= self.timeout => OverrideDecision::Flush(buffer.take_all()),
            None => OverrideDecision::Wait,
        };

        let event = match decision {
            OverrideDecision::Wait => return Ok(None),
            OverrideDecision::Flush(data) => FlushEvent::Timeout(data),
            OverrideDecision::Discard => FlushEvent::Discarded(buffer.len()),
        };

        buffer.clear();
        self.state = FlushState::TimedOut;
        Ok(Some(event))
    }
}

impl std::fmt::Debug for FlushPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlushPolicy")
            .field("terminator", &self.scanner.terminator())
            .field("timeout", &self.timeout)
            .field("include_terminator", &self.include_terminator)
            .field("has_override", &self.has_override())
            .field("state", &self.state)
            .finish()
    }
}
