//! UART Keepalive Timer

use crate::config::KeepaliveSettings;
use std::time::{Duration, Instant};

/// Emits a fixed payload toward the serial peer once per idle interval
#[derive(Debug, Clone)]
pub struct KeepaliveTimer {
    interval: Duration,
    payload: Vec<u8>,
    /// Last UART byte received or keepalive sent
    last_activity: Instant,
    sent: u64,
}

impl KeepaliveTimer {
    /// Create a timer whose idle clock starts at `now`
    pub fn new(settings: &KeepaliveSettings, now: Instant) -> Self {
        Self {
            interval: settings.interval,
            payload: settings.payload.clone(),
            last_activity: now,
            sent: 0,
        }
    }

    /// Whether the timer can ever fire
    pub fn is_enabled(&self) -> bool {
        !self.interval.is_zero() && !self.payload.is_empty()
    }

    /// A UART byte arrived; restart the idle clock
    pub fn record_activity(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// Return the payload if a full interval has passed since the last
    /// UART byte or keepalive
    pub fn poll(&mut self, now: Instant) -> Option<&[u8]> {
        if !self.is_enabled() {
            return None;
        }
        if now.saturating_duration_since(self.last_activity) < self.interval {
            return None;
        }
        self.last_activity = now;
        self.sent += 1;
        Some(&self.payload)
    }

    /// Keepalives emitted so far
    pub fn sent(&self) -> u64 {
        self.sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ping_timer(now: Instant) -> KeepaliveTimer {
        KeepaliveTimer::new(
            &KeepaliveSettings {
                interval: Duration::from_millis(1000),
                payload: b"PING".to_vec(),
                only_without_clients: false,
            },
            now,
        )
    }

    #[test]
    fn test_fires_once_per_interval() {
        let t0 = Instant::now();
        let mut timer = ping_timer(t0);

        assert!(timer.poll(t0 + Duration::from_millis(999)).is_none());
        assert_eq!(timer.poll(t0 + Duration::from_millis(1000)), Some(&b"PING"[..]));
        assert!(timer.poll(t0 + Duration::from_millis(1500)).is_none());
        assert!(timer.poll(t0 + Duration::from_millis(2000)).is_some());
        assert_eq!(timer.sent(), 2);
    }

    #[test]
    fn test_activity_resets_idle_clock() {
        let t0 = Instant::now();
        let mut timer = ping_timer(t0);

        timer.record_activity(t0 + Duration::from_millis(500));
        assert!(timer.poll(t0 + Duration::from_millis(1000)).is_none());
        assert!(timer.poll(t0 + Duration::from_millis(1499)).is_none());
        assert!(timer.poll(t0 + Duration::from_millis(1500)).is_some());
    }

    #[test]
    fn test_disabled() {
        let t0 = Instant::now();
        let mut timer = KeepaliveTimer::new(&KeepaliveSettings::default(), t0);
        assert!(!timer.is_enabled());
        assert!(timer.poll(t0 + Duration::from_secs(3600)).is_none());
    }
}
