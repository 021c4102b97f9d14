use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;

use crate::limiter::LimitType;

/// Prefix for fixed-window request counters
pub const COUNTER_KEY_PREFIX: &str = "rate_limit";

/// Prefix for cooldown markers
pub const BLOCK_KEY_PREFIX: &str = "block";

/// Length of the counting window
pub const WINDOW: Duration = Duration::from_secs(1);

/// Wall-clock source for reset timestamps
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeSource {
    _private: (),
}

impl TimeSource {
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Get the current time as a DateTime<Utc>
    pub fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    /// The instant `after` from now
    pub fn reset_after(&self, after: Duration) -> DateTime<Utc> {
        let now = self.utc_now();
        ChronoDuration::from_std(after)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Generate the counter key for an identity, namespaced by limit type
pub fn generate_counter_key(limit_type: LimitType, identifier: &str) -> String {
    format!("{}:{}:{}", COUNTER_KEY_PREFIX, limit_type.as_str(), identifier)
}

/// Generate the block key for an identity, namespaced by limit type
pub fn generate_block_key(limit_type: LimitType, identifier: &str) -> String {
    format!("{}:{}:{}", BLOCK_KEY_PREFIX, limit_type.as_str(), identifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_generation() {
        assert_eq!(
            generate_counter_key(LimitType::Ip, "1.2.3.4"),
            "rate_limit:ip:1.2.3.4"
        );
        assert_eq!(
            generate_block_key(LimitType::Token, "abc"),
            "block:token:abc"
        );
    }

    #[test]
    fn test_keys_are_namespaced_by_type() {
        assert_ne!(
            generate_counter_key(LimitType::Ip, "same"),
            generate_counter_key(LimitType::Token, "same")
        );
        assert_ne!(
            generate_block_key(LimitType::Ip, "same"),
            generate_counter_key(LimitType::Ip, "same")
        );
    }

    #[test]
    fn test_reset_after() {
        let time_source = TimeSource::new();
        let before = time_source.utc_now();
        let reset = time_source.reset_after(Duration::from_secs(60));
        let delta = reset - before;
        assert!(delta >= ChronoDuration::seconds(60));
        assert!(delta < ChronoDuration::seconds(61));
    }
}
