use std::sync::{Mutex, MutexGuard};
use time::{Duration, OffsetDateTime};

/// Readings older than this are treated as missing
pub const DEFAULT_MAX_AGE: Duration = Duration::seconds(900);

#[derive(Debug, Clone, Copy)]
struct Reading {
    value: f64,
    observed_at: OffsetDateTime,
}

/// Latest outdoor temperature, shared between the MQTT callback and the limiter
///
/// Each operation takes the lock for a single assignment or comparison.
#[derive(Debug, Default)]
pub struct OutdoorContext {
    reading: Mutex<Option<Reading>>,
}

impl OutdoorContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite value and timestamp together
    pub fn set(&self, value: f64, now: OffsetDateTime) {
        *self.lock() = Some(Reading {
            value,
            observed_at: now,
        });
    }

    /// Stored value if one exists and is at most `max_age` old at `now`
    pub fn get(&self, max_age: Duration, now: OffsetDateTime) -> Option<f64> {
        let reading = (*self.lock())?;
        if now - reading.observed_at > max_age {
            return None;
        }
        Some(reading.value)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Reading>> {
        // Plain data behind the lock, a poisoned guard is still consistent
        self.reading.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn at(secs: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000 + secs).unwrap()
    }

    #[test]
    fn empty_context_has_no_value() {
        let ctx = OutdoorContext::new();
        assert_eq!(ctx.get(DEFAULT_MAX_AGE, at(0)), None);
    }

    #[test]
    fn value_expires_after_max_age() {
        let ctx = OutdoorContext::new();
        ctx.set(20.0, at(0));
        assert_eq!(ctx.get(DEFAULT_MAX_AGE, at(899)), Some(20.0));
        assert_eq!(ctx.get(DEFAULT_MAX_AGE, at(900)), Some(20.0));
        assert_eq!(ctx.get(DEFAULT_MAX_AGE, at(901)), None);
    }

    #[test]
    fn set_overwrites_value_and_timestamp() {
        let ctx = OutdoorContext::new();
        ctx.set(5.0, at(0));
        ctx.set(-3.5, at(1000));
        assert_eq!(ctx.get(DEFAULT_MAX_AGE, at(1500)), Some(-3.5));
    }

    #[test]
    fn concurrent_writers_leave_a_complete_reading() {
        let ctx = Arc::new(OutdoorContext::new());
        let handles: Vec<_> = (0..4)
            .map(|n| {
                let ctx = Arc::clone(&ctx);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        ctx.set(n as f64, at(0));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let value = ctx.get(DEFAULT_MAX_AGE, at(1)).unwrap();
        assert!((0.0..4.0).contains(&value));
    }
}
