use log::{debug, info};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

use crate::control::adaptive::AdaptiveCeiling;
use crate::control::context::OutdoorContext;
use crate::ramses::Frame;

#[derive(Debug, Clone, PartialEq)]
pub struct LimiterConfig {
    /// Static ceiling used while no adaptive ceiling is available
    pub base_max: f64,
    pub ramp_step: f64,
    pub ramp_interval: Duration,
    pub outdoor_max_age: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LimiterState {
    pub last_emitted: Option<f64>,
    pub last_emitted_at: Option<OffsetDateTime>,
}

/// Caps CH setpoint requests and slows down their rise
///
/// Falling targets are followed at once; rising targets are approached by
/// at most `ramp_step` per `ramp_interval`.
pub struct SetpointLimiter {
    context: Arc<OutdoorContext>,
    ceiling: AdaptiveCeiling,
    config: LimiterConfig,
    state: LimiterState,
}

impl SetpointLimiter {
    pub fn new(config: LimiterConfig, ceiling: AdaptiveCeiling, context: Arc<OutdoorContext>) -> Self {
        SetpointLimiter {
            context,
            ceiling,
            config,
            state: LimiterState::default(),
        }
    }

    /// Adaptive ceiling for the current outdoor reading, else the static one
    pub fn effective_max(&self, now: OffsetDateTime) -> f64 {
        let outdoor = self.context.get(self.config.outdoor_max_age, now);
        self.ceiling
            .compute(outdoor)
            .unwrap_or(self.config.base_max)
    }

    /// Frame carrying the currently held setpoint
    ///
    /// Frames other than CH setpoint requests, or without a readable value,
    /// are returned unchanged.
    pub fn process(&mut self, frame: Frame, now: OffsetDateTime) -> Frame {
        if !frame.is_ch_setpoint() {
            return frame;
        }
        let requested = match frame.get_ch_value() {
            Some(value) => value,
            None => return frame,
        };

        let ceiling = self.effective_max(now);
        let target = requested.min(ceiling);
        let held = self.step(target, now);

        if held != requested {
            info!(
                "CH setpoint {:.1} °C -> {:.1} °C (ceiling {:.1} °C)",
                requested, held, ceiling
            );
        }
        frame.with_new_ch(held)
    }

    fn step(&mut self, target: f64, now: OffsetDateTime) -> f64 {
        let held = match self.state.last_emitted {
            Some(held) if target >= held => held,
            _ => {
                // First value or descent: follow immediately
                self.emit(target, now);
                return target;
            }
        };

        let due = match self.state.last_emitted_at {
            Some(at) => now - at >= self.config.ramp_interval,
            None => true,
        };
        if due {
            let next = (held + self.config.ramp_step).min(target);
            self.emit(next, now);
            next
        } else {
            debug!("CH ramp holding at {:.1} °C towards {:.1} °C", held, target);
            held
        }
    }

    fn emit(&mut self, value: f64, now: OffsetDateTime) {
        self.state = LimiterState {
            last_emitted: Some(value),
            last_emitted_at: Some(now),
        };
    }
}
