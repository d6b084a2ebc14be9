pub mod adaptive;
pub mod context;
pub mod limiter;

pub use adaptive::{AdaptiveCeiling, AdaptiveConfig};
pub use context::OutdoorContext;
pub use limiter::{LimiterConfig, SetpointLimiter};
