//! Provider health tracking
//!
//! Every provider moves between `healthy`, `degraded` and `unhealthy`
//! based on a rolling window of outcomes. Unhealthy providers sit out a
//! cooldown, after which one trial request (live or probe) decides whether
//! they come back as `degraded`.

mod monitor;
mod state;

pub use monitor::{HealthMonitor, ProbeHandle, ProbeResult};
pub use state::{HealthState, HealthStatus, ProviderStatus};
