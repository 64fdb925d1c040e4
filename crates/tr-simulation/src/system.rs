use std::time::Duration;

use crate::config::SimConfig;
use crate::context::SimContext;
use crate::error::SimResult;

/// A periodic job run by the ticker.
///
/// Each tick runs with the simulation locked; the lock is released between
/// ticks so requests interleave with background work.
pub trait System: std::fmt::Debug + Send {
    /// Human-readable name for this system.
    fn name(&self) -> &str;

    /// How often the ticker runs this system.
    fn period(&self, config: &SimConfig) -> Duration;

    /// Called once per period.
    fn tick(&mut self, ctx: &mut SimContext<'_>) -> SimResult<()>;
}
