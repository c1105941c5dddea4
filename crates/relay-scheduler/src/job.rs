//! Job abstraction for scheduled work

use anyhow::Result;
use async_trait::async_trait;

/// A unit of recurring background work
#[async_trait]
pub trait Job: Send + Sync {
    /// Short name used in logs (e.g. "health-check")
    fn name(&self) -> &str;

    /// Execute one run of the job. Errors are logged by the runner and do not
    /// stop the schedule.
    async fn run(&self) -> Result<()>;
}
