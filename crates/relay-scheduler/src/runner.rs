//! Tokio task runner for scheduled jobs
//!
//! Each scheduled job gets its own tokio task that sleeps until the next cron
//! occurrence, runs the job, and repeats until the runner is shut down.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::job::Job;

/// Parse a cron expression (seconds field included, e.g. `0 */15 * * * *`)
pub fn parse_schedule(expr: &str) -> Result<Schedule> {
    Schedule::from_str(expr).with_context(|| format!("Invalid cron expression: {}", expr))
}

/// Time until the next occurrence of `schedule` after `now`
pub fn next_delay(schedule: &Schedule, now: DateTime<Utc>) -> Option<Duration> {
    let next = schedule.after(&now).next()?;
    Some((next - now).to_std().unwrap_or(Duration::ZERO))
}

/// Runs [`Job`]s on cron schedules
pub struct JobRunner {
    shutdown_token: CancellationToken,
    handles: Vec<(String, JoinHandle<()>)>,
}

impl Default for JobRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRunner {
    pub fn new() -> Self {
        Self::with_shutdown(CancellationToken::new())
    }

    /// Create a runner that stops when `token` (or a parent of it) is cancelled
    pub fn with_shutdown(token: CancellationToken) -> Self {
        Self {
            shutdown_token: token,
            handles: Vec::new(),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Number of scheduled jobs whose task is still alive
    pub fn active_jobs(&self) -> usize {
        self.handles.iter().filter(|(_, h)| !h.is_finished()).count()
    }

    /// Schedule `job` on `cron_expr`. With `run_immediately` the job also
    /// runs once right away, before the first scheduled occurrence.
    pub fn schedule(
        &mut self,
        cron_expr: &str,
        job: Arc<dyn Job>,
        run_immediately: bool,
    ) -> Result<()> {
        let schedule = parse_schedule(cron_expr)?;
        let expr = cron_expr.to_string();
        let name = job.name().to_string();
        let shutdown = self.shutdown_token.clone();

        info!("Scheduling job {} on '{}'", name, expr);

        let handle = tokio::spawn(async move {
            if run_immediately {
                run_job(job.as_ref()).await;
            }

            loop {
                let now = Utc::now();
                let duration = match next_delay(&schedule, now) {
                    Some(d) => d,
                    None => {
                        error!("No next occurrence for cron expression '{}'", expr);
                        break;
                    }
                };

                debug!("Job {} next run in {:?}", job.name(), duration);

                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Job {} stopped due to shutdown", job.name());
                        break;
                    }
                    _ = sleep_until(Instant::now() + duration) => {
                        run_job(job.as_ref()).await;
                    }
                }
            }
        });

        self.handles.push((name, handle));
        Ok(())
    }

    /// Cancel every job and wait for their tasks to finish
    pub async fn shutdown(self) {
        self.shutdown_token.cancel();
        for (name, handle) in self.handles {
            if let Err(e) = handle.await {
                warn!("Job {} task ended abnormally: {}", name, e);
            }
        }
    }
}

async fn run_job(job: &dyn Job) {
    let started = Instant::now();
    match job.run().await {
        Ok(()) => debug!("Job {} finished in {:?}", job.name(), started.elapsed()),
        Err(e) => error!("Job {} failed: {:#}", job.name(), e),
    }
}
