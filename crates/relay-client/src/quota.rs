//! Advisory quota pre-check
//!
//! Total daily capacity is split between pilot (automated, admin-driven)
//! traffic and student (interactive) traffic. The check runs before a call
//! leaves the process; the gateway itself does not enforce it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ClientError;

pub const DEFAULT_TOTAL_CAPACITY: u64 = 50_000;
pub const DEFAULT_PILOT_RATIO: u64 = 80;

/// Which share of capacity a call draws from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UsageClass {
    Pilot,
    #[default]
    Student,
}

/// Usage counters for the current day
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageCounters {
    #[serde(default)]
    pub pilot_count: u64,
    #[serde(default)]
    pub student_count: u64,
}

/// Where usage counters come from. `Ok(None)` means no data yet.
#[async_trait]
pub trait UsageSource: Send + Sync {
    async fn usage(&self) -> anyhow::Result<Option<UsageCounters>>;
}

/// Source with no usage data; every check passes
#[derive(Debug, Clone, Copy, Default)]
pub struct NoUsageData;

#[async_trait]
impl UsageSource for NoUsageData {
    async fn usage(&self) -> anyhow::Result<Option<UsageCounters>> {
        Ok(None)
    }
}

#[async_trait]
impl UsageSource for UsageCounters {
    async fn usage(&self) -> anyhow::Result<Option<UsageCounters>> {
        Ok(Some(*self))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaGuard {
    total_capacity: u64,
    pilot_ratio: u64,
}

impl Default for QuotaGuard {
    fn default() -> Self {
        Self {
            total_capacity: DEFAULT_TOTAL_CAPACITY,
            pilot_ratio: DEFAULT_PILOT_RATIO,
        }
    }
}

impl QuotaGuard {
    /// `pilot_ratio` is a percentage of `total_capacity`; values above 100
    /// are clamped.
    pub fn new(total_capacity: u64, pilot_ratio: u64) -> Self {
        Self {
            total_capacity,
            pilot_ratio: pilot_ratio.min(100),
        }
    }

    pub fn pilot_limit(&self) -> u64 {
        // ratio <= 100, so the quotient never exceeds total_capacity
        (u128::from(self.total_capacity) * u128::from(self.pilot_ratio) / 100) as u64
    }

    pub fn student_limit(&self) -> u64 {
        self.total_capacity - self.pilot_limit()
    }

    /// Fail if `class` has used up its share. Unavailable usage data skips
    /// the check.
    pub async fn check(
        &self,
        class: UsageClass,
        source: &dyn UsageSource,
    ) -> Result<(), ClientError> {
        let usage = match source.usage().await {
            Ok(Some(usage)) => usage,
            Ok(None) => {
                debug!("No usage data, skipping quota check");
                return Ok(());
            }
            Err(e) => {
                warn!("Usage data unavailable, skipping quota check: {:#}", e);
                return Ok(());
            }
        };
        self.check_counters(class, &usage)
    }

    pub fn check_counters(
        &self,
        class: UsageClass,
        usage: &UsageCounters,
    ) -> Result<(), ClientError> {
        match class {
            UsageClass::Pilot => {
                let limit = self.pilot_limit();
                if usage.pilot_count >= limit {
                    return Err(ClientError::QuotaExceeded(format!(
                        "AI Pilot Quota Exceeded ({}/{})",
                        usage.pilot_count, limit
                    )));
                }
            }
            UsageClass::Student => {
                if usage.student_count >= self.student_limit() {
                    return Err(ClientError::QuotaExceeded(
                        "Student AI Quota Exceeded. Try again later.".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSource;

    #[async_trait]
    impl UsageSource for FailingSource {
        async fn usage(&self) -> anyhow::Result<Option<UsageCounters>> {
            anyhow::bail!("usage store offline")
        }
    }

    #[test]
    fn test_default_limits() {
        let guard = QuotaGuard::default();
        assert_eq!(guard.pilot_limit(), 40_000);
        assert_eq!(guard.student_limit(), 10_000);
    }

    #[test]
    fn test_limits_floor() {
        let guard = QuotaGuard::new(999, 33);
        assert_eq!(guard.pilot_limit(), 329);
        assert_eq!(guard.student_limit(), 670);
        assert_eq!(QuotaGuard::new(100, 250).pilot_limit(), 100);
    }

    #[test]
    fn test_limits_near_u64_max() {
        let guard = QuotaGuard::new(u64::MAX, 80);
        assert_eq!(guard.pilot_limit(), (u128::from(u64::MAX) * 80 / 100) as u64);
        assert_eq!(guard.pilot_limit() + guard.student_limit(), u64::MAX);
        assert_eq!(QuotaGuard::new(u64::MAX, 100).student_limit(), 0);
    }

    #[tokio::test]
    async fn test_student_at_limit_fails() {
        let guard = QuotaGuard::default();
        let usage = UsageCounters {
            pilot_count: 0,
            student_count: 10_000,
        };
        let err = guard.check(UsageClass::Student, &usage).await.unwrap_err();
        assert_eq!(err.to_string(), "Student AI Quota Exceeded. Try again later.");

        let usage = UsageCounters {
            pilot_count: 0,
            student_count: 9_999,
        };
        assert!(guard.check(UsageClass::Student, &usage).await.is_ok());
    }

    #[tokio::test]
    async fn test_pilot_message_includes_counts() {
        let guard = QuotaGuard::default();
        let usage = UsageCounters {
            pilot_count: 40_001,
            student_count: 0,
        };
        let err = guard.check(UsageClass::Pilot, &usage).await.unwrap_err();
        assert_eq!(err.to_string(), "AI Pilot Quota Exceeded (40001/40000)");
        assert!(guard.check(UsageClass::Student, &usage).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_usage_skips_check() {
        let guard = QuotaGuard::new(0, 80);
        assert!(guard.check(UsageClass::Student, &NoUsageData).await.is_ok());
        assert!(guard.check(UsageClass::Pilot, &FailingSource).await.is_ok());
    }

    #[test]
    fn test_usage_counters_deserialize_sparse() {
        let usage: UsageCounters = serde_json::from_str(r#"{"pilotCount": 4}"#).unwrap();
        assert_eq!(usage.pilot_count, 4);
        assert_eq!(usage.student_count, 0);
    }
}
