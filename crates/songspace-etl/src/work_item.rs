use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use treadle::WorkItem;
use uuid::Uuid;

/// One requested index build.
///
/// This is the treadle `WorkItem` that flows through the `build-index`
/// stage. Every request gets a fresh id, so the state store never treats
/// a rebuild as already done. Where the build reads from and publishes to
/// is fixed by the stage's `Config`, not by the job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildJob {
    id: String,
    pub requested_at: DateTime<Utc>,
}

impl BuildJob {
    #[must_use]
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            requested_at: Utc::now(),
        }
    }
}

impl Default for BuildJob {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkItem for BuildJob {
    fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for BuildJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "build {} (requested {})",
            self.id,
            self.requested_at.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_job_creation() {
        let before = Utc::now();
        let job = BuildJob::with_id("job-1");
        assert_eq!(job.id(), "job-1");
        assert!(job.requested_at >= before);
    }

    #[test]
    fn test_new_jobs_get_distinct_ids() {
        let a = BuildJob::new();
        let b = BuildJob::default();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_build_job_display() {
        let job = BuildJob::with_id("job-1");
        let display = format!("{job}");
        assert!(display.starts_with("build job-1 (requested "));
        assert!(display.ends_with("UTC)"));
    }
}
