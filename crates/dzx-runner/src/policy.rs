use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{FailureKind, ProcessError};

type RetryPredicate = dyn Fn(&ProcessError) -> bool + Send + Sync;

/// When a failed attempt is run again.
#[derive(Clone, Default)]
pub enum RetryPolicy {
    #[default]
    Never,
    /// Retry up to this many times.
    Count(u32),
    /// Retry while the predicate returns `true` for the latest failure.
    When(Arc<RetryPredicate>),
}

impl RetryPolicy {
    pub fn when<F>(predicate: F) -> Self
    where
        F: Fn(&ProcessError) -> bool + Send + Sync + 'static,
    {
        Self::When(Arc::new(predicate))
    }

    /// Whether another attempt follows `error`. A shell that could not be
    /// spawned is never retried.
    #[must_use]
    pub fn should_retry(&self, error: &ProcessError) -> bool {
        if error.kind() == FailureKind::Spawn {
            return false;
        }
        match self {
            Self::Never => false,
            Self::Count(limit) => error.retries() < *limit,
            Self::When(predicate) => predicate(error),
        }
    }
}

impl From<u32> for RetryPolicy {
    fn from(count: u32) -> Self {
        Self::Count(count)
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Never => write!(f, "Never"),
            Self::Count(limit) => f.debug_tuple("Count").field(limit).finish(),
            Self::When(_) => write!(f, "When(<predicate>)"),
        }
    }
}

/// Retry, delay, and timeout settings; frozen once the process starts.
#[derive(Debug, Clone, Default)]
pub(crate) struct Policy {
    pub(crate) retry: RetryPolicy,
    /// Pause before each retry.
    pub(crate) delay: Duration,
    /// Per-attempt limit after which the process group receives SIGTERM.
    pub(crate) timeout: Option<Duration>,
}
