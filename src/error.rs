//! Error types for the evaluation harness.
//!
//! Two families, handled differently:
//!
//! - [`HarnessError`]: configuration problems that make the whole run
//!   meaningless (missing corpus, unreadable baseline, judge requested but
//!   not configured). Always fatal, always reported before any fixture runs.
//! - [`CallError`]: a single generation or judge call failed. Never fatal to
//!   the run; the runner retries transient variants and then records a FAIL
//!   for that one fixture.
//!
//! Messages follow the same pattern: what went wrong, then how to fix it.

use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// HarnessError
// ---------------------------------------------------------------------------

/// Run-fatal harness configuration errors.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The fixture corpus directory does not exist or holds no fixtures.
    #[error(
        "fixture corpus not found at {}: {detail}\n  To fix: pass --fixtures <dir> or set [paths] fixtures in feval.toml",
        path.display()
    )]
    MissingCorpus {
        /// Corpus directory that was searched.
        path: PathBuf,
        /// Why the corpus is unusable.
        detail: String,
    },

    /// A fixture file could not be read or failed validation.
    #[error("invalid fixture {}: {detail}", path.display())]
    InvalidFixture {
        /// Path to the offending fixture file.
        path: PathBuf,
        /// Human-readable description of the problem.
        detail: String,
    },

    /// Two fixture files declare the same id.
    #[error(
        "duplicate fixture id '{id}' in {} and {}\n  To fix: fixture ids must be unique across the corpus",
        first.display(),
        second.display()
    )]
    DuplicateFixture {
        /// The repeated id.
        id: String,
        /// First file declaring it.
        first: PathBuf,
        /// Second file declaring it.
        second: PathBuf,
    },

    /// A fixture requested by id is not in the corpus.
    #[error("unknown fixture '{id}'\n  To fix: run `feval fixtures` to list available ids")]
    UnknownFixture {
        /// The requested id.
        id: String,
    },

    /// The selection (ids and tags) matched nothing.
    #[error("no fixtures matched the selection ({selection})")]
    EmptySelection {
        /// Rendered selection criteria.
        selection: String,
    },

    /// The baseline file exists but cannot be read or parsed.
    #[error(
        "baseline {} is unreadable: {detail}\n  To fix: restore the file, or re-capture it with `feval capture`",
        path.display()
    )]
    UnreadableBaseline {
        /// Path to the baseline file.
        path: PathBuf,
        /// Human-readable description of the problem.
        detail: String,
    },

    /// The judge was requested but no judge client is configured.
    #[error(
        "judge requested but unavailable: {detail}\n  To fix: set [judge] command in feval.toml, or run with --no-judge"
    )]
    JudgeUnavailable {
        /// Why the judge cannot be constructed.
        detail: String,
    },

    /// No generation client could be constructed.
    #[error(
        "no generator configured\n  To fix: set [generator] command in feval.toml, or pass --replay <dir>"
    )]
    NoGenerator,

    /// The configuration file could not be read or parsed.
    #[error("config error in {}: {detail}", path.display())]
    Config {
        /// Path to the configuration file.
        path: PathBuf,
        /// Human-readable description of the problem.
        detail: String,
    },

    /// A configuration value is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Writing the baseline file failed.
    #[error("failed to write baseline {}: {detail}", path.display())]
    BaselineWrite {
        /// Target path.
        path: PathBuf,
        /// Human-readable description of the problem.
        detail: String,
    },

    /// An I/O error outside the cases above.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// CallError
// ---------------------------------------------------------------------------

/// Typed failure of one generation or judge call.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CallError {
    /// The call did not complete within the per-call timeout.
    #[error("call timed out after {secs}s")]
    Timeout {
        /// Timeout that elapsed.
        secs: u64,
    },

    /// The service asked us to slow down.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Network or process-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered but the payload is not usable JSON.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The service refused the request; retrying will not help.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The run was aborted before the call could finish.
    #[error("cancelled: {0}")]
    Cancelled(String),
}

impl CallError {
    /// Whether a retry could plausibly succeed. Malformed replies count.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::RateLimited(_) | Self::Transport(_) | Self::Malformed(_)
        )
    }

    /// Short machine-readable kind, used in logs and check values.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::RateLimited(_) => "rate_limited",
            Self::Transport(_) => "transport",
            Self::Malformed(_) => "malformed",
            Self::Rejected(_) => "rejected",
            Self::Cancelled(_) => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(CallError::Timeout { secs: 5 }.is_transient());
        assert!(CallError::RateLimited("slow down".into()).is_transient());
        assert!(CallError::Transport("connection reset".into()).is_transient());
        assert!(CallError::Malformed("not json".into()).is_transient());
        assert!(!CallError::Rejected("content policy".into()).is_transient());
        assert!(!CallError::Cancelled("run aborted".into()).is_transient());
    }

    #[test]
    fn messages_carry_fix_guidance() {
        let err = HarnessError::MissingCorpus {
            path: PathBuf::from("fixtures"),
            detail: "directory does not exist".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("fixtures"));
        assert!(msg.contains("To fix"));

        let err = HarnessError::JudgeUnavailable {
            detail: "no [judge] command".into(),
        };
        assert!(err.to_string().contains("--no-judge"));
    }

    #[test]
    fn call_error_kinds_are_stable() {
        assert_eq!(CallError::Timeout { secs: 1 }.kind(), "timeout");
        assert_eq!(CallError::Malformed(String::new()).kind(), "malformed");
    }
}
