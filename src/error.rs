//! Hook Error Types
//!
//! Every failure names the stage it happened in so an operator reading the
//! certbot log can tell a missing zone from a provider outage.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Pipeline stage a failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolution,
    Submission,
    Polling,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Resolution => write!(f, "zone resolution"),
            Stage::Submission => write!(f, "change submission"),
            Stage::Polling => write!(f, "propagation polling"),
        }
    }
}

/// Errors surfaced by a single hook invocation
#[derive(Debug, Error)]
pub enum HookError {
    /// No resolution tier produced a zone id
    #[error("Zone not found: could not identify hosted zone ID for zone {zone_name}")]
    ZoneNotFound { zone_name: String },

    /// A provider API call failed
    #[error("Transport error during {stage}: {message}")]
    Transport {
        stage: Stage,
        message: String,
        retryable: bool,
    },

    /// The change never reached INSYNC within the allowed wait
    #[error("Propagation timeout: change {change_id} not in sync after {waited:?}{}", cancelled_suffix(.cancelled))]
    PropagationTimeout {
        change_id: String,
        waited: Duration,
        cancelled: bool,
    },

    /// The invocation was cancelled before the stage finished
    #[error("Cancelled during {stage}")]
    Cancelled { stage: Stage },

    /// Required invocation parameters missing or invalid
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Zone map file or credentials could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),
}

impl HookError {
    /// Stage the error belongs to, if it came from the pipeline
    pub fn stage(&self) -> Option<Stage> {
        match self {
            HookError::ZoneNotFound { .. } => Some(Stage::Resolution),
            HookError::Transport { stage, .. } => Some(*stage),
            HookError::PropagationTimeout { .. } => Some(Stage::Polling),
            HookError::Cancelled { stage } => Some(*stage),
            HookError::MalformedInput(_) | HookError::Config(_) => None,
        }
    }

    /// Whether retrying the same call could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, HookError::Transport { retryable: true, .. })
    }

    /// Re-tag a transport error with the stage it was observed in
    pub(crate) fn at_stage(self, at: Stage) -> Self {
        match self {
            HookError::Transport {
                message, retryable, ..
            } => HookError::Transport {
                stage: at,
                message,
                retryable,
            },
            other => other,
        }
    }
}

fn cancelled_suffix(cancelled: &bool) -> &'static str {
    if *cancelled {
        " (cancelled)"
    } else {
        ""
    }
}

pub type HookResult<T> = std::result::Result<T, HookError>;
