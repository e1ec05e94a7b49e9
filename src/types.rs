//! Challenge Record Types
//!
//! Provider-neutral shapes for zones, validation records and change batches.

use std::fmt;

/// Label prepended to the domain for DNS-01 validation records
pub const CHALLENGE_LABEL: &str = "_acme-challenge";

/// TTL for validation records; short so resolvers drop them after validation
pub const VALIDATION_TTL: u32 = 300;

/// Comment attached to every submitted change batch
pub const CHANGE_COMMENT: &str = "add records for cert update";

/// A hosted zone as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    /// Zone name, possibly with a trailing root dot (e.g. "example.com.")
    pub name: String,
    /// Opaque provider identifier
    pub id: String,
}

impl Zone {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
        }
    }

    /// Zone name without the trailing root separator
    pub fn canonical_name(&self) -> &str {
        self.name.strip_suffix('.').unwrap_or(&self.name)
    }
}

/// The only two mutations the hook performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    Create,
    Delete,
}

impl ChangeAction {
    /// Cleanup-signal presence selects Delete
    pub fn from_cleanup_signal(present: bool) -> Self {
        if present {
            ChangeAction::Delete
        } else {
            ChangeAction::Create
        }
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeAction::Create => write!(f, "CREATE"),
            ChangeAction::Delete => write!(f, "DELETE"),
        }
    }
}

/// Propagation state of a submitted change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeStatus {
    Pending,
    InSync,
}

impl ChangeStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(ChangeStatus::Pending),
            "INSYNC" => Some(ChangeStatus::InSync),
            _ => None,
        }
    }
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeStatus::Pending => write!(f, "PENDING"),
            ChangeStatus::InSync => write!(f, "INSYNC"),
        }
    }
}

/// The TXT record proving control of a domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationRecord {
    pub name: String,
    /// Already quoted, as TXT values must be
    pub value: String,
    pub ttl: u32,
}

impl ValidationRecord {
    /// Build the record for `domain` carrying `token`
    pub fn for_challenge(domain: &str, token: &str) -> Self {
        Self {
            name: record_name(domain),
            value: quote_txt(token),
            ttl: VALIDATION_TTL,
        }
    }

    /// Build the record from a value that is already quoted
    pub fn with_quoted_value(domain: &str, value: impl Into<String>) -> Self {
        Self {
            name: record_name(domain),
            value: value.into(),
            ttl: VALIDATION_TTL,
        }
    }
}

/// `_acme-challenge.<domain>`
pub fn record_name(domain: &str) -> String {
    format!("{}.{}", CHALLENGE_LABEL, domain)
}

/// Wrap a TXT value in literal double quotes
pub fn quote_txt(value: &str) -> String {
    format!("\"{}\"", value)
}

/// One action applied to one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordChange {
    pub action: ChangeAction,
    pub record: ValidationRecord,
}

/// An atomic batch of record changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeBatch {
    pub comment: String,
    pub changes: Vec<RecordChange>,
}

impl ChangeBatch {
    /// A batch carrying exactly one change
    pub fn single(action: ChangeAction, record: ValidationRecord) -> Self {
        Self {
            comment: CHANGE_COMMENT.to_string(),
            changes: vec![RecordChange { action, record }],
        }
    }
}

/// Provider acknowledgment of a submitted batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeInfo {
    pub id: String,
    pub status: ChangeStatus,
}
