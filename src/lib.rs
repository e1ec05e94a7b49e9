//! Route53 ACME Hook Library
//!
//! Publishes and removes `_acme-challenge` TXT records in Route53 for
//! certbot's DNS-01 manual auth and cleanup hooks, waiting for the record
//! to reach every authoritative server before certbot asks the CA to check.

pub mod clock;
pub mod config;
pub mod credentials;
pub mod error;
pub mod hook;
pub mod orchestrator;
pub mod policy;
pub mod provider;
pub mod resolver;
pub mod route53;
pub mod sigv4;
pub mod types;

pub use config::{HookArgs, HookConfig};
pub use credentials::AwsCredentials;
pub use error::{HookError, HookResult, Stage};
pub use hook::ChallengeHook;
pub use orchestrator::{ChangeOutcome, RecordChangeOrchestrator};
pub use policy::{PollPolicy, RetryPolicy};
pub use provider::DnsProvider;
pub use resolver::{ZoneMap, ZoneResolver};
pub use route53::Route53Client;
pub use types::{ChangeAction, ChangeStatus};
