//! Hook Configuration
//!
//! Certbot passes everything through `CERTBOT_*` environment variables. They
//! are read once, at the edge, into a typed [`HookConfig`]; nothing deeper in
//! the crate looks at process state.
//!
//! Zone resolution precedence: `--zone-id` override, then the `--zone-map`
//! file, then the provider's zone listing. A zone map path that does not
//! exist is treated as an empty map.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{HookError, HookResult};
use crate::policy::PollPolicy;
use crate::resolver::{derive_zone_name, ZoneMap};
use crate::types::ChangeAction;

/// Set by certbot only when running the cleanup hook
pub const CLEANUP_SIGNAL_VAR: &str = "CERTBOT_AUTH_OUTPUT";

/// Route53 DNS-01 hook for certbot manual auth/cleanup
#[derive(Parser, Debug, Clone)]
#[command(name = "route53-acme-hook", version, about, long_about = None)]
pub struct HookArgs {
    /// Domain being validated
    #[arg(long, env = "CERTBOT_DOMAIN")]
    pub domain: Option<String>,

    /// ACME validation token to publish
    #[arg(long, env = "CERTBOT_VALIDATION")]
    pub validation: Option<String>,

    /// Hosted zone ID, skips zone lookup entirely
    #[arg(long, env = "CERTBOT_ZONE_ID")]
    pub zone_id: Option<String>,

    /// Delete the record instead of creating it (implied when CERTBOT_AUTH_OUTPUT is set)
    #[arg(long)]
    pub cleanup: bool,

    /// JSON file mapping zone names to hosted zone IDs
    #[arg(long, env = "ACME_HOOK_ZONE_MAP")]
    pub zone_map: Option<PathBuf>,

    /// AWS region used for request signing
    #[arg(long, env = "AWS_REGION", default_value = "us-east-1")]
    pub region: String,

    /// Route53 API endpoint override
    #[arg(long, env = "ROUTE53_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Seconds between change status polls
    #[arg(long, env = "ACME_HOOK_POLL_INTERVAL", default_value = "5")]
    pub poll_interval: u64,

    /// Maximum seconds to wait for the record to propagate
    #[arg(long, env = "ACME_HOOK_MAX_WAIT", default_value = "300")]
    pub max_wait: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Everything one invocation needs, validated
#[derive(Debug, Clone)]
pub struct HookConfig {
    pub domain: String,
    pub validation: Option<String>,
    pub action: ChangeAction,
    pub zone_id_override: Option<String>,
    pub zone_map: ZoneMap,
    pub region: String,
    pub endpoint: Option<String>,
    pub poll: PollPolicy,
}

/// Whether certbot is running us as the cleanup hook
pub fn cleanup_signal_present() -> bool {
    // Presence matters, not content: the auth hook output may be empty.
    std::env::var_os(CLEANUP_SIGNAL_VAR).is_some()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl HookConfig {
    /// Validate parsed arguments. `cleanup` selects Delete.
    pub fn from_args(args: HookArgs, cleanup: bool) -> HookResult<Self> {
        let domain = non_empty(args.domain).ok_or_else(|| {
            HookError::MalformedInput("domain is required (--domain or CERTBOT_DOMAIN)".to_string())
        })?;

        let action = ChangeAction::from_cleanup_signal(cleanup || args.cleanup);
        let validation = non_empty(args.validation);
        if action == ChangeAction::Create && validation.is_none() {
            return Err(HookError::MalformedInput(format!(
                "validation token is required to create the challenge record for {} \
                 (--validation or CERTBOT_VALIDATION)",
                domain
            )));
        }

        if args.poll_interval == 0 {
            return Err(HookError::MalformedInput(
                "poll interval must be at least one second".to_string(),
            ));
        }

        let zone_map = match &args.zone_map {
            Some(path) => ZoneMap::from_json_file_if_present(path)
                .map_err(|e| HookError::Config(format!("{:#}", e)))?,
            None => ZoneMap::new(),
        };

        Ok(Self {
            domain,
            validation,
            action,
            zone_id_override: non_empty(args.zone_id),
            zone_map,
            region: args.region,
            endpoint: non_empty(args.endpoint),
            poll: PollPolicy {
                interval: Duration::from_secs(args.poll_interval),
                max_wait: Duration::from_secs(args.max_wait),
            },
        })
    }

    /// Zone the record belongs in, derived from the domain
    pub fn zone_name(&self) -> String {
        derive_zone_name(&self.domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args(extra: &[&str]) -> HookArgs {
        let mut argv = vec!["route53-acme-hook"];
        argv.extend_from_slice(extra);
        HookArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_create_config() {
        let config = HookConfig::from_args(
            args(&["--domain", "www.example.com", "--validation", "tok"]),
            false,
        )
        .unwrap();

        assert_eq!(config.action, ChangeAction::Create);
        assert_eq!(config.zone_name(), "example.com");
        assert_eq!(config.validation.as_deref(), Some("tok"));
        assert!(config.zone_map.is_empty());
    }

    #[test]
    fn test_cleanup_selects_delete() {
        let config =
            HookConfig::from_args(args(&["--domain", "www.example.com", "--cleanup"]), false)
                .unwrap();
        assert_eq!(config.action, ChangeAction::Delete);

        let config = HookConfig::from_args(args(&["--domain", "www.example.com"]), true).unwrap();
        assert_eq!(config.action, ChangeAction::Delete);
        assert_eq!(config.validation, None);
    }

    #[test]
    fn test_missing_domain_is_malformed() {
        let mut parsed = args(&["--validation", "tok"]);
        parsed.domain = None;

        let err = HookConfig::from_args(parsed, false).unwrap_err();

        assert!(matches!(err, HookError::MalformedInput(_)));
    }

    #[test]
    fn test_blank_domain_is_malformed() {
        let err = HookConfig::from_args(args(&["--domain", "  ", "--validation", "tok"]), false)
            .unwrap_err();

        assert!(matches!(err, HookError::MalformedInput(_)));
    }

    #[test]
    fn test_create_without_token_is_malformed() {
        let mut parsed = args(&["--domain", "www.example.com"]);
        parsed.validation = None;

        let err = HookConfig::from_args(parsed, false).unwrap_err();

        assert!(err.to_string().contains("www.example.com"));
    }

    #[test]
    fn test_zone_map_and_override_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"example.com": "Z123"}}"#).unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let config = HookConfig::from_args(
            args(&[
                "--domain",
                "www.example.com",
                "--validation",
                "tok",
                "--zone-map",
                &path,
                "--zone-id",
                "ZOVERRIDE",
                "--poll-interval",
                "2",
                "--max-wait",
                "30",
            ]),
            false,
        )
        .unwrap();

        assert_eq!(config.zone_map.get("example.com"), Some("Z123"));
        assert_eq!(config.zone_id_override.as_deref(), Some("ZOVERRIDE"));
        assert_eq!(config.poll.interval, Duration::from_secs(2));
        assert_eq!(config.poll.max_wait, Duration::from_secs(30));
    }

    #[test]
    fn test_missing_zone_map_falls_through() {
        let config = HookConfig::from_args(
            args(&[
                "--domain",
                "www.example.com",
                "--validation",
                "tok",
                "--zone-map",
                "/nonexistent/zones.json",
            ]),
            false,
        )
        .unwrap();

        assert!(config.zone_map.is_empty());
    }

    #[test]
    fn test_invalid_zone_map_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[1, 2, 3]").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let err = HookConfig::from_args(
            args(&[
                "--domain",
                "www.example.com",
                "--validation",
                "tok",
                "--zone-map",
                &path,
            ]),
            false,
        )
        .unwrap_err();

        assert!(matches!(err, HookError::Config(_)));
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let err = HookConfig::from_args(
            args(&[
                "--domain",
                "www.example.com",
                "--validation",
                "tok",
                "--poll-interval",
                "0",
            ]),
            false,
        )
        .unwrap_err();

        assert!(matches!(err, HookError::MalformedInput(_)));
    }
}
