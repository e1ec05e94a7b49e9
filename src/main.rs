//! Route53 ACME Hook
//!
//! Certbot manual hook that answers DNS-01 challenges from Route53.
//!
//! # Usage
//! ```bash
//! certbot certonly --manual --preferred-challenges dns \
//!     --manual-auth-hook route53-acme-hook \
//!     --manual-cleanup-hook route53-acme-hook \
//!     -d www.example.com
//! ```
//!
//! Certbot provides `CERTBOT_DOMAIN` and `CERTBOT_VALIDATION`; the cleanup
//! run is recognised by the presence of `CERTBOT_AUTH_OUTPUT`.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use route53_acme_hook::config::cleanup_signal_present;
use route53_acme_hook::{
    AwsCredentials, ChallengeHook, DnsProvider, HookArgs, HookConfig, Route53Client,
};

// ============================================================
// Logging
// ============================================================

fn init_tracing(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    // stdout is captured by certbot as CERTBOT_AUTH_OUTPUT, keep it clean
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

// ============================================================
// Main Entry Point
// ============================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = HookArgs::parse();
    init_tracing(args.verbose)?;

    let config = HookConfig::from_args(args, cleanup_signal_present())?;
    let domain = config.domain.clone();
    let action = config.action;

    info!("🚀 Route53 ACME hook starting ({} for {})", action, domain);

    let credentials = AwsCredentials::from_env().context("Failed to load AWS credentials")?;
    let client = match &config.endpoint {
        Some(endpoint) => Route53Client::with_endpoint(credentials, &config.region, endpoint)?,
        None => Route53Client::new(credentials, &config.region)?,
    };
    let provider: Arc<dyn DnsProvider> = Arc::new(client);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Interrupted, cancelling hook");
            on_signal.cancel();
        }
    });

    let outcome = ChallengeHook::new(config, provider)
        .with_cancellation(cancel)
        .run()
        .await
        .with_context(|| format!("Challenge hook failed: {} for {}", action, domain))?;

    match &outcome.change_id {
        Some(change_id) => info!(
            "✅ {} for {} complete in zone {} (change {}, {}, {} polls)",
            action, domain, outcome.zone_id, change_id, outcome.status, outcome.polls
        ),
        None => info!("✅ Nothing to clean up for {}", domain),
    }

    Ok(())
}
