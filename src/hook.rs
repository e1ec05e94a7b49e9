//! One certbot hook invocation: resolve the zone, then apply the change.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::clock::{Sleeper, TokioSleeper};
use crate::config::HookConfig;
use crate::error::HookResult;
use crate::orchestrator::{ChangeOutcome, RecordChangeOrchestrator};
use crate::policy::RetryPolicy;
use crate::provider::DnsProvider;
use crate::resolver::ZoneResolver;

pub struct ChallengeHook {
    config: HookConfig,
    provider: Arc<dyn DnsProvider>,
    sleeper: Arc<dyn Sleeper>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl ChallengeHook {
    pub fn new(config: HookConfig, provider: Arc<dyn DnsProvider>) -> Self {
        Self {
            config,
            provider,
            sleeper: Arc::new(TokioSleeper),
            retry: RetryPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &HookConfig {
        &self.config
    }

    pub async fn run(&self) -> HookResult<ChangeOutcome> {
        let zone_name = self.config.zone_name();

        info!(
            domain = %self.config.domain,
            zone = %zone_name,
            action = %self.config.action,
            provider = self.provider.provider_name(),
            "Running challenge hook"
        );

        let zone_id = ZoneResolver::new(
            self.config.zone_id_override.clone(),
            self.config.zone_map.clone(),
        )
        .with_retry(self.retry, self.sleeper.clone())
        .with_cancellation(self.cancel.clone())
        .resolve(self.provider.as_ref(), &zone_name)
        .await?;

        RecordChangeOrchestrator::new(self.provider.clone())
            .with_sleeper(self.sleeper.clone())
            .with_poll_policy(self.config.poll)
            .with_retry_policy(self.retry)
            .with_cancellation(self.cancel.clone())
            .apply(
                self.config.action,
                &zone_name,
                &zone_id,
                &self.config.domain,
                self.config.validation.as_deref(),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::fake::RecordingSleeper;
    use crate::error::{HookError, Stage};
    use crate::policy::PollPolicy;
    use crate::provider::fake::FakeProvider;
    use crate::resolver::ZoneMap;
    use crate::types::{ChangeAction, ChangeStatus, Zone};
    use std::time::Duration;

    fn config(action: ChangeAction, validation: Option<&str>) -> HookConfig {
        HookConfig {
            domain: "www.example.com".to_string(),
            validation: validation.map(str::to_string),
            action,
            zone_id_override: None,
            zone_map: ZoneMap::new(),
            region: "us-east-1".to_string(),
            endpoint: None,
            poll: PollPolicy {
                interval: Duration::from_secs(5),
                max_wait: Duration::from_secs(300),
            },
        }
    }

    fn build_hook(
        config: HookConfig,
        provider: Arc<FakeProvider>,
    ) -> (ChallengeHook, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::default());
        let hook = ChallengeHook::new(config, provider).with_sleeper(sleeper.clone());
        (hook, sleeper)
    }

    #[tokio::test]
    async fn test_create_resolves_from_listing_and_waits() {
        let provider = Arc::new(
            FakeProvider::with_zones(vec![Zone::new("example.com.", "Z1")]).script_polls(vec![
                Ok(ChangeStatus::Pending),
                Ok(ChangeStatus::InSync),
            ]),
        );
        let (hook, sleeper) =
            build_hook(config(ChangeAction::Create, Some("tok")), provider.clone());

        let outcome = hook.run().await.unwrap();

        assert_eq!(outcome.zone_id, "Z1");
        assert_eq!(outcome.status, ChangeStatus::InSync);
        assert_eq!(outcome.polls, 2);
        assert_eq!(sleeper.waits(), vec![Duration::from_secs(5)]);

        let submitted = provider.submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].0, "Z1");
        let record = &submitted[0].1.changes[0].record;
        assert_eq!(record.name, "_acme-challenge.www.example.com");
        assert_eq!(record.value, "\"tok\"");
    }

    #[tokio::test]
    async fn test_override_skips_listing() {
        let provider = Arc::new(FakeProvider::submitting(ChangeStatus::InSync));
        let mut config = config(ChangeAction::Create, Some("tok"));
        config.zone_id_override = Some("ZOVERRIDE".to_string());
        let (hook, _) = build_hook(config, provider.clone());

        let outcome = hook.run().await.unwrap();

        assert_eq!(outcome.zone_id, "ZOVERRIDE");
        assert_eq!(provider.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_zone_submits_nothing() {
        let provider = Arc::new(FakeProvider::with_zones(vec![Zone::new("other.org.", "Z9")]));
        let (hook, _) = build_hook(config(ChangeAction::Create, Some("tok")), provider.clone());

        let err = hook.run().await.unwrap_err();

        assert!(
            matches!(err, HookError::ZoneNotFound { ref zone_name } if zone_name == "example.com")
        );
        assert!(provider.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_with_token_does_not_poll() {
        let provider = Arc::new(FakeProvider::with_zones(vec![Zone::new("example.com.", "Z1")]));
        let (hook, sleeper) =
            build_hook(config(ChangeAction::Delete, Some("tok")), provider.clone());

        let outcome = hook.run().await.unwrap();

        assert_eq!(outcome.action, ChangeAction::Delete);
        assert_eq!(outcome.polls, 0);
        assert_eq!(provider.poll_calls(), 0);
        assert!(sleeper.waits().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_resolution_touches_nothing() {
        let provider = Arc::new(FakeProvider::with_zones(vec![Zone::new("example.com.", "Z1")]));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (hook, _) = build_hook(config(ChangeAction::Create, Some("tok")), provider.clone());
        let hook = hook.with_cancellation(cancel);

        let err = hook.run().await.unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Resolution));
        assert!(matches!(err, HookError::Cancelled { .. }));
        assert_eq!(provider.list_calls(), 0);
        assert!(provider.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_sync_reports_timeout() {
        let cancel = CancellationToken::new();
        let provider = Arc::new(
            FakeProvider::with_zones(vec![Zone::new("example.com.", "Z1")])
                .script_polls(vec![Ok(ChangeStatus::Pending)])
                .cancel_on_submit(cancel.clone()),
        );
        let (hook, _) = build_hook(config(ChangeAction::Create, Some("tok")), provider);
        let hook = hook.with_cancellation(cancel);

        let err = hook.run().await.unwrap_err();

        assert!(matches!(err, HookError::PropagationTimeout { cancelled: true, .. }));
        assert_eq!(err.stage(), Some(Stage::Polling));
    }
}
