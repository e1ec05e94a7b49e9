//! Record Change Orchestrator
//!
//! Submits the single-change batch for a validation record and, for creates,
//! waits until the provider reports the change INSYNC on every authoritative
//! server. Deletes return as soon as the batch is accepted.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::{Sleeper, TokioSleeper};
use crate::error::{HookError, HookResult, Stage};
use crate::policy::{PollPolicy, RetryPolicy};
use crate::provider::DnsProvider;
use crate::types::{record_name, ChangeAction, ChangeBatch, ChangeStatus, ValidationRecord};

/// What a completed invocation did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeOutcome {
    pub zone_id: String,
    pub action: ChangeAction,
    /// None when a delete found nothing to remove
    pub change_id: Option<String>,
    pub status: ChangeStatus,
    /// Number of change status queries made
    pub polls: u32,
}

/// Build the one-change batch for `domain`
pub fn build_change_batch(action: ChangeAction, domain: &str, token: &str) -> ChangeBatch {
    ChangeBatch::single(action, ValidationRecord::for_challenge(domain, token))
}

pub struct RecordChangeOrchestrator {
    provider: Arc<dyn DnsProvider>,
    sleeper: Arc<dyn Sleeper>,
    poll: PollPolicy,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl RecordChangeOrchestrator {
    pub fn new(provider: Arc<dyn DnsProvider>) -> Self {
        Self {
            provider,
            sleeper: Arc::new(TokioSleeper),
            poll: PollPolicy::default(),
            retry: RetryPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Token that aborts propagation polling when cancelled
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Create or delete the validation record for `domain` in `zone_id`.
    ///
    /// `token` is required for creates. A delete without a token removes
    /// the TXT value currently published at the record name, if any.
    pub async fn apply(
        &self,
        action: ChangeAction,
        zone_name: &str,
        zone_id: &str,
        domain: &str,
        token: Option<&str>,
    ) -> HookResult<ChangeOutcome> {
        let batch = match (action, token) {
            (_, Some(token)) => build_change_batch(action, domain, token),
            (ChangeAction::Create, None) => {
                return Err(HookError::MalformedInput(format!(
                    "validation token is required to create the challenge record for {}",
                    domain
                )));
            }
            (ChangeAction::Delete, None) => match self.published_batch(zone_id, domain).await? {
                Some(batch) => batch,
                None => {
                    info!(
                        domain = %domain,
                        zone_id = %zone_id,
                        "No challenge record published, nothing to delete"
                    );
                    return Ok(ChangeOutcome {
                        zone_id: zone_id.to_string(),
                        action,
                        change_id: None,
                        status: ChangeStatus::InSync,
                        polls: 0,
                    });
                }
            },
        };

        info!(
            "Processing recordset \"{}\" {} request for zone ID {}",
            zone_name, action, zone_id
        );

        let submitted = self
            .retry
            .run(self.sleeper.as_ref(), &self.cancel, Stage::Submission, || {
                self.provider.submit_change_batch(zone_id, &batch)
            })
            .await?;

        debug!(change_id = %submitted.id, status = %submitted.status, "Change batch accepted");

        let mut outcome = ChangeOutcome {
            zone_id: zone_id.to_string(),
            action,
            change_id: Some(submitted.id.clone()),
            status: submitted.status,
            polls: 0,
        };

        if action == ChangeAction::Create && submitted.status == ChangeStatus::Pending {
            outcome.polls = self.wait_for_sync(&submitted.id).await?;
            outcome.status = ChangeStatus::InSync;
        }

        Ok(outcome)
    }

    /// Delete batch for the TXT value currently published at the record name
    async fn published_batch(
        &self,
        zone_id: &str,
        domain: &str,
    ) -> HookResult<Option<ChangeBatch>> {
        let name = record_name(domain);
        let values = self
            .retry
            .run(self.sleeper.as_ref(), &self.cancel, Stage::Submission, || {
                self.provider.find_txt_values(zone_id, &name)
            })
            .await?;

        if values.is_empty() {
            return Ok(None);
        }

        if values.len() > 1 {
            return Err(HookError::MalformedInput(format!(
                "{} TXT values are published at {}, pass the validation token to pick one",
                values.len(),
                name
            )));
        }

        let batch = ChangeBatch::single(
            ChangeAction::Delete,
            ValidationRecord::with_quoted_value(domain, values[0].clone()),
        );

        Ok(Some(batch))
    }

    /// Poll until INSYNC, returning the number of status queries made.
    ///
    /// The wait is bounded by both the slept intervals and the wall clock,
    /// whichever reaches `max_wait` first.
    async fn wait_for_sync(&self, change_id: &str) -> HookResult<u32> {
        let interval = self.poll.effective_interval();
        let started = Instant::now();
        let mut polls = 0;
        let mut waited = Duration::ZERO;

        loop {
            if self.cancel.is_cancelled() {
                return Err(self.timeout(change_id, waited, true));
            }

            let status = match self
                .retry
                .run(self.sleeper.as_ref(), &self.cancel, Stage::Polling, || {
                    self.provider.get_change_status(change_id)
                })
                .await
            {
                Ok(status) => status,
                Err(HookError::Cancelled { .. }) => {
                    return Err(self.timeout(change_id, waited, true));
                }
                Err(e) => return Err(e),
            };
            polls += 1;

            debug!(change_id = %change_id, status = %status, polls, "Polled change status");

            if status == ChangeStatus::InSync {
                info!(change_id = %change_id, waited = ?waited, "Change is in sync");
                return Ok(polls);
            }

            waited = waited.max(started.elapsed());
            if waited >= self.poll.max_wait {
                return Err(self.timeout(change_id, waited, false));
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return Err(self.timeout(change_id, waited, true));
                }
                _ = self.sleeper.sleep(interval) => {}
            }
            waited += interval;
        }
    }

    fn timeout(&self, change_id: &str, waited: Duration, cancelled: bool) -> HookError {
        warn!(
            change_id = %change_id,
            waited = ?waited,
            cancelled,
            "Gave up waiting for propagation"
        );
        HookError::PropagationTimeout {
            change_id: change_id.to_string(),
            waited,
            cancelled,
        }
    }
}
