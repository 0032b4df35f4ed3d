//! Check-cycle driver.
//!
//! One task runs everything: entities are checked strictly one after another, each check
//! being fetch -> diff -> commit -> notify. Cancellation is only observed between cycles;
//! an in-flight cycle always runs to completion.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::{Local, Utc};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    diff::{diff, DiffOutcome},
    domain::{ChangeCounts, CycleReport, EntityId},
    errors::Error,
    followers::fetcher::{FetchError, PagedFetcher},
    formatting::NotificationFormatter,
    health,
    messaging::dispatcher::RateLimitedDispatcher,
    retry::{retry, Backoff, RetryDecision, RetryError, RetryPolicy},
    snapshot::SnapshotStore,
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct SchedulerSettings {
    /// Target time between cycle starts.
    pub check_interval: Duration,
    /// Floor for the pause between cycles, however long a cycle took.
    pub min_cycle_delay: Duration,
    pub entity_attempts: u32,
    pub entity_retry_delay: Duration,
    pub inter_entity_delay: Duration,
    /// Consecutive failed cycles that trigger an escalation alert and a cool-down.
    pub escalation_threshold: u32,
    pub escalation_cooldown: Duration,
}

impl SchedulerSettings {
    pub fn with_interval(check_interval: Duration) -> Self {
        Self {
            check_interval,
            ..Self::default()
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(300),
            min_cycle_delay: Duration::from_secs(60),
            entity_attempts: 3,
            entity_retry_delay: Duration::from_secs(300),
            inter_entity_delay: Duration::from_secs(1),
            escalation_threshold: 3,
            escalation_cooldown: Duration::from_secs(300),
        }
    }
}

/// Pause before the next cycle: whatever is left of the interval, but never below `floor`.
pub fn next_cycle_delay(interval: Duration, elapsed: Duration, floor: Duration) -> Duration {
    interval.saturating_sub(elapsed).max(floor)
}

/// What to do about a failed cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FailureAction {
    pub alert: bool,
    pub escalate: bool,
}

/// Counts consecutive failed cycles: alert on the first, escalate (and reset) at the threshold.
#[derive(Debug)]
pub struct FailureTracker {
    threshold: u32,
    consecutive: u32,
}

impl FailureTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive: 0,
        }
    }

    pub fn on_success(&mut self) {
        self.consecutive = 0;
    }

    pub fn on_failure(&mut self) -> FailureAction {
        self.consecutive += 1;
        let action = FailureAction {
            alert: self.consecutive == 1,
            escalate: self.consecutive >= self.threshold,
        };
        if action.escalate {
            self.consecutive = 0;
        }
        action
    }
}

pub struct Scheduler {
    entities: Vec<EntityId>,
    fetcher: PagedFetcher,
    store: SnapshotStore,
    dispatcher: Arc<RateLimitedDispatcher>,
    formatter: NotificationFormatter,
    settings: SchedulerSettings,
    last_beat: Mutex<Option<Instant>>,
}

impl Scheduler {
    pub fn new(
        entities: Vec<EntityId>,
        fetcher: PagedFetcher,
        store: SnapshotStore,
        dispatcher: Arc<RateLimitedDispatcher>,
        formatter: NotificationFormatter,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            entities,
            fetcher,
            store,
            dispatcher,
            formatter,
            settings,
            last_beat: Mutex::new(None),
        }
    }

    /// Refresh the liveness heartbeat. Called at every point the loop is known to be
    /// making progress, so no single wait can outlast the staleness window.
    fn beat(&self) {
        if let Err(e) =
            health::write_heartbeat(self.store.dir(), Utc::now(), self.settings.check_interval)
        {
            warn!(error = %e, "failed to write heartbeat");
        }
        if let Ok(mut last) = self.last_beat.lock() {
            *last = Some(Instant::now());
        }
    }

    /// Loop until `cancel` fires. Never returns on its own.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            entities = self.entities.len(),
            interval_secs = self.settings.check_interval.as_secs(),
            "scheduler started"
        );
        let mut failures = FailureTracker::new(self.settings.escalation_threshold);
        self.beat();

        while !cancel.is_cancelled() {
            let started = Instant::now();
            let outcome = self.run_cycle().await;
            let elapsed = started.elapsed();
            let mut delay = next_cycle_delay(
                self.settings.check_interval,
                elapsed,
                self.settings.min_cycle_delay,
            );

            match outcome {
                Ok(report) => {
                    failures.on_success();
                    let totals = report.totals();
                    info!(
                        checked = report.checked(),
                        total = report.total(),
                        joined = totals.joined,
                        left = totals.left,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "cycle complete"
                    );
                }
                Err(e) => {
                    let action = failures.on_failure();
                    error!(error = %e, elapsed_ms = elapsed.as_millis() as u64, "cycle failed");
                    if action.alert {
                        self.dispatcher
                            .send(&self.formatter.cycle_failure_alert(&e.to_string()))
                            .await;
                    }
                    if action.escalate {
                        let cooldown = self.settings.escalation_cooldown;
                        warn!(
                            threshold = self.settings.escalation_threshold,
                            cooldown_secs = cooldown.as_secs(),
                            "repeated cycle failures, cooling down"
                        );
                        self.dispatcher
                            .send(&self.formatter.escalation_alert(
                                self.settings.escalation_threshold,
                                cooldown,
                            ))
                            .await;
                        delay = delay.max(cooldown);
                    }
                }
            }

            self.beat();

            debug!(delay_secs = delay.as_secs(), "sleeping until next cycle");
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }

        info!("scheduler stopped");
    }

    /// Check every entity once, then send the cycle summary.
    ///
    /// The summary goes out when something changed or when every entity was checked, so
    /// a quiet summary always means "all checked, nothing changed". Fails only when no
    /// entity at all could be checked.
    ///
    /// A cycle with no changes and at least one unchecked entity sends no summary; the
    /// per-entity failure alert is the only message for it.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let mut report = CycleReport::default();

        for (idx, entity) in self.entities.iter().enumerate() {
            if idx > 0 {
                sleep(self.settings.inter_entity_delay).await;
            }
            self.beat();
            let counts = self.check_entity_with_retry(entity).await;
            report.outcomes.push((entity.clone(), counts));
        }

        if report.has_changes() || report.all_checked() {
            self.dispatcher
                .send(&self.formatter.cycle_summary(&report))
                .await;
        }

        if report.total() > 0 && report.checked() == 0 {
            return Err(Error::CycleFailed(format!(
                "none of {} account(s) could be checked",
                report.total()
            )));
        }
        Ok(report)
    }

    async fn check_entity_with_retry(&self, entity: &EntityId) -> Option<ChangeCounts> {
        let policy = RetryPolicy::new(
            self.settings.entity_attempts,
            Backoff::Fixed(self.settings.entity_retry_delay),
        );
        let res = retry(
            &policy,
            move |_| self.check_entity(entity),
            |err: &Error, attempt| {
                warn!(entity = %entity, attempt, error = %err, "account check failed");
                self.beat();
                RetryDecision::Retry
            },
        )
        .await;

        match res {
            Ok(counts) => Some(counts),
            Err(RetryError { attempts, error }) => {
                error!(entity = %entity, attempts, error = %error, "giving up on account for this cycle");
                self.dispatcher
                    .send(&self.formatter.entity_failure_alert(
                        entity,
                        attempts,
                        &error.to_string(),
                    ))
                    .await;
                None
            }
        }
    }

    /// Fetch, diff, commit, notify. The snapshot only moves once the full list is in hand.
    pub async fn check_entity(&self, entity: &EntityId) -> Result<ChangeCounts> {
        let fresh = self.fetcher.fetch_all(entity).await?;
        let prior = self.store.get(entity).await;

        let DiffOutcome { changes, next } = diff(&prior, &fresh);
        if next.members.is_empty() {
            return Err(FetchError::NoUsableMembers {
                entity: entity.clone(),
            }
            .into());
        }
        self.store.commit(entity, next).await?;

        let counts = changes.counts();
        info!(
            entity = %entity,
            joined = counts.joined,
            left = counts.left,
            "account checked"
        );

        let at = Local::now();
        let messages: Vec<String> = changes
            .joined
            .iter()
            .map(|r| self.formatter.join_message(entity, r, at))
            .chain(
                changes
                    .left
                    .iter()
                    .map(|r| self.formatter.leave_message(entity, r, at)),
            )
            .collect();
        if !messages.is_empty() {
            let sent = self.dispatcher.send_batch(&messages).await;
            if sent.failed > 0 {
                warn!(entity = %entity, failed = sent.failed, sent = sent.sent, "some notifications were dropped");
            }
        }

        Ok(counts)
    }
}
