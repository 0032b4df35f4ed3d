use std::{collections::VecDeque, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::{
    domain::ChatId,
    messaging::{
        port::MessagingPort,
        types::{BatchReport, ChannelError},
    },
    retry::{retry, Backoff, RetryDecision, RetryError, RetryPolicy},
};

const MINUTE: Duration = Duration::from_secs(60);
/// Wait step for rate-limit errors that carry no explicit duration.
const RATE_LIMITED_STEP: Duration = Duration::from_secs(60);
const RATE_LIMITED_CAP: Duration = Duration::from_secs(300);

#[derive(Clone, Copy, Debug)]
pub struct DispatchConfig {
    pub max_per_second: u32,
    /// Cap over any trailing 60 seconds.
    pub max_per_minute: u32,
    pub max_attempts: u32,
    /// Added on top of a channel-provided retry-after.
    pub backpressure_margin: Duration,
    /// Backoff for generic transient failures.
    pub transient_backoff: Backoff,
    /// Pause between consecutive messages of a batch.
    pub batch_spacing: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        // Telegram: ~1 msg/sec per chat, ~20 msg/min per group.
        Self {
            max_per_second: 1,
            max_per_minute: 20,
            max_attempts: 5,
            backpressure_margin: Duration::from_secs(1),
            transient_backoff: Backoff::Exponential {
                base: Duration::from_secs(1),
                cap: Duration::from_secs(300),
            },
            batch_spacing: Duration::from_millis(500),
        }
    }
}

/// Dual-budget send limiter: minimum spacing between sends plus a trailing-minute cap.
///
/// Slots are reserved up front (the caller sleeps until its slot), so state is updated
/// at reservation time rather than after the send.
#[derive(Debug)]
struct RateLimiterState {
    min_interval: Duration,
    per_minute: usize,
    last_send: Option<Instant>,
    window: VecDeque<Instant>,
}

impl RateLimiterState {
    fn new(cfg: &DispatchConfig) -> Self {
        Self {
            min_interval: Duration::from_secs(1) / cfg.max_per_second.max(1),
            per_minute: cfg.max_per_minute.max(1) as usize,
            last_send: None,
            window: VecDeque::new(),
        }
    }

    /// Reserve the next send slot and return how long to wait for it.
    fn reserve(&mut self, now: Instant) -> Duration {
        let mut start = now;
        if let Some(last) = self.last_send {
            start = start.max(last + self.min_interval);
        }

        self.prune(start);
        if self.window.len() >= self.per_minute {
            let idx = self.window.len() - self.per_minute;
            if let Some(oldest) = self.window.get(idx) {
                start = start.max(*oldest + MINUTE);
            }
            self.prune(start);
        }

        self.last_send = Some(start);
        self.window.push_back(start);
        start.saturating_duration_since(now)
    }

    fn prune(&mut self, at: Instant) {
        while self
            .window
            .front()
            .is_some_and(|t| *t + MINUTE <= at)
        {
            self.window.pop_front();
        }
    }
}

/// Best-effort, rate-limited delivery to one chat.
///
/// `send` never errors: channel failures are retried here and a message that still
/// can't be delivered is logged and dropped.
pub struct RateLimitedDispatcher {
    channel: Arc<dyn MessagingPort>,
    chat_id: ChatId,
    cfg: DispatchConfig,
    limiter: Mutex<RateLimiterState>,
}

impl RateLimitedDispatcher {
    pub fn new(channel: Arc<dyn MessagingPort>, chat_id: ChatId, cfg: DispatchConfig) -> Self {
        Self {
            channel,
            chat_id,
            limiter: Mutex::new(RateLimiterState::new(&cfg)),
            cfg,
        }
    }

    pub async fn send(&self, text: &str) -> bool {
        let policy = RetryPolicy::new(self.cfg.max_attempts, self.cfg.transient_backoff);
        let res = retry(
            &policy,
            move |attempt| self.attempt(text, attempt),
            |err, attempt| self.decide(err, attempt),
        )
        .await;

        match res {
            Ok(()) => {
                info!(chat = %self.chat_id.0, "notification sent");
                true
            }
            Err(RetryError { attempts, error }) => {
                error!(chat = %self.chat_id.0, attempts, error = %error, "giving up on notification");
                false
            }
        }
    }

    /// Send sequentially; one failed message doesn't hold back the rest.
    pub async fn send_batch(&self, texts: &[String]) -> BatchReport {
        let mut report = BatchReport::default();
        for (i, text) in texts.iter().enumerate() {
            if i > 0 {
                sleep(self.cfg.batch_spacing).await;
            }
            if self.send(text).await {
                report.sent += 1;
            } else {
                report.failed += 1;
            }
        }
        report
    }

    async fn attempt(&self, text: &str, attempt: u32) -> std::result::Result<(), ChannelError> {
        self.throttle().await;
        debug!(chat = %self.chat_id.0, attempt, "sending notification");
        self.channel.send_text(&self.chat_id, text).await
    }

    async fn throttle(&self) {
        let wait = { self.limiter.lock().await.reserve(Instant::now()) };
        if wait > Duration::from_millis(0) {
            debug!(wait_ms = wait.as_millis() as u64, "rate limit: waiting for send slot");
            sleep(wait).await;
        }
    }

    fn decide(&self, err: &ChannelError, attempt: u32) -> RetryDecision {
        warn!(chat = %self.chat_id.0, attempt, error = %err, "notification attempt failed");
        match err {
            ChannelError::RetryAfter(d) => RetryDecision::RetryAfter(*d + self.cfg.backpressure_margin),
            ChannelError::RateLimited(_) => {
                RetryDecision::RetryAfter(RATE_LIMITED_STEP.saturating_mul(attempt).min(RATE_LIMITED_CAP))
            }
            ChannelError::Transient(_) => RetryDecision::Retry,
            ChannelError::Permanent(_) => RetryDecision::GiveUp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    type Scripted = std::result::Result<(), ChannelError>;

    /// Pops scripted results (then succeeds) and records when each attempt happened.
    #[derive(Default)]
    struct FakeChannel {
        script: StdMutex<VecDeque<Scripted>>,
        attempts: StdMutex<Vec<(Instant, String)>>,
    }

    impl FakeChannel {
        fn scripted(results: Vec<Scripted>) -> Arc<Self> {
            Arc::new(Self {
                script: StdMutex::new(results.into_iter().collect()),
                attempts: StdMutex::default(),
            })
        }

        fn attempts(&self) -> Vec<(Instant, String)> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessagingPort for FakeChannel {
        async fn send_text(&self, _chat_id: &ChatId, text: &str) -> Scripted {
            self.attempts
                .lock()
                .unwrap()
                .push((Instant::now(), text.to_string()));
            self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
        }
    }

    fn dispatcher(channel: Arc<FakeChannel>, cfg: DispatchConfig) -> RateLimitedDispatcher {
        RateLimitedDispatcher::new(channel, ChatId("-100".to_string()), cfg)
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_waits_the_signal_plus_margin() {
        let channel = FakeChannel::scripted(vec![Err(ChannelError::RetryAfter(Duration::from_secs(5)))]);
        let d = dispatcher(channel.clone(), DispatchConfig::default());
        let start = Instant::now();

        assert!(d.send("hello").await);

        assert!(start.elapsed() >= Duration::from_secs(6));
        assert_eq!(channel.attempts().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_back_off_exponentially() {
        let channel = FakeChannel::scripted(vec![
            Err(ChannelError::Transient("reset".to_string())),
            Err(ChannelError::Transient("reset".to_string())),
        ]);
        let d = dispatcher(channel.clone(), DispatchConfig::default());

        assert!(d.send("hello").await);

        let at: Vec<Instant> = channel.attempts().into_iter().map(|(t, _)| t).collect();
        assert_eq!(at.len(), 3);
        assert!(at[1] - at[0] >= Duration::from_secs(1));
        assert!(at[2] - at[1] >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_without_duration_waits_a_minute_per_attempt() {
        let channel = FakeChannel::scripted(vec![
            Err(ChannelError::RateLimited("429".to_string())),
            Err(ChannelError::RateLimited("429".to_string())),
        ]);
        let d = dispatcher(channel.clone(), DispatchConfig::default());

        assert!(d.send("hello").await);

        let at: Vec<Instant> = channel.attempts().into_iter().map(|(t, _)| t).collect();
        assert!(at[1] - at[0] >= Duration::from_secs(60));
        assert!(at[2] - at[1] >= Duration::from_secs(120));
    }

    #[test]
    fn rate_limit_wait_is_capped() {
        let d = dispatcher(FakeChannel::scripted(vec![]), DispatchConfig::default());
        let err = ChannelError::RateLimited("429".to_string());
        assert_eq!(
            d.decide(&err, 9),
            RetryDecision::RetryAfter(Duration::from_secs(300))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let channel = FakeChannel::scripted(
            (0..10)
                .map(|_| Err(ChannelError::Transient("down".to_string())))
                .collect(),
        );
        let d = dispatcher(channel.clone(), DispatchConfig::default());

        assert!(!d.send("hello").await);
        assert_eq!(channel.attempts().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_error_is_not_retried() {
        let channel = FakeChannel::scripted(vec![Err(ChannelError::Permanent(
            "chat not found".to_string(),
        ))]);
        let d = dispatcher(channel.clone(), DispatchConfig::default());

        assert!(!d.send("hello").await);
        assert_eq!(channel.attempts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn batch_continues_past_a_failed_message() {
        let channel = FakeChannel::scripted(vec![
            Ok(()),
            Err(ChannelError::Permanent("rejected".to_string())),
            Ok(()),
        ]);
        let d = dispatcher(channel.clone(), DispatchConfig::default());
        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];

        let report = d.send_batch(&texts).await;

        assert_eq!(report, BatchReport { sent: 2, failed: 1 });
        let sent: Vec<String> = channel.attempts().into_iter().map(|(_, t)| t).collect();
        assert_eq!(sent, texts);
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_sends_respect_per_second_spacing() {
        let channel = FakeChannel::scripted(vec![]);
        let cfg = DispatchConfig {
            max_per_second: 2,
            ..DispatchConfig::default()
        };
        let d = dispatcher(channel.clone(), cfg);

        for i in 0..5 {
            assert!(d.send(&format!("m{i}")).await);
        }

        let at: Vec<Instant> = channel.attempts().into_iter().map(|(t, _)| t).collect();
        for pair in at.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reservations_never_exceed_the_minute_cap() {
        let cfg = DispatchConfig {
            max_per_second: 5,
            max_per_minute: 20,
            ..DispatchConfig::default()
        };
        let mut limiter = RateLimiterState::new(&cfg);
        let base = Instant::now();

        // Bursty demand: 100 requests, arriving in clumps.
        let mut starts = Vec::new();
        for i in 0..100u64 {
            let now = base + Duration::from_millis(i / 10 * 7_000);
            let wait = limiter.reserve(now);
            starts.push(now + wait);
        }

        for pair in starts.windows(2) {
            assert!(pair[1] >= pair[0] + Duration::from_millis(200));
        }
        for (i, t) in starts.iter().enumerate() {
            let in_window = starts[i..].iter().filter(|s| **s < *t + MINUTE).count();
            assert!(in_window <= 20, "{in_window} sends within 60s of send #{i}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn idle_limiter_does_not_delay() {
        let mut limiter = RateLimiterState::new(&DispatchConfig::default());
        let base = Instant::now();
        assert_eq!(limiter.reserve(base), Duration::ZERO);
        assert_eq!(limiter.reserve(base + Duration::from_secs(5)), Duration::ZERO);
        assert_eq!(limiter.reserve(base + Duration::from_secs(5)), Duration::from_secs(1));
    }
}
