//! Adaptive history polling.
//!
//! The upstream produces artifacts progressively and exposes no push
//! channel, so the poller owns time: it starts at a short interval, widens
//! additively while nothing changes, snaps back on progress, and
//! classifies terminal states. The per-tick HTTP round is a caller-supplied
//! closure, which keeps the loop itself free of wire concerns and fully
//! testable.

use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{GatewayError, GatewayResult};
use crate::modules::config::{PollerSettings, TerminalCodes};

/// What a generation produces; only used for log context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationKind {
    Image,
    Video,
}

impl GenerationKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

/// Snapshot extracted from one history response.
#[derive(Debug, Clone, Default)]
pub struct PollingStatus {
    pub status: i64,
    pub fail_code: String,
    pub item_count: usize,
    pub finish_time: i64,
    pub history_id: String,
}

/// One tick's worth of data: the snapshot plus the raw task payload.
#[derive(Debug, Clone)]
pub struct PollTick {
    pub status: PollingStatus,
    pub data: Value,
}

/// Final poll result.
#[derive(Debug, Clone)]
pub struct PollOutcome {
    pub status: i64,
    pub elapsed: Duration,
    pub data: Value,
}

/// Fixed configuration for one poll run.
#[derive(Debug, Clone)]
pub struct SmartPollerConfig {
    pub max_poll_count: u32,
    pub expected_item_count: usize,
    pub kind: GenerationKind,
    pub base_interval: Duration,
    pub max_interval: Duration,
    pub widen_step: Duration,
    pub widen_after: u32,
    pub stall_after: u32,
    pub max_transport_errors: u32,
    pub terminal: TerminalCodes,
}

impl SmartPollerConfig {
    pub fn from_settings(
        settings: &PollerSettings,
        terminal: TerminalCodes,
        kind: GenerationKind,
        expected_item_count: usize,
    ) -> Self {
        Self {
            max_poll_count: settings.max_poll_count,
            expected_item_count,
            kind,
            base_interval: Duration::from_millis(settings.base_interval_ms),
            max_interval: Duration::from_millis(settings.max_interval_ms),
            widen_step: Duration::from_millis(settings.widen_step_ms),
            widen_after: settings.widen_after_ticks,
            stall_after: settings.stall_after_ticks,
            max_transport_errors: settings.max_transport_errors,
            terminal,
        }
    }
}

enum StepVerdict {
    Continue,
    Succeeded,
    Failed(GatewayError),
}

pub struct SmartPoller {
    config: SmartPollerConfig,
    iterations: u32,
    last_item_count: Option<usize>,
    no_progress_ticks: u32,
    transport_errors: u32,
    interval: Duration,
}

impl SmartPoller {
    pub fn new(config: SmartPollerConfig) -> Self {
        let interval = config.base_interval;
        Self {
            config,
            iterations: 0,
            last_item_count: None,
            no_progress_ticks: 0,
            transport_errors: 0,
            interval,
        }
    }

    /// Drive `tick` until a terminal condition. Always returns within
    /// `max_poll_count` ticks.
    pub async fn poll<F, Fut>(mut self, mut tick: F) -> GatewayResult<PollOutcome>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = GatewayResult<PollTick>>,
    {
        let started = Instant::now();

        loop {
            if self.iterations >= self.config.max_poll_count {
                return Err(GatewayError::PollTimeout(format!(
                    "{} generation still pending after {} polls",
                    self.config.kind.as_str(),
                    self.iterations
                )));
            }
            self.iterations += 1;

            match tick().await {
                Ok(result) => {
                    self.transport_errors = 0;
                    tracing::debug!(
                        "Poll #{}: status={} items={} finish_time={}",
                        self.iterations,
                        result.status.status,
                        result.status.item_count,
                        result.status.finish_time,
                    );
                    match self.on_tick(&result.status) {
                        StepVerdict::Succeeded => {
                            return Ok(PollOutcome {
                                status: result.status.status,
                                elapsed: started.elapsed(),
                                data: result.data,
                            })
                        }
                        StepVerdict::Failed(err) => return Err(err),
                        StepVerdict::Continue => {}
                    }
                }
                Err(err) => {
                    if let Some(fatal) = self.on_tick_error(err) {
                        return Err(fatal);
                    }
                }
            }

            tokio::time::sleep(self.interval).await;
        }
    }

    /// Classify one successful tick. Pure bookkeeping, no time or I/O.
    fn on_tick(&mut self, status: &PollingStatus) -> StepVerdict {
        // A shrinking item list breaks the protocol; bail before anything
        // downstream trusts it.
        if let Some(last) = self.last_item_count {
            if status.item_count < last {
                return StepVerdict::Failed(GatewayError::Server(format!(
                    "history {} item count decreased from {} to {}",
                    status.history_id, last, status.item_count
                )));
            }
        }

        if self.config.terminal.is_failure(status.status) {
            return StepVerdict::Failed(self.remote_failure(status));
        }
        if !status.fail_code.is_empty()
            && status.fail_code != "0"
            && !self.config.terminal.is_transient_fail_code(&status.fail_code)
        {
            return StepVerdict::Failed(self.remote_failure(status));
        }

        if self.config.terminal.is_success(status.status)
            && (status.item_count >= self.config.expected_item_count || status.finish_time > 0)
        {
            return StepVerdict::Succeeded;
        }

        let progressed = match self.last_item_count {
            Some(last) => status.item_count > last,
            None => status.item_count > 0,
        };
        self.last_item_count = Some(status.item_count);

        if progressed {
            self.no_progress_ticks = 0;
            self.interval = self.config.base_interval;
        } else {
            self.no_progress_ticks += 1;
            if self.no_progress_ticks >= self.config.widen_after {
                self.interval = (self.interval + self.config.widen_step)
                    .min(self.config.max_interval);
            }
            if self.no_progress_ticks > self.config.stall_after && status.finish_time == 0 {
                return StepVerdict::Failed(GatewayError::PollStall(format!(
                    "no progress on history {} for {} polls",
                    status.history_id, self.no_progress_ticks
                )));
            }
        }

        StepVerdict::Continue
    }

    /// Transport faults are retried a bounded consecutive count; anything
    /// already classified is terminal.
    fn on_tick_error(&mut self, err: GatewayError) -> Option<GatewayError> {
        match err {
            GatewayError::Transport(message) => {
                self.transport_errors += 1;
                if self.transport_errors > self.config.max_transport_errors {
                    return Some(GatewayError::Transport(format!(
                        "{} consecutive poll transport failures, last: {message}",
                        self.transport_errors
                    )));
                }
                tracing::warn!(
                    "Poll transport error ({}/{}): {}",
                    self.transport_errors,
                    self.config.max_transport_errors,
                    message
                );
                None
            }
            terminal => Some(terminal),
        }
    }

    fn remote_failure(&self, status: &PollingStatus) -> GatewayError {
        let code = if status.fail_code.is_empty() {
            status.status.to_string()
        } else {
            status.fail_code.clone()
        };
        GatewayError::PollRemoteFailed {
            code,
            message: format!("history {} reported a terminal failure", status.history_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    fn fast_config(max_poll_count: u32, expected: usize) -> SmartPollerConfig {
        SmartPollerConfig {
            max_poll_count,
            expected_item_count: expected,
            kind: GenerationKind::Image,
            base_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(5),
            widen_step: Duration::from_millis(1),
            widen_after: 2,
            stall_after: 4,
            max_transport_errors: 2,
            terminal: TerminalCodes::default(),
        }
    }

    fn status(code: i64, items: usize, finish: i64) -> PollingStatus {
        PollingStatus {
            status: code,
            fail_code: String::new(),
            item_count: items,
            finish_time: finish,
            history_id: "h1".to_string(),
        }
    }

    fn script(
        ticks: Vec<GatewayResult<PollTick>>,
    ) -> impl FnMut() -> std::future::Ready<GatewayResult<PollTick>> {
        let queue = Arc::new(Mutex::new(VecDeque::from(ticks)));
        move || {
            let next = queue
                .lock()
                .expect("lock")
                .pop_front()
                .expect("script exhausted");
            std::future::ready(next)
        }
    }

    fn tick(code: i64, items: usize, finish: i64) -> GatewayResult<PollTick> {
        Ok(PollTick { status: status(code, items, finish), data: Value::Null })
    }

    #[tokio::test]
    async fn succeeds_when_items_reach_expected() {
        let poller = SmartPoller::new(fast_config(10, 4));
        let outcome = poller
            .poll(script(vec![tick(20, 0, 0), tick(42, 2, 0), tick(50, 4, 0)]))
            .await
            .expect("succeeds");
        assert_eq!(outcome.status, 50);
    }

    #[tokio::test]
    async fn finish_time_completes_a_short_item_list() {
        let poller = SmartPoller::new(fast_config(10, 4));
        let outcome = poller
            .poll(script(vec![tick(50, 1, 1_700_000_000)]))
            .await
            .expect("succeeds");
        assert_eq!(outcome.status, 50);
    }

    #[tokio::test]
    async fn times_out_at_max_poll_count() {
        let mut config = fast_config(10, 4);
        config.stall_after = 50;
        let poller = SmartPoller::new(config);
        let ticks = (0..10).map(|_| tick(20, 0, 0)).collect();
        let err = poller.poll(script(ticks)).await.expect_err("timeout");
        assert!(matches!(err, GatewayError::PollTimeout(_)));
    }

    #[tokio::test]
    async fn terminal_failure_status_is_classified() {
        let poller = SmartPoller::new(fast_config(10, 4));
        let mut failed = status(30, 0, 0);
        failed.fail_code = "2038".to_string();
        let err = poller
            .poll(script(vec![Ok(PollTick { status: failed, data: Value::Null })]))
            .await
            .expect_err("fails");
        match err {
            GatewayError::PollRemoteFailed { code, .. } => assert_eq!(code, "2038"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn transient_fail_codes_do_not_terminate() {
        let mut config = fast_config(10, 1);
        config.terminal.transient_fail_codes = vec!["1180".to_string()];
        let poller = SmartPoller::new(config);
        let mut pending = status(42, 0, 0);
        pending.fail_code = "1180".to_string();
        let outcome = poller
            .poll(script(vec![
                Ok(PollTick { status: pending, data: Value::Null }),
                tick(50, 1, 0),
            ]))
            .await
            .expect("transient code is tolerated");
        assert_eq!(outcome.status, 50);
    }

    #[tokio::test]
    async fn stalls_without_progress() {
        let poller = SmartPoller::new(fast_config(20, 4));
        let ticks = (0..8).map(|_| tick(42, 1, 0)).collect();
        let err = poller.poll(script(ticks)).await.expect_err("stall");
        assert!(matches!(err, GatewayError::PollStall(_)));
    }

    #[tokio::test]
    async fn item_count_decrease_fails_fast() {
        let poller = SmartPoller::new(fast_config(10, 4));
        let err = poller
            .poll(script(vec![tick(42, 3, 0), tick(42, 1, 0)]))
            .await
            .expect_err("protocol violation");
        assert!(matches!(err, GatewayError::Server(_)));
    }

    #[tokio::test]
    async fn bounded_transport_retries() {
        let poller = SmartPoller::new(fast_config(10, 1));
        let outcome = poller
            .poll(script(vec![
                Err(GatewayError::Transport("dns".to_string())),
                Err(GatewayError::Transport("dns".to_string())),
                tick(50, 1, 0),
            ]))
            .await
            .expect("recovers");
        assert_eq!(outcome.status, 50);

        let poller = SmartPoller::new(fast_config(10, 1));
        let err = poller
            .poll(script(vec![
                Err(GatewayError::Transport("dns".to_string())),
                Err(GatewayError::Transport("dns".to_string())),
                Err(GatewayError::Transport("dns".to_string())),
            ]))
            .await
            .expect_err("exhausted");
        assert!(matches!(err, GatewayError::Transport(_)));
    }

    #[tokio::test]
    async fn upstream_errors_are_not_retried() {
        let poller = SmartPoller::new(fast_config(10, 1));
        let err = poller
            .poll(script(vec![Err(GatewayError::Auth("expired".to_string()))]))
            .await
            .expect_err("terminal");
        assert!(matches!(err, GatewayError::Auth(_)));
    }

    #[test]
    fn interval_widens_and_resets() {
        let mut poller = SmartPoller::new(fast_config(20, 4));
        // Prime the baseline, then go quiet.
        for _ in 0..4 {
            let verdict = poller.on_tick(&status(42, 1, 0));
            assert!(matches!(verdict, StepVerdict::Continue));
        }
        assert!(poller.interval > poller.config.base_interval);

        // Progress snaps the interval back.
        let verdict = poller.on_tick(&status(42, 2, 0));
        assert!(matches!(verdict, StepVerdict::Continue));
        assert_eq!(poller.interval, poller.config.base_interval);
    }
}
