//! Size-based admission control for raw exports.

use crate::models::SizeThresholds;
use async_trait::async_trait;
use std::future::Future;
use tracing::{debug, info};

/// User-facing side of the gate: asks for confirmation and reports blocks.
#[async_trait]
pub trait GatePrompt: Send + Sync {
    async fn confirm(&self, count: u64, thresholds: SizeThresholds) -> bool;
    async fn notify_blocked(&self, count: u64, thresholds: SizeThresholds);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    Confirm,
    Blocked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome<T> {
    Proceeded(T),
    Declined,
    Blocked,
}

pub fn assess(count: u64, thresholds: SizeThresholds) -> GateDecision {
    if count <= thresholds.warning_size() {
        GateDecision::Proceed
    } else if count <= thresholds.hard_limit() {
        GateDecision::Confirm
    } else {
        GateDecision::Blocked
    }
}

/// Runs `proceed` if the estimated row count passes the thresholds, asking
/// the prompt first when it falls between the warning size and the limit.
pub async fn decide<P, F, Fut, T>(
    count: u64,
    thresholds: SizeThresholds,
    prompt: &P,
    proceed: F,
) -> GateOutcome<T>
where
    P: GatePrompt + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    match assess(count, thresholds) {
        GateDecision::Proceed => {
            debug!(count, "row count under warning size");
            GateOutcome::Proceeded(proceed().await)
        }
        GateDecision::Confirm => {
            if prompt.confirm(count, thresholds).await {
                info!(count, "large export confirmed");
                GateOutcome::Proceeded(proceed().await)
            } else {
                info!(count, "large export declined");
                GateOutcome::Declined
            }
        }
        GateDecision::Blocked => {
            info!(
                count,
                limit = thresholds.hard_limit(),
                "export blocked by size limit"
            );
            prompt.notify_blocked(count, thresholds).await;
            GateOutcome::Blocked
        }
    }
}

/// Prompt that answers every confirmation the same way, for unattended runs.
#[derive(Debug, Clone, Copy)]
pub struct FixedPrompt {
    pub approve: bool,
}

impl FixedPrompt {
    pub fn approve() -> Self {
        Self { approve: true }
    }

    pub fn deny() -> Self {
        Self { approve: false }
    }
}

#[async_trait]
impl GatePrompt for FixedPrompt {
    async fn confirm(&self, _count: u64, _thresholds: SizeThresholds) -> bool {
        self.approve
    }

    async fn notify_blocked(&self, count: u64, thresholds: SizeThresholds) {
        tracing::warn!(
            "export of {count} rows exceeds the limit of {} rows",
            thresholds.hard_limit()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingPrompt {
        answer: bool,
        confirms: AtomicUsize,
        blocks: AtomicUsize,
    }

    impl CountingPrompt {
        fn new(answer: bool) -> Self {
            Self {
                answer,
                confirms: AtomicUsize::new(0),
                blocks: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl GatePrompt for CountingPrompt {
        async fn confirm(&self, _count: u64, _thresholds: SizeThresholds) -> bool {
            self.confirms.fetch_add(1, Ordering::SeqCst);
            self.answer
        }

        async fn notify_blocked(&self, _count: u64, _thresholds: SizeThresholds) {
            self.blocks.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn thresholds() -> SizeThresholds {
        SizeThresholds::new(10, 100).unwrap()
    }

    #[test]
    fn assess_boundaries() {
        let t = thresholds();
        assert_eq!(assess(0, t), GateDecision::Proceed);
        assert_eq!(assess(10, t), GateDecision::Proceed);
        assert_eq!(assess(11, t), GateDecision::Confirm);
        assert_eq!(assess(100, t), GateDecision::Confirm);
        assert_eq!(assess(101, t), GateDecision::Blocked);
    }

    #[tokio::test]
    async fn small_export_proceeds_without_confirmation() {
        let prompt = CountingPrompt::new(false);
        let calls = AtomicUsize::new(0);
        let outcome = decide(5, thresholds(), &prompt, || async {
            calls.fetch_add(1, Ordering::SeqCst);
        })
        .await;
        assert_eq!(outcome, GateOutcome::Proceeded(()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(prompt.confirms.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn medium_export_waits_for_confirmation() {
        let approving = CountingPrompt::new(true);
        let outcome = decide(50, thresholds(), &approving, || async { 7 }).await;
        assert_eq!(outcome, GateOutcome::Proceeded(7));
        assert_eq!(approving.confirms.load(Ordering::SeqCst), 1);

        let denying = CountingPrompt::new(false);
        let calls = AtomicUsize::new(0);
        let outcome = decide(50, thresholds(), &denying, || async {
            calls.fetch_add(1, Ordering::SeqCst);
        })
        .await;
        assert_eq!(outcome, GateOutcome::Declined);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(denying.confirms.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn oversized_export_never_proceeds() {
        let prompt = CountingPrompt::new(true);
        let calls = AtomicUsize::new(0);
        let outcome = decide(500, thresholds(), &prompt, || async {
            calls.fetch_add(1, Ordering::SeqCst);
        })
        .await;
        assert_eq!(outcome, GateOutcome::Blocked);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(prompt.confirms.load(Ordering::SeqCst), 0);
        assert_eq!(prompt.blocks.load(Ordering::SeqCst), 1);
    }
}
