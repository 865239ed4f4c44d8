//! Lifecycle Completer.
//!
//! Resolves the Auto Scaling lifecycle hook with `ABANDON` so the group stops
//! holding the instance. Completion is attempted once per action token; repeat
//! calls, including ones Auto Scaling reports as already resolved, are no-ops.
//!
//! Tokens are remembered for the life of the process only, up to a fixed
//! number; the oldest is forgotten first. A forgotten token that is replayed
//! reaches Auto Scaling again, which answers "no active lifecycle action".

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::event::LifecycleEvent;
use crate::providers::aws::{CompleteLifecycleActionRequest, LIFECYCLE_ACTION_RESULT_ABANDON};
use crate::providers::{AwsError, LifecycleActions};

/// Completion failure.
#[derive(Debug, Error)]
#[error("failed to complete lifecycle action for {instance_id}: {source}")]
pub struct CompletionError {
    /// Instance the hook belongs to.
    pub instance_id: String,
    /// Underlying AWS error.
    #[source]
    pub source: AwsError,
}

/// Result of a completion attempt.
#[derive(Debug)]
pub enum CompletionOutcome {
    /// The hook was resolved by this call.
    Completed,
    /// The hook had already been resolved; nothing was done.
    AlreadyResolved,
    /// Auto Scaling rejected the call. The hook times out on its own.
    Failed(CompletionError),
}

impl CompletionOutcome {
    /// Whether the hook is known to be resolved.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

/// Default number of resolved action tokens remembered.
pub const DEFAULT_TRACKED_TOKENS: usize = 1024;

/// Bounded, insertion-ordered set of resolved tokens.
#[derive(Debug)]
struct ResolvedTokens {
    tokens: VecDeque<String>,
    capacity: usize,
}

impl ResolvedTokens {
    fn new(capacity: usize) -> Self {
        Self {
            tokens: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn contains(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t == token)
    }

    fn insert(&mut self, token: &str) {
        if self.contains(token) {
            return;
        }
        while self.tokens.len() >= self.capacity {
            self.tokens.pop_front();
        }
        self.tokens.push_back(token.to_string());
    }
}

/// Resolves lifecycle hooks, at most once per action token.
pub struct LifecycleCompleter {
    autoscaling: Arc<dyn LifecycleActions>,
    delay: Option<Duration>,
    resolved: Mutex<ResolvedTokens>,
}

impl LifecycleCompleter {
    /// Create a completer that waits `delay` before completing.
    pub fn new(autoscaling: Arc<dyn LifecycleActions>, delay: Option<Duration>) -> Self {
        Self {
            autoscaling,
            delay,
            resolved: Mutex::new(ResolvedTokens::new(DEFAULT_TRACKED_TOKENS)),
        }
    }

    /// Remember at most `capacity` resolved tokens (minimum one).
    #[must_use]
    pub fn with_token_capacity(mut self, capacity: usize) -> Self {
        self.resolved = Mutex::new(ResolvedTokens::new(capacity));
        self
    }

    /// Complete the hook for `event`.
    ///
    /// Unless `skip_delay` is set, sleeps for the configured delay first so
    /// evicted workloads can reschedule before the instance goes away.
    pub async fn complete(&self, event: &LifecycleEvent, skip_delay: bool) -> CompletionOutcome {
        if self.resolved.lock().await.contains(&event.action_token) {
            info!(instance_id = %event.instance_id, "Lifecycle action already completed");
            return CompletionOutcome::AlreadyResolved;
        }

        if let (false, Some(delay)) = (skip_delay, self.delay) {
            info!(
                instance_id = %event.instance_id,
                delay_secs = delay.as_secs(),
                "Waiting before completing lifecycle action"
            );
            tokio::time::sleep(delay).await;
        }

        let mut resolved = self.resolved.lock().await;
        if resolved.contains(&event.action_token) {
            return CompletionOutcome::AlreadyResolved;
        }

        info!(
            instance_id = %event.instance_id,
            hook = %event.hook_name,
            group = %event.auto_scaling_group_name,
            "Completing the ASG lifecycle action"
        );

        let request = CompleteLifecycleActionRequest {
            lifecycle_hook_name: event.hook_name.clone(),
            auto_scaling_group_name: event.auto_scaling_group_name.clone(),
            lifecycle_action_token: event.action_token.clone(),
            lifecycle_action_result: LIFECYCLE_ACTION_RESULT_ABANDON.to_string(),
            instance_id: event.instance_id.clone(),
        };

        match self.autoscaling.complete_lifecycle_action(&request).await {
            Ok(()) => {
                resolved.insert(&event.action_token);
                CompletionOutcome::Completed
            }
            Err(e) if e.is_no_active_lifecycle_action() => {
                info!(instance_id = %event.instance_id, "Lifecycle action was already resolved");
                resolved.insert(&event.action_token);
                CompletionOutcome::AlreadyResolved
            }
            Err(source) => {
                error!(
                    instance_id = %event.instance_id,
                    error = %source,
                    "Failed to complete lifecycle action, hook will time out"
                );
                CompletionOutcome::Failed(CompletionError {
                    instance_id: event.instance_id.clone(),
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::time::Instant;

    #[derive(Default)]
    struct RecordingAutoscaling {
        calls: std::sync::Mutex<Vec<CompleteLifecycleActionRequest>>,
        fail_with: Option<(&'static str, &'static str)>,
    }

    #[async_trait]
    impl LifecycleActions for RecordingAutoscaling {
        async fn complete_lifecycle_action(
            &self,
            req: &CompleteLifecycleActionRequest,
        ) -> Result<(), AwsError> {
            self.calls.lock().unwrap().push(req.clone());
            match self.fail_with {
                Some((code, message)) => Err(AwsError::Api {
                    status: 400,
                    code: code.to_string(),
                    message: message.to_string(),
                }),
                None => Ok(()),
            }
        }
    }

    fn event() -> LifecycleEvent {
        LifecycleEvent {
            instance_id: "i-abc123".to_string(),
            hook_name: "drain-hook".to_string(),
            auto_scaling_group_name: "workers".to_string(),
            action_token: "token-1".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_with_abandon_after_delay() {
        let asg = Arc::new(RecordingAutoscaling::default());
        let completer = LifecycleCompleter::new(asg.clone(), Some(Duration::from_secs(10)));

        let start = Instant::now();
        let outcome = completer.complete(&event(), false).await;

        assert!(matches!(outcome, CompletionOutcome::Completed));
        assert!(start.elapsed() >= Duration::from_secs(10));

        let calls = asg.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].lifecycle_action_result, "ABANDON");
        assert_eq!(calls[0].lifecycle_hook_name, "drain-hook");
        assert_eq!(calls[0].auto_scaling_group_name, "workers");
        assert_eq!(calls[0].lifecycle_action_token, "token-1");
        assert_eq!(calls[0].instance_id, "i-abc123");
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_delay_completes_immediately() {
        let asg = Arc::new(RecordingAutoscaling::default());
        let completer = LifecycleCompleter::new(asg.clone(), Some(Duration::from_secs(10)));

        let start = Instant::now();
        completer.complete(&event(), true).await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_second_completion_is_noop() {
        let asg = Arc::new(RecordingAutoscaling::default());
        let completer = LifecycleCompleter::new(asg.clone(), None);

        assert!(matches!(
            completer.complete(&event(), false).await,
            CompletionOutcome::Completed
        ));
        assert!(matches!(
            completer.complete(&event(), false).await,
            CompletionOutcome::AlreadyResolved
        ));
        assert_eq!(asg.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_oldest_token_is_forgotten_past_capacity() {
        let asg = Arc::new(RecordingAutoscaling::default());
        let completer = LifecycleCompleter::new(asg.clone(), None).with_token_capacity(1);
        let second = LifecycleEvent {
            action_token: "token-2".to_string(),
            ..event()
        };

        completer.complete(&event(), false).await;
        completer.complete(&second, false).await;
        assert!(matches!(
            completer.complete(&second, false).await,
            CompletionOutcome::AlreadyResolved
        ));
        assert_eq!(asg.calls.lock().unwrap().len(), 2);

        assert!(matches!(
            completer.complete(&event(), false).await,
            CompletionOutcome::Completed
        ));
        let calls = asg.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2].lifecycle_action_token, "token-1");
    }

    #[test]
    fn test_resolved_tokens_ignore_duplicates() {
        let mut tokens = ResolvedTokens::new(2);
        tokens.insert("a");
        tokens.insert("a");
        tokens.insert("b");
        assert!(tokens.contains("a"));
        assert!(tokens.contains("b"));

        tokens.insert("c");
        assert!(!tokens.contains("a"));
        assert!(tokens.contains("c"));
    }

    #[tokio::test]
    async fn test_already_resolved_upstream_is_not_an_error() {
        let asg = Arc::new(RecordingAutoscaling {
            fail_with: Some((
                "ValidationError",
                "No active Lifecycle Action found with token token-1",
            )),
            ..Default::default()
        });
        let completer = LifecycleCompleter::new(asg, None);

        let outcome = completer.complete(&event(), false).await;
        assert!(matches!(outcome, CompletionOutcome::AlreadyResolved));
        assert!(outcome.is_resolved());
    }

    #[tokio::test]
    async fn test_failure_is_reported_not_retried() {
        let asg = Arc::new(RecordingAutoscaling {
            fail_with: Some(("AccessDenied", "not allowed")),
            ..Default::default()
        });
        let completer = LifecycleCompleter::new(asg.clone(), None);

        let outcome = completer.complete(&event(), false).await;
        assert!(matches!(outcome, CompletionOutcome::Failed(_)));
        assert!(!outcome.is_resolved());
        assert_eq!(asg.calls.lock().unwrap().len(), 1);
    }
}
