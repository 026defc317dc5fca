use rust_decimal::Decimal;
use serde::Serialize;

use crate::core::config::NotificationSettings;
use crate::core::redis::RedisHandle;
use crate::core::time::{format_primitive, primitive_now_utc};
use crate::db::models::Attempt;
use crate::db::types::AttemptStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ProgressEventKind {
    Started,
    AnswerSaved,
    Submitted,
    Violation,
    Graded,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ProgressEvent {
    pub(crate) event: ProgressEventKind,
    pub(crate) assignment_id: String,
    pub(crate) attempt_id: String,
    pub(crate) student_id: String,
    pub(crate) answered_count: i64,
    pub(crate) question_count: i64,
    pub(crate) violation_count: i32,
    pub(crate) percentage: Option<Decimal>,
    pub(crate) status: AttemptStatus,
    pub(crate) occurred_at: String,
}

impl ProgressEvent {
    pub(crate) fn for_attempt(
        event: ProgressEventKind,
        attempt: &Attempt,
        answered_count: i64,
        question_count: i64,
    ) -> Self {
        Self {
            event,
            assignment_id: attempt.assignment_id.clone(),
            attempt_id: attempt.id.clone(),
            student_id: attempt.student_id.clone(),
            answered_count,
            question_count,
            violation_count: attempt.violation_count,
            percentage: attempt.percentage,
            status: attempt.status,
            occurred_at: format_primitive(primitive_now_utc()),
        }
    }
}

/// Fire-and-forget sink for live progress. Delivery problems are logged and
/// counted, never returned to the caller.
#[derive(Clone)]
pub(crate) struct ProgressNotifier {
    redis: RedisHandle,
    settings: NotificationSettings,
    #[cfg(test)]
    sent: std::sync::Arc<std::sync::Mutex<Vec<ProgressEventKind>>>,
}

impl ProgressNotifier {
    pub(crate) fn new(redis: RedisHandle, settings: NotificationSettings) -> Self {
        Self {
            redis,
            settings,
            #[cfg(test)]
            sent: Default::default(),
        }
    }

    /// Kinds of every event handed to the sink, in order.
    #[cfg(test)]
    pub(crate) fn sent_kinds(&self) -> Vec<ProgressEventKind> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub(crate) async fn notify(&self, event: ProgressEvent) {
        if !self.settings.enabled {
            return;
        }
        #[cfg(test)]
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(event.event);
        }

        let channel = self.settings.channel_for(&event.assignment_id);
        let payload = match serde_json::to_string(&event) {
            Ok(payload) => payload,
            Err(err) => {
                metrics::counter!("progress_notifications_failed_total").increment(1);
                tracing::warn!(error = %err, channel, "Failed to encode progress event");
                return;
            }
        };

        match self.redis.publish(&channel, &payload).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::debug!(channel, "Redis unavailable; progress event dropped");
            }
            Err(err) => {
                metrics::counter!("progress_notifications_failed_total").increment(1);
                tracing::warn!(
                    error = %err,
                    channel,
                    attempt_id = %event.attempt_id,
                    "Failed to publish progress event"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt() -> Attempt {
        let mut attempt = crate::test_support::sample_attempt();
        attempt.violation_count = 2;
        attempt
    }

    #[test]
    fn event_serialises_with_snake_case_kind() {
        let event = ProgressEvent::for_attempt(ProgressEventKind::AnswerSaved, &attempt(), 3, 10);
        let json = serde_json::to_value(&event).expect("json");

        assert_eq!(json["event"], "answer_saved");
        assert_eq!(json["status"], "in_progress");
        assert_eq!(json["answered_count"], 3);
        assert_eq!(json["violation_count"], 2);
        assert!(json["percentage"].is_null());
    }

    #[tokio::test]
    async fn notify_without_redis_is_silent() {
        let notifier = ProgressNotifier::new(
            RedisHandle::new("redis://127.0.0.1:6379/1".into()),
            NotificationSettings { enabled: true, channel_prefix: "test:progress".into() },
        );

        notifier
            .notify(ProgressEvent::for_attempt(ProgressEventKind::Started, &attempt(), 0, 10))
            .await;
        assert_eq!(notifier.sent_kinds(), vec![ProgressEventKind::Started]);
    }

    #[tokio::test]
    async fn disabled_notifier_sends_nothing() {
        let notifier = ProgressNotifier::new(
            RedisHandle::new("redis://127.0.0.1:6379/1".into()),
            NotificationSettings { enabled: false, channel_prefix: "test:progress".into() },
        );

        notifier
            .notify(ProgressEvent::for_attempt(ProgressEventKind::Submitted, &attempt(), 0, 10))
            .await;
        assert!(notifier.sent_kinds().is_empty());
    }
}
