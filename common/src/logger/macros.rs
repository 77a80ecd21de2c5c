use std::time::Duration;

use tracing::{Span, field};

use super::TraceId;

/// Create a root span for a request / simulation run / admin command.
pub fn root_span(name: &'static str, trace_id: &TraceId) -> Span {
    tracing::info_span!(
        "root",
        name = %name,
        trace_id = %trace_id.as_str(),
        event_id = field::Empty,
        user_id = field::Empty
    )
}

/// Create a child span (inherits trace_id from the current root).
pub fn child_span(name: &'static str) -> Span {
    tracing::info_span!(
        "child",
        name = %name,
        event_id = field::Empty,
        user_id = field::Empty
    )
}

/// Records event/user ids on the current span, if it declared those fields.
pub fn annotate_span(event_id: i64, user_id: Option<i64>) {
    let span = Span::current();
    span.record("event_id", &field::display(event_id));
    if let Some(uid) = user_id {
        span.record("user_id", &field::display(uid));
    }
}

pub async fn warn_if_slow<F, T>(label: &'static str, max: Duration, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    let start = std::time::Instant::now();
    let out = fut.await;
    let elapsed = start.elapsed();
    if elapsed > max {
        tracing::warn!(
            target: "performance",
            label = label,
            elapsed_ms = elapsed.as_millis() as u64,
            "slow operation detected"
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn warn_if_slow_reports_slow_futures() {
        let out = warn_if_slow("nap", Duration::from_millis(1), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            7
        })
        .await;

        assert_eq!(out, 7);
        assert!(logs_contain("slow operation detected"));
    }

    #[tokio::test]
    #[traced_test]
    async fn warn_if_slow_is_silent_for_fast_futures() {
        let out = warn_if_slow("quick", Duration::from_secs(5), async { "ok" }).await;

        assert_eq!(out, "ok");
        assert!(!logs_contain("slow operation detected"));
    }

    #[test]
    fn spans_accept_annotations() {
        let trace = TraceId::default();
        let root = root_span("reserve", &trace);
        let _g = root.enter();
        annotate_span(7, Some(42));

        let child = child_span("ledger");
        let _c = child.enter();
        annotate_span(7, None);
    }
}
