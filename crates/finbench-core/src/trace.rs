pub use finbench_types::{CallTimer, CallTrace, TokenUsage};

use std::cell::RefCell;

// Calls made while one item is evaluated. The runner opens a scope per item;
// outside a scope, recording is a no-op.
tokio::task_local! {
    static CALLS: RefCell<Vec<CallTrace>>;
}

/// Runs `f` in a fresh call-recording scope and returns its output together
/// with every call recorded inside it.
pub async fn collect_calls<F, R>(f: F) -> (R, Vec<CallTrace>)
where
    F: std::future::Future<Output = R>,
{
    CALLS
        .scope(RefCell::new(Vec::new()), async move {
            let out = f.await;
            let calls = CALLS.with(|c| c.take());
            (out, calls)
        })
        .await
}

/// Appends a call to the current item's record.
pub fn record_call(call: CallTrace) {
    let _ = CALLS.try_with(|calls| calls.borrow_mut().push(call));
}

/// Calls recorded so far in the current scope.
pub fn recorded_calls() -> Vec<CallTrace> {
    CALLS
        .try_with(|calls| calls.borrow().clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scope_collects_in_order() {
        let (value, calls) = collect_calls(async {
            record_call(CallTrace::begin("glm-4-flash").succeeded(1, None));
            record_call(CallTrace::begin("gpt-4o").failed(5, "HTTP 503: busy"));
            assert_eq!(recorded_calls().len(), 2);
            7
        })
        .await;

        assert_eq!(value, 7);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].model, "glm-4-flash");
        assert_eq!(calls[1].attempts, 5);
        assert_eq!(calls[1].error.as_deref(), Some("HTTP 503: busy"));
    }

    #[tokio::test]
    async fn recording_outside_scope_is_ignored() {
        record_call(CallTrace::begin("m").succeeded(1, None));
        assert!(recorded_calls().is_empty());
    }

    #[tokio::test]
    async fn scopes_do_not_leak_between_items() {
        let (_, first) = collect_calls(async { record_call(CallTrace::begin("a").succeeded(1, None)) }).await;
        let (_, second) = collect_calls(async {}).await;
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }
}
