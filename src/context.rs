//! Per-logical-task correlation fields (§4.1). A "logical task" here is a
//! Tokio task: the context frame lives in task-local storage, so a spawned
//! child task does not inherit the parent's frame by default — it must be
//! handed an explicit [`ContextSnapshot`] via [`ContextStore::run_with`].
//! This is what guarantees testable property 4 (disjoint context across
//! concurrent requests) and property 5 (snapshot isolation from later parent
//! mutation).

use std::cell::RefCell;
use std::future::Future;

use indexmap::IndexMap;
use lumen_common::Value;

use crate::error::ContextError;
use crate::internal_events::ContextBindOutsideScope;

/// Correlation fields scoped to one logical task.
pub type ContextFrame = IndexMap<String, Value>;

/// An opaque, owned copy of a context frame captured at a point in time.
/// `run_with` restores exactly this copy, regardless of what the parent task
/// does to its own frame afterward (§8 property 5).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContextSnapshot(ContextFrame);

impl ContextSnapshot {
    pub fn into_frame(self) -> ContextFrame {
        self.0
    }
}

/// A context value accepted by `bind` must be a JSON scalar, or a "short"
/// list of scalars (§3: "values must be JSON-compatible scalars or short
/// lists"). Nested objects are rejected as a sign the caller meant to log
/// structured data through the normal event fields instead.
const MAX_LIST_LEN: usize = 32;

fn validate_context_value(value: &Value) -> Result<(), String> {
    match value {
        Value::Null | Value::Bool(_) | Value::Integer(_) | Value::Float(_) | Value::String(_) => {
            Ok(())
        }
        Value::Array(items) => {
            if items.len() > MAX_LIST_LEN {
                return Err(format!(
                    "list value exceeds the {MAX_LIST_LEN}-element context limit"
                ));
            }
            for item in items {
                if matches!(item, Value::Array(_) | Value::Object(_)) {
                    return Err("context list values must themselves be scalars".to_string());
                }
            }
            Ok(())
        }
        Value::Object(_) => Err("context values must be scalars or short lists, not objects".to_string()),
    }
}

tokio::task_local! {
    static FRAME: RefCell<ContextFrame>;
}

/// Namespace for the task-local context frame. There is no instance: every
/// operation acts on whichever frame is active for the calling task (or is a
/// documented no-op if none is, e.g. code running before a request scope was
/// entered).
pub struct ContextStore;

impl ContextStore {
    /// Runs `fut` with a fresh, empty context frame scoped to it. An adapter
    /// (e.g. web-framework middleware, out of scope for this crate) calls
    /// this once per request and then uses `bind` to populate it.
    pub async fn scope<F>(fut: F) -> F::Output
    where
        F: Future,
    {
        FRAME.scope(RefCell::new(ContextFrame::new()), fut).await
    }

    /// Merges `fields` into the current frame. Rejects any single
    /// non-serializable value with [`ContextError`] without merging the
    /// others; callers typically log the error and drop the bind (§4.1).
    pub fn bind(fields: impl IntoIterator<Item = (String, Value)>) -> Result<(), ContextError> {
        let Ok(result) = FRAME.try_with(|frame| {
            let mut frame = frame.borrow_mut();
            for (key, value) in fields {
                if let Err(reason) = validate_context_value(&value) {
                    return Err(ContextError { field: key, reason });
                }
                frame.insert(key, value);
            }
            Ok(())
        }) else {
            lumen_common::internal_event::emit(ContextBindOutsideScope);
            return Ok(());
        };
        result
    }

    /// Returns a shallow copy of the current frame; never the live object
    /// (§4.1).
    pub fn get() -> ContextFrame {
        FRAME
            .try_with(|frame| frame.borrow().clone())
            .unwrap_or_default()
    }

    pub fn clear() {
        let _ = FRAME.try_with(|frame| frame.borrow_mut().clear());
    }

    /// Captures the current frame for later restoration in a spawned task.
    pub fn snapshot() -> ContextSnapshot {
        ContextSnapshot(Self::get())
    }

    /// Runs `fut` under a frame restored from `snapshot`, independent of the
    /// parent task's frame (§8 property 5).
    pub async fn run_with<F>(snapshot: ContextSnapshot, fut: F) -> F::Output
    where
        F: Future,
    {
        FRAME.scope(RefCell::new(snapshot.0), fut).await
    }

    pub fn trace_id() -> Option<String> {
        match Self::get().get("trace_id") {
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_and_get_round_trip() {
        ContextStore::scope(async {
            ContextStore::bind([("trace_id".to_string(), Value::from("abc123"))]).unwrap();
            let frame = ContextStore::get();
            assert_eq!(frame.get("trace_id"), Some(&Value::from("abc123")));
        })
        .await;
    }

    #[tokio::test]
    async fn get_returns_a_copy_not_the_live_frame() {
        ContextStore::scope(async {
            ContextStore::bind([("a".to_string(), Value::from(1i64))]).unwrap();
            let mut copy = ContextStore::get();
            copy.insert("b".to_string(), Value::from(2i64));

            let live = ContextStore::get();
            assert!(!live.contains_key("b"));
        })
        .await;
    }

    #[tokio::test]
    async fn clear_empties_the_frame() {
        ContextStore::scope(async {
            ContextStore::bind([("a".to_string(), Value::from(1i64))]).unwrap();
            ContextStore::clear();
            assert!(ContextStore::get().is_empty());
        })
        .await;
    }

    #[tokio::test]
    async fn concurrent_requests_have_disjoint_frames() {
        let request_a = ContextStore::scope(async {
            ContextStore::bind([("trace_id".to_string(), Value::from("a"))]).unwrap();
            tokio::task::yield_now().await;
            ContextStore::get()
        });
        let request_b = ContextStore::scope(async {
            ContextStore::bind([("trace_id".to_string(), Value::from("b"))]).unwrap();
            tokio::task::yield_now().await;
            ContextStore::get()
        });

        let (frame_a, frame_b) = tokio::join!(
            tokio::spawn(request_a),
            tokio::spawn(request_b),
        );
        let frame_a = frame_a.unwrap();
        let frame_b = frame_b.unwrap();

        assert_eq!(frame_a.get("trace_id"), Some(&Value::from("a")));
        assert_eq!(frame_b.get("trace_id"), Some(&Value::from("b")));
    }

    #[tokio::test]
    async fn snapshot_is_isolated_from_later_parent_mutation() {
        ContextStore::scope(async {
            ContextStore::bind([("trace_id".to_string(), Value::from("original"))]).unwrap();
            let snapshot = ContextStore::snapshot();

            // Mutate the parent's frame *after* taking the snapshot.
            ContextStore::bind([("trace_id".to_string(), Value::from("mutated"))]).unwrap();

            let observed = ContextStore::run_with(snapshot, async { ContextStore::get() }).await;
            assert_eq!(observed.get("trace_id"), Some(&Value::from("original")));

            // Parent frame is unaffected by what happened in run_with.
            assert_eq!(
                ContextStore::get().get("trace_id"),
                Some(&Value::from("mutated"))
            );
        })
        .await;
    }

    #[tokio::test]
    async fn bind_outside_any_scope_is_a_no_op_not_an_error() {
        let result = ContextStore::bind([("x".to_string(), Value::from(1i64))]);
        assert!(result.is_ok());
        assert!(ContextStore::get().is_empty());
    }

    #[tokio::test]
    async fn bind_rejects_nested_objects() {
        ContextStore::scope(async {
            let mut nested = IndexMap::new();
            nested.insert("k".to_string(), Value::from("v"));
            let result = ContextStore::bind([("bad".to_string(), Value::Object(nested))]);
            assert!(result.is_err());
        })
        .await;
    }
}
