use crate::state::{AppState, LogEntry, PricePoint, SessionSnapshot};
use axum::extract::{Query, State};
use axum::response::Json;
use std::sync::Arc;

#[derive(serde::Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

/// GET /api/state -- current session snapshot (from watch channel, no lock)
pub async fn get_state(
    State(state): State<Arc<AppState>>,
) -> Json<SessionSnapshot> {
    let snapshot = state.snapshot_rx.borrow().clone();
    Json(snapshot)
}

/// GET /api/history -- rolling price window, oldest first
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LimitQuery>,
) -> Json<Vec<PricePoint>> {
    let history = state.snapshot_rx.borrow().history.clone();
    Json(tail(history, params.limit))
}

/// GET /api/logs -- session log window, oldest first
pub async fn get_logs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LimitQuery>,
) -> Json<Vec<LogEntry>> {
    let logs = state.snapshot_rx.borrow().logs.clone();
    Json(tail(logs, params.limit))
}

/// GET /api/counters -- performance counters (lock-free reads)
pub async fn get_counters(
    State(state): State<Arc<AppState>>,
) -> Json<serde_json::Value> {
    use portable_atomic::Ordering::Relaxed;
    Json(serde_json::json!({
        "ticks_processed": state.counters.ticks_processed.load(Relaxed),
        "ticks_skipped": state.counters.ticks_skipped.load(Relaxed),
        "synthetic_fallbacks": state.counters.synthetic_fallbacks.load(Relaxed),
        "analyses_run": state.counters.analyses_run.load(Relaxed),
        "ws_messages_sent": state.counters.ws_messages_sent.load(Relaxed),
    }))
}

/// Keep the newest `limit` items, preserving order.
fn tail<T>(mut items: Vec<T>, limit: Option<usize>) -> Vec<T> {
    if let Some(limit) = limit {
        if items.len() > limit {
            items.drain(..items.len() - limit);
        }
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_keeps_newest() {
        assert_eq!(tail(vec![1, 2, 3, 4], Some(2)), vec![3, 4]);
        assert_eq!(tail(vec![1, 2], Some(5)), vec![1, 2]);
        assert_eq!(tail(vec![1, 2], None), vec![1, 2]);
        assert!(tail(vec![1, 2], Some(0)).is_empty());
    }

    #[tokio::test]
    async fn test_state_reads_latest_snapshot() {
        let state = AppState::new(crate::config::AppConfig::default());
        let Json(snap) = get_state(State(Arc::clone(&state))).await;
        assert_eq!(snap.analysis, crate::state::INITIAL_ANALYSIS);

        let Json(logs) = get_logs(State(state), Query(LimitQuery { limit: Some(10) })).await;
        assert!(logs.is_empty());
    }
}
