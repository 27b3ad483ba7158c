//! Snapshot & persistence loop (C7): coalesce changes, honour the minimum
//! aggregation interval, and emit atomic snapshots to storage.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use loxone_core::model::{Building, ChangeClass};
use loxone_data::DieselPool;

/// A persist attempt: acquires the data lock, does nothing if nothing
/// changed, otherwise writes one row per non-empty room inside a single
/// transaction. A storage failure is logged and swallowed — the caller's
/// state is left untouched so the next trigger retries.
pub async fn attempt(building: &Arc<Mutex<Building>>, pool: &DieselPool) -> bool {
    let mut guard = building.lock().await;
    if guard.change == ChangeClass::No {
        return false;
    }

    let now = Utc::now();
    let at = DateTime::<Utc>::from_timestamp(now.timestamp(), 0).unwrap_or(now);
    let snapshots = guard.snapshots();

    match loxone_data::persist_snapshot(pool.clone(), snapshots, at).await {
        Ok(()) => {
            guard.mark_persisted(at.timestamp());
            true
        }
        Err(error) => {
            tracing::warn!(%error, "persist failed, will retry on next trigger");
            false
        }
    }
}

/// The event-driven trigger decision: persist immediately on an `Immediate`
/// change, or on a `Later` change once the aggregation window has elapsed.
/// Pure and synchronous so it can be exercised without a database.
fn should_persist_now(change: ChangeClass, last_persisted: Option<i64>, now: i64, max_aggregation_secs: i64) -> bool {
    match change {
        ChangeClass::Immediate => true,
        ChangeClass::Later => {
            let elapsed = last_persisted.map(|last| now - last).unwrap_or(i64::MAX);
            elapsed >= max_aggregation_secs
        }
        ChangeClass::No => false,
    }
}

/// Called once per ingest batch: persist immediately on an `Immediate`
/// change, or on a `Later` change once the aggregation window has elapsed.
pub async fn after_ingest_batch(
    building: &Arc<Mutex<Building>>,
    pool: &DieselPool,
    max_aggregation: Duration,
) -> bool {
    let should_try = {
        let guard = building.lock().await;
        should_persist_now(guard.change, guard.last_persisted, Utc::now().timestamp(), max_aggregation.as_secs() as i64)
    };
    if should_try { attempt(building, pool).await } else { false }
}

/// The time-driven half: wakes every `max_aggregation` and attempts a
/// persist unconditionally (subject to `attempt`'s own `change != No`
/// guard). Runs until the task is cancelled by the supervisor; the `Ok`
/// return type is never actually produced in practice.
pub async fn scheduled_loop(building: Arc<Mutex<Building>>, pool: DieselPool, max_aggregation: Duration) -> crate::error::Result<()> {
    let mut ticker = tokio::time::interval(max_aggregation);
    ticker.tick().await; // first tick fires immediately; skip it
    loop {
        ticker.tick().await;
        attempt(&building, &pool).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_change_never_persists() {
        assert!(!should_persist_now(ChangeClass::No, None, 1_000, 30));
        assert!(!should_persist_now(ChangeClass::No, Some(0), 1_000, 30));
    }

    #[test]
    fn immediate_change_persists_regardless_of_elapsed_time() {
        assert!(should_persist_now(ChangeClass::Immediate, Some(999), 1_000, 30));
        assert!(should_persist_now(ChangeClass::Immediate, None, 1_000, 30));
    }

    #[test]
    fn later_change_waits_for_the_aggregation_window() {
        // last persisted 10s ago, window is 30s: too soon.
        assert!(!should_persist_now(ChangeClass::Later, Some(990), 1_000, 30));
        // exactly at the window boundary: persists.
        assert!(should_persist_now(ChangeClass::Later, Some(970), 1_000, 30));
        // past the window: persists.
        assert!(should_persist_now(ChangeClass::Later, Some(900), 1_000, 30));
    }

    #[test]
    fn later_change_with_no_prior_persist_persists_immediately() {
        assert!(should_persist_now(ChangeClass::Later, None, 1_000, 30));
    }
}
