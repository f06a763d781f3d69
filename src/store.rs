// =============================================================================
// store.rs — THE PERSISTENCE SEAM
// =============================================================================
//
// The monitor's entire view of the outside database, as a trait. Six
// operations, no more: list the tracked cases, read a case's marker,
// insert a movement exactly once, advance a case's checked state, append
// an audit entry, create a notification. Storage engine internals are
// somebody else's problem.
//
// Two implementations ship:
// - `MemoryStore` — parking_lot maps; what every test in this crate runs
//   against.
// - `RedisStore` (redis_store.rs) — the production one.
//
// The single most important contract here is `insert_movement`: the pair
// (process_id, external_id) is unique, and a second insert of the same
// pair is a reported no-op, not an error and DEFINITELY not a second row.
// That constraint is the only concurrency safeguard against retried or
// overlapping runs, so an implementation that doesn't enforce it isn't an
// implementation.
// =============================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use parking_lot::RwLock;
#[cfg(test)]
use std::collections::HashMap;
use thiserror::Error;

use crate::models::{
    Marker, MonitorLogEntry, MonitoredCase, Movement, NotificationItem,
};

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("case {0} not found")]
    CaseNotFound(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// What happened when we tried to insert a movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The (process_id, external_id) pair already exists. No-op.
    Duplicate,
}

#[async_trait]
pub trait MovementStore: Send + Sync {
    /// Read view of every tracked case. The rows pre-exist; we never
    /// create or delete them.
    async fn monitored_cases(&self) -> Result<Vec<MonitoredCase>, StoreError>;

    /// The (date, external id) of the most recently persisted movement
    /// for this case, or `Marker::NONE` if none exists.
    async fn latest_marker(&self, process_id: &str) -> Result<Marker, StoreError>;

    /// Insert one movement, idempotent by (process_id, external_id).
    async fn insert_movement(&self, movement: &Movement) -> Result<InsertOutcome, StoreError>;

    /// Advance the case's checked state: always `last_checked_at`, and
    /// `last_movement_summary` too when `summary` is Some. These are the
    /// only two MonitoredCase fields this subsystem may touch.
    async fn mark_checked(
        &self,
        process_id: &str,
        summary: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Append one audit entry. Append-only; there is no read API here
    /// because the monitor never reads its own trail.
    async fn append_log(&self, entry: &MonitorLogEntry) -> Result<(), StoreError>;

    /// Create one inbox entry. Marked read later by the UI, not by us.
    async fn create_notification(&self, item: &NotificationItem) -> Result<(), StoreError>;
}

// =============================================================================
// MemoryStore
// =============================================================================

#[cfg(test)]
#[derive(Default)]
struct MemoryInner {
    cases: HashMap<String, MonitoredCase>,
    movements: HashMap<(String, i64), Movement>,
    markers: HashMap<String, Marker>,
    logs: Vec<MonitorLogEntry>,
    notifications: Vec<NotificationItem>,
}

/// In-memory store. Enforces the same invariants as the real one, which
/// is the entire point — the scenario tests exercise exactly-once
/// semantics against this.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a tracked case, standing in for the case-management UI.
    pub fn seed_case(&self, case: MonitoredCase) {
        self.inner.write().cases.insert(case.id.clone(), case);
    }

    pub fn case(&self, process_id: &str) -> Option<MonitoredCase> {
        self.inner.read().cases.get(process_id).cloned()
    }

    /// All persisted movements for one case, any order.
    pub fn movements_for(&self, process_id: &str) -> Vec<Movement> {
        self.inner
            .read()
            .movements
            .values()
            .filter(|m| m.process_id == process_id)
            .cloned()
            .collect()
    }

    pub fn logs(&self) -> Vec<MonitorLogEntry> {
        self.inner.read().logs.clone()
    }

    pub fn notifications(&self) -> Vec<NotificationItem> {
        self.inner.read().notifications.clone()
    }
}

/// Does this movement advance the stored marker? Shared with the Redis
/// implementation so both stores agree on what "latest" means.
pub(crate) fn advances(marker: Marker, movement: &Movement) -> bool {
    match marker.date {
        None => true,
        Some(d) => {
            movement.movement_date > d
                || (movement.movement_date == d && movement.external_id > marker.external_id)
        }
    }
}

#[cfg(test)]
#[async_trait]
impl MovementStore for MemoryStore {
    async fn monitored_cases(&self) -> Result<Vec<MonitoredCase>, StoreError> {
        Ok(self.inner.read().cases.values().cloned().collect())
    }

    async fn latest_marker(&self, process_id: &str) -> Result<Marker, StoreError> {
        Ok(self
            .inner
            .read()
            .markers
            .get(process_id)
            .copied()
            .unwrap_or(Marker::NONE))
    }

    async fn insert_movement(&self, movement: &Movement) -> Result<InsertOutcome, StoreError> {
        let mut inner = self.inner.write();
        let key = (movement.process_id.clone(), movement.external_id);

        if inner.movements.contains_key(&key) {
            return Ok(InsertOutcome::Duplicate);
        }
        inner.movements.insert(key, movement.clone());

        let current = inner
            .markers
            .get(&movement.process_id)
            .copied()
            .unwrap_or(Marker::NONE);
        if advances(current, movement) {
            inner.markers.insert(
                movement.process_id.clone(),
                Marker {
                    date: Some(movement.movement_date),
                    external_id: movement.external_id,
                },
            );
        }

        Ok(InsertOutcome::Inserted)
    }

    async fn mark_checked(
        &self,
        process_id: &str,
        summary: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let case = inner
            .cases
            .get_mut(process_id)
            .ok_or_else(|| StoreError::CaseNotFound(process_id.to_string()))?;

        case.last_checked_at = Some(at);
        if let Some(text) = summary {
            case.last_movement_summary = Some(text.to_string());
        }
        Ok(())
    }

    async fn append_log(&self, entry: &MonitorLogEntry) -> Result<(), StoreError> {
        self.inner.write().logs.push(entry.clone());
        Ok(())
    }

    async fn create_notification(&self, item: &NotificationItem) -> Result<(), StoreError> {
        self.inner.write().notifications.push(item.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MovementType;
    use chrono::{NaiveDate, TimeZone};

    fn movement(id: i64, day: u32) -> Movement {
        Movement {
            process_id: "case-1".into(),
            external_id: id,
            movement_date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            movement_type: MovementType::Despacho,
            full_text: "despacho".into(),
            is_relevant: true,
        }
    }

    #[tokio::test]
    async fn test_insert_is_exactly_once() {
        let store = MemoryStore::new();
        let m = movement(60, 15);
        assert_eq!(
            store.insert_movement(&m).await.unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(
            store.insert_movement(&m).await.unwrap(),
            InsertOutcome::Duplicate
        );
        assert_eq!(store.movements_for("case-1").len(), 1);
    }

    #[tokio::test]
    async fn test_marker_advances_with_inserts() {
        let store = MemoryStore::new();
        assert_eq!(store.latest_marker("case-1").await.unwrap(), Marker::NONE);

        store.insert_movement(&movement(56, 11)).await.unwrap();
        store.insert_movement(&movement(60, 15)).await.unwrap();
        // Older insert after newer must not regress the marker.
        store.insert_movement(&movement(50, 9)).await.unwrap();

        let marker = store.latest_marker("case-1").await.unwrap();
        assert_eq!(marker.external_id, 60);
        assert_eq!(marker.date, NaiveDate::from_ymd_opt(2024, 1, 15));
    }

    #[tokio::test]
    async fn test_mark_checked_touches_only_its_two_fields() {
        let store = MemoryStore::new();
        store.seed_case(MonitoredCase {
            id: "case-1".into(),
            number: "0001234-56.2024.8.26.0100".into(),
            last_movement_summary: Some("old summary".into()),
            last_checked_at: None,
            owner_id: "owner-1".into(),
        });

        let at = chrono::Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

        // Empty-batch success path: timestamp only.
        store.mark_checked("case-1", None, at).await.unwrap();
        let case = store.case("case-1").unwrap();
        assert_eq!(case.last_checked_at, Some(at));
        assert_eq!(case.last_movement_summary.as_deref(), Some("old summary"));

        // Non-empty batch path: both.
        store
            .mark_checked("case-1", Some("Sentença publicada"), at)
            .await
            .unwrap();
        let case = store.case("case-1").unwrap();
        assert_eq!(
            case.last_movement_summary.as_deref(),
            Some("Sentença publicada")
        );
    }

    #[tokio::test]
    async fn test_mark_checked_unknown_case_is_an_error() {
        let store = MemoryStore::new();
        let at = chrono::Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        assert!(matches!(
            store.mark_checked("ghost", None, at).await,
            Err(StoreError::CaseNotFound(_))
        ));
    }
}
