// =============================================================================
// redis_store.rs — THE PRODUCTION STORE
// =============================================================================
//
// MovementStore over Redis. Layout:
//
//   andamento:cases                  hash   case id → MonitoredCase JSON
//   andamento:markers                hash   case id → Marker JSON
//   andamento:movements:{case_id}    hash   external id → Movement JSON
//   andamento:logs                   list   MonitorLogEntry JSON, append-only
//   andamento:inbox                  zset   NotificationItem JSON, scored by
//                                           creation timestamp
//
// Notifications are additionally PUBLISHed to a pub/sub channel so the
// inbox UI hears about them in real time; the sorted set is the durable
// copy for when the UI was asleep. Pub/sub is fire-and-forget, and we
// don't want to forget.
//
// Exactly-once lives in one command: HSETNX on the per-case movement
// hash. If the field already exists, the insert reports Duplicate and
// writes nothing. That is the store-level uniqueness constraint on
// (process_id, external_id) — the sole safeguard against double-insertion
// on retried or overlapping runs.
//
// The marker read-then-write in insert_movement is not atomic, which is
// fine: writes are scoped to a single case's rows and no case pipeline
// runs concurrently with itself.
// =============================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::models::{
    Marker, MonitorLogEntry, MonitoredCase, Movement, NotificationItem,
};
use crate::store::{advances, InsertOutcome, MovementStore, StoreError};

const CASES_KEY: &str = "andamento:cases";
const MARKERS_KEY: &str = "andamento:markers";
const LOGS_KEY: &str = "andamento:logs";
const INBOX_KEY: &str = "andamento:inbox";

pub struct RedisStore {
    con: redis::aio::MultiplexedConnection,
    notification_channel: String,
}

impl RedisStore {
    /// Connect and hold a multiplexed connection. The connection is cheap
    /// to clone, so every operation works on its own handle.
    pub async fn connect(url: &str, notification_channel: String) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let con = client.get_multiplexed_async_connection().await?;
        info!(url = url, "Redis store connected — the docket has a home");
        Ok(Self {
            con,
            notification_channel,
        })
    }

    fn movements_key(process_id: &str) -> String {
        format!("andamento:movements:{process_id}")
    }

    fn backend(e: impl std::fmt::Display) -> StoreError {
        StoreError::Backend(e.to_string())
    }
}

#[async_trait]
impl MovementStore for RedisStore {
    async fn monitored_cases(&self) -> Result<Vec<MonitoredCase>, StoreError> {
        let mut con = self.con.clone();
        let raw: HashMap<String, String> =
            con.hgetall(CASES_KEY).await.map_err(Self::backend)?;

        let mut cases = Vec::with_capacity(raw.len());
        for (id, json) in raw {
            let case: MonitoredCase = serde_json::from_str(&json)
                .map_err(|e| StoreError::Backend(format!("case {id} is not valid JSON: {e}")))?;
            cases.push(case);
        }
        Ok(cases)
    }

    async fn latest_marker(&self, process_id: &str) -> Result<Marker, StoreError> {
        let mut con = self.con.clone();
        let raw: Option<String> = con
            .hget(MARKERS_KEY, process_id)
            .await
            .map_err(Self::backend)?;

        match raw {
            None => Ok(Marker::NONE),
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| StoreError::Backend(format!("marker for {process_id}: {e}"))),
        }
    }

    async fn insert_movement(&self, movement: &Movement) -> Result<InsertOutcome, StoreError> {
        let mut con = self.con.clone();
        let key = Self::movements_key(&movement.process_id);
        let field = movement.external_id.to_string();
        let json = serde_json::to_string(movement).map_err(Self::backend)?;

        // HSETNX: writes only if the field is absent. One command, one
        // uniqueness constraint.
        let created: bool = con
            .hset_nx(&key, &field, &json)
            .await
            .map_err(Self::backend)?;

        if !created {
            debug!(
                process_id = movement.process_id.as_str(),
                external_id = movement.external_id,
                "movement already persisted — HSETNX says no"
            );
            return Ok(InsertOutcome::Duplicate);
        }

        let current = self.latest_marker(&movement.process_id).await?;
        if advances(current, movement) {
            let marker = Marker {
                date: Some(movement.movement_date),
                external_id: movement.external_id,
            };
            let marker_json = serde_json::to_string(&marker).map_err(Self::backend)?;
            let _: () = con
                .hset(MARKERS_KEY, &movement.process_id, marker_json)
                .await
                .map_err(Self::backend)?;
        }

        Ok(InsertOutcome::Inserted)
    }

    async fn mark_checked(
        &self,
        process_id: &str,
        summary: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut con = self.con.clone();
        let raw: Option<String> = con
            .hget(CASES_KEY, process_id)
            .await
            .map_err(Self::backend)?;

        let mut case: MonitoredCase = match raw {
            None => return Err(StoreError::CaseNotFound(process_id.to_string())),
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| StoreError::Backend(format!("case {process_id}: {e}")))?,
        };

        case.last_checked_at = Some(at);
        if let Some(text) = summary {
            case.last_movement_summary = Some(text.to_string());
        }

        let json = serde_json::to_string(&case).map_err(Self::backend)?;
        let _: () = con
            .hset(CASES_KEY, process_id, json)
            .await
            .map_err(Self::backend)?;
        Ok(())
    }

    async fn append_log(&self, entry: &MonitorLogEntry) -> Result<(), StoreError> {
        let mut con = self.con.clone();
        let json = serde_json::to_string(entry).map_err(Self::backend)?;
        let _: () = con.rpush(LOGS_KEY, json).await.map_err(Self::backend)?;
        Ok(())
    }

    async fn create_notification(&self, item: &NotificationItem) -> Result<(), StoreError> {
        let mut con = self.con.clone();
        let json = serde_json::to_string(item).map_err(Self::backend)?;

        // Durable copy first, scored by creation time so the inbox reads
        // chronologically.
        let score = item.created_at.timestamp() as f64;
        let _: () = con
            .zadd(INBOX_KEY, &json, score)
            .await
            .map_err(Self::backend)?;

        // Then the real-time nudge.
        let _: () = con
            .publish(&self.notification_channel, &json)
            .await
            .map_err(Self::backend)?;

        debug!(
            kind = %item.kind,
            reference_id = item.reference_id.as_str(),
            "notification persisted and published"
        );
        Ok(())
    }
}
