// =============================================================================
// monitor.rs — THE RUN ORCHESTRATOR
// =============================================================================
//
// One invocation = one run. The service selects the eligible cases, walks
// each through fetch → diff → persist → notify, and aggregates a summary
// for the HTTP caller. The rules that everything else bends around:
//
// - A failure on one case NEVER aborts or blocks another. Every per-case
//   error is caught at the case boundary, logged as `erro_api`, added to
//   the summary's errors array, and that's it.
// - A failed case keeps its `last_checked_at` untouched, so it stays
//   eligible and gets retried next run. No backoff, no attempt cap —
//   docket data must eventually be seen.
// - Aggregation happens by collecting per-case outcomes from the bounded
//   stream, exactly once per case, in whatever order they finish. No
//   shared mutable log buffer.
//
// Dependencies (store, fetcher, clock) are injected at construction.
// Nothing in here reads ambient global state; that's what config.rs and
// main.rs are for.
// =============================================================================

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::diff::{self, NewMovement};
use crate::fetcher::{DocketFetch, FetchError};
use crate::models::{
    truncate_chars, LogType, MonitorLogEntry, MonitoredCase, Movement, NotificationItem,
    NotificationPriority, NotificationType, RunError, RunSummary,
};
use crate::normalizer::normalize_cnj;
use crate::scheduler;
use crate::store::{InsertOutcome, MovementStore, StoreError};

/// Injected time source, so eligibility windows and timestamps are
/// testable without sleeping for a day.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The production clock. It tells the time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Everything that can go wrong with one case. All variants travel the
/// same road: `erro_api` audit entry, an errors-array slot, and an
/// untouched `last_checked_at`.
#[derive(Debug, Error)]
pub enum CaseError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("persistence failure: {0}")]
    Store(#[from] StoreError),

    #[error("run deadline exceeded before this case started")]
    DeadlineExceeded,
}

/// How a successfully checked case ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaseOutcome {
    /// New relevant movements persisted (the count).
    Found(usize),
    /// Checked, nothing actionable.
    NoChange,
}

/// One case's contribution to the run summary.
struct CaseReport {
    process_number: String,
    result: Result<CaseOutcome, CaseError>,
}

/// The monitor service. Construct once, trigger per run.
pub struct MonitorService {
    store: Arc<dyn MovementStore>,
    fetcher: Arc<dyn DocketFetch>,
    clock: Arc<dyn Clock>,
    config: Config,
}

impl MonitorService {
    pub fn new(
        store: Arc<dyn MovementStore>,
        fetcher: Arc<dyn DocketFetch>,
        clock: Arc<dyn Clock>,
        config: Config,
    ) -> Self {
        Self {
            store,
            fetcher,
            clock,
            config,
        }
    }

    /// Execute one run across all eligible cases and return the summary.
    pub async fn run(&self) -> RunSummary {
        let run_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let deadline = started + self.config.run_deadline;
        let now = self.clock.now();

        let all_cases = match self.store.monitored_cases().await {
            Ok(cases) => cases,
            Err(e) => {
                // Can't even list the cases. The run happened, it just
                // processed nobody; the error rides the summary.
                warn!(run_id = run_id.as_str(), error = %e, "failed to list monitored cases");
                return RunSummary {
                    run_id,
                    ok: true,
                    processed: 0,
                    consultas_ok: 0,
                    atualizacoes_encontradas: 0,
                    errors: vec![RunError {
                        process_number: "*".to_string(),
                        error: e.to_string(),
                    }],
                };
            }
        };

        let tracked = all_cases.len();
        let eligible = scheduler::eligible_cases(all_cases, now, self.config.recheck_interval);

        info!(
            run_id = run_id.as_str(),
            tracked = tracked,
            eligible = eligible.len(),
            workers = self.config.workers,
            "monitor run starting"
        );

        let reports: Vec<CaseReport> = stream::iter(eligible)
            .map(|case| self.check_case(&run_id, case, deadline))
            .buffer_unordered(self.config.workers)
            .collect()
            .await;

        let mut summary = RunSummary {
            run_id: run_id.clone(),
            ok: true,
            processed: reports.len(),
            consultas_ok: 0,
            atualizacoes_encontradas: 0,
            errors: Vec::new(),
        };

        for report in reports {
            match report.result {
                Ok(CaseOutcome::Found(_)) => {
                    summary.consultas_ok += 1;
                    summary.atualizacoes_encontradas += 1;
                }
                Ok(CaseOutcome::NoChange) => summary.consultas_ok += 1,
                Err(e) => summary.errors.push(RunError {
                    process_number: report.process_number,
                    error: e.to_string(),
                }),
            }
        }

        info!(
            run_id = run_id.as_str(),
            processed = summary.processed,
            consultas_ok = summary.consultas_ok,
            atualizacoes_encontradas = summary.atualizacoes_encontradas,
            errors = summary.errors.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "monitor run finished"
        );

        summary
    }

    /// The per-case pipeline: fetch → diff → persist → notify. Strictly
    /// sequential within one case; the worker pool only parallelizes
    /// across cases.
    async fn check_case(
        &self,
        run_id: &str,
        case: MonitoredCase,
        deadline: Instant,
    ) -> CaseReport {
        let number = normalize_cnj(&case.number);

        if Instant::now() >= deadline {
            return self
                .fail_case(run_id, &case, &number, CaseError::DeadlineExceeded)
                .await;
        }

        let fetched = match self.fetcher.fetch_movements(&number).await {
            Ok(items) => items,
            Err(e) => return self.fail_case(run_id, &case, &number, e.into()).await,
        };

        let marker = match self.store.latest_marker(&case.id).await {
            Ok(m) => m,
            Err(e) => return self.fail_case(run_id, &case, &number, e.into()).await,
        };

        let batch = diff::new_relevant_movements(&fetched, marker);
        let now = self.clock.now();

        info!(
            run_id = run_id,
            process_id = case.id.as_str(),
            process_number = number.as_str(),
            fetched = fetched.len(),
            new_relevant = batch.len(),
            "consulta realizada"
        );
        self.audit(
            &case,
            &number,
            LogType::ConsultaRealizada,
            format!("Consulta realizada: {} movimentações retornadas", fetched.len()),
            json!({ "run_id": run_id, "items": fetched.len(), "novas": batch.len() }),
            now,
        )
        .await;

        let outcome = if batch.is_empty() {
            // Checked, nothing actionable. Advance the timestamp only.
            if let Err(e) = self.store.mark_checked(&case.id, None, now).await {
                return self.fail_case(run_id, &case, &number, e.into()).await;
            }
            CaseOutcome::NoChange
        } else {
            match self.persist_batch(run_id, &case, &number, &batch, now).await {
                Ok(()) => CaseOutcome::Found(batch.len()),
                Err(e) => return self.fail_case(run_id, &case, &number, e).await,
            }
        };

        // The always-on system note, one per successfully checked case.
        // Looks redundant next to the Andamento notification; the inbox
        // feed consumes both. Keep both.
        let description = match outcome {
            CaseOutcome::Found(n) => {
                format!("Processo {number}: {n} nova(s) movimentação(ões) relevante(s)")
            }
            CaseOutcome::NoChange => format!("Processo {number}: sem novidades"),
        };
        let sistema = NotificationItem::new(
            NotificationType::Sistema,
            NotificationPriority::Normal,
            "Monitoramento de processos".to_string(),
            description,
            case.id.clone(),
            case.owner_id.clone(),
            now,
        );
        self.notify(&case, sistema).await;

        CaseReport {
            process_number: number,
            result: Ok(outcome),
        }
    }

    /// Persist a non-empty batch: insert every movement (duplicates are
    /// no-ops — the store's uniqueness constraint has spoken), update the
    /// case's denormalized summary + checked timestamp, write the audit
    /// entry, and raise the high-priority notification.
    async fn persist_batch(
        &self,
        run_id: &str,
        case: &MonitoredCase,
        number: &str,
        batch: &[NewMovement],
        now: DateTime<Utc>,
    ) -> Result<(), CaseError> {
        for new in batch {
            let movement = Movement {
                process_id: case.id.clone(),
                external_id: new.movement.external_id,
                movement_date: new.movement.date,
                movement_type: new.movement_type,
                full_text: new.movement.conteudo.clone(),
                // Always true for anything the diff engine let through.
                is_relevant: new.movement_type.is_relevant(),
            };
            match self.store.insert_movement(&movement).await? {
                InsertOutcome::Inserted => {}
                InsertOutcome::Duplicate => {
                    // Another run got here first. The invariant held;
                    // nothing to do.
                    warn!(
                        run_id = run_id,
                        process_id = case.id.as_str(),
                        external_id = movement.external_id,
                        "movement already persisted, skipping"
                    );
                }
            }
        }

        // batch is newest-first, so [0] is the freshest movement and the
        // one the case list screen should show.
        let newest = &batch[0].movement;
        let summary = truncate_chars(&newest.conteudo, self.config.summary_max_chars);
        self.store
            .mark_checked(&case.id, Some(&summary), now)
            .await?;

        let types: Vec<String> = batch.iter().map(|n| n.movement_type.to_string()).collect();
        info!(
            run_id = run_id,
            process_id = case.id.as_str(),
            process_number = number,
            count = batch.len(),
            types = ?types,
            "atualização encontrada"
        );
        self.audit(
            case,
            number,
            LogType::AtualizacaoEncontrada,
            format!("{} nova(s) movimentação(ões) relevante(s)", batch.len()),
            json!({ "run_id": run_id, "count": batch.len(), "tipos": types }),
            now,
        )
        .await;

        let preview = truncate_chars(&newest.conteudo, self.config.preview_max_chars);
        let andamento = NotificationItem::new(
            NotificationType::Andamento,
            NotificationPriority::Alta,
            format!("Nova movimentação no processo {number}"),
            format!(
                "{} nova(s) movimentação(ões). Mais recente: {}",
                batch.len(),
                preview
            ),
            case.id.clone(),
            case.owner_id.clone(),
            now,
        );
        self.notify(case, andamento).await;

        Ok(())
    }

    /// Best-effort notification write. By the time a notification exists
    /// the movements, marker and case row are already committed, so a
    /// broken inbox must not flip the case into the error path: the case
    /// would report failed yet skip its next run, and with the marker
    /// advanced a retry could never re-emit the notification anyway.
    async fn notify(&self, case: &MonitoredCase, item: NotificationItem) {
        if let Err(e) = self.store.create_notification(&item).await {
            warn!(
                process_id = case.id.as_str(),
                kind = %item.kind,
                error = %e,
                "failed to create notification"
            );
        }
    }

    /// The per-case error road. Logs `erro_api`, leaves `last_checked_at`
    /// strictly alone, and hands the error to the summary. The case will
    /// be back next run.
    async fn fail_case(
        &self,
        run_id: &str,
        case: &MonitoredCase,
        number: &str,
        error: CaseError,
    ) -> CaseReport {
        warn!(
            run_id = run_id,
            process_id = case.id.as_str(),
            process_number = number,
            error = %error,
            "case check failed — will retry next run"
        );
        self.audit(
            case,
            number,
            LogType::ErroApi,
            format!("Falha ao consultar o processo: {error}"),
            json!({ "run_id": run_id, "error": error.to_string() }),
            self.clock.now(),
        )
        .await;

        CaseReport {
            process_number: number.to_string(),
            result: Err(error),
        }
    }

    /// Best-effort audit append. A broken audit trail is worth a log
    /// line, not a failed case.
    async fn audit(
        &self,
        case: &MonitoredCase,
        number: &str,
        log_type: LogType,
        message: String,
        details: serde_json::Value,
        at: DateTime<Utc>,
    ) {
        let entry = MonitorLogEntry {
            process_id: case.id.clone(),
            process_number: number.to_string(),
            log_type,
            message,
            details,
            created_at: at,
        };
        if let Err(e) = self.store.append_log(&entry).await {
            warn!(
                process_id = case.id.as_str(),
                log_type = %entry.log_type,
                error = %e,
                "failed to append audit entry"
            );
        }
    }
}

// =============================================================================
// Tests — the scenario suite runs the whole pipeline against MemoryStore,
// a scripted fetcher, and a settable clock.
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FetchedMovement, Marker, MovementType};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone};
    use parking_lot::RwLock;
    use std::collections::HashMap;
    use std::time::Duration;

    struct FixedClock(RwLock<DateTime<Utc>>);

    impl FixedClock {
        fn at(t: DateTime<Utc>) -> Arc<Self> {
            Arc::new(Self(RwLock::new(t)))
        }
        fn advance(&self, d: chrono::Duration) {
            let mut now = self.0.write();
            *now += d;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.read()
        }
    }

    /// Scripted fetcher: every normalized number maps to a canned answer.
    struct FakeDocket {
        responses: RwLock<HashMap<String, Result<Vec<FetchedMovement>, FetchError>>>,
    }

    impl FakeDocket {
        fn new() -> Self {
            Self {
                responses: RwLock::new(HashMap::new()),
            }
        }
        fn script(&self, number: &str, result: Result<Vec<FetchedMovement>, FetchError>) {
            self.responses.write().insert(number.to_string(), result);
        }
    }

    #[async_trait]
    impl DocketFetch for FakeDocket {
        async fn fetch_movements(
            &self,
            number: &str,
        ) -> Result<Vec<FetchedMovement>, FetchError> {
            self.responses
                .read()
                .get(number)
                .cloned()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn test_config() -> Config {
        Config {
            docket_api_token: Some("token".into()),
            docket_base_url: "http://unused".into(),
            fetch_limit: 100,
            fetch_timeout: Duration::from_secs(5),
            recheck_interval: Duration::from_secs(86_400),
            workers: 1,
            run_deadline: Duration::from_secs(600),
            redis_url: "redis://unused".into(),
            notification_channel: "unused".into(),
            summary_max_chars: 500,
            preview_max_chars: 120,
            http_port: 0,
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn case(id: &str, number: &str) -> MonitoredCase {
        MonitoredCase {
            id: id.to_string(),
            number: number.to_string(),
            last_movement_summary: None,
            last_checked_at: None,
            owner_id: "owner-1".to_string(),
        }
    }

    fn mv(id: i64, date: &str, tipo: &str, conteudo: &str) -> FetchedMovement {
        FetchedMovement {
            external_id: id,
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            tipo: tipo.to_string(),
            conteudo: conteudo.to_string(),
        }
    }

    fn service(
        store: Arc<MemoryStore>,
        docket: Arc<FakeDocket>,
        clock: Arc<FixedClock>,
    ) -> MonitorService {
        MonitorService::new(store, docket, clock, test_config())
    }

    #[tokio::test]
    async fn test_scenario_a_fresh_case_with_three_relevant_movements() {
        let store = Arc::new(MemoryStore::new());
        let docket = Arc::new(FakeDocket::new());
        let clock = FixedClock::at(fixed_now());

        store.seed_case(case("case-1", "12345678901234567890"));
        docket.script(
            "1234567-89.0123.4.56.7890",
            Ok(vec![
                mv(3, "2024-05-30", "Sentença", "Sentença de procedência publicada"),
                mv(2, "2024-05-20", "Despacho", "Despacho saneador"),
                mv(1, "2024-05-10", "Intimação", "Intimação da parte autora"),
            ]),
        );

        let summary = service(store.clone(), docket, clock).run().await;

        assert!(summary.ok);
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.consultas_ok, 1);
        assert_eq!(summary.atualizacoes_encontradas, 1);
        assert!(summary.errors.is_empty());

        let movements = store.movements_for("case-1");
        assert_eq!(movements.len(), 3);
        assert!(movements.iter().all(|m| m.is_relevant));

        let updated = store.case("case-1").unwrap();
        assert_eq!(
            updated.last_movement_summary.as_deref(),
            Some("Sentença de procedência publicada")
        );
        assert_eq!(updated.last_checked_at, Some(fixed_now()));

        let alta: Vec<_> = store
            .notifications()
            .into_iter()
            .filter(|n| n.kind == NotificationType::Andamento)
            .collect();
        assert_eq!(alta.len(), 1);
        assert_eq!(alta[0].priority, NotificationPriority::Alta);
        assert!(alta[0].description.starts_with("3 nova(s)"));
    }

    #[tokio::test]
    async fn test_scenario_b_marker_tiebreak_through_the_full_pipeline() {
        let store = Arc::new(MemoryStore::new());
        let docket = Arc::new(FakeDocket::new());
        let clock = FixedClock::at(fixed_now());

        store.seed_case(case("case-1", "12345678901234567890"));
        // Prior run persisted up to (2024-01-10, 55).
        store
            .insert_movement(&Movement {
                process_id: "case-1".into(),
                external_id: 55,
                movement_date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
                movement_type: MovementType::Sentenca,
                full_text: "Sentença".into(),
                is_relevant: true,
            })
            .await
            .unwrap();
        assert_eq!(
            store.latest_marker("case-1").await.unwrap(),
            Marker {
                date: NaiveDate::from_ymd_opt(2024, 1, 10),
                external_id: 55
            }
        );

        docket.script(
            "1234567-89.0123.4.56.7890",
            Ok(vec![
                mv(60, "2024-01-15", "Despacho", "Despacho de especificação de provas"),
                mv(56, "2024-01-11", "Decisão", "Decisão sobre tutela"),
                mv(55, "2024-01-10", "Sentença", "Sentença"),
                mv(54, "2024-01-10", "Despacho", "Despacho antigo"),
            ]),
        );

        let summary = service(store.clone(), docket, clock).run().await;
        assert_eq!(summary.atualizacoes_encontradas, 1);

        // 1 pre-existing + ids 60 and 56; the walk stopped at 55.
        let mut ids: Vec<i64> = store
            .movements_for("case-1")
            .iter()
            .map(|m| m.external_id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec![55, 56, 60]);
    }

    #[tokio::test]
    async fn test_scenario_c_one_failure_among_five() {
        let store = Arc::new(MemoryStore::new());
        let docket = Arc::new(FakeDocket::new());
        let clock = FixedClock::at(fixed_now());

        for i in 1..=5 {
            store.seed_case(case(&format!("case-{i}"), &format!("number-{i}")));
            docket.script(&format!("number-{i}"), Ok(Vec::new()));
        }
        docket.script(
            "number-3",
            Err(FetchError::Http {
                status: 503,
                detail: "Service Unavailable".into(),
            }),
        );

        let summary = service(store.clone(), docket, clock).run().await;

        assert!(summary.ok);
        assert_eq!(summary.processed, 5);
        assert_eq!(summary.consultas_ok, 4);
        assert_eq!(summary.atualizacoes_encontradas, 0);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].process_number, "number-3");
        assert!(summary.errors[0].error.contains("503"));

        // The failed case keeps its null timestamp and stays eligible.
        assert!(store.case("case-3").unwrap().last_checked_at.is_none());
        // Its neighbors were checked.
        assert!(store.case("case-2").unwrap().last_checked_at.is_some());
        assert!(store.case("case-4").unwrap().last_checked_at.is_some());
    }

    #[tokio::test]
    async fn test_failure_isolation_neighbors_fully_processed() {
        let store = Arc::new(MemoryStore::new());
        let docket = Arc::new(FakeDocket::new());
        let clock = FixedClock::at(fixed_now());

        for i in 1..=3 {
            store.seed_case(case(&format!("case-{i}"), &format!("number-{i}")));
        }
        docket.script(
            "number-1",
            Ok(vec![mv(1, "2024-05-30", "Sentença", "Sentença um")]),
        );
        docket.script("number-2", Err(FetchError::Network("timeout".into())));
        docket.script(
            "number-3",
            Ok(vec![mv(1, "2024-05-30", "Despacho", "Despacho três")]),
        );

        let summary = service(store.clone(), docket, clock).run().await;

        assert_eq!(summary.processed, 3);
        assert_eq!(summary.consultas_ok, 2);
        assert_eq!(summary.atualizacoes_encontradas, 2);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(store.movements_for("case-1").len(), 1);
        assert_eq!(store.movements_for("case-2").len(), 0);
        assert_eq!(store.movements_for("case-3").len(), 1);
    }

    #[tokio::test]
    async fn test_second_run_a_day_later_finds_nothing_new() {
        let store = Arc::new(MemoryStore::new());
        let docket = Arc::new(FakeDocket::new());
        let clock = FixedClock::at(fixed_now());

        store.seed_case(case("case-1", "number-1"));
        docket.script(
            "number-1",
            Ok(vec![
                mv(2, "2024-05-30", "Sentença", "Sentença"),
                mv(1, "2024-05-10", "Despacho", "Despacho"),
            ]),
        );

        let svc = service(store.clone(), docket, clock.clone());

        let first = svc.run().await;
        assert_eq!(first.atualizacoes_encontradas, 1);
        assert_eq!(store.movements_for("case-1").len(), 2);

        // 25 hours later, same docket answer: eligible again, fetched
        // again, and the marker walk finds nothing.
        clock.advance(chrono::Duration::hours(25));
        let second = svc.run().await;
        assert_eq!(second.processed, 1);
        assert_eq!(second.consultas_ok, 1);
        assert_eq!(second.atualizacoes_encontradas, 0);
        assert_eq!(store.movements_for("case-1").len(), 2);
    }

    #[tokio::test]
    async fn test_recently_checked_case_is_skipped_entirely() {
        let store = Arc::new(MemoryStore::new());
        let docket = Arc::new(FakeDocket::new());
        let clock = FixedClock::at(fixed_now());

        let mut c = case("case-1", "number-1");
        c.last_checked_at = Some(fixed_now() - chrono::Duration::hours(2));
        store.seed_case(c);

        let summary = service(store.clone(), docket, clock).run().await;
        assert_eq!(summary.processed, 0);
        assert!(store.notifications().is_empty());
        assert!(store.logs().is_empty());
    }

    #[tokio::test]
    async fn test_dual_notifications_on_empty_and_non_empty_batches() {
        let store = Arc::new(MemoryStore::new());
        let docket = Arc::new(FakeDocket::new());
        let clock = FixedClock::at(fixed_now());

        store.seed_case(case("case-quiet", "number-quiet"));
        store.seed_case(case("case-busy", "number-busy"));
        docket.script("number-quiet", Ok(Vec::new()));
        docket.script(
            "number-busy",
            Ok(vec![mv(1, "2024-05-30", "Intimação", "Intimação urgente")]),
        );

        service(store.clone(), docket, clock).run().await;

        let notifications = store.notifications();
        let sistema = notifications
            .iter()
            .filter(|n| n.kind == NotificationType::Sistema)
            .count();
        let andamento = notifications
            .iter()
            .filter(|n| n.kind == NotificationType::Andamento)
            .count();
        // One Sistema per checked case, one Andamento for the busy one.
        assert_eq!(sistema, 2);
        assert_eq!(andamento, 1);
    }

    /// Store whose inbox writes always fail; everything else delegates.
    struct BrokenInboxStore {
        inner: Arc<MemoryStore>,
    }

    #[async_trait]
    impl MovementStore for BrokenInboxStore {
        async fn monitored_cases(&self) -> Result<Vec<MonitoredCase>, StoreError> {
            self.inner.monitored_cases().await
        }
        async fn latest_marker(&self, process_id: &str) -> Result<Marker, StoreError> {
            self.inner.latest_marker(process_id).await
        }
        async fn insert_movement(&self, movement: &Movement) -> Result<InsertOutcome, StoreError> {
            self.inner.insert_movement(movement).await
        }
        async fn mark_checked(
            &self,
            process_id: &str,
            summary: Option<&str>,
            at: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            self.inner.mark_checked(process_id, summary, at).await
        }
        async fn append_log(&self, entry: &MonitorLogEntry) -> Result<(), StoreError> {
            self.inner.append_log(entry).await
        }
        async fn create_notification(&self, _item: &NotificationItem) -> Result<(), StoreError> {
            Err(StoreError::Backend("inbox write refused".into()))
        }
    }

    #[tokio::test]
    async fn test_broken_inbox_does_not_fail_the_case() {
        let memory = Arc::new(MemoryStore::new());
        let docket = Arc::new(FakeDocket::new());
        let clock = FixedClock::at(fixed_now());

        memory.seed_case(case("case-1", "number-1"));
        docket.script(
            "number-1",
            Ok(vec![mv(1, "2024-05-30", "Sentença", "Sentença")]),
        );

        let store = Arc::new(BrokenInboxStore {
            inner: memory.clone(),
        });
        let svc = MonitorService::new(store, docket, clock, test_config());

        let summary = svc.run().await;

        // Movements, marker and case row committed before the inbox write;
        // the broken inbox is a log line, not a failed case.
        assert!(summary.errors.is_empty());
        assert_eq!(summary.consultas_ok, 1);
        assert_eq!(summary.atualizacoes_encontradas, 1);
        assert_eq!(memory.movements_for("case-1").len(), 1);
        assert_eq!(
            memory.case("case-1").unwrap().last_checked_at,
            Some(fixed_now())
        );
        assert!(memory.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_audit_trail_covers_every_outcome() {
        let store = Arc::new(MemoryStore::new());
        let docket = Arc::new(FakeDocket::new());
        let clock = FixedClock::at(fixed_now());

        store.seed_case(case("case-ok", "number-ok"));
        store.seed_case(case("case-bad", "number-bad"));
        docket.script(
            "number-ok",
            Ok(vec![mv(1, "2024-05-30", "Sentença", "Sentença")]),
        );
        docket.script("number-bad", Err(FetchError::Network("refused".into())));

        service(store.clone(), docket, clock).run().await;

        let logs = store.logs();
        let by_type = |t: LogType| logs.iter().filter(|l| l.log_type == t).count();
        assert_eq!(by_type(LogType::ConsultaRealizada), 1);
        assert_eq!(by_type(LogType::AtualizacaoEncontrada), 1);
        assert_eq!(by_type(LogType::ErroApi), 1);

        let err_entry = logs
            .iter()
            .find(|l| l.log_type == LogType::ErroApi)
            .unwrap();
        assert_eq!(err_entry.process_number, "number-bad");
        assert!(err_entry.details["error"]
            .as_str()
            .unwrap()
            .contains("refused"));
    }

    #[tokio::test]
    async fn test_long_texts_are_truncated_for_summary_and_preview() {
        let store = Arc::new(MemoryStore::new());
        let docket = Arc::new(FakeDocket::new());
        let clock = FixedClock::at(fixed_now());

        store.seed_case(case("case-1", "number-1"));
        let long_text = "Sentença ".repeat(200); // way past 500 chars
        docket.script(
            "number-1",
            Ok(vec![mv(1, "2024-05-30", "Sentença", &long_text)]),
        );

        service(store.clone(), docket, clock).run().await;

        let summary_text = store
            .case("case-1")
            .unwrap()
            .last_movement_summary
            .unwrap();
        assert_eq!(summary_text.chars().count(), 500);

        let andamento = store
            .notifications()
            .into_iter()
            .find(|n| n.kind == NotificationType::Andamento)
            .unwrap();
        // description = count prefix + 120-char preview; generously bounded.
        assert!(andamento.description.chars().count() < 200);
    }

    #[tokio::test]
    async fn test_bounded_concurrency_preserves_isolation_and_counts() {
        let store = Arc::new(MemoryStore::new());
        let docket = Arc::new(FakeDocket::new());
        let clock = FixedClock::at(fixed_now());

        for i in 1..=6 {
            store.seed_case(case(&format!("case-{i}"), &format!("number-{i}")));
            docket.script(
                &format!("number-{i}"),
                Ok(vec![mv(1, "2024-05-30", "Despacho", "Despacho")]),
            );
        }
        docket.script("number-4", Err(FetchError::Network("boom".into())));

        let mut config = test_config();
        config.workers = 4;
        let svc = MonitorService::new(store.clone(), docket, clock, config);

        let summary = svc.run().await;
        // Exactly once per case, regardless of completion order.
        assert_eq!(summary.processed, 6);
        assert_eq!(summary.consultas_ok, 5);
        assert_eq!(summary.atualizacoes_encontradas, 5);
        assert_eq!(summary.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_expired_deadline_fails_cases_through_the_error_path() {
        let store = Arc::new(MemoryStore::new());
        let docket = Arc::new(FakeDocket::new());
        let clock = FixedClock::at(fixed_now());

        store.seed_case(case("case-1", "number-1"));
        docket.script(
            "number-1",
            Ok(vec![mv(1, "2024-05-30", "Sentença", "Sentença")]),
        );

        let mut config = test_config();
        config.run_deadline = Duration::from_secs(0);
        let svc = MonitorService::new(store.clone(), docket, clock, config);

        let summary = svc.run().await;
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.consultas_ok, 0);
        assert_eq!(summary.errors.len(), 1);
        // Same error path as an API failure: timestamp untouched.
        assert!(store.case("case-1").unwrap().last_checked_at.is_none());
    }
}
