// =============================================================================
// models.rs — THE SACRED DATA STRUCTURES OF THE DOCKET
// =============================================================================
//
// These structs represent everything the monitor reads from, or writes to,
// the surrounding case-management system: the tracked case, the persisted
// movement, the append-only audit entry, the inbox notification, and the
// run summary we hand back to whoever poked the HTTP trigger.
//
// Is it overkill to give an inbox notification its own priority enum?
// Yes. Do we care? Absolutely not.
// =============================================================================

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The legally significant movement types, plus the fallback.
///
/// The six named variants are exactly the relevance vocabulary. `Andamento`
/// is what a movement gets called when it matches none of them — and by
/// construction a movement typed `Andamento` is never relevant, because the
/// classifier's relevance check and its type detection walk the same
/// keyword list. That coupling is intentional. Do not "fix" it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MovementType {
    /// Sentença — the judge has ruled. The client will call within the hour.
    Sentenca,
    /// Decisão — a decision that isn't quite a sentença but still matters.
    Decisao,
    /// Decisão interlocutória — a mid-case decision.
    DecisaoInterlocutoria,
    /// Despacho — a procedural order. Usually "junte-se", occasionally gold.
    Despacho,
    /// Publicação — something hit the official gazette.
    Publicacao,
    /// Intimação — someone is being formally summoned, possibly you.
    Intimacao,
    /// Generic movement. The docket moved, nobody needs to wake up.
    Andamento,
}

impl MovementType {
    /// Relevance falls directly out of the type: everything except the
    /// generic fallback is a legally significant event.
    pub fn is_relevant(self) -> bool {
        !matches!(self, MovementType::Andamento)
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MovementType::Sentenca => write!(f, "Sentença"),
            MovementType::Decisao => write!(f, "Decisão"),
            MovementType::DecisaoInterlocutoria => write!(f, "Decisão interlocutória"),
            MovementType::Despacho => write!(f, "Despacho"),
            MovementType::Publicacao => write!(f, "Publicação"),
            MovementType::Intimacao => write!(f, "Intimação"),
            MovementType::Andamento => write!(f, "Andamento"),
        }
    }
}

/// A tracked case, as the case-management UI created it. The monitor never
/// creates or deletes these rows; it reads `id`/`number`/`last_checked_at`
/// and writes back exactly two fields (`last_movement_summary`,
/// `last_checked_at`), once per run per eligible case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoredCase {
    pub id: String,

    /// The docket number, ideally already in CNJ format. We normalize it
    /// again before every fetch anyway, because trusting upstream data
    /// entry is how monitoring jobs die young.
    pub number: String,

    /// Truncated text of the most recent relevant movement, denormalized
    /// here so the case list screen doesn't have to join anything.
    pub last_movement_summary: Option<String>,

    /// When we last *successfully* checked this case. Null means never.
    /// Deliberately left untouched on fetch failure so the case stays
    /// eligible and gets retried next run.
    pub last_checked_at: Option<DateTime<Utc>>,

    /// The lawyer who gets the inbox notifications.
    pub owner_id: String,
}

/// A persisted docket movement. Immutable once written; `is_relevant` is
/// always true for stored rows because irrelevant movements never make it
/// past the diff engine.
///
/// Invariant: (`process_id`, `external_id`) is unique. The store enforces
/// it, and that constraint is the entire exactly-once story for retried
/// or overlapping runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Movement {
    pub process_id: String,

    /// Source-assigned id. Monotonically increasing within a case,
    /// NOT globally unique. Never compare across cases.
    pub external_id: i64,

    /// Calendar date as reported by the source. No time component —
    /// the docket doesn't know what an hour is.
    pub movement_date: NaiveDate,

    pub movement_type: MovementType,
    pub full_text: String,
    pub is_relevant: bool,
}

/// The diff boundary for one case: the (date, external id) pair of the most
/// recently persisted movement, or `(None, 0)` when no movement exists yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub date: Option<NaiveDate>,
    pub external_id: i64,
}

impl Marker {
    /// The marker for a case with no persisted movements. Everything the
    /// API returns is newer than this.
    pub const NONE: Marker = Marker {
        date: None,
        external_id: 0,
    };
}

impl Default for Marker {
    fn default() -> Self {
        Marker::NONE
    }
}

/// Audit log entry categories. One or more per case per run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogType {
    /// Fetch succeeded; the case was checked.
    ConsultaRealizada,
    /// Fetch (or persistence) failed; the case will be retried next run.
    ErroApi,
    /// New relevant movements were found and persisted.
    AtualizacaoEncontrada,
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogType::ConsultaRealizada => write!(f, "consulta_realizada"),
            LogType::ErroApi => write!(f, "erro_api"),
            LogType::AtualizacaoEncontrada => write!(f, "atualizacao_encontrada"),
        }
    }
}

/// One append-only audit trail entry. Never updated, never deleted.
/// The details field is free-form JSON because every outcome wants to
/// attach something different (counts, error text, movement types).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorLogEntry {
    pub process_id: String,
    pub process_number: String,
    pub log_type: LogType,
    pub message: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Inbox entry categories. Downstream UI renders these two very
/// differently, which is why both exist (see NotificationItem docs).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NotificationType {
    /// "Your case moved" — the one people actually read.
    Andamento,
    /// "The monitor ran" — the one the activity feed wants.
    Sistema,
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationType::Andamento => write!(f, "Andamento"),
            NotificationType::Sistema => write!(f, "Sistema"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NotificationPriority {
    /// New relevant movements found. Wake the lawyer.
    Alta,
    /// Routine. The lawyer may finish their coffee.
    Normal,
}

/// A user-facing inbox entry. Created here, marked read elsewhere —
/// the `read` flag belongs to the notification UI, not to us.
///
/// Per run per checked case we emit up to two of these: an `Andamento`
/// notification when the batch is non-empty, and a `Sistema` note always.
/// Yes, that looks redundant. The inbox feed depends on both. Preserve it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationItem {
    pub id: String,
    /// Serialized as `type` — that's the column the inbox UI reads.
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub description: String,
    /// The case this notification points at.
    pub reference_id: String,
    pub read: bool,
    pub priority: NotificationPriority,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
}

impl NotificationItem {
    pub fn new(
        kind: NotificationType,
        priority: NotificationPriority,
        title: String,
        description: String,
        reference_id: String,
        owner_id: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            title,
            description,
            reference_id,
            read: false,
            priority,
            owner_id,
            created_at,
        }
    }
}

// =============================================================================
// Raw docket API payloads
// =============================================================================
// What the external service actually sends us, before we clean it up.
// Everything is Option because provider JSON is a land of broken promises.
// =============================================================================

/// Success body of `GET /processos/numero_cnj/{n}/movimentacoes`.
#[derive(Debug, Clone, Deserialize)]
pub struct DocketResponse {
    pub items: Option<Vec<DocketItem>>,
}

/// One raw movement record. `data` is a YYYY-MM-DD string; the fetcher
/// parses it and treats failure as a malformed payload.
#[derive(Debug, Clone, Deserialize)]
pub struct DocketItem {
    pub id: Option<i64>,
    pub data: Option<String>,
    pub tipo: Option<String>,
    pub conteudo: Option<String>,
}

/// A cleaned-up movement straight off the wire: parsed date, defaulted
/// text fields, newest-first ordering inherited from the provider.
/// This is what the diff engine walks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMovement {
    pub external_id: i64,
    pub date: NaiveDate,
    pub tipo: String,
    pub conteudo: String,
}

impl FetchedMovement {
    /// The text the relevance classifier looks at. Providers are split on
    /// whether the event name lives in `tipo` or gets repeated inside
    /// `conteudo`, so we scan both.
    pub fn classification_text(&self) -> String {
        format!("{} {}", self.tipo, self.conteudo)
    }
}

// =============================================================================
// Run summary
// =============================================================================

/// One entry in the run summary's `errors` array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunError {
    pub process_number: String,
    pub error: String,
}

/// The ephemeral result of one run. Built at run start, serialized into the
/// HTTP response, then discarded. Nothing here is persisted — the audit
/// trail lives in MonitorLogEntry rows.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Correlation token for the whole invocation. Lives in every log
    /// line; deliberately kept out of the response contract.
    #[serde(skip)]
    pub run_id: String,

    pub ok: bool,
    /// How many eligible cases the run attempted.
    pub processed: usize,
    /// How many fetches succeeded.
    pub consultas_ok: usize,
    /// How many cases produced at least one new relevant movement.
    pub atualizacoes_encontradas: usize,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<RunError>,
}

/// Hard-truncate a string to at most `max` characters, on a char boundary.
/// Used for the 500-char case summary and the ~120-char notification
/// preview. Bytes would be faster; grapheme clusters would be fancier;
/// chars are what the UI counts.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}
