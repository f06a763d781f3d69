// =============================================================================
// fetcher.rs — THE DOCKET PROVIDER LIAISON
// =============================================================================
//
// One job: given a normalized CNJ number, bring back that case's ordered
// movement history from the external docket service — or a typed error
// saying exactly why we couldn't. Nothing in this module panics on a bad
// response and nothing throws past the per-case boundary; a 503 from the
// provider is a return value, not an incident.
//
// The fetcher is a trait so the monitor can be wired to a fake in tests.
// Production uses `JuditClient`, a thin reqwest wrapper with a per-call
// timeout and a User-Agent that identifies us like adults.
// =============================================================================

use async_trait::async_trait;
use chrono::NaiveDate;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::models::{DocketResponse, FetchedMovement};

/// How hard the fetch failed. The monitor treats every variant the same
/// way (log `erro_api`, record in `errors`, leave `last_checked_at`
/// alone), but the audit trail deserves to know which flavor it was.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Provider answered with a non-2xx status.
    #[error("docket API returned HTTP {status}: {detail}")]
    Http { status: u16, detail: String },

    /// We never got an answer: DNS, TLS, timeout, cable-eating backhoe.
    #[error("network error reaching docket API: {0}")]
    Network(String),

    /// We got 200 and then couldn't make sense of the body.
    #[error("malformed docket payload: {0}")]
    MalformedBody(String),
}

/// The seam between the monitor and the outside world. Implemented by
/// `JuditClient` in production and by in-memory fakes in tests.
#[async_trait]
pub trait DocketFetch: Send + Sync {
    /// Fetch the ordered movement list for one case, newest first.
    /// The `number` is expected to be CNJ-normalized already.
    async fn fetch_movements(&self, number: &str) -> Result<Vec<FetchedMovement>, FetchError>;
}

/// Production client for the docket provider.
pub struct JuditClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    limit: u32,
}

impl JuditClient {
    /// Build the client. The timeout here is the per-call network timeout;
    /// the run-level deadline lives in the monitor.
    pub fn new(
        base_url: String,
        token: String,
        limit: u32,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("AndamentoEngine/1.0 (docket-monitor)")
            .build()?;

        Ok(Self {
            http,
            base_url,
            token,
            limit,
        })
    }
}

#[async_trait]
impl DocketFetch for JuditClient {
    async fn fetch_movements(&self, number: &str) -> Result<Vec<FetchedMovement>, FetchError> {
        let url = format!(
            "{}/processos/numero_cnj/{}/movimentacoes?limit={}",
            self.base_url, number, self.limit,
        );

        debug!(number = number, url = url.as_str(), "fetching docket movements");

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            // Grab whatever the provider said by way of explanation.
            // Truncated — some gateways answer 502 with an entire HTML
            // museum exhibit.
            let detail = response
                .text()
                .await
                .map(|body| crate::models::truncate_chars(body.trim(), 300))
                .unwrap_or_default();
            return Err(FetchError::Http {
                status: status.as_u16(),
                detail,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let payload: DocketResponse = serde_json::from_str(&body)
            .map_err(|e| FetchError::MalformedBody(e.to_string()))?;

        parse_items(payload)
    }
}

/// Turn the raw provider payload into cleaned movements. A missing id or
/// an unparseable date poisons the whole payload — the diff engine's stop
/// condition assumes a coherent newest-first list, so half a list is
/// worse than no list.
fn parse_items(payload: DocketResponse) -> Result<Vec<FetchedMovement>, FetchError> {
    let items = payload.items.unwrap_or_default();
    let mut movements = Vec::with_capacity(items.len());

    for (idx, item) in items.into_iter().enumerate() {
        let external_id = item
            .id
            .ok_or_else(|| FetchError::MalformedBody(format!("item {idx} has no id")))?;

        let raw_date = item
            .data
            .ok_or_else(|| FetchError::MalformedBody(format!("item {idx} has no data field")))?;

        let date = NaiveDate::parse_from_str(&raw_date, "%Y-%m-%d").map_err(|e| {
            FetchError::MalformedBody(format!("item {idx} date {raw_date:?}: {e}"))
        })?;

        movements.push(FetchedMovement {
            external_id,
            date,
            tipo: item.tipo.unwrap_or_default(),
            conteudo: item.conteudo.unwrap_or_default(),
        });
    }

    Ok(movements)
}
