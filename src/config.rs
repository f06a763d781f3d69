// =============================================================================
// config.rs — THE GRAND CONFIGURATION CATHEDRAL
// =============================================================================
//
// Every tunable the monitor has lives here, loaded from environment
// variables with defaults chosen through a rigorous process of "that seems
// about right" and "the docket provider will rate-limit us if we go faster
// than this."
//
// One value is special: the docket API token has NO default and its absence
// is the single fatal configuration error this job knows. Everything else
// fails per-case; a missing token fails before any case is touched.
// =============================================================================

use std::env;
use std::time::Duration;

/// The Grand Configuration Struct. Think of it as the cockpit of the
/// monitor: every knob that controls how aggressively we interrogate the
/// docket provider and how loudly we tell lawyers about the results.
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // DOCKET PROVIDER
    // =========================================================================
    /// Bearer token for the external docket service. `None` means someone
    /// forgot to configure the deployment, and the HTTP trigger will say
    /// so with a 500 before a single case is processed.
    pub docket_api_token: Option<String>,

    /// Base URL of the docket service. Overridable mostly so tests and
    /// staging can point at something that isn't production.
    pub docket_base_url: String,

    /// `limit` query parameter on the movement fetch. 100 is the
    /// provider's page size; we never paginate because the diff engine
    /// stops at the first already-known movement anyway.
    pub fetch_limit: u32,

    /// Per-call network timeout on the fetcher's HTTP client.
    pub fetch_timeout: Duration,

    // =========================================================================
    // SCHEDULING
    // =========================================================================
    /// Minimum interval between checks of the same case. Default: 24h.
    /// The docket updates at most a few times a day; checking hourly
    /// would only annoy the provider and our rate budget.
    pub recheck_interval: Duration,

    /// Bounded concurrency for the per-case pipeline. Default: 1 —
    /// sequential keeps us well inside the provider's shared rate
    /// budget. Raise it if the provider raises yours.
    pub workers: usize,

    /// Overall run deadline. Cases that haven't started by the time it
    /// expires fail through the normal per-case error path and get
    /// retried next run.
    pub run_deadline: Duration,

    // =========================================================================
    // PERSISTENCE
    // =========================================================================
    /// Redis connection URL. Cases, movements, the audit log, and the
    /// notification inbox all live here.
    pub redis_url: String,

    /// Pub/sub channel for freshly created notifications, so the inbox
    /// UI can update in real time instead of polling us.
    pub notification_channel: String,

    // =========================================================================
    // PRESENTATION
    // =========================================================================
    /// Hard cap on the denormalized `last_movement_summary` text.
    pub summary_max_chars: usize,

    /// Preview length inside the `Andamento` notification description.
    pub preview_max_chars: usize,

    // =========================================================================
    // HTTP TRIGGER
    // =========================================================================
    /// Port for the trigger server. Cron POSTs here; browsers preflight
    /// here; nothing else should.
    pub http_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible
    /// defaults. Every parameter can be overridden via variables prefixed
    /// with ANDAMENTO_, because namespacing your env vars is what
    /// separates the professionals from the amateurs.
    pub fn from_env() -> Self {
        // Try to load .env if present. Fail silently if it isn't —
        // not everyone has their life together enough to create one.
        let _ = dotenvy::dotenv();

        Config {
            docket_api_token: env::var("ANDAMENTO_DOCKET_API_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty()),
            docket_base_url: env_or_default(
                "ANDAMENTO_DOCKET_BASE_URL",
                "https://api.judit.io",
            ),
            fetch_limit: env_or_default("ANDAMENTO_FETCH_LIMIT", "100")
                .parse()
                .unwrap_or(100),
            fetch_timeout: Duration::from_secs(
                env_or_default("ANDAMENTO_FETCH_TIMEOUT_SECS", "20")
                    .parse()
                    .unwrap_or(20),
            ),

            recheck_interval: Duration::from_secs(
                env_or_default("ANDAMENTO_RECHECK_INTERVAL_SECS", "86400")
                    .parse()
                    .unwrap_or(86_400),
            ),
            workers: env_or_default("ANDAMENTO_WORKERS", "1")
                .parse()
                .unwrap_or(1)
                .max(1),
            run_deadline: Duration::from_secs(
                env_or_default("ANDAMENTO_RUN_DEADLINE_SECS", "600")
                    .parse()
                    .unwrap_or(600),
            ),

            redis_url: env_or_default("ANDAMENTO_REDIS_URL", "redis://127.0.0.1:6379"),
            notification_channel: env_or_default(
                "ANDAMENTO_NOTIFICATION_CHANNEL",
                "andamento:notifications",
            ),

            summary_max_chars: env_or_default("ANDAMENTO_SUMMARY_MAX_CHARS", "500")
                .parse()
                .unwrap_or(500),
            preview_max_chars: env_or_default("ANDAMENTO_PREVIEW_MAX_CHARS", "120")
                .parse()
                .unwrap_or(120),

            http_port: env_or_default("ANDAMENTO_HTTP_PORT", "8090")
                .parse()
                .unwrap_or(8090),
        }
    }
}

/// Helper function to read an environment variable with a default fallback.
/// Because unwrap_or on env::var is ugly and we have standards.
fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
