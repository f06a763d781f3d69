// ═══════════════════════════════════════════════════════════════
// TRIGGER SERVER - the world's smallest HTTP surface
// ═══════════════════════════════════════════════════════════════
//
// One POST endpoint to start a run, one OPTIONS preflight so a browser
// admin screen can call it, and a 404 for everything else. Raw TCP with
// hand-built responses — a framework for three routes would be like
// mounting a turret on a skateboard.
//
// Connections are handled inline on the accept loop. That also
// serializes runs: two overlapping runs wouldn't corrupt anything (the
// store's uniqueness constraint holds), but they would double-spend the
// provider rate budget.

use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::monitor::MonitorService;

const CORS_HEADERS: &str = "Access-Control-Allow-Origin: *\r\n\
    Access-Control-Allow-Methods: POST, OPTIONS\r\n\
    Access-Control-Allow-Headers: Content-Type, Authorization\r\n";

/// Serve the trigger endpoint until shutdown.
///
/// `monitor` is None when the docket API token is missing from the
/// environment — the one fatal configuration error. We still bind and
/// serve, but every trigger gets the 500 it deserves, before any case
/// is touched.
pub async fn run_trigger_server(
    monitor: Option<Arc<MonitorService>>,
    port: u16,
    shutdown: &mut watch::Receiver<bool>,
) {
    let listener = match TcpListener::bind(("0.0.0.0", port)).await {
        Ok(l) => l,
        Err(e) => {
            error!("failed to bind trigger server on :{port}: {e}");
            return;
        }
    };

    info!("trigger server listening on http://0.0.0.0:{port} — POST /run to start a monitor run");

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((mut stream, _addr)) => {
                        let response = match read_request_head(&mut stream).await {
                            Some(head) => route(&head, monitor.as_deref()).await,
                            None => plain_response(
                                "400 Bad Request",
                                r#"{"ok":false,"error":"unreadable request"}"#,
                            ),
                        };
                        let _ = stream.write_all(response.as_bytes()).await;
                    }
                    Err(e) => {
                        error!("trigger server accept error: {e}");
                    }
                }
            }
            _ = shutdown.changed() => {
                info!("trigger server: shutting down");
                break;
            }
        }
    }
}

/// Pull the request head (through the blank line) off the socket.
/// 8 KiB is plenty for a bodyless POST; anything longer is not our cron.
async fn read_request_head(stream: &mut tokio::net::TcpStream) -> Option<String> {
    let mut buf = vec![0u8; 8192];
    let mut total = 0;

    loop {
        let n = stream.read(&mut buf[total..]).await.ok()?;
        if n == 0 {
            break;
        }
        total += n;
        if buf[..total].windows(4).any(|w| w == b"\r\n\r\n") || total == buf.len() {
            break;
        }
    }

    if total == 0 {
        return None;
    }
    Some(String::from_utf8_lossy(&buf[..total]).into_owned())
}

/// Decide what the request gets. Split out from the socket handling so
/// tests can drive it with plain strings.
async fn route(head: &str, monitor: Option<&MonitorService>) -> String {
    let (method, path) = match parse_request_line(head) {
        Some(pair) => pair,
        None => {
            return plain_response(
                "400 Bad Request",
                r#"{"ok":false,"error":"malformed request line"}"#,
            )
        }
    };

    // Preflight gets its 204 no matter the path; the browser only wants
    // to know we speak CORS.
    if method == "OPTIONS" {
        return format!("HTTP/1.1 204 No Content\r\n{CORS_HEADERS}Content-Length: 0\r\n\r\n");
    }

    if method == "POST" && (path == "/run" || path == "/") {
        return match monitor {
            None => {
                warn!("trigger refused: docket API token is not configured");
                plain_response(
                    "500 Internal Server Error",
                    r#"{"ok":false,"error":"ANDAMENTO_DOCKET_API_TOKEN is not configured"}"#,
                )
            }
            Some(service) => {
                let summary = service.run().await;
                let json = serde_json::to_string(&summary)
                    .unwrap_or_else(|_| r#"{"ok":false,"error":"summary serialization failed"}"#.to_string());
                plain_response("200 OK", &json)
            }
        };
    }

    plain_response("404 Not Found", r#"{"ok":false,"error":"not found"}"#)
}

fn parse_request_line(head: &str) -> Option<(&str, &str)> {
    let line = head.lines().next()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?;
    let path = parts.next()?;
    Some((method, path))
}

fn plain_response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\n{CORS_HEADERS}Content-Length: {}\r\n\r\n{body}",
        body.len(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_line() {
        assert_eq!(
            parse_request_line("POST /run HTTP/1.1\r\nHost: x\r\n\r\n"),
            Some(("POST", "/run"))
        );
        assert_eq!(parse_request_line(""), None);
    }

    #[tokio::test]
    async fn test_options_preflight_is_204_with_cors() {
        let response = route("OPTIONS /run HTTP/1.1\r\n\r\n", None).await;
        assert!(response.starts_with("HTTP/1.1 204"));
        assert!(response.contains("Access-Control-Allow-Origin: *"));
        assert!(response.contains("Access-Control-Allow-Methods: POST, OPTIONS"));
    }

    #[tokio::test]
    async fn test_missing_token_is_500_before_any_case() {
        let response = route("POST /run HTTP/1.1\r\n\r\n", None).await;
        assert!(response.starts_with("HTTP/1.1 500"));
        assert!(response.contains("ANDAMENTO_DOCKET_API_TOKEN"));
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let response = route("GET /metrics HTTP/1.1\r\n\r\n", None).await;
        assert!(response.starts_with("HTTP/1.1 404"));
    }
}
