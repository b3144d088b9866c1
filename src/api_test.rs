use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use super::*;
use crate::source::Filters;

/// Accept one connection, answer with `status` and `body`, and hand back the
/// raw request text.
async fn serve_once(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut raw = Vec::new();
        let mut chunk = [0_u8; 4096];
        loop {
            let read = socket.read(&mut chunk).await.unwrap();
            raw.extend_from_slice(&chunk[..read]);
            let text = String::from_utf8_lossy(&raw).to_string();
            if let Some(head_end) = text.find("\r\n\r\n") {
                let content_length = text[..head_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length").then(|| value.trim().parse::<usize>().ok())?
                    })
                    .unwrap_or(0);
                if raw.len() >= head_end + 4 + content_length {
                    break;
                }
            }
            if read == 0 {
                break;
            }
        }
        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
        String::from_utf8_lossy(&raw).to_string()
    });
    (format!("http://{addr}"), handle)
}

fn client_for(base_url: String) -> ApiClient {
    let config = ClientConfig {
        api_url: base_url,
        api_token: Some("tok-1".to_owned()),
        fetch_retries: 0,
        ..ClientConfig::default()
    };
    ApiClient::new(&config).unwrap()
}

// =============================================================
// Endpoint table
// =============================================================

#[test]
fn collections_have_unique_paths_and_cache_names() {
    let mut paths: Vec<&str> = Collection::ALL.iter().map(|c| c.path()).collect();
    let mut names: Vec<&str> = Collection::ALL.iter().map(|c| c.cache_name()).collect();
    paths.sort_unstable();
    paths.dedup();
    names.sort_unstable();
    names.dedup();
    assert_eq!(paths.len(), Collection::ALL.len());
    assert_eq!(names.len(), Collection::ALL.len());
}

#[test]
fn collection_from_name_accepts_cli_spellings() {
    assert_eq!(Collection::from_name("client-groups"), Some(Collection::ClientGroups));
    assert_eq!(Collection::from_name("client_plans"), Some(Collection::PlanInstances));
    assert_eq!(Collection::from_name("plan-instances"), Some(Collection::PlanInstances));
    assert_eq!(Collection::from_name("widgets"), None);
}

#[test]
fn url_joins_base_prefix_and_path() {
    let client = client_for("http://api.test/".to_owned());
    assert_eq!(client.url(Collection::Clients.path()), "http://api.test/api/v1/admin/clients");
    assert_eq!(client.url(&commands::update_plan(Uuid::nil())), format!("http://api.test/api/v1/admin/plans/{}", Uuid::nil()));
}

// =============================================================
// Error messages
// =============================================================

#[test]
fn error_message_prefers_string_detail() {
    assert_eq!(error_message(r#"{"detail":"Plan not found"}"#, "Not Found"), "Plan not found");
}

#[test]
fn error_message_flattens_validation_list() {
    let body = json!({
        "detail": [
            { "loc": ["body", "email"], "msg": "value is not a valid email address", "type": "value_error" },
            { "loc": ["body", "phone"], "msg": "field required", "type": "missing" }
        ]
    })
    .to_string();
    assert_eq!(
        error_message(&body, "Unprocessable Entity"),
        "email: value is not a valid email address; phone: field required"
    );
}

#[test]
fn error_message_falls_back_to_text_then_reason() {
    assert_eq!(error_message("upstream timeout", "Bad Gateway"), "upstream timeout");
    assert_eq!(error_message("  ", "Bad Gateway"), "Bad Gateway");
}

// =============================================================
// Retry policy
// =============================================================

#[test]
fn retry_delay_doubles_and_caps() {
    assert_eq!(retry_delay(0), Duration::from_secs(1));
    assert_eq!(retry_delay(1), Duration::from_secs(2));
    assert_eq!(retry_delay(4), Duration::from_secs(16));
    assert_eq!(retry_delay(5), Duration::from_secs(30));
    assert_eq!(retry_delay(80), Duration::from_secs(30));
}

#[test]
fn only_transport_and_server_errors_retry() {
    assert!(ApiError::Status { status: 503, message: String::new() }.is_retryable());
    assert!(ApiError::Transport("reset".to_owned()).is_retryable());
    assert!(!ApiError::Status { status: 404, message: String::new() }.is_retryable());
    let decode = serde_json::from_str::<Value>("{").unwrap_err();
    assert!(!ApiError::Decode(decode).is_retryable());
}

#[tokio::test(start_paused = true)]
async fn with_retries_backs_off_until_success() {
    let attempts = Arc::new(AtomicU32::new(0));
    let started = tokio::time::Instant::now();
    let result = with_retries(3, "/admin/clients", || {
        let attempts = Arc::clone(&attempts);
        async move {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ApiError::Status { status: 502, message: "bad gateway".to_owned() })
            } else {
                Ok(7)
            }
        }
    })
    .await;

    assert_eq!(result.unwrap(), 7);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn with_retries_stops_on_client_errors() {
    let attempts = Arc::new(AtomicU32::new(0));
    let result: Result<u8, _> = with_retries(3, "/admin/plans", || {
        attempts.fetch_add(1, Ordering::SeqCst);
        async { Err(ApiError::Status { status: 422, message: "bad".to_owned() }) }
    })
    .await;

    assert!(matches!(result, Err(ApiError::Status { status: 422, .. })));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn with_retries_gives_up_after_budget() {
    let attempts = Arc::new(AtomicU32::new(0));
    let result: Result<u8, _> = with_retries(2, "/admin/plans", || {
        attempts.fetch_add(1, Ordering::SeqCst);
        async { Err(ApiError::Transport("connection reset".to_owned())) }
    })
    .await;

    assert!(result.is_err());
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

// =============================================================
// Wire
// =============================================================

#[tokio::test]
async fn list_sends_skip_limit_filters_and_token() {
    let (base, server) = serve_once("200 OK", r#"[{"id":1},{"id":2}]"#).await;
    let client = client_for(base);
    let query = PageQuery::new(crate::page::PageWindow::new(3, 10).unwrap(), Filters::new().with("active_only", "true"));

    let items: Vec<Value> = client.list(Collection::Clients, &query).await.unwrap();
    let request = server.await.unwrap();

    assert_eq!(items.len(), 2);
    assert!(request.starts_with("GET /api/v1/admin/clients?skip=20&limit=10&active_only=true HTTP/1.1"));
    assert!(request.to_ascii_lowercase().contains("authorization: bearer tok-1"));
}

#[tokio::test]
async fn command_posts_json_and_maps_detail_errors() {
    let (base, server) = serve_once("400 Bad Request", r#"{"detail":"Client already exists"}"#).await;
    let sink: CommandEndpoint<Value, Value> =
        client_for(base).command(Method::POST, commands::REGISTER_CLIENT);

    let err = sink.submit(&json!({ "full_name": "Ana" })).await.unwrap_err();
    let request = server.await.unwrap();

    assert!(request.starts_with("POST /api/v1/clients/management/register HTTP/1.1"));
    assert!(request.ends_with(r#"{"full_name":"Ana"}"#));
    assert_eq!(err.to_string(), "server returned 400: Client already exists");
}

#[tokio::test]
async fn collection_endpoint_decodes_records() {
    let (base, server) = serve_once("200 OK", r#"[{"id":"00000000-0000-0000-0000-000000000000","full_name":"Ana"}]"#).await;
    let source = client_for(base).collection::<crate::models::Client>(Collection::Clients);

    let page = source.fetch_page(&PageQuery { skip: 0, limit: 10, filters: Filters::new() }).await.unwrap();
    server.await.unwrap();

    assert_eq!(page.len(), 1);
    assert_eq!(page[0].full_name, "Ana");
}

#[tokio::test]
async fn malformed_body_is_a_decode_error() {
    let (base, server) = serve_once("200 OK", "not json").await;
    let result: Result<Value, _> = client_for(base).health_check().await;
    let request = server.await.unwrap();

    assert!(request.starts_with("GET /api/v1/utils/health-check/ HTTP/1.1"));
    assert!(matches!(result, Err(ApiError::Decode(_))));
}

#[tokio::test]
async fn query_encoded_command_puts_payload_in_the_url() {
    let (base, server) = serve_once("200 OK", r#"{"valid":true}"#).await;
    let sink: CommandEndpoint<Value, Value> =
        client_for(base).command(Method::GET, commands::CHECK_QR).with_encoding(PayloadEncoding::Query);

    let reply = sink.submit(&json!({ "client_id": "c-1", "qr_code_id": "QR 42" })).await.unwrap();
    let request = server.await.unwrap();

    assert_eq!(reply["valid"], true);
    assert!(request.starts_with("GET /api/v1/admin/check-qr?client_id=c-1&qr_code_id=QR+42 HTTP/1.1"));
    assert!(request.ends_with("\r\n\r\n"));
}

#[tokio::test]
async fn empty_command_sends_no_body() {
    let (base, server) = serve_once("200 OK", r#"{"id":"00000000-0000-0000-0000-000000000000"}"#).await;
    let sink: CommandEndpoint<(), Value> =
        client_for(base).command(Method::POST, commands::START_CHAT).with_encoding(PayloadEncoding::Empty);
    assert_eq!(sink.encoding(), PayloadEncoding::Empty);

    sink.submit(&()).await.unwrap();
    let request = server.await.unwrap();

    assert!(request.starts_with("POST /api/v1/processing/chats/project_starter HTTP/1.1"));
    assert!(!request.to_ascii_lowercase().contains("content-type: application/json"));
}
