use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};

use bodega_client::{AuthHooks, ClientConfig, NoopAuthHooks, RestBackend};
use bodega_core::{PositionId, ProductId, RecordId, SourceCode};
use bodega_inventory::{
    ApplyOutcome, LineKey, LookupError, MovementStore, NotFoundReason, Position, ProductLookup,
    RecordStatus, SaveMode, ScanCode, ScanContext, ScanOutcome, ScanSession, SessionContext,
    SessionError, SessionOptions, SessionState, SubmissionError, TracingFeedback,
};

const TOKEN: &str = "test-token";

#[derive(Default)]
struct Backend {
    saved: Mutex<Vec<Value>>,
    fail_saves: Mutex<bool>,
}

type Shared = Arc<Backend>;

struct TestServer {
    base_url: String,
    backend: Shared,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        bodega_observability::init();

        let backend: Shared = Arc::new(Backend::default());
        let app = Router::new()
            .route("/rest/default/V1/bodega/health", get(|| async { "ok" }))
            .route("/rest/default/V1/bodega/stock/lookup", get(lookup))
            .route(
                "/rest/default/V1/bodega/movements",
                axum::routing::post(create_movement),
            )
            .route(
                "/rest/default/V1/bodega/movements/:id",
                get(load_movement).put(update_movement),
            )
            .with_state(backend.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            backend,
            handle,
        }
    }

    fn client(&self) -> RestBackend {
        self.client_with(Arc::new(NoopAuthHooks))
    }

    fn client_with(&self, hooks: Arc<dyn AuthHooks>) -> RestBackend {
        RestBackend::new(ClientConfig::new(&self.base_url).with_token(TOKEN), hooks).unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TOKEN}"))
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"message": "The consumer isn't authorized to access %resources.", "parameters": {"resources": "bodega"}})),
    )
        .into_response()
}

async fn lookup(headers: HeaderMap, Query(q): Query<HashMap<String, String>>) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let code = q.get("code").map(String::as_str).unwrap_or_default();
    let position = q.get("position").map(String::as_str).unwrap_or_default();
    match (code, position) {
        // Plain object reply.
        ("A1", "1") => Json(json!({"product_id": 10, "sku": "A1", "available_quantity": 3})).into_response(),
        ("A1", "2") => Json(json!({"product_id": 10, "sku": "A1", "available_quantity": 0})).into_response(),
        // Tuple reply with backend field names.
        ("B2", _) => Json(json!([true, {"entity_id": 11, "sku": "B2", "qty": "5.0000"}])).into_response(),
        ("EMPTY", _) => Json(json!([])).into_response(),
        ("TWIN", _) => Json(json!([
            {"id": 12, "sku": "TWIN-A", "qty": 1},
            {"id": 13, "sku": "TWIN-B", "qty": 1}
        ]))
        .into_response(),
        ("GONE", _) => (StatusCode::NOT_FOUND, Json(json!({"message": "not found"}))).into_response(),
        ("BOOM", _) => (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded").into_response(),
        _ => Json(json!([false, "No such product"])).into_response(),
    }
}

static NEXT_ID: AtomicUsize = AtomicUsize::new(40);

async fn create_movement(
    State(backend): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    if *backend.fail_saves.lock().unwrap() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"message": "Source \"%1\" is disabled", "parameters": [body["movement"]["source_code"]]})),
        )
            .into_response();
    }
    backend.saved.lock().unwrap().push(body);
    let id = NEXT_ID.fetch_add(1, Ordering::SeqCst);
    Json(json!([true, {"id": id}])).into_response()
}

async fn update_movement(
    State(backend): State<Shared>,
    Path(id): Path<u64>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    if body["movement"]["record_id"] != json!(id) {
        return (StatusCode::BAD_REQUEST, Json(json!({"message": "record id mismatch"}))).into_response();
    }
    if id == 99 {
        return Json(json!([false, "Record is already complete"])).into_response();
    }
    backend.saved.lock().unwrap().push(body);
    // Updates answer with an empty body.
    StatusCode::OK.into_response()
}

async fn load_movement(Path(id): Path<u64>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    match id {
        7 => Json(json!([true, {
            "record_id": 7,
            "kind": "egress",
            "source_code": "main",
            "status": "in_progress",
            "lines": [
                {"product_id": 10, "sku": "A1", "position_id": 1, "position_label": "P1", "quantity": 2, "available_quantity": 3, "note": "left shelf"}
            ]
        }]))
        .into_response(),
        _ => (StatusCode::NOT_FOUND, Json(json!({"message": "Record %1 not found", "parameters": [id]}))).into_response(),
    }
}

fn main_source() -> SourceCode {
    SourceCode::parse("main").unwrap()
}

fn at(position: u64) -> ScanContext {
    ScanContext::new(
        main_source(),
        Position::new(PositionId::new(position), format!("P{position}")),
    )
}

fn code(raw: &str) -> ScanCode {
    ScanCode::parse(raw).unwrap()
}

#[tokio::test]
async fn connectivity_check() {
    let server = TestServer::spawn().await;
    assert!(server.client().check_connectivity().await);

    let offline = RestBackend::new(ClientConfig::new("http://127.0.0.1:9"), Arc::new(NoopAuthHooks)).unwrap();
    assert!(!offline.check_connectivity().await);
}

#[tokio::test]
async fn lookup_normalizes_reply_shapes() {
    let server = TestServer::spawn().await;
    let client = server.client();

    let found = client.lookup(&code("A1"), &at(1)).await.unwrap().unwrap();
    assert_eq!(found.product_id, ProductId::new(10));
    assert_eq!(found.available_quantity, 3);

    let found = client.lookup(&code("B2"), &at(1)).await.unwrap().unwrap();
    assert_eq!(found.product_id, ProductId::new(11));
    assert_eq!(found.available_quantity, 5);

    assert_eq!(client.lookup(&code("EMPTY"), &at(1)).await.unwrap(), None);
    assert_eq!(client.lookup(&code("GONE"), &at(1)).await.unwrap(), None);
    assert_eq!(client.lookup(&code("XYZ"), &at(1)).await.unwrap(), None);
    assert_eq!(
        client.lookup(&code("TWIN"), &at(1)).await.unwrap_err(),
        LookupError::InvalidResponse("code matched 2 products".to_string())
    );

    assert_eq!(
        client.lookup(&code("BOOM"), &at(1)).await.unwrap_err(),
        LookupError::Backend {
            status: 500,
            message: "upstream exploded".to_string(),
        }
    );
}

#[derive(Default)]
struct CountingHooks {
    calls: AtomicUsize,
}

impl AuthHooks for CountingHooks {
    fn on_unauthorized(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn unauthorized_invokes_hook_and_token_can_be_replaced() {
    let server = TestServer::spawn().await;
    let hooks = Arc::new(CountingHooks::default());
    let client = server.client_with(hooks.clone());

    client.replace_token(Some("expired".to_string()));
    let err = client.lookup(&code("A1"), &at(1)).await.unwrap_err();
    assert_eq!(err, LookupError::Unauthorized);
    assert_eq!(hooks.calls.load(Ordering::SeqCst), 1);

    client.replace_token(Some(TOKEN.to_string()));
    assert!(client.lookup(&code("A1"), &at(1)).await.unwrap().is_some());
    assert_eq!(hooks.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn scan_session_end_to_end() {
    let server = TestServer::spawn().await;
    let client = server.client();
    let mut session = ScanSession::new(
        SessionContext::ingress(main_source()),
        at(1),
        Arc::new(TracingFeedback),
        SessionOptions::default(),
    )
    .unwrap();

    for _ in 0..3 {
        session.scan("A1", &client).await.unwrap();
    }
    let report = session.scan("A1", &client).await.unwrap();
    assert_eq!(report.outcome, ScanOutcome::Applied(ApplyOutcome::Capped));

    let report = session.scan("XYZ", &client).await.unwrap();
    match report.outcome {
        ScanOutcome::NotFound(err) => assert_eq!(err.reason, NotFoundReason::UnknownCode),
        other => panic!("Expected NotFound, got {other:?}"),
    }

    let receipt = session.save(&client, SaveMode::Partial).await.unwrap();
    let record_id = receipt.record_id;
    assert_eq!(session.context().record_id, Some(record_id));

    session.scan("B2", &client).await.unwrap();
    session.save(&client, SaveMode::Complete).await.unwrap();
    assert_eq!(session.state(), SessionState::Completed);

    let saved = server.backend.saved.lock().unwrap();
    assert_eq!(saved.len(), 2);
    assert_eq!(saved[0]["movement"]["status"], "in_progress");
    assert_eq!(saved[0]["movement"]["items"][0]["quantity"], 3);
    assert!(saved[0]["movement"].get("record_id").is_none());
    assert_eq!(saved[1]["movement"]["status"], "complete");
    assert_eq!(saved[1]["movement"]["record_id"], json!(record_id.get()));
    assert_eq!(saved[1]["movement"]["items"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn rejected_save_preserves_scanned_lines() {
    let server = TestServer::spawn().await;
    let client = server.client();
    let mut session = ScanSession::new(
        SessionContext::ingress(main_source()),
        at(1),
        Arc::new(TracingFeedback),
        SessionOptions::default(),
    )
    .unwrap();
    session.scan("A1", &client).await.unwrap();
    session.scan("A1", &client).await.unwrap();
    let before = session.lines().to_vec();

    *server.backend.fail_saves.lock().unwrap() = true;
    let err = session.save(&client, SaveMode::Complete).await.unwrap_err();
    assert_eq!(
        err,
        SessionError::Submission(SubmissionError::Rejected {
            status: 400,
            message: "Source \"main\" is disabled".to_string(),
        })
    );
    assert_eq!(session.lines(), before.as_slice());
    assert_eq!(session.state(), SessionState::Open);

    *server.backend.fail_saves.lock().unwrap() = false;
    session.save(&client, SaveMode::Complete).await.unwrap();
    assert_eq!(session.state(), SessionState::Completed);
}

#[tokio::test]
async fn resume_and_update_existing_record() {
    let server = TestServer::spawn().await;
    let client = server.client();

    let record = client.load(RecordId::new(7)).await.unwrap();
    assert_eq!(record.status, RecordStatus::InProgress);
    assert_eq!(record.lines.len(), 1);

    let mut session = ScanSession::load(
        &client,
        RecordId::new(7),
        at(1),
        Arc::new(TracingFeedback),
        SessionOptions::default(),
    )
    .await
    .unwrap();
    let key = LineKey::new(ProductId::new(10), PositionId::new(1));
    assert_eq!(session.line(key).unwrap().scanned_quantity(), 2);

    session.scan("A1", &client).await.unwrap();
    let receipt = session.save(&client, SaveMode::Partial).await.unwrap();
    assert_eq!(receipt.record_id, RecordId::new(7));

    let saved = server.backend.saved.lock().unwrap();
    assert_eq!(saved[0]["movement"]["items"][0]["quantity"], 3);
    assert_eq!(saved[0]["movement"]["items"][0]["note"], "left shelf");
}

#[tokio::test]
async fn load_missing_record_and_refused_update() {
    let server = TestServer::spawn().await;
    let client = server.client();

    assert_eq!(
        client.load(RecordId::new(8)).await.unwrap_err(),
        SubmissionError::NotFound(RecordId::new(8))
    );

    let ctx = SessionContext::egress(main_source()).with_record(RecordId::new(99));
    let payload = bodega_inventory::to_payload(&[], &ctx, SaveMode::Partial, chrono_now());
    let err = client.save(&payload, SaveMode::Partial).await.unwrap_err();
    assert_eq!(
        err,
        SubmissionError::Rejected {
            status: 200,
            message: "Record is already complete".to_string(),
        }
    );
}

#[tokio::test]
async fn zero_stock_position_is_not_countable() {
    let server = TestServer::spawn().await;
    let client = server.client();
    let mut session = ScanSession::new(
        SessionContext::egress(main_source()),
        at(2),
        Arc::new(TracingFeedback),
        SessionOptions::default(),
    )
    .unwrap();

    let report = session.scan("A1", &client).await.unwrap();
    match report.outcome {
        ScanOutcome::NotFound(err) => assert_eq!(err.reason, NotFoundReason::NoStock),
        other => panic!("Expected NotFound, got {other:?}"),
    }
    assert!(session.lines().is_empty());
}

fn chrono_now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}
