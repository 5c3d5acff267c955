// Clinic Validation - Web Server
// JSON API over the validation workflow

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use clinic_validation::logging::init_tracing;
use clinic_validation::{
    Actor, AppConfig, ApprovalTier, BatchAction, ClinicServices, DecisionOptions, InsertOutcome,
    NewRecord, Notification, Recipient, RecordDetails, RecordFilter, RecordKind, StatsPeriod,
    ValidationStatus, WorkflowError, WorkflowResult,
};

const ACTOR_ID_HEADER: &str = "x-actor-id";
const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Shared application state
#[derive(Clone)]
struct AppState {
    services: ClinicServices,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_code: None,
        }
    }
}

impl ApiResponse<()> {
    fn failure(error: String, code: &str) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            error_code: Some(code.to_string()),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

enum ApiError {
    /// Malformed request (missing actor headers, bad query values)
    BadRequest(String),
    /// Expected workflow failure
    Workflow(WorkflowError),
    /// Storage or runtime failure
    Internal(anyhow::Error),
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Storage(e) => ApiError::Internal(e),
            other => ApiError::Workflow(other),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::failure(msg, "bad_request")),
            )
                .into_response(),
            ApiError::Workflow(err) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ApiResponse::failure(err.to_string(), err.code())),
            )
                .into_response(),
            ApiError::Internal(err) => {
                error!("request failed: {:#}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiResponse::failure(
                        "internal server error".to_string(),
                        "storage",
                    )),
                )
                    .into_response()
            }
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Run store-bound work off the async executor
async fn blocking<T, F>(work: F) -> ApiResult<T>
where
    F: FnOnce() -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("worker task failed: {}", e)))?
}

fn actor_from(headers: &HeaderMap) -> ApiResult<Actor> {
    let read = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::BadRequest(format!("missing {} header", name)))
    };
    Ok(Actor::new(read(ACTOR_ID_HEADER)?, read(ACTOR_ROLE_HEADER)?))
}

fn kind_from(raw: &str) -> ApiResult<RecordKind> {
    RecordKind::parse(raw)
        .ok_or_else(|| ApiError::Workflow(WorkflowError::UnknownModelType(raw.to_string())))
}

/// `?kind=` query value; "all" or absent means every kind
fn kind_filter(raw: Option<&str>) -> ApiResult<Option<RecordKind>> {
    match raw {
        None => Ok(None),
        Some(raw) => RecordKind::parse_filter(raw)
            .ok_or_else(|| ApiError::Workflow(WorkflowError::UnknownModelType(raw.to_string()))),
    }
}

/// Transition endpoints answer with the workflow result itself
fn transition_response(result: WorkflowResult) -> Response {
    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    (status, Json(result)).into_response()
}

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Deserialize)]
struct CreateBody {
    details: RecordDetails,
    amount: Decimal,
    tanggal: NaiveDate,
    /// Defaults to the acting user
    input_by: Option<String>,
    #[serde(default)]
    submit: bool,
}

#[derive(Deserialize, Default)]
struct ApproveBody {
    comment: Option<String>,
    #[serde(default)]
    silent: bool,
}

#[derive(Deserialize, Default)]
struct ReasonBody {
    #[serde(default)]
    reason: String,
    #[serde(default)]
    silent: bool,
}

#[derive(Deserialize, Default)]
struct ResubmitBody {
    notes: Option<String>,
}

#[derive(Deserialize)]
struct BatchBody {
    model_type: String,
    action: BatchAction,
    ids: Vec<i64>,
    reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct ListQuery {
    kind: Option<String>,
    status: Option<String>,
    input_by: Option<String>,
}

#[derive(Deserialize, Default)]
struct KindQuery {
    kind: Option<String>,
    days: Option<u32>,
}

#[derive(Deserialize, Default)]
struct PetugasQuery {
    period: Option<String>,
    date: Option<NaiveDate>,
}

#[derive(Deserialize, Default)]
struct InboxQuery {
    #[serde(default)]
    unread_only: bool,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check(State(state): State<AppState>) -> ApiResult<Json<ApiResponse<serde_json::Value>>> {
    let store = state.services.store.clone();
    let records = blocking(move || Ok(store.count_records()?)).await?;
    Ok(Json(ApiResponse::ok(serde_json::json!({
        "status": "ok",
        "version": clinic_validation::VERSION,
        "records": records,
    }))))
}

/// POST /api/records - Create a record, optionally submitting it
async fn create_record(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateBody>,
) -> ApiResult<Response> {
    let actor = actor_from(&headers)?;
    blocking(move || {
        let workflow = &state.services.workflow;
        let input_by = body.input_by.unwrap_or_else(|| actor.id.clone());
        let new = NewRecord::new(body.details, body.amount, body.tanggal, &input_by);

        let record = match workflow.create_record(&new, &actor)? {
            InsertOutcome::Inserted(record) => record,
            InsertOutcome::Duplicate => {
                return Err(ApiError::Workflow(WorkflowError::InvalidInput(
                    "duplicate record".to_string(),
                )))
            }
        };

        if body.submit {
            let outcome = workflow.submit_for_validation(record.kind, record.id, &actor);
            let result = WorkflowResult::settle(record.kind, record.id, outcome)?;
            return Ok(transition_response(result));
        }

        Ok((StatusCode::CREATED, Json(ApiResponse::ok(record))).into_response())
    })
    .await
}

/// GET /api/records - List records
async fn list_records(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Response> {
    let kind = kind_filter(query.kind.as_deref())?;
    let status = match query.status.as_deref() {
        Some(raw) => Some(
            ValidationStatus::parse(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown status '{}'", raw)))?,
        ),
        None => None,
    };
    let filter = RecordFilter {
        kind,
        status,
        input_by: query.input_by,
        ..Default::default()
    };

    let store = state.services.store.clone();
    let records = blocking(move || Ok(store.list_records(&filter)?)).await?;
    Ok(Json(ApiResponse::ok(records)).into_response())
}

/// GET /api/records/:kind/:id
async fn get_record(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, i64)>,
) -> ApiResult<Response> {
    let kind = kind_from(&kind)?;
    let record = blocking(move || Ok(state.services.workflow.get_record(kind, id)?)).await?;
    Ok(Json(ApiResponse::ok(record)).into_response())
}

/// POST /api/records/:kind/:id/submit
async fn submit_record(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((kind, id)): Path<(String, i64)>,
) -> ApiResult<Response> {
    let actor = actor_from(&headers)?;
    let kind = kind_from(&kind)?;
    blocking(move || {
        let outcome = state.services.workflow.submit_for_validation(kind, id, &actor);
        Ok(transition_response(WorkflowResult::settle(kind, id, outcome)?))
    })
    .await
}

/// POST /api/records/:kind/:id/approve
async fn approve_record(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((kind, id)): Path<(String, i64)>,
    body: Option<Json<ApproveBody>>,
) -> ApiResult<Response> {
    let actor = actor_from(&headers)?;
    let kind = kind_from(&kind)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let opts = DecisionOptions {
        comment: body.comment,
        silent: body.silent,
    };
    blocking(move || {
        let outcome = state.services.workflow.approve(kind, id, &actor, &opts);
        Ok(transition_response(WorkflowResult::settle(kind, id, outcome)?))
    })
    .await
}

/// POST /api/records/:kind/:id/reject
async fn reject_record(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((kind, id)): Path<(String, i64)>,
    body: Option<Json<ReasonBody>>,
) -> ApiResult<Response> {
    let actor = actor_from(&headers)?;
    let kind = kind_from(&kind)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let opts = DecisionOptions {
        comment: None,
        silent: body.silent,
    };
    blocking(move || {
        let outcome = state
            .services
            .workflow
            .reject(kind, id, &body.reason, &actor, &opts);
        Ok(transition_response(WorkflowResult::settle(kind, id, outcome)?))
    })
    .await
}

/// POST /api/records/:kind/:id/revision
async fn request_revision(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((kind, id)): Path<(String, i64)>,
    body: Option<Json<ReasonBody>>,
) -> ApiResult<Response> {
    let actor = actor_from(&headers)?;
    let kind = kind_from(&kind)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let opts = DecisionOptions {
        comment: None,
        silent: body.silent,
    };
    blocking(move || {
        let outcome = state
            .services
            .workflow
            .request_revision(kind, id, &body.reason, &actor, &opts);
        Ok(transition_response(WorkflowResult::settle(kind, id, outcome)?))
    })
    .await
}

/// POST /api/records/:kind/:id/resubmit
async fn resubmit_record(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((kind, id)): Path<(String, i64)>,
    body: Option<Json<ResubmitBody>>,
) -> ApiResult<Response> {
    let actor = actor_from(&headers)?;
    let kind = kind_from(&kind)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    blocking(move || {
        let outcome = state.services.workflow.resubmit_after_revision(
            kind,
            id,
            body.notes.as_deref(),
            &actor,
        );
        Ok(transition_response(WorkflowResult::settle(kind, id, outcome)?))
    })
    .await
}

/// GET /api/records/:kind/:id/audit
async fn audit_trail(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, i64)>,
) -> ApiResult<Response> {
    let kind = kind_from(&kind)?;
    let trail = blocking(move || Ok(state.services.workflow.audit_trail(kind, id)?)).await?;
    Ok(Json(ApiResponse::ok(trail)).into_response())
}

/// POST /api/batch - Approve or reject many records
async fn batch_approval(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<BatchBody>,
) -> ApiResult<Response> {
    let actor = actor_from(&headers)?;
    let kind = kind_from(&body.model_type)?;
    let result = blocking(move || {
        Ok(state.services.workflow.batch_approval(
            &body.ids,
            kind,
            body.action,
            body.reason.as_deref(),
            &actor,
        )?)
    })
    .await?;
    Ok(Json(ApiResponse::ok(result)).into_response())
}

/// GET /api/queue - Records the actor may decide
async fn pending_queue(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<KindQuery>,
) -> ApiResult<Response> {
    let actor = actor_from(&headers)?;
    let kind = kind_filter(query.kind.as_deref())?;
    let queue = blocking(move || Ok(state.services.workflow.pending_queue(&actor, kind)?)).await?;
    Ok(Json(ApiResponse::ok(queue)).into_response())
}

/// GET /api/stats - Validation statistics
async fn validation_stats(
    State(state): State<AppState>,
    Query(query): Query<KindQuery>,
) -> ApiResult<Response> {
    let kind = kind_filter(query.kind.as_deref())?;
    let days = query.days.unwrap_or(30);
    let stats =
        blocking(move || Ok(state.services.workflow.get_validation_stats(kind, days)?)).await?;
    Ok(Json(ApiResponse::ok(stats)).into_response())
}

/// GET /api/petugas/:user/stats
async fn petugas_stats(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Query(query): Query<PetugasQuery>,
) -> ApiResult<Response> {
    let reference = query.date.unwrap_or_else(|| Utc::now().date_naive());
    let period = match query.period.as_deref() {
        Some(raw) => Some(
            StatsPeriod::parse(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown period '{}'", raw)))?,
        ),
        None => None,
    };

    let stats = state.services.stats.clone();
    let body = blocking(move || {
        let value = match period {
            Some(period) => serde_json::to_value(stats.stats_for(&user, period, reference)?),
            None => serde_json::to_value(stats.summary(&user, reference)?),
        };
        value.map_err(|e| ApiError::Internal(e.into()))
    })
    .await?;
    Ok(Json(ApiResponse::ok(body)).into_response())
}

/// GET /api/notifications - Inbox of the acting user and their approver tier
async fn notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<InboxQuery>,
) -> ApiResult<Response> {
    let actor = actor_from(&headers)?;
    let tier = state.services.workflow.config().tier_for_role(&actor.role);
    let store = state.services.store.clone();

    let inbox = blocking(move || {
        let mut inbox: Vec<Notification> =
            store.notifications_for(&Recipient::User(actor.id.clone()), query.unread_only)?;
        if tier != ApprovalTier::None {
            inbox.extend(store.notifications_for(&Recipient::Tier(tier), query.unread_only)?);
        }
        inbox.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(inbox)
    })
    .await?;
    Ok(Json(ApiResponse::ok(inbox)).into_response())
}

/// POST /api/notifications/:id/read
async fn mark_notification_read(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let store = state.services.store.clone();
    let updated = blocking(move || Ok(store.mark_notification_read(&id)?)).await?;
    Ok(Json(ApiResponse::ok(serde_json::json!({ "updated": updated }))).into_response())
}

// ============================================================================
// Router
// ============================================================================

fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/records", get(list_records).post(create_record))
        .route("/records/:kind/:id", get(get_record))
        .route("/records/:kind/:id/submit", post(submit_record))
        .route("/records/:kind/:id/approve", post(approve_record))
        .route("/records/:kind/:id/reject", post(reject_record))
        .route("/records/:kind/:id/revision", post(request_revision))
        .route("/records/:kind/:id/resubmit", post(resubmit_record))
        .route("/records/:kind/:id/audit", get(audit_trail))
        .route("/batch", post(batch_approval))
        .route("/queue", get(pending_queue))
        .route("/stats", get(validation_stats))
        .route("/petugas/:user/stats", get(petugas_stats))
        .route("/notifications", get(notifications))
        .route("/notifications/:id/read", post(mark_notification_read))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Main Server
// ============================================================================

fn main() -> anyhow::Result<()> {
    init_tracing("clinic_validation=info,clinic_server=info,tower_http=info");

    println!("🌐 Clinic Validation - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // Services (and the blocking Telegram client) are built before the runtime starts
    let config = AppConfig::load(None)?;
    let services = ClinicServices::open(&config)?;
    println!("✓ Database opened: {}", config.database_path.display());
    println!("✓ Notification channels: {}", services.notifications.channel_names().join(", "));

    let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string());
    let addr = format!("{}:{}", bind_addr, port);

    let app = router(AppState { services });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!("listening on {}", addr);
        println!("\n🚀 Server running on http://{}", addr);
        println!("   API: http://{}/api/health", addr);
        println!("\n   Press Ctrl+C to stop\n");

        axum::serve(listener, app).await?;
        Ok::<(), anyhow::Error>(())
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use clinic_validation::{RecordStore, SqliteStore};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> Router {
        let store: Arc<dyn RecordStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let services = ClinicServices::with_store(store, &AppConfig::default());
        router(AppState { services })
    }

    fn request(method: &str, uri: &str, actor: Option<(&str, &str)>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some((id, role)) = actor {
            builder = builder
                .header(ACTOR_ID_HEADER, id)
                .header(ACTOR_ROLE_HEADER, role);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    fn procedure(amount: i64) -> serde_json::Value {
        serde_json::json!({
            "details": {
                "kind": "tindakan",
                "shift_id": 1,
                "pasien_id": 4,
                "jenis_tindakan_id": 2,
                "dokter_id": null,
                "paramedis_id": null
            },
            "amount": amount.to_string(),
            "tanggal": "2025-02-05"
        })
    }

    #[tokio::test]
    async fn test_health() {
        let app = app();
        let (status, json) = send(&app, request("GET", "/api/health", None, serde_json::Value::Null)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["status"], "ok");
    }

    #[tokio::test]
    async fn test_create_submit_approve_flow() {
        let app = app();
        let petugas = Some(("petugas-1", "petugas"));

        let (status, json) = send(&app, request("POST", "/api/records", petugas, procedure(2_000_000))).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = json["data"]["id"].as_i64().unwrap();

        let (status, json) = send(
            &app,
            request("POST", &format!("/api/records/tindakan/{}/submit", id), petugas, serde_json::json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["requires_approval_from"], "manager");

        // Supervisor is below the manager tier
        let (status, json) = send(
            &app,
            request(
                "POST",
                &format!("/api/records/tindakan/{}/approve", id),
                Some(("sup-1", "supervisor")),
                serde_json::json!({}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["success"], false);
        assert_eq!(json["error_code"], "insufficient_permissions");

        let (status, json) = send(
            &app,
            request(
                "POST",
                &format!("/api/records/tindakan/{}/approve", id),
                Some(("mgr-1", "manager")),
                serde_json::json!({"comment": "ok"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "approved");

        let (_, json) = send(
            &app,
            request("GET", &format!("/api/records/tindakan/{}/audit", id), None, serde_json::Value::Null),
        )
        .await;
        assert_eq!(json["data"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_missing_actor_is_bad_request() {
        let app = app();
        let (status, json) = send(&app, request("POST", "/api/records", None, procedure(10_000))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn test_unknown_kind_and_missing_record() {
        let app = app();
        let (status, json) = send(
            &app,
            request("GET", "/api/records/laundry/1", None, serde_json::Value::Null),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["error_code"], "unknown_model_type");

        let (status, json) = send(
            &app,
            request("GET", "/api/records/tindakan/404", None, serde_json::Value::Null),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["error_code"], "not_found");
    }

    #[tokio::test]
    async fn test_batch_and_queue() {
        let app = app();
        let petugas = Some(("petugas-1", "petugas"));
        let supervisor = Some(("sup-1", "supervisor"));

        let mut ids = Vec::new();
        for amount in [150_000, 200_000] {
            let mut body = procedure(amount);
            body["submit"] = serde_json::json!(true);
            let (status, json) = send(&app, request("POST", "/api/records", petugas, body)).await;
            assert_eq!(status, StatusCode::OK);
            ids.push(json["record_id"].as_i64().unwrap());
        }

        let (_, json) = send(&app, request("GET", "/api/queue", supervisor, serde_json::Value::Null)).await;
        assert_eq!(json["data"].as_array().unwrap().len(), 2);

        let (status, json) = send(
            &app,
            request(
                "POST",
                "/api/batch",
                supervisor,
                serde_json::json!({"model_type": "tindakan", "action": "reject", "ids": ids}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["error_code"], "missing_reason");

        let (status, json) = send(
            &app,
            request(
                "POST",
                "/api/batch",
                supervisor,
                serde_json::json!({"model_type": "tindakan", "action": "approve", "ids": ids}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["approved"], 2);

        let (status, json) = send(&app, request("GET", "/api/stats?kind=all&days=7", None, serde_json::Value::Null)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["total"], 2);
        assert_eq!(json["data"]["approval_rate"], 100.0);

        // Submitter got one approval notice per record
        let (_, json) = send(
            &app,
            request("GET", "/api/notifications?unread_only=true", petugas, serde_json::Value::Null),
        )
        .await;
        assert_eq!(json["data"].as_array().unwrap().len(), 2);
    }
}
