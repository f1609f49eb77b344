use crate::batch_update::{BatchUpdateEngine, RunSummary};
use crate::cache::CacheService;
use crate::config::Config;
use crate::constants::{CACHE_NAMESPACE, CACHE_TTL};
use crate::crm_client::CrmClient;
use crate::enrichment_client::EnrichmentClient;
use crate::errors::AppError;
use crate::org_mapper::OrgAccountMapper;
use crate::task_queue::{CancellationFlag, RetryPolicy, TaskQueue};
use crate::usage_repository::UsageRepository;
use crate::workflows::{
    CompanyEnrichmentInputs, CompanyEnrichmentWorkflow, UsageEnrichmentInputs,
    UsageEnrichmentWorkflow,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// How long finished run records stay queryable.
const RUN_RECORD_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    UsageEnrichment,
    CompanyEnrichment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

/// What `GET /api/v1/workflows/runs/:run_id` reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub workflow: WorkflowKind,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub summary: Option<RunSummary>,
    pub error: Option<String>,
}

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub usage_workflow: UsageEnrichmentWorkflow,
    pub company_workflow: CompanyEnrichmentWorkflow,
    pub retry_policy: RetryPolicy,
    /// Run id -> latest known state of the run.
    pub runs: Cache<Uuid, RunRecord>,
    /// Run id -> cancellation flag of a run still in progress.
    pub cancellations: Cache<Uuid, CancellationFlag>,
}

impl AppState {
    /// Wires every collaborator from configuration.
    pub fn new(config: Config, pool: PgPool) -> Result<Self, AppError> {
        let crm = CrmClient::from_config(&config)?;
        let enrichment = EnrichmentClient::from_config(&config)?;
        let cache = CacheService::new(CACHE_NAMESPACE, CACHE_TTL, 16);
        let mapper = OrgAccountMapper::new(crm.clone(), cache);
        let engine = BatchUpdateEngine::new(crm);

        Ok(Self {
            usage_workflow: UsageEnrichmentWorkflow::new(
                mapper.clone(),
                UsageRepository::new(pool),
                engine.clone(),
            ),
            company_workflow: CompanyEnrichmentWorkflow::new(mapper, enrichment, engine),
            config,
            retry_policy: RetryPolicy::default(),
            runs: Cache::builder()
                .time_to_live(RUN_RECORD_TTL)
                .max_capacity(10_000)
                .build(),
            cancellations: Cache::builder()
                .time_to_live(RUN_RECORD_TTL)
                .max_capacity(10_000)
                .build(),
        })
    }
}

/// All routes, with state attached. Middleware is layered on by the caller.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/v1/workflows/usage-enrichment",
            post(start_usage_enrichment),
        )
        .route(
            "/api/v1/workflows/company-enrichment",
            post(start_company_enrichment),
        )
        .route("/api/v1/workflows/runs/:run_id", get(get_run))
        .route("/api/v1/workflows/runs/:run_id/cancel", post(cancel_run))
        .with_state(state)
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "crm-enrichment",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// An empty body means "run with defaults".
fn payload_args(body: String) -> Vec<String> {
    if body.trim().is_empty() {
        Vec::new()
    } else {
        vec![body]
    }
}

/// POST /api/v1/workflows/usage-enrichment
///
/// Body is the raw options JSON, e.g. `{"batch_size": 50, "max_orgs": 1000}`.
/// Parsed before anything is scheduled; a malformed body is a 400.
pub async fn start_usage_enrichment(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let inputs = UsageEnrichmentInputs::parse_inputs(&payload_args(body))?;
    tracing::info!("POST /workflows/usage-enrichment - inputs: {:?}", inputs);

    let workflow = state.usage_workflow.clone();
    let run_id = spawn_run(&state, WorkflowKind::UsageEnrichment, move |queue| async move {
        workflow.run(&inputs, &queue).await
    })
    .await;

    Ok(accepted(run_id))
}

/// POST /api/v1/workflows/company-enrichment
pub async fn start_company_enrichment(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let inputs = CompanyEnrichmentInputs::parse_inputs(&payload_args(body))?;
    tracing::info!("POST /workflows/company-enrichment - inputs: {:?}", inputs);

    let workflow = state.company_workflow.clone();
    let run_id = spawn_run(&state, WorkflowKind::CompanyEnrichment, move |queue| async move {
        workflow.run(&inputs, &queue).await
    })
    .await;

    Ok(accepted(run_id))
}

fn accepted(run_id: Uuid) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::ACCEPTED,
        Json(json!({
            "run_id": run_id,
            "status": RunStatus::Running,
        })),
    )
}

/// GET /api/v1/workflows/runs/:run_id
pub async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<RunRecord>, AppError> {
    state
        .runs
        .get(&run_id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Run {} not found", run_id)))
}

/// POST /api/v1/workflows/runs/:run_id/cancel
///
/// Cooperative: the run stops before its next chunk.
pub async fn cancel_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<Uuid>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let flag = state
        .cancellations
        .get(&run_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("No active run {}", run_id)))?;
    flag.cancel();
    tracing::info!("Cancellation requested for run {}", run_id);

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "run_id": run_id, "cancel_requested": true })),
    ))
}

/// Registers a run and drives it to completion on a background task.
async fn spawn_run<F, Fut>(state: &AppState, workflow: WorkflowKind, run: F) -> Uuid
where
    F: FnOnce(TaskQueue) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<RunSummary, AppError>> + Send + 'static,
{
    let run_id = Uuid::new_v4();
    let cancel = CancellationFlag::new();
    let queue = TaskQueue::with_cancellation(state.retry_policy, cancel.clone());

    let record = RunRecord {
        run_id,
        workflow,
        status: RunStatus::Running,
        started_at: Utc::now(),
        finished_at: None,
        summary: None,
        error: None,
    };
    state.runs.insert(run_id, record.clone()).await;
    state.cancellations.insert(run_id, cancel).await;

    let runs = state.runs.clone();
    let cancellations = state.cancellations.clone();

    tokio::spawn(async move {
        tracing::info!("Starting {:?} run {}", workflow, run_id);

        let finished = match run(queue).await {
            Ok(summary) => {
                tracing::info!(
                    "Run {} completed: {} succeeded, {} failed, {} skipped",
                    run_id,
                    summary.succeeded,
                    summary.failed,
                    summary.skipped
                );
                RunRecord {
                    status: RunStatus::Completed,
                    finished_at: Some(Utc::now()),
                    summary: Some(summary),
                    ..record
                }
            }
            Err(e) => {
                tracing::error!("Run {} failed: {}", run_id, e);
                RunRecord {
                    status: RunStatus::Failed,
                    finished_at: Some(Utc::now()),
                    error: Some(e.to_string()),
                    ..record
                }
            }
        };

        runs.insert(run_id, finished).await;
        cancellations.invalidate(&run_id).await;
    });

    run_id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_body_means_defaults() {
        assert!(payload_args("  \n".to_string()).is_empty());
        assert_eq!(payload_args("{}".to_string()), vec!["{}".to_string()]);
    }

    #[test]
    fn test_run_record_serializes_status_snake_case() {
        let record = RunRecord {
            run_id: Uuid::nil(),
            workflow: WorkflowKind::UsageEnrichment,
            status: RunStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            summary: None,
            error: None,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["status"], "running");
        assert_eq!(value["workflow"], "usage_enrichment");
    }
}
