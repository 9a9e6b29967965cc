use axum::{
    Json, Router,
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use slit_planner::batch::{self, WidthOverrides};
use slit_planner::SolveError;
use slit_planner::config::SolverConfig;
use slit_planner::master::{MasterEntry, MaterialMaster};
use slit_planner::schedule::{
    ComplianceRow, compliance_report, compute_max_lateness, compute_max_offset,
};
use slit_planner::types::{BatchResult, DailyPlan, DemandLine};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

#[derive(Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct SolveRequest {
    demands: Vec<DemandLine>,
    #[serde(default)]
    config: SolverConfig,
    #[serde(default)]
    width_overrides: WidthOverrides,
    /// Replaces the bundled material master for this request.
    #[serde(default)]
    master: Option<Vec<MasterEntry>>,
    #[serde(default)]
    attempts: Option<u32>,
    #[serde(default = "default_true")]
    schedule: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SolveResponse {
    #[serde(flatten)]
    batch: BatchResult,
    max_lateness: Option<i64>,
}

#[derive(Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct LatenessRequest {
    days: Vec<DailyPlan>,
    demands: Vec<DemandLine>,
    #[serde(default = "default_buffer")]
    lead_buffer_days: i64,
}

fn default_buffer() -> i64 {
    SolverConfig::default().lead_buffer_days
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LatenessResponse {
    max_lateness: i64,
    max_offset: Option<i64>,
    compliance: Vec<ComplianceRow>,
}

async fn solve(
    Json(req): Json<SolveRequest>,
) -> Result<Json<SolveResponse>, (StatusCode, String)> {
    tracing::info!(
        demands = req.demands.len(),
        attempts = req.attempts.unwrap_or(req.config.attempts),
        "POST /solve"
    );

    if req.demands.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "at least one demand line is required".to_string(),
        ));
    }
    if let Some(bad) = req
        .demands
        .iter()
        .find(|d| !d.target_tons.is_finite() || d.target_tons < 0.0)
    {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("invalid target {} t for width {} mm", bad.target_tons, bad.width),
        ));
    }
    let mut config = req.config;
    if let Some(attempts) = req.attempts {
        config.attempts = attempts;
    }
    config
        .validate()
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let master = match req.master {
        Some(entries) => MaterialMaster::from_entries(entries),
        None => MaterialMaster::bundled(),
    };
    let demands = req.demands;
    let overrides = req.width_overrides;
    let schedule = req.schedule;

    let response = tokio::task::spawn_blocking(move || -> Result<SolveResponse, SolveError> {
        let result = batch::solve_batch_best_of(
            &demands,
            &config,
            &master,
            &overrides,
            config.attempts,
            schedule,
        )?;
        let max_lateness = result
            .schedule
            .as_ref()
            .map(|s| compute_max_lateness(&s.days, &demands, config.lead_buffer_days));
        Ok(SolveResponse {
            batch: result,
            max_lateness,
        })
    })
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "solve task failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "solve task failed".to_string())
    })?
    .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;

    Ok(Json(response))
}

async fn lateness(
    Json(req): Json<LatenessRequest>,
) -> Result<Json<LatenessResponse>, (StatusCode, String)> {
    tracing::info!(
        days = req.days.len(),
        demands = req.demands.len(),
        "POST /lateness"
    );

    if req.lead_buffer_days < 0 {
        return Err((
            StatusCode::BAD_REQUEST,
            "lead buffer must be non-negative".to_string(),
        ));
    }

    Ok(Json(LatenessResponse {
        max_lateness: compute_max_lateness(&req.days, &req.demands, req.lead_buffer_days),
        max_offset: compute_max_offset(&req.days, &req.demands, req.lead_buffer_days),
        compliance: compliance_report(&req.days, &req.demands),
    }))
}

#[tokio::main]
async fn main() {
    let _sentry = std::env::var("SENTRY_DSN").ok().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open("development.log")
        .expect("failed to open development.log");

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_target(false)
        .with_ansi(false)
        .with_max_level(Level::INFO)
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3001".to_string());
    let addr = format!("0.0.0.0:{port}");

    let app = Router::new()
        .route("/up", get(|| async { "ok" }))
        .route("/solve", post(solve))
        .route("/lateness", post(lateness))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    eprintln!("Listening on {addr}");
    axum::serve(listener, app).await.unwrap();
}
