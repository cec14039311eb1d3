#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use std::collections::HashMap;
use std::time::Instant;

use actix_web::http::{header, StatusCode};
use actix_web::{delete, get, post, web, App, HttpResponse, HttpServer};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::accounting::duration_ms;
use crate::domain::{AppState, WorkloadDescriptor};
use crate::error::LoadError;
use crate::metrics::InFlight;
use crate::validation::{parse_lookup_id, parse_payload_path, parse_seed_count, parse_workload};

/// `/payload` without parameters redirects here.
pub const DEFAULT_PAYLOAD_PATH: &str = "/payload/10/0";

#[get("/work")]
pub async fn work(
    query: web::Query<HashMap<String, String>>,
    data: web::Data<AppState>,
) -> HttpResponse {
    match parse_workload(&query, &data.limits) {
        Ok(desc) => run_workload("work", &desc, &data).await,
        Err(e) => error_response("work", &e, &data),
    }
}

#[get("/payload")]
pub async fn payload_default() -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, DEFAULT_PAYLOAD_PATH))
        .finish()
}

#[get("/payload/{cpu_ms}")]
pub async fn payload_cpu(path: web::Path<String>, data: web::Data<AppState>) -> HttpResponse {
    let cpu_ms = path.into_inner();
    match parse_payload_path(&cpu_ms, None, &data.limits) {
        Ok(desc) => run_workload("payload", &desc, &data).await,
        Err(e) => error_response("payload", &e, &data),
    }
}

#[get("/payload/{cpu_ms}/{io_ms}")]
pub async fn payload_cpu_io(
    path: web::Path<(String, String)>,
    data: web::Data<AppState>,
) -> HttpResponse {
    let (cpu_ms, io_ms) = path.into_inner();
    match parse_payload_path(&cpu_ms, Some(&io_ms), &data.limits) {
        Ok(desc) => run_workload("payload", &desc, &data).await,
        Err(e) => error_response("payload", &e, &data),
    }
}

#[get("/lookup")]
pub async fn lookup(
    query: web::Query<HashMap<String, String>>,
    data: web::Data<AppState>,
) -> HttpResponse {
    match parse_lookup_id(query.get("id").map(String::as_str)) {
        Ok(key) => run_workload("lookup", &WorkloadDescriptor::lookup(key), &data).await,
        Err(e) => error_response("lookup", &e, &data),
    }
}

#[post("/corpus/seed")]
pub async fn seed(
    query: web::Query<HashMap<String, String>>,
    data: web::Data<AppState>,
) -> HttpResponse {
    let _in_flight = InFlight::enter(&data.metrics);
    let count = match parse_seed_count(
        query.get("count").map(String::as_str),
        data.default_seed_count,
    ) {
        Ok(c) => c,
        Err(e) => return error_response("seed", &e, &data),
    };
    let started = Instant::now();
    info!(count, "seed corpus request");
    match data.coordinator.seed(count).await {
        Ok(()) => {
            data.metrics.observe_request("seed", "ok");
            let backend = data.coordinator.store().map(|s| s.backend()).ok();
            HttpResponse::Ok().json(json!({
                "status": "ok",
                "count": count,
                "backend": backend,
                "total_time_ms": duration_ms(started.elapsed()),
            }))
        }
        Err(e) => error_response("seed", &e, &data),
    }
}

#[delete("/corpus")]
pub async fn clear(data: web::Data<AppState>) -> HttpResponse {
    let _in_flight = InFlight::enter(&data.metrics);
    info!("clear corpus request");
    match data.coordinator.clear().await {
        Ok(()) => {
            data.metrics.observe_request("clear", "ok");
            HttpResponse::Ok().json(json!({"status":"ok"}))
        }
        Err(e) => error_response("clear", &e, &data),
    }
}

#[get("/healthz")]
pub async fn healthz() -> HttpResponse {
    HttpResponse::Ok().content_type("text/plain").body("OK")
}

#[get("/readyz")]
pub async fn readyz(data: web::Data<AppState>) -> HttpResponse {
    let report = data.coordinator.readiness();
    if report.status == "ok" {
        HttpResponse::Ok().json(report)
    } else {
        HttpResponse::ServiceUnavailable().json(report)
    }
}

#[get("/metrics")]
pub async fn scrape_metrics(data: web::Data<AppState>) -> HttpResponse {
    match data.metrics.encode_text() {
        Ok(buf) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(buf),
        Err(e) => {
            error!(error=%format!("{e:#}"), "encode metrics failed");
            HttpResponse::InternalServerError().body("encode metrics failed")
        }
    }
}

/// Registers every endpoint.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(healthz)
        .service(readyz)
        .service(scrape_metrics)
        .service(work)
        .service(payload_default)
        .service(payload_cpu)
        .service(payload_cpu_io)
        .service(lookup)
        .service(seed)
        .service(clear);
}

pub async fn serve(state: AppState, bind: &str, shutdown_timeout_seconds: u64) -> std::io::Result<()> {
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(routes)
    })
    .shutdown_timeout(shutdown_timeout_seconds)
    .bind(bind)?
    .run()
    .await
}

async fn run_workload(
    endpoint: &'static str,
    desc: &WorkloadDescriptor,
    data: &AppState,
) -> HttpResponse {
    let _in_flight = InFlight::enter(&data.metrics);
    match data.coordinator.run(desc).await {
        Ok(report) => {
            data.metrics.observe_request(endpoint, "ok");
            HttpResponse::Ok().json(report)
        }
        Err(e) => error_response(endpoint, &e, data),
    }
}

fn error_response(endpoint: &str, err: &LoadError, data: &AppState) -> HttpResponse {
    data.metrics.observe_request(endpoint, err.kind());
    let code = match err {
        LoadError::InvalidInput(_) => {
            debug!(endpoint, error = %err, "rejected request");
            StatusCode::BAD_REQUEST
        }
        LoadError::NotFound(_) => {
            debug!(endpoint, error = %err, "record not found");
            StatusCode::NOT_FOUND
        }
        LoadError::BackendUnavailable(_) | LoadError::Cancelled { .. } => {
            warn!(endpoint, error = %err, "request failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
        LoadError::AccountingUnavailable(_) | LoadError::Internal(_) => {
            error!(endpoint, error = %err, "request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    json_error(code, &err.to_string())
}

fn json_error(code: StatusCode, reason: &str) -> HttpResponse {
    HttpResponse::build(code).json(json!({"status":"error","reason":reason}))
}
