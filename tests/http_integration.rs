#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use std::sync::Arc;

use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App};
use async_trait::async_trait;
use loadgen_agent::config::LimitsConfig;
use loadgen_agent::store::{CorpusStore, MemoryCorpusStore};
use loadgen_agent::{
    routes, AppState, CorpusRecord, CpuAccountant, CpuBurner, LoadCoordinator, LoadResult,
    Metrics,
};
use parking_lot::Mutex;
use serde_json::Value;

macro_rules! call_json {
    ($app:expr, $req:expr) => {{
        let resp = test::call_service($app, $req).await;
        let status = resp.status();
        let body = test::read_body(resp).await;
        let json: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }};
}

async fn state(corpus: Option<u64>) -> AppState {
    let store = match corpus {
        Some(count) => {
            let store: Arc<dyn CorpusStore> = Arc::new(MemoryCorpusStore::new(32));
            store.seed(count).await.expect("seed");
            Some(store)
        }
        None => None,
    };
    state_with(store, Metrics::new().expect("metrics"))
}

fn state_with(store: Option<Arc<dyn CorpusStore>>, metrics: Metrics) -> AppState {
    let burner = CpuBurner::from_entropy(16 * 1024, CpuAccountant::thread_cpu(), 0.99)
        .expect("burner");
    AppState {
        coordinator: LoadCoordinator::new(Arc::new(burner), store, metrics.clone()),
        metrics,
        limits: LimitsConfig::default(),
        default_seed_count: 100,
    }
}

#[actix_web::test]
async fn workload_endpoint() {
    let st = state(Some(100)).await;
    let metrics = st.metrics.clone();
    let app = test::init_service(App::new().app_data(web::Data::new(st)).configure(routes)).await;

    // healthz
    let req = test::TestRequest::get().uri("/healthz").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    assert_eq!(test::read_body(resp).await, "OK");

    // cpu only
    let req = test::TestRequest::get().uri("/work?cpu_ms=50").to_request();
    let (status, body) = call_json!(&app, req);
    assert_eq!(status, StatusCode::OK);
    assert!(body["cycles"].as_u64().expect("cycles") > 0);
    let cpu = body["cpu_time_ms"].as_f64().expect("cpu_time_ms");
    assert!((49.5..60.0).contains(&cpu), "cpu_time_ms {cpu}");
    assert!(body.get("io_time_ms").is_none());
    assert!(body["total_time_ms"].as_f64().is_some());

    // io only
    let req = test::TestRequest::get().uri("/work?io_ms=100").to_request();
    let (status, body) = call_json!(&app, req);
    assert_eq!(status, StatusCode::OK);
    assert!(body["total_time_ms"].as_f64().expect("total") >= 100.0);
    assert_eq!(body["io_time_ms"], 100);
    assert!(body.get("cycles").is_none());
    assert!(body.get("cpu_time_ms").is_none());

    // both
    let req = test::TestRequest::get().uri("/work?cpu_ms=30&io_ms=50").to_request();
    let (status, body) = call_json!(&app, req);
    assert_eq!(status, StatusCode::OK);
    let cpu = body["cpu_time_ms"].as_f64().expect("cpu");
    let total = body["total_time_ms"].as_f64().expect("total");
    assert!(total + 1.0 >= cpu + 50.0, "total {total} cpu {cpu}");

    // malformed input has no side effects
    let units_before = metrics.work_units_total.get();
    let req = test::TestRequest::get().uri("/work?cpu_ms=abc").to_request();
    let (status, body) = call_json!(&app, req);
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert_eq!(metrics.work_units_total.get(), units_before);
}

#[actix_web::test]
async fn payload_path_form() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state(None).await))
            .configure(routes),
    )
    .await;

    let req = test::TestRequest::get().uri("/payload").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(
        resp.headers().get(header::LOCATION).and_then(|v| v.to_str().ok()),
        Some("/payload/10/0")
    );

    let req = test::TestRequest::get().uri("/payload/5/10").to_request();
    let (status, body) = call_json!(&app, req);
    assert_eq!(status, StatusCode::OK);
    assert!(body["cycles"].as_u64().expect("cycles") > 0);
    assert_eq!(body["io_time_ms"], 10);

    let req = test::TestRequest::get().uri("/payload/5").to_request();
    let (status, body) = call_json!(&app, req);
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("io_time_ms").is_none());

    let req = test::TestRequest::get().uri("/payload/x/1").to_request();
    let (status, _) = call_json!(&app, req);
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn lookup_and_corpus_admin() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state(Some(100)).await))
            .configure(routes),
    )
    .await;

    let req = test::TestRequest::get().uri("/lookup?id=7").to_request();
    let (status, body) = call_json!(&app, req);
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 7);
    assert!(body["value"].as_str().expect("value").starts_with("record-0000000007"));
    assert!(body["total_time_ms"].as_f64().is_some());

    let req = test::TestRequest::get().uri("/lookup").to_request();
    let (status, body) = call_json!(&app, req);
    assert_eq!(status, StatusCode::OK);
    let id = body["id"].as_i64().expect("id");
    assert!((1..=100).contains(&id));

    let req = test::TestRequest::get().uri("/lookup?id=101").to_request();
    let (status, _) = call_json!(&app, req);
    assert_eq!(status, StatusCode::NOT_FOUND);

    let req = test::TestRequest::get().uri("/lookup?id=abc").to_request();
    let (status, _) = call_json!(&app, req);
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post().uri("/corpus/seed?count=20").to_request();
    let (status, body) = call_json!(&app, req);
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 20);
    assert_eq!(body["backend"], "memory");

    let req = test::TestRequest::get().uri("/lookup?id=21").to_request();
    let (status, _) = call_json!(&app, req);
    assert_eq!(status, StatusCode::NOT_FOUND);

    let req = test::TestRequest::get().uri("/work?cpu_ms=1&lookup=20").to_request();
    let (status, body) = call_json!(&app, req);
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 20);
    assert!(body.get("cycles").is_some());

    let req = test::TestRequest::delete().uri("/corpus").to_request();
    let (status, _) = call_json!(&app, req);
    assert_eq!(status, StatusCode::OK);

    let req = test::TestRequest::get().uri("/lookup").to_request();
    let (status, _) = call_json!(&app, req);
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn lookup_without_store_is_unavailable() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state(None).await))
            .configure(routes),
    )
    .await;

    let req = test::TestRequest::get().uri("/lookup").to_request();
    let (status, body) = call_json!(&app, req);
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "error");

    let req = test::TestRequest::get().uri("/readyz").to_request();
    let (status, body) = call_json!(&app, req);
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accounting"], "thread_cpu");

    let req = test::TestRequest::get().uri("/metrics").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
}

/// Memory store that notes the in-flight gauge whenever an admin operation runs.
struct GaugeRecordingStore {
    inner: MemoryCorpusStore,
    metrics: Metrics,
    seen: Mutex<Vec<(&'static str, i64)>>,
}

impl GaugeRecordingStore {
    fn note(&self, op: &'static str) {
        self.seen.lock().push((op, self.metrics.requests_in_flight.get()));
    }
}

#[async_trait]
impl CorpusStore for GaugeRecordingStore {
    fn backend(&self) -> &'static str {
        self.inner.backend()
    }

    fn len(&self) -> u64 {
        self.inner.len()
    }

    async fn refresh_len(&self) -> LoadResult<u64> {
        self.inner.refresh_len().await
    }

    async fn seed(&self, count: u64) -> LoadResult<()> {
        self.note("seed");
        self.inner.seed(count).await
    }

    async fn fetch_record(&self, id: i64) -> LoadResult<CorpusRecord> {
        self.inner.fetch_record(id).await
    }

    async fn clear(&self) -> LoadResult<()> {
        self.note("clear");
        self.inner.clear().await
    }
}

#[actix_web::test]
async fn admin_handlers_count_as_in_flight() {
    let metrics = Metrics::new().expect("metrics");
    let store = Arc::new(GaugeRecordingStore {
        inner: MemoryCorpusStore::new(16),
        metrics: metrics.clone(),
        seen: Mutex::new(Vec::new()),
    });
    let dyn_store: Arc<dyn CorpusStore> = store.clone();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state_with(Some(dyn_store), metrics.clone())))
            .configure(routes),
    )
    .await;

    let req = test::TestRequest::post().uri("/corpus/seed?count=3").to_request();
    let (status, _) = call_json!(&app, req);
    assert_eq!(status, StatusCode::OK);
    let req = test::TestRequest::delete().uri("/corpus").to_request();
    let (status, _) = call_json!(&app, req);
    assert_eq!(status, StatusCode::OK);

    assert_eq!(*store.seen.lock(), vec![("seed", 1), ("clear", 1)]);
    assert_eq!(metrics.requests_in_flight.get(), 0);
    assert_eq!(
        metrics.requests_total.with_label_values(&["clear", "ok"]).get(),
        1
    );
}
