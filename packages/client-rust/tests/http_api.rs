//! End-to-end tests of the HTTP transport and controllers against an
//! in-process mock backend.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use maestro_client::{
    ApiError, ClientConfig, ErrorKind, GridStateHandle, HttpApi, MasterController,
    MasterDetailController, MemoryNavigator, MemoryNotifier, OptionResolver, RestApi,
};
use maestro_core::dates::FormValues;
use maestro_core::NEW_RECORD_ID;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;

const TOKEN: &str = "t0k3n";

#[derive(Clone, Default)]
struct Backend {
    queries: Arc<Mutex<Vec<String>>>,
    bodies: Arc<Mutex<Vec<Value>>>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TOKEN}"))
}

async fn list(State(backend): State<Backend>, headers: HeaderMap, RawQuery(query): RawQuery) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"detail": "Token inválido"}))).into_response();
    }
    backend.queries.lock().push(query.unwrap_or_default());
    Json(json!({
        "data": [
            {"id": 1, "nombre": "Ana", "sueldo": 1250000, "activo": true},
            {"id": 2, "nombre": "Luis", "sueldo": 980000, "activo": false},
        ],
        "form": [
            {"field": "nombre", "in_table": true, "required": true},
            {"field": "sueldo", "type": "number", "in_table": true},
            {"field": "activo", "type": "boolean", "in_table": true},
            {"field": "antiguedad", "type": "number", "in_table": false, "persist": false},
        ],
        "total": 42,
    }))
    .into_response()
}

async fn save(State(backend): State<Backend>, Json(body): Json<Value>) -> Response {
    backend.bodies.lock().push(body);
    (StatusCode::CONFLICT, Json(json!({"detail": "Registro modificado por otro usuario"}))).into_response()
}

async fn remove() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "database unavailable").into_response()
}

async fn details(Path(id): Path<String>) -> Json<Value> {
    let header_data = if id == NEW_RECORD_ID { json!(null) } else { json!({"id": id, "fecha": "2024-01-15"}) };
    Json(json!({
        "header_pk": "id",
        "header_structure": [
            {"field": "fecha", "type": "date"},
            {"field": "cargo", "type": "select", "api_ref": "cargos"},
        ],
        "header_data": header_data,
        "detail_structure": [{
            "name": "lineas",
            "label": "Líneas",
            "pk": "id_linea",
            "structure": [{"field": "monto", "type": "number"}],
        }],
    }))
}

async fn save_details(
    State(backend): State<Backend>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    backend.bodies.lock().push(json!({"id": id, "body": body}));
    Json(json!({"header_data": {"id": 900, "fecha": "2024-01-16"}}))
}

async fn cargos() -> Json<Value> {
    Json(json!([{"id": 1, "nombre": "Analista"}, {"id": 2, "nombre": "Jefe"}]))
}

async fn empty() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn spawn_backend() -> (SocketAddr, Backend) {
    let backend = Backend::default();
    let app = Router::new()
        .route("/api/empleados", get(list).post(save).delete(remove))
        .route("/api/contratos/details/{id}", get(details).post(save_details))
        .route("/api/selects/cargos", get(cargos))
        .route("/api/ping", get(empty))
        .with_state(backend.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (addr, backend)
}

fn config(addr: SocketAddr, token: Option<&str>) -> ClientConfig {
    ClientConfig {
        base_url: format!("http://{addr}/api"),
        token: token.map(str::to_string),
        rut_company: Some("76.123.456-0".into()),
        ..ClientConfig::default()
    }
}

#[tokio::test]
async fn get_sends_bearer_token_and_query() {
    let (addr, backend) = spawn_backend().await;
    let api = HttpApi::new(&config(addr, Some(TOKEN))).expect("client");
    let query = vec![("current".to_string(), "2".to_string()), ("search".to_string(), "ana maría".to_string())];
    let body = api.get("empleados", &query).await.expect("list");
    assert_eq!(body["total"], json!(42));
    let recorded = backend.queries.lock().clone();
    assert_eq!(recorded, ["current=2&search=ana+mar%C3%ADa"]);
}

#[tokio::test]
async fn status_errors_keep_detail() {
    let (addr, _) = spawn_backend().await;
    let api = HttpApi::new(&config(addr, None)).expect("client");

    let err = api.get("empleados", &[]).await.expect_err("unauthorized");
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert_eq!(err.detail(), Some("Token inválido"));

    let err = api.post("empleados", &[], &json!({})).await.expect_err("conflict");
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let err = api.delete("empleados", &[], &json!({})).await.expect_err("failure");
    assert_eq!(err.status(), Some(500));
    assert_eq!(err.detail(), None);
    assert!(matches!(err, ApiError::Status { ref body, .. } if body == "database unavailable"));
}

#[tokio::test]
async fn empty_success_body_is_null() {
    let (addr, _) = spawn_backend().await;
    let api = HttpApi::new(&config(addr, None)).expect("client");
    assert_eq!(api.get("ping", &[]).await.expect("ping"), Value::Null);
}

#[tokio::test]
async fn unreachable_backend_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    let api = HttpApi::new(&config(addr, None)).expect("client");
    let err = api.get("empleados", &[]).await.expect_err("refused");
    assert!(matches!(err, ApiError::Transport(_)));
}

#[tokio::test]
async fn master_controller_lists_and_renders() {
    let (addr, backend) = spawn_backend().await;
    let config = config(addr, Some(TOKEN));
    let api: Arc<dyn RestApi> = Arc::new(HttpApi::new(&config).expect("client"));
    let notifier = Arc::new(MemoryNotifier::new());
    let navigator = Arc::new(MemoryNavigator::new());
    let controller = MasterController::new(
        "empleados",
        api,
        notifier.clone(),
        navigator.clone(),
        GridStateHandle::isolated(config.grid_state()),
    )
    .with_rut_company(config.rut_company.clone());

    controller.search("ana").await.expect("search");
    let page = controller.page();
    assert_eq!(page.total, 42);
    assert_eq!(controller.grid().snapshot().pagination.total, 42);

    let query = backend.queries.lock()[0].clone();
    assert!(query.contains("search=ana"));
    assert!(query.contains("rut_company=76.123.456-0"));

    let table = controller.table(maestro_core::TableOptions::default());
    let exported = table.export_rows(&page.rows);
    assert_eq!(exported[0], ["Nombre", "Sueldo", "Activo"]);
    assert_eq!(exported[1][1], "1.250.000");

    let mut values = FormValues::new();
    values.set("nombre", json!("Luis"));
    values.set("antiguedad", json!(7));
    let err = controller.save(&values, None).await.expect_err("conflict");
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(navigator.logouts(), 0);
    assert!(!notifier.take().is_empty());
    assert_eq!(backend.bodies.lock()[0], json!({"nombre": "Luis"}));
}

#[tokio::test]
async fn master_detail_round_trip_rekeys_new_record() {
    let (addr, backend) = spawn_backend().await;
    let api: Arc<dyn RestApi> = Arc::new(HttpApi::new(&config(addr, Some(TOKEN))).expect("client"));
    let navigator = Arc::new(MemoryNavigator::new());
    let controller = MasterDetailController::new(
        "contratos",
        api.clone(),
        Arc::new(MemoryNotifier::new()),
        navigator.clone(),
    )
    .with_options(Arc::new(OptionResolver::new(api)));

    assert!(controller.open(NEW_RECORD_ID).await.expect("open"));
    let session = controller.snapshot();
    assert!(session.is_new());
    assert_eq!(session.header_structure().find("cargo").expect("cargo").options.len(), 2);

    controller
        .with_session(|s| {
            let mut values = FormValues::new();
            values.set("monto", json!(1500));
            s.add_detail("lineas", &values)
        })
        .expect("add line");

    let id = controller.save().await.expect("save");
    assert_eq!(id.as_deref(), Some("900"));
    assert_eq!(navigator.record_param().as_deref(), Some("900"));

    let posted = backend.bodies.lock()[0].clone();
    assert_eq!(posted["id"], json!(NEW_RECORD_ID));
    assert_eq!(posted["body"]["lineas"][0]["monto"], json!(1500));
}

#[tokio::test]
async fn option_resolver_reads_selects_endpoint() {
    let (addr, _) = spawn_backend().await;
    let api: Arc<dyn RestApi> = Arc::new(HttpApi::new(&config(addr, None)).expect("client"));
    let resolver = OptionResolver::new(api);
    let options = resolver.resolve("cargos").await.expect("cargos");
    assert_eq!(options[1].label, "Jefe");
    assert!(resolver.resolve("missing").await.is_err());
}
