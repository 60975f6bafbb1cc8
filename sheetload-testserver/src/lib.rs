//! In-process fake of the OLSHEETS HTTP contract.
//!
//! Serves the health probe, auth endpoints (signup, login, validate, me) with an in-memory
//! account store, and read-only catalog endpoints for sheets, instruments, bookings,
//! availability and pricing. Toggles in [`TestServerConfig`] simulate an unhealthy service,
//! closed signups, slow responses and failing endpoints.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::{Path, Query, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse as _, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

pub mod catalog;

pub const PATH_HEALTH: &str = "/actuator/health";
pub const PATH_SIGNUP: &str = "/api/auth/signup";
pub const PATH_LOGIN: &str = "/api/auth/login";
pub const PATH_VALIDATE: &str = "/api/auth/validate";
pub const PATH_ME: &str = "/api/auth/me";

#[derive(Debug, Clone)]
pub struct TestServerConfig {
    pub healthy: bool,
    /// When false every signup answers 400 as if the username were taken.
    pub signup_open: bool,
    /// Added to every response.
    pub latency: Option<Duration>,
    /// Accounts that exist before the first request, as `(username, password)`.
    pub seed_users: Vec<(String, String)>,
    /// Path prefixes answered with 500 before reaching a handler.
    pub failing_paths: Vec<String>,
}

impl Default for TestServerConfig {
    fn default() -> Self {
        Self {
            healthy: true,
            signup_open: true,
            latency: None,
            seed_users: Vec::new(),
            failing_paths: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
    signups: Arc<AtomicU64>,
    logins: Arc<AtomicU64>,
    authorized: Arc<AtomicU64>,
    bearer_tokens: Arc<Mutex<BTreeSet<String>>>,
    path_hits: Arc<Mutex<BTreeMap<String, u64>>>,
}

impl TestServerStats {
    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    /// Successful signups.
    pub fn signups(&self) -> u64 {
        self.signups.load(Ordering::Relaxed)
    }

    /// Successful logins.
    pub fn logins(&self) -> u64 {
        self.logins.load(Ordering::Relaxed)
    }

    /// Requests to protected endpoints that presented a known token.
    pub fn authorized(&self) -> u64 {
        self.authorized.load(Ordering::Relaxed)
    }

    /// Every distinct bearer token presented on any request.
    pub fn bearer_tokens(&self) -> BTreeSet<String> {
        self.bearer_tokens.lock().clone()
    }

    pub fn hits(&self, path: &str) -> u64 {
        self.path_hits.lock().get(path).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
struct Account {
    id: u64,
    username: String,
    email: String,
    name: String,
    password: String,
}

#[derive(Debug, Default)]
struct Accounts {
    users: HashMap<String, Account>,
    tokens: HashMap<String, String>,
    next_id: u64,
}

impl Accounts {
    fn insert(&mut self, username: &str, email: &str, name: &str, password: &str) -> Account {
        self.next_id += 1;
        let account = Account {
            id: self.next_id,
            username: username.to_string(),
            email: email.to_string(),
            name: name.to_string(),
            password: password.to_string(),
        };
        self.users.insert(account.username.clone(), account.clone());
        account
    }

    fn issue_token(&mut self, username: &str) -> String {
        let token = format!("token-{username}-{}", self.tokens.len() + 1);
        self.tokens.insert(token.clone(), username.to_string());
        token
    }

    fn by_token(&self, token: &str) -> Option<&Account> {
        self.tokens.get(token).and_then(|u| self.users.get(u))
    }
}

#[derive(Clone)]
struct AppState {
    stats: TestServerStats,
    config: Arc<TestServerConfig>,
    accounts: Arc<Mutex<Accounts>>,
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn error(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "error": message })))
}

async fn track(State(state): State<AppState>, req: Request, next: Next) -> Response {
    state.stats.requests_total.fetch_add(1, Ordering::Relaxed);
    *state
        .stats
        .path_hits
        .lock()
        .entry(req.uri().path().to_string())
        .or_insert(0) += 1;
    if let Some(token) = bearer(req.headers()) {
        state.stats.bearer_tokens.lock().insert(token.to_string());
    }

    if let Some(latency) = state.config.latency {
        sleep(latency).await;
    }

    let path = req.uri().path();
    if state.config.failing_paths.iter().any(|p| path.starts_with(p.as_str())) {
        return error(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response();
    }

    next.run(req).await
}

async fn handle_health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    if state.config.healthy {
        (StatusCode::OK, Json(json!({ "status": "UP" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "DOWN" })),
        )
    }
}

#[derive(Debug, Deserialize)]
struct SignupRequest {
    username: String,
    email: String,
    name: String,
    password: String,
}

async fn handle_signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> (StatusCode, Json<Value>) {
    if !state.config.signup_open {
        return error(StatusCode::BAD_REQUEST, "Username already exists");
    }

    let mut accounts = state.accounts.lock();
    if accounts.users.contains_key(&req.username) {
        return error(StatusCode::BAD_REQUEST, "Username already exists");
    }

    let account = accounts.insert(&req.username, &req.email, &req.name, &req.password);
    let token = accounts.issue_token(&account.username);
    state.stats.signups.fetch_add(1, Ordering::Relaxed);

    (
        StatusCode::OK,
        Json(json!({ "token": token, "username": account.username, "name": account.name })),
    )
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

async fn handle_login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> (StatusCode, Json<Value>) {
    let mut accounts = state.accounts.lock();
    let Some(account) = accounts
        .users
        .get(&req.username)
        .filter(|a| a.password == req.password)
        .cloned()
    else {
        return error(StatusCode::UNAUTHORIZED, "Invalid username or password");
    };

    let token = accounts.issue_token(&account.username);
    state.stats.logins.fetch_add(1, Ordering::Relaxed);

    (
        StatusCode::OK,
        Json(json!({ "token": token, "username": account.username, "name": account.name })),
    )
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> Option<Account> {
    let token = bearer(headers)?;
    let account = state.accounts.lock().by_token(token).cloned()?;
    state.stats.authorized.fetch_add(1, Ordering::Relaxed);
    Some(account)
}

async fn handle_validate(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    match authenticate(&state, &headers) {
        Some(a) => (
            StatusCode::OK,
            Json(json!({ "username": a.username, "name": a.name })),
        ),
        None => error(StatusCode::UNAUTHORIZED, "Invalid token"),
    }
}

async fn handle_me(State(state): State<AppState>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    match authenticate(&state, &headers) {
        Some(a) => (
            StatusCode::OK,
            Json(json!({ "id": a.id, "username": a.username, "name": a.name, "email": a.email })),
        ),
        None => error(StatusCode::UNAUTHORIZED, "Not authenticated"),
    }
}

fn to_json<T: serde::Serialize>(value: T) -> (StatusCode, Json<Value>) {
    match serde_json::to_value(value) {
        Ok(v) => (StatusCode::OK, Json(v)),
        Err(_) => error(StatusCode::INTERNAL_SERVER_ERROR, "encode error"),
    }
}

async fn handle_sheets() -> (StatusCode, Json<Value>) {
    to_json(catalog::sheets())
}

async fn handle_sheets_search(
    Query(query): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    let name = query.get("name").map(String::as_str).unwrap_or_default();
    let found: Vec<_> = catalog::sheets()
        .into_iter()
        .filter(|s| catalog::contains_ignore_case(s.name, name))
        .collect();
    to_json(found)
}

async fn handle_sheets_by_category(
    Query(query): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    let category = query.get("category").map(String::as_str).unwrap_or_default();
    if !catalog::SHEET_CATEGORIES.contains(&category) {
        return error(StatusCode::BAD_REQUEST, "Invalid category");
    }
    let found: Vec<_> = catalog::sheets()
        .into_iter()
        .filter(|s| s.category == category)
        .collect();
    to_json(found)
}

async fn handle_sheet(Path(id): Path<u64>) -> (StatusCode, Json<Value>) {
    match catalog::sheets().into_iter().find(|s| s.id == id) {
        Some(sheet) => to_json(sheet),
        None => error(StatusCode::NOT_FOUND, "Sheet not found"),
    }
}

async fn handle_instruments_search(
    Query(query): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    let name = query.get("name").map(String::as_str).unwrap_or_default();
    let found: Vec<_> = catalog::instruments()
        .into_iter()
        .filter(|i| catalog::contains_ignore_case(i.name, name))
        .collect();
    to_json(found)
}

async fn handle_instruments_by_type(
    Query(query): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    let kind = query.get("type").map(String::as_str).unwrap_or_default();
    if !catalog::INSTRUMENT_TYPES.contains(&kind) {
        return error(StatusCode::BAD_REQUEST, "Invalid instrument type");
    }
    let found: Vec<_> = catalog::instruments()
        .into_iter()
        .filter(|i| i.kind == kind)
        .collect();
    to_json(found)
}

async fn handle_instruments_by_family(
    Query(query): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    let family = query.get("family").map(String::as_str).unwrap_or_default();
    if !catalog::INSTRUMENT_FAMILIES.contains(&family) {
        return error(StatusCode::BAD_REQUEST, "Invalid instrument family");
    }
    let found: Vec<_> = catalog::instruments()
        .into_iter()
        .filter(|i| i.family == family)
        .collect();
    to_json(found)
}

async fn handle_instrument(Path(id): Path<u64>) -> (StatusCode, Json<Value>) {
    match catalog::instruments().into_iter().find(|i| i.id == id) {
        Some(instrument) => to_json(instrument),
        None => error(StatusCode::NOT_FOUND, "Instrument not found"),
    }
}

async fn handle_my_instruments(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if authenticate(&state, &headers).is_none() {
        return error(StatusCode::UNAUTHORIZED, "Not authenticated");
    }
    (StatusCode::OK, Json(json!([])))
}

async fn handle_my_bookings(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if authenticate(&state, &headers).is_none() {
        return error(StatusCode::UNAUTHORIZED, "Not authenticated");
    }
    (StatusCode::OK, Json(json!([])))
}

async fn handle_availability(Path(id): Path<u64>) -> (StatusCode, Json<Value>) {
    if catalog::instruments().iter().any(|i| i.id == id) {
        to_json(catalog::availability(id))
    } else {
        to_json(Vec::<catalog::AvailabilitySlot>::new())
    }
}

async fn handle_price(Path(id): Path<u64>) -> Response {
    match catalog::item_price(id) {
        Some(price) => Json(json!({ "itemId": id, "price": price })).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

fn router_with(state: AppState) -> Router {
    Router::new()
        .route(PATH_HEALTH, get(handle_health))
        .route(PATH_SIGNUP, post(handle_signup))
        .route(PATH_LOGIN, post(handle_login))
        .route(PATH_VALIDATE, get(handle_validate))
        .route(PATH_ME, get(handle_me))
        .route("/api/sheets", get(handle_sheets))
        .route("/api/sheets/search", get(handle_sheets_search))
        .route("/api/sheets/filter/category", get(handle_sheets_by_category))
        .route("/api/sheets/{id}", get(handle_sheet))
        .route("/api/instruments/search", get(handle_instruments_search))
        .route("/api/instruments/filter/type", get(handle_instruments_by_type))
        .route(
            "/api/instruments/filter/family",
            get(handle_instruments_by_family),
        )
        .route("/api/instruments/my-instruments", get(handle_my_instruments))
        .route("/api/instruments/{id}", get(handle_instrument))
        .route("/api/bookings/my-bookings", get(handle_my_bookings))
        .route("/api/availability/instrument/{id}", get(handle_availability))
        .route("/api/items/price/{id}", get(handle_price))
        .layer(middleware::from_fn_with_state(state.clone(), track))
        .with_state(state)
}

fn app_state(config: TestServerConfig, stats: TestServerStats) -> AppState {
    let mut accounts = Accounts::default();
    for (username, password) in &config.seed_users {
        accounts.insert(
            username,
            &format!("{username}@example.com"),
            username,
            password,
        );
    }

    AppState {
        stats,
        config: Arc::new(config),
        accounts: Arc::new(Mutex::new(accounts)),
    }
}

pub fn router(config: TestServerConfig, stats: TestServerStats) -> Router {
    router_with(app_state(config, stats))
}

pub struct TestServer {
    addr: SocketAddr,
    base_url: String,
    stats: TestServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        Self::start_with(TestServerConfig::default()).await
    }

    pub async fn start_with(config: TestServerConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let stats = TestServerStats::default();
        let app = router(config, stats.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        Ok(Self {
            addr,
            base_url: format!("http://{addr}"),
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}
