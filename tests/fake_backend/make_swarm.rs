//! An in-process make-swarm service and identity endpoint.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::Served;

/// API key the identity endpoint accepts.
pub const API_KEY: &str = "k3y";

/// A cluster as the service stores it.
#[derive(Debug, Clone, Serialize)]
pub struct Record {
    pub cluster_name: String,
    pub flavor: String,
    pub nodes: i64,
    pub autoscale: bool,
    pub status: String,
}

impl Record {
    pub fn active(name: &str, nodes: i64) -> Self {
        Self {
            cluster_name: name.to_owned(),
            flavor: String::from("container1-4G"),
            nodes,
            autoscale: false,
            status: String::from("active"),
        }
    }
}

/// Mutable state behind the fake.
#[derive(Debug, Default)]
pub struct SwarmState {
    pub clusters: BTreeMap<String, Record>,
    pub valid_tokens: Vec<String>,
    pub tokens_issued: usize,
    pub credentials: Option<Vec<u8>>,
    pub credential_downloads: usize,
}

type Shared = Arc<Mutex<SwarmState>>;

/// The running fake.
pub struct FakeMakeSwarm {
    pub base_url: String,
    state: Shared,
    _served: Served,
}

impl FakeMakeSwarm {
    pub async fn start() -> Self {
        let state = Shared::default();
        let router = Router::new()
            .route("/identity/tokens", post(issue_token))
            .route("/clusters/{user}", get(list).post(create))
            .route("/clusters/{user}/{name}", get(fetch).delete(remove))
            .route("/clusters/{user}/{name}/grow", post(grow))
            .route("/clusters/{user}/{name}/autoscale/{flag}", put(autoscale))
            .route("/clusters/{user}/{name}/rebuild", post(rebuild))
            .route("/clusters/{user}/{name}/credentials", get(credentials))
            .route("/quotas/{user}", get(quotas))
            .with_state(Arc::clone(&state));
        let served = Served::spawn(router).await;
        Self {
            base_url: served.base_url(),
            state,
            _served: served,
        }
    }

    pub fn identity_url(&self) -> String {
        format!("{}/identity", self.base_url)
    }

    pub fn state(&self) -> MutexGuard<'_, SwarmState> {
        self.state.lock().expect("fake state should lock")
    }
}

fn lock(state: &Shared) -> MutexGuard<'_, SwarmState> {
    state.lock().expect("fake state should lock")
}

fn authorized(state: &Shared, headers: &HeaderMap) -> Result<(), StatusCode> {
    let token = headers
        .get("X-Auth-Token")
        .and_then(|value| value.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;
    if lock(state).valid_tokens.iter().any(|valid| valid == token) {
        Ok(())
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

async fn issue_token(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let credentials = &body["auth"]["RAX-KSKEY:apiKeyCredentials"];
    if credentials["apiKey"] != API_KEY {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let mut guard = lock(&state);
    guard.tokens_issued += 1;
    let token = format!("token-{}", guard.tokens_issued);
    guard.valid_tokens.push(token.clone());
    Json(json!({ "access": { "token": { "id": token } } })).into_response()
}

async fn list(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(_user): Path<String>,
) -> Result<Json<Vec<Record>>, StatusCode> {
    authorized(&state, &headers)?;
    Ok(Json(lock(&state).clusters.values().cloned().collect()))
}

#[derive(Deserialize)]
struct CreateBody {
    cluster_name: String,
    nodes: i64,
    autoscale: bool,
}

async fn create(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(_user): Path<String>,
    Json(body): Json<CreateBody>,
) -> Result<Json<Record>, StatusCode> {
    authorized(&state, &headers)?;
    let record = Record {
        cluster_name: body.cluster_name.clone(),
        flavor: String::from("container1-4G"),
        nodes: body.nodes,
        autoscale: body.autoscale,
        status: String::from("new"),
    };
    lock(&state)
        .clusters
        .insert(body.cluster_name, record.clone());
    Ok(Json(record))
}

/// Each fetch moves a settling cluster one step towards `active`.
async fn fetch(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((_user, name)): Path<(String, String)>,
) -> Result<Json<Record>, StatusCode> {
    authorized(&state, &headers)?;
    let mut guard = lock(&state);
    let record = guard.clusters.get_mut(&name).ok_or(StatusCode::NOT_FOUND)?;
    let snapshot = record.clone();
    record.status = match record.status.as_str() {
        "new" => String::from("building"),
        "building" | "rebuilding-swarm" => String::from("active"),
        other => other.to_owned(),
    };
    Ok(Json(snapshot))
}

fn update(
    state: &Shared,
    headers: &HeaderMap,
    name: &str,
    change: impl FnOnce(&mut Record),
) -> Result<Json<Record>, StatusCode> {
    authorized(state, headers)?;
    let mut guard = lock(state);
    let record = guard.clusters.get_mut(name).ok_or(StatusCode::NOT_FOUND)?;
    change(record);
    Ok(Json(record.clone()))
}

#[derive(Deserialize)]
struct GrowBody {
    nodes: i64,
}

async fn grow(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((_user, name)): Path<(String, String)>,
    Json(body): Json<GrowBody>,
) -> Result<Json<Record>, StatusCode> {
    update(&state, &headers, &name, |record| record.nodes += body.nodes)
}

async fn autoscale(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((_user, name, flag)): Path<(String, String, String)>,
) -> Result<Json<Record>, StatusCode> {
    update(&state, &headers, &name, |record| record.autoscale = flag == "true")
}

async fn rebuild(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((_user, name)): Path<(String, String)>,
) -> Result<Json<Record>, StatusCode> {
    update(&state, &headers, &name, |record| {
        record.status = String::from("rebuilding-swarm");
    })
}

async fn remove(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((_user, name)): Path<(String, String)>,
) -> Result<Json<Record>, StatusCode> {
    authorized(&state, &headers)?;
    let mut record = lock(&state)
        .clusters
        .remove(&name)
        .ok_or(StatusCode::NOT_FOUND)?;
    record.status = String::from("deleting");
    Ok(Json(record))
}

async fn credentials(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((_user, name)): Path<(String, String)>,
) -> Result<Response, StatusCode> {
    authorized(&state, &headers)?;
    let mut guard = lock(&state);
    if !guard.clusters.contains_key(&name) {
        return Err(StatusCode::NOT_FOUND);
    }
    guard.credential_downloads += 1;
    let archive = guard.credentials.clone().ok_or(StatusCode::CONFLICT)?;
    Ok(([(header::CONTENT_TYPE, "application/x-tar")], Bytes::from(archive)).into_response())
}

async fn quotas(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(_user): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    authorized(&state, &headers)?;
    Ok(Json(json!({ "max_clusters": 3, "max_nodes_per_cluster": "10" })))
}
