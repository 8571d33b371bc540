//! An in-process Keystone v3 identity service and magnum cluster API.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::Served;
use super::tls::TlsMaterial;

/// Password Keystone accepts.
pub const PASSWORD: &str = "hunter2";

/// Template uuid the fake expects swarm clusters to be created from.
pub const SWARM_TEMPLATE: &str = "tmpl-swarm";

/// A cluster as magnum reports it.
#[derive(Debug, Clone, Serialize)]
pub struct MagnumRecord {
    pub name: String,
    pub uuid: String,
    pub node_count: i64,
    pub status: String,
    pub flavor_id: String,
    pub api_address: Option<String>,
    #[serde(skip)]
    pub cluster_template_id: String,
}

/// Mutable state behind the fake.
#[derive(Default)]
pub struct MagnumState {
    pub clusters: BTreeMap<String, MagnumRecord>,
    pub valid_tokens: Vec<String>,
    pub tokens_issued: usize,
    pub signed_requests: usize,
    /// `api_address` given to clusters created from now on.
    pub api_address: Option<String>,
}

struct Inner {
    state: Arc<Mutex<MagnumState>>,
    tls: Arc<TlsMaterial>,
    service_url: String,
}

type Shared = Arc<Inner>;

/// The running fake.
pub struct FakeMagnum {
    pub base_url: String,
    state: Arc<Mutex<MagnumState>>,
    _served: Served,
}

impl FakeMagnum {
    /// Start the fake; certificates are signed with `tls`'s CA.
    pub async fn start(tls: TlsMaterial) -> Self {
        let state = Arc::new(Mutex::new(MagnumState::default()));
        let tls = Arc::new(tls);
        let handle = Arc::clone(&state);
        let served = Served::spawn_with(|base_url| {
            let inner = Arc::new(Inner {
                state: handle,
                tls,
                service_url: format!("{base_url}/magnum"),
            });
            Router::new()
                .route("/v3/auth/tokens", post(issue_token).get(validate_token))
                .route("/magnum/v1/clusters", get(list).post(create))
                .route(
                    "/magnum/v1/clusters/{ident}",
                    get(fetch).patch(patch).delete(remove),
                )
                .route("/magnum/v1/clustertemplates", get(templates))
                .route("/magnum/v1/certificates", post(sign))
                .route("/magnum/v1/certificates/{uuid}", get(ca))
                .with_state(inner)
        })
        .await;
        Self {
            base_url: served.base_url(),
            state,
            _served: served,
        }
    }

    pub fn identity_url(&self) -> String {
        self.base_url.clone()
    }

    pub fn state(&self) -> MutexGuard<'_, MagnumState> {
        self.state.lock().expect("fake state should lock")
    }
}

fn lock(inner: &Shared) -> MutexGuard<'_, MagnumState> {
    inner.state.lock().expect("fake state should lock")
}

fn authorized(inner: &Shared, headers: &HeaderMap) -> Result<(), StatusCode> {
    let token = headers
        .get("X-Auth-Token")
        .and_then(|value| value.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;
    if lock(inner).valid_tokens.iter().any(|valid| valid == token) {
        Ok(())
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

fn catalog(inner: &Shared) -> Value {
    json!({
        "token": {
            "catalog": [
                { "type": "identity", "endpoints": [
                    { "interface": "public", "url": "http://unused/v3" }
                ]},
                { "type": "container-infra", "endpoints": [
                    { "interface": "internal", "url": "http://internal.invalid:9511" },
                    { "interface": "public", "url": inner.service_url }
                ]}
            ]
        }
    })
}

async fn issue_token(State(inner): State<Shared>, Json(body): Json<Value>) -> Response {
    if body.pointer("/auth/identity/password/user/password") != Some(&json!(PASSWORD)) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let token = {
        let mut guard = lock(&inner);
        guard.tokens_issued += 1;
        let token = format!("ks-{}", guard.tokens_issued);
        guard.valid_tokens.push(token.clone());
        token
    };
    (
        StatusCode::CREATED,
        [("X-Subject-Token", token)],
        Json(catalog(&inner)),
    )
        .into_response()
}

async fn validate_token(State(inner): State<Shared>, headers: HeaderMap) -> Response {
    let subject = headers
        .get("X-Subject-Token")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if lock(&inner).valid_tokens.iter().any(|valid| valid == subject) {
        Json(catalog(&inner)).into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

async fn list(State(inner): State<Shared>, headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    authorized(&inner, &headers)?;
    let clusters: Vec<MagnumRecord> = lock(&inner).clusters.values().cloned().collect();
    Ok(Json(json!({ "clusters": clusters })))
}

#[derive(Deserialize)]
struct CreateBody {
    name: String,
    cluster_template_id: String,
    node_count: i64,
}

async fn create(
    State(inner): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<CreateBody>,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    authorized(&inner, &headers)?;
    let mut guard = lock(&inner);
    let uuid = format!("uuid-{}", guard.clusters.len() + 1);
    let record = MagnumRecord {
        name: body.name.clone(),
        uuid: uuid.clone(),
        node_count: body.node_count,
        status: String::from("CREATE_IN_PROGRESS"),
        flavor_id: String::from("m1.small"),
        api_address: guard.api_address.clone(),
        cluster_template_id: body.cluster_template_id,
    };
    guard.clusters.insert(body.name, record);
    Ok((StatusCode::ACCEPTED, Json(json!({ "uuid": uuid }))))
}

fn find<'a>(state: &'a mut MagnumState, ident: &str) -> Option<&'a mut MagnumRecord> {
    state
        .clusters
        .values_mut()
        .find(|record| record.name == ident || record.uuid == ident)
}

/// Each fetch completes a cluster that is still in progress.
async fn fetch(
    State(inner): State<Shared>,
    headers: HeaderMap,
    Path(ident): Path<String>,
) -> Result<Json<MagnumRecord>, StatusCode> {
    authorized(&inner, &headers)?;
    let mut guard = lock(&inner);
    let record = find(&mut guard, &ident).ok_or(StatusCode::NOT_FOUND)?;
    let snapshot = record.clone();
    record.status = match record.status.as_str() {
        "CREATE_IN_PROGRESS" => String::from("CREATE_COMPLETE"),
        "UPDATE_IN_PROGRESS" => String::from("UPDATE_COMPLETE"),
        other => other.to_owned(),
    };
    Ok(Json(snapshot))
}

async fn patch(
    State(inner): State<Shared>,
    headers: HeaderMap,
    Path(ident): Path<String>,
    Json(ops): Json<Vec<Value>>,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    authorized(&inner, &headers)?;
    let mut guard = lock(&inner);
    let record = find(&mut guard, &ident).ok_or(StatusCode::NOT_FOUND)?;
    for op in ops {
        if op["path"] == "/node_count" {
            record.node_count = op["value"].as_i64().ok_or(StatusCode::BAD_REQUEST)?;
            record.status = String::from("UPDATE_IN_PROGRESS");
        }
    }
    Ok((StatusCode::ACCEPTED, Json(json!({ "uuid": record.uuid }))))
}

async fn remove(
    State(inner): State<Shared>,
    headers: HeaderMap,
    Path(ident): Path<String>,
) -> Result<StatusCode, StatusCode> {
    authorized(&inner, &headers)?;
    let mut guard = lock(&inner);
    let name = find(&mut guard, &ident)
        .map(|record| record.name.clone())
        .ok_or(StatusCode::NOT_FOUND)?;
    guard.clusters.remove(&name);
    Ok(StatusCode::NO_CONTENT)
}

async fn templates(
    State(inner): State<Shared>,
    headers: HeaderMap,
) -> Result<Json<Value>, StatusCode> {
    authorized(&inner, &headers)?;
    Ok(Json(json!({
        "clustertemplates": [
            { "uuid": "tmpl-k8s", "coe": "kubernetes" },
            { "uuid": SWARM_TEMPLATE, "coe": "swarm-mode" }
        ]
    })))
}

async fn ca(
    State(inner): State<Shared>,
    headers: HeaderMap,
    Path(uuid): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    authorized(&inner, &headers)?;
    if find(&mut lock(&inner), &uuid).is_none() {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(json!({ "cluster_uuid": uuid, "pem": inner.tls.ca_pem })))
}

#[derive(Deserialize)]
struct SignBody {
    cluster_uuid: String,
    csr: String,
}

async fn sign(
    State(inner): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<SignBody>,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    authorized(&inner, &headers)?;
    {
        let mut guard = lock(&inner);
        if find(&mut guard, &body.cluster_uuid).is_none() {
            return Err(StatusCode::NOT_FOUND);
        }
        guard.signed_requests += 1;
    }
    let pem = inner.tls.sign_csr(&body.csr);
    Ok((
        StatusCode::CREATED,
        Json(json!({ "cluster_uuid": body.cluster_uuid, "pem": pem })),
    ))
}
