//! The make-swarm backend.
//!
//! Tokens come from the identity service in exchange for an API key. Every
//! cluster route is scoped to the username, e.g. `/clusters/{user}/{name}`.

use reqwest::StatusCode;
use serde::{Deserialize, Deserializer};
use serde_json::json;
use tracing::debug;

use super::http::{self, AUTH_TOKEN_HEADER, endpoint_url};
use super::{Cluster, ClusterStatus, Quotas, Session};
use crate::bundle::CredentialBundle;
use crate::credentials::ApiKeyCredentials;
use crate::error::ClusterError;

/// Client for the make-swarm cluster service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MakeSwarm {
    identity_endpoint: String,
}

#[derive(Deserialize)]
struct IdentityResponse {
    access: IdentityAccess,
}

#[derive(Deserialize)]
struct IdentityAccess {
    token: IdentityToken,
}

#[derive(Deserialize)]
struct IdentityToken {
    id: String,
}

#[derive(Deserialize)]
struct ClusterRecord {
    cluster_name: String,
    #[serde(default)]
    flavor: String,
    #[serde(default, deserialize_with = "number_or_string")]
    nodes: i64,
    #[serde(default)]
    autoscale: bool,
    #[serde(default)]
    status: String,
}

impl From<ClusterRecord> for Cluster {
    fn from(record: ClusterRecord) -> Self {
        Self {
            name: record.cluster_name,
            flavor: record.flavor,
            nodes: record.nodes,
            autoscale: record.autoscale,
            status: ClusterStatus::from_wire(&record.status),
        }
    }
}

#[derive(Deserialize)]
struct QuotasRecord {
    #[serde(deserialize_with = "number_or_string")]
    max_clusters: i64,
    #[serde(deserialize_with = "number_or_string")]
    max_nodes_per_cluster: i64,
}

/// Counts arrive either as JSON numbers or as numeric strings.
fn number_or_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Count {
        Number(i64),
        Text(String),
    }

    match Count::deserialize(deserializer)? {
        Count::Number(n) => Ok(n),
        Count::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

impl MakeSwarm {
    /// Create a client that authenticates against `identity_endpoint`.
    #[must_use]
    pub fn new(identity_endpoint: impl Into<String>) -> Self {
        Self {
            identity_endpoint: identity_endpoint.into(),
        }
    }

    /// Exchange the API key for a token.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::AuthenticationFailed` when the identity service
    /// rejects the credentials.
    pub async fn authenticate(&self, creds: &ApiKeyCredentials) -> Result<Session, ClusterError> {
        let client = http::build_client()?;
        let url = endpoint_url(&self.identity_endpoint, &["tokens"])?;
        let body = json!({
            "auth": {
                "RAX-KSKEY:apiKeyCredentials": {
                    "username": creds.username,
                    "apiKey": creds.api_key,
                }
            }
        });

        let response = http::send(&client, client.post(url).json(&body), None).await?;
        let identity: IdentityResponse = http::json(response).await?;
        debug!(username = %creds.username, "authenticated against the identity service");

        Ok(Session::with_client(
            creds.username.clone(),
            identity.access.token.id,
            creds.endpoint.clone(),
            client,
        ))
    }

    /// Reuse `token` if a `HEAD` on the user's cluster collection succeeds.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::AuthenticationFailed` when the probe does not
    /// answer 200.
    pub async fn resume(
        &self,
        creds: &ApiKeyCredentials,
        token: &str,
    ) -> Result<Session, ClusterError> {
        let session = Session::new(&*creds.username, token, &*creds.endpoint)?;
        let url = endpoint_url(session.endpoint(), &["clusters", session.username()])?;
        let request = session
            .http()
            .head(url)
            .header(AUTH_TOKEN_HEADER, session.token());
        let response = http::send_unchecked(session.http(), request).await?;

        if response.status() == StatusCode::OK {
            Ok(session)
        } else {
            Err(ClusterError::AuthenticationFailed {
                message: format!(
                    "cached token rejected with HTTP {}",
                    response.status().as_u16()
                ),
            })
        }
    }

    /// List the user's clusters.
    pub(super) async fn list(&self, session: &Session) -> Result<Vec<Cluster>, ClusterError> {
        let url = endpoint_url(session.endpoint(), &["clusters", session.username()])?;
        let response =
            http::send(session.http(), authorized(session, session.http().get(url)), None).await?;
        let records: Vec<ClusterRecord> = http::json(response).await?;
        Ok(records.into_iter().map(Cluster::from).collect())
    }

    /// Fetch a cluster; a `null` body yields `None`.
    pub(super) async fn get(
        &self,
        session: &Session,
        name: &str,
    ) -> Result<Option<Cluster>, ClusterError> {
        let url = endpoint_url(session.endpoint(), &["clusters", session.username(), name])?;
        let response = http::send(
            session.http(),
            authorized(session, session.http().get(url)),
            Some(name),
        )
        .await?;
        let record: Option<ClusterRecord> = http::json(response).await?;
        Ok(record.map(Cluster::from))
    }

    pub(super) async fn create(
        &self,
        session: &Session,
        name: &str,
        nodes: i64,
        autoscale: bool,
    ) -> Result<Cluster, ClusterError> {
        let url = endpoint_url(session.endpoint(), &["clusters", session.username()])?;
        let body = json!({
            "cluster_name": name,
            "nodes": nodes,
            "autoscale": autoscale,
        });
        let request = authorized(session, session.http().post(url).json(&body));
        cluster_response(session, request, name).await
    }

    pub(super) async fn grow(
        &self,
        session: &Session,
        name: &str,
        by: i64,
    ) -> Result<Cluster, ClusterError> {
        let url = endpoint_url(
            session.endpoint(),
            &["clusters", session.username(), name, "grow"],
        )?;
        let request = authorized(session, session.http().post(url).json(&json!({ "nodes": by })));
        cluster_response(session, request, name).await
    }

    pub(super) async fn set_autoscale(
        &self,
        session: &Session,
        name: &str,
        enabled: bool,
    ) -> Result<Cluster, ClusterError> {
        let flag = if enabled { "true" } else { "false" };
        let url = endpoint_url(
            session.endpoint(),
            &["clusters", session.username(), name, "autoscale", flag],
        )?;
        let request = authorized(session, session.http().put(url));
        cluster_response(session, request, name).await
    }

    pub(super) async fn rebuild(
        &self,
        session: &Session,
        name: &str,
    ) -> Result<Cluster, ClusterError> {
        let url = endpoint_url(
            session.endpoint(),
            &["clusters", session.username(), name, "rebuild"],
        )?;
        let request = authorized(session, session.http().post(url));
        cluster_response(session, request, name).await
    }

    pub(super) async fn delete(
        &self,
        session: &Session,
        name: &str,
    ) -> Result<Cluster, ClusterError> {
        let url = endpoint_url(session.endpoint(), &["clusters", session.username(), name])?;
        let request = authorized(session, session.http().delete(url));
        cluster_response(session, request, name).await
    }

    pub(super) async fn quotas(&self, session: &Session) -> Result<Quotas, ClusterError> {
        let url = endpoint_url(session.endpoint(), &["quotas", session.username()])?;
        let response =
            http::send(session.http(), authorized(session, session.http().get(url)), None).await?;
        let record: QuotasRecord = http::json(response).await?;
        Ok(Quotas {
            max_clusters: record.max_clusters,
            max_nodes_per_cluster: record.max_nodes_per_cluster,
        })
    }

    /// Download the cluster's credential archive.
    pub(super) async fn credentials(
        &self,
        session: &Session,
        name: &str,
    ) -> Result<CredentialBundle, ClusterError> {
        let url = endpoint_url(
            session.endpoint(),
            &["clusters", session.username(), name, "credentials"],
        )?;
        let request = authorized(session, session.http().get(url))
            .header(reqwest::header::ACCEPT, "application/x-tar");
        let response = http::send(session.http(), request, Some(name)).await?;
        let archive = response.bytes().await?;
        CredentialBundle::from_tar(&archive)
    }
}

fn authorized(session: &Session, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    request.header(AUTH_TOKEN_HEADER, session.token())
}

/// Send a request whose body is a single cluster record.
async fn cluster_response(
    session: &Session,
    request: reqwest::RequestBuilder,
    name: &str,
) -> Result<Cluster, ClusterError> {
    let response = http::send(session.http(), request, Some(name)).await?;
    let record: Option<ClusterRecord> = http::json(response).await?;
    record.map(Cluster::from).ok_or_else(|| ClusterError::NotFound {
        name: name.to_owned(),
    })
}
