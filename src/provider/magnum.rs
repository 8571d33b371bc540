//! The magnum backend.
//!
//! Authentication goes through Keystone v3; the cluster service endpoint is
//! read from the token's service catalogue. Credentials are assembled
//! locally: the CA comes from the service, the client key never leaves this
//! machine and only a signing request is sent.

use rcgen::{
    CertificateParams, DistinguishedName, DnType, DnValue, ExtendedKeyUsagePurpose, KeyPair,
};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::http::{self, AUTH_TOKEN_HEADER, endpoint_url};
use super::{Cluster, ClusterStatus, Session};
use crate::bundle::CredentialBundle;
use crate::credentials::PasswordCredentials;
use crate::error::ClusterError;
use crate::shell::Shell;

const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";
const SERVICE_TYPE: &str = "container-infra";
const PUBLIC_INTERFACE: &str = "public";
const SWARM_COES: &[&str] = &["swarm", "swarm-mode"];
const DELETE_IN_PROGRESS: &str = "DELETE_IN_PROGRESS";

/// Client for the magnum container orchestration engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Magnum;

#[derive(Deserialize)]
struct TokenResponse {
    token: TokenBody,
}

#[derive(Deserialize)]
struct TokenBody {
    #[serde(default)]
    catalog: Vec<CatalogEntry>,
}

#[derive(Deserialize)]
struct CatalogEntry {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<CatalogEndpoint>,
}

#[derive(Deserialize)]
struct CatalogEndpoint {
    interface: String,
    url: String,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    region_id: Option<String>,
}

#[derive(Deserialize)]
struct ClusterList {
    clusters: Vec<MagnumCluster>,
}

#[derive(Deserialize)]
struct MagnumCluster {
    name: String,
    uuid: String,
    #[serde(default)]
    node_count: i64,
    #[serde(default)]
    status: String,
    #[serde(default)]
    flavor_id: Option<String>,
    #[serde(default)]
    api_address: Option<String>,
}

impl From<MagnumCluster> for Cluster {
    fn from(record: MagnumCluster) -> Self {
        Self {
            name: record.name,
            flavor: record.flavor_id.unwrap_or_default(),
            nodes: record.node_count,
            autoscale: false,
            status: map_status(&record.status),
        }
    }
}

#[derive(Deserialize)]
struct TemplateList {
    clustertemplates: Vec<ClusterTemplate>,
}

#[derive(Deserialize)]
struct ClusterTemplate {
    uuid: String,
    #[serde(default)]
    coe: String,
}

#[derive(Deserialize)]
struct CertificateRecord {
    pem: String,
}

/// Map a magnum status onto the shared status model.
fn map_status(status: &str) -> ClusterStatus {
    match status {
        "CREATE_IN_PROGRESS" | "UPDATE_IN_PROGRESS" => ClusterStatus::Building,
        other => ClusterStatus::Other(other.to_owned()),
    }
}

/// Keystone v3 base URL for an auth endpoint, appending `/v3` when absent.
fn identity_base(endpoint: &str) -> String {
    let trimmed = endpoint.trim_end_matches('/');
    if trimmed.ends_with("/v3") {
        trimmed.to_owned()
    } else {
        format!("{trimmed}/v3")
    }
}

/// Pick the public container-infra endpoint, honouring `region` when given.
fn select_endpoint(catalog: &[CatalogEntry], region: Option<&str>) -> Result<String, ClusterError> {
    catalog
        .iter()
        .filter(|entry| entry.service_type == SERVICE_TYPE)
        .flat_map(|entry| entry.endpoints.iter())
        .filter(|endpoint| endpoint.interface == PUBLIC_INTERFACE)
        .find(|endpoint| {
            region.is_none_or(|wanted| {
                endpoint.region.as_deref() == Some(wanted)
                    || endpoint.region_id.as_deref() == Some(wanted)
            })
        })
        .map(|endpoint| endpoint.url.trim_end_matches('/').to_owned())
        .ok_or_else(|| {
            ClusterError::backend(format!(
                "no public {SERVICE_TYPE} endpoint in the service catalog{}",
                region.map(|r| format!(" for region {r}")).unwrap_or_default()
            ))
        })
}

fn password_auth_body(creds: &PasswordCredentials) -> Value {
    let mut auth = json!({
        "identity": {
            "methods": ["password"],
            "password": {
                "user": {
                    "name": creds.username,
                    "domain": { "name": creds.domain },
                    "password": creds.password,
                }
            }
        }
    });
    if let (Some(project), Some(object)) = (creds.project.as_deref(), auth.as_object_mut()) {
        object.insert(
            String::from("scope"),
            json!({
                "project": {
                    "name": project,
                    "domain": { "name": creds.domain },
                }
            }),
        );
    }
    json!({ "auth": auth })
}

impl Magnum {
    /// Authenticate with Keystone and locate the cluster service.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::AuthenticationFailed` when Keystone rejects the
    /// credentials and `ClusterError::Backend` when no suitable catalogue
    /// entry exists.
    pub async fn authenticate(
        &self,
        creds: &PasswordCredentials,
    ) -> Result<Session, ClusterError> {
        let client = http::build_client()?;
        let url = endpoint_url(&identity_base(&creds.endpoint), &["auth", "tokens"])?;
        let request = client.post(url).json(&password_auth_body(creds));
        let response = http::send(&client, request, None).await?;

        let token = subject_token(&response)?;
        let body: TokenResponse = http::json(response).await?;
        let endpoint = select_endpoint(&body.token.catalog, creds.region.as_deref())?;
        debug!(username = %creds.username, endpoint = %endpoint, "authenticated against keystone");

        Ok(Session::with_client(
            creds.username.clone(),
            token,
            endpoint,
            client,
        ))
    }

    /// Validate `token` with Keystone and rebuild the session from its
    /// catalogue.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::AuthenticationFailed` when Keystone does not
    /// answer 200.
    pub async fn resume(
        &self,
        creds: &PasswordCredentials,
        token: &str,
    ) -> Result<Session, ClusterError> {
        let client = http::build_client()?;
        let url = endpoint_url(&identity_base(&creds.endpoint), &["auth", "tokens"])?;
        let request = client
            .get(url)
            .header(AUTH_TOKEN_HEADER, token)
            .header(SUBJECT_TOKEN_HEADER, token);
        let response = http::send_unchecked(&client, request).await?;
        if response.status() != StatusCode::OK {
            return Err(ClusterError::AuthenticationFailed {
                message: format!(
                    "cached token rejected with HTTP {}",
                    response.status().as_u16()
                ),
            });
        }

        let body: TokenResponse = http::json(response).await?;
        let endpoint = select_endpoint(&body.token.catalog, creds.region.as_deref())?;
        Ok(Session::with_client(
            creds.username.clone(),
            token.to_owned(),
            endpoint,
            client,
        ))
    }

    pub(super) async fn list(&self, session: &Session) -> Result<Vec<Cluster>, ClusterError> {
        let url = endpoint_url(session.endpoint(), &["v1", "clusters"])?;
        let response = send_authorized(session, session.http().get(url), None).await?;
        let list: ClusterList = http::json(response).await?;
        Ok(list.clusters.into_iter().map(Cluster::from).collect())
    }

    pub(super) async fn get(&self, session: &Session, name: &str) -> Result<Cluster, ClusterError> {
        self.record(session, name).await.map(Cluster::from)
    }

    async fn record(&self, session: &Session, name: &str) -> Result<MagnumCluster, ClusterError> {
        let url = endpoint_url(session.endpoint(), &["v1", "clusters", name])?;
        let response = send_authorized(session, session.http().get(url), Some(name)).await?;
        http::json(response).await
    }

    pub(super) async fn create(
        &self,
        session: &Session,
        name: &str,
        nodes: i64,
    ) -> Result<Cluster, ClusterError> {
        let template = self.swarm_template(session).await?;
        let url = endpoint_url(session.endpoint(), &["v1", "clusters"])?;
        let body = json!({
            "name": name,
            "cluster_template_id": template,
            "node_count": nodes,
        });
        send_authorized(session, session.http().post(url).json(&body), None).await?;
        self.get(session, name).await
    }

    async fn swarm_template(&self, session: &Session) -> Result<String, ClusterError> {
        let url = endpoint_url(session.endpoint(), &["v1", "clustertemplates"])?;
        let response = send_authorized(session, session.http().get(url), None).await?;
        let list: TemplateList = http::json(response).await?;
        list.clustertemplates
            .into_iter()
            .find(|template| SWARM_COES.contains(&template.coe.as_str()))
            .map(|template| template.uuid)
            .ok_or_else(|| ClusterError::backend("no swarm cluster template is available"))
    }

    pub(super) async fn grow(
        &self,
        session: &Session,
        name: &str,
        by: i64,
    ) -> Result<Cluster, ClusterError> {
        let current = self.record(session, name).await?;
        let nodes = grown_node_count(current.node_count, by)?;
        let url = endpoint_url(session.endpoint(), &["v1", "clusters", &current.uuid])?;
        let patch = json!([{
            "op": "replace",
            "path": "/node_count",
            "value": nodes,
        }]);
        send_authorized(session, session.http().patch(url).json(&patch), Some(name)).await?;
        self.get(session, name).await
    }

    pub(super) async fn delete(
        &self,
        session: &Session,
        name: &str,
    ) -> Result<Cluster, ClusterError> {
        let current = self.record(session, name).await?;
        let url = endpoint_url(session.endpoint(), &["v1", "clusters", &current.uuid])?;
        send_authorized(session, session.http().delete(url), Some(name)).await?;

        let mut snapshot = Cluster::from(current);
        snapshot.status = ClusterStatus::Other(String::from(DELETE_IN_PROGRESS));
        Ok(snapshot)
    }

    /// Fetch the CA, have a locally generated key signed and render the
    /// environment scripts.
    pub(super) async fn credentials(
        &self,
        session: &Session,
        name: &str,
    ) -> Result<CredentialBundle, ClusterError> {
        let cluster = self.record(session, name).await?;
        let docker_host = cluster
            .api_address
            .as_deref()
            .filter(|address| !address.is_empty())
            .map(|address| {
                if address.contains("://") {
                    address.to_owned()
                } else {
                    format!("tcp://{address}")
                }
            })
            .ok_or_else(|| {
                ClusterError::backend(format!("cluster {name} has no API address yet"))
            })?;

        let ca_url = endpoint_url(session.endpoint(), &["v1", "certificates", &cluster.uuid])?;
        let ca = send_authorized(session, session.http().get(ca_url), Some(name)).await?;
        let ca: CertificateRecord = http::json(ca).await?;

        let request = ClientCertRequest::generate(session.username())?;
        let sign_url = endpoint_url(session.endpoint(), &["v1", "certificates"])?;
        let body = json!({ "cluster_uuid": cluster.uuid, "csr": request.csr_pem });
        let sign = session.http().post(sign_url).json(&body);
        let signed = send_authorized(session, sign, None).await?;
        let signed: CertificateRecord = http::json(signed).await?;

        let mut bundle = CredentialBundle {
            ca: ca.pem.into_bytes(),
            ca_key: Vec::new(),
            cert: signed.pem.into_bytes(),
            key: request.key_pem.into_bytes(),
            docker_env: Shell::Bash.env_script(&docker_host).into_bytes(),
            ..CredentialBundle::default()
        };
        for shell in [Shell::Fish, Shell::Powershell, Shell::Cmd] {
            bundle.extra.insert(
                shell.script_name().to_owned(),
                shell.env_script(&docker_host).into_bytes(),
            );
        }
        Ok(bundle)
    }
}

fn subject_token(response: &Response) -> Result<String, ClusterError> {
    response
        .headers()
        .get(SUBJECT_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
        .ok_or_else(|| {
            ClusterError::backend(format!("keystone response has no {SUBJECT_TOKEN_HEADER} header"))
        })
}

async fn send_authorized(
    session: &Session,
    request: reqwest::RequestBuilder,
    cluster: Option<&str>,
) -> Result<Response, ClusterError> {
    let client: &Client = session.http();
    http::send(
        client,
        request
            .header(AUTH_TOKEN_HEADER, session.token())
            .header("OpenStack-API-Version", "container-infra latest"),
        cluster,
    )
    .await
}

/// A client key generated locally and the signing request for it.
struct ClientCertRequest {
    key_pem: String,
    csr_pem: String,
}

impl ClientCertRequest {
    fn generate(common_name: &str) -> Result<Self, ClusterError> {
        let key_pair = KeyPair::generate()
            .map_err(|e| ClusterError::backend(format!("failed to generate client key: {e}")))?;

        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(
            DnType::CommonName,
            DnValue::Utf8String(common_name.to_owned()),
        );
        params.distinguished_name = dn;
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];

        let csr = params
            .serialize_request(&key_pair)
            .map_err(|e| ClusterError::backend(format!("failed to create CSR: {e}")))?;
        let csr_pem = csr
            .pem()
            .map_err(|e| ClusterError::backend(format!("failed to serialise CSR: {e}")))?;

        Ok(Self {
            key_pem: key_pair.serialize_pem(),
            csr_pem,
        })
    }
}

fn grown_node_count(current: i64, by: i64) -> Result<i64, ClusterError> {
    current
        .checked_add(by)
        .ok_or_else(|| ClusterError::InvalidArgument {
            message: format!("growing {current} nodes by {by} overflows the node count"),
        })
}
