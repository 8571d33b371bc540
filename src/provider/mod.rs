//! Backend adapters for cluster lifecycle operations.
//!
//! Two backends are supported and modelled as a closed [`Provider`] enum:
//! the legacy make-swarm service and the magnum container orchestration
//! engine. A [`ClusterClient`] pairs a provider with an authenticated
//! [`Session`] and exposes the operations common to both.
//!
//! Operations return exactly one snapshot and never retry; errors are passed
//! through to the caller unchanged.

pub(crate) mod http;
mod magnum;
mod make_swarm;

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use reqwest::Client;

pub use http::REQUEST_TIMEOUT;
pub use magnum::Magnum;
pub use make_swarm::MakeSwarm;

use crate::bundle::CredentialBundle;
use crate::config::MakeSwarmConfig;
use crate::credentials::Account;
use crate::error::ClusterError;

/// Status of a cluster as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterStatus {
    /// Accepted but not yet building.
    New,
    /// Nodes are being provisioned.
    Building,
    /// The swarm is being rebuilt.
    RebuildingSwarm,
    /// Any other value, including active, failed and unknown states.
    Other(String),
}

impl ClusterStatus {
    /// Parse a make-swarm status string.
    #[must_use]
    pub fn from_wire(status: &str) -> Self {
        match status {
            "new" => Self::New,
            "building" => Self::Building,
            "rebuilding-swarm" => Self::RebuildingSwarm,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Whether the cluster is still settling after an operation.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::New | Self::Building | Self::RebuildingSwarm)
    }
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::New => "new",
            Self::Building => "building",
            Self::RebuildingSwarm => "rebuilding-swarm",
            Self::Other(status) => status,
        })
    }
}

/// A read-only snapshot of a cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    /// Cluster name, unique per account.
    pub name: String,
    /// Flavor or type tag.
    pub flavor: String,
    /// Number of nodes.
    pub nodes: i64,
    /// Whether autoscaling is enabled.
    pub autoscale: bool,
    /// Status at the time of the fetch.
    pub status: ClusterStatus,
}

/// Account limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quotas {
    /// Maximum number of clusters.
    pub max_clusters: i64,
    /// Maximum number of nodes in a single cluster.
    pub max_nodes_per_cluster: i64,
}

/// An authenticated handle: the token, the service endpoint and a transport.
#[derive(Debug, Clone)]
pub struct Session {
    username: String,
    token: String,
    endpoint: String,
    http: Client,
}

impl Session {
    /// Create a session with a fresh transport.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::Backend` if the HTTP client cannot be built.
    pub fn new(
        username: impl Into<String>,
        token: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Result<Self, ClusterError> {
        Ok(Self::with_client(
            username.into(),
            token.into(),
            endpoint.into(),
            http::build_client()?,
        ))
    }

    pub(crate) const fn with_client(
        username: String,
        token: String,
        endpoint: String,
        http: Client,
    ) -> Self {
        Self {
            username,
            token,
            endpoint,
            http,
        }
    }

    /// The authenticated username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The API token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The cluster service endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub(crate) const fn http(&self) -> &Client {
        &self.http
    }

    /// Replace the transport with a newly built client.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::Backend` if the HTTP client cannot be built.
    pub fn renew_transport(&mut self) -> Result<(), ClusterError> {
        self.http = http::build_client()?;
        Ok(())
    }
}

/// Boxed future returned by [`Authenticator`] methods.
pub type SessionFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Session, ClusterError>> + Send + 'a>>;

/// Obtains sessions for an account.
///
/// Split out so the token cache can be exercised without a backend.
pub trait Authenticator {
    /// Authenticate from scratch with the account's secret.
    fn authenticate<'a>(&'a self, account: &'a Account) -> SessionFuture<'a>;

    /// Validate `token` with a lightweight authenticated request and build
    /// a session from it.
    fn resume<'a>(&'a self, account: &'a Account, token: &'a str) -> SessionFuture<'a>;
}

/// The backend selected for an account.
#[derive(Debug, Clone)]
pub enum Provider {
    /// The make-swarm service.
    MakeSwarm(MakeSwarm),
    /// The magnum service.
    Magnum(Magnum),
}

impl Provider {
    /// Select the provider matching the account's backend.
    #[must_use]
    pub fn for_account(account: &Account, config: &MakeSwarmConfig) -> Self {
        match account {
            Account::MakeSwarm(_) => Self::MakeSwarm(MakeSwarm::new(&config.identity_endpoint)),
            Account::Magnum(_) => Self::Magnum(Magnum),
        }
    }

    /// Backend name used in messages.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::MakeSwarm(_) => "make-swarm",
            Self::Magnum(_) => "magnum",
        }
    }

    const fn unsupported(&self, operation: &'static str) -> ClusterError {
        ClusterError::Unsupported {
            operation,
            backend: self.name(),
        }
    }

    fn mismatch(&self, account: &Account) -> ClusterError {
        ClusterError::InvalidArgument {
            message: format!(
                "a {} account cannot be used with the {} backend",
                account.cloud(),
                self.name()
            ),
        }
    }
}

impl Authenticator for Provider {
    fn authenticate<'a>(&'a self, account: &'a Account) -> SessionFuture<'a> {
        Box::pin(async move {
            match (self, account) {
                (Self::MakeSwarm(backend), Account::MakeSwarm(creds)) => {
                    backend.authenticate(creds).await
                }
                (Self::Magnum(backend), Account::Magnum(creds)) => {
                    backend.authenticate(creds).await
                }
                _ => Err(self.mismatch(account)),
            }
        })
    }

    fn resume<'a>(&'a self, account: &'a Account, token: &'a str) -> SessionFuture<'a> {
        Box::pin(async move {
            match (self, account) {
                (Self::MakeSwarm(backend), Account::MakeSwarm(creds)) => {
                    backend.resume(creds, token).await
                }
                (Self::Magnum(backend), Account::Magnum(creds)) => {
                    backend.resume(creds, token).await
                }
                _ => Err(self.mismatch(account)),
            }
        })
    }
}

/// Boxed future returned by operations producing a cluster snapshot.
pub type ClusterFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Cluster, ClusterError>> + Send + 'a>>;

/// Boxed future returned by [`ClusterService::poll`].
pub type PollFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Option<Cluster>, ClusterError>> + Send + 'a>>;

/// Operations the lifecycle orchestrator drives.
///
/// This abstraction keeps the polling state machine testable without a
/// live backend.
pub trait ClusterService {
    /// Request a new cluster.
    fn create(&self, name: &str, nodes: i64, autoscale: bool) -> ClusterFuture<'_>;

    /// Request a rebuild of an existing cluster.
    fn rebuild(&self, name: &str) -> ClusterFuture<'_>;

    /// Fetch a cluster, returning `None` when the backend answers with no
    /// object and no error.
    fn poll(&self, name: &str) -> PollFuture<'_>;

    /// Replace the transport before the next request.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::Backend` if a new client cannot be built.
    fn renew_transport(&mut self) -> Result<(), ClusterError>;
}

/// A provider bound to an authenticated session.
#[derive(Debug, Clone)]
pub struct ClusterClient {
    provider: Provider,
    session: Session,
}

impl ClusterClient {
    /// Bind `provider` to `session`.
    #[must_use]
    pub const fn new(provider: Provider, session: Session) -> Self {
        Self { provider, session }
    }

    /// The session in use.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// List every cluster visible to the account.
    ///
    /// # Errors
    ///
    /// Propagates backend failures unchanged.
    pub async fn list(&self) -> Result<Vec<Cluster>, ClusterError> {
        match &self.provider {
            Provider::MakeSwarm(backend) => backend.list(&self.session).await,
            Provider::Magnum(backend) => backend.list(&self.session).await,
        }
    }

    /// Fetch a cluster by name.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::NotFound` when no such cluster exists.
    pub async fn get(&self, name: &str) -> Result<Cluster, ClusterError> {
        self.fetch(name).await?.ok_or_else(|| ClusterError::NotFound {
            name: name.to_owned(),
        })
    }

    async fn fetch(&self, name: &str) -> Result<Option<Cluster>, ClusterError> {
        match &self.provider {
            Provider::MakeSwarm(backend) => backend.get(&self.session, name).await,
            Provider::Magnum(backend) => backend.get(&self.session, name).await.map(Some),
        }
    }

    /// Create a cluster with `nodes` nodes.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::InvalidArgument` when `nodes < 1`, and
    /// `ClusterError::Unsupported` when autoscale is requested from magnum;
    /// both before any request is sent.
    pub async fn create(
        &self,
        name: &str,
        nodes: i64,
        autoscale: bool,
    ) -> Result<Cluster, ClusterError> {
        if nodes < 1 {
            return Err(ClusterError::InvalidArgument {
                message: String::from("nodes must be >= 1"),
            });
        }
        match &self.provider {
            Provider::MakeSwarm(backend) => {
                backend.create(&self.session, name, nodes, autoscale).await
            }
            Provider::Magnum(_) if autoscale => Err(self.provider.unsupported("autoscale")),
            Provider::Magnum(backend) => backend.create(&self.session, name, nodes).await,
        }
    }

    /// Add `by` nodes to a cluster.
    ///
    /// # Errors
    ///
    /// Propagates backend failures unchanged.
    pub async fn grow(&self, name: &str, by: i64) -> Result<Cluster, ClusterError> {
        match &self.provider {
            Provider::MakeSwarm(backend) => backend.grow(&self.session, name, by).await,
            Provider::Magnum(backend) => backend.grow(&self.session, name, by).await,
        }
    }

    /// Turn autoscaling on or off.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::Unsupported` on magnum.
    pub async fn set_autoscale(&self, name: &str, enabled: bool) -> Result<Cluster, ClusterError> {
        match &self.provider {
            Provider::MakeSwarm(backend) => {
                backend.set_autoscale(&self.session, name, enabled).await
            }
            Provider::Magnum(_) => Err(self.provider.unsupported("autoscale")),
        }
    }

    /// Rebuild the cluster's swarm.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::Unsupported` on magnum.
    pub async fn rebuild(&self, name: &str) -> Result<Cluster, ClusterError> {
        match &self.provider {
            Provider::MakeSwarm(backend) => backend.rebuild(&self.session, name).await,
            Provider::Magnum(_) => Err(self.provider.unsupported("rebuild")),
        }
    }

    /// Delete a cluster, returning its last snapshot.
    ///
    /// # Errors
    ///
    /// Propagates backend failures unchanged.
    pub async fn delete(&self, name: &str) -> Result<Cluster, ClusterError> {
        match &self.provider {
            Provider::MakeSwarm(backend) => backend.delete(&self.session, name).await,
            Provider::Magnum(backend) => backend.delete(&self.session, name).await,
        }
    }

    /// Fetch the account's quotas.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::Unsupported` on magnum.
    pub async fn quotas(&self) -> Result<Quotas, ClusterError> {
        match &self.provider {
            Provider::MakeSwarm(backend) => backend.quotas(&self.session).await,
            Provider::Magnum(_) => Err(self.provider.unsupported("quotas")),
        }
    }

    /// Download the TLS credentials for a cluster's Docker endpoint.
    ///
    /// # Errors
    ///
    /// Propagates backend failures and malformed credential payloads.
    pub async fn download_credentials(&self, name: &str) -> Result<CredentialBundle, ClusterError> {
        match &self.provider {
            Provider::MakeSwarm(backend) => backend.credentials(&self.session, name).await,
            Provider::Magnum(backend) => backend.credentials(&self.session, name).await,
        }
    }
}

impl ClusterService for ClusterClient {
    fn create(&self, name: &str, nodes: i64, autoscale: bool) -> ClusterFuture<'_> {
        let name = name.to_owned();
        Box::pin(async move { Self::create(self, &name, nodes, autoscale).await })
    }

    fn rebuild(&self, name: &str) -> ClusterFuture<'_> {
        let name = name.to_owned();
        Box::pin(async move { Self::rebuild(self, &name).await })
    }

    fn poll(&self, name: &str) -> PollFuture<'_> {
        let name = name.to_owned();
        Box::pin(async move { self.fetch(&name).await })
    }

    fn renew_transport(&mut self) -> Result<(), ClusterError> {
        self.session.renew_transport()
    }
}
