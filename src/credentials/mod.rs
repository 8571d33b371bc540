//! Account credential resolution.
//!
//! Turns command-line flags and environment variables into a typed
//! [`Account`] for one of the two backends. Each field is taken from its
//! flag when given, otherwise from the first non-empty variable in an
//! ordered list, otherwise from a fallback value where one exists.
//!
//! When no cloud type is requested the backend is detected from the secret:
//! an API key selects make-swarm, a password selects magnum.

use std::fmt;

use clap::ValueEnum;
use tracing::debug;

use crate::error::CredentialError;


/// Backend selector accepted by `--cloud`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CloudType {
    /// The legacy swarm orchestration service.
    #[value(name = "make-swarm")]
    MakeSwarm,
    /// The container orchestration engine service.
    Magnum,
}

impl CloudType {
    /// The name used on the command line and in messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MakeSwarm => "make-swarm",
            Self::Magnum => "magnum",
        }
    }
}

impl fmt::Display for CloudType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw, optional inputs gathered from command-line flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialInputs {
    /// Explicitly requested backend.
    pub cloud: Option<CloudType>,
    /// `--endpoint`.
    pub endpoint: Option<String>,
    /// `--username`.
    pub username: Option<String>,
    /// `--api-key`.
    pub api_key: Option<String>,
    /// `--password`.
    pub password: Option<String>,
    /// `--project`.
    pub project: Option<String>,
    /// `--domain`.
    pub domain: Option<String>,
    /// `--region`.
    pub region: Option<String>,
}

/// Credentials for the make-swarm backend.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKeyCredentials {
    /// Cluster API endpoint.
    pub endpoint: String,
    /// Account username.
    pub username: String,
    /// Account API key.
    pub api_key: String,
}

/// Credentials for the magnum backend.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordCredentials {
    /// Identity service URL.
    pub endpoint: String,
    /// Account username.
    pub username: String,
    /// Account password.
    pub password: String,
    /// Project to scope the token to.
    pub project: Option<String>,
    /// User and project domain.
    pub domain: String,
    /// Region used to pick the service endpoint from the catalogue.
    pub region: Option<String>,
}

/// A fully resolved account for one backend.
#[derive(Clone, PartialEq, Eq)]
pub enum Account {
    /// make-swarm account authenticated with an API key.
    MakeSwarm(ApiKeyCredentials),
    /// magnum account authenticated with a password.
    Magnum(PasswordCredentials),
}

impl Account {
    /// The backend this account belongs to.
    #[must_use]
    pub const fn cloud(&self) -> CloudType {
        match self {
            Self::MakeSwarm(_) => CloudType::MakeSwarm,
            Self::Magnum(_) => CloudType::Magnum,
        }
    }

    /// The account username.
    #[must_use]
    pub fn username(&self) -> &str {
        match self {
            Self::MakeSwarm(creds) => &creds.username,
            Self::Magnum(creds) => &creds.username,
        }
    }

    /// The endpoint the account authenticates against.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        match self {
            Self::MakeSwarm(creds) => &creds.endpoint,
            Self::Magnum(creds) => &creds.endpoint,
        }
    }
}

// Secrets stay out of debug output and therefore out of logs.
impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MakeSwarm(creds) => f
                .debug_struct("MakeSwarm")
                .field("endpoint", &creds.endpoint)
                .field("username", &creds.username)
                .finish_non_exhaustive(),
            Self::Magnum(creds) => f
                .debug_struct("Magnum")
                .field("endpoint", &creds.endpoint)
                .field("username", &creds.username)
                .field("project", &creds.project)
                .field("domain", &creds.domain)
                .field("region", &creds.region)
                .finish_non_exhaustive(),
        }
    }
}

/// Where a credential field may come from.
struct FieldSpec {
    /// Human-readable field name used in errors and traces.
    name: &'static str,
    /// The command-line flag.
    flag: &'static str,
    /// Environment variables, in fallback order.
    env_vars: &'static [&'static str],
}

const MAKE_SWARM_USERNAME: FieldSpec = FieldSpec {
    name: "username",
    flag: "--username",
    env_vars: &["CARINA_USERNAME", "RS_USERNAME"],
};

const MAKE_SWARM_API_KEY: FieldSpec = FieldSpec {
    name: "api key",
    flag: "--api-key",
    env_vars: &["CARINA_APIKEY", "RS_API_KEY"],
};

const MAGNUM_ENDPOINT: FieldSpec = FieldSpec {
    name: "endpoint",
    flag: "--endpoint",
    env_vars: &["OS_AUTH_URL"],
};

const MAGNUM_USERNAME: FieldSpec = FieldSpec {
    name: "username",
    flag: "--username",
    env_vars: &["OS_USERNAME"],
};

const MAGNUM_PASSWORD: FieldSpec = FieldSpec {
    name: "password",
    flag: "--password",
    env_vars: &["OS_PASSWORD"],
};

const MAGNUM_PROJECT: FieldSpec = FieldSpec {
    name: "project",
    flag: "--project",
    env_vars: &["OS_PROJECT_NAME"],
};

const MAGNUM_DOMAIN: FieldSpec = FieldSpec {
    name: "domain",
    flag: "--domain",
    env_vars: &["OS_DOMAIN_NAME"],
};

const MAGNUM_REGION: FieldSpec = FieldSpec {
    name: "region",
    flag: "--region",
    env_vars: &["OS_REGION_NAME"],
};

/// Domain used when neither `--domain` nor `OS_DOMAIN_NAME` is set.
const DEFAULT_DOMAIN: &str = "default";

impl FieldSpec {
    /// Describe every source, e.g. `--username, CARINA_USERNAME or RS_USERNAME`.
    fn sources(&self) -> String {
        let mut names = Vec::with_capacity(self.env_vars.len() + 1);
        names.push(self.flag);
        names.extend_from_slice(self.env_vars);
        join_alternatives(&names)
    }
}

/// Join names as `a, b or c`.
fn join_alternatives(names: &[&str]) -> String {
    match names.split_last() {
        None => String::new(),
        Some((last, [])) => (*last).to_owned(),
        Some((last, rest)) => format!("{} or {last}", rest.join(", ")),
    }
}

/// Resolves [`Account`] values from flags and the process environment.
///
/// # Type Parameters
///
/// * `E` - An environment provider implementing the `mockable::Env` trait,
///   allowing for testable environment variable access.
///
/// # Example
///
/// ```ignore
/// use carina::credentials::{AccountResolver, CredentialInputs};
/// use mockable::DefaultEnv;
///
/// let env = DefaultEnv::new();
/// let resolver = AccountResolver::new(&env, "https://app.getcarina.com");
/// let account = resolver.resolve(&CredentialInputs::default())?;
/// ```
pub struct AccountResolver<'a, E: mockable::Env> {
    env: &'a E,
    make_swarm_endpoint: &'a str,
}

impl<'a, E: mockable::Env> AccountResolver<'a, E> {
    /// Creates a resolver using `make_swarm_endpoint` when `--endpoint` is
    /// absent for a make-swarm account.
    #[must_use]
    pub const fn new(env: &'a E, make_swarm_endpoint: &'a str) -> Self {
        Self {
            env,
            make_swarm_endpoint,
        }
    }

    /// Produce a fully populated account.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::Missing` naming the first required field no
    /// source supplied.
    pub fn resolve(&self, inputs: &CredentialInputs) -> Result<Account, CredentialError> {
        match self.detect_cloud(inputs)? {
            CloudType::MakeSwarm => self.resolve_make_swarm(inputs).map(Account::MakeSwarm),
            CloudType::Magnum => self.resolve_magnum(inputs).map(Account::Magnum),
        }
    }

    /// Determine which backend the inputs address.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::Missing` when no cloud type is requested and
    /// neither an API key nor a password is available.
    pub fn detect_cloud(&self, inputs: &CredentialInputs) -> Result<CloudType, CredentialError> {
        if let Some(cloud) = inputs.cloud {
            return Ok(cloud);
        }

        let cloud = if self.is_supplied(&MAKE_SWARM_API_KEY, inputs.api_key.as_deref()) {
            CloudType::MakeSwarm
        } else if self.is_supplied(&MAGNUM_PASSWORD, inputs.password.as_deref()) {
            CloudType::Magnum
        } else {
            let mut names = vec![MAKE_SWARM_API_KEY.flag, MAGNUM_PASSWORD.flag];
            names.extend_from_slice(MAKE_SWARM_API_KEY.env_vars);
            names.extend_from_slice(MAGNUM_PASSWORD.env_vars);
            return Err(CredentialError::Missing {
                field: "api key or password",
                sources: join_alternatives(&names),
            });
        };

        debug!(cloud = %cloud, "detected cloud type from the provided credentials");
        Ok(cloud)
    }

    fn resolve_make_swarm(
        &self,
        inputs: &CredentialInputs,
    ) -> Result<ApiKeyCredentials, CredentialError> {
        let endpoint = match non_empty(inputs.endpoint.as_deref()) {
            Some(endpoint) => {
                debug!(field = "endpoint", source = "--endpoint", "resolved credential field");
                endpoint.to_owned()
            }
            None => {
                debug!(
                    field = "endpoint",
                    source = "configuration",
                    endpoint = self.make_swarm_endpoint,
                    "resolved credential field"
                );
                self.make_swarm_endpoint.to_owned()
            }
        };

        Ok(ApiKeyCredentials {
            endpoint,
            username: self.require(&MAKE_SWARM_USERNAME, inputs.username.as_deref())?,
            api_key: self.require(&MAKE_SWARM_API_KEY, inputs.api_key.as_deref())?,
        })
    }

    fn resolve_magnum(
        &self,
        inputs: &CredentialInputs,
    ) -> Result<PasswordCredentials, CredentialError> {
        let endpoint = self.require(&MAGNUM_ENDPOINT, inputs.endpoint.as_deref())?;
        let username = self.require(&MAGNUM_USERNAME, inputs.username.as_deref())?;
        let password = self.require(&MAGNUM_PASSWORD, inputs.password.as_deref())?;
        let project = self.optional(&MAGNUM_PROJECT, inputs.project.as_deref());
        let domain = self
            .lookup(&MAGNUM_DOMAIN, inputs.domain.as_deref())
            .unwrap_or_else(|| {
                debug!(
                    field = MAGNUM_DOMAIN.name,
                    source = DEFAULT_DOMAIN,
                    "not specified, use {}",
                    MAGNUM_DOMAIN.sources()
                );
                DEFAULT_DOMAIN.to_owned()
            });
        let region = self.optional(&MAGNUM_REGION, inputs.region.as_deref());

        Ok(PasswordCredentials {
            endpoint,
            username,
            password,
            project,
            domain,
            region,
        })
    }

    /// First non-empty value among the flag and the environment variables.
    fn lookup(&self, spec: &FieldSpec, flag_value: Option<&str>) -> Option<String> {
        if let Some(value) = non_empty(flag_value) {
            debug!(field = spec.name, source = spec.flag, "resolved credential field");
            return Some(value.to_owned());
        }

        spec.env_vars.iter().find_map(|var| {
            let value = self.env.string(var).filter(|v| !v.is_empty())?;
            debug!(field = spec.name, source = *var, "resolved credential field");
            Some(value)
        })
    }

    fn is_supplied(&self, spec: &FieldSpec, flag_value: Option<&str>) -> bool {
        non_empty(flag_value).is_some()
            || spec
                .env_vars
                .iter()
                .any(|var| self.env.string(var).is_some_and(|v| !v.is_empty()))
    }

    fn require(
        &self,
        spec: &FieldSpec,
        flag_value: Option<&str>,
    ) -> Result<String, CredentialError> {
        self.lookup(spec, flag_value)
            .ok_or_else(|| CredentialError::Missing {
                field: spec.name,
                sources: spec.sources(),
            })
    }

    fn optional(&self, spec: &FieldSpec, flag_value: Option<&str>) -> Option<String> {
        let value = self.lookup(spec, flag_value);
        if value.is_none() {
            debug!(
                field = spec.name,
                "not specified, use {}",
                spec.sources()
            );
        }
        value
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
