//! Command-line argument definitions for carina.

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::credentials::{CloudType, CredentialInputs};
use crate::shell::Shell;

/// Command-line interface for carina.
#[derive(Debug, Parser)]
#[command(name = "carina")]
#[command(
    author,
    version,
    about = "Command line interface to launch and work with Docker Swarm clusters"
)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Account credentials and backend selection.
    #[command(flatten)]
    pub account: AccountArgs,

    /// Path to configuration file.
    #[arg(long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Do not read or write the API token and update-check cache.
    #[arg(long = "no-cache", global = true)]
    pub no_cache: bool,

    /// Log credential resolution and backend requests to stderr.
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Global flags that feed credential resolution.
#[derive(Debug, Clone, Default, Args)]
pub struct AccountArgs {
    /// Carina username [`CARINA_USERNAME`/`RS_USERNAME`/`OS_USERNAME`].
    #[arg(long, global = true)]
    pub username: Option<String>,

    /// Carina API key [`CARINA_APIKEY`/`RS_API_KEY`].
    #[arg(long = "api-key", global = true)]
    pub api_key: Option<String>,

    /// Password [`OS_PASSWORD`].
    #[arg(long, global = true)]
    pub password: Option<String>,

    /// Project name [`OS_PROJECT_NAME`].
    #[arg(long, global = true)]
    pub project: Option<String>,

    /// Domain name [`OS_DOMAIN_NAME`].
    #[arg(long, global = true)]
    pub domain: Option<String>,

    /// Region name [`OS_REGION_NAME`].
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// API endpoint [`OS_AUTH_URL`].
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    /// The cloud type; detected from the provided credentials when omitted.
    #[arg(long, global = true, value_enum)]
    pub cloud: Option<CloudType>,
}

impl AccountArgs {
    /// Convert the parsed flags into resolver inputs.
    #[must_use]
    pub fn to_inputs(&self) -> CredentialInputs {
        CredentialInputs {
            cloud: self.cloud,
            endpoint: self.endpoint.clone(),
            username: self.username.clone(),
            api_key: self.api_key.clone(),
            password: self.password.clone(),
            project: self.project.clone(),
            domain: self.domain.clone(),
            region: self.region.clone(),
        }
    }
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create a swarm cluster.
    Create(CreateArgs),

    /// Get information about a swarm cluster.
    #[command(alias = "inspect")]
    Get(ClusterArgs),

    /// List clusters.
    #[command(alias = "list")]
    Ls,

    /// Grow a cluster by the requested number of nodes.
    Grow(GrowArgs),

    /// Enable or disable autoscale on a cluster.
    Autoscale(AutoscaleArgs),

    /// Download credentials.
    #[command(alias = "creds")]
    Credentials(CredentialsArgs),

    /// Show source command for setting credential environment.
    Env(EnvArgs),

    /// Rebuild a swarm cluster.
    Rebuild(WaitArgs),

    /// Remove a swarm cluster.
    #[command(alias = "delete")]
    Rm(RemoveArgs),

    /// Get user quotas.
    Quotas,
}

/// Arguments naming a single cluster.
#[derive(Debug, Parser)]
pub struct ClusterArgs {
    /// Name of the cluster.
    #[arg(required = true)]
    pub name: String,
}

/// Arguments for operations that can wait for the cluster to settle.
#[derive(Debug, Parser)]
pub struct WaitArgs {
    /// Name of the cluster.
    #[arg(required = true)]
    pub name: String,

    /// Wait for the swarm cluster to come online (or error).
    #[arg(long)]
    pub wait: bool,
}

/// Arguments for the `create` subcommand.
#[derive(Debug, Parser)]
pub struct CreateArgs {
    /// Name of the cluster.
    #[arg(required = true)]
    pub name: String,

    /// Number of nodes for the initial cluster.
    #[arg(long, alias = "segments", default_value_t = 1, allow_negative_numbers = true)]
    pub nodes: i64,

    /// Turn autoscale on for the new cluster.
    #[arg(long)]
    pub autoscale: bool,

    /// Wait for the swarm cluster to come online (or error).
    #[arg(long)]
    pub wait: bool,
}

/// Arguments for the `grow` subcommand.
#[derive(Debug, Parser)]
pub struct GrowArgs {
    /// Name of the cluster.
    #[arg(required = true)]
    pub name: String,

    /// Number of nodes to increase the cluster by.
    #[arg(long, required = true)]
    pub by: i64,
}

/// Autoscale toggle accepted by the `autoscale` subcommand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    /// Turn autoscale on.
    On,
    /// Turn autoscale off.
    Off,
}

impl Toggle {
    /// Whether the toggle enables the feature.
    #[must_use]
    pub const fn enabled(self) -> bool {
        matches!(self, Self::On)
    }
}

/// Arguments for the `autoscale` subcommand.
#[derive(Debug, Parser)]
pub struct AutoscaleArgs {
    /// Name of the cluster.
    #[arg(required = true)]
    pub name: String,

    /// Whether autoscale is on or off.
    #[arg(value_enum)]
    pub autoscale: Toggle,
}

/// Arguments for the `credentials` subcommand.
#[derive(Debug, Parser)]
pub struct CredentialsArgs {
    /// Name of the cluster.
    #[arg(required = true)]
    pub name: String,

    /// Path to read and write credentials.
    #[arg(long, value_name = "DIR")]
    pub path: Option<Utf8PathBuf>,

    /// Do not print follow-up instructions.
    #[arg(long, hide = true)]
    pub silent: bool,
}

/// Arguments for the `env` subcommand.
#[derive(Debug, Parser)]
pub struct EnvArgs {
    /// Name of the cluster.
    #[arg(required = true)]
    pub name: String,

    /// Path to read and write credentials.
    #[arg(long, value_name = "DIR")]
    pub path: Option<Utf8PathBuf>,

    /// Force the environment to be configured for the specified shell.
    #[arg(long, value_enum)]
    pub shell: Option<Shell>,
}

/// Arguments for the `rm` subcommand.
#[derive(Debug, Parser)]
pub struct RemoveArgs {
    /// Name of the cluster.
    #[arg(required = true)]
    pub name: String,

    /// Path the cluster credentials were written to.
    #[arg(long, value_name = "DIR")]
    pub path: Option<Utf8PathBuf>,
}
