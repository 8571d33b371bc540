//! Configuration system for carina.
//!
//! This module provides the configuration structures and CLI definitions for
//! the carina client. Loading and precedence merging is handled by the
//! `ortho_config` crate: CLI flags override environment variables, which
//! override configuration files, which override defaults.
//!
//! Account credentials are not part of this configuration. They are
//! resolved per invocation from flags and the environment by
//! [`crate::credentials::AccountResolver`].
//!
//! # Example Configuration
//!
//! ```toml
//! home = "/home/alice/.carina"
//! cache = true
//! update_check = false
//!
//! [make_swarm]
//! endpoint = "https://app.getcarina.com"
//! identity_endpoint = "https://identity.api.rackspacecloud.com/v2.0"
//!
//! [update]
//! releases_url = "https://api.github.com/repos/getcarina/carina/releases/latest"
//! ```

mod cli;
mod loader;
mod types;

#[cfg(test)]
mod tests;

pub use cli::{
    AccountArgs, AutoscaleArgs, Cli, ClusterArgs, Commands, CreateArgs, CredentialsArgs, EnvArgs,
    GrowArgs, RemoveArgs, Toggle, WaitArgs,
};
pub use loader::{env_var_names, load_config};
pub use types::{
    AppConfig, DEFAULT_IDENTITY_ENDPOINT, DEFAULT_MAKE_SWARM_ENDPOINT, DEFAULT_RELEASES_URL,
    MakeSwarmConfig, UpdateConfig,
};
