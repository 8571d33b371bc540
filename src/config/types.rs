//! Configuration data types for carina.

use camino::Utf8PathBuf;
use ortho_config::{OrthoConfig, OrthoResult, PostMergeContext, PostMergeHook};
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

use crate::error::{ConfigError, Result};

/// Public make-swarm API endpoint.
pub const DEFAULT_MAKE_SWARM_ENDPOINT: &str = "https://app.getcarina.com";

/// Identity service used to exchange a make-swarm API key for a token.
pub const DEFAULT_IDENTITY_ENDPOINT: &str = "https://identity.api.rackspacecloud.com/v2.0";

/// Release feed consulted by the update check.
pub const DEFAULT_RELEASES_URL: &str =
    "https://api.github.com/repos/getcarina/carina/releases/latest";

/// Directory under the home directory used when neither `home` nor
/// `credentials_dir` is configured.
const DEFAULT_HOME_DIR_NAME: &str = ".carina";

/// Endpoints for the make-swarm backend.
#[derive(Debug, Clone, PartialEq, Eq, SmartDefault, Deserialize, Serialize)]
#[serde(default)]
pub struct MakeSwarmConfig {
    /// Cluster API endpoint used when `--endpoint` is not given.
    #[default(String::from(DEFAULT_MAKE_SWARM_ENDPOINT))]
    pub endpoint: String,

    /// Identity endpoint that issues API tokens.
    #[default(String::from(DEFAULT_IDENTITY_ENDPOINT))]
    pub identity_endpoint: String,
}

/// Release notification settings.
#[derive(Debug, Clone, PartialEq, Eq, SmartDefault, Deserialize, Serialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// URL returning the latest release as JSON with a `tag_name` field.
    #[default(String::from(DEFAULT_RELEASES_URL))]
    pub releases_url: String,
}

/// Root application configuration.
///
/// Loaded from defaults, a configuration file, `CARINA_*` environment
/// variables and command-line arguments, in increasing order of precedence.
///
/// Configuration files are discovered in this order:
/// 1. Path specified via `CARINA_CONFIG_PATH`
/// 2. `.carina.toml` in the current working directory
/// 3. `.carina.toml` in the home directory
/// 4. `~/.config/carina/config.toml`
#[derive(Debug, Clone, SmartDefault, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(
    prefix = "CARINA",
    post_merge_hook,
    discovery(
        app_name = "carina",
        env_var = "CARINA_CONFIG_PATH",
        config_file_name = "config.toml",
        dotfile_name = ".carina.toml",
        config_cli_long = "config",
        config_cli_visible = true,
    )
)]
pub struct AppConfig {
    /// Directory holding carina data; defaults to `~/.carina`.
    pub home: Option<Utf8PathBuf>,

    /// Root directory for downloaded credentials and the token cache.
    pub credentials_dir: Option<Utf8PathBuf>,

    /// Cache API tokens and update-check times between runs.
    #[default(true)]
    pub cache: bool,

    /// Check for newer releases (only when the cache is enabled).
    #[default(true)]
    pub update_check: bool,

    /// make-swarm endpoints.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub make_swarm: MakeSwarmConfig,

    /// Release notification settings.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub update: UpdateConfig,
}

impl AppConfig {
    /// Returns the directory holding credentials and the token cache.
    ///
    /// Precedence: `credentials_dir`, then `home`, then `~/.carina`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingRequired` when neither directory is
    /// configured and the user's home directory cannot be determined.
    pub fn credentials_root(&self) -> Result<Utf8PathBuf> {
        if let Some(dir) = self.credentials_dir.as_ref().or(self.home.as_ref()) {
            return Ok(dir.clone());
        }
        let home = dirs::home_dir()
            .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
            .ok_or_else(|| ConfigError::MissingRequired {
                field: String::from("home (set CARINA_HOME)"),
            })?;
        Ok(home.join(DEFAULT_HOME_DIR_NAME))
    }

    /// Path of the token cache file.
    ///
    /// # Errors
    ///
    /// Propagates failures from [`Self::credentials_root`].
    pub fn cache_file(&self) -> Result<Utf8PathBuf> {
        Ok(self.credentials_root()?.join("cache.json"))
    }
}

impl PostMergeHook for AppConfig {
    fn post_merge(&mut self, _ctx: &PostMergeContext) -> OrthoResult<()> {
        // An empty path in a file or environment variable means "unset".
        if self.home.as_ref().is_some_and(|p| p.as_str().is_empty()) {
            self.home = None;
        }
        if self
            .credentials_dir
            .as_ref()
            .is_some_and(|p| p.as_str().is_empty())
        {
            self.credentials_dir = None;
        }
        Ok(())
    }
}
