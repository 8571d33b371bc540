//! Configuration loading with layered precedence.
//!
//! Layers, lowest to highest: application defaults, configuration file,
//! `CARINA_*` environment variables, command-line arguments.
//!
//! The loader drives `MergeComposer` by hand rather than through the derived
//! `load()`: the clap `Cli` owns subcommand dispatch and the credential
//! flags, and typed environment values must fail fast instead of being
//! silently ignored.
//!
//! Credential variables (`CARINA_USERNAME`, `OS_PASSWORD`, ...) are not
//! configuration; they are read by [`crate::credentials::AccountResolver`].

use camino::Utf8PathBuf;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use ortho_config::discovery::ConfigDiscovery;
use ortho_config::serde_json::{self, Map, Value};
use ortho_config::{MergeComposer, toml};

use crate::config::{AppConfig, Cli};
use crate::error::{ConfigError, Result};

/// The type of value expected from an environment variable.
#[derive(Clone, Copy)]
enum EnvVarType {
    /// String value (always accepted).
    String,
    /// Boolean value (`true`/`false`). Invalid values return an error.
    Bool,
}

/// Specification for a single environment variable mapping.
struct EnvVarSpec {
    /// The environment variable name (e.g., `CARINA_HOME`).
    env_var: &'static str,
    /// The JSON path segments (e.g., `["make_swarm", "endpoint"]`).
    path: &'static [&'static str],
    /// The expected value type.
    var_type: EnvVarType,
}

/// Table of all configuration environment variables and their JSON paths.
const ENV_VAR_SPECS: &[EnvVarSpec] = &[
    EnvVarSpec {
        env_var: "CARINA_HOME",
        path: &["home"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "CARINA_CREDENTIALS_DIR",
        path: &["credentials_dir"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "CARINA_CACHE",
        path: &["cache"],
        var_type: EnvVarType::Bool,
    },
    EnvVarSpec {
        env_var: "CARINA_UPDATE_CHECK",
        path: &["update_check"],
        var_type: EnvVarType::Bool,
    },
    EnvVarSpec {
        env_var: "CARINA_MAKE_SWARM_ENDPOINT",
        path: &["make_swarm", "endpoint"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "CARINA_MAKE_SWARM_IDENTITY_ENDPOINT",
        path: &["make_swarm", "identity_endpoint"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "CARINA_UPDATE_RELEASES_URL",
        path: &["update", "releases_url"],
        var_type: EnvVarType::String,
    },
];

/// Returns the environment variable names recognised by the config loader.
///
/// Tests use this to clear every `CARINA_*` configuration variable.
#[must_use]
pub fn env_var_names() -> Vec<&'static str> {
    ENV_VAR_SPECS.iter().map(|spec| spec.env_var).collect()
}

/// Load a configuration file and push it to the composer.
fn load_config_file(path: &Utf8PathBuf, composer: &mut MergeComposer) -> Result<()> {
    let current_dir = Utf8PathBuf::from(".");
    let parent = path
        .parent()
        .filter(|p| !p.as_str().is_empty())
        .unwrap_or_else(|| current_dir.as_ref());
    let file_name = path.file_name().unwrap_or(path.as_str());

    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|e| {
        ConfigError::ParseError {
            message: format!("failed to open directory {parent}: {e}"),
        }
    })?;

    let content = dir
        .read_to_string(file_name)
        .map_err(|e| ConfigError::ParseError {
            message: format!("failed to read {path}: {e}"),
        })?;

    let value =
        toml::from_str::<serde_json::Value>(&content).map_err(|e| ConfigError::ParseError {
            message: format!("failed to parse {path}: {e}"),
        })?;

    composer.push_file(value, Some(path.clone()));
    Ok(())
}

/// Load configuration with full layer precedence.
///
/// # Errors
///
/// Returns `ConfigError` if a configuration file is malformed, a typed
/// environment variable has an invalid value, or the layers fail to merge.
pub fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut composer = MergeComposer::new();

    let defaults =
        serde_json::to_value(AppConfig::default()).map_err(|e| ConfigError::ParseError {
            message: format!("failed to serialise defaults: {e}"),
        })?;
    composer.push_defaults(defaults);

    let config_path: Option<Utf8PathBuf> =
        cli.config.clone().filter(|p| p.exists()).or_else(|| {
            let discovery = ConfigDiscovery::builder("carina")
                .env_var("CARINA_CONFIG_PATH")
                .config_file_name("config.toml")
                .dotfile_name(".carina.toml")
                .build();
            discovery
                .candidates()
                .into_iter()
                .filter(|p| p.exists())
                .find_map(|p| Utf8PathBuf::try_from(p).ok())
        });

    if let Some(ref path) = config_path {
        load_config_file(path, &mut composer)?;
    }

    let env_values = collect_env_vars(|name| std::env::var(name).ok())?;
    if !env_values.is_null() {
        composer.push_environment(env_values);
    }

    let cli_overrides = build_cli_overrides(cli);
    if !cli_overrides.is_null() {
        composer.push_cli(cli_overrides);
    }

    let config =
        AppConfig::merge_from_layers(composer.layers()).map_err(ConfigError::OrthoConfig)?;

    Ok(config)
}

/// Collect `CARINA_*` configuration variables into a JSON value.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` if a boolean variable does not parse.
fn collect_env_vars<F>(lookup: F) -> Result<Value>
where
    F: Fn(&str) -> Option<String>,
{
    let mut root = Map::new();

    for spec in ENV_VAR_SPECS {
        let Some(raw_value) = lookup(spec.env_var) else {
            continue;
        };

        let json_value = match spec.var_type {
            EnvVarType::String => Value::String(raw_value),
            EnvVarType::Bool => match raw_value.parse::<bool>() {
                Ok(b) => Value::Bool(b),
                Err(_) => {
                    return Err(ConfigError::InvalidValue {
                        field: spec.env_var.to_owned(),
                        reason: format!("expected bool (true/false), got '{raw_value}'"),
                    }
                    .into());
                }
            },
        };

        insert_at_path(&mut root, spec.path, json_value);
    }

    if root.is_empty() {
        Ok(Value::Null)
    } else {
        Ok(Value::Object(root))
    }
}

/// Insert a value at a nested path in a JSON map.
fn insert_at_path(root: &mut Map<String, Value>, path: &[&str], value: Value) {
    let Some((&field, parents)) = path.split_last() else {
        return;
    };

    let mut current = root;
    for &segment in parents {
        let entry = current
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(obj) = entry.as_object_mut() else {
            return;
        };
        current = obj;
    }

    current.insert(field.to_owned(), value);
}

/// Build a JSON value containing CLI overrides.
fn build_cli_overrides(cli: &Cli) -> Value {
    let mut overrides = Map::new();

    if cli.no_cache {
        overrides.insert(String::from("cache"), Value::Bool(false));
    }

    if overrides.is_empty() {
        Value::Null
    } else {
        Value::Object(overrides)
    }
}
