//! Shared fixtures and helper functions for config tests.

use crate::config::{AppConfig, DEFAULT_IDENTITY_ENDPOINT, DEFAULT_MAKE_SWARM_ENDPOINT};
use ortho_config::{MergeComposer, toml};
use rstest::fixture;
use std::sync::Arc;

/// Fixture providing an `AppConfig` parsed from a full TOML example.
#[fixture]
pub fn app_config_from_full_toml() -> AppConfig {
    let source = r#"
        home = "/home/alice/.carina"
        credentials_dir = "/srv/carina"
        cache = false
        update_check = false

        [make_swarm]
        endpoint = "https://swarm.example.test"
        identity_endpoint = "https://identity.example.test/v2.0"

        [update]
        releases_url = "https://releases.example.test/latest"
    "#;

    toml::from_str(source).expect("TOML parsing should succeed")
}

/// Fixture providing an `AppConfig` parsed from a minimal TOML example.
#[fixture]
pub fn app_config_from_partial_toml() -> AppConfig {
    let source = r#"
        [make_swarm]
        endpoint = "https://swarm.example.test"
    "#;

    toml::from_str(source).expect("TOML parsing should succeed")
}

/// Helper: Creates a `MergeComposer` with defaults layer already pushed.
pub fn create_composer_with_defaults() -> Result<MergeComposer, serde_json::Error> {
    let mut composer = MergeComposer::new();
    let defaults = ortho_config::serde_json::to_value(AppConfig::default())?;
    composer.push_defaults(defaults);
    Ok(composer)
}

/// Helper: Merges layers from a composer into `AppConfig`.
pub fn merge_config(composer: MergeComposer) -> Result<AppConfig, Arc<ortho_config::OrthoError>> {
    AppConfig::merge_from_layers(composer.layers())
}

/// Helper: Asserts that a config has all default values.
pub fn assert_config_has_defaults(config: &AppConfig) {
    assert!(config.home.is_none(), "home should be None");
    assert!(
        config.credentials_dir.is_none(),
        "credentials_dir should be None"
    );
    assert!(config.cache, "cache should default to true");
    assert!(config.update_check, "update_check should default to true");
    assert_eq!(
        config.make_swarm.endpoint, DEFAULT_MAKE_SWARM_ENDPOINT,
        "make_swarm.endpoint should be the public endpoint"
    );
    assert_eq!(
        config.make_swarm.identity_endpoint, DEFAULT_IDENTITY_ENDPOINT,
        "make_swarm.identity_endpoint should be the public identity service"
    );
}

/// Helper: Creates a `MergeComposer` with defaults, file, and env layers for
/// testing layer precedence.
pub fn create_composer_with_file_and_env() -> Result<MergeComposer, serde_json::Error> {
    use ortho_config::serde_json::json;

    let mut composer = create_composer_with_defaults()?;

    composer.push_file(
        json!({
            "home": "/from/file",
            "cache": true,
            "make_swarm": { "endpoint": "https://file.example.test" }
        }),
        None,
    );

    composer.push_environment(json!({
        "home": "/from/env",
        "cache": false
    }));

    Ok(composer)
}
