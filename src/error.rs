//! Semantic error types for the carina client.
//!
//! Each concern owns a `thiserror` enum describing the conditions a caller
//! might inspect or report. The binary converts the aggregated
//! [`CarinaError`] into an `eyre::Report` at the application boundary.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be parsed.
    #[error("failed to parse configuration file: {message}")]
    ParseError {
        /// A description of the parse error.
        message: String,
    },

    /// A required configuration value is missing.
    #[error("missing required configuration: {field}")]
    MissingRequired {
        /// The name of the missing field.
        field: String,
    },

    /// A configuration value failed validation.
    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// The name of the invalid field.
        field: String,
        /// The reason the value is invalid.
        reason: String,
    },

    /// The `OrthoConfig` library returned an error while merging layers.
    #[error("configuration loading failed: {0}")]
    OrthoConfig(Arc<ortho_config::OrthoError>),
}

/// Errors raised while resolving account credentials.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// A required credential field was not supplied by any source.
    #[error("{field} was not specified: use {sources}")]
    Missing {
        /// The credential field that could not be resolved.
        field: &'static str,
        /// The flags and environment variables that could have supplied it.
        sources: String,
    },
}

/// Errors returned by backend cluster operations.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// A client-side precondition on an argument failed.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// A description of the rejected argument.
        message: String,
    },

    /// Authentication, or validation of a cached token, failed.
    #[error("authentication failed: {message}")]
    AuthenticationFailed {
        /// A description of the authentication failure.
        message: String,
    },

    /// The named cluster does not exist.
    #[error("cluster not found: {name}")]
    NotFound {
        /// The cluster name that was looked up.
        name: String,
    },

    /// The backend answered with an unexpected HTTP status.
    #[error("backend returned HTTP {status}: {body}")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// The response body, as text.
        body: String,
    },

    /// The request could not be sent or the response could not be read.
    #[error("backend request failed: {message}")]
    Backend {
        /// A description of the transport or decoding failure.
        message: String,
    },

    /// The selected backend has no equivalent of the requested operation.
    #[error("{operation} is not supported by the {backend} backend")]
    Unsupported {
        /// The operation that was requested.
        operation: &'static str,
        /// The backend that rejected it.
        backend: &'static str,
    },
}

impl ClusterError {
    /// Build a [`ClusterError::Backend`] from any displayable cause.
    pub fn backend(cause: impl std::fmt::Display) -> Self {
        Self::Backend {
            message: cause.to_string(),
        }
    }
}

impl From<reqwest::Error> for ClusterError {
    fn from(error: reqwest::Error) -> Self {
        Self::backend(error)
    }
}

/// Errors that can occur during filesystem operations.
#[derive(Debug, Error)]
pub enum FilesystemError {
    /// A file or directory was not found.
    #[error("path not found: {path}")]
    NotFound {
        /// The path that was not found.
        path: PathBuf,
    },

    /// Permission denied when accessing a path.
    #[error("permission denied: {path}")]
    PermissionDenied {
        /// The path that could not be accessed.
        path: PathBuf,
    },

    /// An I/O error occurred.
    #[error("I/O error at '{path}': {message}")]
    IoError {
        /// The path where the error occurred.
        path: PathBuf,
        /// A description of the I/O error.
        message: String,
    },

    /// A removal was refused because the target did not look like a bundle.
    #[error("refusing to remove '{path}': {reason}")]
    UnsafeRemoval {
        /// The path that was not removed.
        path: PathBuf,
        /// Why the removal was refused.
        reason: String,
    },
}

impl FilesystemError {
    /// Classify an `io::Error` observed at `path`.
    pub fn from_io(path: impl Into<PathBuf>, error: &io::Error) -> Self {
        let path = path.into();
        match error.kind() {
            io::ErrorKind::NotFound => Self::NotFound { path },
            io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::IoError {
                path,
                message: error.to_string(),
            },
        }
    }
}

/// Errors raised while verifying a credential bundle on disk.
#[derive(Debug, Error)]
pub enum VerificationError {
    /// One of the bundle files could not be read.
    #[error("failed to read credential file '{path}': {message}")]
    ReadFailed {
        /// The file that could not be read.
        path: PathBuf,
        /// A description of the read failure.
        message: String,
    },

    /// The environment file has no `export DOCKER_HOST=` line.
    #[error("no DOCKER_HOST assignment found in '{path}'")]
    MissingDockerHost {
        /// The environment file that was searched.
        path: PathBuf,
    },

    /// The `DOCKER_HOST` value is not a usable `scheme://host:port` URL.
    #[error("invalid DOCKER_HOST '{value}': {reason}")]
    InvalidDockerHost {
        /// The value found in the environment file.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The certificate material could not be turned into a TLS configuration.
    #[error("invalid TLS material: {message}")]
    TlsConfig {
        /// A description of the certificate or key problem.
        message: String,
    },

    /// The TLS handshake with the Docker endpoint failed.
    #[error("TLS handshake with {address} failed: {message}")]
    HandshakeFailed {
        /// The `host:port` that was dialled.
        address: String,
        /// A description of the handshake failure.
        message: String,
    },
}

/// Top-level error type for the carina client.
///
/// Aggregates every domain error so that command handlers can use `?`
/// throughout. The binary converts it to `eyre::Report` for display.
#[derive(Debug, Error)]
pub enum CarinaError {
    /// An error occurred during configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Credentials could not be resolved.
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// A backend cluster operation failed.
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// An error occurred during filesystem operations.
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),

    /// A credential bundle failed verification.
    #[error(transparent)]
    Verification(#[from] VerificationError),

    /// The cluster was deleted but its local credentials could not be.
    #[error("cluster '{name}' was deleted but its credentials were left in place: {source}")]
    CredentialsRetained {
        /// The deleted cluster.
        name: String,
        /// Why the credentials directory was kept.
        #[source]
        source: FilesystemError,
    },

    /// Command output could not be written.
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

/// A specialised `Result` type for carina operations.
pub type Result<T> = std::result::Result<T, CarinaError>;
