//! Credential bundles for a cluster's Docker endpoint.
//!
//! A bundle is written to `<root>/clusters/<username>/<cluster>/` as
//! owner-only files and can be verified by performing a TLS handshake with
//! the endpoint named by the `DOCKER_HOST` line of `docker.env`.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use rustls::ClientConfig;
use rustls::RootCertStore;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::error::{ClusterError, FilesystemError, VerificationError};
use crate::provider::REQUEST_TIMEOUT;

/// CA certificate file.
pub const CA_FILE: &str = "ca.pem";
/// CA key file; empty when the backend does not release the key.
pub const CA_KEY_FILE: &str = "ca-key.pem";
/// Client certificate file.
pub const CERT_FILE: &str = "cert.pem";
/// Client key file.
pub const KEY_FILE: &str = "key.pem";
/// POSIX shell environment script.
pub const DOCKER_ENV_FILE: &str = "docker.env";

const CLUSTERS_DIR: &str = "clusters";
const DOCKER_HOST_PREFIX: &str = "export DOCKER_HOST=";

/// TLS material and environment scripts for one cluster.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialBundle {
    /// CA certificate (PEM).
    pub ca: Vec<u8>,
    /// CA key (PEM), possibly empty.
    pub ca_key: Vec<u8>,
    /// Client certificate (PEM).
    pub cert: Vec<u8>,
    /// Client key (PEM).
    pub key: Vec<u8>,
    /// POSIX environment script.
    pub docker_env: Vec<u8>,
    /// Any further files, such as scripts for other shells.
    pub extra: BTreeMap<String, Vec<u8>>,
}

impl fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("docker_host", &self.docker_host())
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl CredentialBundle {
    /// Unpack a tar archive of bundle files.
    ///
    /// Entries are matched on their file name; directories inside the
    /// archive are ignored.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::Backend` if the archive is unreadable or lacks
    /// the CA, certificate, key or environment file.
    pub fn from_tar(archive: &[u8]) -> Result<Self, ClusterError> {
        let mut bundle = Self::default();
        let mut seen = Vec::new();
        let mut reader = tar::Archive::new(archive);
        let entries = reader.entries().map_err(archive_error)?;

        for entry in entries {
            let mut entry = entry.map_err(archive_error)?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let path = entry.path().map_err(archive_error)?.into_owned();
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_owned) else {
                continue;
            };
            let mut contents = Vec::new();
            entry.read_to_end(&mut contents).map_err(archive_error)?;

            match name.as_str() {
                CA_FILE => bundle.ca = contents,
                CA_KEY_FILE => bundle.ca_key = contents,
                CERT_FILE => bundle.cert = contents,
                KEY_FILE => bundle.key = contents,
                DOCKER_ENV_FILE => bundle.docker_env = contents,
                _ => {
                    bundle.extra.insert(name.clone(), contents);
                }
            }
            seen.push(name);
        }

        for required in [CA_FILE, CERT_FILE, KEY_FILE, DOCKER_ENV_FILE] {
            if !seen.iter().any(|name| name == required) {
                return Err(ClusterError::backend(format!(
                    "credential archive is missing {required}"
                )));
            }
        }
        Ok(bundle)
    }

    /// The Docker host named by the environment script, if any.
    #[must_use]
    pub fn docker_host(&self) -> Option<String> {
        parse_docker_host(&String::from_utf8_lossy(&self.docker_env)).map(str::to_owned)
    }

    /// Every file in the bundle, keyed by file name.
    pub fn files(&self) -> impl Iterator<Item = (&str, &[u8])> {
        [
            (CA_FILE, self.ca.as_slice()),
            (CA_KEY_FILE, self.ca_key.as_slice()),
            (CERT_FILE, self.cert.as_slice()),
            (KEY_FILE, self.key.as_slice()),
            (DOCKER_ENV_FILE, self.docker_env.as_slice()),
        ]
        .into_iter()
        .chain(
            self.extra
                .iter()
                .map(|(name, contents)| (name.as_str(), contents.as_slice())),
        )
    }

    /// Write the bundle into `dir`, creating it and its parents.
    ///
    /// Files are owner-only and existing files are overwritten.
    ///
    /// # Errors
    ///
    /// Returns `FilesystemError` if the directory or a file cannot be written.
    pub fn materialize(&self, dir: &Utf8Path) -> Result<(), FilesystemError> {
        Dir::create_ambient_dir_all(dir, ambient_authority())
            .map_err(|e| FilesystemError::from_io(dir.as_std_path(), &e))?;
        let handle = Dir::open_ambient_dir(dir, ambient_authority())
            .map_err(|e| FilesystemError::from_io(dir.as_std_path(), &e))?;

        for (name, contents) in self.files() {
            write_owner_only(&handle, name, contents)
                .map_err(|e| FilesystemError::from_io(dir.join(name).as_std_path(), &e))?;
        }
        debug!(path = %dir, "credentials written");
        Ok(())
    }
}

fn archive_error(error: io::Error) -> ClusterError {
    ClusterError::backend(format!("invalid credential archive: {error}"))
}

/// Write `contents` to `name` inside `dir`, readable by the owner only.
#[cfg(unix)]
pub(crate) fn write_owner_only(dir: &Dir, name: &str, contents: &[u8]) -> io::Result<()> {
    use cap_std::fs::{OpenOptionsExt, Permissions, PermissionsExt};
    use std::io::Write;

    let mut options = cap_std::fs::OpenOptions::new();
    options.write(true).create(true).mode(0o600);
    let mut file = dir.open_with(name, &options)?;
    // An existing file keeps its old mode, so tighten it before any contents change.
    file.set_permissions(Permissions::from_mode(0o600))?;
    file.set_len(0)?;
    file.write_all(contents)
}

#[cfg(not(unix))]
pub(crate) fn write_owner_only(dir: &Dir, name: &str, contents: &[u8]) -> io::Result<()> {
    dir.write(name, contents)
}

/// The default bundle directory for a user's cluster.
#[must_use]
pub fn bundle_dir(root: &Utf8Path, username: &str, cluster: &str) -> Utf8PathBuf {
    root.join(CLUSTERS_DIR).join(username).join(cluster)
}

/// Extract the value of the first `export DOCKER_HOST=` line.
#[must_use]
pub fn parse_docker_host(env: &str) -> Option<&str> {
    env.lines()
        .filter_map(|line| line.trim_end_matches('\r').strip_prefix(DOCKER_HOST_PREFIX))
        .map(|value| value.trim().trim_matches('"'))
        .next()
}

/// Files read back from a bundle directory.
struct BundleFiles {
    ca: Vec<u8>,
    cert: Vec<u8>,
    key: Vec<u8>,
    docker_env: String,
}

fn read_bundle(dir: &Utf8Path) -> Result<BundleFiles, VerificationError> {
    let read_failed = |name: &str, error: &io::Error| VerificationError::ReadFailed {
        path: dir.join(name).into_std_path_buf(),
        message: error.to_string(),
    };
    let handle = Dir::open_ambient_dir(dir, ambient_authority())
        .map_err(|e| read_failed("", &e))?;
    let read = |name: &str| handle.read(name).map_err(|e| read_failed(name, &e));

    // The CA key is read only to confirm the bundle is complete.
    read(CA_KEY_FILE)?;
    Ok(BundleFiles {
        ca: read(CA_FILE)?,
        cert: read(CERT_FILE)?,
        key: read(KEY_FILE)?,
        docker_env: String::from_utf8_lossy(&read(DOCKER_ENV_FILE)?).into_owned(),
    })
}

/// Where the Docker endpoint listens.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DockerTarget {
    host: String,
    port: u16,
}

impl DockerTarget {
    fn parse(value: &str) -> Result<Self, VerificationError> {
        let invalid = |reason: &str| VerificationError::InvalidDockerHost {
            value: value.to_owned(),
            reason: reason.to_owned(),
        };
        let url = reqwest::Url::parse(value).map_err(|e| invalid(&e.to_string()))?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("missing host"))?;
        let port = url.port().ok_or_else(|| invalid("missing port"))?;
        Ok(Self {
            host: host.trim_start_matches('[').trim_end_matches(']').to_owned(),
            port,
        })
    }

    fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

fn tls_config(files: &BundleFiles) -> Result<ClientConfig, VerificationError> {
    let tls_error = |message: String| VerificationError::TlsConfig { message };

    let mut roots = RootCertStore::empty();
    for cert in CertificateDer::pem_slice_iter(&files.ca) {
        let cert = cert.map_err(|e| tls_error(format!("{CA_FILE}: {e}")))?;
        roots
            .add(cert)
            .map_err(|e| tls_error(format!("{CA_FILE}: {e}")))?;
    }
    if roots.is_empty() {
        return Err(tls_error(format!("{CA_FILE} holds no certificates")));
    }

    let chain = CertificateDer::pem_slice_iter(&files.cert)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| tls_error(format!("{CERT_FILE}: {e}")))?;
    let key = PrivateKeyDer::from_pem_slice(&files.key)
        .map_err(|e| tls_error(format!("{KEY_FILE}: {e}")))?;

    ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| tls_error(e.to_string()))?
        .with_root_certificates(roots)
        .with_client_auth_cert(chain, key)
        .map_err(|e| tls_error(e.to_string()))
}

/// Read a bundle back from `dir` and complete a TLS handshake with its
/// Docker endpoint, trusting only the bundle's CA.
///
/// # Errors
///
/// Returns `VerificationError` if a file cannot be read, `DOCKER_HOST` is
/// missing or malformed, the TLS material is invalid or the handshake fails.
pub async fn verify(dir: &Utf8Path) -> Result<(), VerificationError> {
    let files = read_bundle(dir)?;
    let host = parse_docker_host(&files.docker_env).ok_or_else(|| {
        VerificationError::MissingDockerHost {
            path: dir.join(DOCKER_ENV_FILE).into_std_path_buf(),
        }
    })?;
    let target = DockerTarget::parse(host)?;
    let config = tls_config(&files)?;
    let server_name = ServerName::try_from(target.host.clone()).map_err(|e| {
        VerificationError::InvalidDockerHost {
            value: host.to_owned(),
            reason: e.to_string(),
        }
    })?;

    let address = target.address();
    let handshake_failed = |message: String| VerificationError::HandshakeFailed {
        address: address.clone(),
        message,
    };

    let handshake = async {
        let tcp = TcpStream::connect((target.host.as_str(), target.port))
            .await
            .map_err(|e| handshake_failed(e.to_string()))?;
        let mut stream = TlsConnector::from(Arc::new(config))
            .connect(server_name, tcp)
            .await
            .map_err(|e| handshake_failed(e.to_string()))?;
        if let Err(error) = stream.shutdown().await {
            debug!(%error, "closing verification connection failed");
        }
        Ok(())
    };

    tokio::time::timeout(REQUEST_TIMEOUT, handshake)
        .await
        .map_err(|_| handshake_failed(format!("timed out after {REQUEST_TIMEOUT:?}")))??;
    debug!(address = %address, "credentials verified");
    Ok(())
}

/// Remove a bundle directory written by [`CredentialBundle::materialize`].
///
/// Returns `Ok(false)` when the directory does not exist.
///
/// # Errors
///
/// Returns `FilesystemError::UnsafeRemoval` for an empty path, `.`, `/`, or
/// a directory without a `ca.pem`, and other `FilesystemError`s when the
/// removal itself fails.
pub fn remove_bundle_dir(path: &Utf8Path) -> Result<bool, FilesystemError> {
    let unsafe_removal = |reason: &str| FilesystemError::UnsafeRemoval {
        path: path.as_std_path().to_path_buf(),
        reason: reason.to_owned(),
    };

    let trimmed = path.as_str().trim_end_matches(['/', '\\']);
    if trimmed.is_empty() || trimmed == "." {
        return Err(unsafe_removal(
            "the path is empty, the current directory or a root directory",
        ));
    }
    let path = Utf8Path::new(trimmed);

    if !path.exists() {
        return Ok(false);
    }
    if !path.join(CA_FILE).exists() {
        return Err(unsafe_removal(
            "the directory exists but holds no ca.pem; remove it by hand",
        ));
    }

    let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
        return Err(unsafe_removal("the path has no parent directory"));
    };
    let parent = if parent.as_str().is_empty() {
        Utf8Path::new(".")
    } else {
        parent
    };
    let parent_dir = Dir::open_ambient_dir(parent, ambient_authority())
        .map_err(|e| FilesystemError::from_io(parent.as_std_path(), &e))?;
    parent_dir
        .remove_dir_all(name)
        .map_err(|e| FilesystemError::from_io(path.as_std_path(), &e))?;
    debug!(path = %path, "removed local credentials");
    Ok(true)
}
