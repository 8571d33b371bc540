//! Persistent cache of API tokens and update-check bookkeeping.
//!
//! The cache is read once at startup and written once at shutdown. Writes
//! happen in [`TokenCache::flush`], which the binary calls on success; the
//! `Drop` implementation flushes any outstanding changes on early returns
//! and unwinds.

use std::collections::BTreeMap;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::bundle::write_owner_only;
use crate::credentials::Account;
use crate::error::{ClusterError, FilesystemError};
use crate::provider::{Authenticator, Session};

/// On-disk representation of the cache file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct CacheFile {
    #[serde(
        rename = "last-check",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    last_check: Option<DateTime<Utc>>,
    #[serde(default)]
    tokens: BTreeMap<String, String>,
}

/// Tokens keyed by username, plus the time of the last update check.
#[derive(Debug)]
pub struct TokenCache {
    path: Utf8PathBuf,
    contents: CacheFile,
    dirty: bool,
}

impl TokenCache {
    /// Read the cache at `path`; a missing file yields an empty cache.
    ///
    /// A file that cannot be parsed is discarded with a warning and replaced
    /// on the next flush.
    ///
    /// # Errors
    ///
    /// Returns `FilesystemError` if the file exists but cannot be read.
    pub fn load(path: &Utf8Path) -> Result<Self, FilesystemError> {
        let contents = match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|error| {
                warn!(path = %path, %error, "ignoring unreadable token cache");
                CacheFile::default()
            }),
            Err(error) if error.kind() == io::ErrorKind::NotFound => CacheFile::default(),
            Err(error) => return Err(FilesystemError::from_io(path.as_std_path(), &error)),
        };
        debug!(path = %path, tokens = contents.tokens.len(), "loaded token cache");
        Ok(Self {
            path: path.to_path_buf(),
            contents,
            dirty: false,
        })
    }

    /// Location of the cache file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// The cached token for `username`.
    #[must_use]
    pub fn lookup(&self, username: &str) -> Option<&str> {
        self.contents.tokens.get(username).map(String::as_str)
    }

    /// Remember `token` for `username`, replacing any previous entry.
    pub fn store(&mut self, username: &str, token: &str) {
        if self.lookup(username) != Some(token) {
            self.contents
                .tokens
                .insert(username.to_owned(), token.to_owned());
            self.dirty = true;
        }
    }

    /// When the update check last ran.
    #[must_use]
    pub const fn last_check(&self) -> Option<DateTime<Utc>> {
        self.contents.last_check
    }

    /// Record that the update check ran at `at`.
    pub fn record_check(&mut self, at: DateTime<Utc>) {
        self.contents.last_check = Some(at);
        self.dirty = true;
    }

    /// Write outstanding changes to disk, owner-only.
    ///
    /// # Errors
    ///
    /// Returns `FilesystemError` if the directory or file cannot be written.
    pub fn flush(&mut self) -> Result<(), FilesystemError> {
        if !self.dirty {
            return Ok(());
        }
        let io_error = |e: &io::Error| FilesystemError::from_io(self.path.as_std_path(), e);
        let (Some(parent), Some(name)) = (self.path.parent(), self.path.file_name()) else {
            return Err(FilesystemError::IoError {
                path: self.path.as_std_path().to_path_buf(),
                message: String::from("cache path has no file name"),
            });
        };
        let parent = if parent.as_str().is_empty() {
            Utf8Path::new(".")
        } else {
            parent
        };

        let json = serde_json::to_vec_pretty(&self.contents)
            .map_err(|e| io_error(&io::Error::other(e)))?;
        Dir::create_ambient_dir_all(parent, ambient_authority()).map_err(|e| io_error(&e))?;
        let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|e| io_error(&e))?;
        write_owner_only(&dir, name, &json).map_err(|e| io_error(&e))?;

        self.dirty = false;
        debug!(path = %self.path, "token cache written");
        Ok(())
    }
}

impl Drop for TokenCache {
    fn drop(&mut self) {
        if let Err(error) = self.flush() {
            warn!(%error, "failed to write token cache");
        }
    }
}

/// Obtain a session, reusing a cached token when the backend accepts it.
///
/// With no cache every call authenticates from scratch. A cached token that
/// fails the probe is replaced by the token from a full authentication.
///
/// # Errors
///
/// Propagates failures from [`Authenticator::authenticate`].
pub async fn authenticate_cached<A>(
    cache: Option<&mut TokenCache>,
    authenticator: &A,
    account: &Account,
) -> Result<Session, ClusterError>
where
    A: Authenticator + ?Sized,
{
    let Some(cache) = cache else {
        return authenticator.authenticate(account).await;
    };

    if let Some(token) = cache.lookup(account.username()).map(str::to_owned) {
        match authenticator.resume(account, &token).await {
            Ok(session) => {
                debug!(username = account.username(), "reusing cached token");
                return Ok(session);
            }
            Err(error) => {
                debug!(%error, "cached token rejected; authenticating");
            }
        }
    }

    let session = authenticator.authenticate(account).await?;
    cache.store(account.username(), session.token());
    Ok(session)
}
