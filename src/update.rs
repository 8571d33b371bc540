//! Release notification.
//!
//! At most once every twelve hours the latest release tag is fetched and
//! compared with the running version. Nothing here is fatal: failures are
//! logged and the command carries on.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::cache::TokenCache;
use crate::error::ClusterError;
use crate::provider::http;

/// Minimum time between two update checks.
pub const CHECK_INTERVAL: TimeDelta = TimeDelta::hours(12);

#[derive(Deserialize)]
struct Release {
    tag_name: String,
}

/// Whether a check is due, given when the last one ran.
#[must_use]
pub fn is_due(last_check: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    last_check.is_none_or(|at| now.signed_duration_since(at) >= CHECK_INTERVAL)
}

/// Development builds never ask for updates.
#[must_use]
pub fn is_dev_version(version: &str) -> bool {
    version.contains("-dev")
}

/// Whether the release tagged `latest` is newer than `current`.
///
/// A leading `v` on either side is ignored.
///
/// # Errors
///
/// Returns an error when either value is not a semantic version.
pub fn is_newer(current: &str, latest: &str) -> Result<bool, semver::Error> {
    let parse = |v: &str| semver::Version::parse(v.trim().trim_start_matches('v'));
    Ok(parse(latest)? > parse(current)?)
}

/// Fetch the tag of the latest release from `releases_url`.
///
/// # Errors
///
/// Returns `ClusterError` when the request fails or the body has no tag.
pub async fn latest_release(releases_url: &str) -> Result<String, ClusterError> {
    let client = http::build_client()?;
    let response = http::send(&client, client.get(releases_url), None).await?;
    let release: Release = http::json(response).await?;
    Ok(release.tag_name)
}

/// Run the update check if one is due.
///
/// Returns the notice to show the user when a newer release exists.
pub async fn check_for_update(
    cache: &mut TokenCache,
    releases_url: &str,
    current: &str,
    now: DateTime<Utc>,
) -> Option<String> {
    if !is_due(cache.last_check(), now) {
        debug!("update check ran recently; skipping");
        return None;
    }
    cache.record_check(now);

    if is_dev_version(current) {
        debug!(version = current, "development build; skipping update check");
        return None;
    }

    let latest = match latest_release(releases_url).await {
        Ok(tag) => tag,
        Err(error) => {
            warn!(%error, "unable to check for a newer release");
            return None;
        }
    };
    match is_newer(current, &latest) {
        Ok(true) => Some(format!(
            "# A new version of carina is available: {latest} (you have {current})"
        )),
        Ok(false) => None,
        Err(error) => {
            warn!(%error, latest = %latest, "unable to compare release versions");
            None
        }
    }
}
