//! Waiting for a cluster to settle after `create` or `rebuild`.
//!
//! After the triggering operation returns, the orchestrator pauses for a
//! grace period, then re-fetches the cluster at a fixed interval while its
//! status is transient. Each re-fetch uses a freshly built transport. The
//! first fetch error ends the wait.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::debug;

use crate::error::ClusterError;
use crate::provider::{Cluster, ClusterService};

/// Boxed future returned by [`Pause::pause`].
pub type PauseFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Suspends the orchestrator between polls.
pub trait Pause {
    /// Wait for `duration`.
    fn pause(&self, duration: Duration) -> PauseFuture<'_>;
}

/// Pauses on the Tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPause;

impl Pause for TokioPause {
    fn pause(&self, duration: Duration) -> PauseFuture<'_> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Fixed pauses used while waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Pause after the triggering operation returns.
    pub grace: Duration,
    /// Pause before each re-fetch.
    pub interval: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(40),
            interval: Duration::from_secs(10),
        }
    }
}

/// Drives operations that can optionally wait for a stable status.
pub struct Orchestrator<'a, S: ?Sized, P: ?Sized> {
    service: &'a mut S,
    pause: &'a P,
    policy: WaitPolicy,
}

impl<'a, S, P> Orchestrator<'a, S, P>
where
    S: ClusterService + ?Sized,
    P: Pause + ?Sized,
{
    /// Bind a cluster service and a pause source.
    pub const fn new(service: &'a mut S, pause: &'a P, policy: WaitPolicy) -> Self {
        Self {
            service,
            pause,
            policy,
        }
    }

    /// Create a cluster, waiting for it to settle when `wait` is set.
    ///
    /// # Errors
    ///
    /// Propagates the first error from the create request or a re-fetch.
    pub async fn create(
        &mut self,
        name: &str,
        nodes: i64,
        autoscale: bool,
        wait: bool,
    ) -> Result<Cluster, ClusterError> {
        let cluster = self.service.create(name, nodes, autoscale).await?;
        self.settle(name, cluster, wait).await
    }

    /// Rebuild a cluster, waiting for it to settle when `wait` is set.
    ///
    /// # Errors
    ///
    /// Propagates the first error from the rebuild request or a re-fetch.
    pub async fn rebuild(&mut self, name: &str, wait: bool) -> Result<Cluster, ClusterError> {
        let cluster = self.service.rebuild(name).await?;
        self.settle(name, cluster, wait).await
    }

    async fn settle(
        &mut self,
        name: &str,
        cluster: Cluster,
        wait: bool,
    ) -> Result<Cluster, ClusterError> {
        if wait {
            self.wait_until_stable(name, cluster).await
        } else {
            Ok(cluster)
        }
    }

    /// Poll `name` until its status is no longer transient.
    ///
    /// `initial` is the snapshot returned by the triggering operation. A
    /// fetch that yields no cluster and no error counts as transient.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a re-fetch or transport rebuild.
    pub async fn wait_until_stable(
        &mut self,
        name: &str,
        initial: Cluster,
    ) -> Result<Cluster, ClusterError> {
        self.pause.pause(self.policy.grace).await;
        let mut latest = Some(initial);

        loop {
            if let Some(cluster) = latest.take_if(|c| !c.status.is_transient()) {
                return Ok(cluster);
            }
            debug!(
                cluster = name,
                status = ?latest.as_ref().map(|c| &c.status),
                "waiting for cluster"
            );
            self.pause.pause(self.policy.interval).await;
            self.service.renew_transport()?;
            latest = self.service.poll(name).await?;
        }
    }
}
