//! Command handlers.
//!
//! Every handler receives the [`Context`] built once per process. The
//! context owns the resolved account, the selected backend and the token
//! cache, so that no handler touches process-wide state directly.

use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use mockable::Env;
use tracing::debug;

use crate::bundle::{self, remove_bundle_dir};
use crate::cache::{TokenCache, authenticate_cached};
use crate::config::{
    AppConfig, AutoscaleArgs, ClusterArgs, Commands, CreateArgs, CredentialsArgs, EnvArgs,
    GrowArgs, RemoveArgs, WaitArgs,
};
use crate::credentials::{Account, AccountResolver, CredentialInputs};
use crate::error::{CarinaError, Result};
use crate::lifecycle::{Orchestrator, TokioPause, WaitPolicy};
use crate::output;
use crate::provider::{ClusterClient, Provider};
use crate::shell::Shell;
use crate::update;

/// Process-wide state shared by the command handlers.
#[derive(Debug)]
pub struct Context<E: Env> {
    config: AppConfig,
    env: E,
    account: Account,
    provider: Provider,
    cache: Option<TokenCache>,
    wait_policy: WaitPolicy,
}

impl<E: Env> Context<E> {
    /// Resolve the account and open the token cache when caching is on.
    ///
    /// # Errors
    ///
    /// Returns an error when credentials are incomplete, or when the cache
    /// location cannot be determined or read.
    pub fn new(config: AppConfig, inputs: &CredentialInputs, env: E) -> Result<Self> {
        let account =
            AccountResolver::new(&env, &config.make_swarm.endpoint).resolve(inputs)?;
        let provider = Provider::for_account(&account, &config.make_swarm);
        let cache = if config.cache {
            Some(TokenCache::load(&config.cache_file()?)?)
        } else {
            debug!("token cache disabled");
            None
        };

        Ok(Self {
            config,
            env,
            account,
            provider,
            cache,
            wait_policy: WaitPolicy::default(),
        })
    }

    /// Replace the pauses used by `--wait`.
    #[must_use]
    pub fn with_wait_policy(mut self, policy: WaitPolicy) -> Self {
        self.wait_policy = policy;
        self
    }

    /// The resolved account.
    #[must_use]
    pub const fn account(&self) -> &Account {
        &self.account
    }

    /// The token cache, when caching is enabled.
    #[must_use]
    pub const fn cache(&self) -> Option<&TokenCache> {
        self.cache.as_ref()
    }

    /// Authenticate and bind the backend to the new session.
    async fn connect(&mut self) -> Result<ClusterClient> {
        let session =
            authenticate_cached(self.cache.as_mut(), &self.provider, &self.account).await?;
        Ok(ClusterClient::new(self.provider.clone(), session))
    }

    /// The credentials directory for `cluster`, honouring `--path`.
    ///
    /// # Errors
    ///
    /// Returns an error when no credentials root can be determined.
    pub fn bundle_dir(&self, path: Option<&Utf8Path>, cluster: &str) -> Result<Utf8PathBuf> {
        match path {
            Some(dir) => Ok(dir.to_path_buf()),
            None => Ok(bundle::bundle_dir(
                &self.config.credentials_root()?,
                self.account.username(),
                cluster,
            )),
        }
    }

    /// The requested shell, or the one named by `SHELL`.
    #[must_use]
    pub fn shell(&self, requested: Option<Shell>) -> Shell {
        requested.unwrap_or_else(|| Shell::detect(self.env.string("SHELL").as_deref()))
    }

    /// Run the update check when it is enabled and the cache is in use.
    pub async fn check_for_update(&mut self) -> Option<String> {
        if !self.config.update_check {
            return None;
        }
        let cache = self.cache.as_mut()?;
        update::check_for_update(
            cache,
            &self.config.update.releases_url,
            env!("CARGO_PKG_VERSION"),
            Utc::now(),
        )
        .await
    }

    /// Write the token cache.
    ///
    /// # Errors
    ///
    /// Returns `FilesystemError` when the cache cannot be written.
    pub fn finish(mut self) -> Result<()> {
        if let Some(cache) = self.cache.as_mut() {
            cache.flush()?;
        }
        Ok(())
    }
}

/// Dispatch `command`, writing its output to `out`.
///
/// # Errors
///
/// Propagates the first error raised by the command.
pub async fn run<E, W>(ctx: &mut Context<E>, command: &Commands, out: &mut W) -> Result<()>
where
    E: Env,
    W: Write + ?Sized,
{
    match command {
        Commands::Create(args) => create(ctx, args, out).await,
        Commands::Get(args) => get(ctx, args, out).await,
        Commands::Ls => list(ctx, out).await,
        Commands::Grow(args) => grow(ctx, args, out).await,
        Commands::Autoscale(args) => autoscale(ctx, args, out).await,
        Commands::Credentials(args) => credentials(ctx, args, out).await,
        Commands::Env(args) => env(ctx, args, out).await,
        Commands::Rebuild(args) => rebuild(ctx, args, out).await,
        Commands::Rm(args) => remove(ctx, args, out).await,
        Commands::Quotas => quotas(ctx, out).await,
    }
}

async fn create<E: Env, W: Write + ?Sized>(
    ctx: &mut Context<E>,
    args: &CreateArgs,
    out: &mut W,
) -> Result<()> {
    let mut client = ctx.connect().await?;
    let cluster = Orchestrator::new(&mut client, &TokioPause, ctx.wait_policy)
        .create(&args.name, args.nodes, args.autoscale, args.wait)
        .await?;
    output::write_cluster(out, &cluster)?;
    Ok(())
}

async fn get<E: Env, W: Write + ?Sized>(
    ctx: &mut Context<E>,
    args: &ClusterArgs,
    out: &mut W,
) -> Result<()> {
    let cluster = ctx.connect().await?.get(&args.name).await?;
    output::write_cluster(out, &cluster)?;
    Ok(())
}

async fn list<E: Env, W: Write + ?Sized>(ctx: &mut Context<E>, out: &mut W) -> Result<()> {
    let clusters = ctx.connect().await?.list().await?;
    output::write_clusters(out, &clusters)?;
    Ok(())
}

async fn grow<E: Env, W: Write + ?Sized>(
    ctx: &mut Context<E>,
    args: &GrowArgs,
    out: &mut W,
) -> Result<()> {
    let cluster = ctx.connect().await?.grow(&args.name, args.by).await?;
    output::write_cluster(out, &cluster)?;
    Ok(())
}

async fn autoscale<E: Env, W: Write + ?Sized>(
    ctx: &mut Context<E>,
    args: &AutoscaleArgs,
    out: &mut W,
) -> Result<()> {
    let cluster = ctx
        .connect()
        .await?
        .set_autoscale(&args.name, args.autoscale.enabled())
        .await?;
    output::write_cluster(out, &cluster)?;
    Ok(())
}

async fn credentials<E: Env, W: Write + ?Sized>(
    ctx: &mut Context<E>,
    args: &CredentialsArgs,
    out: &mut W,
) -> Result<()> {
    let dir = ctx.bundle_dir(args.path.as_deref(), &args.name)?;
    let bundle = ctx.connect().await?.download_credentials(&args.name).await?;
    bundle.materialize(&dir)?;

    if !args.silent {
        let shell = ctx.shell(None);
        writeln!(out, "{} Credentials written to \"{dir}\"", shell.comment())?;
        writeln!(out, "{}", shell.source_command(&shell.script_path(&dir)))?;
        writeln!(out, "{}", shell.next_steps(&args.name))?;
    }
    Ok(())
}

async fn env<E: Env, W: Write + ?Sized>(
    ctx: &mut Context<E>,
    args: &EnvArgs,
    out: &mut W,
) -> Result<()> {
    let shell = ctx.shell(args.shell);
    let dir = ctx.bundle_dir(args.path.as_deref(), &args.name)?;
    let script = shell.script_path(&dir);

    let usable = script.exists()
        && match bundle::verify(&dir).await {
            Ok(()) => true,
            Err(error) => {
                debug!(%error, "local credentials failed verification");
                false
            }
        };
    if !usable {
        let bundle = ctx.connect().await?.download_credentials(&args.name).await?;
        bundle.materialize(&dir)?;
    }

    writeln!(out, "{}", shell.source_help(&script, &args.name))?;
    Ok(())
}

async fn rebuild<E: Env, W: Write + ?Sized>(
    ctx: &mut Context<E>,
    args: &WaitArgs,
    out: &mut W,
) -> Result<()> {
    let mut client = ctx.connect().await?;
    let cluster = Orchestrator::new(&mut client, &TokioPause, ctx.wait_policy)
        .rebuild(&args.name, args.wait)
        .await?;
    output::write_cluster(out, &cluster)?;
    Ok(())
}

async fn remove<E: Env, W: Write + ?Sized>(
    ctx: &mut Context<E>,
    args: &RemoveArgs,
    out: &mut W,
) -> Result<()> {
    let dir = ctx.bundle_dir(args.path.as_deref(), &args.name)?;
    let cluster = ctx.connect().await?.delete(&args.name).await?;
    output::write_cluster(out, &cluster)?;

    let removed =
        remove_bundle_dir(&dir).map_err(|source| CarinaError::CredentialsRetained {
            name: args.name.clone(),
            source,
        })?;
    debug!(path = %dir, removed, "local credentials cleaned up");
    Ok(())
}

async fn quotas<E: Env, W: Write + ?Sized>(ctx: &mut Context<E>, out: &mut W) -> Result<()> {
    let quotas = ctx.connect().await?.quotas().await?;
    output::write_quotas(out, &quotas)?;
    Ok(())
}
