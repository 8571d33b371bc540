//! Command-line client for Docker Swarm cluster services.
//!
//! `carina` creates, inspects, grows, rebuilds and deletes clusters on one of
//! two backends, and downloads the TLS credentials needed to point a local
//! Docker client at a cluster.
//!
//! # Architecture
//!
//! Credentials are resolved from flags and environment variables into an
//! [`credentials::Account`], which selects the backend. A
//! [`provider::ClusterClient`] binds that backend to an authenticated
//! session, reusing tokens from the [`cache::TokenCache`] when the backend
//! still accepts them. Long-running operations can wait for the cluster to
//! settle through the [`lifecycle`] orchestrator, and downloaded credentials
//! are written and verified by [`bundle`].
//!
//! # Modules
//!
//! - [`bundle`]: Credential bundle storage and TLS verification
//! - [`cache`]: Token and update-check cache
//! - [`commands`]: Command handlers and their shared context
//! - [`config`]: Configuration system with layered precedence (CLI > env > file > defaults)
//! - [`credentials`]: Account resolution and backend detection
//! - [`error`]: Semantic error types for the application
//! - [`lifecycle`]: Waiting for clusters to settle
//! - [`output`]: Column-aligned tables
//! - [`provider`]: Backend adapters
//! - [`shell`]: Per-shell environment scripts
//! - [`update`]: Release notification

pub mod bundle;
pub mod cache;
pub mod commands;
pub mod config;
pub mod credentials;
pub mod error;
pub mod lifecycle;
pub mod output;
pub mod provider;
pub mod shell;
pub mod update;
