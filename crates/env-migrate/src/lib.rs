//! # env-migrate
//!
//! One-shot environment migration for a content-managed site.
//!
//! Clones the relational schema and data of a source deployment into a
//! target deployment while re-homing every media asset referenced by URL
//! inside table rows:
//!
//! - **Schema provisioning** with ordered fallback strategies
//! - **Column reconciliation** for destination tables that drifted behind
//! - **Sequential row copy** with destination-type-aware serialization
//! - **Asset relocation** between media hosts with a run-scoped cache
//!
//! The source deployment is never written to: all source interactions are
//! catalog introspection, `SELECT` queries and asset `GET` requests.
//!
//! ## Example
//!
//! ```rust,no_run
//! use env_migrate::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), env_migrate::MigrateError> {
//!     let config = Config::from_env()?;
//!     let report = Orchestrator::new(config).await?.run().await?;
//!     println!("Copied {} rows", report.rows_written);
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod media;
pub mod orchestrator;
pub mod provision;
pub mod reconcile;
pub mod replicate;
pub mod rewrite;
pub mod value;

// Re-exports for convenient access
pub use config::{Config, EndpointConfig, MediaConfig};
pub use error::{MigrateError, Result};
pub use media::{AssetMigrator, AssetUrlPattern, MediaClient};
pub use orchestrator::{Orchestrator, RunReport, TableReport};
