//! Store configuration, read from defaults, an optional file, and
//! `FACTLOG_` environment overrides.

use config::{Config, Environment, File};

use crate::error::Result;
use crate::persist::PersistenceMode;
use crate::resolve::UpsertPolicy;

/// Strings at least this long are interned even when their attribute is
/// not fulltext-indexed.
pub const DEFAULT_FULLTEXT_THRESHOLD: usize = 256;

#[derive(Clone, Debug)]
pub struct Settings {
    /// Path of the SQLite database file; in-memory when absent.
    pub database_path: Option<String>,
    pub fulltext_threshold: usize,
    /// Whether commits append to the tamper-evident ledger.
    pub ledger: bool,
    /// Whether two tempids may upsert to the same existing entity.
    pub allow_upsert_convergence: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: None,
            fulltext_threshold: DEFAULT_FULLTEXT_THRESHOLD,
            ledger: true,
            allow_upsert_convergence: false,
        }
    }
}

impl Settings {
    /// Layered load: defaults, then the given file (if any), then
    /// `FACTLOG_`-prefixed environment variables.
    pub fn load(file: Option<&str>) -> Result<Settings> {
        let mut builder = Config::builder()
            .set_default("fulltext_threshold", DEFAULT_FULLTEXT_THRESHOLD as i64)?
            .set_default("ledger", true)?
            .set_default("allow_upsert_convergence", false)?;
        if let Some(file) = file {
            builder = builder.add_source(File::with_name(file));
        }
        let config = builder
            .add_source(Environment::with_prefix("FACTLOG"))
            .build()?;
        Ok(Settings {
            database_path: config.get_string("database_path").ok(),
            fulltext_threshold: config.get_int("fulltext_threshold")? as usize,
            ledger: config.get_bool("ledger")?,
            allow_upsert_convergence: config.get_bool("allow_upsert_convergence")?,
        })
    }

    pub fn persistence_mode(&self) -> PersistenceMode {
        match &self.database_path {
            Some(path) => PersistenceMode::File(path.clone()),
            None => PersistenceMode::InMemory,
        }
    }

    pub fn upsert_policy(&self) -> UpsertPolicy {
        if self.allow_upsert_convergence {
            UpsertPolicy::AllowConvergence
        } else {
            UpsertPolicy::RejectConvergence
        }
    }
}
