use std::path::Path;
use std::sync::Arc;

use crate::app::error::Result;
use crate::config::Config;
use crate::fetcher::http_fetcher::HttpFetcher;
use crate::fetcher::parallel::ParallelFetcher;
use crate::fetcher::Fetcher;
use crate::store::{Database, Store, StoreConfig};

/// Everything a command, the worker or the HTTP server needs.
pub struct AppContext {
    pub config: Config,
    pub store: Arc<Database>,
    pub parallel_fetcher: ParallelFetcher,
}

impl AppContext {
    /// Loads the configuration and opens the store it points at.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        Self::new(Config::load(config_path)?)
    }

    pub fn new(config: Config) -> Result<Self> {
        let store = Database::open(
            &config.database_dir,
            StoreConfig::with_ttl_days(config.item_ttl_days),
        )?;
        let fetcher: Arc<dyn Fetcher + Send + Sync> = Arc::new(HttpFetcher::new()?);
        Ok(Self::with_parts(config, Arc::new(store), fetcher))
    }

    pub fn in_memory() -> Result<Self> {
        let fetcher: Arc<dyn Fetcher + Send + Sync> = Arc::new(HttpFetcher::new()?);
        Ok(Self::with_parts(
            Config::default(),
            Arc::new(Database::in_memory()?),
            fetcher,
        ))
    }

    pub fn with_parts(
        config: Config,
        store: Arc<Database>,
        fetcher: Arc<dyn Fetcher + Send + Sync>,
    ) -> Self {
        let parallel_fetcher = ParallelFetcher::with_workers(fetcher, config.fetch_workers);
        Self {
            config,
            store,
            parallel_fetcher,
        }
    }

    /// The store as seen by the fetcher.
    pub fn store_handle(&self) -> Arc<dyn Store> {
        self.store.clone()
    }
}
