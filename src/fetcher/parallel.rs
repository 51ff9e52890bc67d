use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Semaphore;

use crate::app::{NanorssError, Result};
use crate::domain::{FetchStatus, User, UserPagemonitor};
use crate::fetcher::Fetcher;
use crate::normalizer::Normalizer;
use crate::store::keys;
use crate::store::Store;

pub const DEFAULT_WORKERS: usize = 10;

/// Outcome counts of a refresh pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RefreshReport {
    pub succeeded: usize,
    pub failed: usize,
    /// Pages whose filtered text changed.
    pub changed_pages: usize,
}

impl RefreshReport {
    fn absorb(&mut self, other: RefreshReport) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.changed_pages += other.changed_pages;
    }
}

#[derive(Clone)]
pub struct ParallelFetcher {
    fetcher: Arc<dyn Fetcher + Send + Sync>,
    normalizer: Normalizer,
    semaphore: Arc<Semaphore>,
}

enum Subject {
    Feed(String),
    Page(UserPagemonitor),
}

enum Outcome {
    Feed,
    Page { changed: bool },
}

impl ParallelFetcher {
    pub fn new(fetcher: Arc<dyn Fetcher + Send + Sync>) -> Self {
        Self::with_workers(fetcher, DEFAULT_WORKERS)
    }

    pub fn with_workers(fetcher: Arc<dyn Fetcher + Send + Sync>, workers: usize) -> Self {
        Self {
            fetcher,
            normalizer: Normalizer::new(),
            semaphore: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Refreshes the subscriptions of every user, one user at a time.
    pub async fn refresh(&self, store: Arc<dyn Store>) -> Result<RefreshReport> {
        let users = store.read_all_users()?;
        let mut report = RefreshReport::default();
        for user in &users {
            report.absorb(self.refresh_user(store.clone(), user).await);
        }
        tracing::info!(
            "Refreshed {} users: {} succeeded, {} failed, {} pages changed",
            users.len(),
            report.succeeded,
            report.failed,
            report.changed_pages
        );
        Ok(report)
    }

    /// Fetches every feed and page of `user` concurrently and waits for all of
    /// them.
    pub async fn refresh_user(&self, store: Arc<dyn Store>, user: &User) -> RefreshReport {
        let mut subjects = Vec::new();
        match user.feeds() {
            Ok(feeds) => subjects.extend(feeds.into_iter().map(|f| Subject::Feed(f.url))),
            Err(e) => tracing::warn!("Skipping OPML of {}: {}", user.username, e),
        }
        match user.pages() {
            Ok(pages) => subjects.extend(pages.into_iter().map(Subject::Page)),
            Err(e) => tracing::warn!("Skipping pagemonitor of {}: {}", user.username, e),
        }

        let mut handles = Vec::with_capacity(subjects.len());
        for subject in subjects {
            let fetcher = self.fetcher.clone();
            let normalizer = self.normalizer.clone();
            let semaphore = self.semaphore.clone();
            let store = store.clone();

            let handle = tokio::spawn(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|e| NanorssError::Other(e.to_string()))?;
                match subject {
                    Subject::Feed(url) => refresh_feed(&*fetcher, &normalizer, &*store, &url).await,
                    Subject::Page(config) => {
                        refresh_page(&*fetcher, &normalizer, &*store, &config).await
                    }
                }
            });
            handles.push(handle);
        }

        let mut report = RefreshReport::default();
        for result in join_all(handles).await {
            match result {
                Ok(Ok(Outcome::Feed)) => report.succeeded += 1,
                Ok(Ok(Outcome::Page { changed })) => {
                    report.succeeded += 1;
                    if changed {
                        report.changed_pages += 1;
                    }
                }
                Ok(Err(e)) => {
                    tracing::warn!("Refresh failed for {}: {}", user.username, e);
                    report.failed += 1;
                }
                Err(e) => {
                    tracing::error!("Task join error: {}", e);
                    report.failed += 1;
                }
            }
        }
        report
    }
}

async fn refresh_feed(
    fetcher: &(dyn Fetcher + Send + Sync),
    normalizer: &Normalizer,
    store: &dyn Store,
    url: &str,
) -> Result<Outcome> {
    let result = async {
        let body = fetcher.fetch(url).await?;
        let items = normalizer.normalize_feed(url, &body, store.now())?;
        store.save_feeditems(&items)?;
        tracing::debug!("Saved {} items from {}", items.len(), url);
        Ok(Outcome::Feed)
    }
    .await;

    record_status(store, &keys::feed_key(url), &result)?;
    result
}

async fn refresh_page(
    fetcher: &(dyn Fetcher + Send + Sync),
    normalizer: &Normalizer,
    store: &dyn Store,
    config: &UserPagemonitor,
) -> Result<Outcome> {
    let key = config.encode_key();
    let result = async {
        let body = fetcher.fetch(&config.url).await?;
        let contents = normalizer.filter_page(config, &body)?;

        let changed = store.update_page(config, contents)?;
        if changed {
            tracing::info!("Page {} changed", config.url);
            store.set_read_status_for_all(&key, false)?;
        }
        Ok(Outcome::Page { changed })
    }
    .await;

    record_status(store, &key, &result)?;
    result
}

fn record_status<T>(store: &dyn Store, subject: &[u8], result: &Result<T>) -> Result<()> {
    let now = store.now();
    let status = match result {
        Ok(_) => FetchStatus::success(now),
        Err(_) => FetchStatus::failure(now),
    };
    store.set_fetch_status(subject, &status)
}
