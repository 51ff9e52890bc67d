use std::ops::ControlFlow;

use crate::app::{ErrorCollector, Result};
use crate::domain::{PagemonitorPage, UserPagemonitor};
use crate::store::keys;
use crate::store::Database;

impl Database {
    pub fn get_page(&self, config: &UserPagemonitor) -> Result<Option<PagemonitorPage>> {
        let page: Option<PagemonitorPage> = self.get_json(&config.encode_key())?;
        Ok(page.map(|mut page| {
            page.config = config.clone();
            page
        }))
    }

    /// Stored pages for `configs`, skipping pages never fetched.
    pub fn get_pages(&self, configs: &[UserPagemonitor]) -> Result<Vec<PagemonitorPage>> {
        let mut pages = Vec::with_capacity(configs.len());
        for config in configs {
            if let Some(page) = self.get_page(config)? {
                pages.push(page);
            }
        }
        Ok(pages)
    }

    /// Touches the page's last-seen stamp and writes it unless its contents,
    /// delta and update time are unchanged.
    pub fn save_page(&self, page: &PagemonitorPage) -> Result<()> {
        let key = page.config.encode_key();
        let last_seen_key = keys::last_seen_key(&key);
        let now = self.now();

        self.in_transaction(&[key.clone(), last_seen_key], |tx| {
            let previous = match tx.get(&key)? {
                Some(raw) => serde_json::from_slice::<PagemonitorPage>(&raw)
                    .map_err(|e| tracing::warn!("Overwriting unreadable page {}: {}", page.config.url, e))
                    .ok(),
                None => None,
            };

            self.touch_last_seen(tx, &key, now)?;

            if !matches!(&previous, Some(previous) if previous.same_content(page)) {
                tx.put(key.clone(), serde_json::to_vec(page)?);
            }
            Ok(())
        })
    }

    /// Compares `contents` with the stored page and records the change, all
    /// under the page's lock. A page never stored before counts as changed.
    /// Touches the last-seen stamp either way and returns whether the
    /// contents changed.
    pub fn update_page(&self, config: &UserPagemonitor, contents: String) -> Result<bool> {
        let key = config.encode_key();
        let last_seen_key = keys::last_seen_key(&key);
        let now = self.now();

        self.in_transaction(&[key.clone(), last_seen_key], |tx| {
            let previous = match tx.get(&key)? {
                Some(raw) => serde_json::from_slice::<PagemonitorPage>(&raw)
                    .map_err(|e| tracing::warn!("Overwriting unreadable page {}: {}", config.url, e))
                    .ok(),
                None => None,
            };

            self.touch_last_seen(tx, &key, now)?;

            let changed = previous.as_ref().map_or(true, |p| p.contents != contents);
            if changed {
                let mut page = previous.unwrap_or_else(|| PagemonitorPage::new(config.clone()));
                page.record_change(contents, now);
                tx.put(key.clone(), serde_json::to_vec(&page)?);
            }
            Ok(changed)
        })
    }

    /// Visits every stored page until `visitor` breaks. Page titles are not
    /// stored with the page and come back empty.
    pub fn read_all_pages<F>(&self, mut visitor: F) -> Result<()>
    where
        F: FnMut(PagemonitorPage) -> ControlFlow<()>,
    {
        let mut errors = ErrorCollector::new();
        for (key, value) in self.kv.scan_prefix(&keys::namespace(keys::PAGEMONITOR))? {
            let page = UserPagemonitor::decode_key(&key).and_then(|config| {
                let mut page: PagemonitorPage = serde_json::from_slice(&value)?;
                page.config = config;
                Ok(page)
            });
            if let Some(page) = errors.record(page) {
                if visitor(page).is_break() {
                    break;
                }
            }
        }
        errors.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::{counted_db, start_time};
    use chrono::Duration;
    use std::sync::Arc;
    use std::thread;

    fn config(url: &str, match_pattern: &str) -> UserPagemonitor {
        let mut config = UserPagemonitor::new(url);
        config.match_pattern = match_pattern.into();
        config.title = "Title".into();
        config
    }

    #[test]
    fn test_save_and_get_page() {
        let db = Database::in_memory().unwrap();
        let mut page = PagemonitorPage::new(config("http://site1", "m1"));
        page.contents = "hello".into();
        page.updated = Some(start_time());
        db.save_page(&page).unwrap();

        let loaded = db.get_page(&page.config).unwrap().unwrap();
        assert_eq!(loaded, page);

        // Same url with another match pattern is a different page.
        assert!(db.get_page(&config("http://site1", "m2")).unwrap().is_none());
        assert_eq!(
            db.get_pages(&[config("http://site1", "m2"), page.config.clone()])
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_unchanged_page_only_touches_last_seen() {
        let (db, kv, clock) = counted_db();
        let mut page = PagemonitorPage::new(config("http://site1", ""));
        page.contents = "hello".into();
        page.updated = Some(start_time());
        let key = page.config.encode_key();

        db.save_page(&page).unwrap();
        assert_eq!(kv.writes_to(&key), 1);

        clock.advance(Duration::days(8));
        db.save_page(&page).unwrap();
        assert_eq!(kv.writes_to(&key), 1);
        assert_eq!(kv.writes_to(&keys::last_seen_key(&key)), 2);

        page.contents = "changed".into();
        db.save_page(&page).unwrap();
        assert_eq!(kv.writes_to(&key), 2);
    }

    #[test]
    fn test_read_all_pages() {
        let db = Database::in_memory().unwrap();
        for url in ["http://site1", "http://site2"] {
            db.save_page(&PagemonitorPage::new(config(url, "m"))).unwrap();
        }

        let mut urls = Vec::new();
        db.read_all_pages(|page| {
            assert_eq!(page.config.title, "");
            urls.push(page.config.url);
            ControlFlow::Continue(())
        })
        .unwrap();
        assert_eq!(urls, vec!["http://site1", "http://site2"]);
    }

    #[test]
    fn test_update_page_records_change() {
        let (db, kv, clock) = counted_db();
        let config = config("http://site1", "");
        let key = config.encode_key();

        assert!(db.update_page(&config, "v1\n".into()).unwrap());
        let first = db.get_page(&config).unwrap().unwrap();
        assert_eq!(first.contents, "v1\n");
        assert_eq!(first.updated, Some(start_time()));

        clock.advance(Duration::hours(1));
        assert!(!db.update_page(&config, "v1\n".into()).unwrap());
        assert_eq!(kv.writes_to(&key), 1);

        assert!(db.update_page(&config, "v2\n".into()).unwrap());
        let second = db.get_page(&config).unwrap().unwrap();
        assert_eq!(second.updated, Some(start_time() + Duration::hours(1)));
        assert!(second.delta.contains("-v1"));
        assert!(second.delta.contains("+v2"));
    }

    #[test]
    fn test_overlapping_updates_see_one_change() {
        let db = Arc::new(Database::in_memory().unwrap());
        let config = config("http://site1", "");
        db.update_page(&config, "v1\n".into()).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = db.clone();
                let config = config.clone();
                thread::spawn(move || db.update_page(&config, "v2\n".into()).unwrap())
            })
            .collect();
        let changed = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|changed| *changed)
            .count();
        assert_eq!(changed, 1);

        let page = db.get_page(&config).unwrap().unwrap();
        assert_eq!(page.contents, "v2\n");
        assert!(page.delta.contains("-v1"));
    }
}
