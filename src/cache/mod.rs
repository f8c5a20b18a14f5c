use moka::future::Cache;
use std::time::Duration;

use crate::config::Settings;
use crate::domain::VisitorKpis;
use crate::error::Result;
use crate::report::{AffiliateFilter, DateRange};

/// A KPI summary is identified by the normalized filter it was computed for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KpiKey {
    pub affiliates: AffiliateFilter,
    pub range: Option<DateRange>,
}

impl KpiKey {
    pub fn new(affiliates: AffiliateFilter, range: Option<DateRange>) -> Self {
        Self { affiliates, range }
    }
}

#[derive(Clone)]
pub struct AppCache {
    /// Dashboard KPI summaries (filter -> totals)
    pub kpis: Cache<KpiKey, VisitorKpis>,
}

impl AppCache {
    pub fn new(settings: &Settings) -> Self {
        Self {
            kpis: Cache::builder()
                .max_capacity(settings.cache_max_entries)
                .time_to_live(Duration::from_secs(settings.cache_ttl_secs))
                .build(),
        }
    }

    /// Get cached KPIs or compute and store them. Errors are not cached.
    pub async fn get_or_try_insert_kpis<F, Fut>(&self, key: KpiKey, f: F) -> Result<VisitorKpis>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<VisitorKpis>>,
    {
        if let Some(kpis) = self.kpis.get(&key).await {
            return Ok(kpis);
        }

        let kpis = f().await?;
        self.kpis.insert(key, kpis.clone()).await;
        Ok(kpis)
    }

    /// Drop every cached summary; referral totals changed
    pub fn invalidate_kpis(&self) {
        self.kpis.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AffiliateId;
    use crate::error::Error;

    fn test_settings() -> Settings {
        Settings {
            host: "0.0.0.0".to_string(),
            port: 8080,
            database_url: None,
            database_path: None,
            table_prefix: "wp_".to_string(),
            timezone: "UTC".to_string(),
            default_batch_limit: 20,
            cache_max_entries: 100,
            cache_ttl_secs: 60,
        }
    }

    fn key(id: i64) -> KpiKey {
        KpiKey::new(AffiliateId(id).into(), None)
    }

    #[tokio::test]
    async fn test_cache_creation() {
        let cache = AppCache::new(&test_settings());
        assert!(cache.kpis.get(&key(1)).await.is_none());
    }

    #[tokio::test]
    async fn test_get_or_try_insert_kpis_caches() {
        let cache = AppCache::new(&test_settings());

        let first = cache
            .get_or_try_insert_kpis(key(1), || async {
                Ok(VisitorKpis::new(10, 1, 50.0, 5.0, 5.0, 5.0, 0.0))
            })
            .await
            .unwrap();
        assert_eq!(first.visitors, 10);

        // Second call should return the cached value without invoking the closure
        let second = cache
            .get_or_try_insert_kpis(key(1), || async {
                Ok(VisitorKpis::new(99, 9, 0.0, 0.0, 0.0, 0.0, 0.0))
            })
            .await
            .unwrap();
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache = AppCache::new(&test_settings());

        let result = cache
            .get_or_try_insert_kpis(key(2), || async {
                Err(Error::Internal("boom".to_string()))
            })
            .await;
        assert!(result.is_err());
        assert!(cache.kpis.get(&key(2)).await.is_none());
    }

    #[tokio::test]
    async fn test_keys_distinguish_filters() {
        let cache = AppCache::new(&test_settings());
        cache.kpis.insert(key(1), VisitorKpis::default()).await;

        assert!(cache.kpis.get(&key(1)).await.is_some());
        assert!(cache.kpis.get(&key(3)).await.is_none());
        let all = KpiKey::new(AffiliateFilter::All, None);
        assert!(cache.kpis.get(&all).await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_kpis() {
        let cache = AppCache::new(&test_settings());
        cache.kpis.insert(key(1), VisitorKpis::default()).await;

        cache.invalidate_kpis();
        cache.kpis.run_pending_tasks().await;

        assert!(cache.kpis.get(&key(1)).await.is_none());
    }
}
