use std::sync::Arc;

use crate::cache::AppCache;
use crate::config::{ReportSettings, Settings};
use crate::db::Pool;

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub cache: AppCache,
    pub settings: Arc<Settings>,
    pub report: Arc<ReportSettings>,
}

impl AppState {
    pub fn new(pool: Pool, cache: AppCache, settings: Settings, report: ReportSettings) -> Self {
        Self {
            pool,
            cache,
            settings: Arc::new(settings),
            report: Arc::new(report),
        }
    }
}
