//! Request-scoped visitor reports.
//!
//! A [`VisitorReport`] is built with an affiliate set and raw filter
//! arguments, loads its page of hits on first use and answers every later
//! question from that cached page.

mod filter;
mod rows;

pub use filter::{
    parse_datetime, AffiliateFilter, DateRange, Pagination, ReportArgs, VisitorQuery,
    DEFAULT_LIMIT, MAX_INLINE_AFFILIATE_IDS,
};
pub use rows::{
    decode_ip, format_site_datetime, sanitize_url, VisitorRow, VisitorRows, SITE_DATETIME_FORMAT,
};

use tracing::{debug, warn};

use crate::config::ReportSettings;
use crate::db::{self, Pool};
use crate::domain::{HitId, ReportRow};

pub struct VisitorReport {
    pool: Pool,
    settings: ReportSettings,
    query: VisitorQuery,
    rows: Option<VisitorRows>,
    queries_issued: u32,
}

impl VisitorReport {
    pub fn new(
        pool: Pool,
        settings: &ReportSettings,
        affiliates: impl Into<AffiliateFilter>,
        args: ReportArgs,
    ) -> Self {
        let query = VisitorQuery::resolve(affiliates.into(), &args);
        Self {
            pool,
            settings: settings.clone(),
            query,
            rows: None,
            queries_issued: 0,
        }
    }

    pub fn query(&self) -> &VisitorQuery {
        &self.query
    }

    /// Loads the page if it has not been loaded yet. Runs the query at most
    /// once per instance; a failed or empty load still counts as loaded.
    pub async fn ensure_loaded(&mut self) -> &VisitorRows {
        if self.rows.is_none() {
            self.queries_issued += 1;
            let rows = match db::visitors::fetch_visitor_records(
                &self.pool,
                &self.settings,
                &self.query,
            )
            .await
            {
                Ok(records) => VisitorRows::from_records(records, self.settings.timezone),
                Err(e) => {
                    warn!("Visitor report query failed: {}", e);
                    VisitorRows::default()
                }
            };
            debug!("Loaded {} visitor rows", rows.len());
            self.rows = Some(rows);
        }

        self.rows.get_or_insert_with(VisitorRows::default)
    }

    pub fn is_loaded(&self) -> bool {
        self.rows.is_some()
    }

    pub fn queries_issued(&self) -> u32 {
        self.queries_issued
    }

    /// The raw cached mapping from hit id to row
    pub async fn get_data(&mut self) -> &VisitorRows {
        self.ensure_loaded().await
    }

    pub async fn get_reports(&mut self) -> Vec<ReportRow> {
        self.ensure_loaded().await.reports()
    }

    pub async fn get_date_time(&mut self, hit_id: HitId) -> String {
        if !hit_id.is_valid() {
            return String::new();
        }
        self.ensure_loaded().await.date_time(hit_id)
    }

    pub async fn get_referring_url(&mut self, hit_id: HitId) -> String {
        if !hit_id.is_valid() {
            return String::new();
        }
        self.ensure_loaded().await.referring_url(hit_id)
    }

    pub async fn get_medium(&mut self, hit_id: HitId) -> String {
        if !hit_id.is_valid() {
            return String::new();
        }
        self.ensure_loaded().await.medium(hit_id)
    }

    pub async fn get_ip(&mut self, hit_id: HitId) -> String {
        if !hit_id.is_valid() {
            return String::new();
        }
        self.ensure_loaded().await.ip(hit_id)
    }

    pub async fn get_user_agent(&mut self, hit_id: HitId) -> String {
        if !hit_id.is_valid() {
            return String::new();
        }
        self.ensure_loaded().await.user_agent(hit_id)
    }

    pub async fn is_converted(&mut self, hit_id: HitId) -> bool {
        if !hit_id.is_valid() {
            return false;
        }
        self.ensure_loaded().await.is_converted(hit_id)
    }
}

#[cfg(all(test, feature = "sqlite", not(feature = "postgres")))]
mod tests {
    use super::*;
    use crate::domain::AffiliateId;

    async fn empty_pool() -> (Pool, ReportSettings) {
        let pool = db::create_pool("sqlite::memory:").await.unwrap();
        let settings = ReportSettings::default();
        db::run_migrations(&pool, &settings).await.unwrap();
        (pool, settings)
    }

    #[tokio::test]
    async fn test_new_does_not_query() {
        let (pool, settings) = empty_pool().await;
        let report = VisitorReport::new(pool, &settings, AffiliateId(1), ReportArgs::default());
        assert!(!report.is_loaded());
        assert_eq!(report.queries_issued(), 0);
        assert_eq!(report.query().pagination.limit, DEFAULT_LIMIT);
    }

    #[tokio::test]
    async fn test_empty_result_is_loaded_once() {
        let (pool, settings) = empty_pool().await;
        let mut report =
            VisitorReport::new(pool, &settings, AffiliateId(1), ReportArgs::default());

        assert!(report.get_reports().await.is_empty());
        assert!(report.get_reports().await.is_empty());
        assert_eq!(report.get_medium(HitId(1)).await, "");
        assert!(report.is_loaded());
        assert_eq!(report.queries_issued(), 1);
    }

    #[tokio::test]
    async fn test_invalid_hit_id_skips_load() {
        let (pool, settings) = empty_pool().await;
        let mut report =
            VisitorReport::new(pool, &settings, AffiliateId(1), ReportArgs::default());

        assert_eq!(report.get_date_time(HitId(0)).await, "");
        assert!(!report.is_converted(HitId(-1)).await);
        assert!(!report.is_loaded());
        assert_eq!(report.queries_issued(), 0);
    }

    #[tokio::test]
    async fn test_query_failure_is_absorbed() {
        let pool = db::create_pool("sqlite::memory:").await.unwrap();
        // No migrations: the tables do not exist
        let mut report = VisitorReport::new(
            pool,
            &ReportSettings::default(),
            AffiliateFilter::All,
            ReportArgs::default(),
        );

        assert!(report.get_reports().await.is_empty());
        assert_eq!(report.get_ip(HitId(1)).await, "");
        assert_eq!(report.queries_issued(), 1);
    }
}
