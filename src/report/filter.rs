//! Normalizes report construction arguments into query-ready predicates.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::domain::AffiliateId;

/// Above this many ids the list is bound as a single array parameter
/// instead of one placeholder per id.
pub const MAX_INLINE_AFFILIATE_IDS: usize = 500;

/// Batch size used when none (or a non-positive one) is given
pub const DEFAULT_LIMIT: i64 = 1;

/// Which affiliates' hits a report covers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum AffiliateFilter {
    /// Every real affiliate; queried as `affiliate_id != 0`
    #[default]
    All,
    Single(AffiliateId),
    Many(Vec<AffiliateId>),
}

impl AffiliateFilter {
    /// Dedupes while keeping first-seen order. One id collapses to `Single`,
    /// none to `All`.
    pub fn from_ids(ids: impl IntoIterator<Item = AffiliateId>) -> Self {
        let mut unique: Vec<AffiliateId> = Vec::new();
        for id in ids {
            if !unique.contains(&id) {
                unique.push(id);
            }
        }

        match unique.len() {
            0 => Self::All,
            1 => Self::Single(unique[0]),
            _ => Self::Many(unique),
        }
    }

    pub fn ids(&self) -> &[AffiliateId] {
        match self {
            Self::All => &[],
            Self::Single(id) => std::slice::from_ref(id),
            Self::Many(ids) => ids,
        }
    }

    /// Whether the id list is too long to inline as separate placeholders
    pub fn needs_array_binding(&self) -> bool {
        matches!(self, Self::Many(ids) if ids.len() > MAX_INLINE_AFFILIATE_IDS)
    }
}

impl From<AffiliateId> for AffiliateFilter {
    fn from(id: AffiliateId) -> Self {
        Self::Single(id)
    }
}

impl From<Vec<AffiliateId>> for AffiliateFilter {
    fn from(ids: Vec<AffiliateId>) -> Self {
        Self::from_ids(ids)
    }
}

impl From<&[AffiliateId]> for AffiliateFilter {
    fn from(ids: &[AffiliateId]) -> Self {
        Self::from_ids(ids.iter().copied())
    }
}

/// Raw, unvalidated report arguments as a caller supplies them
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportArgs {
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<i64>,
    pub start: Option<i64>,
}

/// Inclusive UTC range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DateRange {
    /// Both ends must be present and parseable, otherwise no range applies.
    /// Bounds are taken literally: a reversed range matches nothing.
    pub fn parse(from: Option<&str>, to: Option<&str>) -> Option<Self> {
        let from = from.filter(|s| !s.trim().is_empty())?;
        let to = to.filter(|s| !s.trim().is_empty())?;

        let (Some(from_dt), Some(to_dt)) = (parse_datetime(from), parse_datetime(to)) else {
            debug!("Ignoring unparseable date range from={:?} to={:?}", from, to);
            return None;
        };

        if from_dt > to_dt {
            debug!("Date range is reversed, from={} to={}", from_dt, to_dt);
        }
        Some(Self {
            from: from_dt,
            to: to_dt,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pagination {
    pub limit: i64,
    pub start: i64,
}

impl Pagination {
    pub fn new(limit: Option<i64>, start: Option<i64>) -> Self {
        Self {
            limit: limit.filter(|&l| l > 0).unwrap_or(DEFAULT_LIMIT),
            start: start.unwrap_or(0).max(0),
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Everything the visitor query needs, already normalized
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VisitorQuery {
    pub affiliates: AffiliateFilter,
    pub date_range: Option<DateRange>,
    pub pagination: Pagination,
}

impl VisitorQuery {
    pub fn resolve(affiliates: AffiliateFilter, args: &ReportArgs) -> Self {
        Self {
            affiliates,
            date_range: DateRange::parse(args.from.as_deref(), args.to.as_deref()),
            pagination: Pagination::new(args.limit, args.start),
        }
    }
}

/// Parses a date or datetime string as UTC. Supports:
/// - RFC 3339 (2024-01-19T15:30:00Z)
/// - YYYY-MM-DD HH:MM:SS and YYYY-MM-DDTHH:MM:SS
/// - datetime-local (YYYY-MM-DDTHH:MM)
/// - date-only (YYYY-MM-DD), as midnight
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt.and_utc());
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()?
        .and_hms_opt(0, 0, 0)
        .map(|t| t.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    #[test]
    fn test_from_ids_empty_means_all() {
        assert_eq!(AffiliateFilter::from_ids(Vec::new()), AffiliateFilter::All);
    }

    #[test]
    fn test_from_ids_single() {
        let filter = AffiliateFilter::from_ids([AffiliateId(7)]);
        assert_eq!(filter, AffiliateFilter::Single(AffiliateId(7)));
        assert_eq!(filter.ids(), &[AffiliateId(7)]);
    }

    #[test]
    fn test_from_ids_dedupes_preserving_order() {
        let filter = AffiliateFilter::from_ids([
            AffiliateId(3),
            AffiliateId(1),
            AffiliateId(3),
            AffiliateId(2),
        ]);
        assert_eq!(
            filter,
            AffiliateFilter::Many(vec![AffiliateId(3), AffiliateId(1), AffiliateId(2)])
        );
    }

    #[test]
    fn test_from_ids_duplicates_collapse_to_single() {
        let filter = AffiliateFilter::from_ids([AffiliateId(4), AffiliateId(4)]);
        assert_eq!(filter, AffiliateFilter::Single(AffiliateId(4)));
    }

    #[test]
    fn test_needs_array_binding_threshold() {
        let inline: Vec<AffiliateId> = (1..=MAX_INLINE_AFFILIATE_IDS as i64)
            .map(AffiliateId)
            .collect();
        assert!(!AffiliateFilter::from(inline).needs_array_binding());

        let large: Vec<AffiliateId> = (1..=MAX_INLINE_AFFILIATE_IDS as i64 + 1)
            .map(AffiliateId)
            .collect();
        assert!(AffiliateFilter::from(large).needs_array_binding());

        assert!(!AffiliateFilter::All.needs_array_binding());
    }

    #[test]
    fn test_pagination_defaults() {
        let p = Pagination::new(None, None);
        assert_eq!(p.limit, 1);
        assert_eq!(p.start, 0);
    }

    #[test]
    fn test_pagination_non_positive_limit_falls_back() {
        assert_eq!(Pagination::new(Some(0), None).limit, 1);
        assert_eq!(Pagination::new(Some(-5), None).limit, 1);
        assert_eq!(Pagination::new(Some(25), Some(50)).limit, 25);
    }

    #[test]
    fn test_pagination_negative_start_clamps() {
        assert_eq!(Pagination::new(Some(10), Some(-10)).start, 0);
        assert_eq!(Pagination::new(Some(10), Some(30)).start, 30);
    }

    #[test]
    fn test_parse_datetime_formats() {
        assert_eq!(
            parse_datetime("2024-01-19T15:30:00Z"),
            Some(utc(2024, 1, 19, 15, 30, 0))
        );
        assert_eq!(
            parse_datetime("2024-01-19T17:30:00+02:00"),
            Some(utc(2024, 1, 19, 15, 30, 0))
        );
        assert_eq!(
            parse_datetime("2024-01-19 15:30:05"),
            Some(utc(2024, 1, 19, 15, 30, 5))
        );
        assert_eq!(
            parse_datetime("2024-01-19T15:30"),
            Some(utc(2024, 1, 19, 15, 30, 0))
        );
    }

    #[test]
    fn test_parse_datetime_date_only_is_midnight() {
        assert_eq!(parse_datetime("2024-01-19"), Some(utc(2024, 1, 19, 0, 0, 0)));
    }

    #[test]
    fn test_parse_datetime_invalid() {
        assert!(parse_datetime("yesterday").is_none());
        assert!(parse_datetime("2024-13-40").is_none());
    }

    #[test]
    fn test_date_range_requires_both_ends() {
        assert!(DateRange::parse(Some("2024-01-01"), None).is_none());
        assert!(DateRange::parse(None, Some("2024-01-31")).is_none());
        assert!(DateRange::parse(Some(""), Some("2024-01-31")).is_none());
    }

    #[test]
    fn test_date_range_unparseable_is_ignored() {
        assert!(DateRange::parse(Some("soon"), Some("2024-01-31")).is_none());
    }

    #[test]
    fn test_date_range_bounds_are_literal() {
        let range = DateRange::parse(Some("2024-01-01"), Some("2024-01-31")).unwrap();
        assert_eq!(range.from, utc(2024, 1, 1, 0, 0, 0));
        assert_eq!(range.to, utc(2024, 1, 31, 0, 0, 0));
    }

    #[test]
    fn test_date_range_keeps_reversed_bounds() {
        let range = DateRange::parse(Some("2024-02-01 00:00:00"), Some("2024-01-01 00:00:00"))
            .unwrap();
        assert_eq!(range.from, utc(2024, 2, 1, 0, 0, 0));
        assert_eq!(range.to, utc(2024, 1, 1, 0, 0, 0));
    }

    #[test]
    fn test_resolve() {
        let args = ReportArgs {
            from: Some("2024-01-01".to_string()),
            to: Some("2024-01-31".to_string()),
            limit: Some(10),
            start: Some(20),
        };
        let query = VisitorQuery::resolve(AffiliateId(5).into(), &args);
        assert_eq!(query.affiliates, AffiliateFilter::Single(AffiliateId(5)));
        assert!(query.date_range.is_some());
        assert_eq!(query.pagination, Pagination { limit: 10, start: 20 });
    }

    #[test]
    fn test_resolve_without_args() {
        let query = VisitorQuery::resolve(AffiliateFilter::All, &ReportArgs::default());
        assert!(query.date_range.is_none());
        assert_eq!(query.pagination, Pagination { limit: 1, start: 0 });
    }
}
