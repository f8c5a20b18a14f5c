//! Cached visitor rows and the display normalization applied on the way out.

use chrono::{DateTime, TimeZone, Utc};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::net::Ipv4Addr;
use url::Url;

use crate::config::SiteTimezone;
use crate::db::visitors::VisitorRecord;
use crate::domain::{HitId, Medium, ReportRow};

/// `d-M-Y H:i:s`, e.g. `05-Mar-2024 14:07:09`
pub const SITE_DATETIME_FORMAT: &str = "%d-%b-%Y %H:%M:%S";

const ALLOWED_URL_SCHEMES: &[&str] = &[
    "http", "https", "ftp", "ftps", "mailto", "news", "irc", "irc6", "ircs", "gopher", "nntp",
    "feed", "telnet", "mms", "rtsp", "sms", "svn", "tel", "fax", "xmpp", "webcal", "urn",
];

/// One hit as held in the report cache. The datetime is already site-local;
/// the other fields are stored as read and normalized by the accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitorRow {
    pub date_time: String,
    pub url: String,
    pub medium: String,
    pub ip: String,
    pub user_agent: String,
    pub is_converted: bool,
}

impl VisitorRow {
    fn from_record(record: VisitorRecord, tz: &SiteTimezone) -> Self {
        Self {
            date_time: tz.format(record.datetime),
            url: record.url,
            medium: record.medium,
            ip: record.ip,
            user_agent: record.user_agent,
            is_converted: record.is_converted,
        }
    }

    pub fn referring_url(&self) -> String {
        sanitize_url(&self.url)
    }

    pub fn medium_label(&self) -> String {
        if self.medium.is_empty() {
            return String::new();
        }
        Medium::from_str(&self.medium).label().to_string()
    }

    pub fn display_ip(&self) -> String {
        decode_ip(&self.ip)
    }

    fn to_report(&self, id: HitId) -> ReportRow {
        ReportRow {
            id,
            datetime: self.date_time.clone(),
            referring_url: self.referring_url(),
            medium: self.medium_label(),
            ip: self.display_ip(),
            is_converted: self.is_converted,
            user_agent: self.user_agent.clone(),
        }
    }
}

/// Hit id to row, unique per id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisitorRows {
    rows: BTreeMap<HitId, VisitorRow>,
}

impl VisitorRows {
    /// Rows without a positive hit id are dropped. On a repeated id the first
    /// row read wins.
    pub fn from_records(records: Vec<VisitorRecord>, tz: impl Into<SiteTimezone>) -> Self {
        let tz = tz.into();
        let mut rows = BTreeMap::new();
        for record in records {
            if !record.id.is_valid() {
                continue;
            }
            let id = record.id;
            rows.entry(id)
                .or_insert_with(|| VisitorRow::from_record(record, &tz));
        }
        Self { rows }
    }

    pub fn get(&self, id: HitId) -> Option<&VisitorRow> {
        self.rows.get(&id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn date_time(&self, id: HitId) -> String {
        self.get(id).map(|r| r.date_time.clone()).unwrap_or_default()
    }

    pub fn referring_url(&self, id: HitId) -> String {
        self.get(id).map(VisitorRow::referring_url).unwrap_or_default()
    }

    pub fn medium(&self, id: HitId) -> String {
        self.get(id).map(VisitorRow::medium_label).unwrap_or_default()
    }

    pub fn ip(&self, id: HitId) -> String {
        self.get(id).map(VisitorRow::display_ip).unwrap_or_default()
    }

    pub fn user_agent(&self, id: HitId) -> String {
        self.get(id).map(|r| r.user_agent.clone()).unwrap_or_default()
    }

    pub fn is_converted(&self, id: HitId) -> bool {
        self.get(id).is_some_and(|r| r.is_converted)
    }

    /// All rows, newest hit first
    pub fn reports(&self) -> Vec<ReportRow> {
        self.rows
            .iter()
            .rev()
            .map(|(id, row)| row.to_report(*id))
            .collect()
    }
}

pub fn format_site_datetime<Z>(dt: DateTime<Utc>, tz: &Z) -> String
where
    Z: TimeZone,
    Z::Offset: Display,
{
    dt.with_timezone(tz).format(SITE_DATETIME_FORMAT).to_string()
}

/// Legacy rows store IPv4 as a packed integer in decimal text
pub fn decode_ip(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() || raw == "0" {
        return String::new();
    }

    if raw.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(packed) = raw.parse::<u32>() {
            return Ipv4Addr::from(packed).to_string();
        }
    }

    raw.to_string()
}

/// Cleans a stored URL for output. Inner spaces are percent-encoded and
/// control characters dropped. Scheme-less values get `http://`, relative
/// references pass through, anything with a disallowed scheme becomes empty.
pub fn sanitize_url(raw: &str) -> String {
    let mut cleaned = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        match c {
            ' ' => cleaned.push_str("%20"),
            c if c.is_control() => {}
            c => cleaned.push(c),
        }
    }

    if cleaned.is_empty() {
        return String::new();
    }

    if cleaned.starts_with('/') || cleaned.starts_with('#') || cleaned.starts_with('?') {
        return cleaned;
    }

    let candidate = if cleaned.contains(':') {
        cleaned
    } else {
        format!("http://{cleaned}")
    };

    match Url::parse(&candidate) {
        Ok(url) if ALLOWED_URL_SCHEMES.contains(&url.scheme()) => candidate,
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use chrono_tz::Tz;

    fn record(id: i64, medium: &str, ip: &str, is_converted: bool) -> VisitorRecord {
        VisitorRecord {
            id: HitId(id),
            medium: medium.to_string(),
            ip: ip.to_string(),
            url: "https://blog.example.com/post".to_string(),
            user_agent: "Mozilla/5.0".to_string(),
            datetime: Utc.with_ymd_and_hms(2024, 3, 5, 13, 7, 9).unwrap(),
            is_converted,
        }
    }

    #[test]
    fn test_decode_ip_packed_legacy_value() {
        assert_eq!(decode_ip("16777343"), "1.0.0.127");
        assert_eq!(decode_ip("3232235777"), "192.168.1.1");
    }

    #[test]
    fn test_decode_ip_passes_strings_through() {
        assert_eq!(decode_ip("203.0.113.5"), "203.0.113.5");
        assert_eq!(decode_ip("2001:db8::1"), "2001:db8::1");
    }

    #[test]
    fn test_decode_ip_empty_values() {
        assert_eq!(decode_ip(""), "");
        assert_eq!(decode_ip("0"), "");
    }

    #[test]
    fn test_decode_ip_out_of_range_number_is_kept() {
        assert_eq!(decode_ip("99999999999"), "99999999999");
    }

    #[test]
    fn test_sanitize_url_allowed_schemes() {
        assert_eq!(
            sanitize_url("https://example.com/a?b=1"),
            "https://example.com/a?b=1"
        );
        assert_eq!(sanitize_url("mailto:someone@example.com"), "mailto:someone@example.com");
    }

    #[test]
    fn test_sanitize_url_adds_scheme() {
        assert_eq!(sanitize_url("example.com/page"), "http://example.com/page");
    }

    #[test]
    fn test_sanitize_url_rejects_bad_scheme() {
        assert_eq!(sanitize_url("javascript:alert(1)"), "");
        assert_eq!(sanitize_url("data:text/html,hi"), "");
    }

    #[test]
    fn test_sanitize_url_encodes_spaces_and_drops_controls() {
        assert_eq!(
            sanitize_url("  https://example.com/\npa ge "),
            "https://example.com/pa%20ge"
        );
        assert_eq!(sanitize_url("example.com/a b"), "http://example.com/a%20b");
        assert_eq!(sanitize_url("   "), "");
    }

    #[test]
    fn test_sanitize_url_relative_passthrough() {
        assert_eq!(sanitize_url("/shop/?ref=3"), "/shop/?ref=3");
    }

    #[test]
    fn test_format_site_datetime_converts_timezone() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 5, 13, 7, 9).unwrap();
        assert_eq!(format_site_datetime(dt, &Tz::UTC), "05-Mar-2024 13:07:09");
        assert_eq!(
            format_site_datetime(dt, &chrono_tz::Europe::Berlin),
            "05-Mar-2024 14:07:09"
        );
        assert_eq!(
            format_site_datetime(dt, &chrono_tz::America::New_York),
            "05-Mar-2024 08:07:09"
        );
    }

    #[test]
    fn test_format_site_datetime_fixed_offset() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 5, 13, 7, 9).unwrap();
        let offset = FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap();
        assert_eq!(format_site_datetime(dt, &offset), "05-Mar-2024 18:37:09");

        let rows = VisitorRows::from_records(vec![record(1, "link", "", false)], offset);
        assert_eq!(rows.date_time(HitId(1)), "05-Mar-2024 18:37:09");
    }

    #[test]
    fn test_rows_drop_invalid_ids() {
        let rows = VisitorRows::from_records(
            vec![record(0, "link", "", false), record(3, "link", "", false)],
            Tz::UTC,
        );
        assert_eq!(rows.len(), 1);
        assert!(rows.get(HitId(0)).is_none());
        assert_eq!(rows.date_time(HitId(0)), "");
    }

    #[test]
    fn test_rows_first_duplicate_wins() {
        let rows = VisitorRows::from_records(
            vec![record(5, "link", "", true), record(5, "coupon", "", false)],
            Tz::UTC,
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows.medium(HitId(5)), "Link");
        assert!(rows.is_converted(HitId(5)));
    }

    #[test]
    fn test_rows_accessors_normalize() {
        let rows = VisitorRows::from_records(
            vec![
                record(1, "coupon", "16777343", false),
                record(2, "Banner", "203.0.113.5", true),
            ],
            chrono_tz::Europe::Berlin,
        );

        assert_eq!(rows.medium(HitId(1)), "Coupon");
        assert_eq!(rows.medium(HitId(2)), "banner");
        assert_eq!(rows.ip(HitId(1)), "1.0.0.127");
        assert_eq!(rows.ip(HitId(2)), "203.0.113.5");
        assert_eq!(rows.date_time(HitId(1)), "05-Mar-2024 14:07:09");
        assert_eq!(rows.referring_url(HitId(2)), "https://blog.example.com/post");
        assert_eq!(rows.user_agent(HitId(2)), "Mozilla/5.0");
        assert!(!rows.is_converted(HitId(1)));
        assert!(rows.is_converted(HitId(2)));
    }

    #[test]
    fn test_rows_missing_id_defaults() {
        let rows = VisitorRows::from_records(vec![record(1, "link", "", false)], Tz::UTC);
        let missing = HitId(99);
        assert_eq!(rows.date_time(missing), "");
        assert_eq!(rows.referring_url(missing), "");
        assert_eq!(rows.medium(missing), "");
        assert_eq!(rows.ip(missing), "");
        assert_eq!(rows.user_agent(missing), "");
        assert!(!rows.is_converted(missing));
    }

    #[test]
    fn test_empty_medium_stays_empty() {
        let rows = VisitorRows::from_records(vec![record(1, "", "", false)], Tz::UTC);
        assert_eq!(rows.medium(HitId(1)), "");
    }

    #[test]
    fn test_reports_newest_first() {
        let rows = VisitorRows::from_records(
            vec![
                record(2, "link", "", false),
                record(9, "link", "", false),
                record(4, "coupon", "", true),
            ],
            Tz::UTC,
        );
        let ids: Vec<i64> = rows.reports().iter().map(|r| r.id.0).collect();
        assert_eq!(ids, vec![9, 4, 2]);
    }
}
