use std::fmt;

use chrono::{DateTime, FixedOffset, Utc};
use chrono_tz::Tz;
use config::{Config, Environment};
use regex::Regex;
use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub database_url: Option<String>,
    pub database_path: Option<String>,

    #[serde(default = "default_table_prefix")]
    pub table_prefix: String,

    /// Site display timezone: an IANA name or a fixed `±HH:MM` offset
    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default = "default_batch_limit")]
    pub default_batch_limit: i64,

    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: u64,

    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_table_prefix() -> String {
    "wp_".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_batch_limit() -> i64 {
    20
}

fn default_cache_max_entries() -> u64 {
    10000
}

fn default_cache_ttl() -> u64 {
    300
}

impl Settings {
    pub fn new() -> std::result::Result<Self, config::ConfigError> {
        let _ = dotenvy::dotenv();

        let config = Config::builder()
            .add_source(
                Environment::with_prefix("AFWC")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validated settings handed to the report engine and the database layer
    pub fn report_settings(&self) -> Result<ReportSettings> {
        ReportSettings::new(&self.timezone, &self.table_prefix)
    }
}

/// Zone hit timestamps are displayed in. Sites configure either a named
/// zone or a bare UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteTimezone {
    Named(Tz),
    Offset(FixedOffset),
}

impl SiteTimezone {
    /// Tries an IANA name first, then an offset such as `+05:30`
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if let Ok(tz) = value.parse::<Tz>() {
            return Some(Self::Named(tz));
        }
        value.parse::<FixedOffset>().ok().map(Self::Offset)
    }

    pub fn format(&self, dt: DateTime<Utc>) -> String {
        match self {
            Self::Named(tz) => crate::report::format_site_datetime(dt, tz),
            Self::Offset(offset) => crate::report::format_site_datetime(dt, offset),
        }
    }
}

impl From<Tz> for SiteTimezone {
    fn from(tz: Tz) -> Self {
        Self::Named(tz)
    }
}

impl From<FixedOffset> for SiteTimezone {
    fn from(offset: FixedOffset) -> Self {
        Self::Offset(offset)
    }
}

impl fmt::Display for SiteTimezone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(tz) => write!(f, "{}", tz.name()),
            Self::Offset(offset) => write!(f, "{offset}"),
        }
    }
}

/// Site-wide values the report engine needs, injected at construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSettings {
    pub timezone: SiteTimezone,
    pub table_prefix: String,
}

impl ReportSettings {
    pub fn new(timezone: &str, table_prefix: &str) -> Result<Self> {
        let timezone = SiteTimezone::parse(timezone)
            .ok_or_else(|| Error::InvalidTimezone(timezone.to_string()))?;

        // The prefix is spliced into SQL, so it must stay an identifier
        let valid_prefix = Regex::new(r"^[A-Za-z0-9_]{0,64}$")?;
        if !valid_prefix.is_match(table_prefix) {
            return Err(Error::InvalidTablePrefix(table_prefix.to_string()));
        }

        Ok(Self {
            timezone,
            table_prefix: table_prefix.to_string(),
        })
    }

    pub fn hits_table(&self) -> String {
        format!("{}afwc_hits", self.table_prefix)
    }

    pub fn referrals_table(&self) -> String {
        format!("{}afwc_referrals", self.table_prefix)
    }
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            timezone: SiteTimezone::Named(Tz::UTC),
            table_prefix: default_table_prefix(),
        }
    }
}
