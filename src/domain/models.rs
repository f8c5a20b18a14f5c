use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{AffiliateId, HitId, Medium, ReferralId, ReferralStatus};

/// A recorded visit. `ip` holds either a dotted/colon address or, on legacy
/// rows, a packed IPv4 integer written as decimal text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hit {
    pub id: HitId,
    pub affiliate_id: AffiliateId,
    pub datetime: DateTime<Utc>,
    pub medium: Medium,
    pub ip: Option<String>,
    pub url: String,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Referral {
    pub id: ReferralId,
    pub affiliate_id: AffiliateId,
    pub hit_id: Option<HitId>,
    pub medium: Medium,
    pub order_id: Option<i64>,
    pub amount: f64,
    pub order_total: f64,
    pub status: ReferralStatus,
    pub datetime: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateHit {
    pub affiliate_id: AffiliateId,
    pub datetime: DateTime<Utc>,
    pub medium: Medium,
    pub ip: Option<String>,
    pub url: String,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateReferral {
    pub affiliate_id: AffiliateId,
    pub hit_id: Option<HitId>,
    /// Falls back to the hit's medium, then to `link`
    pub medium: Option<Medium>,
    pub order_id: Option<i64>,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub order_total: f64,
    #[serde(default)]
    pub status: ReferralStatus,
    #[serde(default)]
    pub datetime: Option<DateTime<Utc>>,
}

/// Display-ready projection of a hit, as served to dashboards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRow {
    pub id: HitId,
    pub datetime: String,
    pub referring_url: String,
    pub medium: String,
    pub ip: String,
    pub is_converted: bool,
    pub user_agent: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisitorKpis {
    pub visitors: i64,
    pub customers: i64,
    /// Percentage of visitors that became customers, two decimals
    pub conversion_rate: f64,
    pub sales: f64,
    pub gross_commission: f64,
    pub net_commission: f64,
    pub paid_commission: f64,
    pub unpaid_commission: f64,
}

impl VisitorKpis {
    pub fn new(
        visitors: i64,
        customers: i64,
        sales: f64,
        gross_commission: f64,
        net_commission: f64,
        paid_commission: f64,
        unpaid_commission: f64,
    ) -> Self {
        Self {
            visitors,
            customers,
            conversion_rate: conversion_rate(customers, visitors),
            sales,
            gross_commission,
            net_commission,
            paid_commission,
            unpaid_commission,
        }
    }
}

pub fn conversion_rate(customers: i64, visitors: i64) -> f64 {
    if visitors <= 0 {
        return 0.0;
    }
    ((customers as f64 * 100.0 / visitors as f64) * 100.0).round() / 100.0
}
