use chrono::{DateTime, Utc};
use tracing::debug;

use crate::db;
use crate::domain::{AffiliateId, CreateHit, Hit, Medium};
use crate::error::{Error, Result};
use crate::state::AppState;

#[derive(Debug, Default)]
pub struct VisitPayload {
    pub medium: Medium,
    /// Explicit landing referrer; wins over the `Referer` header
    pub url: Option<String>,
}

/// Records one tracked visit for an affiliate
pub async fn record_visit(
    state: &AppState,
    affiliate_id: AffiliateId,
    time: DateTime<Utc>,
    payload: VisitPayload,
    ip: Option<String>,
    user_agent: Option<String>,
    referrer: String,
) -> Result<Hit> {
    if affiliate_id.is_none() {
        return Err(Error::InvalidAffiliate(affiliate_id.to_string()));
    }

    let url = payload
        .url
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .unwrap_or(referrer);

    let hit = db::create_hit(
        &state.pool,
        &state.report,
        CreateHit {
            affiliate_id,
            datetime: time,
            medium: payload.medium,
            ip,
            url,
            user_agent,
        },
    )
    .await?;

    debug!(
        "Recorded hit {} for affiliate {} via {}",
        hit.id,
        affiliate_id,
        hit.medium.as_str()
    );
    Ok(hit)
}
