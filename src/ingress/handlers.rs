use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, error};

use crate::domain::{AffiliateId, Medium};
use crate::error::Error;
use crate::state::AppState;

use super::headers::{get_client_ip, get_referrer, get_user_agent};
use super::{record_visit, VisitPayload};

#[derive(Debug, Default, Deserialize)]
pub struct TrackQuery {
    pub medium: Option<String>,
    pub url: Option<String>,
}

/// GET /track/{affiliate_id}
pub async fn track_hit(
    State(state): State<AppState>,
    Path(affiliate_id): Path<String>,
    Query(query): Query<TrackQuery>,
    headers: HeaderMap,
) -> Response {
    let affiliate_id: AffiliateId = match affiliate_id.parse() {
        Ok(id) => id,
        Err(_) => {
            debug!("Rejecting hit for malformed affiliate {:?}", affiliate_id);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let payload = VisitPayload {
        medium: query
            .medium
            .as_deref()
            .map(Medium::from_str)
            .unwrap_or_default(),
        url: query.url,
    };

    match record_visit(
        &state,
        affiliate_id,
        Utc::now(),
        payload,
        get_client_ip(&headers),
        get_user_agent(&headers),
        get_referrer(&headers),
    )
    .await
    {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(Error::InvalidAffiliate(_)) => StatusCode::BAD_REQUEST.into_response(),
        Err(e) => {
            error!("Error recording hit: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
