use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::cache::KpiKey;
use crate::db;
use crate::domain::{AffiliateId, CreateReferral, ReferralId};
use crate::error::Error;
use crate::report::{AffiliateFilter, DateRange, ReportArgs, VisitorReport};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct VisitorsQuery {
    /// Comma-separated ids; absent or empty means every affiliate
    pub affiliate_ids: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<i64>,
    pub start: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct KpiQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: &str) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }
    }
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    (status, Json(ApiResponse::<()>::error(msg))).into_response()
}

/// Parses `"1, 2,3"` into ids. Blank entries are skipped.
pub fn parse_affiliate_ids(raw: &str) -> Result<Vec<AffiliateId>, Error> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<AffiliateId>()
                .map_err(|_| Error::InvalidAffiliate(s.to_string()))
        })
        .collect()
}

fn parse_affiliate_path(raw: &str) -> Result<AffiliateId, Response> {
    raw.parse()
        .map_err(|_| error_response(StatusCode::BAD_REQUEST, "Invalid affiliate ID"))
}

fn report_args(state: &AppState, query: VisitorsQuery) -> ReportArgs {
    ReportArgs {
        from: query.from,
        to: query.to,
        limit: Some(query.limit.unwrap_or(state.settings.default_batch_limit)),
        start: query.start,
    }
}

async fn visitors_response(
    state: &AppState,
    affiliates: AffiliateFilter,
    query: VisitorsQuery,
) -> Response {
    let args = report_args(state, query);
    let mut report = VisitorReport::new(state.pool.clone(), &state.report, affiliates, args);
    let rows = report.get_reports().await;
    debug!("Serving {} visitor rows", rows.len());
    Json(ApiResponse::success(rows)).into_response()
}

/// GET /health
pub async fn health() -> &'static str {
    "ok"
}

/// GET /api/visitors
pub async fn list_visitors(
    State(state): State<AppState>,
    Query(query): Query<VisitorsQuery>,
) -> Response {
    let ids = match query.affiliate_ids.as_deref().map(parse_affiliate_ids) {
        Some(Ok(ids)) => ids,
        Some(Err(e)) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
        None => Vec::new(),
    };

    visitors_response(&state, AffiliateFilter::from_ids(ids), query).await
}

/// GET /api/affiliates/{id}/visitors
pub async fn affiliate_visitors(
    State(state): State<AppState>,
    Path(affiliate_id): Path<String>,
    Query(query): Query<VisitorsQuery>,
) -> Response {
    let affiliate_id = match parse_affiliate_path(&affiliate_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    visitors_response(&state, affiliate_id.into(), query).await
}

/// GET /api/affiliates/{id}/kpis
pub async fn affiliate_kpis(
    State(state): State<AppState>,
    Path(affiliate_id): Path<String>,
    Query(query): Query<KpiQuery>,
) -> Response {
    let affiliate_id = match parse_affiliate_path(&affiliate_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    let filter = AffiliateFilter::from(affiliate_id);
    let range = DateRange::parse(query.from.as_deref(), query.to.as_deref());
    let key = KpiKey::new(filter.clone(), range);

    let pool = &state.pool;
    let settings = state.report.as_ref();
    let filter = &filter;
    let result = state
        .cache
        .get_or_try_insert_kpis(key, move || async move {
            db::get_visitor_kpis(pool, settings, filter, range.as_ref()).await
        })
        .await;

    match result {
        Ok(kpis) => Json(ApiResponse::success(kpis)).into_response(),
        Err(e) => {
            error!("Error computing KPIs: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to compute KPIs")
        }
    }
}

/// POST /api/referrals
pub async fn create_referral(
    State(state): State<AppState>,
    Json(input): Json<CreateReferral>,
) -> Response {
    match db::create_referral(&state.pool, &state.report, input).await {
        Ok(referral) => {
            state.cache.invalidate_kpis();
            (StatusCode::CREATED, Json(ApiResponse::success(referral))).into_response()
        }
        Err(e @ (Error::InvalidAffiliate(_) | Error::InvalidReferral(_))) => {
            error_response(StatusCode::BAD_REQUEST, &e.to_string())
        }
        Err(e) => {
            error!("Error creating referral: {}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to create referral",
            )
        }
    }
}

/// GET /api/referrals/{id}
pub async fn get_referral(
    State(state): State<AppState>,
    Path(referral_id): Path<String>,
) -> Response {
    let Ok(id) = referral_id.trim().parse::<i64>().map(ReferralId) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid referral ID");
    };

    match db::get_referral(&state.pool, &state.report, id).await {
        Ok(referral) => Json(ApiResponse::success(referral)).into_response(),
        Err(Error::ReferralNotFound) => error_response(StatusCode::NOT_FOUND, "Referral not found"),
        Err(e) => {
            error!("Error fetching referral {}: {}", id, e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch referral",
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_affiliate_ids() {
        assert_eq!(
            parse_affiliate_ids("1, 2,3").unwrap(),
            vec![AffiliateId(1), AffiliateId(2), AffiliateId(3)]
        );
    }

    #[test]
    fn test_parse_affiliate_ids_skips_blanks() {
        assert_eq!(parse_affiliate_ids("4,,5,").unwrap(), vec![AffiliateId(4), AffiliateId(5)]);
        assert!(parse_affiliate_ids("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_affiliate_ids_invalid() {
        let result = parse_affiliate_ids("1,abc");
        assert!(matches!(result, Err(Error::InvalidAffiliate(s)) if s == "abc"));
    }

    #[test]
    fn test_api_response_success() {
        let response = ApiResponse::success(vec![1, 2]);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"], serde_json::json!([1, 2]));
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_api_response_error() {
        let response = ApiResponse::<()>::error("nope");
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "nope");
        assert!(json.get("data").is_none());
    }
}
