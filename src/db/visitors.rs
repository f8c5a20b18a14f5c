//! The joined hit/referral query behind visitor reports.

use chrono::{DateTime, Utc};
use sqlx::QueryBuilder;
use tracing::debug;

use super::{from_db_datetime, to_db_datetime, Db, DbDateTime, Pool};
use crate::config::ReportSettings;
use crate::domain::{AffiliateId, HitId};
use crate::error::Result;
use crate::report::{AffiliateFilter, DateRange, VisitorQuery};

/// A hit as read for reporting, with its conversion flag already joined in.
/// Text columns that are NULL in the store come back empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitorRecord {
    pub id: HitId,
    pub medium: String,
    pub ip: String,
    pub url: String,
    pub user_agent: String,
    pub datetime: DateTime<Utc>,
    pub is_converted: bool,
}

/// Runs the single report query: hits for the affiliate set, left-joined to
/// referrals on `(hit_id, affiliate_id, type)`, newest first, one page.
pub async fn fetch_visitor_records(
    pool: &Pool,
    settings: &ReportSettings,
    query: &VisitorQuery,
) -> Result<Vec<VisitorRecord>> {
    let mut qb: QueryBuilder<'_, Db> = QueryBuilder::new(
        r#"SELECT DISTINCT hit.id AS id,
           COALESCE(hit.type, '') AS medium,
           COALESCE(hit.ip, '') AS ip,
           COALESCE(hit.url, '') AS url,
           COALESCE(hit.user_agent, '') AS user_agent,
           hit.datetime AS datetime,
           CASE WHEN referral.hit_id IS NULL THEN 0 ELSE 1 END AS is_converted
           FROM "#,
    );
    qb.push(settings.hits_table())
        .push(" AS hit LEFT JOIN ")
        .push(settings.referrals_table())
        .push(
            r#" AS referral ON (hit.id = referral.hit_id
               AND hit.affiliate_id = referral.affiliate_id
               AND hit.type = referral.type)
               WHERE "#,
        );

    push_affiliate_predicate(&mut qb, "hit", &query.affiliates)?;
    if let Some(range) = &query.date_range {
        push_datetime_range(&mut qb, "hit", range);
    }

    qb.push(" ORDER BY hit.id DESC LIMIT ")
        .push_bind(query.pagination.limit)
        .push(" OFFSET ")
        .push_bind(query.pagination.start);

    debug!("Visitor query: {}", qb.sql());

    let rows = qb
        .build_query_as::<VisitorRecordRow>()
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

/// Appends the affiliate condition for `alias`. Short id lists become one
/// placeholder each; long ones travel as a single array parameter.
pub(crate) fn push_affiliate_predicate(
    qb: &mut QueryBuilder<'_, Db>,
    alias: &str,
    filter: &AffiliateFilter,
) -> Result<()> {
    qb.push(alias);
    match filter {
        AffiliateFilter::All => {
            qb.push(".affiliate_id <> ").push_bind(AffiliateId::NONE.0);
        }
        AffiliateFilter::Single(id) => {
            qb.push(".affiliate_id = ").push_bind(id.0);
        }
        AffiliateFilter::Many(ids) if filter.needs_array_binding() => {
            push_affiliate_array(qb, ids)?;
        }
        AffiliateFilter::Many(ids) => {
            qb.push(".affiliate_id IN (");
            let mut list = qb.separated(", ");
            for id in ids {
                list.push_bind(id.0);
            }
            list.push_unseparated(")");
        }
    }
    Ok(())
}

#[cfg(feature = "postgres")]
fn push_affiliate_array(qb: &mut QueryBuilder<'_, Db>, ids: &[AffiliateId]) -> Result<()> {
    let ids: Vec<i64> = ids.iter().map(|id| id.0).collect();
    qb.push(".affiliate_id = ANY(").push_bind(ids).push(")");
    Ok(())
}

#[cfg(all(feature = "sqlite", not(feature = "postgres")))]
fn push_affiliate_array(qb: &mut QueryBuilder<'_, Db>, ids: &[AffiliateId]) -> Result<()> {
    let ids = serde_json::to_string(ids)?;
    qb.push(".affiliate_id IN (SELECT value FROM json_each(")
        .push_bind(ids)
        .push("))");
    Ok(())
}

/// Appends an inclusive `BETWEEN` on `alias.datetime`
pub(crate) fn push_datetime_range(qb: &mut QueryBuilder<'_, Db>, alias: &str, range: &DateRange) {
    qb.push(" AND ")
        .push(alias)
        .push(".datetime BETWEEN ")
        .push_bind(to_db_datetime(range.from))
        .push(" AND ")
        .push_bind(to_db_datetime(range.to));
}

#[derive(sqlx::FromRow)]
struct VisitorRecordRow {
    id: i64,
    medium: String,
    ip: String,
    url: String,
    user_agent: String,
    datetime: DbDateTime,
    is_converted: i32,
}

impl From<VisitorRecordRow> for VisitorRecord {
    fn from(row: VisitorRecordRow) -> Self {
        Self {
            id: HitId(row.id),
            medium: row.medium,
            ip: row.ip,
            url: row.url,
            user_agent: row.user_agent,
            datetime: from_db_datetime(row.datetime),
            is_converted: row.is_converted != 0,
        }
    }
}
