use chrono::{DateTime, Utc};
#[cfg(all(feature = "sqlite", not(feature = "postgres")))]
use chrono::NaiveDateTime;
use sqlx::QueryBuilder;
use tracing::debug;

use crate::config::ReportSettings;
use crate::domain::{
    AffiliateId, CreateHit, CreateReferral, Hit, HitId, Medium, Referral, ReferralId,
    ReferralStatus, VisitorKpis,
};
use crate::error::{Error, Result};
use crate::report::{AffiliateFilter, DateRange};

pub mod visitors;

#[cfg(feature = "postgres")]
pub type Pool = sqlx::PgPool;
#[cfg(feature = "postgres")]
pub type PoolOptions = sqlx::postgres::PgPoolOptions;
#[cfg(feature = "postgres")]
pub type Db = sqlx::Postgres;
/// How a datetime column comes back from the store
#[cfg(feature = "postgres")]
pub(crate) type DbDateTime = DateTime<Utc>;

#[cfg(all(feature = "sqlite", not(feature = "postgres")))]
pub type Pool = sqlx::SqlitePool;
#[cfg(all(feature = "sqlite", not(feature = "postgres")))]
pub type PoolOptions = sqlx::sqlite::SqlitePoolOptions;
#[cfg(all(feature = "sqlite", not(feature = "postgres")))]
pub type Db = sqlx::Sqlite;
/// How a datetime column comes back from the store
#[cfg(all(feature = "sqlite", not(feature = "postgres")))]
pub(crate) type DbDateTime = String;

/// SQLite keeps UTC datetimes as sortable text
pub const DB_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub async fn create_pool(url: &str) -> Result<Pool> {
    let pool = PoolOptions::new().max_connections(10).connect(url).await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &Pool, settings: &ReportSettings) -> Result<()> {
    #[cfg(feature = "postgres")]
    let sql = include_str!("../../migrations/postgres/001_initial.sql");

    #[cfg(all(feature = "sqlite", not(feature = "postgres")))]
    let sql = include_str!("../../migrations/sqlite/001_initial.sql");

    let sql = sql.replace("{prefix}", &settings.table_prefix);
    sqlx::raw_sql(&sql).execute(pool).await?;

    debug!(
        "Schema ready: {} / {}",
        settings.hits_table(),
        settings.referrals_table()
    );
    Ok(())
}

#[cfg(feature = "postgres")]
pub(crate) fn to_db_datetime(dt: DateTime<Utc>) -> DbDateTime {
    dt
}

#[cfg(all(feature = "sqlite", not(feature = "postgres")))]
pub(crate) fn to_db_datetime(dt: DateTime<Utc>) -> DbDateTime {
    dt.format(DB_DATETIME_FORMAT).to_string()
}

#[cfg(feature = "postgres")]
pub(crate) fn from_db_datetime(value: DbDateTime) -> DateTime<Utc> {
    value
}

/// Unreadable values decode as the epoch rather than failing the row
#[cfg(all(feature = "sqlite", not(feature = "postgres")))]
pub(crate) fn from_db_datetime(value: DbDateTime) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(value.trim(), DB_DATETIME_FORMAT)
        .map(|dt| dt.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(value.trim()).map(|d| d.with_timezone(&Utc)))
        .unwrap_or_default()
}

// Hit queries
pub async fn get_hit(pool: &Pool, settings: &ReportSettings, id: HitId) -> Result<Hit> {
    #[cfg(feature = "postgres")]
    let sql = format!(
        r#"SELECT id, affiliate_id, datetime, ip, url, type AS medium, user_agent
           FROM {} WHERE id = $1"#,
        settings.hits_table()
    );

    #[cfg(all(feature = "sqlite", not(feature = "postgres")))]
    let sql = format!(
        r#"SELECT id, affiliate_id, datetime, ip, url, type AS medium, user_agent
           FROM {} WHERE id = ?"#,
        settings.hits_table()
    );

    let row: HitRow = sqlx::query_as(&sql)
        .bind(id.0)
        .fetch_optional(pool)
        .await?
        .ok_or(Error::HitNotFound)?;

    Ok(row.into())
}

pub async fn create_hit(pool: &Pool, settings: &ReportSettings, input: CreateHit) -> Result<Hit> {
    #[cfg(feature = "postgres")]
    let id: i64 = {
        let sql = format!(
            r#"INSERT INTO {} (affiliate_id, datetime, ip, url, type, user_agent)
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING id"#,
            settings.hits_table()
        );
        sqlx::query_scalar(&sql)
            .bind(input.affiliate_id.0)
            .bind(to_db_datetime(input.datetime))
            .bind(&input.ip)
            .bind(&input.url)
            .bind(input.medium.as_str())
            .bind(&input.user_agent)
            .fetch_one(pool)
            .await?
    };

    #[cfg(all(feature = "sqlite", not(feature = "postgres")))]
    let id: i64 = {
        let sql = format!(
            r#"INSERT INTO {} (affiliate_id, datetime, ip, url, type, user_agent)
               VALUES (?, ?, ?, ?, ?, ?)"#,
            settings.hits_table()
        );
        sqlx::query(&sql)
            .bind(input.affiliate_id.0)
            .bind(to_db_datetime(input.datetime))
            .bind(&input.ip)
            .bind(&input.url)
            .bind(input.medium.as_str())
            .bind(&input.user_agent)
            .execute(pool)
            .await?
            .last_insert_rowid()
    };

    Ok(Hit {
        id: HitId(id),
        affiliate_id: input.affiliate_id,
        datetime: input.datetime,
        medium: input.medium,
        ip: input.ip,
        url: input.url,
        user_agent: input.user_agent,
    })
}

// Referral queries
pub async fn get_referral(
    pool: &Pool,
    settings: &ReportSettings,
    id: ReferralId,
) -> Result<Referral> {
    #[cfg(feature = "postgres")]
    let sql = format!(
        r#"SELECT referral_id, affiliate_id, hit_id, type AS medium, order_id, amount,
           order_total, status, datetime
           FROM {} WHERE referral_id = $1"#,
        settings.referrals_table()
    );

    #[cfg(all(feature = "sqlite", not(feature = "postgres")))]
    let sql = format!(
        r#"SELECT referral_id, affiliate_id, hit_id, type AS medium, order_id, amount,
           order_total, status, datetime
           FROM {} WHERE referral_id = ?"#,
        settings.referrals_table()
    );

    let row: ReferralRow = sqlx::query_as(&sql)
        .bind(id.0)
        .fetch_optional(pool)
        .await?
        .ok_or(Error::ReferralNotFound)?;

    Ok(row.into())
}

/// Records a conversion. When a hit is given it must exist and belong to the
/// same affiliate, otherwise the referral could never match it.
pub async fn create_referral(
    pool: &Pool,
    settings: &ReportSettings,
    input: CreateReferral,
) -> Result<Referral> {
    if input.affiliate_id.is_none() {
        return Err(Error::InvalidAffiliate(input.affiliate_id.to_string()));
    }
    for (name, value) in [("amount", input.amount), ("order_total", input.order_total)] {
        if !value.is_finite() || value < 0.0 {
            return Err(Error::InvalidReferral(format!(
                "{name} must be a non-negative number"
            )));
        }
    }

    let hit = match input.hit_id {
        Some(hit_id) => match get_hit(pool, settings, hit_id).await {
            Ok(hit) => Some(hit),
            Err(Error::HitNotFound) => {
                return Err(Error::InvalidReferral(format!("unknown hit {hit_id}")));
            }
            Err(e) => return Err(e),
        },
        None => None,
    };

    if let Some(hit) = &hit {
        if hit.affiliate_id != input.affiliate_id {
            return Err(Error::InvalidReferral(format!(
                "hit {} belongs to affiliate {}",
                hit.id, hit.affiliate_id
            )));
        }
    }

    let medium = input
        .medium
        .or_else(|| hit.map(|h| h.medium))
        .unwrap_or_default();
    let datetime = input.datetime.unwrap_or_else(Utc::now);

    #[cfg(feature = "postgres")]
    let id: i64 = {
        let sql = format!(
            r#"INSERT INTO {} (affiliate_id, hit_id, type, order_id, amount, order_total,
               status, datetime)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               RETURNING referral_id"#,
            settings.referrals_table()
        );
        sqlx::query_scalar(&sql)
            .bind(input.affiliate_id.0)
            .bind(input.hit_id.map(|h| h.0))
            .bind(medium.as_str())
            .bind(input.order_id)
            .bind(input.amount)
            .bind(input.order_total)
            .bind(input.status.as_str())
            .bind(to_db_datetime(datetime))
            .fetch_one(pool)
            .await?
    };

    #[cfg(all(feature = "sqlite", not(feature = "postgres")))]
    let id: i64 = {
        let sql = format!(
            r#"INSERT INTO {} (affiliate_id, hit_id, type, order_id, amount, order_total,
               status, datetime)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            settings.referrals_table()
        );
        sqlx::query(&sql)
            .bind(input.affiliate_id.0)
            .bind(input.hit_id.map(|h| h.0))
            .bind(medium.as_str())
            .bind(input.order_id)
            .bind(input.amount)
            .bind(input.order_total)
            .bind(input.status.as_str())
            .bind(to_db_datetime(datetime))
            .execute(pool)
            .await?
            .last_insert_rowid()
    };

    Ok(Referral {
        id: ReferralId(id),
        affiliate_id: input.affiliate_id,
        hit_id: input.hit_id,
        medium,
        order_id: input.order_id,
        amount: input.amount,
        order_total: input.order_total,
        status: input.status,
        datetime,
    })
}

// KPI queries

/// Dashboard summary for an affiliate set. Customers and sales ignore
/// rejected and draft referrals, gross commission ignores drafts, and net
/// commission is the paid plus unpaid amount.
pub async fn get_visitor_kpis(
    pool: &Pool,
    settings: &ReportSettings,
    affiliates: &AffiliateFilter,
    range: Option<&DateRange>,
) -> Result<VisitorKpis> {
    let mut qb: QueryBuilder<'_, Db> = QueryBuilder::new("SELECT COUNT(*) FROM ");
    qb.push(settings.hits_table()).push(" AS hit WHERE ");
    visitors::push_affiliate_predicate(&mut qb, "hit", affiliates)?;
    if let Some(range) = range {
        visitors::push_datetime_range(&mut qb, "hit", range);
    }
    let visitors: i64 = qb.build_query_scalar::<i64>().fetch_one(pool).await?;

    let mut qb: QueryBuilder<'_, Db> = QueryBuilder::new(
        r#"SELECT
           COUNT(DISTINCT CASE WHEN referral.status NOT IN ('rejected', 'draft')
               THEN referral.order_id END) AS customers,
           COALESCE(SUM(CASE WHEN referral.status NOT IN ('rejected', 'draft')
               THEN referral.order_total END), 0.0) AS sales,
           COALESCE(SUM(CASE WHEN referral.status <> 'draft'
               THEN referral.amount END), 0.0) AS gross_commission,
           COALESCE(SUM(CASE WHEN referral.status IN ('paid', 'unpaid')
               THEN referral.amount END), 0.0) AS net_commission,
           COALESCE(SUM(CASE WHEN referral.status = 'paid'
               THEN referral.amount END), 0.0) AS paid_commission,
           COALESCE(SUM(CASE WHEN referral.status = 'unpaid'
               THEN referral.amount END), 0.0) AS unpaid_commission
           FROM "#,
    );
    qb.push(settings.referrals_table())
        .push(" AS referral WHERE ");
    visitors::push_affiliate_predicate(&mut qb, "referral", affiliates)?;
    if let Some(range) = range {
        visitors::push_datetime_range(&mut qb, "referral", range);
    }
    let totals = qb
        .build_query_as::<ReferralTotalsRow>()
        .fetch_one(pool)
        .await?;

    Ok(VisitorKpis::new(
        visitors,
        totals.customers,
        totals.sales,
        totals.gross_commission,
        totals.net_commission,
        totals.paid_commission,
        totals.unpaid_commission,
    ))
}

// Row types for SQLx mapping
#[derive(sqlx::FromRow)]
struct HitRow {
    id: i64,
    affiliate_id: i64,
    datetime: DbDateTime,
    ip: Option<String>,
    url: Option<String>,
    medium: Option<String>,
    user_agent: Option<String>,
}

impl From<HitRow> for Hit {
    fn from(row: HitRow) -> Self {
        Self {
            id: HitId(row.id),
            affiliate_id: AffiliateId(row.affiliate_id),
            datetime: from_db_datetime(row.datetime),
            medium: row
                .medium
                .map(|m| Medium::from_str(&m))
                .unwrap_or_default(),
            ip: row.ip,
            url: row.url.unwrap_or_default(),
            user_agent: row.user_agent,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ReferralRow {
    referral_id: i64,
    affiliate_id: i64,
    hit_id: Option<i64>,
    medium: Option<String>,
    order_id: Option<i64>,
    amount: f64,
    order_total: f64,
    status: String,
    datetime: DbDateTime,
}

impl From<ReferralRow> for Referral {
    fn from(row: ReferralRow) -> Self {
        Self {
            id: ReferralId(row.referral_id),
            affiliate_id: AffiliateId(row.affiliate_id),
            hit_id: row.hit_id.map(HitId),
            medium: row
                .medium
                .map(|m| Medium::from_str(&m))
                .unwrap_or_default(),
            order_id: row.order_id,
            amount: row.amount,
            order_total: row.order_total,
            status: ReferralStatus::from_str(&row.status).unwrap_or_default(),
            datetime: from_db_datetime(row.datetime),
        }
    }
}

#[derive(sqlx::FromRow)]
struct ReferralTotalsRow {
    customers: i64,
    sales: f64,
    gross_commission: f64,
    net_commission: f64,
    paid_commission: f64,
    unpaid_commission: f64,
}
