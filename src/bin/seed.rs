//! Synthetic data seeder for affiliate visitor reports
//!
//! Creates affiliates with hits spread over the last N days (weighted toward
//! recent), a share of legacy rows with packed-integer IPs, a few untracked
//! hits under affiliate 0 and referrals for a share of the hits.
//!
//! # Usage
//!
//! ```bash
//! # Seed a database (default: seed.db)
//! cargo run --release --bin seed
//!
//! # Custom sizes
//! cargo run --release --bin seed -- --db ./bench.db --affiliates 50 --hits 20000 --days 90
//!
//! # Then start the server with this database:
//! AFWC__DATABASE_PATH=./seed.db cargo run --release
//! ```

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand_distr::{Distribution, Exp};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::error::Error;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

use affiliate_visitors::config::ReportSettings;
use affiliate_visitors::db::DB_DATETIME_FORMAT;

const LANDING_REFERRERS: &[&str] = &[
    "",
    "",
    "https://www.google.com/search?q=best+running+shoes",
    "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
    "https://www.instagram.com/p/abc123/",
    "https://twitter.com/someone/status/123",
    "https://www.reddit.com/r/BuyItForLife/",
    "https://blog.example.com/gear-review",
    "https://newsletter.example.org/issue-42",
    "example.net/coupons",
    "javascript:alert(1)",
];

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_2 like Mac OS X) AppleWebKit/605.1.15 Mobile/15E148",
    "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 Mobile Safari/537.36",
];

const MEDIUMS: &[&str] = &["link", "link", "link", "coupon", "coupon", "banner"];

const STATUSES: &[&str] = &["paid", "paid", "unpaid", "unpaid", "unpaid", "rejected", "draft"];

struct SeedOptions {
    db_path: PathBuf,
    table_prefix: String,
    affiliates: i64,
    hits_per_affiliate: u64,
    days_back: u32,
    conversion: f64,
}

impl Default for SeedOptions {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("seed.db"),
            table_prefix: "wp_".to_string(),
            affiliates: 10,
            hits_per_affiliate: 5_000,
            days_back: 30,
            conversion: 0.04,
        }
    }
}

/// IPv4 with some subnet clustering
fn random_ip(rng: &mut impl Rng) -> Ipv4Addr {
    let subnets: [[u8; 3]; 6] = [
        [203, 0, 113],
        [198, 51, 100],
        [192, 0, 2],
        [45, 33, 12],
        [104, 236, 8],
        [159, 89, 40],
    ];
    let [a, b, c] = subnets[rng.random_range(0..subnets.len())];
    Ipv4Addr::new(a, b, c, rng.random_range(1..255))
}

/// A datetime within the last N days, weighted toward recent
fn random_recent_datetime(rng: &mut impl Rng, exp: &Exp<f64>, max_ms: i64) -> DateTime<Utc> {
    let offset_ms = (exp.sample(rng) as i64).min(max_ms);
    Utc::now() - Duration::milliseconds(offset_ms)
}

fn pick<'a>(rng: &mut impl Rng, items: &[&'a str]) -> &'a str {
    items[rng.random_range(0..items.len())]
}

async fn create_pool(db_path: &str) -> Result<Pool<Sqlite>, Box<dyn Error>> {
    let options = SqliteConnectOptions::from_str(db_path)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal);

    Ok(SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await?)
}

async fn seed_database(
    pool: &Pool<Sqlite>,
    settings: &ReportSettings,
    opts: &SeedOptions,
) -> Result<(u64, u64), Box<dyn Error>> {
    let mut rng = rand::rng();
    let max_ms = i64::from(opts.days_back) * 24 * 60 * 60 * 1000;
    let exp = Exp::new(3.0 / max_ms as f64).map_err(|e| format!("{e:?}"))?;

    let insert_hit = format!(
        r#"INSERT INTO {} (affiliate_id, datetime, ip, url, type, user_agent)
           VALUES (?, ?, ?, ?, ?, ?)"#,
        settings.hits_table()
    );
    let insert_referral = format!(
        r#"INSERT INTO {}
           (affiliate_id, hit_id, type, order_id, amount, order_total, status, datetime)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        settings.referrals_table()
    );

    let mut total_hits = 0u64;
    let mut total_referrals = 0u64;
    let mut next_order_id = 1000i64;

    // Affiliate 0 holds untracked visits that reports must never show
    for affiliate_id in 0..=opts.affiliates {
        let start = Instant::now();
        let hits = if affiliate_id == 0 {
            opts.hits_per_affiliate / 10
        } else {
            opts.hits_per_affiliate
        };

        let mut tx = pool.begin().await?;
        for _ in 0..hits {
            let datetime = random_recent_datetime(&mut rng, &exp, max_ms);
            let ip = random_ip(&mut rng);
            // Legacy rows store the packed integer
            let ip = if rng.random_bool(0.2) {
                u32::from(ip).to_string()
            } else {
                ip.to_string()
            };
            let medium = pick(&mut rng, MEDIUMS);

            let hit_id = sqlx::query(&insert_hit)
                .bind(affiliate_id)
                .bind(datetime.format(DB_DATETIME_FORMAT).to_string())
                .bind(ip)
                .bind(pick(&mut rng, LANDING_REFERRERS))
                .bind(medium)
                .bind(pick(&mut rng, USER_AGENTS))
                .execute(&mut *tx)
                .await?
                .last_insert_rowid();
            total_hits += 1;

            if affiliate_id != 0 && rng.random_bool(opts.conversion) {
                let order_total: f64 = (rng.random_range(1_500..40_000) as f64) / 100.0;
                let amount = (order_total * 0.1 * 100.0).round() / 100.0;
                let converted_at = datetime + Duration::minutes(rng.random_range(1..240));

                sqlx::query(&insert_referral)
                    .bind(affiliate_id)
                    .bind(hit_id)
                    .bind(medium)
                    .bind(next_order_id)
                    .bind(amount)
                    .bind(order_total)
                    .bind(pick(&mut rng, STATUSES))
                    .bind(converted_at.format(DB_DATETIME_FORMAT).to_string())
                    .execute(&mut *tx)
                    .await?;
                next_order_id += 1;
                total_referrals += 1;
            }
        }
        tx.commit().await?;

        println!(
            "  Affiliate {:>4}: {} hits in {:?}",
            affiliate_id,
            hits,
            start.elapsed()
        );
    }

    Ok((total_hits, total_referrals))
}

fn print_usage() {
    eprintln!(
        r#"Usage: seed [options]

Options:
  --db <path>          Database path (default: seed.db)
  --prefix <prefix>    Table prefix (default: wp_)
  --affiliates <n>     Number of affiliates (default: 10)
  --hits <n>           Hits PER AFFILIATE (default: 5000)
  --days <n>           Days of history to generate (default: 30)
  --conversion <p>     Share of hits that convert, 0..1 (default: 0.04)

Start the server with:
  AFWC__DATABASE_PATH=./seed.db cargo run --release"#
    );
}

fn parse_args(args: &[String]) -> Result<SeedOptions, Box<dyn Error>> {
    let mut opts = SeedOptions::default();
    let mut iter = args.iter();

    while let Some(flag) = iter.next() {
        let mut value = || {
            iter.next()
                .cloned()
                .ok_or_else(|| format!("Missing value for {flag}"))
        };
        match flag.as_str() {
            "--db" => opts.db_path = PathBuf::from(value()?),
            "--prefix" => opts.table_prefix = value()?,
            "--affiliates" => opts.affiliates = value()?.parse()?,
            "--hits" => opts.hits_per_affiliate = value()?.parse()?,
            "--days" => opts.days_back = value()?.parse()?,
            "--conversion" => opts.conversion = value()?.parse()?,
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            other => return Err(format!("Unknown option: {other}").into()),
        }
    }

    if !(0.0..=1.0).contains(&opts.conversion) {
        return Err("--conversion must be between 0 and 1".into());
    }
    if opts.days_back == 0 {
        return Err("--days must be at least 1".into());
    }
    Ok(opts)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let opts = match parse_args(&args) {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("{e}");
            print_usage();
            std::process::exit(1);
        }
    };

    let settings = ReportSettings::new("UTC", &opts.table_prefix)?;

    println!("{}", "=".repeat(60));
    println!("Affiliate Visitors - Data Seeder");
    println!("{}", "=".repeat(60));
    println!("Database: {}", opts.db_path.display());
    println!("Affiliates: {}", opts.affiliates);
    println!("Hits per affiliate: {}", opts.hits_per_affiliate);
    println!("Days of history: {}", opts.days_back);
    println!();

    let db_url = format!("sqlite:{}", opts.db_path.display());
    let pool = create_pool(&db_url).await?;
    let schema = include_str!("../../migrations/sqlite/001_initial.sql")
        .replace("{prefix}", &settings.table_prefix);
    sqlx::raw_sql(&schema).execute(&pool).await?;

    let start = Instant::now();
    let (hits, referrals) = seed_database(&pool, &settings, &opts).await?;

    println!(
        "\nSeeded {} hits and {} referrals in {:?}",
        hits,
        referrals,
        start.elapsed()
    );
    println!("\nStart the server with:");
    println!(
        "  AFWC__DATABASE_PATH={} AFWC__TABLE_PREFIX={} cargo run --release",
        opts.db_path.display(),
        opts.table_prefix
    );

    Ok(())
}
