// src/storage/mod.rs
//! Storage gateway over a pooled SQLite database.
//!
//! Every operation borrows a connection from the pool; connections go back on
//! every exit path when the guard (or transaction) drops.
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Datelike, Utc};
use metrics::{describe_histogram, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, QueryBuilder, Sqlite, Transaction};

use crate::error::{StoreError, StoreResult};
use crate::model::{
    Pagination, Profile, ProfileUpdate, Publication, PublicationPage, SearchPage,
    StoredPublication, YearFilter, YearLabel,
};

const SCHEMA: &str = include_str!("schema.sql");

/// Rows per INSERT statement inside a bulk replace.
pub const INSERT_BATCH_SIZE: usize = 100;

const MIN_CONNECTIONS: u32 = 1;
const MAX_CONNECTIONS: u32 = 10;

/// Years outside this window are flagged by the audit as suspicious.
const AUDIT_MIN_YEAR: i32 = 1900;

const SELECT_PUBLICATION: &str =
    "SELECT id, title, authors, venue, year, citations, scholar_url, pub_number FROM publications";
const ORDER_PUBLICATIONS: &str = "ORDER BY year IS NULL, year DESC, citations DESC, pub_number ASC";
const SEARCH_PREDICATE: &str = "instr(search_text, ?) > 0";

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_histogram!("db_bulk_replace_rows", "Rows written per bulk replace.");
    });
}

#[derive(Debug, FromRow)]
struct PublicationRow {
    id: i64,
    title: String,
    authors: String,
    venue: String,
    year: Option<i32>,
    citations: i64,
    scholar_url: String,
    pub_number: i32,
}

impl From<PublicationRow> for StoredPublication {
    fn from(r: PublicationRow) -> Self {
        StoredPublication {
            id: r.id,
            title: r.title,
            authors: r.authors,
            venue: r.venue,
            year: YearLabel::from(r.year),
            citations: r.citations,
            scholar_url: r.scholar_url,
            pub_number: r.pub_number,
        }
    }
}

#[derive(Debug, FromRow)]
struct ProfileRow {
    id: i64,
    name: String,
    affiliation: String,
    scholar_url: String,
    total_citations: i64,
    h_index: i64,
    i10_index: i64,
    total_publications: i64,
    last_updated: DateTime<Utc>,
}

impl From<ProfileRow> for Profile {
    fn from(r: ProfileRow) -> Self {
        Profile {
            id: Some(r.id),
            name: r.name,
            affiliation: r.affiliation,
            scholar_url: r.scholar_url,
            total_citations: r.total_citations,
            h_index: r.h_index,
            i10_index: r.i10_index,
            total_publications: r.total_publications,
            last_updated: Some(r.last_updated),
        }
    }
}

/// Result of the connectivity check behind `/api/test-db`.
#[derive(Debug, Clone, Serialize)]
pub struct DbHealth {
    pub total_publications: i64,
    pub database_version: String,
}

/// Post-sync verification view.
#[derive(Debug, Clone, Serialize)]
pub struct StoreSummary {
    pub total_publications: i64,
    pub top_years: Vec<(i32, i64)>,
    pub profile: Option<Profile>,
}

/// Data-quality report on publication years.
#[derive(Debug, Clone, Serialize)]
pub struct YearAudit {
    pub total_publications: i64,
    pub unknown_years: i64,
    pub out_of_range: i64,
    pub sample_unknown_titles: Vec<String>,
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if needed) the database at `url` and make sure the schema exists.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let opts = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::InvalidUrl(format!("{url}: {e}")))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .min_connections(MIN_CONNECTIONS)
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(opts)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        tracing::info!(target: "storage", max_connections = MAX_CONNECTIONS, "database pool ready");
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn migrate(&self) -> StoreResult<()> {
        for stmt in schema_statements() {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// One page of publications, newest year first, unknown years last.
    pub async fn list_publications(
        &self,
        page: u32,
        per_page: u32,
        filter: YearFilter,
    ) -> StoreResult<PublicationPage> {
        let clause = match filter {
            YearFilter::All => "",
            YearFilter::Unknown => "WHERE year IS NULL",
            YearFilter::Year(_) => "WHERE year = ?",
        };
        let year = match filter {
            YearFilter::Year(y) => Some(y),
            _ => None,
        };

        let count_sql = format!("SELECT COUNT(*) FROM publications {clause}");
        let mut count = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(y) = year {
            count = count.bind(y);
        }
        let total = count.fetch_one(&self.pool).await?;

        let rows_sql = format!("{SELECT_PUBLICATION} {clause} {ORDER_PUBLICATIONS} LIMIT ? OFFSET ?");
        let mut rows = sqlx::query_as::<_, PublicationRow>(&rows_sql);
        if let Some(y) = year {
            rows = rows.bind(y);
        }
        let rows = rows
            .bind(i64::from(per_page))
            .bind(Pagination::offset(page, per_page))
            .fetch_all(&self.pool)
            .await?;

        Ok(PublicationPage {
            publications: rows.into_iter().map(StoredPublication::from).collect(),
            pagination: Pagination::new(page, per_page, total),
        })
    }

    /// Case-insensitive substring match over title, authors or venue.
    pub async fn search(&self, query: &str, page: u32, per_page: u32) -> StoreResult<SearchPage> {
        let needle = fold_case(query.trim());

        let count_sql = format!("SELECT COUNT(*) FROM publications WHERE {SEARCH_PREDICATE}");
        let total = sqlx::query_scalar::<_, i64>(&count_sql)
            .bind(&needle)
            .fetch_one(&self.pool)
            .await?;

        let rows_sql = format!(
            "{SELECT_PUBLICATION} WHERE {SEARCH_PREDICATE} {ORDER_PUBLICATIONS} LIMIT ? OFFSET ?"
        );
        let rows = sqlx::query_as::<_, PublicationRow>(&rows_sql)
            .bind(&needle)
            .bind(i64::from(per_page))
            .bind(Pagination::offset(page, per_page))
            .fetch_all(&self.pool)
            .await?;

        Ok(SearchPage {
            publications: rows.into_iter().map(StoredPublication::from).collect(),
            query: query.to_string(),
            total,
            page,
            per_page,
        })
    }

    /// Publication count per year label, years descending and `Unknown` last.
    pub async fn year_counts(&self) -> StoreResult<Vec<(YearLabel, i64)>> {
        let rows: Vec<(Option<i32>, i64)> = sqlx::query_as(
            "SELECT year, COUNT(*) FROM publications GROUP BY year ORDER BY year IS NULL, year DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(y, n)| (YearLabel::from(y), n))
            .collect())
    }

    /// Replace every publication row in one transaction.
    ///
    /// Any failure rolls the whole thing back; readers see either the old set or the new one.
    pub async fn bulk_replace(&self, publications: &[Publication]) -> StoreResult<usize> {
        ensure_metrics_described();
        let mut tx = self.pool.begin().await?;
        match replace_all(&mut tx, publications).await {
            Ok(deleted) => {
                tx.commit().await?;
                histogram!("db_bulk_replace_rows").record(publications.len() as f64);
                tracing::info!(
                    target: "storage",
                    deleted,
                    inserted = publications.len(),
                    "publications replaced"
                );
                Ok(publications.len())
            }
            Err(e) => {
                tracing::error!(target: "storage", error = %e, "bulk replace failed, rolling back");
                if let Err(rb) = tx.rollback().await {
                    tracing::warn!(target: "storage", error = %rb, "rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Update the profile row in place, or insert it when the table is empty.
    pub async fn upsert_profile(&self, p: &ProfileUpdate) -> StoreResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let existing: Option<i64> =
            sqlx::query_scalar("SELECT id FROM scholar_profile ORDER BY id LIMIT 1")
                .fetch_optional(&mut *tx)
                .await?;

        match existing {
            Some(id) => {
                sqlx::query(
                    "UPDATE scholar_profile SET name = ?, affiliation = ?, scholar_url = ?, \
                     total_citations = ?, h_index = ?, i10_index = ?, total_publications = ?, \
                     last_updated = ? WHERE id = ?",
                )
                .bind(&p.name)
                .bind(&p.affiliation)
                .bind(&p.scholar_url)
                .bind(p.total_citations)
                .bind(p.h_index)
                .bind(p.i10_index)
                .bind(p.total_publications)
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            }
            None => {
                sqlx::query(
                    "INSERT INTO scholar_profile (name, affiliation, scholar_url, total_citations, \
                     h_index, i10_index, total_publications, last_updated) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(&p.name)
                .bind(&p.affiliation)
                .bind(&p.scholar_url)
                .bind(p.total_citations)
                .bind(p.h_index)
                .bind(p.i10_index)
                .bind(p.total_publications)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
        }
        tx.commit().await?;
        tracing::info!(target: "storage", name = %p.name, updated = existing.is_some(), "profile saved");
        Ok(())
    }

    /// Most recently updated profile row, if any.
    pub async fn get_profile(&self) -> StoreResult<Option<Profile>> {
        let row: Option<ProfileRow> = sqlx::query_as(
            "SELECT id, name, affiliation, scholar_url, total_citations, h_index, i10_index, \
             total_publications, last_updated FROM scholar_profile \
             ORDER BY last_updated DESC, id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Profile::from))
    }

    pub async fn count_publications(&self) -> StoreResult<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM publications")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    pub async fn smoke_check(&self) -> StoreResult<DbHealth> {
        let total_publications = self.count_publications().await?;
        let version: String = sqlx::query_scalar("SELECT sqlite_version()")
            .fetch_one(&self.pool)
            .await?;
        Ok(DbHealth {
            total_publications,
            database_version: truncate_version(&format!("SQLite {version}")),
        })
    }

    pub async fn summary(&self, top_years: u32) -> StoreResult<StoreSummary> {
        let total_publications = self.count_publications().await?;
        let top_years: Vec<(i32, i64)> = sqlx::query_as(
            "SELECT year, COUNT(*) FROM publications WHERE year IS NOT NULL \
             GROUP BY year ORDER BY year DESC LIMIT ?",
        )
        .bind(i64::from(top_years))
        .fetch_all(&self.pool)
        .await?;
        Ok(StoreSummary {
            total_publications,
            top_years,
            profile: self.get_profile().await?,
        })
    }

    pub async fn year_audit(&self) -> StoreResult<YearAudit> {
        let total_publications = self.count_publications().await?;
        let unknown_years: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM publications WHERE year IS NULL")
                .fetch_one(&self.pool)
                .await?;
        let max_year = Utc::now().year() + 1;
        let out_of_range: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM publications WHERE year IS NOT NULL AND (year < ? OR year > ?)",
        )
        .bind(AUDIT_MIN_YEAR)
        .bind(max_year)
        .fetch_one(&self.pool)
        .await?;
        let sample_unknown_titles: Vec<String> = sqlx::query_scalar(
            "SELECT title FROM publications WHERE year IS NULL ORDER BY pub_number LIMIT 5",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(YearAudit {
            total_publications,
            unknown_years,
            out_of_range,
            sample_unknown_titles,
        })
    }
}

/// Delete everything, then insert in fixed-size batches. Returns rows deleted.
async fn replace_all(tx: &mut Transaction<'_, Sqlite>, publications: &[Publication]) -> StoreResult<u64> {
    let deleted = sqlx::query("DELETE FROM publications")
        .execute(&mut **tx)
        .await?
        .rows_affected();

    for (i, batch) in publications.chunks(INSERT_BATCH_SIZE).enumerate() {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "INSERT INTO publications \
             (title, authors, venue, year, citations, scholar_url, pub_number, search_text) ",
        );
        qb.push_values(batch, |mut b, p| {
            b.push_bind(&p.title)
                .push_bind(&p.authors)
                .push_bind(&p.venue)
                .push_bind(p.year)
                .push_bind(p.citations)
                .push_bind(&p.scholar_url)
                .push_bind(p.pub_number)
                .push_bind(search_text(p));
        });
        qb.build().execute(&mut **tx).await?;
        tracing::debug!(target: "storage", batch = i + 1, rows = batch.len(), "batch inserted");
    }
    Ok(deleted)
}

/// Unicode case folding shared by the stored search column and the query needle.
///
/// SQLite's own `lower()` only folds ASCII, so both sides are folded here.
fn fold_case(s: &str) -> String {
    s.to_lowercase()
}

/// Folded title, authors and venue. `<strong>` markers are not searchable.
fn search_text(p: &Publication) -> String {
    let authors = p.authors.replace("<strong>", "").replace("</strong>", "");
    fold_case(&format!("{}\n{}\n{}", p.title, authors, p.venue))
}

fn schema_statements() -> impl Iterator<Item = &'static str> {
    SCHEMA.split(';').map(str::trim).filter(|s| {
        s.lines().any(|l| {
            let l = l.trim();
            !l.is_empty() && !l.starts_with("--")
        })
    })
}

fn truncate_version(v: &str) -> String {
    const MAX: usize = 50;
    if v.chars().count() <= MAX {
        v.to_string()
    } else {
        let head: String = v.chars().take(MAX).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_splits_into_statements() {
        let stmts: Vec<_> = schema_statements().collect();
        assert_eq!(stmts.len(), 4);
        assert!(stmts[0].contains("CREATE TABLE IF NOT EXISTS publications"));
        assert!(stmts[3].contains("scholar_profile"));
    }

    #[test]
    fn search_text_folds_unicode_and_drops_emphasis() {
        let p = Publication {
            title: "ÜBER Neural Networks".into(),
            authors: "<strong>A Dixit</strong>, J Álvarez".into(),
            venue: "Optics".into(),
            year: None,
            citations: 0,
            scholar_url: String::new(),
            pub_number: 1,
        };
        let t = search_text(&p);
        assert!(t.contains("über neural networks"));
        assert!(t.contains("a dixit, j álvarez"));
        assert!(!t.contains("strong"));
        assert_eq!(fold_case("ÁLVAREZ"), "álvarez");
    }

    #[test]
    fn long_versions_are_truncated() {
        assert_eq!(truncate_version("SQLite 3.45.1"), "SQLite 3.45.1");
        let long = "x".repeat(80);
        let t = truncate_version(&long);
        assert_eq!(t.len(), 53);
        assert!(t.ends_with("..."));
    }
}
