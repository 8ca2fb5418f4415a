// src/model.rs
//! Records shared by the fetcher, the storage gateway and the HTTP layer.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// Label used when a publication has no usable year.
pub const UNKNOWN_YEAR: &str = "Unknown";

/// One normalized publication, as produced by a sync run and written by bulk replace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Publication {
    pub title: String,
    /// May contain `<strong>…</strong>` around the owner's name.
    pub authors: String,
    pub venue: String,
    pub year: Option<i32>,
    pub citations: i64,
    pub scholar_url: String,
    /// 1-based discovery order from the source.
    pub pub_number: i32,
}

impl Publication {
    pub fn year_label(&self) -> YearLabel {
        YearLabel::from(self.year)
    }
}

/// A publication row read back from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredPublication {
    pub id: i64,
    pub title: String,
    pub authors: String,
    pub venue: String,
    pub year: YearLabel,
    pub citations: i64,
    pub scholar_url: String,
    pub pub_number: i32,
}

/// Either a concrete year or the unknown-year sentinel.
///
/// Ordering is "display order": later years first, `Unknown` after every year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum YearLabel {
    Year(i32),
    Unknown,
}

impl YearLabel {
    pub fn as_year(self) -> Option<i32> {
        match self {
            YearLabel::Year(y) => Some(y),
            YearLabel::Unknown => None,
        }
    }
}

impl From<Option<i32>> for YearLabel {
    fn from(v: Option<i32>) -> Self {
        v.map(YearLabel::Year).unwrap_or(YearLabel::Unknown)
    }
}

impl Ord for YearLabel {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (YearLabel::Year(a), YearLabel::Year(b)) => b.cmp(a),
            (YearLabel::Year(_), YearLabel::Unknown) => Ordering::Less,
            (YearLabel::Unknown, YearLabel::Year(_)) => Ordering::Greater,
            (YearLabel::Unknown, YearLabel::Unknown) => Ordering::Equal,
        }
    }
}

impl PartialOrd for YearLabel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for YearLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            YearLabel::Year(y) => write!(f, "{y}"),
            YearLabel::Unknown => f.write_str(UNKNOWN_YEAR),
        }
    }
}

impl Serialize for YearLabel {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            YearLabel::Year(y) => s.serialize_i32(*y),
            YearLabel::Unknown => s.serialize_str(UNKNOWN_YEAR),
        }
    }
}

/// Year filter accepted by the paginated read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum YearFilter {
    #[default]
    All,
    Unknown,
    Year(i32),
}

impl FromStr for YearFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        if t.is_empty() || t.eq_ignore_ascii_case("all") {
            return Ok(YearFilter::All);
        }
        if t.eq_ignore_ascii_case(UNKNOWN_YEAR) {
            return Ok(YearFilter::Unknown);
        }
        t.parse::<i32>()
            .map(YearFilter::Year)
            .map_err(|_| format!("invalid year filter '{t}'"))
    }
}

/// Aggregate statistics written by the profile upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileUpdate {
    pub name: String,
    pub affiliation: String,
    pub scholar_url: String,
    pub total_citations: i64,
    pub h_index: i64,
    pub i10_index: i64,
    pub total_publications: i64,
}

/// The persisted profile row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub id: Option<i64>,
    pub name: String,
    pub affiliation: String,
    pub scholar_url: String,
    pub total_citations: i64,
    pub h_index: i64,
    pub i10_index: i64,
    pub total_publications: i64,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Profile {
    /// Placeholder served before the first sync has written a profile.
    pub fn placeholder(name: &str, scholar_url: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            affiliation: String::new(),
            scholar_url: scholar_url.to_string(),
            total_citations: 0,
            h_index: 0,
            i10_index: 0,
            total_publications: 0,
            last_updated: None,
        }
    }
}

/// Page bookkeeping shared by list and search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
    pub total_pages: i64,
    pub has_next: bool,
}

impl Pagination {
    /// `page` and `per_page` must both be >= 1.
    pub fn new(page: u32, per_page: u32, total: i64) -> Self {
        let per = i64::from(per_page.max(1));
        let total = total.max(0);
        Self {
            page,
            per_page,
            total,
            total_pages: (total + per - 1) / per,
            has_next: i64::from(page) * per < total,
        }
    }

    pub fn offset(page: u32, per_page: u32) -> i64 {
        i64::from(page.saturating_sub(1)) * i64::from(per_page)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicationPage {
    pub publications: Vec<StoredPublication>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub publications: Vec<StoredPublication>,
    pub query: String,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}
