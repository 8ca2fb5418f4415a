// src/scholar/types.rs
use anyhow::Result;

/// Author-level aggregates as shown on the profile page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorStats {
    pub cited_by: i64,
    pub h_index: i64,
    pub i10_index: i64,
}

/// A publication as listed on the author page, before its detail fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicationStub {
    pub id: String,       // e.g. "CjJ84BwAAAAJ:u5HHmVD_uO8C"
    pub title: String,
    pub year: Option<String>,
    pub citations: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawAuthor {
    pub name: Option<String>,
    pub affiliation: Option<String>,
    pub stats: AuthorStats,
    pub publications: Vec<PublicationStub>,
}

/// Detail fields for one publication, straight from the source (unnormalized).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawPublication {
    pub title: Option<String>,
    pub authors: Option<String>,
    pub venue: Option<String>,
    pub pub_year: Option<String>,
    pub num_citations: Option<i64>,
    pub pub_url: Option<String>,
}

#[async_trait::async_trait]
pub trait ScholarSource: Send + Sync {
    /// Profile header plus every publication stub (all pages).
    async fn fetch_author(&self, scholar_id: &str) -> Result<RawAuthor>;
    async fn fetch_publication(&self, stub: &PublicationStub) -> Result<RawPublication>;
    fn name(&self) -> &'static str;
}
