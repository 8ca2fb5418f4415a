// src/scholar/providers/google_scholar.rs
//! Google Scholar profile scraper (author listing + per-publication detail page).
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;

use crate::scholar::retry::{DynSleeper, Throttle};
use crate::scholar::types::{AuthorStats, PublicationStub, RawAuthor, RawPublication, ScholarSource};

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0 Safari/537.36";
/// Upper bound on listing pages, so a misbehaving page can't loop forever.
const MAX_LISTING_PAGES: usize = 200;

pub fn scholar_profile_url(scholar_id: &str) -> String {
    format!("https://scholar.google.co.in/citations?user={scholar_id}&hl=en")
}

pub struct GoogleScholarSource {
    client: reqwest::Client,
    base_url: String,
    page_size: usize,
    sleeper: DynSleeper,
    page_throttle: Throttle,
}

impl GoogleScholarSource {
    pub fn new(
        base_url: &str,
        page_size: usize,
        timeout: Duration,
        sleeper: DynSleeper,
        page_throttle: Throttle,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .context("building scholar http client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            page_size: page_size.max(1),
            sleeper,
            page_throttle,
        })
    }

    async fn get_html(&self, query: &[(&str, String)]) -> Result<String> {
        let url = format!("{}/citations", self.base_url);
        let resp = match self.client.get(&url).query(query).send().await {
            Ok(resp) => resp,
            Err(e) => {
                counter!("scholar_http_errors_total").increment(1);
                return Err(e).context("scholar http get()");
            }
        };

        let status = resp.status();
        if !status.is_success() {
            counter!("scholar_http_errors_total").increment(1);
            bail!("scholar returned HTTP {status}");
        }
        let body = resp.text().await.context("scholar http .text()")?;
        if looks_blocked(&body) {
            counter!("scholar_http_errors_total").increment(1);
            bail!("scholar served a captcha / unusual-traffic page");
        }
        Ok(body)
    }
}

#[async_trait]
impl ScholarSource for GoogleScholarSource {
    async fn fetch_author(&self, scholar_id: &str) -> Result<RawAuthor> {
        let mut author: Option<RawAuthor> = None;
        let mut cstart = 0usize;

        for page in 0..MAX_LISTING_PAGES {
            if page > 0 {
                self.sleeper.sleep(self.page_throttle.next_delay()).await;
            }
            let html = self
                .get_html(&[
                    ("user", scholar_id.to_string()),
                    ("hl", "en".to_string()),
                    ("cstart", cstart.to_string()),
                    ("pagesize", self.page_size.to_string()),
                ])
                .await
                .with_context(|| format!("author page cstart={cstart}"))?;

            let parsed = parse_author_page(&html)?;
            let rows = parsed.publications.len();
            tracing::debug!(target: "fetch", cstart, rows, "author listing page");

            match author.as_mut() {
                None => author = Some(parsed),
                Some(a) => a.publications.extend(parsed.publications),
            }
            if rows < self.page_size {
                break;
            }
            cstart += rows;
        }

        author.ok_or_else(|| anyhow!("no author page fetched"))
    }

    async fn fetch_publication(&self, stub: &PublicationStub) -> Result<RawPublication> {
        let html = self
            .get_html(&[
                ("view_op", "view_citation".to_string()),
                ("hl", "en".to_string()),
                ("citation_for_view", stub.id.clone()),
            ])
            .await
            .with_context(|| format!("publication page {}", stub.id))?;
        let mut raw = parse_publication_page(&html)?;

        // The listing row is a fallback for fields the detail page omits.
        if raw.title.is_none() && !stub.title.is_empty() {
            raw.title = Some(stub.title.clone());
        }
        if raw.pub_year.is_none() {
            raw.pub_year = stub.year.clone();
        }
        if raw.num_citations.is_none() {
            raw.num_citations = stub.citations;
        }
        Ok(raw)
    }

    fn name(&self) -> &'static str {
        "google-scholar"
    }
}

fn looks_blocked(html: &str) -> bool {
    html.contains("gs_captcha") || html.contains("unusual traffic")
}

static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<[^>]+>").expect("tags regex"));

/// Strip tags, decode entities, collapse whitespace.
fn clean_text(s: &str) -> String {
    let no_tags = RE_TAGS.replace_all(s, " ");
    let decoded = html_escape::decode_html_entities(&no_tags);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn first_capture(re: &Regex, s: &str) -> Option<String> {
    re.captures(s)
        .and_then(|c| c.get(1))
        .map(|m| clean_text(m.as_str()))
        .filter(|t| !t.is_empty())
}

fn parse_count(s: &str) -> Option<i64> {
    let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

pub(crate) fn parse_author_page(html: &str) -> Result<RawAuthor> {
    static RE_NAME: Lazy<Regex> =
        Lazy::new(|| Regex::new(r#"(?is)<div id="gsc_prf_in"[^>]*>(.*?)</div>"#).expect("name regex"));
    static RE_AFFIL: Lazy<Regex> =
        Lazy::new(|| Regex::new(r#"(?is)<div class="gsc_prf_il"[^>]*>(.*?)</div>"#).expect("affil regex"));
    static RE_STAT: Lazy<Regex> =
        Lazy::new(|| Regex::new(r#"(?is)<td class="gsc_rsb_std"[^>]*>(.*?)</td>"#).expect("stat regex"));
    static RE_ROW_LINK: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r#"(?is)<a[^>]*href="([^"]*citation_for_view=[^"]*)"[^>]*class="gsc_a_at"[^>]*>(.*?)</a>"#)
            .expect("row link regex")
    });
    static RE_ROW_CITES: Lazy<Regex> =
        Lazy::new(|| Regex::new(r#"(?is)class="gsc_a_ac[^"]*"[^>]*>(.*?)</a>"#).expect("row cites regex"));
    static RE_ROW_YEAR: Lazy<Regex> =
        Lazy::new(|| Regex::new(r#"(?is)class="gsc_a_h[^"]*"[^>]*>(.*?)</span>"#).expect("row year regex"));

    let name = first_capture(&RE_NAME, html);
    if name.is_none() && !html.contains("gsc_a_tr") {
        bail!("page does not look like a scholar profile");
    }

    let stats: Vec<i64> = RE_STAT
        .captures_iter(html)
        .filter_map(|c| c.get(1).and_then(|m| parse_count(&clean_text(m.as_str()))))
        .collect();
    // Table cells: citations (all, since), h-index (all, since), i10 (all, since)
    let stat = |i: usize| stats.get(i).copied().unwrap_or(0);

    let mut publications = Vec::new();
    for row in html.split(r#"<tr class="gsc_a_tr""#).skip(1) {
        let row = row.split("</tr>").next().unwrap_or(row);
        let Some(link) = RE_ROW_LINK.captures(row) else {
            continue;
        };
        let href = html_escape::decode_html_entities(link.get(1).map_or("", |m| m.as_str())).into_owned();
        let Some(id) = citation_id(&href) else {
            continue;
        };
        publications.push(PublicationStub {
            id,
            title: clean_text(link.get(2).map_or("", |m| m.as_str())),
            year: first_capture(&RE_ROW_YEAR, row),
            citations: first_capture(&RE_ROW_CITES, row).and_then(|c| parse_count(&c)),
        });
    }

    Ok(RawAuthor {
        name,
        affiliation: first_capture(&RE_AFFIL, html),
        stats: AuthorStats {
            cited_by: stat(0),
            h_index: stat(2),
            i10_index: stat(4),
        },
        publications,
    })
}

fn citation_id(href: &str) -> Option<String> {
    href.split(['?', '&'])
        .find_map(|kv| kv.strip_prefix("citation_for_view="))
        .map(str::to_string)
        .filter(|s| !s.is_empty())
}

pub(crate) fn parse_publication_page(html: &str) -> Result<RawPublication> {
    static RE_TITLE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r#"(?is)<div id="gsc_oci_title"[^>]*>(.*?)</div>"#).expect("title regex"));
    static RE_TITLE_HREF: Lazy<Regex> =
        Lazy::new(|| Regex::new(r#"(?is)<a[^>]*class="gsc_oci_title_link"[^>]*href="([^"]*)""#).expect("href regex"));
    static RE_FIELD: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r#"(?is)<div class="gsc_oci_field"[^>]*>(.*?)</div>\s*<div class="gsc_oci_value"[^>]*>(.*?)</div>"#)
            .expect("field regex")
    });
    static RE_CITED_BY: Lazy<Regex> = Lazy::new(|| Regex::new(r"Cited by (\d+)").expect("cited regex"));

    if !html.contains("gsc_oci_title") {
        bail!("page does not look like a scholar citation view");
    }

    let mut raw = RawPublication {
        title: first_capture(&RE_TITLE, html),
        pub_url: RE_TITLE_HREF
            .captures(html)
            .and_then(|c| c.get(1))
            .map(|m| html_escape::decode_html_entities(m.as_str()).into_owned()),
        ..RawPublication::default()
    };

    for c in RE_FIELD.captures_iter(html) {
        let field = clean_text(c.get(1).map_or("", |m| m.as_str())).to_ascii_lowercase();
        let value = clean_text(c.get(2).map_or("", |m| m.as_str()));
        match field.as_str() {
            "authors" | "inventors" => raw.authors = Some(value),
            "publication date" => raw.pub_year = value.split('/').next().map(str::to_string),
            // first one wins; Scholar lists the journal before the publisher
            "journal" | "conference" | "book" | "source" | "publisher" => {
                raw.venue.get_or_insert(value);
            }
            "total citations" => {
                raw.num_citations = RE_CITED_BY
                    .captures(&value)
                    .and_then(|m| m.get(1))
                    .and_then(|m| m.as_str().parse().ok());
            }
            _ => {}
        }
    }
    Ok(raw)
}
