//! PubMed connector (NCBI E-utilities).
//!
//! Two calls per query:
//!
//! 1. `esearch.fcgi` (JSON) → list of PMIDs.
//! 2. `efetch.fcgi` (XML) → one `<PubmedArticle>` per PMID, parsed with
//!    `quick-xml` into [`LiteratureRecord`]s.
//!
//! # Configuration
//!
//! ```toml
//! [connectors.pubmed]
//! email = "me@example.org"   # NCBI asks callers to identify themselves
//! max_results = 10
//! days_back = 3650           # optional publication-date window
//! ```
//!
//! Articles without an abstract are skipped.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use quick_xml::events::Event;
use std::time::Duration;
use tracing::debug;

use crate::config::PubMedConnectorConfig;
use crate::models::LiteratureRecord;
use crate::traits::LiteratureSource;

pub const SOURCE_NAME: &str = "pubmed";
const TOOL_NAME: &str = "topic-readiness";

pub struct PubMedSource {
    config: PubMedConnectorConfig,
    client: reqwest::Client,
}

impl PubMedSource {
    pub fn new(config: PubMedConnectorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }

    fn common_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("db", "pubmed".to_string()), ("tool", TOOL_NAME.to_string())];
        if let Some(email) = &self.config.email {
            params.push(("email", email.clone()));
        }
        params
    }

    async fn esearch(&self, query: &str) -> Result<Vec<String>> {
        let mut params = self.common_params();
        params.push(("term", query.to_string()));
        params.push(("retmax", self.config.max_results.to_string()));
        params.push(("retmode", "json".to_string()));
        params.push(("sort", "relevance".to_string()));
        if let Some(days) = self.config.days_back {
            params.push(("reldate", days.to_string()));
            params.push(("datetype", "pdat".to_string()));
        }

        let url = format!("{}/esearch.fcgi", self.config.base_url.trim_end_matches('/'));
        let resp = self.client.get(&url).query(&params).send().await?;
        let status = resp.status();
        if !status.is_success() {
            bail!("PubMed esearch failed: HTTP {}", status);
        }
        let json: serde_json::Value = resp.json().await?;
        Ok(parse_esearch_ids(&json))
    }

    async fn efetch(&self, ids: &[String]) -> Result<String> {
        let mut params = self.common_params();
        params.push(("id", ids.join(",")));
        params.push(("retmode", "xml".to_string()));

        let url = format!("{}/efetch.fcgi", self.config.base_url.trim_end_matches('/'));
        let resp = self.client.get(&url).query(&params).send().await?;
        let status = resp.status();
        if !status.is_success() {
            bail!("PubMed efetch failed: HTTP {}", status);
        }
        Ok(resp.text().await?)
    }
}

#[async_trait]
impl LiteratureSource for PubMedSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn description(&self) -> &str {
        "PubMed abstracts via NCBI E-utilities"
    }

    async fn search(&self, query: &str) -> Result<Vec<LiteratureRecord>> {
        let ids = self.esearch(query).await?;
        debug!(query, hits = ids.len(), "pubmed esearch");
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let xml = self.efetch(&ids).await?;
        parse_efetch_xml(&xml).context("Failed to parse PubMed efetch response")
    }
}

fn parse_esearch_ids(json: &serde_json::Value) -> Vec<String> {
    json.get("esearchresult")
        .and_then(|r| r.get("idlist"))
        .and_then(|l| l.as_array())
        .map(|ids| {
            ids.iter()
                .filter_map(|id| id.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Default)]
struct ArticleBuilder {
    pmid: Option<String>,
    title: String,
    abstract_parts: Vec<String>,
    year: Option<i32>,
    journal: Option<String>,
}

impl ArticleBuilder {
    fn build(self) -> Option<LiteratureRecord> {
        let pmid = self.pmid?;
        let abstract_text = self.abstract_parts.join(" ").trim().to_string();
        if abstract_text.is_empty() {
            return None;
        }
        Some(LiteratureRecord {
            source: SOURCE_NAME.to_string(),
            url: Some(format!("https://pubmed.ncbi.nlm.nih.gov/{}/", pmid)),
            source_id: pmid,
            title: self.title.trim().to_string(),
            abstract_text,
            year: self.year,
            journal: self.journal,
        })
    }
}

fn leading_year(text: &str) -> Option<i32> {
    text.trim()
        .get(..4)
        .filter(|y| y.chars().all(|c| c.is_ascii_digit()))
        .and_then(|y| y.parse().ok())
}

/// Parse a `PubmedArticleSet` document.
pub fn parse_efetch_xml(xml: &str) -> Result<Vec<LiteratureRecord>> {
    let mut reader = quick_xml::Reader::from_reader(xml.as_bytes());
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut current: Option<ArticleBuilder> = None;
    let mut records = Vec::new();

    let within = |path: &[String], name: &str| path.iter().any(|p| p == name);

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if name == "PubmedArticle" {
                    current = Some(ArticleBuilder::default());
                }
                if name == "AbstractText" {
                    if let Some(article) = current.as_mut() {
                        let label = e
                            .try_get_attribute("Label")
                            .ok()
                            .flatten()
                            .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()));
                        if let Some(label) = label {
                            article.abstract_parts.push(format!("{}:", label));
                        }
                    }
                }
                path.push(name);
            }
            Event::End(e) => {
                let name = e.name();
                if name.as_ref() == b"PubmedArticle" {
                    if let Some(record) = current.take().and_then(ArticleBuilder::build) {
                        records.push(record);
                    }
                }
                path.pop();
            }
            Event::Text(t) => {
                let text = t.unescape().unwrap_or_default().into_owned();
                let Some(article) = current.as_mut() else {
                    buf.clear();
                    continue;
                };
                let top = path.last().map(String::as_str).unwrap_or("");
                let parent = path
                    .len()
                    .checked_sub(2)
                    .and_then(|i| path.get(i))
                    .map(String::as_str)
                    .unwrap_or("");

                if top == "PMID" && parent == "MedlineCitation" && article.pmid.is_none() {
                    article.pmid = Some(text);
                } else if within(&path, "ArticleTitle") {
                    if !article.title.is_empty() {
                        article.title.push(' ');
                    }
                    article.title.push_str(&text);
                } else if within(&path, "AbstractText") {
                    article.abstract_parts.push(text);
                } else if within(&path, "PubDate") && article.year.is_none() {
                    if top == "Year" || top == "MedlineDate" {
                        article.year = leading_year(&text);
                    }
                } else if top == "Title" && parent == "Journal" {
                    article.journal = Some(text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" ?>
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation Status="MEDLINE">
      <PMID Version="1">38000001</PMID>
      <Article>
        <Journal>
          <JournalIssue>
            <PubDate><Year>2024</Year><Month>Mar</Month></PubDate>
          </JournalIssue>
          <Title>Journal of Cosmetic Dermatology</Title>
        </Journal>
        <ArticleTitle>Microneedling for acne scars: a <i>randomized</i> trial</ArticleTitle>
        <Abstract>
          <AbstractText Label="BACKGROUND">Scarring is common.</AbstractText>
          <AbstractText Label="RESULTS">Efficacy was high &amp; adverse events rare.</AbstractText>
        </Abstract>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
  <PubmedArticle>
    <MedlineCitation>
      <PMID Version="1">38000002</PMID>
      <Article>
        <Journal><JournalIssue><PubDate><MedlineDate>2019 Nov-Dec</MedlineDate></PubDate></JournalIssue></Journal>
        <ArticleTitle>No abstract here</ArticleTitle>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

    #[test]
    fn test_parse_efetch() {
        let records = parse_efetch_xml(SAMPLE).unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.source_id, "38000001");
        assert_eq!(r.year, Some(2024));
        assert_eq!(r.journal.as_deref(), Some("Journal of Cosmetic Dermatology"));
        assert!(r.title.contains("randomized"));
        assert!(r.abstract_text.starts_with("BACKGROUND: Scarring is common."));
        assert!(r.abstract_text.contains("high & adverse"));
        assert_eq!(
            r.url.as_deref(),
            Some("https://pubmed.ncbi.nlm.nih.gov/38000001/")
        );
    }

    #[test]
    fn test_leading_year() {
        assert_eq!(leading_year("2019 Nov-Dec"), Some(2019));
        assert_eq!(leading_year("Nov 2019"), None);
    }

    #[test]
    fn test_parse_esearch_ids() {
        let json = serde_json::json!({"esearchresult": {"idlist": ["1", "2"]}});
        assert_eq!(parse_esearch_ids(&json), vec!["1", "2"]);
        assert!(parse_esearch_ids(&serde_json::json!({})).is_empty());
    }
}
