//! Semantic Scholar connector (Graph API `paper/search`).
//!
//! Queries return `title,abstract,year,venue,url,externalIds`. Papers with
//! no abstract keep their title as body so study-design markers in titles
//! still reach the corpus. A 429 is retried once after a short pause.
//!
//! The source is title-only by default: the learning loop sends it the
//! topic title and never the expanded query list.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

use crate::config::SemanticScholarConnectorConfig;
use crate::models::LiteratureRecord;
use crate::traits::LiteratureSource;

pub const SOURCE_NAME: &str = "semantic_scholar";
const FIELDS: &str = "title,abstract,year,venue,url,externalIds";
const RATE_LIMIT_PAUSE: Duration = Duration::from_secs(5);

pub struct SemanticScholarSource {
    config: SemanticScholarConnectorConfig,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl SemanticScholarSource {
    pub fn new(config: SemanticScholarConnectorConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("SEMANTIC_SCHOLAR_API_KEY").ok())
            .filter(|k| !k.is_empty());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            config,
            api_key,
            client,
        })
    }

    async fn fetch(&self, query: &str) -> Result<reqwest::Response> {
        let url = format!(
            "{}/paper/search",
            self.config.base_url.trim_end_matches('/')
        );
        let limit = self.config.max_results.to_string();
        let mut req = self
            .client
            .get(&url)
            .query(&[("query", query), ("limit", limit.as_str()), ("fields", FIELDS)]);
        if let Some(key) = &self.api_key {
            req = req.header("x-api-key", key);
        }
        Ok(req.send().await?)
    }
}

#[async_trait]
impl LiteratureSource for SemanticScholarSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn description(&self) -> &str {
        "Semantic Scholar paper search"
    }

    fn title_only(&self) -> bool {
        self.config.title_only
    }

    async fn search(&self, query: &str) -> Result<Vec<LiteratureRecord>> {
        let mut resp = self.fetch(query).await?;
        if resp.status().as_u16() == 429 {
            warn!(query, "semantic scholar rate limited, retrying once");
            tokio::time::sleep(RATE_LIMIT_PAUSE).await;
            resp = self.fetch(query).await?;
        }
        let status = resp.status();
        if !status.is_success() {
            bail!("Semantic Scholar search failed: HTTP {}", status);
        }
        let json: serde_json::Value = resp.json().await?;
        parse_search_response(&json)
    }
}

fn parse_search_response(json: &serde_json::Value) -> Result<Vec<LiteratureRecord>> {
    let Some(data) = json.get("data") else {
        // An empty result set omits `data`.
        if json.get("total").is_some() {
            return Ok(Vec::new());
        }
        return Err(anyhow!("Invalid Semantic Scholar response: missing data"));
    };
    let papers = data
        .as_array()
        .ok_or_else(|| anyhow!("Invalid Semantic Scholar response: data is not an array"))?;

    let mut out = Vec::with_capacity(papers.len());
    for paper in papers {
        let Some(id) = paper.get("paperId").and_then(|v| v.as_str()) else {
            continue;
        };
        let title = paper
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .trim()
            .to_string();
        if title.is_empty() {
            continue;
        }
        let abstract_text = paper
            .get("abstract")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or(&title)
            .to_string();

        out.push(LiteratureRecord {
            source: SOURCE_NAME.to_string(),
            source_id: id.to_string(),
            abstract_text,
            year: paper
                .get("year")
                .and_then(|v| v.as_i64())
                .map(|y| y as i32),
            journal: paper
                .get("venue")
                .and_then(|v| v.as_str())
                .filter(|v| !v.is_empty())
                .map(str::to_string),
            url: paper
                .get("url")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            title,
        });
    }
    Ok(out)
}
