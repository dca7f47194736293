//! `trs sources`: which literature sources are configured and enabled.

use anyhow::Result;
use serde::Serialize;

use crate::config::Config;
use crate::traits::SourceRegistry;

/// Configuration status of one literature source.
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub name: String,
    pub status: String,
    pub title_only: bool,
    pub max_results: Option<usize>,
    pub description: Option<String>,
}

pub fn get_sources(config: &Config) -> Result<Vec<SourceStatus>> {
    let registry = SourceRegistry::from_config(config)?;
    let describe = |name: &str| registry.find(name).map(|s| s.description().to_string());
    let mut out = Vec::new();

    out.push(match &config.connectors.pubmed {
        Some(cfg) => SourceStatus {
            name: "pubmed".to_string(),
            status: if cfg.enabled { "OK" } else { "DISABLED" }.to_string(),
            title_only: false,
            max_results: Some(cfg.max_results),
            description: describe("pubmed"),
        },
        None => not_configured("pubmed"),
    });

    out.push(match &config.connectors.semantic_scholar {
        Some(cfg) => SourceStatus {
            name: "semantic_scholar".to_string(),
            status: if cfg.enabled { "OK" } else { "DISABLED" }.to_string(),
            title_only: cfg.title_only,
            max_results: Some(cfg.max_results),
            description: describe("semantic_scholar"),
        },
        None => not_configured("semantic_scholar"),
    });

    Ok(out)
}

fn not_configured(name: &str) -> SourceStatus {
    SourceStatus {
        name: name.to_string(),
        status: "NOT CONFIGURED".to_string(),
        title_only: false,
        max_results: None,
        description: None,
    }
}

pub fn list_sources(config: &Config) -> Result<()> {
    println!(
        "{:<18} {:<16} {:<11} {:<5} DESCRIPTION",
        "SOURCE", "STATUS", "TITLE-ONLY", "MAX"
    );
    for s in get_sources(config)? {
        println!(
            "{:<18} {:<16} {:<11} {:<5} {}",
            s.name,
            s.status,
            s.title_only,
            s.max_results.map(|m| m.to_string()).unwrap_or_else(|| "-".to_string()),
            s.description.as_deref().unwrap_or("")
        );
    }
    Ok(())
}
