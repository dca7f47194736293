//! Evidence signals detected in chunk text.
//!
//! Detection is deliberately simple: lower-case the concatenated text and
//! test membership of known phrases. Three families are recognised:
//!
//! | Family | Flags |
//! |--------|-------|
//! | Evidence type (diversity) | meta-analysis, RCT, general clinical |
//! | Thematic coverage | efficacy, safety, recovery/downtime |
//! | Recency | publication year from a `Year:` / `Année:` marker |
//!
//! The flag structs are the only interface the scorer sees, so a classifier
//! could replace the phrase lists without touching anything else.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

const META_ANALYSIS_MARKERS: &[&str] = &[
    "meta-analysis",
    "meta analysis",
    "systematic review",
    "meta-analyse",
];

const RCT_MARKERS: &[&str] = &[
    "randomized controlled",
    "randomised controlled",
    "rct",
    "double-blind",
    "double blind",
    "placebo-controlled",
];

const CLINICAL_MARKERS: &[&str] = &[
    "clinical trial",
    "clinical study",
    "prospective study",
    "retrospective study",
    "cohort study",
    "case series",
];

const EFFICACY_MARKERS: &[&str] = &[
    "efficacy",
    "efficacite",
    "efficacité",
    "effective",
    "improvement",
    "reduction",
    "amelioration",
    "amélioration",
    "resultat",
    "résultat",
    "result",
    "outcome",
    "response rate",
];

const SAFETY_MARKERS: &[&str] = &[
    "safety",
    "securite",
    "sécurité",
    "adverse",
    "side effect",
    "effet secondaire",
    "complication",
    "risk",
    "risque",
    "contraindication",
    "contre-indication",
];

const RECOVERY_MARKERS: &[&str] = &[
    "recovery",
    "downtime",
    "recuperation",
    "récupération",
    "healing",
    "cicatrisation",
    "eviction sociale",
    "éviction sociale",
    "social downtime",
    "redness",
    "swelling",
    "rougeur",
];

/// Earliest publication year accepted from a text marker.
pub const MIN_PLAUSIBLE_YEAR: i32 = 1900;

/// Evidence-type flags. The scorer awards only the strongest one present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiversityFlags {
    pub has_meta_analysis: bool,
    pub has_rct: bool,
    pub has_clinical: bool,
}

impl DiversityFlags {
    /// Boolean OR, field by field.
    pub fn union(self, other: Self) -> Self {
        Self {
            has_meta_analysis: self.has_meta_analysis || other.has_meta_analysis,
            has_rct: self.has_rct || other.has_rct,
            has_clinical: self.has_clinical || other.has_clinical,
        }
    }
}

/// Thematic coverage flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageFlags {
    pub efficacy: bool,
    pub safety: bool,
    pub recovery: bool,
}

impl CoverageFlags {
    /// Boolean OR, field by field.
    pub fn union(self, other: Self) -> Self {
        Self {
            efficacy: self.efficacy || other.efficacy,
            safety: self.safety || other.safety,
            recovery: self.recovery || other.recovery,
        }
    }

    pub fn count(&self) -> usize {
        [self.efficacy, self.safety, self.recovery]
            .iter()
            .filter(|f| **f)
            .count()
    }

    /// Dimensions that still lack evidence, in efficacy/safety/recovery order.
    pub fn missing(&self) -> Vec<CoverageDimension> {
        let mut out = Vec::new();
        if !self.efficacy {
            out.push(CoverageDimension::Efficacy);
        }
        if !self.safety {
            out.push(CoverageDimension::Safety);
        }
        if !self.recovery {
            out.push(CoverageDimension::Recovery);
        }
        out
    }
}

/// One thematic facet of coverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverageDimension {
    Efficacy,
    Safety,
    Recovery,
}

impl CoverageDimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoverageDimension::Efficacy => "efficacy",
            CoverageDimension::Safety => "safety",
            CoverageDimension::Recovery => "recovery",
        }
    }
}

impl std::fmt::Display for CoverageDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn join_lower<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Detect evidence-type markers across chunk texts and document titles.
pub fn detect_diversity<'a>(texts: impl IntoIterator<Item = &'a str>) -> DiversityFlags {
    let all = join_lower(texts);
    DiversityFlags {
        has_meta_analysis: contains_any(&all, META_ANALYSIS_MARKERS),
        has_rct: contains_any(&all, RCT_MARKERS),
        has_clinical: contains_any(&all, CLINICAL_MARKERS),
    }
}

/// Detect thematic coverage across chunk texts.
pub fn detect_coverage<'a>(texts: impl IntoIterator<Item = &'a str>) -> CoverageFlags {
    let all = join_lower(texts);
    CoverageFlags {
        efficacy: contains_any(&all, EFFICACY_MARKERS),
        safety: contains_any(&all, SAFETY_MARKERS),
        recovery: contains_any(&all, RECOVERY_MARKERS),
    }
}

fn year_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:year|ann[ée]e)\s*:\s*(\d{4})\b").expect("year marker pattern is valid")
    })
}

/// Extract a publication year from a `Year: 2023` or `Année: 2023` marker.
///
/// Only the first marker whose value lies in `MIN_PLAUSIBLE_YEAR..=max_year`
/// is returned. No marker, or only implausible values, yields `None`.
pub fn extract_publication_year(text: &str, max_year: i32) -> Option<i32> {
    year_marker()
        .captures_iter(text)
        .filter_map(|cap| cap.get(1)?.as_str().parse::<i32>().ok())
        .find(|y| (MIN_PLAUSIBLE_YEAR..=max_year).contains(y))
}

/// True when `year` is one of the last `window_years` calendar years,
/// counting `current_year` itself.
pub fn is_recent(year: i32, current_year: i32, window_years: i32) -> bool {
    year <= current_year && year > current_year - window_years
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diversity_meta_analysis() {
        let f = detect_diversity(["A Systematic Review of topical retinoids"]);
        assert!(f.has_meta_analysis);
        assert!(!f.has_rct);
    }

    #[test]
    fn test_diversity_rct_and_clinical() {
        let f = detect_diversity([
            "A double-blind trial",
            "This prospective study enrolled 40 patients",
        ]);
        assert!(f.has_rct);
        assert!(f.has_clinical);
        assert!(!f.has_meta_analysis);
    }

    #[test]
    fn test_diversity_none() {
        assert_eq!(detect_diversity(["plain text about skin"]), DiversityFlags::default());
    }

    #[test]
    fn test_coverage_families() {
        let f = detect_coverage(["Efficacy was high", "Mild SWELLING resolved"]);
        assert!(f.efficacy);
        assert!(!f.safety);
        assert!(f.recovery);
        assert_eq!(f.count(), 2);
        assert_eq!(f.missing(), vec![CoverageDimension::Safety]);
    }

    #[test]
    fn test_coverage_french_vocabulary() {
        let f = detect_coverage(["Effet secondaire rare, rougeur transitoire"]);
        assert!(f.safety);
        assert!(f.recovery);
    }

    #[test]
    fn test_flags_union_is_or() {
        let a = CoverageFlags {
            efficacy: true,
            ..Default::default()
        };
        let b = CoverageFlags {
            recovery: true,
            ..Default::default()
        };
        let u = a.union(b);
        assert_eq!(u.count(), 2);
        assert_eq!(u.union(u), u);
    }

    #[test]
    fn test_extract_year_english_and_french() {
        assert_eq!(extract_publication_year("Title\nYear: 2023\n", 2026), Some(2023));
        assert_eq!(
            extract_publication_year("Journal/Année: 2019\nLien: x", 2026),
            Some(2019)
        );
        assert_eq!(extract_publication_year("annee : 2021", 2026), Some(2021));
    }

    #[test]
    fn test_extract_year_rejects_implausible() {
        assert_eq!(extract_publication_year("Year: 1200", 2026), None);
        assert_eq!(extract_publication_year("Year: 2999", 2026), None);
        assert_eq!(extract_publication_year("Year: N/A", 2026), None);
        assert_eq!(extract_publication_year("published in 2022", 2026), None);
    }

    #[test]
    fn test_extract_year_skips_bad_marker() {
        assert_eq!(
            extract_publication_year("Year: 0001 ... Year: 2024", 2026),
            Some(2024)
        );
    }

    #[test]
    fn test_is_recent() {
        assert!(is_recent(2026, 2026, 3));
        assert!(is_recent(2024, 2026, 3));
        assert!(!is_recent(2023, 2026, 3));
        assert!(!is_recent(2027, 2026, 3));
    }
}
