//! Readiness scoring: six step-function dimensions over the merged state.
//!
//! | Dimension | Max | Input |
//! |-----------|-----|-------|
//! | documents | 20 | distinct documents seen |
//! | chunks | 20 | distinct relevant, deduplicated chunks seen |
//! | diversity | 15 | strongest evidence type seen |
//! | recency | 15 | chunks seen with a recent publication year |
//! | coverage | 15 | efficacy/safety/recovery flags seen |
//! | atlas | 15 | topic present in the procedure catalogue |
//!
//! Every band function is non-decreasing in its input, so a state that only
//! grows yields a score that never drops.

use serde::{Deserialize, Serialize};

use crate::signals::{CoverageFlags, DiversityFlags};
use crate::state::CumulativeState;

pub const TRS_GREEN: f64 = 75.0;
pub const TRS_YELLOW: f64 = 60.0;
pub const TRS_ORANGE: f64 = 40.0;
/// Default score a topic needs before content may be generated.
pub const TRS_MINIMUM_FOR_GENERATION: f64 = 70.0;

pub const MAX_DOCUMENTS: u32 = 20;
pub const MAX_CHUNKS: u32 = 20;
pub const MAX_DIVERSITY: u32 = 15;
pub const MAX_RECENCY: u32 = 15;
pub const MAX_COVERAGE: u32 = 15;
pub const MAX_ATLAS: u32 = 15;

/// Traffic-light label for a readiness score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadinessStatus {
    Green,
    Yellow,
    Orange,
    Red,
}

impl ReadinessStatus {
    pub fn from_score(score: f64) -> Self {
        if score >= TRS_GREEN {
            ReadinessStatus::Green
        } else if score >= TRS_YELLOW {
            ReadinessStatus::Yellow
        } else if score >= TRS_ORANGE {
            ReadinessStatus::Orange
        } else {
            ReadinessStatus::Red
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReadinessStatus::Green => "green",
            ReadinessStatus::Yellow => "yellow",
            ReadinessStatus::Orange => "orange",
            ReadinessStatus::Red => "red",
        }
    }
}

impl std::fmt::Display for ReadinessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Score for one count-based dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountScore {
    pub score: u32,
    pub max: u32,
    pub count: usize,
}

/// Per-dimension breakdown of a readiness score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessBreakdown {
    pub documents: CountScore,
    pub chunks: CountScore,
    pub diversity: DiversityScore,
    pub recency: CountScore,
    pub coverage: CoverageScore,
    pub atlas: AtlasScore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiversityScore {
    pub score: u32,
    pub max: u32,
    #[serde(flatten)]
    pub flags: DiversityFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageScore {
    pub score: u32,
    pub max: u32,
    #[serde(flatten)]
    pub flags: CoverageFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtlasScore {
    pub score: u32,
    pub max: u32,
    pub match_found: bool,
}

impl ReadinessBreakdown {
    /// Sum of the six dimensions, in `0..=100`.
    pub fn total(&self) -> u32 {
        self.documents.score
            + self.chunks.score
            + self.diversity.score
            + self.recency.score
            + self.coverage.score
            + self.atlas.score
    }
}

pub fn documents_band(count: usize) -> u32 {
    match count {
        n if n >= 15 => 20,
        n if n >= 10 => 12,
        n if n >= 5 => 6,
        _ => 0,
    }
}

pub fn chunks_band(count: usize) -> u32 {
    match count {
        n if n >= 40 => 20,
        n if n >= 20 => 12,
        n if n >= 10 => 6,
        _ => 0,
    }
}

pub fn recency_band(count: usize) -> u32 {
    match count {
        n if n >= 8 => 15,
        n if n >= 4 => 10,
        n if n >= 2 => 5,
        _ => 0,
    }
}

/// Highest evidence type wins; the flags are not additive.
pub fn diversity_band(flags: DiversityFlags) -> u32 {
    if flags.has_meta_analysis {
        15
    } else if flags.has_rct {
        10
    } else if flags.has_clinical {
        5
    } else {
        0
    }
}

pub fn coverage_band(flags: CoverageFlags) -> u32 {
    match flags.count() {
        3 => 15,
        2 => 10,
        1 => 5,
        _ => 0,
    }
}

pub fn atlas_band(match_found: bool) -> u32 {
    if match_found {
        MAX_ATLAS
    } else {
        0
    }
}

/// Score a merged state.
pub fn score_state(state: &CumulativeState, catalogue_match: bool) -> ReadinessBreakdown {
    ReadinessBreakdown {
        documents: CountScore {
            score: documents_band(state.doc_count()),
            max: MAX_DOCUMENTS,
            count: state.doc_count(),
        },
        chunks: CountScore {
            score: chunks_band(state.chunk_count()),
            max: MAX_CHUNKS,
            count: state.chunk_count(),
        },
        diversity: DiversityScore {
            score: diversity_band(state.seen_diversity_flags),
            max: MAX_DIVERSITY,
            flags: state.seen_diversity_flags,
        },
        recency: CountScore {
            score: recency_band(state.recent_count()),
            max: MAX_RECENCY,
            count: state.recent_count(),
        },
        coverage: CoverageScore {
            score: coverage_band(state.seen_coverage_flags),
            max: MAX_COVERAGE,
            flags: state.seen_coverage_flags,
        },
        atlas: AtlasScore {
            score: atlas_band(catalogue_match),
            max: MAX_ATLAS,
            match_found: catalogue_match,
        },
    }
}
