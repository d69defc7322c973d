//! Accept-pattern matching.
//!
//! # Responsibilities
//! - Parse `type/subtype` patterns with `*` wildcards
//! - Match a handler's declared patterns against a request's media ranges
//! - Report the best weight a handler earns for a request
//!
//! # Design Decisions
//! - Media types compare case-insensitively
//! - A wildcard on either side matches (handler `text/*` serves `text/html`,
//!   client `*/*` accepts anything)
//! - Ranges with quality 0 are "not acceptable" and match nothing
//! - No regex: two string comparisons per pair

use serde::{Deserialize, Serialize};

use crate::http::MediaRange;

/// A media-type pattern a handler declares, with its priority weight.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AcceptPattern {
    /// `type/subtype`, either part may be `*`.
    pub pattern: String,

    /// Higher is visited first.
    pub weight: f64,
}

impl AcceptPattern {
    pub fn new(pattern: impl Into<String>, weight: f64) -> Self {
        Self {
            pattern: pattern.into(),
            weight,
        }
    }
}

/// A parsed `type/subtype` pattern. `None` components are wildcards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPattern {
    main: Option<String>,
    sub: Option<String>,
}

impl MediaPattern {
    /// Parse `type/subtype`. Rejects `*/subtype` and empty parts.
    pub fn parse(text: &str) -> Option<Self> {
        let (main, sub) = text.trim().split_once('/')?;
        let main = main.trim();
        let sub = sub.trim();
        if main.is_empty() || sub.is_empty() || sub.contains('/') {
            return None;
        }
        let main = (main != "*").then(|| main.to_ascii_lowercase());
        let sub = (sub != "*").then(|| sub.to_ascii_lowercase());
        if main.is_none() && sub.is_some() {
            return None;
        }
        Some(Self { main, sub })
    }

    /// 2 for `type/subtype`, 1 for `type/*`, 0 for `*/*`.
    pub fn specificity(&self) -> u8 {
        u8::from(self.main.is_some()) + u8::from(self.sub.is_some())
    }

    /// Whether this pattern overlaps `other`.
    pub fn matches(&self, other: &MediaPattern) -> bool {
        component_matches(&self.main, &other.main) && component_matches(&self.sub, &other.sub)
    }
}

fn component_matches(a: &Option<String>, b: &Option<String>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

/// Best pattern a handler matched for a request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternMatch {
    pub weight: f64,
    pub specificity: u8,
}

/// Handler patterns compiled once at registration.
#[derive(Debug, Clone)]
pub struct CompiledPatterns {
    entries: Vec<(MediaPattern, f64)>,
}

impl CompiledPatterns {
    /// Compile a declared list. Unparseable patterns and non-finite weights
    /// are reported by value so the caller can name them.
    pub fn compile(patterns: &[AcceptPattern]) -> Result<Self, AcceptPattern> {
        let mut entries = Vec::with_capacity(patterns.len());
        for declared in patterns {
            if !declared.weight.is_finite() {
                return Err(declared.clone());
            }
            let parsed = MediaPattern::parse(&declared.pattern).ok_or_else(|| declared.clone())?;
            entries.push((parsed, declared.weight));
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest weight among patterns matching an acceptable range; at equal
    /// weight the more specific pattern wins.
    ///
    /// An empty `ranges` slice means the client accepts anything.
    pub fn best_match(&self, ranges: &[MediaRange]) -> Option<PatternMatch> {
        let any = MediaPattern {
            main: None,
            sub: None,
        };
        let acceptable: Vec<MediaPattern> = if ranges.is_empty() {
            vec![any]
        } else {
            ranges
                .iter()
                .filter(|range| range.quality > 0.0)
                .filter_map(|range| MediaPattern::parse(&range.media_type))
                .collect()
        };

        let mut best: Option<PatternMatch> = None;
        for (pattern, weight) in &self.entries {
            if !acceptable.iter().any(|range| pattern.matches(range)) {
                continue;
            }
            let candidate = PatternMatch {
                weight: *weight,
                specificity: pattern.specificity(),
            };
            best = match best {
                Some(current)
                    if current.weight > candidate.weight
                        || (current.weight == candidate.weight
                            && current.specificity >= candidate.specificity) =>
                {
                    Some(current)
                }
                _ => Some(candidate),
            };
        }
        best
    }
}
