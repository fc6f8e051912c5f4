use crate::config::Script;
use crate::text::han_density;
use crate::types::{DocumentPosition, MatchKind};
use regex::Regex;

/// Compile a keyword into a case-insensitive regex. Keywords that start and
/// end with an ASCII alphanumeric only match whole words, so "by" does not
/// fire inside "baby".
pub fn keyword_regex(keyword: &str) -> Result<Regex, regex::Error> {
    let escaped = regex::escape(keyword);
    let bounded = keyword.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
        && keyword.chars().last().is_some_and(|c| c.is_ascii_alphanumeric());

    if bounded {
        Regex::new(&format!(r"(?i)\b{escaped}\b"))
    } else {
        Regex::new(&format!("(?i){escaped}"))
    }
}

/// Ordered keyword list; the first listed keyword found in the text wins
#[derive(Debug, Clone)]
pub struct KeywordSet {
    keywords: Vec<(String, Regex)>,
}

impl KeywordSet {
    pub fn new(keywords: &[String]) -> Result<Self, regex::Error> {
        let keywords = keywords
            .iter()
            .map(|keyword| Ok((keyword.clone(), keyword_regex(keyword)?)))
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { keywords })
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// Byte range of the first matching keyword
    pub fn find(&self, text: &str) -> Option<(usize, usize)> {
        self.keywords
            .iter()
            .find_map(|(_, regex)| regex.find(text))
            .map(|m| (m.start(), m.end()))
    }

    pub fn contains_any(&self, text: &str) -> bool {
        self.find(text).is_some()
    }
}

/// Layout test: early page, near the top, in the expected script
#[derive(Debug, Clone, PartialEq)]
pub struct PositionHeuristic {
    pub max_page: u32,
    pub top_fraction: f32,
    pub script: Script,
    pub density_threshold: f32,
}

impl PositionHeuristic {
    pub fn accepts(&self, text: &str, position: &DocumentPosition) -> bool {
        if position.page > self.max_page || position.vertical_fraction > self.top_fraction {
            return false;
        }
        match self.script {
            Script::Any => true,
            Script::Latin => han_density(text) < self.density_threshold,
            Script::Han => han_density(text) >= self.density_threshold,
        }
    }
}

/// One test a rule can run against a fragment
#[derive(Debug, Clone)]
pub enum MatchPredicate {
    Regex(Regex),
    KeywordSet(KeywordSet),
    PositionHeuristic(PositionHeuristic),
}

/// What a predicate found
#[derive(Debug, Clone, PartialEq)]
pub struct PredicateMatch {
    pub kind: MatchKind,
    /// End of the matched keyword or pattern in the raw text
    pub end: Option<usize>,
    /// First capture group, or the whole match when the pattern has none
    pub capture: Option<String>,
}

impl MatchPredicate {
    pub fn evaluate(&self, text: &str, position: &DocumentPosition) -> Option<PredicateMatch> {
        match self {
            MatchPredicate::Regex(regex) => regex.captures(text).map(|caps| {
                let whole = caps.get(0).map(|m| (m.end(), m.as_str().to_string()));
                let group = caps.get(1).map(|m| m.as_str().to_string());
                PredicateMatch {
                    kind: MatchKind::Pattern,
                    end: whole.as_ref().map(|(end, _)| *end),
                    capture: group.or(whole.map(|(_, s)| s)),
                }
            }),
            MatchPredicate::KeywordSet(keywords) => keywords.find(text).map(|(_, end)| PredicateMatch {
                kind: MatchKind::Keyword,
                end: Some(end),
                capture: None,
            }),
            MatchPredicate::PositionHeuristic(heuristic) => {
                heuristic.accepts(text, position).then_some(PredicateMatch {
                    kind: MatchKind::Position,
                    end: None,
                    capture: None,
                })
            }
        }
    }

    pub fn name(&self) -> &str {
        match self {
            MatchPredicate::Regex(_) => "Regex",
            MatchPredicate::KeywordSet(_) => "KeywordSet",
            MatchPredicate::PositionHeuristic(_) => "PositionHeuristic",
        }
    }
}
