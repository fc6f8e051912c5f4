// Rule store - delegates to semantic sub-modules
// - engine.rs: RuleSet loading/validation, ClassificationRule, debug tracing
// - pattern_detection.rs: MatchPredicate (regex, keyword set, position heuristic)

pub mod engine;
pub mod pattern_detection;

pub use engine::*;
pub use pattern_detection::{keyword_regex, KeywordSet, MatchPredicate, PositionHeuristic, PredicateMatch};
