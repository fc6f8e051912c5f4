use crate::config::{ClassificationConfig, Extraction, RuleSpec};
use crate::errors::ConfigurationError;
use crate::preprocessors::style::wrap;
use crate::text::preview;
use crate::types::*;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;

use super::pattern_detection::{KeywordSet, MatchPredicate, PositionHeuristic, PredicateMatch};

lazy_static! {
    static ref LEADING_SEPARATORS: Regex = Regex::new(r"^[\s:：]+").unwrap();
    static ref TRAILING_PAGES: Regex = Regex::new(r"(?i)[\s,]*(?:\d+\s*pages?|pages?\s*\d+)\s*$").unwrap();
    static ref TRAILING_NUMBER: Regex = Regex::new(r"\s*\d+\s*$").unwrap();
    static ref TRAILING_PUNCT: Regex = Regex::new(r"[,，。.;；]+$").unwrap();
}

/// Extracted values shorter than this fail the predicate
const MIN_VALUE_CHARS: usize = 2;

/// Trace filter: a regex, or plain text when the pattern does not compile
#[derive(Debug, Clone)]
enum TraceFilter {
    Regex(Regex),
    Contains(String),
}

impl TraceFilter {
    fn matches(&self, text: &str) -> bool {
        match self {
            TraceFilter::Regex(regex) => regex.is_match(text),
            TraceFilter::Contains(needle) => text.contains(needle.as_str()),
        }
    }
}

// Debug configuration for classification tracing
#[derive(Debug, Clone)]
pub struct DebugConfig {
    pub enabled: bool,
    pub filter_patterns: Vec<String>,
    filters: Vec<TraceFilter>,
}

impl DebugConfig {
    pub fn new(enabled: bool, filter_patterns: Vec<String>) -> Self {
        let filters = filter_patterns
            .iter()
            .map(|pattern| match Regex::new(pattern) {
                Ok(regex) => TraceFilter::Regex(regex),
                Err(_) => TraceFilter::Contains(pattern.clone()),
            })
            .collect();
        Self {
            enabled,
            filter_patterns,
            filters,
        }
    }

    pub fn disabled() -> Self {
        Self::new(false, Vec::new())
    }

    /// True when tracing is on and the text matches one of the filters
    pub fn traces(&self, text: &str) -> bool {
        self.enabled && self.filters.iter().any(|filter| filter.matches(text))
    }
}

/// Trace classified fragments whose text matches one of the debug filters
pub fn debug_classified_fragments(stage: &str, fragments: &[ClassifiedFragment], debug_config: &DebugConfig) {
    if !debug_config.enabled || debug_config.filters.is_empty() {
        return;
    }

    let matching: Vec<_> = fragments
        .iter()
        .filter(|classified| debug_config.traces(&classified.fragment.text))
        .collect();

    if matching.is_empty() {
        return;
    }

    log::info!("🔍 [{}] {} matching fragments:", stage, matching.len());
    for classified in matching {
        log::info!(
            "  #{} \"{}\" -> {} ({:?}, page {}, top {:.2})",
            classified.position.index,
            preview(&classified.fragment.text, 50),
            classified.field.map(|f| f.column_name()).unwrap_or("unclassified"),
            classified.matched_by,
            classified.position.page,
            classified.position.vertical_fraction
        );
    }
}

/// One compiled rule from the rule store
#[derive(Debug, Clone)]
pub struct ClassificationRule {
    pub field: Field,
    /// Rank within the field's rule list; lower runs first
    pub priority: u32,
    pub predicates: Vec<MatchPredicate>,
    /// Position gate for pattern/keyword predicates
    pub anchor: Option<PositionHeuristic>,
    pub exclude: Option<KeywordSet>,
    pub veto: Vec<Regex>,
    pub min_chars: Option<usize>,
    pub max_chars: Option<usize>,
    pub extraction: Extraction,
}

impl ClassificationRule {
    fn compile(
        field: Field,
        index: usize,
        spec: &RuleSpec,
        config: &ClassificationConfig,
    ) -> Result<Self, ConfigurationError> {
        let invalid = |pattern: &str, source: regex::Error| ConfigurationError::InvalidPattern {
            field,
            pattern: pattern.to_string(),
            source,
        };

        let heuristic = match &spec.position {
            Some(position) => {
                let top_fraction = position.top_fraction.unwrap_or(config.title_top_fraction);
                check_fraction("position.top_fraction", top_fraction)?;
                Some(PositionHeuristic {
                    max_page: position.max_page,
                    top_fraction,
                    script: position.script,
                    density_threshold: config.chinese_density_threshold,
                })
            }
            None => None,
        };

        let mut predicates = Vec::new();
        for pattern in &spec.patterns {
            let regex = Regex::new(pattern).map_err(|e| invalid(pattern, e))?;
            predicates.push(MatchPredicate::Regex(regex));
        }
        if !spec.keywords.is_empty() {
            let keywords = KeywordSet::new(&spec.keywords).map_err(|e| invalid(&spec.keywords.join("|"), e))?;
            predicates.push(MatchPredicate::KeywordSet(keywords));
        }

        // A bare position spec is the heuristic itself; otherwise it anchors
        let anchor = match heuristic {
            Some(heuristic) if predicates.is_empty() => {
                predicates.push(MatchPredicate::PositionHeuristic(heuristic));
                None
            }
            other => other,
        };

        if predicates.is_empty() {
            return Err(ConfigurationError::EmptyRule { field, index });
        }

        let exclude = if spec.exclude.is_empty() {
            None
        } else {
            Some(KeywordSet::new(&spec.exclude).map_err(|e| invalid(&spec.exclude.join("|"), e))?)
        };

        let veto = spec
            .veto
            .iter()
            .map(|pattern| Regex::new(pattern).map_err(|e| invalid(pattern, e)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            field,
            priority: index as u32,
            predicates,
            anchor,
            exclude,
            veto,
            min_chars: spec.min_chars,
            max_chars: spec.max_chars,
            extraction: spec.extract,
        })
    }

    /// Test the rule against a fragment. Returns how it matched and the
    /// value it contributes, or None to fall through to the next rule.
    pub fn apply(&self, fragment: &StyledFragment, position: &DocumentPosition) -> Option<(MatchKind, String)> {
        let text = fragment.text.trim();
        let chars = text.chars().count();

        if self.min_chars.is_some_and(|min| chars < min) || self.max_chars.is_some_and(|max| chars > max) {
            return None;
        }
        if self.exclude.as_ref().is_some_and(|exclude| exclude.contains_any(text)) {
            return None;
        }
        if self.veto.iter().any(|veto| veto.is_match(text)) {
            return None;
        }
        if self.anchor.as_ref().is_some_and(|anchor| !anchor.accepts(text, position)) {
            return None;
        }

        self.predicates.iter().find_map(|predicate| {
            let found = predicate.evaluate(text, position)?;
            let value = self.extract(&found, text, fragment)?;
            Some((found.kind, value))
        })
    }

    fn extract(&self, found: &PredicateMatch, text: &str, fragment: &StyledFragment) -> Option<String> {
        let value = match (self.extraction, found.end) {
            (Extraction::Whole, _) | (_, None) => fragment.markup.trim().to_string(),
            (Extraction::Capture, Some(end)) => {
                let raw = found.capture.clone().unwrap_or_else(|| text[end..].to_string());
                wrap(fragment.style, LEADING_SEPARATORS.replace(raw.trim(), "").trim())
            }
            (Extraction::AfterKeyword, Some(end)) => wrap(fragment.style, &clean_name(&text[end..])),
        };

        (value.chars().count() >= MIN_VALUE_CHARS).then_some(value)
    }
}

/// Tidy a name that followed a keyword: separators in front, page numbers
/// and punctuation behind
pub fn clean_name(raw: &str) -> String {
    let name = LEADING_SEPARATORS.replace(raw, "");
    let name = TRAILING_PAGES.replace(&name, "");
    let name = TRAILING_NUMBER.replace(&name, "");
    let name = TRAILING_PUNCT.replace(name.trim(), "");
    name.trim().to_string()
}

fn check_fraction(name: &'static str, value: f32) -> Result<(), ConfigurationError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidThreshold {
            name,
            value,
            min: 0.0,
            max: 1.0,
        })
    }
}

/// Immutable, validated rule store shared by every classification call
#[derive(Debug, Clone)]
pub struct RuleSet {
    config: ClassificationConfig,
    rules: BTreeMap<Field, Vec<ClassificationRule>>,
    category_inference: Vec<(String, KeywordSet)>,
}

impl RuleSet {
    /// Compile and validate a configuration. Any bad pattern or threshold
    /// rejects the whole configuration.
    pub fn load(config: &ClassificationConfig) -> Result<Self, ConfigurationError> {
        check_fraction("title_top_fraction", config.title_top_fraction)?;
        check_fraction("chinese_density_threshold", config.chinese_density_threshold)?;
        if !(config.line_tolerance >= 0.0) {
            return Err(ConfigurationError::InvalidThreshold {
                name: "line_tolerance",
                value: config.line_tolerance,
                min: 0.0,
                max: f32::MAX,
            });
        }
        if config.fields.contains_key(&Field::Detail) {
            return Err(ConfigurationError::CatchAllRules(Field::Detail));
        }

        let mut rules = BTreeMap::new();
        for field in Field::PRIORITY {
            let mut specs: Vec<(usize, RuleSpec)> = config.rules_for(field).into_iter().enumerate().collect();
            // Ranked rules first, unranked keep file order
            specs.sort_by_key(|(index, spec)| (spec.priority.unwrap_or(u32::MAX), *index));

            let compiled = specs
                .iter()
                .enumerate()
                .map(|(rank, (index, spec))| {
                    let mut rule = ClassificationRule::compile(field, *index, spec, config)?;
                    rule.priority = rank as u32;
                    Ok(rule)
                })
                .collect::<Result<Vec<_>, ConfigurationError>>()?;

            log::debug!("📋 {} rules loaded for {}", compiled.len(), field);
            rules.insert(field, compiled);
        }

        let category_inference = config
            .category_inference
            .iter()
            .map(|entry| {
                KeywordSet::new(&entry.keywords)
                    .map(|keywords| (entry.label.clone(), keywords))
                    .map_err(|source| ConfigurationError::InvalidPattern {
                        field: Field::Category,
                        pattern: entry.keywords.join("|"),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, ConfigurationError>>()?;

        Ok(Self {
            config: config.clone(),
            rules,
            category_inference,
        })
    }

    /// Rules of a field in evaluation order. Detail has none.
    pub fn rules_for(&self, field: Field) -> &[ClassificationRule] {
        self.rules.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn config(&self) -> &ClassificationConfig {
        &self.config
    }

    /// First configured category whose keyword occurs in the text
    pub fn infer_category(&self, text: &str) -> Option<&str> {
        self.category_inference
            .iter()
            .find(|(_, keywords)| keywords.contains_any(text))
            .map(|(label, _)| label.as_str())
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::load(&ClassificationConfig::default()).expect("built-in rules must compile")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PositionSpec;
    use crate::preprocessors::style::resolve;

    fn fragment(text: &str, flags: i64) -> StyledFragment {
        resolve(TextRun::new(text, "Times", flags, 12.0))
    }

    fn anywhere() -> DocumentPosition {
        DocumentPosition {
            page: 3,
            index: 10,
            vertical_fraction: 0.8,
        }
    }

    fn config_with(field: Field, specs: Vec<RuleSpec>) -> ClassificationConfig {
        let mut config = ClassificationConfig::default();
        config.fields.insert(field, specs);
        config
    }

    #[test]
    fn built_in_rules_load() {
        let rules = RuleSet::default();
        assert!(!rules.rules_for(Field::Title).is_empty());
        assert!(rules.rules_for(Field::Detail).is_empty());
    }

    #[test]
    fn malformed_regex_names_field_and_pattern() {
        let config = config_with(
            Field::Tags,
            vec![RuleSpec {
                patterns: vec!["(unclosed".to_string()],
                ..RuleSpec::default()
            }],
        );
        match RuleSet::load(&config) {
            Err(ConfigurationError::InvalidPattern { field, pattern, .. }) => {
                assert_eq!(field, Field::Tags);
                assert_eq!(pattern, "(unclosed");
            }
            other => panic!("expected InvalidPattern, got {other:?}"),
        }
    }

    #[test]
    fn rule_without_predicates_is_rejected() {
        let config = config_with(Field::Author, vec![RuleSpec::default()]);
        assert!(matches!(
            RuleSet::load(&config),
            Err(ConfigurationError::EmptyRule {
                field: Field::Author,
                index: 0
            })
        ));
    }

    #[test]
    fn detail_rules_are_rejected() {
        let config = config_with(
            Field::Detail,
            vec![RuleSpec {
                keywords: vec!["x".to_string()],
                ..RuleSpec::default()
            }],
        );
        assert!(matches!(RuleSet::load(&config), Err(ConfigurationError::CatchAllRules(_))));
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let mut config = ClassificationConfig::default();
        config.chinese_density_threshold = 1.5;
        assert!(matches!(
            RuleSet::load(&config),
            Err(ConfigurationError::InvalidThreshold { name: "chinese_density_threshold", .. })
        ));
    }

    #[test]
    fn configured_field_replaces_defaults() {
        let config = config_with(
            Field::Translator,
            vec![RuleSpec {
                keywords: vec!["rendered into English by".to_string()],
                extract: Extraction::AfterKeyword,
                ..RuleSpec::default()
            }],
        );
        let rules = RuleSet::load(&config).unwrap();
        assert_eq!(rules.rules_for(Field::Translator).len(), 1);

        let rule = &rules.rules_for(Field::Translator)[0];
        assert!(rule.apply(&fragment("translated by Chen-Yu Chang", 0), &anywhere()).is_none());
        let (_, value) = rule
            .apply(&fragment("Rendered into English by Ann Lee", 0), &anywhere())
            .unwrap();
        assert_eq!(value, "Ann Lee");
    }

    #[test]
    fn priority_reorders_rules() {
        let config = config_with(
            Field::Tags,
            vec![
                RuleSpec {
                    keywords: vec!["second".to_string()],
                    ..RuleSpec::default()
                },
                RuleSpec {
                    keywords: vec!["first".to_string()],
                    priority: Some(1),
                    ..RuleSpec::default()
                },
            ],
        );
        let rules = RuleSet::load(&config).unwrap();
        let tags = rules.rules_for(Field::Tags);
        assert_eq!(tags[0].priority, 0);
        assert!(tags[0].apply(&fragment("first tag", 0), &anywhere()).is_some());
        assert!(tags[0].apply(&fragment("second tag", 0), &anywhere()).is_none());
    }

    #[test]
    fn after_keyword_strips_prefix_and_noise() {
        assert_eq!(clean_name(" Chen-Yu Chang"), "Chen-Yu Chang");
        assert_eq!(clean_name(": Ann Lee, "), "Ann Lee");
        assert_eq!(clean_name("：張三 12"), "張三");
        assert_eq!(clean_name(" Ann Lee pages 240"), "Ann Lee");
    }

    #[test]
    fn extracted_value_keeps_uniform_style() {
        let rules = RuleSet::default();
        let rule = &rules.rules_for(Field::Translator)[0];
        let (kind, value) = rule
            .apply(&fragment("translated by Chen-Yu Chang", 2), &anywhere())
            .unwrap();
        assert_eq!(kind, MatchKind::Keyword);
        assert_eq!(value, "<i>Chen-Yu Chang</i>");
    }

    #[test]
    fn keyword_with_nothing_after_falls_through() {
        let rules = RuleSet::default();
        let rule = &rules.rules_for(Field::Translator)[0];
        assert!(rule.apply(&fragment("Translator", 0), &anywhere()).is_none());
    }

    #[test]
    fn anchored_keywords_respect_position() {
        let config = config_with(
            Field::Category,
            vec![RuleSpec {
                keywords: vec!["Fiction".to_string()],
                position: Some(PositionSpec {
                    max_page: 0,
                    top_fraction: Some(0.5),
                    script: crate::config::Script::Any,
                }),
                ..RuleSpec::default()
            }],
        );
        let rules = RuleSet::load(&config).unwrap();
        let rule = &rules.rules_for(Field::Category)[0];
        assert!(rule.anchor.is_some());
        assert!(rule.apply(&fragment("Fiction", 0), &anywhere()).is_none());
        assert!(rule
            .apply(&fragment("Fiction", 0), &DocumentPosition::top_of_first_page())
            .is_some());
    }

    #[test]
    fn veto_pattern_rejects_rule() {
        let config = config_with(
            Field::Tags,
            vec![RuleSpec {
                keywords: vec!["tags".to_string()],
                veto: vec![r"(?i)^\s*no\b".to_string()],
                ..RuleSpec::default()
            }],
        );
        let rules = RuleSet::load(&config).unwrap();
        let rule = &rules.rules_for(Field::Tags)[0];
        assert!(rule.apply(&fragment("tags here", 0), &anywhere()).is_some());
        assert!(rule.apply(&fragment("no tags here", 0), &anywhere()).is_none());
    }

    #[test]
    fn malformed_veto_pattern_is_rejected() {
        let config = config_with(
            Field::Tags,
            vec![RuleSpec {
                keywords: vec!["tags".to_string()],
                veto: vec!["[unclosed".to_string()],
                ..RuleSpec::default()
            }],
        );
        assert!(matches!(
            RuleSet::load(&config),
            Err(ConfigurationError::InvalidPattern { field: Field::Tags, .. })
        ));
    }

    #[test]
    fn trace_filters_fall_back_to_plain_text() {
        let debug = DebugConfig::new(true, vec!["^Demo".to_string(), "(spy".to_string()]);
        assert!(debug.traces("Democracy on Fire"));
        assert!(debug.traces("a (spy story"));
        assert!(!debug.traces("on Fire"));
        assert!(!DebugConfig::disabled().traces("Democracy on Fire"));
    }

    #[test]
    fn category_inference_uses_first_matching_label() {
        let rules = RuleSet::default();
        assert_eq!(rules.infer_category("a graphic novel in manga style"), Some("漫畫類"));
        assert_eq!(rules.infer_category("一部長篇小說"), Some("小說類"));
        assert_eq!(rules.infer_category("nothing here"), None);
    }
}
