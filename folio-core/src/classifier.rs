use crate::rules::RuleSet;
use crate::types::*;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

lazy_static! {
    static ref ACRONYM: Regex = Regex::new(r"^[A-Z]{2,}$").unwrap();
}

/// Vertical text extent of each page, used to place fragments relative to
/// the top of their page
#[derive(Debug, Clone, Default)]
pub struct DocumentLayout {
    extents: HashMap<u32, (f32, f32)>,
}

impl DocumentLayout {
    pub fn from_fragments(fragments: &[StyledFragment]) -> Self {
        let mut extents: HashMap<u32, (f32, f32)> = HashMap::new();
        for fragment in fragments {
            let extent = extents.entry(fragment.page).or_insert((fragment.y, fragment.y));
            extent.0 = extent.0.min(fragment.y);
            extent.1 = extent.1.max(fragment.y);
        }
        Self { extents }
    }

    pub fn position_of(&self, index: usize, fragment: &StyledFragment) -> DocumentPosition {
        let vertical_fraction = match self.extents.get(&fragment.page) {
            Some((top, bottom)) if bottom > top => ((fragment.y - top) / (bottom - top)).clamp(0.0, 1.0),
            _ => 0.0,
        };
        DocumentPosition {
            page: fragment.page,
            index,
            vertical_fraction,
        }
    }
}

/// Assigns each fragment to exactly one field. Fields are tried in
/// [`Field::PRIORITY`] order, rules in rank order, and the first match wins.
/// Detail is the catch-all for long leftovers.
pub struct FragmentClassifier<'a> {
    rules: &'a RuleSet,
}

impl<'a> FragmentClassifier<'a> {
    pub fn new(rules: &'a RuleSet) -> Self {
        Self { rules }
    }

    pub fn classify(&self, fragment: StyledFragment, position: DocumentPosition) -> ClassifiedFragment {
        if fragment.is_blank() {
            return ClassifiedFragment::unclassified(fragment, position);
        }

        for field in Field::PRIORITY {
            for rule in self.rules.rules_for(field) {
                if let Some((matched_by, value)) = rule.apply(&fragment, &position) {
                    return ClassifiedFragment {
                        fragment,
                        position,
                        field: Some(field),
                        value,
                        matched_by,
                    };
                }
            }
        }

        if self.is_detail_text(&fragment.text) {
            let value = fragment.markup.trim().to_string();
            return ClassifiedFragment {
                fragment,
                position,
                field: Some(Field::Detail),
                value,
                matched_by: MatchKind::CatchAll,
            };
        }

        ClassifiedFragment::unclassified(fragment, position)
    }

    /// Classify a document's fragments in reading order. Blank fragments are
    /// discarded before classification.
    pub fn classify_document(&self, fragments: Vec<StyledFragment>) -> Vec<ClassifiedFragment> {
        let fragments: Vec<StyledFragment> = fragments.into_iter().filter(|f| !f.is_blank()).collect();
        let layout = DocumentLayout::from_fragments(&fragments);

        let classified: Vec<ClassifiedFragment> = fragments
            .into_iter()
            .enumerate()
            .map(|(index, fragment)| {
                let position = layout.position_of(index, &fragment);
                self.classify(fragment, position)
            })
            .collect();

        log::debug!(
            "🏷️  Classified {} of {} fragments",
            classified.iter().filter(|c| c.is_classified()).count(),
            classified.len()
        );
        classified
    }

    fn is_detail_text(&self, text: &str) -> bool {
        let text = text.trim();
        text.chars().count() >= self.rules.config().min_detail_length
            && !text.chars().all(|c| c.is_ascii_digit())
            && !ACRONYM.is_match(text)
    }
}

/// Classify one fragment against a rule set
pub fn classify(fragment: StyledFragment, position: DocumentPosition, rules: &RuleSet) -> ClassifiedFragment {
    FragmentClassifier::new(rules).classify(fragment, position)
}
