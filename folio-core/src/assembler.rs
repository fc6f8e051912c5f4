use crate::errors::DocumentWarning;
use crate::rules::RuleSet;
use crate::text::{clean_text, preview};
use crate::types::*;
use std::collections::BTreeMap;

/// Separators between names in multi-valued fields
const MULTI_VALUE_SEPARATORS: &[char] = &[',', '，', '、', ';', '；'];

/// A record together with the non-fatal findings made while building it
#[derive(Debug, Clone, PartialEq)]
pub struct Assembly {
    pub record: Record,
    pub warnings: Vec<DocumentWarning>,
}

/// Folds one document's classified fragments into a [`Record`]
pub struct RecordAssembler<'a> {
    rules: &'a RuleSet,
}

impl<'a> RecordAssembler<'a> {
    pub fn new(rules: &'a RuleSet) -> Self {
        Self { rules }
    }

    pub fn assemble(&self, classified: &[ClassifiedFragment], source_id: &str) -> Record {
        self.assemble_with_warnings(classified, source_id).record
    }

    pub fn assemble_with_warnings(&self, classified: &[ClassifiedFragment], source_id: &str) -> Assembly {
        let mut record = Record::empty(source_id);
        let mut warnings = Vec::new();

        let mut by_field: BTreeMap<Field, Vec<&ClassifiedFragment>> = BTreeMap::new();
        for fragment in classified {
            if let Some(field) = fragment.field {
                by_field.entry(field).or_default().push(fragment);
            }
        }

        for (field, fragments) in by_field {
            let value = match field.kind() {
                FieldKind::Single => fold_single(field, &fragments, &mut warnings),
                FieldKind::Multi => fold_multi(&fragments),
                FieldKind::LongForm => fold_long_form(&fragments),
            };
            *record.slot_mut(field) = value;
        }

        // Inference only labels documents that produced something of their own
        let has_content = !record.is_empty();
        if has_content && record.category.is_empty() {
            let text = classified
                .iter()
                .map(|c| c.fragment.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            if let Some(label) = self.rules.infer_category(&text) {
                log::debug!("🏷️  Inferred category {} for {}", label, source_id);
                record.category = label.to_string();
            }
        }

        if !has_content {
            log::warn!("⚠️  No classifiable fragments in {}", source_id);
            warnings.push(DocumentWarning::EmptyDocument);
        }

        Assembly { record, warnings }
    }
}

/// Assemble a record with the given rule set
pub fn assemble(classified: &[ClassifiedFragment], source_id: &str, rules: &RuleSet) -> Record {
    RecordAssembler::new(rules).assemble(classified, source_id)
}

/// Cover-title prominence: font size, with bold worth two points
fn prominence(fragment: &ClassifiedFragment) -> f32 {
    let bold_bonus = if fragment.fragment.style.is_bold() { 2.0 } else { 0.0 };
    fragment.fragment.font_size + bold_bonus
}

fn fold_single(field: Field, fragments: &[&ClassifiedFragment], warnings: &mut Vec<DocumentWarning>) -> String {
    // Position matches win; among several, the most prominent (earliest on ties)
    let chosen = fragments
        .iter()
        .enumerate()
        .filter(|(_, f)| f.matched_by == MatchKind::Position)
        .fold(None, |best: Option<(usize, f32)>, (index, f)| {
            let score = prominence(f);
            match best {
                Some((_, best_score)) if best_score >= score => best,
                _ => Some((index, score)),
            }
        })
        .map(|(index, _)| index)
        .unwrap_or(0);
    let value = fragments[chosen].value.clone();

    for (index, discarded) in fragments.iter().enumerate() {
        if index == chosen || discarded.value == value {
            continue;
        }
        let preview = preview(&discarded.fragment.text, 60);
        log::warn!("⚠️  {} already filled, discarding \"{}\"", field, preview);
        warnings.push(DocumentWarning::DiscardedFragment { field, preview });
    }

    value
}

fn fold_multi(fragments: &[&ClassifiedFragment]) -> String {
    let mut names: Vec<String> = Vec::new();
    for fragment in fragments {
        // Styled values stay whole so marker pairs are never split
        let parts: Vec<&str> = if fragment.value.contains('<') {
            vec![fragment.value.as_str()]
        } else {
            fragment.value.split(MULTI_VALUE_SEPARATORS).collect()
        };

        for part in parts {
            let name = part.trim();
            if !name.is_empty() && !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    names.join(", ")
}

fn fold_long_form(fragments: &[&ClassifiedFragment]) -> String {
    let joined = fragments
        .iter()
        .map(|f| f.value.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    clean_text(&joined)
}
