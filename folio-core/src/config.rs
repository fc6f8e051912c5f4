use crate::errors::ConfigurationError;
use crate::types::Field;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

// Default value functions for serde
fn default_title_top_fraction() -> f32 {
    0.3 // top 30% of the first page's text extent
}

fn default_chinese_density_threshold() -> f32 {
    0.6
}

fn default_min_detail_length() -> usize {
    10 // characters; shorter leftovers are treated as page furniture
}

fn default_line_tolerance() -> f32 {
    2.0 // points
}

fn default_workers() -> usize {
    1
}

/// Declarative classification configuration.
///
/// `fields` holds per-field rule lists. A field named in a loaded file fully
/// replaces the built-in rules of that field; fields the file does not name
/// keep their built-in rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationConfig {
    /// Fraction of the first page (from the top) eligible for title heuristics
    #[serde(default = "default_title_top_fraction")]
    pub title_top_fraction: f32,
    /// Han share at or above which a title-like fragment is the Chinese title
    #[serde(default = "default_chinese_density_threshold")]
    pub chinese_density_threshold: f32,
    /// Minimum characters for an unmatched fragment to count as Detail
    #[serde(default = "default_min_detail_length")]
    pub min_detail_length: usize,
    /// Max vertical distance between runs of the same visual line
    #[serde(default = "default_line_tolerance")]
    pub line_tolerance: f32,
    /// Merge hard-wrapped lines into paragraphs before classification
    #[serde(default)]
    pub merge_paragraphs: bool,
    /// Documents processed in parallel by the batch coordinator
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub fields: BTreeMap<Field, Vec<RuleSpec>>,
    /// Category labels inferred from document text when no fragment matched
    #[serde(default = "default_category_inference")]
    pub category_inference: Vec<CategoryInference>,
}

/// One rule as written in configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSpec {
    /// Regex patterns matched against the fragment's raw text
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patterns: Vec<String>,
    /// Case-insensitive keywords; whole-word when alphanumeric at both ends
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    /// Alone: a position heuristic. With patterns/keywords: an anchor gating them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<PositionSpec>,
    /// Keywords that veto the rule wherever they occur
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
    /// Regex patterns that veto the rule, e.g. anchored contributor prefixes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub veto: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_chars: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_chars: Option<usize>,
    #[serde(default)]
    pub extract: Extraction,
    /// Lower runs first; unset keeps file order after ranked rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSpec {
    /// Last page index (0-based) the heuristic applies to
    #[serde(default)]
    pub max_page: u32,
    /// Overrides `title_top_fraction` for this rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_fraction: Option<f32>,
    #[serde(default)]
    pub script: Script,
}

/// Script test applied through the Chinese-character-density threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Script {
    #[default]
    Any,
    /// Han density below the threshold
    Latin,
    /// Han density at or above the threshold
    Han,
}

/// What a matching rule contributes to the field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Extraction {
    /// The whole fragment, markup included
    #[default]
    Whole,
    /// Text after the matched keyword, e.g. "translated by X" -> "X"
    AfterKeyword,
    /// First capture group of the matched pattern
    Capture,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryInference {
    pub label: String,
    pub keywords: Vec<String>,
}

fn default_category_inference() -> Vec<CategoryInference> {
    vec![
        CategoryInference {
            label: "漫畫類".to_string(),
            keywords: strings(&["comic", "manga", "漫畫"]),
        },
        CategoryInference {
            label: "小說類".to_string(),
            keywords: strings(&["novel", "小說"]),
        },
        CategoryInference {
            label: "教育類".to_string(),
            keywords: strings(&["textbook", "教科書"]),
        },
    ]
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn capture(patterns: &[&str]) -> RuleSpec {
    RuleSpec {
        patterns: strings(patterns),
        extract: Extraction::Capture,
        ..RuleSpec::default()
    }
}

/// Built-in rules per field
pub fn default_field_rules() -> BTreeMap<Field, Vec<RuleSpec>> {
    let mut fields = BTreeMap::new();

    fields.insert(
        Field::Title,
        vec![
            RuleSpec {
                position: Some(PositionSpec {
                    max_page: 0,
                    top_fraction: None,
                    script: Script::Latin,
                }),
                exclude: strings(&[
                    "publisher", "isbn", "rights sold", "作者", "譯者", "翻譯", "插畫", "出版", "版權",
                ]),
                // Contributor lines start with these; titles may still contain them
                veto: strings(&[
                    r"(?i)^\s*(?:by|author|translator|illustrator)\b",
                    r"(?i)\b(?:written|translated|illustrated|illustrations|published)\s+by\b",
                    r"(?i)\b(?:pages?|price)\s*[:：]",
                    r"(?i)\b\d+\s*pages\b",
                ]),
                min_chars: Some(2),
                max_chars: Some(200),
                ..RuleSpec::default()
            },
            capture(&[r"(?i)^\s*(?:english\s+)?title\s*[:：]\s*(.+)$"]),
        ],
    );

    fields.insert(
        Field::TranslatedTitle,
        vec![
            RuleSpec {
                position: Some(PositionSpec {
                    max_page: 0,
                    top_fraction: None,
                    script: Script::Han,
                }),
                exclude: strings(&["出版", "頁數", "價格", "ISBN", "作者", "譯者", "插畫", "版權"]),
                min_chars: Some(2),
                max_chars: Some(100),
                ..RuleSpec::default()
            },
            capture(&[r"^\s*中文書名\s*[:：]\s*(.+)$"]),
        ],
    );

    fields.insert(
        Field::Translator,
        vec![
            RuleSpec {
                keywords: strings(&["translated by", "translator"]),
                max_chars: Some(120),
                extract: Extraction::AfterKeyword,
                ..RuleSpec::default()
            },
            capture(&[r"^\s*(?:譯者|翻譯)\s*[:：]?\s*(.+)$"]),
        ],
    );

    fields.insert(
        Field::Illustrator,
        vec![
            RuleSpec {
                keywords: strings(&["illustrated by", "illustrations by", "illustrator"]),
                exclude: strings(&["publisher", "published", "出版"]),
                max_chars: Some(120),
                extract: Extraction::AfterKeyword,
                ..RuleSpec::default()
            },
            capture(&[r"^\s*(?:插畫|繪者|插圖)\s*[:：]?\s*(.+)$"]),
        ],
    );

    fields.insert(
        Field::Author,
        vec![
            RuleSpec {
                keywords: strings(&["written by", "author"]),
                exclude: strings(&["published by", "publisher", "出版"]),
                max_chars: Some(120),
                extract: Extraction::AfterKeyword,
                ..RuleSpec::default()
            },
            RuleSpec {
                patterns: strings(&[r"(?i)^\s*by\s+(.+)$", r"^\s*(?:作者|著者)\s*[:：]?\s*(.+)$"]),
                max_chars: Some(120),
                extract: Extraction::Capture,
                ..RuleSpec::default()
            },
        ],
    );

    fields.insert(
        Field::Category,
        vec![capture(&[
            r"(?i)^\s*(?:category|genre)\s*[:：]\s*(.+)$",
            r"^\s*(?:類別|分類|類型)\s*[:：]\s*(.+)$",
        ])],
    );

    fields.insert(
        Field::RightsSold,
        vec![capture(&[
            r"(?i)^\s*rights\s+sold(?:\s+to)?\s*[:：]?\s*(.+)$",
            r"^\s*(?:已售版權|版權銷售)\s*[:：]?\s*(.+)$",
        ])],
    );

    fields.insert(
        Field::MoreInfo,
        vec![RuleSpec {
            keywords: strings(&[
                "publisher", "published by", "publication date", "isbn", "pages", "price",
                "format", "volume", "edition", "copyright", "出版社", "出版日期", "頁數",
                "價格", "格式", "尺寸", "版次",
            ]),
            max_chars: Some(200),
            ..RuleSpec::default()
        }],
    );

    fields.insert(
        Field::Tags,
        vec![capture(&[
            r"(?i)^\s*(?:tags|keywords)\s*[:：]\s*(.+)$",
            r"^\s*(?:標籤|關鍵字)\s*[:：]\s*(.+)$",
        ])],
    );

    fields
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            title_top_fraction: default_title_top_fraction(),
            chinese_density_threshold: default_chinese_density_threshold(),
            min_detail_length: default_min_detail_length(),
            line_tolerance: default_line_tolerance(),
            merge_paragraphs: false,
            workers: default_workers(),
            fields: default_field_rules(),
            category_inference: default_category_inference(),
        }
    }
}

impl ClassificationConfig {
    /// Load config from a YAML or JSON file (by extension)
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigurationError> {
        let display = path.display().to_string();
        let content = fs::read_to_string(path).map_err(|source| ConfigurationError::Unreadable {
            path: display.clone(),
            source,
        })?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let parsed = if is_json {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        } else {
            serde_yaml::from_str(&content).map_err(|e| e.to_string())
        };

        parsed.map_err(|message| ConfigurationError::Malformed {
            path: display,
            message,
        })
    }

    /// Load config if one is given and present; a missing file falls back to
    /// the built-in defaults, a broken one is an error
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        match path {
            Some(p) if p.exists() => Self::load_from_file(p),
            Some(p) => {
                log::warn!("⚠️  Config {} not found, using defaults", p.display());
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    /// Rules for a field: configured ones if the field is named, else built-in
    pub fn rules_for(&self, field: Field) -> Vec<RuleSpec> {
        self.fields
            .get(&field)
            .cloned()
            .or_else(|| default_field_rules().remove(&field))
            .unwrap_or_default()
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}
