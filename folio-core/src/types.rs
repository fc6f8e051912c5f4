use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

// ===== RAW INPUT =====
// TextRun is what the external extraction collaborator hands us. Everything
// downstream is derived from these values and never written back.

bitflags! {
    /// Span flags as reported by PyMuPDF `get_text("dict")`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FontFlags: u32 {
        const SUPERSCRIPT = 1;
        const ITALIC = 2;
        const SERIFED = 4;
        const MONOSPACED = 8;
        const BOLD = 16;
    }
}

impl FontFlags {
    /// Interpret a raw flag value. Negative or oversized values carry no style.
    pub fn from_raw(raw: i64) -> Self {
        u32::try_from(raw)
            .map(FontFlags::from_bits_truncate)
            .unwrap_or_else(|_| FontFlags::empty())
    }
}

/// Read a flag value without failing the document: anything that is not an
/// integer (or an integral float) carries no style
pub(crate) fn lenient_flags<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let flags = match Value::deserialize(deserializer)? {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        _ => None,
    };
    Ok(flags.unwrap_or_else(|| {
        log::debug!("Unreadable style flags, treating run as unstyled");
        0
    }))
}

/// One contiguous span of PDF text sharing a font
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    pub text: String,
    #[serde(rename = "font", alias = "font_name", default)]
    pub font_name: String,
    /// Raw style bitmask, normalized by the style resolver
    #[serde(default, deserialize_with = "lenient_flags")]
    pub flags: i64,
    #[serde(rename = "size", alias = "font_size", default)]
    pub font_size: f32,
    /// 0-indexed page
    #[serde(default)]
    pub page: u32,
    /// Top of the run; grows downward
    #[serde(default)]
    pub y: f32,
    #[serde(default)]
    pub x: f32,
}

impl TextRun {
    pub fn new(text: impl Into<String>, font_name: impl Into<String>, flags: i64, font_size: f32) -> Self {
        Self {
            text: text.into(),
            font_name: font_name.into(),
            flags,
            font_size,
            page: 0,
            y: 0.0,
            x: 0.0,
        }
    }

    pub fn at(mut self, page: u32, y: f32) -> Self {
        self.page = page;
        self.y = y;
        self
    }

    pub fn with_x(mut self, x: f32) -> Self {
        self.x = x;
        self
    }
}

// ===== STYLED FRAGMENTS =====

/// Semantic style resolved from flags and font name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextStyle {
    #[default]
    Regular,
    Italic,
    Bold,
    BoldItalic,
}

impl TextStyle {
    pub fn from_parts(italic: bool, bold: bool) -> Self {
        match (italic, bold) {
            (false, false) => TextStyle::Regular,
            (true, false) => TextStyle::Italic,
            (false, true) => TextStyle::Bold,
            (true, true) => TextStyle::BoldItalic,
        }
    }

    pub fn is_italic(&self) -> bool {
        matches!(self, TextStyle::Italic | TextStyle::BoldItalic)
    }

    pub fn is_bold(&self) -> bool {
        matches!(self, TextStyle::Bold | TextStyle::BoldItalic)
    }
}

/// A run (or a grouped line of runs) with resolved style and markup applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyledFragment {
    /// Raw text without markup
    pub text: String,
    /// Text wrapped in `<b>`/`<i>` markers
    pub markup: String,
    pub style: TextStyle,
    pub font_name: String,
    pub font_size: f32,
    pub page: u32,
    pub y: f32,
    pub x: f32,
}

impl StyledFragment {
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Where a fragment sits in its document
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DocumentPosition {
    pub page: u32,
    /// Index of the fragment in reading order
    pub index: usize,
    /// 0.0 = top of the page's text extent, 1.0 = bottom
    pub vertical_fraction: f32,
}

impl DocumentPosition {
    pub fn top_of_first_page() -> Self {
        Self {
            page: 0,
            index: 0,
            vertical_fraction: 0.0,
        }
    }
}

// ===== OUTPUT SCHEMA =====

/// Output fields of a record, in column order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Field {
    Title,
    #[serde(rename = "中文書名", alias = "TranslatedTitle")]
    TranslatedTitle,
    Category,
    Author,
    Translator,
    Illustrator,
    Detail,
    #[serde(alias = "Rights Sold")]
    RightsSold,
    #[serde(alias = "More Info")]
    MoreInfo,
    Tags,
}

/// How the assembler folds several fragments of one field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// First fragment wins
    Single,
    /// Split, de-duplicated, joined with ", "
    Multi,
    /// Concatenated in source order, markup preserved
    LongForm,
}

impl Field {
    /// Schema (column) order
    pub const ALL: [Field; 10] = [
        Field::Title,
        Field::TranslatedTitle,
        Field::Category,
        Field::Author,
        Field::Translator,
        Field::Illustrator,
        Field::Detail,
        Field::RightsSold,
        Field::MoreInfo,
        Field::Tags,
    ];

    /// Classification order. Detail is the catch-all and is evaluated last,
    /// outside of the rule loop.
    pub const PRIORITY: [Field; 9] = [
        Field::Title,
        Field::TranslatedTitle,
        Field::Translator,
        Field::Illustrator,
        Field::Author,
        Field::Category,
        Field::RightsSold,
        Field::MoreInfo,
        Field::Tags,
    ];

    pub fn column_name(&self) -> &'static str {
        match self {
            Field::Title => "Title",
            Field::TranslatedTitle => "中文書名",
            Field::Category => "Category",
            Field::Author => "Author",
            Field::Translator => "Translator",
            Field::Illustrator => "Illustrator",
            Field::Detail => "Detail",
            Field::RightsSold => "Rights Sold",
            Field::MoreInfo => "More Info",
            Field::Tags => "Tags",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Field::Title | Field::TranslatedTitle | Field::Category => FieldKind::Single,
            Field::Author | Field::Translator | Field::Illustrator | Field::Tags => FieldKind::Multi,
            Field::Detail | Field::MoreInfo | Field::RightsSold => FieldKind::LongForm,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

/// Which kind of predicate put a fragment into its field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Position,
    Pattern,
    Keyword,
    CatchAll,
    Unmatched,
}

/// A fragment with its field assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedFragment {
    pub fragment: StyledFragment,
    pub position: DocumentPosition,
    /// None means unclassified
    pub field: Option<Field>,
    /// Value contributed to the field (markup, possibly with a keyword prefix removed)
    pub value: String,
    pub matched_by: MatchKind,
}

impl ClassifiedFragment {
    pub fn unclassified(fragment: StyledFragment, position: DocumentPosition) -> Self {
        Self {
            fragment,
            position,
            field: None,
            value: String::new(),
            matched_by: MatchKind::Unmatched,
        }
    }

    pub fn is_classified(&self) -> bool {
        self.field.is_some()
    }
}

/// Structured bibliographic output for one document. Every field is always
/// present; unfilled ones are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "中文書名")]
    pub translated_title: String,
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "Author")]
    pub author: String,
    #[serde(rename = "Translator")]
    pub translator: String,
    #[serde(rename = "Illustrator")]
    pub illustrator: String,
    #[serde(rename = "Detail")]
    pub detail: String,
    #[serde(rename = "Rights Sold")]
    pub rights_sold: String,
    #[serde(rename = "More Info")]
    pub more_info: String,
    #[serde(rename = "Tags")]
    pub tags: String,
    #[serde(rename = "Source_File")]
    pub source_file: String,
}

impl Record {
    pub fn empty(source_file: impl Into<String>) -> Self {
        Self {
            source_file: source_file.into(),
            ..Self::default()
        }
    }

    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::Title => &self.title,
            Field::TranslatedTitle => &self.translated_title,
            Field::Category => &self.category,
            Field::Author => &self.author,
            Field::Translator => &self.translator,
            Field::Illustrator => &self.illustrator,
            Field::Detail => &self.detail,
            Field::RightsSold => &self.rights_sold,
            Field::MoreInfo => &self.more_info,
            Field::Tags => &self.tags,
        }
    }

    pub(crate) fn slot_mut(&mut self, field: Field) -> &mut String {
        match field {
            Field::Title => &mut self.title,
            Field::TranslatedTitle => &mut self.translated_title,
            Field::Category => &mut self.category,
            Field::Author => &mut self.author,
            Field::Translator => &mut self.translator,
            Field::Illustrator => &mut self.illustrator,
            Field::Detail => &mut self.detail,
            Field::RightsSold => &mut self.rights_sold,
            Field::MoreInfo => &mut self.more_info,
            Field::Tags => &mut self.tags,
        }
    }

    /// Field values in schema order
    pub fn values(&self) -> impl Iterator<Item = (Field, &str)> + '_ {
        Field::ALL.iter().map(move |field| (*field, self.get(*field)))
    }

    /// True when no schema field received a value
    pub fn is_empty(&self) -> bool {
        self.values().all(|(_, value)| value.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn font_flags_ignore_negative_values() {
        assert_eq!(FontFlags::from_raw(-1), FontFlags::empty());
        assert_eq!(FontFlags::from_raw(i64::MAX), FontFlags::empty());
        assert!(FontFlags::from_raw(18).contains(FontFlags::ITALIC | FontFlags::BOLD));
    }

    #[test]
    fn unreadable_flags_fall_back_to_no_style() {
        let runs: Vec<TextRun> = serde_json::from_str(
            r#"[
                {"text": "a", "flags": 2.0},
                {"text": "b", "flags": null},
                {"text": "c", "flags": "bold"},
                {"text": "d", "flags": 2.5},
                {"text": "e"}
            ]"#,
        )
        .unwrap();
        let flags: Vec<i64> = runs.iter().map(|r| r.flags).collect();
        assert_eq!(flags, vec![2, 0, 0, 0, 0]);
    }

    #[test]
    fn record_serializes_columns_in_schema_order() {
        let record = Record::empty("a.pdf");
        let json = serde_json::to_string(&record).unwrap();
        let title = json.find("\"Title\"").unwrap();
        let zh = json.find("\"中文書名\"").unwrap();
        let tags = json.find("\"Tags\"").unwrap();
        let source = json.find("\"Source_File\"").unwrap();
        assert!(title < zh && zh < tags && tags < source);
    }

    #[test]
    fn field_names_accept_aliases() {
        let field: Field = serde_json::from_str("\"TranslatedTitle\"").unwrap();
        assert_eq!(field, Field::TranslatedTitle);
        let field: Field = serde_json::from_str("\"More Info\"").unwrap();
        assert_eq!(field, Field::MoreInfo);
    }

    #[test]
    fn empty_record_has_every_field() {
        let record = Record::empty("x.pdf");
        assert_eq!(record.values().count(), Field::ALL.len());
        assert!(record.is_empty());
    }
}
