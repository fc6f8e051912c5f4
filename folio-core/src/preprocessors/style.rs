//! Style Resolver
//!
//! Turns the low-level font flags and font name of a [`TextRun`] into a
//! semantic [`TextStyle`] and wraps the run text in inline markup:
//!
//! ```text
//! italic       → <i>text</i>
//! bold         → <b>text</b>
//! bold+italic  → <b><i>text</i></b>
//! ```
//!
//! The markers are part of the record contract and must stay byte-exact.

use crate::types::{FontFlags, StyledFragment, TextRun, TextStyle};

pub const ITALIC_OPEN: &str = "<i>";
pub const ITALIC_CLOSE: &str = "</i>";
pub const BOLD_OPEN: &str = "<b>";
pub const BOLD_CLOSE: &str = "</b>";

const ITALIC_NAME_HINTS: [&str; 2] = ["italic", "oblique"];
const BOLD_NAME_HINTS: [&str; 1] = ["bold"];

/// Resolve one run into a styled fragment. Never fails: unreadable flags
/// resolve to regular text.
pub fn resolve(run: TextRun) -> StyledFragment {
    let style = resolve_style(run.flags, &run.font_name);
    let markup = wrap(style, &run.text);
    StyledFragment {
        text: run.text,
        markup,
        style,
        font_name: run.font_name,
        font_size: run.font_size,
        page: run.page,
        y: run.y,
        x: run.x,
    }
}

/// Semantic style from the flag bitmask OR hints in the font name
pub fn resolve_style(flags: i64, font_name: &str) -> TextStyle {
    let flags = FontFlags::from_raw(flags);
    let name = font_name.to_lowercase();

    let italic = flags.contains(FontFlags::ITALIC)
        || ITALIC_NAME_HINTS.iter().any(|hint| name.contains(hint));
    let bold = flags.contains(FontFlags::BOLD) || BOLD_NAME_HINTS.iter().any(|hint| name.contains(hint));

    TextStyle::from_parts(italic, bold)
}

/// Wrap text in the markers for `style`. Bold is always outermost.
pub fn wrap(style: TextStyle, text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    match style {
        TextStyle::Regular => text.to_string(),
        TextStyle::Italic => format!("{ITALIC_OPEN}{text}{ITALIC_CLOSE}"),
        TextStyle::Bold => format!("{BOLD_OPEN}{text}{BOLD_CLOSE}"),
        TextStyle::BoldItalic => format!("{BOLD_OPEN}{ITALIC_OPEN}{text}{ITALIC_CLOSE}{BOLD_CLOSE}"),
    }
}

/// Remove the four inline markers, leaving the raw text
pub fn strip_markup(markup: &str) -> String {
    [ITALIC_OPEN, ITALIC_CLOSE, BOLD_OPEN, BOLD_CLOSE]
        .iter()
        .fold(markup.to_string(), |text, marker| text.replace(marker, ""))
}
