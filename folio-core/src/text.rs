// Text helpers shared by the classifier and the assembler.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref SPACE_BEFORE_PUNCT: Regex = Regex::new(r"\s+([.!?。！？,，;；])").unwrap();
    static ref SPACE_AFTER_OPEN_PAREN: Regex = Regex::new(r"\(\s+").unwrap();
    static ref SPACE_BEFORE_CLOSE_PAREN: Regex = Regex::new(r"\s+\)").unwrap();
}

/// CJK Unified Ideographs block
pub fn is_han(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// Share of non-whitespace characters that are Han ideographs
pub fn han_density(text: &str) -> f32 {
    let mut total = 0usize;
    let mut han = 0usize;
    for c in text.chars().filter(|c| !c.is_whitespace()) {
        total += 1;
        if is_han(c) {
            han += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        han as f32 / total as f32
    }
}

/// Collapse whitespace and drop stray spaces before punctuation
pub fn clean_text(text: &str) -> String {
    let text = WHITESPACE.replace_all(text, " ");
    let text = SPACE_BEFORE_PUNCT.replace_all(text.trim(), "$1");
    let text = SPACE_AFTER_OPEN_PAREN.replace_all(&text, "(");
    SPACE_BEFORE_CLOSE_PAREN.replace_all(&text, ")").into_owned()
}

/// First `max_chars` characters, with an ellipsis when cut
pub fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}
