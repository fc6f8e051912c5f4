// Paragraph merging for line fragments broken by hard PDF line wraps.
// Opt-in through `merge_paragraphs` in the classification config.

use super::style::{wrap, BOLD_CLOSE, ITALIC_CLOSE};
use crate::types::{StyledFragment, TextStyle};
use lazy_static::lazy_static;
use regex::Regex;

const HEADING_FONT_SIZE: f32 = 14.0;
const SECTION_PREFIXES: [&str; 7] = ["Chapter", "Part", "Section", "第", "章", "節", "篇"];

lazy_static! {
    static ref ENGLISH_HEADING: Regex = Regex::new(r"^[A-Z][a-zA-Z\s]{10,}").unwrap();
    static ref CHINESE_HEADING: Regex = Regex::new(r"^[一-鿿]{2,}[：:]").unwrap();
    static ref NUMBERED: Regex = Regex::new(r"^\d+[\.\)]\s*").unwrap();
    static ref SENTENCE_END: Regex = Regex::new(r"[.!?。！？]$").unwrap();
    static ref SENTENCE_PUNCT: Regex = Regex::new(r"[.!?。！？]").unwrap();
    static ref TRUNCATED_END: Regex = Regex::new(r"[,，\-\s]$").unwrap();
    static ref CONTINUATION_END: Regex = Regex::new(r"[-,，]$").unwrap();
}

/// Merge consecutive lines into paragraphs. Never merges across pages.
pub fn merge_paragraphs(lines: Vec<StyledFragment>) -> Vec<StyledFragment> {
    let mut merged: Vec<StyledFragment> = Vec::new();

    for line in lines.into_iter().filter(|l| !l.is_blank()) {
        match merged.last_mut() {
            Some(current)
                if current.page == line.page
                    && !is_new_paragraph(&line)
                    && should_merge(&current.text, &line.text) =>
            {
                join_into(current, &line);
            }
            _ => merged.push(line),
        }
    }

    merged
}

fn is_new_paragraph(line: &StyledFragment) -> bool {
    let text = line.text.trim();
    line.font_size > HEADING_FONT_SIZE
        || line.style.is_bold()
        || ENGLISH_HEADING.is_match(text)
        || CHINESE_HEADING.is_match(text)
        || NUMBERED.is_match(text)
        || SECTION_PREFIXES.iter().any(|prefix| text.starts_with(prefix))
}

fn should_merge(previous: &str, next: &str) -> bool {
    let previous = previous.trim();
    let next = next.trim();

    if SENTENCE_END.is_match(previous) {
        return false;
    }

    let first = next.chars().next();
    if first.is_some_and(|c| c.is_ascii_uppercase()) {
        // Only continue a line that looks cut off
        return TRUNCATED_END.is_match(previous)
            || previous.chars().count() < 30
            || !SENTENCE_PUNCT.is_match(previous);
    }
    if first.is_some_and(|c| c.is_ascii_lowercase()) {
        return true;
    }
    if CONTINUATION_END.is_match(previous) {
        return true;
    }

    previous.chars().count() < 50 && next.chars().count() < 50
}

fn join_into(current: &mut StyledFragment, line: &StyledFragment) {
    let next_text = line.text.trim();
    let hyphenated = current.text.trim_end().ends_with('-');

    current.text = if hyphenated {
        format!("{}{}", current.text.trim_end().trim_end_matches('-'), next_text)
    } else {
        format!("{} {}", current.text.trim_end(), next_text)
    };

    if current.style == line.style && current.style != TextStyle::Regular {
        // Same uniform style on both sides: one marker pair for the paragraph
        current.markup = wrap(current.style, &current.text);
    } else {
        let next_markup = line.markup.trim();
        current.markup = if hyphenated {
            format!("{}{}", drop_trailing_hyphen(current.markup.trim_end()), next_markup)
        } else {
            format!("{} {}", current.markup.trim_end(), next_markup)
        };
        current.style = TextStyle::Regular;
    }

    current.font_size = (current.font_size + line.font_size) / 2.0;
}

/// Remove a hyphen that may sit inside trailing closing markers
fn drop_trailing_hyphen(markup: &str) -> String {
    let mut body = markup;
    let mut closers = Vec::new();
    loop {
        if let Some(rest) = body.strip_suffix(BOLD_CLOSE) {
            closers.push(BOLD_CLOSE);
            body = rest;
        } else if let Some(rest) = body.strip_suffix(ITALIC_CLOSE) {
            closers.push(ITALIC_CLOSE);
            body = rest;
        } else {
            break;
        }
    }
    let body = body.strip_suffix('-').unwrap_or(body);
    closers.reverse();
    format!("{body}{}", closers.concat())
}
