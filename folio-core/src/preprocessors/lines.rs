// Contiguous-run grouping: runs that share a visual line become one fragment.
//
// Adjacent members with the same style share one marker pair, so a title split
// into several italic spans comes out as a single `<i>...</i>` span.

use super::style::wrap;
use crate::types::{StyledFragment, TextStyle};
use std::cmp::Ordering;

/// Group consecutive fragments of one page whose vertical positions lie
/// within `tolerance` of the line's first fragment. Blank fragments are dropped.
pub fn group_lines(fragments: Vec<StyledFragment>, tolerance: f32) -> Vec<StyledFragment> {
    let mut lines = Vec::new();
    let mut current: Vec<StyledFragment> = Vec::new();

    for fragment in fragments.into_iter().filter(|f| !f.is_blank()) {
        let same_line = current
            .first()
            .map(|first| first.page == fragment.page && (first.y - fragment.y).abs() <= tolerance)
            .unwrap_or(false);

        if !same_line && !current.is_empty() {
            lines.push(merge_line(std::mem::take(&mut current)));
        }
        current.push(fragment);
    }

    if !current.is_empty() {
        lines.push(merge_line(current));
    }

    lines
}

fn merge_line(mut members: Vec<StyledFragment>) -> StyledFragment {
    members.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(Ordering::Equal));

    // Coalesce adjacent members sharing a style
    let mut segments: Vec<(TextStyle, Vec<&str>)> = Vec::new();
    for member in &members {
        let text = member.text.trim();
        match segments.last_mut() {
            Some((style, texts)) if *style == member.style => texts.push(text),
            _ => segments.push((member.style, vec![text])),
        }
    }

    let markup = segments
        .iter()
        .map(|(style, texts)| wrap(*style, &texts.join(" ")))
        .collect::<Vec<_>>()
        .join(" ");
    let text = members
        .iter()
        .map(|m| m.text.trim())
        .collect::<Vec<_>>()
        .join(" ");
    let style = if segments.len() == 1 {
        segments[0].0
    } else {
        TextStyle::Regular
    };
    let font_size = members.iter().map(|m| m.font_size).sum::<f32>() / members.len() as f32;

    let first = &members[0];
    StyledFragment {
        text,
        markup,
        style,
        font_name: first.font_name.clone(),
        font_size,
        page: first.page,
        y: first.y,
        x: first.x,
    }
}
