//! Bracket extraction from market question text.
//!
//! Ladder questions name a measured value plus an optional direction
//! marker, e.g. "Will the high in NYC be 85°F or higher on March 3?".
//! Without a marker the question asks about the exact bracket. Returns
//! `None` for questions with no numeric value; those markets are
//! skipped for the cycle.

use crate::types::{BracketKind, ParsedBracket};

const AT_LEAST_MARKERS: [&str; 3] = ["or higher", "or above", "at least"];
const AT_MOST_MARKERS: [&str; 3] = ["or lower", "or below", "at most"];

pub fn parse_bracket(question: &str) -> Option<ParsedBracket> {
    let q = question.to_lowercase();
    let tokens = number_tokens(&q);
    if tokens.is_empty() {
        return None;
    }

    if let Some(pos) = find_marker(&q, &AT_LEAST_MARKERS) {
        return Some(ParsedBracket {
            kind: BracketKind::AtLeast,
            value: pick_value(&q, &tokens, Some(pos)),
        });
    }
    if let Some(pos) = find_marker(&q, &AT_MOST_MARKERS) {
        return Some(ParsedBracket {
            kind: BracketKind::AtMost,
            value: pick_value(&q, &tokens, Some(pos)),
        });
    }
    Some(ParsedBracket {
        kind: BracketKind::Exact,
        value: pick_value(&q, &tokens, None),
    })
}

fn find_marker(text: &str, markers: &[&str]) -> Option<usize> {
    markers.iter().filter_map(|m| text.find(m)).min()
}

/// Chooses which numeric token is the bracket value. A token written
/// with a degree symbol is the measurement, not a calendar date; next
/// preference is the token closest before the direction marker.
fn pick_value(text: &str, tokens: &[(usize, usize, f64)], marker_pos: Option<usize>) -> f64 {
    if let Some(&(_, _, value)) = tokens
        .iter()
        .find(|(_, end, _)| text[*end..].starts_with('°'))
    {
        return value;
    }
    if let Some(pos) = marker_pos {
        if let Some(&(_, _, value)) = tokens.iter().rev().find(|(start, _, _)| *start < pos) {
            return value;
        }
    }
    tokens[0].2
}

/// All numeric tokens in `text` as (start, end, value). Accepts a
/// leading minus and a single decimal point.
fn number_tokens(text: &str) -> Vec<(usize, usize, f64)> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let starts_number = bytes[i].is_ascii_digit()
            || (bytes[i] == b'-' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit));
        if !starts_number {
            i += 1;
            continue;
        }
        let start = i;
        if bytes[i] == b'-' {
            i += 1;
        }
        let mut seen_dot = false;
        while i < bytes.len() {
            if bytes[i].is_ascii_digit() {
                i += 1;
            } else if bytes[i] == b'.'
                && !seen_dot
                && bytes.get(i + 1).is_some_and(u8::is_ascii_digit)
            {
                seen_dot = true;
                i += 1;
            } else {
                break;
            }
        }
        if let Ok(value) = text[start..i].parse() {
            tokens.push((start, i, value));
        }
    }
    tokens
}
