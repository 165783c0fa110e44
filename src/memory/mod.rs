//! Conversation memory helpers.
//!
//! This module provides utilities for:
//! - Rendering a conversation as a transcript for prompts
//! - Keeping prompt context within a token window
//!
//! Token counts everywhere in the engine use [`estimate_tokens`].

use crate::types::{ConversationState, Turn, TurnRole};

/// Default number of recent turns included in a clarification prompt.
pub const DEFAULT_HISTORY_WINDOW: usize = 24;

/// Default token budget for a transcript embedded in a prompt.
pub const DEFAULT_TRANSCRIPT_TOKENS: usize = 3_000;

/// Estimates token count for a piece of text (rough approximation).
///
/// Uses a simple heuristic of ~4 characters per token for English text.
/// This is an approximation and may vary by tokenizer.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Keeps the most recent `window_size` turns.
pub fn truncate_history(history: &[Turn], window_size: usize) -> Vec<Turn> {
    if history.len() <= window_size {
        history.to_vec()
    } else {
        history[history.len() - window_size..].to_vec()
    }
}

/// Smallest share of the budget a turn is clipped to before older turns go.
const MIN_TURN_TOKENS: usize = 16;

const CLIP_MARKER: &str = "\n[...]\n";

/// Truncates history to fit within a token budget.
///
/// Oversized turns are clipped to a common per-turn cap (head and tail kept)
/// so short answers survive next to a long paste. Oldest turns are dropped
/// only when the cap would fall below [`MIN_TURN_TOKENS`]. A non-empty history
/// never yields an empty window.
pub fn truncate_history_to_tokens(history: &[Turn], token_budget: usize) -> Vec<Turn> {
    for start in 0..history.len() {
        let window = &history[start..];
        let sizes: Vec<usize> = window.iter().map(|t| estimate_tokens(&t.content)).collect();
        if let Some(cap) = turn_cap(&sizes, token_budget) {
            return window
                .iter()
                .map(|turn| Turn {
                    content: clip_to_tokens(&turn.content, cap),
                    ..turn.clone()
                })
                .collect();
        }
    }
    Vec::new()
}

/// Largest per-turn size that fits `sizes` into `budget`, if usable.
fn turn_cap(sizes: &[usize], budget: usize) -> Option<usize> {
    let total_at = |cap: usize| sizes.iter().map(|s| (*s).min(cap)).sum::<usize>();
    let largest = sizes.iter().copied().max().unwrap_or(0);
    if total_at(largest) <= budget {
        return Some(largest);
    }

    let (mut low, mut high) = (0, largest);
    while low < high {
        let mid = (low + high).div_ceil(2);
        if total_at(mid) <= budget {
            low = mid;
        } else {
            high = mid - 1;
        }
    }
    (low >= MIN_TURN_TOKENS || sizes.len() == 1).then_some(low)
}

/// Keeps the head and tail of `text` within roughly `tokens` tokens.
fn clip_to_tokens(text: &str, tokens: usize) -> String {
    if estimate_tokens(text) <= tokens {
        return text.to_string();
    }
    let room = (tokens * 4).saturating_sub(CLIP_MARKER.len());
    let head_end = floor_char_boundary(text, room * 2 / 3);
    let tail_start = ceil_char_boundary(text, text.len() - (room - room * 2 / 3));
    format!("{}{}{}", &text[..head_end], CLIP_MARKER, &text[tail_start..])
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(text: &str, mut index: usize) -> usize {
    while !text.is_char_boundary(index) {
        index += 1;
    }
    index
}

/// Renders the conversation as a `User:` / `Assistant:` transcript.
///
/// # Example
/// ```ignore
/// let transcript = format_transcript(&conversation);
/// // "User: I'm a nurse\nAssistant: Where are you located?\nUser: Bristol"
/// ```
pub fn format_transcript(conversation: &ConversationState) -> String {
    let window = truncate_history(conversation.turns(), DEFAULT_HISTORY_WINDOW);
    let window = truncate_history_to_tokens(&window, DEFAULT_TRANSCRIPT_TOKENS);
    window
        .iter()
        .map(|turn| match turn.role {
            TurnRole::User => format!("User: {}", turn.content.trim()),
            TurnRole::Assistant => format!("Assistant: {}", turn.content.trim()),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
