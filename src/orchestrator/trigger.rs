//! Per-channel trigger predicates.

use anchor::{Channel, MutationEvent};

/// What caused a channel to schedule a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerReason {
    /// Whitespace or punctuation right after a letter.
    WordBoundary,
    SentenceEnd,
    LineBreak,
    /// The idle fallback fired without a matching trigger.
    Idle,
    /// An insertion at least `paste_threshold` chars long.
    Paste,
    Focus,
    Explicit,
    /// Re-schedule after an accept.
    Accept,
}

impl TriggerReason {
    /// Immediate triggers bypass the predicate and are throttled by the
    /// channel cool-down.
    pub fn is_immediate(&self) -> bool {
        matches!(
            self,
            TriggerReason::Paste | TriggerReason::Focus | TriggerReason::Explicit
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerReason::WordBoundary => "word_boundary",
            TriggerReason::SentenceEnd => "sentence_end",
            TriggerReason::LineBreak => "line_break",
            TriggerReason::Idle => "idle",
            TriggerReason::Paste => "paste",
            TriggerReason::Focus => "focus",
            TriggerReason::Explicit => "explicit",
            TriggerReason::Accept => "accept",
        }
    }
}

fn is_boundary(c: char) -> bool {
    c.is_whitespace() || c.is_ascii_punctuation()
}

/// Evaluate a mutation against a channel's predicate. Deletions never
/// trigger.
pub fn evaluate(channel: Channel, event: &MutationEvent, paste_threshold: usize) -> Option<TriggerReason> {
    if event.inserted.is_empty() {
        return None;
    }
    if event.inserted_len() >= paste_threshold {
        return Some(TriggerReason::Paste);
    }

    match channel {
        Channel::Spelling => {
            let mut previous = event.preceding;
            for c in event.inserted.chars() {
                if is_boundary(c) && previous.is_some_and(char::is_alphabetic) {
                    return Some(TriggerReason::WordBoundary);
                }
                previous = Some(c);
            }
            None
        }
        Channel::Grammar | Channel::Style => {
            if event.inserted.contains(['.', '!', '?']) {
                Some(TriggerReason::SentenceEnd)
            } else if event.inserted.contains('\n') {
                Some(TriggerReason::LineBreak)
            } else {
                None
            }
        }
    }
}
