//! The fundamental repair primitive: verified byte-span replacement in a
//! text buffer.
//!
//! Every repair policy compiles down to a list of [`SpliceEdit`]s whose
//! offsets were computed against the *pre-edit* buffer. [`SpliceEdit::apply_all`]
//! sorts the list by offset descending and applies bottom-to-top in a single
//! pass, so no offset is invalidated by an earlier length-changing edit.

use serde::Serialize;
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// A single byte-span replacement with before-text verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[must_use = "SpliceEdit does nothing until apply_all() is called"]
pub struct SpliceEdit {
    /// Starting byte offset (inclusive)
    pub start: usize,
    /// Ending byte offset (exclusive)
    pub end: usize,
    /// Replacement text for `[start, end)`; empty for a pure deletion
    pub new_text: String,
    /// What we expect to find at the span before applying
    pub expected_before: EditVerification,
}

/// Verification strategy for edit safety.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EditVerification {
    /// Exact text match required
    ExactMatch(String),
    /// xxh3 hash of expected text (faster for large spans)
    Hash(u64),
}

impl EditVerification {
    /// Check if the provided text matches the verification criteria.
    pub fn matches(&self, text: &str) -> bool {
        match self {
            EditVerification::ExactMatch(expected) => text == expected,
            EditVerification::Hash(expected_hash) => xxh3_64(text.as_bytes()) == *expected_hash,
        }
    }

    /// Create verification from text, using hash for text over 1KB.
    pub fn from_text(text: &str) -> Self {
        if text.len() > 1024 {
            EditVerification::Hash(xxh3_64(text.as_bytes()))
        } else {
            EditVerification::ExactMatch(text.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum EditError {
    #[error("before-text verification failed at [{start}, {end}): expected {expected:?}, found {found:?}")]
    BeforeTextMismatch {
        start: usize,
        end: usize,
        expected: String,
        found: String,
    },

    #[error("invalid byte range: [{start}, {end}) in buffer of length {buffer_len}")]
    InvalidByteRange {
        start: usize,
        end: usize,
        buffer_len: usize,
    },

    #[error("edit boundary at byte {offset} splits a UTF-8 character")]
    NotCharBoundary { offset: usize },

    #[error("overlapping edits: [{start}, {end}) intersects [{other_start}, {other_end})")]
    OverlappingEdits {
        start: usize,
        end: usize,
        other_start: usize,
        other_end: usize,
    },
}

impl SpliceEdit {
    /// Create a replacement edit with automatic verification generation.
    pub fn replace(
        start: usize,
        end: usize,
        new_text: impl Into<String>,
        expected_before: &str,
    ) -> Self {
        Self {
            start,
            end,
            new_text: new_text.into(),
            expected_before: EditVerification::from_text(expected_before),
        }
    }

    /// Create an insertion at the given offset (empty span, nothing deleted).
    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self::replace(at, at, text, "")
    }

    /// Create a deletion of the given span.
    pub fn delete(start: usize, end: usize, expected_before: &str) -> Self {
        Self::replace(start, end, String::new(), expected_before)
    }

    /// Validate this edit against the buffer its offsets were computed from.
    fn validate(&self, buffer: &str) -> Result<(), EditError> {
        if self.start > self.end || self.end > buffer.len() {
            return Err(EditError::InvalidByteRange {
                start: self.start,
                end: self.end,
                buffer_len: buffer.len(),
            });
        }
        for offset in [self.start, self.end] {
            if !buffer.is_char_boundary(offset) {
                return Err(EditError::NotCharBoundary { offset });
            }
        }

        let current = &buffer[self.start..self.end];

        // Idempotency: an already-applied edit verifies trivially.
        if current == self.new_text {
            return Ok(());
        }

        if !self.expected_before.matches(current) {
            return Err(EditError::BeforeTextMismatch {
                start: self.start,
                end: self.end,
                expected: format!("{:?}", self.expected_before),
                found: current.to_string(),
            });
        }

        Ok(())
    }

    /// Apply a batch of edits to a buffer in a single pass.
    ///
    /// Edits are validated against the input buffer, checked for overlap,
    /// sorted by `start` descending, and applied bottom-to-top. Offsets in
    /// every edit must have been computed against `buffer` as passed in.
    ///
    /// Errors here are programmer errors (bad spans, overlapping edits,
    /// stale offsets); expected template defects never reach this layer.
    pub fn apply_all(buffer: &str, mut edits: Vec<SpliceEdit>) -> Result<String, EditError> {
        if edits.is_empty() {
            return Ok(buffer.to_string());
        }

        for edit in &edits {
            edit.validate(buffer)?;
        }

        // Descending by start; stable so same-offset insertions keep order.
        edits.sort_by(|a, b| b.start.cmp(&a.start));

        // Non-overlap: with descending order, the earlier span must end at
        // or before the later span starts.
        for window in edits.windows(2) {
            let (later, earlier) = (&window[0], &window[1]);
            if earlier.end > later.start {
                return Err(EditError::OverlappingEdits {
                    start: later.start,
                    end: later.end,
                    other_start: earlier.start,
                    other_end: earlier.end,
                });
            }
        }

        let mut out = buffer.to_string();
        for edit in &edits {
            out.replace_range(edit.start..edit.end, &edit.new_text);
        }

        Ok(out)
    }
}
