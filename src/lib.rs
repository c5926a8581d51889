//! Template Patcher: balance checker and repairer for block tags in
//! document template text
//!
//! Scans a text buffer for Mustache-style block tags (`{#name}`, `{^name}`,
//! `{/name}`, and the anonymous close `{/}`), resolves nesting by depth,
//! reports per-name open/close imbalances, and rewrites the buffer so every
//! block is explicitly and unambiguously paired.
//!
//! # Architecture
//!
//! All repair operations compile down to a single primitive: [`SpliceEdit`],
//! a verified byte-span replacement applied bottom-to-top in one pass.
//! Intelligence lives in span acquisition (the depth-tracked scanner and the
//! repair policies), not in the application logic.
//!
//! # Design
//!
//! - Every function re-derives everything from the buffer it is given; there
//!   is no state between invocations, because the external document is the
//!   only durable state and is never assumed consistent between calls.
//! - Structural defects (unbalanced tags, orphan closes) are expected input,
//!   collected into [`TagBalanceReport`] values and never raised as errors.
//!   Only programmer errors (bad spans, overlapping edits) fail loudly.
//! - Document packaging (DOCX/ZIP) stays behind the [`TemplateDocument`]
//!   seam; the core only ever sees text.
//!
//! # Example
//!
//! ```
//! use template_patcher::{repair, report, RepairPolicy};
//!
//! let buffer = "{#clients}{#kids}{/}{/}";
//! let outcome = repair(buffer, &RepairPolicy::Explicitize { only: None }).unwrap();
//! assert_eq!(outcome.buffer, "{#clients}{#kids}{/kids}{/clients}");
//! assert!(report(&outcome.buffer).is_clean());
//! ```

pub mod document;
pub mod edit;
pub mod repair;
pub mod report;
pub mod scanner;
pub mod tag;

// Re-exports
pub use document::{merge_split_tags, DocumentError, PlainTextDocument, TemplateDocument};
pub use edit::{EditError, EditVerification, SpliceEdit};
pub use repair::{repair, CloseAnchor, RepairOutcome, RepairPolicy};
pub use report::{report, Diagnostic, TagBalanceReport, TagCounts};
pub use scanner::{
    find_matching_close, match_pairs, scan, scan_from, unterminated_braces, MatchedPair,
    TagScanner,
};
pub use tag::{is_valid_name, Tag, TagKind};
