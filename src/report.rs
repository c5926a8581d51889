//! Balance reporter: per-name open/close counts plus structural diagnostics.
//!
//! The report is the product. Malformed templates are the normal case this
//! tool exists to handle, so structural defects are collected as values and
//! surfaced for a human to review, never raised as errors. A report is
//! always computed fresh from the buffer it is given; after any repair the
//! caller recomputes to confirm convergence.

use crate::scanner::{scan, unterminated_braces};
use crate::tag::{Tag, TagKind};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Jaro-Winkler threshold below which a "did you mean" hint is withheld.
const HINT_SIMILARITY_FLOOR: f64 = 0.8;

/// Open/close tally for one tag name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TagCounts {
    pub open: usize,
    pub close: usize,
}

impl TagCounts {
    pub fn is_balanced(&self) -> bool {
        self.open == self.close
    }
}

/// A structural defect found while scanning.
///
/// These are expected conditions, not errors: they are reported, and fixing
/// them requires an explicit repair invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum Diagnostic {
    /// A `{` with no following `}`; the surrounding content was treated as
    /// literal text.
    UnterminatedTag { offset: usize },

    /// An Open/InvertedOpen with no resolvable close before buffer end.
    UnmatchedOpen { name: String, offset: usize },

    /// A named close with no corresponding unresolved open at the point it
    /// was encountered.
    OrphanClose {
        name: String,
        offset: usize,
        /// Closest-matching open tag name in the buffer, when one is
        /// plausibly a typo for this close.
        closest_open: Option<String>,
    },

    /// An anonymous close encountered with no open block at all (depth
    /// underflow). Hard structural error: auto-repair must stop for this
    /// branch and a human decides.
    AmbiguousAnonymousClose { offset: usize },

    /// A repair was requested with parameters that match nothing in the
    /// buffer; the repair was a no-op.
    PolicyMismatch { detail: String },
}

impl Diagnostic {
    /// Buffer offset the diagnostic points at, if it has one.
    pub fn offset(&self) -> Option<usize> {
        match self {
            Diagnostic::UnterminatedTag { offset }
            | Diagnostic::UnmatchedOpen { offset, .. }
            | Diagnostic::OrphanClose { offset, .. }
            | Diagnostic::AmbiguousAnonymousClose { offset } => Some(*offset),
            Diagnostic::PolicyMismatch { .. } => None,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnterminatedTag { offset } => {
                write!(f, "unterminated '{{' at offset {offset} (treated as literal)")
            }
            Diagnostic::UnmatchedOpen { name, offset } => {
                write!(f, "unmatched open {{#{name}}} at offset {offset}: no close before buffer end")
            }
            Diagnostic::OrphanClose {
                name,
                offset,
                closest_open,
            } => {
                write!(f, "orphan close {{/{name}}} at offset {offset}: no open block with this name")?;
                if let Some(hint) = closest_open {
                    write!(f, " (closest open: {{#{hint}}})")?;
                }
                Ok(())
            }
            Diagnostic::AmbiguousAnonymousClose { offset } => {
                write!(
                    f,
                    "anonymous close {{/}} at offset {offset} with no open block: nesting is malformed, human review required"
                )
            }
            Diagnostic::PolicyMismatch { detail } => write!(f, "repair was a no-op: {detail}"),
        }
    }
}

/// Aggregate balance diagnostic for one buffer state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TagBalanceReport {
    /// Per-name tallies. Anonymous closes never contribute here; they only
    /// resolve to a name through depth matching. A name seen on only one
    /// side still appears, with the other count at 0.
    pub counts: BTreeMap<String, TagCounts>,
    pub diagnostics: Vec<Diagnostic>,
}

impl TagBalanceReport {
    /// True iff every tag name has equal open and close counts.
    pub fn is_balanced(&self) -> bool {
        self.counts.values().all(TagCounts::is_balanced)
    }

    /// True when the buffer has neither count imbalances nor structural
    /// diagnostics.
    pub fn is_clean(&self) -> bool {
        self.is_balanced() && self.diagnostics.is_empty()
    }

    /// Names whose counts do not balance, in name order.
    pub fn unbalanced(&self) -> impl Iterator<Item = (&str, TagCounts)> {
        self.counts
            .iter()
            .filter(|(_, counts)| !counts.is_balanced())
            .map(|(name, counts)| (name.as_str(), *counts))
    }
}

/// Scan the whole buffer once and compute the balance report.
pub fn report(buffer: &str) -> TagBalanceReport {
    let tags: Vec<Tag> = scan(buffer).collect();

    let open_names: Vec<&str> = {
        let mut names: Vec<&str> = tags
            .iter()
            .filter(|t| t.is_opening())
            .map(|t| t.name.as_str())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    };

    let mut counts: BTreeMap<String, TagCounts> = BTreeMap::new();
    let mut diagnostics = Vec::new();
    // Stack of currently-open, not-yet-closed blocks.
    let mut stack: Vec<&Tag> = Vec::new();

    for tag in &tags {
        match tag.kind {
            TagKind::Open | TagKind::InvertedOpen => {
                counts.entry(tag.name.clone()).or_default().open += 1;
                stack.push(tag);
            }
            TagKind::Close => {
                counts.entry(tag.name.clone()).or_default().close += 1;
                if !stack.iter().any(|open| open.name == tag.name) {
                    diagnostics.push(Diagnostic::OrphanClose {
                        name: tag.name.clone(),
                        offset: tag.start,
                        closest_open: closest_name(&tag.name, &open_names),
                    });
                }
                // Depth rule: any close pops the innermost block.
                stack.pop();
            }
            TagKind::AnonymousClose => {
                if stack.pop().is_none() {
                    diagnostics.push(Diagnostic::AmbiguousAnonymousClose { offset: tag.start });
                }
            }
        }
    }

    for open in stack {
        diagnostics.push(Diagnostic::UnmatchedOpen {
            name: open.name.clone(),
            offset: open.start,
        });
    }

    for offset in unterminated_braces(buffer) {
        diagnostics.push(Diagnostic::UnterminatedTag { offset });
    }

    TagBalanceReport {
        counts,
        diagnostics,
    }
}

/// Closest open tag name by Jaro-Winkler similarity, when close enough to
/// plausibly be a typo. Exact matches are excluded: an orphan close whose
/// name does exist open somewhere is a nesting problem, not a typo.
fn closest_name(target: &str, candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .filter(|&&candidate| candidate != target)
        .map(|&candidate| (candidate, strsim::jaro_winkler(target, candidate)))
        .filter(|&(_, score)| score >= HINT_SIMILARITY_FLOOR)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(candidate, _)| candidate.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_buffer() {
        let rep = report("{#a}{#b}x{/b}{/a}");
        assert!(rep.is_clean());
        assert_eq!(rep.counts["a"], TagCounts { open: 1, close: 1 });
        assert_eq!(rep.counts["b"], TagCounts { open: 1, close: 1 });
    }

    #[test]
    fn test_anonymous_close_not_counted_per_name() {
        let rep = report("{#foo}bar{/}");
        assert_eq!(rep.counts["foo"], TagCounts { open: 1, close: 0 });
        // Counts alone look unbalanced; the anonymous close is resolved
        // only through matching, and the stack pass sees it, so there is
        // no UnmatchedOpen diagnostic.
        assert!(rep.diagnostics.is_empty());
    }

    #[test]
    fn test_unmatched_open_reported() {
        let rep = report("{#x}no close");
        assert_eq!(rep.counts["x"], TagCounts { open: 1, close: 0 });
        assert!(matches!(
            rep.diagnostics.as_slice(),
            [Diagnostic::UnmatchedOpen { name, offset: 0 }] if name == "x"
        ));
    }

    #[test]
    fn test_orphan_close_reported_with_counts() {
        let rep = report("{/x}{#x}y{/x}");
        assert_eq!(rep.counts["x"], TagCounts { open: 1, close: 2 });
        assert!(matches!(
            rep.diagnostics.as_slice(),
            [Diagnostic::OrphanClose { name, offset: 0, .. }] if name == "x"
        ));
    }

    #[test]
    fn test_orphan_close_typo_hint() {
        let rep = report("{#hasMultipleGuardians}x{/hasMultipleGuardian}");
        let orphan = rep
            .diagnostics
            .iter()
            .find_map(|d| match d {
                Diagnostic::OrphanClose { closest_open, .. } => Some(closest_open.clone()),
                _ => None,
            })
            .expect("orphan close diagnostic");
        assert_eq!(orphan.as_deref(), Some("hasMultipleGuardians"));
    }

    #[test]
    fn test_anonymous_underflow_is_ambiguous() {
        let rep = report("text{/}more");
        assert!(matches!(
            rep.diagnostics.as_slice(),
            [Diagnostic::AmbiguousAnonymousClose { offset: 4 }]
        ));
    }

    #[test]
    fn test_unterminated_tag_reported() {
        let rep = report("{#a}{/a} then {broken");
        assert!(rep
            .diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::UnterminatedTag { offset: 14 })));
    }

    #[test]
    fn test_name_absent_on_one_side_defaults_to_zero() {
        let rep = report("{/only_close}");
        assert_eq!(
            rep.counts["only_close"],
            TagCounts { open: 0, close: 1 }
        );
    }

    #[test]
    fn test_report_recomputed_fresh() {
        assert_eq!(report("{#a}{/a}"), report("{#a}{/a}"));
    }
}
