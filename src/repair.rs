//! Balance repairer: rewrites a buffer so every block tag is explicitly and
//! unambiguously paired.
//!
//! Each policy computes its edits against the input buffer, then hands the
//! whole list to [`SpliceEdit::apply_all`] for one bottom-to-top pass. No
//! policy ever mutates incrementally; offsets are only ever interpreted
//! against the buffer they were computed from.
//!
//! Structural defects the policy cannot fix are returned as diagnostics in
//! the outcome, never raised. The only errors out of [`repair`] are
//! programmer errors (out-of-range anchors, overlapping edits).

use crate::edit::{EditError, SpliceEdit};
use crate::report::{report, Diagnostic};
use crate::scanner::{match_pairs, scan};
use crate::tag::TagKind;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Where `SynthesizeMissing` places a synthesized close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CloseAnchor {
    /// Append at the very end of the buffer.
    BufferEnd,
    /// Insert at a caller-chosen byte offset (e.g. the end of an enclosing
    /// structural boundary). Must lie on a char boundary within the buffer.
    Offset(usize),
}

/// A repair strategy. Every policy re-derives everything from the buffer it
/// is given; nothing is cached between invocations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RepairPolicy {
    /// Rewrite the matching `{/}` of every open tag into the explicit named
    /// close for that tag. With `only` set, restricted to those names.
    Explicitize { only: Option<Vec<String>> },

    /// For every open tag with no resolvable close, insert a synthesized
    /// named close at the anchor. Count-balancing only: placement is a
    /// heuristic, and the outcome is flagged `best_effort`.
    SynthesizeMissing { anchor: CloseAnchor },

    /// Delete excess named closes until every name's counts balance.
    /// Orphan closes go first; any remainder is pruned from the end of the
    /// buffer backward.
    PruneExtra,
}

/// Result of one repair pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepairOutcome {
    /// The rewritten buffer. Equal to the input when nothing applied.
    pub buffer: String,
    /// The edits that were applied, offsets relative to the *input* buffer.
    pub edits: Vec<SpliceEdit>,
    /// True when the policy cannot guarantee semantic correctness
    /// (synthesized closes may be misplaced).
    pub best_effort: bool,
    /// Defects observed during the pass, including ones the policy did not
    /// or could not fix.
    pub diagnostics: Vec<Diagnostic>,
}

impl RepairOutcome {
    fn noop(buffer: &str, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            buffer: buffer.to_string(),
            edits: Vec::new(),
            best_effort: false,
            diagnostics,
        }
    }
}

/// Apply a repair policy to a buffer.
///
/// Postcondition for `Explicitize` and `PruneExtra`: re-running
/// [`report`] on the returned buffer shows every targeted name balanced.
/// `SynthesizeMissing` guarantees count balance but not placement.
pub fn repair(buffer: &str, policy: &RepairPolicy) -> Result<RepairOutcome, EditError> {
    match policy {
        RepairPolicy::Explicitize { only } => explicitize(buffer, only.as_deref()),
        RepairPolicy::SynthesizeMissing { anchor } => synthesize_missing(buffer, *anchor),
        RepairPolicy::PruneExtra => prune_extra(buffer),
    }
}

fn explicitize(buffer: &str, only: Option<&[String]>) -> Result<RepairOutcome, EditError> {
    let pre = report(buffer);
    let mut diagnostics = Vec::new();

    // Anonymous closes that underflowed depth belong to no open; rewriting
    // them would guess. Surface and skip.
    let mut ambiguous: HashSet<usize> = HashSet::new();
    for diagnostic in &pre.diagnostics {
        if let Diagnostic::AmbiguousAnonymousClose { offset } = diagnostic {
            ambiguous.insert(*offset);
            diagnostics.push(diagnostic.clone());
        }
    }

    // How many more named closes each name can absorb before its close
    // count overshoots its open count. A rewrite with no headroom means an
    // existing named close of that name is already mis-placed (an orphan);
    // rewriting would unbalance the name, so it is skipped and surfaced.
    let mut headroom: BTreeMap<&str, usize> = pre
        .counts
        .iter()
        .map(|(name, c)| (name.as_str(), c.open.saturating_sub(c.close)))
        .collect();
    let mut skipped: BTreeSet<String> = BTreeSet::new();

    let pairs = match_pairs(buffer);

    if let Some(names) = only {
        for name in names {
            if !pairs.iter().any(|p| &p.opening.name == name) {
                diagnostics.push(Diagnostic::PolicyMismatch {
                    detail: format!("explicitize requested for {{#{name}}}, but no open tag with that name exists"),
                });
            }
        }
    }

    let mut edits = Vec::new();
    // Two opens can only claim the same close when nesting is already
    // malformed; first claim wins, the rest are left alone.
    let mut claimed: HashSet<usize> = HashSet::new();

    for pair in &pairs {
        if let Some(names) = only {
            if !names.contains(&pair.opening.name) {
                continue;
            }
        }
        match &pair.closing {
            Some(close) if close.kind == TagKind::AnonymousClose => {
                if ambiguous.contains(&close.start) || !claimed.insert(close.start) {
                    continue;
                }
                match headroom.get_mut(pair.opening.name.as_str()) {
                    Some(remaining) if *remaining > 0 => *remaining -= 1,
                    _ => {
                        skipped.insert(pair.opening.name.clone());
                        continue;
                    }
                }
                edits.push(SpliceEdit::replace(
                    close.start,
                    close.end,
                    format!("{{/{}}}", pair.opening.name),
                    "{/}",
                ));
            }
            Some(_) => {}
            None => diagnostics.push(Diagnostic::UnmatchedOpen {
                name: pair.opening.name.clone(),
                offset: pair.opening.start,
            }),
        }
    }

    // A skipped rewrite traces back to a mis-placed named close; carry the
    // orphan diagnostics so the caller sees why the branch was left alone.
    for diagnostic in &pre.diagnostics {
        if let Diagnostic::OrphanClose { name, .. } = diagnostic {
            if skipped.contains(name) {
                diagnostics.push(diagnostic.clone());
            }
        }
    }

    let new_buffer = SpliceEdit::apply_all(buffer, edits.clone())?;
    Ok(RepairOutcome {
        buffer: new_buffer,
        edits,
        best_effort: false,
        diagnostics,
    })
}

fn synthesize_missing(buffer: &str, anchor: CloseAnchor) -> Result<RepairOutcome, EditError> {
    let unmatched: Vec<_> = match_pairs(buffer)
        .into_iter()
        .filter(|pair| pair.closing.is_none())
        .collect();

    if unmatched.is_empty() {
        return Ok(RepairOutcome::noop(
            buffer,
            vec![Diagnostic::PolicyMismatch {
                detail: "synthesize-missing requested, but every open tag already has a close"
                    .to_string(),
            }],
        ));
    }

    let at = match anchor {
        CloseAnchor::BufferEnd => buffer.len(),
        CloseAnchor::Offset(offset) => offset,
    };

    // Innermost unmatched open closes first, so walk the opens in reverse
    // document order and emit one combined insertion per anchor.
    let mut inserted = String::new();
    let mut diagnostics = Vec::new();
    for pair in unmatched.iter().rev() {
        inserted.push_str(&format!("{{/{}}}", pair.opening.name));
        diagnostics.push(Diagnostic::UnmatchedOpen {
            name: pair.opening.name.clone(),
            offset: pair.opening.start,
        });
    }

    let edits = vec![SpliceEdit::insert(at, inserted)];
    let new_buffer = SpliceEdit::apply_all(buffer, edits.clone())?;

    Ok(RepairOutcome {
        buffer: new_buffer,
        edits,
        best_effort: true,
        diagnostics,
    })
}

fn prune_extra(buffer: &str) -> Result<RepairOutcome, EditError> {
    let pre = report(buffer);

    let mut excess: BTreeMap<&str, usize> = pre
        .counts
        .iter()
        .filter(|(_, c)| c.close > c.open)
        .map(|(name, c)| (name.as_str(), c.close - c.open))
        .collect();

    if excess.is_empty() {
        return Ok(RepairOutcome::noop(
            buffer,
            vec![Diagnostic::PolicyMismatch {
                detail: "prune-extra requested, but no name has more closes than opens"
                    .to_string(),
            }],
        ));
    }

    // Orphan closes are the extras we can point at with confidence; prune
    // those first, then fall back to the last closes of the name.
    let orphan_offsets: HashSet<usize> = pre
        .diagnostics
        .iter()
        .filter_map(|d| match d {
            Diagnostic::OrphanClose { offset, .. } => Some(*offset),
            _ => None,
        })
        .collect();

    let closes: Vec<_> = scan(buffer)
        .filter(|tag| tag.kind == TagKind::Close)
        .collect();

    let mut doomed: Vec<usize> = Vec::new();
    for tag in closes.iter().filter(|t| orphan_offsets.contains(&t.start)) {
        if let Some(remaining) = excess.get_mut(tag.name.as_str()) {
            if *remaining > 0 {
                *remaining -= 1;
                doomed.push(tag.start);
            }
        }
    }
    for tag in closes.iter().rev() {
        if doomed.contains(&tag.start) {
            continue;
        }
        if let Some(remaining) = excess.get_mut(tag.name.as_str()) {
            if *remaining > 0 {
                *remaining -= 1;
                doomed.push(tag.start);
            }
        }
    }

    let edits: Vec<SpliceEdit> = closes
        .iter()
        .filter(|tag| doomed.contains(&tag.start))
        .map(|tag| SpliceEdit::delete(tag.start, tag.end, &buffer[tag.start..tag.end]))
        .collect();

    let diagnostics = pre
        .diagnostics
        .into_iter()
        .filter(|d| matches!(d, Diagnostic::OrphanClose { .. }))
        .collect();

    let new_buffer = SpliceEdit::apply_all(buffer, edits.clone())?;
    Ok(RepairOutcome {
        buffer: new_buffer,
        edits,
        best_effort: false,
        diagnostics,
    })
}
