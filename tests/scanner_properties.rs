//! Property tests over generated well-nested buffers.

use proptest::prelude::*;
use template_patcher::{match_pairs, repair, report, RepairPolicy};

/// Literal content that can never form or break a tag.
fn content() -> impl Strategy<Value = String> {
    "[ a-zA-Z0-9.,:;]{0,12}".prop_map(|s| s)
}

fn tag_name() -> impl Strategy<Value = String> {
    "[a-z$_][a-zA-Z0-9_.$]{0,8}".prop_map(|s| s)
}

/// A well-nested buffer: blocks open with `{#name}` or `{^name}` and close
/// with the explicit `{/name}`, nesting up to 4 deep.
fn well_nested() -> impl Strategy<Value = String> {
    content().prop_recursive(4, 64, 4, |inner| {
        (
            tag_name(),
            any::<bool>(),
            prop::collection::vec(inner, 0..4),
        )
            .prop_map(|(name, inverted, parts)| {
                let sigil = if inverted { '^' } else { '#' };
                format!("{{{sigil}{name}}}{}{{/{name}}}", parts.concat())
            })
    })
}

/// Like [`well_nested`], but every block closes with the anonymous `{/}`.
fn well_nested_anonymous() -> impl Strategy<Value = String> {
    content().prop_recursive(4, 64, 4, |inner| {
        (tag_name(), prop::collection::vec(inner, 0..4))
            .prop_map(|(name, parts)| format!("{{#{name}}}{}{{/}}", parts.concat()))
    })
}

proptest! {
    #[test]
    fn well_nested_buffers_report_clean(buffer in well_nested()) {
        let rep = report(&buffer);
        prop_assert!(rep.is_balanced());
        prop_assert!(rep.diagnostics.is_empty());
    }

    #[test]
    fn well_nested_opens_all_match(buffer in well_nested()) {
        for pair in match_pairs(&buffer) {
            prop_assert!(pair.closing.is_some());
            let close = pair.closing.unwrap();
            prop_assert!(close.start >= pair.opening.end);
        }
    }

    #[test]
    fn explicitize_balances_anonymous_buffers(buffer in well_nested_anonymous()) {
        let outcome = repair(&buffer, &RepairPolicy::Explicitize { only: None }).unwrap();
        let after = report(&outcome.buffer);
        prop_assert!(after.is_balanced());
        prop_assert!(after.diagnostics.is_empty());
    }

    #[test]
    fn explicitize_is_idempotent(buffer in well_nested_anonymous()) {
        let once = repair(&buffer, &RepairPolicy::Explicitize { only: None }).unwrap();
        let twice = repair(&once.buffer, &RepairPolicy::Explicitize { only: None }).unwrap();
        prop_assert_eq!(once.buffer, twice.buffer);
        prop_assert!(twice.edits.is_empty());
    }

    #[test]
    fn scan_never_panics_on_arbitrary_text(buffer in "[\\{\\}#^/a-z ]{0,64}") {
        let _ = report(&buffer);
        let _ = match_pairs(&buffer);
    }
}
