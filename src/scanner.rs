//! Tag scanner: tokenizes template text and resolves block nesting.
//!
//! The scanner is deliberately forgiving. A `{` that never closes, or a
//! brace pair whose body does not parse as a tag, is plain content and is
//! skipped without error; malformed templates are the normal input here.
//! Callers that want "unterminated tag" diagnostics ask for them explicitly
//! via [`unterminated_braces`].

use crate::tag::{is_valid_name, Tag, TagKind};
use serde::Serialize;

/// Lazy left-to-right iterator over the tags in a buffer.
///
/// Restartable: constructing a new scanner over the same buffer yields the
/// same sequence. The scanner never mutates the buffer.
pub struct TagScanner<'a> {
    buffer: &'a str,
    pos: usize,
}

/// Scan a buffer from the beginning.
pub fn scan(buffer: &str) -> TagScanner<'_> {
    scan_from(buffer, 0)
}

/// Scan a buffer starting at the given byte offset.
///
/// `pos` must lie on a char boundary; offsets taken from previously scanned
/// tags always do.
pub fn scan_from(buffer: &str, pos: usize) -> TagScanner<'_> {
    TagScanner {
        buffer,
        pos: pos.min(buffer.len()),
    }
}

impl<'a> Iterator for TagScanner<'a> {
    type Item = Tag;

    fn next(&mut self) -> Option<Tag> {
        while self.pos < self.buffer.len() {
            let open = self.buffer[self.pos..].find('{')? + self.pos;
            // A `{` with no `}` in the remainder is literal content.
            let close = match self.buffer[open + 1..].find('}') {
                Some(rel) => open + 1 + rel,
                None => return None,
            };
            let body = &self.buffer[open + 1..close];
            if let Some(tag) = classify(body, open, close + 1) {
                self.pos = close + 1;
                return Some(tag);
            }
            // Not a tag. Resume just past the `{` so a tag starting inside
            // the rejected body (e.g. `{text{#x}`) is still found.
            self.pos = open + 1;
        }
        None
    }
}

fn classify(body: &str, start: usize, end: usize) -> Option<Tag> {
    let (kind, name) = match body.as_bytes().first() {
        Some(b'#') => (TagKind::Open, &body[1..]),
        Some(b'^') => (TagKind::InvertedOpen, &body[1..]),
        Some(b'/') => {
            let name = &body[1..];
            if name.is_empty() {
                return Some(Tag {
                    kind: TagKind::AnonymousClose,
                    name: String::new(),
                    start,
                    end,
                });
            }
            (TagKind::Close, name)
        }
        _ => return None,
    };

    if !is_valid_name(name) {
        return None;
    }

    Some(Tag {
        kind,
        name: name.to_string(),
        start,
        end,
    })
}

/// Find the close that pairs with an opening tag ending at `open_end`.
///
/// Depth starts at 1. Every Open/InvertedOpen encountered increments it
/// regardless of name (the grammar has no same-name-only nesting rule);
/// every Close or AnonymousClose decrements it. The close that brings depth
/// to 0 is the match; its start offset is returned. `None` means the buffer
/// ended with the block still open, a genuine structural defect the caller
/// must report rather than guess around.
///
/// Pure: same buffer and offset always yield the same result.
pub fn find_matching_close(buffer: &str, open_end: usize) -> Option<usize> {
    let mut depth: usize = 1;

    for tag in scan_from(buffer, open_end) {
        if tag.is_opening() {
            depth += 1;
        } else {
            depth -= 1;
            if depth == 0 {
                return Some(tag.start);
            }
        }
    }

    None
}

/// One opening tag resolved to its matching close, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedPair {
    pub opening: Tag,
    /// Absent when the buffer ends before the block closes.
    pub closing: Option<Tag>,
}

/// Resolve every opening tag in the buffer to its matching close.
///
/// Pairs are returned in document order of their opening tags. Proper
/// nesting is honored: the match is the depth-0 close, not merely the
/// closest one.
pub fn match_pairs(buffer: &str) -> Vec<MatchedPair> {
    scan(buffer)
        .filter(Tag::is_opening)
        .map(|opening| {
            let closing = find_matching_close(buffer, opening.end)
                .and_then(|offset| scan_from(buffer, offset).next())
                .filter(|tag| tag.is_closing());
            MatchedPair { opening, closing }
        })
        .collect()
}

/// Offsets of every `{` that has no `}` anywhere in the rest of the buffer.
///
/// These are literal content as far as [`scan`] is concerned; this check
/// exists for callers that want the diagnostic.
pub fn unterminated_braces(buffer: &str) -> Vec<usize> {
    let last_close = buffer.rfind('}');
    buffer
        .match_indices('{')
        .map(|(offset, _)| offset)
        .filter(|&offset| match last_close {
            Some(boundary) => offset > boundary,
            None => true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_basic_shapes() {
        let tags: Vec<Tag> = scan("{#foo}bar{/}").collect();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].kind, TagKind::Open);
        assert_eq!(tags[0].name, "foo");
        assert_eq!((tags[0].start, tags[0].end), (0, 6));
        assert_eq!(tags[1].kind, TagKind::AnonymousClose);
        assert_eq!((tags[1].start, tags[1].end), (9, 12));
    }

    #[test]
    fn test_scan_inverted_and_named_close() {
        let tags: Vec<Tag> = scan("{^$last}, {/$last}").collect();
        assert_eq!(tags[0].kind, TagKind::InvertedOpen);
        assert_eq!(tags[0].name, "$last");
        assert_eq!(tags[1].kind, TagKind::Close);
        assert_eq!(tags[1].name, "$last");
    }

    #[test]
    fn test_plain_braces_are_not_tags() {
        let tags: Vec<Tag> = scan("a {not a tag} b {x y} c").collect();
        assert!(tags.is_empty());
    }

    #[test]
    fn test_unterminated_brace_is_literal() {
        let tags: Vec<Tag> = scan("{#foo}text{unclosed").collect();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "foo");
    }

    #[test]
    fn test_tag_starting_inside_rejected_body() {
        let tags: Vec<Tag> = scan("{text{#x}more{/x}").collect();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].name, "x");
        assert_eq!(tags[1].kind, TagKind::Close);
    }

    #[test]
    fn test_adjacent_tags_not_merged() {
        let tags: Vec<Tag> = scan("{#a}{#b}{/b}{/a}").collect();
        assert_eq!(tags.len(), 4);
    }

    #[test]
    fn test_find_matching_close_flat() {
        let buffer = "{#foo}bar{/}";
        assert_eq!(find_matching_close(buffer, 6), Some(9));
    }

    #[test]
    fn test_find_matching_close_nested_depth() {
        // Inner {/} pairs with {#b}, outer {/} with {#a}.
        let buffer = "{#a}{#b}{/}{/}";
        assert_eq!(find_matching_close(buffer, 4), Some(11));
        assert_eq!(find_matching_close(buffer, 8), Some(8));
    }

    #[test]
    fn test_find_matching_close_ignores_names_for_depth() {
        // A nested block of any name increases depth.
        let buffer = "{#outer}{^inner}x{/inner}y{/outer}";
        assert_eq!(find_matching_close(buffer, 8), Some(17));
    }

    #[test]
    fn test_find_matching_close_unclosed() {
        assert_eq!(find_matching_close("{#x}no close", 4), None);
    }

    #[test]
    fn test_find_matching_close_is_pure() {
        let buffer = "{#a}{#b}{/}{/}";
        let first = find_matching_close(buffer, 4);
        let second = find_matching_close(buffer, 4);
        assert_eq!(first, second);
    }

    #[test]
    fn test_match_pairs_nested() {
        let pairs = match_pairs("{#a}{#b}{/}{/}");
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].opening.name, "a");
        assert_eq!(pairs[0].closing.as_ref().unwrap().start, 11);
        assert_eq!(pairs[1].opening.name, "b");
        assert_eq!(pairs[1].closing.as_ref().unwrap().start, 8);
    }

    #[test]
    fn test_match_pairs_unmatched_open() {
        let pairs = match_pairs("{#x}no close");
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].closing.is_none());
    }

    #[test]
    fn test_unterminated_braces() {
        assert_eq!(unterminated_braces("{#a}{/a} trailing {oops"), vec![18]);
        assert_eq!(unterminated_braces("no braces at all"), Vec::<usize>::new());
        assert_eq!(unterminated_braces("{a {b"), vec![0, 3]);
    }
}
