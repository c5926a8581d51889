use serde::Serialize;

/// Lexical classification of a block tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TagKind {
    /// `{#name}` - opens a conditional/loop block
    Open,
    /// `{^name}` - opens an inverted (negated) block
    InvertedOpen,
    /// `{/name}` - closes the named block
    Close,
    /// `{/}` - closes the innermost open block by position
    AnonymousClose,
}

/// A block tag token found in template text.
///
/// Offsets are byte offsets into the buffer the tag was scanned from:
/// `start` points at the opening `{` (inclusive), `end` just past the
/// closing `}` (exclusive). They are only meaningful against the exact
/// buffer that produced them; any edit invalidates every offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tag {
    pub kind: TagKind,
    /// Tag name; empty for [`TagKind::AnonymousClose`].
    pub name: String,
    pub start: usize,
    pub end: usize,
}

impl Tag {
    /// True for `{#name}` and `{^name}`.
    pub fn is_opening(&self) -> bool {
        matches!(self.kind, TagKind::Open | TagKind::InvertedOpen)
    }

    /// True for `{/name}` and `{/}`.
    pub fn is_closing(&self) -> bool {
        matches!(self.kind, TagKind::Close | TagKind::AnonymousClose)
    }

    /// Render the tag back to its source form, e.g. `{#clients}`.
    pub fn render(&self) -> String {
        match self.kind {
            TagKind::Open => format!("{{#{}}}", self.name),
            TagKind::InvertedOpen => format!("{{^{}}}", self.name),
            TagKind::Close => format!("{{/{}}}", self.name),
            TagKind::AnonymousClose => "{/}".to_string(),
        }
    }
}

/// Check a tag name against the template grammar:
/// `[A-Za-z_$][A-Za-z0-9_.$]*`.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$'))
}
