//! Note record model and the bit-exact local file format.
//!
//! A note on disk is the note body followed by a metadata tail:
//!
//! ```text
//! <!-- note-id: 9f8a7c6b5e4d3c2b1a0f9e8d7c6b5a4f -->   (optional)
//! <content lines>
//!
//! Tags: a, b, c                                        (omitted if empty)
//! System tags: pinned                                  (omitted if empty)
//! ```
//!
//! `parse` and `render` are lossless inverses for content, tags,
//! system tags and the identifier.

/// File extension for note files.
pub const NOTE_EXT: &str = ".md";

const ID_PREFIX: &str = "<!-- note-id: ";
const ID_SUFFIX: &str = " -->";
const TAGS_PREFIX: &str = "Tags: ";
const SYSTEM_TAGS_PREFIX: &str = "System tags: ";

/// Characters not allowed in filenames, replaced with `_`.
const FORBIDDEN: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Maximum length (in characters) of a derived filename stem.
const MAX_STEM_LEN: usize = 100;

/// Canonical in-memory representation of a note, local or remote.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoteRecord {
    /// Stable identifier, 32 lowercase hex characters. None for
    /// local-only legacy files that never carried a marker.
    pub id: Option<String>,
    /// Note body. The first line is the title.
    pub content: String,
    /// User tags, in order. Only a *single* tag influences placement.
    pub tags: Vec<String>,
    /// Server-side metadata tags (pinned, markdown, ...). Never
    /// affects placement.
    pub system_tags: Vec<String>,
    /// Logically deleted on the remote side.
    pub deleted: bool,
    /// Seconds since epoch; stamped onto the local file after writes.
    pub modification_time: Option<f64>,
}

impl NoteRecord {
    /// First line of the content. Empty for empty notes.
    pub fn title(&self) -> &str {
        title(&self.content)
    }

    /// The single directory tag: `Some` only when the note has
    /// exactly one tag. Multi-tag and untagged notes live in the
    /// corpus root.
    pub fn dir_tag(&self) -> Option<&str> {
        match self.tags.as_slice() {
            [tag] => Some(tag.as_str()),
            _ => None,
        }
    }

    /// Serialize to the on-disk format. Inverse of [`parse`].
    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(id) = &self.id {
            out.push_str(ID_PREFIX);
            out.push_str(id);
            out.push_str(ID_SUFFIX);
            out.push('\n');
        }
        out.push_str(&self.content);
        out.push('\n');
        if !self.tags.is_empty() || !self.system_tags.is_empty() {
            out.push('\n');
            if !self.tags.is_empty() {
                out.push_str(TAGS_PREFIX);
                out.push_str(&self.tags.join(", "));
                out.push('\n');
            }
            if !self.system_tags.is_empty() {
                out.push_str(SYSTEM_TAGS_PREFIX);
                out.push_str(&self.system_tags.join(", "));
                out.push('\n');
            }
        }
        out
    }
}

/// How a single line of a note file is classified while parsing.
/// Anything that is not a recognized metadata prefix is content.
enum LineKind<'a> {
    Tags(&'a str),
    SystemTags(&'a str),
    Content,
}

fn classify(line: &str) -> LineKind<'_> {
    if let Some(rest) = line.strip_prefix(TAGS_PREFIX) {
        LineKind::Tags(rest)
    } else if let Some(rest) = line.strip_prefix(SYSTEM_TAGS_PREFIX) {
        LineKind::SystemTags(rest)
    } else {
        LineKind::Content
    }
}

/// Parse the on-disk format back into a [`NoteRecord`].
///
/// Any text parses: unrecognized lines are content. `deleted` and
/// `modification_time` are not part of the file format and come back
/// as their defaults.
pub fn parse(text: &str) -> NoteRecord {
    let (id, rest) = split_id_marker(text);

    let mut tags = Vec::new();
    let mut system_tags = Vec::new();
    let mut content_lines: Vec<&str> = Vec::new();

    for line in rest.split('\n') {
        match classify(line) {
            LineKind::Tags(list) => tags = split_tag_list(list),
            LineKind::SystemTags(list) => system_tags = split_tag_list(list),
            LineKind::Content => content_lines.push(line),
        }
    }

    while content_lines.last().is_some_and(|l| l.is_empty()) {
        content_lines.pop();
    }

    NoteRecord {
        id,
        content: content_lines.join("\n"),
        tags,
        system_tags,
        deleted: false,
        modification_time: None,
    }
}

/// Split an optional leading identifier-marker line off the text.
fn split_id_marker(text: &str) -> (Option<String>, &str) {
    let line_end = text.find('\n').map(|i| i + 1).unwrap_or(text.len());
    let first = text[..line_end].trim_end_matches('\n');
    if let Some(inner) = first
        .strip_prefix(ID_PREFIX)
        .and_then(|r| r.strip_suffix(ID_SUFFIX))
        && is_note_id(inner)
    {
        return (Some(inner.to_string()), &text[line_end..]);
    }
    (None, text)
}

/// Whether `s` is a valid note identifier (32 lowercase hex chars).
pub fn is_note_id(s: &str) -> bool {
    s.len() == 32 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn split_tag_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

/// First line of a content string.
pub fn title(content: &str) -> &str {
    content.split('\n').next().unwrap_or("")
}

/// Derive a filesystem-safe filename stem from note content.
///
/// Takes the first non-blank line (markdown heading markers
/// stripped), replaces forbidden characters and truncates. Falls back
/// to `fallback` (typically the note id) when the content yields
/// nothing usable, e.g. for empty notes.
pub fn safe_filename(content: &str, fallback: &str) -> String {
    for line in content.split('\n') {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let stem = line.trim_start_matches('#').trim();
        let safe: String = stem
            .chars()
            .map(|c| if FORBIDDEN.contains(&c) { '_' } else { c })
            .take(MAX_STEM_LEN)
            .collect();
        if !safe.is_empty() {
            return safe;
        }
    }
    fallback.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(id: Option<&str>, content: &str, tags: &[&str], system_tags: &[&str]) -> NoteRecord {
        NoteRecord {
            id: id.map(String::from),
            content: content.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            system_tags: system_tags.iter().map(|t| t.to_string()).collect(),
            deleted: false,
            modification_time: None,
        }
    }

    #[test]
    fn render_matches_documented_shape() {
        let id = "a".repeat(32);
        let n = note(Some(&id), "Title\nBody", &["work"], &[]);
        assert_eq!(
            n.render(),
            format!("<!-- note-id: {} -->\nTitle\nBody\n\nTags: work\n", "a".repeat(32))
        );
    }

    #[test]
    fn roundtrip_preserves_all_fields() {
        let all_f = "f".repeat(32);
        let cases = vec![
            note(Some("0123456789abcdef0123456789abcdef"), "Title\nBody", &["work"], &["pinned"]),
            note(None, "Title\nBody\n\nmore text", &[], &[]),
            note(None, "Only title", &["a", "b"], &[]),
            note(Some(&all_f), "", &[], &[]),
        ];
        for n in cases {
            let parsed = parse(&n.render());
            assert_eq!(parsed, n, "roundtrip failed for {:?}", n);
        }
    }

    #[test]
    fn parse_without_marker_or_tail() {
        let n = parse("Shopping list\nmilk\neggs\n");
        assert_eq!(n.id, None);
        assert_eq!(n.content, "Shopping list\nmilk\neggs");
        assert!(n.tags.is_empty());
    }

    #[test]
    fn parse_strips_trailing_blank_lines() {
        let n = parse("Title\nBody\n\n\n\nTags: a, b\n");
        assert_eq!(n.content, "Title\nBody");
        assert_eq!(n.tags, vec!["a", "b"]);
    }

    #[test]
    fn parse_rejects_malformed_marker() {
        // Too short, uppercase, wrong prefix: all treated as content.
        let n = parse("<!-- note-id: abc -->\nBody");
        assert_eq!(n.id, None);
        assert_eq!(n.content, "<!-- note-id: abc -->\nBody");

        let n = parse(&format!("<!-- note-id: {} -->\nBody", "A".repeat(32)));
        assert_eq!(n.id, None);
    }

    #[test]
    fn metadata_tail_recognized_anywhere() {
        // The invariant says content never contains these prefixes, so
        // a stray metadata line mid-file still belongs to the tail.
        let n = parse("Title\nTags: x\nBody\n");
        assert_eq!(n.tags, vec!["x"]);
        assert_eq!(n.content, "Title\nBody");
    }

    #[test]
    fn dir_tag_only_for_single_tag() {
        assert_eq!(note(None, "t", &["work"], &[]).dir_tag(), Some("work"));
        assert_eq!(note(None, "t", &[], &[]).dir_tag(), None);
        assert_eq!(note(None, "t", &["a", "b"], &[]).dir_tag(), None);
    }

    #[test]
    fn safe_filename_sanitizes_and_truncates() {
        assert_eq!(safe_filename("# My Note", "x"), "My Note");
        assert_eq!(safe_filename("a/b:c?", "x"), "a_b_c_");
        assert_eq!(safe_filename("\n\n  \nActual title", "x"), "Actual title");
        let long = "z".repeat(300);
        assert_eq!(safe_filename(&long, "x").chars().count(), 100);
    }

    #[test]
    fn safe_filename_falls_back_to_id() {
        assert_eq!(safe_filename("", "deadbeef"), "deadbeef");
        assert_eq!(safe_filename("   \n\n", "deadbeef"), "deadbeef");
    }

    #[test]
    fn note_id_validation() {
        assert!(is_note_id(&"a".repeat(32)));
        assert!(is_note_id("0123456789abcdef0123456789abcdef"));
        assert!(!is_note_id(&"a".repeat(31)));
        assert!(!is_note_id(&"A".repeat(32)));
        assert!(!is_note_id(&"g".repeat(32)));
    }
}
