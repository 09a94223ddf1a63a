//! Common-prefix diffing for incremental edits.
//!
//! The immediate entry state turns each retranslation into a single
//! delete-then-insert edit. The prefix is matched grapheme by grapheme so an
//! edit never deletes half of a combining sequence, while the delete count is
//! reported in characters because that is the unit the IME protocol uses.

use unicode_segmentation::UnicodeSegmentation;

/// Length of the longest common prefix of `old` and `new` that ends on a
/// grapheme boundary in both strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommonPrefix {
    pub chars: usize,
    pub bytes: usize,
}

pub fn grapheme_common_prefix(old: &str, new: &str) -> CommonPrefix {
    let mut chars = 0;
    let mut bytes = 0;
    let mut a = old.graphemes(true);
    let mut b = new.graphemes(true);
    loop {
        match (a.next(), b.next()) {
            (Some(x), Some(y)) if x == y => {
                chars += x.chars().count();
                bytes += x.len();
            }
            _ => break,
        }
    }
    CommonPrefix { chars, bytes }
}

/// One edit turning `old` into `new`: delete `delete_before` characters from
/// the end of `old`, then insert `insert`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub delete_before: usize,
    pub insert: String,
}

impl TextEdit {
    pub fn is_empty(&self) -> bool {
        self.delete_before == 0 && self.insert.is_empty()
    }
}

pub fn edit_between(old: &str, new: &str) -> TextEdit {
    let prefix = grapheme_common_prefix(old, new);
    TextEdit {
        delete_before: old.chars().count() - prefix.chars,
        insert: new[prefix.bytes..].to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_only() {
        let e = edit_between("fo", "foo");
        assert_eq!(e, TextEdit { delete_before: 0, insert: "o".into() });
    }

    #[test]
    fn contraction_rewrites_suffix() {
        // "kn" back-translates per-letter until "know" collapses to a
        // contraction; the edit replaces the whole diverging suffix.
        let e = edit_between("knowl", "knowledge");
        assert_eq!(e, TextEdit { delete_before: 0, insert: "edge".into() });
        let e = edit_between("abc", "abd");
        assert_eq!(e, TextEdit { delete_before: 1, insert: "d".into() });
    }

    #[test]
    fn equal_strings_yield_empty_edit() {
        assert!(edit_between("same", "same").is_empty());
    }

    #[test]
    fn combining_marks_do_not_split() {
        // e + combining acute vs e + combining diaeresis share the base 'e',
        // but the grapheme differs, so the whole cluster is replaced.
        let old = "e\u{301}";
        let new = "e\u{308}";
        let e = edit_between(old, new);
        assert_eq!(e.delete_before, 2, "both chars of the old cluster go");
        assert_eq!(e.insert, new);
    }

    #[test]
    fn deletion_to_empty() {
        let e = edit_between("abc", "");
        assert_eq!(e, TextEdit { delete_before: 3, insert: String::new() });
    }
}
