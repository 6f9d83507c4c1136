//! Line-level diffing of changed blobs
//!
//! Produces the edit script the burndown appliers replay: a sequence of
//! equal/insert/delete edits measured in lines, together with the declared
//! old and new line counts the appliers verify against. The diff runs over
//! line tokens (with their endings attached), so edit lengths are line
//! counts by construction and always agree with [`CachedBlob::count_lines`].

use similar::{ChangeTag, TextDiff};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DiffOp {
    Equal,
    Insert,
    Delete,
}

/// One run of consecutive same-kind line changes.
#[derive(Clone, Copy, Debug)]
pub struct DiffEdit {
    pub op: DiffOp,
    pub lines: usize,
}

/// The edit script for one modified file.
#[derive(Clone, Debug, Default)]
pub struct FileDiffData {
    pub old_lines: usize,
    pub new_lines: usize,
    pub edits: Vec<DiffEdit>,
}

fn count_lines(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    let mut lines = text.bytes().filter(|&b| b == b'\n').count();
    if !text.ends_with('\n') {
        lines += 1;
    }
    lines
}

/// Diffs two text blobs into a line edit script.
pub fn diff_lines(old_text: &str, new_text: &str) -> FileDiffData {
    let old_lines = count_lines(old_text);
    let new_lines = count_lines(new_text);

    // An empty side would diff as one empty token; emit the obvious script
    // directly instead.
    if old_text.is_empty() || new_text.is_empty() {
        let mut edits = Vec::new();
        if old_lines > 0 {
            edits.push(DiffEdit {
                op: DiffOp::Delete,
                lines: old_lines,
            });
        }
        if new_lines > 0 {
            edits.push(DiffEdit {
                op: DiffOp::Insert,
                lines: new_lines,
            });
        }
        return FileDiffData {
            old_lines,
            new_lines,
            edits,
        };
    }

    let diff = TextDiff::from_lines(old_text, new_text);
    let mut edits: Vec<DiffEdit> = Vec::new();
    for change in diff.iter_all_changes() {
        let op = match change.tag() {
            ChangeTag::Equal => DiffOp::Equal,
            ChangeTag::Delete => DiffOp::Delete,
            ChangeTag::Insert => DiffOp::Insert,
        };
        match edits.last_mut() {
            Some(last) if last.op == op => last.lines += 1,
            _ => edits.push(DiffEdit { op, lines: 1 }),
        }
    }
    FileDiffData {
        old_lines,
        new_lines,
        edits,
    }
}
