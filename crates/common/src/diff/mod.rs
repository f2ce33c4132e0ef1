// Line-level diff between two text blobs.
//
// Pure and total: any two strings produce an edit script, never an error.
// Results are computed on demand and never persisted.

use serde::{Deserialize, Serialize};

/// Classification of one line in the edit script.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    Unchanged,
    Added,
    Removed,
}

/// One line of the edit script.
///
/// `old_line`/`new_line` are 1-based and counted independently per side:
/// `unchanged` carries both, `removed` only `old_line`, `added` only
/// `new_line`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiffEntry {
    pub kind: DiffKind,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_line: Option<u32>,
}

impl DiffEntry {
    fn unchanged(text: &str, old_line: u32, new_line: u32) -> Self {
        Self {
            kind: DiffKind::Unchanged,
            text: text.to_string(),
            old_line: Some(old_line),
            new_line: Some(new_line),
        }
    }

    fn removed(text: &str, old_line: u32) -> Self {
        Self { kind: DiffKind::Removed, text: text.to_string(), old_line: Some(old_line), new_line: None }
    }

    fn added(text: &str, new_line: u32) -> Self {
        Self { kind: DiffKind::Added, text: text.to_string(), old_line: None, new_line: Some(new_line) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineEdit {
    Equal,
    Insert,
    Delete,
}

/// Computes the minimal line edit script from `old_text` to `new_text`.
///
/// Inputs are split on `\n`; a single trailing newline is dropped before
/// diffing so it never shows up as a spurious blank-line entry. Ties between
/// minimal scripts resolve to the earliest (leftmost) match, and a removal
/// precedes the addition replacing it, so output is deterministic.
pub fn line_diff(old_text: &str, new_text: &str) -> Vec<DiffEntry> {
    let old_lines = split_lines(old_text);
    let new_lines = split_lines(new_text);

    if old_lines == new_lines {
        return old_lines
            .iter()
            .enumerate()
            .map(|(index, line)| DiffEntry::unchanged(line, index as u32 + 1, index as u32 + 1))
            .collect();
    }

    let edits = myers_line_edits(&old_lines, &new_lines);
    edits_to_entries(&edits, &old_lines, &new_lines)
}

/// Splits on `\n`, dropping exactly one trailing empty element when the
/// input ends with a newline. The empty string has zero lines.
fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut lines: Vec<&str> = text.split('\n').collect();
    if text.ends_with('\n') {
        lines.pop();
    }
    lines
}

fn edits_to_entries(edits: &[LineEdit], old_lines: &[&str], new_lines: &[&str]) -> Vec<DiffEntry> {
    let mut entries = Vec::with_capacity(edits.len());
    let mut old_index = 0usize;
    let mut new_index = 0usize;

    for edit in edits {
        match edit {
            LineEdit::Equal => {
                entries.push(DiffEntry::unchanged(
                    old_lines[old_index],
                    old_index as u32 + 1,
                    new_index as u32 + 1,
                ));
                old_index += 1;
                new_index += 1;
            }
            LineEdit::Delete => {
                entries.push(DiffEntry::removed(old_lines[old_index], old_index as u32 + 1));
                old_index += 1;
            }
            LineEdit::Insert => {
                entries.push(DiffEntry::added(new_lines[new_index], new_index as u32 + 1));
                new_index += 1;
            }
        }
    }

    entries
}

fn myers_line_edits(old_lines: &[&str], new_lines: &[&str]) -> Vec<LineEdit> {
    let old_len = old_lines.len();
    let new_len = new_lines.len();

    if old_len == 0 {
        return vec![LineEdit::Insert; new_len];
    }
    if new_len == 0 {
        return vec![LineEdit::Delete; old_len];
    }

    let max = old_len + new_len;
    let offset = max as isize;
    let mut v = vec![0isize; 2 * max + 1];
    let mut trace: Vec<Vec<isize>> = Vec::with_capacity(max + 1);
    let mut solved_d = 0usize;

    'outer: for d in 0..=max {
        trace.push(v.clone());

        let d_isize = d as isize;
        let mut k = -d_isize;
        while k <= d_isize {
            let k_idx = (k + offset) as usize;
            let mut x = if k == -d_isize
                || (k != d_isize && v[(k - 1 + offset) as usize] < v[(k + 1 + offset) as usize])
            {
                v[(k + 1 + offset) as usize]
            } else {
                v[(k - 1 + offset) as usize] + 1
            };
            let mut y = x - k;

            while x < old_len as isize
                && y < new_len as isize
                && old_lines[x as usize] == new_lines[y as usize]
            {
                x += 1;
                y += 1;
            }

            v[k_idx] = x;

            if x >= old_len as isize && y >= new_len as isize {
                solved_d = d;
                break 'outer;
            }

            k += 2;
        }
    }

    backtrack_line_edits(&trace, solved_d, offset, old_len, new_len)
}

fn backtrack_line_edits(
    trace: &[Vec<isize>],
    solved_d: usize,
    offset: isize,
    old_len: usize,
    new_len: usize,
) -> Vec<LineEdit> {
    let mut edits = Vec::new();
    let mut x = old_len as isize;
    let mut y = new_len as isize;

    for d in (0..=solved_d).rev() {
        let v = &trace[d];
        let k = x - y;
        let d_isize = d as isize;

        let prev_k = if d == 0 {
            0
        } else if k == -d_isize
            || (k != d_isize && v[(k - 1 + offset) as usize] < v[(k + 1 + offset) as usize])
        {
            k + 1
        } else {
            k - 1
        };
        let prev_x = if d == 0 { 0 } else { v[(prev_k + offset) as usize] };
        let prev_y = prev_x - prev_k;

        while x > prev_x && y > prev_y {
            edits.push(LineEdit::Equal);
            x -= 1;
            y -= 1;
        }

        if d == 0 {
            break;
        }

        if x == prev_x {
            edits.push(LineEdit::Insert);
            y -= 1;
        } else {
            edits.push(LineEdit::Delete);
            x -= 1;
        }
    }

    edits.reverse();
    edits
}
