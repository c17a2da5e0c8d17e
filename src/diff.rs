//! Line-level diff computation for configuration files
//!
//! This module computes the edit script between two versions of a text file
//! and turns it into the entries written to the audit log.
//!
//! ## Overview
//!
//! The engine fills the classic Longest Common Subsequence (LCS) score table
//! and walks it backwards from the bottom-right corner:
//!
//! 1. Matching lines move diagonally and emit nothing
//! 2. Otherwise an `Added` entry is emitted when `table[i][j-1] >= table[i-1][j]`,
//!    so equal scores favour additions
//! 3. Otherwise a `Deleted` entry is emitted
//!
//! The reconstructed script is then passed through an adjacency merge that
//! folds a `Deleted` immediately followed by an `Added` at the same or the
//! next position into one `Modified` entry. The merge is a heuristic: two
//! unrelated edits that happen to sit next to each other are reported as a
//! single modification.
//!
//! Cost is O(m·n) in time and memory.
//!
//! ## Examples
//!
//! ```rust
//! use checkpoint_audit::diff::compute_line_diff;
//! use checkpoint_audit::types::DiffEntry;
//!
//! let before = ["a", "b", "c"];
//! let after = ["a", "x", "c"];
//!
//! let entries = compute_line_diff(&before, &after);
//! assert_eq!(entries, vec![DiffEntry::Modified {
//!     line: 2,
//!     before: "b".to_string(),
//!     after: "x".to_string(),
//! }]);
//! ```

use crate::error::{AuditError, Result};
use crate::types::DiffEntry;

/// Number of leading bytes inspected by [`is_binary_content`]
const BINARY_PROBE_LEN: usize = 8192;

/// Compute the merged diff between two line sequences
///
/// Equivalent to [`compute_edit_script`] followed by [`merge_adjacent`].
/// An empty result means the sequences are identical.
pub fn compute_line_diff<B, A>(before: &[B], after: &[A]) -> Vec<DiffEntry>
where
    B: AsRef<str>,
    A: AsRef<str>,
{
    merge_adjacent(compute_edit_script(before, after))
}

/// Compute the raw edit script (only `Added` and `Deleted` entries)
///
/// Entries are ordered by document position. Replaying them against
/// `before` with [`apply_edit_script`] reproduces `after`.
pub fn compute_edit_script<B, A>(before: &[B], after: &[A]) -> Vec<DiffEntry>
where
    B: AsRef<str>,
    A: AsRef<str>,
{
    let table = lcs_table(before, after);

    let mut script = Vec::new();
    let mut i = before.len();
    let mut j = after.len();

    while i > 0 || j > 0 {
        if i > 0 && j > 0 && before[i - 1].as_ref() == after[j - 1].as_ref() {
            i -= 1;
            j -= 1;
        } else if j > 0 && (i == 0 || table[i][j - 1] >= table[i - 1][j]) {
            script.push(DiffEntry::Added {
                line: j,
                content: after[j - 1].as_ref().to_string(),
            });
            j -= 1;
        } else {
            script.push(DiffEntry::Deleted {
                line: i,
                content: before[i - 1].as_ref().to_string(),
            });
            i -= 1;
        }
    }

    // Built back to front
    script.reverse();
    script
}

/// Build the (m+1)×(n+1) LCS score table
fn lcs_table<B, A>(before: &[B], after: &[A]) -> Vec<Vec<u32>>
where
    B: AsRef<str>,
    A: AsRef<str>,
{
    let m = before.len();
    let n = after.len();
    let mut table = vec![vec![0u32; n + 1]; m + 1];

    for i in 1..=m {
        for j in 1..=n {
            if before[i - 1].as_ref() == after[j - 1].as_ref() {
                table[i][j] = table[i - 1][j - 1] + 1;
            } else {
                table[i][j] = table[i - 1][j].max(table[i][j - 1]);
            }
        }
    }

    table
}

/// Fold adjacent delete/add pairs into `Modified` entries
///
/// A `Deleted` at position `d` directly followed by an `Added` at position
/// `a` with `|d - a| <= 1` becomes `Modified` keyed at `a`. Every other entry
/// passes through unchanged.
pub fn merge_adjacent(script: Vec<DiffEntry>) -> Vec<DiffEntry> {
    let mut merged = Vec::with_capacity(script.len());
    let mut iter = script.into_iter().peekable();

    while let Some(entry) = iter.next() {
        if let DiffEntry::Deleted { line: del_line, content: old } = &entry {
            if let Some(DiffEntry::Added { line: add_line, .. }) = iter.peek() {
                if del_line.abs_diff(*add_line) <= 1 {
                    if let Some(DiffEntry::Added { line, content }) = iter.next() {
                        merged.push(DiffEntry::Modified {
                            line,
                            before: old.clone(),
                            after: content,
                        });
                        continue;
                    }
                }
            }
        }
        merged.push(entry);
    }

    merged
}

/// Replay a raw edit script against `before`
///
/// Returns `None` when the script contains `Modified` entries or positions
/// that are inconsistent with `before`.
pub fn apply_edit_script<S: AsRef<str>>(before: &[S], script: &[DiffEntry]) -> Option<Vec<String>> {
    let mut out: Vec<String> = Vec::with_capacity(before.len());
    // Index of the next unconsumed line of `before`
    let mut cursor = 0usize;

    for entry in script {
        match entry {
            DiffEntry::Deleted { line, content } => {
                if *line == 0 || *line - 1 < cursor || *line > before.len() {
                    return None;
                }
                while cursor < *line - 1 {
                    out.push(before[cursor].as_ref().to_string());
                    cursor += 1;
                }
                if before[cursor].as_ref() != content {
                    return None;
                }
                cursor += 1;
            }
            DiffEntry::Added { line, content } => {
                if *line == 0 || *line - 1 < out.len() {
                    return None;
                }
                while out.len() < *line - 1 {
                    let kept = before.get(cursor)?;
                    out.push(kept.as_ref().to_string());
                    cursor += 1;
                }
                out.push(content.clone());
            }
            DiffEntry::Modified { .. } => return None,
        }
    }

    out.extend(before[cursor..].iter().map(|l| l.as_ref().to_string()));
    Some(out)
}

/// Check if content appears to be binary
pub fn is_binary_content(content: &[u8]) -> bool {
    // Simple heuristic: check for null bytes in the first 8KB
    let check_len = content.len().min(BINARY_PROBE_LEN);
    content[..check_len].contains(&0)
}

/// Decode file content as text suitable for line diffing
///
/// Binary content and invalid UTF-8 are rejected with
/// [`AuditError::UndiffableContent`].
pub fn decode_text(path: &str, content: Vec<u8>) -> Result<String> {
    if is_binary_content(&content) {
        return Err(AuditError::undiffable(path, "binary content"));
    }
    String::from_utf8(content).map_err(|e| {
        AuditError::undiffable(
            path,
            format!("invalid UTF-8 at byte {}", e.utf8_error().valid_up_to()),
        )
    })
}

/// Split text into lines
///
/// Accepts `\n`, `\r\n` and lone `\r` terminators; a trailing terminator
/// does not produce an empty final line.
pub fn split_lines(text: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut rest = text;
    while let Some(end) = rest.find(['\n', '\r']) {
        lines.push(&rest[..end]);
        let skip = if rest[end..].starts_with("\r\n") { 2 } else { 1 };
        rest = &rest[end + skip..];
    }
    if !rest.is_empty() {
        lines.push(rest);
    }
    lines
}

/// Diff two texts line by line
pub fn diff_text(before: &str, after: &str) -> Vec<DiffEntry> {
    compute_line_diff(&split_lines(before), &split_lines(after))
}
