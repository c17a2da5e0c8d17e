//! Property-based tests for checkpoint-audit
//!
//! Uses proptest to check the diff engine laws and cursor monotonicity over
//! randomly generated inputs.

use ::checkpoint_audit::*;
use proptest::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::io::{Cursor, Write};
use std::sync::Arc;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

/// Short lines over a small alphabet so sequences share plenty of content
fn lines_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[abc]{0,2}", 0..24)
}

fn count_kind(entries: &[DiffEntry], kind: ChangeKind) -> usize {
    entries
        .iter()
        .filter(|e| {
            matches!(
                (e, kind),
                (DiffEntry::Added { .. }, ChangeKind::Added)
                    | (DiffEntry::Deleted { .. }, ChangeKind::Deleted)
                    | (DiffEntry::Modified { .. }, ChangeKind::Modified)
            )
        })
        .count()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Replaying the raw script against `before` yields `after`
    #[test]
    fn prop_edit_script_round_trips(before in lines_strategy(), after in lines_strategy()) {
        let script = diff::compute_edit_script(&before, &after);
        prop_assert_eq!(diff::apply_edit_script(&before, &script), Some(after));
    }

    #[test]
    fn prop_identical_inputs_have_no_diff(lines in lines_strategy()) {
        prop_assert!(diff::compute_line_diff(&lines, &lines).is_empty());
    }

    #[test]
    fn prop_diff_is_deterministic(before in lines_strategy(), after in lines_strategy()) {
        prop_assert_eq!(
            diff::compute_line_diff(&before, &after),
            diff::compute_line_diff(&before, &after)
        );
    }

    /// Additions minus deletions equals the change in length
    #[test]
    fn prop_script_balances_lengths(before in lines_strategy(), after in lines_strategy()) {
        let script = diff::compute_edit_script(&before, &after);
        let added = count_kind(&script, ChangeKind::Added);
        let deleted = count_kind(&script, ChangeKind::Deleted);
        prop_assert_eq!(added as i64 - deleted as i64, after.len() as i64 - before.len() as i64);
    }

    /// Merging only pairs up entries; nothing is lost or invented
    #[test]
    fn prop_merge_preserves_entries(before in lines_strategy(), after in lines_strategy()) {
        let script = diff::compute_edit_script(&before, &after);
        let merged = diff::merge_adjacent(script.clone());
        let modified = count_kind(&merged, ChangeKind::Modified);

        prop_assert_eq!(merged.len() + modified, script.len());
        prop_assert_eq!(
            count_kind(&merged, ChangeKind::Added) + modified,
            count_kind(&script, ChangeKind::Added)
        );
    }

    #[test]
    fn prop_empty_before_is_all_added(after in lines_strategy()) {
        let entries = diff::compute_line_diff::<String, String>(&[], &after);
        prop_assert_eq!(entries.len(), after.len());
        for (index, entry) in entries.iter().enumerate() {
            prop_assert_eq!(
                entry,
                &DiffEntry::Added { line: index + 1, content: after[index].clone() }
            );
        }
    }
}

/// Extractor serving a valid one-change archive unless the key is marked failing
struct FlakyExtractor {
    failing: HashSet<u64>,
}

impl SnapshotExtractor for FlakyExtractor {
    fn extract(&self, checkpoint: &Checkpoint) -> Result<Vec<u8>> {
        if self.failing.contains(&checkpoint.key) {
            return Err(AuditError::extraction(&checkpoint.name, "simulated failure"));
        }
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in [("before/a.xml", "old\n"), ("after/a.xml", "new\n")] {
            writer.start_file(name, SimpleFileOptions::default())?;
            writer.write_all(content.as_bytes())?;
        }
        Ok(writer.finish()?.into_inner())
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// The cursor never moves backwards and lands on the highest successful key
    #[test]
    fn prop_cursor_is_monotonic(
        keys in prop::collection::hash_set(1u64..1_000, 0..8),
        failing_mask in prop::collection::vec(any::<bool>(), 8),
        start in 0u64..1_000,
    ) {
        let dir = TempDir::new().unwrap();
        let checkpoints = dir.path().join("checkpoints");
        fs::create_dir_all(&checkpoints).unwrap();

        let mut failing = HashSet::new();
        for (index, key) in keys.iter().enumerate() {
            fs::create_dir_all(checkpoints.join(format!("Delta-{}", key))).unwrap();
            if failing_mask[index] {
                failing.insert(*key);
            }
        }

        let store = Arc::new(MemoryCursorStore::new(start));
        let auditor = AuditorBuilder::new()
            .checkpoint_dir(&checkpoints)
            .extractor(FlakyExtractor { failing: failing.clone() })
            .cursor_store(store.clone())
            .audit_log(dir.path().join("audit.log"))
            .build()
            .unwrap();

        let report = auditor.run(start).unwrap();

        let expected = keys
            .iter()
            .filter(|k| **k > start && !failing.contains(k))
            .copied()
            .max()
            .unwrap_or(start);
        prop_assert!(report.cursor >= start);
        prop_assert_eq!(report.cursor, expected);
        prop_assert_eq!(store.load(), expected);
        prop_assert_eq!(report.cursor_advanced, expected > start);
    }
}
