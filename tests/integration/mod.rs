//! Integration tests for checkpoint-audit
//!
//! Runs the full pipeline against checkpoint directories, pre-built archives,
//! a file-backed cursor and a real audit log.

use ::checkpoint_audit::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

/// On-disk fixture: checkpoint directory, archive directory, log and cursor
pub struct AuditTestHarness {
    pub root: TempDir,
}

impl AuditTestHarness {
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("checkpoints")).unwrap();
        fs::create_dir_all(root.path().join("archives")).unwrap();
        Self { root }
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.root.path().join("checkpoints")
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.root.path().join("archives")
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.path().join("audit.log")
    }

    pub fn cursor_path(&self) -> PathBuf {
        self.root.path().join("state").join(".last_processed_timestamp")
    }

    /// Create the checkpoint directory without an archive
    pub fn add_checkpoint_dir(&self, name: &str) {
        fs::create_dir_all(self.checkpoint_dir().join(name)).unwrap();
    }

    /// Create the checkpoint directory and its archive
    pub fn add_checkpoint(&self, name: &str, files: &[(&str, &str)]) {
        self.add_checkpoint_dir(name);
        write_archive(&self.archive_dir().join(format!("{}.zip", name)), files);
    }

    pub fn auditor(&self) -> Auditor {
        self.auditor_with_log(self.log_path())
    }

    pub fn auditor_with_log(&self, log: PathBuf) -> Auditor {
        AuditorBuilder::new()
            .checkpoint_dir(self.checkpoint_dir())
            .extractor(ArchiveDirExtractor::new(self.archive_dir()))
            .cursor_store(Arc::new(FileCursorStore::open(self.cursor_path()).unwrap()))
            .audit_log(log)
            .build()
            .unwrap()
    }

    pub fn stored_cursor(&self) -> Option<String> {
        fs::read_to_string(self.cursor_path()).ok()
    }

    pub fn log(&self) -> String {
        fs::read_to_string(self.log_path()).unwrap_or_default()
    }
}

pub fn write_archive(path: &Path, files: &[(&str, &str)]) {
    let file = fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    for (name, content) in files {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
}

/// Deterministic generator for configuration-like files
pub struct ConfigGenerator {
    rng: StdRng,
}

impl ConfigGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn lines(&mut self, count: usize) -> Vec<String> {
        (0..count)
            .map(|i| {
                format!(
                    "  <property name=\"prop{}\" value=\"{}\"/>",
                    i,
                    self.rng.random_range(0..10_000u32)
                )
            })
            .collect()
    }

    /// Replace `count` non-adjacent lines with fresh values, returning their indices
    pub fn mutate(&mut self, lines: &mut [String], count: usize) -> Vec<usize> {
        let mut touched: Vec<usize> = Vec::new();
        while touched.len() < count.min(lines.len() / 3) {
            let index = self.rng.random_range(0..lines.len());
            if touched.iter().any(|t| t.abs_diff(index) <= 1) {
                continue;
            }
            lines[index] = format!("  <property name=\"prop{}\" value=\"changed\"/>", index);
            touched.push(index);
        }
        touched.sort_unstable();
        touched
    }
}

fn server_change(user: &str, before: &str, after: &str) -> Vec<(String, String)> {
    vec![
        ("user.id".to_string(), user.to_string()),
        ("before/cells/server.xml".to_string(), before.to_string()),
        ("after/cells/server.xml".to_string(), after.to_string()),
    ]
}

fn as_refs(files: &[(String, String)]) -> Vec<(&str, &str)> {
    files.iter().map(|(p, c)| (p.as_str(), c.as_str())).collect()
}

#[test]
fn test_processes_new_checkpoints_in_key_order() {
    let harness = AuditTestHarness::new();
    harness.add_checkpoint("Delta-200", &as_refs(&server_change("bob", "b\n", "c\n")));
    harness.add_checkpoint("Delta-100", &as_refs(&server_change("alice", "a\n", "b\n")));
    harness.add_checkpoint("Delta-20", &as_refs(&server_change("carol", "x\n", "y\n")));

    let auditor = harness.auditor();
    let report = auditor.run(50).unwrap();

    assert_eq!(report.selected, 2);
    assert_eq!(report.entries_written, 2);
    assert_eq!(report.cursor, 200);
    assert_eq!(harness.stored_cursor().as_deref(), Some("200\n"));

    let log = harness.log();
    assert!(!log.contains("User: carol"));
    let alice = log.find("User: alice").unwrap();
    let bob = log.find("User: bob").unwrap();
    assert!(alice < bob);
    assert_eq!(log.matches("Audit Log Entry - ").count(), 1);
    assert!(log.contains("Change Type: MODIFIED"));
    assert!(log.contains("  Line 1 modified:\n    Before: a\n    After:  b\n"));
}

#[test]
fn test_second_run_is_noop() {
    let harness = AuditTestHarness::new();
    harness.add_checkpoint("Delta-100", &as_refs(&server_change("alice", "a\n", "b\n")));

    let auditor = harness.auditor();
    let first = auditor.run_once().unwrap();
    assert_eq!(first.cursor, 100);
    let log_after_first = harness.log();

    let second = auditor.run_once().unwrap();
    assert_eq!(second.selected, 0);
    assert_eq!(second.cursor, 100);
    assert!(!second.cursor_advanced);
    assert_eq!(harness.log(), log_after_first);
}

#[test]
fn test_cursor_survives_restart() {
    let harness = AuditTestHarness::new();
    harness.add_checkpoint("Delta-100", &as_refs(&server_change("alice", "a\n", "b\n")));
    harness.auditor().run_once().unwrap();

    harness.add_checkpoint("Delta-150", &as_refs(&server_change("bob", "b\n", "c\n")));
    let report = harness.auditor().run_once().unwrap();

    assert_eq!(report.selected, 1);
    assert_eq!(report.cursor, 150);
    assert_eq!(harness.log().matches("Audit Log Entry - ").count(), 2);
}

#[test]
fn test_failed_extraction_retried_on_next_run() {
    let harness = AuditTestHarness::new();
    harness.add_checkpoint("Delta-100", &as_refs(&server_change("alice", "a\n", "b\n")));
    harness.add_checkpoint_dir("Delta-200");

    let report = harness.auditor().run_once().unwrap();
    assert_eq!(report.failed, vec!["Delta-200".to_string()]);
    assert_eq!(report.cursor, 100);

    // The archive shows up later; the checkpoint is still above the cursor
    let files = server_change("bob", "b\n", "c\n");
    write_archive(&harness.archive_dir().join("Delta-200.zip"), &as_refs(&files));

    let report = harness.auditor().run_once().unwrap();
    assert_eq!(report.selected, 1);
    assert!(report.failed.is_empty());
    assert_eq!(report.cursor, 200);
    assert!(harness.log().contains("User: bob"));
}

#[test]
fn test_failure_below_later_success_is_not_retried() {
    let harness = AuditTestHarness::new();
    harness.add_checkpoint_dir("Delta-100");
    harness.add_checkpoint("Delta-200", &as_refs(&server_change("bob", "b\n", "c\n")));

    let report = harness.auditor().run_once().unwrap();
    assert_eq!(report.failed, vec!["Delta-100".to_string()]);
    assert_eq!(report.cursor, 200);

    let files = server_change("alice", "a\n", "b\n");
    write_archive(&harness.archive_dir().join("Delta-100.zip"), &as_refs(&files));
    let report = harness.auditor().run_once().unwrap();
    assert_eq!(report.selected, 0);
}

#[test]
fn test_missing_after_tree_produces_nothing() {
    let harness = AuditTestHarness::new();
    harness.add_checkpoint(
        "Delta-100",
        &[("user.id", "alice"), ("before/cells/server.xml", "a\n")],
    );

    let report = harness.auditor().run_once().unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.entries_written, 0);
    assert_eq!(report.cursor, 0);
    assert!(harness.stored_cursor().is_none());
    assert!(!harness.log_path().exists());
}

#[test]
fn test_malformed_entries_ignored() {
    let harness = AuditTestHarness::new();
    harness.add_checkpoint("Delta-100", &as_refs(&server_change("alice", "a\n", "b\n")));
    harness.add_checkpoint_dir("Delta-abc");
    harness.add_checkpoint_dir("Snapshot-300");
    fs::write(harness.checkpoint_dir().join("Delta-400"), b"not a directory").unwrap();

    let report = harness.auditor().run_once().unwrap();
    assert_eq!(report.discovered, 1);
    assert_eq!(report.cursor, 100);
}

#[test]
fn test_write_failure_leaves_batch_pending() {
    let harness = AuditTestHarness::new();
    harness.add_checkpoint("Delta-100", &as_refs(&server_change("alice", "a\n", "b\n")));

    // A directory in place of the log file cannot be appended to
    let blocked = harness.root.path().join("blocked.log");
    fs::create_dir_all(&blocked).unwrap();
    let err = harness.auditor_with_log(blocked).run_once().unwrap_err();
    assert!(matches!(err, AuditError::WriteFailed { .. }));
    assert!(harness.stored_cursor().is_none());

    let report = harness.auditor().run_once().unwrap();
    assert_eq!(report.selected, 1);
    assert_eq!(report.cursor, 100);
    assert!(harness.log().contains("User: alice"));
}

#[test]
fn test_created_deleted_and_binary_files() {
    let harness = AuditTestHarness::new();
    harness.add_checkpoint(
        "Delta-100",
        &[
            ("user.id", "  wasadmin  \n"),
            ("before/cells/old.xml", "gone\n"),
            ("after/cells/new.xml", "fresh\n"),
            ("before/lib/driver.bin", "\u{0}\u{1}"),
            ("after/lib/driver.bin", "\u{0}\u{2}"),
        ],
    );

    let batch = harness.auditor().collect(0).unwrap();
    let summary: Vec<(&str, ChangeKind)> = batch
        .entries
        .iter()
        .map(|e| (e.file_path.as_str(), e.change_kind))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("cells/new.xml", ChangeKind::Added),
            ("cells/old.xml", ChangeKind::Deleted),
        ]
    );
    assert!(batch.entries.iter().all(|e| e.user_id == "wasadmin"));
}

#[test]
fn test_large_file_mutations_are_reported_per_line() {
    let harness = AuditTestHarness::new();
    let mut generator = ConfigGenerator::new(42);

    let before = generator.lines(300);
    let mut after = before.clone();
    let touched = generator.mutate(&mut after, 5);

    let files = [
        ("before/cells/resources.xml".to_string(), before.join("\n")),
        ("after/cells/resources.xml".to_string(), after.join("\n")),
    ];
    harness.add_checkpoint("Delta-1700000000000", &as_refs(&files));

    let batch = harness.auditor().collect(0).unwrap();
    assert_eq!(batch.entries.len(), 1);
    let entry = &batch.entries[0];
    assert_eq!(entry.change_kind, ChangeKind::Modified);
    assert_eq!(entry.user_id, UNKNOWN_USER);

    for index in touched {
        let header = format!("Line {} modified:", index + 1);
        assert!(
            entry.changes.contains(&header),
            "missing {:?} in {:?}",
            header,
            entry.changes
        );
    }
}

#[test]
fn test_config_driven_auditor() {
    let harness = AuditTestHarness::new();
    harness.add_checkpoint("Delta-100", &as_refs(&server_change("alice", "a\n", "b\n")));

    let config_path = harness.root.path().join("config.toml");
    let config = AuditConfig {
        checkpoint_dir: harness.checkpoint_dir(),
        audit_log: harness.log_path(),
        cursor_file: harness.cursor_path(),
        extractor: ExtractorConfig::ArchiveDir {
            dir: harness.archive_dir(),
        },
        ..AuditConfig::default()
    };
    fs::write(&config_path, toml::to_string(&config).unwrap()).unwrap();

    let loaded = AuditConfig::load(&config_path).unwrap();
    assert_eq!(loaded, config);

    let extractor = loaded.extractor.build(None, None).unwrap();
    let auditor = AuditorBuilder::from_config(&loaded)
        .unwrap()
        .boxed_extractor(extractor)
        .build()
        .unwrap();

    let report = auditor.run_once().unwrap();
    assert_eq!(report.cursor, 100);
    assert_eq!(harness.stored_cursor().as_deref(), Some("100\n"));
}
