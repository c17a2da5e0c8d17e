//! Test suites for checkpoint-audit
//!
//! - Integration tests running the whole pipeline against on-disk fixtures
//! - Property-based tests for the diff engine and cursor laws

pub mod integration;
pub mod property;

#[cfg(test)]
mod edge_cases {
    use ::checkpoint_audit::*;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_checkpoint_dir_missing() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryCursorStore::new(0));

        let auditor = AuditorBuilder::new()
            .checkpoint_dir(temp_dir.path().join("does-not-exist"))
            .extractor(ArchiveDirExtractor::new(temp_dir.path()))
            .cursor_store(store.clone())
            .audit_log(temp_dir.path().join("audit.log"))
            .build()
            .unwrap();

        let report = auditor.run_once().unwrap();
        assert_eq!(report.discovered, 0);
        assert_eq!(report.cursor, 0);
        assert_eq!(store.save_count(), 0);
    }

    #[test]
    fn test_custom_prefix() {
        let temp_dir = TempDir::new().unwrap();
        let checkpoints = temp_dir.path().join("checkpoints");
        fs::create_dir_all(checkpoints.join("Change_42")).unwrap();
        fs::create_dir_all(checkpoints.join("Delta-43")).unwrap();

        let auditor = AuditorBuilder::new()
            .checkpoint_dir(&checkpoints)
            .prefix("Change_")
            .extractor(ArchiveDirExtractor::new(temp_dir.path()))
            .cursor_store(Arc::new(MemoryCursorStore::new(0)))
            .audit_log(temp_dir.path().join("audit.log"))
            .build()
            .unwrap();

        let pending = auditor.pending(0);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].name, "Change_42");
        assert_eq!(pending[0].key, 42);
    }

    #[test]
    fn test_empty_prefix_rejected() {
        let result = AuditorBuilder::new()
            .checkpoint_dir("/tmp")
            .prefix("")
            .extractor(ArchiveDirExtractor::new("/tmp"))
            .cursor_store(Arc::new(MemoryCursorStore::default()))
            .audit_log("audit.log")
            .build();
        assert!(matches!(result, Err(AuditError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_crlf_and_trailing_newline_ignored() {
        assert!(diff::diff_text("a\r\nb\r\n", "a\nb").is_empty());
    }

    #[test]
    fn test_diff_of_empty_sides() {
        let entries = diff::compute_line_diff::<&str, &str>(&[], &["line1"]);
        assert_eq!(
            entries,
            vec![DiffEntry::Added { line: 1, content: "line1".to_string() }]
        );
        assert!(diff::compute_line_diff::<&str, &str>(&[], &[]).is_empty());
    }
}
