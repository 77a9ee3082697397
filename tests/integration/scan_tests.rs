use dedupe::catalog::{Catalog, ScanStatus, SessionStatus};
use dedupe::classify::{FileFilter, HashKind, MinSizes};
use dedupe::scanner::{directory_volume, ScanOutcome, ScannerConfig, VolumeScanner};
use dedupe::signal::ScanControl;
use filetime::{set_file_mtime, FileTime};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn scanner(catalog: &Arc<Catalog>) -> VolumeScanner {
    let config = ScannerConfig::default()
        .with_hash_workers(2)
        .with_filter(FileFilter::new().with_min_sizes(MinSizes::none()));
    VolumeScanner::new(Arc::clone(catalog), config, ScanControl::new())
}

fn write(root: &Path, rel: &str, content: &[u8]) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[test]
fn test_scan_empty_directory() {
    let dir = tempdir().unwrap();
    let catalog = Arc::new(Catalog::open_in_memory().unwrap());

    let report = scanner(&catalog).scan_directory(dir.path(), None).unwrap();

    assert_eq!(report.outcome, ScanOutcome::Completed);
    assert_eq!(report.stats.files_total, 0);
    assert_eq!(report.stats.processed(), 0);
    let volume = catalog
        .volume_by_uuid(&directory_volume(dir.path()).uuid)
        .unwrap()
        .unwrap();
    assert_eq!(volume.scan_status, ScanStatus::Complete);
    assert_eq!(volume.file_count, 0);
}

#[test]
fn test_scan_nested_tree_records_relative_paths() {
    let dir = tempdir().unwrap();
    write(dir.path(), "notes.txt", b"top level");
    write(dir.path(), "docs/2024/report.pdf", b"%PDF-1.4 fake");
    write(dir.path(), "docs/readme.md", b"# readme");

    let catalog = Arc::new(Catalog::open_in_memory().unwrap());
    let report = scanner(&catalog).scan_directory(dir.path(), None).unwrap();
    assert_eq!(report.stats.files_added, 3);

    let volume = catalog
        .volume_by_uuid(&directory_volume(dir.path()).uuid)
        .unwrap()
        .unwrap();
    let mut paths: Vec<String> = catalog
        .files_for_volume(volume.id)
        .unwrap()
        .into_iter()
        .map(|f| f.relative_path)
        .collect();
    paths.sort();
    assert_eq!(paths, vec!["docs/2024/report.pdf", "docs/readme.md", "notes.txt"]);

    let record = catalog
        .file_by_path(volume.id, "docs/2024/report.pdf")
        .unwrap()
        .unwrap();
    assert_eq!(record.directory(), "docs/2024");
    assert!(catalog.hash(record.id, HashKind::ExactMd5).unwrap().is_some());
}

#[test]
fn test_rescan_is_idempotent() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.txt", b"alpha");
    write(dir.path(), "sub/b.txt", b"beta");

    let catalog = Arc::new(Catalog::open_in_memory().unwrap());
    let scanner = scanner(&catalog);
    let first = scanner.scan_directory(dir.path(), None).unwrap();
    let volume_id = catalog
        .volume_by_uuid(&directory_volume(dir.path()).uuid)
        .unwrap()
        .unwrap()
        .id;
    let before = catalog.files_for_volume(volume_id).unwrap();

    let second = scanner.scan_directory(dir.path(), None).unwrap();
    let after = catalog.files_for_volume(volume_id).unwrap();

    assert_eq!(first.stats.files_added, 2);
    assert_eq!(second.stats.files_unchanged, 2);
    assert_eq!(second.stats.files_added + second.stats.files_updated, 0);
    assert_eq!(
        before.iter().map(|f| f.id).collect::<Vec<_>>(),
        after.iter().map(|f| f.id).collect::<Vec<_>>()
    );
    assert_eq!(catalog.volumes().unwrap().len(), 1);
}

#[test]
fn test_modified_file_is_rehashed() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.txt", b"original");
    let path = dir.path().join("a.txt");

    let catalog = Arc::new(Catalog::open_in_memory().unwrap());
    let scanner = scanner(&catalog);
    scanner.scan_directory(dir.path(), None).unwrap();
    let volume_id = catalog
        .volume_by_uuid(&directory_volume(dir.path()).uuid)
        .unwrap()
        .unwrap()
        .id;
    let record = catalog.file_by_path(volume_id, "a.txt").unwrap().unwrap();
    let old_hash = catalog.hash(record.id, HashKind::ExactMd5).unwrap();

    fs::write(&path, b"changed content").unwrap();
    set_file_mtime(&path, FileTime::from_unix_time(1_700_000_000, 0)).unwrap();
    let report = scanner.scan_directory(dir.path(), None).unwrap();

    assert_eq!(report.stats.files_updated, 1);
    let updated = catalog.file_by_path(volume_id, "a.txt").unwrap().unwrap();
    assert_eq!(updated.id, record.id);
    assert_eq!(updated.size_bytes, 15);
    assert_ne!(catalog.hash(record.id, HashKind::ExactMd5).unwrap(), old_hash);
}

#[test]
fn test_touched_but_identical_file_is_updated_not_added() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.txt", b"same bytes");
    let path = dir.path().join("a.txt");

    let catalog = Arc::new(Catalog::open_in_memory().unwrap());
    let scanner = scanner(&catalog);
    scanner.scan_directory(dir.path(), None).unwrap();

    set_file_mtime(&path, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();
    let report = scanner.scan_directory(dir.path(), None).unwrap();
    assert_eq!(report.stats.files_updated, 1);
    assert_eq!(report.stats.files_added, 0);
}

#[test]
fn test_removed_files_are_soft_deleted_and_restored() {
    let dir = tempdir().unwrap();
    write(dir.path(), "keep.txt", b"keep");
    write(dir.path(), "gone.txt", b"gone");

    let catalog = Arc::new(Catalog::open_in_memory().unwrap());
    let scanner = scanner(&catalog);
    scanner.scan_directory(dir.path(), None).unwrap();
    let volume_id = catalog
        .volume_by_uuid(&directory_volume(dir.path()).uuid)
        .unwrap()
        .unwrap()
        .id;
    let gone_id = catalog.file_by_path(volume_id, "gone.txt").unwrap().unwrap().id;

    fs::remove_file(dir.path().join("gone.txt")).unwrap();
    let report = scanner.scan_directory(dir.path(), None).unwrap();
    assert_eq!(report.stats.files_removed, 1);
    assert!(catalog.file_by_path(volume_id, "gone.txt").unwrap().is_none());
    assert!(catalog.file(gone_id).unwrap().unwrap().is_deleted);

    // A returning file reuses its row.
    write(dir.path(), "gone.txt", b"gone");
    let report = scanner.scan_directory(dir.path(), None).unwrap();
    assert_eq!(report.stats.files_added, 1);
    let restored = catalog.file_by_path(volume_id, "gone.txt").unwrap().unwrap();
    assert_eq!(restored.id, gone_id);
    assert!(!restored.is_deleted);
}

#[test]
fn test_filters_skip_small_and_system_files() {
    let dir = tempdir().unwrap();
    write(dir.path(), "big.txt", &[b'x'; 500]);
    write(dir.path(), "tiny.txt", b"x");
    write(dir.path(), ".DS_Store", b"mac metadata");
    write(dir.path(), "node_modules/pkg/readme.md", b"dependency docs");

    let catalog = Arc::new(Catalog::open_in_memory().unwrap());
    let config = ScannerConfig::default().with_filter(FileFilter::new());
    let scanner = VolumeScanner::new(Arc::clone(&catalog), config, ScanControl::new());
    let report = scanner.scan_directory(dir.path(), None).unwrap();

    // `.DS_Store` has no recognised extension, so it is out of scope.
    assert_eq!(report.stats.files_added, 1);
    assert_eq!(report.stats.files_total, 2);
    assert_eq!(report.stats.files_skipped, 1);
}

#[test]
fn test_excluded_paths_are_pruned() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.txt", b"alpha");
    write(dir.path(), "private/b.txt", b"beta");

    let catalog = Arc::new(Catalog::open_in_memory().unwrap());
    let volume_id = catalog.upsert_volume(&directory_volume(dir.path())).unwrap();
    assert!(catalog.add_excluded_path(volume_id, "private").unwrap());

    let report = scanner(&catalog).scan_directory(dir.path(), None).unwrap();
    assert_eq!(report.stats.files_added, 1);
    assert!(catalog.file_by_path(volume_id, "private/b.txt").unwrap().is_none());
}

#[test]
fn test_subtree_scan_leaves_rest_of_volume() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a/one.txt", b"one");
    write(dir.path(), "b/two.txt", b"two");

    let catalog = Arc::new(Catalog::open_in_memory().unwrap());
    let volume = directory_volume(dir.path());
    let scanner = scanner(&catalog);
    scanner.scan(&volume, None, None, None).unwrap();

    fs::remove_file(dir.path().join("b/two.txt")).unwrap();
    let report = scanner
        .scan(&volume, Some(&dir.path().join("a")), None, None)
        .unwrap();

    // Only the scanned subtree can lose files.
    assert_eq!(report.stats.files_removed, 0);
    let volume_id = catalog.volume_by_uuid(&volume.uuid).unwrap().unwrap().id;
    assert!(catalog.file_by_path(volume_id, "b/two.txt").unwrap().is_some());
}

#[test]
fn test_completed_session_counters_persisted() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.txt", b"alpha");
    write(dir.path(), "b.unknownext", b"beta");

    let catalog = Arc::new(Catalog::open_in_memory().unwrap());
    let report = scanner(&catalog).scan_directory(dir.path(), None).unwrap();

    let session = catalog.session(report.session_id).unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.stats.files_added, 1);
    assert_eq!(session.stats.files_skipped, 0);
    assert_eq!(session.stats.files_total, 1);
    assert_eq!(session.scan_path.as_deref(), Some(dir.path()));
}

#[test]
fn test_file_vanishing_before_hash_counts_as_failed() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.txt", b"alpha");
    write(dir.path(), "b.txt", b"beta");

    let catalog = Arc::new(Catalog::open_in_memory().unwrap());
    let config = ScannerConfig::default()
        .with_hash_workers(2)
        .with_progress_interval(Duration::ZERO)
        .with_filter(FileFilter::new().with_min_sizes(MinSizes::none()));
    let scanner = VolumeScanner::new(Arc::clone(&catalog), config, ScanControl::new());
    let victim = dir.path().join("a.txt");
    // a.txt is indexed first and deleted while its hash is still queued.
    let sink = |status: &str, current: u64, _: u64| {
        if status.starts_with("Scanning ") && current >= 1 {
            let _ = fs::remove_file(&victim);
        }
    };
    let report = scanner.scan_directory(dir.path(), Some(&sink)).unwrap();

    assert_eq!(report.outcome, ScanOutcome::Completed);
    assert_eq!(report.stats.files_added, 1);
    assert_eq!(report.stats.files_scanned, 1);
    assert_eq!(report.stats.files_failed, 1);
    assert_eq!(report.stats.files_total, 2);

    let session = catalog.session(report.session_id).unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.stats.files_failed, 1);

    let volume = catalog
        .volume_by_uuid(&directory_volume(dir.path()).uuid)
        .unwrap()
        .unwrap();
    assert!(catalog.file_by_path(volume.id, "a.txt").unwrap().is_none());
    let b = catalog.file_by_path(volume.id, "b.txt").unwrap().unwrap();
    assert!(catalog.hash(b.id, HashKind::ExactMd5).unwrap().is_some());
    assert_eq!(volume.file_count, 1);
}
