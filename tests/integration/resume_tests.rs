use dedupe::catalog::{Catalog, ScanStatus, SessionStatus};
use dedupe::classify::{FileFilter, HashKind, MinSizes};
use dedupe::scanner::{directory_volume, ScanError, ScanOutcome, ScannerConfig, VolumeScanner};
use dedupe::signal::ScanControl;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

const DIRS: usize = 5;

fn config() -> ScannerConfig {
    ScannerConfig::default()
        .with_hash_workers(2)
        .with_progress_interval(Duration::ZERO)
        .with_filter(FileFilter::new().with_min_sizes(MinSizes::none()))
}

/// One file per directory, so pausing after a file stops on a directory
/// boundary.
fn build_tree(root: &Path) {
    for i in 0..DIRS {
        let dir = root.join(format!("d{i}"));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("f{i}.txt")), format!("content {i}")).unwrap();
    }
}

fn hashes_by_path(catalog: &Catalog, root: &Path) -> BTreeMap<String, String> {
    let volume = catalog
        .volume_by_uuid(&directory_volume(root).uuid)
        .unwrap()
        .unwrap();
    catalog
        .files_for_volume(volume.id)
        .unwrap()
        .into_iter()
        .map(|f| {
            let hash = catalog.hash(f.id, HashKind::ExactMd5).unwrap().unwrap();
            (f.relative_path, hash)
        })
        .collect()
}

#[test]
fn test_pause_and_resume_matches_uninterrupted_scan() {
    let dir = tempdir().unwrap();
    build_tree(dir.path());

    let reference = Arc::new(Catalog::open_in_memory().unwrap());
    let full = VolumeScanner::new(Arc::clone(&reference), config(), ScanControl::new())
        .scan_directory(dir.path(), None)
        .unwrap();
    assert_eq!(full.outcome, ScanOutcome::Completed);

    let catalog = Arc::new(Catalog::open_in_memory().unwrap());
    let control = ScanControl::new();
    let scanner = VolumeScanner::new(Arc::clone(&catalog), config(), control.clone());
    let pauser = control.clone();
    let sink = move |_: &str, current: u64, _: u64| {
        if current >= 2 {
            pauser.pause();
        }
    };
    let paused = scanner.scan_directory(dir.path(), Some(&sink)).unwrap();
    assert_eq!(paused.outcome, ScanOutcome::Paused);

    let session = catalog.session(paused.session_id).unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Paused);
    assert_eq!(session.stats.files_added, 2);
    assert_eq!(session.stats.files_total, DIRS as u64);
    let checkpoint = catalog.load_checkpoint(paused.session_id).unwrap().unwrap();
    assert_eq!(checkpoint.files_processed, 2);
    assert!(checkpoint.directories_completed.contains(&dir.path().join("d0")));
    assert!(checkpoint.directories_completed.contains(&dir.path().join("d1")));
    assert!(!checkpoint.directories_completed.contains(&dir.path().join("d2")));

    let volume = catalog
        .volume_by_uuid(&directory_volume(dir.path()).uuid)
        .unwrap()
        .unwrap();
    assert_eq!(volume.scan_status, ScanStatus::Partial);
    assert_eq!(catalog.paused_sessions(Some(volume.id)).unwrap().len(), 1);

    control.reset();
    let resumed = scanner
        .scan(&directory_volume(dir.path()), None, Some(paused.session_id), None)
        .unwrap();
    assert_eq!(resumed.outcome, ScanOutcome::Completed);
    assert_eq!(resumed.session_id, paused.session_id);
    assert_eq!(resumed.stats.files_added, full.stats.files_added);
    assert_eq!(resumed.stats.files_total, full.stats.files_total);
    assert_eq!(resumed.stats.processed(), full.stats.processed());

    let session = catalog.session(paused.session_id).unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert!(catalog.load_checkpoint(paused.session_id).unwrap().is_none());
    assert!(catalog.paused_sessions(None).unwrap().is_empty());

    assert_eq!(
        hashes_by_path(&catalog, dir.path()),
        hashes_by_path(&reference, dir.path())
    );
    let volume = catalog.volume(volume.id).unwrap().unwrap();
    assert_eq!(volume.scan_status, ScanStatus::Complete);
    assert_eq!(volume.file_count, DIRS as u64);
}

#[test]
fn test_mid_directory_pause_does_not_double_count() {
    let dir = tempdir().unwrap();
    for i in 0..6 {
        fs::write(dir.path().join(format!("f{i}.txt")), format!("flat {i}")).unwrap();
    }

    let catalog = Arc::new(Catalog::open_in_memory().unwrap());
    let control = ScanControl::new();
    let scanner = VolumeScanner::new(Arc::clone(&catalog), config(), control.clone());
    let pauser = control.clone();
    let sink = move |_: &str, current: u64, _: u64| {
        if current >= 3 {
            pauser.pause();
        }
    };
    let paused = scanner.scan_directory(dir.path(), Some(&sink)).unwrap();
    assert_eq!(paused.outcome, ScanOutcome::Paused);
    let checkpoint = catalog.load_checkpoint(paused.session_id).unwrap().unwrap();
    assert!(checkpoint.directories_completed.is_empty());
    assert_eq!(checkpoint.current_directory.as_deref(), Some(dir.path()));
    assert_eq!(checkpoint.files_processed, 3);
    let session = catalog.session(paused.session_id).unwrap().unwrap();
    assert_eq!(session.stats.files_added, 3);
    assert_eq!(session.last_processed_path.as_deref(), Some("f2.txt"));

    // A resume that stops before touching a file keeps the resume point.
    let again = scanner
        .scan(&directory_volume(dir.path()), None, Some(paused.session_id), None)
        .unwrap();
    assert_eq!(again.outcome, ScanOutcome::Paused);
    let checkpoint = catalog.load_checkpoint(paused.session_id).unwrap().unwrap();
    assert_eq!(checkpoint.current_directory.as_deref(), Some(dir.path()));
    assert_eq!(checkpoint.files_processed, 3);

    control.reset();
    let resumed = scanner
        .scan(&directory_volume(dir.path()), None, Some(paused.session_id), None)
        .unwrap();

    assert_eq!(resumed.outcome, ScanOutcome::Completed);
    assert_eq!(resumed.stats.processed(), 6);
    assert_eq!(resumed.stats.files_added, 6);
    assert_eq!(resumed.stats.files_unchanged, 0);
    assert_eq!(resumed.stats.files_total, 6);
    let volume = catalog
        .volume_by_uuid(&directory_volume(dir.path()).uuid)
        .unwrap()
        .unwrap();
    assert_eq!(volume.file_count, 6);
}

#[test]
fn test_pause_while_counting_recounts_on_resume() {
    let dir = tempdir().unwrap();
    build_tree(dir.path());

    let catalog = Arc::new(Catalog::open_in_memory().unwrap());
    let control = ScanControl::new();
    let scanner = VolumeScanner::new(Arc::clone(&catalog), config(), control.clone());
    let pauser = control.clone();
    // Pause as soon as the count has seen one file.
    let sink = move |status: &str, _: u64, total: u64| {
        if status.starts_with("Counting") && total >= 1 {
            pauser.pause();
        }
    };
    let paused = scanner.scan_directory(dir.path(), Some(&sink)).unwrap();
    assert_eq!(paused.outcome, ScanOutcome::Paused);
    assert_eq!(paused.stats.files_total, 0);
    let session = catalog.session(paused.session_id).unwrap().unwrap();
    assert_eq!(session.stats.files_total, 0);
    assert_eq!(session.stats.processed(), 0);

    control.reset();
    let totals = std::sync::Mutex::new(Vec::new());
    let watch = |_: &str, _: u64, total: u64| totals.lock().unwrap().push(total);
    let resumed = scanner
        .scan(
            &directory_volume(dir.path()),
            None,
            Some(paused.session_id),
            Some(&watch),
        )
        .unwrap();
    assert_eq!(resumed.outcome, ScanOutcome::Completed);
    assert_eq!(resumed.stats.files_total, DIRS as u64);
    assert_eq!(resumed.stats.files_added, DIRS as u64);
    assert_eq!(totals.lock().unwrap().last(), Some(&(DIRS as u64)));
}

#[test]
fn test_cancel_discards_checkpoint() {
    let dir = tempdir().unwrap();
    build_tree(dir.path());

    let catalog = Arc::new(Catalog::open_in_memory().unwrap());
    let control = ScanControl::new();
    let scanner = VolumeScanner::new(Arc::clone(&catalog), config(), control.clone());
    let canceller = control.clone();
    let sink = move |_: &str, current: u64, _: u64| {
        if current >= 1 {
            canceller.cancel();
        }
    };
    let report = scanner.scan_directory(dir.path(), Some(&sink)).unwrap();

    assert_eq!(report.outcome, ScanOutcome::Cancelled);
    assert!(catalog.load_checkpoint(report.session_id).unwrap().is_none());
    let session = catalog.session(report.session_id).unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Cancelled);

    control.reset();
    let err = scanner
        .scan(&directory_volume(dir.path()), None, Some(report.session_id), None)
        .unwrap_err();
    assert!(matches!(err, ScanError::InvalidResume { .. }));
}

#[test]
fn test_resume_unknown_session_is_rejected() {
    let dir = tempdir().unwrap();
    let catalog = Arc::new(Catalog::open_in_memory().unwrap());
    let scanner = VolumeScanner::new(Arc::clone(&catalog), config(), ScanControl::new());

    let err = scanner
        .scan(&directory_volume(dir.path()), None, Some(999), None)
        .unwrap_err();
    assert!(matches!(err, ScanError::InvalidResume { session_id: 999, .. }));
}

#[test]
fn test_resume_on_other_volume_is_rejected() {
    let first = tempdir().unwrap();
    let second = tempdir().unwrap();
    build_tree(first.path());

    let catalog = Arc::new(Catalog::open_in_memory().unwrap());
    let control = ScanControl::new();
    let scanner = VolumeScanner::new(Arc::clone(&catalog), config(), control.clone());
    control.pause();
    let paused = scanner.scan_directory(first.path(), None).unwrap();
    assert_eq!(paused.outcome, ScanOutcome::Paused);

    control.reset();
    let err = scanner
        .scan(&directory_volume(second.path()), None, Some(paused.session_id), None)
        .unwrap_err();
    assert!(matches!(err, ScanError::InvalidResume { .. }));
}

#[test]
fn test_interrupted_running_session_is_resumable() {
    let dir = tempdir().unwrap();
    build_tree(dir.path());

    let catalog = Arc::new(Catalog::open_in_memory().unwrap());
    let volume_id = catalog.upsert_volume(&directory_volume(dir.path())).unwrap();
    // A session left running by a process that died.
    let session_id = catalog.start_session(volume_id, Some(dir.path())).unwrap();
    assert_eq!(catalog.interrupted_sessions(&[]).unwrap().len(), 1);

    let scanner = VolumeScanner::new(Arc::clone(&catalog), config(), ScanControl::new());
    let report = scanner
        .scan(&directory_volume(dir.path()), None, Some(session_id), None)
        .unwrap();
    assert_eq!(report.outcome, ScanOutcome::Completed);
    assert_eq!(report.stats.files_added, DIRS as u64);
    assert!(catalog.interrupted_sessions(&[]).unwrap().is_empty());
}
