use dedupe::catalog::{Catalog, FileInfo, ScanStatus, VolumeInfo};
use dedupe::classify::{Classifier, FileFilter, FileType, HashKind, MinSizes};
use dedupe::scanner::{directory_volume, ScannerConfig, VolumeScanner};
use dedupe::signal::ScanControl;
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;

#[test]
fn test_catalog_persists_across_reopen() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("nested").join("catalog.db");

    let file_id = {
        let catalog = Catalog::open(&db_path).unwrap();
        assert_eq!(catalog.path(), Some(db_path.as_path()));
        let volume_id = catalog
            .upsert_volume(&VolumeInfo::new("uuid-1", "Backup", "/mnt/backup"))
            .unwrap();
        let file_id = catalog
            .upsert_file(volume_id, &FileInfo::new("Photos/a.png", 42, FileType::Image))
            .unwrap();
        catalog.set_hash(file_id, HashKind::ExactMd5, "abc123").unwrap();
        file_id
    };

    let catalog = Catalog::open(&db_path).unwrap();
    let volume = catalog.volume_by_uuid("uuid-1").unwrap().unwrap();
    assert_eq!(volume.name, "Backup");
    assert_eq!(volume.scan_status, ScanStatus::Never);
    let record = catalog.file(file_id).unwrap().unwrap();
    assert_eq!(record.relative_path, "Photos/a.png");
    assert_eq!(record.size_bytes, 42);
    assert_eq!(
        catalog.hash(file_id, HashKind::ExactMd5).unwrap().as_deref(),
        Some("abc123")
    );
}

#[test]
fn test_volume_identity_is_the_uuid() {
    let catalog = Catalog::open_in_memory().unwrap();
    let first = catalog
        .upsert_volume(&VolumeInfo::new("uuid-1", "Old Name", "/mnt/a"))
        .unwrap();
    let second = catalog
        .upsert_volume(&VolumeInfo::new("uuid-1", "New Name", "/mnt/b"))
        .unwrap();

    assert_eq!(first, second);
    let volumes = catalog.volumes().unwrap();
    assert_eq!(volumes.len(), 1);
    assert_eq!(volumes[0].name, "New Name");
    assert_eq!(volumes[0].mount_point.as_deref(), Some(std::path::Path::new("/mnt/b")));
}

#[test]
fn test_delete_volume_removes_its_files() {
    let catalog = Catalog::open_in_memory().unwrap();
    let keep = catalog
        .upsert_volume(&VolumeInfo::new("keep", "Keep", "/mnt/keep"))
        .unwrap();
    let drop = catalog
        .upsert_volume(&VolumeInfo::new("drop", "Drop", "/mnt/drop"))
        .unwrap();
    let kept = catalog
        .upsert_file(keep, &FileInfo::new("a.txt", 1, FileType::Document))
        .unwrap();
    let dropped = catalog
        .upsert_file(drop, &FileInfo::new("a.txt", 1, FileType::Document))
        .unwrap();
    catalog.set_hash(kept, HashKind::ExactMd5, "same").unwrap();
    catalog.set_hash(dropped, HashKind::ExactMd5, "same").unwrap();

    assert!(catalog.delete_volume(drop).unwrap());
    assert!(!catalog.delete_volume(drop).unwrap());

    assert!(catalog.volume(drop).unwrap().is_none());
    assert!(catalog.file(dropped).unwrap().is_none());
    assert!(catalog.file(kept).unwrap().is_some());
    assert!(catalog
        .find_duplicate_hash_values(HashKind::ExactMd5, None)
        .unwrap()
        .is_empty());
}

#[test]
fn test_duplicate_hash_values_ignore_deleted_files() {
    let catalog = Catalog::open_in_memory().unwrap();
    let volume = catalog
        .upsert_volume(&VolumeInfo::new("v", "V", "/mnt/v"))
        .unwrap();
    let ids: Vec<_> = ["a.txt", "b.txt", "c.txt"]
        .iter()
        .map(|p| {
            let id = catalog
                .upsert_file(volume, &FileInfo::new(*p, 3, FileType::Document))
                .unwrap();
            catalog.set_hash(id, HashKind::ExactMd5, "dup").unwrap();
            id
        })
        .collect();

    let values = catalog.find_duplicate_hash_values(HashKind::ExactMd5, None).unwrap();
    assert_eq!(values, vec![("dup".to_string(), 3)]);

    assert!(catalog.mark_file_deleted(ids[0]).unwrap());
    assert_eq!(catalog.files_with_hash(HashKind::ExactMd5, "dup").unwrap().len(), 2);

    assert!(catalog.mark_file_deleted(ids[1]).unwrap());
    assert!(catalog
        .find_duplicate_hash_values(HashKind::ExactMd5, None)
        .unwrap()
        .is_empty());
}

#[test]
fn test_unknown_extensions_are_recorded_during_scan() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("projects")).unwrap();
    fs::write(dir.path().join("projects/a.blend"), b"scene one").unwrap();
    fs::write(dir.path().join("projects/b.blend"), b"scene two").unwrap();
    fs::write(dir.path().join("c.blend"), b"scene three").unwrap();

    let catalog = Arc::new(Catalog::open_in_memory().unwrap());
    let config = ScannerConfig::default().with_filter(FileFilter::new().with_min_sizes(MinSizes::none()));
    let report = VolumeScanner::new(Arc::clone(&catalog), config, ScanControl::new())
        .scan_directory(dir.path(), None)
        .unwrap();
    // Unknown extensions are recorded, not counted as skipped.
    assert_eq!(report.stats.files_skipped, 0);
    assert_eq!(report.stats.files_total, 0);

    let unknown = catalog.unknown_extensions().unwrap();
    assert_eq!(unknown.len(), 1);
    assert_eq!(unknown[0].extension, "blend");
    assert_eq!(unknown[0].occurrence_count, 3);
    let projects = unknown[0]
        .sample_paths
        .iter()
        .find(|s| s.relative_path == "projects")
        .unwrap();
    assert_eq!(projects.file_count, 2);
}

#[test]
fn test_custom_include_makes_unknown_extension_scannable() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.blend"), b"scene").unwrap();
    fs::write(dir.path().join("b.blend"), b"scene").unwrap();

    let catalog = Arc::new(Catalog::open_in_memory().unwrap());
    catalog.set_custom_included_extensions(&["blend"]).unwrap();
    let classifier = Arc::new(Classifier::with_overrides(
        catalog.custom_extension_overrides().unwrap(),
    ));
    let config = ScannerConfig::default().with_filter(FileFilter::new().with_min_sizes(MinSizes::none()));
    let report = VolumeScanner::new(Arc::clone(&catalog), config, ScanControl::new())
        .with_classifier(classifier)
        .scan_directory(dir.path(), None)
        .unwrap();

    assert_eq!(report.stats.files_added, 2);
    let values = catalog.find_duplicate_hash_values(HashKind::ExactMd5, None).unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].1, 2);
}

#[test]
fn test_excluded_paths_round_trip() {
    let dir = tempdir().unwrap();
    let catalog = Catalog::open_in_memory().unwrap();
    let volume = catalog.upsert_volume(&directory_volume(dir.path())).unwrap();

    assert!(catalog.add_excluded_path(volume, "/Cache/").unwrap());
    assert!(!catalog.add_excluded_path(volume, "Cache").unwrap());
    assert!(catalog.add_excluded_path(volume, "Backups/old").unwrap());
    assert_eq!(
        catalog.excluded_paths(volume).unwrap(),
        vec!["Backups/old".to_string(), "Cache".to_string()]
    );

    assert!(catalog.remove_excluded_path(volume, "Cache").unwrap());
    assert!(!catalog.remove_excluded_path(volume, "Cache").unwrap());
    assert_eq!(catalog.excluded_paths(volume).unwrap(), vec!["Backups/old".to_string()]);
}
