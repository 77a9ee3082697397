use dedupe::catalog::{Catalog, FileInfo, VolumeId, VolumeInfo};
use dedupe::classify::{FileFilter, FileType, HashKind, MinSizes};
use dedupe::scanner::{directory_volume, ScannerConfig, VolumeScanner};
use dedupe::signal::ScanControl;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn scan(catalog: &Arc<Catalog>, root: &Path) -> VolumeId {
    let config = ScannerConfig::default().with_filter(FileFilter::new().with_min_sizes(MinSizes::none()));
    VolumeScanner::new(Arc::clone(catalog), config, ScanControl::new())
        .scan_directory(root, None)
        .unwrap();
    catalog
        .volume_by_uuid(&directory_volume(root).uuid)
        .unwrap()
        .unwrap()
        .id
}

fn two_volumes() -> (tempfile::TempDir, tempfile::TempDir, Arc<Catalog>, VolumeId, VolumeId) {
    let a = tempdir().unwrap();
    let b = tempdir().unwrap();
    fs::write(a.path().join("one.txt"), b"one").unwrap();
    fs::write(a.path().join("two.txt"), b"two").unwrap();
    fs::write(b.path().join("first.txt"), b"one").unwrap();
    fs::write(b.path().join("third.txt"), b"three").unwrap();

    let catalog = Arc::new(Catalog::open_in_memory().unwrap());
    let va = scan(&catalog, a.path());
    let vb = scan(&catalog, b.path());
    (a, b, catalog, va, vb)
}

#[test]
fn test_difference_lists_files_missing_from_other_volume() {
    let (_a, _b, catalog, va, vb) = two_volumes();

    let only_b = catalog.set_difference(vb, va, HashKind::ExactMd5).unwrap();
    let names: Vec<_> = only_b.iter().map(|f| f.relative_path.as_str()).collect();
    assert_eq!(names, vec!["third.txt"]);

    let only_a = catalog.set_difference(va, vb, HashKind::ExactMd5).unwrap();
    let names: Vec<_> = only_a.iter().map(|f| f.relative_path.as_str()).collect();
    assert_eq!(names, vec!["two.txt"]);
}

#[test]
fn test_intersection_pairs_matching_content() {
    let (_a, _b, catalog, va, vb) = two_volumes();

    let pairs = catalog.set_intersection(va, vb, HashKind::ExactMd5).unwrap();
    assert_eq!(pairs.len(), 1);
    let (in_a, in_b) = &pairs[0];
    assert_eq!(in_a.volume_id, va);
    assert_eq!(in_a.relative_path, "one.txt");
    assert_eq!(in_b.volume_id, vb);
    assert_eq!(in_b.relative_path, "first.txt");
}

#[test]
fn test_difference_keeps_unhashed_files() {
    let catalog = Catalog::open_in_memory().unwrap();
    let va = catalog.upsert_volume(&VolumeInfo::new("a", "A", "/mnt/a")).unwrap();
    let vb = catalog.upsert_volume(&VolumeInfo::new("b", "B", "/mnt/b")).unwrap();
    let hashed_a = catalog
        .upsert_file(va, &FileInfo::new("x.txt", 1, FileType::Document))
        .unwrap();
    catalog.set_hash(hashed_a, HashKind::ExactMd5, "x").unwrap();
    catalog
        .upsert_file(va, &FileInfo::new("unhashed.txt", 1, FileType::Document))
        .unwrap();
    let hashed_b = catalog
        .upsert_file(vb, &FileInfo::new("x.txt", 1, FileType::Document))
        .unwrap();
    catalog.set_hash(hashed_b, HashKind::ExactMd5, "x").unwrap();
    catalog
        .upsert_file(vb, &FileInfo::new("unhashed.txt", 1, FileType::Document))
        .unwrap();

    let only_b = catalog.set_difference(vb, va, HashKind::ExactMd5).unwrap();
    let names: Vec<_> = only_b.iter().map(|f| f.relative_path.as_str()).collect();
    assert_eq!(names, vec!["unhashed.txt"]);
}

#[test]
fn test_set_queries_ignore_deleted_files() {
    let (_a, _b, catalog, va, vb) = two_volumes();
    let one = catalog.file_by_path(va, "one.txt").unwrap().unwrap();
    assert!(catalog.mark_file_deleted(one.id).unwrap());

    assert!(catalog.set_intersection(va, vb, HashKind::ExactMd5).unwrap().is_empty());
    let only_b = catalog.set_difference(vb, va, HashKind::ExactMd5).unwrap();
    let names: Vec<_> = only_b.iter().map(|f| f.relative_path.as_str()).collect();
    assert_eq!(names, vec!["first.txt", "third.txt"]);
}

#[test]
fn test_volume_compared_with_itself() {
    let (_a, _b, catalog, va, _vb) = two_volumes();
    assert!(catalog.set_difference(va, va, HashKind::ExactMd5).unwrap().is_empty());
    assert_eq!(catalog.set_intersection(va, va, HashKind::ExactMd5).unwrap().len(), 2);
}
