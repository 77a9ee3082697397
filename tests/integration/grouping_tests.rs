use dedupe::catalog::{Catalog, VolumeId};
use dedupe::classify::{FileFilter, HashKind, MinSizes};
use dedupe::duplicates::GroupingEngine;
use dedupe::scanner::{directory_volume, PerceptualAlgorithm, ScannerConfig, VolumeScanner};
use dedupe::signal::ScanControl;
use image::{Rgb, RgbImage};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn config() -> ScannerConfig {
    ScannerConfig::default()
        .with_hash_workers(2)
        .with_filter(FileFilter::new().with_min_sizes(MinSizes::none()))
}

fn scan(catalog: &Arc<Catalog>, root: &Path) -> VolumeId {
    scan_with(catalog, root, config())
}

fn scan_with(catalog: &Arc<Catalog>, root: &Path, config: ScannerConfig) -> VolumeId {
    VolumeScanner::new(Arc::clone(catalog), config, ScanControl::new())
        .scan_directory(root, None)
        .unwrap();
    catalog
        .volume_by_uuid(&directory_volume(root).uuid)
        .unwrap()
        .unwrap()
        .id
}

fn pattern(invert: bool) -> RgbImage {
    RgbImage::from_fn(64, 64, |x, y| {
        let band = if (x / 16 + y / 16) % 2 == 0 { 220 } else { 30 };
        let pixel = [((x * 2) as u8).saturating_add(band / 2), band, (y * 3) as u8];
        Rgb(if invert { pixel.map(|c| 255 - c) } else { pixel })
    })
}

#[test]
fn test_same_pixels_in_different_containers_group_on_pixel_hash() {
    let dir = tempdir().unwrap();
    let img = pattern(false);
    img.save(dir.path().join("photo.png")).unwrap();
    img.save(dir.path().join("photo.bmp")).unwrap();
    pattern(true).save(dir.path().join("other.png")).unwrap();

    let catalog = Arc::new(Catalog::open_in_memory().unwrap());
    scan(&catalog, dir.path());
    let engine = GroupingEngine::new();

    // Different encodings never match byte for byte.
    let exact = engine.catalog_groups(&catalog, HashKind::ExactMd5, None).unwrap();
    assert!(exact.is_empty());

    let pixel = engine.catalog_groups(&catalog, HashKind::PixelMd5, None).unwrap();
    assert_eq!(pixel.len(), 1);
    let group = &pixel[0];
    assert_eq!(group.len(), 2);
    assert_eq!(group.hash_kind(), Some(HashKind::PixelMd5));
    assert!(group.is_intra_directory());

    // The uncompressed bitmap is the larger file, so it is kept.
    let bmp_size = fs::metadata(dir.path().join("photo.bmp")).unwrap().len();
    let png_size = fs::metadata(dir.path().join("photo.png")).unwrap().len();
    assert!(bmp_size > png_size);
    assert_eq!(group.suggested_keep().filename, "photo.bmp");
    assert_eq!(group.suggested_delete()[0].filename, "photo.png");
}

#[test]
fn test_identical_jpegs_group_perceptually() {
    let dir = tempdir().unwrap();
    pattern(false).save(dir.path().join("a.jpg")).unwrap();
    fs::copy(dir.path().join("a.jpg"), dir.path().join("b.jpg")).unwrap();
    pattern(true).save(dir.path().join("c.jpg")).unwrap();

    let catalog = Arc::new(Catalog::open_in_memory().unwrap());
    scan(&catalog, dir.path());
    let engine = GroupingEngine::new();

    let groups = engine
        .catalog_perceptual_groups(&catalog, HashKind::PerceptualPhash, 10, None)
        .unwrap();
    assert_eq!(groups.len(), 1);
    let names: Vec<_> = groups[0].members().iter().map(|m| m.filename.as_str()).collect();
    assert_eq!(names, vec!["a.jpg", "b.jpg"]);
    assert_eq!(groups[0].similarity(0, 1), Some(1.0));

    // Lossy formats carry no whole-file hash.
    assert!(engine
        .catalog_groups(&catalog, HashKind::ExactMd5, None)
        .unwrap()
        .is_empty());
    assert_eq!(
        engine.catalog_groups(&catalog, HashKind::PixelMd5, None).unwrap().len(),
        1
    );
}

#[test]
fn test_configured_algorithm_drives_perceptual_groups() {
    let dir = tempdir().unwrap();
    pattern(false).save(dir.path().join("a.jpg")).unwrap();
    fs::copy(dir.path().join("a.jpg"), dir.path().join("b.jpg")).unwrap();

    let catalog = Arc::new(Catalog::open_in_memory().unwrap());
    scan_with(
        &catalog,
        dir.path(),
        config().with_perceptual_algorithm(PerceptualAlgorithm::Dhash),
    );
    let engine = GroupingEngine::new();

    let dhash = engine
        .catalog_perceptual_groups(
            &catalog,
            HashKind::PerceptualDhash,
            PerceptualAlgorithm::Dhash.default_threshold(),
            None,
        )
        .unwrap();
    assert_eq!(dhash.len(), 1);
    assert_eq!(dhash[0].len(), 2);
    assert_eq!(dhash[0].hash_kind(), Some(HashKind::PerceptualDhash));

    // Only the configured fingerprint is stored.
    assert!(engine
        .catalog_perceptual_groups(&catalog, HashKind::PerceptualPhash, 10, None)
        .unwrap()
        .is_empty());
}

#[test]
fn test_perceptual_query_rejects_exact_kind() {
    let catalog = Catalog::open_in_memory().unwrap();
    let result = GroupingEngine::new().catalog_perceptual_groups(&catalog, HashKind::ExactMd5, 10, None);
    assert!(result.is_err());
}

#[test]
fn test_cross_volume_groups_need_two_volumes() {
    let first = tempdir().unwrap();
    let second = tempdir().unwrap();
    fs::write(first.path().join("same.txt"), b"shared content").unwrap();
    fs::write(first.path().join("x1.txt"), b"local duplicate").unwrap();
    fs::write(first.path().join("x2.txt"), b"local duplicate").unwrap();
    fs::write(second.path().join("copy.txt"), b"shared content").unwrap();

    let catalog = Arc::new(Catalog::open_in_memory().unwrap());
    let v1 = scan(&catalog, first.path());
    let v2 = scan(&catalog, second.path());
    assert_ne!(v1, v2);
    let engine = GroupingEngine::new();

    let all = engine.catalog_groups(&catalog, HashKind::ExactMd5, None).unwrap();
    assert_eq!(all.len(), 2);

    let cross = engine.cross_volume_groups(&catalog, HashKind::ExactMd5, None).unwrap();
    assert_eq!(cross.len(), 1);
    assert_eq!(cross[0].group_id(), 0);
    assert!(cross[0].is_cross_volume());
    let mut names: Vec<_> = cross[0].members().iter().map(|m| m.filename.clone()).collect();
    names.sort();
    assert_eq!(names, vec!["copy.txt", "same.txt"]);

    let only_first = engine
        .cross_volume_groups(&catalog, HashKind::ExactMd5, Some(&[v1]))
        .unwrap();
    assert!(only_first.is_empty());
    let within_first = engine
        .catalog_groups(&catalog, HashKind::ExactMd5, Some(&[v1]))
        .unwrap();
    assert_eq!(within_first.len(), 1);
    assert!(!within_first[0].is_cross_volume());
}

#[test]
fn test_triple_within_one_volume_is_not_cross_volume() {
    let first = tempdir().unwrap();
    let second = tempdir().unwrap();
    for name in ["t1.txt", "t2.txt", "t3.txt"] {
        fs::write(first.path().join(name), b"three times here").unwrap();
    }
    fs::write(first.path().join("same.txt"), b"on both volumes").unwrap();
    fs::write(second.path().join("copy.txt"), b"on both volumes").unwrap();
    fs::write(second.path().join("other.txt"), b"only on the second").unwrap();

    let catalog = Arc::new(Catalog::open_in_memory().unwrap());
    let v1 = scan(&catalog, first.path());
    scan(&catalog, second.path());
    let engine = GroupingEngine::new();

    let cross = engine.cross_volume_groups(&catalog, HashKind::ExactMd5, None).unwrap();
    assert_eq!(cross.len(), 1);
    let mut names: Vec<_> = cross[0].members().iter().map(|m| m.filename.clone()).collect();
    names.sort();
    assert_eq!(names, vec!["copy.txt", "same.txt"]);

    let local = engine
        .catalog_groups(&catalog, HashKind::ExactMd5, Some(&[v1]))
        .unwrap();
    assert_eq!(local.len(), 1);
    assert_eq!(local[0].len(), 3);
    assert!(!local[0].is_cross_volume());
}

#[test]
fn test_cross_volume_groups_ignore_scan_order() {
    let a = tempdir().unwrap();
    let b = tempdir().unwrap();
    fs::write(a.path().join("report.txt"), b"quarterly numbers").unwrap();
    fs::write(b.path().join("backup.txt"), b"quarterly numbers").unwrap();

    let groups_for = |order: [&Path; 2]| {
        let catalog = Arc::new(Catalog::open_in_memory().unwrap());
        for root in order {
            scan(&catalog, root);
        }
        GroupingEngine::new()
            .cross_volume_groups(&catalog, HashKind::ExactMd5, None)
            .unwrap()
    };
    let a_first = groups_for([a.path(), b.path()]);
    let b_first = groups_for([b.path(), a.path()]);

    for groups in [&a_first, &b_first] {
        assert_eq!(groups.len(), 1);
        assert!(groups[0].is_cross_volume());
        assert_eq!(groups[0].similarity(0, 1), Some(1.0));
    }
    let paths = |groups: &[dedupe::duplicates::DuplicateGroup]| {
        let mut paths: Vec<_> = groups[0].members().iter().map(|m| m.path.clone()).collect();
        paths.sort();
        paths
    };
    assert_eq!(paths(&a_first), paths(&b_first));
}

#[test]
fn test_deleted_files_leave_groups() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), b"twin").unwrap();
    fs::write(dir.path().join("b.txt"), b"twin").unwrap();

    let catalog = Arc::new(Catalog::open_in_memory().unwrap());
    scan(&catalog, dir.path());
    let engine = GroupingEngine::new();
    assert_eq!(engine.catalog_groups(&catalog, HashKind::ExactMd5, None).unwrap().len(), 1);

    fs::remove_file(dir.path().join("b.txt")).unwrap();
    scan(&catalog, dir.path());
    assert!(engine
        .catalog_groups(&catalog, HashKind::ExactMd5, None)
        .unwrap()
        .is_empty());
}
