use dedupe::classify::HashKind;
use dedupe::scanner::{
    exact_md5, pixel_md5, ContentHasher, HashError, PerceptualAlgorithm, PerceptualHasher, CHUNK_SIZE,
};
use image::{Rgb, RgbImage};
use std::fs;
use tempfile::tempdir;

fn gradient() -> RgbImage {
    RgbImage::from_fn(48, 32, |x, y| Rgb([(x * 5) as u8, (y * 7) as u8, ((x + y) * 2) as u8]))
}

#[test]
fn test_exact_md5_known_digests() {
    let dir = tempdir().unwrap();
    let hello = dir.path().join("hello.txt");
    let empty = dir.path().join("empty.txt");
    fs::write(&hello, b"hello").unwrap();
    fs::write(&empty, b"").unwrap();

    assert_eq!(exact_md5(&hello).unwrap(), "5d41402abc4b2a76b9719d911017c592");
    assert_eq!(exact_md5(&empty).unwrap(), "d41d8cd98f00b204e9800998ecf8427e");
}

#[test]
fn test_exact_md5_streams_across_chunks() {
    let dir = tempdir().unwrap();
    let data: Vec<u8> = (0..CHUNK_SIZE * 3 + 17).map(|i| (i % 251) as u8).collect();
    let whole = dir.path().join("whole.bin");
    let copy = dir.path().join("copy.bin");
    fs::write(&whole, &data).unwrap();
    fs::write(&copy, &data).unwrap();

    let mut changed = data.clone();
    changed[CHUNK_SIZE * 2] ^= 0xff;
    let other = dir.path().join("other.bin");
    fs::write(&other, &changed).unwrap();

    assert_eq!(exact_md5(&whole).unwrap(), exact_md5(&copy).unwrap());
    assert_ne!(exact_md5(&whole).unwrap(), exact_md5(&other).unwrap());
}

#[test]
fn test_missing_file_is_not_found() {
    let dir = tempdir().unwrap();
    let err = exact_md5(&dir.path().join("absent.txt")).unwrap_err();
    assert!(matches!(err, HashError::NotFound(_)));
}

#[test]
fn test_pixel_md5_ignores_container() {
    let dir = tempdir().unwrap();
    let img = gradient();
    let png = dir.path().join("image.png");
    let bmp = dir.path().join("image.bmp");
    img.save(&png).unwrap();
    img.save(&bmp).unwrap();

    assert_ne!(exact_md5(&png).unwrap(), exact_md5(&bmp).unwrap());
    assert_eq!(pixel_md5(&png).unwrap(), pixel_md5(&bmp).unwrap());
}

#[test]
fn test_pixel_md5_rejects_non_images() {
    let dir = tempdir().unwrap();
    let fake = dir.path().join("fake.png");
    fs::write(&fake, b"definitely not a png").unwrap();
    assert!(matches!(pixel_md5(&fake), Err(HashError::Decode { .. })));
}

#[test]
fn test_content_hasher_pixel_falls_back_to_exact() {
    let dir = tempdir().unwrap();
    let fake = dir.path().join("fake.png");
    fs::write(&fake, b"definitely not a png").unwrap();
    let hasher = ContentHasher::new();

    assert_eq!(
        hasher.compute(&fake, HashKind::PixelMd5),
        Some(exact_md5(&fake).unwrap())
    );
    assert_eq!(hasher.compute(&fake, HashKind::PerceptualPhash), None);
    assert_eq!(hasher.compute(&dir.path().join("absent.png"), HashKind::ExactMd5), None);
}

#[test]
fn test_perceptual_fingerprints_are_stable_and_sized() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("image.png");
    gradient().save(&path).unwrap();

    for algorithm in PerceptualAlgorithm::ALL {
        let hasher = PerceptualHasher::new(algorithm);
        let first = hasher.compute(&path).unwrap();
        let second = hasher.compute(&path).unwrap();
        assert_eq!(first, second, "{algorithm} is not deterministic");
        assert_eq!(first.bit_len(), algorithm.bit_len());
        assert_eq!(first.distance(&second), Some(0));
    }
}

#[test]
fn test_content_hasher_perceptual_matches_hasher() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("image.png");
    gradient().save(&path).unwrap();

    let expected = PerceptualHasher::new(PerceptualAlgorithm::Dhash)
        .compute(&path)
        .unwrap()
        .to_hex();
    let value = ContentHasher::new()
        .compute(&path, HashKind::PerceptualDhash)
        .unwrap();
    assert_eq!(value, expected);
}
