use std::fs;

use bytes::Bytes;
use harvester_engine::{ensure_output_dir, AtomicFileWriter, ExistingFile, PersistError};
use tempfile::TempDir;

#[test]
fn creates_missing_output_dir() {
    let temp = TempDir::new().unwrap();
    let new_dir = temp.path().join("out").join("images");
    assert!(!new_dir.exists());
    ensure_output_dir(&new_dir).unwrap();
    assert!(new_dir.is_dir());
}

#[test]
fn atomic_write_refuses_to_clobber_by_default() {
    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(temp.path().to_path_buf());

    let first = writer.write("post_1_20250101_000000_img1.jpg", b"\xff\xd8one").unwrap();
    assert_eq!(first.file_name().unwrap(), "post_1_20250101_000000_img1.jpg");
    assert_eq!(fs::read(&first).unwrap(), b"\xff\xd8one");

    let err = writer
        .write("post_1_20250101_000000_img1.jpg", b"\xff\xd8two")
        .unwrap_err();
    assert!(matches!(err, PersistError::AlreadyExists(path) if path == first));
    assert_eq!(fs::read(&first).unwrap(), b"\xff\xd8one");

    // Only the target remains; the rejected temp file was cleaned up.
    assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 1);
}

#[test]
fn replace_policy_overwrites_existing() {
    let temp = TempDir::new().unwrap();
    let writer =
        AtomicFileWriter::new(temp.path().to_path_buf()).with_existing(ExistingFile::Replace);

    let first = writer.write("doc.json", b"hello").unwrap();
    let second = writer.write("doc.json", b"world").unwrap();
    assert_eq!(first, second);
    assert_eq!(fs::read_to_string(&second).unwrap(), "world");
}

#[test]
fn no_partial_file_on_error() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("not_a_dir");
    fs::write(&file_path, "x").unwrap();

    let writer = AtomicFileWriter::new(file_path.clone());
    let result = writer.write("doc.json", b"data");
    assert!(matches!(result, Err(PersistError::OutputDir(_))));
    assert!(!file_path.with_file_name("doc.json").exists());
}

#[tokio::test(flavor = "current_thread")]
async fn async_write_lands_the_same_file_as_a_blocking_write() {
    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(temp.path().join("images"));
    let content = Bytes::from(vec![0xAB; 512 * 1024]);

    let path = writer
        .write_async("post_2_20250101_000000_img1.jpg".to_string(), content.clone())
        .await
        .unwrap();

    assert_eq!(path, temp.path().join("images/post_2_20250101_000000_img1.jpg"));
    assert_eq!(fs::read(&path).unwrap(), content.as_ref());
}

#[tokio::test(flavor = "current_thread")]
async fn async_write_keeps_the_no_clobber_error() {
    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(temp.path().to_path_buf());
    writer.write("taken.json", b"{}").unwrap();

    let err = writer
        .write_async("taken.json".to_string(), Bytes::from_static(b"[]"))
        .await
        .unwrap_err();

    assert!(matches!(err, PersistError::AlreadyExists(_)));
    assert_eq!(fs::read(temp.path().join("taken.json")).unwrap(), b"{}");
}
