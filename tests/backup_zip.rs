#[path = "../src/backup.rs"]
mod backup;

use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

#[test]
fn zip_export_and_import_roundtrip() {
    let workspace = temp_dir("obed-backup-src");
    let workspace2 = temp_dir("obed-backup-dst");
    let out_dir = temp_dir("obed-backup-out");

    let bytes = b"sqlite-test-payload";
    std::fs::write(workspace.join("obed.sqlite3"), bytes).expect("write source db");

    let bundle_path = out_dir.join("workspace.zip");
    let export = backup::export_workspace_bundle(&workspace, &bundle_path).expect("export bundle");
    assert_eq!(export.bundle_format, backup::BUNDLE_FORMAT_V1);
    assert_eq!(export.entry_count, 3);
    assert_eq!(export.db_sha256.len(), 64);

    let f = File::open(&bundle_path).expect("open bundle");
    let mut archive = zip::ZipArchive::new(f).expect("open zip archive");
    let mut manifest = String::new();
    archive
        .by_name("manifest.json")
        .expect("manifest entry")
        .read_to_string(&mut manifest)
        .expect("read manifest");
    let manifest: serde_json::Value = serde_json::from_str(&manifest).expect("manifest json");
    assert_eq!(manifest["format"], backup::BUNDLE_FORMAT_V1);
    assert_eq!(manifest["dbSha256"], export.db_sha256.as_str());
    assert!(archive.by_name("meta/workspace.json").is_ok());

    let import = backup::import_workspace_bundle(&bundle_path, &workspace2).expect("import bundle");
    assert_eq!(import.bundle_format_detected, backup::BUNDLE_FORMAT_V1);
    let restored = std::fs::read(workspace2.join("obed.sqlite3")).expect("read restored db");
    assert_eq!(restored, bytes);
    assert!(!workspace2.join("obed.sqlite3.importing").exists());
}

#[test]
fn raw_sqlite_file_is_accepted() {
    let src_dir = temp_dir("obed-backup-raw-src");
    let dst = temp_dir("obed-backup-raw-dst");
    let raw = src_dir.join("copy.sqlite3");
    std::fs::write(&raw, b"SQLite format 3\0raw").expect("write raw");

    let import = backup::import_workspace_bundle(&raw, &dst).expect("import raw");
    assert_eq!(import.bundle_format_detected, "raw-sqlite3");
    assert_eq!(
        std::fs::read(dst.join("obed.sqlite3")).expect("read"),
        b"SQLite format 3\0raw"
    );
}

#[test]
fn checksum_mismatch_leaves_existing_db_untouched() {
    let out_dir = temp_dir("obed-backup-tampered");
    let dst = temp_dir("obed-backup-tampered-dst");
    std::fs::write(dst.join("obed.sqlite3"), b"original").expect("seed dst");

    let bundle_path = out_dir.join("tampered.zip");
    let file = File::create(&bundle_path).expect("create zip");
    let mut zip = zip::ZipWriter::new(file);
    let opts = zip::write::FileOptions::default();
    zip.start_file("manifest.json", opts).expect("manifest");
    zip.write_all(
        serde_json::json!({
            "format": backup::BUNDLE_FORMAT_V1,
            "version": 1,
            "dbSha256": "00".repeat(32),
        })
        .to_string()
        .as_bytes(),
    )
    .expect("write manifest");
    zip.start_file("db/obed.sqlite3", opts).expect("db entry");
    zip.write_all(b"tampered").expect("write db");
    zip.finish().expect("finish zip");

    let e = backup::import_workspace_bundle(&bundle_path, &dst).expect_err("must fail");
    assert!(e.to_string().contains("checksum mismatch"), "{}", e);
    assert_eq!(std::fs::read(dst.join("obed.sqlite3")).expect("read"), b"original");
}

#[test]
fn unknown_bundle_format_is_rejected() {
    let out_dir = temp_dir("obed-backup-format");
    let dst = temp_dir("obed-backup-format-dst");
    let bundle_path = out_dir.join("other.zip");
    let file = File::create(&bundle_path).expect("create zip");
    let mut zip = zip::ZipWriter::new(file);
    zip.start_file("manifest.json", zip::write::FileOptions::default())
        .expect("manifest");
    zip.write_all(br#"{"format":"something-else"}"#).expect("write");
    zip.finish().expect("finish");

    let e = backup::import_workspace_bundle(&bundle_path, &dst).expect_err("must fail");
    assert!(e.to_string().contains("unsupported bundle format"));
}
