//! Blob injection against a staged distribution

mod common;

use blobfree_provision::fstab;
use blobfree_provision::inject::inject_blobs;
use blobfree_provision::prelude::*;
use blobfree_test_helpers::prelude::*;

const MANIFEST: &str = "\
lib/firmware/a.bin:system/lib/firmware/a.bin
etc/b.cfg:vendor/etc/b.cfg
";

async fn mounts(root: &StagingRoot) -> Result<Vec<String>, ProvisionError> {
    let entries = fstab::load_fstab(&root.file("recovery.fstab")).await?;
    Ok(fstab::staged_mounts(root, &entries).await)
}

fn cache_blobs(root: &StagingRoot) -> std::io::Result<()> {
    std::fs::create_dir_all(root.blobs().join("lib/firmware"))?;
    std::fs::create_dir_all(root.blobs().join("etc"))?;
    std::fs::write(root.blobs().join("lib/firmware/a.bin"), b"A")?;
    std::fs::write(root.blobs().join("etc/b.cfg"), b"B")
}

#[tokio::test]
async fn places_targets_by_mount() -> TestResult {
    let dir = tempfile::tempdir()?;
    let staged = common::stage(dir.path(), &DistributionFixture::new()).await?;
    let root = &staged.root;
    cache_blobs(root)?;

    let report = inject_blobs(root, &BlobMapping::parse(MANIFEST), &mounts(root).await?).await?;

    assert_eq!(report.injected, vec!["system/lib/firmware/a.bin", "vendor/etc/b.cfg"]);
    assert_eq!(std::fs::read(root.content().join("SYSTEM/system/lib/firmware/a.bin"))?, b"A");
    assert_eq!(std::fs::read(root.content().join("vendor/etc/b.cfg"))?, b"B");
    assert!(!root.content().join("SYSTEM/system/lib/firmware/a.bin.injecting").exists());
    Ok(())
}

#[tokio::test]
async fn second_run_changes_nothing() -> TestResult {
    let dir = tempfile::tempdir()?;
    let staged = common::stage(dir.path(), &DistributionFixture::new()).await?;
    let root = &staged.root;
    cache_blobs(root)?;
    let mapping = BlobMapping::parse(MANIFEST);
    let mounts = mounts(root).await?;

    inject_blobs(root, &mapping, &mounts).await?;
    std::fs::write(root.blobs().join("etc/b.cfg"), b"changed upstream")?;
    let again = inject_blobs(root, &mapping, &mounts).await?;

    assert!(again.injected.is_empty());
    assert_eq!(again.already_present, vec!["system/lib/firmware/a.bin", "vendor/etc/b.cfg"]);
    assert_eq!(std::fs::read(root.content().join("vendor/etc/b.cfg"))?, b"B");
    Ok(())
}

#[tokio::test]
async fn existing_content_file_is_not_overwritten() -> TestResult {
    let dir = tempfile::tempdir()?;
    let fixture = DistributionFixture::new().with_content("SYSTEM/system/lib/firmware/a.bin", "shipped");
    let staged = common::stage(dir.path(), &fixture).await?;
    let root = &staged.root;
    cache_blobs(root)?;

    let report = inject_blobs(root, &BlobMapping::parse(MANIFEST), &mounts(root).await?).await?;

    assert_eq!(report.already_present, vec!["system/lib/firmware/a.bin"]);
    assert_eq!(std::fs::read(root.content().join("SYSTEM/system/lib/firmware/a.bin"))?, b"shipped");
    Ok(())
}

#[tokio::test]
async fn uncached_blob_is_reported_failed() -> TestResult {
    let dir = tempfile::tempdir()?;
    let staged = common::stage(dir.path(), &DistributionFixture::new()).await?;
    let root = &staged.root;

    let report = inject_blobs(root, &BlobMapping::parse(MANIFEST), &mounts(root).await?).await?;

    assert!(report.injected.is_empty());
    assert_eq!(report.failed, vec!["system/lib/firmware/a.bin", "vendor/etc/b.cfg"]);
    Ok(())
}
