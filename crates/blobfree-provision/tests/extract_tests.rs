//! Distribution extraction and its fatal errors

mod common;

use blobfree_device::DeviceError;
use blobfree_provision::prelude::*;
use blobfree_provision::DistributionExtractor;
use blobfree_test_helpers::prelude::*;
use std::sync::Arc;

#[tokio::test]
async fn extracts_into_product_directory() -> TestResult {
    let dir = tempfile::tempdir()?;
    let staged = common::stage(dir.path(), &DistributionFixture::new()).await?;

    let root = dir.path().join("staging").join("acme_widget");
    assert_eq!(staged.root.path(), root);
    for name in ["blobfree.zip", "blobs-toinject.txt", "cmdline-fs.txt", "devices.json", "recovery.fstab"] {
        assert!(root.join(name).is_file(), "{name} missing");
    }
    assert!(root.join("content/BOOT/RAMDISK/init.rc").is_file());
    assert!(root.join("content/SYSTEM/build.prop").is_file());
    assert_eq!(staged.catalog.len(), 1);
    Ok(())
}

#[tokio::test]
async fn missing_required_file_is_fatal() -> TestResult {
    let dir = tempfile::tempdir()?;
    let fixture = DistributionFixture::new().without_file("recovery.fstab");

    let err = must_err(common::stage(dir.path(), &fixture).await);
    assert!(matches!(err, ProvisionError::MissingManifest(ref name) if name == "recovery.fstab"));
    assert!(err.is_invalid_distribution());
    Ok(())
}

#[tokio::test]
async fn missing_content_archive_is_fatal() -> TestResult {
    let dir = tempfile::tempdir()?;
    let fixture = DistributionFixture::new().without_content_archive();

    let err = must_err(common::stage(dir.path(), &fixture).await);
    assert!(matches!(err, ProvisionError::MissingManifest(ref name) if name == "blobfree.zip"));
    Ok(())
}

#[tokio::test]
async fn staging_path_must_be_a_directory() -> TestResult {
    let dir = tempfile::tempdir()?;
    std::fs::create_dir_all(dir.path().join("staging"))?;
    std::fs::write(dir.path().join("staging/acme_widget"), b"file in the way")?;

    let err = must_err(common::stage(dir.path(), &DistributionFixture::new()).await);
    assert!(matches!(err, ProvisionError::NotADirectory(_)));
    Ok(())
}

#[tokio::test]
async fn content_path_must_be_a_directory() -> TestResult {
    let dir = tempfile::tempdir()?;
    let root = dir.path().join("staging/acme_widget");
    std::fs::create_dir_all(&root)?;
    std::fs::write(root.join("content"), b"file in the way")?;

    let err = must_err(common::stage(dir.path(), &DistributionFixture::new()).await);
    assert!(matches!(err, ProvisionError::NotADirectory(ref path) if path.ends_with("content")));
    Ok(())
}

#[tokio::test]
async fn malformed_catalog_is_fatal() -> TestResult {
    let dir = tempfile::tempdir()?;
    let fixture = DistributionFixture::new().with_catalog("{ not json");

    let err = must_err(common::stage(dir.path(), &fixture).await);
    assert!(matches!(err, ProvisionError::Device(DeviceError::InvalidCatalog(_))));
    assert!(err.is_invalid_distribution());
    Ok(())
}

#[tokio::test]
async fn archive_name_needs_product_token() -> TestResult {
    let dir = tempfile::tempdir()?;
    let archive = DistributionFixture::new().write_to(dir.path(), ".42.zip");
    let extractor = DistributionExtractor::new(Arc::new(ZipCodec), dir.path().join("staging"));

    let err = must_err(extractor.extract(&archive).await);
    assert!(matches!(err, ProvisionError::InvalidArchiveName(_)));
    Ok(())
}

#[tokio::test]
async fn re_extraction_keeps_staged_content() -> TestResult {
    let dir = tempfile::tempdir()?;
    let staged = common::stage(dir.path(), &DistributionFixture::new()).await?;
    let build_prop = staged.root.content().join("SYSTEM/build.prop");
    std::fs::write(&build_prop, b"locally modified")?;

    let fixture = DistributionFixture::new().with_manifest("x.bin:system/x.bin\n");
    let staged = common::stage(dir.path(), &fixture).await?;

    assert_eq!(std::fs::read(&build_prop)?, b"locally modified");
    let manifest = std::fs::read_to_string(staged.root.file("blobs-toinject.txt"))?;
    assert_eq!(manifest, "x.bin:system/x.bin\n");
    Ok(())
}
