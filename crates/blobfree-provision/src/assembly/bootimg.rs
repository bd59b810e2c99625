//! Bootable image build for boot and recovery partitions.

use super::ramdisk::build_ramdisk;
use super::toolchain::{BootImageRequest, ImageToolchain};
use crate::error::AssemblyError;
use crate::fstab::BuildTask;
use crate::layout::DEVICE_TREE;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Text fragments read from a boot source directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootFragments {
    pub cmdline: String,
    pub pagesize: u32,
    pub base: String,
    /// `dt.img` two levels above the source directory, if present
    pub device_tree: Option<PathBuf>,
}

async fn read_fragment(source_dir: &Path, name: &str) -> Result<String, AssemblyError> {
    let path = source_dir.join(name);
    tokio::fs::read_to_string(&path)
        .await
        .map(|text| text.trim().to_string())
        .map_err(|e| AssemblyError::MissingFragment {
            path,
            message: e.to_string(),
        })
}

async fn find_device_tree(source_dir: &Path) -> Option<PathBuf> {
    let path = source_dir.parent()?.parent()?.join(DEVICE_TREE);
    tokio::fs::metadata(&path)
        .await
        .is_ok_and(|meta| meta.is_file())
        .then_some(path)
}

/// Parse a page size fragment.
///
/// # Errors
///
/// Rejects anything that is not a positive integer.
pub fn parse_pagesize(text: &str) -> Result<u32, AssemblyError> {
    match text.trim().parse::<u32>() {
        Ok(size) if size > 0 => Ok(size),
        _ => Err(AssemblyError::InvalidPageSize(text.to_string())),
    }
}

/// Read `cmdline`, `pagesize` and `base` and look for `dt.img`, concurrently.
///
/// # Errors
///
/// Fails if a fragment is unreadable or the page size is invalid.
pub async fn read_fragments(source_dir: &Path) -> Result<BootFragments, AssemblyError> {
    let (cmdline, pagesize, base, device_tree) = tokio::try_join!(
        read_fragment(source_dir, "cmdline"),
        read_fragment(source_dir, "pagesize"),
        read_fragment(source_dir, "base"),
        async { Ok::<_, AssemblyError>(find_device_tree(source_dir).await) },
    )?;
    Ok(BootFragments {
        cmdline,
        pagesize: parse_pagesize(&pagesize)?,
        base,
        device_tree,
    })
}

/// Ramdisk output path: `images/<stem>-ramdisk.img`.
pub fn ramdisk_path(task: &BuildTask) -> PathBuf {
    let stem = task.image_name.strip_suffix(".img").unwrap_or(&task.image_name);
    task.image_path.with_file_name(format!("{stem}-ramdisk.img"))
}

/// Build the ramdisk and the bootable image for `task`.
///
/// # Errors
///
/// Fails on a missing `RAMDISK`, fragment or kernel, on builder failure, or
/// when the builder leaves no image behind.
pub async fn build_boot_image(toolchain: &dyn ImageToolchain, task: &BuildTask) -> Result<PathBuf, AssemblyError> {
    let source = &task.source_dir;
    let kernel = source.join("kernel");
    let ramdisk = ramdisk_path(task);

    let (fragments, ()) = tokio::try_join!(read_fragments(source), build_ramdisk(toolchain, source, &ramdisk))?;
    let kernel_present = tokio::fs::metadata(&kernel).await.is_ok_and(|meta| meta.is_file());
    if !kernel_present {
        return Err(AssemblyError::MissingKernel(kernel));
    }
    debug!(
        image = %task.image_name,
        pagesize = fragments.pagesize,
        dt = fragments.device_tree.is_some(),
        "Boot fragments read"
    );

    let request = BootImageRequest {
        kernel,
        ramdisk,
        cmdline: fragments.cmdline,
        pagesize: fragments.pagesize,
        base: fragments.base,
        device_tree: fragments.device_tree,
        output: task.image_path.clone(),
    };
    toolchain.write_boot_image(&request).await?;

    let produced = tokio::fs::metadata(&task.image_path).await.is_ok_and(|meta| meta.is_file());
    if !produced {
        return Err(AssemblyError::OutputMissing {
            tool: "mkbootimg".to_string(),
            path: task.image_path.clone(),
        });
    }
    info!(image = %task.image_name, path = %task.image_path.display(), "Bootable image built");
    Ok(task.image_path.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pagesize() {
        assert_eq!(parse_pagesize("2048\n"), Ok(2048));
        assert!(matches!(parse_pagesize("0"), Err(AssemblyError::InvalidPageSize(_))));
        assert!(matches!(parse_pagesize("4k"), Err(AssemblyError::InvalidPageSize(_))));
        assert!(matches!(parse_pagesize("-2048"), Err(AssemblyError::InvalidPageSize(_))));
    }

    #[test]
    fn test_ramdisk_path() {
        let task = BuildTask {
            image_name: "recovery.img".into(),
            source_dir: "/s/content/RECOVERY".into(),
            image_path: "/s/images/recovery.img".into(),
            partition: "mmcblk0p2".into(),
        };
        assert_eq!(ramdisk_path(&task), PathBuf::from("/s/images/recovery-ramdisk.img"));
    }

    #[tokio::test]
    async fn test_fragments_and_device_tree() -> std::io::Result<()> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("content").join("BOOT");
        std::fs::create_dir_all(&source)?;
        std::fs::write(source.join("cmdline"), "console=ttyHSL0 \n")?;
        std::fs::write(source.join("pagesize"), "4096\n")?;
        std::fs::write(source.join("base"), "0x80000000\n")?;

        let fragments = read_fragments(&source).await.map_err(std::io::Error::other)?;
        assert_eq!(fragments.cmdline, "console=ttyHSL0");
        assert_eq!(fragments.pagesize, 4096);
        assert_eq!(fragments.device_tree, None);

        std::fs::write(dir.path().join(DEVICE_TREE), b"DTB")?;
        let fragments = read_fragments(&source).await.map_err(std::io::Error::other)?;
        assert_eq!(fragments.device_tree, Some(dir.path().join(DEVICE_TREE)));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_fragment() -> std::io::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("cmdline"), "x")?;
        std::fs::write(dir.path().join("pagesize"), "2048")?;
        let result = read_fragments(dir.path()).await;
        assert!(matches!(result, Err(AssemblyError::MissingFragment { path, .. }) if path.ends_with("base")));
        Ok(())
    }
}
