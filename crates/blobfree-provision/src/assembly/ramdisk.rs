//! Ramdisk build: pack `RAMDISK/` and gzip it.

use super::toolchain::ImageToolchain;
use crate::error::AssemblyError;
use flate2::{Compression, write::GzEncoder};
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Subdirectory holding the ramdisk tree.
pub const RAMDISK_DIR: &str = "RAMDISK";

/// Gzip a cpio stream.
///
/// # Errors
///
/// Fails only if the encoder fails to write to memory.
pub fn compress(cpio: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(cpio.len() / 2), Compression::default());
    encoder.write_all(cpio)?;
    encoder.finish()
}

/// Pack `<source>/RAMDISK` and write the gzipped result to `output`.
///
/// # Errors
///
/// Fails fast with [`AssemblyError::MissingRamdisk`] if `RAMDISK` is absent
/// or not a directory, and otherwise on packer or write failures.
pub async fn build_ramdisk(
    toolchain: &dyn ImageToolchain,
    source_dir: &Path,
    output: &Path,
) -> Result<(), AssemblyError> {
    let ramdisk_dir = source_dir.join(RAMDISK_DIR);
    let is_dir = tokio::fs::metadata(&ramdisk_dir)
        .await
        .is_ok_and(|meta| meta.is_dir());
    if !is_dir {
        return Err(AssemblyError::MissingRamdisk(ramdisk_dir));
    }

    let cpio = toolchain.pack_ramdisk(&ramdisk_dir).await?;
    let compressed = compress(&cpio).map_err(|e| AssemblyError::io(output, &e))?;
    tokio::fs::write(output, &compressed)
        .await
        .map_err(|e| AssemblyError::io(output, &e))?;

    debug!(
        ramdisk = %output.display(),
        cpio_bytes = cpio.len(),
        gz_bytes = compressed.len(),
        "Ramdisk written"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn test_compress_round_trips() -> std::io::Result<()> {
        let cpio = b"070701 fake cpio payload".repeat(64);
        let compressed = compress(&cpio)?;
        assert!(compressed.len() < cpio.len());
        assert_eq!(compressed.get(..2), Some(&[0x1f, 0x8b][..]));

        let mut decoded = Vec::new();
        GzDecoder::new(compressed.as_slice()).read_to_end(&mut decoded)?;
        assert_eq!(decoded, cpio);
        Ok(())
    }
}
