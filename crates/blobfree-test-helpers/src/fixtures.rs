//! Distribution archive builders.
//!
//! [`DistributionFixture`] writes a distribution zip with the five required
//! root files and a nested `blobfree.zip` holding the content tree. The
//! defaults describe one supported device, `acme-widget`, with a single blob
//! and boot/recovery/system content directories.

use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Catalog with one descriptor matching `ro.product.device = widget`.
pub const SAMPLE_CATALOG: &str = r#"[
  {
    "id": "acme-widget",
    "adb": { "ro.product.device": "widget" },
    "fastboot": { "product": ["widget", "widget_lte"] }
  }
]
"#;

/// One valid mapping plus one malformed line.
pub const SAMPLE_MANIFEST: &str = "lib/firmware/a.bin:system/lib/firmware/a.bin\nnoop\n";

/// Recovery fstab with boot, recovery and system entries.
pub const SAMPLE_FSTAB: &str = "\
# mount point  fstype  device
/dev/block/mmcblk0p1 /boot emmc defaults defaults
/dev/block/mmcblk0p2 /recovery emmc defaults defaults
/dev/block/mmcblk0p5 /system ext4 ro,barrier=1 wait
";

/// Build a zip from path to bytes entries. Paths ending in `/` become
/// directories.
///
/// # Panics
///
/// Panics if the zip writer fails, which only happens on allocation failure.
pub fn zip_bytes(entries: &BTreeMap<String, Vec<u8>>) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, data) in entries {
        if name.ends_with('/') {
            zip.add_directory(name.as_str(), options).unwrap();
        } else {
            zip.start_file(name.as_str(), options).unwrap();
            zip.write_all(data).unwrap();
        }
    }
    zip.finish().unwrap().into_inner()
}

/// Builder for distribution archives.
#[derive(Debug, Clone)]
pub struct DistributionFixture {
    files: BTreeMap<String, Vec<u8>>,
    content: BTreeMap<String, Vec<u8>>,
    include_content: bool,
}

impl Default for DistributionFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl DistributionFixture {
    /// Distribution for the sample `acme-widget` device.
    pub fn new() -> Self {
        let mut fixture = Self {
            files: BTreeMap::new(),
            content: BTreeMap::new(),
            include_content: true,
        };
        fixture.files.insert("blobs-toinject.txt".into(), SAMPLE_MANIFEST.into());
        fixture.files.insert("cmdline-fs.txt".into(), b"-l 512M -a system\n".to_vec());
        fixture.files.insert("devices.json".into(), SAMPLE_CATALOG.into());
        fixture.files.insert("recovery.fstab".into(), SAMPLE_FSTAB.into());

        for partition in ["BOOT", "RECOVERY"] {
            fixture.content.insert(format!("{partition}/kernel"), b"KERNEL".to_vec());
            fixture.content.insert(format!("{partition}/cmdline"), b"console=ttyHSL0 \n".to_vec());
            fixture.content.insert(format!("{partition}/pagesize"), b"2048\n".to_vec());
            fixture.content.insert(format!("{partition}/base"), b"0x00000000\n".to_vec());
            fixture.content.insert(format!("{partition}/RAMDISK/init.rc"), b"on boot\n".to_vec());
        }
        fixture.content.insert("SYSTEM/build.prop".into(), b"ro.build.id=blobfree\n".to_vec());
        fixture
    }

    /// Replace or add a root file.
    pub fn with_file(mut self, name: &str, data: impl Into<Vec<u8>>) -> Self {
        self.files.insert(name.to_string(), data.into());
        self
    }

    /// Drop a root file.
    pub fn without_file(mut self, name: &str) -> Self {
        self.files.remove(name);
        self
    }

    /// Replace or add a file inside the nested content archive.
    pub fn with_content(mut self, path: &str, data: impl Into<Vec<u8>>) -> Self {
        self.content.insert(path.to_string(), data.into());
        self
    }

    /// Drop every content entry under `prefix`.
    pub fn without_content(mut self, prefix: &str) -> Self {
        self.content.retain(|path, _| !path.starts_with(prefix));
        self
    }

    pub fn with_manifest(self, text: &str) -> Self {
        self.with_file("blobs-toinject.txt", text)
    }

    pub fn with_fstab(self, text: &str) -> Self {
        self.with_file("recovery.fstab", text)
    }

    pub fn with_catalog(self, json: &str) -> Self {
        self.with_file("devices.json", json)
    }

    /// Bytes of the nested content archive.
    pub fn content_archive(&self) -> Vec<u8> {
        zip_bytes(&self.content)
    }

    /// Leave the nested content archive out of the distribution.
    pub fn without_content_archive(mut self) -> Self {
        self.include_content = false;
        self
    }

    /// Bytes of the whole distribution archive.
    pub fn archive(&self) -> Vec<u8> {
        let mut entries = self.files.clone();
        if self.include_content {
            entries.insert("blobfree.zip".into(), self.content_archive());
        }
        zip_bytes(&entries)
    }

    /// Write the archive as `dir/name` and return its path.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    pub fn write_to(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.archive()).unwrap();
        path
    }
}
