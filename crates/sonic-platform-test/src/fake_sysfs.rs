//! Temporary directory standing in for `/`.

use std::fs;
use std::path::{Path, PathBuf};

use sonic_platform_common::Sysfs;
use tempfile::TempDir;

/// A fake filesystem root. Paths given to the builder methods are logical
/// absolute paths (`/sys/...`) and land below the temporary directory.
///
/// The directory is removed when the value is dropped, so keep it alive for
/// as long as the [`Sysfs`] handle is used.
pub struct FakeSysfs {
    dir: TempDir,
    sysfs: Sysfs,
}

impl FakeSysfs {
    /// Creates an empty fake root.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let sysfs = Sysfs::with_root(dir.path());
        Self { dir, sysfs }
    }

    /// Handle rooted at the fake tree.
    pub fn sysfs(&self) -> Sysfs {
        self.sysfs.clone()
    }

    /// Real location of the fake root.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Real path of a logical path.
    pub fn path(&self, logical: impl AsRef<Path>) -> PathBuf {
        self.sysfs.resolve(logical)
    }

    /// Writes a text attribute, creating parent directories.
    pub fn file(&self, logical: impl AsRef<Path>, content: impl AsRef<str>) -> &Self {
        self.bytes(logical, content.as_ref().as_bytes())
    }

    /// Writes a binary file, creating parent directories.
    pub fn bytes(&self, logical: impl AsRef<Path>, content: &[u8]) -> &Self {
        let real = self.path(logical);
        if let Some(parent) = real.parent() {
            fs::create_dir_all(parent).expect("failed to create parent dir");
        }
        fs::write(&real, content).expect("failed to write fake file");
        self
    }

    /// Creates a directory (and its parents).
    pub fn dir(&self, logical: impl AsRef<Path>) -> &Self {
        fs::create_dir_all(self.path(logical)).expect("failed to create dir");
        self
    }

    /// Creates `link` pointing at the logical `target` inside the tree.
    pub fn symlink(&self, target: impl AsRef<Path>, link: impl AsRef<Path>) -> &Self {
        let real_link = self.path(link);
        if let Some(parent) = real_link.parent() {
            fs::create_dir_all(parent).expect("failed to create parent dir");
        }
        std::os::unix::fs::symlink(self.path(target), real_link).expect("failed to create symlink");
        self
    }

    /// Removes a file or directory.
    pub fn remove(&self, logical: impl AsRef<Path>) -> &Self {
        self.sysfs.remove(logical).expect("failed to remove fake file");
        self
    }

    /// Reads a file back as text (untrimmed).
    pub fn read(&self, logical: impl AsRef<Path>) -> String {
        fs::read_to_string(self.path(logical)).unwrap_or_default()
    }

    /// Returns true if the logical path exists.
    pub fn exists(&self, logical: impl AsRef<Path>) -> bool {
        self.sysfs.exists(logical)
    }
}

impl Default for FakeSysfs {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_writes_below_root() {
        let fake = FakeSysfs::new();
        fake.file("/sys/bus/i2c/devices/3-0060/fan_present_1", "1\n")
            .dir("/sys/bus/i2c/drivers/lm75");

        assert!(fake.root().join("sys/bus/i2c/devices/3-0060/fan_present_1").is_file());
        assert_eq!(
            fake.sysfs()
                .read_str("/sys/bus/i2c/devices/3-0060/fan_present_1")
                .unwrap(),
            "1"
        );
        assert!(fake.exists("/sys/bus/i2c/drivers/lm75"));
    }

    #[test]
    fn test_symlink_and_remove() {
        let fake = FakeSysfs::new();
        fake.file("/host/reboot-cause/a.json", "{}")
            .symlink("/host/reboot-cause/a.json", "/host/reboot-cause/latest.json");
        assert_eq!(fake.read("/host/reboot-cause/latest.json"), "{}");
        fake.remove("/host/reboot-cause");
        assert!(!fake.exists("/host/reboot-cause/a.json"));
    }
}
