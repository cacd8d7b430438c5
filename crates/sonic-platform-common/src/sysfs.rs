//! Sysfs path helpers.
//!
//! Every driver reads hardware through a [`Sysfs`] handle instead of calling
//! `std::fs` with absolute paths. In production the handle is rooted at `/`;
//! tests root it at a temporary directory populated with fake attribute
//! files, so `/sys/bus/i2c/devices/3-0060/fan_present_1` resolves to
//! `<tmp>/sys/bus/i2c/devices/3-0060/fan_present_1`.
//!
//! | helper | behaviour |
//! |--------|-----------|
//! | [`Sysfs::read_str`] | whole file, surrounding whitespace trimmed |
//! | [`Sysfs::read_int`] | [`parse_int`] on the trimmed text |
//! | [`Sysfs::read_float`] | `f64` on the trimmed text |
//! | [`Sysfs::resolve_glob`] | first match of a `hwmon*` style pattern |

use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};

use crate::error::{PlatformError, PlatformResult};

/// Handle for reading and writing files below a root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sysfs {
    root: PathBuf,
}

impl Default for Sysfs {
    fn default() -> Self {
        Self::new()
    }
}

impl Sysfs {
    /// Handle rooted at `/`.
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("/"),
        }
    }

    /// Handle rooted at `root`; absolute paths are re-anchored below it.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a logical absolute path to the real path below the root.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let relative: PathBuf = path
            .as_ref()
            .components()
            .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
            .collect();
        self.root.join(relative)
    }

    /// Returns true if the path exists (file, directory or symlink target).
    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.resolve(path).exists()
    }

    /// Returns true if the path itself exists, without following symlinks.
    pub fn link_exists(&self, path: impl AsRef<Path>) -> bool {
        fs::symlink_metadata(self.resolve(path)).is_ok()
    }

    /// Reads a whole attribute file and trims surrounding whitespace.
    pub fn read_str(&self, path: impl AsRef<Path>) -> PlatformResult<String> {
        let real = self.resolve(&path);
        fs::read_to_string(&real)
            .map(|s| s.trim().to_string())
            .map_err(|e| PlatformError::io(path.as_ref(), e))
    }

    /// Reads an integer attribute in the given radix (`0x` accepted for 16).
    pub fn read_int(&self, path: impl AsRef<Path>, radix: u32) -> PlatformResult<i64> {
        let text = self.read_str(&path)?;
        parse_int(&text, radix)
            .ok_or_else(|| PlatformError::parse(path.as_ref().display().to_string(), text, "not an integer"))
    }

    /// Reads a floating point attribute.
    pub fn read_float(&self, path: impl AsRef<Path>) -> PlatformResult<f64> {
        let text = self.read_str(&path)?;
        text.parse::<f64>()
            .map_err(|e| PlatformError::parse(path.as_ref().display().to_string(), text.clone(), e))
    }

    /// Reads `len` raw bytes starting at `offset`.
    pub fn read_bytes(
        &self,
        path: impl AsRef<Path>,
        offset: u64,
        len: usize,
    ) -> PlatformResult<Vec<u8>> {
        let logical = path.as_ref();
        let mut file =
            fs::File::open(self.resolve(logical)).map_err(|e| PlatformError::io(logical, e))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| PlatformError::io(logical, e))?;
        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            let n = file
                .read(&mut buf[filled..])
                .map_err(|e| PlatformError::io(logical, e))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(buf)
    }

    /// Reads the whole file as raw bytes.
    pub fn read_all_bytes(&self, path: impl AsRef<Path>) -> PlatformResult<Vec<u8>> {
        fs::read(self.resolve(&path)).map_err(|e| PlatformError::io(path.as_ref(), e))
    }

    /// Writes raw bytes at `offset` without truncating the file.
    pub fn write_bytes(
        &self,
        path: impl AsRef<Path>,
        offset: u64,
        data: &[u8],
    ) -> PlatformResult<()> {
        let logical = path.as_ref();
        let mut file = OpenOptions::new()
            .write(true)
            .open(self.resolve(logical))
            .map_err(|e| PlatformError::io(logical, e))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| PlatformError::io(logical, e))?;
        file.write_all(data)
            .map_err(|e| PlatformError::io(logical, e))?;
        file.flush().map_err(|e| PlatformError::io(logical, e))
    }

    /// Writes the textual form of `value`, replacing the file contents.
    pub fn write_str(&self, path: impl AsRef<Path>, value: impl std::fmt::Display) -> PlatformResult<()> {
        fs::write(self.resolve(&path), value.to_string())
            .map_err(|e| PlatformError::io(path.as_ref(), e))
    }

    /// Appends text to a file, creating it when missing.
    pub fn append_str(&self, path: impl AsRef<Path>, text: &str) -> PlatformResult<()> {
        let logical = path.as_ref();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.resolve(logical))
            .map_err(|e| PlatformError::io(logical, e))?;
        file.write_all(text.as_bytes())
            .map_err(|e| PlatformError::io(logical, e))
    }

    /// Creates an empty file if it does not exist yet.
    pub fn touch(&self, path: impl AsRef<Path>) -> PlatformResult<()> {
        let logical = path.as_ref();
        if let Some(parent) = logical.parent() {
            self.create_dir_all(parent)?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.resolve(logical))
            .map(|_| ())
            .map_err(|e| PlatformError::io(logical, e))
    }

    /// `mkdir -p`.
    pub fn create_dir_all(&self, path: impl AsRef<Path>) -> PlatformResult<()> {
        fs::create_dir_all(self.resolve(&path)).map_err(|e| PlatformError::io(path.as_ref(), e))
    }

    /// `rm -rf`; a missing path is not an error.
    pub fn remove(&self, path: impl AsRef<Path>) -> PlatformResult<()> {
        let real = self.resolve(&path);
        let result = match fs::symlink_metadata(&real) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(&real),
            Ok(_) => fs::remove_file(&real),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        };
        result.map_err(|e| PlatformError::io(path.as_ref(), e))
    }

    /// Renames a file.
    pub fn rename(&self, from: impl AsRef<Path>, to: impl AsRef<Path>) -> PlatformResult<()> {
        fs::rename(self.resolve(&from), self.resolve(&to))
            .map_err(|e| PlatformError::io(from.as_ref(), e))
    }

    /// File size in bytes.
    pub fn file_size(&self, path: impl AsRef<Path>) -> PlatformResult<u64> {
        fs::metadata(self.resolve(&path))
            .map(|m| m.len())
            .map_err(|e| PlatformError::io(path.as_ref(), e))
    }

    /// Names of the entries of a directory, sorted. A missing directory
    /// yields an empty list.
    pub fn list_dir(&self, path: impl AsRef<Path>) -> PlatformResult<Vec<String>> {
        let entries = match fs::read_dir(self.resolve(&path)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PlatformError::io(path.as_ref(), e)),
        };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        Ok(names)
    }

    /// Creates `link` pointing at the logical path `target`, replacing any
    /// existing entry.
    pub fn symlink(&self, target: impl AsRef<Path>, link: impl AsRef<Path>) -> PlatformResult<()> {
        self.remove(&link)?;
        std::os::unix::fs::symlink(self.resolve(&target), self.resolve(&link))
            .map_err(|e| PlatformError::io(link.as_ref(), e))
    }

    /// Resolves a pattern whose components may contain one `*` wildcard,
    /// returning the first match in sorted order as a logical path.
    ///
    /// Used for hwmon directories whose index is assigned at probe time,
    /// e.g. `/sys/bus/i2c/devices/15-0048/hwmon/hwmon*/temp1_input`.
    pub fn resolve_glob(&self, pattern: impl AsRef<Path>) -> Option<PathBuf> {
        let mut candidates = vec![PathBuf::from("/")];
        for component in pattern.as_ref().components() {
            let part = match component {
                Component::Normal(p) => p.to_string_lossy().into_owned(),
                _ => continue,
            };
            let mut next = Vec::new();
            for base in &candidates {
                match part.split_once('*') {
                    None => {
                        let path = base.join(&part);
                        if self.link_exists(&path) {
                            next.push(path);
                        }
                    }
                    Some((prefix, suffix)) => {
                        let Ok(entries) = fs::read_dir(self.resolve(base)) else {
                            continue;
                        };
                        let mut names: Vec<String> = entries
                            .filter_map(|e| e.ok())
                            .map(|e| e.file_name().to_string_lossy().into_owned())
                            .filter(|n| {
                                n.len() >= prefix.len() + suffix.len()
                                    && n.starts_with(prefix)
                                    && n.ends_with(suffix)
                            })
                            .collect();
                        names.sort();
                        next.extend(names.into_iter().map(|n| base.join(n)));
                    }
                }
            }
            candidates = next;
            if candidates.is_empty() {
                return None;
            }
        }
        candidates.into_iter().next()
    }
}

/// Parses an integer in `radix`, tolerating whitespace and a `0x` prefix
/// when `radix` is 16.
pub fn parse_int(text: &str, radix: u32) -> Option<i64> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let digits = if radix == 16 {
        digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
            .unwrap_or(digits)
    } else {
        digits
    };
    let value = i64::from_str_radix(digits, radix).ok()?;
    Some(if negative { -value } else { value })
}

/// Parses a binary literal such as `0b0000_0011`.
pub fn parse_bin(text: &str) -> Option<u64> {
    let digits: String = text
        .trim()
        .trim_start_matches("0b")
        .chars()
        .filter(|c| *c != '_')
        .collect();
    u64::from_str_radix(&digits, 2).ok()
}

/// Milli-units (mV, mA, m°C) to units.
pub fn milli(value: f64) -> f64 {
    value / 1000.0
}

/// Micro-units (µW) to units.
pub fn micro(value: f64) -> f64 {
    value / 1_000_000.0
}

/// Clamps a percentage into `0..=100`.
pub fn clamp_percent(value: i64) -> u8 {
    value.clamp(0, 100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Sysfs) {
        let dir = TempDir::new().unwrap();
        let sysfs = Sysfs::with_root(dir.path());
        (dir, sysfs)
    }

    #[test]
    fn test_resolve_reanchors_absolute_paths() {
        let sysfs = Sysfs::with_root("/tmp/fake");
        assert_eq!(
            sysfs.resolve("/sys/class/dmi/id/bios_version"),
            PathBuf::from("/tmp/fake/sys/class/dmi/id/bios_version")
        );
        assert_eq!(Sysfs::new().resolve("/etc/x"), PathBuf::from("/etc/x"));
    }

    #[test]
    fn test_read_helpers() {
        let (_dir, sysfs) = setup();
        sysfs.create_dir_all("/sys/dev").unwrap();
        sysfs.write_str("/sys/dev/hex", "0x1f\n").unwrap();
        sysfs.write_str("/sys/dev/dec", " 42 \n").unwrap();
        sysfs.write_str("/sys/dev/temp", "45500").unwrap();

        assert_eq!(sysfs.read_int("/sys/dev/hex", 16).unwrap(), 0x1f);
        assert_eq!(sysfs.read_int("/sys/dev/dec", 10).unwrap(), 42);
        assert_eq!(sysfs.read_float("/sys/dev/temp").unwrap(), 45500.0);
        assert!(matches!(
            sysfs.read_int("/sys/dev/hex", 10),
            Err(PlatformError::Parse { .. })
        ));
        assert!(matches!(
            sysfs.read_str("/sys/dev/missing"),
            Err(PlatformError::Io { .. })
        ));
    }

    #[test]
    fn test_bytes_at_offset() {
        let (_dir, sysfs) = setup();
        sysfs.create_dir_all("/dev").unwrap();
        sysfs.write_str("/dev/eeprom", "ABCDEFGH").unwrap();
        assert_eq!(sysfs.read_bytes("/dev/eeprom", 2, 3).unwrap(), b"CDE");
        sysfs.write_bytes("/dev/eeprom", 1, b"zz").unwrap();
        assert_eq!(sysfs.read_str("/dev/eeprom").unwrap(), "AzzDEFGH");
        // short read at end of file
        assert_eq!(sysfs.read_bytes("/dev/eeprom", 6, 10).unwrap(), b"GH");
    }

    #[test]
    fn test_resolve_glob_picks_first_hwmon() {
        let (_dir, sysfs) = setup();
        sysfs
            .create_dir_all("/sys/bus/i2c/devices/15-0048/hwmon/hwmon7")
            .unwrap();
        sysfs
            .create_dir_all("/sys/bus/i2c/devices/15-0048/hwmon/hwmon3")
            .unwrap();
        sysfs
            .write_str("/sys/bus/i2c/devices/15-0048/hwmon/hwmon7/temp1_input", "1")
            .unwrap();

        assert_eq!(
            sysfs.resolve_glob("/sys/bus/i2c/devices/15-0048/hwmon/hwmon*/temp1_input"),
            Some(PathBuf::from(
                "/sys/bus/i2c/devices/15-0048/hwmon/hwmon7/temp1_input"
            ))
        );
        assert_eq!(
            sysfs.resolve_glob("/sys/bus/i2c/devices/15-0048/hwmon/hwmon*"),
            Some(PathBuf::from("/sys/bus/i2c/devices/15-0048/hwmon/hwmon3"))
        );
        assert!(sysfs
            .resolve_glob("/sys/bus/i2c/devices/16-0049/hwmon/hwmon*/temp1_input")
            .is_none());
    }

    #[test]
    fn test_remove_and_touch() {
        let (_dir, sysfs) = setup();
        sysfs.touch("/etc/flags/.started").unwrap();
        assert!(sysfs.exists("/etc/flags/.started"));
        sysfs.remove("/etc/flags").unwrap();
        assert!(!sysfs.exists("/etc/flags"));
        sysfs.remove("/etc/flags").unwrap();
    }

    #[test]
    fn test_list_dir_and_symlink() {
        let (_dir, sysfs) = setup();
        assert!(sysfs.list_dir("/host/history").unwrap().is_empty());

        sysfs.touch("/host/history/b.json").unwrap();
        sysfs.touch("/host/history/a.json").unwrap();
        sysfs.symlink("/host/history/b.json", "/host/history/latest").unwrap();
        sysfs.symlink("/host/history/a.json", "/host/history/latest").unwrap();

        assert_eq!(
            sysfs.list_dir("/host/history").unwrap(),
            vec!["a.json", "b.json", "latest"]
        );
        sysfs.write_str("/host/history/a.json", "{}").unwrap();
        assert_eq!(sysfs.read_str("/host/history/latest").unwrap(), "{}");
    }

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int("0x1F", 16), Some(31));
        assert_eq!(parse_int("1f", 16), Some(31));
        assert_eq!(parse_int(" 10\n", 10), Some(10));
        assert_eq!(parse_int("-5", 10), Some(-5));
        assert_eq!(parse_int("0x10", 10), None);
        assert_eq!(parse_int("", 10), None);
    }

    #[test]
    fn test_parse_bin_and_scaling() {
        assert_eq!(parse_bin("0b0000_0000_0000_0011"), Some(3));
        assert_eq!(parse_bin("0b1_0"), Some(2));
        assert_eq!(milli(12_050.0), 12.05);
        assert_eq!(micro(250_000_000.0), 250.0);
        assert_eq!(clamp_percent(130), 100);
        assert_eq!(clamp_percent(-3), 0);
    }
}
