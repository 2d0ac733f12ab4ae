//! Version model and local version resolution.
//!
//! Versions are four-part numeric tuples (`major.minor.build.revision`) compared
//! component by component, with missing components read as zero. The installed
//! version is resolved from, in order:
//!
//! 1. the last non-blank line of `version.txt` in the install root,
//! 2. the file version embedded in the target executable,
//! 3. the file version embedded in its companion library (`<stem>.dll`),
//!    taking the larger of 2 and 3 when both exist,
//! 4. `0.0.0.0`.
//!
//! Resolution never fails; every unreadable source is skipped.

use crate::core::UpdateError;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::debug;

/// Name of the plain-text version marker in the install root.
pub const VERSION_MARKER_FILE: &str = "version.txt";

static MARKER_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)^v?(\d+(\.\d+){1,3})$").ok());

/// `VS_FIXEDFILEINFO.dwSignature`, little-endian on disk.
const FIXED_FILE_INFO_SIGNATURE: [u8; 4] = 0xFEEF_04BD_u32.to_le_bytes();
/// `VS_FIXEDFILEINFO.dwStrucVersion` for every version resource in the wild.
const FIXED_FILE_INFO_STRUCT_VERSION: [u8; 4] = 0x0001_0000_u32.to_le_bytes();

/// A `major.minor.build.revision` version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Version([u32; 4]);

impl Version {
    /// The unknown version, `0.0.0.0`.
    pub const ZERO: Self = Self([0; 4]);

    #[must_use]
    pub const fn new(major: u32, minor: u32, build: u32, revision: u32) -> Self {
        Self([major, minor, build, revision])
    }

    #[must_use]
    pub const fn major(&self) -> u32 {
        self.0[0]
    }

    #[must_use]
    pub const fn minor(&self) -> u32 {
        self.0[1]
    }

    #[must_use]
    pub const fn build(&self) -> u32 {
        self.0[2]
    }

    #[must_use]
    pub const fn revision(&self) -> u32 {
        self.0[3]
    }

    /// Parses two to four dot-separated non-negative integers.
    fn parse_components(s: &str) -> Option<Self> {
        let mut parts = [0u32; 4];
        let mut count = 0;
        for piece in s.split('.') {
            if count == 4 || piece.is_empty() || !piece.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            parts[count] = piece.parse().ok()?;
            count += 1;
        }
        (count >= 2).then_some(Self(parts))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "{a}.{b}.{c}.{d}")
    }
}

impl FromStr for Version {
    type Err = UpdateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_components(s.trim()).ok_or_else(|| UpdateError::VersionParse {
            tag: s.to_string(),
        })
    }
}

/// Reads a version out of a release tag such as `v1.2.3` or `1.2.3.4-beta`.
///
/// A leading `v`/`V` is dropped, then the longest leading run of digits and dots
/// is parsed; it needs at least `major.minor`. Returns `None` for empty or
/// unparsable tags; callers must treat that as a failed check rather than
/// comparing against zero.
#[must_use]
pub fn parse_tag(tag: &str) -> Option<Version> {
    let trimmed = tag.trim();
    let without_prefix = trimmed.trim_start_matches(['v', 'V']);
    let end = without_prefix
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(without_prefix.len());
    let numeric = &without_prefix[..end];
    if numeric.is_empty() {
        return None;
    }
    Version::parse_components(numeric)
}

/// Determines the installed version of the target application.
#[must_use]
pub fn resolve_local_version(install_dir: &Path, executable: &str) -> Version {
    if let Some(version) = read_version_marker(&install_dir.join(VERSION_MARKER_FILE)) {
        debug!("Local version {} read from {}", version, VERSION_MARKER_FILE);
        return version;
    }

    let exe_version = if executable.is_empty() {
        None
    } else {
        read_embedded_version(&install_dir.join(executable))
    };
    let library_version = companion_library_name(executable)
        .and_then(|name| read_embedded_version(&install_dir.join(name)));

    match (exe_version, library_version) {
        (Some(exe), Some(lib)) => {
            debug!("Local version from executable {exe} and library {lib}");
            exe.max(lib)
        }
        (Some(v), None) | (None, Some(v)) => {
            debug!("Local version {v} read from embedded metadata");
            v
        }
        (None, None) => {
            debug!("No local version information found, assuming {}", Version::ZERO);
            Version::ZERO
        }
    }
}

/// `App.exe` -> `App.dll`.
fn companion_library_name(executable: &str) -> Option<String> {
    let stem = Path::new(executable).file_stem()?.to_str()?;
    if stem.is_empty() {
        return None;
    }
    Some(format!("{stem}.dll"))
}

/// Takes the last non-blank line of a marker file and parses it.
///
/// Accepts `1.2`, `v1.2.3`, `V1.2.3.4`; anything else on the last line means no
/// version.
pub fn read_version_marker(path: &Path) -> Option<Version> {
    let content = std::fs::read_to_string(path).ok()?;
    let last = content.lines().map(str::trim).filter(|l| !l.is_empty()).next_back()?;
    let captures = MARKER_PATTERN.as_ref()?.captures(last)?;
    Version::parse_components(captures.get(1)?.as_str())
}

/// Reads the file version from a PE image's `VS_FIXEDFILEINFO` resource.
///
/// Returns `None` for files that are not PE images or carry no version resource.
pub fn read_embedded_version(path: &Path) -> Option<Version> {
    let bytes = std::fs::read(path).ok()?;
    if !bytes.starts_with(b"MZ") {
        return None;
    }

    let mut offset = 0;
    while let Some(found) = find(&bytes[offset..], &FIXED_FILE_INFO_SIGNATURE) {
        let start = offset + found;
        // signature, struct version, file version MS, file version LS
        if let Some(info) = bytes.get(start..start + 16)
            && info[4..8] == FIXED_FILE_INFO_STRUCT_VERSION
        {
            let ms = u32::from_le_bytes([info[8], info[9], info[10], info[11]]);
            let ls = u32::from_le_bytes([info[12], info[13], info[14], info[15]]);
            return Some(Version::new(ms >> 16, ms & 0xFFFF, ls >> 16, ls & 0xFFFF));
        }
        offset = start + 1;
    }
    None
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
pub(crate) fn fake_pe_image(version: Version) -> Vec<u8> {
    let mut image = b"MZ".to_vec();
    image.resize(256, 0);
    image.extend_from_slice(&FIXED_FILE_INFO_SIGNATURE);
    image.extend_from_slice(&FIXED_FILE_INFO_STRUCT_VERSION);
    image.extend_from_slice(&((version.major() << 16) | version.minor()).to_le_bytes());
    image.extend_from_slice(&((version.build() << 16) | version.revision()).to_le_bytes());
    image.resize(image.len() + 64, 0);
    image
}
