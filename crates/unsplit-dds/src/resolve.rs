//! Locating the fragments of a split texture.
//!
//! CryEngine writes a split texture as:
//! - `texture.dds` - header plus the smallest mipmaps
//! - `texture.dds.1` .. `texture.dds.N` - one file per larger mipmap,
//!   `texture.dds.N` holding the largest
//! - `texture.dds.a`, `texture.dds.1a` .. - the same for an attached
//!   alternate texture (usually the gloss map of a `_ddna` normal map)
//!
//! After a combine, the original header lives on as `texture.dds.0`.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, trace, warn};

use crate::fs::FileSystem;
use crate::header::{self, DX10_HEADER_SIZE, HEADER_SIZE};
use crate::layout;
use crate::{Error, Result, DDS_EXTENSION};

/// Name segment marking files written in safe-name mode.
pub const COMBINED_IDENTIFIER: &str = "combined";

static FRAGMENT_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\.dds(?:\.(?:(?P<index>[0-9]+)(?P<alt>a)?|(?P<alt_header>a)))?$")
        .expect("fragment suffix pattern is valid")
});

static INPUT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<base>.+?)\.dds(?:\.[0-9]+a?|\.a)?$").expect("input name pattern is valid")
});

/// The part a file plays in a split texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum FragmentRole {
    /// `<base>.dds`: a split header or an already combined texture.
    Base,
    /// `<base>.dds.0`: the preserved header fragment.
    Header,
    /// `<base>.dds.<N>`, N >= 1.
    Mip(u32),
    /// `<base>.dds.a`
    AlternateHeader,
    /// `<base>.dds.<N>a`, N >= 1.
    AlternateMip(u32),
}

impl FragmentRole {
    /// File name suffix following `<base>`.
    pub fn suffix(self) -> String {
        match self {
            Self::Base => format!(".{DDS_EXTENSION}"),
            Self::Header => format!(".{DDS_EXTENSION}.0"),
            Self::Mip(index) => format!(".{DDS_EXTENSION}.{index}"),
            Self::AlternateHeader => format!(".{DDS_EXTENSION}.a"),
            Self::AlternateMip(index) => format!(".{DDS_EXTENSION}.{index}a"),
        }
    }
}

/// Classify `file_name` relative to `base_name`.
///
/// Returns `None` for files that only share the prefix, and for output written
/// in safe-name mode.
pub fn classify(file_name: &str, base_name: &str) -> Option<FragmentRole> {
    let rest = file_name.strip_prefix(base_name)?;
    if rest
        .to_ascii_lowercase()
        .contains(&format!(".{COMBINED_IDENTIFIER}."))
    {
        return None;
    }

    let captures = FRAGMENT_SUFFIX.captures(rest)?;
    if captures.name("alt_header").is_some() {
        return Some(FragmentRole::AlternateHeader);
    }

    let Some(index) = captures.name("index") else {
        return Some(FragmentRole::Base);
    };
    let index: u32 = index.as_str().parse().ok()?;
    let alternate = captures.name("alt").is_some();

    match (index, alternate) {
        (0, false) => Some(FragmentRole::Header),
        (0, true) => None,
        (index, false) => Some(FragmentRole::Mip(index)),
        (index, true) => Some(FragmentRole::AlternateMip(index)),
    }
}

/// Split an input path into its directory and texture base name.
///
/// Accepts `base`, `base.dds`, `base.dds.N`, `base.dds.a` and `base.dds.Na`.
pub fn split_base_name(input: &Path) -> Result<(PathBuf, String)> {
    let file_name = input
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| Error::InvalidPath(input.to_path_buf()))?;

    let base_name = INPUT_NAME
        .captures(file_name)
        .and_then(|captures| captures.name("base"))
        .map_or(file_name, |base| base.as_str());

    let directory = match input.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    Ok((directory, base_name.to_string()))
}

/// A numbered mip fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MipFragment {
    /// The `N` of `.dds.N` / `.dds.Na`.
    pub index: u32,
    /// Fragment path.
    pub path: PathBuf,
}

/// Which chain of a fragment set a [`FragmentChain`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ChainKind {
    /// The texture itself.
    Main,
    /// The attached alternate texture.
    Alternate,
}

/// Header fragment plus the mip fragments belonging to it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FragmentChain {
    /// Main or alternate.
    pub kind: ChainKind,
    /// Fragment holding the header(s) and the smallest mips.
    pub header: PathBuf,
    /// Numbered mip fragments, ascending by index.
    pub mips: Vec<MipFragment>,
}

impl FragmentChain {
    /// Role of the mip fragment numbered `index` in this chain.
    pub fn mip_role(&self, index: u32) -> FragmentRole {
        match self.kind {
            ChainKind::Main => FragmentRole::Mip(index),
            ChainKind::Alternate => FragmentRole::AlternateMip(index),
        }
    }
}

/// All fragments of one texture.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FragmentSet {
    /// Directory holding the fragments.
    pub directory: PathBuf,
    /// Texture name without extension or suffix.
    pub base_name: String,
    /// The main chain.
    pub main: FragmentChain,
    /// The alternate chain, if an `.a` header exists.
    pub alternate: Option<FragmentChain>,
    /// The `.dds` file already holds every mip; nothing to do.
    pub already_combined: bool,
}

impl FragmentSet {
    /// Path a fragment with the given role has (or would have).
    pub fn fragment_path(&self, role: FragmentRole) -> PathBuf {
        self.directory
            .join(format!("{}{}", self.base_name, role.suffix()))
    }

    /// Path of the authoritative header fragment.
    pub fn header_file(&self) -> &Path {
        &self.main.header
    }

    /// Main chain mip fragments.
    pub fn mip_files(&self) -> &[MipFragment] {
        &self.main.mips
    }
}

/// Resolve the fragment set for `base_name` in `directory`.
pub fn resolve<F: FileSystem + ?Sized>(
    fs: &F,
    directory: &Path,
    base_name: &str,
) -> Result<FragmentSet> {
    let mut base = None;
    let mut header = None;
    let mut mips = Vec::new();
    let mut alternate_header = None;
    let mut alternate_mips = Vec::new();

    for path in fs.find(directory, base_name)? {
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };

        match classify(file_name, base_name) {
            Some(FragmentRole::Base) => base = Some(path),
            Some(FragmentRole::Header) => header = Some(path),
            Some(FragmentRole::Mip(index)) => mips.push(MipFragment { index, path }),
            Some(FragmentRole::AlternateHeader) => alternate_header = Some(path),
            Some(FragmentRole::AlternateMip(index)) => {
                alternate_mips.push(MipFragment { index, path })
            }
            None => trace!(path = %path.display(), "ignoring unrelated file"),
        }
    }

    if let Some(base) = &base {
        // A half-written base file is recoverable while the header fragment survives.
        let combined = match check_already_combined(fs, base) {
            Ok(combined) => combined,
            Err(e) if header.is_some() => {
                warn!(path = %base.display(), error = %e, "unreadable base file, using the header fragment");
                false
            }
            Err(e) => return Err(e),
        };
        if combined {
            debug!(path = %base.display(), "texture is already combined");
            return Ok(FragmentSet {
                directory: directory.to_path_buf(),
                base_name: base_name.to_string(),
                main: FragmentChain {
                    kind: ChainKind::Main,
                    header: base.clone(),
                    mips: Vec::new(),
                },
                alternate: None,
                already_combined: true,
            });
        }
    }

    let Some(header) = header.or(base) else {
        return Err(Error::NoHeaderFileFound {
            directory: directory.to_path_buf(),
            base_name: base_name.to_string(),
        });
    };

    mips.sort_by_key(|mip| mip.index);
    alternate_mips.sort_by_key(|mip| mip.index);

    let alternate = match alternate_header {
        Some(header) => Some(FragmentChain {
            kind: ChainKind::Alternate,
            header,
            mips: alternate_mips,
        }),
        None => {
            if !alternate_mips.is_empty() {
                warn!(
                    count = alternate_mips.len(),
                    base_name, "alternate mip fragments without an alternate header, ignoring"
                );
            }
            None
        }
    };

    debug!(
        header = %header.display(),
        mips = mips.len(),
        alternate = alternate.is_some(),
        "resolved fragment set"
    );

    Ok(FragmentSet {
        directory: directory.to_path_buf(),
        base_name: base_name.to_string(),
        main: FragmentChain {
            kind: ChainKind::Main,
            header,
            mips,
        },
        alternate,
        already_combined: false,
    })
}

/// Decode the headers at the start of `path` and compare its length with the
/// size a fully combined texture needs.
pub fn check_already_combined<F: FileSystem + ?Sized>(fs: &F, path: &Path) -> Result<bool> {
    let prefix = fs.read_prefix(path, HEADER_SIZE + DX10_HEADER_SIZE)?;
    let decoded = header::decode(&prefix)?;
    let file_len = fs.file_len(path)?;
    layout::is_already_combined(&decoded, file_len)
}
