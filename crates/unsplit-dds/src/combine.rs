//! Writing a split texture back out as one DDS file.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::MipSource;
use crate::fs::{FileSystem, LocalFileSystem};
use crate::header::{self, DecodedHeader};
use crate::layout::MipPlan;
use crate::resolve::{self, FragmentChain, FragmentRole, FragmentSet, COMBINED_IDENTIFIER};
use crate::{Error, Result, DDS_EXTENSION, END_MARKER};

/// Name suffix of the alternate chain's output.
const ALTERNATE_OUTPUT_SUFFIX: &str = "_gloss";

/// How combined files are named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombineOptions {
    /// Write `<base>.<identifier>.dds` instead of replacing `<base>.dds`.
    pub safe_name: bool,
    /// Name segment used in safe-name mode.
    pub identifier: String,
}

impl Default for CombineOptions {
    fn default() -> Self {
        Self {
            safe_name: false,
            identifier: COMBINED_IDENTIFIER.to_string(),
        }
    }
}

/// Result of a combine request.
#[derive(Debug)]
pub enum CombineOutcome {
    /// The texture was already whole; nothing was written.
    AlreadyCombined(PathBuf),
    /// The main chain was written to `output`.
    Combined {
        /// Combined main texture.
        output: PathBuf,
        /// Outcome of the alternate chain, if there is one.
        alternate: Option<Result<PathBuf>>,
    },
}

impl CombineOutcome {
    /// Path of the usable texture.
    pub fn path(&self) -> &Path {
        match self {
            Self::AlreadyCombined(path) => path,
            Self::Combined { output, .. } => output,
        }
    }
}

/// A mip fragment loaded into memory.
#[derive(Debug)]
struct LoadedFragment {
    path: PathBuf,
    bytes: Vec<u8>,
}

/// Combines resolved fragment sets.
pub struct Combiner<'a, F: FileSystem + ?Sized> {
    fs: &'a F,
    options: CombineOptions,
}

impl<'a, F: FileSystem + ?Sized> Combiner<'a, F> {
    /// Create a combiner over a file system.
    pub fn new(fs: &'a F, options: CombineOptions) -> Self {
        Self { fs, options }
    }

    /// Where the main chain is written.
    pub fn output_path(&self, set: &FragmentSet) -> PathBuf {
        set.directory.join(format!(
            "{}{}.{DDS_EXTENSION}",
            set.base_name,
            self.safe_suffix()
        ))
    }

    /// Where the alternate chain is written.
    pub fn alternate_output_path(&self, set: &FragmentSet) -> PathBuf {
        set.directory.join(format!(
            "{}{}{ALTERNATE_OUTPUT_SUFFIX}.{DDS_EXTENSION}",
            set.base_name,
            self.safe_suffix()
        ))
    }

    fn safe_suffix(&self) -> String {
        if self.options.safe_name {
            format!(".{}", self.options.identifier)
        } else {
            String::new()
        }
    }

    /// Combine the main chain and, if present, the alternate chain.
    ///
    /// A failing alternate chain is reported in the outcome and does not undo
    /// the main texture.
    pub fn combine(&self, set: &FragmentSet) -> Result<CombineOutcome> {
        if set.already_combined {
            info!(path = %set.header_file().display(), "already combined, skipping");
            return Ok(CombineOutcome::AlreadyCombined(set.main.header.clone()));
        }

        let output = self.output_path(set);
        let written = self.combine_chain(set, &set.main, &output)?;
        info!(output = %output.display(), bytes = written, "combined texture");

        let alternate = set.alternate.as_ref().map(|chain| {
            let output = self.alternate_output_path(set);
            let result = self.combine_chain(set, chain, &output);
            match &result {
                Ok(written) => {
                    info!(output = %output.display(), bytes = written, "combined alternate texture")
                }
                Err(e) => warn!(error = %e, "failed to combine alternate texture"),
            }
            result.map(|_| output)
        });

        Ok(CombineOutcome::Combined { output, alternate })
    }

    /// Combine one chain into `output`, returning the bytes written.
    fn combine_chain(&self, set: &FragmentSet, chain: &FragmentChain, output: &Path) -> Result<u64> {
        let header_file = self.protect_header(set, &chain.header, output)?;
        let header_bytes = read_fragment(self.fs, &header_file)?;
        let decoded = header::decode(&header_bytes)?;
        let plan = MipPlan::for_decoded(&decoded)?;
        debug!(
            header = %header_file.display(),
            width = decoded.header.width,
            height = decoded.header.height,
            levels = plan.levels.len(),
            faces = plan.faces,
            fragments = chain.mips.len(),
            "planned layout"
        );

        let fragments = self.load_fragments(set, chain, &plan)?;
        let segments = assemble(&decoded, &plan, &header_file, &fragments)?;

        let mut out = self.fs.create(output)?;
        let header = decoded.encode();
        out.write_all(&header)?;
        let mut written = header.len() as u64;
        for segment in &segments {
            out.write_all(segment)?;
            written += segment.len() as u64;
        }
        out.write_all(END_MARKER)?;
        out.flush()?;

        Ok(written + END_MARKER.len() as u64)
    }

    /// Keep a copy of a bare `.dds` header before it gets overwritten.
    ///
    /// Returns the path the header should be read from.
    fn protect_header(&self, set: &FragmentSet, header: &Path, output: &Path) -> Result<PathBuf> {
        if header != set.fragment_path(FragmentRole::Base) || header != output {
            return Ok(header.to_path_buf());
        }

        let preserved = set.fragment_path(FragmentRole::Header);
        if self.fs.exists(&preserved) {
            debug!(path = %preserved.display(), "using existing header fragment");
        } else {
            self.fs.copy(header, &preserved)?;
            debug!(from = %header.display(), to = %preserved.display(), "preserved header fragment");
        }
        Ok(preserved)
    }

    /// Load the chain's mip fragments, level 0 (the highest index) first.
    fn load_fragments(
        &self,
        set: &FragmentSet,
        chain: &FragmentChain,
        plan: &MipPlan,
    ) -> Result<Vec<LoadedFragment>> {
        if chain.mips.len() > plan.levels.len() {
            return Err(Error::FragmentCountMismatch {
                fragments: chain.mips.len(),
                mip_levels: plan.levels.len() as u32,
            });
        }

        let mut mips: Vec<_> = chain.mips.iter().collect();
        mips.sort_by(|a, b| b.index.cmp(&a.index));

        // Fragments must run contiguously from the highest index down to 1.
        let top = mips.first().map_or(0, |mip| mip.index);
        let mut fragments = Vec::with_capacity(mips.len());
        for (level, expected) in (1..=top).rev().enumerate() {
            let mip = match mips.get(level) {
                Some(mip) if mip.index == expected => mip,
                _ => {
                    return Err(Error::MissingMipFragment {
                        path: set.fragment_path(chain.mip_role(expected)),
                        source: std::io::ErrorKind::NotFound.into(),
                    })
                }
            };

            fragments.push(LoadedFragment {
                bytes: read_fragment(self.fs, &mip.path)?,
                path: mip.path.clone(),
            });
        }

        Ok(fragments)
    }
}

fn read_fragment<F: FileSystem + ?Sized>(fs: &F, path: &Path) -> Result<Vec<u8>> {
    fs.read(path).map_err(|source| Error::MissingMipFragment {
        path: path.to_path_buf(),
        source,
    })
}

/// Lay out every face and level, checking each source before anything is
/// written.
///
/// `fragments[i]` holds level `i`; levels past the last fragment come from the
/// header remainder in face-major order.
fn assemble<'a>(
    decoded: &DecodedHeader<'a>,
    plan: &MipPlan,
    header_file: &Path,
    fragments: &'a [LoadedFragment],
) -> Result<Vec<&'a [u8]>> {
    let remainder = decoded.remainder;
    let mut remainder_offset = 0usize;
    let mut segments = Vec::new();

    for face in 0..plan.faces {
        for level in &plan.levels {
            let size = level.byte_size;

            if let Some(fragment) = fragments.get(level.level as usize) {
                let offset = u64::from(face) * size;
                let (start, end) = checked_range(&fragment.bytes, offset, size).ok_or_else(|| {
                    Error::LayoutOverrun {
                        source_file: MipSource::Fragment(fragment.path.clone()),
                        mip: level.level,
                        face,
                        offset: offset as usize,
                        expected: size,
                        available: fragment.bytes.len().saturating_sub(offset as usize),
                    }
                })?;

                segments.push(&fragment.bytes[start..end]);
            } else {
                let (start, end) = checked_range(remainder, remainder_offset as u64, size)
                    .ok_or_else(|| Error::LayoutOverrun {
                        source_file: MipSource::HeaderRemainder(header_file.to_path_buf()),
                        mip: level.level,
                        face,
                        offset: remainder_offset,
                        expected: size,
                        available: remainder.len() - remainder_offset,
                    })?;

                segments.push(&remainder[start..end]);
                remainder_offset = end;
            }
        }
    }

    for (level, fragment) in plan.levels.iter().zip(fragments) {
        let used = level.byte_size * u64::from(plan.faces);
        if fragment.bytes.len() as u64 > used {
            warn!(
                path = %fragment.path.display(),
                extra = fragment.bytes.len() as u64 - used,
                "mip fragment has trailing bytes"
            );
        }
    }
    if remainder_offset < remainder.len() {
        debug!(
            extra = remainder.len() - remainder_offset,
            "ignoring trailing header payload"
        );
    }

    Ok(segments)
}

/// `offset..offset + size` as indices into `bytes`, if it fits.
fn checked_range(bytes: &[u8], offset: u64, size: u64) -> Option<(usize, usize)> {
    let end = offset.checked_add(size)?;
    if end > bytes.len() as u64 {
        return None;
    }
    Some((offset as usize, end as usize))
}

/// Resolve and combine the texture at `path` on the local file system.
///
/// `path` may name the base `.dds`, any fragment, or the bare texture name.
pub fn combine_dds<P: AsRef<Path>>(path: P, options: &CombineOptions) -> Result<CombineOutcome> {
    let fs = LocalFileSystem;
    let (directory, base_name) = resolve::split_base_name(path.as_ref())?;
    let set = resolve::resolve(&fs, &directory, &base_name)?;
    Combiner::new(&fs, options.clone()).combine(&set)
}
