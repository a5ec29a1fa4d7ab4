//! Error types for split DDS reassembly.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::header::FourCC;

/// A pixel format code that the layout calculator has no size rule for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatCode {
    /// Legacy FourCC from the pixel format block.
    FourCC(FourCC),
    /// DXGI format from the DX10 extended header.
    Dxgi(u32),
    /// Uncompressed format declaring this many bits per pixel.
    BitCount(u32),
}

impl fmt::Display for FormatCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FourCC(code) => write!(f, "FourCC '{code}'"),
            Self::Dxgi(value) => write!(f, "DXGI format {value}"),
            Self::BitCount(bits) => write!(f, "uncompressed format with {bits} bits per pixel"),
        }
    }
}

/// Where the bytes of a mip level were supposed to come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MipSource {
    /// A separately stored, numbered mip fragment.
    Fragment(PathBuf),
    /// The payload following the header(s) in the header fragment.
    HeaderRemainder(PathBuf),
}

impl fmt::Display for MipSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fragment(path) => write!(f, "fragment {}", path.display()),
            Self::HeaderRemainder(path) => write!(f, "header payload of {}", path.display()),
        }
    }
}

/// Errors that can occur while resolving or combining split DDS files.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error outside of fragment reads.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Fewer bytes than a full container header.
    #[error("truncated DDS header: needed {needed} bytes, got {available}")]
    TruncatedHeader { needed: usize, available: usize },

    /// FourCC announces a DX10 header that is not fully present.
    #[error("truncated DX10 header: needed {needed} bytes, got {available}")]
    TruncatedExtendedHeader { needed: usize, available: usize },

    /// Pixel format missing from the size table.
    #[error("unsupported pixel format: {0}")]
    UnsupportedFormat(FormatCode),

    /// No `.dds` or `.dds.0` file for the requested base name.
    #[error("no header file found for '{base_name}' in {}", .directory.display())]
    NoHeaderFileFound { directory: PathBuf, base_name: String },

    /// A fragment is missing or could not be read.
    #[error("missing mip fragment {}: {source}", .path.display())]
    MissingMipFragment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A mip level needs more bytes than its source holds.
    #[error(
        "layout overrun in {source_file} at mip {mip}, face {face}: needed {expected} bytes from offset {offset}, {available} available"
    )]
    LayoutOverrun {
        source_file: MipSource,
        mip: u32,
        face: u32,
        offset: usize,
        expected: u64,
        available: usize,
    },

    /// More numbered fragments than the header declares mip levels.
    #[error("{fragments} mip fragments found but the header declares only {mip_levels} mip levels")]
    FragmentCountMismatch { fragments: usize, mip_levels: u32 },

    /// Header dimensions or mip count describe a layout too large to size.
    #[error("invalid texture layout: {width}x{height} with {mip_levels} mip levels")]
    InvalidDimensions {
        width: u32,
        height: u32,
        mip_levels: u32,
    },

    /// The input path has no usable file name.
    #[error("invalid input path: {}", .0.display())]
    InvalidPath(PathBuf),
}

/// Result type for split DDS operations.
pub type Result<T> = std::result::Result<T, Error>;
