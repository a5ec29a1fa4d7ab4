//! Reassembly of split DDS textures.
//!
//! CryEngine titles such as Star Citizen stream large textures by splitting
//! each DDS file on mipmap boundaries:
//! - `texture.dds` - the header plus the smallest mipmaps
//! - `texture.dds.N` .. `texture.dds.1` - one file per larger mipmap,
//!   `texture.dds.N` holding the largest
//! - `texture.dds.a`, `texture.dds.Na` - an attached alternate texture
//!
//! This crate finds the pieces of such a texture and writes them back out as
//! one standard DDS file, terminated by the engine's `CExtCEnd` marker.
//!
//! # Example
//!
//! ```no_run
//! use unsplit_dds::{combine_dds, CombineOptions, CombineOutcome};
//!
//! match combine_dds("textures/rock_diff.dds.5", &CombineOptions::default())? {
//!     CombineOutcome::AlreadyCombined(path) => println!("{} is already whole", path.display()),
//!     CombineOutcome::Combined { output, .. } => println!("wrote {}", output.display()),
//! }
//! # Ok::<(), unsplit_dds::Error>(())
//! ```

mod combine;
mod error;
mod fs;
pub mod header;
pub mod layout;
mod resolve;

pub use combine::{combine_dds, CombineOptions, CombineOutcome, Combiner};
pub use error::{Error, FormatCode, MipSource, Result};
pub use fs::{FileSystem, LocalFileSystem, MemoryFileSystem};
pub use header::{
    decode, encode, Caps, Caps2, ContainerHeader, DecodedHeader, ExtendedFormatHeader, FourCC,
    PixelFormat, PixelFormatFlags,
};
pub use layout::{mip_byte_size, mip_dimensions, MipLevel, MipPlan, TextureFormat, MAX_MIP_LEVELS};
pub use resolve::{
    check_already_combined, classify, resolve, split_base_name, ChainKind, FragmentChain,
    FragmentRole, FragmentSet, MipFragment, COMBINED_IDENTIFIER,
};

/// DDS file magic bytes ("DDS ").
pub const DDS_MAGIC: &[u8; 4] = b"DDS ";

/// Extension of DDS files and their fragments.
pub const DDS_EXTENSION: &str = "dds";

/// Trailer CryEngine appends to every complete DDS file.
pub const END_MARKER: &[u8; 8] = b"CExtCEnd";
