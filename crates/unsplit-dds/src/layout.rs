//! Mip level sizes and the byte layout of a combined texture.

use crate::error::FormatCode;
use crate::header::{ContainerHeader, DecodedHeader, ExtendedFormatHeader, FourCC};
use crate::{Error, Result};

/// DXGI formats with a known size rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u32)]
pub enum DxgiFormat {
    R8G8Unorm = 49,
    R16Unorm = 56,
    R8Unorm = 61,
    Bc1Typeless = 70,
    Bc1Unorm = 71,
    Bc1UnormSrgb = 72,
    Bc2Typeless = 73,
    Bc2Unorm = 74,
    Bc2UnormSrgb = 75,
    Bc3Typeless = 76,
    Bc3Unorm = 77,
    Bc3UnormSrgb = 78,
    Bc4Typeless = 79,
    Bc4Unorm = 80,
    Bc4Snorm = 81,
    Bc5Typeless = 82,
    Bc5Unorm = 83,
    Bc5Snorm = 84,
    Bc6hTypeless = 94,
    Bc6hUf16 = 95,
    Bc6hSf16 = 96,
    Bc7Typeless = 97,
    Bc7Unorm = 98,
    Bc7UnormSrgb = 99,
}

impl DxgiFormat {
    /// Look up a raw DXGI value.
    pub fn from_raw(value: u32) -> Option<Self> {
        use DxgiFormat::*;

        let format = match value {
            49 => R8G8Unorm,
            56 => R16Unorm,
            61 => R8Unorm,
            70 => Bc1Typeless,
            71 => Bc1Unorm,
            72 => Bc1UnormSrgb,
            73 => Bc2Typeless,
            74 => Bc2Unorm,
            75 => Bc2UnormSrgb,
            76 => Bc3Typeless,
            77 => Bc3Unorm,
            78 => Bc3UnormSrgb,
            79 => Bc4Typeless,
            80 => Bc4Unorm,
            81 => Bc4Snorm,
            82 => Bc5Typeless,
            83 => Bc5Unorm,
            84 => Bc5Snorm,
            94 => Bc6hTypeless,
            95 => Bc6hUf16,
            96 => Bc6hSf16,
            97 => Bc7Typeless,
            98 => Bc7Unorm,
            99 => Bc7UnormSrgb,
            _ => return None,
        };
        Some(format)
    }

    /// How this format is laid out in memory.
    pub fn texture_format(self) -> TextureFormat {
        use DxgiFormat::*;

        match self {
            R8Unorm => TextureFormat::Uncompressed { bits_per_pixel: 8 },
            R8G8Unorm | R16Unorm => TextureFormat::Uncompressed { bits_per_pixel: 16 },
            Bc1Typeless | Bc1Unorm | Bc1UnormSrgb | Bc4Typeless | Bc4Unorm | Bc4Snorm => {
                TextureFormat::BlockCompressed { block_bytes: 8 }
            }
            Bc2Typeless | Bc2Unorm | Bc2UnormSrgb | Bc3Typeless | Bc3Unorm | Bc3UnormSrgb
            | Bc5Typeless | Bc5Unorm | Bc5Snorm | Bc6hTypeless | Bc6hUf16 | Bc6hSf16
            | Bc7Typeless | Bc7Unorm | Bc7UnormSrgb => {
                TextureFormat::BlockCompressed { block_bytes: 16 }
            }
        }
    }
}

/// Memory layout of a pixel format, as far as sizing is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum TextureFormat {
    /// 4x4 pixel blocks of a fixed byte size.
    BlockCompressed { block_bytes: u32 },
    /// Plain pixels of a fixed bit size.
    Uncompressed { bits_per_pixel: u32 },
}

impl TextureFormat {
    /// Block edge length in pixels.
    pub const BLOCK_DIM: u64 = 4;

    /// Resolve the format described by a header.
    ///
    /// The DXGI format wins when a DX10 header is present; otherwise the
    /// legacy FourCC (or RGB bit count) decides.
    pub fn from_header(
        header: &ContainerHeader,
        extended: Option<&ExtendedFormatHeader>,
    ) -> Result<Self> {
        if let Some(extended) = extended {
            return Self::from_dxgi(extended.dxgi_format);
        }

        let pixel_format = &header.pixel_format;
        if pixel_format.has_four_cc() {
            return Self::from_four_cc(pixel_format.four_cc);
        }

        match pixel_format.rgb_bit_count {
            0 => Err(Error::UnsupportedFormat(FormatCode::BitCount(0))),
            bits_per_pixel => Ok(Self::Uncompressed { bits_per_pixel }),
        }
    }

    /// Resolve a raw DXGI format value.
    pub fn from_dxgi(value: u32) -> Result<Self> {
        DxgiFormat::from_raw(value)
            .map(DxgiFormat::texture_format)
            .ok_or(Error::UnsupportedFormat(FormatCode::Dxgi(value)))
    }

    /// Resolve a legacy FourCC.
    pub fn from_four_cc(four_cc: FourCC) -> Result<Self> {
        match four_cc {
            FourCC::DXT1 | FourCC::ATI1 | FourCC::BC4U | FourCC::BC4S => {
                Ok(Self::BlockCompressed { block_bytes: 8 })
            }
            FourCC::DXT3 | FourCC::DXT5 | FourCC::ATI2 | FourCC::BC5U | FourCC::BC5S => {
                Ok(Self::BlockCompressed { block_bytes: 16 })
            }
            other => Err(Error::UnsupportedFormat(FormatCode::FourCC(other))),
        }
    }

    /// Size in bytes of one `width` x `height` surface, or `None` if it does
    /// not fit in a `u64`.
    pub fn byte_size(&self, width: u32, height: u32) -> Option<u64> {
        let (width, height) = (u64::from(width), u64::from(height));
        match *self {
            Self::BlockCompressed { block_bytes } => {
                let blocks_x = width.div_ceil(Self::BLOCK_DIM);
                let blocks_y = height.div_ceil(Self::BLOCK_DIM);
                blocks_x
                    .checked_mul(blocks_y)?
                    .checked_mul(u64::from(block_bytes))
            }
            Self::Uncompressed { bits_per_pixel } => {
                let bits = width
                    .checked_mul(height)?
                    .checked_mul(u64::from(bits_per_pixel))?;
                Some(bits.div_ceil(8))
            }
        }
    }
}

/// Most levels a texture can have: a `u32` dimension halves to 1 within 32
/// steps.
pub const MAX_MIP_LEVELS: u32 = 32;

/// Dimensions of mip `level` for a `width` x `height` base image.
///
/// Uses right shifts, not division, so odd sizes round down exactly as the
/// engine does. Levels past the bit width collapse to 1.
pub fn mip_dimensions(level: u32, width: u32, height: u32) -> (u32, u32) {
    let shrink = |dim: u32| dim.checked_shr(level).unwrap_or(0).max(1);
    (shrink(width), shrink(height))
}

/// Size in bytes of one face of a mip level with the given dimensions.
pub fn mip_byte_size(
    width: u32,
    height: u32,
    header: &ContainerHeader,
    extended: Option<&ExtendedFormatHeader>,
) -> Result<u64> {
    TextureFormat::from_header(header, extended)?
        .byte_size(width, height)
        .ok_or(Error::InvalidDimensions {
            width,
            height,
            mip_levels: header.mip_map_count,
        })
}

/// One entry of a [`MipPlan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MipLevel {
    /// Mip index, 0 being the largest.
    pub level: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Size in bytes of a single face.
    pub byte_size: u64,
}

/// Sizes of every mip level of a texture.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MipPlan {
    /// Resolved pixel format.
    pub format: TextureFormat,
    /// Faces per level (6 for cubemaps).
    pub faces: u32,
    /// Levels in ascending order (largest first).
    pub levels: Vec<MipLevel>,
}

impl MipPlan {
    /// Compute the plan for a header.
    ///
    /// Fails with [`Error::InvalidDimensions`] when the header declares more
    /// than [`MAX_MIP_LEVELS`] levels or the total payload overflows a `u64`.
    pub fn new(header: &ContainerHeader, extended: Option<&ExtendedFormatHeader>) -> Result<Self> {
        let format = TextureFormat::from_header(header, extended)?;
        let invalid = || Error::InvalidDimensions {
            width: header.width,
            height: header.height,
            mip_levels: header.mip_map_count,
        };

        if header.mip_levels() > MAX_MIP_LEVELS {
            return Err(invalid());
        }

        let levels = (0..header.mip_levels())
            .map(|level| {
                let (width, height) = mip_dimensions(level, header.width, header.height);
                let byte_size = format.byte_size(width, height).ok_or_else(invalid)?;
                Ok(MipLevel {
                    level,
                    width,
                    height,
                    byte_size,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let faces = header.face_count();
        levels
            .iter()
            .try_fold(0u64, |sum, level| sum.checked_add(level.byte_size))
            .and_then(|face_payload| face_payload.checked_mul(u64::from(faces)))
            .ok_or_else(invalid)?;

        Ok(Self {
            format,
            faces,
            levels,
        })
    }

    /// Compute the plan for decoded headers.
    pub fn for_decoded(decoded: &DecodedHeader<'_>) -> Result<Self> {
        Self::new(&decoded.header, decoded.extended.as_ref())
    }

    /// Bytes of a single face across all levels.
    ///
    /// Cannot overflow: [`MipPlan::new`] rejects plans whose total does.
    pub fn face_payload(&self) -> u64 {
        self.levels.iter().map(|level| level.byte_size).sum()
    }

    /// Bytes of all faces across all levels.
    pub fn total_payload(&self) -> u64 {
        self.face_payload() * u64::from(self.faces)
    }
}

/// Smallest length a fully combined file with these headers can have.
pub fn minimum_combined_size(decoded: &DecodedHeader<'_>) -> Result<u64> {
    let plan = MipPlan::for_decoded(decoded)?;
    (decoded.header_len() as u64)
        .checked_add(plan.total_payload())
        .ok_or(Error::InvalidDimensions {
            width: decoded.header.width,
            height: decoded.header.height,
            mip_levels: decoded.header.mip_map_count,
        })
}

/// Whether a file of `file_len` bytes starting with `decoded` already holds
/// every mip level.
pub fn is_already_combined(decoded: &DecodedHeader<'_>, file_len: u64) -> Result<bool> {
    Ok(file_len >= minimum_combined_size(decoded)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{decode, encode, Caps2, PixelFormat};

    fn dxt1_header(width: u32, height: u32, mips: u32) -> ContainerHeader {
        ContainerHeader::new(width, height, mips, PixelFormat::compressed(FourCC::DXT1))
    }

    #[test]
    fn test_dxt1_512_level_sizes() {
        let plan = MipPlan::new(&dxt1_header(512, 512, 8), None).unwrap();
        let sizes: Vec<u64> = plan.levels.iter().map(|l| l.byte_size).collect();
        assert_eq!(sizes, vec![131072, 32768, 8192, 2048, 512, 128, 32, 8]);
        assert_eq!(plan.faces, 1);
    }

    #[test]
    fn test_block_sizes_per_four_cc() {
        let bc1 = TextureFormat::from_four_cc(FourCC::DXT1).unwrap();
        let bc3 = TextureFormat::from_four_cc(FourCC::DXT5).unwrap();
        let bc5 = TextureFormat::from_four_cc(FourCC::ATI2).unwrap();
        let bc4 = TextureFormat::from_four_cc(FourCC::BC4U).unwrap();

        assert_eq!(bc1.byte_size(1, 1), Some(8));
        assert_eq!(bc3.byte_size(1, 1), Some(16));
        assert_eq!(bc5.byte_size(8, 8), Some(64));
        assert_eq!(bc4.byte_size(8, 8), Some(32));
        assert_eq!(bc3.byte_size(1024, 1024), Some(1024 * 1024));
    }

    #[test]
    fn test_block_size_rounds_partial_blocks_up() {
        let bc1 = TextureFormat::BlockCompressed { block_bytes: 8 };
        assert_eq!(bc1.byte_size(5, 3), Some(16));
        assert_eq!(bc1.byte_size(13, 9), Some(4 * 3 * 8));
    }

    #[test]
    fn test_uncompressed_legacy_sizes() {
        let header = ContainerHeader::new(
            3,
            3,
            1,
            PixelFormat::uncompressed(24, [0xFF0000, 0xFF00, 0xFF, 0]),
        );
        assert_eq!(mip_byte_size(3, 3, &header, None).unwrap(), 27);

        let header = ContainerHeader::new(3, 1, 1, PixelFormat::uncompressed(4, [0xF, 0, 0, 0]));
        assert_eq!(mip_byte_size(3, 1, &header, None).unwrap(), 2);
    }

    #[test]
    fn test_dxgi_formats() {
        assert_eq!(
            TextureFormat::from_dxgi(71).unwrap(),
            TextureFormat::BlockCompressed { block_bytes: 8 }
        );
        assert_eq!(
            TextureFormat::from_dxgi(98).unwrap(),
            TextureFormat::BlockCompressed { block_bytes: 16 }
        );
        assert_eq!(TextureFormat::from_dxgi(61).unwrap().byte_size(7, 5), Some(35));
        assert_eq!(TextureFormat::from_dxgi(49).unwrap().byte_size(7, 5), Some(70));
    }

    #[test]
    fn test_dxgi_takes_precedence_over_four_cc() {
        let header = dxt1_header(64, 64, 1);
        let ext = ExtendedFormatHeader::texture_2d(DxgiFormat::Bc7Unorm as u32);
        assert_eq!(mip_byte_size(64, 64, &header, Some(&ext)).unwrap(), 4096);
    }

    #[test]
    fn test_unsupported_formats() {
        let header = ContainerHeader::new(4, 4, 1, PixelFormat::compressed(FourCC(*b"XYZW")));
        assert!(matches!(
            mip_byte_size(4, 4, &header, None),
            Err(Error::UnsupportedFormat(FormatCode::FourCC(FourCC(code)))) if &code == b"XYZW"
        ));

        let ext = ExtendedFormatHeader::texture_2d(2);
        assert!(matches!(
            mip_byte_size(4, 4, &header, Some(&ext)),
            Err(Error::UnsupportedFormat(FormatCode::Dxgi(2)))
        ));

        let header = ContainerHeader::new(4, 4, 1, PixelFormat::uncompressed(0, [0; 4]));
        assert!(matches!(
            mip_byte_size(4, 4, &header, None),
            Err(Error::UnsupportedFormat(FormatCode::BitCount(0)))
        ));
    }

    #[test]
    fn test_mip_dimensions_use_shifts() {
        assert_eq!(mip_dimensions(0, 300, 17), (300, 17));
        assert_eq!(mip_dimensions(1, 300, 17), (150, 8));
        assert_eq!(mip_dimensions(3, 300, 17), (37, 2));
        assert_eq!(mip_dimensions(5, 300, 17), (9, 1));
        assert_eq!(mip_dimensions(40, 300, 17), (1, 1));
    }

    #[test]
    fn test_sizes_never_increase_with_level() {
        let formats = [
            PixelFormat::compressed(FourCC::DXT1),
            PixelFormat::compressed(FourCC::DXT5),
            PixelFormat::uncompressed(32, [0xFF, 0xFF00, 0xFF0000, 0xFF00_0000]),
        ];
        for pixel_format in formats {
            for (width, height) in [(1024, 256), (300, 17), (1, 4096), (7, 7)] {
                let header = ContainerHeader::new(width, height, 14, pixel_format);
                let plan = MipPlan::new(&header, None).unwrap();
                for pair in plan.levels.windows(2) {
                    assert!(pair[0].byte_size >= pair[1].byte_size, "{pair:?}");
                }
            }
        }
    }

    #[test]
    fn test_zero_mip_count_means_one_level() {
        let plan = MipPlan::new(&dxt1_header(16, 16, 0), None).unwrap();
        assert_eq!(plan.levels.len(), 1);
        assert_eq!(plan.total_payload(), 128);
    }

    #[test]
    fn test_cubemap_plan_counts_all_faces() {
        let mut header = dxt1_header(8, 8, 2);
        header.caps2 = Caps2::CUBEMAP | Caps2::CUBEMAP_ALL_FACES;
        let plan = MipPlan::new(&header, None).unwrap();

        assert_eq!(plan.faces, 6);
        assert_eq!(plan.face_payload(), 32 + 8);
        assert_eq!(plan.total_payload(), 6 * 40);
    }

    #[test]
    fn test_huge_dimensions_are_rejected() {
        let header =
            ContainerHeader::new(u32::MAX, u32::MAX, 1, PixelFormat::compressed(FourCC::DXT5));
        assert_eq!(
            TextureFormat::from_four_cc(FourCC::DXT5).unwrap().byte_size(u32::MAX, u32::MAX),
            None
        );
        assert!(matches!(
            MipPlan::new(&header, None),
            Err(Error::InvalidDimensions {
                width: u32::MAX,
                height: u32::MAX,
                mip_levels: 1
            })
        ));

        let header = ContainerHeader::new(u32::MAX, 1, 1, PixelFormat::uncompressed(128, [0; 4]));
        assert!(matches!(
            mip_byte_size(u32::MAX, u32::MAX, &header, None),
            Err(Error::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn test_payload_overflow_across_faces_is_rejected() {
        // One face fits in a u64, six do not.
        let mut header =
            ContainerHeader::new(u32::MAX, 1 << 30, 1, PixelFormat::compressed(FourCC::DXT5));
        assert_eq!(MipPlan::new(&header, None).unwrap().face_payload(), 1 << 62);

        header.caps2 = Caps2::CUBEMAP;
        assert!(matches!(
            MipPlan::new(&header, None),
            Err(Error::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn test_mip_count_limit() {
        assert_eq!(
            MipPlan::new(&dxt1_header(4, 4, MAX_MIP_LEVELS), None)
                .unwrap()
                .levels
                .len(),
            32
        );
        assert!(matches!(
            MipPlan::new(&dxt1_header(4, 4, MAX_MIP_LEVELS + 1), None),
            Err(Error::InvalidDimensions { mip_levels: 33, .. })
        ));
        assert!(matches!(
            MipPlan::new(&dxt1_header(4, 4, u32::MAX), None),
            Err(Error::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn test_already_combined_threshold() {
        let bytes = encode(&dxt1_header(512, 512, 8), None);
        let decoded = decode(&bytes).unwrap();
        let full = 128 + 131072 + 32768 + 8192 + 2048 + 512 + 128 + 32 + 8;

        assert_eq!(minimum_combined_size(&decoded).unwrap(), full);
        assert!(is_already_combined(&decoded, full).unwrap());
        assert!(is_already_combined(&decoded, full + 8).unwrap());
        assert!(!is_already_combined(&decoded, 296).unwrap());
    }
}
