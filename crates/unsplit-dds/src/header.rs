//! DDS header structures and their byte-exact codec.
//!
//! The container header is modelled as a plain record with an explicit field
//! order. [`decode`] and [`encode`] walk that order by hand so the on-disk layout
//! never depends on how the compiler lays out the structs.

use std::fmt;

use bitflags::bitflags;
use byteorder::{ByteOrder, LittleEndian};

use crate::{Error, Result, DDS_MAGIC};

/// Size of the container header including the 4-byte magic.
pub const HEADER_SIZE: usize = 128;

/// Size of the DX10 extended header.
pub const DX10_HEADER_SIZE: usize = 20;

/// Size of the header body (everything after the magic).
const BODY_SIZE: usize = HEADER_SIZE - DDS_MAGIC.len();

/// Number of 32-bit words in the header body.
const BODY_WORDS: usize = BODY_SIZE / 4;

/// Number of 32-bit words in the DX10 header.
const DX10_WORDS: usize = DX10_HEADER_SIZE / 4;

bitflags! {
    /// Pixel format flags (`DDPF_*`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize))]
    pub struct PixelFormatFlags: u32 {
        const ALPHA_PIXELS = 0x1;
        const ALPHA = 0x2;
        const FOURCC = 0x4;
        const RGB = 0x40;
        const YUV = 0x200;
        const LUMINANCE = 0x2_0000;
    }
}

bitflags! {
    /// Surface capabilities (`DDSCAPS_*`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize))]
    pub struct Caps: u32 {
        const ALPHA = 0x2;
        const COMPLEX = 0x8;
        const TEXTURE = 0x1000;
        const MIPMAP = 0x40_0000;
    }
}

bitflags! {
    /// Extended surface capabilities (`DDSCAPS2_*`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize))]
    pub struct Caps2: u32 {
        const CUBEMAP = 0x200;
        const CUBEMAP_POSITIVE_X = 0x400;
        const CUBEMAP_NEGATIVE_X = 0x800;
        const CUBEMAP_POSITIVE_Y = 0x1000;
        const CUBEMAP_NEGATIVE_Y = 0x2000;
        const CUBEMAP_POSITIVE_Z = 0x4000;
        const CUBEMAP_NEGATIVE_Z = 0x8000;
        const CUBEMAP_ALL_FACES = 0xFC00;
        const VOLUME = 0x20_0000;
    }
}

/// Four-character code for compression type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// DXT1 (BC1) compression.
    pub const DXT1: Self = Self(*b"DXT1");
    /// DXT3 (BC2) compression.
    pub const DXT3: Self = Self(*b"DXT3");
    /// DXT5 (BC3) compression.
    pub const DXT5: Self = Self(*b"DXT5");
    /// ATI1 (BC4) compression.
    pub const ATI1: Self = Self(*b"ATI1");
    /// ATI2 (BC5) compression.
    pub const ATI2: Self = Self(*b"ATI2");
    /// BC4U compression.
    pub const BC4U: Self = Self(*b"BC4U");
    /// BC4S compression.
    pub const BC4S: Self = Self(*b"BC4S");
    /// BC5U compression.
    pub const BC5U: Self = Self(*b"BC5U");
    /// BC5S compression.
    pub const BC5S: Self = Self(*b"BC5S");
    /// DX10 extended header.
    pub const DX10: Self = Self(*b"DX10");
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &byte in &self.0 {
            if byte.is_ascii_graphic() || byte == b' ' {
                write!(f, "{}", byte as char)?;
            } else {
                write!(f, "\\x{byte:02x}")?;
            }
        }
        Ok(())
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for FourCC {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// DDS pixel format block (32 bytes on disk).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PixelFormat {
    /// Structure size (should be 32).
    pub size: u32,
    /// Pixel format flags.
    pub flags: PixelFormatFlags,
    /// Four-character code, only meaningful with [`PixelFormatFlags::FOURCC`].
    pub four_cc: FourCC,
    /// Number of bits per pixel (for uncompressed).
    pub rgb_bit_count: u32,
    /// Red bit mask.
    pub r_bit_mask: u32,
    /// Green bit mask.
    pub g_bit_mask: u32,
    /// Blue bit mask.
    pub b_bit_mask: u32,
    /// Alpha bit mask.
    pub a_bit_mask: u32,
}

impl PixelFormat {
    /// Expected structure size.
    pub const SIZE: u32 = 32;

    /// A compressed pixel format identified by a FourCC.
    pub fn compressed(four_cc: FourCC) -> Self {
        Self {
            size: Self::SIZE,
            flags: PixelFormatFlags::FOURCC,
            four_cc,
            ..Self::default()
        }
    }

    /// An uncompressed RGB(A) pixel format.
    pub fn uncompressed(rgb_bit_count: u32, masks: [u32; 4]) -> Self {
        let [r_bit_mask, g_bit_mask, b_bit_mask, a_bit_mask] = masks;
        let mut flags = PixelFormatFlags::RGB;
        if a_bit_mask != 0 {
            flags |= PixelFormatFlags::ALPHA_PIXELS;
        }
        Self {
            size: Self::SIZE,
            flags,
            four_cc: FourCC::default(),
            rgb_bit_count,
            r_bit_mask,
            g_bit_mask,
            b_bit_mask,
            a_bit_mask,
        }
    }

    /// Whether the FourCC field describes the format.
    pub fn has_four_cc(&self) -> bool {
        self.flags.contains(PixelFormatFlags::FOURCC)
    }
}

/// DDS container header (124-byte body following the magic).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ContainerHeader {
    /// Header size (should be 124).
    pub size: u32,
    /// Header flags (`DDSD_*`).
    pub flags: u32,
    /// Image height.
    pub height: u32,
    /// Image width.
    pub width: u32,
    /// Pitch or linear size.
    pub pitch_or_linear_size: u32,
    /// Depth (for volume textures).
    pub depth: u32,
    /// Number of mipmap levels.
    pub mip_map_count: u32,
    /// Reserved, preserved verbatim.
    pub reserved1: [u32; 11],
    /// Pixel format.
    pub pixel_format: PixelFormat,
    /// Surface capabilities.
    pub caps: Caps,
    /// Surface capabilities 2.
    pub caps2: Caps2,
    /// Surface capabilities 3.
    pub caps3: u32,
    /// Surface capabilities 4.
    pub caps4: u32,
    /// Reserved, preserved verbatim.
    pub reserved2: u32,
}

impl ContainerHeader {
    /// Expected value of the `size` field.
    pub const SIZE: u32 = BODY_SIZE as u32;

    /// `DDSD_CAPS | DDSD_HEIGHT | DDSD_WIDTH | DDSD_PIXELFORMAT`.
    const REQUIRED_FLAGS: u32 = 0x1 | 0x2 | 0x4 | 0x1000;
    /// `DDSD_MIPMAPCOUNT`.
    const FLAG_MIPMAP_COUNT: u32 = 0x2_0000;

    /// Build a 2D texture header.
    pub fn new(width: u32, height: u32, mip_map_count: u32, pixel_format: PixelFormat) -> Self {
        let mut caps = Caps::TEXTURE;
        if mip_map_count > 1 {
            caps |= Caps::MIPMAP | Caps::COMPLEX;
        }
        Self {
            size: Self::SIZE,
            flags: Self::REQUIRED_FLAGS | Self::FLAG_MIPMAP_COUNT,
            height,
            width,
            pitch_or_linear_size: 0,
            depth: 0,
            mip_map_count,
            reserved1: [0; 11],
            pixel_format,
            caps,
            caps2: Caps2::empty(),
            caps3: 0,
            caps4: 0,
            reserved2: 0,
        }
    }

    /// Check if this header is followed by a DX10 extended header.
    pub fn is_dx10(&self) -> bool {
        self.pixel_format.four_cc == FourCC::DX10
    }

    /// Check if the cubemap capability bit is set.
    pub fn is_cubemap(&self) -> bool {
        self.caps2.contains(Caps2::CUBEMAP)
    }

    /// Number of faces stored per mip level.
    pub fn face_count(&self) -> u32 {
        if self.is_cubemap() {
            6
        } else {
            1
        }
    }

    /// Number of mip levels to lay out. A zero count means a single level.
    pub fn mip_levels(&self) -> u32 {
        self.mip_map_count.max(1)
    }

    fn from_words(words: &[u32; BODY_WORDS]) -> Self {
        let mut reserved1 = [0u32; 11];
        reserved1.copy_from_slice(&words[7..18]);

        Self {
            size: words[0],
            flags: words[1],
            height: words[2],
            width: words[3],
            pitch_or_linear_size: words[4],
            depth: words[5],
            mip_map_count: words[6],
            reserved1,
            pixel_format: PixelFormat {
                size: words[18],
                flags: PixelFormatFlags::from_bits_retain(words[19]),
                four_cc: FourCC(words[20].to_le_bytes()),
                rgb_bit_count: words[21],
                r_bit_mask: words[22],
                g_bit_mask: words[23],
                b_bit_mask: words[24],
                a_bit_mask: words[25],
            },
            caps: Caps::from_bits_retain(words[26]),
            caps2: Caps2::from_bits_retain(words[27]),
            caps3: words[28],
            caps4: words[29],
            reserved2: words[30],
        }
    }

    fn to_words(&self) -> [u32; BODY_WORDS] {
        let mut words = [0u32; BODY_WORDS];
        words[0] = self.size;
        words[1] = self.flags;
        words[2] = self.height;
        words[3] = self.width;
        words[4] = self.pitch_or_linear_size;
        words[5] = self.depth;
        words[6] = self.mip_map_count;
        words[7..18].copy_from_slice(&self.reserved1);

        let pf = &self.pixel_format;
        words[18] = pf.size;
        words[19] = pf.flags.bits();
        words[20] = u32::from_le_bytes(pf.four_cc.0);
        words[21] = pf.rgb_bit_count;
        words[22] = pf.r_bit_mask;
        words[23] = pf.g_bit_mask;
        words[24] = pf.b_bit_mask;
        words[25] = pf.a_bit_mask;

        words[26] = self.caps.bits();
        words[27] = self.caps2.bits();
        words[28] = self.caps3;
        words[29] = self.caps4;
        words[30] = self.reserved2;
        words
    }
}

/// DX10 extended header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ExtendedFormatHeader {
    /// DXGI format, kept raw so unknown values round-trip.
    pub dxgi_format: u32,
    /// Resource dimension.
    pub resource_dimension: u32,
    /// Misc flags.
    pub misc_flag: u32,
    /// Array size.
    pub array_size: u32,
    /// Alpha mode (`miscFlags2`).
    pub alpha_mode: u32,
}

impl ExtendedFormatHeader {
    /// `D3D10_RESOURCE_DIMENSION_TEXTURE2D`.
    pub const TEXTURE_2D: u32 = 3;

    /// A single 2D texture in the given DXGI format.
    pub fn texture_2d(dxgi_format: u32) -> Self {
        Self {
            dxgi_format,
            resource_dimension: Self::TEXTURE_2D,
            misc_flag: 0,
            array_size: 1,
            alpha_mode: 0,
        }
    }

    fn from_words(words: &[u32; DX10_WORDS]) -> Self {
        Self {
            dxgi_format: words[0],
            resource_dimension: words[1],
            misc_flag: words[2],
            array_size: words[3],
            alpha_mode: words[4],
        }
    }

    fn to_words(self) -> [u32; DX10_WORDS] {
        [
            self.dxgi_format,
            self.resource_dimension,
            self.misc_flag,
            self.array_size,
            self.alpha_mode,
        ]
    }
}

/// Headers decoded from the front of a header fragment.
#[derive(Debug, Clone)]
pub struct DecodedHeader<'a> {
    /// The container header.
    pub header: ContainerHeader,
    /// The DX10 header, if the FourCC announced one.
    pub extended: Option<ExtendedFormatHeader>,
    /// Bytes following the header(s): the smallest mips' payload.
    pub remainder: &'a [u8],
}

impl DecodedHeader<'_> {
    /// Length of the canonical encoding of the header(s).
    pub fn header_len(&self) -> usize {
        encoded_len(self.extended.is_some())
    }

    /// Canonical encoding of the header(s).
    pub fn encode(&self) -> Vec<u8> {
        encode(&self.header, self.extended.as_ref())
    }
}

/// Length of an encoded header, with or without the DX10 header.
pub fn encoded_len(has_extended: bool) -> usize {
    if has_extended {
        HEADER_SIZE + DX10_HEADER_SIZE
    } else {
        HEADER_SIZE
    }
}

/// Decode the container header (and DX10 header, if announced) from `bytes`.
///
/// The `"DDS "` magic is optional; some fragments start directly with the
/// header body.
pub fn decode(bytes: &[u8]) -> Result<DecodedHeader<'_>> {
    if bytes.len() < HEADER_SIZE {
        return Err(Error::TruncatedHeader {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let mut position = if bytes.starts_with(DDS_MAGIC) {
        DDS_MAGIC.len()
    } else {
        0
    };

    let mut words = [0u32; BODY_WORDS];
    LittleEndian::read_u32_into(&bytes[position..position + BODY_SIZE], &mut words);
    position += BODY_SIZE;
    let header = ContainerHeader::from_words(&words);

    let extended = if header.is_dx10() {
        let available = bytes.len() - position;
        if available < DX10_HEADER_SIZE {
            return Err(Error::TruncatedExtendedHeader {
                needed: DX10_HEADER_SIZE,
                available,
            });
        }

        let mut words = [0u32; DX10_WORDS];
        LittleEndian::read_u32_into(&bytes[position..position + DX10_HEADER_SIZE], &mut words);
        position += DX10_HEADER_SIZE;
        Some(ExtendedFormatHeader::from_words(&words))
    } else {
        None
    };

    Ok(DecodedHeader {
        header,
        extended,
        remainder: &bytes[position..],
    })
}

/// Encode the header(s), magic first, exactly as [`decode`] reads them.
pub fn encode(header: &ContainerHeader, extended: Option<&ExtendedFormatHeader>) -> Vec<u8> {
    let mut out = vec![0u8; encoded_len(extended.is_some())];
    out[..DDS_MAGIC.len()].copy_from_slice(DDS_MAGIC);
    LittleEndian::write_u32_into(&header.to_words(), &mut out[DDS_MAGIC.len()..HEADER_SIZE]);

    if let Some(extended) = extended {
        LittleEndian::write_u32_into(&extended.to_words(), &mut out[HEADER_SIZE..]);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> ContainerHeader {
        let mut header = ContainerHeader::new(512, 256, 10, PixelFormat::compressed(FourCC::DXT5));
        header.pitch_or_linear_size = 0x1_0000;
        header.reserved1 = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 0xDEAD_BEEF];
        header.reserved2 = 0xCAFE;
        header.caps3 = 0x11;
        header.caps4 = 0x22;
        header
    }

    #[test]
    fn test_encoded_sizes() {
        let header = sample_header();
        assert_eq!(encode(&header, None).len(), 128);

        let ext = ExtendedFormatHeader::texture_2d(84);
        assert_eq!(encode(&header, Some(&ext)).len(), 148);
    }

    #[test]
    fn test_round_trip_preserves_reserved_fields() {
        let header = sample_header();
        let bytes = encode(&header, None);
        let decoded = decode(&bytes).unwrap();

        assert_eq!(decoded.header, header);
        assert!(decoded.extended.is_none());
        assert!(decoded.remainder.is_empty());
        assert_eq!(decoded.encode(), bytes);
    }

    #[test]
    fn test_round_trip_with_dx10_header() {
        let mut header = sample_header();
        header.pixel_format = PixelFormat::compressed(FourCC::DX10);
        let ext = ExtendedFormatHeader {
            dxgi_format: 84,
            resource_dimension: 3,
            misc_flag: 0x4,
            array_size: 1,
            alpha_mode: 0x7,
        };

        let bytes = encode(&header, Some(&ext));
        let decoded = decode(&bytes).unwrap();

        assert_eq!(decoded.header, header);
        assert_eq!(decoded.extended, Some(ext));
        assert_eq!(decoded.header_len(), 148);
    }

    #[test]
    fn test_unknown_flag_bits_survive() {
        let mut header = sample_header();
        header.caps2 = Caps2::from_bits_retain(0x8000_0200);
        header.pixel_format.flags = PixelFormatFlags::from_bits_retain(0x4 | 0x100_0000);

        let decoded_bytes = encode(&header, None);
        let decoded = decode(&decoded_bytes).unwrap();
        assert_eq!(decoded.header.caps2.bits(), 0x8000_0200);
        assert_eq!(decoded.header.pixel_format.flags.bits(), 0x100_0004);
        assert!(decoded.header.is_cubemap());
    }

    #[test]
    fn test_field_offsets() {
        let header = sample_header();
        let bytes = encode(&header, None);

        assert_eq!(&bytes[0..4], b"DDS ");
        assert_eq!(LittleEndian::read_u32(&bytes[4..8]), 124);
        assert_eq!(LittleEndian::read_u32(&bytes[12..16]), 256);
        assert_eq!(LittleEndian::read_u32(&bytes[16..20]), 512);
        assert_eq!(LittleEndian::read_u32(&bytes[28..32]), 10);
        assert_eq!(LittleEndian::read_u32(&bytes[76..80]), 32);
        assert_eq!(&bytes[84..88], b"DXT5");
        assert_eq!(LittleEndian::read_u32(&bytes[124..128]), 0xCAFE);
    }

    #[test]
    fn test_decode_without_magic() {
        let header = sample_header();
        let mut bytes = encode(&header, None)[4..].to_vec();
        bytes.extend_from_slice(&[0xAA; 16]);

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.header, header);
        assert_eq!(decoded.remainder, &[0xAA; 16]);
    }

    #[test]
    fn test_remainder_follows_headers() {
        let header = sample_header();
        let mut bytes = encode(&header, None);
        bytes.extend_from_slice(b"payload");

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.remainder, b"payload");
    }

    #[test]
    fn test_truncated_header() {
        let bytes = vec![0u8; 127];
        match decode(&bytes) {
            Err(Error::TruncatedHeader { needed, available }) => {
                assert_eq!(needed, 128);
                assert_eq!(available, 127);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_truncated_extended_header() {
        let mut header = sample_header();
        header.pixel_format = PixelFormat::compressed(FourCC::DX10);
        let mut bytes = encode(&header, Some(&ExtendedFormatHeader::texture_2d(98)));
        bytes.truncate(140);

        match decode(&bytes) {
            Err(Error::TruncatedExtendedHeader { needed, available }) => {
                assert_eq!(needed, 20);
                assert_eq!(available, 12);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_four_cc_display() {
        assert_eq!(FourCC::DXT1.to_string(), "DXT1");
        assert_eq!(FourCC([b'A', 0, b'B', b' ']).to_string(), "A\\x00B ");
    }
}
