//! DDSx texture container.
//!
//! A DDSx stream is a 32 byte little-endian [`DdsxHeader`] followed by the
//! payload: every array layer in turn, each with its mips from largest to
//! smallest, rows tightly packed. Volume mips hold all their depth slices.
//!
//! Payloads compressed as a whole (zlib, zstd, ...) are not decoded here and are
//! reported as unsupported. 16 bit 4444 and 565 formats are expanded to
//! `A8R8G8B8` on load.
//!
//! Streaming readers may not have the payload ready yet and report
//! [`std::io::ErrorKind::WouldBlock`]; those reads are retried after seeking back.

use std::io::{self, Read, Seek, SeekFrom};

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};

use crate::config::TextureSystemConfig;
use crate::error::{TextureError, TextureResult};
use crate::texture::{CreateRequest, SubresourceData, TextureContext, TextureKind, TextureRecord};
use crate::types::{CreateFlags, Extent3d, TextureFormat};

/// Size of the header in bytes.
pub const DDSX_HEADER_SIZE: usize = 32;

/// Expected header label.
pub const DDSX_LABEL: [u8; 4] = *b"DDSx";

bitflags! {
    /// Header flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DdsxFlags: u32 {
        const CUBE = 0x0001;
        const VOLUME = 0x0002;
        const ARRAY = 0x0004;
        /// Texels are stored in linear space.
        const GAMMA_EQ_1 = 0x0008;
        /// Whole-payload compression method; 0 means raw.
        const COMPRESSION_MASK = 0xE000_0000;
    }
}

const fn fourcc(code: &[u8; 4]) -> u32 {
    u32::from_le_bytes(*code)
}

/// Container format code of `format`, if DDSx can store it.
pub fn container_format_code(format: TextureFormat) -> Option<u32> {
    let code = match format {
        TextureFormat::A8R8G8B8 => 21,
        TextureFormat::R5G6B5 => 23,
        TextureFormat::A1R5G5B5 => 25,
        TextureFormat::A4R4G4B4 => 26,
        TextureFormat::A8 => 28,
        TextureFormat::X4R4G4B4 => 30,
        TextureFormat::A2B10G10R10 => 31,
        TextureFormat::G16R16 => 34,
        TextureFormat::A2R10G10B10 => 35,
        TextureFormat::A16B16G16R16 => 36,
        TextureFormat::R8 => 50,
        TextureFormat::A8L8 => 51,
        TextureFormat::V16U16 => 64,
        TextureFormat::L16 => 81,
        TextureFormat::R16F => 111,
        TextureFormat::G16R16F => 112,
        TextureFormat::A16B16G16R16F => 113,
        TextureFormat::R32F => 114,
        TextureFormat::G32R32F => 115,
        TextureFormat::A32B32G32R32F => 116,
        TextureFormat::Dxt1 => fourcc(b"DXT1"),
        TextureFormat::Dxt3 => fourcc(b"DXT3"),
        TextureFormat::Dxt5 => fourcc(b"DXT5"),
        TextureFormat::Ati1n => fourcc(b"ATI1"),
        TextureFormat::Ati2n => fourcc(b"ATI2"),
        TextureFormat::Bc6h => fourcc(b"BC6H"),
        TextureFormat::Bc7 => fourcc(b"BC7 "),
        _ => return None,
    };
    Some(code)
}

/// Texture format stored under a container format code.
pub fn format_from_container_code(code: u32) -> Option<TextureFormat> {
    TextureFormat::ALL
        .into_iter()
        .find(|format| container_format_code(*format) == Some(code))
}

/// The DDSx file header, fields in little-endian byte order.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct DdsxHeader {
    label: [u8; 4],
    format: u32,
    flags: u32,
    width: u16,
    height: u16,
    levels: u8,
    hq_part_levels: u8,
    depth: u16,
    bits_per_pixel: u16,
    quality_skip: u16,
    mem_size: u32,
    packed_size: u32,
}

static_assertions::const_assert_eq!(std::mem::size_of::<DdsxHeader>(), DDSX_HEADER_SIZE);

impl DdsxHeader {
    /// Header of an uncompressed 2D texture; the memory size covers all mips.
    pub fn new(format: TextureFormat, width: u16, height: u16, levels: u8) -> Self {
        let mut header = Self {
            label: DDSX_LABEL,
            format: container_format_code(format).unwrap_or(0).to_le(),
            flags: 0,
            width: width.to_le(),
            height: height.to_le(),
            levels: levels.max(1),
            hq_part_levels: 0,
            depth: 1u16.to_le(),
            bits_per_pixel: if format.is_compressed() {
                0
            } else {
                (format.bytes_per_block() as u16 * 8).to_le()
            },
            quality_skip: 0,
            mem_size: 0,
            packed_size: 0,
        };
        header.update_mem_size();
        header
    }

    pub fn with_flags(mut self, flags: DdsxFlags) -> Self {
        self.flags = flags.bits().to_le();
        self.update_mem_size();
        self
    }

    /// Volume depth, or array size of array textures.
    pub fn with_depth(mut self, depth: u16) -> Self {
        self.depth = depth.to_le();
        self.update_mem_size();
        self
    }

    pub fn with_quality_skip(mut self, skip: u16) -> Self {
        self.quality_skip = skip.to_le();
        self
    }

    fn update_mem_size(&mut self) {
        if let Some(size) = self.payload_size() {
            self.mem_size = (size as u32).to_le();
        }
    }

    /// Parse a header from the first [`DDSX_HEADER_SIZE`] bytes of `bytes`.
    pub fn parse(bytes: &[u8]) -> TextureResult<Self> {
        let Some(raw) = bytes.get(..DDSX_HEADER_SIZE) else {
            return Err(TextureError::Truncated {
                expected: DDSX_HEADER_SIZE as u64,
                actual: bytes.len() as u64,
            });
        };
        let header: Self = bytemuck::pod_read_unaligned(raw);
        if header.label != DDSX_LABEL {
            return Err(TextureError::BadLabel(header.label));
        }
        Ok(header)
    }

    pub fn label(&self) -> [u8; 4] {
        self.label
    }

    pub fn format_code(&self) -> u32 {
        u32::from_le(self.format)
    }

    /// Stored format, if known.
    pub fn format(&self) -> Option<TextureFormat> {
        format_from_container_code(self.format_code())
    }

    pub fn flags(&self) -> DdsxFlags {
        DdsxFlags::from_bits_retain(u32::from_le(self.flags))
    }

    pub fn width(&self) -> u32 {
        u32::from(u16::from_le(self.width))
    }

    pub fn height(&self) -> u32 {
        u32::from(u16::from_le(self.height))
    }

    pub fn depth(&self) -> u32 {
        u32::from(u16::from_le(self.depth))
    }

    pub fn levels(&self) -> u32 {
        u32::from(self.levels)
    }

    pub fn hq_part_levels(&self) -> u32 {
        u32::from(self.hq_part_levels)
    }

    pub fn bits_per_pixel(&self) -> u32 {
        u32::from(u16::from_le(self.bits_per_pixel))
    }

    /// Mips dropped at the configured quality.
    pub fn quality_skip(&self) -> u32 {
        u32::from(u16::from_le(self.quality_skip))
    }

    pub fn mem_size(&self) -> u32 {
        u32::from_le(self.mem_size)
    }

    pub fn packed_size(&self) -> u32 {
        u32::from_le(self.packed_size)
    }

    /// Returns true if the payload is compressed as a whole.
    pub fn is_stream_compressed(&self) -> bool {
        self.flags().intersects(DdsxFlags::COMPRESSION_MASK)
    }

    pub fn kind(&self) -> TextureKind {
        let flags = self.flags();
        if flags.contains(DdsxFlags::CUBE) {
            TextureKind::Cube
        } else if flags.contains(DdsxFlags::VOLUME) {
            TextureKind::Volume
        } else if flags.contains(DdsxFlags::ARRAY) {
            TextureKind::Array
        } else {
            TextureKind::Plain2D
        }
    }

    /// Array layers in the payload.
    pub fn layers(&self) -> u32 {
        match self.kind() {
            TextureKind::Cube => 6,
            TextureKind::Array => self.depth().max(1),
            _ => 1,
        }
    }

    /// Extent of stored mip `level`.
    pub fn mip_extent(&self, level: u32) -> Extent3d {
        let depth = if self.kind() == TextureKind::Volume {
            self.depth()
        } else {
            1
        };
        Extent3d::new(self.width(), self.height(), depth).mip(level)
    }

    /// Tightly packed bytes of stored mip `level` of one layer.
    pub fn surface_size(&self, level: u32) -> Option<u64> {
        let format = self.format()?;
        let extent = self.mip_extent(level);
        Some(
            u64::from(format.row_bytes(extent.width))
                * u64::from(format.blocks_high(extent.height))
                * u64::from(extent.depth),
        )
    }

    /// Bytes of the uncompressed payload.
    pub fn payload_size(&self) -> Option<u64> {
        let per_layer = (0..self.levels())
            .map(|level| self.surface_size(level))
            .sum::<Option<u64>>()?;
        Some(per_layer * u64::from(self.layers()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

/// How a DDSx texture is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DdsxLoadOptions {
    /// Extra create flags; the format comes from the header.
    pub flags: CreateFlags,
    /// Mips to drop from the top; `None` uses the header's quality skip.
    pub skip_levels: Option<u32>,
}

impl DdsxLoadOptions {
    pub fn new(flags: CreateFlags) -> Self {
        Self {
            flags,
            skip_levels: None,
        }
    }

    pub fn with_skip_levels(mut self, skip: u32) -> Self {
        self.skip_levels = Some(skip);
        self
    }
}

/// Texture geometry derived from a header and load options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DdsxLayout {
    pub kind: TextureKind,
    /// Format in the stream.
    pub stored_format: TextureFormat,
    /// Format of the created texture.
    pub format: TextureFormat,
    pub flags: CreateFlags,
    pub width: u32,
    pub height: u32,
    /// Volume depth or array size.
    pub depth: u32,
    pub skip_levels: u32,
    /// Mips of the created texture.
    pub mip_levels: u32,
}

fn expands_to_argb8(format: TextureFormat) -> bool {
    matches!(
        format,
        TextureFormat::A4R4G4B4 | TextureFormat::X4R4G4B4 | TextureFormat::R5G6B5
    )
}

impl DdsxLayout {
    /// Validate `header` and derive the texture to create.
    pub fn new(header: &DdsxHeader, options: &DdsxLoadOptions) -> TextureResult<Self> {
        if header.label() != DDSX_LABEL {
            return Err(TextureError::BadLabel(header.label()));
        }
        if header.is_stream_compressed() {
            return Err(TextureError::Unsupported(format!(
                "compressed DDSx stream (flags {:#x})",
                header.flags().bits()
            )));
        }
        let Some(stored_format) = header.format() else {
            return Err(TextureError::Unsupported(format!(
                "DDSx format code {:#x}",
                header.format_code()
            )));
        };
        if options.flags.contains(CreateFlags::RENDER_TARGET) {
            return Err(TextureError::Precondition(
                "DDSx textures can not be render targets".to_string(),
            ));
        }
        let format = if expands_to_argb8(stored_format) {
            TextureFormat::A8R8G8B8
        } else {
            stored_format
        };
        let mut flags = options.flags.with_format(format);
        if !header.flags().contains(DdsxFlags::GAMMA_EQ_1) {
            flags |= CreateFlags::SRGB_READ;
        }

        let levels = header.levels().max(1);
        let skip = options
            .skip_levels
            .unwrap_or_else(|| header.quality_skip())
            .min(levels - 1);
        let kind = header.kind();
        let depth = match kind {
            TextureKind::Volume => (header.depth() >> skip).max(1),
            TextureKind::Array => header.depth().max(1),
            _ => 1,
        };
        Ok(Self {
            kind,
            stored_format,
            format,
            flags,
            width: (header.width() >> skip).max(1),
            height: (header.height() >> skip).max(1),
            depth,
            skip_levels: skip,
            mip_levels: levels - skip,
        })
    }
}

/// Expand 16 bit 4444/565 texels to `A8R8G8B8` (B, G, R, A byte order).
pub fn expand_to_argb8(format: TextureFormat, src: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(src.len() * 2);
    for texel in src.chunks_exact(2) {
        let v = u16::from_le_bytes([texel[0], texel[1]]);
        let (a, r, g, b) = match format {
            TextureFormat::R5G6B5 => {
                let r = ((v >> 11) & 0x1f) as u8;
                let g = ((v >> 5) & 0x3f) as u8;
                let b = (v & 0x1f) as u8;
                (0xff, (r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2))
            }
            _ => {
                let nibble = |shift: u16| ((v >> shift) & 0xf) as u8 * 17;
                let a = if format == TextureFormat::X4R4G4B4 {
                    0xff
                } else {
                    nibble(12)
                };
                (a, nibble(8), nibble(4), nibble(0))
            }
        };
        out.extend_from_slice(&[b, g, r, a]);
    }
    out
}

fn read_payload<R: Read>(reader: &mut R, len: usize) -> TextureResult<Vec<u8>> {
    let mut data = vec![0; len];
    let mut filled = 0;
    while filled < len {
        match reader.read(&mut data[filled..]) {
            Ok(0) => {
                return Err(TextureError::Truncated {
                    expected: len as u64,
                    actual: filled as u64,
                })
            }
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(data)
}

/// Read `len` bytes, retrying from the same position while the reader would block.
pub(crate) fn read_with_retry<R: Read + Seek>(
    reader: &mut R,
    len: usize,
    config: &TextureSystemConfig,
    name: &str,
) -> TextureResult<Vec<u8>> {
    let start = reader.stream_position()?;
    let mut attempt = 0;
    loop {
        match read_payload(reader, len) {
            Err(TextureError::Io {
                kind: io::ErrorKind::WouldBlock,
                ..
            }) if attempt < config.ddsx_retry_attempts => {
                attempt += 1;
                log::warn!(
                    "<{}>: DDSx data not ready, retry {} of {}",
                    name,
                    attempt,
                    config.ddsx_retry_attempts
                );
                std::thread::sleep(config.ddsx_retry_interval);
                reader.seek(SeekFrom::Start(start))?;
            }
            result => {
                if attempt > 0 && result.is_ok() {
                    log::debug!("<{}>: DDSx data loaded after {} retries", name, attempt);
                }
                return result;
            }
        }
    }
}

/// Read and validate a header.
pub fn read_header<R: Read + Seek>(reader: &mut R, config: &TextureSystemConfig) -> TextureResult<DdsxHeader> {
    let bytes = read_with_retry(reader, DDSX_HEADER_SIZE, config, "DDSx header")?;
    DdsxHeader::parse(&bytes)
}

/// CPU-side copy of a texture's content kept for `SYSTEM_COPY` textures.
///
/// Holds a DDSx header describing the texture as created and the packed texel
/// data in payload order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemCopy {
    header: DdsxHeader,
    data: Vec<u8>,
}

impl SystemCopy {
    /// Mirror built from packed subresources indexed `mip + layer * mip_levels`.
    pub(crate) fn from_packed(header: DdsxHeader, subresources: &[Vec<u8>]) -> Self {
        let data = subresources.iter().flatten().copied().collect();
        Self { header, data }
    }

    pub fn header(&self) -> &DdsxHeader {
        &self.header
    }

    pub fn payload(&self) -> &[u8] {
        &self.data
    }

    /// Header followed by payload, as a DDSx stream.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(DDSX_HEADER_SIZE + self.data.len());
        bytes.extend_from_slice(self.header.as_bytes());
        bytes.extend_from_slice(&self.data);
        bytes
    }

    fn subresource_range(&self, mip: u32, layer: u32) -> Option<std::ops::Range<usize>> {
        if mip >= self.header.levels() || layer >= self.header.layers() {
            return None;
        }
        let per_layer: u64 = (0..self.header.levels())
            .map(|level| self.header.surface_size(level))
            .sum::<Option<u64>>()?;
        let before: u64 = (0..mip)
            .map(|level| self.header.surface_size(level))
            .sum::<Option<u64>>()?;
        let start = (u64::from(layer) * per_layer + before) as usize;
        let end = start + self.header.surface_size(mip)? as usize;
        (end <= self.data.len()).then_some(start..end)
    }

    /// Packed bytes of one subresource.
    pub fn subresource(&self, mip: u32, layer: u32) -> Option<&[u8]> {
        let range = self.subresource_range(mip, layer)?;
        Some(&self.data[range])
    }

    /// Copy rows of `row_pitch` bytes into the packed subresource.
    pub(crate) fn update_subresource(&mut self, mip: u32, layer: u32, src: &[u8], row_pitch: u32) {
        let Some(range) = self.subresource_range(mip, layer) else {
            return;
        };
        let Some(format) = self.header.format() else {
            return;
        };
        let extent = self.header.mip_extent(mip);
        let row_bytes = format.row_bytes(extent.width) as usize;
        let rows = (format.blocks_high(extent.height) * extent.depth) as usize;
        let dst = &mut self.data[range];
        for row in 0..rows {
            let from = row * row_pitch as usize;
            if let Some(src_row) = src.get(from..from + row_bytes) {
                dst[row * row_bytes..(row + 1) * row_bytes].copy_from_slice(src_row);
            }
        }
        log::trace!("system copy mip {} layer {} updated", mip, layer);
    }

    /// Mirror of the initial data of a created texture.
    ///
    /// Returns `None` for formats and kinds DDSx can not describe.
    pub(crate) fn from_initial_data(record: &TextureRecord, data: &[SubresourceData<'_>]) -> Option<Self> {
        container_format_code(record.format)?;
        let (flags, depth) = match record.kind {
            TextureKind::Plain2D => (DdsxFlags::empty(), 1),
            TextureKind::Cube => (DdsxFlags::CUBE, 1),
            TextureKind::Volume => (DdsxFlags::VOLUME, record.extent.depth),
            TextureKind::Array => (DdsxFlags::ARRAY, record.array_size),
            TextureKind::CubeArray => return None,
        };
        let flags = if record.flags.contains(CreateFlags::SRGB_READ) {
            flags
        } else {
            flags | DdsxFlags::GAMMA_EQ_1
        };
        let header = DdsxHeader::new(
            record.format,
            u16::try_from(record.extent.width).ok()?,
            u16::try_from(record.extent.height).ok()?,
            u8::try_from(record.mip_levels).ok()?,
        )
        .with_flags(flags)
        .with_depth(u16::try_from(depth).ok()?);

        let format = record.format;
        let mut subresources = Vec::with_capacity(data.len());
        for layer in 0..header.layers() {
            for mip in 0..header.levels() {
                let source = data.get((mip + layer * record.mip_levels) as usize)?;
                let extent = header.mip_extent(mip);
                let row_bytes = format.row_bytes(extent.width) as usize;
                let rows = format.blocks_high(extent.height) as usize;
                let row_pitch = source.row_pitch as usize;
                let slice_pitch = match source.slice_pitch {
                    0 => row_pitch * rows,
                    pitch => pitch as usize,
                };
                let mut packed = Vec::with_capacity(row_bytes * rows * extent.depth as usize);
                for slice in 0..extent.depth as usize {
                    for row in 0..rows {
                        let from = slice * slice_pitch + row * row_pitch;
                        packed.extend_from_slice(source.data.get(from..from + row_bytes)?);
                    }
                }
                subresources.push(packed);
            }
        }
        Some(Self::from_packed(header, &subresources))
    }
}

/// Split a payload into per-subresource data for the created texture.
fn convert_payload(header: &DdsxHeader, layout: &DdsxLayout, payload: &[u8]) -> TextureResult<Vec<Vec<u8>>> {
    let levels = header.levels().max(1);
    let layers = header.layers();
    let needed = header.payload_size().unwrap_or(0);
    let mut subresources = vec![Vec::new(); (layout.mip_levels * layers) as usize];
    let mut offset = 0usize;
    for layer in 0..layers {
        for level in 0..levels {
            let size = header.surface_size(level).unwrap_or(0) as usize;
            let Some(bytes) = payload.get(offset..offset + size) else {
                return Err(TextureError::Truncated {
                    expected: needed,
                    actual: payload.len() as u64,
                });
            };
            offset += size;
            if level < layout.skip_levels {
                continue;
            }
            let mip = level - layout.skip_levels;
            subresources[(mip + layer * layout.mip_levels) as usize] = if layout.format != layout.stored_format {
                expand_to_argb8(layout.stored_format, bytes)
            } else {
                bytes.to_vec()
            };
        }
    }
    Ok(subresources)
}

fn mirror_header(header: &DdsxHeader, layout: &DdsxLayout) -> DdsxHeader {
    let flags = header.flags().difference(DdsxFlags::COMPRESSION_MASK);
    let depth = if layout.kind == TextureKind::Plain2D || layout.kind == TextureKind::Cube {
        1
    } else {
        layout.depth
    };
    DdsxHeader::new(
        layout.format,
        layout.width as u16,
        layout.height as u16,
        layout.mip_levels as u8,
    )
    .with_flags(flags)
    .with_depth(depth as u16)
}

impl TextureRecord {
    /// Create a record standing in for a texture whose content is streamed later.
    ///
    /// The record reports the final geometry but owns only a 4x4 placeholder.
    pub(crate) fn create_stub(ctx: &TextureContext<'_>, layout: &DdsxLayout, name: &str) -> TextureResult<TextureRecord> {
        let mut record = TextureRecord::create(
            ctx,
            &CreateRequest {
                kind: layout.kind,
                width: 4,
                height: 4,
                depth: if layout.kind == TextureKind::Volume {
                    1
                } else {
                    layout.depth
                },
                mip_levels: 1,
                flags: layout.flags.difference(CreateFlags::SYSTEM_MEMORY | CreateFlags::READABLE),
                name,
                alias_of: None,
            },
            None,
        )?;
        record.flags = layout.flags;
        record.extent = Extent3d::new(
            layout.width,
            layout.height,
            if layout.kind == TextureKind::Volume {
                layout.depth
            } else {
                1
            },
        );
        record.mip_levels = layout.mip_levels;
        record.mip_range = 0..layout.mip_levels;
        record.stub = true;
        Ok(record)
    }

    /// Replace the stub backing with the streamed content.
    pub(crate) fn load_ddsx_content<R: Read + Seek>(
        &mut self,
        ctx: &TextureContext<'_>,
        header: &DdsxHeader,
        options: &DdsxLoadOptions,
        reader: &mut R,
    ) -> TextureResult<()> {
        let layout = DdsxLayout::new(header, options).map_err(|err| ctx.fail(err))?;
        let payload_len = header.payload_size().unwrap_or(0) as usize;
        let payload = read_with_retry(reader, payload_len, ctx.config, &self.name).map_err(|err| ctx.fail(err))?;
        let subresources = convert_payload(header, &layout, &payload).map_err(|err| ctx.fail(err))?;

        let format = layout.format;
        let data: Vec<SubresourceData<'_>> = subresources
            .iter()
            .enumerate()
            .map(|(index, bytes)| {
                let mip = index as u32 % layout.mip_levels;
                let width = (layout.width >> mip).max(1);
                SubresourceData::new(bytes, format.row_bytes(width))
            })
            .collect();

        let mut loaded = TextureRecord::create(
            ctx,
            &CreateRequest {
                kind: layout.kind,
                width: layout.width,
                height: layout.height,
                depth: layout.depth,
                mip_levels: layout.mip_levels,
                flags: layout.flags,
                name: &self.name,
                alias_of: None,
            },
            Some(&data),
        )?;
        if layout.flags.contains(CreateFlags::SYSTEM_COPY) {
            loaded.mirror = Some(SystemCopy::from_packed(mirror_header(header, &layout), &subresources));
        }

        log::debug!(
            "<{}>: loaded {}x{}x{} {} DDSx, {} mips ({} skipped)",
            self.name,
            layout.width,
            layout.height,
            layout.depth,
            layout.format,
            layout.mip_levels,
            layout.skip_levels
        );
        self.swap_backing(ctx, &mut loaded);
        self.mirror = loaded.mirror.take();
        loaded.release(ctx);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_header_layout() {
        let header = DdsxHeader::new(TextureFormat::A8R8G8B8, 8, 4, 2);
        let bytes = header.as_bytes();
        assert_eq!(bytes.len(), DDSX_HEADER_SIZE);
        assert_eq!(&bytes[0..4], b"DDSx");
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 21);
        assert_eq!(u16::from_le_bytes([bytes[12], bytes[13]]), 8);
        assert_eq!(bytes[16], 2);
        // 8x4 + 4x2 texels, 4 bytes each.
        assert_eq!(header.mem_size(), 160);
        assert_eq!(DdsxHeader::parse(bytes).unwrap(), header);
    }

    #[test]
    fn test_default_load_options() {
        let options = DdsxLoadOptions::default();
        assert_eq!(options.flags, CreateFlags::empty());
        assert_eq!(options.skip_levels, None);
        let header = DdsxHeader::new(TextureFormat::A8R8G8B8, 16, 16, 3).with_quality_skip(1);
        let layout = DdsxLayout::new(&header, &options).unwrap();
        assert_eq!((layout.width, layout.height, layout.mip_levels), (8, 8, 2));
    }

    #[test]
    fn test_bad_label() {
        let mut bytes = DdsxHeader::new(TextureFormat::R8, 4, 4, 1).as_bytes().to_vec();
        bytes[..4].copy_from_slice(b"DDS ");
        assert_eq!(DdsxHeader::parse(&bytes), Err(TextureError::BadLabel(*b"DDS ")));
    }

    #[test]
    fn test_layout_skip_and_srgb() {
        let header = DdsxHeader::new(TextureFormat::Dxt1, 256, 128, 5).with_quality_skip(2);
        let layout = DdsxLayout::new(&header, &DdsxLoadOptions::default()).unwrap();
        assert_eq!((layout.width, layout.height), (64, 32));
        assert_eq!(layout.mip_levels, 3);
        assert!(layout.flags.contains(CreateFlags::SRGB_READ));

        let linear = header.with_flags(DdsxFlags::GAMMA_EQ_1);
        let layout = DdsxLayout::new(&linear, &DdsxLoadOptions::default().with_skip_levels(9)).unwrap();
        assert_eq!(layout.skip_levels, 4);
        assert_eq!(layout.mip_levels, 1);
        assert!(!layout.flags.contains(CreateFlags::SRGB_READ));
    }

    #[test]
    fn test_compressed_stream_unsupported() {
        let header = DdsxHeader::new(TextureFormat::R8, 4, 4, 1).with_flags(DdsxFlags::from_bits_retain(0x4000_0000));
        assert!(matches!(
            DdsxLayout::new(&header, &DdsxLoadOptions::default()),
            Err(TextureError::Unsupported(_))
        ));
    }

    #[test]
    fn test_expand_16bit_formats() {
        let argb4444 = 0xF84Cu16.to_le_bytes();
        assert_eq!(expand_to_argb8(TextureFormat::A4R4G4B4, &argb4444), vec![0xcc, 0x44, 0x88, 0xff]);
        assert_eq!(expand_to_argb8(TextureFormat::X4R4G4B4, &0x084Cu16.to_le_bytes())[3], 0xff);
        let white565 = 0xFFFFu16.to_le_bytes();
        assert_eq!(expand_to_argb8(TextureFormat::R5G6B5, &white565), vec![0xff; 4]);
    }

    struct Flaky {
        inner: Cursor<Vec<u8>>,
        blocks: u32,
    }

    impl Read for Flaky {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.blocks > 0 {
                self.blocks -= 1;
                let _ = self.inner.read(&mut buf[..1])?;
                return Err(io::ErrorKind::WouldBlock.into());
            }
            self.inner.read(buf)
        }
    }

    impl Seek for Flaky {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    #[test]
    fn test_would_block_is_retried() {
        let config = TextureSystemConfig::default().with_ddsx_retry(3, std::time::Duration::ZERO);
        let mut reader = Flaky {
            inner: Cursor::new(vec![1, 2, 3, 4]),
            blocks: 2,
        };
        assert_eq!(read_with_retry(&mut reader, 4, &config, "t").unwrap(), vec![1, 2, 3, 4]);

        let mut reader = Flaky {
            inner: Cursor::new(vec![1, 2, 3, 4]),
            blocks: 10,
        };
        assert!(matches!(
            read_with_retry(&mut reader, 4, &config, "t"),
            Err(TextureError::Io {
                kind: io::ErrorKind::WouldBlock,
                ..
            })
        ));
    }

    #[test]
    fn test_truncated_payload() {
        let config = TextureSystemConfig::default();
        let mut reader = Cursor::new(vec![0u8; 10]);
        assert_eq!(
            read_with_retry(&mut reader, 16, &config, "t"),
            Err(TextureError::Truncated {
                expected: 16,
                actual: 10
            })
        );
    }

    #[test]
    fn test_system_copy_subresources() {
        let header = DdsxHeader::new(TextureFormat::R8, 4, 2, 2);
        let copy = SystemCopy::from_packed(header, &[vec![1; 8], vec![2; 2]]);
        assert_eq!(copy.subresource(1, 0), Some(&[2u8, 2][..]));
        assert_eq!(copy.to_bytes().len(), DDSX_HEADER_SIZE + 10);

        let mut copy = copy;
        let mut rows = vec![0u8; 512];
        rows[..4].copy_from_slice(&[9, 9, 9, 9]);
        rows[256..260].copy_from_slice(&[7, 7, 7, 7]);
        copy.update_subresource(0, 0, &rows, 256);
        assert_eq!(copy.subresource(0, 0), Some(&[9u8, 9, 9, 9, 7, 7, 7, 7][..]));
    }
}
