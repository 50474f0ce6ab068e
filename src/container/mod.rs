//! GX container: header, preview thumbnail, toolpath.

pub mod header;

pub use header::{DisplayTuning, GxHeader, DEFAULT_FILAMENT_MM, DEFAULT_PRINT_SECONDS, GX_TAG};

use crate::error::FormatError;
use tracing::debug;

/// Borrowed view over a decoded container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GxFile<'a> {
    pub header: GxHeader,
    pub header_index: usize,
    pub thumbnail: &'a [u8],
    pub toolpath: &'a [u8],
}

impl<'a> GxFile<'a> {
    pub fn decode(buf: &'a [u8]) -> Result<Self, FormatError> {
        let (header, header_index) = GxHeader::decode(buf)?;

        let bmp = header.bmp_offset as usize;
        let start = header.gcode_start_offset as usize;
        let end = header.gcode_end_offset as usize;
        if !(bmp <= start && start <= end && end <= buf.len()) {
            return Err(FormatError::BadOffsets {
                bmp: header.bmp_offset,
                start: header.gcode_start_offset,
                end: header.gcode_end_offset,
                len: buf.len(),
            });
        }

        debug!(
            "Decoded container: thumbnail={} bytes, toolpath={} bytes",
            start - bmp,
            buf.len() - start
        );

        Ok(Self {
            header,
            header_index,
            thumbnail: &buf[bmp..start],
            toolpath: &buf[start..],
        })
    }

    /// Cheap check whether `buf` starts with a GX header
    pub fn is_container(buf: &[u8]) -> bool {
        GxHeader::decode(buf).is_ok()
    }
}

/// Builds `header ‖ thumbnail ‖ toolpath`. Deterministic.
pub fn encode(toolpath: &[u8], thumbnail: &[u8], print_seconds: u32, filament_mm: u32) -> Vec<u8> {
    let header = GxHeader::new(thumbnail.len(), print_seconds, filament_mm);

    let mut out = Vec::with_capacity(GxHeader::SIZE + thumbnail.len() + toolpath.len());
    out.extend_from_slice(&header.encode());
    out.extend_from_slice(thumbnail);
    out.extend_from_slice(toolpath);
    out
}
