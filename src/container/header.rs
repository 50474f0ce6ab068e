use crate::error::FormatError;
use tracing::{debug, trace};

/// Magic tag as written: `xgcode 1.0\n`, zero padded to 16 bytes
pub const GX_MAGIC: [u8; 16] = *b"xgcode 1.0\n\0\0\0\0\0";

/// Tag compared against after trimming padding
pub const GX_TAG: &str = "xgcode 1.0";

pub const DEFAULT_PRINT_SECONDS: u32 = 100;
pub const DEFAULT_FILAMENT_MM: u32 = 100;

/// Display/tuning block the firmware expects at 0x2C. The values are not
/// interpreted here; target devices reject files whose defaults differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayTuning {
    pub extruder_mode: u16,
    pub layer_height_um: u16,
    pub reserved: u16,
    pub perimeter_shells: u16,
    pub print_speed: u16,
    pub platform_temp: u16,
    pub extruder_temp: u8,
    pub material_flag: u8,
}

impl Default for DisplayTuning {
    fn default() -> Self {
        Self {
            extruder_mode: 11,
            layer_height_um: 200,
            reserved: 0,
            perimeter_shells: 3,
            print_speed: 60,
            platform_temp: 110,
            extruder_temp: 220,
            material_flag: 0xFF,
        }
    }
}

/// Fixed-size GX header (58 bytes, little-endian)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GxHeader {
    pub magic: String,
    pub reserved: u32,
    pub bmp_offset: u32,
    pub gcode_start_offset: u32,
    pub gcode_end_offset: u32,
    pub print_seconds: u32,
    pub filament_mm: u32,
    pub filament_aux_mm: u32,
    pub tuning: DisplayTuning,
}

/// Sequential little-endian reads over a byte slice
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take())
    }

    fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }
}

impl GxHeader {
    pub const SIZE: usize = 58;

    /// Header for a fresh container; the toolpath starts right after the thumbnail.
    pub fn new(thumbnail_len: usize, print_seconds: u32, filament_mm: u32) -> Self {
        let bmp_offset = Self::SIZE as u32;
        let gcode_offset = bmp_offset + thumbnail_len as u32;
        Self {
            magic: GX_TAG.to_string(),
            reserved: 0,
            bmp_offset,
            gcode_start_offset: gcode_offset,
            gcode_end_offset: gcode_offset,
            print_seconds,
            filament_mm,
            filament_aux_mm: 0,
            tuning: DisplayTuning::default(),
        }
    }

    /// Parses the header and returns it with the cursor position after the
    /// last fixed field (the header index).
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), FormatError> {
        if buf.len() < Self::SIZE {
            debug!("Container too short: {} bytes", buf.len());
            return Err(FormatError::Truncated { len: buf.len() });
        }

        let mut cur = Cursor { buf, pos: 0 };
        let raw_magic: [u8; 16] = cur.take();
        let magic = String::from_utf8_lossy(&raw_magic)
            .trim_matches(|c: char| c == '\0' || c.is_whitespace())
            .to_string();
        if magic != GX_TAG {
            debug!("Unexpected container magic: {:?}", magic);
            return Err(FormatError::BadMagic(magic));
        }

        let header = Self {
            magic,
            reserved: cur.u32(),
            bmp_offset: cur.u32(),
            gcode_start_offset: cur.u32(),
            gcode_end_offset: cur.u32(),
            print_seconds: cur.u32(),
            filament_mm: cur.u32(),
            filament_aux_mm: cur.u32(),
            tuning: DisplayTuning {
                extruder_mode: cur.u16(),
                layer_height_um: cur.u16(),
                reserved: cur.u16(),
                perimeter_shells: cur.u16(),
                print_speed: cur.u16(),
                platform_temp: cur.u16(),
                extruder_temp: cur.u8(),
                material_flag: cur.u8(),
            },
        };
        trace!("Decoded container header: {:?}", header);

        Ok((header, cur.pos))
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        let mut magic = [0u8; 16];
        let tag = format!("{}\n", self.magic);
        let n = tag.len().min(16);
        magic[..n].copy_from_slice(&tag.as_bytes()[..n]);

        buf[0..16].copy_from_slice(&magic);
        buf[16..20].copy_from_slice(&self.reserved.to_le_bytes());
        buf[20..24].copy_from_slice(&self.bmp_offset.to_le_bytes());
        buf[24..28].copy_from_slice(&self.gcode_start_offset.to_le_bytes());
        buf[28..32].copy_from_slice(&self.gcode_end_offset.to_le_bytes());
        buf[32..36].copy_from_slice(&self.print_seconds.to_le_bytes());
        buf[36..40].copy_from_slice(&self.filament_mm.to_le_bytes());
        buf[40..44].copy_from_slice(&self.filament_aux_mm.to_le_bytes());
        buf[44..46].copy_from_slice(&self.tuning.extruder_mode.to_le_bytes());
        buf[46..48].copy_from_slice(&self.tuning.layer_height_um.to_le_bytes());
        buf[48..50].copy_from_slice(&self.tuning.reserved.to_le_bytes());
        buf[50..52].copy_from_slice(&self.tuning.perimeter_shells.to_le_bytes());
        buf[52..54].copy_from_slice(&self.tuning.print_speed.to_le_bytes());
        buf[54..56].copy_from_slice(&self.tuning.platform_temp.to_le_bytes());
        buf[56] = self.tuning.extruder_temp;
        buf[57] = self.tuning.material_flag;

        buf
    }
}
