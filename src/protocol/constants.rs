//! Wire constants for the printer control protocol

/// Default TCP control port
pub const DEFAULT_PORT: u16 = 8899;

/// Every textual command starts with this prefix
pub const COMMAND_PREFIX: &str = "~";

/// ... and ends with this suffix
pub const COMMAND_SUFFIX: &str = "\r\n";

/// A reply line containing this ends the current exchange
pub const TERMINAL_TOKEN: &str = "ok";

/// Binary block preamble
pub const BLOCK_PREAMBLE: [u8; 4] = [0x5A, 0x5A, 0xA5, 0xA5];

/// Payload bytes carried by every block (final block zero padded)
pub const BLOCK_PAYLOAD_SIZE: usize = 4096;

/// preamble + index + length + crc
pub const BLOCK_HEADER_SIZE: usize = 4 + 4 + 4 + 4;

pub const BLOCK_WIRE_SIZE: usize = BLOCK_HEADER_SIZE + BLOCK_PAYLOAD_SIZE;

/// Directory jobs are spooled into on the device
pub const DEVICE_FILE_ROOT: &str = "0:/user/";

/// Extension the device requires for spooled jobs
pub const CONTAINER_EXTENSION: &str = ".gx";

/// Spool name used when the caller's name has no usable stem
pub const DEFAULT_JOB_NAME: &str = "job";
