use crate::protocol::constants::{
    COMMAND_PREFIX, COMMAND_SUFFIX, CONTAINER_EXTENSION, DEFAULT_JOB_NAME, DEVICE_FILE_ROOT,
};
use crate::protocol::frame::ChunkFrame;

/// Textual commands understood by the printer firmware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Opens a session; the same request grants exclusive control
    SessionStart,
    AcquireControl,
    ReleaseControl,
    GetInfo,
    GetStatus,
    GetProgress,
    GetTemperature,
    GetPosition,
    Ping,
    BeginWrite { length: usize, path: String },
    EndWrite,
    StartPrint { path: String },
    CancelPrint,
    SetName(String),
    /// Anything else, sent verbatim between prefix and suffix
    Custom(String),
}

impl Command {
    /// Command text without prefix/suffix, e.g. `M28 5058 0:/user/part.gx`
    pub fn text(&self) -> String {
        match self {
            Command::SessionStart | Command::AcquireControl => "M601 S1".to_string(),
            Command::ReleaseControl => "M602".to_string(),
            Command::GetInfo => "M115".to_string(),
            Command::GetStatus => "M119".to_string(),
            Command::GetProgress => "M27".to_string(),
            Command::GetTemperature => "M105".to_string(),
            Command::GetPosition => "M114".to_string(),
            Command::Ping => "M650".to_string(),
            Command::BeginWrite { length, path } => format!("M28 {} {}", length, path),
            Command::EndWrite => "M29".to_string(),
            Command::StartPrint { path } => format!("M23 {}", path),
            Command::CancelPrint => "M26".to_string(),
            Command::SetName(name) => format!("M610 {}", name),
            Command::Custom(text) => text.trim_start_matches(COMMAND_PREFIX).trim_end().to_string(),
        }
    }

    pub fn to_wire(&self) -> Vec<u8> {
        format!("{}{}{}", COMMAND_PREFIX, self.text(), COMMAND_SUFFIX).into_bytes()
    }
}

/// What a queued request puts on the wire.
#[derive(Debug, Clone)]
pub enum Payload {
    Text(Command),
    Block(ChunkFrame),
}

impl Payload {
    pub fn to_wire(&self) -> Vec<u8> {
        match self {
            Payload::Text(cmd) => cmd.to_wire(),
            Payload::Block(frame) => frame.encode(),
        }
    }

    /// Short form for logs; blocks are never dumped
    pub fn describe(&self) -> String {
        match self {
            Payload::Text(cmd) => cmd.text(),
            Payload::Block(frame) => format!("block #{} ({} bytes)", frame.index, frame.length),
        }
    }
}

impl From<Command> for Payload {
    fn from(cmd: Command) -> Self {
        Payload::Text(cmd)
    }
}

impl From<ChunkFrame> for Payload {
    fn from(frame: ChunkFrame) -> Self {
        Payload::Block(frame)
    }
}

/// Maps a local file name to the on-device spool path, e.g.
/// `models/part.gcode` -> `0:/user/part.gx`. A name with no usable stem
/// spools as `DEFAULT_JOB_NAME`.
pub fn device_path(name: &str) -> String {
    let name = name.strip_prefix(DEVICE_FILE_ROOT).unwrap_or(name);
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();

    let lower = base.to_ascii_lowercase();
    let stem = [".gcode", ".gco", CONTAINER_EXTENSION, ".g"]
        .iter()
        .find(|ext| lower.ends_with(*ext))
        .map(|ext| &base[..base.len() - ext.len()])
        .unwrap_or(base);
    let stem = if stem.is_empty() { DEFAULT_JOB_NAME } else { stem };

    format!("{}{}{}", DEVICE_FILE_ROOT, stem, CONTAINER_EXTENSION)
}
