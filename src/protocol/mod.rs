pub mod command;
pub mod constants;
pub mod frame;

pub use command::*;
pub use constants::*;
pub use frame::{frames, ChunkFrame, Frames};
