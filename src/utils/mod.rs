pub mod buffer;
pub mod io;
