//! Default artifact persistence on the local filesystem.

pub mod filesystem;
pub mod format;

pub use filesystem::FileStorage;
