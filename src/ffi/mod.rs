// C ABI: status codes, caller-owned buffers and per-thread diagnostics.

pub mod buffer;
pub mod exports;
pub mod last_error;
pub mod status;

pub use buffer::ModuleBuffer;
pub use exports::{ImageView, ScoredBoxC};
pub use status::Status;
