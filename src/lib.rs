pub mod config;
pub mod error;
pub mod ffi;
pub mod pipeline;
pub mod preprocess;
pub mod raster;
pub mod recognize;
pub mod segment;
