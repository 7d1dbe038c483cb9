use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocSegError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Image decode error: {0}")]
    ImageDecode(String),

    #[error("Allocation failure: {0}")]
    Allocation(String),

    #[error("Algorithm failure: {0}")]
    Algorithm(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Generates factory methods for [`DocSegError`] variants that wrap a `String`.
macro_rules! error_constructors {
    ($(
        $(#[doc = $doc:expr])*
        $method:ident => $variant:ident
    ),* $(,)?) => {
        impl DocSegError {
            $(
                $(#[doc = $doc])*
                pub fn $method(msg: impl Into<String>) -> Self {
                    Self::$variant(msg.into())
                }
            )*
        }
    };
}

error_constructors! {
    /// Create an invalid-argument error (bad pointer, dimension or channel count).
    invalid_argument => InvalidArgument,
    /// Create an image decode error (missing or unreadable file).
    image_decode => ImageDecode,
    /// Create an allocation error.
    allocation => Allocation,
    /// Create an algorithm error.
    algorithm => Algorithm,
    /// Create a configuration error.
    config => ConfigError,
    /// Create a cancellation error.
    cancelled => Cancelled,
}

impl From<serde_json::Error> for DocSegError {
    fn from(e: serde_json::Error) -> Self {
        Self::ConfigError(e.to_string())
    }
}

impl From<serde_yml::Error> for DocSegError {
    fn from(e: serde_yml::Error) -> Self {
        Self::ConfigError(e.to_string())
    }
}

impl From<image::ImageError> for DocSegError {
    fn from(e: image::ImageError) -> Self {
        Self::ImageDecode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DocSegError>;
