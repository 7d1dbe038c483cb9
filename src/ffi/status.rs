use std::fmt;

use crate::error::DocSegError;

/// Result code returned by every exported function.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Operation succeeded
    Success = 0,
    /// Null pointer, negative or zero dimension, wrong channel count
    InvalidArgument = -1,
    /// File missing or not a decodable image
    ImageDecodeFailure = -2,
    /// Buffer allocation failed
    AllocationFailure = -3,
    /// An internal step produced an unusable result
    AlgorithmFailure = -4,
    /// Batch work was cancelled before it started
    Cancelled = -5,
    /// Anything else, including caught panics
    Unknown = -99,
}

impl Status {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            -1 => Some(Self::InvalidArgument),
            -2 => Some(Self::ImageDecodeFailure),
            -3 => Some(Self::AllocationFailure),
            -4 => Some(Self::AlgorithmFailure),
            -5 => Some(Self::Cancelled),
            -99 => Some(Self::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::InvalidArgument => "invalid argument",
            Self::ImageDecodeFailure => "image decode failure",
            Self::AllocationFailure => "allocation failure",
            Self::AlgorithmFailure => "algorithm failure",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown error",
        };
        write!(f, "{s}")
    }
}

impl DocSegError {
    /// The ABI status code for this error.
    pub fn status(&self) -> Status {
        match self {
            DocSegError::InvalidArgument(_) | DocSegError::ConfigError(_) => {
                Status::InvalidArgument
            }
            DocSegError::ImageDecode(_) => Status::ImageDecodeFailure,
            DocSegError::Allocation(_) => Status::AllocationFailure,
            DocSegError::Algorithm(_) => Status::AlgorithmFailure,
            DocSegError::Cancelled(_) => Status::Cancelled,
            DocSegError::IoError(_) => Status::Unknown,
        }
    }
}
