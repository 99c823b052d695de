// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use thiserror::Error;

use crate::{image::StorageLocation, metadata::SchemaError};

#[derive(Error, Debug)]
#[allow(clippy::upper_case_acronyms)]
/// Failures of the underlying file libraries or the filesystem.
pub enum IOError {
    #[error(transparent)]
    /// Error derived from [`netcdf::Error`]
    Netcdf(#[from] netcdf::Error),

    #[error(transparent)]
    /// Error derived from [`fitsio::errors::Error`]
    Fitsio(#[from] fitsio::errors::Error),

    /// An error when converting a Rust string to a C string.
    #[error(transparent)]
    BadString(#[from] std::ffi::NulError),

    #[error(transparent)]
    Std(#[from] std::io::Error),
}

#[derive(Error, Debug)]
/// All the errors that can occur when handling images.
pub enum ImageError {
    #[error(transparent)]
    /// Metadata or a file's structure doesn't follow the schema.
    SchemaViolation(#[from] SchemaError),

    #[error(transparent)]
    IO(#[from] IOError),

    /// An accessor was called on a disk image without a live handle.
    #[error("image group {group:?} of {} is closed", path.display())]
    ClosedHandle { path: PathBuf, group: String },

    #[error("{axis} index {index} is out of range for an axis of length {len}")]
    IndexOutOfRange {
        axis: &'static str,
        index: usize,
        len: usize,
    },

    #[error("{operation} is not supported for {storage} images: {reason}")]
    UnsupportedOperation {
        operation: &'static str,
        storage: StorageLocation,
        reason: &'static str,
    },

    #[error("unsupported FITS convention {0:?}; available conventions are: casa")]
    UnsupportedConvention(String),
}

impl ImageError {
    /// Whether this error came from the file libraries or the filesystem.
    /// Disk images drop their handle after such errors.
    pub fn is_io(&self) -> bool {
        matches!(self, ImageError::IO(_))
    }
}

impl From<netcdf::Error> for ImageError {
    fn from(e: netcdf::Error) -> Self {
        ImageError::IO(e.into())
    }
}

impl From<fitsio::errors::Error> for ImageError {
    fn from(e: fitsio::errors::Error) -> Self {
        ImageError::IO(e.into())
    }
}

impl From<std::io::Error> for ImageError {
    fn from(e: std::io::Error) -> Self {
        ImageError::IO(e.into())
    }
}

impl From<std::ffi::NulError> for ImageError {
    fn from(e: std::ffi::NulError) -> Self {
        ImageError::IO(e.into())
    }
}
