// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Reading and writing images. NetCDF4 is the native format; FITS holds
//! single frequency and epoch snapshots.

pub mod error;
pub mod fits;
pub mod netcdf;

pub use error::{IOError, ImageError};
pub use fits::{load_fits, load_fits_hdu, save_fits, FitsConvention};
pub use self::netcdf::{load_image, save_netcdf};
