// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Five-dimensional Event Horizon Telescope images: the metadata schema,
//! pixel and uv grids, in-memory and NetCDF4-backed images, and the NetCDF4
//! and FITS codecs.

pub mod constants;
pub mod context;
pub mod grid;
pub mod image;
pub mod io;
pub mod metadata;
pub mod units;

/// Information about how this crate was built, e.g. the git revision that
/// FITS headers are stamped with.
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

// Re-exports.
pub use context::{ObsContext, ObsMetadata, RADec};
pub use grid::UvGrid;
pub use image::{
    convolve, DiskImage, EhtImage, Executor, GaussianKernel, Image, ImageDims, ImageParams,
    KernelModel, MemoryImage, NcMode, NcOptions, PointKernel, PolSet, StorageLocation,
};
pub use io::{
    load_fits, load_image, save_fits, save_netcdf, FitsConvention, IOError, ImageError,
};
pub use metadata::{default_metadata, MetaKey, MetaValue, Metadata, SchemaError};
pub use units::AngularUnit;

pub use fitsio;
pub use hifitime;
pub use ndarray;
pub use netcdf;
pub use num_complex;
pub use rayon;

#[cfg(test)]
#[test]
fn hifitime_works_as_expected() {
    use hifitime::Epoch;

    let mjd = 57_849.0;
    let epoch = Epoch::from_mjd_utc(mjd);
    approx::assert_abs_diff_eq!(epoch.to_mjd_utc_days(), mjd, epsilon = 1e-9);
    let (year, month, day, hour, _, _, _) = epoch.to_gregorian_utc();
    assert_eq!((year, month, day, hour), (2017, 4, 6, 0));

    let epoch = Epoch::from_gregorian_str("2017-04-06T00:00:00").unwrap();
    approx::assert_abs_diff_eq!(epoch.to_mjd_utc_days(), mjd, epsilon = 1e-9);
}
