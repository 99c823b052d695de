// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Useful constants, including the fixed naming convention of the EHT image
//! NetCDF4 format.

/// The value of the `format` metadata key for every image this crate writes.
pub const FORMAT_NAME: &str = "EHT Intensity Image NetCDF4 Format";
/// The version of the NetCDF4 layout (dimension, variable and attribute
/// names) written by this crate.
pub const FORMAT_VERSION: &str = "0.1.0";

/// Default group of the image data inside a NetCDF4 file.
pub const NC_DEFAULT_GROUP: &str = "image";

/// Dimension name of the horizontal (x) axis.
pub const NC_DIM_X: &str = "x";
/// Dimension name of the vertical (y) axis.
pub const NC_DIM_Y: &str = "y";
/// Dimension name of the polarisation axis.
pub const NC_DIM_POL: &str = "p";
/// Dimension name of the frequency axis.
pub const NC_DIM_FREQ: &str = "f";
/// Dimension name of the time axis.
pub const NC_DIM_TIME: &str = "t";

/// Intensity variable \[Jy/pixel\].
pub const NC_VAR_INTENSITY: &str = "intensity";
/// Pixel grid of the x axis \[radians\].
pub const NC_VAR_X: &str = "x";
/// Pixel grid of the y axis \[radians\].
pub const NC_VAR_Y: &str = "y";
/// Polarisation codes (strings).
pub const NC_VAR_POL: &str = "polarization";
/// Central frequencies \[Hz\].
pub const NC_VAR_FREQ: &str = "frequency";
/// Observation epochs \[MJD\].
pub const NC_VAR_TIME: &str = "time";

/// On-disk dimension order of the intensity variable, slowest varying first.
/// x varies fastest, which is the memory order of column-major writers.
pub const NC_INTENSITY_DIMS: [&str; 5] =
    [NC_DIM_TIME, NC_DIM_FREQ, NC_DIM_POL, NC_DIM_Y, NC_DIM_X];

/// Polarisation codes of a single-polarisation image.
pub const POL_SINGLE: [&str; 1] = ["I"];
/// Polarisation codes of a full-polarisation image.
pub const POL_FULL: [&str; 4] = ["I", "Q", "U", "V"];

/// FITS `STOKES` axis values for each polarisation code (AIPS memo 114).
pub const STOKES_CODES: [(&str, i64); 12] = [
    ("I", 1),
    ("Q", 2),
    ("U", 3),
    ("V", 4),
    ("RR", -1),
    ("LL", -2),
    ("RL", -3),
    ("LR", -4),
    ("XX", -5),
    ("YY", -6),
    ("XY", -7),
    ("YX", -8),
];

/// cfitsio status code for a keyword that isn't in the header.
pub(crate) const FITS_KEY_NO_EXIST: i32 = 202;
