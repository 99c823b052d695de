// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Five-dimensional intensity images.
//!
//! An image is an intensity array indexed by `(x, y, polarisation,
//! frequency, time)` \[Jy/pixel\] together with the polarisation codes,
//! frequencies \[Hz\], epochs \[MJD\] and [`Metadata`] describing it. There
//! are exactly two representations:
//!
//! - [`MemoryImage`]: owns every buffer;
//! - [`DiskImage`]: proxies every access through a NetCDF4 handle with an
//!   explicit open/closed lifecycle.
//!
//! Both implement [`EhtImage`]; [`Image`] is the closed sum of the two.
//!
//! # Examples
//!
//! ```rust
//! use ehtimage::{AngularUnit, EhtImage, ImageParams, MemoryImage, PolSet};
//!
//! let params = ImageParams {
//!     pol: PolSet::Full,
//!     freq: vec![230e9, 345e9],
//!     ..ImageParams::new(64, 2.0, AngularUnit::Microarcsecond)
//! };
//! let mut image = MemoryImage::blank(&params).unwrap();
//! assert_eq!(image.data_view().dim(), (64, 64, 4, 2, 1));
//! assert!(image.is_open() && image.is_writable());
//! ```

pub mod convolve;
pub mod disk;
pub mod memory;

pub use convolve::{convolve, Executor, GaussianKernel, KernelModel, PointKernel};
pub use disk::{DiskImage, NcMode, NcOptions};
pub use memory::MemoryImage;

use std::fmt;

use ndarray::{Array1, Array2, Array5};

use crate::{
    constants::{POL_FULL, POL_SINGLE},
    context::ObsMetadata,
    grid::{self, UvGrid},
    io::error::ImageError,
    metadata::{default_metadata, MetaKey, Metadata, SchemaError},
    units::AngularUnit,
};

/// Where an image's data lives. Each image has exactly one storage location
/// for its whole life, and it decides which I/O path services accessors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageLocation {
    DiskBased,
    MemoryBased,
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageLocation::DiskBased => write!(f, "disk-based"),
            StorageLocation::MemoryBased => write!(f, "memory-based"),
        }
    }
}

/// The number of polarisations of an image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PolSet {
    /// Stokes I only.
    #[default]
    Single,
    /// Stokes I, Q, U and V.
    Full,
}

impl PolSet {
    pub fn codes(self) -> Vec<String> {
        match self {
            PolSet::Single => POL_SINGLE.iter().map(|s| s.to_string()).collect(),
            PolSet::Full => POL_FULL.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn len(self) -> usize {
        match self {
            PolSet::Single => 1,
            PolSet::Full => 4,
        }
    }

    pub fn from_len(np: usize) -> Result<PolSet, SchemaError> {
        match np {
            1 => Ok(PolSet::Single),
            4 => Ok(PolSet::Full),
            n => Err(SchemaError::BadPolarisationCount(n)),
        }
    }
}

/// The axis lengths of an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ImageDims {
    pub nx: usize,
    pub ny: usize,
    pub np: usize,
    pub nf: usize,
    pub nt: usize,
}

impl ImageDims {
    /// The shape of the intensity array, `(nx, ny, np, nf, nt)`.
    pub fn shape(&self) -> (usize, usize, usize, usize, usize) {
        (self.nx, self.ny, self.np, self.nf, self.nt)
    }

    pub fn from_shape((nx, ny, np, nf, nt): (usize, usize, usize, usize, usize)) -> Self {
        Self { nx, ny, np, nf, nt }
    }

    pub fn from_metadata(metadata: &Metadata) -> Result<Self, SchemaError> {
        Ok(Self {
            nx: metadata.count(MetaKey::Nx)?,
            ny: metadata.count(MetaKey::Ny)?,
            np: metadata.count(MetaKey::Np)?,
            nf: metadata.count(MetaKey::Nf)?,
            nt: metadata.count(MetaKey::Nt)?,
        })
    }

    /// Check that `(pol, freq, time)` addresses a slice of the image.
    pub fn check_slice(&self, pol: usize, freq: usize, time: usize) -> Result<(), ImageError> {
        for (axis, index, len) in [
            ("polarisation", pol, self.np),
            ("frequency", freq, self.nf),
            ("time", time, self.nt),
        ] {
            if index >= len {
                return Err(ImageError::IndexOutOfRange { axis, index, len });
            }
        }
        Ok(())
    }

    /// Record these dimensions in `metadata`.
    pub(crate) fn write_to(&self, metadata: &mut Metadata) -> Result<(), SchemaError> {
        PolSet::from_len(self.np)?;
        metadata.set(MetaKey::Nx, self.nx)?;
        metadata.set(MetaKey::Ny, self.ny)?;
        metadata.set(MetaKey::Np, self.np)?;
        metadata.set(MetaKey::Nf, self.nf)?;
        metadata.set(MetaKey::Nt, self.nt)?;
        Ok(())
    }
}

/// Parameters of a blank image.
///
/// `nx`, `dx` and `angunit` are required; use struct-update syntax with
/// [`ImageParams::new`] for the rest. The explicit parameters overwrite any
/// conflicting keys in `metadata`.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageParams {
    /// Number of pixels along the horizontal axis. Must be positive.
    pub nx: usize,
    /// Pixel size along the horizontal axis in `angunit`. Must be positive.
    pub dx: f64,
    /// Unit of `dx` and `dy`.
    pub angunit: AngularUnit,
    /// Number of pixels along the vertical axis. Defaults to `nx`.
    pub ny: usize,
    /// Pixel size along the vertical axis in `angunit`. Defaults to `dx`.
    pub dy: f64,
    /// 1-based reference pixel of the horizontal axis. `None` means the
    /// centre of the field of view, `(nx + 1) / 2`.
    pub ixref: Option<f64>,
    /// 1-based reference pixel of the vertical axis. `None` means
    /// `(ny + 1) / 2`.
    pub iyref: Option<f64>,
    pub pol: PolSet,
    /// Frequencies \[Hz\].
    pub freq: Vec<f64>,
    /// Epochs \[MJD\].
    pub mjd: Vec<f64>,
    /// Other metadata.
    pub metadata: Metadata,
}

impl ImageParams {
    pub fn new(nx: usize, dx: f64, angunit: AngularUnit) -> Self {
        Self {
            nx,
            dx,
            angunit,
            ny: nx,
            dy: dx,
            ixref: None,
            iyref: None,
            pol: PolSet::Single,
            freq: vec![1.0],
            mjd: vec![0.0],
            metadata: default_metadata(),
        }
    }

    pub fn dims(&self) -> ImageDims {
        ImageDims {
            nx: self.nx,
            ny: self.ny,
            np: self.pol.len(),
            nf: self.freq.len(),
            nt: self.mjd.len(),
        }
    }

    /// The complete, validated metadata of an image made with these
    /// parameters.
    pub fn to_metadata(&self) -> Result<Metadata, SchemaError> {
        let mut metadata = self.metadata.clone();
        self.dims().write_to(&mut metadata)?;
        metadata.set(MetaKey::Dx, self.angunit.to_radians(self.dx))?;
        metadata.set(MetaKey::Dy, self.angunit.to_radians(self.dy))?;
        let centre = |n: usize| (n as f64 + 1.0) / 2.0;
        metadata.set(MetaKey::Ixref, self.ixref.unwrap_or_else(|| centre(self.nx)))?;
        metadata.set(MetaKey::Iyref, self.iyref.unwrap_or_else(|| centre(self.ny)))?;
        metadata.set(MetaKey::Polrep, "stokes")?;
        metadata.validate_complete()?;
        Ok(metadata)
    }
}

/// The capabilities shared by every image representation.
///
/// Accessors take `&mut self` because a disk image drops its handle when an
/// I/O error occurs; for a [`MemoryImage`] they never fail and never
/// mutate.
pub trait EhtImage {
    /// The storage tag of this image.
    fn storage_location(&self) -> StorageLocation;

    /// Whether the data are accessible. Always true for memory images.
    fn is_open(&self) -> bool;

    /// Whether the data may be modified. Always true for memory images.
    fn is_writable(&self) -> bool;

    /// The default metadata for images of this kind.
    fn default_metadata(&self) -> Metadata {
        default_metadata()
    }

    fn dims(&mut self) -> Result<ImageDims, ImageError>;

    /// A copy of the whole intensity array.
    fn data(&mut self) -> Result<Array5<f64>, ImageError>;

    /// A copy of the `(x, y)` slice at the given polarisation, frequency and
    /// time indices.
    fn slice(&mut self, pol: usize, freq: usize, time: usize) -> Result<Array2<f64>, ImageError>;

    fn pol(&mut self) -> Result<Vec<String>, ImageError>;

    fn freq(&mut self) -> Result<Vec<f64>, ImageError>;

    fn mjd(&mut self) -> Result<Vec<f64>, ImageError>;

    fn metadata(&mut self) -> Result<Metadata, ImageError>;

    /// Overwrite the observation descriptors (source, instrument,
    /// observer, coordinate system, equinox and phase centre) with those of
    /// `obs`. No other key changes.
    fn copy_metadata(&mut self, obs: &dyn ObsMetadata) -> Result<(), ImageError>;

    /// Copy everything into a new [`MemoryImage`]. Disk images stay open.
    fn to_memory(&mut self) -> Result<MemoryImage, ImageError> {
        let data = self.data()?;
        let pol = self.pol()?;
        let freq = self.freq()?;
        let mjd = self.mjd()?;
        let metadata = self.metadata()?;
        Ok(MemoryImage::new(data, pol, freq, mjd, metadata)?)
    }

    /// The pixel grids of this image in `unit`. See [`grid::pixel_grid`].
    fn xy_grid(&mut self, unit: AngularUnit) -> Result<(Array1<f64>, Array1<f64>), ImageError> {
        Ok(grid::pixel_grid(&self.metadata()?, unit)?)
    }

    /// The u and v grids of this image. See [`grid::uv_grid`].
    fn uv_grid(&mut self, shift: bool) -> Result<UvGrid, ImageError> {
        Ok(grid::uv_grid(&self.metadata()?, shift)?)
    }
}

/// Either representation of an image.
#[derive(Debug)]
pub enum Image {
    Memory(MemoryImage),
    Disk(DiskImage),
}

impl From<MemoryImage> for Image {
    fn from(image: MemoryImage) -> Self {
        Image::Memory(image)
    }
}

impl From<DiskImage> for Image {
    fn from(image: DiskImage) -> Self {
        Image::Disk(image)
    }
}

impl Image {
    /// Convolve the image in place. Disk images must be loaded into memory
    /// first.
    pub fn convolve_in_place<K: KernelModel>(
        &mut self,
        kernel: &K,
        executor: Executor,
    ) -> Result<(), ImageError> {
        match self {
            Image::Memory(image) => image.convolve_in_place(kernel, executor),
            Image::Disk(_) => Err(ImageError::UnsupportedOperation {
                operation: "in-place convolution",
                storage: StorageLocation::DiskBased,
                reason: "load the image into memory first",
            }),
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $image:ident => $e:expr) => {
        match $self {
            Image::Memory($image) => $e,
            Image::Disk($image) => $e,
        }
    };
}

impl EhtImage for Image {
    fn storage_location(&self) -> StorageLocation {
        dispatch!(self, image => image.storage_location())
    }

    fn is_open(&self) -> bool {
        dispatch!(self, image => image.is_open())
    }

    fn is_writable(&self) -> bool {
        dispatch!(self, image => image.is_writable())
    }

    fn dims(&mut self) -> Result<ImageDims, ImageError> {
        dispatch!(self, image => image.dims())
    }

    fn data(&mut self) -> Result<Array5<f64>, ImageError> {
        dispatch!(self, image => image.data())
    }

    fn slice(&mut self, pol: usize, freq: usize, time: usize) -> Result<Array2<f64>, ImageError> {
        dispatch!(self, image => image.slice(pol, freq, time))
    }

    fn pol(&mut self) -> Result<Vec<String>, ImageError> {
        dispatch!(self, image => image.pol())
    }

    fn freq(&mut self) -> Result<Vec<f64>, ImageError> {
        dispatch!(self, image => image.freq())
    }

    fn mjd(&mut self) -> Result<Vec<f64>, ImageError> {
        dispatch!(self, image => image.mjd())
    }

    fn metadata(&mut self) -> Result<Metadata, ImageError> {
        dispatch!(self, image => image.metadata())
    }

    fn copy_metadata(&mut self, obs: &dyn ObsMetadata) -> Result<(), ImageError> {
        dispatch!(self, image => image.copy_metadata(obs))
    }

    fn to_memory(&mut self) -> Result<MemoryImage, ImageError> {
        dispatch!(self, image => image.to_memory())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ObsContext, RADec};

    #[test]
    fn test_blank_vector_lengths() {
        for (nx, ny, pol, nf, nt) in [
            (1, 1, PolSet::Single, 1, 1),
            (4, 3, PolSet::Full, 2, 5),
            (7, 9, PolSet::Single, 3, 2),
        ] {
            let params = ImageParams {
                ny,
                pol,
                freq: vec![230e9; nf],
                mjd: (0..nt).map(|t| 57_000.0 + t as f64).collect(),
                ..ImageParams::new(nx, 1.0, AngularUnit::Microarcsecond)
            };
            let mut image = Image::from(MemoryImage::blank(&params).unwrap());
            assert_eq!(image.pol().unwrap().len(), pol.len());
            assert_eq!(image.freq().unwrap().len(), nf);
            assert_eq!(image.mjd().unwrap().len(), nt);
            let dims = image.dims().unwrap();
            assert_eq!(dims.shape(), (nx, ny, pol.len(), nf, nt));
            assert_eq!(image.data().unwrap().dim(), dims.shape());
        }
    }

    #[test]
    fn test_params_metadata() {
        let params = ImageParams {
            ny: 6,
            dy: 3.0,
            ..ImageParams::new(4, 2.0, AngularUnit::Degree)
        };
        let metadata = params.to_metadata().unwrap();
        assert_eq!(metadata.int(MetaKey::Nx).unwrap(), 4);
        assert_eq!(metadata.int(MetaKey::Ny).unwrap(), 6);
        assert_eq!(metadata.float(MetaKey::Dx).unwrap(), 2.0_f64.to_radians());
        assert_eq!(metadata.float(MetaKey::Dy).unwrap(), 3.0_f64.to_radians());
        assert_eq!(metadata.float(MetaKey::Ixref).unwrap(), 2.5);
        assert_eq!(metadata.float(MetaKey::Iyref).unwrap(), 3.5);
    }

    #[test]
    fn test_bad_params() {
        let params = ImageParams::new(0, 1.0, AngularUnit::Radian);
        assert!(matches!(
            params.to_metadata(),
            Err(SchemaError::OutOfRange { .. })
        ));
        let params = ImageParams::new(4, -1.0, AngularUnit::Radian);
        assert!(params.to_metadata().is_err());
        let params = ImageParams {
            freq: vec![],
            ..ImageParams::new(4, 1.0, AngularUnit::Radian)
        };
        assert!(params.to_metadata().is_err());
    }

    #[test]
    fn test_pol_set() {
        assert_eq!(PolSet::Full.codes(), vec!["I", "Q", "U", "V"]);
        assert_eq!(PolSet::from_len(1).unwrap(), PolSet::Single);
        assert!(matches!(
            PolSet::from_len(2),
            Err(SchemaError::BadPolarisationCount(2))
        ));
    }

    #[test]
    fn test_check_slice() {
        let dims = ImageDims::from_shape((4, 4, 1, 2, 3));
        dims.check_slice(0, 1, 2).unwrap();
        assert!(matches!(
            dims.check_slice(0, 2, 0),
            Err(ImageError::IndexOutOfRange {
                axis: "frequency",
                index: 2,
                len: 2
            })
        ));
    }

    #[test]
    fn test_enum_copy_metadata() {
        let params = ImageParams::new(4, 1.0, AngularUnit::Microarcsecond);
        let mut image = Image::from(MemoryImage::blank(&params).unwrap());
        assert_eq!(image.storage_location(), StorageLocation::MemoryBased);
        let obs = ObsContext {
            source: "Sgr A*".to_string(),
            instrument: "EHT".to_string(),
            observer: "EHT Collaboration".to_string(),
            coordsys: "icrs".to_string(),
            equinox: -1.0,
            phase_centre: RADec::from_degrees(266.4168, -29.0078),
        };
        image.copy_metadata(&obs).unwrap();
        let metadata = image.metadata().unwrap();
        assert_eq!(metadata.str(MetaKey::Source).unwrap(), "Sgr A*");
        assert_eq!(metadata.float(MetaKey::Yref).unwrap(), (-29.0078_f64).to_radians());
        // Image geometry is untouched.
        assert_eq!(metadata.int(MetaKey::Nx).unwrap(), 4);
    }
}
