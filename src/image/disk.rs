// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Images that live in a group of a NetCDF4 file.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use log::{debug, trace, warn};
use ndarray::{Array2, Array5, ArrayView2, ArrayView5};
use netcdf::{Group, GroupMut};

use super::{EhtImage, ImageDims, ImageParams, MemoryImage, StorageLocation};
use crate::{
    constants::{NC_DEFAULT_GROUP, NC_VAR_FREQ, NC_VAR_TIME},
    context::{obs_metadata_values, ObsMetadata},
    io::{
        error::ImageError,
        netcdf::{
            check_group, check_metadata_dims, image_group, image_group_mut, read_data, read_dims,
            read_metadata, read_pol, read_slice, read_vector, save_netcdf, write_contents,
            write_data, write_metadata, write_pol, write_slice, write_vector,
        },
    },
    metadata::{Metadata, SchemaError},
};

/// How a NetCDF4 file is opened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum NcMode {
    /// Read-only. The file and a complete image group must exist.
    #[default]
    Read,
    /// Writable. The file and a complete image group must exist.
    Append,
    /// Writable. Creates the file if needed and a new, empty image group.
    Create,
}

/// Where and how an image is stored in a NetCDF4 file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NcOptions {
    /// The group holding the image.
    pub group: String,
    pub mode: NcMode,
    /// In [`NcMode::Create`], replace an existing file instead of adding a
    /// group to it.
    pub overwrite: bool,
}

impl Default for NcOptions {
    fn default() -> Self {
        Self {
            group: NC_DEFAULT_GROUP.to_string(),
            mode: NcMode::Read,
            overwrite: false,
        }
    }
}

enum NcHandle {
    Read(netcdf::File),
    Write(netcdf::FileMut),
}

impl NcHandle {
    fn file(&self) -> &netcdf::File {
        match self {
            NcHandle::Read(file) => file,
            NcHandle::Write(file) => file,
        }
    }

    /// Close the file, reporting a failed final flush.
    fn close(self) -> Result<(), ImageError> {
        match self {
            NcHandle::Read(file) => file.close()?,
            NcHandle::Write(file) => file.close()?,
        }
        Ok(())
    }
}

impl fmt::Debug for NcHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NcHandle::Read(_) => write!(f, "NcHandle::Read"),
            NcHandle::Write(_) => write!(f, "NcHandle::Write"),
        }
    }
}

/// An image whose data stay in a NetCDF4 group. Every accessor reads from
/// (or writes to) the file through a handle, so the image must be opened
/// first. At most one handle is live at a time; the file is flushed when the
/// handle is closed.
#[derive(Debug)]
pub struct DiskImage {
    filename: PathBuf,
    group: String,
    mode: NcMode,
    handle: Option<NcHandle>,
}

impl DiskImage {
    /// A closed image referring to `group` of `filename`. Nothing is read
    /// until [`DiskImage::open`] is called.
    pub fn new<P: AsRef<Path>>(filename: P, group: &str) -> DiskImage {
        Self {
            filename: filename.as_ref().to_path_buf(),
            group: group.to_string(),
            mode: NcMode::Read,
            handle: None,
        }
    }

    /// Write a blank (all zero) image made from `params` into a new group and
    /// return it, open read-only. `options.mode` is ignored.
    pub fn create<P: AsRef<Path>>(
        filename: P,
        params: &ImageParams,
        options: &NcOptions,
    ) -> Result<DiskImage, ImageError> {
        let mut blank = MemoryImage::blank(params)?;
        let options = NcOptions {
            mode: NcMode::Create,
            ..options.clone()
        };
        save_netcdf(&mut blank, filename, &options)
    }

    pub fn filename(&self) -> &Path {
        &self.filename
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// The mode of the live handle, or of the last one.
    pub fn mode(&self) -> NcMode {
        self.mode
    }

    /// Open the image. An open image is closed first.
    pub fn open(&mut self, mode: NcMode) -> Result<(), ImageError> {
        self.open_with(mode, false)
    }

    /// Open the image. With [`NcMode::Create`] and `overwrite`, an existing
    /// file is replaced; without `overwrite`, the group is added to it and
    /// must not exist yet.
    ///
    /// # Errors
    ///
    /// A missing file or any failure of the NetCDF library is an I/O error.
    /// A missing or incomplete group (in `Read` and `Append` mode), or an
    /// existing group (in `Create` mode) is a schema violation. The image is
    /// left closed on error, including when closing the previous handle
    /// fails.
    pub fn open_with(&mut self, mode: NcMode, overwrite: bool) -> Result<(), ImageError> {
        if let Some(handle) = self.handle.take() {
            debug!(
                "closing group {:?} of {} before reopening",
                self.group,
                self.filename.display()
            );
            handle.close()?;
        }

        let handle = match mode {
            NcMode::Read => {
                let file = netcdf::open(&self.filename)?;
                check_group(&image_group(&file, &self.filename, &self.group)?)?;
                NcHandle::Read(file)
            }
            NcMode::Append => {
                let file = netcdf::append(&self.filename)?;
                check_group(&image_group(&file, &self.filename, &self.group)?)?;
                NcHandle::Write(file)
            }
            NcMode::Create => {
                let mut file = if overwrite || !self.filename.exists() {
                    trace!("creating {}", self.filename.display());
                    netcdf::create(&self.filename)?
                } else {
                    netcdf::append(&self.filename)?
                };
                if file.group(&self.group)?.is_some() {
                    return Err(SchemaError::GroupExists {
                        path: self.filename.clone(),
                        group: self.group.clone(),
                    }
                    .into());
                }
                trace!("adding group {:?}", self.group);
                file.add_group(&self.group)?;
                NcHandle::Write(file)
            }
        };

        debug!(
            "opened group {:?} of {} ({mode:?})",
            self.group,
            self.filename.display()
        );
        self.mode = mode;
        self.handle = Some(handle);
        Ok(())
    }

    /// Close the image, flushing anything written. The image is closed
    /// afterwards even if flushing fails.
    pub fn close(&mut self) -> Result<(), ImageError> {
        match self.handle.take() {
            Some(handle) => {
                handle.close()?;
                debug!("closed group {:?} of {}", self.group, self.filename.display());
                Ok(())
            }
            None => Err(self.closed_error()),
        }
    }

    /// Copy the image into memory. The disk image stays open.
    pub fn load(&mut self) -> Result<MemoryImage, ImageError> {
        self.to_memory()
    }

    fn closed_error(&self) -> ImageError {
        ImageError::ClosedHandle {
            path: self.filename.clone(),
            group: self.group.clone(),
        }
    }

    /// Drop the handle if `result` is an I/O error.
    fn guard<T>(&mut self, result: Result<T, ImageError>) -> Result<T, ImageError> {
        if let Err(e) = &result {
            if e.is_io() && self.handle.take().is_some() {
                warn!(
                    "closed group {:?} of {} after an I/O error: {e}",
                    self.group,
                    self.filename.display()
                );
            }
        }
        result
    }

    fn with_group<T, F>(&mut self, f: F) -> Result<T, ImageError>
    where
        F: FnOnce(&Group) -> Result<T, ImageError>,
    {
        let result = match &self.handle {
            Some(handle) => {
                image_group(handle.file(), &self.filename, &self.group).and_then(|group| f(&group))
            }
            None => return Err(self.closed_error()),
        };
        self.guard(result)
    }

    fn with_group_mut<T, F>(&mut self, operation: &'static str, f: F) -> Result<T, ImageError>
    where
        F: FnOnce(&mut GroupMut) -> Result<T, ImageError>,
    {
        let result = match &mut self.handle {
            Some(NcHandle::Write(file)) => image_group_mut(file, &self.filename, &self.group)
                .and_then(|mut group| f(&mut group)),
            Some(NcHandle::Read(_)) => {
                return Err(ImageError::UnsupportedOperation {
                    operation,
                    storage: StorageLocation::DiskBased,
                    reason: "the image is open read-only",
                })
            }
            None => {
                return Err(ImageError::ClosedHandle {
                    path: self.filename.clone(),
                    group: self.group.clone(),
                })
            }
        };
        self.guard(result)
    }

    pub(crate) fn write_contents(
        &mut self,
        data: ArrayView5<f64>,
        pol: &[String],
        freq: &[f64],
        mjd: &[f64],
        metadata: &Metadata,
    ) -> Result<(), ImageError> {
        self.with_group_mut("writing an image", |group| {
            write_contents(group, data, pol, freq, mjd, metadata)
        })
    }

    /// Overwrite the whole intensity array.
    pub fn set_data(&mut self, data: ArrayView5<f64>) -> Result<(), ImageError> {
        self.with_group_mut("writing intensities", |group| write_data(group, data))
    }

    /// Overwrite the `(x, y)` slice at the given indices.
    pub fn set_slice(
        &mut self,
        slice: ArrayView2<f64>,
        pol: usize,
        freq: usize,
        time: usize,
    ) -> Result<(), ImageError> {
        self.with_group_mut("writing intensities", |group| {
            write_slice(group, slice, pol, freq, time)
        })
    }

    pub fn set_pol(&mut self, pol: &[String]) -> Result<(), ImageError> {
        self.with_group_mut("writing polarisations", |group| write_pol(group, pol))
    }

    pub fn set_freq(&mut self, freq: &[f64]) -> Result<(), ImageError> {
        self.with_group_mut("writing frequencies", |group| {
            write_vector(group, NC_VAR_FREQ, freq)
        })
    }

    pub fn set_mjd(&mut self, mjd: &[f64]) -> Result<(), ImageError> {
        self.with_group_mut("writing epochs", |group| write_vector(group, NC_VAR_TIME, mjd))
    }
}

impl EhtImage for DiskImage {
    fn storage_location(&self) -> StorageLocation {
        StorageLocation::DiskBased
    }

    fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    fn is_writable(&self) -> bool {
        matches!(self.handle, Some(NcHandle::Write(_)))
    }

    fn dims(&mut self) -> Result<ImageDims, ImageError> {
        self.with_group(read_dims)
    }

    fn data(&mut self) -> Result<Array5<f64>, ImageError> {
        self.with_group(|group| read_data(group, &read_dims(group)?))
    }

    fn slice(&mut self, pol: usize, freq: usize, time: usize) -> Result<Array2<f64>, ImageError> {
        self.with_group(|group| read_slice(group, &read_dims(group)?, pol, freq, time))
    }

    fn pol(&mut self) -> Result<Vec<String>, ImageError> {
        self.with_group(read_pol)
    }

    fn freq(&mut self) -> Result<Vec<f64>, ImageError> {
        self.with_group(|group| read_vector(group, NC_VAR_FREQ))
    }

    fn mjd(&mut self) -> Result<Vec<f64>, ImageError> {
        self.with_group(|group| read_vector(group, NC_VAR_TIME))
    }

    fn metadata(&mut self) -> Result<Metadata, ImageError> {
        self.with_group(|group| {
            let metadata = read_metadata(group)?;
            check_metadata_dims(&metadata, &read_dims(group)?)?;
            Ok(metadata)
        })
    }

    fn copy_metadata(&mut self, obs: &dyn ObsMetadata) -> Result<(), ImageError> {
        self.with_group_mut("copying metadata", |group| {
            let mut metadata = read_metadata(group)?;
            for (key, value) in obs_metadata_values(obs) {
                metadata.set(key, value)?;
            }
            write_metadata(group, &metadata)
        })
    }
}

#[cfg(test)]
mod tests {
    use ndarray::prelude::*;
    use tempfile::{tempdir, TempDir};

    use super::*;
    use crate::{
        context::{ObsContext, RADec},
        image::PolSet,
        io::{error::IOError, netcdf::load_image},
        metadata::MetaKey,
        units::AngularUnit,
    };

    fn saved_image(dir: &TempDir) -> (MemoryImage, DiskImage) {
        let params = ImageParams::new(4, 1.0, AngularUnit::Microarcsecond);
        let data = Array5::from_shape_fn((4, 4, 1, 1, 1), |(x, y, ..)| (x * 4 + y) as f64);
        let mut image = MemoryImage::blank(&params).unwrap().with_data(data).unwrap();
        let options = NcOptions {
            mode: NcMode::Create,
            ..Default::default()
        };
        let disk = save_netcdf(&mut image, dir.path().join("image.nc"), &options).unwrap();
        (image, disk)
    }

    #[test]
    fn test_round_trip() {
        let dir = tempdir().unwrap();
        let (image, mut disk) = saved_image(&dir);
        disk.close().unwrap();

        let mut loaded = load_image(disk.filename(), &NcOptions::default()).unwrap();
        assert_eq!(loaded.storage_location(), StorageLocation::DiskBased);
        let memory = loaded.load().unwrap();
        assert_eq!(memory, image);
        assert!(loaded.is_open());
    }

    #[test]
    fn test_closed_accessors() {
        let dir = tempdir().unwrap();
        let (_, mut disk) = saved_image(&dir);
        disk.close().unwrap();
        assert!(!disk.is_open());
        assert!(matches!(disk.data(), Err(ImageError::ClosedHandle { .. })));
        assert!(matches!(disk.metadata(), Err(ImageError::ClosedHandle { .. })));
        assert!(matches!(disk.slice(0, 0, 0), Err(ImageError::ClosedHandle { .. })));
        assert!(matches!(
            disk.set_freq(&[1.0]),
            Err(ImageError::ClosedHandle { .. })
        ));
        assert!(matches!(disk.close(), Err(ImageError::ClosedHandle { .. })));
    }

    #[test]
    fn test_double_open() {
        let dir = tempdir().unwrap();
        let (_, mut disk) = saved_image(&dir);
        disk.open(NcMode::Read).unwrap();
        disk.open(NcMode::Append).unwrap();
        assert!(disk.is_open());
        assert!(disk.is_writable());
        assert_eq!(disk.mode(), NcMode::Append);
        disk.close().unwrap();
        assert!(!disk.is_open());
        // Only one handle existed.
        assert!(disk.close().is_err());
    }

    #[test]
    fn test_close_flushes_writes() {
        let dir = tempdir().unwrap();
        let (_, mut disk) = saved_image(&dir);
        disk.open(NcMode::Append).unwrap();
        disk.set_mjd(&[59_000.5]).unwrap();
        disk.close().unwrap();

        let mut reread = load_image(disk.filename(), &NcOptions::default()).unwrap();
        assert_eq!(reread.mjd().unwrap(), vec![59_000.5]);
        reread.close().unwrap();
    }

    #[test]
    fn test_io_error_closes() {
        let dir = tempdir().unwrap();
        let (_, mut disk) = saved_image(&dir);
        assert!(disk.is_open());

        // Schema errors leave the handle alone.
        let result: Result<(), _> = disk.with_group(|group| {
            Err(SchemaError::MissingVariable {
                group: group.name(),
                name: "beam".to_string(),
            }
            .into())
        });
        assert!(matches!(result, Err(ImageError::SchemaViolation(_))));
        assert!(disk.is_open());

        let result: Result<(), _> = disk.with_group(|_| {
            Err(IOError::from(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "truncated variable",
            ))
            .into())
        });
        assert!(result.unwrap_err().is_io());
        assert!(!disk.is_open());
        assert!(matches!(disk.data(), Err(ImageError::ClosedHandle { .. })));
        assert!(matches!(disk.pol(), Err(ImageError::ClosedHandle { .. })));
        assert!(matches!(disk.close(), Err(ImageError::ClosedHandle { .. })));

        // The same happens through a writable handle.
        disk.open(NcMode::Append).unwrap();
        let result: Result<(), _> = disk.with_group_mut("writing", |_| {
            Err(IOError::from(std::io::Error::from(std::io::ErrorKind::WriteZero)).into())
        });
        assert!(result.unwrap_err().is_io());
        assert!(!disk.is_open() && !disk.is_writable());

        // A later open works as usual.
        disk.open(NcMode::Read).unwrap();
        assert_eq!(disk.dims().unwrap().shape(), (4, 4, 1, 1, 1));
    }

    #[test]
    fn test_create_existing_group() {
        let dir = tempdir().unwrap();
        let (_, mut disk) = saved_image(&dir);
        disk.close().unwrap();

        let mut other = DiskImage::new(disk.filename(), "image");
        assert!(matches!(
            other.open(NcMode::Create),
            Err(ImageError::SchemaViolation(SchemaError::GroupExists { .. }))
        ));
        assert!(!other.is_open());

        // A second group in the same file is fine.
        let mut second = DiskImage::new(disk.filename(), "second");
        second.open(NcMode::Create).unwrap();
        second.close().unwrap();

        // Overwriting replaces the whole file.
        other.open_with(NcMode::Create, true).unwrap();
        other.close().unwrap();
        assert!(matches!(
            second.open(NcMode::Read),
            Err(ImageError::SchemaViolation(SchemaError::MissingGroup { .. }))
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let mut disk = DiskImage::new(dir.path().join("nothing.nc"), "image");
        let result = disk.open(NcMode::Read);
        assert!(result.as_ref().unwrap_err().is_io());
        assert!(!disk.is_open());
    }

    #[test]
    fn test_read_only_writes() {
        let dir = tempdir().unwrap();
        let (_, mut disk) = saved_image(&dir);
        let result = disk.set_slice(Array2::zeros((4, 4)).view(), 0, 0, 0);
        assert!(matches!(result, Err(ImageError::UnsupportedOperation { .. })));
        // The handle survives.
        assert!(disk.is_open());
    }

    #[test]
    fn test_append_writes() {
        let dir = tempdir().unwrap();
        let (image, mut disk) = saved_image(&dir);
        disk.open(NcMode::Append).unwrap();
        disk.set_slice(Array2::from_elem((4, 4), 7.0).view(), 0, 0, 0).unwrap();
        disk.set_freq(&[230e9]).unwrap();
        assert!(matches!(
            disk.set_slice(Array2::zeros((4, 4)).view(), 0, 1, 0),
            Err(ImageError::IndexOutOfRange { axis: "frequency", .. })
        ));
        assert!(matches!(
            disk.set_mjd(&[1.0, 2.0]),
            Err(ImageError::SchemaViolation(SchemaError::BadArrayShape { .. }))
        ));
        disk.set_data(image.data_view().mapv(|v| -v).view()).unwrap();

        // Reopening flushes.
        disk.open(NcMode::Read).unwrap();
        assert_eq!(disk.freq().unwrap(), vec![230e9]);
        assert_eq!(disk.slice(0, 0, 0).unwrap()[[3, 2]], -14.0);
    }

    #[test]
    fn test_copy_metadata() {
        let dir = tempdir().unwrap();
        let (_, mut disk) = saved_image(&dir);
        let obs = ObsContext {
            source: "M87".to_string(),
            instrument: "EHT".to_string(),
            observer: "EHT Collaboration".to_string(),
            coordsys: "fk5".to_string(),
            equinox: 2000.0,
            phase_centre: RADec::from_degrees(187.7059308, 12.3911232),
        };
        assert!(disk.copy_metadata(&obs).is_err());

        disk.open(NcMode::Append).unwrap();
        let before = disk.metadata().unwrap();
        disk.copy_metadata(&obs).unwrap();
        let after = disk.metadata().unwrap();
        assert_eq!(after.str(MetaKey::Source).unwrap(), "M87");
        assert_eq!(after.str(MetaKey::Coordsys).unwrap(), "fk5");
        assert_eq!(after.float(MetaKey::Equinox).unwrap(), 2000.0);
        for key in [MetaKey::Nx, MetaKey::Dx, MetaKey::Ixref, MetaKey::Pulsetype] {
            assert_eq!(after.get(key), before.get(key));
        }
    }

    #[test]
    fn test_create_blank() {
        let dir = tempdir().unwrap();
        let params = ImageParams {
            pol: PolSet::Full,
            mjd: vec![59_000.0, 59_001.0],
            ..ImageParams::new(8, 2.0, AngularUnit::Microarcsecond)
        };
        let path = dir.path().join("blank.nc");
        let mut disk = DiskImage::create(&path, &params, &NcOptions::default()).unwrap();
        assert!(disk.is_open() && !disk.is_writable());
        assert_eq!(disk.dims().unwrap().shape(), (8, 8, 4, 1, 2));
        assert!(disk.data().unwrap().iter().all(|&v| v == 0.0));
        assert_eq!(disk.pol().unwrap(), vec!["I", "Q", "U", "V"]);
        assert_eq!(disk.mjd().unwrap(), vec![59_000.0, 59_001.0]);
        let (x, _) = disk.xy_grid(AngularUnit::Microarcsecond).unwrap();
        assert!((x[0] - 7.0).abs() < 1e-9);

        // Creating again in the same group fails.
        assert!(DiskImage::create(&path, &params, &NcOptions::default()).is_err());
    }
}
