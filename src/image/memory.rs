// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Images held entirely in memory.

use ndarray::{Array2, Array5, ArrayView2, ArrayView5, Axis};

use super::{
    convolve::{convolve_slices, Executor, KernelModel},
    EhtImage, ImageDims, ImageParams, PolSet, StorageLocation,
};
use crate::{
    context::{obs_metadata_values, ObsMetadata},
    grid,
    io::error::ImageError,
    metadata::{Metadata, SchemaError},
};

/// An image that owns its intensity array and companion vectors.
///
/// The intensity array has the shape `(nx, ny, np, nf, nt)` and the
/// `nx`..`nt` metadata keys always agree with it.
#[derive(Clone, Debug, PartialEq)]
pub struct MemoryImage {
    data: Array5<f64>,
    pol: Vec<String>,
    freq: Vec<f64>,
    mjd: Vec<f64>,
    metadata: Metadata,
}

fn check_len(argument: &str, expected: usize, received: usize) -> Result<(), SchemaError> {
    if expected == received {
        Ok(())
    } else {
        Err(SchemaError::BadArrayShape {
            argument: argument.to_string(),
            function: "MemoryImage::new".to_string(),
            expected: expected.to_string(),
            received: received.to_string(),
        })
    }
}

impl MemoryImage {
    /// Make an image from its parts. The axis lengths in `metadata` are
    /// replaced by those of `data`, and everything else is validated.
    ///
    /// # Errors
    ///
    /// A [`SchemaError`] if the vectors don't match the array's shape, the
    /// number of polarisations isn't 1 or 4, or the metadata are incomplete
    /// or invalid.
    pub fn new(
        data: Array5<f64>,
        pol: Vec<String>,
        freq: Vec<f64>,
        mjd: Vec<f64>,
        mut metadata: Metadata,
    ) -> Result<MemoryImage, SchemaError> {
        let dims = ImageDims::from_shape(data.dim());
        check_len("pol", dims.np, pol.len())?;
        check_len("freq", dims.nf, freq.len())?;
        check_len("mjd", dims.nt, mjd.len())?;
        dims.write_to(&mut metadata)?;
        metadata.validate_complete()?;
        Ok(Self {
            data,
            pol,
            freq,
            mjd,
            metadata,
        })
    }

    /// A blank (all zero) image.
    pub fn blank(params: &ImageParams) -> Result<MemoryImage, SchemaError> {
        let metadata = params.to_metadata()?;
        let dims = params.dims();
        Ok(Self {
            data: Array5::zeros(dims.shape()),
            pol: params.pol.codes(),
            freq: params.freq.clone(),
            mjd: params.mjd.clone(),
            metadata,
        })
    }

    /// Replace the intensity array. The new array must have the same shape.
    pub fn with_data(self, data: Array5<f64>) -> Result<MemoryImage, SchemaError> {
        if data.dim() != self.data.dim() {
            return Err(SchemaError::BadArrayShape {
                argument: "data".to_string(),
                function: "MemoryImage::with_data".to_string(),
                expected: format!("{:?}", self.data.dim()),
                received: format!("{:?}", data.dim()),
            });
        }
        Ok(Self { data, ..self })
    }

    pub fn data_view(&self) -> ArrayView5<f64> {
        self.data.view()
    }

    /// A view of the `(x, y)` slice at the given indices.
    pub fn slice_view(
        &self,
        pol: usize,
        freq: usize,
        time: usize,
    ) -> Result<ArrayView2<f64>, ImageError> {
        self.image_dims().check_slice(pol, freq, time)?;
        Ok(self
            .data
            .index_axis(Axis(4), time)
            .index_axis_move(Axis(3), freq)
            .index_axis_move(Axis(2), pol))
    }

    pub fn pol_codes(&self) -> &[String] {
        &self.pol
    }

    pub fn frequencies(&self) -> &[f64] {
        &self.freq
    }

    pub fn epochs(&self) -> &[f64] {
        &self.mjd
    }

    pub fn metadata_ref(&self) -> &Metadata {
        &self.metadata
    }

    pub fn image_dims(&self) -> ImageDims {
        ImageDims::from_shape(self.data.dim())
    }

    pub fn pol_set(&self) -> Result<PolSet, SchemaError> {
        PolSet::from_len(self.pol.len())
    }

    /// Convolve every `(x, y)` slice with `kernel`, in place.
    pub fn convolve_in_place<K: KernelModel>(
        &mut self,
        kernel: &K,
        executor: Executor,
    ) -> Result<(), ImageError> {
        let uv = grid::uv_grid(&self.metadata, false)?;
        convolve_slices(&mut self.data, &uv, kernel, executor);
        Ok(())
    }

    /// A copy of this image convolved with `kernel`.
    pub fn convolved<K: KernelModel>(
        &self,
        kernel: &K,
        executor: Executor,
    ) -> Result<MemoryImage, ImageError> {
        let mut image = self.clone();
        image.convolve_in_place(kernel, executor)?;
        Ok(image)
    }
}

impl EhtImage for MemoryImage {
    fn storage_location(&self) -> StorageLocation {
        StorageLocation::MemoryBased
    }

    fn is_open(&self) -> bool {
        true
    }

    fn is_writable(&self) -> bool {
        true
    }

    fn dims(&mut self) -> Result<ImageDims, ImageError> {
        Ok(self.image_dims())
    }

    fn data(&mut self) -> Result<Array5<f64>, ImageError> {
        Ok(self.data.clone())
    }

    fn slice(&mut self, pol: usize, freq: usize, time: usize) -> Result<Array2<f64>, ImageError> {
        Ok(self.slice_view(pol, freq, time)?.to_owned())
    }

    fn pol(&mut self) -> Result<Vec<String>, ImageError> {
        Ok(self.pol.clone())
    }

    fn freq(&mut self) -> Result<Vec<f64>, ImageError> {
        Ok(self.freq.clone())
    }

    fn mjd(&mut self) -> Result<Vec<f64>, ImageError> {
        Ok(self.mjd.clone())
    }

    fn metadata(&mut self) -> Result<Metadata, ImageError> {
        Ok(self.metadata.clone())
    }

    fn copy_metadata(&mut self, obs: &dyn ObsMetadata) -> Result<(), ImageError> {
        // Validate everything before changing anything.
        let mut metadata = self.metadata.clone();
        for (key, value) in obs_metadata_values(obs) {
            metadata.set(key, value)?;
        }
        self.metadata = metadata;
        Ok(())
    }

    fn to_memory(&mut self) -> Result<MemoryImage, ImageError> {
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::prelude::*;

    use super::*;
    use crate::{
        context::{ObsContext, RADec},
        metadata::{default_metadata, MetaKey},
        units::AngularUnit,
    };

    #[test]
    fn test_new_overwrites_dims() {
        let mut metadata = default_metadata();
        metadata.set(MetaKey::Nx, 100_usize).unwrap();
        let image = MemoryImage::new(
            Array5::zeros((3, 2, 1, 2, 1)),
            vec!["I".to_string()],
            vec![86e9, 230e9],
            vec![0.0],
            metadata,
        )
        .unwrap();
        let metadata = image.metadata_ref();
        assert_eq!(metadata.int(MetaKey::Nx).unwrap(), 3);
        assert_eq!(metadata.int(MetaKey::Ny).unwrap(), 2);
        assert_eq!(metadata.int(MetaKey::Nf).unwrap(), 2);
    }

    #[test]
    fn test_new_rejects_mismatches() {
        let result = MemoryImage::new(
            Array5::zeros((3, 3, 1, 1, 1)),
            vec!["I".to_string()],
            vec![86e9, 230e9],
            vec![0.0],
            default_metadata(),
        );
        assert!(matches!(
            result,
            Err(SchemaError::BadArrayShape { argument, .. }) if argument == "freq"
        ));

        let pol: Vec<String> = ["I", "Q"].iter().map(|s| s.to_string()).collect();
        let result = MemoryImage::new(
            Array5::zeros((3, 3, 2, 1, 1)),
            pol,
            vec![1.0],
            vec![0.0],
            default_metadata(),
        );
        assert!(matches!(result, Err(SchemaError::BadPolarisationCount(2))));

        let image = MemoryImage::blank(&ImageParams::new(4, 1.0, AngularUnit::Radian)).unwrap();
        assert!(image.with_data(Array5::zeros((4, 4, 1, 1, 2))).is_err());
    }

    #[test]
    fn test_slice_view() {
        let params = ImageParams {
            pol: PolSet::Full,
            freq: vec![1.0, 2.0],
            ..ImageParams::new(3, 1.0, AngularUnit::Radian)
        };
        let data = Array5::from_shape_fn((3, 3, 4, 2, 1), |(x, y, p, f, _)| {
            (x + 3 * y + 9 * p + 36 * f) as f64
        });
        let mut image = MemoryImage::blank(&params).unwrap().with_data(data).unwrap();
        let expected = image.slice_view(2, 1, 0).unwrap().to_owned();
        assert_eq!(expected.dim(), (3, 3));
        assert_eq!(expected[[1, 2]], (1 + 6 + 18 + 36) as f64);
        assert_eq!(image.slice(2, 1, 0).unwrap(), expected);
        assert!(matches!(
            image.slice(4, 0, 0),
            Err(ImageError::IndexOutOfRange {
                axis: "polarisation",
                ..
            })
        ));
    }

    #[test]
    fn test_copy_metadata_is_atomic() {
        let mut image = MemoryImage::blank(&ImageParams::new(2, 1.0, AngularUnit::Radian)).unwrap();
        let obs = ObsContext {
            source: "3C 279".to_string(),
            instrument: "EHT".to_string(),
            observer: "me".to_string(),
            coordsys: "galactic".to_string(),
            equinox: -1.0,
            phase_centre: RADec::default(),
        };
        // "galactic" is not a supported coordinate system.
        assert!(image.copy_metadata(&obs).is_err());
        let unchanged = ImageParams::new(2, 1.0, AngularUnit::Radian).to_metadata().unwrap();
        assert_eq!(image.metadata_ref(), &unchanged);
    }

    #[test]
    fn test_to_memory_and_storage() {
        let mut image = MemoryImage::blank(&ImageParams::new(2, 1.0, AngularUnit::Radian)).unwrap();
        assert_eq!(image.storage_location(), StorageLocation::MemoryBased);
        assert_eq!(image.to_memory().unwrap(), image);
        assert_eq!(image.pol_set().unwrap(), PolSet::Single);
        assert_eq!(image.epochs(), &[0.0]);
        assert_eq!(image.frequencies(), &[1.0]);
        assert_eq!(image.pol_codes(), &["I".to_string()]);
    }
}
