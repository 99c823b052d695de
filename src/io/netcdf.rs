// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Module for reading and writing images in the EHT NetCDF4 layout.
//!
//! An image occupies one group of a NetCDF4 file. The group holds the five
//! dimensions `x, y, p, f, t`, the variables `intensity` (`[t, f, p, y, x]`),
//! `x`, `y` (pixel grids in radians), `polarization`, `frequency` and `time`,
//! and one group attribute per metadata key.

use std::path::Path;

use log::{debug, trace, warn};
use ndarray::{Array2, Array5, ArrayView2, ArrayView5, ShapeBuilder};
use netcdf::{
    types::{FloatType, NcVariableType},
    AttributeValue, FileMut, Group, GroupMut, Variable,
};

use crate::{
    constants::{
        NC_DIM_FREQ, NC_DIM_POL, NC_DIM_TIME, NC_DIM_X, NC_DIM_Y, NC_INTENSITY_DIMS,
        NC_VAR_FREQ, NC_VAR_INTENSITY, NC_VAR_POL, NC_VAR_TIME, NC_VAR_X, NC_VAR_Y,
    },
    grid::pixel_grid,
    image::{DiskImage, EhtImage, ImageDims, NcMode, NcOptions, StorageLocation},
    io::error::ImageError,
    metadata::{MetaKey, MetaValue, Metadata, SchemaError},
    units::AngularUnit,
};

/// Every variable of an image group with its dimensions.
const NC_VARIABLES: [(&str, &[&str]); 6] = [
    (NC_VAR_INTENSITY, &NC_INTENSITY_DIMS),
    (NC_VAR_X, &[NC_DIM_X]),
    (NC_VAR_Y, &[NC_DIM_Y]),
    (NC_VAR_POL, &[NC_DIM_POL]),
    (NC_VAR_FREQ, &[NC_DIM_FREQ]),
    (NC_VAR_TIME, &[NC_DIM_TIME]),
];

fn dimension_lengths(dims: &ImageDims) -> [(&'static str, usize); 5] {
    [
        (NC_DIM_X, dims.nx),
        (NC_DIM_Y, dims.ny),
        (NC_DIM_POL, dims.np),
        (NC_DIM_FREQ, dims.nf),
        (NC_DIM_TIME, dims.nt),
    ]
}

fn bad_shape(argument: &str, function: &str, expected: String, received: usize) -> SchemaError {
    SchemaError::BadArrayShape {
        argument: argument.to_string(),
        function: function.to_string(),
        expected,
        received: received.to_string(),
    }
}

/// Get the image group `name` of an open file.
pub(crate) fn image_group<'f>(
    file: &'f netcdf::File,
    path: &Path,
    name: &str,
) -> Result<Group<'f>, ImageError> {
    file.group(name)?.ok_or_else(|| {
        SchemaError::MissingGroup {
            path: path.to_path_buf(),
            group: name.to_string(),
        }
        .into()
    })
}

/// Get the image group `name` of a file open for writing.
pub(crate) fn image_group_mut<'f>(
    file: &'f mut FileMut,
    path: &Path,
    name: &str,
) -> Result<GroupMut<'f>, ImageError> {
    file.group_mut(name)?.ok_or_else(|| {
        SchemaError::MissingGroup {
            path: path.to_path_buf(),
            group: name.to_string(),
        }
        .into()
    })
}

/// Create the five image dimensions in `group`. Dimensions that already
/// exist must have the right length.
pub fn define_dimensions(group: &mut GroupMut, dims: &ImageDims) -> Result<(), ImageError> {
    for (name, len) in dimension_lengths(dims) {
        let existing = group.dimension(name).map(|d| d.len());
        match existing {
            Some(received) if received == len => (),
            Some(received) => {
                return Err(SchemaError::DimensionMismatch {
                    dimension: name.to_string(),
                    expected: len,
                    received,
                }
                .into())
            }
            None => {
                trace!("adding dimension {name} of length {len}");
                group.add_dimension(name, len)?;
            }
        }
    }
    Ok(())
}

/// Check the dimensions and type of an existing image variable. The
/// polarisation codes are strings; every other variable holds f64 values.
fn check_variable(var: &Variable, name: &str, expected: &[&str]) -> Result<(), SchemaError> {
    let received: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
    if !received.iter().map(String::as_str).eq(expected.iter().copied()) {
        return Err(SchemaError::VariableLayout {
            name: name.to_string(),
            expected: expected.iter().map(|s| s.to_string()).collect(),
            received,
        });
    }

    let vartype = var.vartype();
    let (matches, expected_type) = if name == NC_VAR_POL {
        (matches!(vartype, NcVariableType::String), "string")
    } else {
        (matches!(vartype, NcVariableType::Float(FloatType::F64)), "f64")
    };
    if matches {
        Ok(())
    } else {
        Err(SchemaError::VariableType {
            name: name.to_string(),
            expected: expected_type,
            received: format!("{vartype:?}"),
        })
    }
}

/// Create the six image variables in `group`. The dimensions must have been
/// defined already. Variables that already exist must have the right
/// dimensions and type.
pub fn define_variables(group: &mut GroupMut) -> Result<(), ImageError> {
    for (name, dims) in NC_VARIABLES {
        if let Some(var) = group.variable(name) {
            check_variable(&var, name, dims)?;
            continue;
        }
        trace!("adding variable {name} {dims:?}");
        if name == NC_VAR_POL {
            group.add_string_variable(name, dims)?;
        } else {
            group.add_variable::<f64>(name, dims)?;
        }
    }
    Ok(())
}

/// Check that a group holds a complete image, and get its dimensions.
pub fn check_group(group: &Group) -> Result<ImageDims, ImageError> {
    let dims = read_dims(group)?;
    for (name, expected) in NC_VARIABLES {
        let var = variable(group, name)?;
        check_variable(&var, name, expected)?;
    }
    Ok(dims)
}

/// Read the lengths of the five image dimensions.
pub fn read_dims(group: &Group) -> Result<ImageDims, ImageError> {
    let len = |name: &str| {
        group
            .dimension(name)
            .map(|d| d.len())
            .ok_or_else(|| SchemaError::MissingDimension {
                group: group.name(),
                name: name.to_string(),
            })
    };
    Ok(ImageDims {
        nx: len(NC_DIM_X)?,
        ny: len(NC_DIM_Y)?,
        np: len(NC_DIM_POL)?,
        nf: len(NC_DIM_FREQ)?,
        nt: len(NC_DIM_TIME)?,
    })
}

/// Write every metadata entry as a group attribute. Existing attributes of
/// the same name are replaced; other existing attributes are kept, so extra
/// keys written earlier survive an append and are read back as extras.
pub fn write_metadata(group: &mut GroupMut, metadata: &Metadata) -> Result<(), ImageError> {
    for (name, value) in metadata.iter() {
        match value {
            MetaValue::Str(s) => group.add_attribute(name, s.as_str())?,
            MetaValue::Float(v) => group.add_attribute(name, *v)?,
            MetaValue::Int(v) => group.add_attribute(name, *v)?,
        };
    }
    trace!("wrote {} metadata attributes", metadata.len());
    Ok(())
}

/// Convert a scalar attribute value. Arrays have no metadata counterpart.
fn attribute_to_meta(value: AttributeValue) -> Result<MetaValue, AttributeValue> {
    match value {
        AttributeValue::Str(s) => Ok(MetaValue::Str(s)),
        AttributeValue::Double(v) => Ok(MetaValue::Float(v)),
        AttributeValue::Float(v) => Ok(MetaValue::Float(v.into())),
        AttributeValue::Longlong(v) => Ok(MetaValue::Int(v)),
        AttributeValue::Int(v) => Ok(MetaValue::Int(v.into())),
        AttributeValue::Short(v) => Ok(MetaValue::Int(v.into())),
        AttributeValue::Schar(v) => Ok(MetaValue::Int(v.into())),
        AttributeValue::Uint(v) => Ok(MetaValue::Int(v.into())),
        AttributeValue::Ushort(v) => Ok(MetaValue::Int(v.into())),
        AttributeValue::Uchar(v) => Ok(MetaValue::Int(v.into())),
        other => Err(other),
    }
}

/// Read the metadata stored in the group attributes. Every schema key must
/// be present; integers are accepted for float keys.
pub fn read_metadata(group: &Group) -> Result<Metadata, ImageError> {
    let mut metadata = Metadata::empty();
    for attr in group.attributes() {
        let name = attr.name().to_string();
        let key = MetaKey::from_name(&name);
        let value = match (attribute_to_meta(attr.value()?), key) {
            (Ok(value), _) => value,
            (Err(other), Some(key)) => {
                return Err(SchemaError::IncompatibleValue {
                    key: name,
                    value: format!("{other:?}"),
                    allowed: format!("a single {}", key.value_type()),
                }
                .into())
            }
            (Err(_), None) => {
                warn!("skipping attribute {name:?}: not a scalar");
                continue;
            }
        };
        match key {
            Some(key) => {
                let received = value.value_type();
                let expected = key.value_type();
                let value = value
                    .coerce(expected)
                    .ok_or_else(|| SchemaError::WrongType {
                        key: name.clone(),
                        expected,
                        received,
                    })?;
                metadata.set(key, value)?;
            }
            None => metadata.set_extra(&name, value)?,
        }
    }
    metadata.validate_complete()?;
    Ok(metadata)
}

/// Check that the axis lengths recorded in `metadata` match `dims`.
pub(crate) fn check_metadata_dims(
    metadata: &Metadata,
    dims: &ImageDims,
) -> Result<(), SchemaError> {
    let recorded = ImageDims::from_metadata(metadata)?;
    for ((name, expected), (_, received)) in
        dimension_lengths(dims).into_iter().zip(dimension_lengths(&recorded))
    {
        if expected != received {
            return Err(SchemaError::DimensionMismatch {
                dimension: name.to_string(),
                expected,
                received,
            });
        }
    }
    Ok(())
}

fn variable<'g>(group: &'g Group, name: &str) -> Result<Variable<'g>, SchemaError> {
    group.variable(name).ok_or_else(|| SchemaError::MissingVariable {
        group: group.name(),
        name: name.to_string(),
    })
}

fn variable_mut<'g>(
    group: &'g mut GroupMut,
    name: &str,
) -> Result<netcdf::VariableMut<'g>, SchemaError> {
    let group_name = group.name();
    group.variable_mut(name).ok_or(SchemaError::MissingVariable {
        group: group_name,
        name: name.to_string(),
    })
}

/// Read the whole intensity array, shaped `(nx, ny, np, nf, nt)`.
pub fn read_data(group: &Group, dims: &ImageDims) -> Result<Array5<f64>, ImageError> {
    let values = variable(group, NC_VAR_INTENSITY)?.get_values::<f64, _>(..)?;
    let received = values.len();
    // The file's x-fastest order is the column-major order of the array.
    let data = Array5::from_shape_vec(dims.shape().f(), values).map_err(|_| {
        let expected = format!("{:?}", dims.shape());
        bad_shape(NC_VAR_INTENSITY, "read_data", expected, received)
    })?;
    Ok(data)
}

/// Read the `(x, y)` slice at the given indices, which must be in range.
pub fn read_slice(
    group: &Group,
    dims: &ImageDims,
    pol: usize,
    freq: usize,
    time: usize,
) -> Result<Array2<f64>, ImageError> {
    dims.check_slice(pol, freq, time)?;
    let values = variable(group, NC_VAR_INTENSITY)?.get_values::<f64, _>((
        time..time + 1,
        freq..freq + 1,
        pol..pol + 1,
        0..dims.ny,
        0..dims.nx,
    ))?;
    let received = values.len();
    let slice = Array2::from_shape_vec((dims.nx, dims.ny).f(), values).map_err(|_| {
        let expected = format!("({}, {})", dims.nx, dims.ny);
        bad_shape(NC_VAR_INTENSITY, "read_slice", expected, received)
    })?;
    Ok(slice)
}

/// Overwrite the whole intensity array. The shape must match the group's
/// dimensions.
pub fn write_data(group: &mut GroupMut, data: ArrayView5<f64>) -> Result<(), ImageError> {
    let dims = read_dims(group)?;
    if data.dim() != dims.shape() {
        let expected = format!("{:?}", dims.shape());
        return Err(bad_shape("data", "write_data", expected, data.len()).into());
    }
    // Reversing the axes makes x the fastest-varying index.
    let values: Vec<f64> = data.t().iter().copied().collect();
    trace!("writing {} intensity values", values.len());
    variable_mut(group, NC_VAR_INTENSITY)?.put_values(&values, ..)?;
    Ok(())
}

/// Overwrite the `(x, y)` slice at the given indices.
pub fn write_slice(
    group: &mut GroupMut,
    slice: ArrayView2<f64>,
    pol: usize,
    freq: usize,
    time: usize,
) -> Result<(), ImageError> {
    let dims = read_dims(group)?;
    dims.check_slice(pol, freq, time)?;
    if slice.dim() != (dims.nx, dims.ny) {
        let expected = format!("({}, {})", dims.nx, dims.ny);
        return Err(bad_shape("slice", "write_slice", expected, slice.len()).into());
    }
    let values: Vec<f64> = slice.t().iter().copied().collect();
    variable_mut(group, NC_VAR_INTENSITY)?.put_values(
        &values,
        (time..time + 1, freq..freq + 1, pol..pol + 1, 0..dims.ny, 0..dims.nx),
    )?;
    Ok(())
}

/// Read a one-dimensional float variable (`x`, `y`, `frequency` or `time`).
pub fn read_vector(group: &Group, name: &str) -> Result<Vec<f64>, ImageError> {
    Ok(variable(group, name)?.get_values::<f64, _>(..)?)
}

/// Overwrite a one-dimensional float variable. The length must match its
/// dimension.
pub fn write_vector(group: &mut GroupMut, name: &str, values: &[f64]) -> Result<(), ImageError> {
    let expected = variable(group, name)?.len();
    if values.len() != expected {
        return Err(bad_shape(name, "write_vector", expected.to_string(), values.len()).into());
    }
    trace!("writing variable {name}");
    variable_mut(group, name)?.put_values(values, ..)?;
    Ok(())
}

/// Read the polarisation codes.
pub fn read_pol(group: &Group) -> Result<Vec<String>, ImageError> {
    let var = variable(group, NC_VAR_POL)?;
    let mut pol = Vec::with_capacity(var.len());
    for i in 0..var.len() {
        pol.push(var.get_string([i])?);
    }
    Ok(pol)
}

/// Overwrite the polarisation codes.
pub fn write_pol(group: &mut GroupMut, pol: &[String]) -> Result<(), ImageError> {
    let np = read_dims(group)?.np;
    if pol.len() != np {
        return Err(bad_shape("pol", "write_pol", np.to_string(), pol.len()).into());
    }
    let mut var = variable_mut(group, NC_VAR_POL)?;
    for (i, code) in pol.iter().enumerate() {
        var.put_string(code, [i])?;
    }
    Ok(())
}

/// Write a complete image into `group`, defining whatever is missing.
pub(crate) fn write_contents(
    group: &mut GroupMut,
    data: ArrayView5<f64>,
    pol: &[String],
    freq: &[f64],
    mjd: &[f64],
    metadata: &Metadata,
) -> Result<(), ImageError> {
    let dims = ImageDims::from_shape(data.dim());
    check_metadata_dims(metadata, &dims)?;
    define_dimensions(group, &dims)?;
    define_variables(group)?;
    write_metadata(group, metadata)?;

    let (x, y) = pixel_grid(metadata, AngularUnit::Radian)?;
    write_vector(group, NC_VAR_X, &x.to_vec())?;
    write_vector(group, NC_VAR_Y, &y.to_vec())?;
    write_pol(group, pol)?;
    write_vector(group, NC_VAR_FREQ, freq)?;
    write_vector(group, NC_VAR_TIME, mjd)?;
    write_data(group, data)?;
    Ok(())
}

/// Save an image into a NetCDF4 group, returning a disk image of the saved
/// group, open read-only.
///
/// `options.mode` must be [`NcMode::Create`] (a new group; the file is
/// replaced if `options.overwrite` is set) or [`NcMode::Append`] (an
/// existing group with the same dimensions). Appending keeps extra
/// attributes already in the group; see [`write_metadata`].
pub fn save_netcdf<P: AsRef<Path>>(
    image: &mut dyn EhtImage,
    filename: P,
    options: &NcOptions,
) -> Result<DiskImage, ImageError> {
    if options.mode == NcMode::Read {
        return Err(ImageError::UnsupportedOperation {
            operation: "saving",
            storage: StorageLocation::DiskBased,
            reason: "the target must be opened in create or append mode",
        });
    }

    let data = image.data()?;
    let pol = image.pol()?;
    let freq = image.freq()?;
    let mjd = image.mjd()?;
    let metadata = image.metadata()?;

    let mut saved = DiskImage::new(filename, &options.group);
    saved.open_with(options.mode, options.overwrite)?;
    saved.write_contents(data.view(), &pol, &freq, &mjd, &metadata)?;
    // Closing flushes the new contents.
    saved.close()?;
    saved.open(NcMode::Read)?;
    debug!(
        "saved a {:?} image to group {:?} of {}",
        data.dim(),
        options.group,
        saved.filename().display()
    );
    Ok(saved)
}

/// Open an image that was saved to a NetCDF4 group. `options.mode` must be
/// [`NcMode::Read`] or [`NcMode::Append`].
pub fn load_image<P: AsRef<Path>>(
    filename: P,
    options: &NcOptions,
) -> Result<DiskImage, ImageError> {
    if options.mode == NcMode::Create {
        return Err(ImageError::UnsupportedOperation {
            operation: "loading",
            storage: StorageLocation::DiskBased,
            reason: "an existing image must be opened in read or append mode",
        });
    }
    let mut image = DiskImage::new(filename, &options.group);
    image.open(options.mode)?;
    Ok(image)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::prelude::*;
    use tempfile::tempdir;

    use super::*;
    use crate::{
        image::{ImageParams, MemoryImage, PolSet},
        metadata::default_metadata,
    };

    fn sample_image() -> MemoryImage {
        let params = ImageParams {
            ny: 3,
            pol: PolSet::Full,
            freq: vec![86e9, 230e9],
            mjd: vec![58_000.0, 58_000.5, 58_001.0],
            ..ImageParams::new(4, 10.0, AngularUnit::Microarcsecond)
        };
        let blank = MemoryImage::blank(&params).unwrap();
        let data = Array5::from_shape_fn((4, 3, 4, 2, 3), |(x, y, p, f, t)| {
            (x + 10 * y + 100 * p + 1000 * f + 10000 * t) as f64
        });
        blank.with_data(data).unwrap()
    }

    #[test]
    fn test_round_trip_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("image.nc");
        let mut image = sample_image();
        let options = NcOptions {
            mode: NcMode::Create,
            ..Default::default()
        };
        let mut saved = save_netcdf(&mut image, &path, &options).unwrap();
        assert!(saved.is_open());
        assert!(!saved.is_writable());

        let file = netcdf::open(&path).unwrap();
        let group = image_group(&file, &path, "image").unwrap();
        let dims = check_group(&group).unwrap();
        assert_eq!(dims.shape(), (4, 3, 4, 2, 3));
        let intensity = group.variable(NC_VAR_INTENSITY).unwrap();
        let names: Vec<String> = intensity.dimensions().iter().map(|d| d.name()).collect();
        assert_eq!(names, ["t", "f", "p", "y", "x"]);

        // x varies fastest on disk.
        let raw = intensity.get_values::<f64, _>(..).unwrap();
        assert_eq!(&raw[..5], &[0.0, 1.0, 2.0, 3.0, 10.0]);

        let slice = read_slice(&group, &dims, 2, 1, 0).unwrap();
        assert_eq!(slice, image.data_view().slice(s![.., .., 2, 1, 0]));
        assert_eq!(read_pol(&group).unwrap(), vec!["I", "Q", "U", "V"]);
        assert_eq!(read_vector(&group, NC_VAR_FREQ).unwrap(), vec![86e9, 230e9]);
        let x = read_vector(&group, NC_VAR_X).unwrap();
        assert_abs_diff_eq!(x[0], AngularUnit::Microarcsecond.to_radians(15.0), epsilon = 1e-20);

        assert_eq!(read_metadata(&group).unwrap(), saved.metadata().unwrap());
    }

    /// Write the default metadata as attributes, leaving out `skip`.
    fn write_defaults_except(group: &mut GroupMut, skip: &str) {
        for (name, value) in default_metadata().iter().filter(|(name, _)| *name != skip) {
            match value {
                MetaValue::Str(s) => group.add_attribute(name, s.as_str()).unwrap(),
                MetaValue::Float(v) => group.add_attribute(name, *v).unwrap(),
                MetaValue::Int(v) => group.add_attribute(name, *v).unwrap(),
            };
        }
    }

    #[test]
    fn test_integer_attribute_for_float_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ints.nc");
        {
            let mut file = netcdf::create(&path).unwrap();
            let mut group = file.add_group("image").unwrap();
            write_defaults_except(&mut group, "ixref");
            group.add_attribute("ixref", 3_i64).unwrap();
            group.add_attribute("tag", "kept").unwrap();
        }
        let file = netcdf::open(&path).unwrap();
        let group = image_group(&file, &path, "image").unwrap();
        let metadata = read_metadata(&group).unwrap();
        assert_eq!(metadata.float(MetaKey::Ixref).unwrap(), 3.0);
        assert_eq!(metadata.get_extra("tag"), Some(&MetaValue::from("kept")));
    }

    #[test]
    fn test_bad_attribute_type() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.nc");
        {
            let mut file = netcdf::create(&path).unwrap();
            let mut group = file.add_group("image").unwrap();
            write_defaults_except(&mut group, "nx");
            group.add_attribute("nx", "four").unwrap();
        }
        let file = netcdf::open(&path).unwrap();
        let group = image_group(&file, &path, "image").unwrap();
        match read_metadata(&group) {
            Err(ImageError::SchemaViolation(SchemaError::WrongType { key, .. })) => {
                assert_eq!(key, "nx")
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_define_dimensions_conflict() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dims.nc");
        let mut file = netcdf::create(&path).unwrap();
        let mut group = file.add_group("image").unwrap();
        let dims = ImageDims::from_shape((4, 4, 1, 1, 1));
        define_dimensions(&mut group, &dims).unwrap();
        // Defining the same dimensions again is fine.
        define_dimensions(&mut group, &dims).unwrap();
        define_variables(&mut group).unwrap();
        define_variables(&mut group).unwrap();

        let other = ImageDims::from_shape((8, 4, 1, 1, 1));
        assert!(matches!(
            define_dimensions(&mut group, &other),
            Err(ImageError::SchemaViolation(SchemaError::DimensionMismatch { .. }))
        ));
    }

    #[test]
    fn test_missing_group() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.nc");
        drop(netcdf::create(&path).unwrap());
        let result = load_image(&path, &NcOptions::default());
        assert!(matches!(
            result,
            Err(ImageError::SchemaViolation(SchemaError::MissingGroup { .. }))
        ));
    }

    #[test]
    fn test_mistyped_variable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mistyped.nc");
        {
            let mut file = netcdf::create(&path).unwrap();
            let mut group = file.add_group("image").unwrap();
            define_dimensions(&mut group, &ImageDims::from_shape((4, 4, 1, 1, 1))).unwrap();
            // Polarisation codes stored as numbers.
            for (name, dims) in NC_VARIABLES {
                group.add_variable::<f64>(name, dims).unwrap();
            }
            write_defaults_except(&mut group, "");
            assert!(matches!(
                define_variables(&mut group),
                Err(ImageError::SchemaViolation(SchemaError::VariableType { .. }))
            ));
        }
        match load_image(&path, &NcOptions::default()) {
            Err(ImageError::SchemaViolation(SchemaError::VariableType {
                name, expected, ..
            })) => {
                assert_eq!(name, NC_VAR_POL);
                assert_eq!(expected, "string");
            }
            other => panic!("unexpected result {other:?}"),
        }
        let append = NcOptions {
            mode: NcMode::Append,
            ..Default::default()
        };
        assert!(matches!(
            load_image(&path, &append),
            Err(ImageError::SchemaViolation(SchemaError::VariableType { .. }))
        ));
    }

    #[test]
    fn test_append_keeps_extra_attributes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("append.nc");
        let image = sample_image();
        let mut metadata = image.metadata_ref().clone();
        metadata.set_extra("tag", "first").unwrap();
        let mut tagged = MemoryImage::new(
            image.data_view().to_owned(),
            image.pol_codes().to_vec(),
            image.frequencies().to_vec(),
            image.epochs().to_vec(),
            metadata,
        )
        .unwrap();
        let create = NcOptions {
            mode: NcMode::Create,
            ..Default::default()
        };
        save_netcdf(&mut tagged, &path, &create).unwrap();

        let mut untagged = image.clone();
        let append = NcOptions {
            mode: NcMode::Append,
            ..Default::default()
        };
        let mut saved = save_netcdf(&mut untagged, &path, &append).unwrap();
        let metadata = saved.metadata().unwrap();
        assert_eq!(metadata.get_extra("tag"), Some(&MetaValue::from("first")));
        assert_eq!(metadata.get(MetaKey::Dx), image.metadata_ref().get(MetaKey::Dx));
        assert_eq!(saved.data().unwrap(), image.data_view());
    }

    #[test]
    fn test_save_needs_writable_mode() {
        let dir = tempdir().unwrap();
        let mut image = sample_image();
        let result = save_netcdf(&mut image, dir.path().join("x.nc"), &NcOptions::default());
        assert!(matches!(result, Err(ImageError::UnsupportedOperation { .. })));
    }
}
