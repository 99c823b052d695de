// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Pixel and Fourier-domain grids of an image, computed from metadata alone.

use ndarray::{Array1, Array2};

use crate::{
    metadata::{MetaKey, Metadata, SchemaError},
    units::AngularUnit,
};

/// The sample frequencies of a discrete Fourier transform of length `n` with
/// sample spacing `d`, in the standard order (zero frequency first, then
/// the positive frequencies, then the negative ones).
pub fn fftfreq(n: usize, d: f64) -> Array1<f64> {
    let scale = 1.0 / (n as f64 * d);
    // Number of non-negative frequencies.
    let num_pos = (n + 1) / 2;
    Array1::from_shape_fn(n, |i| {
        let k = if i < num_pos {
            i as f64
        } else {
            i as f64 - n as f64
        };
        k * scale
    })
}

/// Rotate `a` so that the zero-frequency element of an [`fftfreq`]-ordered
/// array lands at index `n / 2`.
pub fn fftshift(a: &Array1<f64>) -> Array1<f64> {
    let n = a.len();
    let shift = n / 2;
    Array1::from_shape_fn(n, |i| a[(i + n - shift) % n])
}

/// The pixel-centre coordinates along the x and y axes in `unit`.
///
/// The reference pixels (`ixref`, `iyref`; 1-based, as FITS `CRPIX`) are at
/// the origin. The x axis increases to the east, so its coordinates decrease
/// with pixel index; the y axis increases with pixel index.
pub fn pixel_grid(
    metadata: &Metadata,
    unit: AngularUnit,
) -> Result<(Array1<f64>, Array1<f64>), SchemaError> {
    let nx = metadata.count(MetaKey::Nx)?;
    let ny = metadata.count(MetaKey::Ny)?;
    let dx = unit.from_radians(metadata.float(MetaKey::Dx)?);
    let dy = unit.from_radians(metadata.float(MetaKey::Dy)?);
    let ixref = metadata.float(MetaKey::Ixref)?;
    let iyref = metadata.float(MetaKey::Iyref)?;

    let x = Array1::from_shape_fn(nx, |i| -dx * ((i + 1) as f64 - ixref));
    let y = Array1::from_shape_fn(ny, |j| dy * ((j + 1) as f64 - iyref));
    Ok((x, y))
}

/// Spatial-frequency axes conjugate to an image's pixel grid \[wavelengths\].
#[derive(Clone, Debug, PartialEq)]
pub struct UvGrid {
    /// Conjugate to the x axis; `nx` samples.
    pub u: Array1<f64>,
    /// Conjugate to the y axis; `ny` samples.
    pub v: Array1<f64>,
}

impl UvGrid {
    /// The two-dimensional `(nx, ny)` grids of u and v.
    pub fn mesh(&self) -> (Array2<f64>, Array2<f64>) {
        let shape = (self.u.len(), self.v.len());
        let u = Array2::from_shape_fn(shape, |(i, _)| self.u[i]);
        let v = Array2::from_shape_fn(shape, |(_, j)| self.v[j]);
        (u, v)
    }
}

/// The u and v grids of an image with the field of view and pixel size in
/// `metadata`. The sample spacing is `1 / (n * pixel size)`. When `shift` is
/// true, the zero frequency is moved to the centre of each axis.
pub fn uv_grid(metadata: &Metadata, shift: bool) -> Result<UvGrid, SchemaError> {
    let nx = metadata.count(MetaKey::Nx)?;
    let ny = metadata.count(MetaKey::Ny)?;
    let dx = metadata.float(MetaKey::Dx)?;
    let dy = metadata.float(MetaKey::Dy)?;

    // x decreases with pixel index, hence the negative spacing.
    let u = fftfreq(nx, -dx);
    let v = fftfreq(ny, dy);
    if shift {
        Ok(UvGrid {
            u: fftshift(&u),
            v: fftshift(&v),
        })
    } else {
        Ok(UvGrid { u, v })
    }
}
