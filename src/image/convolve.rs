// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Convolution of images with a kernel model.
//!
//! The kernel is given by its visibility (its Fourier transform) on the
//! image's uv grid. Each `(x, y)` slice is transformed, multiplied by the
//! kernel visibilities and transformed back, i.e. the convolution is
//! circular.

use std::{f64::consts::PI, sync::Arc};

use itertools::iproduct;
use log::debug;
use ndarray::{prelude::*, Zip};
use num_complex::Complex64;
use rayon::prelude::*;
use rustfft::{Fft, FftPlanner};

use super::{EhtImage, MemoryImage, StorageLocation};
use crate::{grid::UvGrid, io::error::ImageError};

/// FWHM = `FWHM_TO_SIGMA` * sigma for a Gaussian.
const FWHM_TO_SIGMA: f64 = 2.354_820_045_030_949_3;

/// A model that can be evaluated in the Fourier domain.
pub trait KernelModel: Sync {
    /// The complex visibility of the kernel at the spatial frequency
    /// `(u, v)` \[wavelengths\]. A kernel that conserves flux has a
    /// visibility of 1 at the origin.
    fn visibility(&self, u: f64, v: f64) -> Complex64;
}

/// A delta function at the origin. Convolving with it changes nothing.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PointKernel;

impl KernelModel for PointKernel {
    fn visibility(&self, _u: f64, _v: f64) -> Complex64 {
        Complex64::new(1.0, 0.0)
    }
}

/// A unit-flux Gaussian centred at the origin.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GaussianKernel {
    /// Standard deviation along the major axis \[radians\]
    pub sigma_major: f64,
    /// Standard deviation along the minor axis \[radians\]
    pub sigma_minor: f64,
    /// Position angle of the major axis, east of north \[radians\]
    pub position_angle: f64,
}

impl GaussianKernel {
    /// A circular Gaussian with the given full width at half maximum
    /// \[radians\].
    pub fn circular(fwhm: f64) -> Self {
        Self::elliptical(fwhm, fwhm, 0.0)
    }

    /// An elliptical Gaussian. Widths are full widths at half maximum
    /// \[radians\]; the position angle is east of north \[radians\].
    pub fn elliptical(major_fwhm: f64, minor_fwhm: f64, position_angle: f64) -> Self {
        Self {
            sigma_major: major_fwhm / FWHM_TO_SIGMA,
            sigma_minor: minor_fwhm / FWHM_TO_SIGMA,
            position_angle,
        }
    }
}

impl KernelModel for GaussianKernel {
    fn visibility(&self, u: f64, v: f64) -> Complex64 {
        let (s_pa, c_pa) = self.position_angle.sin_cos();
        // u and v along the major and minor axes.
        let u_major = u * s_pa + v * c_pa;
        let u_minor = u * c_pa - v * s_pa;
        let exponent = -2.0
            * PI
            * PI
            * (self.sigma_major.powi(2) * u_major.powi(2)
                + self.sigma_minor.powi(2) * u_minor.powi(2));
        Complex64::new(exponent.exp(), 0.0)
    }
}

/// How the slices of an image are processed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Executor {
    /// One slice after another on the calling thread.
    #[default]
    Sequential,
    /// Slices in parallel on the rayon thread pool.
    Parallel,
}

struct FftPlans {
    forward_x: Arc<dyn Fft<f64>>,
    forward_y: Arc<dyn Fft<f64>>,
    inverse_x: Arc<dyn Fft<f64>>,
    inverse_y: Arc<dyn Fft<f64>>,
}

impl FftPlans {
    fn new(nx: usize, ny: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            forward_x: planner.plan_fft_forward(nx),
            forward_y: planner.plan_fft_forward(ny),
            inverse_x: planner.plan_fft_inverse(nx),
            inverse_y: planner.plan_fft_inverse(ny),
        }
    }
}

/// Transform every lane of `buffer` along `axis`.
fn transform_lanes(buffer: &mut Array2<Complex64>, axis: Axis, fft: &dyn Fft<f64>) {
    let mut scratch = vec![Complex64::default(); fft.len()];
    for mut lane in buffer.lanes_mut(axis) {
        scratch.iter_mut().zip(lane.iter()).for_each(|(s, l)| *s = *l);
        fft.process(&mut scratch);
        lane.iter_mut().zip(scratch.iter()).for_each(|(l, s)| *l = *s);
    }
}

fn convolve_slice(
    slice: ArrayView2<f64>,
    transfer: &Array2<Complex64>,
    plans: &FftPlans,
) -> Array2<f64> {
    let mut buffer = slice.mapv(|v| Complex64::new(v, 0.0));
    transform_lanes(&mut buffer, Axis(0), plans.forward_x.as_ref());
    transform_lanes(&mut buffer, Axis(1), plans.forward_y.as_ref());
    buffer *= transfer;
    transform_lanes(&mut buffer, Axis(0), plans.inverse_x.as_ref());
    transform_lanes(&mut buffer, Axis(1), plans.inverse_y.as_ref());
    // rustfft doesn't normalise.
    let norm = buffer.len() as f64;
    buffer.mapv(|c| c.re / norm)
}

/// Convolve every `(x, y)` slice of `data` (shaped `(nx, ny, np, nf, nt)`)
/// with `kernel`, whose visibilities are evaluated on the unshifted `uv`
/// grid. Both executors give identical results.
pub(crate) fn convolve_slices<K: KernelModel>(
    data: &mut Array5<f64>,
    uv: &UvGrid,
    kernel: &K,
    executor: Executor,
) {
    let (nx, ny, np, nf, nt) = data.dim();
    let (u, v) = uv.mesh();
    let transfer = Zip::from(&u)
        .and(&v)
        .map_collect(|&u, &v| kernel.visibility(u, v));
    let plans = FftPlans::new(nx, ny);
    debug!("convolving {} slices of {nx}x{ny} pixels ({executor:?})", np * nf * nt);

    let indices: Vec<(usize, usize, usize)> = iproduct!(0..np, 0..nf, 0..nt).collect();
    let view = data.view();
    let convolve_one = |&(p, f, t): &(usize, usize, usize)| {
        convolve_slice(view.slice(s![.., .., p, f, t]), &transfer, &plans)
    };
    let convolved: Vec<Array2<f64>> = match executor {
        Executor::Sequential => indices.iter().map(convolve_one).collect(),
        Executor::Parallel => indices.par_iter().map(convolve_one).collect(),
    };

    for ((p, f, t), slice) in indices.into_iter().zip(convolved) {
        data.slice_mut(s![.., .., p, f, t]).assign(&slice);
    }
}

/// Convolve an image with `kernel`, returning a new in-memory image.
///
/// # Errors
///
/// Disk-based images are refused with [`ImageError::UnsupportedOperation`];
/// load them into memory first.
pub fn convolve<K: KernelModel>(
    image: &mut dyn EhtImage,
    kernel: &K,
    executor: Executor,
) -> Result<MemoryImage, ImageError> {
    if image.storage_location() == StorageLocation::DiskBased {
        return Err(ImageError::UnsupportedOperation {
            operation: "convolution",
            storage: StorageLocation::DiskBased,
            reason: "load the image into memory first",
        });
    }
    let mut convolved = image.to_memory()?;
    convolved.convolve_in_place(kernel, executor)?;
    Ok(convolved)
}
