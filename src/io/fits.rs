// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Module for reading and writing images as FITS files.
//!
//! A FITS image holds a single frequency and epoch of an image. Its axes
//! follow the CASA convention: `RA---SIN`, `DEC--SIN`, `FREQ` and `STOKES`,
//! with intensities in Jy/pixel.

use std::{ffi::CString, fmt, path::Path, str::FromStr};

use fitsio::{
    errors::check_status as fits_check_status,
    headers::ReadsKey,
    hdu::{FitsHdu, HduInfo},
    images::{ImageDescription, ImageType},
    FitsFile,
};
use hifitime::Epoch;
use log::{debug, trace, warn};
use ndarray::Array5;

use super::error::ImageError;
use crate::{
    built_info,
    constants::{FITS_KEY_NO_EXIST, STOKES_CODES},
    image::{EhtImage, MemoryImage},
    metadata::{default_metadata, MetaKey, SchemaError},
    units::AngularUnit,
};

/// A FITS header convention.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FitsConvention {
    /// CASA and AIPS style headers.
    #[default]
    Casa,
}

impl fmt::Display for FitsConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitsConvention::Casa => write!(f, "casa"),
        }
    }
}

impl FromStr for FitsConvention {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "casa" => Ok(FitsConvention::Casa),
            _ => Err(ImageError::UnsupportedConvention(s.to_string())),
        }
    }
}

fn stokes_code(pol: &str) -> Option<i64> {
    STOKES_CODES.iter().find(|(p, _)| *p == pol).map(|(_, c)| *c)
}

fn stokes_name(code: i64) -> Option<&'static str> {
    STOKES_CODES.iter().find(|(_, c)| *c == code).map(|(p, _)| *p)
}

/// The polarisation representation of a set of `STOKES` axis codes.
fn polrep(codes: &[i64]) -> Option<&'static str> {
    if codes.iter().all(|c| (1..=4).contains(c)) {
        Some("stokes")
    } else if codes.iter().all(|c| (-4..=-1).contains(c)) {
        Some("circular")
    } else if codes.iter().all(|c| (-8..=-5).contains(c)) {
        Some("linear")
    } else {
        None
    }
}

fn fits_get_optional_key<T: ReadsKey>(
    fits: &mut FitsFile,
    hdu: &FitsHdu,
    key: &str,
) -> Result<Option<T>, ImageError> {
    match hdu.read_key(fits, key) {
        Ok(value) => Ok(Some(value)),
        Err(fitsio::errors::Error::Fits(e)) if e.status == FITS_KEY_NO_EXIST => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn fits_get_required_key<T: ReadsKey>(
    fits: &mut FitsFile,
    hdu: &FitsHdu,
    key: &str,
) -> Result<T, ImageError> {
    fits_get_optional_key(fits, hdu, key)?.ok_or_else(|| {
        SchemaError::MissingKey {
            key: key.to_string(),
        }
        .into()
    })
}

/// The 0-based index of the current HDU.
fn fits_current_hdu(fits: &mut FitsFile) -> usize {
    let mut num = 0;
    unsafe {
        // ffghdn = fits_get_hdu_num
        fitsio_sys::ffghdn(fits.as_raw(), &mut num);
    }
    (num as usize).saturating_sub(1)
}

/// A linear FITS axis.
struct Axis {
    len: usize,
    crval: f64,
    cdelt: f64,
    crpix: f64,
}

impl Axis {
    fn read(fits: &mut FitsFile, hdu: &FitsHdu, n: usize, len: usize) -> Result<Axis, ImageError> {
        Ok(Axis {
            len,
            crval: fits_get_optional_key(fits, hdu, &format!("CRVAL{n}"))?.unwrap_or(0.0),
            cdelt: fits_get_optional_key(fits, hdu, &format!("CDELT{n}"))?.unwrap_or(1.0),
            crpix: fits_get_optional_key(fits, hdu, &format!("CRPIX{n}"))?.unwrap_or(1.0),
        })
    }

    fn values(&self) -> Vec<f64> {
        (0..self.len)
            .map(|k| self.crval + (k as f64 + 1.0 - self.crpix) * self.cdelt)
            .collect()
    }
}

/// Read an image from an HDU of a FITS file. `hdu_index` is 0-based; 0 is
/// the primary HDU.
pub fn load_fits<P: AsRef<Path>>(path: P, hdu_index: usize) -> Result<MemoryImage, ImageError> {
    let path = path.as_ref();
    trace!("opening fits file {}", path.display());
    let mut fits = FitsFile::open(path)?;
    let hdu = fits.hdu(hdu_index)?;
    load_fits_hdu(&mut fits, &hdu)
}

/// Read an image from an HDU of an open FITS file.
///
/// The first two axes are the sky axes. Every other axis must be a `FREQ` or
/// `STOKES` axis, or have length 1. The epoch comes from `MJD-OBS`, falling
/// back to `DATE-OBS`.
pub fn load_fits_hdu(fits: &mut FitsFile, hdu: &FitsHdu) -> Result<MemoryImage, ImageError> {
    // NAXIS is in every header; reading it makes this HDU the current one.
    let _: i64 = fits_get_required_key(fits, hdu, "NAXIS")?;
    let shape = match &hdu.info {
        HduInfo::ImageInfo { shape, .. } if shape.len() >= 2 => shape.clone(),
        _ => {
            return Err(SchemaError::NotAnImage {
                hdu: fits_current_hdu(fits),
            }
            .into())
        }
    };
    // NAXIS1 first.
    let naxes: Vec<usize> = shape.into_iter().rev().collect();
    let (nx, ny) = (naxes[0], naxes[1]);

    let mut metadata = default_metadata();
    for (n, (key_delta, key_ref, key_ipix)) in [
        (MetaKey::Dx, MetaKey::Xref, MetaKey::Ixref),
        (MetaKey::Dy, MetaKey::Yref, MetaKey::Iyref),
    ]
    .into_iter()
    .enumerate()
    {
        let n = n + 1;
        let cunit: Option<String> = fits_get_optional_key(fits, hdu, &format!("CUNIT{n}"))?;
        let unit = match cunit.as_deref().map(AngularUnit::from_fits_unit) {
            Some(Some(unit)) => unit,
            Some(None) => {
                warn!("unknown unit {cunit:?} for axis {n}; assuming degrees");
                AngularUnit::Degree
            }
            None => AngularUnit::Degree,
        };
        let cdelt: f64 = fits_get_required_key(fits, hdu, &format!("CDELT{n}"))?;
        let crval: f64 = fits_get_optional_key(fits, hdu, &format!("CRVAL{n}"))?.unwrap_or(0.0);
        let crpix: f64 = fits_get_optional_key(fits, hdu, &format!("CRPIX{n}"))?
            .unwrap_or((naxes[n - 1] as f64 + 1.0) / 2.0);
        metadata.set(key_delta, unit.to_radians(cdelt.abs()))?;
        metadata.set(key_ref, unit.to_radians(crval))?;
        metadata.set(key_ipix, crpix)?;
    }

    let mut freq_axis = None;
    let mut stokes_axis = None;
    for (i, &len) in naxes.iter().enumerate().skip(2) {
        let n = i + 1;
        let ctype: String =
            fits_get_optional_key(fits, hdu, &format!("CTYPE{n}"))?.unwrap_or_default();
        let ctype = ctype.trim().to_ascii_uppercase();
        if ctype.starts_with("FREQ") {
            freq_axis = Some((i, Axis::read(fits, hdu, n, len)?));
        } else if ctype.starts_with("STOKES") {
            stokes_axis = Some((i, Axis::read(fits, hdu, n, len)?));
        } else if len != 1 {
            return Err(SchemaError::UnsupportedAxis { axis: n, ctype, len }.into());
        }
    }

    let freq = match &freq_axis {
        Some((_, axis)) => axis.values(),
        None => {
            warn!("no FREQ axis; assuming a frequency of 1 Hz");
            vec![1.0]
        }
    };
    let pol_codes: Vec<i64> = match &stokes_axis {
        Some((_, axis)) => axis.values().into_iter().map(|c| c.round() as i64).collect(),
        None => vec![1],
    };
    let mut pol = Vec::with_capacity(pol_codes.len());
    for &code in &pol_codes {
        let name = stokes_name(code).ok_or_else(|| SchemaError::IncompatibleValue {
            key: "STOKES".to_string(),
            value: code.to_string(),
            allowed: "-8 to -1 or 1 to 4".to_string(),
        })?;
        pol.push(name.to_string());
    }
    let rep = polrep(&pol_codes).ok_or_else(|| SchemaError::IncompatibleValue {
        key: "STOKES".to_string(),
        value: format!("{pol_codes:?}"),
        allowed: "codes of a single polarisation representation".to_string(),
    })?;
    metadata.set(MetaKey::Polrep, rep)?;

    let mjd = match fits_get_optional_key::<f64>(fits, hdu, "MJD-OBS")? {
        Some(mjd) => mjd,
        None => match fits_get_optional_key::<String>(fits, hdu, "DATE-OBS")? {
            Some(date) => match Epoch::from_gregorian_str(date.trim()) {
                Ok(epoch) => epoch.to_mjd_utc_days(),
                Err(e) => {
                    warn!("could not parse DATE-OBS {date:?} ({e}); assuming MJD 0");
                    0.0
                }
            },
            None => {
                warn!("neither MJD-OBS nor DATE-OBS is present; assuming MJD 0");
                0.0
            }
        },
    };

    for (fits_key, key) in [
        ("OBJECT", MetaKey::Source),
        ("TELESCOP", MetaKey::Instrument),
        ("OBSERVER", MetaKey::Observer),
    ] {
        if let Some(value) = fits_get_optional_key::<String>(fits, hdu, fits_key)? {
            metadata.set(key, value.trim())?;
        }
    }
    if let Some(radesys) = fits_get_optional_key::<String>(fits, hdu, "RADESYS")? {
        let coordsys = radesys.trim().to_ascii_lowercase();
        if metadata.set(MetaKey::Coordsys, coordsys.as_str()).is_err() {
            warn!("unsupported RADESYS {radesys:?}; keeping {}", MetaKey::Coordsys.default_value());
        }
    }
    if let Some(equinox) = fits_get_optional_key::<f64>(fits, hdu, "EQUINOX")? {
        metadata.set(MetaKey::Equinox, equinox)?;
    }
    if let Some(bunit) = fits_get_optional_key::<String>(fits, hdu, "BUNIT")? {
        if !bunit.trim().eq_ignore_ascii_case("JY/PIXEL") {
            warn!("BUNIT is {bunit:?}, not JY/PIXEL; pixel values are kept as they are");
        }
    }

    let values: Vec<f64> = hdu.read_image(fits)?;
    let expected: usize = naxes.iter().product();
    if values.len() != expected {
        return Err(SchemaError::BadArrayShape {
            argument: "image".to_string(),
            function: "load_fits_hdu".to_string(),
            expected: expected.to_string(),
            received: values.len().to_string(),
        }
        .into());
    }
    // NAXIS1 varies fastest.
    let mut strides = vec![1; naxes.len()];
    for i in 1..naxes.len() {
        strides[i] = strides[i - 1] * naxes[i - 1];
    }
    let stride_of = |axis: &Option<(usize, Axis)>| {
        axis.as_ref().map(|(i, _)| strides[*i]).unwrap_or(0)
    };
    let (stride_p, stride_f) = (stride_of(&stokes_axis), stride_of(&freq_axis));
    let data = Array5::from_shape_fn((nx, ny, pol.len(), freq.len(), 1), |(x, y, p, f, _)| {
        values[x + y * strides[1] + p * stride_p + f * stride_f]
    });

    debug!(
        "read a {nx}x{ny} image with {} polarisations and {} frequencies from HDU {}",
        pol.len(),
        freq.len(),
        fits_current_hdu(fits)
    );
    Ok(MemoryImage::new(data, pol, freq, vec![mjd], metadata)?)
}

/// Save one frequency and epoch of an image to a FITS file, replacing any
/// existing file. `freq_index` and `time_index` are 0-based.
///
/// # Errors
///
/// [`ImageError::IndexOutOfRange`] for bad indices, and a schema violation if
/// the polarisation codes can't be put on a linear `STOKES` axis.
pub fn save_fits<P: AsRef<Path>>(
    image: &mut dyn EhtImage,
    path: P,
    (freq_index, time_index): (usize, usize),
    convention: FitsConvention,
) -> Result<(), ImageError> {
    let path = path.as_ref();
    let dims = image.dims()?;
    dims.check_slice(0, freq_index, time_index)?;
    let metadata = image.metadata()?;
    let pol = image.pol()?;
    let freq = image.freq()?[freq_index];
    let mjd = image.mjd()?[time_index];

    let mut codes = Vec::with_capacity(pol.len());
    for p in &pol {
        codes.push(stokes_code(p).ok_or_else(|| SchemaError::IncompatibleValue {
            key: "pol".to_string(),
            value: p.clone(),
            allowed: STOKES_CODES.iter().map(|(p, _)| *p).collect::<Vec<_>>().join(", "),
        })?);
    }
    let stokes_delta = if codes.len() > 1 { codes[1] - codes[0] } else { 1 };
    if stokes_delta == 0 || codes.windows(2).any(|w| w[1] - w[0] != stokes_delta) {
        return Err(SchemaError::IncompatibleValue {
            key: "pol".to_string(),
            value: pol.join(", "),
            allowed: "linearly spaced Stokes codes".to_string(),
        }
        .into());
    }

    // STOKES is the slowest axis and x the fastest.
    let mut values = Vec::with_capacity(dims.nx * dims.ny * dims.np);
    for p in 0..dims.np {
        let plane = image.slice(p, freq_index, time_index)?;
        values.extend(plane.t().iter().copied());
    }

    if path.exists() {
        trace!("file {} exists, deleting", path.display());
        std::fs::remove_file(path)?;
    }
    trace!("creating fits file {}", path.display());
    let description = ImageDescription {
        data_type: ImageType::Double,
        dimensions: &[dims.np, 1, dims.ny, dims.nx],
    };
    let mut fits = FitsFile::create(path).with_custom_primary(&description).open()?;
    let hdu = fits.primary_hdu()?;
    hdu.write_image(&mut fits, &values)?;

    let fptr = unsafe { fits.as_raw() };
    match convention {
        FitsConvention::Casa => {
            let deg = |key| metadata.float(key).map(f64::to_degrees);
            fits_write_string(fptr, "OBJECT", metadata.str(MetaKey::Source)?, None)?;
            fits_write_string(fptr, "TELESCOP", metadata.str(MetaKey::Instrument)?, None)?;
            fits_write_string(fptr, "OBSERVER", metadata.str(MetaKey::Observer)?, None)?;
            fits_write_string(
                fptr,
                "RADESYS",
                &metadata.str(MetaKey::Coordsys)?.to_ascii_uppercase(),
                None,
            )?;
            let equinox = metadata.float(MetaKey::Equinox)?;
            if equinox > 0.0 {
                fits_write_double(fptr, "EQUINOX", equinox, None)?;
            }
            fits_write_string(fptr, "BUNIT", "JY/PIXEL", None)?;

            fits_write_string(fptr, "CTYPE1", "RA---SIN", None)?;
            fits_write_double(fptr, "CRVAL1", deg(MetaKey::Xref)?, None)?;
            fits_write_double(fptr, "CDELT1", -deg(MetaKey::Dx)?, None)?;
            fits_write_double(fptr, "CRPIX1", metadata.float(MetaKey::Ixref)?, None)?;
            fits_write_string(fptr, "CUNIT1", "DEG", None)?;

            fits_write_string(fptr, "CTYPE2", "DEC--SIN", None)?;
            fits_write_double(fptr, "CRVAL2", deg(MetaKey::Yref)?, None)?;
            fits_write_double(fptr, "CDELT2", deg(MetaKey::Dy)?, None)?;
            fits_write_double(fptr, "CRPIX2", metadata.float(MetaKey::Iyref)?, None)?;
            fits_write_string(fptr, "CUNIT2", "DEG", None)?;

            fits_write_string(fptr, "CTYPE3", "FREQ", None)?;
            fits_write_double(fptr, "CRVAL3", freq, None)?;
            fits_write_double(fptr, "CDELT3", 1.0, None)?;
            fits_write_double(fptr, "CRPIX3", 1.0, None)?;
            fits_write_string(fptr, "CUNIT3", "HZ", None)?;

            fits_write_string(fptr, "CTYPE4", "STOKES", None)?;
            fits_write_int(fptr, "CRVAL4", codes[0], None)?;
            fits_write_int(fptr, "CDELT4", stokes_delta, None)?;
            fits_write_int(fptr, "CRPIX4", 1, None)?;
        }
    }

    fits_write_double(fptr, "MJD-OBS", mjd, Some("[d] MJD of the image"))?;
    let (year, month, day, hour, minute, second, nanos) =
        Epoch::from_mjd_utc(mjd).to_gregorian_utc();
    fits_write_string(
        fptr,
        "DATE-OBS",
        &format!(
            "{year}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}.{:03}",
            nanos / 1_000_000
        ),
        None,
    )?;

    let software = format!("{} v{}", built_info::PKG_NAME, built_info::PKG_VERSION);
    fits_write_string(fptr, "ORIGIN", &software, None)?;
    let history = match built_info::GIT_COMMIT_HASH_SHORT {
        Some(hash) => format!("Written by {software} ({hash}) with the {convention} convention"),
        None => format!("Written by {software} with the {convention} convention"),
    };
    fits_write_history(fptr, &history)?;

    debug!(
        "saved frequency {freq_index} and epoch {time_index} of a {}x{} image to {}",
        dims.nx,
        dims.ny,
        path.display()
    );
    Ok(())
}

fn fits_write_int(
    fptr: *mut fitsio_sys::fitsfile,
    keyname: &str,
    value: i64,
    comment: Option<&str>,
) -> Result<(), ImageError> {
    let mut status = 0;
    let keyname = CString::new(keyname)?;
    let comment = match comment {
        Some(c) => Some(CString::new(c)?),
        None => None,
    };
    let comment_ptr = comment.as_ref().map_or(std::ptr::null(), |c| c.as_ptr());
    unsafe {
        // ffukyj = fits_update_key_lng
        fitsio_sys::ffukyj(
            fptr,                          /* I - FITS file pointer  */
            keyname.as_ptr(),              /* I - keyword name       */
            value,                         /* I - keyword value      */
            comment_ptr,                   /* I - keyword comment    */
            &mut status,                   /* IO - error status      */
        );
    }
    fits_check_status(status)?;
    Ok(())
}

fn fits_write_double(
    fptr: *mut fitsio_sys::fitsfile,
    keyname: &str,
    value: f64,
    comment: Option<&str>,
) -> Result<(), ImageError> {
    let mut status = 0;
    let keyname = CString::new(keyname)?;
    let comment = match comment {
        Some(c) => Some(CString::new(c)?),
        None => None,
    };
    let comment_ptr = comment.as_ref().map_or(std::ptr::null(), |c| c.as_ptr());
    unsafe {
        // ffukyd = fits_update_key_dbl
        fitsio_sys::ffukyd(
            fptr,                          /* I - FITS file pointer  */
            keyname.as_ptr(),              /* I - keyword name       */
            value,                         /* I - keyword value      */
            -17,                           /* I - no of decimals     */
            comment_ptr,                   /* I - keyword comment    */
            &mut status,                   /* IO - error status      */
        );
    }
    fits_check_status(status)?;
    Ok(())
}

fn fits_write_string(
    fptr: *mut fitsio_sys::fitsfile,
    keyname: &str,
    value: &str,
    comment: Option<&str>,
) -> Result<(), ImageError> {
    let mut status = 0;
    let keyname = CString::new(keyname)?;
    let value = CString::new(value)?;
    let comment = match comment {
        Some(c) => Some(CString::new(c)?),
        None => None,
    };
    let comment_ptr = comment.as_ref().map_or(std::ptr::null(), |c| c.as_ptr());
    unsafe {
        // ffukys = fits_update_key_str
        fitsio_sys::ffukys(
            fptr,                          /* I - FITS file pointer  */
            keyname.as_ptr(),              /* I - keyword name       */
            value.as_ptr(),                /* I - keyword value      */
            comment_ptr,                   /* I - keyword comment    */
            &mut status,                   /* IO - error status      */
        );
    }
    fits_check_status(status)?;
    Ok(())
}

fn fits_write_history(fptr: *mut fitsio_sys::fitsfile, history: &str) -> Result<(), ImageError> {
    let mut status = 0;
    let history = CString::new(history)?;
    unsafe {
        // ffphis = fits_write_history
        fitsio_sys::ffphis(
            fptr,
            history.as_ptr(),              /* I - history string     */
            &mut status,                   /* IO - error status      */
        );
    }
    fits_check_status(status)?;
    Ok(())
}
