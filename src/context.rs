// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Observation metadata that images can borrow descriptors from.

use std::fmt;

use crate::metadata::{MetaKey, MetaValue};

/// A struct containing a Right Ascension and Declination. All units are in
/// radians.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(clippy::upper_case_acronyms)]
pub struct RADec {
    /// Right ascension \[radians\]
    pub ra: f64,

    /// Declination \[radians\]
    pub dec: f64,
}

impl RADec {
    /// Make a new [`RADec`] struct from values in radians.
    pub fn from_radians(ra: f64, dec: f64) -> RADec {
        Self { ra, dec }
    }

    /// Make a new [`RADec`] struct from values in degrees.
    pub fn from_degrees(ra: f64, dec: f64) -> RADec {
        Self {
            ra: ra.to_radians(),
            dec: dec.to_radians(),
        }
    }
}

impl fmt::Display for RADec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.4}°, {:.4}°)",
            self.ra.to_degrees(),
            self.dec.to_degrees()
        )
    }
}

/// An observation dataset (e.g. calibrated visibilities) that an image was
/// or will be made from.
pub trait ObsMetadata {
    /// Name of the observed source.
    fn source(&self) -> &str;

    /// Name of the instrument / array.
    fn instrument(&self) -> &str;

    /// The observer or creator of the observation.
    fn observer(&self) -> &str;

    /// Celestial coordinate system, e.g. `icrs`.
    fn coordsys(&self) -> &str;

    /// Equinox of the coordinate system \[years\]; negative when the system
    /// has none.
    fn equinox(&self) -> f64;

    /// The phase centre.
    fn phase_centre(&self) -> RADec;
}

/// A plain container of observation descriptors.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ObsContext {
    pub source: String,
    pub instrument: String,
    pub observer: String,
    pub coordsys: String,
    pub equinox: f64,
    pub phase_centre: RADec,
}

impl ObsMetadata for ObsContext {
    fn source(&self) -> &str {
        &self.source
    }

    fn instrument(&self) -> &str {
        &self.instrument
    }

    fn observer(&self) -> &str {
        &self.observer
    }

    fn coordsys(&self) -> &str {
        &self.coordsys
    }

    fn equinox(&self) -> f64 {
        self.equinox
    }

    fn phase_centre(&self) -> RADec {
        self.phase_centre
    }
}

/// The metadata keys that are taken from an observation. Everything else in
/// an image's metadata describes the image itself.
pub const OBS_KEYS: [MetaKey; 7] = [
    MetaKey::Source,
    MetaKey::Instrument,
    MetaKey::Observer,
    MetaKey::Coordsys,
    MetaKey::Equinox,
    MetaKey::Xref,
    MetaKey::Yref,
];

/// The values of [`OBS_KEYS`] for the given observation.
pub fn obs_metadata_values(obs: &dyn ObsMetadata) -> [(MetaKey, MetaValue); 7] {
    let centre = obs.phase_centre();
    [
        (MetaKey::Source, obs.source().into()),
        (MetaKey::Instrument, obs.instrument().into()),
        (MetaKey::Observer, obs.observer().into()),
        (MetaKey::Coordsys, obs.coordsys().to_lowercase().into()),
        (MetaKey::Equinox, obs.equinox().into()),
        (MetaKey::Xref, centre.ra.into()),
        (MetaKey::Yref, centre.dec.into()),
    ]
}
