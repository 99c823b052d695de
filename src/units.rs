// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Angular units. Conversions are linear scalings to and from radians.

use std::{f64::consts::PI, fmt, str::FromStr};

use crate::metadata::SchemaError;

const DEG2RAD: f64 = PI / 180.0;

/// An angular unit that pixel sizes and grids can be expressed in. Images
/// always store angles in radians.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AngularUnit {
    #[default]
    Radian,
    Degree,
    Arcminute,
    Arcsecond,
    Milliarcsecond,
    Microarcsecond,
}

impl AngularUnit {
    /// The size of one of this unit \[radians\].
    pub fn radians(self) -> f64 {
        match self {
            AngularUnit::Radian => 1.0,
            AngularUnit::Degree => DEG2RAD,
            AngularUnit::Arcminute => DEG2RAD / 60.0,
            AngularUnit::Arcsecond => DEG2RAD / 3600.0,
            AngularUnit::Milliarcsecond => DEG2RAD / 3600e3,
            AngularUnit::Microarcsecond => DEG2RAD / 3600e6,
        }
    }

    /// Convert a value in this unit to radians.
    pub fn to_radians(self, value: f64) -> f64 {
        value * self.radians()
    }

    /// Convert a value in radians to this unit.
    pub fn from_radians(self, value: f64) -> f64 {
        value / self.radians()
    }

    /// Interpret a FITS `CUNITn` value. A blank unit means degrees, as the
    /// FITS standard prescribes for celestial axes.
    pub fn from_fits_unit(cunit: &str) -> Option<AngularUnit> {
        match cunit.trim().to_ascii_uppercase().as_str() {
            "" | "DEG" | "DEGREE" | "DEGREES" => Some(AngularUnit::Degree),
            "RAD" => Some(AngularUnit::Radian),
            "ARCMIN" => Some(AngularUnit::Arcminute),
            "ARCSEC" => Some(AngularUnit::Arcsecond),
            "MAS" => Some(AngularUnit::Milliarcsecond),
            "UAS" => Some(AngularUnit::Microarcsecond),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AngularUnit::Radian => "rad",
            AngularUnit::Degree => "deg",
            AngularUnit::Arcminute => "arcmin",
            AngularUnit::Arcsecond => "arcsec",
            AngularUnit::Milliarcsecond => "mas",
            AngularUnit::Microarcsecond => "uas",
        }
    }
}

impl fmt::Display for AngularUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for AngularUnit {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "rad" | "radian" | "radians" => Ok(AngularUnit::Radian),
            "deg" | "degree" | "degrees" => Ok(AngularUnit::Degree),
            "arcmin" | "amin" => Ok(AngularUnit::Arcminute),
            "arcsec" | "asec" => Ok(AngularUnit::Arcsecond),
            "mas" => Ok(AngularUnit::Milliarcsecond),
            "uas" | "μas" | "µas" => Ok(AngularUnit::Microarcsecond),
            other => Err(SchemaError::IncompatibleValue {
                key: "angunit".to_string(),
                value: other.to_string(),
                allowed: "rad, deg, arcmin, arcsec, mas, uas".to_string(),
            }),
        }
    }
}
