// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The metadata schema shared by in-memory images, disk images and both
//! file formats.
//!
//! The vocabulary is closed: every [`MetaKey`] has a declared [`MetaType`],
//! a default value and, for some keys, a set of compatible values. Keys
//! outside the vocabulary are carried along as "extra" metadata but are
//! never required.

use std::{collections::BTreeMap, fmt, path::PathBuf};

use lazy_static::lazy_static;
use thiserror::Error;

use crate::constants::{FORMAT_NAME, FORMAT_VERSION};

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("required metadata key {key:?} is missing")]
    MissingKey { key: String },

    #[error("metadata key {key:?} should be of type {expected}, received {received}")]
    WrongType {
        key: String,
        expected: MetaType,
        received: MetaType,
    },

    #[error("value {value:?} is not compatible with key {key:?}; available values are: {allowed}")]
    IncompatibleValue {
        key: String,
        value: String,
        allowed: String,
    },

    #[error("value {value} of key {key:?} is out of range; it must be {constraint}")]
    OutOfRange {
        key: String,
        value: String,
        constraint: &'static str,
    },

    #[error("dimension {dimension:?} has size {received}, expected {expected}")]
    DimensionMismatch {
        dimension: String,
        expected: usize,
        received: usize,
    },

    #[error("{0} polarisations were supplied; only 1 (single) or 4 (full) are supported")]
    BadPolarisationCount(usize),

    #[error("bad array shape supplied to argument {argument} of function {function}. expected {expected}, received {received}")]
    BadArrayShape {
        argument: String,
        function: String,
        expected: String,
        received: String,
    },

    #[error("group {group:?} already exists in {}; use overwrite to replace the file", path.display())]
    GroupExists { path: PathBuf, group: String },

    #[error("group {group:?} does not exist in {}", path.display())]
    MissingGroup { path: PathBuf, group: String },

    #[error("dimension {name:?} is missing from group {group:?}")]
    MissingDimension { group: String, name: String },

    #[error("variable {name:?} is missing from group {group:?}")]
    MissingVariable { group: String, name: String },

    #[error("variable {name:?} has dimensions {received:?}, expected {expected:?}")]
    VariableLayout {
        name: String,
        expected: Vec<String>,
        received: Vec<String>,
    },

    #[error("variable {name:?} is of type {received}, expected {expected}")]
    VariableType {
        name: String,
        expected: &'static str,
        received: String,
    },

    #[error("HDU {hdu} is not an image HDU")]
    NotAnImage { hdu: usize },

    #[error("FITS axis {axis} ({ctype:?}) has length {len}; only FREQ and STOKES axes may be longer than 1")]
    UnsupportedAxis {
        axis: usize,
        ctype: String,
        len: usize,
    },
}

/// The declared type of a metadata key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MetaType {
    Str,
    Float,
    Int,
}

impl fmt::Display for MetaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaType::Str => write!(f, "string"),
            MetaType::Float => write!(f, "float"),
            MetaType::Int => write!(f, "integer"),
        }
    }
}

/// A metadata value.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum MetaValue {
    Str(String),
    Int(i64),
    Float(f64),
}

impl MetaValue {
    pub fn value_type(&self) -> MetaType {
        match self {
            MetaValue::Str(_) => MetaType::Str,
            MetaValue::Float(_) => MetaType::Float,
            MetaValue::Int(_) => MetaType::Int,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetaValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetaValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Convert this value to `ty` where the schema allows it. Integers
    /// widen to floats; nothing else converts.
    pub fn coerce(self, ty: MetaType) -> Option<MetaValue> {
        match (self, ty) {
            (v, ty) if v.value_type() == ty => Some(v),
            (MetaValue::Int(i), MetaType::Float) => Some(MetaValue::Float(i as f64)),
            _ => None,
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Str(s) => write!(f, "{s}"),
            MetaValue::Float(v) => write!(f, "{v}"),
            MetaValue::Int(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        MetaValue::Str(s.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        MetaValue::Str(s)
    }
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        MetaValue::Float(v)
    }
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        MetaValue::Int(v)
    }
}

impl From<usize> for MetaValue {
    fn from(v: usize) -> Self {
        MetaValue::Int(v as i64)
    }
}

/// The set of values a key may take.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compat {
    Unbounded,
    Strings(&'static [&'static str]),
    Ints(&'static [i64]),
}

impl Compat {
    pub fn contains(&self, value: &MetaValue) -> bool {
        match (self, value) {
            (Compat::Unbounded, _) => true,
            (Compat::Strings(allowed), MetaValue::Str(s)) => allowed.contains(&s.as_str()),
            (Compat::Ints(allowed), MetaValue::Int(i)) => allowed.contains(i),
            _ => false,
        }
    }
}

impl fmt::Display for Compat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compat::Unbounded => write!(f, "any"),
            Compat::Strings(allowed) => write!(f, "{}", allowed.join(", ")),
            Compat::Ints(allowed) => {
                let allowed: Vec<String> = allowed.iter().map(|i| i.to_string()).collect();
                write!(f, "{}", allowed.join(", "))
            }
        }
    }
}

/// Numeric constraints on top of the declared type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Range {
    Any,
    AtLeastOne,
    Positive,
}

/// The schema keys. Declaration order is the canonical key order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum MetaKey {
    Format,
    Version,
    Source,
    Instrument,
    Observer,
    Coordsys,
    Equinox,
    Nx,
    Dx,
    Xref,
    Ixref,
    Xunit,
    Ny,
    Dy,
    Yref,
    Iyref,
    Yunit,
    Np,
    Polrep,
    Nf,
    Funit,
    Nt,
    Tunit,
    Fluxunit,
    Pulsetype,
}

impl MetaKey {
    pub const ALL: [MetaKey; 25] = [
        MetaKey::Format,
        MetaKey::Version,
        MetaKey::Source,
        MetaKey::Instrument,
        MetaKey::Observer,
        MetaKey::Coordsys,
        MetaKey::Equinox,
        MetaKey::Nx,
        MetaKey::Dx,
        MetaKey::Xref,
        MetaKey::Ixref,
        MetaKey::Xunit,
        MetaKey::Ny,
        MetaKey::Dy,
        MetaKey::Yref,
        MetaKey::Iyref,
        MetaKey::Yunit,
        MetaKey::Np,
        MetaKey::Polrep,
        MetaKey::Nf,
        MetaKey::Funit,
        MetaKey::Nt,
        MetaKey::Tunit,
        MetaKey::Fluxunit,
        MetaKey::Pulsetype,
    ];

    /// The name used for this key in files.
    pub fn name(self) -> &'static str {
        match self {
            MetaKey::Format => "format",
            MetaKey::Version => "version",
            MetaKey::Source => "source",
            MetaKey::Instrument => "instrument",
            MetaKey::Observer => "observer",
            MetaKey::Coordsys => "coordsys",
            MetaKey::Equinox => "equinox",
            MetaKey::Nx => "nx",
            MetaKey::Dx => "dx",
            MetaKey::Xref => "xref",
            MetaKey::Ixref => "ixref",
            MetaKey::Xunit => "xunit",
            MetaKey::Ny => "ny",
            MetaKey::Dy => "dy",
            MetaKey::Yref => "yref",
            MetaKey::Iyref => "iyref",
            MetaKey::Yunit => "yunit",
            MetaKey::Np => "np",
            MetaKey::Polrep => "polrep",
            MetaKey::Nf => "nf",
            MetaKey::Funit => "funit",
            MetaKey::Nt => "nt",
            MetaKey::Tunit => "tunit",
            MetaKey::Fluxunit => "fluxunit",
            MetaKey::Pulsetype => "pulsetype",
        }
    }

    pub fn from_name(name: &str) -> Option<MetaKey> {
        MetaKey::ALL.into_iter().find(|k| k.name() == name)
    }

    pub fn value_type(self) -> MetaType {
        match self {
            MetaKey::Equinox
            | MetaKey::Dx
            | MetaKey::Xref
            | MetaKey::Ixref
            | MetaKey::Dy
            | MetaKey::Yref
            | MetaKey::Iyref => MetaType::Float,
            MetaKey::Nx | MetaKey::Ny | MetaKey::Np | MetaKey::Nf | MetaKey::Nt => MetaType::Int,
            _ => MetaType::Str,
        }
    }

    pub fn compatible_values(self) -> Compat {
        match self {
            MetaKey::Format => Compat::Strings(&[FORMAT_NAME]),
            MetaKey::Version => Compat::Strings(&[FORMAT_VERSION]),
            MetaKey::Coordsys => Compat::Strings(&["icrs", "fk5", "fk4"]),
            MetaKey::Xunit | MetaKey::Yunit => Compat::Strings(&["rad"]),
            MetaKey::Funit => Compat::Strings(&["Hz"]),
            MetaKey::Tunit => Compat::Strings(&["MJD"]),
            MetaKey::Fluxunit => Compat::Strings(&["Jy/Pixel"]),
            MetaKey::Polrep => Compat::Strings(&["stokes", "circular", "linear"]),
            MetaKey::Pulsetype => Compat::Strings(&["delta", "rectangle"]),
            MetaKey::Np => Compat::Ints(&[1, 4]),
            _ => Compat::Unbounded,
        }
    }

    fn range(self) -> Range {
        match self {
            MetaKey::Nx | MetaKey::Ny | MetaKey::Nf | MetaKey::Nt => Range::AtLeastOne,
            MetaKey::Dx | MetaKey::Dy => Range::Positive,
            _ => Range::Any,
        }
    }

    /// The default value of this key.
    pub fn default_value(self) -> MetaValue {
        match self {
            MetaKey::Format => FORMAT_NAME.into(),
            MetaKey::Version => FORMAT_VERSION.into(),
            MetaKey::Source => "Nameless Source".into(),
            MetaKey::Instrument => "Nameless Instrument".into(),
            MetaKey::Observer => "Nameless Observer".into(),
            MetaKey::Coordsys => "icrs".into(),
            MetaKey::Equinox => MetaValue::Float(-1.0),
            MetaKey::Nx | MetaKey::Ny | MetaKey::Np | MetaKey::Nf | MetaKey::Nt => {
                MetaValue::Int(1)
            }
            MetaKey::Dx | MetaKey::Dy => MetaValue::Float(1.0),
            MetaKey::Xref | MetaKey::Yref => MetaValue::Float(0.0),
            MetaKey::Ixref | MetaKey::Iyref => MetaValue::Float(1.0),
            MetaKey::Xunit | MetaKey::Yunit => "rad".into(),
            MetaKey::Polrep => "stokes".into(),
            MetaKey::Funit => "Hz".into(),
            MetaKey::Tunit => "MJD".into(),
            MetaKey::Fluxunit => "Jy/Pixel".into(),
            MetaKey::Pulsetype => "delta".into(),
        }
    }
}

impl fmt::Display for MetaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Check `value` against the declared type, compatible values and range of
/// `key`.
pub fn check(key: MetaKey, value: &MetaValue) -> Result<(), SchemaError> {
    let expected = key.value_type();
    if value.value_type() != expected {
        return Err(SchemaError::WrongType {
            key: key.name().to_string(),
            expected,
            received: value.value_type(),
        });
    }

    let compat = key.compatible_values();
    if !compat.contains(value) {
        return Err(SchemaError::IncompatibleValue {
            key: key.name().to_string(),
            value: value.to_string(),
            allowed: compat.to_string(),
        });
    }

    let in_range = match (key.range(), value) {
        (Range::Any, _) => true,
        (Range::AtLeastOne, MetaValue::Int(i)) => *i >= 1,
        (Range::Positive, MetaValue::Float(v)) => v.is_finite() && *v > 0.0,
        _ => false,
    };
    if !in_range {
        return Err(SchemaError::OutOfRange {
            key: key.name().to_string(),
            value: value.to_string(),
            constraint: match key.range() {
                Range::AtLeastOne => "at least 1",
                _ => "finite and positive",
            },
        });
    }
    Ok(())
}

/// Whether `value` is valid for `key`.
pub fn validate(key: MetaKey, value: &MetaValue) -> bool {
    check(key, value).is_ok()
}

/// The compatible values of `key`.
pub fn compatible_values(key: MetaKey) -> Compat {
    key.compatible_values()
}

/// Ordered image metadata. Schema keys are kept in canonical order, followed
/// by any extra keys in lexical order.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Metadata {
    known: BTreeMap<MetaKey, MetaValue>,
    extra: BTreeMap<String, MetaValue>,
}

lazy_static! {
    /// The process-wide default metadata.
    pub static ref DEFAULT_METADATA: Metadata = Metadata {
        known: MetaKey::ALL
            .into_iter()
            .map(|k| (k, k.default_value()))
            .collect(),
        extra: BTreeMap::new(),
    };
}

/// A copy of the default metadata.
pub fn default_metadata() -> Metadata {
    DEFAULT_METADATA.clone()
}

impl Default for Metadata {
    fn default() -> Self {
        default_metadata()
    }
}

impl Metadata {
    /// Metadata with no keys at all. Decoders start from this so that missing
    /// keys are detected by [`Metadata::validate_complete`].
    pub fn empty() -> Self {
        Self {
            known: BTreeMap::new(),
            extra: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: MetaKey) -> Option<&MetaValue> {
        self.known.get(&key)
    }

    pub fn get_extra(&self, name: &str) -> Option<&MetaValue> {
        self.extra.get(name)
    }

    /// Set a schema key after validating the value.
    pub fn set<V: Into<MetaValue>>(&mut self, key: MetaKey, value: V) -> Result<(), SchemaError> {
        let value = value.into();
        check(key, &value)?;
        self.known.insert(key, value);
        Ok(())
    }

    /// Set a key by name. Names in the schema are validated; others are
    /// stored as extra metadata.
    pub fn set_by_name<V: Into<MetaValue>>(
        &mut self,
        name: &str,
        value: V,
    ) -> Result<(), SchemaError> {
        match MetaKey::from_name(name) {
            Some(key) => self.set(key, value),
            None => {
                self.extra.insert(name.to_string(), value.into());
                Ok(())
            }
        }
    }

    /// Set a key outside the schema. Schema key names are refused.
    pub fn set_extra<V: Into<MetaValue>>(
        &mut self,
        name: &str,
        value: V,
    ) -> Result<(), SchemaError> {
        if MetaKey::from_name(name).is_some() {
            return Err(SchemaError::IncompatibleValue {
                key: name.to_string(),
                value: "extra metadata".to_string(),
                allowed: "schema keys must be set with Metadata::set".to_string(),
            });
        }
        self.extra.insert(name.to_string(), value.into());
        Ok(())
    }

    fn required(&self, key: MetaKey) -> Result<&MetaValue, SchemaError> {
        self.known.get(&key).ok_or_else(|| SchemaError::MissingKey {
            key: key.name().to_string(),
        })
    }

    fn wrong_type(key: MetaKey, value: &MetaValue) -> SchemaError {
        SchemaError::WrongType {
            key: key.name().to_string(),
            expected: key.value_type(),
            received: value.value_type(),
        }
    }

    pub fn float(&self, key: MetaKey) -> Result<f64, SchemaError> {
        let value = self.required(key)?;
        value.as_f64().ok_or_else(|| Self::wrong_type(key, value))
    }

    pub fn int(&self, key: MetaKey) -> Result<i64, SchemaError> {
        let value = self.required(key)?;
        value.as_i64().ok_or_else(|| Self::wrong_type(key, value))
    }

    /// An integer key that counts something (an axis length).
    pub fn count(&self, key: MetaKey) -> Result<usize, SchemaError> {
        let value = self.int(key)?;
        usize::try_from(value).map_err(|_| SchemaError::OutOfRange {
            key: key.name().to_string(),
            value: value.to_string(),
            constraint: "at least 1",
        })
    }

    pub fn str(&self, key: MetaKey) -> Result<&str, SchemaError> {
        let value = self.required(key)?;
        value.as_str().ok_or_else(|| Self::wrong_type(key, value))
    }

    /// Iterate over all keys by name: schema keys first in canonical order,
    /// then extra keys.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetaValue)> {
        self.known
            .iter()
            .map(|(k, v)| (k.name(), v))
            .chain(self.extra.iter().map(|(k, v)| (k.as_str(), v)))
    }

    pub fn len(&self) -> usize {
        self.known.len() + self.extra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check that every schema key is present with a valid value.
    pub fn validate_complete(&self) -> Result<(), SchemaError> {
        for key in MetaKey::ALL {
            check(key, self.required(key)?)?;
        }
        Ok(())
    }
}
