//! Version catalog for the handshake.
//!
//! A version table maps each protocol version number a peer is willing to
//! speak to the parameters that apply under that version. The shape of the
//! parameters is fixed by the version number: versions 1-3 carry the bare
//! network magic, versions 4-6 carry the magic plus a capability flag.

use std::collections::hash_map;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Protocol version number (always positive).
pub type VersionNumber = u32;

/// Network identifier carried in version parameters.
pub type Magic = i64;

/// Lowest version in the local catalog
pub const MIN_VERSION: VersionNumber = 1;

/// Highest version in the local catalog
pub const MAX_VERSION: VersionNumber = 6;

/// First version whose parameters are a [`ParamValue::Pair`]
pub const FIRST_PAIR_VERSION: VersionNumber = 4;

/// Shape of the parameters attached to a version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamShape {
    /// Bare network magic
    Scalar,
    /// Network magic plus capability flag
    Pair,
}

impl ParamShape {
    /// Expected parameter shape for a version in the catalog.
    ///
    /// Returns `None` for versions this implementation does not know, in
    /// which case the shape has to be taken from the peer's encoding.
    pub fn for_version(version: VersionNumber) -> Option<Self> {
        match version {
            MIN_VERSION..=3 => Some(Self::Scalar),
            FIRST_PAIR_VERSION..=MAX_VERSION => Some(Self::Pair),
            _ => None,
        }
    }

    /// Get descriptive name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Scalar => "scalar",
            Self::Pair => "pair",
        }
    }
}

impl std::fmt::Display for ParamShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Parameters that apply under a negotiated version.
///
/// The boolean in [`ParamValue::Pair`] is an opaque capability bit. It is
/// carried and compared but never interpreted here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Network magic only (versions 1-3)
    Scalar(Magic),
    /// Network magic and capability flag (versions 4-6)
    Pair(Magic, bool),
}

impl ParamValue {
    /// Shape of this value
    pub fn shape(&self) -> ParamShape {
        match self {
            Self::Scalar(_) => ParamShape::Scalar,
            Self::Pair(..) => ParamShape::Pair,
        }
    }

    /// Network magic carried by this value
    pub fn magic(&self) -> Magic {
        match self {
            Self::Scalar(magic) | Self::Pair(magic, _) => *magic,
        }
    }

    /// Check if this value has the shape `version` requires.
    ///
    /// Versions outside the catalog take either shape.
    pub fn fits(&self, version: VersionNumber) -> bool {
        match ParamShape::for_version(version) {
            Some(shape) => shape == self.shape(),
            None => true,
        }
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scalar(magic) => write!(f, "{magic}"),
            Self::Pair(magic, flag) => write!(f, "({magic}, {flag})"),
        }
    }
}

/// Mapping from version number to parameters, one entry per version.
///
/// Iteration order is unspecified. Anything that selects a version must do
/// so by value, never by position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionTable {
    entries: HashMap<VersionNumber, ParamValue>,
}

impl VersionTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the parameters for a version
    pub fn insert(&mut self, version: VersionNumber, params: ParamValue) -> Option<ParamValue> {
        self.entries.insert(version, params)
    }

    /// Builder-style insert
    pub fn with(mut self, version: VersionNumber, params: ParamValue) -> Self {
        self.insert(version, params);
        self
    }

    /// Parameters for a version, if present
    pub fn get(&self, version: VersionNumber) -> Option<&ParamValue> {
        self.entries.get(&version)
    }

    /// Check if a version is present
    pub fn contains(&self, version: VersionNumber) -> bool {
        self.entries.contains_key(&version)
    }

    /// Remove a version from the table
    pub fn remove(&mut self, version: VersionNumber) -> Option<ParamValue> {
        self.entries.remove(&version)
    }

    /// Number of versions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table has no versions
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Version numbers in ascending order
    pub fn versions(&self) -> Vec<VersionNumber> {
        let mut versions: Vec<_> = self.entries.keys().copied().collect();
        versions.sort_unstable();
        versions
    }

    /// Highest version in the table
    pub fn highest(&self) -> Option<VersionNumber> {
        self.entries.keys().copied().max()
    }

    /// Iterate over entries in unspecified order
    pub fn iter(&self) -> hash_map::Iter<'_, VersionNumber, ParamValue> {
        self.entries.iter()
    }

    /// Lowest version whose parameters have the wrong shape for it
    pub fn misshapen(&self) -> Option<VersionNumber> {
        self.entries
            .iter()
            .filter(|(version, params)| !params.fits(**version))
            .map(|(version, _)| *version)
            .min()
    }
}

impl FromIterator<(VersionNumber, ParamValue)> for VersionTable {
    fn from_iter<I: IntoIterator<Item = (VersionNumber, ParamValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for VersionTable {
    type Item = (VersionNumber, ParamValue);
    type IntoIter = hash_map::IntoIter<VersionNumber, ParamValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a VersionTable {
    type Item = (&'a VersionNumber, &'a ParamValue);
    type IntoIter = hash_map::Iter<'a, VersionNumber, ParamValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Build the local version table for a network.
///
/// Produces versions 1 through 6. Versions 1-3 map to the bare magic,
/// versions 4-6 to the magic with the capability flag cleared. Any magic is
/// accepted; whether it matches the peer's is a policy question.
pub fn default_versions(magic: Magic) -> VersionTable {
    (MIN_VERSION..=MAX_VERSION)
        .map(|version| {
            let params = match ParamShape::for_version(version) {
                Some(ParamShape::Pair) => ParamValue::Pair(magic, false),
                _ => ParamValue::Scalar(magic),
            };
            (version, params)
        })
        .collect()
}
