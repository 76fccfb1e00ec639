use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::error::{Error, Result};
use crate::graph::TransformGraph;

/// Coordinate spaces an image can be expressed in.
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Debug,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Space {
    /// Native high resolution structural.
    Hr,
    /// Resting-state functional.
    Rs,
    /// Task functional.
    Fmri,
    /// Diffusion.
    Dti,
    /// Secondary structural.
    T2,
    /// Standard template, 2mm.
    Std,
    /// Standard template, 4mm.
    Std4,
}

impl Space {
    pub fn parse(name: &str) -> Result<Space> {
        Space::from_str(name).map_err(|_| Error::UnknownSpace(name.to_string()))
    }

    pub fn is_standard(&self) -> bool {
        matches!(self, Space::Std | Space::Std4)
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Isotropic voxel size of the standard templates.
    pub fn template_voxel_mm(&self) -> Option<f32> {
        match self {
            Space::Std => Some(2.0),
            Space::Std4 => Some(4.0),
            _ => None,
        }
    }
}

/// Ordered pair of distinct spaces, `from` -> `to`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct SpacePair {
    pub from: Space,
    pub to: Space,
}

impl SpacePair {
    pub const fn new(from: Space, to: Space) -> Self {
        assert!(from as u8 != to as u8, "SpacePair requires distinct spaces");
        Self { from, to }
    }

    pub fn reversed(&self) -> Self {
        Self::new(self.to, self.from)
    }

    /// File stem used for artifacts of this pair, e.g. `hr2std`.
    pub fn stem(&self) -> String {
        format!("{}2{}", self.from, self.to)
    }

    /// Legacy dispatch key, e.g. `hrTOstd`.
    pub fn key(&self) -> String {
        format!("{}TO{}", self.from, self.to)
    }
}

impl fmt::Display for SpacePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.from, self.to)
    }
}

/// What `transform_roi` should do to move an image between two spaces.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum RegistrationKey {
    /// A pair with estimated or composed artifacts in the registry.
    Registered(SpacePair),
    /// Plain isotropic resampling between the two template resolutions.
    Resample(SpacePair),
}

impl RegistrationKey {
    pub const STD_TO_STD4: RegistrationKey =
        RegistrationKey::Resample(SpacePair::new(Space::Std, Space::Std4));
    pub const STD4_TO_STD: RegistrationKey =
        RegistrationKey::Resample(SpacePair::new(Space::Std4, Space::Std));

    /// Builds a key for a pair, rejecting pairs with no route.
    pub fn for_pair(pair: SpacePair) -> Result<Self> {
        let key = if pair.from.is_standard() && pair.to.is_standard() {
            RegistrationKey::Resample(pair)
        } else {
            RegistrationKey::Registered(pair)
        };
        key.validate()?;
        Ok(key)
    }

    /// Resampling only links the two template resolutions; registered
    /// pairs must have a route in the transform graph.
    pub fn validate(&self) -> Result<()> {
        let valid = match self {
            RegistrationKey::Resample(pair) => pair.from.is_standard() && pair.to.is_standard(),
            RegistrationKey::Registered(pair) => TransformGraph::shared().contains(*pair),
        };
        if valid {
            Ok(())
        } else {
            Err(Error::UnknownRegistration(self.to_string()))
        }
    }

    pub fn pair(&self) -> SpacePair {
        match self {
            RegistrationKey::Registered(pair) | RegistrationKey::Resample(pair) => *pair,
        }
    }

    pub fn from_space(&self) -> Space {
        self.pair().from
    }

    pub fn to_space(&self) -> Space {
        self.pair().to
    }
}

impl fmt::Display for RegistrationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationKey::Registered(pair) => write!(f, "{}", pair.key()),
            RegistrationKey::Resample(pair) => write!(f, "{}", pair.stem()),
        }
    }
}

impl FromStr for RegistrationKey {
    type Err = Error;

    /// Accepts `<from>TO<to>` keys and the `std2std4` / `std42std` sentinels.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "std2std4" => return Ok(RegistrationKey::STD_TO_STD4),
            "std42std" => return Ok(RegistrationKey::STD4_TO_STD),
            _ => {}
        }

        let unknown = || Error::UnknownRegistration(s.to_string());
        let (from, to) = s.split_once("TO").ok_or_else(unknown)?;
        let from = Space::from_str(from).map_err(|_| unknown())?;
        let to = Space::from_str(to).map_err(|_| unknown())?;
        if from == to {
            return Err(unknown());
        }

        RegistrationKey::for_pair(SpacePair::new(from, to)).map_err(|_| unknown())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn spaces_round_trip_through_names() {
        let names: Vec<&str> = Space::iter().map(|s| s.as_str()).collect();
        assert_eq!(names, ["hr", "rs", "fmri", "dti", "t2", "std", "std4"]);

        for space in Space::iter() {
            assert_eq!(Space::from_str(&space.to_string()).unwrap(), space);
        }
        assert!(Space::from_str("mni").is_err());
        assert!(matches!(Space::parse("mni"), Err(Error::UnknownSpace(_))));
        assert_eq!(Space::parse("t2").unwrap(), Space::T2);
    }

    #[test]
    fn pair_names() {
        let pair = SpacePair::new(Space::Hr, Space::Std4);
        assert_eq!(pair.stem(), "hr2std4");
        assert_eq!(pair.key(), "hrTOstd4");
        assert_eq!(pair.reversed(), SpacePair::new(Space::Std4, Space::Hr));
    }

    #[test]
    #[should_panic(expected = "SpacePair requires distinct spaces")]
    fn pair_rejects_identical_spaces() {
        SpacePair::new(Space::Rs, Space::Rs);
    }

    #[test]
    fn parses_registered_keys() {
        let key: RegistrationKey = "dtiTOstd".parse().unwrap();
        assert_eq!(
            key,
            RegistrationKey::Registered(SpacePair::new(Space::Dti, Space::Std))
        );
        assert_eq!(key.to_string(), "dtiTOstd");
    }

    #[test]
    fn parses_resampling_sentinels() {
        assert_eq!(
            "std2std4".parse::<RegistrationKey>().unwrap(),
            RegistrationKey::STD_TO_STD4
        );
        assert_eq!(
            "std42std".parse::<RegistrationKey>().unwrap(),
            RegistrationKey::STD4_TO_STD
        );
        assert_eq!(
            "std4TOstd".parse::<RegistrationKey>().unwrap(),
            RegistrationKey::STD4_TO_STD
        );
        assert_eq!(RegistrationKey::STD_TO_STD4.to_string(), "std2std4");
    }

    #[test]
    fn hand_built_keys_are_validated() {
        let resample = RegistrationKey::Resample(SpacePair::new(Space::Hr, Space::Rs));
        assert!(matches!(resample.validate(), Err(Error::UnknownRegistration(key)) if key == "hr2rs"));

        let unrouted = RegistrationKey::Registered(SpacePair::new(Space::Rs, Space::Dti));
        assert!(matches!(unrouted.validate(), Err(Error::UnknownRegistration(_))));

        assert!(RegistrationKey::STD4_TO_STD.validate().is_ok());
        assert!(RegistrationKey::Registered(SpacePair::new(Space::Hr, Space::Std))
            .validate()
            .is_ok());
    }

    #[test]
    fn rejects_unknown_keys() {
        for key in ["", "hr", "hrTO", "hrTOhr", "mniTOhr", "rsTOdti", "hr2std"] {
            assert!(
                matches!(
                    key.parse::<RegistrationKey>(),
                    Err(Error::UnknownRegistration(_))
                ),
                "{key} should be rejected"
            );
        }
    }
}
