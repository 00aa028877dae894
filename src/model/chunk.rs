use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A fixed-size territorial unit: world name plus chunk-grid coordinates.
///
/// Serializes to a compact `world:x:z` token. The world name may itself
/// contain `:`; parsing splits from the right.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ChunkCoordinate {
    pub world: String,
    pub x: i32,
    pub z: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed chunk token `{0}`")]
pub struct ChunkParseError(pub String);

impl ChunkCoordinate {
    pub fn new(world: impl Into<String>, x: i32, z: i32) -> Self {
        Self {
            world: world.into(),
            x,
            z,
        }
    }

    pub fn token(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ChunkCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.world, self.x, self.z)
    }
}

impl FromStr for ChunkCoordinate {
    type Err = ChunkParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ChunkParseError(s.to_string());
        let mut parts = s.rsplitn(3, ':');
        let z = parts.next().ok_or_else(malformed)?;
        let x = parts.next().ok_or_else(malformed)?;
        let world = parts.next().ok_or_else(malformed)?;
        if world.is_empty() {
            return Err(malformed());
        }
        Ok(Self {
            world: world.to_string(),
            x: x.parse().map_err(|_| malformed())?,
            z: z.parse().map_err(|_| malformed())?,
        })
    }
}

impl From<ChunkCoordinate> for String {
    fn from(c: ChunkCoordinate) -> Self {
        c.to_string()
    }
}

impl TryFrom<String> for ChunkCoordinate {
    type Error = ChunkParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}
