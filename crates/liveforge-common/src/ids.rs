//! The content identifier shared by both halves of a live photo.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier embedded in both the still image and the movie.
///
/// Rendered as an upper-case hyphenated UUID, which is the form the photo
/// library compares when pairing the two files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentIdentifier(Uuid);

impl ContentIdentifier {
    /// Create a new random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return the inner UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ContentIdentifier {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContentIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = Uuid::encode_buffer();
        f.write_str(self.0.hyphenated().encode_upper(&mut buf))
    }
}

impl FromStr for ContentIdentifier {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for ContentIdentifier {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<ContentIdentifier> for Uuid {
    fn from(id: ContentIdentifier) -> Self {
        id.0
    }
}
