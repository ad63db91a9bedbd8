//! Encoding formats.
//!
//! Every content hash is computed under a [`Format`]. The format's version
//! tag is mixed into the encoding of every node, so the same logical value
//! hashes differently under different formats. Anything that orders values
//! by hash (composite map keys, hash-indexed paths) must therefore be told
//! which format it is working in.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A value encoding version.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    /// The original encoding, kept readable for old repositories.
    Legacy,
    /// The current encoding.
    #[default]
    Current,
}

impl Format {
    /// Number of known formats (used to size per-format caches).
    pub const COUNT: usize = 2;

    /// All known formats, oldest first.
    pub const ALL: [Self; Self::COUNT] = [Self::Legacy, Self::Current];

    /// Dense index of this format, `0..COUNT`.
    #[must_use]
    pub const fn slot(self) -> usize {
        match self {
            Self::Legacy => 0,
            Self::Current => 1,
        }
    }

    /// The version byte written at the head of every encoded node.
    #[must_use]
    pub const fn version_tag(self) -> u8 {
        match self {
            Self::Legacy => 7,
            Self::Current => 8,
        }
    }

    /// Stable lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Current => "current",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|format| format.name() == s)
            .ok_or_else(|| format!("unknown format {s:?} (expected \"legacy\" or \"current\")"))
    }
}
