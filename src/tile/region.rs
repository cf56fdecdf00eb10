use std::fmt;
use std::str::FromStr;

use crate::error::TileError;

/// A pixel region `x,y,w,h` in full-resolution coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    pub x: u64,
    pub y: u64,
    pub width: u64,
    pub height: u64,
}

impl Region {
    /// Parse the IIIF region path segment.
    ///
    /// Exactly four comma-separated runs of ASCII digits. Anything else is a
    /// [`TileError::BadRequest`] echoing the input.
    pub fn parse(input: &str) -> Result<Self, TileError> {
        let bad = || TileError::BadRequest {
            input: input.to_string(),
        };

        let mut parts = input.split(',');
        let mut next = || -> Result<u64, TileError> {
            let part = parts.next().ok_or_else(bad)?;
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(bad());
            }
            part.parse::<u64>().map_err(|_| bad())
        };

        let region = Region {
            x: next()?,
            y: next()?,
            width: next()?,
            height: next()?,
        };

        if parts.next().is_some() {
            return Err(bad());
        }
        Ok(region)
    }
}

impl FromStr for Region {
    type Err = TileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Region::parse(s)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x, self.y, self.width, self.height)
    }
}
