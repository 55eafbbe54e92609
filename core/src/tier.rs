use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// One of the four standard thumbnail size classes defined by the
/// freedesktop.org thumbnail cache layout. The value is the target length
/// of the longest edge in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SizeTier {
    Normal,
    Large,
    XLarge,
    XxLarge,
}

impl SizeTier {
    /// Every tier a run produces, smallest first.
    pub const ALL: [SizeTier; 4] = [
        SizeTier::Normal,
        SizeTier::Large,
        SizeTier::XLarge,
        SizeTier::XxLarge,
    ];

    /// Longest-edge pixel target for this tier.
    pub fn pixels(self) -> u32 {
        match self {
            Self::Normal => 128,
            Self::Large => 256,
            Self::XLarge => 512,
            Self::XxLarge => 1024,
        }
    }

    /// Subdirectory of the cache root this tier's entries live in.
    pub fn directory_name(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Large => "large",
            Self::XLarge => "x-large",
            Self::XxLarge => "xx-large",
        }
    }
}

impl Display for SizeTier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.directory_name())
    }
}
