//! Region, event-kind, and phase enumerations.

use serde::{Deserialize, Serialize};

/// Deployment region with an independent backend and database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionTag {
    Jp,
    En,
    Tw,
    Kr,
    Cn,
}

impl RegionTag {
    /// All known regions, in canonical order.
    pub const ALL: [RegionTag; 5] = [
        RegionTag::Jp,
        RegionTag::En,
        RegionTag::Tw,
        RegionTag::Kr,
        RegionTag::Cn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RegionTag::Jp => "jp",
            RegionTag::En => "en",
            RegionTag::Tw => "tw",
            RegionTag::Kr => "kr",
            RegionTag::Cn => "cn",
        }
    }
}

impl std::fmt::Display for RegionTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RegionTag {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jp" => Ok(RegionTag::Jp),
            "en" => Ok(RegionTag::En),
            "tw" => Ok(RegionTag::Tw),
            "kr" => Ok(RegionTag::Kr),
            "cn" => Ok(RegionTag::Cn),
            other => Err(crate::Error::config_invalid(format!(
                "unknown region tag: {other}"
            ))),
        }
    }
}

/// Competitive event kind from the master catalog.
///
/// The catalog is open-ended; kinds this tracker does not special-case are
/// folded into `Other` and tracked like a marathon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Marathon,
    CheerfulCarnival,
    WorldBloom,
    #[serde(other)]
    Other,
}

impl EventKind {
    pub fn is_world_bloom(&self) -> bool {
        matches!(self, EventKind::WorldBloom)
    }
}

/// Lifecycle phase of an event or a world-bloom chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPhase {
    NotStarted,
    Ongoing,
    Aggregating,
    Ended,
}
