//! Threat classifications and lookup verdicts.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Classes of threats the service maintains lists for. Each subscribed
/// list is identified by one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreatType {
    /// Parse sentinel; never a valid subscription.
    #[serde(rename = "THREAT_TYPE_UNSPECIFIED")]
    Unspecified,
    Malware,
    SocialEngineering,
    UnwantedSoftware,
    SocialEngineeringExtendedCoverage,
}

/// The lists a client subscribes to when none are configured.
pub const DEFAULT_THREAT_LISTS: [ThreatType; 4] = [
    ThreatType::Malware,
    ThreatType::SocialEngineering,
    ThreatType::UnwantedSoftware,
    ThreatType::SocialEngineeringExtendedCoverage,
];

impl ThreatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatType::Unspecified => "THREAT_TYPE_UNSPECIFIED",
            ThreatType::Malware => "MALWARE",
            ThreatType::SocialEngineering => "SOCIAL_ENGINEERING",
            ThreatType::UnwantedSoftware => "UNWANTED_SOFTWARE",
            ThreatType::SocialEngineeringExtendedCoverage => {
                "SOCIAL_ENGINEERING_EXTENDED_COVERAGE"
            }
        }
    }
}

impl fmt::Display for ThreatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThreatType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "MALWARE" => Ok(ThreatType::Malware),
            "SOCIAL_ENGINEERING" => Ok(ThreatType::SocialEngineering),
            "UNWANTED_SOFTWARE" => Ok(ThreatType::UnwantedSoftware),
            "SOCIAL_ENGINEERING_EXTENDED_COVERAGE" => {
                Ok(ThreatType::SocialEngineeringExtendedCoverage)
            }
            other => Err(Error::InvalidConfig(format!(
                "unknown threat type: {other}"
            ))),
        }
    }
}

/// Parses a comma-separated list of threat type names, e.g.
/// `"MALWARE,SOCIAL_ENGINEERING"`. `"ALL"` (alone or as any element) and
/// the empty string both map to [`DEFAULT_THREAT_LISTS`].
pub fn parse_threat_types(arg: &str) -> Result<Vec<ThreatType>> {
    if arg.is_empty() || arg == "ALL" {
        return Ok(DEFAULT_THREAT_LISTS.to_vec());
    }
    let mut out = Vec::new();
    for name in arg.split(',') {
        if name == "ALL" {
            return Ok(DEFAULT_THREAT_LISTS.to_vec());
        }
        out.push(name.parse()?);
    }
    Ok(out)
}

/// A single blocklist hit for a looked-up URL: the canonical expression
/// that matched and the list it matched on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlThreat {
    pub pattern: String,
    pub threat_type: ThreatType,
}
