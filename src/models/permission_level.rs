use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Capability tier a viewer holds for a document.
///
/// The absence of any tier is modelled as `Option::None` by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    Owner,
    Edit,
    Comment,
    View,
    Public,
}

impl PermissionLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Edit => "edit",
            Self::Comment => "comment",
            Self::View => "view",
            Self::Public => "public",
        }
    }

    /// Ordering by capability, `Owner` highest.
    pub fn rank(self) -> u8 {
        match self {
            Self::Owner => 4,
            Self::Edit => 3,
            Self::Comment => 2,
            Self::View => 1,
            Self::Public => 0,
        }
    }

    /// Whether this level may be granted through a share row.
    pub fn is_shareable(self) -> bool {
        matches!(self, Self::Edit | Self::Comment | Self::View)
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "owner" => Ok(Self::Owner),
            "edit" => Ok(Self::Edit),
            "comment" => Ok(Self::Comment),
            "view" => Ok(Self::View),
            "public" => Ok(Self::Public),
            other => Err(format!("unknown permission level: {other}")),
        }
    }
}
