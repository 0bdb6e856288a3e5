//! Entity identifiers for panel data.

use std::fmt;

/// Identifier of one entity (one independent series) in a panel.
///
/// Panels coming from a dataframe engine key entities either by a string
/// column or by an integer column. Integer keys order before string keys.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityId {
    Int(i64),
    Str(String),
}

impl EntityId {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            EntityId::Str(s) => Some(s),
            EntityId::Int(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            EntityId::Int(i) => Some(*i),
            EntityId::Str(_) => None,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Int(i) => write!(f, "{i}"),
            EntityId::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        EntityId::Str(value.to_string())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        EntityId::Str(value)
    }
}

impl From<i64> for EntityId {
    fn from(value: i64) -> Self {
        EntityId::Int(value)
    }
}

impl From<i32> for EntityId {
    fn from(value: i32) -> Self {
        EntityId::Int(i64::from(value))
    }
}
