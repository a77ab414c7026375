//! Architectural layer inferred from a class name

use serde::{Serialize, Serializer};
use std::fmt;

/// Coarse label prefixed to every performance record of a class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LayerTag {
    /// Name contains `service`
    Service,
    /// Name contains `repo`
    Repository,
    /// Name contains `resolver`
    Resolver,
    /// Name contains `controller`
    Controller,
    /// No marker in the name
    #[default]
    Unknown,
}

/// Substring checks in evaluation order; a later match overrides an earlier one.
const MARKERS: [(&str, LayerTag); 4] = [
    ("service", LayerTag::Service),
    ("repo", LayerTag::Repository),
    ("resolver", LayerTag::Resolver),
    ("controller", LayerTag::Controller),
];

impl LayerTag {
    /// Infer the tag from a class name, case-insensitively.
    ///
    /// `OrderServiceResolver` is a `Resolver`: the checks run in the order
    /// service, repo, resolver, controller and the last hit wins.
    pub fn infer(class_name: &str) -> Self {
        let lower = class_name.to_lowercase();
        MARKERS
            .iter()
            .filter(|(marker, _)| lower.contains(marker))
            .map(|(_, tag)| *tag)
            .last()
            .unwrap_or_default()
    }

    /// Label used in log output; empty for [`LayerTag::Unknown`]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Service => "Service",
            Self::Repository => "Repository",
            Self::Resolver => "Resolver",
            Self::Controller => "Controller",
            Self::Unknown => "",
        }
    }
}

impl fmt::Display for LayerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for LayerTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
