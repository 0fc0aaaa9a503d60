use std::str::FromStr;

use derive_more::Display;
use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;
use tracing::warn;

/// Software version reported by a Malcolm server.
#[derive(
    Debug,
    Clone,
    Copy,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Display,
    SerializeDisplay,
    DeserializeFromStr,
)]
#[display("{major}.{minor}.{patch}")]
pub struct MalcolmVersion {
    major: u32,
    minor: u32,
    patch: u32,
}

/// Errors returned when a version string cannot be parsed.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum VersionParseError {
    #[error("version string is empty")]
    Empty,
    #[error("version component `{component}` in `{text}` is not a number")]
    InvalidComponent { text: String, component: String },
}

impl MalcolmVersion {
    /// Used whenever the remote version is missing or unparseable.
    pub const FALLBACK: Self = Self::new(0, 0, 0);

    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parses `text`, logging and returning [`MalcolmVersion::FALLBACK`] on failure.
    #[must_use]
    pub fn parse_or_fallback(text: &str) -> Self {
        text.parse().unwrap_or_else(|error| {
            warn!(%error, version = text, "unparseable Malcolm version, using fallback");
            Self::FALLBACK
        })
    }

    #[must_use]
    pub fn major(self) -> u32 {
        self.major
    }

    #[must_use]
    pub fn minor(self) -> u32 {
        self.minor
    }

    #[must_use]
    pub fn patch(self) -> u32 {
        self.patch
    }
}

impl FromStr for MalcolmVersion {
    type Err = VersionParseError;

    /// Accepts `4`, `4.2`, `4.2.1`, an optional leading `v`, and ignores any
    /// pre-release or build suffix after `-` or `+`.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let trimmed = text.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let core = trimmed
            .split(['-', '+'])
            .next()
            .unwrap_or_default();
        if core.is_empty() {
            return Err(VersionParseError::Empty);
        }

        let mut components = [0_u32; 3];
        for (slot, component) in components.iter_mut().zip(core.split('.')) {
            *slot = component
                .parse()
                .map_err(|_error| VersionParseError::InvalidComponent {
                    text: text.to_string(),
                    component: component.to_string(),
                })?;
        }

        let [major, minor, patch] = components;
        Ok(Self::new(major, minor, patch))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("4.2.1", MalcolmVersion::new(4, 2, 1))]
    #[case("v4.2", MalcolmVersion::new(4, 2, 0))]
    #[case("5", MalcolmVersion::new(5, 0, 0))]
    #[case("4.3.0-rc1", MalcolmVersion::new(4, 3, 0))]
    #[case(" 4.1.7+build.9 ", MalcolmVersion::new(4, 1, 7))]
    fn parses_release_strings(#[case] text: &str, #[case] expected: MalcolmVersion) {
        assert_eq!(Ok(expected), text.parse::<MalcolmVersion>());
    }

    #[test]
    fn rejects_non_numeric_component() {
        assert_matches!(
            "4.x.1".parse::<MalcolmVersion>(),
            Err(VersionParseError::InvalidComponent { component, .. }) if component == "x"
        );
    }

    #[rstest]
    #[case("")]
    #[case("unknown")]
    #[case("v")]
    fn fallback_absorbs_garbage(#[case] text: &str) {
        assert_eq!(MalcolmVersion::FALLBACK, MalcolmVersion::parse_or_fallback(text));
    }

    #[test]
    fn versions_order_numerically() {
        assert!(MalcolmVersion::new(4, 10, 0) > MalcolmVersion::new(4, 9, 3));
        assert_eq!("4.10.0", MalcolmVersion::new(4, 10, 0).to_string());
    }
}
