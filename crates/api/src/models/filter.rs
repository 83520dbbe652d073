use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ahead-of-time compilation effort, from least to most work.
///
/// The declaration order is the total order used for every comparison: a filter declared
/// later is strictly better than one declared earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompilerFilter {
    AssumeVerified,
    Extract,
    Verify,
    SpaceProfile,
    Space,
    SpeedProfile,
    Speed,
    EverythingProfile,
    Everything,
}

/// How a requested filter relates to the one an artifact was built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterRelation {
    Better,
    Same,
    Worse,
}

impl CompilerFilter {
    pub const ALL: [CompilerFilter; 9] = [
        CompilerFilter::AssumeVerified,
        CompilerFilter::Extract,
        CompilerFilter::Verify,
        CompilerFilter::SpaceProfile,
        CompilerFilter::Space,
        CompilerFilter::SpeedProfile,
        CompilerFilter::Speed,
        CompilerFilter::EverythingProfile,
        CompilerFilter::Everything,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CompilerFilter::AssumeVerified => "assume-verified",
            CompilerFilter::Extract => "extract",
            CompilerFilter::Verify => "verify",
            CompilerFilter::SpaceProfile => "space-profile",
            CompilerFilter::Space => "space",
            CompilerFilter::SpeedProfile => "speed-profile",
            CompilerFilter::Speed => "speed",
            CompilerFilter::EverythingProfile => "everything-profile",
            CompilerFilter::Everything => "everything",
        }
    }

    /// Relation of `self` (the requested filter) to `current` (the artifact's filter).
    pub fn relation_to(self, current: CompilerFilter) -> FilterRelation {
        match self.cmp(&current) {
            std::cmp::Ordering::Greater => FilterRelation::Better,
            std::cmp::Ordering::Equal => FilterRelation::Same,
            std::cmp::Ordering::Less => FilterRelation::Worse,
        }
    }

    /// Whether artifacts built with this filter contain machine code.
    pub fn is_aot_compilation_enabled(self) -> bool {
        self >= CompilerFilter::SpaceProfile
    }

    /// Compiled code is tied to the boot image it was linked against.
    pub fn depends_on_image_checksum(self) -> bool {
        self.is_aot_compilation_enabled()
    }

    /// Verification resolves classes through the class loader, so the loader chain matters.
    pub fn is_verification_enabled(self) -> bool {
        self >= CompilerFilter::Verify
    }

    pub fn depends_on_profile(self) -> bool {
        matches!(
            self,
            CompilerFilter::SpaceProfile
                | CompilerFilter::SpeedProfile
                | CompilerFilter::EverythingProfile
        )
    }
}

impl fmt::Display for CompilerFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CompilerFilter {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CompilerFilter::ALL
            .into_iter()
            .find(|filter| filter.name() == s)
            .ok_or_else(|| ApiError::UnknownCompilerFilter(s.to_string()))
    }
}
