use crate::error::ApiError;
use crate::models::filter::{CompilerFilter, FilterRelation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==================== Trigger ====================

/// Conditions under which an otherwise usable artifact should still be recompiled.
///
/// Each flag is independent. Use the named presets instead of building one field by field
/// unless the caller really needs an unusual combination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DexOptTrigger {
    pub target_filter_is_better: bool,
    pub target_filter_is_same: bool,
    pub target_filter_is_worse: bool,
    pub primary_boot_image_becomes_usable: bool,
    pub need_extraction: bool,
}

impl DexOptTrigger {
    /// Recompile whenever a better (or equally good, re-profiled) artifact can be produced.
    /// Never recompiles only because the requested filter is lower.
    pub fn default_preset() -> Self {
        Self {
            target_filter_is_better: true,
            target_filter_is_same: true,
            target_filter_is_worse: false,
            primary_boot_image_becomes_usable: true,
            need_extraction: true,
        }
    }

    /// Recompile only to lower the filter.
    pub fn downgrade() -> Self {
        Self {
            target_filter_is_worse: true,
            ..Self::default()
        }
    }

    /// Recompile regardless of the filter relation.
    pub fn force() -> Self {
        Self {
            target_filter_is_better: true,
            target_filter_is_same: true,
            target_filter_is_worse: true,
            primary_boot_image_becomes_usable: true,
            need_extraction: true,
        }
    }

    /// Translates the legacy `(profile_changed, downgrade)` pair.
    ///
    /// `downgrade` wins. Otherwise the trigger seeks a better filter, and also the same filter
    /// when the profile changed and the target filter is profile-guided.
    pub fn from_legacy(target: CompilerFilter, profile_changed: bool, downgrade: bool) -> Self {
        if downgrade {
            return Self::downgrade();
        }
        Self {
            target_filter_is_better: true,
            target_filter_is_same: profile_changed && target.depends_on_profile(),
            target_filter_is_worse: false,
            primary_boot_image_becomes_usable: true,
            need_extraction: true,
        }
    }

    pub fn fires_for(&self, relation: FilterRelation) -> bool {
        match relation {
            FilterRelation::Better => self.target_filter_is_better,
            FilterRelation::Same => self.target_filter_is_same,
            FilterRelation::Worse => self.target_filter_is_worse,
        }
    }
}

impl FromStr for DexOptTrigger {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::default_preset()),
            "downgrade" => Ok(Self::downgrade()),
            "force" => Ok(Self::force()),
            other => Err(ApiError::UnknownTrigger(other.to_string())),
        }
    }
}

// ==================== Locations & statuses ====================

/// Where a winning artifact was found. Declaration order is search precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ArtifactLocation {
    /// Private cache next to the archive: `<dir>/oat/<isa>/<base>.odex`.
    Odex,
    /// Shared system cache fallback.
    Oat,
    /// Externally supplied metadata bundle next to the archive.
    Dm,
    NoneOrError,
}

impl ArtifactLocation {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactLocation::Odex => "odex",
            ArtifactLocation::Oat => "oat",
            ArtifactLocation::Dm => "dm",
            ArtifactLocation::NoneOrError => "none-or-error",
        }
    }
}

impl fmt::Display for ArtifactLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Freshness of a single artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactStatus {
    UpToDate,
    DexOutOfDate,
    BootImageOutOfDate,
    ContextOutOfDate,
    CannotOpen,
}

impl ArtifactStatus {
    pub fn is_usable(self) -> bool {
        self == ArtifactStatus::UpToDate
    }
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArtifactStatus::UpToDate => "UpToDate",
            ArtifactStatus::DexOutOfDate => "DexOutOfDate",
            ArtifactStatus::BootImageOutOfDate => "BootImageOutOfDate",
            ArtifactStatus::ContextOutOfDate => "ContextOutOfDate",
            ArtifactStatus::CannotOpen => "CannotOpen",
        };
        f.write_str(name)
    }
}

// ==================== Verdicts ====================

/// Kind of recompilation a verdict asks for.
///
/// The integer codes are stable: they are what legacy callers receive, with the sign
/// carrying the location (see [`DexOptNeeded::legacy_code`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DexOptNeeded {
    NoDexOptNeeded = 0,
    Dex2OatFromScratch = 1,
    Dex2OatForBootImage = 2,
    Dex2OatForFilter = 3,
}

impl DexOptNeeded {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn is_needed(self) -> bool {
        self != DexOptNeeded::NoDexOptNeeded
    }

    /// Signed legacy value: negated when the verdict was reached against the Odex location.
    /// A from-scratch compilation does not reuse anything, so it is never negated.
    pub fn legacy_code(self, location: ArtifactLocation) -> i32 {
        if location == ArtifactLocation::Odex && self != DexOptNeeded::Dex2OatFromScratch {
            -self.code()
        } else {
            self.code()
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code.abs() {
            0 => Some(DexOptNeeded::NoDexOptNeeded),
            1 => Some(DexOptNeeded::Dex2OatFromScratch),
            2 => Some(DexOptNeeded::Dex2OatForBootImage),
            3 => Some(DexOptNeeded::Dex2OatForFilter),
            _ => None,
        }
    }
}

/// Result of the current query API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DexOptStatus {
    pub needed: bool,
    pub is_vdex_usable: bool,
    pub location: ArtifactLocation,
}

impl DexOptStatus {
    pub fn new(needed: bool, location: ArtifactLocation) -> Self {
        Self {
            needed,
            is_vdex_usable: location != ArtifactLocation::NoneOrError,
            location,
        }
    }
}
