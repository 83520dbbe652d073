use serde::{Deserialize, Serialize};

pub const UNKNOWN: &str = "unknown";

/// Status words reported in [`OptimizationStatus::status`].
pub mod status {
    pub const UP_TO_DATE: &str = "up-to-date";
    pub const APK_MORE_RECENT: &str = "apk-more-recent";
    pub const IO_ERROR_NO_OAT: &str = "io-error-no-oat";
    pub const IO_ERROR_NO_APK: &str = "io-error-no-apk";
    pub const NO_DEX_CODE: &str = "no-dex-code";
    pub const UNEXPECTED: &str = "unexpected";
}

/// Human-readable summary of what would run for an archive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OptimizationStatus {
    /// Artifact path, or a placeholder such as `run-from-apk` when nothing usable exists.
    pub location: String,
    pub compiler_filter: String,
    pub compilation_reason: String,
    pub status: String,
}

impl OptimizationStatus {
    pub fn new(
        location: impl Into<String>,
        compiler_filter: impl Into<String>,
        compilation_reason: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            location: location.into(),
            compiler_filter: compiler_filter.into(),
            compilation_reason: compilation_reason.into(),
            status: status.into(),
        }
    }

    pub fn is_up_to_date(&self) -> bool {
        self.status == status::UP_TO_DATE
    }
}

impl Default for OptimizationStatus {
    fn default() -> Self {
        Self::new(UNKNOWN, UNKNOWN, UNKNOWN, UNKNOWN)
    }
}
