//! Staleness decisions for a single opened artifact.
//!
//! Nothing here touches artifact files: every input is an already opened [`OatFile`] and
//! the facts it is checked against, gathered in [`Checks`].

use crate::artifact::OatFile;
use crate::bcp;
use crate::context::ClassLoaderContext;
use crate::dex::{self, DexChecksums};
use crate::location;
use crate::state::PlatformState;
use oatscope_api::{ArtifactStatus, CompilerFilter, DexOptNeeded, DexOptTrigger, InstructionSet};
use tracing::{debug, warn};

/// Everything an artifact is validated against.
pub struct Checks<'a> {
    pub dex_location: &'a str,
    pub isa: InstructionSet,
    /// `None` when the source archive could not be read.
    pub archive: Option<&'a DexChecksums>,
    /// `None` skips the class loader context check.
    pub context: Option<&'a ClassLoaderContext>,
    pub state: &'a PlatformState,
    pub only_load_trusted_executable: bool,
}

impl Checks<'_> {
    fn archive_only_uncompressed(&self) -> bool {
        self.archive.is_some_and(|a| a.only_uncompressed)
    }

    fn is_primary_boot_image_usable(&self) -> bool {
        !self.state.boot_image_info_list(self.isa).is_empty()
    }
}

// ==================== Status ====================

pub fn artifact_status(file: &OatFile, checks: &Checks<'_>) -> ArtifactStatus {
    if let Err(reason) = dex_checksum_up_to_date(file, checks) {
        debug!("{} is stale against its archive: {}", file.location(), reason);
        return ArtifactStatus::DexOutOfDate;
    }

    let filter = file.compiler_filter();
    if let Some(header) = file.oat_header() {
        if filter.depends_on_image_checksum() {
            if let Err(e) = bcp::validate_boot_class_path_checksums(
                checks.state,
                checks.isa,
                &header.boot_class_path_checksums,
                &header.boot_class_path,
            ) {
                debug!(
                    "Failed to verify checksums of oat file {} error: {}",
                    file.location(),
                    e
                );
                return ArtifactStatus::BootImageOutOfDate;
            }
            let live_versions = checks.state.apex_versions();
            if !live_versions.starts_with(header.apex_versions.as_str()) {
                debug!(
                    "APEX versions mismatch between oat file '{}' and the runtime (Oat file: '{}', Runtime: '{}')",
                    file.location(),
                    header.apex_versions,
                    live_versions
                );
                return ArtifactStatus::BootImageOutOfDate;
            }
        } else {
            debug!("Image checksum test skipped for compiler filter {}", filter);
        }
    }

    if checks.only_load_trusted_executable
        && !location::is_location_trusted(file.location(), &checks.state.options().trusted_roots)
        && file.contains_dex_code()
        && checks.archive_only_uncompressed()
    {
        warn!(
            "Not loading {}: oat file has dex code, but APK has uncompressed dex code",
            checks.dex_location
        );
        return ArtifactStatus::DexOutOfDate;
    }

    if !class_loader_context_is_okay(file, checks) {
        return ArtifactStatus::ContextOutOfDate;
    }

    ArtifactStatus::UpToDate
}

fn dex_checksum_up_to_date(file: &OatFile, checks: &Checks<'_>) -> Result<(), String> {
    let Some(required) = checks.archive else {
        return Err(format!("cannot read {}", checks.dex_location));
    };
    if required.is_empty() {
        warn!("Required dex checksums not found. Assuming dex checksums are up to date.");
        return Ok(());
    }

    let recorded = file.dex_checksums();
    if recorded.len() != required.checksums.len() {
        return Err(format!(
            "expected {} dex files but found {}",
            required.checksums.len(),
            recorded.len()
        ));
    }
    for (index, (expected, actual)) in required.checksums.iter().zip(recorded).enumerate() {
        if expected != actual {
            return Err(format!(
                "dex checksum does not match for {}: expected {:08x}, actual {:08x}",
                dex::multidex_location(checks.dex_location, index),
                expected,
                actual
            ));
        }
    }
    Ok(())
}

fn class_loader_context_is_okay(file: &OatFile, checks: &Checks<'_>) -> bool {
    let Some(context) = checks.context else {
        return true;
    };
    if file.is_backed_by_vdex_only() {
        return true;
    }
    if !file.compiler_filter().is_verification_enabled() {
        return true;
    }

    let stored = file.class_loader_context().unwrap_or_default();
    if context.matches_stored(stored) {
        return true;
    }
    debug!(
        "ClassLoaderContext check failed. Context was {}. The expected context is {}",
        stored,
        context.encode()
    );
    false
}

// ==================== Verdicts ====================

pub fn should_recompile_for_filter(
    file: &OatFile,
    target: CompilerFilter,
    trigger: &DexOptTrigger,
    checks: &Checks<'_>,
) -> bool {
    let current = file.compiler_filter();
    let relation = target.relation_to(current);
    if trigger.fires_for(relation) {
        debug!(
            "Should recompile: target filter is {:?} (current: {}, target: {})",
            relation, current, target
        );
        return true;
    }

    if trigger.primary_boot_image_becomes_usable && current.depends_on_image_checksum() {
        if let Some(header) = file.oat_header() {
            if !header.boot_class_path_checksums.starts_with('i')
                && checks.is_primary_boot_image_usable()
            {
                debug!("Should recompile: primary boot image becomes usable");
                return true;
            }
        }
    }

    if trigger.need_extraction && !file.contains_dex_code() && !checks.archive_only_uncompressed() {
        debug!("Should recompile: need extraction");
        return true;
    }

    debug!("Should not recompile");
    false
}

/// Verdict for one candidate with a known status.
pub fn dexopt_needed(
    status: ArtifactStatus,
    file: Option<&OatFile>,
    target: CompilerFilter,
    trigger: &DexOptTrigger,
    checks: &Checks<'_>,
) -> DexOptNeeded {
    if let (ArtifactStatus::UpToDate, Some(file)) = (status, file) {
        return if should_recompile_for_filter(file, target, trigger, checks) {
            DexOptNeeded::Dex2OatForFilter
        } else {
            DexOptNeeded::NoDexOptNeeded
        };
    }

    // A caller that only wants to downgrade has nothing to gain from an unusable artifact.
    if !trigger.target_filter_is_better {
        return DexOptNeeded::NoDexOptNeeded;
    }

    match status {
        ArtifactStatus::BootImageOutOfDate => DexOptNeeded::Dex2OatForBootImage,
        ArtifactStatus::ContextOutOfDate => DexOptNeeded::Dex2OatForFilter,
        _ => match checks.archive {
            Some(archive) if !archive.is_empty() => DexOptNeeded::Dex2OatFromScratch,
            _ => DexOptNeeded::NoDexOptNeeded,
        },
    }
}
