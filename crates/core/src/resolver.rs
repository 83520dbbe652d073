//! Artifact resolution for one bytecode archive.
//!
//! [`ArtifactResolver`] probes the candidate artifacts of an archive in fixed precedence
//! and answers whether any of them can be used, and if not what kind of compilation
//! would produce one:
//!
//! ```text
//! Odex (compiled) -> Odex (vdex only) -> Oat (compiled) -> Oat (vdex only) -> Dm
//! ```
//!
//! Every candidate is opened and evaluated at most once per resolver, on first use.
//! Queries never modify anything on disk.

use crate::artifact::{ArtifactSource, OatFile, loader};
use crate::bcp;
use crate::context::ClassLoaderContext;
use crate::dex::{self, DexChecksums};
use crate::error::{OatscopeError, Result};
use crate::evaluator::{self, Checks};
use crate::location::{self, ArtifactPaths};
use crate::state::PlatformState;
use oatscope_api::optimization::{UNKNOWN, status};
use oatscope_api::{
    ArtifactLocation, ArtifactStatus, CompilerFilter, DexOptNeeded, DexOptStatus, DexOptTrigger,
    InstructionSet, OptimizationStatus,
};
use once_cell::sync::OnceCell;
use std::fmt::Write as _;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Handles a privileged caller opened and permission-checked already.
///
/// With descriptors, only the Odex location is probed: `oat` and `vdex` are taken to be
/// the Odex pair, and the system cache is never consulted.
#[derive(Debug)]
pub struct ArtifactDescriptors {
    pub zip: File,
    pub vdex: Option<File>,
    pub oat: Option<File>,
}

// ==================== Candidates ====================

struct Candidate {
    location: ArtifactLocation,
    source: ArtifactSource,
    path: Option<String>,
    file: OnceCell<Option<OatFile>>,
    status: OnceCell<ArtifactStatus>,
}

impl Candidate {
    fn new(location: ArtifactLocation, source: ArtifactSource, path: Option<String>) -> Self {
        Self {
            location,
            source,
            path,
            file: OnceCell::new(),
            status: OnceCell::new(),
        }
    }
}

/// Outcome of walking the candidates for one request.
struct Resolution<'a> {
    /// The winning candidate, or the fallback reported when none is usable.
    candidate: &'a Candidate,
    usable: bool,
    needed: DexOptNeeded,
}

// ==================== Resolver ====================

pub struct ArtifactResolver {
    dex_location: String,
    isa: InstructionSet,
    context: Option<Arc<ClassLoaderContext>>,
    load_executable: bool,
    only_load_trusted_executable: bool,
    state: Arc<PlatformState>,
    descriptors: Option<ArtifactDescriptors>,
    archive: OnceCell<Option<DexChecksums>>,
    odex: Candidate,
    vdex_for_odex: Candidate,
    oat: Candidate,
    vdex_for_oat: Candidate,
    dm: Candidate,
}

impl ArtifactResolver {
    pub fn new(
        dex_location: &str,
        isa: InstructionSet,
        context: Option<Arc<ClassLoaderContext>>,
        load_executable: bool,
        only_load_trusted_executable: bool,
        state: Arc<PlatformState>,
    ) -> Self {
        Self::build(
            dex_location,
            isa,
            context,
            load_executable,
            only_load_trusted_executable,
            state,
            None,
        )
    }

    /// Like [`ArtifactResolver::new`], reading the archive and the Odex pair from handles.
    pub fn with_descriptors(
        dex_location: &str,
        isa: InstructionSet,
        context: Option<Arc<ClassLoaderContext>>,
        load_executable: bool,
        only_load_trusted_executable: bool,
        state: Arc<PlatformState>,
        descriptors: ArtifactDescriptors,
    ) -> Self {
        Self::build(
            dex_location,
            isa,
            context,
            load_executable,
            only_load_trusted_executable,
            state,
            Some(descriptors),
        )
    }

    fn build(
        dex_location: &str,
        isa: InstructionSet,
        context: Option<Arc<ClassLoaderContext>>,
        mut load_executable: bool,
        only_load_trusted_executable: bool,
        state: Arc<PlatformState>,
        descriptors: Option<ArtifactDescriptors>,
    ) -> Self {
        if load_executable && isa != state.options().runtime_isa {
            warn!(
                "Load executable specified, but isa is not the runtime isa. Will not attempt to load executable."
            );
            load_executable = false;
        }
        if load_executable && context.is_none() {
            warn!("Load executable specified without a context. Will not attempt to load executable.");
            load_executable = false;
        }

        let dalvik_cache = if descriptors.is_some() {
            None
        } else {
            state.options().dalvik_cache.as_deref()
        };
        let paths = ArtifactPaths::probe(dex_location, isa, dalvik_cache);
        let vdex_of = |p: &Option<String>| p.as_deref().map(location::vdex_file_name);

        Self {
            dex_location: dex_location.to_string(),
            isa,
            context,
            load_executable,
            only_load_trusted_executable,
            odex: Candidate::new(ArtifactLocation::Odex, ArtifactSource::Compiled, paths.odex.clone()),
            vdex_for_odex: Candidate::new(ArtifactLocation::Odex, ArtifactSource::Vdex, vdex_of(&paths.odex)),
            oat: Candidate::new(ArtifactLocation::Oat, ArtifactSource::Compiled, paths.oat.clone()),
            vdex_for_oat: Candidate::new(ArtifactLocation::Oat, ArtifactSource::Vdex, vdex_of(&paths.oat)),
            dm: Candidate::new(ArtifactLocation::Dm, ArtifactSource::Dm, Some(paths.dm)),
            state,
            descriptors,
            archive: OnceCell::new(),
        }
    }

    /// Validating constructor taking the instruction set and context as text.
    ///
    /// Omitting the context disables class loader context checks. A given context has its
    /// class path archives opened relative to the archive's directory.
    pub fn create(
        dex_location: &str,
        isa_name: &str,
        context: Option<&str>,
        load_executable: bool,
        only_load_trusted_executable: bool,
        state: Arc<PlatformState>,
    ) -> Result<Self> {
        let isa: InstructionSet = isa_name.parse()?;

        let context = match context {
            Some(spec) => {
                let mut ctx = ClassLoaderContext::parse(spec)?;
                if let Err(e) = ctx.open_dex_files(location::dirname(dex_location)) {
                    debug!("Opening class loader context files failed: {}", e);
                    return Err(OatscopeError::ContextFilesUnreadable {
                        path: dex_location.to_string(),
                        context: spec.to_string(),
                    });
                }
                Some(Arc::new(ctx))
            }
            None => None,
        };

        Ok(Self::new(
            dex_location,
            isa,
            context,
            load_executable,
            only_load_trusted_executable,
            state,
        ))
    }

    pub fn dex_location(&self) -> &str {
        &self.dex_location
    }

    pub fn isa(&self) -> InstructionSet {
        self.isa
    }

    pub fn context(&self) -> Option<&Arc<ClassLoaderContext>> {
        self.context.as_ref()
    }

    pub fn state(&self) -> &Arc<PlatformState> {
        &self.state
    }

    // ==================== Archive ====================

    fn archive(&self) -> Option<&DexChecksums> {
        self.archive
            .get_or_init(|| {
                let result = match &self.descriptors {
                    Some(d) => dex::read_checksums_from(&mut &d.zip, &self.dex_location),
                    None => dex::read_checksums(Path::new(&self.dex_location)),
                };
                result
                    .inspect(|c| {
                        if c.is_empty() {
                            debug!("No dex file found in {}", self.dex_location);
                        }
                    })
                    .inspect_err(|e| warn!("Failed to read {}: {}", self.dex_location, e))
                    .ok()
            })
            .as_ref()
    }

    /// `None` when the archive cannot be read at all.
    pub fn has_dex_files(&self) -> Option<bool> {
        self.archive().map(|a| !a.is_empty())
    }

    pub fn is_in_boot_class_path(&self) -> bool {
        let found = self
            .state
            .options()
            .boot_class_path_locations
            .iter()
            .any(|l| *l == self.dex_location);
        if found {
            debug!("Dex location {} is in boot class path", self.dex_location);
        }
        found
    }

    // ==================== Candidate evaluation ====================

    fn checks(&self) -> Checks<'_> {
        Checks {
            dex_location: &self.dex_location,
            isa: self.isa,
            archive: self.archive(),
            context: self.context.as_deref(),
            state: &self.state,
            only_load_trusted_executable: self.only_load_trusted_executable,
        }
    }

    fn file<'a>(&self, candidate: &'a Candidate) -> Option<&'a OatFile> {
        candidate.file.get_or_init(|| self.open(candidate)).as_ref()
    }

    fn open(&self, candidate: &Candidate) -> Option<OatFile> {
        let path = candidate.path.as_deref()?;
        let is_odex = candidate.location == ArtifactLocation::Odex;

        let opened = match (candidate.source, &self.descriptors) {
            (ArtifactSource::Dm, _) => loader::open_dm(path),
            (ArtifactSource::Compiled, None) => loader::open_compiled(path),
            (ArtifactSource::Vdex, None) => loader::open_vdex(path),
            (ArtifactSource::Compiled, Some(d)) => match (is_odex, &d.oat, &d.vdex) {
                (true, Some(oat), Some(vdex)) => loader::open_compiled_from(path, oat, vdex),
                _ => return None,
            },
            (ArtifactSource::Vdex, Some(d)) => match (is_odex, &d.vdex) {
                (true, Some(vdex)) => loader::open_vdex_from(path, vdex),
                _ => return None,
            },
        };

        match opened {
            Ok(mut file) => {
                let executable = candidate.source == ArtifactSource::Compiled && self.may_execute(&file);
                file.set_executable(executable);
                debug!("Successfully loaded {} with executable: {}", path, executable);
                Some(file)
            }
            Err(e) => {
                debug!("Test for existing artifact {}: {}", path, e);
                None
            }
        }
    }

    fn may_execute(&self, file: &OatFile) -> bool {
        if !self.load_executable {
            return false;
        }
        if self.only_load_trusted_executable
            && !location::is_location_trusted(file.location(), &self.state.options().trusted_roots)
        {
            return false;
        }
        if file.has_app_image() {
            let art = location::app_image_file_name(file.location());
            if !Path::new(&art).exists() {
                warn!("Failed to open app image {}, loading non-executable", art);
                return false;
            }
        }
        true
    }

    fn status(&self, candidate: &Candidate) -> ArtifactStatus {
        *candidate.status.get_or_init(|| match self.file(candidate) {
            None => ArtifactStatus::CannotOpen,
            Some(file) => {
                let status = evaluator::artifact_status(file, &self.checks());
                debug!(
                    "{} is {} with filter {}",
                    file.location(),
                    status,
                    file.compiler_filter()
                );
                status
            }
        })
    }

    /// Odex, Oat and Dm, each with the vdex it degrades to when the compiled file is stale.
    fn locations(&self) -> [(&Candidate, Option<&Candidate>); 3] {
        [
            (&self.odex, Some(&self.vdex_for_odex)),
            (&self.oat, Some(&self.vdex_for_oat)),
            (&self.dm, None),
        ]
    }

    /// The artifact a location would load: its compiled file if usable, else its vdex.
    fn usable_at<'a>(
        &self,
        (compiled, vdex): (&'a Candidate, Option<&'a Candidate>),
    ) -> Option<&'a Candidate> {
        std::iter::once(compiled)
            .chain(vdex)
            .find(|c| self.status(c).is_usable())
    }

    /// Candidate reported when nothing is usable: the Odex if it opens, else the Oat.
    fn fallback(&self) -> &Candidate {
        if self.status(&self.odex) != ArtifactStatus::CannotOpen {
            &self.odex
        } else {
            &self.oat
        }
    }

    fn best_candidate(&self) -> (&Candidate, bool) {
        match self.locations().into_iter().find_map(|l| self.usable_at(l)) {
            Some(c) => (c, true),
            None => (self.fallback(), false),
        }
    }

    /// Walks the locations in order and stops at the first one that needs nothing. Failing
    /// that, the first usable location decides, and with none usable the fallback does.
    fn resolve(&self, target: CompilerFilter, trigger: &DexOptTrigger) -> Resolution<'_> {
        let checks = self.checks();
        let mut first_needed: Option<(&Candidate, DexOptNeeded)> = None;

        for candidate in self.locations().into_iter().filter_map(|l| self.usable_at(l)) {
            let needed = evaluator::dexopt_needed(
                ArtifactStatus::UpToDate,
                self.file(candidate),
                target,
                trigger,
                &checks,
            );
            if !needed.is_needed() {
                return Resolution {
                    candidate,
                    usable: true,
                    needed,
                };
            }
            first_needed.get_or_insert((candidate, needed));
        }

        if let Some((candidate, needed)) = first_needed {
            return Resolution {
                candidate,
                usable: true,
                needed,
            };
        }

        let candidate = self.fallback();
        let needed = if self.is_in_boot_class_path() {
            DexOptNeeded::NoDexOptNeeded
        } else {
            evaluator::dexopt_needed(
                self.status(candidate),
                self.file(candidate),
                target,
                trigger,
                &checks,
            )
        };
        Resolution {
            candidate,
            usable: false,
            needed,
        }
    }

    // ==================== Queries ====================

    pub fn odex_file_status(&self) -> ArtifactStatus {
        self.status(&self.odex)
    }

    pub fn oat_file_status(&self) -> ArtifactStatus {
        self.status(&self.oat)
    }

    pub fn is_up_to_date(&self) -> bool {
        self.best_candidate().1
    }

    pub fn get_dexopt_needed(&self, target: CompilerFilter, trigger: DexOptTrigger) -> DexOptStatus {
        let resolution = self.resolve(target, &trigger);
        let location = if resolution.usable {
            resolution.candidate.location
        } else {
            ArtifactLocation::NoneOrError
        };
        DexOptStatus::new(resolution.needed.is_needed(), location)
    }

    /// Signed integer form: negative when the verdict was reached against the Odex location.
    pub fn get_dexopt_needed_legacy(
        &self,
        target: CompilerFilter,
        profile_changed: bool,
        downgrade: bool,
    ) -> i32 {
        let trigger = DexOptTrigger::from_legacy(target, profile_changed, downgrade);
        let resolution = self.resolve(target, &trigger);

        // A usable vdex inside a bundle cannot be expressed as a location here.
        if resolution.needed.is_needed() && resolution.candidate.source == ArtifactSource::Dm {
            return DexOptNeeded::Dex2OatFromScratch.code();
        }
        resolution.needed.legacy_code(resolution.candidate.location)
    }

    pub fn get_optimization_status(&self) -> OptimizationStatus {
        if self.archive().is_none() {
            return OptimizationStatus::new("error", UNKNOWN, UNKNOWN, status::IO_ERROR_NO_APK);
        }

        let (candidate, _) = self.best_candidate();
        let Some(file) = self.file(candidate) else {
            return if self.has_dex_files() == Some(false) {
                OptimizationStatus::new("none", UNKNOWN, UNKNOWN, status::NO_DEX_CODE)
            } else {
                OptimizationStatus::new("error", "run-from-apk", UNKNOWN, status::IO_ERROR_NO_OAT)
            };
        };

        let reason = file.compilation_reason().unwrap_or(UNKNOWN);
        match self.status(candidate) {
            ArtifactStatus::UpToDate => OptimizationStatus::new(
                file.location(),
                file.compiler_filter().name(),
                reason,
                status::UP_TO_DATE,
            ),
            ArtifactStatus::DexOutOfDate => OptimizationStatus::new(
                file.location(),
                "run-from-apk-fallback",
                reason,
                status::APK_MORE_RECENT,
            ),
            ArtifactStatus::CannotOpen
            | ArtifactStatus::BootImageOutOfDate
            | ArtifactStatus::ContextOutOfDate => OptimizationStatus::new(
                file.location(),
                status::UNEXPECTED,
                status::UNEXPECTED,
                status::UNEXPECTED,
            ),
        }
    }

    /// Context-free variant: opens the archive without a class loader context and never
    /// loads executable.
    pub fn optimization_status_for(
        dex_location: &str,
        isa: InstructionSet,
        state: Arc<PlatformState>,
    ) -> OptimizationStatus {
        Self::new(dex_location, isa, None, false, false, state).get_optimization_status()
    }

    /// The highest-priority usable artifact, or `None` when every candidate is stale.
    pub fn get_best_oat_file(&self) -> Option<OatFile> {
        match self.best_candidate() {
            (candidate, true) => self.file(candidate).cloned(),
            _ => None,
        }
    }

    /// `<path>[status=<Status>, compilation_filter=<name>]` for the Oat then Odex location.
    pub fn status_dump(&self) -> String {
        let mut out = String::new();

        for (compiled, vdex) in [(&self.oat, &self.vdex_for_oat), (&self.odex, &self.vdex_for_odex)] {
            let shown = [compiled, vdex]
                .into_iter()
                .find(|c| self.status(c) != ArtifactStatus::CannotOpen);
            let (Some(candidate), Some(path)) = (shown, compiled.path.as_deref()) else {
                continue;
            };
            if !out.is_empty() {
                out.push_str("] ");
            }
            let _ = write!(out, "{}[status={}, ", path, self.status(candidate));
            match self.file(candidate) {
                Some(file) if !file.is_backed_by_vdex_only() => {
                    let _ = write!(out, "compilation_filter={}", file.compiler_filter());
                }
                _ => out.push_str("vdex-only"),
            }
        }

        if out.is_empty() {
            out.push_str("invalid[");
        }
        out.push(']');
        out
    }

    pub fn validate_boot_class_path_checksums(
        state: &PlatformState,
        isa: InstructionSet,
        oat_checksums: &str,
        oat_boot_class_path: &str,
    ) -> bool {
        match bcp::validate_boot_class_path_checksums(state, isa, oat_checksums, oat_boot_class_path) {
            Ok(()) => true,
            Err(e) => {
                debug!("Boot class path checksums do not match: {}", e);
                false
            }
        }
    }
}
