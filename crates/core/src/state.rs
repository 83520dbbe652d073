//! Platform facts artifacts are validated against: boot image chunks, boot class path
//! checksums and platform component versions.
//!
//! A [`PlatformState`] is either live, computing each fact on first use from the files
//! named in [`RuntimeOptions`], or frozen, answering from a [`PlatformSnapshot`] taken
//! earlier. Both answer the same questions the same way.

use crate::artifact::header::{BootImageHeader, Header};
use crate::dex;
use crate::error::Result;
use crate::location;
use dashmap::DashMap;
use oatscope_api::InstructionSet;
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

static APEX_MODULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/apex/(?P<module>[^/]+)/").expect("Invalid apex module pattern"));

// ==================== Options ====================

/// Description of the running platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeOptions {
    /// Primary boot image first, then its extensions.
    #[serde(default)]
    pub image_locations: Vec<String>,
    /// Files backing each boot class path component.
    #[serde(default)]
    pub boot_class_path: Vec<String>,
    /// Logical names of the same components, as recorded in artifacts.
    #[serde(default)]
    pub boot_class_path_locations: Vec<String>,
    #[serde(default)]
    pub dalvik_cache: Option<PathBuf>,
    #[serde(default)]
    pub trusted_roots: Vec<PathBuf>,
    #[serde(default = "default_runtime_isa")]
    pub runtime_isa: InstructionSet,
    /// `<module> <version>` per line.
    #[serde(default)]
    pub apex_info_list: Option<PathBuf>,
}

fn default_runtime_isa() -> InstructionSet {
    InstructionSet::host().unwrap_or(InstructionSet::Arm64)
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            image_locations: Vec::new(),
            boot_class_path: Vec::new(),
            boot_class_path_locations: Vec::new(),
            dalvik_cache: None,
            trusted_roots: Vec::new(),
            runtime_isa: default_runtime_isa(),
            apex_info_list: None,
        }
    }
}

impl RuntimeOptions {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut options: Self = serde_json::from_str(&text)?;
        if options.boot_class_path_locations.is_empty() {
            options.boot_class_path_locations = options.boot_class_path.clone();
        }
        Ok(options)
    }
}

/// One boot image chunk: the primary image or an extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootImageInfo {
    pub component_count: usize,
    /// `i;<count>/<checksum>`.
    pub checksum: String,
}

/// Every platform fact, fetched up front.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformSnapshot {
    pub options: RuntimeOptions,
    #[serde(default)]
    pub boot_images: BTreeMap<InstructionSet, Vec<BootImageInfo>>,
    /// Per boot class path component, `None` when it could not be read.
    #[serde(default)]
    pub bcp_checksums: Vec<Option<String>>,
    #[serde(default)]
    pub apex_versions: String,
}

impl PlatformSnapshot {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// ==================== State ====================

#[derive(Default)]
struct LiveCaches {
    boot_images: DashMap<InstructionSet, Arc<Vec<BootImageInfo>>>,
    bcp_checksums: DashMap<usize, Option<String>>,
    apex_versions: OnceCell<String>,
}

enum Source {
    Live(LiveCaches),
    Frozen {
        boot_images: HashMap<InstructionSet, Arc<Vec<BootImageInfo>>>,
        bcp_checksums: Vec<Option<String>>,
        apex_versions: String,
    },
}

pub struct PlatformState {
    options: RuntimeOptions,
    source: Source,
}

impl PlatformState {
    pub fn live(options: RuntimeOptions) -> Self {
        Self {
            options,
            source: Source::Live(LiveCaches::default()),
        }
    }

    pub fn frozen(snapshot: PlatformSnapshot) -> Self {
        let boot_images = snapshot
            .boot_images
            .into_iter()
            .map(|(isa, list)| (isa, Arc::new(list)))
            .collect();
        Self {
            options: snapshot.options,
            source: Source::Frozen {
                boot_images,
                bcp_checksums: snapshot.bcp_checksums,
                apex_versions: snapshot.apex_versions,
            },
        }
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    pub fn is_frozen(&self) -> bool {
        matches!(self.source, Source::Frozen { .. })
    }

    /// Boot image chunks for `isa`. Empty when there is no usable boot image.
    pub fn boot_image_info_list(&self, isa: InstructionSet) -> Arc<Vec<BootImageInfo>> {
        match &self.source {
            Source::Live(caches) => caches
                .boot_images
                .entry(isa)
                .or_insert_with(|| Arc::new(load_boot_images(&self.options, isa)))
                .clone(),
            Source::Frozen { boot_images, .. } => {
                boot_images.get(&isa).cloned().unwrap_or_default()
            }
        }
    }

    /// Checksum segment (`/<hex8>`) of one boot class path component.
    pub fn bcp_checksums(&self, bcp_index: usize) -> Option<String> {
        match &self.source {
            Source::Live(caches) => caches
                .bcp_checksums
                .entry(bcp_index)
                .or_insert_with(|| load_bcp_checksum(&self.options, bcp_index))
                .clone(),
            Source::Frozen { bcp_checksums, .. } => bcp_checksums.get(bcp_index).cloned().flatten(),
        }
    }

    /// One `/<version>` segment per boot class path location.
    pub fn apex_versions(&self) -> &str {
        match &self.source {
            Source::Live(caches) => caches
                .apex_versions
                .get_or_init(|| compute_apex_versions(&self.options)),
            Source::Frozen { apex_versions, .. } => apex_versions,
        }
    }

    /// Fetches every fact so the result can be replayed with [`PlatformState::frozen`].
    pub fn snapshot(&self) -> PlatformSnapshot {
        let boot_images = InstructionSet::ALL
            .into_iter()
            .filter_map(|isa| {
                let list = self.boot_image_info_list(isa);
                (!list.is_empty()).then(|| (isa, list.as_ref().clone()))
            })
            .collect();
        let bcp_checksums = (0..self.options.boot_class_path.len())
            .map(|i| self.bcp_checksums(i))
            .collect();
        PlatformSnapshot {
            options: self.options.clone(),
            boot_images,
            bcp_checksums,
            apex_versions: self.apex_versions().to_string(),
        }
    }
}

// ==================== Live loading ====================

/// All chunks or none: a missing extension makes the whole layout unusable.
fn load_boot_images(options: &RuntimeOptions, isa: InstructionSet) -> Vec<BootImageInfo> {
    let mut chunks = Vec::with_capacity(options.image_locations.len());
    for image_location in &options.image_locations {
        let path = location::boot_image_file_name(image_location, isa);
        match BootImageHeader::read(Path::new(&path)) {
            Ok(header) => chunks.push(BootImageInfo {
                component_count: header.component_count as usize,
                checksum: header.checksum_string(),
            }),
            Err(e) => {
                debug!(
                    "Some error occurred when loading boot images for oat file validation: {}",
                    e
                );
                return Vec::new();
            }
        }
    }
    chunks
}

fn load_bcp_checksum(options: &RuntimeOptions, bcp_index: usize) -> Option<String> {
    let path = options.boot_class_path.get(bcp_index)?;
    match dex::read_checksums(Path::new(path)) {
        Ok(checksums) if !checksums.is_empty() => Some(format!("/{:08x}", checksums.combined())),
        Ok(_) => {
            warn!("No dex files found in boot class path component {}", path);
            None
        }
        Err(e) => {
            warn!("Failed to read boot class path component {}: {}", path, e);
            None
        }
    }
}

fn compute_apex_versions(options: &RuntimeOptions) -> String {
    let versions = options
        .apex_info_list
        .as_deref()
        .map(read_apex_info_list)
        .unwrap_or_default();

    options
        .boot_class_path_locations
        .iter()
        .map(|location| {
            let version = APEX_MODULE
                .captures(location)
                .and_then(|caps| versions.get(&caps["module"]))
                .map(String::as_str)
                .unwrap_or("");
            format!("/{}", version)
        })
        .collect()
}

fn read_apex_info_list(path: &Path) -> HashMap<String, String> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to read apex info list {}: {}", path.display(), e);
            return HashMap::new();
        }
    };
    text.lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            Some((parts.next()?.to_string(), parts.next()?.to_string()))
        })
        .collect()
}
