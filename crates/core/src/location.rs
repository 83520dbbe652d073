//! Artifact path derivation.
//!
//! Every candidate artifact for a bytecode archive lives at a path computed from the
//! archive location alone:
//!
//! ```text
//! /data/app/foo/base.apk
//!   ├── odex  /data/app/foo/oat/<isa>/base.odex   (+ base.vdex, base.art)
//!   ├── oat   <dalvik-cache>/<isa>/data@app@foo@base.apk@classes.oat   (+ .vdex)
//!   └── dm    /data/app/foo/base.dm
//! ```

use crate::error::{OatscopeError, Result};
use oatscope_api::InstructionSet;
use std::path::Path;
use tracing::warn;

const CLASSES_DEX: &str = "classes.dex";

/// Replaces the extension of the last path segment, or appends one if it has none.
pub fn replace_file_extension(path: &str, new_extension: &str) -> String {
    match path.rfind(['.', '/']) {
        Some(pos) if path.as_bytes()[pos] == b'.' => {
            format!("{}.{}", &path[..pos], new_extension)
        }
        _ => format!("{}.{}", path, new_extension),
    }
}

pub fn vdex_file_name(artifact: &str) -> String {
    replace_file_extension(artifact, "vdex")
}

pub fn dm_file_name(dex_location: &str) -> String {
    replace_file_extension(dex_location, "dm")
}

pub fn app_image_file_name(artifact: &str) -> String {
    replace_file_extension(artifact, "art")
}

/// Directory part of a location, without the trailing slash. Empty when there is none.
pub fn dirname(location: &str) -> &str {
    location.rfind('/').map(|pos| &location[..pos]).unwrap_or("")
}

pub fn basename(location: &str) -> &str {
    location
        .rfind('/')
        .map(|pos| &location[pos + 1..])
        .unwrap_or(location)
}

/// `/foo/bar/baz.jar` -> `/foo/bar/oat/<isa>/baz.odex`.
pub fn odex_file_name(dex_location: &str, isa: InstructionSet) -> Result<String> {
    let Some(pos) = dex_location.rfind('/') else {
        return Err(OatscopeError::InvalidLocation(format!(
            "Dex location {} has no directory.",
            dex_location
        )));
    };
    let dir = &dex_location[..=pos];
    let file = &dex_location[pos + 1..];
    let base = file.rfind('.').map(|dot| &file[..dot]).unwrap_or(file);
    Ok(format!("{}oat/{}/{}.odex", dir, isa.name(), base))
}

/// Mangled system cache name: `/foo/bar/baz.jar` -> `<cache>/<isa>/foo@bar@baz.jar@classes.oat`.
pub fn oat_file_name(dex_location: &str, isa: InstructionSet, dalvik_cache: &Path) -> Result<String> {
    let Some(relative) = dex_location.strip_prefix('/') else {
        return Err(OatscopeError::InvalidLocation(format!(
            "Expected path in location to be absolute: {}",
            dex_location
        )));
    };

    let mut cache_file = relative.to_string();
    if ![".dex", ".art", ".oat"]
        .iter()
        .any(|ext| dex_location.ends_with(ext))
    {
        cache_file.push('/');
        cache_file.push_str(CLASSES_DEX);
    }
    let cache_file = cache_file.replace('/', "@");

    let cache_dir = dalvik_cache.join(isa.name());
    let full = format!("{}/{}", cache_dir.display(), cache_file);
    Ok(replace_file_extension(&full, "oat"))
}

/// `<dir>/<name>.art` -> `<dir>/<isa>/<name>.art`.
pub fn boot_image_file_name(image_location: &str, isa: InstructionSet) -> String {
    let dir = dirname(image_location);
    let name = basename(image_location);
    if dir.is_empty() {
        format!("{}/{}", isa.name(), name)
    } else {
        format!("{}/{}/{}", dir, isa.name(), name)
    }
}

/// A file is trusted when it sits under one of the configured roots.
pub fn is_location_trusted(path: &str, trusted_roots: &[std::path::PathBuf]) -> bool {
    let path = Path::new(path);
    trusted_roots.iter().any(|root| path.starts_with(root))
}

/// Every candidate path for one archive and instruction set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub odex: Option<String>,
    pub oat: Option<String>,
    pub dm: String,
}

impl ArtifactPaths {
    /// Never fails: a location whose path cannot be derived is simply absent.
    pub fn probe(dex_location: &str, isa: InstructionSet, dalvik_cache: Option<&Path>) -> Self {
        let odex = odex_file_name(dex_location, isa)
            .inspect_err(|e| warn!("Failed to determine odex file name: {}", e))
            .ok();

        let oat = match dalvik_cache {
            Some(cache) => oat_file_name(dex_location, isa, cache)
                .inspect_err(|e| {
                    warn!(
                        "Failed to determine oat file name for dex location {}: {}",
                        dex_location, e
                    )
                })
                .ok(),
            None => None,
        };

        Self {
            odex,
            oat,
            dm: dm_file_name(dex_location),
        }
    }
}
