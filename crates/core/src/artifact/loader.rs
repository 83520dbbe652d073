use super::header::{DM_VDEX_ENTRY, Header, OatHeader, VdexHeader};
use crate::error::{OatscopeError, Result};
use crate::location;
use oatscope_api::CompilerFilter;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use zip::ZipArchive;

/// Reason reported for an artifact that only has a verification cache.
pub const VDEX_COMPILATION_REASON: &str = "vdex";

/// Largest verification cache accepted from a metadata bundle.
pub const MAX_DM_VDEX_BYTES: u64 = 64 * 1024 * 1024;

/// What backs an opened artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactSource {
    /// Compiled code plus its paired vdex.
    Compiled,
    /// A standalone vdex next to where the compiled file would be.
    Vdex,
    /// The vdex inside a metadata bundle.
    Dm,
}

/// An opened artifact, as handed out to callers that go on to load it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OatFile {
    location: String,
    source: ArtifactSource,
    oat: Option<OatHeader>,
    vdex: VdexHeader,
    executable: bool,
}

impl OatFile {
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn source(&self) -> ArtifactSource {
        self.source
    }

    pub fn is_backed_by_vdex_only(&self) -> bool {
        self.oat.is_none()
    }

    pub fn oat_header(&self) -> Option<&OatHeader> {
        self.oat.as_ref()
    }

    pub fn compiler_filter(&self) -> CompilerFilter {
        self.oat
            .as_ref()
            .map(|h| h.compiler_filter)
            .unwrap_or(CompilerFilter::Verify)
    }

    pub fn compilation_reason(&self) -> Option<&str> {
        match &self.oat {
            Some(h) => h.compilation_reason.as_deref(),
            None => Some(VDEX_COMPILATION_REASON),
        }
    }

    pub fn class_loader_context(&self) -> Option<&str> {
        self.oat.as_ref().and_then(|h| h.class_loader_context.as_deref())
    }

    pub fn dex_checksums(&self) -> &[u32] {
        &self.vdex.dex_checksums
    }

    pub fn contains_dex_code(&self) -> bool {
        self.vdex.contains_dex_code
    }

    pub fn has_app_image(&self) -> bool {
        self.oat.as_ref().is_some_and(|h| h.has_app_image)
    }

    pub fn is_executable(&self) -> bool {
        self.executable
    }

    pub(crate) fn set_executable(&mut self, executable: bool) {
        self.executable = executable && self.oat.is_some();
    }
}

// ==================== Opening ====================

/// Opens a compiled artifact together with its paired vdex.
pub fn open_compiled(oat_path: &str) -> Result<OatFile> {
    let oat = OatHeader::read(Path::new(oat_path))?;
    let vdex_path = location::vdex_file_name(oat_path);
    let vdex = VdexHeader::read(Path::new(&vdex_path)).map_err(|e| match e {
        OatscopeError::Io(_) => OatscopeError::MissingVdex {
            path: oat_path.to_string(),
        },
        other => other,
    })?;
    pair(oat_path, oat, vdex)
}

/// Same as [`open_compiled`] from handles the caller already opened.
pub fn open_compiled_from(oat_path: &str, oat_file: &File, vdex_file: &File) -> Result<OatFile> {
    let oat = OatHeader::decode(&read_handle(oat_file)?, oat_path)?;
    let vdex = VdexHeader::decode(&read_handle(vdex_file)?, &location::vdex_file_name(oat_path))?;
    pair(oat_path, oat, vdex)
}

pub fn open_vdex(vdex_path: &str) -> Result<OatFile> {
    let vdex = VdexHeader::read(Path::new(vdex_path))?;
    Ok(vdex_only(vdex_path, ArtifactSource::Vdex, vdex))
}

pub fn open_vdex_from(vdex_path: &str, vdex_file: &File) -> Result<OatFile> {
    let vdex = VdexHeader::decode(&read_handle(vdex_file)?, vdex_path)?;
    Ok(vdex_only(vdex_path, ArtifactSource::Vdex, vdex))
}

/// Opens the verification cache stored in a metadata bundle.
pub fn open_dm(dm_path: &str) -> Result<OatFile> {
    let file = File::open(dm_path)?;
    let mut archive = ZipArchive::new(file)?;
    let entry = archive.by_name(DM_VDEX_ENTRY)?;
    let entry_name = format!("{}!{}", dm_path, DM_VDEX_ENTRY);
    // The declared size comes from the bundle itself and is not trusted.
    if entry.size() > MAX_DM_VDEX_BYTES {
        return Err(OatscopeError::OversizedEntry {
            path: entry_name,
            size: entry.size(),
        });
    }
    let mut bytes = Vec::new();
    entry.take(MAX_DM_VDEX_BYTES).read_to_end(&mut bytes)?;
    let vdex = VdexHeader::decode(&bytes, &entry_name)?;
    Ok(vdex_only(dm_path, ArtifactSource::Dm, vdex))
}

fn pair(oat_path: &str, oat: OatHeader, vdex: VdexHeader) -> Result<OatFile> {
    if oat.dex_checksums != vdex.dex_checksums {
        return Err(OatscopeError::TornArtifact {
            path: oat_path.to_string(),
        });
    }
    Ok(OatFile {
        location: oat_path.to_string(),
        source: ArtifactSource::Compiled,
        oat: Some(oat),
        vdex,
        executable: false,
    })
}

fn vdex_only(path: &str, source: ArtifactSource, vdex: VdexHeader) -> OatFile {
    OatFile {
        location: path.to_string(),
        source,
        oat: None,
        vdex,
        executable: false,
    }
}

fn read_handle(file: &File) -> Result<Vec<u8>> {
    let mut reader = file;
    reader.seek(SeekFrom::Start(0))?;
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    Ok(bytes)
}
