//! On-disk headers of compiled artifacts, verification caches and boot images.
//!
//! Each file starts with a 4-byte magic and a 4-byte version, followed by the header as
//! MessagePack. Anything after the header is payload this crate never looks at.

use crate::error::{OatscopeError, Result};
use oatscope_api::CompilerFilter;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const OAT_MAGIC: [u8; 4] = *b"oat\n";
pub const OAT_VERSION: [u8; 4] = *b"001\0";
pub const VDEX_MAGIC: [u8; 4] = *b"vdex";
pub const VDEX_VERSION: [u8; 4] = *b"027\0";
pub const ART_MAGIC: [u8; 4] = *b"art\n";
pub const ART_VERSION: [u8; 4] = *b"001\0";

/// Zip entry holding the verification cache inside a metadata bundle.
pub const DM_VDEX_ENTRY: &str = "primary.vdex";

// ==================== Headers ====================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OatHeader {
    pub compiler_filter: CompilerFilter,
    pub compilation_reason: Option<String>,
    /// Encoded loader chain the artifact was compiled against.
    pub class_loader_context: Option<String>,
    pub dex_checksums: Vec<u32>,
    /// Colon-separated boot class path locations.
    pub boot_class_path: String,
    pub boot_class_path_checksums: String,
    pub apex_versions: String,
    pub has_app_image: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VdexHeader {
    pub dex_checksums: Vec<u32>,
    /// Whether the bytecode itself was copied in, so the archive is not needed at runtime.
    pub contains_dex_code: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootImageHeader {
    pub component_count: u32,
    pub image_checksum: u32,
}

impl BootImageHeader {
    /// Checksum chunk as recorded in artifacts: `i;<count>/<checksum>`.
    pub fn checksum_string(&self) -> String {
        format!("i;{}/{:08x}", self.component_count, self.image_checksum)
    }
}

// ==================== Codec ====================

pub trait Header: Serialize + DeserializeOwned {
    const KIND: &'static str;
    const MAGIC: [u8; 4];
    const VERSION: [u8; 4];

    fn encode(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(128);
        bytes.extend_from_slice(&Self::MAGIC);
        bytes.extend_from_slice(&Self::VERSION);
        bytes.extend(rmp_serde::to_vec_named(self)?);
        Ok(bytes)
    }

    /// `display_name` only ends up in error messages.
    fn decode(bytes: &[u8], display_name: &str) -> Result<Self> {
        if bytes.len() < 8 || bytes[..4] != Self::MAGIC || bytes[4..8] != Self::VERSION {
            return Err(OatscopeError::BadMagic {
                kind: Self::KIND,
                path: display_name.to_string(),
            });
        }
        Ok(rmp_serde::from_slice(&bytes[8..])?)
    }

    fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::decode(&bytes, &path.display().to_string())
    }

    fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.encode()?)?;
        Ok(())
    }
}

impl Header for OatHeader {
    const KIND: &'static str = "oat";
    const MAGIC: [u8; 4] = OAT_MAGIC;
    const VERSION: [u8; 4] = OAT_VERSION;
}

impl Header for VdexHeader {
    const KIND: &'static str = "vdex";
    const MAGIC: [u8; 4] = VDEX_MAGIC;
    const VERSION: [u8; 4] = VDEX_VERSION;
}

impl Header for BootImageHeader {
    const KIND: &'static str = "boot image";
    const MAGIC: [u8; 4] = ART_MAGIC;
    const VERSION: [u8; 4] = ART_VERSION;
}
