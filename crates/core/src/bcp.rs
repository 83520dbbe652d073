//! Boot class path checksum validation.
//!
//! An artifact records the boot class path it was compiled against and one checksum
//! component per piece of it: `i;<n>/<hex8>` for a boot image chunk covering `n`
//! components, `d/<hex8>` for a single component compiled without an image. The live
//! boot class path may have grown since, only the recorded prefix is checked.

use crate::state::PlatformState;
use oatscope_api::InstructionSet;
use thiserror::Error;

const IMAGE_PREFIX: &str = "i";
const DEX_PREFIX: &str = "d";
const SEPARATOR: &str = ":";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BootClassPathMismatch {
    #[error("Empty checksums")]
    EmptyChecksums,
    #[error("Empty boot class path")]
    EmptyBootClassPath,
    #[error("Boot class path component mismatch at {index}: expected {expected}, found {found}")]
    ComponentMismatch {
        index: usize,
        expected: String,
        found: String,
    },
    #[error("Boot class path has more components than the runtime ({found} > {available})")]
    TooManyComponents { found: usize, available: usize },
    #[error("Missing boot image for {location}, remaining checksums: {remaining}")]
    MissingBootImage { location: String, remaining: String },
    #[error("Image checksum mismatch, expected {remaining} to start with {expected}")]
    ImageChecksumMismatch { remaining: String, expected: String },
    #[error("Failed to read checksums of bootclasspath file {location}")]
    UnreadableComponent { location: String },
    #[error(
        "Dex checksum mismatch for bootclasspath file {location}, expected {remaining} to start with {expected}"
    )]
    DexChecksumMismatch {
        location: String,
        remaining: String,
        expected: String,
    },
    #[error("Unexpected checksums, expected {remaining} to start with {expected}")]
    UnexpectedChecksums {
        remaining: String,
        expected: &'static str,
    },
    #[error("Checksum too short, missing {0} components")]
    TooShort(usize),
    #[error("Missing ':' separator at start of {0}")]
    MissingSeparator(String),
    #[error("Checksum too long, unexpected tail: {0}")]
    TooLong(String),
}

/// Number of live components the artifact's boot class path covers. It must be a prefix
/// of the live locations.
pub fn count_bcp_components(
    oat_boot_class_path: &str,
    bcp_locations: &[String],
) -> Result<usize, BootClassPathMismatch> {
    let components: Vec<&str> = oat_boot_class_path.split(':').collect();
    if components.len() > bcp_locations.len() {
        return Err(BootClassPathMismatch::TooManyComponents {
            found: components.len(),
            available: bcp_locations.len(),
        });
    }
    for (index, (found, expected)) in components.iter().zip(bcp_locations).enumerate() {
        if *found != expected.as_str() {
            return Err(BootClassPathMismatch::ComponentMismatch {
                index,
                expected: expected.clone(),
                found: found.to_string(),
            });
        }
    }
    Ok(components.len())
}

pub fn validate_boot_class_path_checksums(
    state: &PlatformState,
    isa: InstructionSet,
    oat_checksums: &str,
    oat_boot_class_path: &str,
) -> Result<(), BootClassPathMismatch> {
    if oat_checksums.is_empty() {
        return Err(BootClassPathMismatch::EmptyChecksums);
    }
    if oat_boot_class_path.is_empty() {
        return Err(BootClassPathMismatch::EmptyBootClassPath);
    }

    let bcp_locations = &state.options().boot_class_path_locations;
    let oat_bcp_size = count_bcp_components(oat_boot_class_path, bcp_locations)?;

    let mut remaining = oat_checksums;
    let mut bcp_index = 0;
    let mut boot_image_index = 0;
    let mut found_d = false;

    while bcp_index < oat_bcp_size {
        if remaining.starts_with(IMAGE_PREFIX) && !found_d {
            let boot_images = state.boot_image_info_list(isa);
            let Some(boot_image) = boot_images.get(boot_image_index) else {
                return Err(BootClassPathMismatch::MissingBootImage {
                    location: bcp_locations[bcp_index].clone(),
                    remaining: remaining.to_string(),
                });
            };
            remaining = remaining.strip_prefix(boot_image.checksum.as_str()).ok_or_else(|| {
                BootClassPathMismatch::ImageChecksumMismatch {
                    remaining: remaining.to_string(),
                    expected: boot_image.checksum.clone(),
                }
            })?;
            bcp_index += boot_image.component_count;
            boot_image_index += 1;
        } else if let Some(rest) = remaining.strip_prefix(DEX_PREFIX) {
            found_d = true;
            let location = &bcp_locations[bcp_index];
            let checksum = state.bcp_checksums(bcp_index).ok_or_else(|| {
                BootClassPathMismatch::UnreadableComponent {
                    location: location.clone(),
                }
            })?;
            remaining = rest.strip_prefix(checksum.as_str()).ok_or_else(|| {
                BootClassPathMismatch::DexChecksumMismatch {
                    location: location.clone(),
                    remaining: rest.to_string(),
                    expected: checksum.clone(),
                }
            })?;
            bcp_index += 1;
        } else {
            return Err(BootClassPathMismatch::UnexpectedChecksums {
                remaining: remaining.to_string(),
                expected: if found_d { "'d'" } else { "'i' or 'd'" },
            });
        }

        if bcp_index < oat_bcp_size {
            remaining = match remaining.strip_prefix(SEPARATOR) {
                Some(rest) => rest,
                None if remaining.is_empty() => {
                    return Err(BootClassPathMismatch::TooShort(oat_bcp_size - bcp_index));
                }
                None => return Err(BootClassPathMismatch::MissingSeparator(remaining.to_string())),
            };
        }
    }

    if !remaining.is_empty() {
        return Err(BootClassPathMismatch::TooLong(remaining.to_string()));
    }
    Ok(())
}
