//! Bytecode archive reader.
//!
//! An archive is either a zip holding `classes.dex`, `classes2.dex`, ... or a single raw
//! dex file. Only the per-constituent checksums and whether any constituent is stored
//! compressed are extracted.

use crate::error::{OatscopeError, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use xxhash_rust::xxh3::xxh3_64;
use zip::{CompressionMethod, ZipArchive};

const DEX_MAGIC: &[u8; 4] = b"dex\n";
const ZIP_MAGIC: &[u8; 2] = b"PK";
const MULTIDEX_SEPARATOR: char = '!';

/// Checksums of every constituent bytecode file, in multidex order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DexChecksums {
    pub checksums: Vec<u32>,
    /// True when no constituent needs decompressing before it can be mapped.
    pub only_uncompressed: bool,
}

impl DexChecksums {
    pub fn is_empty(&self) -> bool {
        self.checksums.is_empty()
    }

    /// Checksum identifying the whole archive on the boot class path.
    pub fn combined(&self) -> u32 {
        combined_checksum(&self.checksums)
    }
}

/// Zip entry name of the i-th constituent (0-based).
pub fn multidex_entry_name(index: usize) -> String {
    if index == 0 {
        "classes.dex".to_string()
    } else {
        format!("classes{}.dex", index + 1)
    }
}

/// Location of the i-th constituent (0-based): `<location>` then `<location>!classesN.dex`.
pub fn multidex_location(location: &str, index: usize) -> String {
    if index == 0 {
        location.to_string()
    } else {
        format!("{}{}{}", location, MULTIDEX_SEPARATOR, multidex_entry_name(index))
    }
}

pub fn combined_checksum(checksums: &[u32]) -> u32 {
    match checksums {
        [single] => *single,
        many => {
            let bytes: Vec<u8> = many.iter().flat_map(|c| c.to_le_bytes()).collect();
            xxh3_64(&bytes) as u32
        }
    }
}

pub fn read_checksums(path: &Path) -> Result<DexChecksums> {
    let mut file = File::open(path)?;
    read_checksums_from(&mut file, &path.display().to_string())
}

/// Reads from an already open handle, starting at offset 0 regardless of its position.
pub fn read_checksums_from<R: Read + Seek>(reader: &mut R, display_name: &str) -> Result<DexChecksums> {
    reader.seek(SeekFrom::Start(0))?;
    let mut head = [0u8; 12];
    let read = read_up_to(reader, &mut head)?;
    reader.seek(SeekFrom::Start(0))?;

    if read >= 12 && &head[..4] == DEX_MAGIC {
        let checksum = u32::from_le_bytes([head[8], head[9], head[10], head[11]]);
        return Ok(DexChecksums {
            checksums: vec![checksum],
            only_uncompressed: true,
        });
    }

    if read < 2 || &head[..2] != ZIP_MAGIC {
        return Err(OatscopeError::NotAnArchive {
            path: display_name.to_string(),
        });
    }

    let mut archive = ZipArchive::new(reader)?;
    let mut result = DexChecksums {
        checksums: Vec::new(),
        only_uncompressed: true,
    };
    for index in 0.. {
        let entry = match archive.by_name(&multidex_entry_name(index)) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::FileNotFound) => break,
            Err(e) => return Err(e.into()),
        };
        if entry.compression() != CompressionMethod::Stored {
            result.only_uncompressed = false;
        }
        result.checksums.push(entry.crc32());
    }
    Ok(result)
}

fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}
