//! Class loader context: the chain of loaders, and their class paths, an archive is
//! loaded with.
//!
//! Textual form is `PCL[a.jar:b.jar];DLC[c.jar]`, parent last. Once the class path
//! archives are opened the context can be encoded with their checksums, which is what
//! compiled artifacts record: `PCL[a.jar*1a2b3c4d:a.jar!classes2.dex*5e6f7a8b]`.

use crate::dex;
use crate::error::{OatscopeError, Result};
use crate::location;
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

const UNSUPPORTED_MARKER: &str = "&";
const LOADER_SEPARATOR: char = ';';
const CLASS_PATH_SEPARATOR: char = ':';
const CHECKSUM_SEPARATOR: char = '*';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoaderKind {
    PathClassLoader,
    DelegateLastClassLoader,
    InMemoryDexClassLoader,
}

impl LoaderKind {
    pub fn tag(self) -> &'static str {
        match self {
            LoaderKind::PathClassLoader => "PCL",
            LoaderKind::DelegateLastClassLoader => "DLC",
            LoaderKind::InMemoryDexClassLoader => "IMC",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "PCL" => Some(LoaderKind::PathClassLoader),
            "DLC" => Some(LoaderKind::DelegateLastClassLoader),
            "IMC" => Some(LoaderKind::InMemoryDexClassLoader),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassPathEntry {
    pub name: String,
    pub checksum: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderSpec {
    pub kind: LoaderKind,
    pub class_path: Vec<ClassPathEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassLoaderContext {
    chain: Vec<LoaderSpec>,
    /// The `&` marker: the loader chain could not be described.
    unsupported: bool,
    opened: bool,
}

impl ClassLoaderContext {
    /// Single empty path class loader.
    pub fn empty() -> Self {
        Self {
            chain: vec![LoaderSpec {
                kind: LoaderKind::PathClassLoader,
                class_path: Vec::new(),
            }],
            unsupported: false,
            opened: false,
        }
    }

    pub fn parse(spec: &str) -> Result<Self> {
        let invalid = || OatscopeError::InvalidContext(spec.to_string());

        if spec.is_empty() {
            return Ok(Self::empty());
        }
        if spec == UNSUPPORTED_MARKER {
            return Ok(Self {
                chain: Vec::new(),
                unsupported: true,
                opened: false,
            });
        }

        let mut chain = Vec::new();
        for loader in spec.split(LOADER_SEPARATOR) {
            let open = loader.find('[').ok_or_else(invalid)?;
            let body = loader[open + 1..].strip_suffix(']').ok_or_else(invalid)?;
            let kind = LoaderKind::from_tag(&loader[..open]).ok_or_else(invalid)?;
            if body.contains(['[', ']', '{', '}']) {
                return Err(invalid());
            }

            let mut class_path = Vec::new();
            if !body.is_empty() {
                for element in body.split(CLASS_PATH_SEPARATOR) {
                    let entry = match element.split_once(CHECKSUM_SEPARATOR) {
                        Some((name, checksum)) => ClassPathEntry {
                            name: name.to_string(),
                            checksum: Some(u32::from_str_radix(checksum, 16).map_err(|_| invalid())?),
                        },
                        None => ClassPathEntry {
                            name: element.to_string(),
                            checksum: None,
                        },
                    };
                    if entry.name.is_empty() {
                        return Err(invalid());
                    }
                    class_path.push(entry);
                }
            }
            chain.push(LoaderSpec { kind, class_path });
        }

        Ok(Self {
            chain,
            unsupported: false,
            opened: false,
        })
    }

    pub fn chain(&self) -> &[LoaderSpec] {
        &self.chain
    }

    pub fn is_unsupported(&self) -> bool {
        self.unsupported
    }

    pub fn is_opened(&self) -> bool {
        self.opened
    }

    /// Reads the checksums of every class path archive, expanding multidex archives into
    /// one entry per constituent. Relative names resolve against `classpath_dir`.
    ///
    /// An archive that cannot be read, or holds no bytecode, fails the whole context.
    pub fn open_dex_files(&mut self, classpath_dir: &str) -> std::result::Result<(), String> {
        if self.opened {
            return Ok(());
        }
        for loader in &mut self.chain {
            let mut expanded = Vec::with_capacity(loader.class_path.len());
            for entry in &loader.class_path {
                let path = if entry.name.starts_with('/') || classpath_dir.is_empty() {
                    entry.name.clone()
                } else {
                    format!("{}/{}", classpath_dir, entry.name)
                };
                let checksums = dex::read_checksums(Path::new(&path))
                    .map_err(|e| format!("Could not open {}: {}", path, e))?;
                if checksums.is_empty() {
                    return Err(format!("No dex files found in {}", path));
                }
                for (index, checksum) in checksums.checksums.iter().enumerate() {
                    expanded.push(ClassPathEntry {
                        name: dex::multidex_location(&entry.name, index),
                        checksum: Some(*checksum),
                    });
                }
            }
            loader.class_path = expanded;
        }
        self.opened = true;
        debug!("Opened class loader context {}", self);
        Ok(())
    }

    /// Textual form including checksums, as recorded in compiled artifacts.
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Whether an artifact compiled against `stored` can be used with this context.
    pub fn matches_stored(&self, stored: &str) -> bool {
        let stored = match Self::parse(stored) {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!("Artifact carries an unreadable class loader context: {}", e);
                return false;
            }
        };
        if stored.unsupported || self.unsupported {
            debug!("Unsupported class loader context never matches");
            return false;
        }
        if stored.chain.len() != self.chain.len() {
            return false;
        }

        self.chain.iter().zip(&stored.chain).all(|(expected, actual)| {
            expected.kind == actual.kind
                && expected.class_path.len() == actual.class_path.len()
                && expected
                    .class_path
                    .iter()
                    .zip(&actual.class_path)
                    .all(|(e, a)| entry_matches(e, a))
        })
    }
}

fn entry_matches(expected: &ClassPathEntry, actual: &ClassPathEntry) -> bool {
    let names_match = if expected.name.starts_with('/') && actual.name.starts_with('/') {
        expected.name == actual.name
    } else {
        location::basename(&expected.name) == location::basename(&actual.name)
    };
    if !names_match {
        debug!("Class path mismatch: {} vs {}", expected.name, actual.name);
        return false;
    }
    match expected.checksum {
        Some(checksum) => actual.checksum == Some(checksum),
        None => true,
    }
}

impl fmt::Display for ClassLoaderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unsupported {
            return f.write_str(UNSUPPORTED_MARKER);
        }
        for (i, loader) in self.chain.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", LOADER_SEPARATOR)?;
            }
            write!(f, "{}[", loader.kind.tag())?;
            for (j, entry) in loader.class_path.iter().enumerate() {
                if j > 0 {
                    write!(f, "{}", CLASS_PATH_SEPARATOR)?;
                }
                f.write_str(&entry.name)?;
                if let Some(checksum) = entry.checksum {
                    write!(f, "{}{:08x}", CHECKSUM_SEPARATOR, checksum)?;
                }
            }
            f.write_str("]")?;
        }
        Ok(())
    }
}
