#![allow(dead_code)]

use oatscope_api::{CompilerFilter, DexOptTrigger, InstructionSet};
use oatscope_core::artifact::{BootImageHeader, Header, OatHeader, VdexHeader};
use oatscope_core::artifact::header::DM_VDEX_ENTRY;
use oatscope_core::{ArtifactResolver, ClassLoaderContext, PlatformState, RuntimeOptions, dex, location};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

pub const ISA: InstructionSet = InstructionSet::Arm64;
pub const BOOT_IMAGE_CHECKSUM: u32 = 0xb007;

/// A throwaway platform: one boot image chunk covering `core.jar`, then `framework.jar`
/// outside of any image.
pub struct TestEnv {
    pub dir: TempDir,
    pub options: RuntimeOptions,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        let core = root.join("system/framework/core.jar");
        let framework = root.join("system/framework/framework.jar");
        write_archive(&core, &[b"dex\ncore"], false);
        write_archive(&framework, &[b"dex\nframework-1", b"dex\nframework-2"], false);

        let image = root.join("system/framework/boot.art").display().to_string();
        BootImageHeader {
            component_count: 1,
            image_checksum: BOOT_IMAGE_CHECKSUM,
        }
        .write(Path::new(&location::boot_image_file_name(&image, ISA)))
        .unwrap();

        let bcp = vec![core.display().to_string(), framework.display().to_string()];
        let options = RuntimeOptions {
            image_locations: vec![image],
            boot_class_path: bcp.clone(),
            boot_class_path_locations: bcp,
            dalvik_cache: Some(root.join("dalvik-cache")),
            trusted_roots: vec![root.join("system")],
            runtime_isa: ISA,
            apex_info_list: None,
        };
        Self { dir, options }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Absolute location of `relative` inside the environment, as a string.
    pub fn path(&self, relative: &str) -> String {
        self.root().join(relative).display().to_string()
    }

    pub fn live(&self) -> Arc<PlatformState> {
        Arc::new(PlatformState::live(self.options.clone()))
    }

    pub fn frozen(&self) -> Arc<PlatformState> {
        let snapshot = PlatformState::live(self.options.clone()).snapshot();
        Arc::new(PlatformState::frozen(snapshot))
    }

    /// Every scenario has to hold for both kinds of state.
    pub fn states(&self) -> [Arc<PlatformState>; 2] {
        [self.live(), self.frozen()]
    }

    /// Boot class path and checksums an artifact compiled right now would record.
    pub fn current_bcp(&self) -> (String, String) {
        let state = self.live();
        let image = &state.boot_image_info_list(ISA)[0];
        let framework = state.bcp_checksums(1).unwrap();
        (
            self.options.boot_class_path_locations.join(":"),
            format!("{}:d{}", image.checksum, framework),
        )
    }

    /// Header of an artifact freshly compiled for `dex_location` against the empty context.
    pub fn oat_header(&self, dex_location: &str, filter: CompilerFilter) -> OatHeader {
        let (boot_class_path, boot_class_path_checksums) = self.current_bcp();
        OatHeader {
            compiler_filter: filter,
            compilation_reason: Some("install".to_string()),
            class_loader_context: Some(ClassLoaderContext::empty().encode()),
            dex_checksums: checksums_of(dex_location),
            boot_class_path,
            boot_class_path_checksums,
            apex_versions: self.live().apex_versions().to_string(),
            has_app_image: false,
        }
    }

    pub fn oat_path(&self, dex_location: &str) -> String {
        let cache = self.options.dalvik_cache.as_deref().unwrap();
        location::oat_file_name(dex_location, ISA, cache).unwrap()
    }

    /// Writes the compiled artifact and its paired vdex into the system cache.
    pub fn write_oat(&self, dex_location: &str, header: &OatHeader) -> String {
        let path = self.oat_path(dex_location);
        write_compiled(&path, header);
        path
    }
}

pub fn odex_path(dex_location: &str) -> String {
    location::odex_file_name(dex_location, ISA).unwrap()
}

/// Writes the compiled artifact and its paired vdex next to the archive.
pub fn write_odex(dex_location: &str, header: &OatHeader) -> String {
    let path = odex_path(dex_location);
    write_compiled(&path, header);
    path
}

fn write_compiled(path: &str, header: &OatHeader) {
    header.write(Path::new(path)).unwrap();
    vdex_header(header.dex_checksums.clone())
        .write(Path::new(&location::vdex_file_name(path)))
        .unwrap();
}

pub fn vdex_header(dex_checksums: Vec<u32>) -> VdexHeader {
    VdexHeader {
        dex_checksums,
        contains_dex_code: true,
    }
}

/// A standalone vdex where the odex would be.
pub fn write_vdex_for_odex(dex_location: &str, vdex: &VdexHeader) -> String {
    let path = location::vdex_file_name(&odex_path(dex_location));
    vdex.write(Path::new(&path)).unwrap();
    path
}

pub fn write_dm(dex_location: &str, vdex: &VdexHeader) -> String {
    let path = location::dm_file_name(dex_location);
    let mut writer = zip::ZipWriter::new(File::create(&path).unwrap());
    writer
        .start_file(DM_VDEX_ENTRY, SimpleFileOptions::default())
        .unwrap();
    writer.write_all(&vdex.encode().unwrap()).unwrap();
    writer.finish().unwrap();
    path
}

/// One `classesN.dex` entry per element of `dex_files`.
pub fn write_archive(path: &Path, dex_files: &[&[u8]], compressed: bool) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let method = if compressed {
        CompressionMethod::Deflated
    } else {
        CompressionMethod::Stored
    };
    let options = SimpleFileOptions::default().compression_method(method);

    let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
    for (index, contents) in dex_files.iter().enumerate() {
        writer
            .start_file(dex::multidex_entry_name(index), options)
            .unwrap();
        writer.write_all(contents).unwrap();
    }
    writer.finish().unwrap();
}

pub fn write_resource_only_archive(path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
    writer
        .start_file("res/values.xml", SimpleFileOptions::default())
        .unwrap();
    writer.write_all(b"<resources/>").unwrap();
    writer.finish().unwrap();
}

/// Creates `<root>/<relative>` holding a single stored bytecode file and returns its location.
pub fn app_archive(env: &TestEnv, relative: &str) -> String {
    let location = env.path(relative);
    write_archive(Path::new(&location), &[b"dex\napp"], false);
    location
}

pub fn checksums_of(dex_location: &str) -> Vec<u32> {
    dex::read_checksums(Path::new(dex_location))
        .unwrap()
        .checksums
}

/// Recompile only for a better filter, a newly usable boot image or extraction.
pub fn better_trigger() -> DexOptTrigger {
    DexOptTrigger {
        target_filter_is_better: true,
        primary_boot_image_becomes_usable: true,
        need_extraction: true,
        ..DexOptTrigger::default()
    }
}

/// Resolver with the empty context, not loading executable.
pub fn resolver(dex_location: &str, state: &Arc<PlatformState>) -> ArtifactResolver {
    ArtifactResolver::new(
        dex_location,
        ISA,
        Some(Arc::new(ClassLoaderContext::empty())),
        false,
        false,
        state.clone(),
    )
}
