mod common;

use common::*;
use oatscope_api::{ArtifactLocation, ArtifactStatus, CompilerFilter, DexOptStatus, DexOptTrigger};
use oatscope_core::{ArtifactResolver, ClassLoaderContext, PlatformState};
use std::path::Path;
use std::sync::Arc;

fn untrusted_resolver(apk: &str, state: &Arc<PlatformState>, only_trusted: bool) -> ArtifactResolver {
    ArtifactResolver::new(
        apk,
        ISA,
        Some(Arc::new(ClassLoaderContext::empty())),
        false,
        only_trusted,
        state.clone(),
    )
}

// ==================== Up to date ====================

#[test]
fn test_odex_up_to_date() {
    let env = TestEnv::new();
    let apk = app_archive(&env, "data/app/OdexUpToDate.jar");
    let odex = write_odex(&apk, &env.oat_header(&apk, CompilerFilter::Speed));

    for state in env.states() {
        let r = resolver(&apk, &state);
        assert_eq!(r.get_dexopt_needed_legacy(CompilerFilter::Speed, false, false), 0);
        assert_eq!(r.get_dexopt_needed_legacy(CompilerFilter::Verify, false, false), 0);
        assert_eq!(r.get_dexopt_needed_legacy(CompilerFilter::SpeedProfile, false, false), 0);
        assert_eq!(r.get_dexopt_needed_legacy(CompilerFilter::Everything, false, false), -3);
        assert_eq!(
            r.get_dexopt_needed(CompilerFilter::Speed, better_trigger()),
            DexOptStatus::new(false, ArtifactLocation::Odex)
        );

        assert!(r.is_up_to_date());
        assert_eq!(r.odex_file_status(), ArtifactStatus::UpToDate);
        assert_eq!(r.oat_file_status(), ArtifactStatus::CannotOpen);

        let status = r.get_optimization_status();
        assert_eq!(status.location, odex);
        assert_eq!(status.compiler_filter, "speed");
        assert_eq!(status.compilation_reason, "install");
        assert_eq!(status.status, "up-to-date");
    }
}

#[test]
fn test_oat_up_to_date() {
    let env = TestEnv::new();
    let apk = app_archive(&env, "data/app/OatUpToDate.jar");
    let oat = env.write_oat(&apk, &env.oat_header(&apk, CompilerFilter::Speed));

    for state in env.states() {
        let r = resolver(&apk, &state);
        assert_eq!(r.get_dexopt_needed_legacy(CompilerFilter::Speed, false, false), 0);
        assert_eq!(r.get_dexopt_needed_legacy(CompilerFilter::Everything, false, false), 3);
        assert_eq!(
            r.get_dexopt_needed(CompilerFilter::Speed, better_trigger()),
            DexOptStatus::new(false, ArtifactLocation::Oat)
        );
        assert_eq!(r.oat_file_status(), ArtifactStatus::UpToDate);
        assert_eq!(r.get_best_oat_file().unwrap().location(), oat);
    }
}

// ==================== Stale against the archive ====================

#[test]
fn test_oat_dex_out_of_date() {
    let env = TestEnv::new();
    let apk = app_archive(&env, "data/app/OatDexOutOfDate.jar");
    let mut header = env.oat_header(&apk, CompilerFilter::Speed);
    header.dex_checksums = vec![0xdead_beef];
    header.compilation_reason = None;
    let oat = env.write_oat(&apk, &header);

    for state in env.states() {
        let r = resolver(&apk, &state);
        assert_eq!(r.get_dexopt_needed_legacy(CompilerFilter::Extract, false, false), 1);
        assert_eq!(r.get_dexopt_needed_legacy(CompilerFilter::Speed, false, false), 1);
        assert_eq!(
            r.get_dexopt_needed(CompilerFilter::Speed, better_trigger()),
            DexOptStatus::new(true, ArtifactLocation::NoneOrError)
        );
        assert_eq!(r.oat_file_status(), ArtifactStatus::DexOutOfDate);
        assert!(!r.is_up_to_date());
        assert!(r.get_best_oat_file().is_none());

        let status = r.get_optimization_status();
        assert_eq!(status.location, oat);
        assert_eq!(status.compiler_filter, "run-from-apk-fallback");
        assert_eq!(status.compilation_reason, "unknown");
        assert_eq!(status.status, "apk-more-recent");
    }
}

#[test]
fn test_dex_count_mismatch_is_stale() {
    let env = TestEnv::new();
    let apk = env.path("data/app/MultiDex.jar");
    write_archive(Path::new(&apk), &[b"dex\none", b"dex\ntwo"], false);
    let mut header = env.oat_header(&apk, CompilerFilter::Speed);
    header.dex_checksums.truncate(1);
    write_odex(&apk, &header);

    for state in env.states() {
        let r = resolver(&apk, &state);
        assert_eq!(r.odex_file_status(), ArtifactStatus::DexOutOfDate);
        assert_eq!(r.get_dexopt_needed_legacy(CompilerFilter::Speed, false, false), 1);
    }
}

#[test]
fn test_archive_rewritten_after_compilation() {
    let env = TestEnv::new();
    let apk = app_archive(&env, "data/app/Rewritten.jar");
    write_odex(&apk, &env.oat_header(&apk, CompilerFilter::Speed));
    write_archive(Path::new(&apk), &[b"dex\nupdated"], false);

    for state in env.states() {
        let r = resolver(&apk, &state);
        assert_eq!(r.odex_file_status(), ArtifactStatus::DexOutOfDate);
        assert_eq!(r.get_optimization_status().status, "apk-more-recent");
    }
}

// ==================== Stale against the platform ====================

#[test]
fn test_oat_image_out_of_date_falls_back_to_vdex() {
    let env = TestEnv::new();
    let apk = app_archive(&env, "data/app/OatImageOutOfDate.jar");
    let mut header = env.oat_header(&apk, CompilerFilter::Speed);
    header.boot_class_path_checksums = header.boot_class_path_checksums.replace("0000b007", "0000dead");
    let oat = env.write_oat(&apk, &header);

    for state in env.states() {
        let r = resolver(&apk, &state);
        assert_eq!(r.get_dexopt_needed_legacy(CompilerFilter::Extract, false, false), 0);
        assert_eq!(r.get_dexopt_needed_legacy(CompilerFilter::Verify, false, false), 0);
        assert_eq!(r.get_dexopt_needed_legacy(CompilerFilter::Speed, false, false), 3);
        assert_eq!(
            r.get_dexopt_needed(CompilerFilter::Verify, better_trigger()),
            DexOptStatus::new(false, ArtifactLocation::Oat)
        );
        assert_eq!(
            r.get_dexopt_needed(CompilerFilter::Speed, better_trigger()),
            DexOptStatus::new(true, ArtifactLocation::Oat)
        );

        assert_eq!(r.odex_file_status(), ArtifactStatus::CannotOpen);
        assert_eq!(r.oat_file_status(), ArtifactStatus::BootImageOutOfDate);

        let status = r.get_optimization_status();
        assert_eq!(status.location, oatscope_core::location::vdex_file_name(&oat));
        assert_eq!(status.compiler_filter, "verify");
        assert_eq!(status.compilation_reason, "vdex");
        assert_eq!(status.status, "up-to-date");
    }
}

#[test]
fn test_missing_boot_image_makes_compiled_code_stale() {
    let env = TestEnv::new();
    let apk = app_archive(&env, "data/app/NoBootImage.jar");
    write_odex(&apk, &env.oat_header(&apk, CompilerFilter::Speed));
    let image = &env.options.image_locations[0];
    std::fs::remove_file(oatscope_core::location::boot_image_file_name(image, ISA)).unwrap();

    for state in env.states() {
        let r = resolver(&apk, &state);
        assert_eq!(r.odex_file_status(), ArtifactStatus::BootImageOutOfDate);
        assert_eq!(r.get_dexopt_needed_legacy(CompilerFilter::Verify, false, false), 0);
        assert_eq!(r.get_dexopt_needed_legacy(CompilerFilter::Speed, false, false), -3);
    }
}

#[test]
fn test_live_boot_class_path_may_grow() {
    let env = TestEnv::new();
    let apk = app_archive(&env, "data/app/BcpGrew.jar");
    let mut header = env.oat_header(&apk, CompilerFilter::Speed);
    header.boot_class_path = env.options.boot_class_path_locations[0].clone();
    header.boot_class_path_checksums = format!("i;1/{:08x}", BOOT_IMAGE_CHECKSUM);
    write_odex(&apk, &header);

    for state in env.states() {
        let r = resolver(&apk, &state);
        assert_eq!(r.odex_file_status(), ArtifactStatus::UpToDate);
        assert!(
            ArtifactResolver::validate_boot_class_path_checksums(
                &state,
                ISA,
                &header.boot_class_path_checksums,
                &header.boot_class_path,
            )
        );
    }
}

#[test]
fn test_foreign_boot_class_path_is_stale() {
    let env = TestEnv::new();
    let apk = app_archive(&env, "data/app/BcpMismatch.jar");
    let mut header = env.oat_header(&apk, CompilerFilter::Speed);
    header.boot_class_path = env.options.boot_class_path_locations[1].clone();
    write_odex(&apk, &header);

    for state in env.states() {
        let r = resolver(&apk, &state);
        assert_eq!(r.odex_file_status(), ArtifactStatus::BootImageOutOfDate);
        assert!(!ArtifactResolver::validate_boot_class_path_checksums(
            &state,
            ISA,
            &header.boot_class_path_checksums,
            &header.boot_class_path,
        ));
        assert_eq!(
            r.get_dexopt_needed(CompilerFilter::Verify, better_trigger()),
            DexOptStatus::new(false, ArtifactLocation::Odex)
        );
    }
}

#[test]
fn test_apex_versions_prefix() {
    let env = TestEnv::new();
    let current = app_archive(&env, "data/app/ApexPrefix.jar");
    let mut header = env.oat_header(&current, CompilerFilter::Speed);
    header.apex_versions = "/".to_string();
    write_odex(&current, &header);

    let stale = app_archive(&env, "data/app/ApexStale.jar");
    let mut header = env.oat_header(&stale, CompilerFilter::Speed);
    header.apex_versions = "/341000/".to_string();
    write_odex(&stale, &header);

    for state in env.states() {
        assert_eq!(state.apex_versions(), "//");
        assert_eq!(resolver(&current, &state).odex_file_status(), ArtifactStatus::UpToDate);
        assert_eq!(
            resolver(&stale, &state).odex_file_status(),
            ArtifactStatus::BootImageOutOfDate
        );
    }
}

#[test]
fn test_verify_artifact_ignores_boot_image() {
    let env = TestEnv::new();
    let apk = app_archive(&env, "data/app/VerifyOnly.jar");
    let mut header = env.oat_header(&apk, CompilerFilter::Verify);
    header.boot_class_path_checksums = "i;1/ffffffff".to_string();
    header.apex_versions = "/1/2".to_string();
    write_odex(&apk, &header);

    for state in env.states() {
        assert_eq!(resolver(&apk, &state).odex_file_status(), ArtifactStatus::UpToDate);
    }
}

#[test]
fn test_primary_boot_image_becomes_usable() {
    let env = TestEnv::new();
    let apk = app_archive(&env, "data/app/ImageBecameUsable.jar");
    let live = env.live();
    let mut header = env.oat_header(&apk, CompilerFilter::Speed);
    header.boot_class_path_checksums = format!(
        "d{}:d{}",
        live.bcp_checksums(0).unwrap(),
        live.bcp_checksums(1).unwrap()
    );
    write_odex(&apk, &header);

    let better_only = DexOptTrigger {
        target_filter_is_better: true,
        ..DexOptTrigger::default()
    };

    for state in env.states() {
        let r = resolver(&apk, &state);
        assert_eq!(r.odex_file_status(), ArtifactStatus::UpToDate);
        assert_eq!(r.get_dexopt_needed_legacy(CompilerFilter::Speed, false, false), -3);
        assert_eq!(
            r.get_dexopt_needed(CompilerFilter::Speed, better_trigger()),
            DexOptStatus::new(true, ArtifactLocation::Odex)
        );
        assert_eq!(
            r.get_dexopt_needed(CompilerFilter::Speed, better_only),
            DexOptStatus::new(false, ArtifactLocation::Odex)
        );
    }
}

// ==================== Class loader context ====================

#[test]
fn test_context_out_of_date() {
    let env = TestEnv::new();
    let apk = app_archive(&env, "data/app/ContextOutOfDate.jar");
    let mut header = env.oat_header(&apk, CompilerFilter::Speed);
    header.class_loader_context = Some("PCL[/system/framework/other.jar*12345678]".to_string());
    write_odex(&apk, &header);

    for state in env.states() {
        let r = resolver(&apk, &state);
        assert_eq!(r.odex_file_status(), ArtifactStatus::ContextOutOfDate);
        assert_eq!(r.get_dexopt_needed_legacy(CompilerFilter::Speed, false, false), -3);
        assert_eq!(
            r.get_dexopt_needed(CompilerFilter::Speed, better_trigger()),
            DexOptStatus::new(true, ArtifactLocation::Odex)
        );
        assert_eq!(
            r.get_dexopt_needed(CompilerFilter::Verify, better_trigger()),
            DexOptStatus::new(false, ArtifactLocation::Odex)
        );

        // Without a context the check is skipped.
        let unchecked = ArtifactResolver::new(&apk, ISA, None, false, false, state.clone());
        assert_eq!(unchecked.odex_file_status(), ArtifactStatus::UpToDate);
        assert_eq!(
            unchecked.get_dexopt_needed_legacy(CompilerFilter::Speed, false, false),
            0
        );
    }
}

#[test]
fn test_unsupported_stored_context_never_matches() {
    let env = TestEnv::new();
    let apk = app_archive(&env, "data/app/UnsupportedContext.jar");
    let mut header = env.oat_header(&apk, CompilerFilter::Speed);
    header.class_loader_context = Some("&".to_string());
    write_odex(&apk, &header);

    for state in env.states() {
        assert_eq!(
            resolver(&apk, &state).odex_file_status(),
            ArtifactStatus::ContextOutOfDate
        );
    }
}

#[test]
fn test_context_ignored_without_verification() {
    let env = TestEnv::new();
    let apk = app_archive(&env, "data/app/ExtractContext.jar");
    let mut header = env.oat_header(&apk, CompilerFilter::Extract);
    header.class_loader_context = Some("PCL[other.jar]".to_string());
    write_odex(&apk, &header);

    for state in env.states() {
        assert_eq!(resolver(&apk, &state).odex_file_status(), ArtifactStatus::UpToDate);
    }
}

// ==================== Trusted locations ====================

#[test]
fn test_untrusted_artifact_with_embedded_dex() {
    let env = TestEnv::new();
    let apk = app_archive(&env, "data/app/Untrusted.jar");
    write_odex(&apk, &env.oat_header(&apk, CompilerFilter::Speed));

    for state in env.states() {
        let strict = untrusted_resolver(&apk, &state, true);
        assert_eq!(strict.odex_file_status(), ArtifactStatus::DexOutOfDate);
        assert_eq!(strict.get_dexopt_needed_legacy(CompilerFilter::Speed, false, false), 1);

        let lenient = untrusted_resolver(&apk, &state, false);
        assert_eq!(lenient.odex_file_status(), ArtifactStatus::UpToDate);
    }
}

#[test]
fn test_untrusted_artifact_with_compressed_archive() {
    let env = TestEnv::new();
    let apk = env.path("data/app/Compressed.jar");
    write_archive(Path::new(&apk), &[b"dex\ncompressed"], true);
    write_odex(&apk, &env.oat_header(&apk, CompilerFilter::Speed));

    for state in env.states() {
        let strict = untrusted_resolver(&apk, &state, true);
        assert_eq!(strict.odex_file_status(), ArtifactStatus::UpToDate);
    }
}

#[test]
fn test_trusted_artifact_with_embedded_dex() {
    let env = TestEnv::new();
    let apk = app_archive(&env, "system/app/Trusted.jar");
    write_odex(&apk, &env.oat_header(&apk, CompilerFilter::Speed));

    for state in env.states() {
        let strict = untrusted_resolver(&apk, &state, true);
        assert_eq!(strict.odex_file_status(), ArtifactStatus::UpToDate);
    }
}
