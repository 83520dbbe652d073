use crate::ArchiveArgs;
use crate::platform;
use oatscope_api::{CompilerFilter, DexOptNeeded, DexOptTrigger};
use oatscope_core::{ArtifactResolver, PlatformState};
use serde_json::json;
use std::sync::Arc;

/// Which of the two query surfaces to answer with.
pub enum Query {
    Trigger(DexOptTrigger),
    Legacy { profile_changed: bool, downgrade: bool },
}

pub fn run(
    state: Arc<PlatformState>,
    location: &str,
    target: CompilerFilter,
    query: Query,
    archive: &ArchiveArgs,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let isa = platform::isa_name(&state, archive.isa.as_deref());
    let resolver = ArtifactResolver::create(
        location,
        &isa,
        archive.context.as_deref(),
        false,
        archive.only_trusted,
        state,
    )?;

    match query {
        Query::Trigger(trigger) => {
            let status = resolver.get_dexopt_needed(target, trigger);
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("needed:         {}", status.needed);
                println!("vdex usable:    {}", status.is_vdex_usable);
                println!("location:       {}", status.location);
            }
        }
        Query::Legacy {
            profile_changed,
            downgrade,
        } => {
            let code = resolver.get_dexopt_needed_legacy(target, profile_changed, downgrade);
            if json {
                let verdict = DexOptNeeded::from_code(code).map(|n| format!("{:?}", n));
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({ "code": code, "verdict": verdict }))?
                );
            } else {
                println!("{}", code);
            }
        }
    }
    Ok(())
}
