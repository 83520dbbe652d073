use crate::PlatformArgs;
use oatscope_api::InstructionSet;
use oatscope_core::{PlatformSnapshot, PlatformState, RuntimeOptions};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

const OPTIONS_ENV: &str = "OATSCOPE_OPTIONS";

/// `~/.oatscope/options.json`
fn default_options_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".oatscope").join("options.json"))
}

/// The options file to read: explicit flag, then the environment, then the default path
/// if it exists.
fn options_path(args: &PlatformArgs) -> Option<PathBuf> {
    if let Some(path) = &args.options {
        return Some(path.clone());
    }
    if let Some(path) = std::env::var_os(OPTIONS_ENV) {
        return Some(PathBuf::from(path));
    }
    default_options_path().filter(|path| path.exists())
}

pub fn load_state(args: &PlatformArgs) -> Result<Arc<PlatformState>, Box<dyn std::error::Error>> {
    if let Some(path) = &args.snapshot {
        info!("Using platform snapshot {}", path.display());
        let snapshot = PlatformSnapshot::from_file(path)?;
        return Ok(Arc::new(PlatformState::frozen(snapshot)));
    }

    let options = match options_path(args) {
        Some(path) => {
            debug!("Reading runtime options from {}", path.display());
            RuntimeOptions::from_file(&path)?
        }
        None => {
            debug!("No runtime options found, assuming an empty platform");
            RuntimeOptions::default()
        }
    };
    Ok(Arc::new(PlatformState::live(options)))
}

/// `--isa` if given, else the platform's runtime instruction set.
pub fn isa_name(state: &PlatformState, isa: Option<&str>) -> String {
    isa.map(str::to_string)
        .unwrap_or_else(|| state.options().runtime_isa.name().to_string())
}

pub fn parse_isa(state: &PlatformState, isa: Option<&str>) -> Result<InstructionSet, Box<dyn std::error::Error>> {
    Ok(isa_name(state, isa).parse()?)
}
