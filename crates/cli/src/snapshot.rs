use oatscope_core::PlatformState;
use std::path::PathBuf;
use tracing::info;

pub fn run(state: &PlatformState, output: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let json = state.snapshot().to_json()?;
    match output {
        Some(path) => {
            std::fs::write(&path, json)?;
            info!("Platform snapshot written to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}
