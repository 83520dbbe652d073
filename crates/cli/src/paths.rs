use crate::platform;
use oatscope_core::PlatformState;
use oatscope_core::location::{self, ArtifactPaths};

pub fn run(
    state: &PlatformState,
    dex_location: &str,
    isa: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let isa = platform::parse_isa(state, isa)?;
    let paths = ArtifactPaths::probe(dex_location, isa, state.options().dalvik_cache.as_deref());

    for (kind, artifact) in [("odex", &paths.odex), ("oat", &paths.oat)] {
        match artifact {
            Some(path) => {
                println!("{:<6}{}", format!("{}:", kind), path);
                println!("{:<6}{}", "vdex:", location::vdex_file_name(path));
            }
            None => println!("{:<6}-", format!("{}:", kind)),
        }
    }
    println!("{:<6}{}", "dm:", paths.dm);
    Ok(())
}
