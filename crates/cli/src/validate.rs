use crate::platform;
use oatscope_core::PlatformState;
use oatscope_core::bcp;

pub fn run(
    state: &PlatformState,
    isa: Option<&str>,
    checksums: &str,
    boot_class_path: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let isa = platform::parse_isa(state, isa)?;
    bcp::validate_boot_class_path_checksums(state, isa, checksums, boot_class_path)?;
    println!("Boot class path checksums match.");
    Ok(())
}
