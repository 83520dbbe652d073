use crate::ArchiveArgs;
use crate::platform;
use oatscope_api::OptimizationStatus;
use oatscope_core::{ArtifactResolver, PlatformState};
use serde::Serialize;
use std::sync::Arc;
use tabled::{Table, Tabled, settings::Style};
use tracing::info;

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "Archive")]
    dex_location: String,
    #[tabled(rename = "Artifact")]
    artifact: String,
    #[tabled(rename = "Filter")]
    filter: String,
    #[tabled(rename = "Reason")]
    reason: String,
    #[tabled(rename = "Status")]
    status: String,
}

#[derive(Serialize)]
struct StatusReport {
    dex_location: String,
    #[serde(flatten)]
    status: OptimizationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    dump: Option<String>,
}

pub fn run(
    state: Arc<PlatformState>,
    locations: &[String],
    archive: &ArchiveArgs,
    dump: bool,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let isa = platform::isa_name(&state, archive.isa.as_deref());

    let mut reports = Vec::with_capacity(locations.len());
    for location in locations {
        let resolver = ArtifactResolver::create(
            location,
            &isa,
            archive.context.as_deref(),
            false,
            archive.only_trusted,
            state.clone(),
        )?;
        let status = resolver.get_optimization_status();
        info!(
            "{}: {} ({}, {})",
            location, status.status, status.compiler_filter, status.compilation_reason
        );
        reports.push(StatusReport {
            dex_location: location.clone(),
            status,
            dump: dump.then(|| resolver.status_dump()),
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    let rows: Vec<StatusRow> = reports
        .iter()
        .map(|r| StatusRow {
            dex_location: r.dex_location.clone(),
            artifact: r.status.location.clone(),
            filter: r.status.compiler_filter.clone(),
            reason: r.status.compilation_reason.clone(),
            status: r.status.status.clone(),
        })
        .collect();
    println!("{}", Table::new(rows).with(Style::psql()).to_string());

    for report in &reports {
        if let Some(dump) = &report.dump {
            println!("{}: {}", report.dex_location, dump);
        }
    }
    Ok(())
}
