mod dexopt;
mod paths;
mod platform;
mod snapshot;
mod status;
mod validate;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "oatscope",
    version,
    about = "Inspect the precompiled artifacts of bytecode archives",
    long_about = "Oatscope answers whether any precompiled artifact (odex, oat, vdex or dm) of a \
                  bytecode archive is still valid against the archive and the platform, and if \
                  not, what kind of recompilation would be required. It never modifies anything."
)]
pub struct Cli {
    #[command(flatten)]
    pub platform: PlatformArgs,

    /// Also print logs to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where the platform description comes from.
#[derive(Args, Clone, Default)]
pub struct PlatformArgs {
    /// Runtime options file (JSON). Defaults to $OATSCOPE_OPTIONS, then ~/.oatscope/options.json
    #[arg(long, global = true, value_name = "FILE")]
    pub options: Option<PathBuf>,

    /// Answer from a platform snapshot instead of the live platform
    #[arg(long, global = true, value_name = "FILE", conflicts_with = "options")]
    pub snapshot: Option<PathBuf>,
}

/// Archive selection shared by the per-archive commands.
#[derive(Args, Clone)]
pub struct ArchiveArgs {
    /// Instruction set to resolve for. Defaults to the runtime instruction set
    #[arg(long)]
    pub isa: Option<String>,

    /// Class loader context, e.g. "PCL[lib.jar]". Omit to skip context checks
    #[arg(long)]
    pub context: Option<String>,

    /// Only artifacts under the trusted roots may be loaded executable
    #[arg(long)]
    pub only_trusted: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show which artifact would be used for each archive
    #[command(
        long_about = "Resolves every given archive and prints the artifact that would be loaded, \
                      its compiler filter, compilation reason and status."
    )]
    Status {
        /// Bytecode archives to inspect
        #[arg(value_name = "DEX_LOCATION", required = true)]
        locations: Vec<String>,

        #[command(flatten)]
        archive: ArchiveArgs,

        /// Append the per-location status dump
        #[arg(long)]
        dump: bool,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Decide whether an archive needs compiling for a target filter
    #[command(name = "dexopt-needed")]
    DexoptNeeded {
        #[arg(value_name = "DEX_LOCATION")]
        location: String,

        /// Requested compiler filter
        #[arg(long, default_value = "speed")]
        filter: String,

        /// Trigger preset: default, downgrade or force
        #[arg(long, default_value = "default", conflicts_with_all = ["profile_changed", "downgrade"])]
        trigger: String,

        #[command(flatten)]
        archive: ArchiveArgs,

        /// Print the signed legacy integer instead
        #[arg(long)]
        legacy: bool,

        /// Legacy query: the profile changed since the last compilation
        #[arg(long, requires = "legacy")]
        profile_changed: bool,

        /// Legacy query: only a lower filter is wanted
        #[arg(long, requires = "legacy")]
        downgrade: bool,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },
    /// Check a boot class path checksum string against the platform
    #[command(name = "validate-bcp")]
    ValidateBcp {
        /// Checksum string as recorded in an artifact, e.g. "i;1/0000abcd:d/1234abcd"
        #[arg(long)]
        checksums: String,

        /// Colon-separated boot class path recorded with it
        #[arg(long)]
        bcp: String,

        #[arg(long)]
        isa: Option<String>,
    },
    /// Capture every platform fact into a snapshot file
    Snapshot {
        /// Output file. Prints to stdout if omitted
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Print the candidate artifact paths of an archive
    Paths {
        #[arg(value_name = "DEX_LOCATION")]
        location: String,

        #[arg(long)]
        isa: Option<String>,
    },
}

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let _guard = oatscope_core::logging::init_logging("cli", cli.verbose);

    let state = platform::load_state(&cli.platform)?;

    match cli.command {
        Commands::Status {
            locations,
            archive,
            dump,
            json,
        } => status::run(state, &locations, &archive, dump, json),
        Commands::DexoptNeeded {
            location,
            filter,
            trigger,
            archive,
            legacy,
            profile_changed,
            downgrade,
            json,
        } => {
            let query = if legacy {
                dexopt::Query::Legacy {
                    profile_changed,
                    downgrade,
                }
            } else {
                dexopt::Query::Trigger(trigger.parse()?)
            };
            dexopt::run(state, &location, filter.parse()?, query, &archive, json)
        }
        Commands::ValidateBcp {
            checksums,
            bcp,
            isa,
        } => validate::run(&state, isa.as_deref(), &checksums, &bcp),
        Commands::Snapshot { output } => snapshot::run(&state, output),
        Commands::Paths { location, isa } => paths::run(&state, &location, isa.as_deref()),
    }
}
