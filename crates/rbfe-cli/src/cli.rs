use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "Tony Kan, Ted Yu, William A. Goddard III, Victor Wai Tak Kam",
    version,
    about = "RBFE-ATM CLI - Relative binding free energies with the Alchemical Transfer Method: structure preparation, replica-exchange production and UWHAM analysis.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads used to run replicas concurrently.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Map the two ligands, select restraints and write the alchemical system.
    Structprep(StructprepArgs),
    /// Run replica-exchange sampling of a prepared system and estimate ΔΔG.
    Production(ProductionArgs),
    /// Estimate ΔΔG from an existing sample store or legacy replica logs.
    Analyze(AnalyzeArgs),
}

/// Arguments for the `structprep` subcommand.
#[derive(Args, Debug)]
pub struct StructprepArgs {
    // --- Core Arguments ---
    /// Path to the input complex (receptor with both ligands) in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Path for the alchemical system file to write.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub output: PathBuf,

    /// Path to the configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    // --- Overrides ---
    /// Displacement of ligand B into the solvent, as 'x,y,z' in Å.
    #[arg(short, long, value_name = "X,Y,Z", allow_hyphen_values = true)]
    pub displacement: Option<String>,

    /// Explicit atom mapping as 'a:b' index pairs, replacing the MCS search.
    /// Example: --map 0:0 --map 1:1
    #[arg(long = "map", value_name = "A:B")]
    pub mapping_pairs: Vec<String>,

    /// Keep ligand B where it is instead of superimposing it onto ligand A.
    #[arg(long)]
    pub no_align: bool,

    /// Temperature (K) of the default schedule.
    #[arg(short, long, value_name = "KELVIN")]
    pub temperature: Option<f64>,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S structprep.restraints.site-radius=10.0
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `production` subcommand.
#[derive(Args, Debug)]
pub struct ProductionArgs {
    // --- Core Arguments ---
    /// Path to the alchemical system written by `structprep`.
    #[arg(short = 'y', long, required = true, value_name = "PATH")]
    pub system: PathBuf,

    /// Path to the CSV sample store. Records are appended.
    #[arg(long, required = true, value_name = "PATH")]
    pub store: PathBuf,

    /// Path to the configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write the run report and final estimate to this TOML file.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    // --- Engine Overrides ---
    /// External MD engine executable, called once per replica per cycle.
    #[arg(short, long, value_name = "PROGRAM")]
    pub engine: Option<String>,

    /// Directory for engine request and output files.
    #[arg(long, value_name = "PATH")]
    pub work_dir: Option<PathBuf>,

    // --- Production Overrides ---
    /// Total number of cycles, including cycles of a resumed run.
    #[arg(short = 'n', long, value_name = "INT")]
    pub cycles: Option<u64>,

    /// Seed of the exchange and retry random number generators.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    /// Retries of a failed engine run before the replica sits out the cycle.
    #[arg(long, value_name = "INT")]
    pub max_retries: Option<u32>,

    /// Stop cleanly once this many minutes of wall-clock time have passed.
    #[arg(long, value_name = "MINUTES")]
    pub time_limit: Option<f64>,

    /// Checkpoint file, written periodically and at the end of the run.
    #[arg(long, value_name = "PATH")]
    pub checkpoint: Option<PathBuf>,

    /// Resume from the checkpoint file.
    #[arg(long)]
    pub resume: bool,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S production.perturbation-magnitude=0.02
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `analyze` subcommand.
#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub source: SampleSourceArgs,

    /// Alchemical system providing the schedule and restraint correction.
    /// Without it the default 22-state schedule is assumed.
    #[arg(short = 'y', long, value_name = "PATH")]
    pub system: Option<PathBuf>,

    /// Job name of the legacy replica logs (`r<i>/<job>.out`).
    #[arg(long, value_name = "NAME", requires = "replica_logs")]
    pub job_name: Option<String>,

    /// Path to the configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write the estimate to this TOML file.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// First cycle included in the analysis.
    #[arg(long, value_name = "INT")]
    pub min_cycle: Option<u64>,

    /// Last cycle included in the analysis.
    #[arg(long, value_name = "INT")]
    pub max_cycle: Option<u64>,

    /// Report uncorrected UWHAM errors, ignoring sample correlation.
    #[arg(long)]
    pub no_correlation_correction: bool,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S analysis.tolerance=1e-8
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Where the samples come from; exactly one is required.
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct SampleSourceArgs {
    /// CSV sample store written by `production`.
    #[arg(long, value_name = "PATH")]
    pub store: Option<PathBuf>,

    /// Run directory with one `r<i>` subdirectory per replica.
    #[arg(long, value_name = "PATH")]
    pub replica_logs: Option<PathBuf>,
}
