//! decref cli interface

use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Change the work directory
    ///
    /// Can be specified multiple times. Note that all
    /// paths on the way to the final path must exist.
    ///
    /// This is equivalent to running { cd <directory>; decref ... }
    #[clap(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve one reference against a declaration
    ///
    /// Reads the declaration from stdin unless --input-file is provided
    #[command(alias = "res")]
    Resolve(ResolveCommand),

    /// Expand one escape-bearing string against a declaration
    Expand(ExpandCommand),

    /// Run the post-process drivers over a flagged-location list
    Process(ProcessCommand),

    /// Print debug information for development
    Dev(DevCommand),
}

#[derive(Parser, Debug)]
pub struct ResolveCommand {
    #[clap(flatten)]
    pub input: InputArgs,

    #[clap(flatten)]
    pub output: OutputArgs,

    /// Reference path to resolve
    pub path: String,

    /// JSON pointer of the location the reference was found at
    #[clap(short = 's', long = "from")]
    pub from: String,

    /// Also fetch the referenced value in this mode
    #[clap(short = 'm', long = "fetch")]
    pub fetch: Option<FetchModeArg>,
}

#[derive(ValueEnum, Clone, Debug)]
pub enum FetchModeArg {
    String,
    Decode,
    Object,
}

#[derive(Parser, Debug)]
pub struct ExpandCommand {
    #[clap(flatten)]
    pub input: InputArgs,

    /// Escape-bearing string to expand
    pub string: String,

    /// JSON pointer of the location the string was found at
    #[clap(short = 's', long = "from")]
    pub from: String,
}

#[derive(Parser, Debug)]
pub struct ProcessCommand {
    #[clap(flatten)]
    pub input: InputArgs,

    #[clap(flatten)]
    pub output: OutputArgs,

    /// File holding the flagged-location list
    ///
    /// A JSON array of {kind: "pointer"|"expand", data, instancePath,
    /// schemaData?} entries, as recorded by the schema validator.
    #[clap(short = 'l', long = "locations")]
    pub locations: PathBuf,

    /// Process as if the active target forbids expansion
    #[clap(long = "no-expansion")]
    pub no_expansion: bool,
}

#[derive(Parser, Debug)]
pub struct InputArgs {
    /// Load the declaration from a file instead of stdin
    #[clap(short = 'f', long = "input-file")]
    pub file: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}

#[derive(Parser, Debug)]
pub struct DevCommand {
    #[clap(flatten)]
    pub input: InputArgs,

    #[command(subcommand)]
    pub command: DevSubCommand,
}

#[derive(Subcommand, Debug)]
pub enum DevSubCommand {
    /// Debug-print the parsed declaration
    Declaration,
    /// List tenant names in document order
    Tenants,
}
