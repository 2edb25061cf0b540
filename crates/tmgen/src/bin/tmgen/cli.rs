//! tmgen cli interface

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
    /// This is equivalent to running { cd <directory>; tmgen ... }
    #[clap(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    /// Project root directory
    ///
    /// Defaults to the work directory.
    #[clap(long = "root", global(true))]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate code into all stacks
    ///
    /// Writes one file per `generate_hcl` block into each stack and removes
    /// previously generated files that are no longer produced.
    Generate(GenerateCommand),

    /// List all stacks
    List,

    /// Print the globals of a stack
    Globals(GlobalsCommand),

    /// Evaluate hcl expression in the context of a stack
    #[command(alias = "eval")]
    Evaluate(EvaluateCommand),

    /// Partially evaluate hcl expression in the context of a stack
    ///
    /// Unknown references (such as `var.x`) are kept as written.
    PartialEval(PartialEvalCommand),

    /// Print debug information for development
    Dev(DevCommand),
}

#[derive(Parser, Debug)]
pub struct GenerateCommand {
    /// Project directory that `tm_vendor` paths point into
    #[clap(long = "vendor-dir", default_value = tmgen::genhcl::DEFAULT_VENDOR_DIR)]
    pub vendor_dir: String,

    /// Only report what would change
    #[clap(long = "dry-run")]
    pub dry_run: bool,
}

#[derive(Parser, Debug)]
pub struct GlobalsCommand {
    #[clap(flatten)]
    pub output: OutputArgs,

    /// Stack directory, relative to the project root (e.g. `/stacks/app`)
    pub stack: String,
}

#[derive(Parser, Debug)]
pub struct EvaluateCommand {
    #[clap(flatten)]
    pub output: OutputArgs,

    /// Stack directory, relative to the project root (e.g. `/stacks/app`)
    pub stack: String,

    /// HCL expression to evaluate
    pub expression: String,
}

#[derive(Parser, Debug)]
pub struct PartialEvalCommand {
    /// Stack directory, relative to the project root (e.g. `/stacks/app`)
    pub stack: String,

    /// HCL expression to evaluate
    pub expression: String,
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    Json,
    #[default]
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
    #[command(subcommand)]
    pub command: DevSubCommand,
}

#[derive(Subcommand, Debug)]
pub enum DevSubCommand {
    /// Documents of the work directory
    Documents,
    /// Configuration of the whole project
    Config,
}
