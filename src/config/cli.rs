use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

use crate::application::chunking::ChunkerKind;

/// Command-line arguments for the quire binary.
#[derive(Debug, Parser)]
#[command(
    name = "quire",
    version,
    about = "Adaptive chunking and paced rendering for large Markdown documents"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "QUIRE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Render a Markdown file to HTML through the full pipeline.
    Render(RenderArgs),
    /// Print the chunk layout a chunker produces for a file.
    Chunk(ChunkArgs),
    /// Print complexity metrics, score and level for a file.
    Analyze(AnalyzeArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct LogOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    /// Markdown file to render.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,

    /// Where to write the HTML; defaults to `<FILE>.html`.
    #[arg(long, short, value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,

    /// Use the boundary-extension chunker for every chunked strategy.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub interactive: bool,

    #[command(flatten)]
    pub logging: LogOverrides,
}

impl RenderArgs {
    pub fn output_path(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| {
            let mut name = self.file.clone().into_os_string();
            name.push(".html");
            PathBuf::from(name)
        })
    }
}

#[derive(Debug, Args, Clone)]
pub struct ChunkArgs {
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,

    #[arg(long, value_enum, default_value_t = ChunkerKind::Structural)]
    pub chunker: ChunkerKind,

    /// Target chunk size in characters; defaults to the standard chunk size.
    #[arg(long, value_name = "CHARS")]
    pub size: Option<usize>,

    /// Emit JSON lines instead of a table.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub json: bool,

    #[command(flatten)]
    pub logging: LogOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct AnalyzeArgs {
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,

    /// Emit the report as JSON.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub json: bool,

    #[command(flatten)]
    pub logging: LogOverrides,
}

impl Command {
    pub fn logging(&self) -> &LogOverrides {
        match self {
            Command::Render(args) => &args.logging,
            Command::Chunk(args) => &args.logging,
            Command::Analyze(args) => &args.logging,
        }
    }
}
