use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ms-segment")]
#[command(about = "A CLI tool for segmenting paged manuscript text into labelled excerpts")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output directory for excerpts and reports
    #[arg(short, long, global = true, default_value = "./output")]
    pub output: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Segment pages into excerpts and validate the result
    Segment(SegmentArgs),

    /// Check a segmentation preset's rules without running them
    ValidateRules(ValidateRulesArgs),

    /// Report the most common line-start patterns in a corpus
    Analyze(AnalyzeArgs),

    /// Suggest a rule for a sample line of text
    Suggest(SuggestArgs),
}

#[derive(Clone, Copy, ValueEnum)]
pub enum PreferArg {
    Longer,
    Shorter,
}

#[derive(Args)]
pub struct SegmentArgs {
    /// Pages source: JSON file, URL, or directory of <id>.txt files
    #[arg(required = true, value_name = "PAGES")]
    pub pages: String,

    /// Segmentation preset (JSON file or URL)
    #[arg(short, long, value_name = "PRESET")]
    pub preset: String,

    /// Existing excerpts whose ids and translations should be kept
    #[arg(long, value_name = "EXCERPTS")]
    pub existing: Option<String>,

    /// Override the preset's maxPages
    #[arg(long)]
    pub max_pages: Option<usize>,

    /// Override the preset's tie-break preference
    #[arg(long, value_enum)]
    pub prefer: Option<PreferArg>,

    /// Exit with an error when validation reports errors
    #[arg(long)]
    pub strict: bool,

    /// Force overwrite existing output files
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct ValidateRulesArgs {
    /// Segmentation preset (JSON file or URL)
    #[arg(required = true, value_name = "PRESET")]
    pub preset: String,
}

#[derive(Args)]
pub struct AnalyzeArgs {
    /// Pages sources: JSON files, URLs, or directories of <id>.txt files
    #[arg(required = true, value_name = "PAGES")]
    pub sources: Vec<String>,

    /// Number of patterns to report
    #[arg(long, default_value = "20")]
    pub top: usize,

    /// Ignore patterns seen fewer times than this
    #[arg(long, default_value = "2")]
    pub min_count: usize,

    /// Output analysis to JSON file
    #[arg(long, value_name = "FILE")]
    pub json_output: Option<PathBuf>,

    /// Show example lines for each pattern
    #[arg(long)]
    pub detailed: bool,
}

#[derive(Args)]
pub struct SuggestArgs {
    /// Sample text, typically one highlighted line
    #[arg(required = true, value_name = "TEXT")]
    pub text: String,
}
