//! CLI argument parsing.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "timeless",
    version,
    about = "Rewrite sentences in timeless grammar and classify the rules they use",
    after_help = "Examples:\n  timeless grammars\n  timeless translate --grammar no_future_tense \"I will go to the store.\"\n  timeless translate --json \"I ate an apple.\"\n  timeless interactive --grammar no_past_tense\n\nThe API key is read from OPENAI_API_KEY.",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every command.
#[derive(Parser, Debug)]
pub struct GlobalArgs {
    /// JSON config file (defaults to <config dir>/timeless/config.json if present)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory holding grammar_selector and grammars/
    #[arg(long, global = true, value_name = "DIR")]
    pub prompts_dir: Option<PathBuf>,

    /// Model name to request
    #[arg(long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// Emit debug logs on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the grammar rules in the catalog
    Grammars,
    Translate(TranslateArgs),
    Interactive(InteractiveArgs),
}

/// One-shot submission.
#[derive(Parser, Debug)]
#[command(about = "Rewrite one sentence and list the grammars that apply")]
pub struct TranslateArgs {
    /// Grammar rule to rewrite with (defaults to the first rule in the catalog)
    #[arg(long, short, value_name = "NAME")]
    pub grammar: Option<String>,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,

    /// Sentence to rewrite
    pub sentence: String,
}

/// Line-oriented session on stdin/stdout.
#[derive(Parser, Debug)]
#[command(about = "Rewrite sentences read from stdin, one per line")]
pub struct InteractiveArgs {
    /// Initial grammar rule (defaults to the first rule in the catalog)
    #[arg(long, short, value_name = "NAME")]
    pub grammar: Option<String>,
}
