//! pseudollm - Pseudonymize Personally Identifiable Information using LLMs
//!
//! Usage:
//!   pseudollm tag -i a.txt b.txt -o out [--example-file ex.txt] [--categories]
//!   pseudollm pseudonymize -i out/a_tagged.txt -o out [--pseudonym-table map.txt]
//!   pseudollm ner_pseudonymize -i out/a_tagged.txt -o out
//!   pseudollm validate --originals a.txt --processed out/a_pseudonym.txt

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use pseudollm::audit::FileAuditLog;
use pseudollm::diff::unified_diff;
use pseudollm::llm::{
    default_example, LlmConfig, OpenAiClient, PseudonymGenerator, StaticPseudonyms, TagStyle,
    DEFAULT_API_BASE, DEFAULT_MODEL,
};
use pseudollm::pipeline::{
    anonymize_file, configure_threads, ensure_output_dir, pseudonymize_file, run_batch, tag_file,
    validate_pair, BatchSummary,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "pseudollm")]
#[command(about = "Pseudonymize Personally Identifiable Information using OpenAI LLMs")]
struct Cli {
    /// Number of files processed in parallel (default: number of CPU cores)
    #[arg(short, long, global = true)]
    jobs: Option<usize>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct LlmArgs {
    /// API key for the chat completions endpoint
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, default_value = "")]
    api_key: String,

    /// Base URL of an OpenAI-compatible API
    #[arg(long, env = "OPENAI_API_BASE", default_value = DEFAULT_API_BASE)]
    api_base: String,

    /// Model used for tagging and pseudonym generation
    #[arg(long, env = "PSEUDOLLM_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Request timeout in seconds
    #[arg(long, default_value = "120")]
    timeout_secs: u64,
}

impl LlmArgs {
    fn client(&self) -> Result<OpenAiClient> {
        let mut config = LlmConfig::new(self.api_key.clone());
        config.api_base = self.api_base.clone();
        config.model = self.model.clone();
        config.timeout = Duration::from_secs(self.timeout_secs);
        OpenAiClient::new(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Tag Personally Identifiable Information in texts
    Tag {
        /// Input text files
        #[arg(short, long, num_args = 1.., required = true)]
        input_files: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Tagged example shown to the tagger (default: built-in example)
        #[arg(short = 'x', long)]
        example_file: Option<PathBuf>,

        /// Ask for typed tags (PER, LOC, ORG, MISC)
        #[arg(long)]
        categories: bool,

        #[command(flatten)]
        llm: LlmArgs,
    },

    /// Pseudonymize Personally Identifiable Information in texts
    Pseudonymize {
        /// Tagged input text files
        #[arg(short, long, num_args = 1.., required = true)]
        input_files: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Use a fixed "entity=pseudonym" table instead of the LLM
        #[arg(long)]
        pseudonym_table: Option<PathBuf>,

        #[command(flatten)]
        llm: LlmArgs,
    },

    /// Replace tagged entities with their category placeholder ([PER], [LOC], ...)
    #[command(name = "ner_pseudonymize")]
    NerPseudonymize {
        /// Tagged input text files
        #[arg(short, long, num_args = 1.., required = true)]
        input_files: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Check that processed files only differ from the originals in PII tokens
    Validate {
        /// Original (untagged) files
        #[arg(short = 'a', long, num_args = 1.., required = true)]
        originals: Vec<PathBuf>,

        /// Processed files, in the same order as the originals
        #[arg(short = 'b', long, num_args = 1.., required = true)]
        processed: Vec<PathBuf>,

        /// Also print a unified token diff with this many context tokens
        #[arg(long)]
        unified: Option<usize>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    configure_threads(cli.jobs);

    let command = match cli.command {
        Some(command) => command,
        None => {
            eprintln!("{}", Cli::command().render_usage());
            std::process::exit(1);
        }
    };

    match command {
        Commands::Tag {
            input_files,
            output_dir,
            example_file,
            categories,
            llm,
        } => run_tag(&input_files, &output_dir, example_file.as_ref(), categories, &llm),
        Commands::Pseudonymize {
            input_files,
            output_dir,
            pseudonym_table,
            llm,
        } => run_pseudonymize(&input_files, &output_dir, pseudonym_table.as_ref(), &llm),
        Commands::NerPseudonymize {
            input_files,
            output_dir,
        } => run_ner_pseudonymize(&input_files, &output_dir),
        Commands::Validate {
            originals,
            processed,
            unified,
        } => run_validate(&originals, &processed, unified),
    }
}

fn finish(summary: BatchSummary, label: &str) -> Result<()> {
    let total = summary.succeeded + summary.failed.len();
    if summary.is_success() {
        println!("\n{}: {} of {} files done", label, summary.succeeded, total);
        Ok(())
    } else {
        for (path, error) in &summary.failed {
            eprintln!("  {}: {}", path.display(), error);
        }
        anyhow::bail!("{}: {} of {} files failed", label, summary.failed.len(), total)
    }
}

fn run_tag(
    inputs: &[PathBuf],
    output_dir: &Path,
    example_file: Option<&PathBuf>,
    categories: bool,
    llm: &LlmArgs,
) -> Result<()> {
    ensure_output_dir(output_dir)?;
    let style = if categories {
        TagStyle::Categorized
    } else {
        TagStyle::Plain
    };
    let example = match example_file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read example file: {}", path.display()))?,
        None => default_example(style).to_string(),
    };
    let client = llm.client()?;

    let summary = run_batch(inputs, "Tagging", |input| {
        let output = tag_file(&client, input, output_dir, &example, style)?;
        Ok(format!("Annotated and saved to {}", output.display()))
    });
    finish(summary, "Tagging")
}

fn run_pseudonymize(
    inputs: &[PathBuf],
    output_dir: &Path,
    pseudonym_table: Option<&PathBuf>,
    llm: &LlmArgs,
) -> Result<()> {
    ensure_output_dir(output_dir)?;
    let audit = FileAuditLog::in_dir(output_dir)?;
    log::info!("Audit log: {}", audit.path().display());

    let generator: Box<dyn PseudonymGenerator> = match pseudonym_table {
        Some(path) => Box::new(StaticPseudonyms::from_file(path)?),
        None => Box::new(llm.client()?),
    };

    let summary = run_batch(inputs, "Pseudonymizing", |input| {
        let outcome = pseudonymize_file(generator.as_ref(), input, output_dir, &audit)?;
        let mut line = format!("Pseudonymized and saved to {}", outcome.output.display());
        if !outcome.is_consistent() {
            line.push_str(&format!(
                " (warning: {} entities, {} replaced)",
                outcome.entities, outcome.replacements
            ));
        }
        Ok(line)
    });
    finish(summary, "Pseudonymizing")
}

fn run_ner_pseudonymize(inputs: &[PathBuf], output_dir: &Path) -> Result<()> {
    ensure_output_dir(output_dir)?;
    let audit = FileAuditLog::in_dir(output_dir)?;

    let summary = run_batch(inputs, "Anonymizing", |input| {
        let output = anonymize_file(input, output_dir, &audit)?;
        Ok(format!("Anonymized and saved to {}", output.display()))
    });
    finish(summary, "Anonymizing")
}

fn run_validate(originals: &[PathBuf], processed: &[PathBuf], unified: Option<usize>) -> Result<()> {
    if originals.len() != processed.len() {
        anyhow::bail!(
            "{} original files but {} processed files",
            originals.len(),
            processed.len()
        );
    }

    let mut failures = 0usize;
    for (original, processed) in originals.iter().zip(processed.iter()) {
        println!("== {} vs {}", original.display(), processed.display());
        let report = match validate_pair(original, processed) {
            Ok(r) => r,
            Err(e) => {
                eprintln!("  Error: {:#}", e);
                failures += 1;
                continue;
            }
        };
        println!("{}", report.verdict());
        if !report.is_balanced() {
            report.write_mismatches(std::io::stdout().lock())?;
        }
        if let Some(context) = unified {
            let before = std::fs::read_to_string(original)?;
            let after = std::fs::read_to_string(processed)?;
            print!(
                "{}",
                unified_diff(
                    &before,
                    &after,
                    &original.display().to_string(),
                    &processed.display().to_string(),
                    context
                )
            );
        }
        println!();
    }

    if failures > 0 {
        anyhow::bail!("{} of {} pairs could not be compared", failures, originals.len());
    }
    Ok(())
}
