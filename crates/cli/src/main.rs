#![forbid(unsafe_code)]

mod report;

use anyhow::Context as _;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use dp_core::{BatchFormat, UnresolvedKeyPolicy};
use dp_storage::{ImportOptions, ImportOutcome, ProjectStore, ValidateOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "DOTPROJECT_LOG";

/// Maintains the `.project` metadata tree: bulk imports, validation and indexes.
#[derive(Parser)]
#[command(name = "dotproject", version)]
struct Cli {
    /// Directory to start the project root search from.
    #[arg(long, global = true, env = "DOTPROJECT_ROOT")]
    root: Option<PathBuf>,

    /// Raise the default log level (-v info, -vv debug). DOTPROJECT_LOG wins when set.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import or inspect a batch of epics, stories, tasks and prompts.
    Bulk {
        #[command(subcommand)]
        command: BulkCommand,
    },
    /// Validate record files against `schemas/<kind>.json`.
    Validate(SchemaArgs),
    /// Rewrite every JSON file under `.project` in canonical form.
    Canonicalize,
    Story {
        #[command(subcommand)]
        command: IndexCommand,
    },
    Docs {
        #[command(subcommand)]
        command: IndexCommand,
    },
}

#[derive(Subcommand)]
enum BulkCommand {
    /// Write the batch into the project.
    Import(ImportArgs),
    /// Show the ids, files and references a batch would produce. Writes nothing.
    Explain(InputArgs),
}

#[derive(Subcommand)]
enum IndexCommand {
    /// Rebuild the index file.
    Index,
}

#[derive(Args)]
struct InputArgs {
    file: PathBuf,

    #[arg(long, value_enum, default_value_t = FormatArg::Yaml)]
    format: FormatArg,
}

#[derive(Args)]
struct ImportArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Overwrite existing record files.
    #[arg(long)]
    upsert: bool,

    /// Resolve and check for conflicts without writing.
    #[arg(long)]
    dry_run: bool,

    /// What to do with references that match no id or key in the batch.
    #[arg(
        long,
        value_enum,
        env = "DOTPROJECT_UNRESOLVED_KEYS",
        default_value_t = KeyPolicyArg::Keep
    )]
    unresolved_keys: KeyPolicyArg,

    #[command(flatten)]
    schema: SchemaArgs,
}

#[derive(Args)]
struct SchemaArgs {
    /// Ignore unknown `format` keywords in schemas.
    #[arg(long)]
    lenient: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Yaml,
    Ndjson,
}

#[derive(Clone, Copy, ValueEnum)]
enum KeyPolicyArg {
    Keep,
    Error,
}

impl From<FormatArg> for BatchFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Yaml => Self::Yaml,
            FormatArg::Ndjson => Self::Ndjson,
        }
    }
}

impl From<KeyPolicyArg> for UnresolvedKeyPolicy {
    fn from(value: KeyPolicyArg) -> Self {
        match value {
            KeyPolicyArg::Keep => Self::Keep,
            KeyPolicyArg::Error => Self::Error,
        }
    }
}

impl SchemaArgs {
    fn options(&self) -> ValidateOptions {
        ValidateOptions {
            strict: !self.lenient,
        }
    }
}

fn setup_tracing(verbose: u8) {
    let fallback = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn open_store(root: Option<PathBuf>) -> anyhow::Result<ProjectStore> {
    let start = match root {
        Some(root) => root,
        None => std::env::current_dir().context("failed to read the current directory")?,
    };
    Ok(ProjectStore::discover(start)?)
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let store = open_store(cli.root)?;
    tracing::debug!(root = %store.root().display(), "project root");

    match cli.command {
        Command::Bulk {
            command: BulkCommand::Explain(input),
        } => {
            let plan = store.explain_import(&input.file, input.format.into())?;
            print!("{}", report::render_plan(&store, &plan));
            Ok(ExitCode::SUCCESS)
        }
        Command::Bulk {
            command: BulkCommand::Import(args),
        } => {
            let options = ImportOptions {
                format: args.input.format.into(),
                upsert: args.upsert,
                dry_run: args.dry_run,
                unresolved_keys: args.unresolved_keys.into(),
                validate: args.schema.options(),
            };
            match store.bulk_import(&args.input.file, options)? {
                ImportOutcome::DryRun(plan) => {
                    print!("{}", report::render_plan(&store, &plan));
                    if plan.conflicts.is_empty() {
                        Ok(ExitCode::SUCCESS)
                    } else {
                        Ok(ExitCode::FAILURE)
                    }
                }
                ImportOutcome::Committed(commit) => {
                    print!("{}", report::render_commit(&store, &commit));
                    let commit = *commit;
                    commit.validation.into_result()?;
                    Ok(ExitCode::SUCCESS)
                }
            }
        }
        Command::Validate(args) => {
            let validation = store.validate_project(args.options())?;
            print!("{}", report::render_validation(&validation));
            validation.into_result()?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Canonicalize => {
            let canonical = store.canonicalize()?;
            print!("{}", report::render_canonicalize(&canonical));
            Ok(ExitCode::SUCCESS)
        }
        Command::Story {
            command: IndexCommand::Index,
        } => {
            let summary = store.reindex_stories()?;
            println!(
                "wrote {}: {} stories, {} epics",
                store.relative(&summary.path),
                summary.stories,
                summary.epics
            );
            Ok(ExitCode::SUCCESS)
        }
        Command::Docs {
            command: IndexCommand::Index,
        } => {
            let summary = store.reindex_docs()?;
            println!(
                "wrote {}: {} docs, {} ideas",
                store.relative(&summary.path),
                summary.docs,
                summary.ideas
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
