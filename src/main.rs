use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use tagstore::config::LoggingConfig;
use tagstore::{DbKind, SearchFlags, WriteFlags};

mod cli;

use cli::Workspace;

#[derive(Parser)]
#[command(name = "tagstore")]
#[command(author = "Intent Project Team")]
#[command(version)]
#[command(about = "Build and search source cross-reference tag databases", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project directory (holds .tagstore.toml)
    #[arg(short = 'C', long, global = true, default_value = ".")]
    project: PathBuf,

    /// Directory of the tag databases, overriding the configuration
    #[arg(long, global = true)]
    dbpath: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build GPATH, GTAGS, GRTAGS and GSYMS from the source tree
    Build {
        /// Read the files to index from this list instead of walking the tree
        #[arg(short = 'f', long)]
        file_list: Option<PathBuf>,

        /// No progress bar or summary
        #[arg(short, long)]
        quiet: bool,
    },

    /// Load `ctags -x` lines (tag, line, path, text) into one database
    Load {
        /// Target database: path-index, definitions, references or symbols
        #[arg(short, long)]
        kind: DbKind,

        /// Input file; standard input when absent
        input: Option<PathBuf>,

        /// Add to an existing database instead of replacing it
        #[arg(short, long)]
        append: bool,

        /// Drop repeated line numbers of a tag within a file
        #[arg(long)]
        unique: bool,

        /// Store `Class::method` tags under `method`
        #[arg(long)]
        extract_method: bool,
    },

    /// Search a database
    Query {
        /// Regular expression, or literal name with --literal. All records when absent
        pattern: Option<String>,

        /// Database to search
        #[arg(short, long, default_value = "definitions")]
        kind: DbKind,

        /// Match names starting with the literal pattern
        #[arg(long)]
        prefix: bool,

        /// Print distinct names only
        #[arg(long)]
        key_only: bool,

        /// Do not read source files for line text
        #[arg(long)]
        no_source: bool,

        /// Treat the pattern literally
        #[arg(short, long)]
        literal: bool,

        #[arg(short, long)]
        ignore_case: bool,

        /// POSIX basic regular expression syntax
        #[arg(long)]
        basic: bool,

        /// Output format: text, json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Remove the records of the given files from every database
    Delete {
        /// Paths as registered in GPATH
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Show database statistics
    Stats {
        /// Output format: text, json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

fn init_logging(debug: bool, verbose: bool, config: &LoggingConfig) -> Result<()> {
    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        config.level.as_str()
    };
    let filter = if std::env::var_os("RUST_LOG").is_some() && !debug && !verbose {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(level)
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let result = match config.format.as_str() {
        "json" => builder.json().try_init(),
        "pretty" => builder.pretty().try_init(),
        _ => builder.compact().try_init(),
    };
    result.map_err(|e| anyhow!("cannot initialize logging: {}", e))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let ws = Workspace::locate(&cli.project, cli.dbpath.as_deref());
    init_logging(cli.debug, cli.verbose, &ws.config.logging)?;

    debug!(
        "tagstore v{} root={} dbpath={}",
        env!("CARGO_PKG_VERSION"),
        ws.root.display(),
        ws.dbpath.display()
    );

    match cli.command {
        Commands::Build { file_list, quiet } => {
            cli::build::build_tags(ws, file_list, quiet)?;
        }

        Commands::Load {
            kind,
            input,
            append,
            unique,
            extract_method,
        } => {
            let configured = ws.config.write_flags();
            let flags = WriteFlags {
                unique: unique || configured.unique,
                extract_method: extract_method || configured.extract_method,
            };
            cli::load::load_tags(ws, kind, input, append, flags)?;
        }

        Commands::Query {
            pattern,
            kind,
            prefix,
            key_only,
            no_source,
            literal,
            ignore_case,
            basic,
            format,
        } => {
            let flags = SearchFlags {
                prefix,
                key_only,
                no_source,
                no_regex: literal,
                ignore_case,
                basic_regex: basic,
            };
            cli::query::query_tags(ws, kind, pattern, flags, format)?;
        }

        Commands::Delete { paths } => {
            cli::delete::delete_paths(ws, paths)?;
        }

        Commands::Stats { format } => {
            cli::stats::show_stats(ws, format)?;
        }
    }

    Ok(())
}
