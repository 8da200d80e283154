mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use semdex::core::paths::DATA_DIR_ENV;
use semdex::{LlmProvider, SearchMode};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "semdex")]
#[command(about = "Local semantic file search with automatic tagging", long_about = None)]
#[command(version)]
struct Cli {
    #[arg(long, global = true, env = DATA_DIR_ENV, help = "Data directory (default: ./data)")]
    data_dir: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Debug logging")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor a folder and index everything in it
    Index {
        folder: Option<PathBuf>,
        #[arg(long, help = "Show index status only")]
        status: bool,
        #[arg(long, help = "Wipe the index and re-index every folder")]
        rebuild: bool,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Stop monitoring a folder (purges its data) or exclude a sub-path
    Remove { path: PathBuf },
    /// Semantic search over indexed files
    Search {
        #[arg(default_value = "")]
        query: String,
        #[arg(long, short, default_value = "unified", help = "unified, text, image or tag")]
        mode: SearchMode,
        #[arg(long = "ext", help = "Allowed extension (repeatable)")]
        extensions: Vec<String>,
        #[arg(long = "tag", help = "Required tag (repeatable)")]
        tags: Vec<String>,
        #[arg(long, help = "Match any tag instead of all")]
        any: bool,
        #[arg(long, short, help = "Limit results")]
        limit: Option<usize>,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Monitored folders, queue and index statistics
    Status {
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Manage tags
    Tags {
        #[command(subcommand)]
        command: TagsCommand,
    },
    /// Show or change configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Watch monitored folders and index changes until interrupted
    Watch,
}

#[derive(Subcommand)]
enum TagsCommand {
    /// List all tags
    List {
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Create a tag
    Add {
        name: String,
        #[arg(long, default_value = semdex::search::metadata::DEFAULT_TAG_COLOR)]
        color: String,
    },
    /// Delete a tag and its file links
    Delete { name: String },
    /// Rename a tag
    Rename { old: String, new: String },
    /// Change a tag's color
    Color { name: String, color: String },
    /// Replace the tags of a file
    Set {
        path: PathBuf,
        #[arg(num_args = 0..)]
        tags: Vec<String>,
    },
    /// Show the tags of a file
    Show { path: PathBuf },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Configure automatic tagging
    Llm {
        #[arg(long, help = "disabled, ollama, openai or gemini")]
        provider: LlmProvider,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        base_url: Option<String>,
    },
    /// Print the configuration
    Show {
        #[arg(long, help = "Include API keys")]
        reveal: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "semdex=debug" } else { "semdex=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let data_dir = cli.data_dir;

    match cli.command {
        Commands::Index {
            folder,
            status,
            rebuild,
            json,
        } => commands::index::run(data_dir, folder, status, rebuild, json),
        Commands::Remove { path } => commands::remove::run(data_dir, &path),
        Commands::Search {
            query,
            mode,
            extensions,
            tags,
            any,
            limit,
            json,
        } => commands::search::run(
            data_dir,
            commands::search::SearchArgs {
                query,
                mode,
                extensions,
                tags,
                any,
                limit,
                json,
            },
        ),
        Commands::Status { json } => commands::status::run(data_dir, json),
        Commands::Tags { command } => match command {
            TagsCommand::List { json } => commands::tags::list(data_dir, json),
            TagsCommand::Add { name, color } => commands::tags::add(data_dir, &name, &color),
            TagsCommand::Delete { name } => commands::tags::delete(data_dir, &name),
            TagsCommand::Rename { old, new } => commands::tags::rename(data_dir, &old, &new),
            TagsCommand::Color { name, color } => commands::tags::color(data_dir, &name, &color),
            TagsCommand::Set { path, tags } => commands::tags::set(data_dir, &path, &tags),
            TagsCommand::Show { path } => commands::tags::show(data_dir, &path),
        },
        Commands::Config { command } => match command {
            ConfigCommand::Llm {
                provider,
                model,
                api_key,
                base_url,
            } => commands::config::set_llm(data_dir, provider, model, api_key, base_url),
            ConfigCommand::Show { reveal } => commands::config::show(data_dir, reveal),
        },
        Commands::Watch => commands::watch::run(data_dir),
    }
}
