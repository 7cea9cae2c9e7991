//! Command-line interface for shelastic
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and validation
//! - Dispatch of transfer and document commands
//! - Local subcommands (version, completion, config)

use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::config::{Config, LogLevel};
use crate::connection::SearchTarget;
use crate::error::{Result, ShelasticError};
use crate::executor::documents::{DocumentExecutor, parse_body};
use crate::executor::transfer::{
    CopyOptions, Destination, ExportOptions, ImportOptions, OutputFormat, Payload, TransferSummary,
    parse_query,
};
use crate::executor::ExecutionContext;

pub mod completion;

/// Elasticsearch administration shell
#[derive(Parser, Debug)]
#[command(
    name = "shelastic",
    version,
    about = "Elasticsearch administration shell written in Rust",
    long_about = "Administration tool for Elasticsearch clusters with streaming bulk export,
import and index-to-index copy, plus document get/put/delete."
)]
pub struct CliArgs {
    /// Cluster address (host, host:port or URL)
    #[arg(long, value_name = "HOST", global = true)]
    pub host: Option<String>,

    /// Username for basic authentication
    #[arg(short = 'u', long = "user", value_name = "USERNAME", global = true)]
    pub username: Option<String>,

    /// Password for basic authentication
    #[arg(short = 'p', long, value_name = "PASSWORD", global = true)]
    pub password: Option<String>,

    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Quiet mode (errors only, no summary)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Verbose mode (detailed logging)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Very verbose mode (trace logging, request bodies included)
    #[arg(long = "vv", global = true)]
    pub very_verbose: bool,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECONDS", global = true)]
    pub timeout: Option<u64>,

    /// Disable the progress bar
    #[arg(long = "no-progress", global = true)]
    pub no_progress: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands for shelastic
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export the hits of a query into a file
    Export(ExportArgs),

    /// Import documents from a file through bulk requests
    Import(ImportArgs),

    /// Copy the hits of a query into another index
    Copy(CopyArgs),

    /// Get, store or delete a single document
    Doc {
        #[command(subcommand)]
        action: DocCommand,
    },

    /// Show version information
    Version,

    /// Generate shell completion script
    Completion {
        /// Shell type (bash, zsh, fish)
        #[arg(value_name = "SHELL")]
        shell: String,
    },

    /// Show configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Validate configuration file
        #[arg(long)]
        validate: bool,
    },
}

/// Search query given inline or from a file
#[derive(Args, Debug, Default)]
pub struct QueryArgs {
    /// Query DSL body (defaults to match_all)
    #[arg(long, value_name = "JSON", conflicts_with = "query_file")]
    pub query: Option<String>,

    /// File holding the query DSL body
    #[arg(long = "query-file", value_name = "FILE")]
    pub query_file: Option<PathBuf>,
}

impl QueryArgs {
    /// Resolve the query body
    pub async fn resolve(&self) -> Result<Value> {
        match (&self.query, &self.query_file) {
            (Some(text), _) => parse_query(Some(text)),
            (None, Some(path)) => {
                let text = tokio::fs::read_to_string(path).await?;
                parse_query(Some(&text))
            }
            (None, None) => parse_query(None),
        }
    }
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Source index (all indices when omitted)
    #[arg(long, value_name = "INDEX")]
    pub index: Option<String>,

    /// Source document type
    #[arg(long = "doc", value_name = "TYPE")]
    pub doc_type: Option<String>,

    /// File format (ndjson, array)
    #[arg(long, value_name = "FORMAT", default_value = "ndjson")]
    pub format: OutputFormat,

    /// Write only `_source` of each hit
    #[arg(long, conflicts_with = "bulk_meta")]
    pub source: bool,

    /// Write bulk action lines so the file can be fed to `_bulk`
    #[arg(long = "bulk-meta")]
    pub bulk_meta: bool,

    #[command(flatten)]
    pub query: QueryArgs,

    /// Output file
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

impl ExportArgs {
    fn payload(&self) -> Payload {
        if self.source {
            Payload::Source
        } else if self.bulk_meta {
            Payload::BulkMeta
        } else {
            Payload::Hit
        }
    }
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Destination index (overrides the one stored in the file)
    #[arg(long, value_name = "INDEX")]
    pub index: Option<String>,

    /// Destination document type
    #[arg(long = "doc", value_name = "TYPE")]
    pub doc_type: Option<String>,

    /// File format (ndjson, array)
    #[arg(long, value_name = "FORMAT", default_value = "ndjson")]
    pub format: OutputFormat,

    /// Document field holding the id of plain documents
    #[arg(long = "id-field", value_name = "FIELD")]
    pub id_field: Option<String>,

    /// Where failing bulk responses are written, one JSON response per line
    #[arg(long, value_name = "FILE")]
    pub errors: Option<PathBuf>,

    /// Input file
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct CopyArgs {
    /// Source index (all indices when omitted)
    #[arg(long, value_name = "INDEX")]
    pub index: Option<String>,

    /// Source document type
    #[arg(long = "doc", value_name = "TYPE")]
    pub doc_type: Option<String>,

    /// Destination index
    #[arg(long, value_name = "INDEX")]
    pub target: String,

    /// Destination document type
    #[arg(long = "target-doc", value_name = "TYPE")]
    pub target_doc: Option<String>,

    #[command(flatten)]
    pub query: QueryArgs,

    /// Where failing bulk responses are written, one JSON response per line
    #[arg(long, value_name = "FILE")]
    pub errors: Option<PathBuf>,
}

/// Document subcommands
#[derive(Subcommand, Debug)]
pub enum DocCommand {
    /// Retrieve a document by id
    Get {
        #[arg(long, value_name = "INDEX")]
        index: String,

        #[arg(long = "doc", value_name = "TYPE")]
        doc_type: Option<String>,

        #[arg(value_name = "ID")]
        id: String,
    },

    /// Insert or update a document (`-` lets the server assign the id)
    Put {
        #[arg(long, value_name = "INDEX")]
        index: String,

        #[arg(long = "doc", value_name = "TYPE")]
        doc_type: Option<String>,

        #[arg(value_name = "ID")]
        id: String,

        /// Document body
        #[arg(long, value_name = "JSON", conflicts_with = "body_file", required_unless_present = "body_file")]
        body: Option<String>,

        /// File holding the document body
        #[arg(long = "body-file", value_name = "FILE")]
        body_file: Option<PathBuf>,
    },

    /// Delete a document by id
    Delete {
        #[arg(long, value_name = "INDEX")]
        index: String,

        #[arg(long = "doc", value_name = "TYPE")]
        doc_type: Option<String>,

        #[arg(value_name = "ID")]
        id: String,
    },
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Loaded configuration
    config: Config,
}

impl CliInterface {
    /// Create a new CLI interface
    ///
    /// # Returns
    /// * `Result<Self>` - New CLI interface or error
    pub fn new() -> Result<Self> {
        let args = CliArgs::parse();
        let config = Self::load_config(&args)?;

        Ok(Self { args, config })
    }

    /// Load configuration from file and merge with arguments
    ///
    /// # Arguments
    /// * `args` - Command-line arguments
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    fn load_config(args: &CliArgs) -> Result<Config> {
        let config_path = args.config_file.as_deref();
        let mut config = Config::load_from_file(config_path)?;

        Self::apply_args_to_config(&mut config, args);
        config.validate()?;

        Ok(config)
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether the command talks to the cluster
    pub fn needs_connection(&self) -> bool {
        matches!(
            self.args.command,
            Commands::Export(_) | Commands::Import(_) | Commands::Copy(_) | Commands::Doc { .. }
        )
    }

    /// Apply CLI arguments to configuration
    ///
    /// Overrides configuration values with CLI arguments where provided
    fn apply_args_to_config(config: &mut Config, args: &CliArgs) {
        Self::apply_display_args(config, args);
        Self::apply_logging_args(config, args);
        Self::apply_connection_args(config, args);
    }

    fn apply_display_args(config: &mut Config, args: &CliArgs) {
        if args.no_progress || args.quiet {
            config.display.progress = false;
        }
    }

    fn apply_logging_args(config: &mut Config, args: &CliArgs) {
        config.logging.level = if args.very_verbose {
            LogLevel::Trace
        } else if args.verbose {
            LogLevel::Debug
        } else if args.quiet {
            LogLevel::Error
        } else {
            config.logging.level
        };
    }

    fn apply_connection_args(config: &mut Config, args: &CliArgs) {
        if let Some(host) = &args.host {
            config.connection.url = host.clone();
        }
        if let Some(timeout) = args.timeout {
            config.connection.timeout = timeout;
        }
        if let Some(username) = &args.username {
            config.connection.username = Some(username.clone());
        }
        if let Some(password) = &args.password {
            config.connection.password = Some(password.clone());
        }
    }

    /// Handle subcommands that do not need a cluster
    ///
    /// # Returns
    /// * `Result<bool>` - True if subcommand was handled, false to continue
    pub fn handle_subcommand(&self) -> Result<bool> {
        match &self.args.command {
            Commands::Version => {
                self.show_version();
                Ok(true)
            }
            Commands::Completion { shell } => {
                completion::generate_completion(shell)?;
                Ok(true)
            }
            Commands::Config { show, validate } => {
                self.handle_config_command(*show, *validate)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Run a cluster command in the given context
    pub async fn execute(&self, context: &ExecutionContext) -> Result<()> {
        match &self.args.command {
            Commands::Export(args) => {
                let options = ExportOptions {
                    source: SearchTarget::new(args.index.clone(), args.doc_type.clone()),
                    query: args.query.resolve().await?,
                    output: args.file.clone(),
                    format: args.format,
                    payload: args.payload(),
                };
                let summary = context.transfer_coordinator().export(options).await?;
                self.finish_transfer("Exported", summary)
            }
            Commands::Import(args) => {
                let options = ImportOptions {
                    input: args.file.clone(),
                    format: args.format,
                    id_field: args.id_field.clone(),
                    destination: Destination::new(args.index.clone(), args.doc_type.clone()),
                    errors: args.errors.clone(),
                };
                let summary = context.transfer_coordinator().import(options).await?;
                self.finish_transfer("Imported", summary)
            }
            Commands::Copy(args) => {
                let options = CopyOptions {
                    source: SearchTarget::new(args.index.clone(), args.doc_type.clone()),
                    query: args.query.resolve().await?,
                    destination: Destination::new(
                        Some(args.target.clone()),
                        args.target_doc.clone(),
                    ),
                    errors: args.errors.clone(),
                };
                let summary = context.transfer_coordinator().copy(options).await?;
                self.finish_transfer("Copied", summary)
            }
            Commands::Doc { action } => self.execute_document(context, action).await,
            Commands::Version | Commands::Completion { .. } | Commands::Config { .. } => Ok(()),
        }
    }

    async fn execute_document(&self, context: &ExecutionContext, action: &DocCommand) -> Result<()> {
        let documents = DocumentExecutor::new(context.clone());
        match action {
            DocCommand::Get { index, doc_type, id } => {
                let document = documents.get(index, doc_type.as_deref(), id).await?;
                println!("{}", serde_json::to_string_pretty(&document)?);
            }
            DocCommand::Put {
                index,
                doc_type,
                id,
                body,
                body_file,
            } => {
                let body = read_body(body.as_deref(), body_file.as_deref()).await?;
                let result = documents.put(index, doc_type.as_deref(), id, &body).await?;
                println!("{}", result);
            }
            DocCommand::Delete { index, doc_type, id } => {
                documents.delete(index, doc_type.as_deref(), id).await?;
                println!("deleted");
            }
        }
        Ok(())
    }

    /// Print the transfer summary; partial failures become an error
    fn finish_transfer(&self, verb: &str, summary: TransferSummary) -> Result<()> {
        if !self.args.quiet {
            println!("{}", format_summary(verb, &summary));
        }
        summary.into_result().map(|_| ())
    }

    /// Show version information
    fn show_version(&self) {
        println!("shelastic version {}", env!("CARGO_PKG_VERSION"));
        println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
    }

    /// Handle config subcommand
    fn handle_config_command(&self, show: bool, validate: bool) -> Result<()> {
        if validate {
            self.validate_config_file()?;
        }

        if show {
            self.show_config()?;
        }

        Ok(())
    }

    /// Validate configuration file
    fn validate_config_file(&self) -> Result<()> {
        let path = self.get_config_path();
        println!("Validating configuration file: {}", path.display());

        if !path.exists() {
            println!("❌ Configuration file does not exist");
            return Ok(());
        }

        match Config::load_from_file(Some(&path)) {
            Ok(config) => match config.validate() {
                Ok(_) => println!("✅ Configuration is valid"),
                Err(e) => println!("❌ Configuration validation failed: {}", e),
            },
            Err(e) => println!("❌ Failed to load configuration: {}", e),
        }

        Ok(())
    }

    /// Show effective configuration
    fn show_config(&self) -> Result<()> {
        let path = self.get_config_path();
        println!("Configuration file: {}", path.display());
        println!();
        println!("=== Effective Configuration ===");
        println!();

        let mut shown = self.config.clone();
        if shown.connection.password.is_some() {
            shown.connection.password = Some("***".to_string());
        }
        match shown.to_toml() {
            Ok(toml_str) => println!("{}", toml_str),
            Err(e) => {
                eprintln!("Error formatting configuration: {}", e);
                println!("{:#?}", shown);
            }
        }

        Ok(())
    }

    /// Get configuration file path (from args or default)
    fn get_config_path(&self) -> PathBuf {
        self.args
            .config_file
            .clone()
            .unwrap_or_else(Config::default_config_path)
    }
}

/// Read a document body from `--body` or `--body-file`.
async fn read_body(inline: Option<&str>, file: Option<&Path>) -> Result<Value> {
    match (inline, file) {
        (Some(text), _) => parse_body(text),
        (None, Some(path)) => parse_body(&tokio::fs::read_to_string(path).await?),
        (None, None) => Err(ShelasticError::Generic(
            "Document body required: use --body or --body-file".to_string(),
        )),
    }
}

/// One-paragraph report of a finished transfer
pub fn format_summary(verb: &str, summary: &TransferSummary) -> String {
    let mut lines = Vec::new();
    if summary.is_cancelled() {
        lines.push(format!(
            "Cancelled after {} of {} documents",
            summary.written, summary.total
        ));
    } else {
        lines.push(format!(
            "{} {} of {} documents in {} ms",
            verb, summary.written, summary.total, summary.elapsed_ms
        ));
    }
    if summary.requests > 0 {
        lines.push(format!("Bulk requests: {}", summary.requests));
    }
    if summary.file_size_bytes > 0 {
        lines.push(format!("File size: {} bytes", summary.file_size_bytes));
    }
    if summary.failed_batches > 0 {
        lines.push(format!(
            "Failed batches: {} ({} items)",
            summary.failed_batches, summary.failed_items
        ));
    }
    if let Some(path) = &summary.error_artifact {
        lines.push(format!("Error responses: {}", path.display()));
    }
    lines.join("\n")
}
