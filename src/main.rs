//! PDF to Markdown MCP Server - Entry point
//!
//! `serve` runs the MCP server on stdio; `process` runs one batch conversion
//! directly and prints the result as JSON.

use clap::{ArgAction, Parser, Subcommand};
use pdf2md_mcp::batch::{process_directory, ProcessOptions};
use pdf2md_mcp::convert::PdfiumConverter;
use pdf2md_mcp::{run_server, Error};
use serde_json::json;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "pdf2md-mcp", version)]
#[command(about = "Convert PDF files in a directory to Markdown, as a CLI or an MCP server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert all PDFs under a directory and print the results as JSON
    Process {
        /// Directory containing PDF files to process
        directory: PathBuf,

        /// Search for PDFs in subdirectories
        #[arg(long, default_value_t = true, action = ArgAction::Set,
              num_args = 0..=1, default_missing_value = "true")]
        recursive: bool,

        /// Directory to save Markdown output
        #[arg(long, value_name = "DIR")]
        markdown_output: Option<PathBuf>,

        /// Directory to save extracted images
        #[arg(long, value_name = "DIR")]
        images_dir: Option<PathBuf>,
    },
    /// Start the MCP server on stdio
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout stays clean for JSON / JSON-RPC
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pdf2md_mcp=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Command::Process {
            directory,
            recursive,
            markdown_output,
            images_dir,
        } => {
            let options = ProcessOptions {
                recursive,
                markdown_output,
                images_dir,
            };

            match process_directory(&PdfiumConverter, &directory, &options) {
                Ok(result) => {
                    println!("{}", serde_json::to_string_pretty(&result.to_flat_json()?)?);
                }
                // Input errors are part of the output contract, not a crash
                Err(e @ (Error::DirectoryNotFound { .. } | Error::NotADirectory { .. })) => {
                    let body = json!({ "error": e.to_string() });
                    println!("{}", serde_json::to_string_pretty(&body)?);
                }
                Err(e) => return Err(e.into()),
            }

            Ok(())
        }
        Command::Serve => {
            tracing::info!("Starting PDF to Markdown MCP server");
            run_server().await
        }
    }
}
