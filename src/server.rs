//! MCP Server implementation using rmcp

use crate::batch::{process_directory, ProcessOptions};
use crate::convert::PdfiumConverter;
use anyhow::Result;
use rmcp::{
    handler::server::tool::ToolRouter, handler::server::wrapper::Parameters, model::*,
    schemars::JsonSchema, tool, tool_handler, tool_router, ServerHandler, ServiceExt,
};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;

/// Parameters for the `convert_pdf` tool
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ConvertPdfParams {
    /// Directory to search for PDF files
    pub directory: String,
    /// Search subdirectories recursively (default: true)
    #[serde(default = "default_recursive")]
    pub recursive: bool,
    /// Directory to write one Markdown file per converted PDF
    #[serde(default)]
    pub markdown_output_path: Option<String>,
    /// Directory to extract embedded table/picture images into as PNG files
    #[serde(default)]
    pub images_dir: Option<String>,
}

fn default_recursive() -> bool {
    true
}

/// MCP server exposing batch PDF to Markdown conversion
#[derive(Clone)]
pub struct ConvertServer {
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl ConvertServer {
    pub fn new() -> Self {
        Self {
            tool_router: Self::tool_router(),
        }
    }

    /// Convert all PDFs under a directory to Markdown
    #[tool(
        description = "Find PDF files in a directory and convert them to Markdown. Optionally writes one Markdown file per PDF and extracts embedded images and tables as PNG files. Returns a processing summary plus per-file results keyed by file path."
    )]
    async fn convert_pdf(&self, Parameters(params): Parameters<ConvertPdfParams>) -> String {
        let directory = PathBuf::from(params.directory);
        let options = ProcessOptions {
            recursive: params.recursive,
            markdown_output: params.markdown_output_path.map(PathBuf::from),
            images_dir: params.images_dir.map(PathBuf::from),
        };

        // The batch is CPU and filesystem bound and intentionally serial;
        // run it off the protocol event loop as one blocking unit.
        let outcome = tokio::task::spawn_blocking(move || {
            process_directory(&PdfiumConverter, &directory, &options)
        })
        .await;

        let response = match outcome {
            Ok(Ok(result)) => json!({
                "summary": result.summary,
                "files": result.files,
            }),
            Ok(Err(e)) => {
                tracing::error!(error = %e, "PDF processing failed");
                failure_payload(e.to_string())
            }
            Err(e) => {
                tracing::error!(error = %e, "PDF processing worker failed");
                failure_payload(format!("Unexpected error during PDF processing: {}", e))
            }
        };

        serde_json::to_string_pretty(&response)
            .unwrap_or_else(|e| format!("{{\"error\": \"Failed to serialize response: {}\"}}", e))
    }
}

impl Default for ConvertServer {
    fn default() -> Self {
        Self::new()
    }
}

/// Structured failure response. The tool reports every error in-band and
/// never raises to the protocol layer.
fn failure_payload(message: String) -> serde_json::Value {
    json!({
        "summary": {
            "total_files": 0,
            "successful": 0,
            "failed": 1,
            "error": message,
        },
        "files": {},
    })
}

#[tool_handler]
impl ServerHandler for ConvertServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "PDF to Markdown conversion server. The convert_pdf tool searches a directory \
                 for PDF files, converts each one to Markdown, and can additionally write the \
                 Markdown files and extract embedded images and tables as PNG files."
                    .into(),
            ),
        }
    }
}

/// Run the MCP server on stdio
pub async fn run_server() -> Result<()> {
    let server = ConvertServer::new();

    tracing::info!("PDF to Markdown MCP server ready, waiting for connections...");

    let service = server.serve(rmcp::transport::io::stdio()).await?;
    service.waiting().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_defaults() {
        let params: ConvertPdfParams =
            serde_json::from_str(r#"{"directory": "/tmp/pdfs"}"#).unwrap();
        assert_eq!(params.directory, "/tmp/pdfs");
        assert!(params.recursive);
        assert!(params.markdown_output_path.is_none());
        assert!(params.images_dir.is_none());
    }

    #[test]
    fn test_params_explicit_values() {
        let params: ConvertPdfParams = serde_json::from_str(
            r#"{
                "directory": "/data",
                "recursive": false,
                "markdown_output_path": "/out/md",
                "images_dir": "/out/images"
            }"#,
        )
        .unwrap();
        assert!(!params.recursive);
        assert_eq!(params.markdown_output_path.as_deref(), Some("/out/md"));
        assert_eq!(params.images_dir.as_deref(), Some("/out/images"));
    }

    #[test]
    fn test_failure_payload_shape() {
        let payload = failure_payload("Directory not found: /missing".to_string());
        assert_eq!(payload["summary"]["total_files"], 0);
        assert_eq!(payload["summary"]["successful"], 0);
        assert_eq!(payload["summary"]["failed"], 1);
        assert_eq!(payload["summary"]["error"], "Directory not found: /missing");
        assert!(payload["files"].as_object().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_convert_pdf_reports_input_errors_in_band() {
        let server = ConvertServer::new();
        let response = server
            .convert_pdf(Parameters(ConvertPdfParams {
                directory: "/nonexistent/pdf/tree".to_string(),
                recursive: true,
                markdown_output_path: None,
                images_dir: None,
            }))
            .await;

        let value: serde_json::Value = serde_json::from_str(&response).unwrap();
        assert_eq!(value["summary"]["failed"], 1);
        assert_eq!(
            value["summary"]["error"],
            "Directory not found: /nonexistent/pdf/tree"
        );
        assert!(value["files"].as_object().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_convert_pdf_empty_directory_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let server = ConvertServer::new();
        let response = server
            .convert_pdf(Parameters(ConvertPdfParams {
                directory: dir.path().display().to_string(),
                recursive: true,
                markdown_output_path: None,
                images_dir: None,
            }))
            .await;

        let value: serde_json::Value = serde_json::from_str(&response).unwrap();
        assert_eq!(value["summary"]["total_files"], 0);
        assert_eq!(
            value["summary"]["message"],
            "No PDF files found in the specified directory"
        );
        assert!(value["summary"].get("error").is_none());
    }
}
