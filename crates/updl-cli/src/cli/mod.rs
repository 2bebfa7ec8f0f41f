//! CLI for the updl resumable downloader.

mod commands;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::Path;
use updl_core::config;
use updl_core::request::DownloadRequest;
use updl_core::resume_db::ResumeDb;

use commands::{run_checksum, run_fetch, run_forget, run_status};

#[derive(Debug, Parser)]
#[command(name = "updl")]
#[command(about = "updl: resumable, crash-safe HTTP downloads", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download a URL, resuming from any bytes kept by an earlier attempt.
    Fetch {
        url: String,
        /// Extra request header, e.g. -H 'Authorization: Bearer x'. Repeatable.
        #[arg(short = 'H', long = "header", value_name = "NAME: VALUE")]
        headers: Vec<String>,
        /// HTTP method.
        #[arg(long, default_value = "GET")]
        method: String,
        /// Retries after a network failure (overrides the config file).
        #[arg(long, value_name = "N")]
        retries: Option<u32>,
        /// Expected SHA-256 of the finished file; a mismatch discards the resume state.
        #[arg(long, value_name = "HEX")]
        sha256: Option<String>,
    },

    /// List stored resume records.
    Status,

    /// Drop the resume record and partial file for a URL.
    Forget {
        url: String,
        #[arg(long, default_value = "GET")]
        method: String,
    },

    /// Compute SHA-256 of a file.
    Checksum { path: String },
}

/// Split `Name: value` into its parts.
pub(crate) fn parse_header(raw: &str) -> Result<(String, String)> {
    let Some((name, value)) = raw.split_once(':') else {
        bail!("header {:?} is not in 'Name: value' form", raw);
    };
    let name = name.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        bail!("header {:?} has an invalid name", raw);
    }
    Ok((name.to_string(), value.trim().to_string()))
}

pub(crate) fn build_request(url: &str, method: &str, headers: &[String]) -> Result<DownloadRequest> {
    let mut request = DownloadRequest::parse(url)?.with_method(method);
    for raw in headers {
        let (name, value) = parse_header(raw)?;
        request = request.with_header(&name, &value);
    }
    Ok(request)
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Fetch {
                url,
                headers,
                method,
                retries,
                sha256,
            } => {
                let request = build_request(&url, &method, &headers)?;
                let db = ResumeDb::open_default().await?;
                run_fetch(&db, &cfg, request, retries, sha256).await?;
            }
            CliCommand::Status => {
                let db = ResumeDb::open_default().await?;
                run_status(&db).await?;
            }
            CliCommand::Forget { url, method } => {
                let request = build_request(&url, &method, &[])?;
                let db = ResumeDb::open_default().await?;
                run_forget(&db, &request).await?;
            }
            CliCommand::Checksum { path } => run_checksum(Path::new(&path)).await?,
        }

        Ok(())
    }
}
