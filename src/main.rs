#![cfg(feature = "cli")]
use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use tracing::{info, warn, Level};

use rswidevine_keys::config::ClientConfig;
use rswidevine_keys::pssh::Pssh;
use rswidevine_keys::utils::parse_header_line;
use rswidevine_keys::{Client, RequestContext};

#[derive(Parser)]
#[command(name = "rswidevine-keys", version, about = "Widevine key acquisition CLI")]
struct Cli {
    #[arg(short = 'd', long = "debug", action = ArgAction::SetTrue)]
    debug: bool,

    /// YAML client config; defaults to RSWIDEVINE_KEYS_* environment variables.
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// CLI subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Acquire content keys for a PSSH from a license server.
    Keys {
        license_url: String,
        pssh: String,
        /// Extra license server header, `Name: Value`. Repeatable.
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
        #[arg(short = 'p', long = "proxy")]
        proxy: Option<String>,
        #[arg(short = 'b', long = "build-info")]
        build_info: Option<String>,
        /// Print the key set as JSON.
        #[arg(long = "json", action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Inspect a base64 PSSH without contacting any server.
    Pssh { pssh: String },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Keys {
            license_url,
            pssh,
            headers,
            proxy,
            build_info,
            json,
        } => {
            let config = match cli.config.as_deref() {
                Some(path) => ClientConfig::from_path(path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?,
                None => ClientConfig::from_env().context("Failed to load config from environment")?,
            };
            let client = Client::from_config(&config).context("Failed to create client")?;

            let mut request = RequestContext::new(license_url, pssh);
            for line in &headers {
                let (name, value) = parse_header_line(line)?;
                request = request.with_header(&name, &value)?;
            }
            if let Some(proxy) = proxy {
                request = request.with_proxy(proxy);
            }
            if let Some(build_info) = build_info {
                request = request.with_build_info(build_info);
            }

            run_keys(&client, &request, json)
        }
        Commands::Pssh { pssh } => run_pssh(&pssh),
    }
}

fn run_keys(client: &Client, request: &RequestContext, json: bool) -> anyhow::Result<()> {
    let keys = client.keys(request).context("Failed to acquire keys")?;
    info!("[+] Got {} key(s) for KID {}", keys.keys.len(), keys.kid);
    if let Ok(pssh) = request.pssh_box() {
        if !keys.matches(&pssh) {
            warn!("KID {} is not listed in the PSSH", keys.kid);
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&keys)?);
        return Ok(());
    }
    for key in &keys.keys {
        println!("{}", key.key);
    }
    Ok(())
}

fn run_pssh(pssh: &str) -> anyhow::Result<()> {
    let pssh = Pssh::from_base64(pssh).context("Failed to parse PSSH")?;
    println!("version: {}", pssh.version);
    println!("flags: {}", pssh.flags);
    println!("system_id: {}", pssh.system_id);

    match pssh.key_ids() {
        Ok(ids) if ids.is_empty() => println!("key_ids: <none>"),
        Ok(ids) => {
            for kid in ids {
                println!("kid: {}", kid.as_simple());
            }
        }
        Err(e) => println!("key_ids: <unavailable: {}>", e),
    }
    Ok(())
}
