use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use serde_json::Value;
use sl_client::{Client, ClientBuilder, ClientConfig, RetryConfig, TransportKind};

#[derive(Args)]
pub struct ClientArgs {
    /// Config file (INI or YAML); defaults to ~/.softlayer
    #[arg(short = 'C', long, global = true)]
    config: Option<PathBuf>,

    /// API endpoint URL
    #[arg(long, global = true)]
    endpoint_url: Option<String>,

    /// Wire encoding: xmlrpc or rest
    #[arg(long, global = true, value_parser = parse_transport)]
    transport: Option<TransportKind>,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Retries after the first attempt for idempotent calls
    #[arg(long, global = true)]
    retries: Option<usize>,
}

impl ClientArgs {
    pub fn build(&self) -> anyhow::Result<Client> {
        let mut config = ClientConfig::load(self.config.as_deref())
            .context("failed to load client configuration")?;
        if let Some(url) = &self.endpoint_url {
            config.endpoint_url = Some(url.clone());
        }
        if let Some(kind) = self.transport {
            config.transport = Some(kind);
        }
        if let Some(timeout) = self.timeout {
            config.timeout = Some(timeout);
        }

        let mut builder = ClientBuilder::from_config(&config);
        if let Some(retries) = self.retries {
            builder = builder.retry(RetryConfig {
                max_retries: retries,
                ..RetryConfig::default()
            });
        }
        Ok(builder.build())
    }
}

fn parse_transport(value: &str) -> Result<TransportKind, String> {
    serde_json::from_value(Value::String(value.to_owned()))
        .map_err(|_| format!("unknown transport '{value}', expected xmlrpc or rest"))
}

pub fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn read_json(path: &std::path::Path) -> anyhow::Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}
