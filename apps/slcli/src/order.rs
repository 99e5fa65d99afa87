use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Subcommand};
use serde_json::{Map, Value, json};
use sl_client::Client;
use sl_managers::{OrderRequest, OrderingManager};

use crate::common::{print_json, read_json};

#[derive(Args)]
pub struct OrderArgs {
    #[command(subcommand)]
    command: OrderCommand,
}

#[derive(Subcommand)]
enum OrderCommand {
    /// Verify an order described by a JSON file
    Verify { file: PathBuf },
    /// Place an order described by a JSON file
    Place { file: PathBuf },
    /// Save an order as a quote
    Quote {
        file: PathBuf,
        #[arg(long)]
        name: String,
        #[arg(long)]
        send_email: bool,
    },
    /// Items of a package
    ItemList { package: String },
    /// Presets of a package
    PresetList { package: String },
    /// Item categories of a package
    CategoryList { package: String },
    /// Regions a package can be ordered in
    PackageLocations { package: String },
    /// Active quotes of the account
    QuoteList,
    /// Verify a saved quote; `extras` is a JSON object merged into it
    QuoteVerify {
        quote_id: i64,
        #[arg(long)]
        extras: Option<PathBuf>,
    },
    /// Order a saved quote
    QuotePlace {
        quote_id: i64,
        #[arg(long)]
        extras: Option<PathBuf>,
    },
}

fn read_request(file: &std::path::Path) -> anyhow::Result<OrderRequest> {
    serde_json::from_value(read_json(file)?)
        .with_context(|| format!("{} is not an order request", file.display()))
}

fn read_extras(file: Option<&std::path::Path>) -> anyhow::Result<Map<String, Value>> {
    match file.map(read_json).transpose()? {
        None => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(_) => anyhow::bail!("extras must be a JSON object"),
    }
}

impl OrderArgs {
    pub async fn run(&self, client: &Client) -> anyhow::Result<()> {
        let manager = OrderingManager::new(client.clone());
        let result = match &self.command {
            OrderCommand::Verify { file } => manager.verify_order(&read_request(file)?).await?,
            OrderCommand::Place { file } => manager.place_order(&read_request(file)?).await?,
            OrderCommand::Quote {
                file,
                name,
                send_email,
            } => {
                manager
                    .place_quote(&read_request(file)?, name, *send_email)
                    .await?
            }
            OrderCommand::ItemList { package } => {
                serde_json::to_value(manager.list_items(package, None).await?)?
            }
            OrderCommand::PresetList { package } => {
                serde_json::to_value(manager.list_presets(package).await?)?
            }
            OrderCommand::CategoryList { package } => json!(manager.list_categories(package).await?),
            OrderCommand::PackageLocations { package } => {
                json!(manager.package_locations(package).await?)
            }
            OrderCommand::QuoteList => json!(manager.get_quotes().await?),
            OrderCommand::QuoteVerify { quote_id, extras } => {
                manager
                    .verify_quote(*quote_id, &read_extras(extras.as_deref())?)
                    .await?
            }
            OrderCommand::QuotePlace { quote_id, extras } => {
                manager
                    .order_quote(*quote_id, &read_extras(extras.as_deref())?)
                    .await?
            }
        };
        print_json(&result)
    }
}
