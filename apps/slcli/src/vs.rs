use clap::{Args, Subcommand};
use serde_json::{Value, json};
use sl_client::Client;
use sl_managers::{ListInstances, VsManager};

use crate::common::print_json;

#[derive(Args)]
pub struct VsArgs {
    #[command(subcommand)]
    command: VsCommand,
}

#[derive(Subcommand)]
enum VsCommand {
    /// List virtual servers
    List(ListArgs),
    /// Show one virtual server
    Detail {
        /// Id, hostname or IP address
        identifier: String,
        #[arg(long)]
        mask: Option<String>,
    },
}

#[derive(Args)]
pub struct ResolveArgs {
    #[command(subcommand)]
    target: ResolveTarget,
}

#[derive(Subcommand)]
enum ResolveTarget {
    /// Print the virtual server ids an id, hostname or IP address refers to
    Vs { identifier: String },
}

impl ResolveArgs {
    pub async fn run(&self, client: &Client) -> anyhow::Result<()> {
        match &self.target {
            ResolveTarget::Vs { identifier } => {
                let ids = VsManager::new(client.clone())
                    .resolve_ids(identifier)
                    .await?;
                print_json(&json!(ids))
            }
        }
    }
}

#[derive(Args)]
struct ListArgs {
    /// Only hourly servers
    #[arg(long, conflicts_with = "monthly")]
    hourly: bool,
    /// Only monthly servers
    #[arg(long)]
    monthly: bool,
    #[arg(long)]
    datacenter: Option<String>,
    #[arg(short = 'H', long)]
    hostname: Option<String>,
    #[arg(short = 'D', long)]
    domain: Option<String>,
    #[arg(long)]
    cpu: Option<u32>,
    /// Megabytes
    #[arg(long)]
    memory: Option<u32>,
    /// Mbps
    #[arg(long)]
    network: Option<u32>,
    #[arg(long)]
    local_disk: Option<bool>,
    #[arg(long = "tag")]
    tags: Vec<String>,
    #[arg(long)]
    public_ip: Option<String>,
    #[arg(long)]
    private_ip: Option<String>,
}

impl ListArgs {
    fn options(&self) -> ListInstances {
        let mut opts = ListInstances::new();
        if self.hourly {
            opts = opts.hourly_only();
        }
        if self.monthly {
            opts = opts.monthly_only();
        }
        opts.datacenter.clone_from(&self.datacenter);
        opts.hostname.clone_from(&self.hostname);
        opts.domain.clone_from(&self.domain);
        opts.cpus = self.cpu;
        opts.memory = self.memory;
        opts.nic_speed = self.network;
        opts.local_disk = self.local_disk;
        opts.tags.clone_from(&self.tags);
        opts.public_ip.clone_from(&self.public_ip);
        opts.private_ip.clone_from(&self.private_ip);
        opts
    }
}

impl VsArgs {
    pub async fn run(&self, client: &Client) -> anyhow::Result<()> {
        let manager = VsManager::new(client.clone());
        match &self.command {
            VsCommand::List(args) => {
                let guests = manager.list_instances(&args.options()).await?;
                print_json(&Value::Array(guests))
            }
            VsCommand::Detail { identifier, mask } => {
                let id = manager.resolve_id(identifier).await?;
                print_json(&manager.get_instance(id, mask.as_deref()).await?)
            }
        }
    }
}
