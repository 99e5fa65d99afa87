use anyhow::Context;
use clap::Args;
use futures_util::TryStreamExt;
use serde_json::Value;
use sl_client::{CallOptions, Client};
use sl_query::ObjectFilter;

use crate::common::print_json;

#[derive(Args)]
pub struct CallApiArgs {
    /// Service name, with or without the `SoftLayer_` prefix
    pub service: String,

    pub method: String,

    /// Positional method parameters, passed as strings
    pub params: Vec<String>,

    /// Init parameter (object id)
    #[arg(long)]
    pub id: Option<i64>,

    /// Object mask, e.g. `id,hostname` or `mask[id,hostname]`
    #[arg(long)]
    pub mask: Option<String>,

    /// Object filter as JSON
    #[arg(long)]
    pub filter: Option<String>,

    #[arg(long)]
    pub limit: Option<u32>,

    #[arg(long, default_value_t = 0)]
    pub offset: u32,

    /// Fetch every page
    #[arg(long)]
    pub all: bool,

    /// Print the request instead of sending it
    #[arg(long)]
    pub reproduce: bool,
}

impl CallApiArgs {
    fn options(&self) -> anyhow::Result<CallOptions> {
        let mut opts = CallOptions::new().offset(self.offset);
        opts.id = self.id;
        opts.mask.clone_from(&self.mask);
        opts.limit = self.limit;
        if let Some(filter) = &self.filter {
            opts.filter = Some(ObjectFilter::from_json(filter).context("invalid --filter")?);
        }
        Ok(opts)
    }

    pub async fn run(&self, client: &Client) -> anyhow::Result<()> {
        let opts = self.options()?;
        let params: Vec<Value> = self.params.iter().cloned().map(Value::String).collect();

        if self.reproduce {
            println!("{}", client.reproduce(&self.service, &self.method, params, &opts)?);
            return Ok(());
        }

        let result = if self.all {
            let items: Vec<Value> = client
                .iter_call(&self.service, &self.method, params, opts)?
                .try_collect()
                .await?;
            Value::Array(items)
        } else {
            client.call(&self.service, &self.method, params, opts).await?
        };
        print_json(&result)
    }
}
