use clap::{Parser, Subcommand};

mod call_api;
mod common;
mod order;
mod vs;

#[derive(Parser)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(name = "slcli")]
struct Cli {
    #[command(flatten)]
    client: common::ClientArgs,

    /// Log verbosity on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Call an arbitrary API method
    CallApi(call_api::CallApiArgs),
    /// Virtual servers
    Vs(vs::VsArgs),
    /// Turn an identifier into object ids
    Resolve(vs::ResolveArgs),
    /// Catalog lookups and orders
    Order(order::OrderArgs),
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let client = cli.client.build()?;
    tracing::debug!(
        endpoint = client.endpoint_url(),
        transport = %client.transport_kind(),
        "client ready"
    );

    match cli.command {
        Commands::CallApi(args) => args.run(&client).await,
        Commands::Vs(args) => args.run(&client).await,
        Commands::Resolve(args) => args.run(&client).await,
        Commands::Order(args) => args.run(&client).await,
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn call_api_arguments_parse() {
        let cli = Cli::try_parse_from([
            "slcli",
            "-vv",
            "--transport",
            "rest",
            "call-api",
            "Account",
            "getVirtualGuests",
            "--mask",
            "id,hostname",
            "--limit",
            "20",
            "--all",
            "arg1",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::CallApi(args) => {
                assert_eq!(args.service, "Account");
                assert_eq!(args.params, vec!["arg1"]);
                assert_eq!(args.limit, Some(20));
                assert!(args.all);
            }
            _ => panic!("expected call-api"),
        }
    }

    #[test]
    fn order_place_requires_a_file() {
        assert!(Cli::try_parse_from(["slcli", "order", "place"]).is_err());
        assert!(Cli::try_parse_from(["slcli", "order", "place", "order.json"]).is_ok());
        assert!(Cli::try_parse_from(["slcli", "resolve", "vs", "web1"]).is_ok());
    }
}
