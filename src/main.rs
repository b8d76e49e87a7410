mod completion;
mod config;
mod error;
mod ethereum;
mod identity;
mod insight;
mod lens;
mod server;
mod snap;
mod store;
#[cfg(test)]
mod test_support;

use anyhow::{anyhow, Result};
use clap::{Arg, ArgMatches, Command};
use config::Config;
use insight::{InsightAggregator, InsightServices, TransactionEvent};
use serde_json::json;
use std::sync::Arc;
use store::FileStore;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries command output; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let matches = Command::new("tx-insight")
        .version("0.1.0")
        .about("Transaction insights: decoded calls, social context and plain-language summaries")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("Path to configuration file"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .help("Generate a sample configuration file and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config-path")
                .long("config-path")
                .help("Print the default configuration file path and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("serve")
                .about("Run the HTTP API")
                .arg(
                    Arg::new("bind")
                        .long("bind")
                        .value_name("ADDR")
                        .help("Address to listen on (overrides server.bind)"),
                ),
        )
        .subcommand(
            Command::new("insight")
                .about("Render transaction insights for a single call")
                .arg(Arg::new("from").long("from").value_name("ADDRESS").required(true))
                .arg(Arg::new("to").long("to").value_name("ADDRESS").required(true))
                .arg(
                    Arg::new("input")
                        .long("input")
                        .value_name("HEX")
                        .required(true)
                        .help("Transaction input data"),
                )
                .arg(
                    Arg::new("chain-id")
                        .long("chain-id")
                        .value_name("CHAIN")
                        .required(true)
                        .help("Chain id, e.g. 1, 0x89 or eip155:137"),
                ),
        )
        .subcommand(
            Command::new("set-identity")
                .about("Store a World ID token for transaction insights")
                .arg(Arg::new("token").value_name("TOKEN").required(true)),
        )
        .subcommand(Command::new("get-identity").about("Print the stored World ID record"))
        .get_matches();

    if matches.get_flag("generate-config") {
        println!("{}", Config::generate_sample());
        return Ok(());
    }

    if matches.get_flag("config-path") {
        match Config::default_config_path() {
            Ok(path) => {
                println!("{}", path.display());
                return Ok(());
            }
            Err(e) => {
                error!("Could not determine default config path: {}", e);
                return Err(e);
            }
        }
    }

    let config_path = matches.get_one::<String>("config").map(|s| s.as_str());
    let config = Config::load_or_default(config_path).await;

    match matches.subcommand() {
        Some(("insight", args)) => run_insight(config, args).await,
        Some(("set-identity", args)) => {
            let token = args
                .get_one::<String>("token")
                .ok_or_else(|| anyhow!("token is required"))?;
            let store = FileStore::new(config.store_path()?);
            let request = snap::SnapRpcRequest {
                method: "setData".to_string(),
                params: json!({ "worldId": token }),
            };
            snap::on_rpc_request(&store, request).await?;
            info!("Identity token stored in {}", config.store_path()?.display());
            Ok(())
        }
        Some(("get-identity", _)) => {
            let store = FileStore::new(config.store_path()?);
            let request = snap::SnapRpcRequest {
                method: "getData".to_string(),
                params: serde_json::Value::Null,
            };
            let record = snap::on_rpc_request(&store, request).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        Some(("serve", args)) => run_server(config, args).await,
        _ => run_server(config, &ArgMatches::default()).await,
    }
}

async fn run_server(mut config: Config, args: &ArgMatches) -> Result<()> {
    if let Some(bind) = args.try_get_one::<String>("bind").ok().flatten() {
        config.server.bind = bind.clone();
    }

    info!("Starting tx-insight API");
    info!("Request timeout: {:?}", config.request_timeout());

    if let Err(e) = server::serve(config).await {
        error!("Server error: {}", e);
        return Err(e);
    }

    Ok(())
}

async fn run_insight(config: Config, args: &ArgMatches) -> Result<()> {
    let arg = |name: &str| args.get_one::<String>(name).cloned();
    let transaction = TransactionEvent {
        from: arg("from"),
        to: arg("to"),
        data: arg("input"),
    };
    let chain_id = arg("chain-id");

    let store = FileStore::new(config.store_path()?);
    let services = InsightServices::new(&config)?;
    let aggregator = InsightAggregator::new(
        Arc::new(services),
        config.identity.verification_site.clone(),
    );

    let panel = snap::on_transaction(&aggregator, &store, chain_id.as_deref(), &transaction)
        .await
        .map_err(|e| anyhow!("{}", e))?;
    print!("{}", panel);
    Ok(())
}
