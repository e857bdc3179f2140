use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;

use capstan_engine::{Dispatcher, DispatcherConfig, Listener};
use capstan_ledger::LedgerClient;
use capstan_link::{CallTransport, Link};
use capstan_server::{AppState, StatusServer};
use capstan_store::{DurableStore, Keyspace, SqliteStore};
use capstan_types::{ContractId, StatusRegistry};

use crate::cli::{Cli, Command, InitConfigArgs, ServeArgs};
use crate::config::Config;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => cmd_serve(args).await,
        Command::InitConfig(args) => cmd_init_config(args),
    }
}

fn cmd_init_config(args: InitConfigArgs) -> anyhow::Result<()> {
    if args.path.exists() {
        bail!("{} already exists", args.path.display());
    }
    let raw = toml::to_string_pretty(&Config::sample())?;
    std::fs::write(&args.path, raw)
        .with_context(|| format!("writing {}", args.path.display()))?;
    println!(
        "{} Wrote {}",
        "✓".green().bold(),
        args.path.display().to_string().bold()
    );
    Ok(())
}

async fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = Config::load(&args.config)?;
    if config.contracts.is_empty() {
        bail!(
            "no contracts configured in {}; add a [[contracts]] entry",
            args.config.display()
        );
    }

    println!("{} Capstan sync service", "✓".green().bold());
    println!("  Store: {}", config.store_path.display().to_string().bold());
    println!("  Ledger: {}", config.link.address.bold());
    println!("  Status: {}", config.server.bind_addr.to_string().bold());

    let store: Arc<dyn DurableStore> =
        Arc::new(SqliteStore::open(&config.store_path).context("opening durable store")?);

    // The first connection attempt must succeed; later disconnects are
    // handled by background reconnection.
    let link = Link::connect(config.link_config())
        .await
        .context("connecting to the ledger node")?;
    let transport: Arc<dyn CallTransport> = Arc::new(link.clone());

    let mut registry = StatusRegistry::new();
    registry.register(link.stats());

    let mut listener = Listener::new(&link);
    for contract in &config.contracts {
        let cid = ContractId::parse(&contract.cid)
            .with_context(|| format!("invalid cid for contract {}", contract.title))?;
        let contract_bytes = contract
            .contract_file
            .as_deref()
            .map(std::fs::read)
            .transpose()
            .with_context(|| format!("reading contract binary for {}", contract.title))?;
        let ledger = Arc::new(LedgerClient::new(
            transport.clone(),
            cid.clone(),
            contract_bytes,
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            DispatcherConfig {
                title: contract.title.clone(),
                restart_pending: config.restart_pending,
            },
            ledger,
            store.clone(),
            Keyspace::new(cid),
            config.retry.clone(),
        ));
        registry.register(dispatcher.clone());
        listener.attach(dispatcher);
        println!("  Tracking: {} ({})", contract.title.bold(), contract.cid.dimmed());
    }

    let state = Arc::new(AppState {
        registry,
        store,
        transport,
        secret: config.server.secret.clone(),
    });
    let server = StatusServer::new(config.server.clone(), state);

    // Either side failing is fatal: the engine cannot run without
    // liveness visibility, and a dead status surface means a dead
    // deployment. Exit with a diagnostic and let the supervisor restart.
    tokio::select! {
        result = listener.run() => result.context("sync engine failed"),
        result = server.serve() => result.context("status server failed"),
    }
}
