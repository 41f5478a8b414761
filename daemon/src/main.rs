use anyhow::Context;
use clap::Parser;
use log::info;

use boocoin_daemon::config::NodeOptions;
use boocoin_daemon::core::blockchain::{import_genesis, Blockchain};
use boocoin_daemon::core::storage::Storage;
use boocoin_daemon::{p2p, rpc, scheduler};

use std::sync::Arc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = NodeOptions::parse()
        .resolve()
        .context("invalid configuration")?;
    let config = Arc::new(config);

    let storage = Storage::open(&config.data_dir).context("opening block store")?;

    // Locks left behind by a previous run would suppress mining forever
    storage.clear_sync_locks()?;

    if !storage.has_blocks()? {
        import_genesis(&storage, &config.genesis_file).context("bootstrapping genesis block")?;
    }

    let chain = Blockchain::new(storage, config.clone());

    let scheduler = scheduler::start(chain.clone());

    // Catch up with the network in the background while serving
    {
        let chain = chain.clone();
        tokio::spawn(async move {
            p2p::sync_all(&chain).await;
        });
    }

    info!("boocoin node listening on {}", config.bind_address);
    rpc::run_server(chain, &config.bind_address)
        .context("starting HTTP server")?
        .await?;

    scheduler.abort();
    Ok(())
}
