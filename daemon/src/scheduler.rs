use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::task::JoinHandle;
use tokio::time::interval;

use boocoin_common::config::MINE_CHECK_INTERVAL_SECS;

use crate::core::blockchain::Blockchain;

/// Background tick: wakes every 30 seconds and mines when the node is due.
/// Runs for the life of the process; the caller aborts the handle at
/// shutdown.
pub fn start(chain: Arc<Blockchain>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(MINE_CHECK_INTERVAL_SECS));
        // the first tick fires immediately; skip it so a freshly started
        // node syncs before it tries to mine
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let due = match chain.is_due().await {
                Ok(due) => due,
                Err(error) => {
                    warn!("scheduler could not read the chain: {}", error);
                    continue;
                }
            };
            if due {
                info!("it's time, mining new block...");
                if let Err(error) = chain.mine_block().await {
                    warn!("scheduled mining failed: {}", error);
                }
            }
        }
    })
}
