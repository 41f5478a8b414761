use crate::coins::Coins;

// Protocol constants shared by every crate in the workspace.

// Peers listen on this port when their endpoint does not name one.
pub const DEFAULT_NODE_PORT: u16 = 9811;
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:9811";

pub const COIN_DECIMALS: u32 = 8;
pub const COIN_VALUE: u64 = 10u64.pow(COIN_DECIMALS);

// Every block opens with a reward transaction paying this to the miner's
// wallet. The reward carries a sentinel in its signature field instead of a
// real signature; it is covered by the block signature.
pub const BLOCK_REWARD: Coins = Coins::from_units(100 * COIN_VALUE);
pub const BLOCK_REWARD_SIGNATURE: &str = "boocoin-block-reward";

// A node mines once this many transactions wait in the pool, so a valid
// block carries at least one more (the reward)...
pub const MINE_TRANSACTION_THRESHOLD: usize = 10;
pub const BLOCK_TRANSACTION_MINIMUM: usize = MINE_TRANSACTION_THRESHOLD + 1;
// ...or once this much time has passed since the parent block.
pub const BLOCK_INTERVAL_SECS: i64 = 10 * 60;

// Scheduler wake-up period.
pub const MINE_CHECK_INTERVAL_SECS: u64 = 30;

// Upper bound on ancestor walks: replay lookups and history pages both stop
// after this many blocks.
pub const CHAIN_WALK_LIMIT: usize = 100;
pub const HISTORY_PAGE_SIZE: usize = 100;

// Outbound request timeouts, in seconds. History pages past the first walk
// deep into the peer's chain and get more room.
pub const BROADCAST_TIMEOUT_SECS: u64 = 5;
pub const HISTORY_HEAD_TIMEOUT_SECS: u64 = 10;
pub const HISTORY_WALK_TIMEOUT_SECS: u64 = 60;
pub const BLOCK_FETCH_TIMEOUT_SECS: u64 = 60;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Base URL for a node endpoint, applying the default port when the
/// endpoint does not name one. Every surface that addresses a peer — the
/// gossip client, the sender-identity check, the wallet — goes through
/// this so the rule cannot drift.
pub fn normalize_node(node: &str) -> String {
    if node.contains(':') {
        format!("http://{}", node)
    } else {
        format!("http://{}:{}", node, DEFAULT_NODE_PORT)
    }
}
