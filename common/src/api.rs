// Wire payloads for the HTTP API. Everything is JSON, UTF-8; binary
// `extra_data` fields are base64 on the wire and decimals travel as strings.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::block::Block;
use crate::crypto::hash::Hash;
use crate::transaction::Transaction;

/// A full block with its transactions nested, as served to users and peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockPayload {
    #[serde(flatten)]
    pub block: Block,
    pub transactions: Vec<Transaction>,
}

/// Body of `POST /p2p/transmit_block/`: the block plus the sender's own
/// endpoint, which doubles as its identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransmitBlockRequest {
    pub block: BlockPayload,
    pub node: String,
}

/// Body of `POST /p2p/blocks/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlocksRequest {
    pub blocks: Vec<Hash>,
}

/// Response of `POST /p2p/blocks/`: requested ids mapped to full blocks.
/// Ids the peer does not know are simply absent.
pub type BlocksResponse = HashMap<Hash, BlockPayload>;
