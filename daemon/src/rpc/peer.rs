use actix_web::web::{Data, Json, Query};
use actix_web::HttpResponse;
use log::debug;
use serde::Deserialize;

use boocoin_common::api::{BlocksRequest, BlocksResponse, TransmitBlockRequest};
use boocoin_common::config::{normalize_node, HISTORY_PAGE_SIZE};
use boocoin_common::crypto::hash::Hash;
use boocoin_common::transaction::UnconfirmedTransaction;

use super::ApiError;
use crate::core::blockchain::{BlockIngest, Blockchain};
use crate::p2p;

/// `POST /p2p/transmit_transaction/` — gossip receipt. Validates and pools
/// the transaction; the receipt that fills the pool triggers mining.
/// Gossip is not re-broadcast.
pub async fn transmit_transaction(
    chain: Data<Blockchain>,
    body: Json<UnconfirmedTransaction>,
) -> Result<HttpResponse, ApiError> {
    chain.submit_transaction(body.into_inner()).await?;
    Ok(HttpResponse::Ok().finish())
}

/// `POST /p2p/transmit_block/` — a peer pushes a freshly mined block.
/// Only configured peers are accepted; an unknown parent triggers a full
/// sync with the sender instead of a rejection.
pub async fn transmit_block(
    chain: Data<Blockchain>,
    body: Json<TransmitBlockRequest>,
) -> Result<HttpResponse, ApiError> {
    let TransmitBlockRequest {
        block: payload,
        node,
    } = body.into_inner();

    // authentication by source identity
    let node = normalize_node(&node);
    if !chain.config().peers.contains(&node) {
        return Err(ApiError::bad_request("unknown peer"));
    }

    debug!("processing block {} from node {}...", payload.block.id, node);
    match chain.receive_block(payload).await? {
        BlockIngest::UnknownParent(parent) => {
            debug!("we do not have block {}, syncing...", parent);
            let chain = chain.into_inner();
            tokio::spawn(async move {
                p2p::sync(&chain, &node).await;
            });
        }
        BlockIngest::Committed | BlockIngest::AlreadyKnown => {}
    }
    Ok(HttpResponse::Ok().finish())
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    before: Option<String>,
}

/// `GET /p2p/blockchain_history/?before=<id>` — up to 100 ancestor ids,
/// newest first, starting at the active block or at the block before the
/// cursor. A cursor at genesis yields an empty page.
pub async fn blockchain_history(
    chain: Data<Blockchain>,
    query: Query<HistoryQuery>,
) -> Result<Json<Vec<Hash>>, ApiError> {
    let storage = chain.storage().read().await;

    let start = match &query.before {
        Some(raw) => {
            let id: Hash = raw
                .parse()
                .map_err(|_| ApiError::bad_request("invalid block id"))?;
            let block = storage
                .get_block(&id)?
                .ok_or_else(|| ApiError::not_found("block not found"))?;
            match block.previous_block {
                Some(parent) => storage.get_block(&parent)?,
                None => None,
            }
        }
        None => Some(storage.get_active_block()?),
    };

    let mut ids = Vec::new();
    let mut cursor = start;
    while let Some(block) = cursor {
        ids.push(block.id.clone());
        if ids.len() == HISTORY_PAGE_SIZE {
            break;
        }
        cursor = match block.previous_block {
            Some(parent) => storage.get_block(&parent)?,
            None => None,
        };
    }
    Ok(Json(ids))
}

/// `POST /p2p/blocks/` — full bodies for the requested ids; ids we do not
/// know are left out of the response.
pub async fn blocks(
    chain: Data<Blockchain>,
    body: Json<BlocksRequest>,
) -> Result<Json<BlocksResponse>, ApiError> {
    let storage = chain.storage().read().await;
    let mut response = BlocksResponse::new();
    for id in &body.blocks {
        if let Some(payload) = storage.get_block_payload(id)? {
            response.insert(id.clone(), payload);
        }
    }
    Ok(Json(response))
}
