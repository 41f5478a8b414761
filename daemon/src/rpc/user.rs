use actix_web::web::{Data, Json, Path};
use serde_json::Value;

use boocoin_common::api::BlockPayload;
use boocoin_common::crypto::hash::Hash;
use boocoin_common::transaction::UnconfirmedTransaction;

use super::ApiError;
use crate::core::blockchain::{Blockchain, SubmitOutcome};
use crate::core::error::BlockchainError;
use crate::p2p;

/// `GET /api/block_count/` — active depth plus one.
pub async fn block_count(chain: Data<Blockchain>) -> Result<Json<u64>, ApiError> {
    let storage = chain.storage().read().await;
    let active_block = storage.get_active_block()?;
    Ok(Json(active_block.depth + 1))
}

/// `GET /api/block/<id>/` — one block with its transactions nested.
pub async fn block(
    chain: Data<Blockchain>,
    path: Path<String>,
) -> Result<Json<BlockPayload>, ApiError> {
    let id: Hash = path
        .parse()
        .map_err(|_| ApiError::bad_request("invalid block id"))?;
    let storage = chain.storage().read().await;
    let payload = storage
        .get_block_payload(&id)?
        .ok_or_else(|| ApiError::not_found("block not found"))?;
    Ok(Json(payload))
}

/// `GET /api/transaction/<hash>/` — a single transaction, or a list when
/// sibling forks each committed the same hash.
pub async fn transaction(
    chain: Data<Blockchain>,
    path: Path<String>,
) -> Result<Json<Value>, ApiError> {
    let hash: Hash = path
        .parse()
        .map_err(|_| ApiError::bad_request("invalid transaction hash"))?;
    let storage = chain.storage().read().await;
    let mut rows = storage.get_transactions_by_hash(&hash)?;
    let body = match rows.len() {
        0 => return Err(ApiError::not_found("transaction not found")),
        1 => serde_json::to_value(rows.remove(0)).map_err(BlockchainError::from)?,
        _ => serde_json::to_value(rows).map_err(BlockchainError::from)?,
    };
    Ok(Json(body))
}

/// `POST /api/submit_transaction/` — validates and pools a user
/// transaction. The submission that fills the pool triggers mining;
/// otherwise the transaction is gossiped to peers in the background.
pub async fn submit_transaction(
    chain: Data<Blockchain>,
    body: Json<UnconfirmedTransaction>,
) -> Result<Json<UnconfirmedTransaction>, ApiError> {
    let transaction = body.into_inner();
    let outcome = chain.submit_transaction(transaction.clone()).await?;
    if outcome == SubmitOutcome::Pooled {
        // Notify other nodes about the transaction
        let config = chain.config().clone();
        let gossip = transaction.clone();
        tokio::spawn(async move {
            p2p::broadcast_transaction(&config, &gossip).await;
        });
    }
    Ok(Json(transaction))
}
