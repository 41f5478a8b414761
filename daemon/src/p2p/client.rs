use std::time::Duration;

use async_trait::async_trait;

use boocoin_common::api::{BlocksRequest, BlocksResponse};
use boocoin_common::config::{
    BLOCK_FETCH_TIMEOUT_SECS, HISTORY_HEAD_TIMEOUT_SECS, HISTORY_WALK_TIMEOUT_SECS,
};
use boocoin_common::crypto::hash::Hash;

use crate::core::error::BlockchainError;

/// The peer surface the sync protocol pulls from. HTTP in production;
/// integration tests back it with a second in-process store.
#[async_trait]
pub trait PeerApi {
    fn endpoint(&self) -> &str;

    /// Up to 100 block ids walking backwards, starting at the peer's
    /// active block or at the block before `before`.
    async fn blockchain_history(
        &self,
        before: Option<&Hash>,
    ) -> Result<Vec<Hash>, BlockchainError>;

    /// Full bodies for the requested ids; unknown ids are absent.
    async fn blocks(&self, ids: &[Hash]) -> Result<BlocksResponse, BlockchainError>;
}

/// A peer reached over its HTTP API.
pub struct HttpPeer {
    base_url: String,
    client: reqwest::Client,
}

impl HttpPeer {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl PeerApi for HttpPeer {
    fn endpoint(&self) -> &str {
        &self.base_url
    }

    async fn blockchain_history(
        &self,
        before: Option<&Hash>,
    ) -> Result<Vec<Hash>, BlockchainError> {
        let mut request = self
            .client
            .get(format!("{}/p2p/blockchain_history/", self.base_url));
        // pages past the head walk deep history and get a longer timeout
        request = match before {
            Some(id) => request
                .query(&[("before", id.to_hex())])
                .timeout(Duration::from_secs(HISTORY_WALK_TIMEOUT_SECS)),
            None => request.timeout(Duration::from_secs(HISTORY_HEAD_TIMEOUT_SECS)),
        };
        Ok(request
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }

    async fn blocks(&self, ids: &[Hash]) -> Result<BlocksResponse, BlockchainError> {
        let request = BlocksRequest {
            blocks: ids.to_vec(),
        };
        Ok(self
            .client
            .post(format!("{}/p2p/blocks/", self.base_url))
            .timeout(Duration::from_secs(BLOCK_FETCH_TIMEOUT_SECS))
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }
}
