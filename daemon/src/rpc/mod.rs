mod peer;
mod user;

use std::fmt::{Display, Formatter};
use std::sync::Arc;

use actix_web::dev::Server;
use actix_web::http::StatusCode;
use actix_web::{web, App, HttpResponse, HttpServer, ResponseError};
use log::error;
use serde_json::json;

use crate::core::blockchain::Blockchain;
use crate::core::error::BlockchainError;

/// HTTP-facing error: a status code plus a short reason. Validation
/// failures map to 400, missing entities to 404, and anything internal to
/// a detail-free 500.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<BlockchainError> for ApiError {
    fn from(error: BlockchainError) -> Self {
        match &error {
            BlockchainError::InvalidTransaction(_) | BlockchainError::InvalidBlock(_) => {
                Self::bad_request(error.to_string())
            }
            BlockchainError::BlockNotFound(_) | BlockchainError::TransactionNotFound(_) => {
                Self::not_found(error.to_string())
            }
            _ => {
                error!("internal error while serving a request: {}", error);
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: "internal error".to_string(),
                }
            }
        }
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        self.status
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status).json(json!({ "error": self.message }))
    }
}

/// Builds and starts the HTTP server carrying both the user API and the
/// peer endpoints. The returned server future runs until shutdown.
pub fn run_server(chain: Arc<Blockchain>, bind_address: &str) -> std::io::Result<Server> {
    let data = web::Data::from(chain);
    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .route("/api/block_count/", web::get().to(user::block_count))
            .route("/api/block/{id}/", web::get().to(user::block))
            .route("/api/transaction/{hash}/", web::get().to(user::transaction))
            .route(
                "/api/submit_transaction/",
                web::post().to(user::submit_transaction),
            )
            .route(
                "/p2p/transmit_transaction/",
                web::post().to(peer::transmit_transaction),
            )
            .route("/p2p/transmit_block/", web::post().to(peer::transmit_block))
            .route(
                "/p2p/blockchain_history/",
                web::get().to(peer::blockchain_history),
            )
            .route("/p2p/blocks/", web::post().to(peer::blocks))
    })
    .bind(bind_address)?
    .run();
    Ok(server)
}
