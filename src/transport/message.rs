use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::broker::topic::{ConnectionId, TopicId};

/// Query string of the subscribe endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct SubscribeQuery {
    pub username: Option<String>,
}

/// Administrative notice for every subscriber of a store.
#[derive(Debug, Deserialize, Serialize)]
pub struct PushMessageRequest {
    pub message: String,
}

/// Chat message from a subscriber; everyone else on the store receives it.
#[derive(Debug, Deserialize, Serialize)]
pub struct SendMessageRequest {
    pub connection_id: ConnectionId,
    pub message: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UpdateStatusRequest {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct StatusResponse {
    pub total_clients: usize,
    pub store_clients_count: BTreeMap<TopicId, usize>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct HealthResponse {
    pub status: String,
}
