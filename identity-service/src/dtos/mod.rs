pub mod auth;
pub mod invites;

use serde::{Deserialize, Serialize};

/// Body for every endpoint whose answer is a fixed sentence.
#[derive(Debug, Serialize, Deserialize)]
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
