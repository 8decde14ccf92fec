//! User registration backing `POST /chat/start`.
//!
//! The frontend registers a visitor before the first chat turn; the
//! returned id doubles as the conversation id for `POST /chat`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::info;

use crate::{ErrorResponse, SharedState};

/// A registered chat user.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    #[serde(rename = "userID")]
    pub user_id: u64,
    pub name: String,
    pub email: String,
    pub organisation: Option<String>,
    pub position: Option<String>,
}

/// Registration request body.
#[derive(Debug, Deserialize)]
pub struct UserCreate {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub organisation: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
}

/// In-memory user registry keyed by email.
///
/// Registering an email twice returns the original user. Ids come from
/// an atomic counter, so no two users ever share one.
pub struct UserDirectory {
    users: RwLock<HashMap<String, User>>,
    next_id: AtomicU64,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new user, or return the existing one with this email.
    pub async fn register(&self, request: UserCreate) -> User {
        let mut users = self.users.write().await;
        if let Some(existing) = users.get(&request.email) {
            return existing.clone();
        }

        let user = User {
            user_id: self.next_id.fetch_add(1, Ordering::Relaxed),
            name: request.name,
            email: request.email.clone(),
            organisation: request.organisation,
            position: request.position,
        };
        users.insert(request.email, user.clone());
        user
    }

    pub async fn count(&self) -> usize {
        self.users.read().await.len()
    }
}

impl Default for UserDirectory {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn start_chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<UserCreate>,
) -> Result<Json<User>, (StatusCode, Json<ErrorResponse>)> {
    if payload.name.trim().is_empty() || payload.email.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "name and email are required".into(),
            }),
        ));
    }

    let user = state.users.register(payload).await;
    info!(user_id = user.user_id, "Chat session ready");
    Ok(Json(user))
}
