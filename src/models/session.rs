use serde::Serialize;
use uuid::Uuid;

/// The caller's identity, resolved once per request and passed explicitly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub user_id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
}
