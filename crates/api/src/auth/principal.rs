//! The authenticated identity attached to a request

use serde::Serialize;
use uuid::Uuid;

use eventhub_shared::{Role, User};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    #[serde(rename = "id")]
    pub user_id: Uuid,
    pub role: Role,
    pub is_admin: bool,
    pub user_name: String,
    pub email: String,
}

impl From<&User> for Principal {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            role: user.role,
            is_admin: user.is_admin,
            user_name: user.user_name.clone(),
            email: user.email.clone(),
        }
    }
}
