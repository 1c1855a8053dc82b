//! User profile model.

use serde::{Deserialize, Serialize};

/// Profile document stored at `users/{uid}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_pic_url: Option<String>,
}
