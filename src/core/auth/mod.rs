// ─── Account Profile ───
// The engine only consumes an already-issued bearer token; obtaining one is
// the caller's business.

use serde::{Deserialize, Serialize};

pub const AZURE_CLIENT_ID_FALLBACK: &str = "00000000402B5328";
const NIL_UUID: &str = "00000000-0000-0000-0000-000000000000";
const OFFLINE_TOKEN: &str = "offline_access_token";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccountMode {
    Offline,
    Microsoft,
}

/// Identity values substituted into `${auth_*}` launch placeholders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountProfile {
    pub mode: AccountMode,
    pub username: String,
    pub uuid: String,
    pub access_token: String,
    pub xuid: String,
    pub user_type: String,
    pub client_id: String,
}

impl Default for AccountProfile {
    fn default() -> Self {
        Self::offline("Player")
    }
}

impl AccountProfile {
    pub fn offline(username: &str) -> Self {
        Self {
            mode: AccountMode::Offline,
            username: username.trim().to_string(),
            uuid: NIL_UUID.into(),
            access_token: OFFLINE_TOKEN.into(),
            xuid: "0".into(),
            user_type: "legacy".into(),
            client_id: AZURE_CLIENT_ID_FALLBACK.into(),
        }
    }

    /// Profile backed by a bearer token issued by an external identity provider.
    pub fn with_bearer_token(username: &str, uuid: &str, access_token: &str) -> Self {
        Self {
            mode: AccountMode::Microsoft,
            username: username.trim().to_string(),
            uuid: uuid.trim().to_string(),
            access_token: access_token.trim().to_string(),
            xuid: "0".into(),
            user_type: "msa".into(),
            client_id: AZURE_CLIENT_ID_FALLBACK.into(),
        }
        .sanitized()
    }

    /// Fill every blank field with a usable default.
    pub fn sanitized(mut self) -> Self {
        if self.username.trim().is_empty() {
            self.username = "Player".into();
        }
        if self.uuid.trim().is_empty() {
            self.uuid = NIL_UUID.into();
        }
        if self.access_token.trim().is_empty() {
            self.access_token = OFFLINE_TOKEN.into();
        }
        if self.xuid.trim().is_empty() {
            self.xuid = "0".into();
        }
        if self.user_type.trim().is_empty() {
            self.user_type = match self.mode {
                AccountMode::Offline => "legacy".into(),
                AccountMode::Microsoft => "msa".into(),
            };
        }
        if self.client_id.trim().is_empty() {
            self.client_id = AZURE_CLIENT_ID_FALLBACK.into();
        }
        self
    }

    /// Legacy `${auth_session}` value.
    pub fn session(&self) -> String {
        format!("token:{}:{}", self.access_token, self.uuid.replace('-', ""))
    }
}
