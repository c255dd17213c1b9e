//! Mojang session-server client for online-mode authentication.

use serde::Deserialize;

use crate::{CryptoError, Result};

/// Base URL of the `hasJoined` endpoint.
pub const SESSION_SERVER: &str = "https://sessionserver.mojang.com/session/minecraft/hasJoined";

/// The profile the session server returns for an authenticated player.
#[derive(Debug, Clone, Deserialize)]
pub struct GameProfile {
    /// Undashed UUID hex.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub properties: Vec<ProfileProperty>,
}

/// A profile property; in practice the `textures` blob.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileProperty {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub signature: Option<String>,
}

/// Asks the Mojang session server whether `username` has joined with the
/// given server hash. Any non-200 answer is an authentication failure.
pub async fn has_joined(username: &str, server_hash: &str) -> Result<GameProfile> {
    has_joined_at(SESSION_SERVER, username, server_hash).await
}

/// Same as [`has_joined`] against an explicit endpoint. Blocks the calling
/// task for the duration of the request, like the rest of the login flow.
pub async fn has_joined_at(
    endpoint: &str,
    username: &str,
    server_hash: &str,
) -> Result<GameProfile> {
    let url = format!("{endpoint}?username={username}&serverId={server_hash}");
    let response = reqwest::get(&url).await?;
    if response.status() != reqwest::StatusCode::OK {
        return Err(CryptoError::SessionRejected(response.status().as_u16()));
    }
    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_deserializes_with_optional_signature() {
        let body = r#"{
            "id": "069a79f444e94726a5befca90e38aaf5",
            "name": "Notch",
            "properties": [
                {"name": "textures", "value": "e30="}
            ]
        }"#;
        let profile: GameProfile = serde_json::from_str(body).unwrap();
        assert_eq!(profile.name, "Notch");
        assert_eq!(profile.properties.len(), 1);
        assert!(profile.properties[0].signature.is_none());
    }

    #[test]
    fn profile_deserializes_without_properties() {
        let body = r#"{"id": "069a79f444e94726a5befca90e38aaf5", "name": "Notch"}"#;
        let profile: GameProfile = serde_json::from_str(body).unwrap();
        assert!(profile.properties.is_empty());
    }
}
