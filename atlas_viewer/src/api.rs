use std::sync::Arc;

use atlas_runtime::normalize::{build_configuration, build_marker_sets, build_update_response};
use atlas_runtime::raw::is_truthy;
use atlas_runtime::{
    ComponentConfig, ConfigurationResponse, MarkerSet, MessageBundle, MessageConfig,
    ServerEndpoints, UpdateResponse,
};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, warn};

use crate::fetch::{FetchCoordinator, FetchError, Lane, Transport};

const LOGIN_REQUIRED: &str = "login-required";

/// Chat submission failures. Every variant except `Network` carries the
/// message to show the user.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("{0}")]
    Disabled(String),
    #[error("{0}")]
    Cooldown(String),
    #[error("{0}")]
    NotAllowed(String),
    #[error(transparent)]
    Network(#[from] FetchError),
}

/// Typed client for one map server.
pub struct MapApi {
    fetch: FetchCoordinator,
    endpoints: ServerEndpoints,
    bundle: MessageBundle,
}

impl MapApi {
    pub fn new(transport: Arc<dyn Transport>, endpoints: ServerEndpoints, bundle: MessageBundle) -> Self {
        Self {
            fetch: FetchCoordinator::new(transport),
            endpoints,
            bundle,
        }
    }

    pub fn endpoints(&self) -> &ServerEndpoints {
        &self.endpoints
    }

    pub fn fetch(&self) -> &FetchCoordinator {
        &self.fetch
    }

    pub async fn get_configuration(&self) -> Result<ConfigurationResponse, FetchError> {
        let raw = self
            .fetch
            .get_json(Lane::Configuration, &self.endpoints.configuration)
            .await?;

        match raw.get("error") {
            Some(Value::String(reason)) if reason == LOGIN_REQUIRED => {
                return Err(FetchError::LoginRequired)
            }
            Some(reason) if is_truthy(reason) => {
                let reason = reason
                    .as_str()
                    .map_or_else(|| reason.to_string(), str::to_string);
                return Err(FetchError::Server(reason));
            }
            _ => {}
        }

        Ok(build_configuration(&raw, &self.bundle))
    }

    pub fn update_url(&self, world: &str, timestamp: i64) -> String {
        self.endpoints
            .update
            .replacen("{world}", world, 1)
            .replacen("{timestamp}", &timestamp.to_string(), 1)
    }

    /// Poll for changes since `timestamp`, which also serves as the staleness
    /// watermark for the returned feed.
    pub async fn get_update(&self, world: &str, timestamp: i64) -> Result<UpdateResponse, FetchError> {
        let url = self.update_url(world, timestamp);
        let raw = self.fetch.get_json(Lane::Update, &url).await?;
        Ok(build_update_response(&raw, timestamp))
    }

    pub fn markers_url(&self, world: &str) -> String {
        format!("{}_markers_/marker_{}.json", self.endpoints.markers, world)
    }

    pub async fn get_marker_sets(&self, world: &str) -> Result<Vec<MarkerSet>, FetchError> {
        let url = self.markers_url(world);
        let raw = self.fetch.get_json(Lane::Markers, &url).await?;
        Ok(build_marker_sets(&raw))
    }

    pub async fn send_chat_message(
        &self,
        message: &str,
        components: &ComponentConfig,
        messages: &MessageConfig,
    ) -> Result<(), ChatError> {
        let Some(chat) = components.chat_sending else {
            return Err(ChatError::Disabled(messages.chat_error_disabled.clone()));
        };

        let body = json!({ "name": null, "message": message }).to_string();
        let result = self
            .fetch
            .transport()
            .post(&self.endpoints.sendmessage, body)
            .await
            .map_err(ChatError::from)
            .and_then(|response| {
                if response.status == 403 {
                    return Err(ChatError::Cooldown(
                        messages
                            .chat_error_cooldown
                            .replace("%interval%", &chat.cooldown.to_string()),
                    ));
                }
                Ok(response.into_json()?)
            })
            .and_then(|reply| match reply.get("error").and_then(Value::as_str) {
                Some("none") => Ok(()),
                _ => Err(ChatError::NotAllowed(messages.chat_error_not_allowed.clone())),
            });

        match &result {
            Err(ChatError::Network(err)) => {
                error!(target: "atlas::chat", error = %err, "{}", messages.chat_error_unknown);
            }
            Err(err) => warn!(target: "atlas::chat", error = %err, "chat.rejected"),
            Ok(()) => {}
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use atlas_runtime::ChatSendingComponent;

    use super::*;
    use crate::fetch::testing::{FakeTransport, Route};

    fn endpoints() -> ServerEndpoints {
        ServerEndpoints {
            configuration: "up/configuration".to_string(),
            update: "up/world/{world}/{timestamp}".to_string(),
            markers: "tiles/".to_string(),
            sendmessage: "up/sendmessage".to_string(),
        }
    }

    fn api(transport: Arc<FakeTransport>) -> MapApi {
        MapApi::new(transport, endpoints(), MessageBundle::new())
    }

    fn chat_messages() -> MessageConfig {
        MessageConfig {
            chat_error_cooldown: "Wait %interval% seconds".to_string(),
            chat_error_not_allowed: "Not allowed".to_string(),
            chat_error_disabled: "Chat disabled".to_string(),
            ..MessageConfig::default()
        }
    }

    fn chat_enabled() -> ComponentConfig {
        ComponentConfig {
            chat_sending: Some(ChatSendingComponent {
                login_required: false,
                max_length: 256,
                cooldown: 5,
            }),
            ..ComponentConfig::default()
        }
    }

    #[tokio::test]
    async fn login_required_sentinel_is_distinct() {
        let transport = FakeTransport::new();
        transport.respond("up/configuration", 200, json!({"error": "login-required"}));
        assert_eq!(
            api(transport.clone()).get_configuration().await,
            Err(FetchError::LoginRequired)
        );

        transport.respond("up/configuration", 200, json!({"error": "maintenance"}));
        assert_eq!(
            api(transport.clone()).get_configuration().await,
            Err(FetchError::Server("maintenance".to_string()))
        );

        transport.respond("up/configuration", 200, json!({"error": "", "title": "§4Server§r"}));
        let config = api(transport).get_configuration().await.unwrap();
        assert_eq!(config.config.title, "Server");
    }

    #[tokio::test]
    async fn update_url_is_templated() {
        let transport = FakeTransport::new();
        transport.respond(
            "up/world/world/1500",
            200,
            json!({
                "timestamp": 2000,
                "confighash": 7,
                "count": 1,
                "updates": [
                    {"type": "tile", "name": "old", "timestamp": 1000},
                    {"type": "tile", "name": "new", "timestamp": 1600}
                ]
            }),
        );
        let api = api(transport);
        assert_eq!(api.update_url("world", 1500), "up/world/world/1500");

        let update = api.get_update("world", 1500).await.unwrap();
        assert_eq!(update.timestamp, 2000);
        assert_eq!(update.config_hash, 7);
        assert_eq!(update.updates.tiles.len(), 1);
        assert_eq!(update.updates.tiles[0].name, "new");
        assert_eq!(update.rejections.stale, 1);
    }

    #[tokio::test]
    async fn marker_snapshot_uses_world_file() {
        let transport = FakeTransport::new();
        transport.respond(
            "tiles/_markers_/marker_world.json",
            200,
            json!({"sets": {"towns": {"label": "Towns", "markers": {"spawn": {"label": "Spawn"}}}}}),
        );
        let sets = api(transport).get_marker_sets("world").await.unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].id(), "towns");
        assert_eq!(sets[0].markers["spawn"].label, "Spawn");
    }

    #[tokio::test]
    async fn chat_requires_sending_component() {
        let transport = FakeTransport::new();
        let result = api(transport.clone())
            .send_chat_message("hi", &ComponentConfig::default(), &chat_messages())
            .await;
        assert_eq!(result, Err(ChatError::Disabled("Chat disabled".to_string())));
        assert!(transport.posts.lock().is_empty());
    }

    #[tokio::test]
    async fn chat_posts_null_name_and_accepts_none() {
        let transport = FakeTransport::new();
        transport.respond("up/sendmessage", 200, json!({"error": "none"}));
        api(transport.clone())
            .send_chat_message("hello", &chat_enabled(), &chat_messages())
            .await
            .unwrap();

        let posts = transport.posts.lock();
        let body: Value = serde_json::from_str(&posts[0].1).unwrap();
        assert_eq!(posts[0].0, "up/sendmessage");
        assert_eq!(body, json!({"name": null, "message": "hello"}));
    }

    #[tokio::test]
    async fn chat_failures_map_to_user_messages() {
        let transport = FakeTransport::new();
        transport.respond("up/sendmessage", 403, json!({}));
        let api = api(transport.clone());
        assert_eq!(
            api.send_chat_message("hi", &chat_enabled(), &chat_messages()).await,
            Err(ChatError::Cooldown("Wait 5 seconds".to_string()))
        );

        transport.respond("up/sendmessage", 200, json!({"error": "not-allowed"}));
        assert_eq!(
            api.send_chat_message("hi", &chat_enabled(), &chat_messages()).await,
            Err(ChatError::NotAllowed("Not allowed".to_string()))
        );

        transport.respond("up/sendmessage", 500, json!({}));
        assert!(matches!(
            api.send_chat_message("hi", &chat_enabled(), &chat_messages()).await,
            Err(ChatError::Network(FetchError::Status { status: 500, .. }))
        ));

        transport.route("up/sendmessage", Route::Unreachable);
        assert!(matches!(
            api.send_chat_message("hi", &chat_enabled(), &chat_messages()).await,
            Err(ChatError::Network(FetchError::Network(_)))
        ));
    }
}
