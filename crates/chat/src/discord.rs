use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hotbot_core::config::ChatConfig;
use hotbot_core::domain::ids::{ChannelId, MessageId};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{BackendError, ChannelInfo, ChatBackend, ReactionCount, ReactionCounts};
use crate::cards::MessageCard;

/// Outbound half of a Discord bot over REST API v10.
pub struct DiscordRestBackend {
    client: Client,
    base_url: Url,
    token: SecretString,
}

impl DiscordRestBackend {
    pub fn new(
        base_url: &str,
        token: SecretString,
        request_timeout: Duration,
    ) -> Result<Self, BackendError> {
        let base_url = Url::parse(base_url)
            .map_err(|error| BackendError::Request(format!("invalid api base url: {error}")))?;
        if base_url.cannot_be_a_base() {
            return Err(BackendError::Request(format!("api base url `{base_url}` has no path")));
        }
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|error| BackendError::Request(error.to_string()))?;
        Ok(Self { client, base_url, token })
    }

    pub fn from_config(config: &ChatConfig) -> Result<Self, BackendError> {
        Self::new(
            &config.api_base_url,
            config.token.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, BackendError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| BackendError::Request("api base url cannot take a path".to_owned()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(
            reqwest::header::AUTHORIZATION,
            format!("Bot {}", self.token.expose_secret()),
        )
    }

    async fn execute(
        &self,
        request: RequestBuilder,
        resource: &str,
    ) -> Result<reqwest::Response, BackendError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|error| BackendError::Request(error.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(BackendError::NotFound(resource.to_owned()));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::Api { status: status.as_u16(), message });
        }
        Ok(response)
    }

    async fn execute_json<T>(
        &self,
        request: RequestBuilder,
        resource: &str,
    ) -> Result<T, BackendError>
    where
        T: DeserializeOwned,
    {
        self.execute(request, resource)
            .await?
            .json::<T>()
            .await
            .map_err(|error| BackendError::Decode(format!("{resource}: {error}")))
    }
}

#[async_trait]
impl ChatBackend for DiscordRestBackend {
    async fn post_card(
        &self,
        channel_id: &ChannelId,
        card: &MessageCard,
    ) -> Result<MessageId, BackendError> {
        let url = self.endpoint(&["channels", channel_id.as_str(), "messages"])?;
        let payload = CreateMessage { embeds: [DiscordEmbed::from(card)] };
        let message: DiscordMessage = self
            .execute_json(self.client.post(url).json(&payload), &format!("channel `{channel_id}`"))
            .await?;
        debug!(channel_id = %channel_id, message_id = %message.id, "posted card");
        Ok(MessageId(message.id))
    }

    async fn add_reaction(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
        emoji: &str,
    ) -> Result<(), BackendError> {
        let url = self.endpoint(&[
            "channels",
            channel_id.as_str(),
            "messages",
            message_id.as_str(),
            "reactions",
            emoji,
            "@me",
        ])?;
        self.execute(self.client.put(url), &format!("message `{message_id}`")).await?;
        Ok(())
    }

    async fn fetch_reactions(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
    ) -> Result<ReactionCounts, BackendError> {
        let url =
            self.endpoint(&["channels", channel_id.as_str(), "messages", message_id.as_str()])?;
        let message: DiscordMessage =
            self.execute_json(self.client.get(url), &format!("message `{message_id}`")).await?;

        Ok(message
            .reactions
            .into_iter()
            .filter_map(|reaction| {
                let name = reaction.emoji.name?;
                Some((name, ReactionCount { count: reaction.count, me: reaction.me }))
            })
            .collect())
    }

    async fn fetch_channel(&self, channel_id: &ChannelId) -> Result<ChannelInfo, BackendError> {
        let url = self.endpoint(&["channels", channel_id.as_str()])?;
        let channel: DiscordChannel =
            self.execute_json(self.client.get(url), &format!("channel `{channel_id}`")).await?;
        Ok(ChannelInfo { id: ChannelId(channel.id), name: channel.name })
    }
}

#[derive(Serialize)]
struct CreateMessage<'a> {
    embeds: [DiscordEmbed<'a>; 1],
}

#[derive(Serialize)]
struct DiscordEmbed<'a> {
    title: &'a str,
    #[serde(skip_serializing_if = "is_blank")]
    description: &'a str,
    color: u32,
    fields: Vec<EmbedField<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    footer: Option<EmbedFooter<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<DateTime<Utc>>,
}

fn is_blank(value: &&str) -> bool {
    value.is_empty()
}

#[derive(Serialize)]
struct EmbedField<'a> {
    name: &'a str,
    value: &'a str,
    inline: bool,
}

#[derive(Serialize)]
struct EmbedFooter<'a> {
    text: &'a str,
}

impl<'a> From<&'a MessageCard> for DiscordEmbed<'a> {
    fn from(card: &'a MessageCard) -> Self {
        Self {
            title: &card.title,
            description: &card.description,
            color: card.color,
            fields: card
                .fields
                .iter()
                .map(|field| EmbedField {
                    name: &field.name,
                    value: &field.value,
                    inline: field.inline,
                })
                .collect(),
            footer: card.footer.as_deref().map(|text| EmbedFooter { text }),
            timestamp: card.timestamp,
        }
    }
}

#[derive(Deserialize)]
struct DiscordMessage {
    id: String,
    #[serde(default)]
    reactions: Vec<DiscordReaction>,
}

#[derive(Deserialize)]
struct DiscordReaction {
    count: u32,
    #[serde(default)]
    me: bool,
    emoji: DiscordEmoji,
}

#[derive(Deserialize)]
struct DiscordEmoji {
    name: Option<String>,
}

#[derive(Deserialize)]
struct DiscordChannel {
    id: String,
    name: Option<String>,
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post, put};
    use axum::{Json, Router};
    use hotbot_core::domain::ids::{ChannelId, MessageId};
    use serde_json::{json, Value};

    use super::DiscordRestBackend;
    use crate::backend::{BackendError, ChatBackend, ReactionCount};
    use crate::cards::CardBuilder;

    #[derive(Clone, Default)]
    struct Seen {
        requests: Arc<Mutex<Vec<(String, Option<String>, Value)>>>,
    }

    impl Seen {
        fn record(&self, path: String, headers: &HeaderMap, body: Value) {
            let auth = headers
                .get("authorization")
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned);
            self.requests.lock().expect("seen lock").push((path, auth, body));
        }

        fn all(&self) -> Vec<(String, Option<String>, Value)> {
            self.requests.lock().expect("seen lock").clone()
        }
    }

    async fn create_message(
        State(seen): State<Seen>,
        Path(channel_id): Path<String>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        seen.record(format!("POST {channel_id}"), &headers, body);
        Json(json!({ "id": "9001", "channel_id": channel_id }))
    }

    async fn add_reaction(
        State(seen): State<Seen>,
        Path((channel_id, message_id, emoji)): Path<(String, String, String)>,
        headers: HeaderMap,
    ) -> StatusCode {
        seen.record(format!("PUT {channel_id}/{message_id}/{emoji}"), &headers, Value::Null);
        StatusCode::NO_CONTENT
    }

    async fn get_message(Path((_channel_id, message_id)): Path<(String, String)>) -> Json<Value> {
        Json(json!({
            "id": message_id,
            "reactions": [
                { "count": 3, "me": true, "emoji": { "id": null, "name": "1️⃣" } },
                { "count": 1, "me": false, "emoji": { "id": null, "name": "3️⃣" } },
                { "count": 2, "me": false, "emoji": { "id": "123", "name": null } }
            ]
        }))
    }

    async fn get_channel(Path(channel_id): Path<String>) -> Result<Json<Value>, StatusCode> {
        if channel_id == "gone" {
            return Err(StatusCode::NOT_FOUND);
        }
        Ok(Json(json!({ "id": channel_id, "name": "hotpot-lovers", "type": 0 })))
    }

    async fn spawn_mock(seen: Seen) -> String {
        let router = Router::new()
            .route("/api/v10/channels/{channel_id}", get(get_channel))
            .route("/api/v10/channels/{channel_id}/messages", post(create_message))
            .route("/api/v10/channels/{channel_id}/messages/{message_id}", get(get_message))
            .route(
                "/api/v10/channels/{channel_id}/messages/{message_id}/reactions/{emoji}/@me",
                put(add_reaction),
            )
            .with_state(seen);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
        let address = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("mock server");
        });
        format!("http://{address}/api/v10")
    }

    fn backend(base_url: &str) -> DiscordRestBackend {
        DiscordRestBackend::new(base_url, "test-token".to_owned().into(), Duration::from_secs(5))
            .expect("backend")
    }

    #[tokio::test]
    async fn post_card_sends_an_authorized_embed() {
        let seen = Seen::default();
        let base_url = spawn_mock(seen.clone()).await;
        let card = CardBuilder::new("🍲 Hotpot Interest Detected!", 0xFF6B35)
            .description("I see 2 people are interested in hotpot!")
            .field("Next Steps", |field| {
                field.line("Need 1 reaction");
            })
            .footer("React within 10 minutes!")
            .build();

        let message_id =
            backend(&base_url).post_card(&ChannelId::from("42"), &card).await.expect("post");

        assert_eq!(message_id, MessageId::from("9001"));
        let requests = seen.all();
        let (path, auth, body) = &requests[0];
        assert_eq!(path, "POST 42");
        assert_eq!(auth.as_deref(), Some("Bot test-token"));
        assert_eq!(body["embeds"][0]["title"], "🍲 Hotpot Interest Detected!");
        assert_eq!(body["embeds"][0]["color"], 0xFF6B35);
        assert_eq!(body["embeds"][0]["fields"][0]["name"], "Next Steps");
        assert_eq!(body["embeds"][0]["footer"]["text"], "HotBot • React within 10 minutes!");
    }

    #[tokio::test]
    async fn add_reaction_targets_the_encoded_emoji_path() {
        let seen = Seen::default();
        let base_url = spawn_mock(seen.clone()).await;

        backend(&base_url)
            .add_reaction(&ChannelId::from("42"), &MessageId::from("7"), "🔥")
            .await
            .expect("react");

        let requests = seen.all();
        assert_eq!(requests[0].0, "PUT 42/7/🔥");
    }

    #[tokio::test]
    async fn fetch_reactions_keeps_named_emoji_with_own_flag() {
        let base_url = spawn_mock(Seen::default()).await;

        let counts = backend(&base_url)
            .fetch_reactions(&ChannelId::from("42"), &MessageId::from("7"))
            .await
            .expect("fetch");

        assert_eq!(counts.len(), 2);
        assert_eq!(counts.get("1️⃣"), Some(&ReactionCount { count: 3, me: true }));
        assert_eq!(counts.get("3️⃣").map(ReactionCount::excluding_own), Some(1));
    }

    #[tokio::test]
    async fn missing_channel_maps_to_not_found() {
        let base_url = spawn_mock(Seen::default()).await;
        let backend = backend(&base_url);

        let found = backend.fetch_channel(&ChannelId::from("42")).await.expect("channel");
        let missing = backend.fetch_channel(&ChannelId::from("gone")).await;

        assert_eq!(found.name.as_deref(), Some("hotpot-lovers"));
        assert!(matches!(missing, Err(BackendError::NotFound(_))));
    }

    #[test]
    fn rejects_unusable_base_urls() {
        let result = DiscordRestBackend::new(
            "mailto:bot@example.com",
            "test-token".to_owned().into(),
            Duration::from_secs(5),
        );

        assert!(matches!(result, Err(BackendError::Request(_))));
    }
}
