//! HTTP adapter for the external Telegram fetch bridge.
//!
//! The bridge owns MTProto sessions and pagination; this client only maps
//! its JSON surface onto the `TelegramClient` trait. An unconfigured bridge
//! URL yields a client that reports the upstream as unavailable, which keeps
//! query-only deployments functional.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::TelegramConfig;
use crate::models::messages::IncomingMessage;
use crate::providers::{
    MessagePage, ProviderError, ProviderResult, RemoteChat, TelegramClient,
};

pub struct BridgeClient {
    http: reqwest::Client,
    base_url: Option<String>,
}

impl BridgeClient {
    pub fn new(config: &TelegramConfig) -> ProviderResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| ProviderError::Permanent(format!("failed to build HTTP client: {}", e)))?;

        let base_url = if config.bridge_url.trim().is_empty() {
            None
        } else {
            Some(config.bridge_url.trim_end_matches('/').to_string())
        };

        Ok(Self { http, base_url })
    }

    fn base_url(&self) -> ProviderResult<&str> {
        self.base_url
            .as_deref()
            .ok_or_else(|| ProviderError::Permanent("telegram bridge not configured".to_string()))
    }

    async fn get_json<R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> ProviderResult<R> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url()?, path))
            .query(query)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, body));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| ProviderError::Permanent(format!("malformed bridge response: {}", e)))
    }
}

#[derive(Deserialize)]
struct BridgeChatList {
    chats: Vec<RemoteChat>,
}

#[derive(Deserialize)]
struct BridgeMessagePage {
    messages: Vec<IncomingMessage>,
    next_cursor: Option<i64>,
}

#[async_trait]
impl TelegramClient for BridgeClient {
    async fn list_chats(&self, tenant_id: &str) -> ProviderResult<Vec<RemoteChat>> {
        let list: BridgeChatList = self
            .get_json("/chats", &[("tenant_id", tenant_id.to_string())])
            .await?;
        Ok(list.chats)
    }

    async fn fetch_messages(
        &self,
        tenant_id: &str,
        chat_id: i64,
        cursor: Option<i64>,
    ) -> ProviderResult<MessagePage> {
        let mut query = vec![
            ("tenant_id", tenant_id.to_string()),
            ("chat_id", chat_id.to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }

        let page: BridgeMessagePage = self.get_json("/messages", &query).await?;
        Ok(MessagePage {
            messages: page.messages,
            next_cursor: page.next_cursor,
        })
    }
}
