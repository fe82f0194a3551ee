use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::engine::{Channel, Event, IncomingMessage, MenuChoice};
use crate::menu::Menu;
use crate::session::ChatId;

const API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub photo: Option<Vec<PhotoSize>>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramFile {
    #[serde(default)]
    file_path: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct ApiEnvelope<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

/// Thin Bot API client. Everything the engine needs goes through the
/// `Channel` trait; the long-poll loop additionally calls `get_updates`.
#[derive(Clone)]
pub struct TelegramApi {
    client: reqwest::Client,
    token: String,
}

impl TelegramApi {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: token.into(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{API_BASE}/bot{}/{}", self.token, method)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, payload: Value) -> Result<T> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("telegram request failed: {method}"))?;
        let envelope: ApiEnvelope<T> = response
            .json()
            .await
            .with_context(|| format!("telegram response unreadable: {method}"))?;
        unwrap_envelope(method, envelope)
    }

    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        self.call(
            "getUpdates",
            json!({
                "offset": offset,
                "timeout": timeout_secs,
                "allowed_updates": ["message", "callback_query"],
            }),
        )
        .await
    }

    async fn send_message(
        &self,
        chat: ChatId,
        text: &str,
        menu: Option<&Menu>,
        html: bool,
    ) -> Result<()> {
        let mut payload = json!({ "chat_id": chat, "text": text });
        if html {
            payload["parse_mode"] = Value::from("HTML");
        }
        if let Some(menu) = menu {
            payload["reply_markup"] = keyboard_json(menu);
        }
        let _: Value = self.call("sendMessage", payload).await?;
        Ok(())
    }

    async fn get_file_path(&self, file_id: &str) -> Result<String> {
        let file: TelegramFile = self.call("getFile", json!({ "file_id": file_id })).await?;
        file.file_path
            .ok_or_else(|| anyhow!("telegram getFile returned no file path"))
    }

    async fn download_file(&self, file_path: &str) -> Result<Vec<u8>> {
        let url = format!("{API_BASE}/file/bot{}/{}", self.token, file_path);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| "telegram file download failed")?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "telegram file download failed with status {}",
                response.status()
            ));
        }
        let bytes = response
            .bytes()
            .await
            .with_context(|| "telegram file download was interrupted")?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Channel for TelegramApi {
    async fn send_text(&self, chat: ChatId, text: &str, menu: Option<&Menu>) -> Result<()> {
        self.send_message(chat, text, menu, false).await
    }

    async fn send_html(&self, chat: ChatId, text: &str, menu: Option<&Menu>) -> Result<()> {
        self.send_message(chat, text, menu, true).await
    }

    async fn send_photo(
        &self,
        chat: ChatId,
        png: &[u8],
        caption: &str,
        menu: Option<&Menu>,
    ) -> Result<()> {
        let photo = reqwest::multipart::Part::bytes(png.to_vec())
            .file_name("thumbnail.png")
            .mime_str("image/png")
            .with_context(|| "failed to build photo upload")?;
        let mut form = reqwest::multipart::Form::new()
            .text("chat_id", chat.to_string())
            .text("caption", caption.to_string())
            .part("photo", photo);
        if let Some(menu) = menu {
            form = form.text("reply_markup", keyboard_json(menu).to_string());
        }
        let response = self
            .client
            .post(self.method_url("sendPhoto"))
            .multipart(form)
            .send()
            .await
            .with_context(|| "telegram request failed: sendPhoto")?;
        let envelope: ApiEnvelope<Value> = response
            .json()
            .await
            .with_context(|| "telegram response unreadable: sendPhoto")?;
        let _ = unwrap_envelope("sendPhoto", envelope)?;
        Ok(())
    }

    async fn download_photo(&self, file_ref: &str) -> Result<Vec<u8>> {
        let path = self.get_file_path(file_ref).await?;
        self.download_file(&path).await
    }

    async fn ack_choice(&self, callback_id: &str) -> Result<()> {
        let _: Value = self
            .call(
                "answerCallbackQuery",
                json!({ "callback_query_id": callback_id }),
            )
            .await?;
        Ok(())
    }
}

fn unwrap_envelope<T>(method: &str, envelope: ApiEnvelope<T>) -> Result<T> {
    if !envelope.ok {
        return Err(anyhow!(
            "telegram {} failed: {}",
            method,
            envelope
                .description
                .unwrap_or_else(|| "unknown error".to_string())
        ));
    }
    envelope
        .result
        .ok_or_else(|| anyhow!("telegram {} returned no result", method))
}

fn keyboard_json(menu: &Menu) -> Value {
    let rows: Vec<Value> = menu
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|button| json!({ "text": button.label, "callback_data": button.id }))
                .collect()
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

/// Maps a raw update onto an engine event, selecting the highest-resolution
/// photo variant. Updates the engine has no use for map to `None`.
pub fn event_from_update(update: Update) -> Option<Event> {
    if let Some(message) = update.message {
        let photo = message.photo.as_ref().and_then(|sizes| {
            sizes
                .iter()
                .max_by_key(|size| u64::from(size.width) * u64::from(size.height))
                .map(|size| size.file_id.clone())
        });
        return Some(Event::Message(IncomingMessage {
            chat: message.chat.id,
            sender: message.chat.username,
            text: message.text,
            caption: message.caption,
            photo,
        }));
    }
    if let Some(query) = update.callback_query {
        return Some(Event::Choice(MenuChoice {
            chat: query.from.id,
            callback_id: query.id,
            choice: query.data?,
        }));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::menu::{Menu, MenuButton};

    #[test]
    fn keyboard_json_matches_the_menu_shape() {
        let menu = Menu::grid(
            vec![
                MenuButton::new("One", "one"),
                MenuButton::new("Two", "two"),
                MenuButton::new("Three", "three"),
            ],
            2,
        );
        let value = keyboard_json(&menu);
        assert_eq!(
            value,
            serde_json::json!({
                "inline_keyboard": [
                    [
                        { "text": "One", "callback_data": "one" },
                        { "text": "Two", "callback_data": "two" },
                    ],
                    [
                        { "text": "Three", "callback_data": "three" },
                    ],
                ]
            })
        );
    }

    #[test]
    fn update_with_photo_selects_the_largest_variant() {
        let raw = serde_json::json!({
            "update_id": 7,
            "message": {
                "chat": { "id": 42, "username": "tester" },
                "caption": "{\"text\":\"SALE\"}",
                "photo": [
                    { "file_id": "small", "width": 90, "height": 90 },
                    { "file_id": "large", "width": 1280, "height": 1280 },
                    { "file_id": "medium", "width": 320, "height": 320 },
                ],
            },
        });
        let update: Update = serde_json::from_value(raw).expect("deserialize update");
        let event = event_from_update(update).expect("event");
        match event {
            Event::Message(message) => {
                assert_eq!(message.chat, 42);
                assert_eq!(message.photo.as_deref(), Some("large"));
                assert_eq!(message.caption.as_deref(), Some("{\"text\":\"SALE\"}"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn callback_update_becomes_a_menu_choice() {
        let raw = serde_json::json!({
            "update_id": 8,
            "callback_query": {
                "id": "cb-77",
                "from": { "id": 42, "username": "tester" },
                "data": "choose-font",
            },
        });
        let update: Update = serde_json::from_value(raw).expect("deserialize update");
        match event_from_update(update).expect("event") {
            Event::Choice(choice) => {
                assert_eq!(choice.chat, 42);
                assert_eq!(choice.callback_id, "cb-77");
                assert_eq!(choice.choice, "choose-font");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn updates_without_payload_are_dropped() {
        let update: Update =
            serde_json::from_value(serde_json::json!({ "update_id": 9 })).expect("deserialize");
        assert!(event_from_update(update).is_none());

        let no_data: Update = serde_json::from_value(serde_json::json!({
            "update_id": 10,
            "callback_query": { "id": "cb", "from": { "id": 1 } },
        }))
        .expect("deserialize");
        assert!(event_from_update(no_data).is_none());
    }

    #[test]
    fn error_envelopes_surface_the_description() {
        let envelope: ApiEnvelope<Value> = serde_json::from_str(
            r#"{"ok":false,"description":"Bad Request: chat not found"}"#,
        )
        .expect("deserialize envelope");
        let err = unwrap_envelope("sendMessage", envelope).expect_err("should fail");
        assert!(err.to_string().contains("chat not found"));
    }
}
