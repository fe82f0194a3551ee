use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, warn};

use crate::color;
use crate::fonts::FontRegistry;
use crate::menu::{self, Menu, MenuAction, MenuButton};
use crate::overlay::{self, FontStyle, HorizontalAlignment, VerticalAlignment};
use crate::session::{ChatId, Session, SessionState, SessionStore};
use crate::settings::Settings;

pub mod prompts;

/// Outbound side of the chat transport. The engine depends on nothing else.
#[async_trait]
pub trait Channel: Send + Sync {
    async fn send_text(&self, chat: ChatId, text: &str, menu: Option<&Menu>) -> Result<()>;
    async fn send_html(&self, chat: ChatId, text: &str, menu: Option<&Menu>) -> Result<()>;
    async fn send_photo(
        &self,
        chat: ChatId,
        png: &[u8],
        caption: &str,
        menu: Option<&Menu>,
    ) -> Result<()>;
    /// Fetches the bytes behind a channel-scoped photo reference.
    async fn download_photo(&self, file_ref: &str) -> Result<Vec<u8>>;
    /// Protocol-level "selection processed" acknowledgment.
    async fn ack_choice(&self, callback_id: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub chat: ChatId,
    pub sender: Option<String>,
    pub text: Option<String>,
    pub caption: Option<String>,
    /// Channel-scoped reference to the highest-resolution photo variant.
    pub photo: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MenuChoice {
    pub chat: ChatId,
    pub callback_id: String,
    pub choice: String,
}

#[derive(Debug, Clone)]
pub enum Event {
    Message(IncomingMessage),
    Choice(MenuChoice),
}

pub struct Engine<C> {
    channel: C,
    fonts: Arc<FontRegistry>,
    store: SessionStore,
    operator_chat: ChatId,
    work_dir: PathBuf,
    started_at: OffsetDateTime,
    pending_reports: Mutex<HashMap<ChatId, String>>,
}

impl<C: Channel> Engine<C> {
    pub fn new(channel: C, fonts: Arc<FontRegistry>, settings: &Settings) -> Self {
        Self {
            channel,
            fonts,
            store: SessionStore::new(),
            operator_chat: settings.operator_chat,
            work_dir: settings.work_dir.clone(),
            started_at: OffsetDateTime::now_utc(),
            pending_reports: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub async fn handle_event(&self, event: Event) {
        match event {
            Event::Message(message) => self.handle_message(message).await,
            Event::Choice(choice) => self.handle_choice(choice).await,
        }
    }

    /// Message events: failures become one generic user-facing message and
    /// are retained as the pending error-report candidate for this chat.
    async fn handle_message(&self, message: IncomingMessage) {
        if let Err(err) = self.dispatch_message(&message).await {
            warn!("message from chat {} failed: {err:#}", message.chat);
            let _ = self
                .channel
                .send_text(message.chat, prompts::ERROR_ENCOUNTERED, None)
                .await;
            self.reports_lock().insert(message.chat, format!("{err:#}"));
        }
    }

    /// Selection events are best-effort: failures are logged and swallowed,
    /// and the acknowledgment is always attempted.
    async fn handle_choice(&self, choice: MenuChoice) {
        if let Err(err) = self.dispatch_choice(&choice).await {
            debug!("menu selection from chat {} failed: {err:#}", choice.chat);
        }
        if let Err(err) = self.channel.ack_choice(&choice.callback_id).await {
            debug!("failed to acknowledge selection: {err:#}");
        }
    }

    async fn dispatch_message(&self, message: &IncomingMessage) -> Result<()> {
        // The error-report shadow flow preempts every state-based branch:
        // a recorded failure consumes exactly one follow-up message.
        let pending_report = self.reports_lock().remove(&message.chat);
        if let Some(report) = pending_report {
            if is_affirmative(message.text.as_deref()) {
                let sender = message.sender.as_deref().unwrap_or("unknown");
                let text = format!(
                    "Error reported by user '{}'.\n\n<code>{}</code>",
                    escape_html(sender),
                    escape_html(&report)
                );
                self.channel
                    .send_html(self.operator_chat, &text, None)
                    .await?;
                self.channel
                    .send_text(message.chat, prompts::ERROR_REPORTED, None)
                    .await?;
            }
            return Ok(());
        }

        if message.chat == self.operator_chat
            && message.text.as_deref().map(str::trim) == Some("/status")
        {
            let status = self.status_text()?;
            self.channel
                .send_text(self.operator_chat, &status, None)
                .await?;
            return Ok(());
        }

        let handle = self.store.get(message.chat);
        let mut session = handle.lock().await;

        if let Some(file_ref) = message.photo.clone() {
            return self.ingest_photo(&mut session, message, &file_ref).await;
        }

        let Some(text) = message.text.as_deref() else {
            return Ok(());
        };

        match session.state {
            SessionState::AwaitingText => {
                session.pending.text = text.to_string();
                let rendered = overlay::commit(&mut session, &self.fonts)?;
                self.channel
                    .send_photo(
                        message.chat,
                        &rendered,
                        prompts::WHAT_NOW,
                        Some(&menu::main_menu()),
                    )
                    .await?;
                session.state = SessionState::Ongoing;
            }
            SessionState::AwaitingTextSize => match parse_positive(text) {
                Some(size) => {
                    session.pending.text_size = size;
                    self.show_formatting(message.chat).await?;
                    session.state = SessionState::Ongoing;
                }
                None => {
                    self.channel
                        .send_text(message.chat, prompts::INVALID_SIZE, None)
                        .await?;
                }
            },
            SessionState::AwaitingBorderThickness => match parse_positive(text) {
                Some(thickness) => {
                    session.pending.border_thickness = thickness;
                    self.show_formatting(message.chat).await?;
                    session.state = SessionState::Ongoing;
                }
                None => {
                    self.channel
                        .send_text(message.chat, prompts::INVALID_SIZE, None)
                        .await?;
                }
            },
            SessionState::AwaitingHorizontalPadding => match text.trim().parse::<i32>() {
                Ok(padding) => {
                    session.pending.horizontal_padding = padding;
                    self.show_formatting(message.chat).await?;
                    session.state = SessionState::Ongoing;
                }
                Err(_) => {
                    self.channel
                        .send_text(message.chat, prompts::INVALID_PADDING, None)
                        .await?;
                }
            },
            SessionState::AwaitingVerticalPadding => match text.trim().parse::<i32>() {
                Ok(padding) => {
                    session.pending.vertical_padding = padding;
                    self.show_formatting(message.chat).await?;
                    session.state = SessionState::Ongoing;
                }
                Err(_) => {
                    self.channel
                        .send_text(message.chat, prompts::INVALID_PADDING, None)
                        .await?;
                }
            },
            SessionState::AwaitingTextColor => match color::parse_hex(text) {
                Ok(parsed) => {
                    session.pending.text_color = parsed;
                    self.show_formatting(message.chat).await?;
                    session.state = SessionState::Ongoing;
                }
                Err(_) => {
                    self.channel
                        .send_text(message.chat, prompts::INVALID_COLOR, None)
                        .await?;
                }
            },
            SessionState::AwaitingBorderColor => match color::parse_hex(text) {
                Ok(parsed) => {
                    session.pending.border_color = Some(parsed);
                    self.show_formatting(message.chat).await?;
                    session.state = SessionState::Ongoing;
                }
                Err(_) => {
                    self.channel
                        .send_text(message.chat, prompts::INVALID_COLOR, None)
                        .await?;
                }
            },
            _ => {}
        }
        Ok(())
    }

    async fn ingest_photo(
        &self,
        session: &mut Session,
        message: &IncomingMessage,
        file_ref: &str,
    ) -> Result<()> {
        let bytes = self.channel.download_photo(file_ref).await?;
        let path = self
            .work_dir
            .join(format!("{}.png", sanitize_file_ref(file_ref)));
        std::fs::write(&path, &bytes)
            .with_context(|| format!("failed to store upload {}", path.display()))?;
        session.source_path = Some(path);
        session.working = None;

        let mut adopted = false;
        if let Some(caption) = message.caption.as_deref().filter(|c| !c.trim().is_empty()) {
            match overlay::parse_config(caption) {
                Ok(config) => {
                    session.pending = config;
                    let rendered = overlay::commit(session, &self.fonts)?;
                    self.channel
                        .send_photo(
                            message.chat,
                            &rendered,
                            prompts::WHAT_NOW,
                            Some(&menu::main_menu()),
                        )
                        .await?;
                    adopted = true;
                }
                Err(err) => {
                    debug!("rejected caption configuration from chat {}: {err:#}", message.chat);
                    self.channel
                        .send_text(message.chat, prompts::INVALID_CONFIGURATION, None)
                        .await?;
                }
            }
        }
        if !adopted {
            self.channel
                .send_text(
                    message.chat,
                    prompts::RECEIVED_IMAGE,
                    Some(&menu::main_menu()),
                )
                .await?;
        }

        // The image is accepted even when an attached configuration was not.
        session.state = SessionState::Ongoing;
        Ok(())
    }

    async fn dispatch_choice(&self, choice: &MenuChoice) -> Result<()> {
        let handle = self.store.get(choice.chat);
        let mut session = handle.lock().await;
        match session.state {
            SessionState::Ongoing => {
                self.apply_action(choice.chat, &mut session, &choice.choice)
                    .await?;
            }
            // Value menus carry the chosen value as the identifier itself.
            SessionState::AwaitingFont => {
                session.pending.font = choice.choice.clone();
                self.show_formatting(choice.chat).await?;
                session.state = SessionState::Ongoing;
            }
            SessionState::AwaitingTextStyle => {
                if let Some(style) = FontStyle::from_id(&choice.choice) {
                    session.pending.text_style = style;
                    self.show_formatting(choice.chat).await?;
                    session.state = SessionState::Ongoing;
                }
            }
            SessionState::AwaitingHorizontalAlignment => {
                if let Some(alignment) = HorizontalAlignment::from_id(&choice.choice) {
                    session.pending.horizontal_alignment = alignment;
                    self.show_formatting(choice.chat).await?;
                    session.state = SessionState::Ongoing;
                }
            }
            SessionState::AwaitingVerticalAlignment => {
                if let Some(alignment) = VerticalAlignment::from_id(&choice.choice) {
                    session.pending.vertical_alignment = alignment;
                    self.show_formatting(choice.chat).await?;
                    session.state = SessionState::Ongoing;
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn apply_action(&self, chat: ChatId, session: &mut Session, id: &str) -> Result<()> {
        let Some(action) = MenuAction::from_id(id) else {
            debug!("ignoring unknown menu action '{id}' from chat {chat}");
            return Ok(());
        };
        match action {
            MenuAction::AddText => {
                self.show_formatting(chat).await?;
            }
            MenuAction::SetText => {
                self.channel
                    .send_text(chat, prompts::WHAT_TEXT, None)
                    .await?;
                session.state = SessionState::AwaitingText;
            }
            MenuAction::ChooseFont => {
                let buttons = self
                    .fonts
                    .families()
                    .iter()
                    .map(|name| MenuButton::new(name.clone(), name.clone()))
                    .collect();
                self.channel
                    .send_text(chat, prompts::SELECT_FONT, Some(&Menu::grid(buttons, 3)))
                    .await?;
                session.state = SessionState::AwaitingFont;
            }
            MenuAction::ChooseTextStyle => {
                let buttons = FontStyle::ALL
                    .iter()
                    .map(|style| MenuButton::new(style.id(), style.id()))
                    .collect();
                self.channel
                    .send_text(
                        chat,
                        prompts::SELECT_TEXT_STYLE,
                        Some(&Menu::grid(buttons, 2)),
                    )
                    .await?;
                session.state = SessionState::AwaitingTextStyle;
            }
            MenuAction::ChooseTextSize => {
                self.channel
                    .send_text(chat, prompts::ENTER_TEXT_SIZE, None)
                    .await?;
                session.state = SessionState::AwaitingTextSize;
            }
            MenuAction::ChooseHorizontalAlignment => {
                let buttons = HorizontalAlignment::ALL
                    .iter()
                    .map(|alignment| MenuButton::new(alignment.id(), alignment.id()))
                    .collect();
                self.channel
                    .send_text(
                        chat,
                        prompts::SELECT_HORIZONTAL_ALIGNMENT,
                        Some(&Menu::row(buttons)),
                    )
                    .await?;
                session.state = SessionState::AwaitingHorizontalAlignment;
            }
            MenuAction::ChooseVerticalAlignment => {
                let buttons = VerticalAlignment::ALL
                    .iter()
                    .map(|alignment| MenuButton::new(alignment.id(), alignment.id()))
                    .collect();
                self.channel
                    .send_text(
                        chat,
                        prompts::SELECT_VERTICAL_ALIGNMENT,
                        Some(&Menu::row(buttons)),
                    )
                    .await?;
                session.state = SessionState::AwaitingVerticalAlignment;
            }
            MenuAction::SetHorizontalPadding => {
                self.channel
                    .send_text(chat, prompts::SET_HORIZONTAL_PADDING, None)
                    .await?;
                session.state = SessionState::AwaitingHorizontalPadding;
            }
            MenuAction::SetVerticalPadding => {
                self.channel
                    .send_text(chat, prompts::SET_VERTICAL_PADDING, None)
                    .await?;
                session.state = SessionState::AwaitingVerticalPadding;
            }
            MenuAction::ChooseTextColor => {
                self.channel
                    .send_text(chat, prompts::ENTER_COLOR, None)
                    .await?;
                session.state = SessionState::AwaitingTextColor;
            }
            MenuAction::ChooseBorderColor => {
                self.channel
                    .send_text(chat, prompts::ENTER_COLOR, None)
                    .await?;
                session.state = SessionState::AwaitingBorderColor;
            }
            MenuAction::SetBorderThickness => {
                self.channel
                    .send_text(chat, prompts::SET_BORDER_THICKNESS, None)
                    .await?;
                session.state = SessionState::AwaitingBorderThickness;
            }
            MenuAction::ExportConfiguration => match &session.last_config {
                Some(config) => {
                    let text = format!(
                        "{}\n\n<code>{}</code>",
                        prompts::CONFIGURATION_OUTPUT,
                        escape_html(config)
                    );
                    self.channel
                        .send_html(chat, &text, Some(&menu::main_menu()))
                        .await?;
                }
                None => {
                    self.channel
                        .send_text(chat, prompts::NO_CONFIGURATION, Some(&menu::main_menu()))
                        .await?;
                }
            },
            MenuAction::Cancel => {
                session.state = SessionState::Done;
                session.release();
                self.store.remove(chat);
                self.channel.send_text(chat, prompts::CANCELED, None).await?;
            }
            MenuAction::Done => {
                let path = overlay::finalize(session)?;
                let bytes = std::fs::read(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                self.channel
                    .send_photo(chat, &bytes, prompts::FINISHED, None)
                    .await?;
                session.state = SessionState::Done;
                session.release();
                self.store.remove(chat);
            }
        }
        Ok(())
    }

    async fn show_formatting(&self, chat: ChatId) -> Result<()> {
        self.channel
            .send_text(
                chat,
                prompts::CHOOSE_OPTIONS,
                Some(&menu::formatting_menu()),
            )
            .await
    }

    fn status_text(&self) -> Result<String> {
        let uptime = OffsetDateTime::now_utc() - self.started_at;
        let since = self
            .started_at
            .format(&Rfc3339)
            .with_context(|| "failed to format start time")?;
        let host = std::env::var("HOSTNAME")
            .ok()
            .filter(|host| !host.trim().is_empty())
            .unwrap_or_else(|| "unknown".to_string());
        Ok(format!(
            "Status is good. Running on host '{host}' (platform is {os}). \
             Uptime is {uptime} (since {since}).",
            os = std::env::consts::OS,
            uptime = format_uptime(uptime),
        ))
    }

    fn reports_lock(&self) -> MutexGuard<'_, HashMap<ChatId, String>> {
        self.pending_reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn is_affirmative(text: Option<&str>) -> bool {
    text.map(|text| text.trim().eq_ignore_ascii_case("y"))
        .unwrap_or(false)
}

fn parse_positive(text: &str) -> Option<f32> {
    text.trim().parse::<f32>().ok().filter(|value| *value > 0.0)
}

fn sanitize_file_ref(file_ref: &str) -> String {
    file_ref
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

fn format_uptime(duration: time::Duration) -> String {
    let total = duration.whole_seconds().max(0);
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;
    if days > 0 {
        format!("{days}d {hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    }
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::TextOverlay;
    use anyhow::anyhow;
    use std::path::Path;

    #[derive(Debug, Clone, PartialEq)]
    enum Sent {
        Text {
            chat: ChatId,
            text: String,
            menu: bool,
        },
        Html {
            chat: ChatId,
            text: String,
        },
        Photo {
            chat: ChatId,
            caption: String,
            menu: bool,
        },
        Ack(String),
    }

    #[derive(Clone)]
    struct RecordingChannel {
        sent: Arc<Mutex<Vec<Sent>>>,
        photo: Option<Vec<u8>>,
    }

    impl RecordingChannel {
        fn new() -> Self {
            let image = image::RgbaImage::from_pixel(4, 4, image::Rgba([40, 40, 40, 255]));
            let mut png = Vec::new();
            image::DynamicImage::ImageRgba8(image)
                .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
                .expect("encode png");
            Self {
                sent: Arc::default(),
                photo: Some(png),
            }
        }

        fn failing_downloads() -> Self {
            Self {
                sent: Arc::default(),
                photo: None,
            }
        }

        fn sent(&self) -> Vec<Sent> {
            self.sent.lock().expect("sent lock").clone()
        }

        fn push(&self, item: Sent) {
            self.sent.lock().expect("sent lock").push(item);
        }
    }

    #[async_trait]
    impl Channel for RecordingChannel {
        async fn send_text(&self, chat: ChatId, text: &str, menu: Option<&Menu>) -> Result<()> {
            self.push(Sent::Text {
                chat,
                text: text.to_string(),
                menu: menu.is_some(),
            });
            Ok(())
        }

        async fn send_html(&self, chat: ChatId, text: &str, _menu: Option<&Menu>) -> Result<()> {
            self.push(Sent::Html {
                chat,
                text: text.to_string(),
            });
            Ok(())
        }

        async fn send_photo(
            &self,
            chat: ChatId,
            _png: &[u8],
            caption: &str,
            menu: Option<&Menu>,
        ) -> Result<()> {
            self.push(Sent::Photo {
                chat,
                caption: caption.to_string(),
                menu: menu.is_some(),
            });
            Ok(())
        }

        async fn download_photo(&self, _file_ref: &str) -> Result<Vec<u8>> {
            self.photo
                .clone()
                .ok_or_else(|| anyhow!("photo download failed"))
        }

        async fn ack_choice(&self, callback_id: &str) -> Result<()> {
            self.push(Sent::Ack(callback_id.to_string()));
            Ok(())
        }
    }

    const OPERATOR: ChatId = 99;

    fn engine(channel: RecordingChannel, dir: &Path) -> Engine<RecordingChannel> {
        let settings = Settings {
            bot_token: "test-token".to_string(),
            operator_chat: OPERATOR,
            fonts_dir: dir.join("fonts"),
            work_dir: dir.to_path_buf(),
        };
        Engine::new(
            channel,
            Arc::new(FontRegistry::with_families(&["Arial"])),
            &settings,
        )
    }

    fn photo_message(chat: ChatId, caption: Option<&str>) -> Event {
        Event::Message(IncomingMessage {
            chat,
            sender: Some("tester".to_string()),
            text: None,
            caption: caption.map(str::to_string),
            photo: Some("file-1".to_string()),
        })
    }

    fn text_message(chat: ChatId, text: &str) -> Event {
        Event::Message(IncomingMessage {
            chat,
            sender: Some("tester".to_string()),
            text: Some(text.to_string()),
            caption: None,
            photo: None,
        })
    }

    fn choice(chat: ChatId, id: &str) -> Event {
        Event::Choice(MenuChoice {
            chat,
            callback_id: "cb-1".to_string(),
            choice: id.to_string(),
        })
    }

    async fn state_of(engine: &Engine<RecordingChannel>, chat: ChatId) -> SessionState {
        engine.store().get(chat).lock().await.state
    }

    #[tokio::test]
    async fn photo_without_caption_prompts_for_text() {
        let dir = tempfile::tempdir().expect("tempdir");
        let channel = RecordingChannel::new();
        let engine = engine(channel.clone(), dir.path());

        engine.handle_event(photo_message(1, None)).await;

        assert_eq!(
            channel.sent(),
            vec![Sent::Text {
                chat: 1,
                text: prompts::RECEIVED_IMAGE.to_string(),
                menu: true,
            }]
        );
        assert_eq!(state_of(&engine, 1).await, SessionState::Ongoing);
    }

    #[tokio::test]
    async fn caption_config_is_adopted_and_committed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let channel = RecordingChannel::new();
        let engine = engine(channel.clone(), dir.path());

        engine
            .handle_event(photo_message(1, Some(r#"{"text":"SALE","textSize":50}"#)))
            .await;

        assert_eq!(
            channel.sent(),
            vec![Sent::Photo {
                chat: 1,
                caption: prompts::WHAT_NOW.to_string(),
                menu: true,
            }]
        );
        let handle = engine.store().get(1);
        let session = handle.lock().await;
        assert_eq!(session.state, SessionState::Ongoing);
        let exported = session.last_config.as_deref().expect("committed config");
        assert!(exported.contains(r#""text":"SALE""#));
        assert!(exported.contains(r#""textSize":50"#));
        assert_eq!(session.pending, TextOverlay::default());
    }

    #[tokio::test]
    async fn malformed_caption_still_accepts_the_image() {
        let dir = tempfile::tempdir().expect("tempdir");
        let channel = RecordingChannel::new();
        let engine = engine(channel.clone(), dir.path());

        engine
            .handle_event(photo_message(1, Some("definitely not json")))
            .await;

        assert_eq!(
            channel.sent(),
            vec![
                Sent::Text {
                    chat: 1,
                    text: prompts::INVALID_CONFIGURATION.to_string(),
                    menu: false,
                },
                Sent::Text {
                    chat: 1,
                    text: prompts::RECEIVED_IMAGE.to_string(),
                    menu: true,
                },
            ]
        );
        assert_eq!(state_of(&engine, 1).await, SessionState::Ongoing);
    }

    #[tokio::test]
    async fn invalid_padding_reprompts_without_changing_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let channel = RecordingChannel::new();
        let engine = engine(channel.clone(), dir.path());
        engine.store().get(1).lock().await.state = SessionState::AwaitingHorizontalPadding;

        engine.handle_event(text_message(1, "abc")).await;
        engine.handle_event(text_message(1, "12.5")).await;

        let invalid = Sent::Text {
            chat: 1,
            text: prompts::INVALID_PADDING.to_string(),
            menu: false,
        };
        assert_eq!(channel.sent(), vec![invalid.clone(), invalid]);
        assert_eq!(
            state_of(&engine, 1).await,
            SessionState::AwaitingHorizontalPadding
        );

        engine.handle_event(text_message(1, "12")).await;
        let handle = engine.store().get(1);
        let session = handle.lock().await;
        assert_eq!(session.state, SessionState::Ongoing);
        assert_eq!(session.pending.horizontal_padding, 12);
    }

    #[tokio::test]
    async fn border_color_is_parsed_and_stored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let channel = RecordingChannel::new();
        let engine = engine(channel.clone(), dir.path());
        engine.store().get(1).lock().await.state = SessionState::AwaitingBorderColor;

        engine.handle_event(text_message(1, "reddish")).await;
        assert_eq!(
            state_of(&engine, 1).await,
            SessionState::AwaitingBorderColor
        );

        engine.handle_event(text_message(1, "FF0000")).await;
        let handle = engine.store().get(1);
        let session = handle.lock().await;
        assert_eq!(session.state, SessionState::Ongoing);
        assert_eq!(session.pending.border_color.as_deref(), Some("#ff0000"));
    }

    #[tokio::test]
    async fn set_text_flow_commits_and_returns_to_ongoing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let channel = RecordingChannel::new();
        let engine = engine(channel.clone(), dir.path());

        engine.handle_event(photo_message(1, None)).await;
        engine
            .handle_event(choice(1, MenuAction::SetText.id()))
            .await;
        assert_eq!(state_of(&engine, 1).await, SessionState::AwaitingText);

        engine.handle_event(text_message(1, "HELLO")).await;

        let sent = channel.sent();
        assert!(sent.contains(&Sent::Photo {
            chat: 1,
            caption: prompts::WHAT_NOW.to_string(),
            menu: true,
        }));
        let handle = engine.store().get(1);
        let session = handle.lock().await;
        assert_eq!(session.state, SessionState::Ongoing);
        assert!(
            session
                .last_config
                .as_deref()
                .expect("committed config")
                .contains("HELLO")
        );
    }

    #[tokio::test]
    async fn prompt_actions_move_to_their_awaiting_states() {
        let dir = tempfile::tempdir().expect("tempdir");
        let channel = RecordingChannel::new();
        let engine = engine(channel.clone(), dir.path());

        let cases = [
            (MenuAction::ChooseTextSize, SessionState::AwaitingTextSize),
            (MenuAction::ChooseFont, SessionState::AwaitingFont),
            (MenuAction::ChooseTextStyle, SessionState::AwaitingTextStyle),
            (
                MenuAction::ChooseHorizontalAlignment,
                SessionState::AwaitingHorizontalAlignment,
            ),
            (
                MenuAction::ChooseVerticalAlignment,
                SessionState::AwaitingVerticalAlignment,
            ),
            (
                MenuAction::SetHorizontalPadding,
                SessionState::AwaitingHorizontalPadding,
            ),
            (
                MenuAction::SetVerticalPadding,
                SessionState::AwaitingVerticalPadding,
            ),
            (MenuAction::ChooseTextColor, SessionState::AwaitingTextColor),
            (
                MenuAction::ChooseBorderColor,
                SessionState::AwaitingBorderColor,
            ),
            (
                MenuAction::SetBorderThickness,
                SessionState::AwaitingBorderThickness,
            ),
            (MenuAction::SetText, SessionState::AwaitingText),
        ];
        for (action, expected) in cases {
            engine.store().get(1).lock().await.state = SessionState::Ongoing;
            engine.handle_event(choice(1, action.id())).await;
            assert_eq!(state_of(&engine, 1).await, expected, "{action:?}");
        }
    }

    #[tokio::test]
    async fn value_menus_adopt_the_selection_directly() {
        let dir = tempfile::tempdir().expect("tempdir");
        let channel = RecordingChannel::new();
        let engine = engine(channel.clone(), dir.path());

        engine.store().get(1).lock().await.state = SessionState::AwaitingFont;
        engine.handle_event(choice(1, "Arial")).await;
        {
            let handle = engine.store().get(1);
            let session = handle.lock().await;
            assert_eq!(session.pending.font, "Arial");
            assert_eq!(session.state, SessionState::Ongoing);
        }

        engine.store().get(1).lock().await.state = SessionState::AwaitingTextStyle;
        engine.handle_event(choice(1, "BoldItalic")).await;
        assert_eq!(
            engine.store().get(1).lock().await.pending.text_style,
            FontStyle::BoldItalic
        );

        engine.store().get(1).lock().await.state = SessionState::AwaitingHorizontalAlignment;
        engine.handle_event(choice(1, "Right")).await;
        assert_eq!(
            engine.store().get(1).lock().await.pending.horizontal_alignment,
            HorizontalAlignment::Right
        );

        engine.store().get(1).lock().await.state = SessionState::AwaitingVerticalAlignment;
        engine.handle_event(choice(1, "Bottom")).await;
        let handle = engine.store().get(1);
        let session = handle.lock().await;
        assert_eq!(session.pending.vertical_alignment, VerticalAlignment::Bottom);
        assert_eq!(session.state, SessionState::Ongoing);
    }

    #[tokio::test]
    async fn cancel_removes_the_session_and_confirms() {
        let dir = tempfile::tempdir().expect("tempdir");
        let channel = RecordingChannel::new();
        let engine = engine(channel.clone(), dir.path());

        engine.handle_event(photo_message(1, None)).await;
        engine.handle_event(choice(1, MenuAction::Cancel.id())).await;

        let sent = channel.sent();
        assert!(sent.contains(&Sent::Text {
            chat: 1,
            text: prompts::CANCELED.to_string(),
            menu: false,
        }));
        assert!(sent.contains(&Sent::Ack("cb-1".to_string())));
        assert!(!engine.store().contains(1));
    }

    #[tokio::test]
    async fn done_sends_the_final_image_and_removes_the_session() {
        let dir = tempfile::tempdir().expect("tempdir");
        let channel = RecordingChannel::new();
        let engine = engine(channel.clone(), dir.path());

        engine.handle_event(photo_message(1, None)).await;
        engine.handle_event(choice(1, MenuAction::Done.id())).await;

        let sent = channel.sent();
        assert!(sent.contains(&Sent::Photo {
            chat: 1,
            caption: prompts::FINISHED.to_string(),
            menu: false,
        }));
        assert!(!engine.store().contains(1));
    }

    #[tokio::test]
    async fn export_before_any_commit_says_so() {
        let dir = tempfile::tempdir().expect("tempdir");
        let channel = RecordingChannel::new();
        let engine = engine(channel.clone(), dir.path());

        engine.store().get(1).lock().await.state = SessionState::Ongoing;
        engine
            .handle_event(choice(1, MenuAction::ExportConfiguration.id()))
            .await;

        assert!(channel.sent().contains(&Sent::Text {
            chat: 1,
            text: prompts::NO_CONFIGURATION.to_string(),
            menu: true,
        }));
    }

    #[tokio::test]
    async fn export_after_commit_carries_the_frozen_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let channel = RecordingChannel::new();
        let engine = engine(channel.clone(), dir.path());

        engine
            .handle_event(photo_message(1, Some(r#"{"text":"SALE"}"#)))
            .await;
        engine
            .handle_event(choice(1, MenuAction::ExportConfiguration.id()))
            .await;

        let exported = channel
            .sent()
            .into_iter()
            .find_map(|item| match item {
                Sent::Html { chat: 1, text } => Some(text),
                _ => None,
            })
            .expect("exported configuration");
        assert!(exported.contains("SALE"));
        assert!(exported.contains("<code>"));
    }

    #[tokio::test]
    async fn failure_then_affirmative_reaches_the_operator() {
        let dir = tempfile::tempdir().expect("tempdir");
        let channel = RecordingChannel::failing_downloads();
        let engine = engine(channel.clone(), dir.path());

        engine.handle_event(photo_message(1, None)).await;
        assert_eq!(
            channel.sent(),
            vec![Sent::Text {
                chat: 1,
                text: prompts::ERROR_ENCOUNTERED.to_string(),
                menu: false,
            }]
        );

        engine.handle_event(text_message(1, "  Y ")).await;
        let sent = channel.sent();
        let report = sent
            .iter()
            .find_map(|item| match item {
                Sent::Html { chat, text } if *chat == OPERATOR => Some(text.clone()),
                _ => None,
            })
            .expect("operator report");
        assert!(report.contains("photo download failed"));
        assert!(report.contains("tester"));
        assert!(sent.contains(&Sent::Text {
            chat: 1,
            text: prompts::ERROR_REPORTED.to_string(),
            menu: false,
        }));

        // The record is cleared: the next "y" goes through normal dispatch.
        let before = channel.sent().len();
        engine.handle_event(text_message(1, "y")).await;
        assert_eq!(channel.sent().len(), before);
    }

    #[tokio::test]
    async fn failure_then_decline_clears_the_record_silently() {
        let dir = tempfile::tempdir().expect("tempdir");
        let channel = RecordingChannel::failing_downloads();
        let engine = engine(channel.clone(), dir.path());

        engine.handle_event(photo_message(1, None)).await;
        let before = channel.sent().len();

        engine.handle_event(text_message(1, "no thanks")).await;
        assert_eq!(channel.sent().len(), before);
        assert!(engine.reports_lock().is_empty());
    }

    #[tokio::test]
    async fn status_replies_to_the_operator_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let channel = RecordingChannel::new();
        let engine = engine(channel.clone(), dir.path());

        engine.handle_event(text_message(5, "/status")).await;
        assert!(channel.sent().is_empty());

        engine.handle_event(text_message(OPERATOR, "/status")).await;
        let sent = channel.sent();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            Sent::Text { chat, text, .. } => {
                assert_eq!(*chat, OPERATOR);
                assert!(text.contains("Uptime"));
            }
            other => panic!("unexpected outbound item: {other:?}"),
        }
    }
}
