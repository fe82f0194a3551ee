use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Settings {
    pub bot_token: String,
    pub operator_chat: i64,
    pub fonts_dir: PathBuf,
    pub work_dir: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    bot: Option<BotSettings>,
    paths: Option<PathSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct BotSettings {
    token: Option<String>,
    operator_chat: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct PathSettings {
    fonts_dir: Option<String>,
    work_dir: Option<String>,
}

#[derive(Debug, Default)]
struct Draft {
    token: Option<String>,
    operator_chat: Option<i64>,
    fonts_dir: Option<PathBuf>,
    work_dir: Option<PathBuf>,
}

/// Loads process configuration. Optional TOML files are merged in order
/// (`settings.toml`, `settings.local.toml`, then `extra_path`), and the
/// `BOT_TOKEN` / `OPERATOR_CHAT_ID` environment variables override them.
/// Missing token or operator chat is a fatal condition.
pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut draft = Draft::default();

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            draft.merge(parsed);
        }
    }

    if let Some(token) = get_env("BOT_TOKEN") {
        draft.token = Some(token);
    }
    if let Some(chat) = get_env("OPERATOR_CHAT_ID") {
        let parsed = chat
            .trim()
            .parse::<i64>()
            .with_context(|| format!("OPERATOR_CHAT_ID must be a numeric chat id, got '{chat}'"))?;
        draft.operator_chat = Some(parsed);
    }

    let bot_token = draft.token.ok_or_else(|| {
        anyhow!(
            "no bot token configured. Set the BOT_TOKEN environment variable \
             or [bot] token in settings.toml"
        )
    })?;
    let operator_chat = draft.operator_chat.ok_or_else(|| {
        anyhow!(
            "no operator chat configured. Set the OPERATOR_CHAT_ID environment variable \
             or [bot] operator_chat in settings.toml"
        )
    })?;

    Ok(Settings {
        bot_token,
        operator_chat,
        fonts_dir: draft.fonts_dir.unwrap_or_else(|| PathBuf::from("fonts")),
        work_dir: draft
            .work_dir
            .unwrap_or_else(|| std::env::temp_dir().join("thumbstamp")),
    })
}

impl Draft {
    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(bot) = incoming.bot {
            if let Some(token) = bot.token {
                if !token.trim().is_empty() {
                    self.token = Some(token);
                }
            }
            if let Some(chat) = bot.operator_chat {
                self.operator_chat = Some(chat);
            }
        }
        if let Some(paths) = incoming.paths {
            if let Some(dir) = paths.fonts_dir {
                if !dir.trim().is_empty() {
                    self.fonts_dir = Some(PathBuf::from(dir));
                }
            }
            if let Some(dir) = paths.work_dir {
                if !dir.trim().is_empty() {
                    self.work_dir = Some(PathBuf::from(dir));
                }
            }
        }
    }
}

fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
