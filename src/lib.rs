use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub mod color;
pub mod engine;
pub mod fonts;
pub mod logging;
pub mod menu;
pub mod overlay;
pub mod session;
pub mod settings;
pub mod telegram;

#[cfg(test)]
mod test_util;

pub use engine::{Channel, Engine, Event};
pub use overlay::TextOverlay;
pub use settings::Settings;

const POLL_TIMEOUT_SECS: u64 = 50;
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub settings_path: Option<String>,
    pub fonts_dir: Option<String>,
    pub work_dir: Option<String>,
}

pub async fn run(config: Config) -> Result<()> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let mut settings = settings::load_settings(settings_path)?;
    if let Some(dir) = config.fonts_dir {
        settings.fonts_dir = PathBuf::from(dir);
    }
    if let Some(dir) = config.work_dir {
        settings.work_dir = PathBuf::from(dir);
    }
    std::fs::create_dir_all(&settings.work_dir).with_context(|| {
        format!(
            "failed to create working directory {}",
            settings.work_dir.display()
        )
    })?;

    let fonts = Arc::new(fonts::FontRegistry::load(&settings.fonts_dir));
    info!(
        "loaded {} overlay font families from {}",
        fonts.families().len(),
        settings.fonts_dir.display()
    );

    let api = telegram::TelegramApi::new(settings.bot_token.clone());
    let engine = Arc::new(engine::Engine::new(api.clone(), fonts, &settings));
    info!("listening for updates");

    let mut offset = 0i64;
    loop {
        let updates = match api.get_updates(offset, POLL_TIMEOUT_SECS).await {
            Ok(updates) => updates,
            Err(err) => {
                warn!("failed to fetch updates: {err:#}");
                tokio::time::sleep(POLL_RETRY_DELAY).await;
                continue;
            }
        };
        for update in updates {
            offset = offset.max(update.update_id + 1);
            let Some(event) = telegram::event_from_update(update) else {
                continue;
            };
            // Per-session serialization happens inside the engine, so each
            // update can be dispatched on its own task.
            let engine = engine.clone();
            tokio::spawn(async move {
                engine.handle_event(event).await;
            });
        }
    }
}
