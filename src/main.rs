use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "thumbstamp",
    version,
    about = "Telegram bot that stamps configurable text overlays onto images"
)]
struct Cli {
    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Directory of .ttf/.otf fonts offered in the font menu
    #[arg(long = "fonts-dir")]
    fonts_dir: Option<String>,

    /// Directory for downloaded and rendered images
    #[arg(long = "work-dir")]
    work_dir: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    thumbstamp::logging::init(cli.verbose)?;
    thumbstamp::run(thumbstamp::Config {
        settings_path: cli.read_settings,
        fonts_dir: cli.fonts_dir,
        work_dir: cli.work_dir,
    })
    .await
}
