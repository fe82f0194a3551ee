use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use resvg::render;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::PathBuf;
use tiny_skia::Pixmap;
use usvg::{Options, Tree};

use crate::color;
use crate::fonts::FontRegistry;
use crate::session::Session;

pub const DEFAULT_FONT: &str = "Arial";
pub const DEFAULT_TEXT_COLOR: &str = "#808080";
pub const DEFAULT_TEXT_SIZE: f32 = 100.0;
pub const DEFAULT_PADDING: i32 = 75;
pub const DEFAULT_BORDER_THICKNESS: f32 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FontStyle {
    Regular,
    Bold,
    Italic,
    BoldItalic,
}

impl FontStyle {
    pub const ALL: [FontStyle; 4] = [
        FontStyle::Regular,
        FontStyle::Bold,
        FontStyle::Italic,
        FontStyle::BoldItalic,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            FontStyle::Regular => "Regular",
            FontStyle::Bold => "Bold",
            FontStyle::Italic => "Italic",
            FontStyle::BoldItalic => "BoldItalic",
        }
    }

    pub fn from_id(id: &str) -> Option<FontStyle> {
        FontStyle::ALL.into_iter().find(|style| style.id() == id)
    }

    fn is_bold(&self) -> bool {
        matches!(self, FontStyle::Bold | FontStyle::BoldItalic)
    }

    fn is_italic(&self) -> bool {
        matches!(self, FontStyle::Italic | FontStyle::BoldItalic)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HorizontalAlignment {
    Left,
    Center,
    Right,
}

impl HorizontalAlignment {
    pub const ALL: [HorizontalAlignment; 3] = [
        HorizontalAlignment::Left,
        HorizontalAlignment::Center,
        HorizontalAlignment::Right,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            HorizontalAlignment::Left => "Left",
            HorizontalAlignment::Center => "Center",
            HorizontalAlignment::Right => "Right",
        }
    }

    pub fn from_id(id: &str) -> Option<HorizontalAlignment> {
        HorizontalAlignment::ALL.into_iter().find(|a| a.id() == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerticalAlignment {
    Top,
    Center,
    Bottom,
}

impl VerticalAlignment {
    pub const ALL: [VerticalAlignment; 3] = [
        VerticalAlignment::Top,
        VerticalAlignment::Center,
        VerticalAlignment::Bottom,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            VerticalAlignment::Top => "Top",
            VerticalAlignment::Center => "Center",
            VerticalAlignment::Bottom => "Bottom",
        }
    }

    pub fn from_id(id: &str) -> Option<VerticalAlignment> {
        VerticalAlignment::ALL.into_iter().find(|a| a.id() == id)
    }
}

/// Overlay configuration. Every field carries a default so a configuration
/// is always renderable even when only partially specified; the same shape
/// is accepted as a photo-caption payload and produced by "export
/// configuration".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextOverlay {
    pub text: String,
    pub text_size: f32,
    pub text_style: FontStyle,
    pub font: String,
    pub horizontal_alignment: HorizontalAlignment,
    pub vertical_alignment: VerticalAlignment,
    pub horizontal_padding: i32,
    pub vertical_padding: i32,
    pub text_color: String,
    pub border_color: Option<String>,
    pub border_thickness: f32,
}

impl Default for TextOverlay {
    fn default() -> Self {
        Self {
            text: String::new(),
            text_size: DEFAULT_TEXT_SIZE,
            text_style: FontStyle::Regular,
            font: DEFAULT_FONT.to_string(),
            horizontal_alignment: HorizontalAlignment::Left,
            vertical_alignment: VerticalAlignment::Top,
            horizontal_padding: DEFAULT_PADDING,
            vertical_padding: DEFAULT_PADDING,
            text_color: DEFAULT_TEXT_COLOR.to_string(),
            border_color: None,
            border_thickness: DEFAULT_BORDER_THICKNESS,
        }
    }
}

/// Parses a caption-borne configuration payload. Unspecified fields take
/// their defaults; out-of-range numbers and unparsable colors make the whole
/// payload malformed, so the caller can warn and continue without it.
pub fn parse_config(payload: &str) -> Result<TextOverlay> {
    let mut config: TextOverlay = serde_json::from_str(payload.trim())
        .with_context(|| "configuration payload is not valid JSON")?;
    if !(config.text_size > 0.0) {
        return Err(anyhow!("textSize must be positive"));
    }
    if !(config.border_thickness > 0.0) {
        return Err(anyhow!("borderThickness must be positive"));
    }
    config.text_color = color::parse_hex(&config.text_color)?;
    if let Some(border) = &config.border_color {
        config.border_color = Some(color::parse_hex(border)?);
    }
    Ok(config)
}

/// Serializes a configuration into the portable string handed back by
/// "export configuration". Set and defaulted fields both appear.
pub fn serialize_config(config: &TextOverlay) -> Result<String> {
    serde_json::to_string(config).with_context(|| "failed to serialize configuration")
}

/// Renders the pending configuration onto the session's working image,
/// freezes the serialized configuration, and resets the pending one to
/// defaults. Returns the rendered PNG for transmission.
pub fn commit(session: &mut Session, fonts: &FontRegistry) -> Result<Vec<u8>> {
    if !fonts.contains(&session.pending.font) {
        return Err(anyhow!("unknown font '{}'", session.pending.font));
    }
    let working = materialized_working(session)?;
    let decoded = image::load_from_memory(&working)
        .with_context(|| "failed to decode working image")?;
    let svg = build_scene(&working, decoded.width(), decoded.height(), &session.pending);
    let rendered = rasterize(&svg, fonts.database())?;
    session.working = Some(rendered.clone());
    session.last_config = Some(serialize_config(&session.pending)?);
    session.pending = TextOverlay::default();
    Ok(rendered)
}

/// Persists the working image beside the source and returns its location.
pub fn finalize(session: &mut Session) -> Result<PathBuf> {
    let working = materialized_working(session)?;
    let path = session
        .final_path()
        .ok_or_else(|| anyhow!("no image uploaded for this session"))?;
    std::fs::write(&path, &working)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

fn materialized_working(session: &mut Session) -> Result<Vec<u8>> {
    if let Some(working) = &session.working {
        return Ok(working.clone());
    }
    let source = session
        .source_path
        .as_deref()
        .ok_or_else(|| anyhow!("no image uploaded for this session"))?;
    let decoded = image::open(source)
        .with_context(|| format!("failed to decode image {}", source.display()))?;
    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(anyhow!("uploaded image has zero dimensions"));
    }
    let mut png = Vec::new();
    decoded
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .with_context(|| "failed to encode working image")?;
    session.working = Some(png.clone());
    Ok(png)
}

/// Draw anchor from alignment and padding: left/top anchor at `padding`,
/// center at the dimension midpoint (padding ignored), right/bottom at
/// `dimension - padding`.
fn anchor(overlay: &TextOverlay, width: u32, height: u32) -> (f32, f32) {
    let x = match overlay.horizontal_alignment {
        HorizontalAlignment::Left => overlay.horizontal_padding as f32,
        HorizontalAlignment::Center => width as f32 / 2.0,
        HorizontalAlignment::Right => width as f32 - overlay.horizontal_padding as f32,
    };
    let y = match overlay.vertical_alignment {
        VerticalAlignment::Top => overlay.vertical_padding as f32,
        VerticalAlignment::Center => height as f32 / 2.0,
        VerticalAlignment::Bottom => height as f32 - overlay.vertical_padding as f32,
    };
    (x, y)
}

fn build_scene(png: &[u8], width: u32, height: u32, overlay: &TextOverlay) -> String {
    let encoded = BASE64.encode(png);
    let data_uri = format!("data:image/png;base64,{}", encoded);

    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = width,
        h = height
    ));
    svg.push_str(&format!(
        r#"<image href="{uri}" xlink:href="{uri}" x="0" y="0" width="{w}" height="{h}" preserveAspectRatio="none"/>"#,
        uri = data_uri,
        w = width,
        h = height
    ));

    if !overlay.text.is_empty() {
        let (x, y) = anchor(overlay, width, height);
        let size = overlay.text_size;
        let line_height = size * 1.2;
        let lines: Vec<&str> = overlay.text.split('\n').collect();
        let block_height = lines.len() as f32 * line_height;
        let first_baseline = match overlay.vertical_alignment {
            VerticalAlignment::Top => y + size,
            VerticalAlignment::Center => y - block_height / 2.0 + size,
            VerticalAlignment::Bottom => y - block_height + size,
        };
        let text_anchor = match overlay.horizontal_alignment {
            HorizontalAlignment::Left => "start",
            HorizontalAlignment::Center => "middle",
            HorizontalAlignment::Right => "end",
        };

        let mut text_block = format!(
            r#"<text x="{x}" y="{y}" font-size="{size}" font-family="{family}" text-anchor="{anchor}" fill="{fill}""#,
            x = x,
            y = first_baseline,
            size = size,
            family = escape_xml(&overlay.font),
            anchor = text_anchor,
            fill = &overlay.text_color
        );
        if overlay.text_style.is_bold() {
            text_block.push_str(r#" font-weight="bold""#);
        }
        if overlay.text_style.is_italic() {
            text_block.push_str(r#" font-style="italic""#);
        }
        if let Some(border) = &overlay.border_color {
            text_block.push_str(&format!(
                r#" stroke="{stroke}" stroke-width="{width}" paint-order="stroke""#,
                stroke = border,
                width = overlay.border_thickness
            ));
        }
        text_block.push('>');
        for (idx, line) in lines.iter().enumerate() {
            let escaped = escape_xml(line);
            if idx == 0 {
                text_block.push_str(&escaped);
            } else {
                text_block.push_str(&format!(
                    r#"<tspan x="{x}" dy="{dy}">{text}</tspan>"#,
                    x = x,
                    dy = line_height,
                    text = escaped
                ));
            }
        }
        text_block.push_str("</text>");
        svg.push_str(&text_block);
    }

    svg.push_str("</svg>");
    svg
}

fn rasterize(svg: &str, fontdb: std::sync::Arc<usvg::fontdb::Database>) -> Result<Vec<u8>> {
    let options = Options {
        fontdb,
        ..Options::default()
    };
    let tree = Tree::from_str(svg, &options).with_context(|| "failed to parse overlay scene")?;
    let size = tree.size().to_int_size();
    let mut pixmap =
        Pixmap::new(size.width(), size.height()).ok_or_else(|| anyhow!("empty image size"))?;
    let mut pixmap_mut = pixmap.as_mut();
    render(&tree, tiny_skia::Transform::identity(), &mut pixmap_mut);
    let image = image::RgbaImage::from_raw(size.width(), size.height(), pixmap.data().to_vec())
        .ok_or_else(|| anyhow!("failed to build image buffer"))?;
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .with_context(|| "failed to encode rendered image")?;
    Ok(bytes)
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
