use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;
use ttf_parser::{Face, name_id};
use usvg::fontdb;

/// Named, installable font faces for the overlay. Faces found in the
/// configured directory drive the font menu; system fonts sit beneath them
/// as resolution fallback for configurations sent by caption.
pub struct FontRegistry {
    database: Arc<fontdb::Database>,
    families: Vec<String>,
}

impl FontRegistry {
    pub fn load(dir: &Path) -> Self {
        let mut db = fontdb::Database::new();
        let mut families = BTreeSet::new();
        load_dir_fonts(&mut db, dir, &mut families);
        db.load_system_fonts();
        Self {
            database: Arc::new(db),
            families: families.into_iter().collect(),
        }
    }

    /// Family names offered in the font menu, sorted.
    pub fn families(&self) -> &[String] {
        &self.families
    }

    /// Whether a family name resolves to a renderable face.
    pub fn contains(&self, family: &str) -> bool {
        let family = family.trim();
        if family.is_empty() {
            return false;
        }
        if self
            .families
            .iter()
            .any(|name| name.eq_ignore_ascii_case(family))
        {
            return true;
        }
        let families = [fontdb::Family::Name(family)];
        let query = fontdb::Query {
            families: &families,
            ..fontdb::Query::default()
        };
        self.database.query(&query).is_some()
    }

    /// Database handed to the rasterizer for glyph resolution.
    pub fn database(&self) -> Arc<fontdb::Database> {
        self.database.clone()
    }

    #[cfg(test)]
    pub(crate) fn with_families(names: &[&str]) -> Self {
        Self {
            database: Arc::new(fontdb::Database::new()),
            families: names.iter().map(|name| name.to_string()).collect(),
        }
    }
}

fn load_dir_fonts(db: &mut fontdb::Database, dir: &Path, families: &mut BTreeSet<String>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!("fonts directory {} not readable: {}", dir.display(), err);
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let is_font = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("ttf") || ext.eq_ignore_ascii_case("otf"))
            .unwrap_or(false);
        if !is_font {
            continue;
        }
        // A single bad font file must not take the registry down.
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(err) => {
                warn!("skipping font {}: {}", path.display(), err);
                continue;
            }
        };
        match extract_family_name(&data) {
            Some(family) => {
                families.insert(family);
                db.load_font_data(data);
            }
            None => warn!("skipping font {}: no readable family name", path.display()),
        }
    }
}

fn extract_family_name(data: &[u8]) -> Option<String> {
    let face = Face::parse(data, 0).ok()?;
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_directory_yields_empty_menu() {
        let registry = FontRegistry::load(Path::new("definitely/not/a/fonts/dir"));
        assert!(registry.families().is_empty());
    }

    #[test]
    fn non_font_files_are_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("notes.txt"), "not a font").expect("write file");
        std::fs::write(dir.path().join("broken.ttf"), "also not a font").expect("write file");
        let registry = FontRegistry::load(dir.path());
        assert!(registry.families().is_empty());
    }

    #[test]
    fn registered_families_resolve_case_insensitively() {
        let registry = FontRegistry::with_families(&["Arial", "Impact"]);
        assert!(registry.contains("Arial"));
        assert!(registry.contains("arial"));
        assert!(!registry.contains("Comic Sans"));
        assert!(!registry.contains("  "));
    }
}
