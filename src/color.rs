use anyhow::{Result, anyhow};

/// Parses a user-supplied HTML color into a normalized `#rrggbb`/`#rrggbbaa`
/// string. Accepts an optional leading `#` and 3/4/6/8 hex digits.
pub fn parse_hex(input: &str) -> Result<String> {
    normalize_hex(input).ok_or_else(|| anyhow!("invalid hex color '{}'", input.trim()))
}

fn normalize_hex(input: &str) -> Option<String> {
    let trimmed = input.trim();
    let digits = trimmed.strip_prefix('#').unwrap_or(trimmed);
    if !digits.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return None;
    }
    let expanded = match digits.len() {
        3 | 4 => digits.chars().flat_map(|ch| [ch, ch]).collect::<String>(),
        6 | 8 => digits.to_string(),
        _ => return None,
    };
    Some(format!("#{}", expanded.to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_six_digit_colors() {
        assert_eq!(parse_hex("#FF8800").expect("parse"), "#ff8800");
        assert_eq!(parse_hex("ff8800").expect("parse"), "#ff8800");
        assert_eq!(parse_hex("  #808080  ").expect("parse"), "#808080");
    }

    #[test]
    fn expands_shorthand_colors() {
        assert_eq!(parse_hex("#f80").expect("parse"), "#ff8800");
        assert_eq!(parse_hex("#f80c").expect("parse"), "#ff8800cc");
    }

    #[test]
    fn keeps_alpha_channels() {
        assert_eq!(parse_hex("80808080").expect("parse"), "#80808080");
    }

    #[test]
    fn rejects_malformed_colors() {
        for input in ["", "#", "red", "#ff88", "#ff88001", "##fff", "12 34"] {
            assert!(parse_hex(input).is_err(), "accepted {input:?}");
        }
    }
}
