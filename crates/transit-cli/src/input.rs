//! stdin 输入解析
//!
//! `run` forwards lines of the form `cp {"t":..}` or `ab {"t":..}`.

use std::str::FromStr;
use transit_session::{ChannelKind, Envelope};

/// Parse one input line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Result<Option<(ChannelKind, Envelope)>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (channel, body) = line
        .split_once(char::is_whitespace)
        .ok_or_else(|| "expected `<cp|ab> <json>`".to_string())?;
    let channel = ChannelKind::from_str(channel)?;
    let envelope =
        Envelope::from_json(body.trim()).map_err(|e| format!("invalid envelope: {}", e))?;

    Ok(Some((channel, envelope)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_channel_and_envelope() {
        let (channel, envelope) = parse_line(r#"cp {"t":"ext","p":{"cmd":"status"}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(channel, ChannelKind::ControlPlane);
        assert_eq!(envelope, Envelope::new("ext", json!({"cmd": "status"})));

        let (channel, _) = parse_line("  ab   {\"t\":\"data\"}  ").unwrap().unwrap();
        assert_eq!(channel, ChannelKind::AppBridge);
    }

    #[test]
    fn skips_blank_and_comment_lines() {
        assert_eq!(parse_line("").unwrap(), None);
        assert_eq!(parse_line("   ").unwrap(), None);
        assert_eq!(parse_line("# cp {}").unwrap(), None);
    }

    #[test]
    fn rejects_bad_lines() {
        assert!(parse_line("cp").is_err());
        assert!(parse_line(r#"xx {"t":"ext"}"#)
            .unwrap_err()
            .contains("unknown channel"));
        assert!(parse_line("ab {not json")
            .unwrap_err()
            .starts_with("invalid envelope"));
        assert!(parse_line(r#"ab {"p":{}}"#).is_err());
    }
}
