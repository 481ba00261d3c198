//! `{{KEY}}` placeholder substitution for descriptors produced by release
//! automation.

use anyhow::{anyhow, Result};
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

fn is_key_char(c: char) -> bool {
    c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_'
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{([A-Z0-9_]+)\}\}").expect("valid placeholder regex"))
}

/// True if `s` still carries an unsubstituted token.
pub fn has_placeholder(s: &str) -> bool {
    s.contains("{{") || s.contains("}}")
}

/// Keys referenced by `{{KEY}}` tokens, in first-seen order.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    placeholder_re()
        .captures_iter(template)
        .filter_map(|cap| {
            let key = cap[1].to_string();
            seen.insert(key.clone()).then_some(key)
        })
        .collect()
}

/// Replace every `{{KEY}}` with its value. Fails listing all keys without a
/// value; nothing is partially rendered.
pub fn render(template: &str, values: &HashMap<String, String>) -> Result<String> {
    let missing: Vec<String> = placeholders(template)
        .into_iter()
        .filter(|k| !values.contains_key(k))
        .collect();
    if !missing.is_empty() {
        return Err(anyhow!("No value for placeholder(s): {}", missing.join(", ")));
    }

    let rendered = placeholder_re()
        .replace_all(template, |cap: &regex::Captures| values[&cap[1]].clone())
        .into_owned();
    Ok(rendered)
}

/// Parse a `KEY=VALUE` command-line assignment. The value may contain `=`.
pub fn parse_assignment(s: &str) -> Result<(String, String)> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| anyhow!("Invalid assignment '{}'. Use KEY=VALUE.", s))?;
    let key = key.trim();
    if key.is_empty() || !key.chars().all(is_key_char) {
        return Err(anyhow!("Invalid placeholder name '{}'", key));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_render_substitutes_all_tokens() {
        let template =
            "url: https://example.com/{{VERSION}}/vdot-{{VERSION}}.tar.gz\nsha256: {{SHA256_LINUX}}\n";
        let out = render(
            template,
            &values(&[("VERSION", "v0.3.7"), ("SHA256_LINUX", "abc")]),
        )
        .unwrap();
        assert_eq!(
            out,
            "url: https://example.com/v0.3.7/vdot-v0.3.7.tar.gz\nsha256: abc\n"
        );
        assert!(!has_placeholder(&out));
    }

    #[test]
    fn test_render_reports_every_missing_key() {
        let err = render("{{A}} {{B}} {{A}} {{C}}", &values(&[("B", "x")])).unwrap_err();
        assert_eq!(err.to_string(), "No value for placeholder(s): A, C");
    }

    #[test]
    fn test_only_uppercase_unpadded_tokens_are_keys() {
        assert!(placeholders("{{version}} {{ VERSION }}").is_empty());
        let out = render("{{ VERSION }}/{{VERSION}}", &values(&[("VERSION", "v1")])).unwrap();
        assert_eq!(out, "{{ VERSION }}/v1");
        assert!(has_placeholder(&out));
    }

    #[test]
    fn test_placeholders_dedup() {
        assert_eq!(placeholders("{{X}}{{Y}}{{X}}"), vec!["X", "Y"]);
        assert!(placeholders("no tokens").is_empty());
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("VERSION=v1.2.3").unwrap(),
            ("VERSION".to_string(), "v1.2.3".to_string())
        );
        assert_eq!(
            parse_assignment("URL=https://x/?a=b").unwrap().1,
            "https://x/?a=b"
        );
        assert!(parse_assignment("VERSION").is_err());
        assert!(parse_assignment("BAD KEY=1").is_err());
        assert!(parse_assignment("version=v1").is_err());
    }
}
