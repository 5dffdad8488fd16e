//! Textual `{{var}}` template expansion.
//!
//! Substitution treats its input as opaque text so placeholders nested
//! inside free-form strings (queries, prompts, enrichment descriptions)
//! are replaced without the caller annotating which fields are
//! templated.

use std::collections::HashMap;

/// Replace every `{{key}}` token with its value, verbatim.
///
/// Unknown keys are left in place for the residual scan to report.
pub fn substitute(text: &str, vars: &HashMap<String, String>) -> String {
    replace_tokens(text, |key| vars.get(key).cloned())
}

/// Replace every `{{key}}` token with its value, JSON-string-escaped.
///
/// Used when the text form is a serialized JSON document: values
/// containing quotes or backslashes must not break the structure.
pub fn substitute_json(text: &str, vars: &HashMap<String, String>) -> String {
    replace_tokens(text, |key| vars.get(key).map(|v| escape_json(v)))
}

/// List every unresolved `{{…}}` token left in the text, in order of
/// first appearance, deduplicated.
pub fn residual_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            break;
        };
        let token = format!("{{{{{}}}}}", after[..end].trim());
        if !tokens.contains(&token) {
            tokens.push(token);
        }
        rest = &after[end + 2..];
    }
    tokens
}

fn replace_tokens(text: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            break;
        };
        let key = after[..end].trim();
        match lookup(key) {
            Some(value) => {
                out.push_str(&rest[..start]);
                out.push_str(&value);
            }
            None => {
                // leave the token intact for the residual scan
                out.push_str(&rest[..start + 2 + end + 2]);
            }
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

fn escape_json(value: &str) -> String {
    // serialize then strip the surrounding quotes
    let quoted = serde_json::to_string(value).unwrap_or_default();
    quoted
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or("")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_substitute_replaces_all_occurrences() {
        let out = substitute(
            "{{subject}} hiring and {{subject}} funding",
            &vars(&[("subject", "robotics")]),
        );
        assert_eq!(out, "robotics hiring and robotics funding");
    }

    #[test]
    fn test_substitute_tolerates_inner_whitespace() {
        let out = substitute("{{ subject }} hiring", &vars(&[("subject", "robotics")]));
        assert_eq!(out, "robotics hiring");
    }

    #[test]
    fn test_unknown_tokens_survive_for_residual_scan() {
        let out = substitute("{{subject}} in {{region}}", &vars(&[("subject", "ai")]));
        assert_eq!(out, "ai in {{region}}");
        assert_eq!(residual_tokens(&out), vec!["{{region}}".to_string()]);
    }

    #[test]
    fn test_residual_tokens_deduplicate_in_order() {
        let tokens = residual_tokens("{{a}} {{b}} {{a}}");
        assert_eq!(tokens, vec!["{{a}}".to_string(), "{{b}}".to_string()]);
    }

    #[test]
    fn test_json_substitution_escapes_quotes() {
        let text = r#"{"query":"{{q}}"}"#;
        let out = substitute_json(text, &vars(&[("q", "say \"hi\"")]));
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["query"], "say \"hi\"");
    }
}
