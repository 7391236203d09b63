//! Update-payload sanitization.

use serde_json::Value;
use tether_storage::Row;

/// Fields that can never be patched, regardless of any allow-list.
pub const IMMUTABLE_FIELDS: &[&str] = &["id", "created_at"];

/// Restrict a raw updates mapping to an allow-list, always excluding the
/// immutable block-list. Callers must treat an empty result as "nothing to
/// update" and skip the storage round trip.
pub fn sanitize_updates(raw: &serde_json::Map<String, Value>, allowed: &[&str]) -> Row {
    sanitize_with_blocklist(raw, allowed, IMMUTABLE_FIELDS)
}

/// Sanitize with an explicit block-list. The block-list wins over allow-list
/// membership: a blocked field never passes even when mistakenly allow-listed.
pub fn sanitize_with_blocklist(
    raw: &serde_json::Map<String, Value>,
    allowed: &[&str],
    blocked: &[&str],
) -> Row {
    raw.iter()
        .filter(|(key, _)| {
            !blocked.contains(&key.as_str()) && allowed.contains(&key.as_str())
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(pairs: &[(&str, Value)]) -> serde_json::Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn keeps_only_allowed_keys() {
        let updates = raw(&[
            ("email", json!("a@b.co")),
            ("first_name", json!("Ada")),
            ("favorite_color", json!("teal")),
        ]);
        let out = sanitize_updates(&updates, &["email", "first_name", "phone"]);

        assert_eq!(out.len(), 2);
        assert_eq!(out["email"], json!("a@b.co"));
        assert_eq!(out["first_name"], json!("Ada"));
        assert!(!out.contains_key("favorite_color"));
    }

    #[test]
    fn blocked_fields_never_pass() {
        let updates = raw(&[("id", json!("x")), ("created_at", json!("now"))]);
        let out = sanitize_updates(&updates, &["id", "created_at", "email"]);
        assert!(out.is_empty());
    }

    #[test]
    fn blocklist_wins_over_allowlist() {
        let updates = raw(&[("status", json!("won"))]);
        let out = sanitize_with_blocklist(&updates, &["status"], &["status"]);
        assert!(out.is_empty());
    }

    #[test]
    fn is_pure_intersection_minus_blocked() {
        let updates = raw(&[
            ("id", json!(1)),
            ("name", json!("Acme")),
            ("domain", json!("acme.io")),
            ("rogue", json!(true)),
        ]);
        let out = sanitize_updates(&updates, &["name", "domain", "id"]);

        let mut keys: Vec<&str> = out.keys().map(|k| k.as_str()).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["domain", "name"]);
    }
}
