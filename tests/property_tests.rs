//! Property-based tests for redaction, truncation and token formatting.

use agent_watch::display::format_tokens;
use agent_watch::sanitize::{redact, truncate, RedactionPolicy, REDACTED};
use proptest::prelude::*;
use serde_json::Value;

/// Text built from key names, separators and values so matches are common.
///
/// Covers every default pattern in mixed case, including bearer tokens.
fn secretish_text() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            Just("token".to_string()),
            Just("API_KEY".to_string()),
            Just("Api-Key".to_string()),
            Just("apikey".to_string()),
            Just("ANTHROPIC_API_KEY".to_string()),
            Just("AZURE_FOUNDRY_API_KEY".to_string()),
            Just("password".to_string()),
            Just("PassWord".to_string()),
            Just("secret".to_string()),
            Just("SECRET".to_string()),
            Just("Bearer ".to_string()),
            Just("bearer".to_string()),
            Just("\t".to_string()),
            Just("=".to_string()),
            Just(":".to_string()),
            Just(" ".to_string()),
            Just(",".to_string()),
            Just("}".to_string()),
            Just("\n".to_string()),
            "[a-z0-9-]{1,8}",
        ],
        0..24,
    )
    .prop_map(|parts| parts.concat())
}

// ===== Redaction =====

proptest! {
    #[test]
    fn redaction_is_idempotent(text in secretish_text()) {
        let policy = RedactionPolicy::default();
        let once = policy.redact_str(&text);
        prop_assert_eq!(policy.redact_str(&once), once);
    }

    #[test]
    fn redaction_is_idempotent_with_extra_patterns(text in secretish_text()) {
        let policy = RedactionPolicy::with_extra_patterns(["GITHUB_TOKEN", "bearer"]).unwrap();
        let once = policy.redact_str(&text);
        prop_assert_eq!(policy.redact_str(&once), once);
    }

    #[test]
    fn redacted_values_never_survive(value in "[a-z0-9]{4,12}") {
        let policy = RedactionPolicy::default();
        let text = format!("run with password={value} now");
        let redacted = policy.redact_str(&text);
        prop_assert_eq!(redacted, format!("run with password={REDACTED} now"));
    }

    #[test]
    fn bearer_and_vendor_keys_never_survive(
        value in "[a-z0-9]{4,12}",
        key in prop_oneof![
            Just("ANTHROPIC_API_KEY"),
            Just("anthropic_api_key"),
            Just("Api_Key"),
            Just("TOKEN"),
            Just("Bearer abc"),
        ],
    ) {
        let policy = RedactionPolicy::default();
        let redacted = policy.redact_str(&format!("{key}: {value}"));
        prop_assert_eq!(redacted, format!("{key}={REDACTED}"));
    }

    #[test]
    fn json_redaction_is_idempotent(a in secretish_text(), b in secretish_text()) {
        let policy = RedactionPolicy::default();
        let value = serde_json::json!({"command": a, "args": [b, 3, null]});
        let once = redact(&value, &policy);
        prop_assert_eq!(redact(&once, &policy), once.clone());
        prop_assert!(matches!(once["args"][1], Value::Number(_)));
    }
}

// ===== Truncation =====

proptest! {
    #[test]
    fn short_text_is_kept_verbatim(text in "\\PC{0,40}", extra in 0usize..10) {
        let max = text.chars().count() + extra;
        let t = truncate(&text, max);
        prop_assert_eq!(&t.content, &text);
        prop_assert!(!t.truncated);
        prop_assert_eq!(t.original_size, text.chars().count());
    }

    #[test]
    fn long_text_reports_original_size(text in "\\PC{1,80}", cut in 1usize..80) {
        let len = text.chars().count();
        prop_assume!(cut <= len);
        let max = len - cut;
        let t = truncate(&text, max);
        prop_assert!(t.truncated);
        prop_assert_eq!(t.original_size, len);
        let kept: String = text.chars().take(max).collect();
        prop_assert!(t.content.starts_with(&kept));
        let marker = format!("[truncated {cut} chars]");
        prop_assert!(t.content.ends_with(&marker));
    }
}

// ===== Token formatting =====

proptest! {
    #[test]
    fn format_tokens_groups_thousands(n in any::<u64>()) {
        let formatted = format_tokens(n);
        prop_assert_eq!(formatted.replace(',', ""), n.to_string());
        for group in formatted.split(',').skip(1) {
            prop_assert_eq!(group.len(), 3);
        }
    }
}
