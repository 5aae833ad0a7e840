//! Property tests for the env-file rewrite laws.

use std::collections::HashMap;

use proptest::prelude::*;

use clawdeck::infrastructure::deploy::env_file::{
    apply_updates, mask_value, parse_env, render_env,
};

fn env_key() -> impl Strategy<Value = String> {
    "[A-Z][A-Z_]{0,14}"
}

fn env_value() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_./:-]{0,24}"
}

fn env_map(max: usize) -> impl Strategy<Value = HashMap<String, String>> {
    prop::collection::hash_map(env_key(), env_value(), 0..max)
}

proptest! {
    /// Render → parse is the identity.
    #[test]
    fn render_parse_roundtrip(env in env_map(12)) {
        let parsed = parse_env(&render_env(&env));
        prop_assert_eq!(parsed, env);
    }

    /// Applying updates yields exactly the merged map.
    #[test]
    fn apply_updates_merges(base in env_map(10), updates in env_map(6)) {
        let content = render_env(&base);
        let rewritten = apply_updates(&content, &updates);
        let parsed = parse_env(&rewritten);

        let mut expected = base;
        expected.extend(updates.clone());
        prop_assert_eq!(parsed, expected);
    }

    /// Untouched lines survive byte-for-byte, in order.
    #[test]
    fn untouched_lines_survive(base in env_map(10), updates in env_map(4)) {
        let content = render_env(&base);
        let rewritten = apply_updates(&content, &updates);

        let untouched: Vec<&str> = content
            .lines()
            .filter(|line| {
                line.split_once('=')
                    .map_or(true, |(key, _)| !updates.contains_key(key.trim()))
            })
            .collect();
        let survivors: Vec<&str> = rewritten
            .lines()
            .filter(|line| untouched.contains(line))
            .collect();
        prop_assert_eq!(untouched, survivors);
    }

    /// Masking is deterministic and keeps the revealing parts bounded.
    #[test]
    fn masking_is_deterministic(value in "[A-Za-z0-9]{0,48}") {
        let once = mask_value(&value);
        prop_assert_eq!(&once, &mask_value(&value));
        if value.chars().count() > 12 {
            prop_assert!(once.contains('…'));
            prop_assert_eq!(once.chars().count(), 13);
        } else {
            prop_assert_eq!(once, value);
        }
    }
}
