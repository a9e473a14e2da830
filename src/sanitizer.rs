//! # Feature: Input Sanitizer
//!
//! Cleans chat text before it reaches a response engine. User references are
//! swapped for hyphenated display names and characters that upset the engines
//! are removed outright.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.3.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.0.0: Mention resolution and punctuation stripping

use anyhow::Result;
use log::debug;
use regex::Regex;
use serenity::async_trait;
use std::sync::OnceLock;

/// Characters removed from every message before it is handed to an engine.
pub const FORBIDDEN_CHARS: &[char] = &['/', '\'', '.', '\\', '(', ')', '"', '\n'];

/// Result of looking a single token up as a user reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenResolution {
    /// The token names a user; carries their display name.
    Resolved(String),
    /// The token is not a user reference, or names nobody we know.
    Unresolved,
}

/// Looks up message tokens as references to users of the current guild.
#[async_trait]
pub trait UserResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<TokenResolution>;
}

/// Resolver that knows nobody. Used when a message has no guild context.
pub struct NoUsers;

#[async_trait]
impl UserResolver for NoUsers {
    async fn resolve(&self, _token: &str) -> Result<TokenResolution> {
        Ok(TokenResolution::Unresolved)
    }
}

fn user_reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(?:<@!?(\d{15,21})>|(\d{15,21}))$").expect("valid user reference regex"))
}

/// Extracts the user id from `<@id>`, `<@!id>` or a bare snowflake.
pub fn parse_user_reference(token: &str) -> Option<u64> {
    let captures = user_reference_pattern().captures(token)?;
    captures
        .get(1)
        .or_else(|| captures.get(2))
        .and_then(|m| m.as_str().parse().ok())
}

/// Replaces each whitespace character in a display name with a hyphen.
pub fn hyphenate(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .collect()
}

pub fn strip_forbidden(text: &str) -> String {
    text.chars().filter(|c| !FORBIDDEN_CHARS.contains(c)).collect()
}

/// Sanitizes raw message text. Never fails: tokens that cannot be resolved
/// are kept as written.
pub async fn sanitize(raw: &str, resolver: &dyn UserResolver) -> String {
    let mut words = Vec::new();

    for token in raw.split_whitespace() {
        let word = match resolver.resolve(token).await {
            Ok(TokenResolution::Resolved(name)) => hyphenate(&name),
            Ok(TokenResolution::Unresolved) => token.to_string(),
            Err(e) => {
                debug!("Could not resolve token {:?}, keeping it: {}", token, e);
                token.to_string()
            }
        };

        let word = strip_forbidden(&word);
        if !word.is_empty() {
            words.push(word);
        }
    }

    words.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct KnownUsers(HashMap<u64, String>);

    #[async_trait]
    impl UserResolver for KnownUsers {
        async fn resolve(&self, token: &str) -> Result<TokenResolution> {
            let Some(id) = parse_user_reference(token) else {
                return Ok(TokenResolution::Unresolved);
            };
            match self.0.get(&id) {
                Some(name) => Ok(TokenResolution::Resolved(name.clone())),
                None => Err(anyhow::anyhow!("Unknown member {}", id)),
            }
        }
    }

    fn known_users() -> KnownUsers {
        let mut users = HashMap::new();
        users.insert(111111111111111111, "Miss Piggy".to_string());
        users.insert(222222222222222222, "Dr. Bunsen (Lab)".to_string());
        KnownUsers(users)
    }

    #[test]
    fn test_parse_user_reference() {
        assert_eq!(parse_user_reference("<@111111111111111111>"), Some(111111111111111111));
        assert_eq!(parse_user_reference("<@!111111111111111111>"), Some(111111111111111111));
        assert_eq!(parse_user_reference("111111111111111111"), Some(111111111111111111));
        assert_eq!(parse_user_reference("hello"), None);
        assert_eq!(parse_user_reference("<#111111111111111111>"), None);
        assert_eq!(parse_user_reference("42"), None);
    }

    #[tokio::test]
    async fn test_mentions_become_hyphenated_names() {
        let cleaned = sanitize("hi <@111111111111111111> how are you", &known_users()).await;
        assert_eq!(cleaned, "hi Miss-Piggy how are you");
    }

    #[tokio::test]
    async fn test_resolved_names_are_stripped_too() {
        let cleaned = sanitize("ask <@!222222222222222222>", &known_users()).await;
        assert_eq!(cleaned, "ask Dr-Bunsen-Lab");
    }

    #[tokio::test]
    async fn test_failed_lookup_keeps_token() {
        let cleaned = sanitize("ping <@333333333333333333> now", &known_users()).await;
        assert_eq!(cleaned, "ping <@333333333333333333> now");
    }

    #[tokio::test]
    async fn test_forbidden_characters_removed() {
        let raw = "what's \"this\" (thing)?\nit/is\\a.test";
        let cleaned = sanitize(raw, &NoUsers).await;
        for c in FORBIDDEN_CHARS {
            assert!(!cleaned.contains(*c), "{:?} survived in {:?}", c, cleaned);
        }
        assert_eq!(cleaned, "whats this thing? itisatest");
    }

    #[tokio::test]
    async fn test_punctuation_only_tokens_are_dropped() {
        let cleaned = sanitize("well ... ok ()", &NoUsers).await;
        assert_eq!(cleaned, "well ok");
    }

    #[tokio::test]
    async fn test_sanitize_is_idempotent_without_user_tokens() {
        let inputs = [
            "hello there",
            "  spaced   out\ttext  ",
            "it's (mostly) fine... really",
            "\"quoted\"\n\nlines / slashes \\ dots.",
            "",
        ];
        for input in inputs {
            let once = sanitize(input, &known_users()).await;
            let twice = sanitize(&once, &known_users()).await;
            assert_eq!(once, twice, "not idempotent for {:?}", input);
        }
    }

    /// Every forbidden character, alone and in pairs, against words and
    /// assorted whitespace.
    fn generated_inputs() -> Vec<String> {
        let words = ["hello", "x", "don", "3", "über", "?"];
        let gaps = [" ", "  ", "\t", " \n ", ""];
        let mut inputs = Vec::new();
        for &c in FORBIDDEN_CHARS {
            for &d in FORBIDDEN_CHARS {
                inputs.push(format!("{}{}", c, d));
                inputs.push(format!("{} {} hello", c, d));
            }
            for word in words {
                for gap in gaps {
                    inputs.push(format!("{c}{word}{gap}{word}{c}"));
                    inputs.push(format!("{gap}{word}{c}{c}{gap}{c}{gap}{word}{gap}"));
                    inputs.push(format!("{c}{gap}{c}{word}{c}{gap}"));
                }
            }
        }
        inputs
    }

    #[tokio::test]
    async fn test_generated_inputs_lose_every_forbidden_character() {
        for input in generated_inputs() {
            let cleaned = sanitize(&input, &NoUsers).await;
            assert!(
                !cleaned.contains(FORBIDDEN_CHARS),
                "{:?} kept a forbidden character: {:?}",
                input,
                cleaned
            );
            assert_eq!(cleaned, cleaned.trim(), "{:?} left padding", input);
        }
    }

    #[tokio::test]
    async fn test_generated_inputs_are_idempotent() {
        for input in generated_inputs() {
            let once = sanitize(&input, &NoUsers).await;
            let twice = sanitize(&once, &NoUsers).await;
            assert_eq!(once, twice, "not idempotent for {:?}", input);
        }
    }
}
