//! Fingerprint generation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::{CompletionRequest, Message, ResponseFormat};

/// Hex SHA-256 of a request's normalized content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
    /// Short prefix for log lines.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(12) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Fingerprint {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
impl From<String> for Fingerprint {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Case-fold and collapse every whitespace run into a single space.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct FingerprintGenerator {
    include_roles: bool,
    salt: Option<String>,
}

impl FingerprintGenerator {
    pub fn new() -> Self {
        Self {
            include_roles: true,
            salt: None,
        }
    }
    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = Some(salt.into());
        self
    }
    /// When disabled, a system prompt and a user turn with the same text collide.
    pub fn with_roles(mut self, include: bool) -> Self {
        self.include_roles = include;
        self
    }

    /// Canonical normalized text of a message list, one line per message.
    pub fn canonical_text(&self, messages: &[Message]) -> String {
        messages
            .iter()
            .map(|m| {
                if self.include_roles {
                    format!("{}:{}", m.role.as_str(), normalize(&m.content))
                } else {
                    normalize(&m.content)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn generate(&self, messages: &[Message], format: ResponseFormat) -> Fingerprint {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_text(messages).as_bytes());
        hasher.update(b"\nformat:");
        hasher.update(format.as_str().as_bytes());
        if let Some(ref s) = self.salt {
            hasher.update(b"\nsalt:");
            hasher.update(s.as_bytes());
        }
        let hash: String = hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        Fingerprint::new(hash)
    }

    /// The user id and scheduling fields do not take part in the fingerprint.
    pub fn fingerprint(&self, request: &CompletionRequest) -> Fingerprint {
        self.generate(&request.messages, request.response_format)
    }
}

impl Default for FingerprintGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Priority;

    #[test]
    fn test_normalize_collapses_case_and_whitespace() {
        assert_eq!(
            normalize("  What are\tsome   HEALTHY\nsnacks? "),
            "what are some healthy snacks?"
        );
    }

    #[test]
    fn test_equivalent_requests_share_fingerprint() {
        let g = FingerprintGenerator::new();
        let a = CompletionRequest::new("u1", vec![Message::user("What are  some healthy snacks?")]);
        let b = CompletionRequest::new("u2", vec![Message::user("what are some HEALTHY snacks?")])
            .with_priority(Priority::Low);
        assert_eq!(g.fingerprint(&a), g.fingerprint(&b));
        assert_eq!(g.fingerprint(&a).as_str().len(), 64);
    }

    #[test]
    fn test_format_and_role_change_fingerprint() {
        let g = FingerprintGenerator::new();
        let msgs = vec![Message::user("hello")];
        assert_ne!(
            g.generate(&msgs, ResponseFormat::Text),
            g.generate(&msgs, ResponseFormat::Json)
        );
        assert_ne!(
            g.generate(&[Message::system("hello")], ResponseFormat::Text),
            g.generate(&msgs, ResponseFormat::Text)
        );
        let roleless = FingerprintGenerator::new().with_roles(false);
        assert_eq!(
            roleless.generate(&[Message::system("hello")], ResponseFormat::Text),
            roleless.generate(&msgs, ResponseFormat::Text)
        );
    }

    #[test]
    fn test_salt_changes_fingerprint() {
        let msgs = vec![Message::user("hello")];
        let plain = FingerprintGenerator::new().generate(&msgs, ResponseFormat::Text);
        let salted = FingerprintGenerator::new()
            .with_salt("v2")
            .generate(&msgs, ResponseFormat::Text);
        assert_ne!(plain, salted);
        assert_eq!(plain.short().len(), 12);
    }

    #[test]
    fn test_short_prefix_respects_char_boundaries() {
        let hex = Fingerprint::from("0123456789abcdef");
        assert_eq!(hex.short(), "0123456789ab");
        assert_eq!(Fingerprint::from("abc").short(), "abc");

        let wide = Fingerprint::from("指纹指纹指纹指纹指纹指纹指纹");
        assert_eq!(wide.short(), "指纹指纹指纹指纹指纹指纹");
        assert_eq!(Fingerprint::from("é").short(), "é");
    }
}
