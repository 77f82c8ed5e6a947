//! Encoding of the `data` field of key signals.
//!
//! Two payload shapes exist in the wild: the bare clip key (`"snare"`) and a
//! structured object (`{"userName": "...", "keyCode": "d"}`). A third,
//! older shape carries the raw key character. Senders write one configured
//! shape, receivers accept all of them.

use serde::{Deserialize, Serialize};

use crate::sound::{clip_for_key, key_for_clip, Clip};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SignalEncoding {
    /// `data` is the clip key.
    #[default]
    ClipKey,
    /// `data` is a JSON object carrying the sender name and the key pressed.
    Structured,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KeySignalPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    pub key_code: String,
}

pub fn encode(encoding: SignalEncoding, clip: Clip, user_name: &str) -> String {
    match encoding {
        SignalEncoding::ClipKey => clip.key().to_string(),
        SignalEncoding::Structured => {
            let key_code = key_for_clip(clip)
                .map(String::from)
                .unwrap_or_else(|| clip.key().to_string());
            let payload = KeySignalPayload {
                user_name: Some(user_name.to_string()),
                key_code,
            };
            // Serializing a struct of strings cannot fail.
            serde_json::to_string(&payload).unwrap_or_else(|_| clip.key().to_string())
        }
    }
}

/// Decoded key signal: the clip and, if the sender said so, who pressed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSignal {
    pub clip: Clip,
    pub user_name: Option<String>,
}

pub fn decode(data: &str) -> Option<DecodedSignal> {
    let trimmed = data.trim();
    if trimmed.starts_with('{') {
        let payload: KeySignalPayload = serde_json::from_str(trimmed).ok()?;
        return resolve(&payload.key_code).map(|clip| DecodedSignal {
            clip,
            user_name: payload.user_name,
        });
    }
    resolve(trimmed).map(|clip| DecodedSignal {
        clip,
        user_name: None,
    })
}

fn resolve(token: &str) -> Option<Clip> {
    token.parse::<Clip>().ok().or_else(|| clip_for_key(token))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_key_encoding_is_bare() {
        assert_eq!(encode(SignalEncoding::ClipKey, Clip::Snare, "alice"), "snare");
    }

    #[test]
    fn structured_encoding_carries_user_and_key() {
        let data = encode(SignalEncoding::Structured, Clip::Snare, "alice");
        let value: serde_json::Value = serde_json::from_str(&data).unwrap();
        assert_eq!(value, serde_json::json!({ "userName": "alice", "keyCode": "d" }));
        assert_eq!(
            decode(&data),
            Some(DecodedSignal {
                clip: Clip::Snare,
                user_name: Some("alice".into()),
            })
        );
    }

    #[test]
    fn decodes_every_variant() {
        assert_eq!(decode("drum_1").unwrap().clip, Clip::Drum1);
        assert_eq!(decode("q").unwrap().clip, Clip::Drum1);
        assert_eq!(decode("S").unwrap().clip, Clip::Drum5);
        assert_eq!(decode(r#"{"keyCode":"snare"}"#).unwrap().clip, Clip::Snare);
        assert_eq!(
            decode(r#"{"userName":"bob","keyCode":"W"}"#),
            Some(DecodedSignal {
                clip: Clip::Drum2,
                user_name: Some("bob".into()),
            })
        );
    }

    #[test]
    fn rejects_unknown_payloads() {
        assert_eq!(decode("cowbell"), None);
        assert_eq!(decode("x"), None);
        assert_eq!(decode(""), None);
        assert_eq!(decode(r#"{"userName":"bob"}"#), None);
        assert_eq!(decode(r#"{"keyCode":"z"}"#), None);
        assert_eq!(decode("{not json"), None);
    }

    #[test]
    fn encoding_names_in_config() {
        let e: SignalEncoding = serde_json::from_str(r#""structured""#).unwrap();
        assert_eq!(e, SignalEncoding::Structured);
        let e: SignalEncoding = serde_json::from_str(r#""clip-key""#).unwrap();
        assert_eq!(e, SignalEncoding::ClipKey);
    }
}
