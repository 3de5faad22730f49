//! Signaling Façade
//!
//! Produces session descriptions shaped like a real WebRTC handshake
//! without negotiating any media. Nothing here can fail from the caller's
//! point of view: unparseable input falls back to a fixed default answer.

mod sdp;

pub use sdp::{answer_for, default_answer, local_offer, media_sections, MediaKind};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a peer description is rejected before falling back
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalingError {
    #[error("Description contains no media sections")]
    NoMediaSections,

    #[error("Malformed media line {line}: {content}")]
    MalformedMediaLine { line: usize, content: String },
}

/// Session description type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// Description as exchanged over the HTTP signaling endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    /// Build the answer for an optional peer offer
    pub fn answer(offer_sdp: Option<&str>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: answer_for(offer_sdp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_serializes_with_type_field() {
        let answer = SessionDescription::answer(None);
        let json = serde_json::to_value(&answer).unwrap();
        assert_eq!(json["type"], "answer");
        assert!(json["sdp"].as_str().unwrap().starts_with("v=0\r\n"));
    }

    #[test]
    fn test_offer_deserializes() {
        let desc: SessionDescription =
            serde_json::from_str(r#"{"type":"offer","sdp":"v=0\r\n"}"#).unwrap();
        assert_eq!(desc.kind, SdpType::Offer);
        assert_eq!(desc.sdp, "v=0\r\n");
    }
}
