//! Session description synthesis

use crate::SignalingError;
use std::fmt::Write;
use tracing::{debug, warn};

const SESSION_ORIGIN: &str = "o=- 1234567890 2 IN IP4 127.0.0.1";
const ANSWER_UFRAG: &str = "mock123456789";
const ANSWER_PWD: &str = "mockpassword123456789012345678901234567890";
const LOCAL_UFRAG: &str = "real";
const LOCAL_PWD: &str = "realsource123456789012345678901234567890";
const FINGERPRINT: &str = "sha-256 12:34:56:78:9A:BC:DE:F0:12:34:56:78:9A:BC:DE:F0:\
12:34:56:78:9A:BC:DE:F0:12:34:56:78:9A:BC:DE:F0";
const HOST_CANDIDATE: &str = "a=candidate:1 1 UDP 2122252543 127.0.0.1 9 typ host";

/// Media section kind taken from an `m=` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
    Other(String),
}

impl MediaKind {
    fn from_token(token: &str) -> Self {
        match token {
            "video" => MediaKind::Video,
            "audio" => MediaKind::Audio,
            other => MediaKind::Other(other.to_string()),
        }
    }
}

/// Extract the ordered media sections of a peer description.
///
/// Accepts CRLF or bare LF line endings.
pub fn media_sections(sdp: &str) -> Result<Vec<MediaKind>, SignalingError> {
    let mut sections = Vec::new();

    for (index, line) in sdp.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        let Some(media) = line.strip_prefix("m=") else {
            continue;
        };

        // m=<media> <port> <proto> <fmt> ...
        let fields: Vec<&str> = media.split_whitespace().collect();
        if fields.len() < 4 {
            return Err(SignalingError::MalformedMediaLine {
                line: index + 1,
                content: line.to_string(),
            });
        }
        sections.push(MediaKind::from_token(fields[0]));
    }

    if sections.is_empty() {
        return Err(SignalingError::NoMediaSections);
    }
    Ok(sections)
}

/// Answer mirroring the peer's media sections, or the default answer when
/// there is no usable peer description.
pub fn answer_for(offer_sdp: Option<&str>) -> String {
    let Some(offer) = offer_sdp.filter(|sdp| !sdp.trim().is_empty()) else {
        debug!("No peer description, using default answer");
        return default_answer();
    };

    match media_sections(offer) {
        Ok(sections) => {
            debug!("Answering {} media sections", sections.len());
            build_description(&sections, ANSWER_UFRAG, ANSWER_PWD)
        }
        Err(e) => {
            warn!("Unusable peer description ({}), using default answer", e);
            default_answer()
        }
    }
}

/// Fixed answer with a single video section
pub fn default_answer() -> String {
    build_description(&[MediaKind::Video], ANSWER_UFRAG, ANSWER_PWD)
}

/// Local description announced when the camera goes live
pub fn local_offer() -> String {
    build_description(&[MediaKind::Video], LOCAL_UFRAG, LOCAL_PWD)
}

fn build_description(sections: &[MediaKind], ufrag: &str, pwd: &str) -> String {
    let mut sdp = String::with_capacity(512 + sections.len() * 256);
    let mids: Vec<String> = (0..sections.len()).map(|i| i.to_string()).collect();

    push_line(&mut sdp, "v=0");
    push_line(&mut sdp, SESSION_ORIGIN);
    push_line(&mut sdp, "s=-");
    push_line(&mut sdp, "t=0 0");
    push_line(&mut sdp, &format!("a=group:BUNDLE {}", mids.join(" ")));
    push_line(&mut sdp, "a=msid-semantic: WMS");
    push_line(&mut sdp, &format!("a=ice-ufrag:{}", ufrag));
    push_line(&mut sdp, &format!("a=ice-pwd:{}", pwd));
    push_line(&mut sdp, "a=setup:passive");
    push_line(&mut sdp, &format!("a=fingerprint:{}", FINGERPRINT));

    for (mid, kind) in sections.iter().enumerate() {
        push_media(&mut sdp, mid, kind);
    }

    push_line(&mut sdp, HOST_CANDIDATE);
    sdp
}

fn push_media(sdp: &mut String, mid: usize, kind: &MediaKind) {
    match kind {
        MediaKind::Video => {
            push_line(sdp, "m=video 9 UDP/TLS/RTP/SAVPF 96");
            push_line(sdp, "c=IN IP4 0.0.0.0");
            push_line(sdp, &format!("a=mid:{}", mid));
            push_line(sdp, "a=sendonly");
            push_line(sdp, "a=rtcp-mux");
            push_line(sdp, "a=rtpmap:96 H264/90000");
            push_line(
                sdp,
                "a=fmtp:96 level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f",
            );
            push_line(sdp, "a=rtcp-fb:96 nack");
            push_line(sdp, "a=rtcp-fb:96 nack pli");
            push_line(sdp, "a=rtcp-fb:96 ccm fir");
        }
        MediaKind::Audio => {
            push_line(sdp, "m=audio 9 UDP/TLS/RTP/SAVPF 111");
            push_line(sdp, "c=IN IP4 0.0.0.0");
            push_line(sdp, &format!("a=mid:{}", mid));
            push_line(sdp, "a=inactive");
            push_line(sdp, "a=rtcp-mux");
            push_line(sdp, "a=rtpmap:111 opus/48000/2");
        }
        MediaKind::Other(media) => {
            // Port 0 rejects the section while keeping its position
            push_line(sdp, &format!("m={} 0 UDP/TLS/RTP/SAVPF 0", media));
            push_line(sdp, "c=IN IP4 0.0.0.0");
            push_line(sdp, &format!("a=mid:{}", mid));
            push_line(sdp, "a=inactive");
        }
    }
}

fn push_line(sdp: &mut String, line: &str) {
    // Writing to a String cannot fail
    let _ = write!(sdp, "{}\r\n", line);
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const BROWSER_OFFER: &str = "v=0\r\n\
o=- 4611731400430051336 2 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
a=group:BUNDLE 0 1\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111 63\r\n\
c=IN IP4 0.0.0.0\r\n\
a=mid:0\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 96 97\r\n\
c=IN IP4 0.0.0.0\r\n\
a=mid:1\r\n";

    fn count_prefix(sdp: &str, prefix: &str) -> usize {
        sdp.split("\r\n").filter(|l| l.starts_with(prefix)).count()
    }

    #[test]
    fn test_media_sections_in_order() {
        let sections = media_sections(BROWSER_OFFER).unwrap();
        assert_eq!(sections, vec![MediaKind::Audio, MediaKind::Video]);
    }

    #[test]
    fn test_answer_mirrors_sections() {
        let answer = answer_for(Some(BROWSER_OFFER));
        let media: Vec<&str> = answer
            .split("\r\n")
            .filter(|l| l.starts_with("m="))
            .collect();
        assert_eq!(media.len(), 2);
        assert!(media[0].starts_with("m=audio"));
        assert!(media[1].starts_with("m=video"));
        assert!(answer.contains("a=group:BUNDLE 0 1\r\n"));
        assert!(answer.contains("a=mid:1\r\n"));
    }

    #[test]
    fn test_single_video_line_answer() {
        let answer = answer_for(Some("m=video 9 UDP/TLS/RTP/SAVPF 96"));
        assert_eq!(count_prefix(&answer, "m=video"), 1);
        assert_eq!(count_prefix(&answer, "m="), 1);
    }

    #[test]
    fn test_other_media_is_inactive() {
        let offer = "v=0\r\nm=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n";
        let answer = answer_for(Some(offer));
        assert!(answer.contains("m=application 0 "));
        assert!(answer.contains("a=inactive\r\n"));
    }

    #[test]
    fn test_fallbacks() {
        let default = default_answer();
        assert_eq!(answer_for(None), default);
        assert_eq!(answer_for(Some("")), default);
        assert_eq!(answer_for(Some("not an sdp")), default);
        assert_eq!(answer_for(Some("v=0\r\nm=video\r\n")), default);
        assert_eq!(count_prefix(&default, "m=video"), 1);
        assert!(default.contains("a=fingerprint:sha-256 "));
    }

    #[test]
    fn test_malformed_line_reported() {
        let err = media_sections("v=0\nm=video 9\n").unwrap_err();
        assert_eq!(
            err,
            SignalingError::MalformedMediaLine {
                line: 2,
                content: "m=video 9".to_string()
            }
        );
    }

    #[test]
    fn test_local_offer_has_one_video_section() {
        let offer = local_offer();
        assert!(offer.starts_with("v=0\r\n"));
        assert_eq!(count_prefix(&offer, "m=video"), 1);
        assert!(offer.contains("a=ice-ufrag:real\r\n"));
        assert!(offer.ends_with("typ host\r\n"));
    }

    proptest! {
        #[test]
        fn prop_answer_never_empty(input in ".*") {
            let answer = answer_for(Some(&input));
            prop_assert!(answer.starts_with("v=0\r\n"));
            prop_assert!(count_prefix(&answer, "m=") >= 1);
        }

        #[test]
        fn prop_section_count_preserved(kinds in prop::collection::vec(0u8..3, 1..6)) {
            let mut offer = String::from("v=0\r\n");
            for kind in &kinds {
                let media = match kind { 0 => "video", 1 => "audio", _ => "text" };
                offer.push_str(&format!("m={} 9 UDP/TLS/RTP/SAVPF 96\r\n", media));
            }
            let answer = answer_for(Some(&offer));
            prop_assert_eq!(count_prefix(&answer, "m="), kinds.len());
        }
    }
}
