//! Signaling Routes
//!
//! Bodies are taken raw so that malformed JSON still gets an answer.

use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use signaling::SessionDescription;
use tracing::debug;

/// Loosely parsed offer body
#[derive(Debug, Deserialize)]
struct OfferBody {
    sdp: Option<String>,
}

/// Acknowledgment for trickled candidates
#[derive(Debug, Serialize)]
pub struct IceResponse {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub message: &'static str,
}

/// Answer a peer offer. Always succeeds.
pub async fn offer(body: Bytes) -> Json<SessionDescription> {
    let offer_sdp = serde_json::from_slice::<OfferBody>(&body)
        .ok()
        .and_then(|offer| offer.sdp);

    match &offer_sdp {
        Some(sdp) => debug!("Offer received ({} bytes of SDP)", sdp.len()),
        None if body.is_empty() => debug!("Offer received without body"),
        None => debug!("Offer body has no usable SDP"),
    }

    Json(SessionDescription::answer(offer_sdp.as_deref()))
}

/// Accept a trickled candidate
pub async fn ice_candidate(body: Bytes) -> Json<IceResponse> {
    debug!("ICE candidate received ({} bytes)", body.len());
    Json(IceResponse {
        kind: "success",
        message: "ICE candidate acknowledged",
    })
}
