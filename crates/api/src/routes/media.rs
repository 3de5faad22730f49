//! Media Routes

use async_stream::stream;
use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use bytes::{BufMut, Bytes, BytesMut};
use metrics::{counter, gauge};
use std::convert::Infallible;
use tracing::{debug, info};

use crate::{ApiError, SharedState};

/// Multipart boundary used by `/stream`
pub const BOUNDARY: &str = "frame";

/// Latest frame as a JPEG
pub async fn snapshot(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let frame = state
        .read()
        .await
        .frame_store()
        .and_then(|store| store.latest())
        .ok_or_else(|| ApiError::NotFound("No camera frame available".to_string()))?;

    counter!("securecam_snapshots_served_total").increment(1);
    debug!("Serving snapshot #{} ({} bytes)", frame.sequence, frame.len());

    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        frame.data.clone(),
    )
        .into_response())
}

/// One multipart part carrying a JPEG
pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    let header = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        BOUNDARY,
        jpeg.len()
    );
    let mut part = BytesMut::with_capacity(header.len() + jpeg.len() + 2);
    part.put_slice(header.as_bytes());
    part.put_slice(jpeg);
    part.put_slice(b"\r\n");
    part.freeze()
}

/// Counts a connected stream client for as long as it lives
struct StreamClient;

impl StreamClient {
    fn connect() -> Self {
        gauge!("securecam_stream_clients").increment(1.0);
        info!("Stream client connected");
        StreamClient
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        gauge!("securecam_stream_clients").decrement(1.0);
        info!("Stream client disconnected");
    }
}

/// Continuous multipart JPEG stream.
///
/// Ends when the client goes away (the body is dropped) or the server shuts down.
pub async fn stream(State(state): State<SharedState>) -> Response {
    let (mut shutdown, interval, retry) = {
        let state = state.read().await;
        (
            state.shutdown.clone(),
            state.config.stream_interval(),
            state.config.stream_retry(),
        )
    };
    let client = StreamClient::connect();

    let parts = stream! {
        let _client = client;
        let mut sent = 0u64;

        loop {
            let stopping = *shutdown.borrow();
            if stopping {
                break;
            }

            // Looked up every time so a restarted pipeline is picked up
            let frame = state
                .read()
                .await
                .frame_store()
                .and_then(|store| store.latest());

            let wait = match frame {
                Some(frame) => {
                    yield Ok::<Bytes, Infallible>(multipart_part(&frame.data));
                    sent += 1;
                    if sent % 30 == 0 {
                        debug!("Stream sent {} frames", sent);
                    }
                    interval
                }
                None => retry,
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
    };

    (
        [
            (
                header::CONTENT_TYPE,
                "multipart/x-mixed-replace; boundary=frame",
            ),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "close"),
        ],
        Body::from_stream(parts),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multipart_part_framing() {
        let part = multipart_part(b"JPEG");
        assert_eq!(
            part.as_ref(),
            b"--frame\r\nContent-Type: image/jpeg\r\nContent-Length: 4\r\n\r\nJPEG\r\n"
        );
    }
}
