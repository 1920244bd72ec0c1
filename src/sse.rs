//! Server-Sent Events framing: `id:`/`event:`/`retry:`/`data:` lines, blank-line
//! terminators, and a keep-alive comment-ping ticker.
//!
//! Extends the teacher's `sse.rs` (which only wrote bare `data:` lines for a
//! pre-built stream) with the full EventSource line set and a sink handlers push
//! events into, since this framework builds the stream incrementally rather than
//! wrapping an existing `Stream`.

use std::convert::Infallible;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use hyper::body::Frame;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt as _;

use crate::body::Body;

/// A handle for pushing SSE events into a response body that is already being
/// flushed to the client. Each send is delivered to the client as soon as the
/// channel receiver is polled; there is no internal buffering beyond the channel.
#[derive(Clone)]
pub struct SseSink {
    tx: mpsc::Sender<Bytes>,
}

impl SseSink {
    /// Writes one SSE event: optional `id:`/`event:`/`retry:` lines, then one or
    /// more `data:` lines (the payload is split on `\n`), then a blank line.
    pub async fn send_event(
        &self,
        data: &str,
        event: Option<&str>,
        id: Option<&str>,
        retry: Option<u64>,
    ) {
        let mut buf = BytesMut::new();
        if let Some(id) = id {
            buf.extend_from_slice(format!("id: {id}\n").as_bytes());
        }
        if let Some(event) = event {
            buf.extend_from_slice(format!("event: {event}\n").as_bytes());
        }
        if let Some(retry) = retry {
            buf.extend_from_slice(format!("retry: {retry}\n").as_bytes());
        }
        for line in data.split('\n') {
            buf.extend_from_slice(format!("data: {line}\n").as_bytes());
        }
        buf.extend_from_slice(b"\n");
        let _ = self.tx.send(buf.freeze()).await;
    }

    /// Writes an SSE comment line (`:text`), used for keep-alive pings.
    pub async fn send_comment(&self, text: &str) {
        let line = format!(":{text}\n\n");
        let _ = self.tx.send(Bytes::from(line)).await;
    }

    /// Ends the stream by dropping the sender; the response body completes.
    pub async fn close(self) {
        drop(self.tx);
    }
}

/// Builds the SSE response body plus a sink to write events into it.
///
/// If `keep_alive` is set, spawns a background task that periodically sends a
/// comment ping so intermediaries don't time out an idle connection.
pub fn channel(keep_alive: Option<Duration>) -> (Body, SseSink, Option<JoinHandle<()>>) {
    let (tx, rx) = mpsc::channel::<Bytes>(32);
    let sink = SseSink { tx: tx.clone() };

    let keep_alive_handle = keep_alive.map(|interval| {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // skip the immediate first tick
            loop {
                ticker.tick().await;
                if tx.send(Bytes::from_static(b":keep-alive\n\n")).await.is_err() {
                    break;
                }
            }
        })
    });

    let stream = tokio_stream::wrappers::ReceiverStream::new(rx)
        .map(|chunk| Ok::<_, Infallible>(Frame::data(chunk)));

    (Body::from_try_stream(stream), sink, keep_alive_handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_framing() {
        let (_, sink, _) = channel(None);
        // Exercised indirectly via response.rs integration tests; this confirms
        // the sink does not panic on a simple send with no live receiver pending
        // drop (channel buffered, capacity 32).
        sink.send_event("hello", Some("greeting"), Some("1"), Some(3000))
            .await;
    }
}
