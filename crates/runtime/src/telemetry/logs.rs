//! Per-subscriber log line producer.
//!
//! Bollard's hijacked log streaming has proven flaky for long-lived follows,
//! so the tailer speaks the engine's socket protocol directly: it writes a
//! raw HTTP/1.1 request for `/containers/<name>/logs`, decodes the chunked
//! transfer encoding, and feeds the bytes through the frame demuxer (or the
//! raw line assembler for TTY containers). Cancelling the token closes the
//! socket; a closed socket terminates the producer cleanly.

use async_stream::stream;
use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

use super::frame::{FrameParser, LineAssembler};
use super::line::{format_log_line, payload_lines};
use crate::docker::client::RuntimeError;

/// How many historical lines the engine replays before following.
const TAIL_LINES: u32 = 500;

/// Open a cold log producer for one subscriber. Lines are normalized
/// (timestamp compression, ANSI strip) and empties dropped.
pub fn tail_lines(
    socket_path: String,
    container: String,
    tty: bool,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<String, RuntimeError>> {
    stream! {
        let mut body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            negotiated = negotiate(&socket_path, &container) => match negotiated {
                Ok(body) => body,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            },
        };

        let mut frames = FrameParser::new();
        let mut raw_lines = LineAssembler::new();

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                chunk = body.next_chunk() => match chunk {
                    Ok(Some(chunk)) => chunk,
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                },
            };

            if tty {
                for line in raw_lines.feed(&chunk) {
                    let formatted = format_log_line(&String::from_utf8_lossy(&line));
                    if !formatted.is_empty() {
                        yield Ok(formatted);
                    }
                }
            } else {
                for payload in frames.feed(&chunk) {
                    for line in payload_lines(&payload) {
                        yield Ok(line);
                    }
                }
            }
        }

        if tty {
            if let Some(tail) = raw_lines.finish() {
                let formatted = format_log_line(&String::from_utf8_lossy(&tail));
                if !formatted.is_empty() {
                    yield Ok(formatted);
                }
            }
        }
    }
}

enum BodyKind {
    Chunked,
    Length(u64),
    UntilEof,
}

struct HttpBody {
    reader: BufReader<UnixStream>,
    kind: BodyKind,
    done: bool,
}

impl HttpBody {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, RuntimeError> {
        if self.done {
            return Ok(None);
        }
        match self.kind {
            BodyKind::Chunked => {
                let mut size_line = String::new();
                let read = self.reader.read_line(&mut size_line).await?;
                if read == 0 {
                    self.done = true;
                    return Ok(None);
                }
                let size_str = size_line.trim().split(';').next().unwrap_or("");
                let size = usize::from_str_radix(size_str, 16).map_err(|_| {
                    RuntimeError::Protocol(format!("bad chunk size {:?}", size_line.trim()))
                })?;
                if size == 0 {
                    // Terminator chunk; consume the final CRLF if present.
                    let mut end = String::new();
                    let _ = self.reader.read_line(&mut end).await;
                    self.done = true;
                    return Ok(None);
                }
                // Chunk payload plus its trailing CRLF.
                let mut buf = vec![0u8; size + 2];
                self.reader.read_exact(&mut buf).await?;
                buf.truncate(size);
                Ok(Some(Bytes::from(buf)))
            }
            BodyKind::Length(ref mut remaining) => {
                if *remaining == 0 {
                    self.done = true;
                    return Ok(None);
                }
                let want = (*remaining).min(8192) as usize;
                let mut buf = vec![0u8; want];
                let n = self.reader.read(&mut buf).await?;
                if n == 0 {
                    self.done = true;
                    return Ok(None);
                }
                *remaining -= n as u64;
                buf.truncate(n);
                Ok(Some(Bytes::from(buf)))
            }
            BodyKind::UntilEof => {
                let mut buf = vec![0u8; 8192];
                let n = self.reader.read(&mut buf).await?;
                if n == 0 {
                    self.done = true;
                    return Ok(None);
                }
                buf.truncate(n);
                Ok(Some(Bytes::from(buf)))
            }
        }
    }
}

/// Connect, send the logs request, and parse the response head.
async fn negotiate(socket_path: &str, container: &str) -> Result<HttpBody, RuntimeError> {
    let mut stream = UnixStream::connect(socket_path).await?;

    let request = format!(
        "GET /containers/{}/logs?follow=1&stdout=1&stderr=1&timestamps=1&tail={} HTTP/1.1\r\n\
         Host: docker\r\n\
         Connection: keep-alive\r\n\
         \r\n",
        container, TAIL_LINES
    );
    stream.write_all(request.as_bytes()).await?;

    let mut reader = BufReader::new(stream);

    let mut status_line = String::new();
    reader.read_line(&mut status_line).await?;
    let code = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| RuntimeError::Protocol(format!("bad status line {:?}", status_line.trim())))?;

    let mut chunked = false;
    let mut content_length: Option<u64> = None;
    loop {
        let mut header = String::new();
        let read = reader.read_line(&mut header).await?;
        if read == 0 {
            return Err(RuntimeError::StreamClosed);
        }
        let header = header.trim();
        if header.is_empty() {
            break;
        }
        if let Some((key, value)) = header.split_once(':') {
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();
            if key == "transfer-encoding" && value.to_ascii_lowercase().contains("chunked") {
                chunked = true;
            } else if key == "content-length" {
                content_length = value.parse().ok();
            }
        }
    }

    match code {
        200 => {}
        404 => return Err(RuntimeError::ContainerNotFound(container.to_string())),
        other => {
            return Err(RuntimeError::Protocol(format!(
                "logs request for {} returned HTTP {}",
                container, other
            )))
        }
    }

    let kind = if chunked {
        BodyKind::Chunked
    } else if let Some(len) = content_length {
        BodyKind::Length(len)
    } else {
        BodyKind::UntilEof
    };

    Ok(HttpBody {
        reader,
        kind,
        done: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut out = vec![1u8, 0, 0, 0];
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn chunked_response(body_chunks: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(
            b"HTTP/1.1 200 OK\r\nContent-Type: application/vnd.docker.raw-stream\r\n\
              Transfer-Encoding: chunked\r\n\r\n",
        );
        for chunk in body_chunks {
            out.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
            out.extend_from_slice(chunk);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"0\r\n\r\n");
        out
    }

    /// Serve one canned HTTP response over a socketpair and tail it.
    async fn tail_canned(response: Vec<u8>, tty: bool) -> Vec<Result<String, RuntimeError>> {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static SEQ: AtomicUsize = AtomicUsize::new(0);
        let dir = std::env::temp_dir().join(format!(
            "panel-logs-test-{}-{}",
            std::process::id(),
            SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let sock = dir.join("docker.sock");
        let listener = tokio::net::UnixListener::bind(&sock).unwrap();

        let server = tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            // Drain the request head before answering.
            let mut buf = [0u8; 1024];
            let _ = conn.read(&mut buf).await.unwrap();
            conn.write_all(&response).await.unwrap();
            conn.shutdown().await.unwrap();
        });

        let cancel = CancellationToken::new();
        let stream = tail_lines(
            sock.to_string_lossy().into_owned(),
            "game-panel-mc".to_string(),
            tty,
            cancel,
        );
        tokio::pin!(stream);
        let mut out = Vec::new();
        while let Some(item) = stream.next().await {
            out.push(item);
        }
        server.await.unwrap();
        let _ = std::fs::remove_dir_all(&dir);
        out
    }

    #[tokio::test]
    async fn mux_frames_across_chunks_emit_in_order() {
        let mut body = frame(b"Hello");
        body.extend_from_slice(&frame(b"World"));
        // Cut the byte stream at an awkward place inside the second header.
        let split = 8 + 5 + 3;
        let response = chunked_response(&[&body[..split], &body[split..]]);

        let lines: Vec<String> = tail_canned(response, false)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(lines, vec!["Hello".to_string(), "World".to_string()]);
    }

    #[tokio::test]
    async fn tty_body_is_split_on_newlines() {
        let response = chunked_response(&[b"one\ntw", b"o\nthree"]);
        let lines: Vec<String> = tail_canned(response, true)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(
            lines,
            vec!["one".to_string(), "two".to_string(), "three".to_string()]
        );
    }

    #[tokio::test]
    async fn missing_container_maps_to_not_found() {
        let response =
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n".to_vec();
        let out = tail_canned(response, false).await;
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Err(RuntimeError::ContainerNotFound(_))));
    }

    #[tokio::test]
    async fn cancelled_before_connect_yields_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let stream = tail_lines(
            "/nonexistent/docker.sock".to_string(),
            "game-panel-mc".to_string(),
            false,
            cancel,
        );
        tokio::pin!(stream);
        assert!(stream.next().await.is_none());
    }
}
