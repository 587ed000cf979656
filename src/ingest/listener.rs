//! TCP transport for measurement messages
//!
//! Reporting devices connect and write one JSON message per frame. Frames are
//! delimited by `\n` or `\r`, which also covers the scale process that prints
//! `\r{json}` repeatedly on one terminal line.

use crate::ingest::sample_ingest::SampleIngest;
use log::{debug, info, warn};
use std::net::SocketAddr;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

const READ_BUFFER_BYTES: usize = 4096;

/// Splits a byte stream into text frames
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    max_frame_bytes: usize,
    discarding: bool,
}

impl FrameDecoder {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_frame_bytes,
            discarding: false,
        }
    }

    /// Feed received bytes and return every frame they complete
    ///
    /// Empty frames are skipped. A frame longer than the limit is dropped
    /// up to its next delimiter.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut frames = Vec::new();

        for &byte in bytes {
            if byte == b'\n' || byte == b'\r' {
                if self.discarding {
                    self.discarding = false;
                } else if let Some(frame) = self.take_frame() {
                    frames.push(frame);
                }
                self.buffer.clear();
                continue;
            }

            if self.discarding {
                continue;
            }
            if self.buffer.len() >= self.max_frame_bytes {
                warn!(
                    "Dropping frame longer than {} bytes",
                    self.max_frame_bytes
                );
                self.buffer.clear();
                self.discarding = true;
                continue;
            }
            self.buffer.push(byte);
        }

        frames
    }

    /// Flush the trailing frame once the stream has ended
    pub fn finish(&mut self) -> Option<String> {
        let frame = if self.discarding {
            None
        } else {
            self.take_frame()
        };
        self.buffer.clear();
        self.discarding = false;
        frame
    }

    fn take_frame(&self) -> Option<String> {
        let text = String::from_utf8_lossy(&self.buffer);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

/// Accept connections until `shutdown` flips to `true`
///
/// Each connection is served by its own task; malformed frames are rejected
/// by [`SampleIngest`] and never end the connection.
pub async fn serve(
    listener: TcpListener,
    ingest: SampleIngest,
    max_frame_bytes: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    if let Ok(addr) = listener.local_addr() {
        info!("Listening for samples on {}", addr);
    }

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let ingest = ingest.clone();
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        handle_connection(stream, peer, ingest, max_frame_bytes, shutdown).await;
                    });
                }
                Err(e) => warn!("Failed to accept connection: {}", e),
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("Sample listener shutting down");
                    break;
                }
            }
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    ingest: SampleIngest,
    max_frame_bytes: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!("Sample source connected: {}", peer);
    let mut decoder = FrameDecoder::new(max_frame_bytes);
    let mut buf = [0u8; READ_BUFFER_BYTES];

    loop {
        let read = tokio::select! {
            read = stream.read(&mut buf) => read,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        };

        match read {
            Ok(0) => {
                if let Some(frame) = decoder.finish() {
                    let _ = ingest.ingest(&frame).await;
                }
                break;
            }
            Ok(n) => {
                for frame in decoder.push(&buf[..n]) {
                    // Rejections are already logged by ingest
                    let _ = ingest.ingest(&frame).await;
                }
            }
            Err(e) => {
                warn!("Read from {} failed: {}", peer, e);
                break;
            }
        }
    }

    debug!("Sample source disconnected: {}", peer);
}
