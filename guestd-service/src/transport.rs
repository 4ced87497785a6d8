// SPDX-License-Identifier: GPL-3.0-only

//! Message framing on the host channel
//!
//! A frame is a 4-byte big-endian payload length followed by the payload.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest payload accepted by default
pub const DEFAULT_MAX_MESSAGE: u32 = 4 * 1024 * 1024;

#[derive(Debug)]
pub struct Transport<S> {
    stream: S,
    max_message: u32,
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, max_message: u32) -> Self {
        Self {
            stream,
            max_message,
        }
    }

    /// Read the next frame. `Ok(None)` means the host closed the channel
    /// between frames.
    pub async fn read_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut header = [0u8; 4];
        match self.stream.read_exact(&mut header).await {
            Ok(_) => {}
            Err(error) if error.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(error) => return Err(error),
        }

        let len = u32::from_be_bytes(header);
        if len > self.max_message {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "incoming message is too long ({len} bytes, limit {})",
                    self.max_message
                ),
            ));
        }

        let mut payload = vec![0u8; len as usize];
        self.stream.read_exact(&mut payload).await?;
        Ok(Some(payload))
    }

    pub async fn write_frame(&mut self, payload: &[u8]) -> io::Result<()> {
        let len = u32::try_from(payload.len())
            .ok()
            .filter(|len| *len <= self.max_message)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "reply is too long ({} bytes, limit {})",
                        payload.len(),
                        self.max_message
                    ),
                )
            })?;

        self.stream.write_all(&len.to_be_bytes()).await?;
        self.stream.write_all(payload).await?;
        self.stream.flush().await
    }
}
