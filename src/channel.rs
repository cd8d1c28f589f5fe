//! Length-prefixed JSON framing over a byte stream.
//!
//! Every frame is a 4-byte big-endian length followed by that many bytes of UTF-8 JSON. A
//! zero-length frame is the end-of-stream sentinel and reads back as `None`; it is distinct from the
//! peer closing the connection, which surfaces as [`RenderError::ConnectionTerminated`] when it
//! happens inside a frame.

use std::io::{ErrorKind, Read, Write};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::foundation::error::{RenderError, RenderResult};

/// Size of the big-endian length prefix.
pub const LEN_PREFIX_BYTES: usize = 4;

/// Largest payload accepted by [`read_frame`].
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Serialize `msg` and write it as one frame. `None` writes the end-of-stream sentinel.
pub fn write_frame<W, T>(w: &mut W, msg: Option<&T>) -> RenderResult<()>
where
    W: Write + ?Sized,
    T: Serialize + ?Sized,
{
    let payload = match msg {
        Some(msg) => serde_json::to_vec(msg)
            .map_err(|e| RenderError::serde(format!("encode control message: {e}")))?,
        None => Vec::new(),
    };
    if payload.len() > MAX_FRAME_BYTES {
        return Err(RenderError::protocol(format!(
            "control message of {} bytes exceeds the {MAX_FRAME_BYTES} byte limit",
            payload.len()
        )));
    }

    let mut buf = Vec::with_capacity(LEN_PREFIX_BYTES + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&payload);

    w.write_all(&buf)
        .and_then(|()| w.flush())
        .map_err(|e| RenderError::protocol(format!("write control frame: {e}")))
}

/// Read one frame and deserialize it. Returns `Ok(None)` for the end-of-stream sentinel.
pub fn read_frame<R, T>(r: &mut R) -> RenderResult<Option<T>>
where
    R: Read + ?Sized,
    T: DeserializeOwned,
{
    let mut prefix = [0u8; LEN_PREFIX_BYTES];
    read_exact(r, &mut prefix)?;
    let len = u32::from_be_bytes(prefix) as usize;
    if len == 0 {
        return Ok(None);
    }
    if len > MAX_FRAME_BYTES {
        return Err(RenderError::protocol(format!(
            "declared frame length {len} exceeds the {MAX_FRAME_BYTES} byte limit"
        )));
    }

    let mut payload = vec![0u8; len];
    read_exact(r, &mut payload)?;
    let text = std::str::from_utf8(&payload)
        .map_err(|e| RenderError::protocol(format!("control frame is not UTF-8: {e}")))?;
    serde_json::from_str(text)
        .map(Some)
        .map_err(|e| RenderError::serde(format!("decode control message: {e}")))
}

// `Read::read_exact` already loops over short reads; only the EOF mapping is ours.
fn read_exact<R: Read + ?Sized>(r: &mut R, buf: &mut [u8]) -> RenderResult<()> {
    r.read_exact(buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => RenderError::ConnectionTerminated,
        _ => RenderError::protocol(format!("read control frame: {e}")),
    })
}

/// Symmetrical message channel owning its underlying stream.
///
/// Dropping the channel drops the stream, which closes the connection on every exit path.
#[derive(Debug)]
pub struct MessageChannel<S> {
    stream: S,
}

impl<S: Read + Write> MessageChannel<S> {
    /// Wrap a connected stream.
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Send one message.
    pub fn send<T: Serialize + ?Sized>(&mut self, msg: &T) -> RenderResult<()> {
        write_frame(&mut self.stream, Some(msg))
    }

    /// Send the end-of-stream sentinel.
    pub fn send_end(&mut self) -> RenderResult<()> {
        write_frame::<_, ()>(&mut self.stream, None)
    }

    /// Block until the next message arrives. `Ok(None)` means the peer sent the sentinel.
    pub fn recv<T: DeserializeOwned>(&mut self) -> RenderResult<Option<T>> {
        read_frame(&mut self.stream)
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Release the underlying stream without closing it.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

#[cfg(test)]
#[path = "../tests/unit/channel/channel.rs"]
mod tests;
