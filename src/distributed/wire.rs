//! Newline-delimited JSON framing for [`ChannelMessage`]s over any async
//! byte stream.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult, DistributedError};

use super::{ChannelEndpoint, ChannelMessage};

pub const MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;

/// Read one message.
///
/// # Errors
///
/// Returns [`DistributedError::ConnectionClosed`] at end of stream, or an
/// error if the frame is oversized, not UTF-8 or not a valid message.
pub async fn read_message<R>(reader: &mut R) -> AppResult<ChannelMessage>
where
    R: AsyncBufRead + Unpin,
{
    let mut buffer: Vec<u8> = Vec::with_capacity(1024);
    let bytes = reader.read_until(b'\n', &mut buffer).await.map_err(|err| {
        AppError::distributed(DistributedError::Io {
            context: "read channel message",
            source: err,
        })
    })?;
    if bytes == 0 {
        return Err(AppError::distributed(DistributedError::ConnectionClosed));
    }
    if buffer.len() > MAX_MESSAGE_BYTES {
        return Err(AppError::distributed(
            DistributedError::WireMessageTooLarge {
                max_bytes: MAX_MESSAGE_BYTES,
            },
        ));
    }
    if buffer.ends_with(b"\n") {
        buffer.pop();
        if buffer.ends_with(b"\r") {
            buffer.pop();
        }
    }
    let line = std::str::from_utf8(&buffer).map_err(|err| {
        AppError::distributed(DistributedError::WireMessageInvalidUtf8 { source: err })
    })?;
    serde_json::from_str::<ChannelMessage>(line).map_err(|err| {
        AppError::distributed(DistributedError::Deserialize {
            context: "channel message",
            source: err,
        })
    })
}

/// Write one message followed by a newline.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub async fn send_message<W>(writer: &mut W, message: &ChannelMessage) -> AppResult<()>
where
    W: AsyncWrite + Unpin,
{
    let mut payload = serde_json::to_string(message).map_err(|err| {
        AppError::distributed(DistributedError::Serialize {
            context: "channel message",
            source: err,
        })
    })?;
    payload.push('\n');
    writer.write_all(payload.as_bytes()).await.map_err(|err| {
        AppError::distributed(DistributedError::Io {
            context: "send channel message",
            source: err,
        })
    })?;
    writer.flush().await.map_err(|err| {
        AppError::distributed(DistributedError::Io {
            context: "flush channel message",
            source: err,
        })
    })
}

/// Spawn a task writing everything sent to the returned endpoint onto
/// `writer`. The task ends when the endpoint is dropped or a write fails.
pub fn spawn_writer<W>(name: &str, mut writer: W) -> (Arc<ChannelEndpoint>, JoinHandle<()>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (endpoint, mut receiver) = ChannelEndpoint::new(name);
    let label = name.to_owned();
    let handle = tokio::spawn(async move {
        while let Some(message) = receiver.recv().await {
            if let Err(err) = send_message(&mut writer, &message).await {
                warn!("Writer for {} stopped: {}", label, err);
                break;
            }
        }
        debug!("Writer for {} finished", label);
    });
    (endpoint, handle)
}

/// Read messages from `reader` until the peer closes the stream, handing
/// each one to `handle`. Handler failures are logged and skipped.
///
/// # Errors
///
/// Returns an error if the stream fails for any reason other than a clean close.
pub async fn forward_messages<R, F>(reader: R, mut handle: F) -> AppResult<()>
where
    R: AsyncRead + Unpin,
    F: FnMut(ChannelMessage) -> AppResult<()>,
{
    let mut reader = BufReader::new(reader);
    loop {
        match read_message(&mut reader).await {
            Ok(message) => {
                if let Err(err) = handle(message) {
                    warn!("Failed to handle channel message: {}", err);
                }
            }
            Err(AppError::Distributed(DistributedError::ConnectionClosed)) => return Ok(()),
            Err(err) => return Err(err),
        }
    }
}
