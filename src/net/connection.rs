//! Per-connection command loop.
//!
//! Frames are decoded incrementally from the socket and dispatched one at a
//! time. While a command is in flight the socket keeps being polled, so a
//! client disconnect cancels the command's context and wakes any pending
//! lock acquisition or consensus submission.

use crate::command::Dispatcher;
use crate::core::error::StoreError;
use crate::net::listener::ConnectionId;
use crate::protocol::{decode_request, encode_error, DecodeResult};
use bytes::{Buf, BytesMut};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

/// Serve one client connection until it disconnects or sends a corrupt
/// frame.
pub async fn serve_connection(
    stream: TcpStream,
    dispatcher: Arc<Dispatcher>,
    id: ConnectionId,
) -> std::io::Result<()> {
    let (mut reader, mut writer) = stream.into_split();
    let cancel = CancellationToken::new();
    let mut buf = BytesMut::with_capacity(8 * 1024);

    loop {
        // Decode the next frame, reading more input as needed.
        let frame = loop {
            match decode_request(&buf) {
                DecodeResult::Frame { frame, consumed } => {
                    buf.advance(consumed);
                    break frame;
                }
                DecodeResult::Incomplete => {
                    let n = reader.read_buf(&mut buf).await?;
                    if n == 0 {
                        cancel.cancel();
                        return Ok(());
                    }
                }
                DecodeResult::Corrupt(message) => {
                    tracing::debug!(%id, %message, "closing connection on corrupt frame");
                    let error = StoreError::argument(message);
                    let _ = writer.write_all(&encode_error(&error)).await;
                    cancel.cancel();
                    return Ok(());
                }
            }
        };

        // Dispatch while continuing to poll the socket: pipelined input is
        // buffered, and a disconnect cancels the in-flight context.
        let dispatch = dispatcher.dispatch(frame, cancel.child_token());
        tokio::pin!(dispatch);
        let mut disconnected = false;

        let response = loop {
            tokio::select! {
                response = &mut dispatch => break response,
                result = reader.read_buf(&mut buf), if !disconnected => {
                    match result {
                        Ok(0) | Err(_) => {
                            disconnected = true;
                            cancel.cancel();
                        }
                        Ok(_) => {}
                    }
                }
            }
        };

        if disconnected {
            return Ok(());
        }
        writer.write_all(&response).await?;
    }
}
