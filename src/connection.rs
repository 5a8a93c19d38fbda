use bytes::{Buf, BytesMut};
use futures::SinkExt;
use std::io::{self, Cursor};
use std::net::SocketAddr;
use thiserror::Error as ThisError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::FramedWrite;
use tracing::debug;
use uuid::Uuid;

use crate::codec::{EncodeError, FrameCodec};
use crate::config::Config;
use crate::frame::{self, Frame, FrameLimits};

#[derive(Debug, ThisError)]
pub enum ConnectionError {
    #[error("error while reading message: {0}")]
    Io(#[from] io::Error),
    #[error("error while decoding message: {0}")]
    Decode(#[from] frame::Error),
}

/// A client connection. Defaults to the two halves of a `TcpStream`; any reader and writer pair
/// works.
pub struct Connection<R = OwnedReadHalf, W = OwnedWriteHalf> {
    pub id: Uuid,
    pub client_address: SocketAddr,
    reader: R,
    writer: FramedWrite<W, FrameCodec>,
    // Data is read from the socket into the read buffer. When a frame is parsed, the corresponding
    // data is removed from the buffer. Frames never span two reads, so whatever cannot be decoded
    // is dropped.
    buffer: BytesMut,
    read_buffer_size: usize,
    limits: FrameLimits,
}

impl Connection {
    pub fn new(stream: TcpStream, client_address: SocketAddr, config: &Config) -> Connection {
        let (reader, writer) = stream.into_split();
        Connection::from_parts(reader, writer, client_address, config)
    }
}

impl<R, W> Connection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn from_parts(reader: R, writer: W, client_address: SocketAddr, config: &Config) -> Self {
        Connection {
            id: Uuid::new_v4(),
            client_address,
            reader,
            writer: FramedWrite::new(writer, FrameCodec),
            buffer: BytesMut::with_capacity(config.read_buffer_size),
            read_buffer_size: config.read_buffer_size,
            limits: config.limits,
        }
    }

    /// Returns the next frame, reading from the socket only once the previous read has been fully
    /// decoded. `Ok(None)` means the client closed the connection.
    ///
    /// A decode error discards the rest of the current read; the connection itself stays usable.
    /// This method is cancel safe.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, ConnectionError> {
        if self.buffer.is_empty() {
            self.buffer.reserve(self.read_buffer_size);

            let n = (&mut self.reader)
                .take(self.read_buffer_size as u64)
                .read_buf(&mut self.buffer)
                .await?;

            if n == 0 {
                return Ok(None);
            }

            debug!(
                bytes = n,
                payload = %String::from_utf8_lossy(&self.buffer),
                "Received message"
            );
        }

        let mut cursor = Cursor::new(&self.buffer[..]);
        match Frame::parse(&mut cursor, &self.limits) {
            Ok(frame) => {
                let position = cursor.position() as usize;
                self.buffer.advance(position);
                Ok(Some(frame))
            }
            Err(err) => {
                self.buffer.clear();
                Err(err.into())
            }
        }
    }

    pub async fn write_frame(&mut self, frame: Frame) -> Result<(), EncodeError> {
        self.writer.send(frame).await
    }
}
