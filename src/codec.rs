use bytes::{BufMut, BytesMut};
use std::io;
use thiserror::Error as ThisError;
use tokio_util::codec::Encoder;

use crate::frame::{DataType, Frame, CRLF};

#[derive(Debug, ThisError)]
pub enum EncodeError {
    /// Only simple strings, simple errors and bulk strings have a response encoding so far.
    #[error("cannot encode a {kind} frame")]
    Unsupported { kind: &'static str },
    #[error("a {kind} cannot contain CR or LF")]
    InvalidLine { kind: &'static str },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Encodes response frames onto the connection's write half.
#[derive(Debug, Default)]
pub struct FrameCodec;

impl Encoder<Frame> for FrameCodec {
    type Error = EncodeError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if let Frame::Simple(s) | Frame::Error(s) = &frame {
            if s.contains(['\r', '\n']) {
                return Err(EncodeError::InvalidLine { kind: frame.kind() });
            }
        }

        match frame {
            Frame::Simple(s) => put_line(dst, DataType::SimpleString, s.as_bytes()),
            Frame::Error(s) => put_line(dst, DataType::SimpleError, s.as_bytes()),
            Frame::Bulk(bytes) => put_bulk(dst, &bytes),
            frame @ (Frame::Integer(_) | Frame::Array(_) | Frame::Null) => {
                return Err(EncodeError::Unsupported { kind: frame.kind() })
            }
        }
        Ok(())
    }
}

/// `+<s>\r\n`. `s` must not contain CR or LF, [`FrameCodec`] checks this for frames it writes.
pub fn encode_simple_string(s: &str) -> Vec<u8> {
    let mut dst = BytesMut::with_capacity(1 + s.len() + CRLF.len());
    put_line(&mut dst, DataType::SimpleString, s.as_bytes());
    dst.to_vec()
}

/// `$<length>\r\n<bytes>\r\n`. The length is a byte count, so multi-byte UTF-8 text is measured
/// correctly.
pub fn encode_bulk_string(bytes: &[u8]) -> Vec<u8> {
    let mut dst = BytesMut::new();
    put_bulk(&mut dst, bytes);
    dst.to_vec()
}

fn put_line(dst: &mut BytesMut, data_type: DataType, line: &[u8]) {
    dst.reserve(1 + line.len() + CRLF.len());
    dst.put_u8(u8::from(data_type));
    dst.extend_from_slice(line);
    dst.extend_from_slice(CRLF);
}

fn put_bulk(dst: &mut BytesMut, bytes: &[u8]) {
    let length = bytes.len().to_string();
    dst.reserve(1 + length.len() + CRLF.len() + bytes.len() + CRLF.len());
    dst.put_u8(u8::from(DataType::BulkString));
    dst.extend_from_slice(length.as_bytes());
    dst.extend_from_slice(CRLF);
    dst.extend_from_slice(bytes);
    dst.extend_from_slice(CRLF);
}
