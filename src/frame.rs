// https://redis.io/docs/reference/protocol-spec

use std::fmt;
use std::io::Cursor;
use std::str;

use bytes::{Buf, Bytes};
use thiserror::Error as ThisError;

pub(crate) static CRLF: &[u8; 2] = b"\r\n";

/// Errors produced while decoding a frame. Every variant carries the position, in bytes from the
/// start of the decoded buffer, where decoding went wrong.
#[derive(Debug, ThisError, PartialEq)]
pub enum Error {
    #[error("unexpected end of input at position {position}")]
    UnexpectedEof { position: usize },
    #[error("invalid character {:?} in position {position}", as_char(.byte))]
    InvalidDataType { byte: u8, position: usize },
    #[error("expected LF after CR at position {position}, found {:?}", as_char(.found))]
    MissingLineFeed { found: u8, position: usize },
    #[error("expected a CRLF terminator at position {position}, found {:?}", as_char(.found))]
    InvalidTerminator { found: u8, position: usize },
    #[error("failed to parse integer {text:?} at position {position}")]
    InvalidInteger { text: String, position: usize },
    #[error(
        "length should be -1, 0, or a positive integer, but was {length} at position {position}"
    )]
    InvalidLength { length: i64, position: usize },
    #[error("length {length} at position {position} exceeds the limit of {max}")]
    TooLarge {
        length: i64,
        max: usize,
        position: usize,
    },
    #[error("arrays nested deeper than {max} levels at position {position}")]
    TooDeep { max: usize, position: usize },
    #[error("invalid UTF-8 string at position {position}")]
    InvalidUtf8 { position: usize },
    #[error("error while decoding array element {index}: {source}")]
    ArrayElement { index: usize, source: Box<Error> },
}

impl Error {
    /// Position of the offending byte. For array elements this is the position reported by the
    /// innermost error.
    pub fn position(&self) -> usize {
        match self {
            Error::UnexpectedEof { position }
            | Error::InvalidDataType { position, .. }
            | Error::MissingLineFeed { position, .. }
            | Error::InvalidTerminator { position, .. }
            | Error::InvalidInteger { position, .. }
            | Error::InvalidLength { position, .. }
            | Error::TooLarge { position, .. }
            | Error::TooDeep { position, .. }
            | Error::InvalidUtf8 { position } => *position,
            Error::ArrayElement { source, .. } => source.position(),
        }
    }
}

fn as_char(byte: &u8) -> char {
    char::from(*byte)
}

/// Upper bounds enforced while decoding, so a single request cannot make the server allocate
/// arbitrary amounts of memory or recurse without bound.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameLimits {
    pub max_bulk_len: usize,
    pub max_array_len: usize,
    pub max_depth: usize,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_bulk_len: 512 * 1024 * 1024,
            max_array_len: 1024 * 1024,
            max_depth: 128,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Null,
    Array(Vec<Frame>),
}

// Protocol specification: https://redis.io/docs/reference/protocol-spec/
impl Frame {
    /// Decodes a single frame from the start of `input` using the default limits.
    pub fn decode(input: &[u8]) -> Result<Self, Error> {
        let mut cursor = Cursor::new(input);
        Self::parse(&mut cursor, &FrameLimits::default())
    }

    /// Decodes one frame starting at the cursor position. On success the cursor is left right
    /// after the frame, so consecutive frames in the same buffer can be decoded by calling this
    /// again.
    pub fn parse(src: &mut Cursor<&[u8]>, limits: &FrameLimits) -> Result<Self, Error> {
        parse_nested(src, limits, 0)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Simple(_) => "simple string",
            Frame::Error(_) => "simple error",
            Frame::Integer(_) => "integer",
            Frame::Bulk(_) => "bulk string",
            Frame::Null => "null",
            Frame::Array(_) => "array",
        }
    }
}

fn parse_nested(src: &mut Cursor<&[u8]>, limits: &FrameLimits, depth: usize) -> Result<Frame, Error> {
    // The first byte in an RESP-serialized payload always identifies its type.
    // Subsequent bytes constitute the type's contents.
    let position = position(src);
    let first_byte = get_byte(src)?;
    let data_type = DataType::from_byte(first_byte).ok_or(Error::InvalidDataType {
        byte: first_byte,
        position,
    })?;

    match data_type {
        DataType::SimpleString => {
            let start = position + 1;
            let line = get_line(src)?;
            Ok(Frame::Simple(to_string(line, start)?))
        }
        DataType::SimpleError => {
            let start = position + 1;
            let line = get_line(src)?;
            Ok(Frame::Error(to_string(line, start)?))
        }
        DataType::Integer => {
            let start = position + 1;
            let line = get_line(src)?;
            Ok(Frame::Integer(parse_integer(line, start)?))
        }
        // $<length>\r\n<data>\r\n
        DataType::BulkString => {
            let Some(length) = get_length(src, limits.max_bulk_len)? else {
                return Ok(Frame::Null);
            };

            // The body is taken verbatim, it may contain CRLF sequences.
            let data = get_bytes(src, length)?;
            expect_crlf(src)?;

            Ok(Frame::Bulk(Bytes::copy_from_slice(data)))
        }
        // *<number-of-elements>\r\n<element-1>...<element-n>
        DataType::Array => {
            if depth >= limits.max_depth {
                return Err(Error::TooDeep {
                    max: limits.max_depth,
                    position,
                });
            }

            let Some(length) = get_length(src, limits.max_array_len)? else {
                return Ok(Frame::Null);
            };

            // Every element takes at least three bytes, never trust the declared length alone.
            let mut frames = Vec::with_capacity(length.min(src.remaining()));
            for index in 0..length {
                let frame = parse_nested(src, limits, depth + 1).map_err(|e| Error::ArrayElement {
                    index,
                    source: Box::new(e),
                })?;
                frames.push(frame);
            }

            Ok(Frame::Array(frames))
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Simple(s) => write!(f, "+{}", s),
            Frame::Error(s) => write!(f, "-{}", s),
            Frame::Integer(i) => write!(f, ":{}", i),
            Frame::Bulk(bytes) => write!(f, "${}", String::from_utf8_lossy(bytes)),
            Frame::Null => write!(f, "$-1"),
            Frame::Array(arr) => {
                write!(f, "*{}", arr.len())?;
                for frame in arr {
                    write!(f, " {}", frame)?;
                }
                Ok(())
            }
        }
    }
}

/// Reads a length line and validates it. `None` stands for the `-1` null length.
fn get_length(src: &mut Cursor<&[u8]>, max: usize) -> Result<Option<usize>, Error> {
    let start = position(src);
    let line = get_line(src)?;
    let length = parse_integer(line, start)?;

    match length {
        -1 => Ok(None),
        length if length < -1 => Err(Error::InvalidLength {
            length,
            position: start,
        }),
        length => usize::try_from(length)
            .ok()
            .filter(|length| *length <= max)
            .map(Some)
            .ok_or(Error::TooLarge {
                length,
                max,
                position: start,
            }),
    }
}

/// Returns the bytes between the cursor and the next CR, and moves the cursor past the CRLF.
fn get_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], Error> {
    let start = position(src);
    let buf: &'a [u8] = *src.get_ref();

    let cr = buf
        .get(start..)
        .unwrap_or_default()
        .iter()
        .position(|byte| *byte == b'\r')
        .map(|index| start + index)
        .ok_or(Error::UnexpectedEof {
            position: buf.len(),
        })?;

    match buf.get(cr + 1) {
        Some(b'\n') => {}
        Some(&found) => {
            return Err(Error::MissingLineFeed {
                found,
                position: cr + 1,
            })
        }
        None => return Err(Error::UnexpectedEof { position: cr + 1 }),
    }

    src.set_position((cr + CRLF.len()) as u64);

    Ok(&buf[start..cr])
}

fn get_bytes<'a>(src: &mut Cursor<&'a [u8]>, length: usize) -> Result<&'a [u8], Error> {
    let start = position(src);
    let buf: &'a [u8] = *src.get_ref();

    let end = start
        .checked_add(length)
        .filter(|end| *end <= buf.len())
        .ok_or(Error::UnexpectedEof {
            position: buf.len(),
        })?;

    src.set_position(end as u64);

    Ok(&buf[start..end])
}

fn expect_crlf(src: &mut Cursor<&[u8]>) -> Result<(), Error> {
    for expected in CRLF {
        let position = position(src);
        let found = get_byte(src)?;
        if found != *expected {
            return Err(Error::InvalidTerminator { found, position });
        }
    }
    Ok(())
}

fn get_byte(src: &mut Cursor<&[u8]>) -> Result<u8, Error> {
    if !src.has_remaining() {
        return Err(Error::UnexpectedEof {
            position: position(src),
        });
    }
    Ok(src.get_u8())
}

fn parse_integer(bytes: &[u8], position: usize) -> Result<i64, Error> {
    str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| Error::InvalidInteger {
            text: String::from_utf8_lossy(bytes).into_owned(),
            position,
        })
}

fn to_string(bytes: &[u8], position: usize) -> Result<String, Error> {
    str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| Error::InvalidUtf8 {
            position: position + e.valid_up_to(),
        })
}

fn position(src: &Cursor<&[u8]>) -> usize {
    src.position() as usize
}

#[derive(Debug)]
pub(crate) enum DataType {
    SimpleString, // '+'
    SimpleError,  // '-'
    Integer,      // ':'
    BulkString,   // '$'
    Array,        // '*'
}

impl DataType {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'+' => Some(Self::SimpleString),
            b'-' => Some(Self::SimpleError),
            b':' => Some(Self::Integer),
            b'$' => Some(Self::BulkString),
            b'*' => Some(Self::Array),
            _ => None,
        }
    }
}

impl From<DataType> for u8 {
    fn from(value: DataType) -> Self {
        match value {
            DataType::SimpleString => b'+',
            DataType::SimpleError => b'-',
            DataType::Integer => b':',
            DataType::BulkString => b'$',
            DataType::Array => b'*',
        }
    }
}
