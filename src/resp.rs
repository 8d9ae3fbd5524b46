use bytes::{Buf, BytesMut};

/// Reply produced by a command executor.
///
/// The engine never writes these to a socket; the variants mirror the RESP2
/// reply categories so an external encoder can do so, and the log writer
/// reuses the same encoding for its entries.
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// +OK\r\n
    SimpleString(String),
    /// -ERR message\r\n
    Error(String),
    /// :1000\r\n
    Integer(i64),
    /// $6\r\nfoobar\r\n  or  $-1\r\n (null)
    BulkString(Option<Vec<u8>>),
    /// *2\r\n...  or  *-1\r\n (null)
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        RespValue::Integer(n)
    }

    pub fn bulk_string(data: impl Into<Vec<u8>>) -> Self {
        RespValue::BulkString(Some(data.into()))
    }

    pub fn null_bulk_string() -> Self {
        RespValue::BulkString(None)
    }

    pub fn array(items: Vec<RespValue>) -> Self {
        RespValue::Array(Some(items))
    }

    pub fn empty_array() -> Self {
        RespValue::Array(Some(Vec::new()))
    }

    /// Multi-bulk reply where absent elements become null bulks.
    pub fn optional_bulks(items: impl IntoIterator<Item = Option<Vec<u8>>>) -> Self {
        RespValue::array(items.into_iter().map(RespValue::BulkString).collect())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_to(&mut buf);
        buf
    }

    pub fn write_to(&self, buf: &mut Vec<u8>) {
        match self {
            RespValue::SimpleString(s) => write_line(buf, b'+', s.as_bytes()),
            RespValue::Error(s) => write_line(buf, b'-', s.as_bytes()),
            RespValue::Integer(n) => write_line(buf, b':', n.to_string().as_bytes()),
            RespValue::BulkString(None) => buf.extend_from_slice(b"$-1\r\n"),
            RespValue::BulkString(Some(data)) => write_bulk(buf, data),
            RespValue::Array(None) => buf.extend_from_slice(b"*-1\r\n"),
            RespValue::Array(Some(items)) => {
                write_line(buf, b'*', items.len().to_string().as_bytes());
                for item in items {
                    item.write_to(buf);
                }
            }
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            RespValue::BulkString(Some(data)) => Some(data),
            RespValue::SimpleString(s) => Some(s.as_bytes()),
            _ => None,
        }
    }
}

fn write_line(buf: &mut Vec<u8>, prefix: u8, body: &[u8]) {
    buf.push(prefix);
    buf.extend_from_slice(body);
    buf.extend_from_slice(b"\r\n");
}

/// Append one bulk string.
pub fn write_bulk(buf: &mut Vec<u8>, data: &[u8]) {
    write_line(buf, b'$', data.len().to_string().as_bytes());
    buf.extend_from_slice(data);
    buf.extend_from_slice(b"\r\n");
}

/// Encode a command as a RESP array of bulk strings.
pub fn write_command<'a>(buf: &mut Vec<u8>, parts: impl ExactSizeIterator<Item = &'a [u8]>) {
    write_line(buf, b'*', parts.len().to_string().as_bytes());
    for part in parts {
        write_bulk(buf, part);
    }
}

const MAX_BULK_LEN: usize = 512 * 1024 * 1024;
const MAX_FRAME_ITEMS: usize = 1024 * 1024;

/// Incremental parser for command frames (`*N` arrays of bulk strings).
///
/// `parse_command` returns `Ok(None)` and leaves the buffer untouched until a
/// whole frame is available.
pub struct RespParser;

impl RespParser {
    pub fn parse_command(buf: &mut BytesMut) -> Result<Option<Vec<Vec<u8>>>, RespError> {
        let mut cursor = 0usize;
        let count = match read_header(buf, &mut cursor, b'*')? {
            Some(n) => n,
            None => return Ok(None),
        };
        if count > MAX_FRAME_ITEMS {
            return Err(RespError::InvalidData("invalid multibulk length".into()));
        }

        let mut parts = Vec::with_capacity(count);
        for _ in 0..count {
            let len = match read_header(buf, &mut cursor, b'$')? {
                Some(n) => n,
                None => return Ok(None),
            };
            if len > MAX_BULK_LEN {
                return Err(RespError::InvalidData("invalid bulk length".into()));
            }
            let end = cursor + len;
            if buf.len() < end + 2 {
                return Ok(None);
            }
            if &buf[end..end + 2] != b"\r\n" {
                return Err(RespError::InvalidData(
                    "missing trailing CRLF after bulk string".into(),
                ));
            }
            parts.push(buf[cursor..end].to_vec());
            cursor = end + 2;
        }

        buf.advance(cursor);
        Ok(Some(parts))
    }
}

/// Read `<prefix><number>\r\n` at `cursor`, advancing it past the line.
fn read_header(buf: &[u8], cursor: &mut usize, prefix: u8) -> Result<Option<usize>, RespError> {
    let Some(&first) = buf.get(*cursor) else {
        return Ok(None);
    };
    if first != prefix {
        return Err(RespError::InvalidByte(prefix, first));
    }
    let Some(crlf) = find_crlf_from(buf, *cursor + 1) else {
        return Ok(None);
    };
    let digits = std::str::from_utf8(&buf[*cursor + 1..crlf])
        .map_err(|_| RespError::InvalidData("invalid length encoding".into()))?;
    let n: usize = digits
        .parse()
        .map_err(|_| RespError::InvalidData(format!("invalid length: {digits}")))?;
    *cursor = crlf + 2;
    Ok(Some(n))
}

fn find_crlf_from(buf: &[u8], start: usize) -> Option<usize> {
    buf.get(start..)?
        .windows(2)
        .position(|w| w == b"\r\n")
        .map(|pos| start + pos)
}

/// Split an inline command line into arguments, honouring double quotes
/// (with `\"`, `\\`, `\n`, `\r`, `\t` escapes) and single quotes (verbatim).
pub fn split_inline(line: &str) -> Result<Vec<Vec<u8>>, RespError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut has_token = false;
    let mut chars = line.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                has_token = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('n') => current.push('\n'),
                            Some('r') => current.push('\r'),
                            Some('t') => current.push('\t'),
                            Some(other) => current.push(other),
                            None => break,
                        },
                        Some(c) => current.push(c),
                        None => {
                            return Err(RespError::InvalidData(
                                "unbalanced quotes in request".into(),
                            ));
                        }
                    }
                }
            }
            '\'' => {
                has_token = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => {
                            return Err(RespError::InvalidData(
                                "unbalanced quotes in request".into(),
                            ));
                        }
                    }
                }
            }
            c if c.is_whitespace() => {
                if has_token {
                    tokens.push(std::mem::take(&mut current).into_bytes());
                    has_token = false;
                }
            }
            c => {
                has_token = true;
                current.push(c);
            }
        }
    }
    if has_token {
        tokens.push(current.into_bytes());
    }
    Ok(tokens)
}

#[derive(Debug, thiserror::Error)]
pub enum RespError {
    #[error("expected '{}', got '{}'", *.0 as char, *.1 as char)]
    InvalidByte(u8, u8),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}
