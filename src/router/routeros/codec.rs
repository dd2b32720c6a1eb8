//! RouterOS API sentence encoding.
//!
//! A sentence is a sequence of words terminated by a zero-length word. Each
//! word is prefixed by its length in a 1 to 5 byte variable-length encoding.

use crate::error::RouterApiError;
use rustc_hash::FxHashMap;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Longest word accepted from a router. Real replies stay far below this.
pub const MAX_WORD_LEN: usize = 16 * 1024 * 1024;

pub fn encode_length(len: usize, out: &mut Vec<u8>) {
    let len = len as u32;
    if len < 0x80 {
        out.push(len as u8);
    } else if len < 0x4000 {
        out.extend_from_slice(&((len | 0x8000) as u16).to_be_bytes());
    } else if len < 0x20_0000 {
        out.extend_from_slice(&(len | 0xC0_0000).to_be_bytes()[1..]);
    } else if len < 0x1000_0000 {
        out.extend_from_slice(&(len | 0xE000_0000).to_be_bytes());
    } else {
        out.push(0xF0);
        out.extend_from_slice(&len.to_be_bytes());
    }
}

pub async fn read_length<R>(reader: &mut R) -> Result<usize, RouterApiError>
where
    R: AsyncRead + Unpin,
{
    let first = reader.read_u8().await?;
    let (extra, initial) = match first {
        b if b & 0x80 == 0x00 => (0, b as u32),
        b if b & 0xC0 == 0x80 => (1, (b & 0x3F) as u32),
        b if b & 0xE0 == 0xC0 => (2, (b & 0x1F) as u32),
        b if b & 0xF0 == 0xE0 => (3, (b & 0x0F) as u32),
        0xF0 => (4, 0),
        b => {
            return Err(RouterApiError::Protocol(format!(
                "unsupported length prefix 0x{:02x}",
                b
            )))
        }
    };

    let mut len = initial;
    for _ in 0..extra {
        len = (len << 8) | reader.read_u8().await? as u32;
    }
    Ok(len as usize)
}

pub fn encode_sentence<S: AsRef<str>>(words: &[S]) -> Vec<u8> {
    let mut out = Vec::new();
    for word in words {
        let bytes = word.as_ref().as_bytes();
        encode_length(bytes.len(), &mut out);
        out.extend_from_slice(bytes);
    }
    out.push(0);
    out
}

pub async fn write_sentence<W, S>(writer: &mut W, words: &[S]) -> Result<(), RouterApiError>
where
    W: AsyncWrite + Unpin,
    S: AsRef<str>,
{
    writer.write_all(&encode_sentence(words)).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_sentence<R>(reader: &mut R) -> Result<Vec<String>, RouterApiError>
where
    R: AsyncRead + Unpin,
{
    let mut words = Vec::new();
    loop {
        let len = read_length(reader).await?;
        if len == 0 {
            return Ok(words);
        }
        if len > MAX_WORD_LEN {
            return Err(RouterApiError::Protocol(format!(
                "word of {} bytes exceeds the {} byte limit",
                len, MAX_WORD_LEN
            )));
        }
        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf).await?;
        let word = String::from_utf8(buf)
            .map_err(|e| RouterApiError::Protocol(format!("non-UTF-8 word: {}", e)))?;
        words.push(word);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Re,
    Done,
    Trap,
    Fatal,
}

/// One reply sentence with its `=key=value` attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub kind: ReplyKind,
    pub attributes: FxHashMap<String, String>,
}

impl Reply {
    pub fn parse(words: Vec<String>) -> Result<Self, RouterApiError> {
        let mut iter = words.into_iter();
        let kind = match iter.next().as_deref() {
            Some("!re") => ReplyKind::Re,
            Some("!done") => ReplyKind::Done,
            Some("!trap") => ReplyKind::Trap,
            Some("!fatal") => ReplyKind::Fatal,
            other => {
                return Err(RouterApiError::Protocol(format!(
                    "unexpected reply word {:?}",
                    other
                )))
            }
        };

        let mut attributes = FxHashMap::default();
        let mut bare = Vec::new();
        for word in iter {
            if let Some(attr) = word.strip_prefix('=') {
                let (key, value) = attr.split_once('=').unwrap_or((attr, ""));
                attributes.insert(key.to_string(), value.to_string());
            } else if !word.starts_with('.') {
                bare.push(word);
            }
        }
        // !fatal carries its reason as a bare word
        if kind == ReplyKind::Fatal && !bare.is_empty() {
            attributes
                .entry("message".to_string())
                .or_insert_with(|| bare.join(" "));
        }

        Ok(Self { kind, attributes })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}
