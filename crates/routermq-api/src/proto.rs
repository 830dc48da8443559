// Word/sentence framing for the RouterOS binary API.
//
// A word is a length-prefixed byte string; a sentence is a sequence of
// words terminated by a zero-length word. The first word of a command
// sentence is the command path (`/interface/wireless/registration-table/print`),
// the first word of a reply sentence is a tag (`!re`, `!done`, `!trap`,
// `!fatal`), and the remaining words are `=key=value` attributes.

use std::collections::HashMap;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::Error;

/// Upper bound on a single word. Real registration-table rows are a few
/// hundred bytes; anything near this limit means the peer is not speaking
/// the API protocol.
pub const MAX_WORD_LEN: u32 = 4 * 1024 * 1024;

// ── Length prefix ───────────────────────────────────────────────────

/// Encode a word length into its 1–5 byte wire prefix.
///
/// The high bits of the first byte select the width: `0xxxxxxx` one byte,
/// `10...` two, `110...` three, `1110...` four, and the sentinel `0xF0`
/// introduces a full big-endian `u32`.
pub fn encode_length(len: u32) -> Vec<u8> {
    if len < 0x80 {
        len.to_be_bytes()[3..].to_vec()
    } else if len < 0x4000 {
        (len | 0x8000).to_be_bytes()[2..].to_vec()
    } else if len < 0x0020_0000 {
        (len | 0x00C0_0000).to_be_bytes()[1..].to_vec()
    } else if len < 0x1000_0000 {
        (len | 0xE000_0000).to_be_bytes().to_vec()
    } else {
        let mut buf = Vec::with_capacity(5);
        buf.push(0xF0);
        buf.extend_from_slice(&len.to_be_bytes());
        buf
    }
}

/// Read a word length prefix from the stream.
///
/// Leading bytes in `0xF1..=0xFF` are reserved control bytes and rejected.
pub async fn read_length<R: AsyncRead + Unpin>(reader: &mut R) -> Result<u32, Error> {
    let b0 = u32::from(reader.read_u8().await?);

    if b0 & 0x80 == 0 {
        return Ok(b0);
    }
    if b0 & 0xC0 == 0x80 {
        let b1 = u32::from(reader.read_u8().await?);
        return Ok(((b0 & 0x3F) << 8) | b1);
    }
    if b0 & 0xE0 == 0xC0 {
        let b1 = u32::from(reader.read_u8().await?);
        let b2 = u32::from(reader.read_u8().await?);
        return Ok(((b0 & 0x1F) << 16) | (b1 << 8) | b2);
    }
    if b0 & 0xF0 == 0xE0 {
        let mut rest = [0u8; 3];
        reader.read_exact(&mut rest).await?;
        return Ok(((b0 & 0x0F) << 24)
            | (u32::from(rest[0]) << 16)
            | (u32::from(rest[1]) << 8)
            | u32::from(rest[2]));
    }
    if b0 == 0xF0 {
        let mut rest = [0u8; 4];
        reader.read_exact(&mut rest).await?;
        return Ok(u32::from_be_bytes(rest));
    }

    Err(Error::Protocol(format!(
        "reserved length control byte 0x{b0:02X}"
    )))
}

// ── Sentences ───────────────────────────────────────────────────────

/// Write one sentence: each word length-prefixed, then the zero-length
/// terminator, in a single buffered write.
pub async fn write_sentence<W: AsyncWrite + Unpin>(
    writer: &mut W,
    words: &[impl AsRef<str>],
) -> Result<(), Error> {
    let mut buf = Vec::new();
    for word in words {
        let bytes = word.as_ref().as_bytes();
        let len = u32::try_from(bytes.len())
            .map_err(|_| Error::Protocol("word exceeds u32 length".into()))?;
        buf.extend_from_slice(&encode_length(len));
        buf.extend_from_slice(bytes);
    }
    buf.push(0);
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one sentence, decoding each word as (lossy) UTF-8.
///
/// Stray empty sentences between replies are skipped rather than
/// surfaced; a closed stream shows up as an I/O error from the first
/// length byte.
pub async fn read_sentence<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<String>, Error> {
    let mut words = Vec::new();
    loop {
        let len = read_length(reader).await?;
        if len == 0 {
            if words.is_empty() {
                continue;
            }
            return Ok(words);
        }
        if len > MAX_WORD_LEN {
            return Err(Error::Protocol(format!("word length {len} exceeds limit")));
        }
        let len = usize::try_from(len)
            .map_err(|_| Error::Protocol(format!("word length {len} exceeds limit")))?;
        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf).await?;
        words.push(String::from_utf8_lossy(&buf).into_owned());
    }
}

// ── Replies ─────────────────────────────────────────────────────────

/// Tag word of a reply sentence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyWord {
    /// One data row.
    Re,
    /// End of command; may carry `=ret=` values.
    Done,
    /// Command-level error; the connection stays usable.
    Trap,
    /// Connection-level error; the router closes the connection after it.
    Fatal,
}

/// One parsed reply sentence.
#[derive(Debug, Clone)]
pub struct ReplySentence {
    pub word: ReplyWord,
    /// `=key=value` and `.tag=value` attribute words.
    pub attributes: HashMap<String, String>,
    /// Plain words with no attribute marker — `!fatal` carries its reason
    /// this way.
    pub messages: Vec<String>,
}

impl ReplySentence {
    /// Parse a raw word list into a reply.
    pub fn parse(words: Vec<String>) -> Result<Self, Error> {
        let mut iter = words.into_iter();
        let tag = iter
            .next()
            .ok_or_else(|| Error::Protocol("empty reply sentence".into()))?;

        let word = match tag.as_str() {
            "!re" => ReplyWord::Re,
            "!done" => ReplyWord::Done,
            "!trap" => ReplyWord::Trap,
            "!fatal" => ReplyWord::Fatal,
            other => {
                return Err(Error::Protocol(format!("unknown reply word `{other}`")));
            }
        };

        let mut attributes = HashMap::new();
        let mut messages = Vec::new();
        for w in iter {
            if let Some(rest) = w.strip_prefix('=') {
                // `=key=value`; the value may be empty or contain `=`.
                let (key, value) = rest.split_once('=').unwrap_or((rest, ""));
                attributes.insert(key.to_owned(), value.to_owned());
            } else if w.starts_with('.') {
                // API attribute words such as `.tag=1`.
                let (key, value) = w.split_once('=').unwrap_or((w.as_str(), ""));
                attributes.insert(key.to_owned(), value.to_owned());
            } else {
                messages.push(w);
            }
        }

        Ok(Self {
            word,
            attributes,
            messages,
        })
    }

    /// Look up an attribute by key.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}
