//! # Byte Stream Decoder
//!
//! Turns raw frames from the serial link into text. Device firmware prints
//! UTF-8, but boot banners from locale-configured boards arrive as Big5 or GBK
//! and a noisy line adds stray high bytes. Decoding never fails: it walks a
//! list of strict candidates (UTF-8, Big5, GBK by default), then a lossy UTF-8
//! pass, then a byte-per-char pass that cannot fail at all.
//!
//! Every result goes through [`strip_control`], so no caller ever sees a
//! control character other than tab, newline or carriage return.

use std::borrow::Cow;
use tracing::trace;

/// A strict decoding attempt. Strict means invalid input is rejected, not patched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    /// Traditional Chinese (Big5 with HKSCS extensions).
    Big5,
    /// Simplified Chinese; a superset of GB2312.
    Gbk,
}

impl Encoding {
    fn decode(self, raw: &[u8]) -> Option<String> {
        match self {
            Encoding::Utf8 => std::str::from_utf8(raw).ok().map(str::to_owned),
            Encoding::Big5 => strict(encoding_rs::BIG5, raw),
            Encoding::Gbk => strict(encoding_rs::GBK, raw),
        }
    }
}

fn strict(encoding: &'static encoding_rs::Encoding, raw: &[u8]) -> Option<String> {
    encoding
        .decode_without_bom_handling_and_without_replacement(raw)
        .map(Cow::into_owned)
}

/// Candidates tried in order before any lossy fallback.
pub const DEFAULT_CANDIDATES: &[Encoding] = &[Encoding::Utf8, Encoding::Big5, Encoding::Gbk];

/// `true` for characters allowed through: anything from U+0020 up, plus tab, newline and CR.
pub fn is_kept(c: char) -> bool {
    c >= ' ' || matches!(c, '\t' | '\n' | '\r')
}

/// Drops control characters below U+0020 except tab, newline and carriage return.
pub fn strip_control(text: &str) -> String {
    text.chars().filter(|&c| is_kept(c)).collect()
}

/// # Byte Stream Decoder
///
/// Holds the ordered candidate list. `decode` is total: it returns an empty
/// string for empty input and for frames that carry nothing printable.
#[derive(Debug, Clone)]
pub struct ByteStreamDecoder {
    candidates: Vec<Encoding>,
}

impl Default for ByteStreamDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_CANDIDATES.to_vec())
    }
}

impl ByteStreamDecoder {
    pub fn new(candidates: Vec<Encoding>) -> Self {
        Self { candidates }
    }

    /// Decodes one raw frame into a trimmed, control-free line.
    pub fn decode(&self, raw: &[u8]) -> String {
        if raw.is_empty() {
            return String::new();
        }

        for encoding in &self.candidates {
            if let Some(text) = encoding.decode(raw) {
                let cleaned = clean(&text);
                if !cleaned.is_empty() {
                    trace!(?encoding, "decoded frame");
                    return cleaned;
                }
            }
        }

        let lossy = clean(&String::from_utf8_lossy(raw));
        if !lossy.is_empty() {
            trace!("decoded frame with lossy utf-8");
            return lossy;
        }

        // One char per byte (Latin-1); cannot fail.
        let latin1: String = raw.iter().map(|&b| b as char).collect();
        clean(&latin1)
    }
}

fn clean(text: &str) -> String {
    strip_control(text.trim()).trim().to_string()
}
