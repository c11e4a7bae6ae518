//! Header value decoding (RFC 2047 encoded words).
//!
//! Envelope strings arrive as raw bytes that may contain encoded words such
//! as `=?UTF-8?B?SGVsbG8=?=`. Decoding is lenient: a word that cannot be
//! decoded is kept verbatim instead of failing the fetch.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Decodes a raw header value into text.
///
/// Invalid UTF-8 is replaced, then encoded words are decoded.
#[must_use]
pub fn decode_bytes(raw: &[u8]) -> String {
    decode_words(&String::from_utf8_lossy(raw))
}

/// Decodes every RFC 2047 encoded word in `text`.
///
/// Whitespace between two adjacent encoded words is dropped, as RFC 2047
/// section 6.2 requires.
#[must_use]
pub fn decode_words(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut pending_space: Option<&str> = None;
    let mut last_was_word = false;

    while !rest.is_empty() {
        let Some(start) = rest.find("=?") else {
            flush_space(&mut out, pending_space.take());
            out.push_str(rest);
            break;
        };

        let (before, candidate) = rest.split_at(start);
        let between_words = last_was_word && before.chars().all(char::is_whitespace);

        if let Some((decoded, consumed)) = decode_one(candidate) {
            if !between_words {
                flush_space(&mut out, pending_space.take());
                out.push_str(before);
            }
            pending_space = None;
            out.push_str(&decoded);
            rest = &candidate[consumed..];
            last_was_word = true;

            let trimmed = rest.trim_start();
            if trimmed.len() != rest.len() {
                pending_space = Some(&rest[..rest.len() - trimmed.len()]);
                rest = trimmed;
            }
        } else {
            flush_space(&mut out, pending_space.take());
            out.push_str(before);
            out.push_str("=?");
            rest = &candidate[2..];
            last_was_word = false;
        }
    }

    flush_space(&mut out, pending_space);
    out
}

fn flush_space(out: &mut String, space: Option<&str>) {
    if let Some(space) = space {
        out.push_str(space);
    }
}

/// Decodes the encoded word at the start of `s`, returning the text and the
/// number of bytes consumed.
fn decode_one(s: &str) -> Option<(String, usize)> {
    let body = s.strip_prefix("=?")?;
    let (charset, body) = body.split_once('?')?;
    let (encoding, body) = body.split_once('?')?;
    let end = body.find("?=")?;
    let payload = &body[..end];

    if charset.is_empty() || payload.contains(char::is_whitespace) {
        return None;
    }

    let bytes = match encoding.to_ascii_uppercase().as_str() {
        "B" => STANDARD.decode(payload).ok()?,
        "Q" => decode_q(payload)?,
        _ => return None,
    };

    let consumed = 2 + charset.len() + 1 + encoding.len() + 1 + end + 2;
    Some((decode_charset(charset, &bytes), consumed))
}

fn decode_q(payload: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(payload.len());
    let mut bytes = payload.bytes();

    while let Some(b) = bytes.next() {
        match b {
            b'_' => out.push(b' '),
            b'=' => {
                let hi = hex_value(bytes.next()?)?;
                let lo = hex_value(bytes.next()?)?;
                out.push((hi << 4) | lo);
            }
            other => out.push(other),
        }
    }

    Some(out)
}

const fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn decode_charset(charset: &str, bytes: &[u8]) -> String {
    // RFC 2231 language suffix: "utf-8*en"
    let charset = charset.split('*').next().unwrap_or(charset);

    match charset.to_ascii_lowercase().as_str() {
        "iso-8859-1" | "latin1" | "latin-1" | "windows-1252" | "cp1252" => {
            bytes.iter().map(|&b| char::from(b)).collect()
        }
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}
