//! Charset model and MIME transfer-encoding selection.
//!
//! Covers the body-encoding ladder (7bit → 8bit → quoted-printable/base64),
//! the quoted-printable and base64 body encoders, and RFC 2047 encoded
//! words for header values.

use crate::{EmailError, EmailResult};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::fmt::Write as _;

/// Hard line-length limit from RFC 5322 (998 octets excluding CRLF).
pub const MAX_LINE_OCTETS: usize = 998;

/// Soft wrap column for quoted-printable and base64 bodies.
const BODY_WRAP: usize = 76;

/// Maximum length of a single RFC 2047 encoded word.
const MAX_ENCODED_WORD: usize = 75;

/// A message character set.
///
/// `us-ascii` and `utf-8` are handled natively; anything else resolves
/// through `encoding_rs` labels (`shift_jis`, `iso-2022-jp`,
/// `iso-8859-1`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
	UsAscii,
	Utf8,
	Other(&'static encoding_rs::Encoding),
}

impl Default for Charset {
	fn default() -> Self {
		Charset::Utf8
	}
}

impl Charset {
	/// Resolve a charset label.
	///
	/// # Examples
	///
	/// ```
	/// use mailroom::Charset;
	///
	/// assert_eq!(Charset::parse("UTF-8").unwrap(), Charset::Utf8);
	/// assert!(Charset::parse("shift_jis").is_ok());
	/// assert!(Charset::parse("no-such-charset").is_err());
	/// ```
	pub fn parse(label: &str) -> EmailResult<Self> {
		match label.to_ascii_lowercase().as_str() {
			"us-ascii" | "ascii" => Ok(Charset::UsAscii),
			"utf-8" | "utf8" => Ok(Charset::Utf8),
			other => encoding_rs::Encoding::for_label(other.as_bytes())
				.map(Charset::Other)
				.ok_or_else(|| {
					EmailError::Configuration(format!("unknown charset: {label}"))
				}),
		}
	}

	/// The MIME charset label emitted in `Content-Type` and encoded words.
	pub fn name(&self) -> String {
		match self {
			Charset::UsAscii => "us-ascii".to_string(),
			Charset::Utf8 => "utf-8".to_string(),
			Charset::Other(enc) => enc.name().to_ascii_lowercase(),
		}
	}

	/// Encode text into this charset.
	pub fn encode(&self, text: &str) -> EmailResult<Vec<u8>> {
		match self {
			Charset::UsAscii => {
				if text.is_ascii() {
					Ok(text.as_bytes().to_vec())
				} else {
					Err(EmailError::Encoding(
						"payload contains non-ASCII characters but charset is us-ascii"
							.to_string(),
					))
				}
			}
			Charset::Utf8 => Ok(text.as_bytes().to_vec()),
			Charset::Other(enc) => {
				let (bytes, _, had_errors) = enc.encode(text);
				if had_errors {
					Err(EmailError::Encoding(format!(
						"payload cannot be represented in charset {}",
						self.name()
					)))
				} else {
					Ok(bytes.into_owned())
				}
			}
		}
	}

	/// The designated body encoding applied when a payload is not
	/// 8-bit clean: base64 for the legacy multibyte charsets whose
	/// byte stream is hostile to line-oriented transports,
	/// quoted-printable for everything else.
	pub fn body_encoding(&self) -> TransferEncoding {
		match self {
			Charset::UsAscii | Charset::Utf8 => TransferEncoding::QuotedPrintable,
			Charset::Other(enc) => match enc.name() {
				"Shift_JIS" | "ISO-2022-JP" | "EUC-JP" | "Big5" | "EUC-KR" | "GBK"
				| "gb18030" | "UTF-16BE" | "UTF-16LE" => TransferEncoding::Base64,
				_ => TransferEncoding::QuotedPrintable,
			},
		}
	}
}

/// MIME content-transfer-encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
	SevenBit,
	EightBit,
	QuotedPrintable,
	Base64,
}

impl TransferEncoding {
	/// The RFC 2045 token for the `Content-Transfer-Encoding` header.
	pub fn token(&self) -> &'static str {
		match self {
			TransferEncoding::SevenBit => "7bit",
			TransferEncoding::EightBit => "8bit",
			TransferEncoding::QuotedPrintable => "quoted-printable",
			TransferEncoding::Base64 => "base64",
		}
	}
}

fn lines_fit(bytes: &[u8]) -> bool {
	bytes.split(|b| *b == b'\n').all(|line| {
		let line = line.strip_suffix(b"\r").unwrap_or(line);
		line.len() <= MAX_LINE_OCTETS
	})
}

/// Choose the most compact transfer encoding that round-trips safely.
///
/// Priority order:
/// 1. pure 7-bit ASCII with RFC-length lines passes through as `7bit`;
/// 2. charset-encoded bytes that are 8-bit clean (no NUL, no over-long
///    line) pass through as `8bit`;
/// 3. otherwise the charset's designated encoding transforms the bytes.
///
/// # Examples
///
/// ```
/// use mailroom::encoding::choose_encoding;
/// use mailroom::{Charset, TransferEncoding};
///
/// let (bytes, enc) = choose_encoding("plain text", &Charset::Utf8).unwrap();
/// assert_eq!(enc, TransferEncoding::SevenBit);
/// assert_eq!(bytes, b"plain text");
///
/// let (_, enc) = choose_encoding("àáä", &Charset::Utf8).unwrap();
/// assert_eq!(enc, TransferEncoding::EightBit);
/// ```
pub fn choose_encoding(text: &str, charset: &Charset) -> EmailResult<(Vec<u8>, TransferEncoding)> {
	if text.is_ascii() && !text.contains('\0') && lines_fit(text.as_bytes()) {
		return Ok((text.as_bytes().to_vec(), TransferEncoding::SevenBit));
	}

	let bytes = charset.encode(text)?;
	if !bytes.contains(&0) && lines_fit(&bytes) {
		return Ok((bytes, TransferEncoding::EightBit));
	}

	match charset.body_encoding() {
		TransferEncoding::Base64 => Ok((
			encode_base64_wrapped(&bytes).into_bytes(),
			TransferEncoding::Base64,
		)),
		_ => Ok((
			encode_quoted_printable(&bytes).into_bytes(),
			TransferEncoding::QuotedPrintable,
		)),
	}
}

/// Encode a body as quoted-printable (RFC 2045 §6.7).
///
/// Line structure is preserved: input line breaks become hard CRLF
/// breaks, over-long lines get `=` soft breaks, and trailing
/// space/tab on a line is escaped so transports cannot strip it.
pub fn encode_quoted_printable(data: &[u8]) -> String {
	let mut out = String::new();
	let mut first = true;

	for line in data.split(|b| *b == b'\n') {
		let line = line.strip_suffix(b"\r").unwrap_or(line);
		if !first {
			out.push_str("\r\n");
		}
		first = false;

		let mut col = 0;
		for (i, byte) in line.iter().enumerate() {
			let last = i + 1 == line.len();
			// Reserve room for "=XX" plus a soft-break marker.
			if col >= BODY_WRAP - 4 {
				out.push_str("=\r\n");
				col = 0;
			}
			match byte {
				b'=' => {
					out.push_str("=3D");
					col += 3;
				}
				b' ' | b'\t' if last => {
					let _ = write!(out, "={:02X}", byte);
					col += 3;
				}
				b' ' => {
					out.push(' ');
					col += 1;
				}
				b'\t' => {
					out.push('\t');
					col += 1;
				}
				b'!'..=b'~' => {
					out.push(*byte as char);
					col += 1;
				}
				_ => {
					let _ = write!(out, "={:02X}", byte);
					col += 3;
				}
			}
		}
	}

	out
}

/// Encode a body as base64 wrapped at 76 columns.
pub fn encode_base64_wrapped(data: &[u8]) -> String {
	let encoded = BASE64.encode(data);
	let mut out = String::with_capacity(encoded.len() + encoded.len() / BODY_WRAP * 2 + 2);
	let bytes = encoded.as_bytes();
	for chunk in bytes.chunks(BODY_WRAP) {
		if !out.is_empty() {
			out.push_str("\r\n");
		}
		// chunks of a base64 string are valid UTF-8
		out.push_str(std::str::from_utf8(chunk).unwrap_or_default());
	}
	out
}

/// Whether a header value needs RFC 2047 treatment at all.
pub fn needs_rfc2047(text: &str) -> bool {
	!text.is_ascii()
}

// Characters that survive Q-encoding unescaped. Everything outside
// this set (and space, which maps to '_') is written as =XX.
fn q_safe(byte: u8) -> bool {
	matches!(byte, b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'!' | b'*' | b'+' | b'-' | b'/')
}

fn q_encoded_len(bytes: &[u8]) -> usize {
	bytes
		.iter()
		.map(|b| if q_safe(*b) || *b == b' ' { 1 } else { 3 })
		.sum()
}

fn q_encode(bytes: &[u8]) -> String {
	let mut out = String::with_capacity(bytes.len());
	for byte in bytes {
		if *byte == b' ' {
			out.push('_');
		} else if q_safe(*byte) {
			out.push(*byte as char);
		} else {
			let _ = write!(out, "={:02X}", byte);
		}
	}
	out
}

/// Encode a header value as RFC 2047 encoded words.
///
/// The shorter of Q and B encoding is selected for the value as a
/// whole, and the payload is chunked so no single encoded word
/// exceeds 75 characters. Adjacent encoded words are joined with a
/// space, which decoders drop when unfolding.
///
/// # Examples
///
/// ```
/// use mailroom::encoding::encode_rfc2047;
/// use mailroom::Charset;
///
/// let word = encode_rfc2047("sübject", &Charset::Utf8).unwrap();
/// assert_eq!(word, "=?utf-8?q?s=C3=BCbject?=");
/// ```
pub fn encode_rfc2047(text: &str, charset: &Charset) -> EmailResult<String> {
	// Pick a charset that can actually hold the text; us-ascii cannot.
	let charset = match charset {
		Charset::UsAscii => &Charset::Utf8,
		other => other,
	};
	let name = charset.name();
	let overhead = name.len() + 7; // "=?" name "?x?" payload "?="
	let max_payload = MAX_ENCODED_WORD.saturating_sub(overhead);

	let whole = charset.encode(text)?;
	let use_base64 = base64_len(whole.len()) < q_encoded_len(&whole);

	let mut words = Vec::new();
	let mut chunk = String::new();
	let mut chunk_bytes = 0usize;

	for ch in text.chars() {
		let ch_bytes = charset.encode(&ch.to_string())?;
		let fits = if use_base64 {
			base64_len(chunk_bytes + ch_bytes.len()) <= max_payload
		} else {
			q_encoded_len(charset.encode(&format!("{chunk}{ch}"))?.as_slice()) <= max_payload
		};
		if !fits && !chunk.is_empty() {
			words.push(encode_word(&chunk, charset, &name, use_base64)?);
			chunk.clear();
			chunk_bytes = 0;
		}
		chunk.push(ch);
		chunk_bytes += ch_bytes.len();
	}
	if !chunk.is_empty() {
		words.push(encode_word(&chunk, charset, &name, use_base64)?);
	}

	Ok(words.join(" "))
}

fn base64_len(raw: usize) -> usize {
	raw.div_ceil(3) * 4
}

fn encode_word(
	chunk: &str,
	charset: &Charset,
	name: &str,
	use_base64: bool,
) -> EmailResult<String> {
	let bytes = charset.encode(chunk)?;
	Ok(if use_base64 {
		format!("=?{name}?b?{}?=", BASE64.encode(&bytes))
	} else {
		format!("=?{name}?q?{}?=", q_encode(&bytes))
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ascii_body_is_seven_bit() {
		let (bytes, enc) = choose_encoding("hello world", &Charset::Utf8).unwrap();
		assert_eq!(enc, TransferEncoding::SevenBit);
		assert_eq!(bytes, b"hello world");
	}

	#[test]
	fn latin_body_under_utf8_is_eight_bit() {
		let (bytes, enc) = choose_encoding("àáä", &Charset::Utf8).unwrap();
		assert_eq!(enc, TransferEncoding::EightBit);
		assert_eq!(bytes, "àáä".as_bytes());
	}

	#[test]
	fn long_cyrillic_line_falls_back_to_quoted_printable() {
		let body = "привет ".repeat(200);
		let (bytes, enc) = choose_encoding(&body, &Charset::Utf8).unwrap();
		assert_eq!(enc, TransferEncoding::QuotedPrintable);
		assert!(lines_fit(&bytes));
	}

	#[test]
	fn shift_jis_designates_base64() {
		let charset = Charset::parse("shift_jis").unwrap();
		assert_eq!(charset.body_encoding(), TransferEncoding::Base64);
	}

	#[test]
	fn ascii_under_us_ascii_passes_through() {
		let (_, enc) = choose_encoding("normal ascii text", &Charset::UsAscii).unwrap();
		assert_eq!(enc, TransferEncoding::SevenBit);
	}

	#[test]
	fn non_ascii_under_us_ascii_is_rejected() {
		assert!(matches!(
			choose_encoding("ünicode", &Charset::UsAscii),
			Err(EmailError::Encoding(_))
		));
	}

	#[test]
	fn quoted_printable_escapes_equals_and_preserves_lines() {
		let encoded = encode_quoted_printable(b"a=b\nnext line");
		assert_eq!(encoded, "a=3Db\r\nnext line");
	}

	#[test]
	fn quoted_printable_escapes_trailing_space() {
		let encoded = encode_quoted_printable(b"trailing \nx");
		assert_eq!(encoded, "trailing=20\r\nx");
	}

	#[test]
	fn quoted_printable_soft_breaks_long_lines() {
		let encoded = encode_quoted_printable("я".repeat(100).as_bytes());
		for line in encoded.split("\r\n") {
			assert!(line.len() <= BODY_WRAP);
		}
	}

	#[test]
	fn base64_wraps_at_76_columns() {
		let encoded = encode_base64_wrapped(&[0xffu8; 300]);
		for line in encoded.split("\r\n") {
			assert!(line.len() <= BODY_WRAP);
		}
	}

	#[test]
	fn rfc2047_mostly_ascii_uses_q() {
		let word = encode_rfc2047("sübject", &Charset::Utf8).unwrap();
		assert_eq!(word, "=?utf-8?q?s=C3=BCbject?=");
	}

	#[test]
	fn rfc2047_mostly_non_ascii_uses_b() {
		let word = encode_rfc2047("ÄÜÖ → ✓", &Charset::Utf8).unwrap();
		assert_eq!(word, "=?utf-8?b?w4TDnMOWIOKGkiDinJM=?=");
	}

	#[test]
	fn rfc2047_long_value_folds_into_multiple_words() {
		let word = encode_rfc2047(&"ü".repeat(100), &Charset::Utf8).unwrap();
		let words: Vec<&str> = word.split(' ').collect();
		assert!(words.len() > 1);
		for w in words {
			assert!(w.len() <= MAX_ENCODED_WORD);
			assert!(w.starts_with("=?utf-8?"));
			assert!(w.ends_with("?="));
		}
	}
}
