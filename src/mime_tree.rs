//! MIME part tree and byte-exact serialization.
//!
//! No wire format is invented here: output is plain RFC 5322/2045 with
//! CRLF line endings and folded headers, built as a tree of parts that
//! the message assembler composes (alternative and mixed nesting).

use crate::encoding::{choose_encoding, encode_base64_wrapped, Charset, TransferEncoding};
use crate::headers::fold_header;
use crate::EmailResult;

/// The root of a rendered message is just the outermost part.
pub type MimeMessage = MimePart;

/// One MIME entity: headers plus either a body or nested parts.
#[derive(Debug, Clone)]
pub struct MimePart {
	headers: Vec<(String, String)>,
	content: PartContent,
}

#[derive(Debug, Clone)]
enum PartContent {
	Body(Vec<u8>),
	Multipart {
		boundary: String,
		parts: Vec<MimePart>,
	},
}

/// Random boundary in the Python generator's recognizable shape.
fn make_boundary() -> String {
	format!(
		"==============={:016x}{:04x}==",
		rand::random::<u64>(),
		rand::random::<u16>()
	)
}

// CRLF-normalize text that will be emitted verbatim (7bit/8bit).
fn normalize_crlf(text: &[u8]) -> Vec<u8> {
	let mut out = Vec::with_capacity(text.len());
	let mut prev_cr = false;
	for &byte in text {
		match byte {
			b'\n' if !prev_cr => out.extend_from_slice(b"\r\n"),
			b'\n' => out.push(b'\n'),
			_ => out.push(byte),
		}
		prev_cr = byte == b'\r';
	}
	out
}

impl MimePart {
	/// Build a `text/*` part, choosing the transfer encoding via the
	/// 7bit → 8bit → quoted-printable/base64 ladder.
	pub fn text(content: &str, subtype: &str, charset: &Charset) -> EmailResult<Self> {
		let (payload, encoding) = choose_encoding(content, charset)?;
		let body = match encoding {
			TransferEncoding::SevenBit | TransferEncoding::EightBit => normalize_crlf(&payload),
			_ => payload,
		};
		Ok(Self {
			headers: vec![
				(
					"Content-Type".to_string(),
					format!("text/{subtype}; charset=\"{}\"", charset.name()),
				),
				("MIME-Version".to_string(), "1.0".to_string()),
				(
					"Content-Transfer-Encoding".to_string(),
					encoding.token().to_string(),
				),
			],
			content: PartContent::Body(body),
		})
	}

	/// Build a binary part, base64-encoded.
	pub fn binary(content_type: &str, data: &[u8]) -> Self {
		Self {
			headers: vec![
				("Content-Type".to_string(), content_type.to_string()),
				("MIME-Version".to_string(), "1.0".to_string()),
				(
					"Content-Transfer-Encoding".to_string(),
					TransferEncoding::Base64.token().to_string(),
				),
			],
			content: PartContent::Body(encode_base64_wrapped(data).into_bytes()),
		}
	}

	/// Build a part whose payload is embedded verbatim with an 8bit
	/// transfer encoding. Used for `message/rfc822` attachments, which
	/// must never be base64-encoded so nested headers stay readable.
	pub fn verbatim(content_type: &str, data: &[u8]) -> Self {
		Self {
			headers: vec![
				("Content-Type".to_string(), content_type.to_string()),
				("MIME-Version".to_string(), "1.0".to_string()),
				(
					"Content-Transfer-Encoding".to_string(),
					TransferEncoding::EightBit.token().to_string(),
				),
			],
			content: PartContent::Body(data.to_vec()),
		}
	}

	/// Build a multipart container with a fresh random boundary.
	pub fn multipart(subtype: &str, parts: Vec<MimePart>) -> Self {
		let boundary = make_boundary();
		Self {
			headers: vec![
				(
					"Content-Type".to_string(),
					format!("multipart/{subtype}; boundary=\"{boundary}\""),
				),
				("MIME-Version".to_string(), "1.0".to_string()),
			],
			content: PartContent::Multipart {
				boundary,
				parts,
			},
		}
	}

	/// Append a header. No uniqueness check; use [`MimePart::set_header`]
	/// to replace.
	pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
		self.headers.push((name.into(), value.into()));
	}

	/// Replace a header (case-insensitive name match), appending when absent.
	pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
		let value = value.into();
		for (existing, existing_value) in &mut self.headers {
			if existing.eq_ignore_ascii_case(name) {
				*existing_value = value;
				return;
			}
		}
		self.headers.push((name.to_string(), value));
	}

	/// Case-insensitive header lookup.
	pub fn get_header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(n, _)| n.eq_ignore_ascii_case(name))
			.map(|(_, v)| v.as_str())
	}

	/// All headers in emission order.
	pub fn headers(&self) -> &[(String, String)] {
		&self.headers
	}

	/// Nested parts of a multipart container, empty for leaf parts.
	pub fn parts(&self) -> &[MimePart] {
		match &self.content {
			PartContent::Multipart { parts, .. } => parts,
			PartContent::Body(_) => &[],
		}
	}

	/// Raw body payload of a leaf part (transfer-encoded form).
	pub fn payload(&self) -> Option<&[u8]> {
		match &self.content {
			PartContent::Body(body) => Some(body),
			PartContent::Multipart { .. } => None,
		}
	}

	/// Whether this part is a multipart container.
	pub fn is_multipart(&self) -> bool {
		matches!(self.content, PartContent::Multipart { .. })
	}

	/// Attach a `Content-Disposition: attachment` header, with the
	/// filename parameter in RFC 2231/8187 extended form when it is
	/// not plain ASCII.
	pub fn set_attachment_disposition(&mut self, filename: Option<&str>) {
		let value = match filename {
			Some(name) => format!("attachment; {}", encode_filename_param(name)),
			None => "attachment".to_string(),
		};
		self.set_header("Content-Disposition", value);
	}

	/// Serialize to the exact wire bytes (CRLF line endings, folded headers).
	pub fn as_bytes(&self) -> Vec<u8> {
		let mut out = Vec::new();
		self.write(&mut out);
		out
	}

	/// Lossy string view of [`MimePart::as_bytes`], for tests and the
	/// console/file backends.
	pub fn as_string(&self) -> String {
		String::from_utf8_lossy(&self.as_bytes()).into_owned()
	}

	fn write(&self, out: &mut Vec<u8>) {
		for (name, value) in &self.headers {
			out.extend_from_slice(fold_header(name, value).as_bytes());
			out.extend_from_slice(b"\r\n");
		}
		out.extend_from_slice(b"\r\n");
		match &self.content {
			PartContent::Body(body) => {
				out.extend_from_slice(body);
				out.extend_from_slice(b"\r\n");
			}
			PartContent::Multipart { boundary, parts } => {
				for part in parts {
					out.extend_from_slice(b"--");
					out.extend_from_slice(boundary.as_bytes());
					out.extend_from_slice(b"\r\n");
					part.write(out);
				}
				out.extend_from_slice(b"--");
				out.extend_from_slice(boundary.as_bytes());
				out.extend_from_slice(b"--\r\n");
			}
		}
	}
}

// RFC 8187 attr-char: characters a parameter value may carry without
// percent-encoding.
fn is_attr_char(byte: u8) -> bool {
	byte.is_ascii_alphanumeric()
		|| matches!(
			byte,
			b'!' | b'#' | b'$' | b'&' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~'
		)
}

/// Encode the `filename` parameter of `Content-Disposition`, switching
/// to the `filename*=utf-8''%XX` extended syntax for non-ASCII names.
pub fn encode_filename_param(filename: &str) -> String {
	if filename.is_ascii() && !filename.contains('"') && !filename.contains('\\') {
		format!("filename=\"{filename}\"")
	} else {
		let mut encoded = String::from("filename*=utf-8''");
		for byte in filename.bytes() {
			if is_attr_char(byte) {
				encoded.push(byte as char);
			} else {
				encoded.push_str(&format!("%{byte:02X}"));
			}
		}
		encoded
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn text_part_has_content_headers() {
		let part = MimePart::text("hello", "plain", &Charset::Utf8).unwrap();
		assert_eq!(
			part.get_header("Content-Type"),
			Some("text/plain; charset=\"utf-8\"")
		);
		assert_eq!(part.get_header("Content-Transfer-Encoding"), Some("7bit"));
		assert_eq!(part.payload(), Some(b"hello".as_ref()));
	}

	#[test]
	fn text_part_normalizes_line_endings() {
		let part = MimePart::text("line one\nline two", "plain", &Charset::Utf8).unwrap();
		assert_eq!(part.payload(), Some(b"line one\r\nline two".as_ref()));
	}

	#[test]
	fn multipart_serialization_has_boundaries() {
		let inner = MimePart::text("hi", "plain", &Charset::Utf8).unwrap();
		let outer = MimePart::multipart("mixed", vec![inner]);
		let rendered = outer.as_string();
		let boundary = outer
			.get_header("Content-Type")
			.and_then(|ct| ct.split("boundary=\"").nth(1))
			.and_then(|rest| rest.strip_suffix('"'))
			.unwrap()
			.to_string();
		assert!(rendered.contains(&format!("--{boundary}\r\n")));
		assert!(rendered.contains(&format!("--{boundary}--\r\n")));
	}

	#[test]
	fn ascii_filename_is_quoted() {
		assert_eq!(
			encode_filename_param("test doc.txt"),
			"filename=\"test doc.txt\""
		);
	}

	#[test]
	fn unicode_filename_uses_extended_syntax() {
		assert_eq!(
			encode_filename_param("ünicöde ←→ ✓.txt"),
			"filename*=utf-8''%C3%BCnic%C3%B6de%20%E2%86%90%E2%86%92%20%E2%9C%93.txt"
		);
	}

	#[test]
	fn header_replacement_is_case_insensitive() {
		let mut part = MimePart::text("x", "plain", &Charset::Utf8).unwrap();
		part.set_header("content-type", "text/plain");
		assert_eq!(part.get_header("Content-Type"), Some("text/plain"));
	}
}
