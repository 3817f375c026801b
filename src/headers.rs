//! Header value encoding, validation and folding.
//!
//! The CR/LF check here is the sole defense against header injection:
//! a value containing a raw line break is rejected outright, never
//! stripped, and the rejection surfaces before any network I/O.

use crate::encoding::{encode_rfc2047, needs_rfc2047, MAX_LINE_OCTETS};
use crate::{Charset, EmailError, EmailResult};

/// Preferred fold column from RFC 5322 §2.1.1.
const FOLD_COLUMN: usize = 78;

/// Reject header values containing CR or LF.
///
/// # Examples
///
/// ```
/// use mailroom::headers::check_header_injection;
///
/// assert!(check_header_injection("Subject", "hello").is_ok());
/// assert!(check_header_injection("Subject", "hi\r\nEvil: header").is_err());
/// ```
pub fn check_header_injection(name: &str, value: &str) -> EmailResult<()> {
	if value.contains('\r') || value.contains('\n') {
		return Err(EmailError::BadHeader(format!(
			"header {name:?} contains an embedded line break: {value:?}"
		)));
	}
	Ok(())
}

/// Validate a header field name per RFC 5322 §2.2: printable ASCII
/// excluding colon, and non-empty.
pub fn validate_header_name(name: &str) -> EmailResult<()> {
	if name.is_empty()
		|| !name
			.bytes()
			.all(|b| (0x21..=0x7e).contains(&b) && b != b':')
	{
		return Err(EmailError::InvalidHeader(format!(
			"invalid header field name: {name:?}"
		)));
	}
	Ok(())
}

/// Encode a header value for the given charset.
///
/// ASCII values pass through untouched; non-ASCII values become
/// RFC 2047 encoded words. Injection is checked first in either case.
pub fn encode_header(name: &str, value: &str, charset: &Charset) -> EmailResult<String> {
	check_header_injection(name, value)?;
	if needs_rfc2047(value) {
		encode_rfc2047(value, charset)
	} else {
		Ok(value.to_string())
	}
}

/// Fold a header into physical lines, continuations starting with a
/// single space, so that unfolding reconstructs the semantic value.
///
/// Splitting happens only at word boundaries; a single word longer
/// than the hard RFC 5322 limit is left intact rather than corrupted.
pub fn fold_header(name: &str, value: &str) -> String {
	let lead = format!("{name}: ");
	let mut out = String::with_capacity(lead.len() + value.len());
	out.push_str(&lead);

	let mut col = lead.len();
	let mut first = true;
	for word in value.split(' ') {
		if first {
			out.push_str(word);
			col += word.len();
			first = false;
			continue;
		}
		// +1 for the joining space
		if col + 1 + word.len() > FOLD_COLUMN {
			out.push_str("\r\n ");
			col = 1;
		} else {
			out.push(' ');
			col += 1;
		}
		out.push_str(word);
		col += word.len();
	}

	out
}

/// Sanity check used at serialization time: no physical line may
/// exceed the hard RFC 5322 limit.
pub fn line_within_limits(line: &str) -> bool {
	line.len() <= MAX_LINE_OCTETS
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn crlf_in_value_is_rejected() {
		for value in ["evil\r\nX: y", "evil\r", "evil\n", "a\nb"] {
			assert!(matches!(
				check_header_injection("Subject", value),
				Err(EmailError::BadHeader(_))
			));
		}
	}

	#[test]
	fn plain_value_passes() {
		assert!(check_header_injection("Subject", "an ordinary subject").is_ok());
	}

	#[test]
	fn header_names_are_validated() {
		assert!(validate_header_name("X-Custom-Header").is_ok());
		assert!(validate_header_name("Bad Header").is_err());
		assert!(validate_header_name("Bad:Header").is_err());
		assert!(validate_header_name("").is_err());
	}

	#[test]
	fn ascii_value_passes_through_unencoded() {
		let encoded = encode_header("Subject", "plain subject", &Charset::Utf8).unwrap();
		assert_eq!(encoded, "plain subject");
	}

	#[test]
	fn non_ascii_value_becomes_encoded_word() {
		let encoded = encode_header("Subject", "sübject", &Charset::Utf8).unwrap();
		assert_eq!(encoded, "=?utf-8?q?s=C3=BCbject?=");
	}

	#[test]
	fn folding_keeps_lines_short_and_unfoldable() {
		let value = "word ".repeat(40);
		let folded = fold_header("Subject", value.trim_end());
		for line in folded.split("\r\n") {
			assert!(line.len() <= 78, "line too long: {line:?}");
		}
		// Unfolding (joining continuations on the space) restores the value.
		let unfolded = folded.replace("\r\n ", " ");
		assert_eq!(unfolded, format!("Subject: {}", value.trim_end()));
	}

	#[test]
	fn short_header_is_single_line() {
		assert_eq!(fold_header("Subject", "hi"), "Subject: hi");
	}
}
