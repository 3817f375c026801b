//! Mailbox sanitization and address validation.
//!
//! Normalizes a mailbox specification (bare address, `Display Name
//! <addr>` string, or a `(display, address)` pair) into a correctly
//! encoded RFC 5322 mailbox: IDNA for the domain, RFC 2047 for
//! non-ASCII display names and local parts, minimal quoting otherwise.

use crate::encoding::{encode_rfc2047, needs_rfc2047};
use crate::{Charset, EmailError, EmailResult};

/// Maximum total length of an address accepted for transmission
/// (RFC 5321 §4.5.3.1.3 forward-path limit minus the angle brackets).
pub const MAX_EMAIL_LENGTH: usize = 254;

/// A mailbox specification as accepted by the public API.
///
/// # Examples
///
/// ```
/// use mailroom::AddressSpec;
///
/// let bare = AddressSpec::from("user@example.com");
/// let named = AddressSpec::from(("Jane Doe", "jane@example.com"));
/// assert_eq!(bare.raw_address(), "user@example.com");
/// assert_eq!(named.raw_address(), "jane@example.com");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressSpec {
	/// A bare address or a full `Display Name <addr>` string.
	Raw(String),
	/// An explicit (display name, address) pair.
	Named { name: String, address: String },
}

impl AddressSpec {
	/// The address portion without any display name.
	pub fn raw_address(&self) -> &str {
		match self {
			AddressSpec::Raw(raw) => match (raw.rfind('<'), raw.rfind('>')) {
				(Some(open), Some(close)) if open < close => &raw[open + 1..close],
				_ => raw,
			},
			AddressSpec::Named { address, .. } => address,
		}
	}
}

impl From<&str> for AddressSpec {
	fn from(raw: &str) -> Self {
		AddressSpec::Raw(raw.to_string())
	}
}

impl From<String> for AddressSpec {
	fn from(raw: String) -> Self {
		AddressSpec::Raw(raw)
	}
}

impl From<&String> for AddressSpec {
	fn from(raw: &String) -> Self {
		AddressSpec::Raw(raw.clone())
	}
}

impl<N: Into<String>, A: Into<String>> From<(N, A)> for AddressSpec {
	fn from((name, address): (N, A)) -> Self {
		AddressSpec::Named {
			name: name.into(),
			address: address.into(),
		}
	}
}

/// Split a mailbox string into display name and address.
///
/// `Jane <jane@x.com>` and `"Jane" <jane@x.com>` both yield
/// `(Some("Jane"), "jane@x.com")`; a bare address yields `(None, addr)`.
pub fn parse_mailbox(raw: &str) -> EmailResult<(Option<String>, String)> {
	match (raw.find('<'), raw.rfind('>')) {
		(Some(open), Some(close)) if open < close => {
			let address = raw[open + 1..close].to_string();
			let name = raw[..open].trim();
			let name = name
				.strip_prefix('"')
				.and_then(|n| n.strip_suffix('"'))
				.map(|n| n.replace("\\\"", "\"").replace("\\\\", "\\"))
				.unwrap_or_else(|| name.to_string());
			if name.is_empty() {
				Ok((None, address))
			} else {
				Ok((Some(name), address))
			}
		}
		(Some(_), _) => Err(EmailError::InvalidAddress(format!(
			"unbalanced angle brackets in {raw:?}"
		))),
		_ => Ok((None, raw.trim().to_string())),
	}
}

// Splits on the single '@' that sits outside any quoted local part.
fn split_addr(address: &str) -> EmailResult<(&str, &str)> {
	let mut in_quotes = false;
	let mut escaped = false;
	let mut at: Option<usize> = None;

	for (i, ch) in address.char_indices() {
		if escaped {
			escaped = false;
			continue;
		}
		match ch {
			'\\' if in_quotes => escaped = true,
			'"' => in_quotes = !in_quotes,
			'@' if !in_quotes => {
				if at.is_some() {
					return Err(EmailError::InvalidAddress(format!(
						"multiple '@' in address {address:?}"
					)));
				}
				at = Some(i);
			}
			_ => {}
		}
	}

	let at = at.ok_or_else(|| {
		EmailError::InvalidAddress(format!("missing '@' in address {address:?}"))
	})?;
	let (local, domain) = address.split_at(at);
	Ok((local, &domain[1..]))
}

fn strip_quotes(local: &str) -> String {
	local
		.strip_prefix('"')
		.and_then(|l| l.strip_suffix('"'))
		.map(|l| l.replace("\\\"", "\"").replace("\\\\", "\\"))
		.unwrap_or_else(|| local.to_string())
}

// RFC 5322 atext, the characters allowed in an unquoted local part.
fn is_atext(ch: char) -> bool {
	ch.is_ascii_alphanumeric()
		|| matches!(
			ch,
			'!' | '#' | '$' | '%' | '&' | '\'' | '*' | '+' | '-' | '/' | '=' | '?' | '^'
				| '_' | '`' | '{' | '|' | '}' | '~' | '.'
		)
}

fn quote_string(value: &str) -> String {
	format!(
		"\"{}\"",
		value.replace('\\', "\\\\").replace('"', "\\\"")
	)
}

/// Validate an address for use in a recipient field.
///
/// Accepts bare addresses and `Display Name <addr>` strings. This is
/// the builder-time check; full encoding happens in [`sanitize_address`].
pub fn validate_email(raw: &str) -> EmailResult<()> {
	if raw.contains('\r') || raw.contains('\n') {
		return Err(EmailError::InvalidAddress(format!(
			"address contains an embedded line break: {raw:?}"
		)));
	}
	let (_, address) = parse_mailbox(raw)?;
	if address.len() > MAX_EMAIL_LENGTH {
		return Err(EmailError::InvalidAddress(format!(
			"address exceeds {MAX_EMAIL_LENGTH} characters"
		)));
	}
	let (local, domain) = split_addr(&address)?;
	if local.is_empty() || domain.is_empty() {
		return Err(EmailError::InvalidAddress(format!(
			"empty local part or domain in {address:?}"
		)));
	}
	Ok(())
}

/// Validate every entry of a recipient list, ignoring empty strings
/// (they are filtered out before address resolution).
pub fn validate_email_list(addresses: &[String]) -> EmailResult<()> {
	for address in addresses {
		if !address.is_empty() {
			validate_email(address)?;
		}
	}
	Ok(())
}

/// Normalize a mailbox specification into an encoded RFC 5322 mailbox.
///
/// # Examples
///
/// ```
/// use mailroom::{sanitize_address, Charset};
///
/// let mailbox = sanitize_address(("Jane", "jane@example.com"), &Charset::Utf8).unwrap();
/// assert_eq!(mailbox, "Jane <jane@example.com>");
///
/// let idn = sanitize_address("user@bücher.de", &Charset::Utf8).unwrap();
/// assert_eq!(idn, "user@xn--bcher-kva.de");
/// ```
pub fn sanitize_address(
	spec: impl Into<AddressSpec>,
	charset: &Charset,
) -> EmailResult<String> {
	let (name, address) = match spec.into() {
		AddressSpec::Raw(raw) => {
			if raw.contains('\r') || raw.contains('\n') {
				return Err(EmailError::InvalidAddress(format!(
					"address contains an embedded line break: {raw:?}"
				)));
			}
			parse_mailbox(&raw)?
		}
		AddressSpec::Named { name, address } => {
			for part in [&name, &address] {
				if part.contains('\r') || part.contains('\n') {
					return Err(EmailError::InvalidAddress(format!(
						"address contains an embedded line break: {part:?}"
					)));
				}
			}
			((!name.is_empty()).then_some(name), address)
		}
	};

	let (local, domain) = split_addr(&address)?;
	if local.is_empty() || domain.is_empty() {
		return Err(EmailError::InvalidAddress(format!(
			"empty local part or domain in {address:?}"
		)));
	}

	let domain = if domain.is_ascii() {
		domain.to_string()
	} else {
		idna::domain_to_ascii(domain).map_err(|e| {
			EmailError::InvalidAddress(format!("invalid international domain {domain:?}: {e}"))
		})?
	};

	let bare = strip_quotes(local);
	let local = if needs_rfc2047(&bare) {
		encode_rfc2047(&bare, charset)?
	} else if bare.chars().all(is_atext) {
		bare
	} else {
		// A local part with '@' or other specials must be quoted.
		quote_string(&bare)
	};

	let mailbox = format!("{local}@{domain}");
	match name {
		Some(name) => {
			let name = encode_display_name(&name, charset)?;
			Ok(format!("{name} <{mailbox}>"))
		}
		None => Ok(mailbox),
	}
}

// Display names pass through as plain text when they are ordinary
// ASCII, get minimally quoted when they contain specials, and become
// RFC 2047 encoded words when non-ASCII.
fn encode_display_name(name: &str, charset: &Charset) -> EmailResult<String> {
	if needs_rfc2047(name) {
		return encode_rfc2047(name, charset);
	}
	let needs_quoting = name
		.chars()
		.any(|ch| matches!(ch, '(' | ')' | '<' | '>' | '[' | ']' | ':' | ';' | '@' | '\\' | ',' | '"'));
	if needs_quoting {
		Ok(quote_string(name))
	} else {
		Ok(name.to_string())
	}
}

/// Sanitize a full recipient list, dropping empty entries.
pub fn sanitize_address_list(
	addresses: &[String],
	charset: &Charset,
) -> EmailResult<Vec<String>> {
	addresses
		.iter()
		.filter(|addr| !addr.is_empty())
		.map(|addr| sanitize_address(addr.as_str(), charset))
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bare_address_passes_through() {
		let out = sanitize_address("to@example.com", &Charset::Utf8).unwrap();
		assert_eq!(out, "to@example.com");
	}

	#[test]
	fn pair_round_trips_through_parse() {
		let out = sanitize_address(("Name", "addr@example.com"), &Charset::Utf8).unwrap();
		assert_eq!(out, "Name <addr@example.com>");
		let (name, addr) = parse_mailbox(&out).unwrap();
		assert_eq!(name.as_deref(), Some("Name"));
		assert_eq!(addr, "addr@example.com");
	}

	#[test]
	fn display_string_form_is_parsed() {
		let out =
			sanitize_address("tester <tester@example.com>", &Charset::Utf8).unwrap();
		assert_eq!(out, "tester <tester@example.com>");
	}

	#[test]
	fn quoted_display_name_is_unquoted_then_requoted_only_if_needed() {
		let out = sanitize_address("\"Jane\" <jane@example.com>", &Charset::Utf8).unwrap();
		assert_eq!(out, "Jane <jane@example.com>");
	}

	#[test]
	fn display_name_with_comma_gets_quoted() {
		let out = sanitize_address(("Doe, Jane", "jane@example.com"), &Charset::Utf8).unwrap();
		assert_eq!(out, "\"Doe, Jane\" <jane@example.com>");
	}

	#[test]
	fn unicode_display_name_is_word_encoded() {
		let out = sanitize_address(("ÄÜÖ → ✓", "from@example.com"), &Charset::Utf8).unwrap();
		assert_eq!(out, "=?utf-8?b?w4TDnMOWIOKGkiDinJM=?= <from@example.com>");
	}

	#[test]
	fn unicode_domain_is_idna_encoded() {
		let out = sanitize_address("user@bücher.de", &Charset::Utf8).unwrap();
		assert_eq!(out, "user@xn--bcher-kva.de");
	}

	#[test]
	fn unicode_local_part_is_word_encoded() {
		let out = sanitize_address("üser@example.com", &Charset::Utf8).unwrap();
		assert_eq!(out, "=?utf-8?b?w7xzZXI=?=@example.com");
	}

	#[test]
	fn quoted_local_part_with_at_stays_quoted() {
		let out = sanitize_address("\"weird@local\"@example.com", &Charset::Utf8).unwrap();
		assert_eq!(out, "\"weird@local\"@example.com");
	}

	#[test]
	fn multiple_at_signs_are_rejected() {
		assert!(matches!(
			sanitize_address("a@b@example.com", &Charset::Utf8),
			Err(EmailError::InvalidAddress(_))
		));
	}

	#[test]
	fn empty_local_or_domain_is_rejected() {
		for addr in ["@example.com", "user@", "@"] {
			assert!(sanitize_address(addr, &Charset::Utf8).is_err(), "{addr}");
		}
	}

	#[test]
	fn embedded_newline_is_rejected() {
		assert!(matches!(
			sanitize_address("to\r\n@example.com", &Charset::Utf8),
			Err(EmailError::InvalidAddress(_))
		));
	}

	#[test]
	fn list_sanitization_drops_empty_entries() {
		let out = sanitize_address_list(
			&[
				"a@x.com".to_string(),
				String::new(),
				"b@x.com".to_string(),
			],
			&Charset::Utf8,
		)
		.unwrap();
		assert_eq!(out, vec!["a@x.com", "b@x.com"]);
	}
}
