//! Cached hostname, Message-ID generation and the one-shot send helpers.

use parking_lot::RwLock;

use crate::backends::get_connection;
use crate::message::EmailMessage;
use crate::settings::EmailSettings;
use crate::EmailResult;

/// Process-wide cached fully qualified hostname, resolved lazily on
/// first use and reused for every Message-ID afterwards.
///
/// [`CachedHostname::invalidate`] drops the cache so the next call
/// re-resolves; tests use it to observe a hostname change.
pub struct CachedHostname {
	cached: RwLock<Option<String>>,
}

impl CachedHostname {
	/// The cached FQDN, resolving it on first call. Non-ASCII
	/// hostnames are punycoded so the value is safe inside headers.
	pub fn get(&self) -> String {
		if let Some(name) = self.cached.read().as_deref() {
			return name.to_string();
		}
		let resolved = resolve_fqdn();
		*self.cached.write() = Some(resolved.clone());
		resolved
	}

	/// Drop the cached value; the next [`CachedHostname::get`] resolves
	/// again.
	pub fn invalidate(&self) {
		*self.cached.write() = None;
	}
}

/// The shared hostname cache used for Message-ID domains.
pub static DNS_NAME: CachedHostname = CachedHostname {
	cached: RwLock::new(None),
};

fn resolve_fqdn() -> String {
	let name = hostname::get()
		.ok()
		.map(|host| host.to_string_lossy().into_owned())
		.filter(|name| !name.is_empty())
		.unwrap_or_else(|| "localhost".to_string());
	if name.is_ascii() {
		name
	} else {
		idna::domain_to_ascii(&name).unwrap_or_else(|_| "localhost".to_string())
	}
}

/// Build a unique RFC 5322 §3.6.4 Message-ID for the given domain:
/// `<{microseconds}.{pid}.{random}@domain>`.
pub fn make_msgid(domain: &str) -> String {
	let timestamp = chrono::Utc::now().timestamp_micros();
	let pid = std::process::id();
	let unique: u64 = rand::random();
	format!("<{timestamp}.{pid}.{unique}@{domain}>")
}

/// Send a single email to a list of recipients.
///
/// Convenience wrapper over [`EmailMessage`] and the backend
/// dispatcher; returns the number of messages sent (0 or 1).
pub async fn send_mail(
	settings: &EmailSettings,
	subject: &str,
	message: &str,
	from_email: Option<&str>,
	recipient_list: Vec<String>,
	fail_silently: bool,
	html_message: Option<&str>,
) -> EmailResult<usize> {
	let mut builder = EmailMessage::builder()
		.subject(subject)
		.body(message)
		.to(recipient_list);
	if let Some(from) = from_email {
		builder = builder.from(from);
	}
	if let Some(html) = html_message {
		builder = builder.html(html);
	}
	let email = builder.build()?;
	email.send(settings, fail_silently).await
}

/// Send multiple emails over a single backend connection.
///
/// Each tuple is `(subject, message, from_email, recipient_list)`; a
/// `None` sender falls back to the configured default at dispatch.
/// Returns the number of messages sent.
pub async fn send_mass_mail(
	settings: &EmailSettings,
	datatuple: Vec<(String, String, Option<String>, Vec<String>)>,
	fail_silently: bool,
) -> EmailResult<usize> {
	let mut messages = Vec::with_capacity(datatuple.len());
	for (subject, message, from_email, recipient_list) in datatuple {
		messages.push(EmailMessage::new(subject, message, from_email, recipient_list)?);
	}
	if messages.is_empty() {
		return Ok(0);
	}
	let connection = get_connection(settings, None, fail_silently)?;
	connection.send_messages(&messages).await
}

/// Mail the site admins from `settings.admins`, using `server_email`
/// as sender and prefixing the subject with `subject_prefix`.
pub async fn mail_admins(
	settings: &EmailSettings,
	subject: &str,
	message: &str,
	fail_silently: bool,
	html_message: Option<&str>,
) -> EmailResult<usize> {
	mail_staff(settings, &settings.admins, subject, message, fail_silently, html_message).await
}

/// Mail the site managers from `settings.managers`; otherwise
/// identical to [`mail_admins`].
pub async fn mail_managers(
	settings: &EmailSettings,
	subject: &str,
	message: &str,
	fail_silently: bool,
	html_message: Option<&str>,
) -> EmailResult<usize> {
	mail_staff(settings, &settings.managers, subject, message, fail_silently, html_message).await
}

async fn mail_staff(
	settings: &EmailSettings,
	staff: &[(String, String)],
	subject: &str,
	message: &str,
	fail_silently: bool,
	html_message: Option<&str>,
) -> EmailResult<usize> {
	if staff.is_empty() {
		return Ok(0);
	}
	let recipients: Vec<String> = staff.iter().map(|(_, address)| address.clone()).collect();
	let mut builder = EmailMessage::builder()
		.subject(format!("{}{subject}", settings.subject_prefix))
		.body(message)
		.from(settings.server_email.clone())
		.to(recipients);
	if let Some(html) = html_message {
		builder = builder.html(html);
	}
	let email = builder.build()?;
	email.send(settings, fail_silently).await
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn msgid_is_bracketed_and_unique() {
		let first = make_msgid("mail.example.com");
		let second = make_msgid("mail.example.com");
		assert!(first.starts_with('<'));
		assert!(first.ends_with("@mail.example.com>"));
		assert_ne!(first, second);
	}

	#[test]
	fn hostname_is_cached_until_invalidated() {
		let first = DNS_NAME.get();
		assert!(!first.is_empty());
		assert_eq!(DNS_NAME.get(), first);
		DNS_NAME.invalidate();
		// Re-resolution lands on the same machine name, but the cache
		// was genuinely dropped and rebuilt.
		assert_eq!(DNS_NAME.get(), first);
	}
}
