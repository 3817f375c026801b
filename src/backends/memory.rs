//! In-memory backend: stores messages in an outbox for tests.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{DispatchDefaults, EmailBackend};
use crate::message::EmailMessage;
use crate::settings::EmailSettings;
use crate::EmailResult;

type Outbox = Arc<RwLock<Vec<EmailMessage>>>;

// The dispatcher hands out a fresh backend per get_connection call;
// sharing this outbox is what lets a test observe messages sent deep
// inside the code under test.
fn global_outbox() -> Outbox {
	static OUTBOX: std::sync::OnceLock<Outbox> = std::sync::OnceLock::new();
	OUTBOX.get_or_init(|| Arc::new(RwLock::new(Vec::new()))).clone()
}

/// Backend that appends messages to an in-memory outbox instead of
/// sending them. Each message is still rendered, so encoding errors
/// surface exactly as they would on a real backend.
///
/// # Examples
///
/// ```
/// use mailroom::{EmailMessage, MemoryBackend};
///
/// #[tokio::main]
/// async fn main() {
///     let backend = MemoryBackend::new();
///
///     let email = EmailMessage::builder()
///         .from("sender@example.com")
///         .to(vec!["recipient@example.com".to_string()])
///         .subject("Test")
///         .body("Hello!")
///         .build()
///         .unwrap();
///
///     email.send_with_backend(&backend).await.unwrap();
///
///     let sent = backend.sent_messages();
///     assert_eq!(sent.len(), 1);
///     assert_eq!(sent[0].subject(), "Test");
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
	outbox: Outbox,
	fail_silently: bool,
	defaults: DispatchDefaults,
}

impl MemoryBackend {
	/// Create a backend with its own private outbox.
	pub fn new() -> Self {
		Self::default()
	}

	/// Create a backend bound to the process-global outbox, shared by
	/// every instance the dispatcher creates.
	pub fn shared() -> Self {
		Self {
			outbox: global_outbox(),
			fail_silently: false,
			defaults: DispatchDefaults::default(),
		}
	}

	pub fn with_fail_silently(mut self, fail_silently: bool) -> Self {
		self.fail_silently = fail_silently;
		self
	}

	pub(crate) fn from_settings(
		settings: &EmailSettings,
		fail_silently: bool,
	) -> EmailResult<Arc<dyn EmailBackend>> {
		Ok(Arc::new(Self {
			outbox: global_outbox(),
			fail_silently,
			defaults: DispatchDefaults::from_settings(settings)?,
		}))
	}

	/// Get all stored messages.
	pub fn sent_messages(&self) -> Vec<EmailMessage> {
		self.outbox.read().clone()
	}

	/// Count stored messages.
	pub fn count(&self) -> usize {
		self.outbox.read().len()
	}

	/// Clear the outbox. Never happens implicitly.
	pub fn clear(&self) {
		self.outbox.write().clear();
	}

	/// Find stored messages by subject.
	pub fn find_by_subject(&self, subject: &str) -> Vec<EmailMessage> {
		self.outbox
			.read()
			.iter()
			.filter(|message| message.subject() == subject)
			.cloned()
			.collect()
	}
}

#[async_trait]
impl EmailBackend for MemoryBackend {
	async fn send_messages(&self, messages: &[EmailMessage]) -> EmailResult<usize> {
		let mut sent = 0;
		for message in messages {
			// Render first: an unencodable message must fail here, not
			// silently land in the outbox.
			message.render(self.defaults.from_email.as_deref(), self.defaults.charset)?;
			self.outbox.write().push(message.clone());
			sent += 1;
		}
		Ok(sent)
	}

	fn fail_silently(&self) -> bool {
		self.fail_silently
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample(subject: &str) -> EmailMessage {
		EmailMessage::builder()
			.from("sender@example.com")
			.to(vec!["recipient@example.com".to_string()])
			.subject(subject)
			.body("body")
			.build()
			.unwrap()
	}

	#[tokio::test]
	async fn stores_and_clears_messages() {
		let backend = MemoryBackend::new();
		backend
			.send_messages(&[sample("first"), sample("second")])
			.await
			.unwrap();
		assert_eq!(backend.count(), 2);

		backend.clear();
		assert_eq!(backend.count(), 0);
	}

	#[tokio::test]
	async fn find_by_subject_filters() {
		let backend = MemoryBackend::new();
		backend
			.send_messages(&[sample("important"), sample("newsletter")])
			.await
			.unwrap();

		let found = backend.find_by_subject("important");
		assert_eq!(found.len(), 1);
		assert_eq!(found[0].subject(), "important");
	}

	#[tokio::test]
	async fn instances_have_private_outboxes() {
		let first = MemoryBackend::new();
		let second = MemoryBackend::new();
		first.send_messages(&[sample("only in first")]).await.unwrap();

		assert_eq!(first.count(), 1);
		assert_eq!(second.count(), 0);
	}
}
