//! Dummy backend: accepts everything, delivers nothing.

use std::sync::Arc;

use async_trait::async_trait;

use super::EmailBackend;
use crate::message::EmailMessage;
use crate::settings::EmailSettings;
use crate::EmailResult;

/// Backend that counts messages without rendering or sending them.
/// Useful for disabling email in an environment without touching the
/// call sites.
#[derive(Debug, Clone, Copy, Default)]
pub struct DummyBackend {
	fail_silently: bool,
}

impl DummyBackend {
	pub fn new() -> Self {
		Self::default()
	}

	pub(crate) fn from_settings(
		_settings: &EmailSettings,
		fail_silently: bool,
	) -> EmailResult<Arc<dyn EmailBackend>> {
		Ok(Arc::new(Self { fail_silently }))
	}
}

#[async_trait]
impl EmailBackend for DummyBackend {
	async fn send_messages(&self, messages: &[EmailMessage]) -> EmailResult<usize> {
		Ok(messages.len())
	}

	fn fail_silently(&self) -> bool {
		self.fail_silently
	}
}
