//! Console backend: renders every message to stdout.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use super::{DispatchDefaults, EmailBackend};
use crate::message::EmailMessage;
use crate::settings::EmailSettings;
use crate::EmailResult;

/// Development backend that writes rendered messages to stdout,
/// each followed by a 79-dash separator line.
#[derive(Debug, Clone, Default)]
pub struct ConsoleBackend {
	fail_silently: bool,
	defaults: DispatchDefaults,
}

impl ConsoleBackend {
	pub fn new() -> Self {
		Self::default()
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
			fail_silently,
			defaults: DispatchDefaults::from_settings(settings)?,
		}))
	}
}

#[async_trait]
impl EmailBackend for ConsoleBackend {
	async fn send_messages(&self, messages: &[EmailMessage]) -> EmailResult<usize> {
		let mut stdout = tokio::io::stdout();
		let mut sent = 0;
		for message in messages {
			// Encoding failures surface regardless of fail_silently.
			let rendered = message
				.render(self.defaults.from_email.as_deref(), self.defaults.charset)?;

			let mut output = rendered.as_bytes();
			output.extend_from_slice(b"\n");
			output.extend_from_slice("-".repeat(79).as_bytes());
			output.extend_from_slice(b"\n");

			match stdout.write_all(&output).await {
				Ok(()) => sent += 1,
				Err(error) if self.fail_silently => {
					warn!(%error, "console backend write failed");
				}
				Err(error) => return Err(error.into()),
			}
		}
		stdout.flush().await.ok();
		Ok(sent)
	}

	fn fail_silently(&self) -> bool {
		self.fail_silently
	}
}
