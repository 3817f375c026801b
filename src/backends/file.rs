//! File backend: writes each message to its own log file.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{DispatchDefaults, EmailBackend};
use crate::message::EmailMessage;
use crate::settings::EmailSettings;
use crate::{EmailError, EmailResult};

/// Backend that saves every message under a directory, one
/// `{timestamp}-{random}.log` file per message. The directory is
/// created on demand.
#[derive(Debug, Clone)]
pub struct FileBackend {
	path: PathBuf,
	fail_silently: bool,
	defaults: DispatchDefaults,
}

impl FileBackend {
	pub fn new(path: PathBuf) -> Self {
		Self {
			path,
			fail_silently: false,
			defaults: DispatchDefaults::default(),
		}
	}

	pub fn with_fail_silently(mut self, fail_silently: bool) -> Self {
		self.fail_silently = fail_silently;
		self
	}

	/// The directory messages are written to.
	pub fn path(&self) -> &PathBuf {
		&self.path
	}

	pub(crate) fn from_settings(
		settings: &EmailSettings,
		fail_silently: bool,
	) -> EmailResult<Arc<dyn EmailBackend>> {
		let path = settings.file_path.clone().ok_or_else(|| {
			EmailError::Configuration(
				"the file email backend requires `file_path` to be set".to_string(),
			)
		})?;
		Ok(Arc::new(Self {
			path,
			fail_silently,
			defaults: DispatchDefaults::from_settings(settings)?,
		}))
	}

	// Timestamp plus a random component keeps names unique under
	// rapid or concurrent sends.
	fn unique_filename(&self) -> PathBuf {
		let timestamp = chrono::Utc::now().timestamp_millis();
		let unique: u32 = rand::random();
		self.path.join(format!("{timestamp}-{unique:08x}.log"))
	}

	async fn write_message(&self, message: &EmailMessage) -> EmailResult<()> {
		let rendered =
			message.render(self.defaults.from_email.as_deref(), self.defaults.charset)?;
		let target = self.unique_filename();
		tokio::fs::write(&target, rendered.as_bytes()).await?;
		debug!(path = %target.display(), "email written to file");
		Ok(())
	}
}

#[async_trait]
impl EmailBackend for FileBackend {
	async fn send_messages(&self, messages: &[EmailMessage]) -> EmailResult<usize> {
		if messages.is_empty() {
			return Ok(0);
		}
		tokio::fs::create_dir_all(&self.path).await?;

		let mut sent = 0;
		for message in messages {
			match self.write_message(message).await {
				Ok(()) => sent += 1,
				Err(error) if self.fail_silently && error.is_transport() => {
					warn!(%error, "file backend write failed");
				}
				Err(error) => return Err(error),
			}
		}
		Ok(sent)
	}

	fn fail_silently(&self) -> bool {
		self.fail_silently
	}
}
