//! Delivery backends and the dispatcher that resolves them.
//!
//! A backend consumes fully built [`EmailMessage`]s; all encoding
//! happens before any backend I/O, so an invalid message fails
//! identically on every backend.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::message::EmailMessage;
use crate::settings::EmailSettings;
use crate::{EmailError, EmailResult};

mod console;
mod dummy;
mod file;
mod memory;
mod smtp;

pub use console::ConsoleBackend;
pub use dummy::DummyBackend;
pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use smtp::{SmtpAuthMechanism, SmtpBackend, SmtpConfig, SmtpSecurity};

/// Trait for email delivery backends.
///
/// Backends serialize open/send/close internally, so a shared instance
/// can be used from several tasks without interleaving connections.
#[async_trait]
pub trait EmailBackend: Send + Sync + std::fmt::Debug {
	/// Open a connection if the backend holds one. Returns `true` when
	/// a fresh connection was created, `false` when one was already
	/// open (or the backend needs none).
	async fn open(&self) -> EmailResult<bool> {
		Ok(false)
	}

	/// Close the connection if one is open. Never fails on an already
	/// closed backend.
	async fn close(&self) -> EmailResult<()> {
		Ok(())
	}

	/// Deliver the given messages, returning how many were sent.
	async fn send_messages(&self, messages: &[EmailMessage]) -> EmailResult<usize>;

	/// Whether transport errors are swallowed instead of propagated.
	fn fail_silently(&self) -> bool {
		false
	}
}

/// The built-in backend identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
	Smtp,
	Console,
	File,
	Memory,
	Dummy,
}

/// Identifiers accepted by [`get_connection`], quoted in the
/// unknown-backend error.
pub const AVAILABLE_BACKENDS: [&str; 5] = ["smtp", "console", "file", "memory", "dummy"];

impl BackendKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			BackendKind::Smtp => "smtp",
			BackendKind::Console => "console",
			BackendKind::File => "file",
			BackendKind::Memory => "memory",
			BackendKind::Dummy => "dummy",
		}
	}
}

impl FromStr for BackendKind {
	type Err = EmailError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"smtp" => Ok(BackendKind::Smtp),
			"console" => Ok(BackendKind::Console),
			"file" => Ok(BackendKind::File),
			"memory" => Ok(BackendKind::Memory),
			"dummy" => Ok(BackendKind::Dummy),
			other => Err(EmailError::Configuration(format!(
				"unknown email backend {other:?}; available backends: {}",
				AVAILABLE_BACKENDS.join(", ")
			))),
		}
	}
}

impl std::fmt::Display for BackendKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Factory signature for custom backends registered at runtime.
pub type BackendFactory =
	Arc<dyn Fn(&EmailSettings, bool) -> EmailResult<Arc<dyn EmailBackend>> + Send + Sync>;

fn registry() -> &'static RwLock<HashMap<String, BackendFactory>> {
	static REGISTRY: std::sync::OnceLock<RwLock<HashMap<String, BackendFactory>>> =
		std::sync::OnceLock::new();
	REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Register a custom backend factory under an identifier.
///
/// The identifier becomes usable in `settings.backend` and as an
/// explicit override in [`get_connection`]; registering an existing
/// identifier (including a built-in one) replaces it.
pub fn register_backend(id: impl Into<String>, factory: BackendFactory) {
	let id = id.into();
	debug!(backend = %id, "registering email backend");
	registry().write().insert(id, factory);
}

// Default backend per environment: tests must never hit the network,
// development wants messages visible, production delivers.
fn default_backend(settings: &EmailSettings) -> BackendKind {
	if settings.testing {
		BackendKind::Memory
	} else if settings.debug {
		BackendKind::Console
	} else {
		BackendKind::Smtp
	}
}

/// Resolve a backend instance (the delivery dispatcher).
///
/// Resolution order: the explicit `override_backend`, then
/// `settings.backend`, then the environment default (memory under
/// `testing`, console under `debug`, smtp otherwise). Custom
/// registrations take precedence over built-in identifiers.
pub fn get_connection(
	settings: &EmailSettings,
	override_backend: Option<&str>,
	fail_silently: bool,
) -> EmailResult<Arc<dyn EmailBackend>> {
	settings.validate()?;

	let configured = Some(settings.backend.as_str()).filter(|id| !id.is_empty());
	let resolved: String = override_backend
		.or(configured)
		.map(str::to_string)
		.unwrap_or_else(|| default_backend(settings).as_str().to_string());

	debug!(backend = %resolved, fail_silently, "resolving email backend");

	if let Some(factory) = registry().read().get(&resolved) {
		return factory(settings, fail_silently);
	}

	match BackendKind::from_str(&resolved)? {
		BackendKind::Smtp => SmtpBackend::from_settings(settings, fail_silently),
		BackendKind::Console => ConsoleBackend::from_settings(settings, fail_silently),
		BackendKind::File => FileBackend::from_settings(settings, fail_silently),
		BackendKind::Memory => MemoryBackend::from_settings(settings, fail_silently),
		BackendKind::Dummy => DummyBackend::from_settings(settings, fail_silently),
	}
}

// Shared by the concrete backends: dispatch-time defaults pulled from
// settings once at construction.
#[derive(Debug, Clone, Default)]
pub(crate) struct DispatchDefaults {
	pub(crate) from_email: Option<String>,
	pub(crate) charset: Option<crate::encoding::Charset>,
}

impl DispatchDefaults {
	pub(crate) fn from_settings(settings: &EmailSettings) -> EmailResult<Self> {
		let charset = if settings.default_charset.is_empty() {
			None
		} else {
			Some(crate::encoding::Charset::parse(&settings.default_charset)?)
		};
		Ok(Self {
			from_email: settings.default_sender().map(str::to_string),
			charset,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn backend_kind_round_trips() {
		for id in AVAILABLE_BACKENDS {
			assert_eq!(BackendKind::from_str(id).unwrap().as_str(), id);
		}
	}

	#[test]
	fn unknown_backend_error_lists_available() {
		let err = BackendKind::from_str("carrier-pigeon").unwrap_err();
		let rendered = err.to_string();
		for id in AVAILABLE_BACKENDS {
			assert!(rendered.contains(id), "error should mention {id}: {rendered}");
		}
	}

	#[test]
	fn default_backend_follows_environment() {
		let mut settings = EmailSettings::default();
		settings.testing = true;
		assert_eq!(default_backend(&settings), BackendKind::Memory);

		settings.testing = false;
		settings.debug = true;
		assert_eq!(default_backend(&settings), BackendKind::Console);

		settings.debug = false;
		assert_eq!(default_backend(&settings), BackendKind::Smtp);
	}
}
