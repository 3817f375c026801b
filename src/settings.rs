//! Mail configuration surface.
//!
//! A per-application settings record, created once at application setup
//! and consulted by the sending API on every call. Delivery backends
//! capture the values they need at construction time, so mutating the
//! record between calls affects later connections only.

use crate::{EmailError, EmailResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use zeroize::Zeroizing;

/// Email delivery settings.
///
/// # Examples
///
/// ```
/// use mailroom::EmailSettings;
///
/// let mut settings = EmailSettings::default();
/// settings.backend = "console".to_string();
/// settings.from_email = "noreply@example.com".to_string();
/// assert!(settings.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailSettings {
	/// Backend identifier: `smtp`, `console`, `file`, `memory`, `dummy`,
	/// a registered custom identifier, or empty for the environment default.
	#[serde(default)]
	pub backend: String,

	/// SMTP server host
	#[serde(default = "default_host")]
	pub host: String,

	/// SMTP server port
	#[serde(default = "default_port")]
	pub port: u16,

	/// SMTP username
	pub username: Option<String>,

	/// SMTP password
	pub password: Option<String>,

	/// Use STARTTLS on the SMTP connection
	#[serde(default)]
	pub use_tls: bool,

	/// Use implicit TLS (SMTPS) on the SMTP connection
	#[serde(default)]
	pub use_ssl: bool,

	/// Default sender used when a message has no explicit from address
	#[serde(default)]
	pub from_email: String,

	/// Default charset for message bodies and headers
	#[serde(default = "default_charset")]
	pub default_charset: String,

	/// Connection timeout in seconds
	pub timeout: Option<u64>,

	/// Directory for the file backend
	pub file_path: Option<PathBuf>,

	/// List of (name, email) pairs for site administrators,
	/// used by the `mail_admins()` helper
	#[serde(default)]
	pub admins: Vec<(String, String)>,

	/// List of (name, email) pairs for site managers,
	/// used by the `mail_managers()` helper
	#[serde(default)]
	pub managers: Vec<(String, String)>,

	/// Sender address for server error notifications
	#[serde(default = "default_server_email")]
	pub server_email: String,

	/// Prefix prepended to `mail_admins`/`mail_managers` subjects
	#[serde(default)]
	pub subject_prefix: String,

	/// Application runs in debug mode (default backend: console)
	#[serde(default)]
	pub debug: bool,

	/// Application runs under test (default backend: memory)
	#[serde(default)]
	pub testing: bool,
}

fn default_host() -> String {
	"localhost".to_string()
}

fn default_port() -> u16 {
	25
}

fn default_charset() -> String {
	"utf-8".to_string()
}

fn default_server_email() -> String {
	"root@localhost".to_string()
}

impl Default for EmailSettings {
	fn default() -> Self {
		Self {
			backend: String::new(),
			host: default_host(),
			port: default_port(),
			username: None,
			password: None,
			use_tls: false,
			use_ssl: false,
			from_email: String::new(),
			default_charset: default_charset(),
			timeout: None,
			file_path: None,
			admins: Vec::new(),
			managers: Vec::new(),
			server_email: default_server_email(),
			subject_prefix: String::new(),
			debug: false,
			testing: false,
		}
	}
}

impl EmailSettings {
	/// Validate the settings record.
	///
	/// TLS and SSL are mutually exclusive transport modes; requesting
	/// both is a configuration error, not a preference.
	pub fn validate(&self) -> EmailResult<()> {
		if self.use_tls && self.use_ssl {
			return Err(EmailError::Configuration(
				"use_tls and use_ssl are mutually exclusive, set only one of them".to_string(),
			));
		}
		Ok(())
	}

	/// The default sender, or `None` when unconfigured.
	pub fn default_sender(&self) -> Option<&str> {
		if self.from_email.is_empty() {
			None
		} else {
			Some(&self.from_email)
		}
	}

	/// SMTP password wrapped so it is wiped from memory on drop.
	pub fn password_zeroizing(&self) -> Option<Zeroizing<String>> {
		self.password.clone().map(Zeroizing::new)
	}
}
