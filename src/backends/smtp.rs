//! SMTP backend over lettre's async transport.
//!
//! The message bytes on the wire are always our own rendering; lettre
//! only carries the envelope and the SMTP conversation.

use std::time::Duration;

use async_trait::async_trait;
use lettre::address::{Address, Envelope};
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::{DispatchDefaults, EmailBackend};
use crate::address::parse_mailbox;
use crate::message::EmailMessage;
use crate::settings::EmailSettings;
use crate::{EmailError, EmailResult};

/// Connection security for the SMTP session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmtpSecurity {
	/// Plaintext connection. Local relays and test servers only.
	#[default]
	None,
	/// Plaintext connection upgraded via STARTTLS.
	StartTls,
	/// TLS from the first byte (SMTPS).
	Tls,
}

/// SMTP AUTH mechanism restriction. When unset, lettre negotiates
/// from what the server advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpAuthMechanism {
	Plain,
	Login,
	Xoauth2,
}

impl SmtpAuthMechanism {
	fn to_mechanism(self) -> Mechanism {
		match self {
			SmtpAuthMechanism::Plain => Mechanism::Plain,
			SmtpAuthMechanism::Login => Mechanism::Login,
			SmtpAuthMechanism::Xoauth2 => Mechanism::Xoauth2,
		}
	}
}

/// SMTP server configuration.
///
/// # Examples
///
/// ```
/// use mailroom::{SmtpConfig, SmtpSecurity};
/// use std::time::Duration;
///
/// let config = SmtpConfig::new("smtp.example.com", 587)
///     .with_security(SmtpSecurity::StartTls)
///     .with_credentials("user".to_string(), "secret".to_string())
///     .with_timeout(Duration::from_secs(30));
/// assert_eq!(config.host(), "smtp.example.com");
/// ```
#[derive(Clone)]
pub struct SmtpConfig {
	host: String,
	port: u16,
	username: Option<String>,
	// Wiped from memory on drop.
	password: Option<Zeroizing<String>>,
	security: SmtpSecurity,
	auth_mechanism: Option<SmtpAuthMechanism>,
	timeout: Option<Duration>,
}

impl std::fmt::Debug for SmtpConfig {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SmtpConfig")
			.field("host", &self.host)
			.field("port", &self.port)
			.field("username", &self.username)
			.field("password", &self.password.as_ref().map(|_| "<redacted>"))
			.field("security", &self.security)
			.field("auth_mechanism", &self.auth_mechanism)
			.field("timeout", &self.timeout)
			.finish()
	}
}

impl SmtpConfig {
	pub fn new(host: impl Into<String>, port: u16) -> Self {
		Self {
			host: host.into(),
			port,
			username: None,
			password: None,
			security: SmtpSecurity::default(),
			auth_mechanism: None,
			timeout: None,
		}
	}

	pub fn with_credentials(mut self, username: String, password: String) -> Self {
		self.username = Some(username);
		self.password = Some(Zeroizing::new(password));
		self
	}

	pub fn with_security(mut self, security: SmtpSecurity) -> Self {
		self.security = security;
		self
	}

	pub fn with_auth_mechanism(mut self, mechanism: SmtpAuthMechanism) -> Self {
		self.auth_mechanism = Some(mechanism);
		self
	}

	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);
		self
	}

	pub fn host(&self) -> &str {
		&self.host
	}

	pub fn port(&self) -> u16 {
		self.port
	}

	pub fn security(&self) -> SmtpSecurity {
		self.security
	}

	/// Map delivery settings onto an SMTP configuration. `use_ssl`
	/// selects SMTPS, `use_tls` selects STARTTLS; `validate()` has
	/// already rejected both at once.
	pub fn from_settings(settings: &EmailSettings) -> EmailResult<Self> {
		settings.validate()?;
		let security = if settings.use_ssl {
			SmtpSecurity::Tls
		} else if settings.use_tls {
			SmtpSecurity::StartTls
		} else {
			SmtpSecurity::None
		};
		let mut config = Self::new(settings.host.clone(), settings.port).with_security(security);
		if let (Some(username), Some(password)) =
			(&settings.username, settings.password_zeroizing())
		{
			config.username = Some(username.clone());
			config.password = Some(password);
		}
		if let Some(timeout) = settings.timeout {
			config = config.with_timeout(Duration::from_secs(timeout));
		}
		Ok(config)
	}

	fn build_transport(&self) -> EmailResult<AsyncSmtpTransport<Tokio1Executor>> {
		if self.host.is_empty() {
			return Err(EmailError::Configuration(
				"SMTP host must not be empty".to_string(),
			));
		}
		let mut builder = match self.security {
			SmtpSecurity::None => {
				AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.host)
			}
			SmtpSecurity::StartTls => {
				AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)
					.map_err(|error| EmailError::Smtp(error.to_string()))?
			}
			SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&self.host)
				.map_err(|error| EmailError::Smtp(error.to_string()))?,
		};
		builder = builder.port(self.port).timeout(self.timeout);
		if let (Some(username), Some(password)) = (&self.username, &self.password) {
			builder = builder.credentials(Credentials::new(
				username.clone(),
				password.to_string(),
			));
			if let Some(mechanism) = self.auth_mechanism {
				builder = builder.authentication(vec![mechanism.to_mechanism()]);
			}
		}
		Ok(builder.build())
	}
}

// Envelope addresses are bare addr-specs: display names stripped,
// non-ASCII domains punycoded.
fn envelope_address(raw: &str) -> EmailResult<Address> {
	let (_, addr) = parse_mailbox(raw)?;
	let addr = match addr.rsplit_once('@') {
		Some((local, domain)) if !domain.is_ascii() => {
			let domain = idna::domain_to_ascii(domain)
				.map_err(|_| EmailError::InvalidAddress(format!("invalid domain in {raw:?}")))?;
			format!("{local}@{domain}")
		}
		_ => addr,
	};
	addr.parse::<Address>()
		.map_err(|_| EmailError::InvalidAddress(format!("not a valid envelope address: {raw:?}")))
}

/// Production SMTP backend.
///
/// A shared instance serializes its sends through an internal lock,
/// and the underlying connection is opened lazily on first use.
pub struct SmtpBackend {
	config: SmtpConfig,
	fail_silently: bool,
	defaults: DispatchDefaults,
	transport: tokio::sync::Mutex<Option<AsyncSmtpTransport<Tokio1Executor>>>,
}

impl std::fmt::Debug for SmtpBackend {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SmtpBackend")
			.field("config", &self.config)
			.field("fail_silently", &self.fail_silently)
			.field("defaults", &self.defaults)
			.finish_non_exhaustive()
	}
}

impl SmtpBackend {
	/// Create a backend from an explicit configuration. The transport
	/// itself connects on first send.
	pub fn new(config: SmtpConfig) -> EmailResult<Self> {
		// Surface obviously broken configuration here, not at send time.
		config.build_transport()?;
		Ok(Self {
			config,
			fail_silently: false,
			defaults: DispatchDefaults::default(),
			transport: tokio::sync::Mutex::new(None),
		})
	}

	pub fn with_fail_silently(mut self, fail_silently: bool) -> Self {
		self.fail_silently = fail_silently;
		self
	}

	pub fn config(&self) -> &SmtpConfig {
		&self.config
	}

	pub(crate) fn from_settings(
		settings: &EmailSettings,
		fail_silently: bool,
	) -> EmailResult<std::sync::Arc<dyn EmailBackend>> {
		let config = SmtpConfig::from_settings(settings)?;
		let mut backend = Self::new(config)?;
		backend.fail_silently = fail_silently;
		backend.defaults = DispatchDefaults::from_settings(settings)?;
		Ok(std::sync::Arc::new(backend))
	}

	async fn send_one(
		&self,
		transport: &AsyncSmtpTransport<Tokio1Executor>,
		message: &EmailMessage,
	) -> EmailResult<bool> {
		let recipients = message.recipients();
		if recipients.is_empty() {
			return Ok(false);
		}

		let rendered =
			message.render(self.defaults.from_email.as_deref(), self.defaults.charset)?;

		let sender = message
			.from_email()
			.filter(|addr| !addr.is_empty())
			.or(self.defaults.from_email.as_deref());
		let from_address = sender.map(envelope_address).transpose()?;
		let rcpt_addresses = recipients
			.iter()
			.map(|addr| envelope_address(addr))
			.collect::<EmailResult<Vec<_>>>()?;

		let envelope = Envelope::new(from_address, rcpt_addresses)
			.map_err(|error| EmailError::Smtp(error.to_string()))?;

		transport
			.send_raw(&envelope, &rendered.as_bytes())
			.await
			.map_err(|error| EmailError::Smtp(error.to_string()))?;
		Ok(true)
	}
}

#[async_trait]
impl EmailBackend for SmtpBackend {
	async fn open(&self) -> EmailResult<bool> {
		let mut transport = self.transport.lock().await;
		if transport.is_some() {
			return Ok(false);
		}
		*transport = Some(self.config.build_transport()?);
		debug!(host = %self.config.host, port = self.config.port, "SMTP transport opened");
		Ok(true)
	}

	async fn close(&self) -> EmailResult<()> {
		let mut transport = self.transport.lock().await;
		if transport.take().is_some() {
			// Dropping the transport tears down its connection pool.
			debug!(host = %self.config.host, "SMTP transport closed");
		}
		Ok(())
	}

	async fn send_messages(&self, messages: &[EmailMessage]) -> EmailResult<usize> {
		if messages.is_empty() {
			return Ok(0);
		}

		// Holding the lock for the whole batch keeps concurrent callers
		// from interleaving on the shared connection.
		let mut guard = self.transport.lock().await;
		let opened_here = guard.is_none();
		if opened_here {
			*guard = Some(self.config.build_transport()?);
		}
		let Some(transport) = guard.clone() else {
			return Ok(0);
		};

		let mut sent = 0;
		for message in messages {
			match self.send_one(&transport, message).await {
				Ok(true) => sent += 1,
				Ok(false) => {}
				Err(error) if self.fail_silently && error.is_transport() => {
					warn!(%error, "SMTP send failed");
				}
				Err(error) => {
					if opened_here {
						guard.take();
					}
					return Err(error);
				}
			}
		}

		if opened_here {
			guard.take();
		}
		Ok(sent)
	}

	fn fail_silently(&self) -> bool {
		self.fail_silently
	}
}
