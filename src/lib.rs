//! # Mailroom
//!
//! Email composition and delivery for Rust applications, with a message
//! encoding engine and interchangeable delivery backends.
//!
//! ## Features
//!
//! ### Core Message Building
//! - **EmailMessage**: Flexible email message builder with fluent API
//! - **Alternative Content**: Multiple content representations (HTML, plain text)
//! - **Attachments**: File attachments with automatic MIME type detection
//! - **CC/BCC/Reply-To**: Full support for recipient headers
//! - **Custom Headers**: Add custom email headers
//!
//! ### Standards-Compliant Encoding
//! - **RFC 5322/2045**: Byte-exact message serialization with folded headers
//! - **RFC 2047**: Encoded words for non-ASCII headers and display names
//! - **RFC 2231**: Extended parameters for non-ASCII attachment filenames
//! - **IDNA**: Internationalized domain names in addresses
//! - **Transfer Encoding**: Automatic 7bit/8bit/quoted-printable/base64 selection
//! - **Header Injection Protection**: CR/LF in header values is always rejected
//!
//! ### Multiple Backends
//! - **SMTP Backend**: Production SMTP with STARTTLS/TLS, authentication and timeouts
//! - **Console Backend**: Development backend that prints to stdout
//! - **File Backend**: Save emails to files for inspection
//! - **Memory Backend**: In-memory outbox for unit tests
//! - **Dummy Backend**: Counts messages without sending
//!
//! ## Examples
//!
//! ### Simple Email
//!
//! ```rust,no_run
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use mailroom::{send_mail, EmailSettings};
//!
//! let mut settings = EmailSettings::default();
//! settings.backend = "console".to_string();
//! settings.from_email = "noreply@example.com".to_string();
//!
//! send_mail(
//!     &settings,
//!     "Welcome!",
//!     "Welcome to our service",
//!     None,
//!     vec!["user@example.com".to_string()],
//!     false,
//!     None,
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Email with Attachments
//!
//! ```rust
//! use mailroom::{Attachment, EmailMessage};
//!
//! let pdf_data = b"PDF content".to_vec();
//! let attachment = Attachment::from_bytes("report.pdf", pdf_data);
//!
//! let email = EmailMessage::builder()
//!     .from("reports@example.com")
//!     .to(vec!["user@example.com".to_string()])
//!     .subject("Monthly Report")
//!     .body("Please find attached your monthly report.")
//!     .attachment(attachment)
//!     .build()?;
//! # Ok::<(), mailroom::EmailError>(())
//! ```
//!
//! ### HTML Email
//!
//! ```rust
//! use mailroom::EmailMessage;
//!
//! let email = EmailMessage::builder()
//!     .from("marketing@example.com")
//!     .to(vec!["customer@example.com".to_string()])
//!     .subject("Newsletter")
//!     .body("Newsletter content")
//!     .html("<h1>Newsletter</h1>")
//!     .build()?;
//!
//! let rendered = email.message()?;
//! assert!(rendered.get_header("Content-Type").unwrap().starts_with("multipart/alternative"));
//! # Ok::<(), mailroom::EmailError>(())
//! ```
//!
//! ### SMTP with TLS
//!
//! ```rust,no_run
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use mailroom::{EmailMessage, SmtpBackend, SmtpConfig, SmtpSecurity};
//! use std::time::Duration;
//!
//! let config = SmtpConfig::new("smtp.gmail.com", 587)
//!     .with_credentials("user@gmail.com".to_string(), "password".to_string())
//!     .with_security(SmtpSecurity::StartTls)
//!     .with_timeout(Duration::from_secs(30));
//!
//! let backend = SmtpBackend::new(config)?;
//!
//! let email = EmailMessage::builder()
//!     .from("sender@gmail.com")
//!     .to(vec!["recipient@example.com".to_string()])
//!     .subject("Test")
//!     .body("Test message")
//!     .build()?;
//!
//! email.send_with_backend(&backend).await?;
//! # Ok(())
//! # }
//! ```

pub mod address;
pub mod backends;
pub mod encoding;
pub mod headers;
pub mod message;
pub mod mime_tree;
pub mod settings;
pub mod utils;

use thiserror::Error;

pub use address::{sanitize_address, sanitize_address_list, AddressSpec};
pub use backends::{
	get_connection, register_backend, BackendKind, ConsoleBackend, DummyBackend, EmailBackend,
	FileBackend, MemoryBackend, SmtpAuthMechanism, SmtpBackend, SmtpConfig, SmtpSecurity,
	AVAILABLE_BACKENDS,
};
pub use encoding::{Charset, TransferEncoding};
pub use message::{Alternative, Attachment, EmailMessage, EmailMessageBuilder};
pub use mime_tree::{MimeMessage, MimePart};
pub use settings::EmailSettings;
pub use utils::{mail_admins, mail_managers, make_msgid, send_mail, send_mass_mail, DNS_NAME};

#[derive(Debug, Error)]
pub enum EmailError {
	#[error("Invalid email address: {0}")]
	InvalidAddress(String),

	#[error("Bad header value: {0}")]
	BadHeader(String),

	#[error("Invalid header name: {0}")]
	InvalidHeader(String),

	#[error("Attachment error: {0}")]
	Attachment(String),

	#[error("Cannot encode payload: {0}")]
	Encoding(String),

	#[error("Configuration error: {0}")]
	Configuration(String),

	#[error("Backend error: {0}")]
	Backend(String),

	#[error("SMTP error: {0}")]
	Smtp(String),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
}

impl EmailError {
	/// Whether this error happened at the transport stage.
	///
	/// Only transport-stage failures may be swallowed by `fail_silently`;
	/// encoding-stage errors (addresses, headers, attachments) always
	/// surface to the caller.
	pub fn is_transport(&self) -> bool {
		matches!(
			self,
			EmailError::Backend(_) | EmailError::Smtp(_) | EmailError::Io(_)
		)
	}
}

pub type EmailResult<T> = std::result::Result<T, EmailError>;
