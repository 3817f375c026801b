use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, FixedOffset};

use crate::address::{sanitize_address, sanitize_address_list, validate_email, validate_email_list};
use crate::backends::EmailBackend;
use crate::encoding::Charset;
use crate::headers::{check_header_injection, encode_header, validate_header_name};
use crate::mime_tree::{MimeMessage, MimePart};
use crate::settings::EmailSettings;
use crate::utils::{make_msgid, DNS_NAME};
use crate::{EmailError, EmailResult};

/// Represents an alternative content type for an email message.
///
/// Alternatives allow providing different representations of the same content,
/// typically used for HTML vs. plain text versions.
///
/// # Examples
///
/// ```
/// use mailroom::Alternative;
///
/// let alternative = Alternative::new("<h1>Hello!</h1>", "text/html");
/// assert_eq!(alternative.mimetype(), "text/html");
/// ```
#[derive(Debug, Clone)]
pub struct Alternative {
	/// Content in this representation
	content: String,
	/// MIME content type (e.g., "text/html", "text/calendar")
	mimetype: String,
}

impl Alternative {
	/// Create a new alternative content
	///
	/// # Examples
	///
	/// ```
	/// use mailroom::Alternative;
	///
	/// let ics = Alternative::new("BEGIN:VCALENDAR", "text/calendar");
	/// assert_eq!(ics.mimetype(), "text/calendar");
	/// ```
	pub fn new(content: impl Into<String>, mimetype: impl Into<String>) -> Self {
		Self {
			content: content.into(),
			mimetype: mimetype.into(),
		}
	}

	/// Create an HTML alternative
	///
	/// # Examples
	///
	/// ```
	/// use mailroom::Alternative;
	///
	/// let html = Alternative::html("<h1>Welcome!</h1>");
	/// assert_eq!(html.mimetype(), "text/html");
	/// ```
	pub fn html(content: impl Into<String>) -> Self {
		Self::new(content, "text/html")
	}

	/// Get the content
	pub fn content(&self) -> &str {
		&self.content
	}

	/// Get the content type
	pub fn mimetype(&self) -> &str {
		&self.mimetype
	}

	fn resolve(&self, charset: &Charset) -> EmailResult<MimePart> {
		match self.mimetype.strip_prefix("text/") {
			Some(subtype) => MimePart::text(&self.content, subtype, charset),
			None => Ok(MimePart::binary(&self.mimetype, self.content.as_bytes())),
		}
	}
}

#[derive(Debug, Clone)]
enum AttachmentContent {
	Text(String),
	Binary(Vec<u8>),
}

/// Represents a file attachment for an email message.
///
/// An attachment is either a `(filename, content, mimetype)` triple — with
/// the filename and mimetype optional — or a pre-built [`MimePart`] attached
/// verbatim. The MIME type is auto-detected from the filename extension when
/// not given.
///
/// # Examples
///
/// ```
/// use mailroom::Attachment;
///
/// let data = b"Hello, world!".to_vec();
/// let attachment = Attachment::from_bytes("hello.txt", data);
/// assert_eq!(attachment.filename(), Some("hello.txt"));
/// ```
#[derive(Debug, Clone)]
pub struct Attachment {
	filename: Option<String>,
	content: Option<AttachmentContent>,
	mimetype: Option<String>,
	part: Option<MimePart>,
}

impl Attachment {
	/// Create a new attachment from bytes
	///
	/// # Examples
	///
	/// ```
	/// use mailroom::Attachment;
	///
	/// let data = b"PDF content".to_vec();
	/// let attachment = Attachment::from_bytes("document.pdf", data);
	/// assert_eq!(attachment.filename(), Some("document.pdf"));
	/// ```
	pub fn from_bytes(filename: impl Into<String>, content: Vec<u8>) -> Self {
		Self {
			filename: Some(filename.into()),
			content: Some(AttachmentContent::Binary(content)),
			mimetype: None,
			part: None,
		}
	}

	/// Create a new attachment from textual content
	///
	/// # Examples
	///
	/// ```
	/// use mailroom::Attachment;
	///
	/// let attachment = Attachment::from_text("notes.txt", "meeting notes");
	/// assert_eq!(attachment.filename(), Some("notes.txt"));
	/// ```
	pub fn from_text(filename: impl Into<String>, content: impl Into<String>) -> Self {
		Self {
			filename: Some(filename.into()),
			content: Some(AttachmentContent::Text(content.into())),
			mimetype: None,
			part: None,
		}
	}

	/// Create an anonymous attachment with no filename. Without a
	/// filename no `Content-Disposition` header is emitted.
	pub fn anonymous(content: Vec<u8>, mimetype: impl Into<String>) -> Self {
		Self {
			filename: None,
			content: Some(AttachmentContent::Binary(content)),
			mimetype: Some(mimetype.into()),
			part: None,
		}
	}

	/// Attach a pre-built MIME part verbatim. A pre-built part carries
	/// its own headers, so combining it with a mimetype override is a
	/// contract violation reported at render time.
	pub fn from_part(part: MimePart) -> Self {
		Self {
			filename: None,
			content: None,
			mimetype: None,
			part: Some(part),
		}
	}

	/// Create a new attachment from a file path
	///
	/// # Examples
	///
	/// ```no_run
	/// use mailroom::Attachment;
	/// use std::path::PathBuf;
	///
	/// # fn main() -> std::io::Result<()> {
	/// let path = PathBuf::from("/tmp/test.txt");
	/// let attachment = Attachment::from_path(path, "report.txt")?;
	/// assert_eq!(attachment.filename(), Some("report.txt"));
	/// # Ok(())
	/// # }
	/// ```
	pub fn from_path(path: PathBuf, filename: impl Into<String>) -> std::io::Result<Self> {
		let content = std::fs::read(&path)?;
		Ok(Self::from_bytes(filename, content))
	}

	/// Set an explicit MIME type, overriding extension-based detection
	///
	/// # Examples
	///
	/// ```
	/// use mailroom::Attachment;
	///
	/// let attachment = Attachment::from_bytes("data.bin", vec![1, 2, 3])
	///     .with_mime_type("application/x-custom");
	/// assert_eq!(attachment.mime_type(), Some("application/x-custom"));
	/// ```
	pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
		self.mimetype = Some(mime_type.into());
		self
	}

	/// Get the filename
	pub fn filename(&self) -> Option<&str> {
		self.filename.as_deref()
	}

	/// Get the explicit MIME type, if one was set
	pub fn mime_type(&self) -> Option<&str> {
		self.mimetype.as_deref()
	}

	fn guess_mime_type(&self) -> String {
		self.filename
			.as_deref()
			.and_then(|name| mime_guess::from_path(name).first())
			.map(|mime| mime.to_string())
			.unwrap_or_else(|| match self.content {
				Some(AttachmentContent::Text(_)) => mime::TEXT_PLAIN.to_string(),
				_ => mime::APPLICATION_OCTET_STREAM.to_string(),
			})
	}

	/// Resolve this attachment into a MIME part.
	///
	/// Textual content under a `text/*` type goes through the transfer
	/// encoding ladder; bytes under `text/*` that fail UTF-8 decoding
	/// fall back to `application/octet-stream` with the bytes carried
	/// verbatim; `message/*` parts are never base64-encoded so nested
	/// headers stay readable; everything else is base64.
	pub(crate) fn resolve(&self, charset: &Charset) -> EmailResult<MimePart> {
		if let Some(part) = &self.part {
			if self.content.is_some() || self.mimetype.is_some() {
				return Err(EmailError::Attachment(
					"a pre-built part cannot be combined with content or a mimetype".to_string(),
				));
			}
			return Ok(part.clone());
		}
		let content = self.content.as_ref().ok_or_else(|| {
			EmailError::Attachment(
				"attachment has neither content nor a pre-built part".to_string(),
			)
		})?;

		let mimetype = self
			.mimetype
			.clone()
			.unwrap_or_else(|| self.guess_mime_type());

		let mut part = if let Some(subtype) = mimetype.strip_prefix("text/") {
			match content {
				AttachmentContent::Text(text) => MimePart::text(text, subtype, charset)?,
				AttachmentContent::Binary(bytes) => match std::str::from_utf8(bytes) {
					Ok(text) => MimePart::text(text, subtype, charset)?,
					// Undecodable bytes under text/*: ship them verbatim
					// as an opaque binary part instead of failing.
					Err(_) => MimePart::binary(mime::APPLICATION_OCTET_STREAM.as_ref(), bytes),
				},
			}
		} else if mimetype.starts_with("message/") {
			let bytes = match content {
				AttachmentContent::Text(text) => text.as_bytes(),
				AttachmentContent::Binary(bytes) => bytes.as_slice(),
			};
			MimePart::verbatim(&mimetype, bytes)
		} else {
			let bytes = match content {
				AttachmentContent::Text(text) => text.as_bytes(),
				AttachmentContent::Binary(bytes) => bytes.as_slice(),
			};
			MimePart::binary(&mimetype, bytes)
		};

		if let Some(name) = &self.filename {
			part.set_attachment_disposition(Some(name));
		}
		Ok(part)
	}
}

// Message-ID and Date are fixed at first render so repeated calls to
// message() produce identical bytes.
#[derive(Debug, Clone)]
struct RenderStamp {
	message_id: String,
	date: String,
}

/// Represents an email message with validated addresses.
///
/// All fields are private to enforce validation through the builder.
/// Use getter methods for read access and the builder for construction.
/// Post-build mutators like [`EmailMessage::attach`] exist, so the same
/// validation re-runs inside [`EmailMessage::message`] before rendering.
#[derive(Clone)]
pub struct EmailMessage {
	subject: String,
	body: String,
	from_email: Option<String>,
	to: Vec<String>,
	cc: Vec<String>,
	bcc: Vec<String>,
	reply_to: Vec<String>,
	html_body: Option<String>,
	alternatives: Vec<Alternative>,
	attachments: Vec<Attachment>,
	headers: Vec<(String, String)>,
	charset: Option<Charset>,
	mail_options: Vec<String>,
	rcpt_options: Vec<String>,
	date: Option<DateTime<FixedOffset>>,
	connection: Option<Arc<dyn EmailBackend>>,
	stamp: Arc<OnceLock<RenderStamp>>,
}

impl std::fmt::Debug for EmailMessage {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EmailMessage")
			.field("subject", &self.subject)
			.field("from_email", &self.from_email)
			.field("to", &self.to)
			.field("cc", &self.cc)
			.field("bcc", &self.bcc)
			.field("reply_to", &self.reply_to)
			.field("alternatives", &self.alternatives.len())
			.field("attachments", &self.attachments.len())
			.field("headers", &self.headers)
			.finish_non_exhaustive()
	}
}

impl EmailMessage {
	/// Create a new builder for constructing an `EmailMessage`.
	pub fn builder() -> EmailMessageBuilder {
		EmailMessageBuilder::default()
	}

	/// Shorthand for the common case: subject, plain body, optional
	/// sender and a recipient list.
	pub fn new(
		subject: impl Into<String>,
		body: impl Into<String>,
		from_email: Option<String>,
		to: Vec<String>,
	) -> EmailResult<Self> {
		let mut builder = Self::builder().subject(subject).body(body).to(to);
		if let Some(from) = from_email {
			builder = builder.from(from);
		}
		builder.build()
	}

	/// Get the subject.
	pub fn subject(&self) -> &str {
		&self.subject
	}

	/// Get the body.
	pub fn body(&self) -> &str {
		&self.body
	}

	/// Get the from email address, if one was set.
	pub fn from_email(&self) -> Option<&str> {
		self.from_email.as_deref()
	}

	/// Get the list of recipients.
	pub fn to(&self) -> &[String] {
		&self.to
	}

	/// Get the list of CC recipients.
	pub fn cc(&self) -> &[String] {
		&self.cc
	}

	/// Get the list of BCC recipients.
	pub fn bcc(&self) -> &[String] {
		&self.bcc
	}

	/// Get the list of reply-to addresses.
	pub fn reply_to(&self) -> &[String] {
		&self.reply_to
	}

	/// Get the HTML body.
	pub fn html_body(&self) -> Option<&str> {
		self.html_body.as_deref()
	}

	/// Get the alternatives.
	pub fn alternatives(&self) -> &[Alternative] {
		&self.alternatives
	}

	/// Get the attachments.
	pub fn attachments(&self) -> &[Attachment] {
		&self.attachments
	}

	/// Get the custom headers.
	pub fn headers(&self) -> &[(String, String)] {
		&self.headers
	}

	/// Get the charset override, if any.
	pub fn charset(&self) -> Option<Charset> {
		self.charset
	}

	/// ESMTP MAIL FROM keyword arguments.
	pub fn mail_options(&self) -> &[String] {
		&self.mail_options
	}

	/// ESMTP RCPT TO keyword arguments.
	pub fn rcpt_options(&self) -> &[String] {
		&self.rcpt_options
	}

	/// Append an attachment after construction.
	pub fn attach(&mut self, attachment: Attachment) {
		self.attachments.push(attachment);
	}

	/// Append an alternative representation of the body.
	pub fn attach_alternative(&mut self, content: impl Into<String>, mimetype: impl Into<String>) {
		self.alternatives.push(Alternative::new(content, mimetype));
	}

	/// Bind a backend connection; [`EmailMessage::send`] reuses it
	/// instead of resolving one from settings.
	pub fn set_connection(&mut self, connection: Arc<dyn EmailBackend>) {
		self.connection = Some(connection);
	}

	/// The envelope recipient list: to + cc + bcc, with empty entries
	/// dropped. Bcc recipients receive the message but are never
	/// rendered into headers.
	pub fn recipients(&self) -> Vec<String> {
		self.to
			.iter()
			.chain(self.cc.iter())
			.chain(self.bcc.iter())
			.filter(|addr| !addr.is_empty())
			.cloned()
			.collect()
	}

	// Mutators can bypass build(); re-check everything that guards
	// against header injection before rendering.
	fn revalidate(&self) -> EmailResult<()> {
		if let Some(from) = &self.from_email {
			if !from.is_empty() {
				validate_email(from)?;
			}
		}
		validate_email_list(&self.to)?;
		validate_email_list(&self.cc)?;
		validate_email_list(&self.bcc)?;
		validate_email_list(&self.reply_to)?;
		check_header_injection("Subject", &self.subject)?;
		for (name, value) in &self.headers {
			validate_header_name(name)?;
			check_header_injection(name, value)?;
		}
		Ok(())
	}

	fn extra_header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(n, _)| n.eq_ignore_ascii_case(name))
			.map(|(_, v)| v.as_str())
	}

	/// Render the message to a MIME tree.
	///
	/// Repeated calls return identical output: Message-ID and Date are
	/// fixed at the first render. Validation runs again here, so a
	/// message mutated after `build()` still fails before any I/O.
	pub fn message(&self) -> EmailResult<MimeMessage> {
		self.render(None, None)
	}

	/// Render with dispatch-time defaults: the configured sender used
	/// when the message has none, and the configured charset used when
	/// the message carries no override. Backends call this.
	pub fn render(
		&self,
		default_from: Option<&str>,
		default_charset: Option<Charset>,
	) -> EmailResult<MimeMessage> {
		self.revalidate()?;
		let charset = self.charset.or(default_charset).unwrap_or_default();

		let mut root = self.build_content(&charset)?;

		let stamp = self.stamp.get_or_init(|| RenderStamp {
			message_id: make_msgid(&DNS_NAME.get()),
			date: self
				.date
				.map(|date| date.to_rfc2822())
				.unwrap_or_else(|| chrono::Local::now().to_rfc2822()),
		});

		let subject = match self.extra_header("Subject") {
			Some(value) => value.to_string(),
			None => encode_header("Subject", &self.subject, &charset)?,
		};
		root.add_header("Subject", subject);

		let from = match self.extra_header("From") {
			Some(value) => Some(value.to_string()),
			None => {
				let sender = self.from_email.as_deref().or(default_from);
				match sender {
					Some(addr) if !addr.is_empty() => Some(sanitize_address(addr, &charset)?),
					_ => None,
				}
			}
		};
		if let Some(from) = from {
			root.add_header("From", from);
		}

		for (header, list) in [
			("To", &self.to),
			("Cc", &self.cc),
			("Reply-To", &self.reply_to),
		] {
			match self.extra_header(header) {
				Some(value) => root.add_header(header, value.to_string()),
				None => {
					let sanitized = sanitize_address_list(list, &charset)?;
					if !sanitized.is_empty() {
						root.add_header(header, sanitized.join(", "));
					}
				}
			}
		}

		let date = self
			.extra_header("Date")
			.map(str::to_string)
			.unwrap_or_else(|| stamp.date.clone());
		root.add_header("Date", date);

		let message_id = self
			.extra_header("Message-ID")
			.map(str::to_string)
			.unwrap_or_else(|| stamp.message_id.clone());
		root.add_header("Message-ID", message_id);

		// Remaining extra headers, minus the ones consumed above and
		// Bcc, which must never appear in rendered output.
		for (name, value) in &self.headers {
			let lowered = name.to_ascii_lowercase();
			if matches!(
				lowered.as_str(),
				"subject" | "from" | "to" | "cc" | "bcc" | "reply-to" | "date" | "message-id"
			) {
				continue;
			}
			root.add_header(name.clone(), encode_header(name, value, &charset)?);
		}

		Ok(root)
	}

	// Content arrangement: single text/plain; multipart/alternative
	// when alternatives or an html body exist (plain body first, then
	// declared alternatives, then the html shortcut); a multipart/mixed
	// wrapper when attachments exist.
	fn build_content(&self, charset: &Charset) -> EmailResult<MimePart> {
		let has_alternatives = self.html_body.is_some() || !self.alternatives.is_empty();
		let mut root = if has_alternatives {
			let mut parts = Vec::new();
			if !self.body.is_empty() {
				parts.push(MimePart::text(&self.body, "plain", charset)?);
			}
			for alternative in &self.alternatives {
				parts.push(alternative.resolve(charset)?);
			}
			if let Some(html) = &self.html_body {
				parts.push(MimePart::text(html, "html", charset)?);
			}
			MimePart::multipart("alternative", parts)
		} else {
			MimePart::text(&self.body, "plain", charset)?
		};

		if !self.attachments.is_empty() {
			let mut parts = vec![root];
			for attachment in &self.attachments {
				parts.push(attachment.resolve(charset)?);
			}
			root = MimePart::multipart("mixed", parts);
		}
		Ok(root)
	}

	/// Send this message, resolving a backend from settings unless one
	/// is bound. Returns the number of messages sent (0 or 1).
	///
	/// A message without recipients returns 0 without opening any
	/// connection. `fail_silently` applies to the resolved backend and
	/// swallows transport errors only; encoding errors always surface.
	pub async fn send(&self, settings: &EmailSettings, fail_silently: bool) -> EmailResult<usize> {
		if self.recipients().is_empty() {
			return Ok(0);
		}
		match &self.connection {
			Some(connection) => connection.send_messages(std::slice::from_ref(self)).await,
			None => {
				let connection = crate::backends::get_connection(settings, None, fail_silently)?;
				connection.send_messages(std::slice::from_ref(self)).await
			}
		}
	}

	/// Send the email using the given backend.
	pub async fn send_with_backend(&self, backend: &dyn EmailBackend) -> EmailResult<usize> {
		backend.send_messages(std::slice::from_ref(self)).await
	}
}

#[derive(Default)]
pub struct EmailMessageBuilder {
	subject: String,
	body: String,
	from_email: Option<String>,
	to: Vec<String>,
	cc: Vec<String>,
	bcc: Vec<String>,
	reply_to: Vec<String>,
	html_body: Option<String>,
	alternatives: Vec<Alternative>,
	attachments: Vec<Attachment>,
	headers: Vec<(String, String)>,
	charset: Option<String>,
	mail_options: Vec<String>,
	rcpt_options: Vec<String>,
	date: Option<DateTime<FixedOffset>>,
	connection: Option<Arc<dyn EmailBackend>>,
}

impl EmailMessageBuilder {
	pub fn subject(mut self, subject: impl Into<String>) -> Self {
		self.subject = subject.into();
		self
	}

	pub fn body(mut self, body: impl Into<String>) -> Self {
		self.body = body.into();
		self
	}

	pub fn from(mut self, from: impl Into<String>) -> Self {
		self.from_email = Some(from.into());
		self
	}

	pub fn from_email(mut self, from: impl Into<String>) -> Self {
		self.from_email = Some(from.into());
		self
	}

	pub fn to(mut self, to: Vec<String>) -> Self {
		self.to = to;
		self
	}

	pub fn cc(mut self, cc: Vec<String>) -> Self {
		self.cc = cc;
		self
	}

	pub fn bcc(mut self, bcc: Vec<String>) -> Self {
		self.bcc = bcc;
		self
	}

	pub fn reply_to(mut self, reply_to: Vec<String>) -> Self {
		self.reply_to = reply_to;
		self
	}

	pub fn html(mut self, html: impl Into<String>) -> Self {
		self.html_body = Some(html.into());
		self
	}

	pub fn attachment(mut self, attachment: Attachment) -> Self {
		self.attachments.push(attachment);
		self
	}

	pub fn alternative(mut self, alternative: Alternative) -> Self {
		self.alternatives.push(alternative);
		self
	}

	pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));
		self
	}

	/// Override the message charset by MIME label (e.g. "iso-8859-1",
	/// "shift_jis"). Unknown labels fail at `build()`.
	pub fn charset(mut self, charset: impl Into<String>) -> Self {
		self.charset = Some(charset.into());
		self
	}

	/// Fix the Date header instead of stamping the current time at
	/// first render.
	pub fn date(mut self, date: DateTime<FixedOffset>) -> Self {
		self.date = Some(date);
		self
	}

	pub fn mail_option(mut self, option: impl Into<String>) -> Self {
		self.mail_options.push(option.into());
		self
	}

	pub fn rcpt_option(mut self, option: impl Into<String>) -> Self {
		self.rcpt_options.push(option.into());
		self
	}

	/// Bind a backend connection reused by every `send()` on the built
	/// message.
	pub fn connection(mut self, connection: Arc<dyn EmailBackend>) -> Self {
		self.connection = Some(connection);
		self
	}

	/// Build the email message with validation.
	///
	/// Validates all email addresses, checks subject and header values
	/// for header injection, validates header names and resolves the
	/// charset label. Returns an error if any validation fails.
	pub fn build(self) -> EmailResult<EmailMessage> {
		if let Some(from) = &self.from_email {
			if !from.is_empty() {
				validate_email(from)?;
			}
		}

		validate_email_list(&self.to)?;
		validate_email_list(&self.cc)?;
		validate_email_list(&self.bcc)?;
		validate_email_list(&self.reply_to)?;

		check_header_injection("Subject", &self.subject)?;

		for (name, value) in &self.headers {
			validate_header_name(name)?;
			check_header_injection(name, value)?;
		}

		let charset = self.charset.as_deref().map(Charset::parse).transpose()?;

		Ok(EmailMessage {
			subject: self.subject,
			body: self.body,
			from_email: self.from_email,
			to: self.to,
			cc: self.cc,
			bcc: self.bcc,
			reply_to: self.reply_to,
			html_body: self.html_body,
			alternatives: self.alternatives,
			attachments: self.attachments,
			headers: self.headers,
			charset,
			mail_options: self.mail_options,
			rcpt_options: self.rcpt_options,
			date: self.date,
			connection: self.connection,
			stamp: Arc::new(OnceLock::new()),
		})
	}
}
