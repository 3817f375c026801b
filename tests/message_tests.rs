//! EmailMessage builder and validation integration tests
//!
//! Tests the fluent builder API, address and header validation,
//! recipient resolution, attachment contracts, and the helpers built
//! on top of messages.

use mailroom::{Attachment, EmailError, EmailMessage, MimePart};
use rstest::rstest;

/// Test: Builder pattern basic construction
#[rstest]
fn test_builder_basic_construction() {
	// Arrange
	let builder = EmailMessage::builder()
		.from("sender@example.com")
		.to(vec!["recipient@example.com".to_string()])
		.subject("Test Subject")
		.body("Test Body");

	// Act
	let message = builder.build().unwrap();

	// Assert
	assert_eq!(message.from_email(), Some("sender@example.com"));
	assert_eq!(message.to(), vec!["recipient@example.com"]);
	assert_eq!(message.subject(), "Test Subject");
	assert_eq!(message.body(), "Test Body");
}

/// Test: Builder method chaining
#[rstest]
fn test_builder_method_chaining() {
	// Arrange & Act
	let message = EmailMessage::builder()
		.from("chain@example.com")
		.to(vec!["to@example.com".to_string()])
		.cc(vec!["cc@example.com".to_string()])
		.bcc(vec!["bcc@example.com".to_string()])
		.reply_to(vec!["reply@example.com".to_string()])
		.subject("Chained")
		.body("Body")
		.build()
		.unwrap();

	// Assert
	assert_eq!(message.from_email(), Some("chain@example.com"));
	assert_eq!(message.to(), vec!["to@example.com"]);
	assert_eq!(message.cc(), vec!["cc@example.com"]);
	assert_eq!(message.bcc(), vec!["bcc@example.com"]);
	assert_eq!(message.reply_to(), vec!["reply@example.com"]);
}

/// Test: Invalid from address is rejected at build time
#[rstest]
#[case("not-an-address")]
#[case("two@@example.com")]
#[case("@example.com")]
#[case("user@")]
fn test_builder_rejects_invalid_from(#[case] from: &str) {
	let result = EmailMessage::builder()
		.from(from)
		.to(vec!["recipient@example.com".to_string()])
		.subject("Subject")
		.body("Body")
		.build();

	assert!(matches!(result, Err(EmailError::InvalidAddress(_))));
}

/// Test: Header injection in the subject is rejected, not stripped
#[rstest]
#[case("evil\r\nBcc: hidden@example.com")]
#[case("evil\rX: y")]
#[case("evil\nX: y")]
fn test_subject_injection_rejected(#[case] subject: &str) {
	let result = EmailMessage::builder()
		.from("sender@example.com")
		.to(vec!["recipient@example.com".to_string()])
		.subject(subject)
		.body("Body")
		.build();

	assert!(matches!(result, Err(EmailError::BadHeader(_))));
}

/// Test: Header injection in custom header values is rejected
#[rstest]
fn test_header_value_injection_rejected() {
	let result = EmailMessage::builder()
		.from("sender@example.com")
		.to(vec!["recipient@example.com".to_string()])
		.subject("Subject")
		.body("Body")
		.header("X-Tracking", "abc\r\nBcc: hidden@example.com")
		.build();

	assert!(matches!(result, Err(EmailError::BadHeader(_))));
}

/// Test: Invalid header names are rejected
#[rstest]
#[case("Bad Header")]
#[case("Bad:Header")]
#[case("")]
fn test_invalid_header_name_rejected(#[case] name: &str) {
	let result = EmailMessage::builder()
		.from("sender@example.com")
		.to(vec!["recipient@example.com".to_string()])
		.subject("Subject")
		.body("Body")
		.header(name, "value")
		.build();

	assert!(matches!(result, Err(EmailError::InvalidHeader(_))));
}

/// Test: recipients() is to + cc + bcc with empty entries dropped
#[rstest]
fn test_recipients_combines_and_filters() {
	let message = EmailMessage::builder()
		.from("sender@example.com")
		.to(vec!["to@example.com".to_string(), String::new()])
		.cc(vec!["cc@example.com".to_string()])
		.bcc(vec!["bcc@example.com".to_string(), String::new()])
		.subject("Recipients")
		.body("Body")
		.build()
		.unwrap();

	assert_eq!(
		message.recipients(),
		vec!["to@example.com", "cc@example.com", "bcc@example.com"]
	);
}

/// Test: Bcc recipients never appear in rendered headers
#[rstest]
fn test_bcc_not_rendered() {
	let message = EmailMessage::builder()
		.from("sender@example.com")
		.to(vec!["visible@example.com".to_string()])
		.bcc(vec!["hidden@example.com".to_string()])
		.subject("BCC Test")
		.body("Body")
		.build()
		.unwrap();

	let rendered = message.message().unwrap().as_string();
	assert!(!rendered.contains("hidden@example.com"));
	assert!(rendered.contains("visible@example.com"));

	// The envelope still carries the bcc recipient.
	assert!(message.recipients().contains(&"hidden@example.com".to_string()));
}

/// Test: A Bcc extra header is ignored in rendered output
#[rstest]
fn test_bcc_extra_header_ignored() {
	let message = EmailMessage::builder()
		.from("sender@example.com")
		.to(vec!["to@example.com".to_string()])
		.subject("Subject")
		.body("Body")
		.header("Bcc", "sneaky@example.com")
		.build()
		.unwrap();

	let rendered = message.message().unwrap().as_string();
	assert!(!rendered.contains("sneaky@example.com"));
}

/// Test: Extra headers override generated Message-ID and Date
#[rstest]
fn test_extra_header_precedence() {
	let message = EmailMessage::builder()
		.from("sender@example.com")
		.to(vec!["to@example.com".to_string()])
		.subject("Subject")
		.body("Body")
		.header("Message-ID", "<fixed@mail.example.com>")
		.header("Date", "Fri, 09 Nov 2001 01:08:47 -0000")
		.build()
		.unwrap();

	let rendered = message.message().unwrap();
	assert_eq!(
		rendered.get_header("Message-ID"),
		Some("<fixed@mail.example.com>")
	);
	assert_eq!(
		rendered.get_header("Date"),
		Some("Fri, 09 Nov 2001 01:08:47 -0000")
	);
}

/// Test: Repeated rendering produces identical bytes
#[rstest]
fn test_message_is_idempotent() {
	let message = EmailMessage::builder()
		.from("sender@example.com")
		.to(vec!["to@example.com".to_string()])
		.subject("Stable")
		.body("Body")
		.build()
		.unwrap();

	let first = message.message().unwrap().as_bytes();
	let second = message.message().unwrap().as_bytes();
	assert_eq!(first, second);
}

/// Test: Attachment MIME type is guessed from the filename extension
#[rstest]
fn test_attachment_mime_guess() {
	let message = EmailMessage::builder()
		.from("sender@example.com")
		.to(vec!["to@example.com".to_string()])
		.subject("Report")
		.body("Attached")
		.attachment(Attachment::from_bytes("report.pdf", b"%PDF-1.4".to_vec()))
		.build()
		.unwrap();

	let rendered = message.message().unwrap().as_string();
	assert!(rendered.contains("Content-Type: application/pdf"));
	assert!(rendered.contains("attachment; filename=\"report.pdf\""));
}

/// Test: Undecodable bytes under text/* fall back to octet-stream
#[rstest]
fn test_attachment_undecodable_text_falls_back() {
	let message = EmailMessage::builder()
		.from("sender@example.com")
		.to(vec!["to@example.com".to_string()])
		.subject("Binary notes")
		.body("Attached")
		.attachment(Attachment::from_bytes("notes.txt", vec![0xff, 0xfe, 0x00, 0x01]))
		.build()
		.unwrap();

	let rendered = message.message().unwrap().as_string();
	assert!(rendered.contains("Content-Type: application/octet-stream"));
}

/// Test: Non-ASCII filenames use the RFC 2231 extended parameter
#[rstest]
fn test_attachment_unicode_filename() {
	let message = EmailMessage::builder()
		.from("sender@example.com")
		.to(vec!["to@example.com".to_string()])
		.subject("Unicode filename")
		.body("Attached")
		.attachment(Attachment::from_text("résumé.txt", "content"))
		.build()
		.unwrap();

	let rendered = message.message().unwrap().as_string();
	assert!(rendered.contains("filename*=utf-8''r%C3%A9sum%C3%A9.txt"));
}

/// Test: A pre-built part combined with a mimetype is a contract error
#[rstest]
fn test_prebuilt_part_excludes_mimetype() {
	let part = MimePart::binary("application/x-custom", b"data");
	let message = EmailMessage::builder()
		.from("sender@example.com")
		.to(vec!["to@example.com".to_string()])
		.subject("Conflicting attachment")
		.body("Body")
		.attachment(Attachment::from_part(part).with_mime_type("text/plain"))
		.build()
		.unwrap();

	assert!(matches!(
		message.message(),
		Err(EmailError::Attachment(_))
	));
}

/// Test: message/rfc822 attachments are not base64-encoded
#[rstest]
fn test_rfc822_attachment_stays_readable() {
	let nested = "Subject: inner\r\n\r\ninner body\r\n";
	let message = EmailMessage::builder()
		.from("sender@example.com")
		.to(vec!["to@example.com".to_string()])
		.subject("Forwarded")
		.body("See attached")
		.attachment(
			Attachment::from_text("forwarded.eml", nested).with_mime_type("message/rfc822"),
		)
		.build()
		.unwrap();

	let rendered = message.message().unwrap().as_string();
	assert!(rendered.contains("Content-Type: message/rfc822"));
	assert!(rendered.contains("Subject: inner"));
}

/// Test: Mutation after build is re-validated at render time
#[rstest]
fn test_post_build_mutation_revalidated() {
	let mut message = EmailMessage::builder()
		.from("sender@example.com")
		.to(vec!["to@example.com".to_string()])
		.subject("Mutable")
		.body("Body")
		.build()
		.unwrap();

	// Attach a conflicting attachment via the post-build mutator.
	message.attach(
		Attachment::from_part(MimePart::binary("text/plain", b"x")).with_mime_type("a/b"),
	);

	assert!(message.message().is_err());
}

/// Test: An unknown charset label fails at build
#[rstest]
fn test_unknown_charset_rejected() {
	let result = EmailMessage::builder()
		.from("sender@example.com")
		.to(vec!["to@example.com".to_string()])
		.subject("Charset")
		.body("Body")
		.charset("not-a-charset")
		.build();

	assert!(matches!(result, Err(EmailError::Configuration(_))));
}
