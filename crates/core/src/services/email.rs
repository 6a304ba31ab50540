//! Email transports.
//!
//! An [`EmailTransport`] hands one fully rendered message to a provider and
//! reports the provider's message ID. Retries live in
//! [`super::delivery::DeliveryEngine`], not here.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{
        Attachment as MimeAttachment, Mailbox as MimeMailbox, MultiPart,
        header::{ContentType, HeaderName, HeaderValue},
    },
    transport::smtp::authentication::Credentials,
};
use mediate_common::{AppError, AppResult, config::EmailConfig, config::EmailProviderConfig};
use serde::{Deserialize, Serialize};

/// A named address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mailbox {
    /// Address
    pub email: String,
    /// Display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Mailbox {
    /// Create a mailbox.
    #[must_use]
    pub fn new(email: impl Into<String>, name: Option<String>) -> Self {
        Self {
            email: email.into(),
            name,
        }
    }

    fn display(&self) -> String {
        match &self.name {
            Some(name) => format!("{name} <{}>", self.email),
            None => self.email.clone(),
        }
    }
}

/// A file attached to a message.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// File name shown to the recipient
    pub filename: String,
    /// MIME type
    pub content_type: String,
    /// Raw bytes
    pub content: Vec<u8>,
}

/// Email message to be sent.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    /// Sender
    pub from: Mailbox,
    /// Recipients
    pub to: Vec<Mailbox>,
    /// Reply-to address
    pub reply_to: Option<String>,
    /// Subject line
    pub subject: String,
    /// Plain text body
    pub text_body: String,
    /// HTML body
    pub html_body: Option<String>,
    /// Attachments
    pub attachments: Vec<Attachment>,
    /// Custom headers
    pub headers: BTreeMap<String, String>,
}

/// What the provider told us about an accepted message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Message ID from provider (if available)
    pub message_id: Option<String>,
}

/// Hands rendered messages to an email provider.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    /// Provider name, for logs.
    fn name(&self) -> &'static str;

    /// Submit one message. Any error may be retried by the caller.
    async fn send(&self, message: &EmailMessage) -> AppResult<DeliveryReceipt>;
}

/// Build the transport selected by configuration.
pub fn build_transport(config: &EmailConfig) -> AppResult<Arc<dyn EmailTransport>> {
    let transport: Arc<dyn EmailTransport> = match &config.provider {
        EmailProviderConfig::Log => Arc::new(LogTransport),
        EmailProviderConfig::Smtp {
            host,
            port,
            use_tls,
            username,
            password,
        } => Arc::new(SmtpTransport::new(
            host,
            *port,
            *use_tls,
            username.clone(),
            password.clone(),
        )?),
        EmailProviderConfig::SendGrid { api_key } => {
            Arc::new(SendGridTransport::new(api_key.clone()))
        }
        EmailProviderConfig::Mailgun {
            api_key,
            domain,
            eu_region,
        } => Arc::new(MailgunTransport::new(
            api_key.clone(),
            domain.clone(),
            *eu_region,
        )),
        EmailProviderConfig::Brevo { api_key } => Arc::new(BrevoTransport::new(api_key.clone())),
    };

    tracing::info!(provider = transport.name(), "Email transport configured");
    Ok(transport)
}

/// Logs messages instead of sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTransport;

#[async_trait]
impl EmailTransport for LogTransport {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, message: &EmailMessage) -> AppResult<DeliveryReceipt> {
        let message_id = format!("log-{}", uuid::Uuid::new_v4());
        tracing::info!(
            message_id = %message_id,
            to = ?message.to.iter().map(|m| m.email.as_str()).collect::<Vec<_>>(),
            subject = %message.subject,
            attachments = message.attachments.len(),
            "Email not sent (log transport)"
        );
        Ok(DeliveryReceipt {
            message_id: Some(message_id),
        })
    }
}

/// SMTP relay via lettre.
pub struct SmtpTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    hostname: String,
}

impl SmtpTransport {
    /// Create an SMTP transport. STARTTLS is required when `use_tls` is set.
    pub fn new(
        host: &str,
        port: u16,
        use_tls: bool,
        username: Option<String>,
        password: Option<String>,
    ) -> AppResult<Self> {
        let mut builder = if use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| AppError::Config(format!("Invalid SMTP host {host}: {e}")))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        };
        builder = builder.port(port);

        if let (Some(user), Some(pass)) = (username, password) {
            builder = builder.credentials(Credentials::new(user, pass));
        }

        Ok(Self {
            mailer: builder.build(),
            hostname: host.to_string(),
        })
    }

    fn build_message(&self, message: &EmailMessage) -> AppResult<(Message, String)> {
        let message_id = format!("<{}@{}>", uuid::Uuid::new_v4(), self.hostname);

        let mut builder = Message::builder()
            .from(to_mime_mailbox(&message.from)?)
            .subject(message.subject.clone())
            .message_id(Some(message_id.clone()));

        for to in &message.to {
            builder = builder.to(to_mime_mailbox(to)?);
        }
        if let Some(reply_to) = &message.reply_to {
            builder = builder.reply_to(to_mime_mailbox(&Mailbox::new(reply_to.clone(), None))?);
        }
        for (name, value) in &message.headers {
            let name = HeaderName::new_from_ascii(name.clone())
                .map_err(|e| AppError::BadRequest(format!("Invalid header {name}: {e}")))?;
            builder = builder.raw_header(HeaderValue::new(name, value.clone()));
        }

        let body = MultiPart::alternative_plain_html(
            message.text_body.clone(),
            message.html_body.clone().unwrap_or_default(),
        );

        let email = if message.attachments.is_empty() {
            builder.multipart(body)
        } else {
            let mut mixed = MultiPart::mixed().multipart(body);
            for attachment in &message.attachments {
                let content_type = ContentType::parse(&attachment.content_type).map_err(|e| {
                    AppError::BadRequest(format!(
                        "Invalid content type {}: {e}",
                        attachment.content_type
                    ))
                })?;
                mixed = mixed.singlepart(
                    MimeAttachment::new(attachment.filename.clone())
                        .body(attachment.content.clone(), content_type),
                );
            }
            builder.multipart(mixed)
        }
        .map_err(|e| AppError::BadRequest(format!("Failed to build message: {e}")))?;

        Ok((email, message_id))
    }
}

fn to_mime_mailbox(mailbox: &Mailbox) -> AppResult<MimeMailbox> {
    let address = mailbox
        .email
        .parse()
        .map_err(|e| AppError::BadRequest(format!("Invalid address {}: {e}", mailbox.email)))?;
    Ok(MimeMailbox::new(mailbox.name.clone(), address))
}

#[async_trait]
impl EmailTransport for SmtpTransport {
    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn send(&self, message: &EmailMessage) -> AppResult<DeliveryReceipt> {
        let (email, message_id) = self.build_message(message)?;

        self.mailer
            .send(email)
            .await
            .map_err(|e| AppError::Transport(format!("SMTP send failed: {e}")))?;

        Ok(DeliveryReceipt {
            message_id: Some(message_id),
        })
    }
}

/// `SendGrid` v3 mail API.
pub struct SendGridTransport {
    api_key: String,
    http_client: reqwest::Client,
}

impl SendGridTransport {
    /// Create a `SendGrid` transport.
    #[must_use]
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            http_client: reqwest::Client::new(),
        }
    }

    fn body(message: &EmailMessage) -> serde_json::Value {
        let mut content = vec![serde_json::json!({"type": "text/plain", "value": message.text_body})];
        if let Some(html) = &message.html_body {
            content.push(serde_json::json!({"type": "text/html", "value": html}));
        }

        let mut body = serde_json::json!({
            "personalizations": [{
                "to": message.to,
            }],
            "from": message.from,
            "subject": message.subject,
            "content": content,
        });

        if let Some(reply_to) = &message.reply_to {
            body["reply_to"] = serde_json::json!({ "email": reply_to });
        }
        if !message.headers.is_empty() {
            body["headers"] = serde_json::json!(message.headers);
        }
        if !message.attachments.is_empty() {
            body["attachments"] = message
                .attachments
                .iter()
                .map(|a| {
                    serde_json::json!({
                        "content": STANDARD.encode(&a.content),
                        "filename": a.filename,
                        "type": a.content_type,
                    })
                })
                .collect();
        }
        body
    }
}

#[async_trait]
impl EmailTransport for SendGridTransport {
    fn name(&self) -> &'static str {
        "sendgrid"
    }

    async fn send(&self, message: &EmailMessage) -> AppResult<DeliveryReceipt> {
        let response = self
            .http_client
            .post("https://api.sendgrid.com/v3/mail/send")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&Self::body(message))
            .send()
            .await
            .map_err(|e| AppError::Transport(format!("SendGrid request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            let message_id = response
                .headers()
                .get("X-Message-Id")
                .and_then(|v| v.to_str().ok())
                .map(String::from);
            Ok(DeliveryReceipt { message_id })
        } else {
            let error_text = response.text().await.unwrap_or_default();
            Err(AppError::Transport(format!(
                "SendGrid send failed (status={status}): {error_text}"
            )))
        }
    }
}

/// Mailgun messages API.
pub struct MailgunTransport {
    api_key: String,
    domain: String,
    eu_region: bool,
    http_client: reqwest::Client,
}

impl MailgunTransport {
    /// Create a Mailgun transport.
    #[must_use]
    pub fn new(api_key: String, domain: String, eu_region: bool) -> Self {
        Self {
            api_key,
            domain,
            eu_region,
            http_client: reqwest::Client::new(),
        }
    }

    fn form(message: &EmailMessage) -> Vec<(String, String)> {
        let mut form_params = vec![
            ("from".to_string(), message.from.display()),
            ("subject".to_string(), message.subject.clone()),
            ("text".to_string(), message.text_body.clone()),
        ];
        for to in &message.to {
            form_params.push(("to".to_string(), to.display()));
        }
        if let Some(html) = &message.html_body {
            form_params.push(("html".to_string(), html.clone()));
        }
        if let Some(reply_to) = &message.reply_to {
            form_params.push(("h:Reply-To".to_string(), reply_to.clone()));
        }
        for (name, value) in &message.headers {
            form_params.push((format!("h:{name}"), value.clone()));
        }
        form_params
    }
}

#[async_trait]
impl EmailTransport for MailgunTransport {
    fn name(&self) -> &'static str {
        "mailgun"
    }

    async fn send(&self, message: &EmailMessage) -> AppResult<DeliveryReceipt> {
        if !message.attachments.is_empty() {
            // Attachments need a multipart upload; links in the body still work.
            tracing::warn!(
                count = message.attachments.len(),
                "Mailgun transport drops attachments"
            );
        }

        let base_url = if self.eu_region {
            "https://api.eu.mailgun.net"
        } else {
            "https://api.mailgun.net"
        };

        let response = self
            .http_client
            .post(format!("{}/v3/{}/messages", base_url, self.domain))
            .basic_auth("api", Some(&self.api_key))
            .form(&Self::form(message))
            .send()
            .await
            .map_err(|e| AppError::Transport(format!("Mailgun request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            #[derive(Deserialize)]
            struct MailgunResponse {
                id: Option<String>,
            }
            let result: MailgunResponse = response
                .json()
                .await
                .unwrap_or(MailgunResponse { id: None });
            Ok(DeliveryReceipt {
                message_id: result.id,
            })
        } else {
            let error_text = response.text().await.unwrap_or_default();
            Err(AppError::Transport(format!(
                "Mailgun send failed (status={status}): {error_text}"
            )))
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BrevoAttachment {
    name: String,
    content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BrevoSendEmailBody<'a> {
    sender: &'a Mailbox,
    to: &'a [Mailbox],
    subject: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    html_content: Option<&'a str>,
    text_content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<Mailbox>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    headers: &'a BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachment: Vec<BrevoAttachment>,
}

/// Brevo transactional email API.
pub struct BrevoTransport {
    api_key: String,
    http_client: reqwest::Client,
}

impl BrevoTransport {
    /// Create a Brevo transport.
    #[must_use]
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            http_client: reqwest::Client::new(),
        }
    }

    fn body(message: &EmailMessage) -> BrevoSendEmailBody<'_> {
        BrevoSendEmailBody {
            sender: &message.from,
            to: &message.to,
            subject: &message.subject,
            html_content: message.html_body.as_deref(),
            text_content: &message.text_body,
            reply_to: message
                .reply_to
                .as_ref()
                .map(|email| Mailbox::new(email.clone(), None)),
            headers: &message.headers,
            attachment: message
                .attachments
                .iter()
                .map(|a| BrevoAttachment {
                    name: a.filename.clone(),
                    content: STANDARD.encode(&a.content),
                })
                .collect(),
        }
    }
}

#[async_trait]
impl EmailTransport for BrevoTransport {
    fn name(&self) -> &'static str {
        "brevo"
    }

    async fn send(&self, message: &EmailMessage) -> AppResult<DeliveryReceipt> {
        let response = self
            .http_client
            .post("https://api.brevo.com/v3/smtp/email")
            .header("api-key", &self.api_key)
            .header("Accept", "application/json")
            .json(&Self::body(message))
            .send()
            .await
            .map_err(|e| AppError::Transport(format!("Brevo request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            #[derive(Deserialize)]
            #[serde(rename_all = "camelCase")]
            struct BrevoResponse {
                message_id: Option<String>,
            }
            let result: BrevoResponse = response
                .json()
                .await
                .unwrap_or(BrevoResponse { message_id: None });
            Ok(DeliveryReceipt {
                message_id: result.message_id,
            })
        } else {
            let error_text = response.text().await.unwrap_or_default();
            Err(AppError::Transport(format!(
                "Brevo send failed (status={status}): {error_text}"
            )))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn message() -> EmailMessage {
        let mut headers = BTreeMap::new();
        headers.insert("X-Mediate-Poll".to_string(), "poll1".to_string());
        EmailMessage {
            from: Mailbox::new("noreply@mediate.example", Some("Mediate".to_string())),
            to: vec![Mailbox::new("alice@example.com", Some("Alice".to_string()))],
            reply_to: Some("mediator@example.com".to_string()),
            subject: "Pick a time".to_string(),
            text_body: "Hello".to_string(),
            html_body: Some("<p>Hello</p>".to_string()),
            attachments: vec![Attachment {
                filename: "agenda.txt".to_string(),
                content_type: "text/plain".to_string(),
                content: b"agenda".to_vec(),
            }],
            headers,
        }
    }

    #[test]
    fn test_sendgrid_body() {
        let body = SendGridTransport::body(&message());
        assert_eq!(body["personalizations"][0]["to"][0]["email"], "alice@example.com");
        assert_eq!(body["from"]["name"], "Mediate");
        assert_eq!(body["content"][1]["type"], "text/html");
        assert_eq!(body["reply_to"]["email"], "mediator@example.com");
        assert_eq!(body["headers"]["X-Mediate-Poll"], "poll1");
        assert_eq!(body["attachments"][0]["content"], STANDARD.encode(b"agenda"));
    }

    #[test]
    fn test_mailgun_form() {
        let form = MailgunTransport::form(&message());
        assert!(form.contains(&("to".to_string(), "Alice <alice@example.com>".to_string())));
        assert!(form.contains(&("h:X-Mediate-Poll".to_string(), "poll1".to_string())));
        assert!(form.iter().any(|(k, _)| k == "html"));
    }

    #[test]
    fn test_brevo_body() {
        let message = message();
        let body = serde_json::to_value(BrevoTransport::body(&message)).unwrap();
        assert_eq!(body["sender"]["email"], "noreply@mediate.example");
        assert_eq!(body["htmlContent"], "<p>Hello</p>");
        assert_eq!(body["textContent"], "Hello");
        assert_eq!(body["attachment"][0]["name"], "agenda.txt");
    }

    #[test]
    fn test_smtp_build_message() {
        let transport =
            SmtpTransport::new("smtp.example.com", 587, false, None, None).unwrap();
        let (email, message_id) = transport.build_message(&message()).unwrap();
        let raw = String::from_utf8(email.formatted()).unwrap();

        assert!(message_id.ends_with("@smtp.example.com>"));
        assert!(raw.contains("Subject: Pick a time"));
        assert!(raw.contains("X-Mediate-Poll: poll1"));
        assert!(raw.contains("agenda.txt"));
    }

    #[test]
    fn test_smtp_rejects_bad_address() {
        let transport =
            SmtpTransport::new("smtp.example.com", 587, false, None, None).unwrap();
        let mut bad = message();
        bad.to = vec![Mailbox::new("not an address", None)];
        assert!(matches!(
            transport.build_message(&bad),
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_log_transport_returns_message_id() {
        let receipt = LogTransport.send(&message()).await.unwrap();
        assert!(receipt.message_id.unwrap().starts_with("log-"));
    }

    #[test]
    fn test_build_transport_from_config() {
        let config = EmailConfig {
            provider: EmailProviderConfig::Brevo {
                api_key: "key".to_string(),
            },
            from_address: "noreply@mediate.example".to_string(),
            from_name: "Mediate".to_string(),
            reply_to: None,
            retry_base_delay_ms: 1000,
            max_attempts: 3,
        };
        assert_eq!(build_transport(&config).unwrap().name(), "brevo");
    }
}
