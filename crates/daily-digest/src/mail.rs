//! Email delivery over SMTP.

use std::sync::Arc;

use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{error, info, instrument};

use crate::config::{SmtpConfig, SmtpSecurity};
use crate::error::DeliveryError;
use crate::model::DeliveryResult;

/// Something that can hand a finished message to a mail server.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, message: Message) -> Result<(), DeliveryError>;

    /// Connect and authenticate without sending anything.
    async fn check(&self) -> Result<(), DeliveryError>;
}

#[async_trait]
impl MailTransport for AsyncSmtpTransport<Tokio1Executor> {
    async fn deliver(&self, message: Message) -> Result<(), DeliveryError> {
        self.send(message).await.map(|_| ()).map_err(classify)
    }

    async fn check(&self) -> Result<(), DeliveryError> {
        match self.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(DeliveryError::Transport(
                "server did not accept the connection".to_string(),
            )),
            Err(e) => Err(classify(e)),
        }
    }
}

/// Sort SMTP failures into authentication problems and everything else.
fn classify(err: lettre::transport::smtp::Error) -> DeliveryError {
    let code = err.status().map(|c| c.to_string());
    let message = err.to_string();

    let auth_code = matches!(code.as_deref(), Some("530" | "534" | "535"));
    if auth_code || message.to_ascii_lowercase().contains("authentication") {
        DeliveryError::Authentication(message)
    } else {
        DeliveryError::Transport(message)
    }
}

/// Build an SMTP transport for the configured security mode.
pub fn smtp_transport(
    config: &SmtpConfig,
) -> Result<AsyncSmtpTransport<Tokio1Executor>, DeliveryError> {
    let builder = match config.security {
        SmtpSecurity::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| DeliveryError::Transport(e.to_string()))?,
        SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| DeliveryError::Transport(e.to_string()))?,
        SmtpSecurity::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host),
    };

    let creds = Credentials::new(
        config.username.clone(),
        config.password.expose().to_string(),
    );

    Ok(builder
        .port(config.port)
        .credentials(creds)
        .timeout(Some(config.timeout))
        .build())
}

/// Sends rendered digests to a recipient.
#[derive(Clone)]
pub struct EmailSender {
    from: String,
    transport: Arc<dyn MailTransport>,
}

impl EmailSender {
    /// Create a sender backed by a real SMTP transport.
    pub fn new(config: &SmtpConfig) -> Result<Self, DeliveryError> {
        let transport = smtp_transport(config)?;
        Ok(Self::with_transport(config.from.clone(), Arc::new(transport)))
    }

    /// Create a sender with any transport.
    pub fn with_transport(from: impl Into<String>, transport: Arc<dyn MailTransport>) -> Self {
        Self {
            from: from.into(),
            transport,
        }
    }

    /// Build a `multipart/alternative` message: plain text first, HTML second.
    pub fn build_message(
        &self,
        to: &str,
        subject: &str,
        html_body: &str,
        text_body: &str,
    ) -> Result<Message, DeliveryError> {
        let from: Mailbox = self.from.parse().map_err(|e: lettre::address::AddressError| {
            DeliveryError::Address {
                address: self.from.clone(),
                message: e.to_string(),
            }
        })?;
        let to_box: Mailbox = to.parse().map_err(|e: lettre::address::AddressError| {
            DeliveryError::Address {
                address: to.to_string(),
                message: e.to_string(),
            }
        })?;

        Message::builder()
            .from(from)
            .to(to_box)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )
            .map_err(|e| DeliveryError::Message(e.to_string()))
    }

    /// Send one email, returning the typed failure. Used by the pipeline.
    #[instrument(skip(self, html_body, text_body))]
    pub async fn try_send(
        &self,
        to: &str,
        subject: &str,
        html_body: &str,
        text_body: &str,
    ) -> Result<(), DeliveryError> {
        let message = self.build_message(to, subject, html_body, text_body)?;
        self.transport.deliver(message).await?;
        info!(to = %to, subject = subject, "Email sent successfully");
        Ok(())
    }

    /// Send one email. Never returns an error; failures land in the result.
    ///
    /// This is the non-raising wrapper around [`EmailSender::try_send`] for
    /// callers that only need success and a readable cause.
    /// [`DigestPipeline::run`](crate::pipeline::DigestPipeline::run) calls
    /// `try_send` directly so authentication and transport failures reach
    /// [`RunError::Delivery`](crate::error::RunError::Delivery) still typed.
    pub async fn send(
        &self,
        to: &str,
        subject: &str,
        html_body: &str,
        text_body: &str,
    ) -> DeliveryResult {
        match self.try_send(to, subject, html_body, text_body).await {
            Ok(()) => DeliveryResult::delivered(),
            Err(e) => {
                error!(to = %to, error = %e, "Email delivery failed");
                DeliveryResult::failed(e.to_string())
            }
        }
    }

    /// Verify the server is reachable and accepts our credentials.
    pub async fn check_connection(&self) -> Result<(), DeliveryError> {
        self.transport.check().await?;
        info!("SMTP connection verified");
        Ok(())
    }
}
