// ============================================================================
// SERVICE : EMAILS TRANSACTIONNELS
// ============================================================================
//
// Description:
//   Envoi des emails de vérification de compte et de reset de mot de passe
//   via SMTP (lettre). Le service est optionnel: sans configuration SMTP
//   complète dans l'environnement, il passe en mode désactivé et les envois
//   deviennent des no-ops loggés. L'API reste utilisable sans serveur mail.
//
// Variables d'environnement:
//   - SMTP_HOST, SMTP_USERNAME, SMTP_PASSWORD
//   - EMAIL_FROM : adresse expéditrice ("VetConnect <no-reply@...>")
//   - APP_BASE_URL : base des liens envoyés (défaut http://localhost:3000)
//
// ============================================================================

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("invalid email address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("failed to build message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("smtp error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

#[async_trait]
trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: String) -> Result<(), EmailError>;
}

struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: String) -> Result<(), EmailError> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(to.parse::<Mailbox>()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)?;

        self.transport.send(email).await?;
        Ok(())
    }
}

/// Mailer no-op utilisé quand SMTP n'est pas configuré
struct NoopMailer;

#[async_trait]
impl Mailer for NoopMailer {
    async fn send(&self, to: &str, subject: &str, _body: String) -> Result<(), EmailError> {
        tracing::info!(to, subject, "SMTP non configuré, email non envoyé");
        Ok(())
    }
}

pub struct EmailService {
    mailer: Box<dyn Mailer>,
    base_url: String,
}

impl EmailService {
    /// Construit le service depuis l'environnement. Configuration SMTP
    /// incomplète ou invalide = mode désactivé (warning loggé), jamais un panic.
    pub fn from_env() -> Self {
        let base_url = std::env::var("APP_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        let smtp = (
            std::env::var("SMTP_HOST"),
            std::env::var("SMTP_USERNAME"),
            std::env::var("SMTP_PASSWORD"),
            std::env::var("EMAIL_FROM"),
        );

        let (host, username, password, from) = match smtp {
            (Ok(h), Ok(u), Ok(p), Ok(f)) => (h, u, p, f),
            _ => {
                tracing::warn!("⚠️  Configuration SMTP incomplète, emails désactivés");
                return Self::disabled_with_base_url(base_url);
            }
        };

        let from: Mailbox = match from.parse() {
            Ok(mbox) => mbox,
            Err(e) => {
                tracing::warn!(error = %e, "EMAIL_FROM invalide, emails désactivés");
                return Self::disabled_with_base_url(base_url);
            }
        };

        let transport = match AsyncSmtpTransport::<Tokio1Executor>::relay(&host) {
            Ok(builder) => builder
                .credentials(Credentials::new(username, password))
                .build(),
            Err(e) => {
                tracing::warn!(error = %e, "relais SMTP invalide, emails désactivés");
                return Self::disabled_with_base_url(base_url);
            }
        };

        EmailService {
            mailer: Box::new(SmtpMailer { transport, from }),
            base_url,
        }
    }

    /// Service désactivé (tests, environnements sans SMTP)
    pub fn disabled() -> Self {
        Self::disabled_with_base_url("http://localhost:3000".to_string())
    }

    fn disabled_with_base_url(base_url: String) -> Self {
        EmailService {
            mailer: Box::new(NoopMailer),
            base_url,
        }
    }

    pub async fn send_verification_email(
        &self,
        to: &str,
        full_name: &str,
        token: &str,
    ) -> Result<(), EmailError> {
        let link = format!("{}/verify-email?token={}", self.base_url, token);
        let body = format!(
            "Hello {},\n\nWelcome to VetConnect! Please verify your email address \
             by clicking the link below (valid for 24 hours):\n\n{}\n\n\
             If you did not create an account, you can ignore this email.\n",
            full_name, link
        );
        self.mailer
            .send(to, "VetConnect - Verify your email", body)
            .await
    }

    pub async fn send_reset_email(
        &self,
        to: &str,
        full_name: &str,
        token: &str,
    ) -> Result<(), EmailError> {
        let link = format!("{}/reset-password?token={}", self.base_url, token);
        let body = format!(
            "Hello {},\n\nA password reset was requested for your VetConnect \
             account. Click the link below to choose a new password (valid for \
             1 hour):\n\n{}\n\n\
             If you did not request this, you can ignore this email.\n",
            full_name, link
        );
        self.mailer
            .send(to, "VetConnect - Reset your password", body)
            .await
    }
}
