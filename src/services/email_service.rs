use async_trait::async_trait;
use lettre::{
    Message, SmtpTransport, Transport,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};

use crate::config::EmailConfig;
use crate::error::{AppError, Result};

/// メール送信の抽象。SMTP未設定時やテストでは差し替える。
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to_email: &str, subject: &str, body: &str) -> Result<()>;
}

pub struct SmtpMailer {
    smtp_transport: SmtpTransport,
    from_email: String,
    from_name: String,
}

impl SmtpMailer {
    pub fn from_config(config: &EmailConfig) -> Result<Self> {
        let credentials =
            Credentials::new(config.smtp_username.clone(), config.smtp_password.clone());

        let smtp_transport = SmtpTransport::starttls_relay(&config.smtp_host)
            .map_err(|e| AppError::EnvironmentError(format!("SMTP connection error: {}", e)))?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            smtp_transport,
            from_email: config.from_email.clone(),
            from_name: config.from_name.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to_email: &str, subject: &str, body: &str) -> Result<()> {
        let from: Mailbox = format!("{} <{}>", self.from_name, self.from_email)
            .parse()
            .map_err(|e| AppError::EnvironmentError(format!("invalid sender address: {}", e)))?;
        let to: Mailbox = to_email
            .parse()
            .map_err(|e| AppError::ExternalServiceError(format!("invalid recipient: {}", e)))?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| AppError::ExternalServiceError(format!("message build error: {}", e)))?;

        // SmtpTransport はブロッキングなので別スレッドで送信
        let transport = self.smtp_transport.clone();
        tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("mail task error: {}", e)))?
            .map_err(|e| AppError::ExternalServiceError(format!("SMTP send error: {}", e)))?;

        Ok(())
    }
}

/// SMTP未設定時に使う。本文はログにのみ出力する。
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to_email: &str, subject: &str, body: &str) -> Result<()> {
        tracing::info!(to = to_email, subject, "SMTP not configured, mail logged only");
        tracing::debug!(body, "mail body");
        Ok(())
    }
}

pub fn password_reset_mail(reset_url: &str) -> (String, String) {
    let subject = "Notatki: resetowanie hasła".to_string();
    let body = format!(
        r#"
Otrzymaliśmy prośbę o zresetowanie hasła do Twojego konta.

Aby ustawić nowe hasło, otwórz poniższy link:

{}

Link jest ważny przez 30 minut i można go użyć tylko raz.
Jeśli to nie Ty wysłałeś prośbę, zignoruj tę wiadomość.

---
Notatki
"#,
        reset_url
    );
    (subject, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_mail_contains_link() {
        let (subject, body) = password_reset_mail("http://localhost:3000/reset-password?token=abc");
        assert!(subject.contains("hasła"));
        assert!(body.contains("token=abc"));
    }

    #[tokio::test]
    async fn log_mailer_never_fails() {
        LogMailer
            .send("anna@example.com", "temat", "treść")
            .await
            .unwrap();
    }
}
