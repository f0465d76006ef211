use anyhow::Context;
use axum::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::debug;

use super::{Email, MailError, Mailer};
use crate::config::SmtpConfig;

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig) -> anyhow::Result<Self> {
        let builder = if cfg.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)
                .with_context(|| format!("smtp relay {}", cfg.host))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&cfg.host)
        };
        let mut builder = builder.port(cfg.port);
        if let (Some(user), Some(password)) = (&cfg.username, &cfg.password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }
        let from = Mailbox::new(
            Some(cfg.from_name.clone()),
            cfg.from_email
                .parse::<Address>()
                .with_context(|| format!("SMTP_FROM_EMAIL `{}`", cfg.from_email))?,
        );
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn build_message(&self, email: Email) -> Result<Message, MailError> {
        if email.to.is_empty() {
            return Err(MailError::NoRecipients);
        }
        let parse = |addr: &String| -> Result<Mailbox, MailError> {
            addr.trim()
                .parse::<Mailbox>()
                .map_err(|_| MailError::Address(addr.clone()))
        };

        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(email.subject);
        for addr in &email.to {
            builder = builder.to(parse(addr)?);
        }
        for addr in &email.cc {
            builder = builder.cc(parse(addr)?);
        }
        for addr in &email.bcc {
            builder = builder.bcc(parse(addr)?);
        }
        let message = match email.html {
            Some(html) => builder.multipart(MultiPart::alternative_plain_html(email.body, html)),
            None => builder.header(ContentType::TEXT_PLAIN).body(email.body),
        };
        message.map_err(|e| MailError::Delivery(e.to_string()))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        let recipients = email.envelope_recipients().len();
        let message = self.build_message(email)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Delivery(e.to_string()))?;
        debug!(recipients, "mail sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mailer() -> SmtpMailer {
        SmtpMailer::new(&SmtpConfig {
            host: "localhost".into(),
            port: 2525,
            username: None,
            password: None,
            use_tls: false,
            from_email: "noreply@example.com".into(),
            from_name: "Support Team".into(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn rejects_bad_addresses_and_empty_recipients() {
        let m = mailer();
        let err = m
            .build_message(Email {
                to: vec!["not an address".into()],
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, MailError::Address(_)));
        assert!(matches!(
            m.build_message(Email::default()).unwrap_err(),
            MailError::NoRecipients
        ));
    }

    #[tokio::test]
    async fn builds_multipart_when_html_is_present() {
        let message = mailer()
            .build_message(Email {
                subject: "Hello".into(),
                to: vec!["a@example.com".into()],
                bcc: vec!["b@example.com".into()],
                body: "plain".into(),
                html: Some("<b>rich</b>".into()),
                ..Default::default()
            })
            .unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("Subject: Hello"));
        assert!(!raw.contains("b@example.com"), "bcc stays out of headers");
        assert_eq!(message.envelope().to().len(), 2);
    }
}
