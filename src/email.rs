//! Outbound email abstraction and the two transactional templates.
//!
//! The auth service only ever needs "send this message or tell me it
//! failed"; delivery transport (SMTP, provider API) hides behind the
//! [`Mailer`] trait. The default for local development is [`LogMailer`],
//! which logs the payload and reports success.

use anyhow::Result;
use tracing::info;
use url::form_urlencoded;

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body_html: String,
}

/// Email delivery abstraction used by the auth service.
pub trait Mailer: Send + Sync {
    /// Deliver a message or return an error.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs instead of delivering.
#[derive(Clone, Debug)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to = %message.to,
            subject = %message.subject,
            "email send stub"
        );
        Ok(())
    }
}

fn link(base_url: &str, path: &str, email: &str, token: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let query: String = form_urlencoded::Serializer::new(String::new())
        .append_pair("email", email)
        .append_pair("token", token)
        .finish();
    format!("{base}{path}?{query}")
}

/// Message carrying the email-verification link.
#[must_use]
pub fn verification_email(base_url: &str, email: &str, token: &str) -> EmailMessage {
    let url = link(base_url, "/auth/verify-email", email, token);
    EmailMessage {
        to: email.to_string(),
        subject: "Verify your email".to_string(),
        body_html: format!(
            "<p>Welcome to parola!</p>\
             <p>Click <a href=\"{url}\">here</a> to verify your email address.</p>"
        ),
    }
}

/// Message carrying the password-reset link.
#[must_use]
pub fn reset_password_email(base_url: &str, email: &str, token: &str) -> EmailMessage {
    let url = link(base_url, "/auth/reset-password", email, token);
    EmailMessage {
        to: email.to_string(),
        subject: "Reset your password".to_string(),
        body_html: format!(
            "<p>A password reset was requested for this address.</p>\
             <p>Click <a href=\"{url}\">here</a> to choose a new password. \
             If you did not request this, you can ignore this email.</p>"
        ),
    }
}
