//! Owner e-mail notifications.
//!
//! Every confirmed booking and every cancellation request is mailed to the
//! owner in addition to the WhatsApp alert. Delivery goes through [`Mailer`];
//! [`SmtpMailer`] is the production transport.

use crate::error::ToolError;
use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use skipper_voice::escape_xml;
use std::fmt;
use tracing::info;

fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    465
}

fn default_from_name() -> String {
    "Skipper Bot".to_string()
}

/// SMTP settings. Mail is disabled while `username` or `to` is empty.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// Account used to log in, also the sender address.
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    /// Display name on the sender address.
    #[serde(default = "default_from_name")]
    pub from_name: String,
    /// The owner's inbox.
    pub to: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            from_name: default_from_name(),
            to: String::new(),
        }
    }
}

impl fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("from_name", &self.from_name)
            .field("to", &self.to)
            .finish()
    }
}

impl EmailConfig {
    pub fn is_configured(&self) -> bool {
        !self.username.is_empty() && !self.to.is_empty()
    }
}

/// What the owner is told about an order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderNotice {
    pub order_id: Option<u64>,
    pub client_name: String,
    pub client_phone: String,
    pub yacht: String,
    pub date: String,
    pub start_time: String,
    pub total_price: String,
    /// Free text, used for cancellation requests.
    pub status: Option<String>,
}

impl OrderNotice {
    fn order_label(&self) -> String {
        self.order_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "N/A".to_string())
    }

    pub fn subject(&self) -> String {
        format!(
            "💰 New order #{}: {} ({})",
            self.order_label(),
            self.client_name,
            self.date
        )
    }

    pub fn html(&self) -> String {
        let mut rows = vec![
            ("Order", format!("#{}", self.order_label())),
            ("Client", self.client_name.clone()),
            ("Phone", self.client_phone.clone()),
            ("Yacht", self.yacht.clone()),
            ("Date", self.date.clone()),
            ("Time", self.start_time.clone()),
        ];
        if !self.total_price.trim().is_empty() {
            rows.push(("Total", format!("{} ₪", self.total_price)));
        }
        if let Some(status) = &self.status {
            rows.push(("Status", status.clone()));
        }
        let body: String = rows
            .iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .map(|(label, value)| {
                format!("<p><strong>{}:</strong> {}</p>", label, escape_xml(value))
            })
            .collect();
        format!(
            "<div style=\"font-family: Arial; padding: 20px; border: 1px solid #ccc;\">\
             <h2>New yacht order</h2>{}<hr><p><em>Sent automatically after the booking \
             was confirmed.</em></p></div>",
            body
        )
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_order_email(&self, notice: &OrderNotice) -> Result<(), ToolError>;
}

/// Sends order mail over SMTP with implicit TLS.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &EmailConfig) -> Result<Self, ToolError> {
        let from = format!("{} <{}>", config.from_name, config.username)
            .parse::<Mailbox>()
            .map_err(|e| ToolError::Mail(format!("invalid sender address: {}", e)))?;
        let to = config
            .to
            .parse::<Mailbox>()
            .map_err(|e| ToolError::Mail(format!("invalid recipient address: {}", e)))?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .map_err(|e| ToolError::Mail(e.to_string()))?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();
        Ok(Self {
            transport,
            from,
            to,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_order_email(&self, notice: &OrderNotice) -> Result<(), ToolError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(notice.subject())
            .header(ContentType::TEXT_HTML)
            .body(notice.html())
            .map_err(|e| ToolError::Mail(e.to_string()))?;
        self.transport
            .send(message)
            .await
            .map_err(|e| ToolError::Mail(e.to_string()))?;
        info!(order = %notice.order_label(), "order e-mail sent to owner");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notice_renders_escaped_fields_and_skips_blanks() {
        let notice = OrderNotice {
            order_id: Some(1000),
            client_name: "Dana <VIP>".to_string(),
            client_phone: "+972511111111".to_string(),
            yacht: "Bagira".to_string(),
            date: "14.07.2026".to_string(),
            ..OrderNotice::default()
        };
        assert_eq!(notice.subject(), "💰 New order #1000: Dana <VIP> (14.07.2026)");
        let html = notice.html();
        assert!(html.contains("Dana &lt;VIP&gt;"));
        assert!(html.contains("<strong>Yacht:</strong> Bagira"));
        assert!(!html.contains("Time:"));
    }

    #[test]
    fn cancellation_has_no_order_number() {
        let notice = OrderNotice {
            client_name: "CANCEL REQUEST".to_string(),
            status: Some("order 1004".to_string()),
            ..OrderNotice::default()
        };
        assert!(notice.subject().contains("#N/A"));
        assert!(notice.html().contains("order 1004"));
    }

    #[test]
    fn mail_needs_account_and_recipient() {
        let mut config = EmailConfig::default();
        assert!(!config.is_configured());
        config.username = "bot@example.com".to_string();
        config.to = "owner@example.com".to_string();
        config.password = "secret".to_string();
        assert!(config.is_configured());
        assert!(!format!("{:?}", config).contains("secret"));
    }

    #[test]
    fn smtp_mailer_rejects_bad_addresses() {
        let config = EmailConfig {
            username: "bot@example.com".to_string(),
            to: "not an address".to_string(),
            ..EmailConfig::default()
        };
        assert!(matches!(SmtpMailer::new(&config), Err(ToolError::Mail(_))));
    }
}
