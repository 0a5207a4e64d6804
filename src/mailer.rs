// src/mailer.rs

use reqwest::blocking::Client;
use serde::Serialize;
use std::error::Error;
use std::fmt;
use std::time::Duration;

#[derive(Debug)]
pub enum MailerError {
    RequestFailed(String),
    ApiError(String),
}

impl fmt::Display for MailerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MailerError::RequestFailed(msg) => write!(f, "Request failed: {}", msg),
            MailerError::ApiError(msg) => write!(f, "API error: {}", msg),
        }
    }
}

impl Error for MailerError {}

/// Transactional-email delivery via Brevo. Best-effort collaborator: callers
/// log failures and move on, they never roll back domain state over a failed
/// send.
#[derive(Clone)]
pub struct BrevoMailer {
    api_key: String,
    sender_email: String,
    sender_name: String,
    client: Client,
}

#[derive(Serialize)]
struct BrevoSender<'a> {
    name: &'a str,
    email: &'a str,
}

#[derive(Serialize)]
struct BrevoRecipient<'a> {
    email: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BrevoPayload<'a> {
    sender: BrevoSender<'a>,
    to: Vec<BrevoRecipient<'a>>,
    subject: &'a str,
    html_content: &'a str,
}

impl BrevoMailer {
    pub fn new(api_key: String, sender_email: String, sender_name: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("mailer client");
        Self {
            api_key,
            sender_email,
            sender_name,
            client,
        }
    }

    /// Constructed from env at startup; None degrades to in-app-only delivery.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("BREVO_API_KEY").ok()?;
        let sender_email =
            std::env::var("BREVO_SENDER_EMAIL").unwrap_or_else(|_| "alerts@carwatch.app".into());
        let sender_name =
            std::env::var("BREVO_SENDER_NAME").unwrap_or_else(|_| "Carwatch".into());
        Some(Self::new(api_key, sender_email, sender_name))
    }

    pub fn send_notification(
        &self,
        recipient_email: &str,
        subject: &str,
        html_content: &str,
    ) -> Result<(), MailerError> {
        let payload = BrevoPayload {
            sender: BrevoSender {
                name: &self.sender_name,
                email: &self.sender_email,
            },
            to: vec![BrevoRecipient {
                email: recipient_email,
            }],
            subject,
            html_content,
        };

        let resp = self
            .client
            .post("https://api.brevo.com/v3/smtp/email")
            .header("api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .map_err(|e| MailerError::RequestFailed(e.to_string()))?;

        if !resp.status().is_success() {
            let error_body = resp.text().unwrap_or_else(|_| "Unknown error".to_string());
            return Err(MailerError::ApiError(format!(
                "Failed to send email: {}",
                error_body
            )));
        }

        Ok(())
    }
}

/// Renders the notification email. Plain inline-styled HTML, one card per
/// vehicle with the change summary underneath.
pub fn notification_html(
    title: &str,
    body: &str,
    vehicle_name: &str,
    listing_url: Option<&str>,
    photo_url: Option<&str>,
) -> String {
    let photo = photo_url
        .map(|u| {
            format!(
                r#"<img src="{u}" alt="{vehicle_name}" style="width: 100%; max-height: 240px; object-fit: cover; border-radius: 8px 8px 0 0;">"#
            )
        })
        .unwrap_or_default();

    let link = listing_url
        .map(|u| {
            format!(
                r#"<p style="margin: 25px 0;">
                    <a href="{u}" style="background-color: #007bff; color: white; padding: 10px 20px; text-decoration: none; border-radius: 5px; display: inline-block;">
                        View Listing
                    </a>
                </p>"#
            )
        })
        .unwrap_or_default();

    format!(
        r#"
        <html>
            <body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
                <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
                    <h2>{title}</h2>
                    <div style="border: 1px solid #e5e7eb; border-radius: 8px; overflow: hidden; margin-bottom: 16px;">
                        {photo}
                        <div style="padding: 16px;">
                            <h3 style="margin: 0 0 8px 0;">{vehicle_name}</h3>
                            <p style="margin: 0; color: #555;">{body}</p>
                        </div>
                    </div>
                    {link}
                    <hr style="margin-top: 30px; border: none; border-top: 1px solid #eee;">
                    <p style="font-size: 0.8em; color: #999;">
                        You are receiving this because this vehicle is on your watchlist.
                    </p>
                </div>
            </body>
        </html>
        "#
    )
}
