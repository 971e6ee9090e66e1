//! Email notifications.
//!
//! Templates are rendered in code and handed to a [`Mailer`]. Sending never
//! fails the caller: every attempt resolves to a [`DeliveryOutcome`] that is
//! logged and returned so handlers can show a degraded confirmation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Serialize;
use taskdesk_common::config::MailConfig;
use taskdesk_db::entities::{assignment, invoice, meeting, quote, task_request, user};
use thiserror::Error;

/// Mail transport errors.
#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid address {0}")]
    InvalidAddress(String),

    #[error("could not build message: {0}")]
    Build(String),

    #[error("transport failure: {0}")]
    Transport(String),
}

/// A file attached to an email.
#[derive(Debug, Clone)]
pub struct EmailAttachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// An image referenced from the HTML body as `cid:{content_id}`.
#[derive(Debug, Clone)]
pub struct InlineImage {
    pub content_id: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// A fully rendered email, ready for a transport.
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
    pub attachments: Vec<EmailAttachment>,
    pub inline_images: Vec<InlineImage>,
}

/// Outbound mail transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn deliver(&self, email: &OutgoingEmail) -> Result<(), MailError>;
}

/// SMTP transport backed by lettre.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    /// Build a relay transport from configuration.
    pub fn from_config(config: &MailConfig) -> Result<Self, MailError> {
        let mut builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
                .map_err(|e| MailError::Transport(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
        };

        builder = builder
            .port(config.smtp_port)
            .timeout(Some(Duration::from_secs(config.timeout_secs)));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
        })
    }

    fn build_message(email: &OutgoingEmail) -> Result<Message, MailError> {
        let from: Mailbox = email
            .from
            .parse()
            .map_err(|_| MailError::InvalidAddress(email.from.clone()))?;
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|_| MailError::InvalidAddress(email.to.clone()))?;

        let html = if email.inline_images.is_empty() {
            MultiPart::alternative()
                .singlepart(SinglePart::plain(email.text_body.clone()))
                .singlepart(SinglePart::html(email.html_body.clone()))
        } else {
            let mut related = MultiPart::related().singlepart(SinglePart::html(email.html_body.clone()));
            for image in &email.inline_images {
                let content_type = ContentType::parse(&image.content_type)
                    .map_err(|e| MailError::Build(e.to_string()))?;
                related = related.singlepart(
                    Attachment::new_inline(image.content_id.clone())
                        .body(image.data.clone(), content_type),
                );
            }
            MultiPart::alternative()
                .singlepart(SinglePart::plain(email.text_body.clone()))
                .multipart(related)
        };

        let body = if email.attachments.is_empty() {
            html
        } else {
            let mut mixed = MultiPart::mixed().multipart(html);
            for attachment in &email.attachments {
                let content_type = ContentType::parse(&attachment.content_type)
                    .map_err(|e| MailError::Build(e.to_string()))?;
                mixed = mixed.singlepart(
                    Attachment::new(attachment.filename.clone())
                        .body(attachment.data.clone(), content_type),
                );
            }
            mixed
        };

        Message::builder()
            .from(from)
            .to(to)
            .subject(email.subject.clone())
            .multipart(body)
            .map_err(|e| MailError::Build(e.to_string()))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn deliver(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        let message = Self::build_message(email)?;
        self.transport
            .send(message)
            .await
            .map(|_| ())
            .map_err(|e| MailError::Transport(e.to_string()))
    }
}

/// In-memory transport that records every email.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
    fail: bool,
}

impl RecordingMailer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose every delivery fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// Emails delivered so far.
    #[must_use]
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Emails delivered with a subject starting with `prefix`.
    #[must_use]
    pub fn sent_with_subject(&self, prefix: &str) -> Vec<OutgoingEmail> {
        self.sent()
            .into_iter()
            .filter(|e| e.subject.starts_with(prefix))
            .collect()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn deliver(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        if self.fail {
            return Err(MailError::Transport("connection refused".to_string()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(email.clone());
        }
        Ok(())
    }
}

/// Result of one notification attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Sent,
    /// Sending is disabled; logged instead.
    Suppressed,
    /// Not attempted, e.g. no recipient or no sender configured.
    Skipped(String),
    Failed(String),
}

impl DeliveryOutcome {
    /// Whether the message counts as delivered.
    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        matches!(self, Self::Sent | Self::Suppressed)
    }
}

/// Named email templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailTemplate {
    QuoteCreated,
    InvoiceCreated,
    PaymentReceived,
    AssignmentInvite,
    AssignmentResponse,
    WorkSubmitted,
    MeetingScheduled,
    MeetingRescheduled,
    MeetingCanceled,
    MeetingCompleted,
}

/// Template variables plus optional attachments.
#[derive(Debug, Clone, Default)]
pub struct EmailContext {
    vars: HashMap<String, String>,
    attachments: Vec<EmailAttachment>,
    inline_images: Vec<InlineImage>,
}

impl EmailContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn var(mut self, key: &str, value: impl Into<String>) -> Self {
        self.vars.insert(key.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn vars(mut self, vars: HashMap<String, String>) -> Self {
        self.vars.extend(vars);
        self
    }

    #[must_use]
    pub fn attach(mut self, attachment: EmailAttachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    #[must_use]
    pub fn inline_image(mut self, image: InlineImage) -> Self {
        self.inline_images.push(image);
        self
    }

    fn get(&self, key: &str) -> &str {
        self.vars.get(key).map_or("", String::as_str)
    }

    /// HTML-escaped variable.
    fn html(&self, key: &str) -> String {
        escape_html(self.get(key))
    }
}

/// Notification dispatcher.
#[derive(Clone)]
pub struct NotificationService {
    mailer: Arc<dyn Mailer>,
    sender: Option<String>,
    suppress_send: bool,
    base_url: String,
    logo: Option<InlineImage>,
}

impl NotificationService {
    /// Create a new notification service.
    #[must_use]
    pub fn new(
        mailer: Arc<dyn Mailer>,
        sender: Option<String>,
        suppress_send: bool,
        base_url: String,
    ) -> Self {
        Self {
            mailer,
            sender,
            suppress_send,
            base_url: base_url.trim_end_matches('/').to_string(),
            logo: None,
        }
    }

    /// Embed a logo image in receipts.
    #[must_use]
    pub fn with_logo(mut self, content_type: &str, data: Vec<u8>) -> Self {
        self.logo = Some(InlineImage {
            content_id: "logo".to_string(),
            content_type: content_type.to_string(),
            data,
        });
        self
    }

    /// Absolute link into the application.
    #[must_use]
    pub fn link(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Render `template` and send it to `to`.
    pub async fn send(
        &self,
        to: &str,
        subject: &str,
        template: EmailTemplate,
        ctx: EmailContext,
    ) -> DeliveryOutcome {
        let to = to.trim();
        if to.is_empty() {
            tracing::warn!(?template, "Email skipped: missing recipient");
            return DeliveryOutcome::Skipped("missing recipient".to_string());
        }
        let Some(from) = self.sender.clone().filter(|s| !s.trim().is_empty()) else {
            tracing::warn!(?template, to = %to, "Email skipped: no sender configured");
            return DeliveryOutcome::Skipped("missing sender".to_string());
        };

        let (text_body, html_body) = render_template(template, &ctx);
        let email = OutgoingEmail {
            from,
            to: to.to_string(),
            subject: subject.to_string(),
            text_body,
            html_body,
            attachments: ctx.attachments,
            inline_images: ctx.inline_images,
        };

        if self.suppress_send {
            tracing::info!(to = %email.to, subject = %email.subject, "Email suppressed");
            return DeliveryOutcome::Suppressed;
        }

        match self.mailer.deliver(&email).await {
            Ok(()) => {
                tracing::info!(to = %email.to, subject = %email.subject, "Email sent");
                DeliveryOutcome::Sent
            }
            Err(e) => {
                tracing::error!(to = %email.to, subject = %email.subject, error = %e, "Email failed");
                DeliveryOutcome::Failed(e.to_string())
            }
        }
    }

    // ==================== Quotes & Billing ====================

    pub async fn quote_created(
        &self,
        client: &user::Model,
        task: &task_request::Model,
        quote: &quote::Model,
    ) -> DeliveryOutcome {
        let ctx = task_context(task, client)
            .var("price", format_money(quote.proposed_price, &quote.currency))
            .var("message", quote.message.clone().unwrap_or_default())
            .var("task_link", self.link(&format!("client/tasks/{}", task.id)));
        self.send(
            &client.email,
            &format!("New quote for Task #{}", task.id),
            EmailTemplate::QuoteCreated,
            ctx,
        )
        .await
    }

    pub async fn invoice_created(
        &self,
        client: &user::Model,
        task: &task_request::Model,
        invoice: &invoice::Model,
    ) -> DeliveryOutcome {
        let ctx = task_context(task, client)
            .var("invoice_id", invoice.id.to_string())
            .var("amount", format_money(invoice.amount, &invoice.currency))
            .var("pay_url", self.link(&format!("payments/pay/{}", invoice.id)))
            .var("task_link", self.link(&format!("client/tasks/{}", task.id)));
        self.send(
            &client.email,
            &format!("Invoice issued - Task #{}", task.id),
            EmailTemplate::InvoiceCreated,
            ctx,
        )
        .await
    }

    pub async fn payment_received(
        &self,
        client: &user::Model,
        task: &task_request::Model,
        invoice: &invoice::Model,
    ) -> DeliveryOutcome {
        let mut ctx = task_context(task, client)
            .var("invoice_id", invoice.id.to_string())
            .var("amount", format_money(invoice.amount, &invoice.currency))
            .var(
                "paid_at",
                invoice
                    .paid_at
                    .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                    .unwrap_or_default(),
            )
            .var("task_link", self.link(&format!("client/tasks/{}", task.id)));
        if let Some(logo) = &self.logo {
            ctx = ctx.var("logo_cid", logo.content_id.clone()).inline_image(logo.clone());
        }
        self.send(
            &client.email,
            &format!("Payment received - Task #{}", task.id),
            EmailTemplate::PaymentReceived,
            ctx,
        )
        .await
    }

    // ==================== Assignments ====================

    pub async fn assignment_invite(
        &self,
        freelancer: &user::Model,
        task: &task_request::Model,
        assignment: &assignment::Model,
    ) -> DeliveryOutcome {
        let ctx = EmailContext::new()
            .var("name", freelancer.name.clone())
            .var("task_id", task.id.to_string())
            .var("task_title", task.title.clone())
            .var(
                "expires_at",
                assignment
                    .accept_expires_at
                    .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                    .unwrap_or_default(),
            )
            .var(
                "respond_link",
                self.link(&format!("freelancer/assignments/{}", assignment.id)),
            );
        self.send(
            &freelancer.email,
            &format!("New assignment: Task #{}", task.id),
            EmailTemplate::AssignmentInvite,
            ctx,
        )
        .await
    }

    pub async fn assignment_response(
        &self,
        admin: &user::Model,
        freelancer: &user::Model,
        task: &task_request::Model,
        accepted: bool,
    ) -> DeliveryOutcome {
        let verb = if accepted { "accepted" } else { "declined" };
        let ctx = EmailContext::new()
            .var("name", admin.name.clone())
            .var("freelancer", freelancer.name.clone())
            .var("verb", verb)
            .var("task_id", task.id.to_string())
            .var("task_title", task.title.clone())
            .var("task_link", self.link(&format!("admin/tasks/{}", task.id)));
        self.send(
            &admin.email,
            &format!("Assignment {verb} - Task #{}", task.id),
            EmailTemplate::AssignmentResponse,
            ctx,
        )
        .await
    }

    pub async fn work_submitted(
        &self,
        admin: &user::Model,
        freelancer: &user::Model,
        task: &task_request::Model,
        file_count: usize,
    ) -> DeliveryOutcome {
        let ctx = EmailContext::new()
            .var("name", admin.name.clone())
            .var("freelancer", freelancer.name.clone())
            .var("task_id", task.id.to_string())
            .var("task_title", task.title.clone())
            .var("file_count", file_count.to_string())
            .var("task_link", self.link(&format!("admin/tasks/{}", task.id)));
        self.send(
            &admin.email,
            &format!("Work submitted - Task #{}", task.id),
            EmailTemplate::WorkSubmitted,
            ctx,
        )
        .await
    }

    // ==================== Meetings ====================

    pub async fn meeting_update(
        &self,
        client: &user::Model,
        task: &task_request::Model,
        meeting: &meeting::Model,
        ics: String,
    ) -> DeliveryOutcome {
        let (template, subject) = match meeting.status {
            meeting::MeetingStatus::Scheduled => (
                EmailTemplate::MeetingScheduled,
                format!("Review meeting scheduled - Task #{}", task.id),
            ),
            meeting::MeetingStatus::Rescheduled => (
                EmailTemplate::MeetingRescheduled,
                format!("Review meeting rescheduled - Task #{}", task.id),
            ),
            meeting::MeetingStatus::Canceled => (
                EmailTemplate::MeetingCanceled,
                format!("Review meeting canceled - Task #{}", task.id),
            ),
            meeting::MeetingStatus::Completed => (
                EmailTemplate::MeetingCompleted,
                format!("Review meeting completed - Task #{}", task.id),
            ),
        };

        let ctx = task_context(task, client)
            .var(
                "when",
                meeting.scheduled_for.format("%Y-%m-%d %H:%M UTC").to_string(),
            )
            .var("duration", meeting.duration_minutes.to_string())
            .var("join_url", meeting.join_url.clone().unwrap_or_default())
            .var("notes", meeting.notes.clone().unwrap_or_default())
            .attach(EmailAttachment {
                filename: "review_meeting.ics".to_string(),
                content_type: "text/calendar; charset=utf-8".to_string(),
                data: ics.into_bytes(),
            });
        self.send(&client.email, &subject, template, ctx).await
    }
}

fn task_context(task: &task_request::Model, client: &user::Model) -> EmailContext {
    EmailContext::new()
        .var("name", client.name.clone())
        .var("task_id", task.id.to_string())
        .var("task_title", task.title.clone())
}

/// Render the plain-text and HTML bodies of a template.
fn render_template(template: EmailTemplate, ctx: &EmailContext) -> (String, String) {
    match template {
        EmailTemplate::QuoteCreated => {
            let text = format!(
                "Hi {},\n\nWe have prepared a quote of {} for your task \"{}\" (#{}).\n\n{}\n\nReview it here: {}",
                ctx.get("name"),
                ctx.get("price"),
                ctx.get("task_title"),
                ctx.get("task_id"),
                ctx.get("message"),
                ctx.get("task_link"),
            );
            let html = wrap_html(&format!(
                "<p>Hi {},</p>\
                <p>We have prepared a quote of <strong>{}</strong> for your task <em>{}</em> (#{}).</p>\
                <blockquote>{}</blockquote>\
                <p><a href=\"{}\">Review the quote</a></p>",
                ctx.html("name"),
                ctx.html("price"),
                ctx.html("task_title"),
                ctx.html("task_id"),
                ctx.html("message"),
                ctx.html("task_link"),
            ));
            (text, html)
        }

        EmailTemplate::InvoiceCreated => {
            let text = format!(
                "Hi {},\n\nInvoice #{} for {} has been issued for task \"{}\" (#{}).\n\nPay online: {}\nTask: {}",
                ctx.get("name"),
                ctx.get("invoice_id"),
                ctx.get("amount"),
                ctx.get("task_title"),
                ctx.get("task_id"),
                ctx.get("pay_url"),
                ctx.get("task_link"),
            );
            let html = wrap_html(&format!(
                "<p>Hi {},</p>\
                <p>Invoice #{} for <strong>{}</strong> has been issued for task <em>{}</em> (#{}).</p>\
                <p><a href=\"{}\" style=\"display:inline-block;padding:12px 24px;background:#007bff;color:#fff;text-decoration:none;border-radius:4px;\">Pay now</a></p>\
                <p><a href=\"{}\">View task</a></p>",
                ctx.html("name"),
                ctx.html("invoice_id"),
                ctx.html("amount"),
                ctx.html("task_title"),
                ctx.html("task_id"),
                ctx.html("pay_url"),
                ctx.html("task_link"),
            ));
            (text, html)
        }

        EmailTemplate::PaymentReceived => {
            let text = format!(
                "Hi {},\n\nWe received your payment of {} for invoice #{} (task #{}) on {}.\n\nThank you!\n{}",
                ctx.get("name"),
                ctx.get("amount"),
                ctx.get("invoice_id"),
                ctx.get("task_id"),
                ctx.get("paid_at"),
                ctx.get("task_link"),
            );
            let logo = if ctx.get("logo_cid").is_empty() {
                String::new()
            } else {
                format!("<p><img src=\"cid:{}\" alt=\"TaskDesk\" height=\"40\"></p>", ctx.html("logo_cid"))
            };
            let html = wrap_html(&format!(
                "{logo}<p>Hi {},</p>\
                <p>We received your payment of <strong>{}</strong> for invoice #{} (task #{}) on {}.</p>\
                <p>Thank you!</p>\
                <p><a href=\"{}\">View task</a></p>",
                ctx.html("name"),
                ctx.html("amount"),
                ctx.html("invoice_id"),
                ctx.html("task_id"),
                ctx.html("paid_at"),
                ctx.html("task_link"),
            ));
            (text, html)
        }

        EmailTemplate::AssignmentInvite => {
            let deadline = if ctx.get("expires_at").is_empty() {
                String::new()
            } else {
                format!("Please respond before {}.", ctx.get("expires_at"))
            };
            let text = format!(
                "Hi {},\n\nYou have been assigned task \"{}\" (#{}). {}\n\nAccept or decline: {}",
                ctx.get("name"),
                ctx.get("task_title"),
                ctx.get("task_id"),
                deadline,
                ctx.get("respond_link"),
            );
            let html = wrap_html(&format!(
                "<p>Hi {},</p>\
                <p>You have been assigned task <em>{}</em> (#{}). {}</p>\
                <p><a href=\"{}\">Accept or decline</a></p>",
                ctx.html("name"),
                ctx.html("task_title"),
                ctx.html("task_id"),
                escape_html(&deadline),
                ctx.html("respond_link"),
            ));
            (text, html)
        }

        EmailTemplate::AssignmentResponse => {
            let text = format!(
                "Hi {},\n\n{} {} the assignment for task \"{}\" (#{}).\n\n{}",
                ctx.get("name"),
                ctx.get("freelancer"),
                ctx.get("verb"),
                ctx.get("task_title"),
                ctx.get("task_id"),
                ctx.get("task_link"),
            );
            let html = wrap_html(&format!(
                "<p>Hi {},</p>\
                <p><strong>{}</strong> {} the assignment for task <em>{}</em> (#{}).</p>\
                <p><a href=\"{}\">Open task</a></p>",
                ctx.html("name"),
                ctx.html("freelancer"),
                ctx.html("verb"),
                ctx.html("task_title"),
                ctx.html("task_id"),
                ctx.html("task_link"),
            ));
            (text, html)
        }

        EmailTemplate::WorkSubmitted => {
            let text = format!(
                "Hi {},\n\n{} submitted work ({} file(s)) for task \"{}\" (#{}).\n\n{}",
                ctx.get("name"),
                ctx.get("freelancer"),
                ctx.get("file_count"),
                ctx.get("task_title"),
                ctx.get("task_id"),
                ctx.get("task_link"),
            );
            let html = wrap_html(&format!(
                "<p>Hi {},</p>\
                <p><strong>{}</strong> submitted work ({} file(s)) for task <em>{}</em> (#{}).</p>\
                <p><a href=\"{}\">Review submission</a></p>",
                ctx.html("name"),
                ctx.html("freelancer"),
                ctx.html("file_count"),
                ctx.html("task_title"),
                ctx.html("task_id"),
                ctx.html("task_link"),
            ));
            (text, html)
        }

        EmailTemplate::MeetingScheduled
        | EmailTemplate::MeetingRescheduled
        | EmailTemplate::MeetingCanceled
        | EmailTemplate::MeetingCompleted => {
            let headline = match template {
                EmailTemplate::MeetingScheduled => "A review meeting has been scheduled",
                EmailTemplate::MeetingRescheduled => "Your review meeting has been moved",
                EmailTemplate::MeetingCanceled => "Your review meeting has been canceled",
                _ => "Your review meeting is complete",
            };
            let location = if ctx.get("join_url").is_empty() {
                "Online"
            } else {
                ctx.get("join_url")
            };
            let text = format!(
                "Hi {},\n\n{} for task \"{}\" (#{}).\n\nWhen: {} ({} minutes)\nWhere: {}\n\n{}\n\nThe calendar invite is attached.",
                ctx.get("name"),
                headline,
                ctx.get("task_title"),
                ctx.get("task_id"),
                ctx.get("when"),
                ctx.get("duration"),
                location,
                ctx.get("notes"),
            );
            let html = wrap_html(&format!(
                "<p>Hi {},</p>\
                <p>{} for task <em>{}</em> (#{}).</p>\
                <p><strong>When:</strong> {} ({} minutes)<br><strong>Where:</strong> {}</p>\
                <blockquote>{}</blockquote>\
                <p>The calendar invite is attached.</p>",
                ctx.html("name"),
                headline,
                ctx.html("task_title"),
                ctx.html("task_id"),
                ctx.html("when"),
                ctx.html("duration"),
                escape_html(location),
                ctx.html("notes"),
            ));
            (text, html)
        }
    }
}

/// Wrap HTML content in a basic email layout.
fn wrap_html(content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px; }}
        a {{ color: #007bff; }}
        blockquote {{ margin: 10px 0; padding: 10px 20px; border-left: 4px solid #e9ecef; background: #f8f9fa; }}
    </style>
</head>
<body>
    {content}
    <hr style="margin-top: 40px; border: none; border-top: 1px solid #e9ecef;">
    <p style="font-size: 12px; color: #6c757d;">TaskDesk</p>
</body>
</html>"#
    )
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// `1,234.50 UGX`
#[must_use]
pub fn format_money(amount: f64, currency: &str) -> String {
    let cents = (amount * 100.0).round() as i64;
    let whole = cents / 100;
    let frac = (cents % 100).abs();

    let digits = whole.abs().to_string();
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let sign = if cents < 0 { "-" } else { "" };
    format!("{sign}{grouped}.{frac:02} {currency}")
}
