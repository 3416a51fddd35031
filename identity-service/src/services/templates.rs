//! Email bodies for the outbox events.

use crate::models::{EmailVerificationRequested, InviteCreated};
use crate::services::email::EmailMessage;

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn verification_link(public_url: &str, token: &str) -> String {
    format!("{}/verify-email?token={}", public_url, token)
}

pub fn invite_link(public_url: &str, token: &str) -> String {
    format!("{}/invite/accept?token={}", public_url, token)
}

pub fn verification_email(public_url: &str, event: &EmailVerificationRequested) -> EmailMessage {
    let link = verification_link(public_url, &event.token);
    let name = escape_html(&event.full_name);

    let html = format!(
        r#"<html>
  <body style="font-family: Arial, sans-serif;">
    <h2>Confirm your email address</h2>
    <p>Hi {name},</p>
    <p>Click the link below to verify your email. The link expires in 24 hours.</p>
    <p><a href="{link}">Verify email</a></p>
    <p>If you did not create an account, you can ignore this message.</p>
  </body>
</html>"#
    );

    let text = format!(
        "Hi {},\n\nVerify your email (link expires in 24 hours):\n{}\n\nIf you did not create an account, ignore this message.\n",
        event.full_name, link
    );

    EmailMessage {
        to: event.email.clone(),
        subject: "Verify your email address".to_string(),
        html,
        text: Some(text),
    }
}

pub fn invite_email(public_url: &str, event: &InviteCreated) -> EmailMessage {
    let link = invite_link(public_url, &event.token);
    let org = escape_html(&event.org_name);
    let role = escape_html(&event.role);
    let expires = event.expires_at.format("%Y-%m-%d %H:%M UTC");

    let note_html = event
        .message
        .as_deref()
        .map(|m| format!("<blockquote>{}</blockquote>", escape_html(m)))
        .unwrap_or_default();
    let note_text = event
        .message
        .as_deref()
        .map(|m| format!("\n\"{}\"\n", m))
        .unwrap_or_default();

    let html = format!(
        r#"<html>
  <body style="font-family: Arial, sans-serif;">
    <h2>You're invited to join {org}</h2>
    <p>You have been invited as <strong>{role}</strong>.</p>
    {note_html}
    <p><a href="{link}">Accept invitation</a></p>
    <p>This invitation expires on {expires}.</p>
  </body>
</html>"#
    );

    let text = format!(
        "You're invited to join {} as {}.\n{}\nAccept: {}\n\nThis invitation expires on {}.\n",
        event.org_name, event.role, note_text, link, expires
    );

    EmailMessage {
        to: event.email.clone(),
        subject: format!("Invitation to join {}", event.org_name),
        html,
        text: Some(text),
    }
}
