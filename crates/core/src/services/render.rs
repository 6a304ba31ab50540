//! Email rendering.
//!
//! Pure functions from domain rows to subject, text and HTML bodies. Nothing
//! here touches storage or the network.

use chrono::Utc;
use mediate_common::SignedUrl;
use mediate_db::entities::{email_tracking::EmailType, mediation_notice, poll, poll_option};

use super::email::Mailbox;

/// Subject and bodies of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    /// Subject line
    pub subject: String,
    /// Plain text body
    pub text: String,
    /// HTML body
    pub html: String,
}

/// Inputs for a poll invitation.
#[derive(Debug)]
pub struct PollInvitation<'a> {
    /// Poll being voted on
    pub poll: &'a poll::Model,
    /// Options in position order
    pub options: &'a [poll_option::Model],
    /// Recipient; `email` must be normalized
    pub recipient: &'a Mailbox,
    /// Voting token issued for this recipient
    pub token: &'a str,
    /// Public base URL of the deployment
    pub base_url: &'a str,
}

/// Inputs for a mediation notice.
#[derive(Debug)]
pub struct NoticeEmail<'a> {
    /// Notice being sent
    pub notice: &'a mediation_notice::Model,
    /// Recipient; `email` must be normalized
    pub recipient: &'a Mailbox,
    /// Download link of the attached document
    pub attachment: Option<&'a SignedUrl>,
    /// Public base URL of the deployment
    pub base_url: &'a str,
}

/// Escape HTML special characters.
#[must_use]
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// URL of the open-tracking pixel for one recipient.
#[must_use]
pub fn tracking_pixel_url(
    base_url: &str,
    email_type: EmailType,
    subject_id: &str,
    email: &str,
    token: Option<&str>,
) -> String {
    let mut url = format!(
        "{}/api/track/open?type={}&id={}&email={}",
        base_url.trim_end_matches('/'),
        email_type.as_str(),
        urlencoding::encode(subject_id),
        urlencoding::encode(email),
    );
    if let Some(token) = token {
        url.push_str("&token=");
        url.push_str(&urlencoding::encode(token));
    }
    url
}

/// Endpoint the vote form posts to.
#[must_use]
pub fn vote_form_url(base_url: &str) -> String {
    format!("{}/api/polls/vote", base_url.trim_end_matches('/'))
}

fn option_label(option: &poll_option::Model) -> String {
    let starts = option.starts_at.with_timezone(&Utc);
    let when = match option.ends_at {
        Some(ends) => format!(
            "{} - {} UTC",
            starts.format("%a %Y-%m-%d %H:%M"),
            ends.with_timezone(&Utc).format("%H:%M")
        ),
        None => format!("{} UTC", starts.format("%a %Y-%m-%d %H:%M")),
    };
    match &option.label {
        Some(label) if !label.trim().is_empty() => format!("{label} ({when})"),
        _ => when,
    }
}

fn greeting(recipient: &Mailbox) -> String {
    recipient
        .name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or("there")
        .to_string()
}

/// Render a poll invitation with an inline vote form.
#[must_use]
pub fn poll_invitation(invitation: &PollInvitation<'_>) -> RenderedEmail {
    let PollInvitation {
        poll,
        options,
        recipient,
        token,
        base_url,
    } = *invitation;

    let subject = format!("{} invites you to vote: {}", poll.organizer_name, poll.title);
    let name = greeting(recipient);

    let mut text = format!(
        "Hi {name},\n\n{} asked you to pick the times that work for you for \"{}\".\n",
        poll.organizer_name, poll.title
    );
    if let Some(description) = &poll.description {
        text.push('\n');
        text.push_str(description);
        text.push('\n');
    }
    text.push_str("\nProposed times:\n");
    for option in options {
        text.push_str(&format!("  - {}\n", option_label(option)));
    }
    text.push_str("\nOpen this email in an HTML-capable client to vote.\n");

    let mut rows = String::new();
    for option in options {
        let field = html_escape(&format!("vote_{}", option.id));
        rows.push_str(&format!(
            "<tr><td>{}</td>\
             <td><label><input type=\"radio\" name=\"{field}\" value=\"yes\"> Yes</label></td>\
             <td><label><input type=\"radio\" name=\"{field}\" value=\"if_need_be\"> If need be</label></td>\
             <td><label><input type=\"radio\" name=\"{field}\" value=\"no\"> No</label></td></tr>",
            html_escape(&option_label(option)),
        ));
    }

    let description = poll
        .description
        .as_deref()
        .map(|d| format!("<p>{}</p>", html_escape(d)))
        .unwrap_or_default();

    let content = format!(
        "<p>Hi {},</p>\
         <p><strong>{}</strong> asked you to pick the times that work for you for <strong>{}</strong>.</p>\
         {description}\
         <form method=\"post\" action=\"{}\">\
         <input type=\"hidden\" name=\"pollId\" value=\"{}\">\
         <input type=\"hidden\" name=\"email\" value=\"{}\">\
         <input type=\"hidden\" name=\"token\" value=\"{}\">\
         <input type=\"hidden\" name=\"source\" value=\"email\">\
         <table>{rows}</table>\
         <p><button type=\"submit\">Submit my availability</button></p>\
         </form>",
        html_escape(&name),
        html_escape(&poll.organizer_name),
        html_escape(&poll.title),
        html_escape(&vote_form_url(base_url)),
        html_escape(&poll.id),
        html_escape(&recipient.email),
        html_escape(token),
    );

    let pixel = tracking_pixel_url(
        base_url,
        EmailType::PollInvitation,
        &poll.id,
        &recipient.email,
        Some(token),
    );

    RenderedEmail {
        subject,
        text,
        html: wrap_html(&content, &pixel),
    }
}

/// Render a mediation notice, linking the attachment if there is one.
#[must_use]
pub fn mediation_notice(email: &NoticeEmail<'_>) -> RenderedEmail {
    let NoticeEmail {
        notice,
        recipient,
        attachment,
        base_url,
    } = *email;

    let name = greeting(recipient);
    let mut text = format!("Hi {name},\n\n{}\n", notice.body);
    let mut content = format!(
        "<p>Hi {},</p><p>{}</p>",
        html_escape(&name),
        html_escape(&notice.body).replace('\n', "<br>")
    );

    if let Some(link) = attachment {
        let expires = link.expires_at.format("%Y-%m-%d %H:%M UTC");
        text.push_str(&format!(
            "\nDownload the document: {}\n(link valid until {expires})\n",
            link.url
        ));
        content.push_str(&format!(
            "<p><a href=\"{}\">Download the document</a><br><small>Link valid until {expires}.</small></p>",
            html_escape(&link.url)
        ));
    }

    let pixel = tracking_pixel_url(
        base_url,
        EmailType::MediationNotice,
        &notice.id,
        &recipient.email,
        None,
    );

    RenderedEmail {
        subject: notice.subject.clone(),
        text,
        html: wrap_html(&content, &pixel),
    }
}

/// Wrap HTML content in a basic email template with the tracking pixel.
fn wrap_html(content: &str, pixel_url: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px; }}
        td {{ padding: 4px 8px; }}
    </style>
</head>
<body>
    {}
    <img src="{}" width="1" height="1" alt="" style="display:block;border:0;">
</body>
</html>"#,
        content,
        html_escape(pixel_url)
    )
}
