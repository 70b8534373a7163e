use crate::types::ChatMessage;

pub const DEFAULT_NOTES_NAME: &str = "Kindle-Notes";
pub const SUBJECT_PREFIX: &str = "Telegram → Kindle | ";

const FORBIDDEN_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !c.is_control() && !FORBIDDEN_CHARS.contains(c))
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        DEFAULT_NOTES_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Base name (no extension) for a converted notebook.
///
/// Any non-empty notebook title wins, even one that sanitizes to the default
/// name; without one the attachment name is used with a trailing
/// `.htm`/`.html` removed.
pub fn build_markdown_name(title: &str, attachment_name: &str) -> String {
    if !title.is_empty() {
        return sanitize_filename(title);
    }
    let stripped = strip_html_extension(attachment_name);
    if stripped.is_empty() {
        return DEFAULT_NOTES_NAME.to_string();
    }
    sanitize_filename(stripped)
}

pub fn markdown_filename(title: &str, attachment_name: &str) -> String {
    format!("{}.md", build_markdown_name(title, attachment_name))
}

fn strip_html_extension(name: &str) -> &str {
    let lower = name.to_ascii_lowercase();
    for ext in [".html", ".htm"] {
        if lower.ends_with(ext) {
            return &name[..name.len() - ext.len()];
        }
    }
    name
}

pub fn build_subject(message: &ChatMessage) -> String {
    let user = message.from.as_ref();
    let name = user
        .map(|u| {
            [u.first_name.as_deref(), u.last_name.as_deref()]
                .into_iter()
                .flatten()
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();
    let name = name.trim();

    let who = if !name.is_empty() {
        name.to_string()
    } else if let Some(username) = user
        .and_then(|u| u.username.as_deref())
        .filter(|u| !u.is_empty())
    {
        format!("@{username}")
    } else {
        format!("chat {}", message.chat.id)
    };
    format!("{SUBJECT_PREFIX}{who}")
}

pub fn notes_caption(title: &str) -> String {
    format!("Kindle notes: {title}")
}

pub fn notes_subject(title: &str) -> String {
    if title.is_empty() {
        "Kindle notes".to_string()
    } else {
        format!("{title} — Kindle notes")
    }
}

pub fn help_message() -> String {
    [
        "Send to Kindle via /send:",
        "/send <text to forward>",
        "You can also send a file (PDF/DOCX/EPUB/TXT/JPG/PNG) directly.",
        "",
        "Example:",
        "/send This is my note for Kindle.",
    ]
    .join("\n")
}
