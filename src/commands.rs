#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Send { text: String },
    Unknown { reason: Option<String> },
}

pub const MISSING_MESSAGE: &str = "missing-message";

pub fn parse_command(raw: &str) -> Command {
    let text = raw.trim();

    if text.starts_with("/start") {
        return Command::Start;
    }

    if let Some(rest) = text.strip_prefix("/send") {
        let payload = strip_mention(rest).trim();
        if payload.is_empty() {
            return Command::Unknown {
                reason: Some(MISSING_MESSAGE.to_string()),
            };
        }
        return Command::Send {
            text: payload.to_string(),
        };
    }

    Command::Unknown { reason: None }
}

/// Drops a leading `@BotName` (word characters only) from a command tail.
fn strip_mention(rest: &str) -> &str {
    let Some(after_at) = rest.strip_prefix('@') else {
        return rest;
    };
    let end = after_at
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
        .map(|(idx, _)| idx)
        .unwrap_or(after_at.len());
    if end == 0 {
        return rest;
    }
    &after_at[end..]
}
