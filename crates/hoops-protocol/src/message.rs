//! Outbound message formats and well-known defaults.

use hoops_core::ConnectionId;

/// Port the relay listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 5634;

/// Query parameter carrying the optional screen label.
pub const SCREEN_ID_PARAM: &str = "screenid";

/// Payload sent by `hoops notify` when no message is given.
pub const DEFAULT_NOTIFY_MESSAGE: &str = "players updated";

const GREETING_PREFIX: &str = "client ";
const GREETING_SUFFIX: &str = " connected!";

/// Builds the one-time greeting sent to a freshly registered connection.
pub fn greeting(id: &ConnectionId) -> String {
    format!("{GREETING_PREFIX}{}{GREETING_SUFFIX}", id.short())
}

/// Extracts the id prefix from a greeting.
///
/// Returns `None` if `text` is not a greeting.
pub fn parse_greeting(text: &str) -> Option<&str> {
    text.strip_prefix(GREETING_PREFIX)?
        .strip_suffix(GREETING_SUFFIX)
        .filter(|prefix| !prefix.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greeting_contains_short_id() {
        let id = ConnectionId::generate();
        let text = greeting(&id);
        assert_eq!(text, format!("client {} connected!", id.short()));
    }

    #[test]
    fn test_parse_greeting() {
        let id = ConnectionId::generate();
        let text = greeting(&id);
        assert_eq!(parse_greeting(&text), Some(id.short().as_str()));
    }

    #[test]
    fn test_parse_non_greeting() {
        assert_eq!(parse_greeting("ping"), None);
        assert_eq!(parse_greeting("client  connected!"), None);
    }
}
