//! Parsing of the WebSocket upgrade request.

use hoops_core::ScreenId;
use percent_encoding::percent_decode_str;

use crate::message::SCREEN_ID_PARAM;

/// Extracts the `screenid` label from a request URI query string.
///
/// The first occurrence wins. `+` decodes to a space and percent escapes are
/// decoded lossily. An empty value counts as absent.
pub fn screen_id_from_query(query: Option<&str>) -> Option<ScreenId> {
    query?
        .split('&')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (key == SCREEN_ID_PARAM).then_some(value)
        })
        .map(|value| {
            let spaced = value.replace('+', " ");
            percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
        })
        .find(|value| !value.is_empty())
        .map(ScreenId::new)
}
