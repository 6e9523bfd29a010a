//! One-shot notifier.
//!
//! Used after a player is created, edited or deleted: connect, send a single
//! message, wait until the relay echoes it back (which means the broadcast
//! reached us and therefore every peer registered before us), then close.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use crate::client::read_greeting;
use crate::error::{ClientError, Result};

/// Outcome of a successful [`notify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyReceipt {
    /// Short id the relay assigned to the notifying connection
    pub prefix: String,

    /// Frames from other senders seen while waiting for the echo
    pub interleaved: usize,
}

/// Sends `message` through the relay at `url` and waits for its echo.
///
/// # Errors
///
/// - `ClientError::Connect` if the relay is unreachable
/// - `ClientError::Timeout` if the whole exchange exceeds `wait`
/// - `ClientError::Closed` if the relay hangs up first
pub async fn notify(url: &str, message: &str, wait: Duration) -> Result<NotifyReceipt> {
    timeout(wait, exchange(url, message))
        .await
        .map_err(|_| ClientError::Timeout(wait))?
}

async fn exchange(url: &str, message: &str) -> Result<NotifyReceipt> {
    let (mut ws, _) = connect_async(url)
        .await
        .map_err(|e| ClientError::Connect {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let prefix = read_greeting(&mut ws).await?;
    debug!(prefix = %prefix, "Notifier connected");

    ws.send(Message::text(message.to_string())).await?;

    let mut interleaved = 0;
    loop {
        match ws.next().await {
            None | Some(Ok(Message::Close(_))) => return Err(ClientError::Closed),
            Some(Err(e)) => return Err(e.into()),
            Some(Ok(Message::Text(text))) if text.as_str() == message => break,
            Some(Ok(Message::Text(_))) => interleaved += 1,
            Some(Ok(_)) => {}
        }
    }

    // Echo seen; a failed close handshake no longer matters.
    let _ = ws.close(None).await;
    debug!(interleaved, "Notification delivered");

    Ok(NotifyReceipt {
        prefix,
        interleaved,
    })
}
