use std::fmt::Display;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message};
use futures_util::{Sink, SinkExt};
use thiserror::Error;
use tokio::sync::Mutex;

use super::envelope::Reply;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Write timed out after {0:?}")]
    Timeout(Duration),
    #[error("Failed to write frame: {0}")]
    Sink(String),
}

/// The only path to a connection's outbound half.
///
/// Pings, replies and the closing frame all take the same lock, and the
/// whole lock-and-send is bounded by `write_wait`.
pub struct ConnectionWriter<S> {
    sink: Mutex<S>,
    write_wait: Duration,
}

impl<S> ConnectionWriter<S>
where
    S: Sink<Message> + Unpin + Send,
    S::Error: Display,
{
    pub fn new(sink: S, write_wait: Duration) -> Self {
        Self {
            sink: Mutex::new(sink),
            write_wait,
        }
    }

    pub async fn send(&self, message: Message) -> Result<(), WriteError> {
        let write = async {
            let mut sink = self.sink.lock().await;
            sink.send(message).await
        };

        match tokio::time::timeout(self.write_wait, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(WriteError::Sink(e.to_string())),
            Err(_) => Err(WriteError::Timeout(self.write_wait)),
        }
    }

    pub async fn reply(&self, reply: Reply) -> Result<(), WriteError> {
        self.send(Message::Text(reply.as_str().to_string())).await
    }

    pub async fn ping(&self) -> Result<(), WriteError> {
        self.send(Message::Ping(Vec::new())).await
    }

    /// Send a normal-closure frame.
    pub async fn close(&self) -> Result<(), WriteError> {
        self.send(Message::Close(Some(CloseFrame {
            code: close_code::NORMAL,
            reason: "".into(),
        })))
        .await
    }
}
