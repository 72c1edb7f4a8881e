//! Per-connection read loop and keepalive.
//!
//! Each accepted socket gets exactly one read loop (this module) and one
//! keepalive task. Validation and the in-use marker are settled inline
//! before the next frame is read; publishing happens in a detached subtask
//! so a slow bus never stalls the reader.

use std::fmt::Display;
use std::sync::Arc;

use axum::extract::ws::{close_code, Message};
use futures_util::{Sink, Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::envelope::{Reply, UpdateEnvelope};
use super::validate::{check, Verdict};
use super::writer::ConnectionWriter;
use crate::bus::DeliveryEvent;
use crate::codes::unix_now;
use crate::AppState;

/// Abnormal closure. Never sent on the wire, but some clients report it.
const CLOSE_ABNORMAL: u16 = 1006;

/// What the read loop did with one envelope.
#[derive(Debug)]
pub enum Disposition {
    /// Answered immediately
    Replied(Reply),
    /// Accepted and handed to a publishing subtask
    Relaying(JoinHandle<()>),
}

/// Drive one upgraded connection until it closes, errors, goes quiet past
/// the read deadline, or the process shuts down.
pub async fn serve_connection<R, E, W>(
    state: Arc<AppState>,
    mut reader: R,
    sink: W,
    connection_id: String,
) where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
    W: Sink<Message> + Unpin + Send + 'static,
    W::Error: Display,
{
    let relay = &state.config.relay;
    let pong_wait = relay.pong_wait();
    let writer = Arc::new(ConnectionWriter::new(sink, relay.write_wait()));
    let cancel = state.shutdown.child_token();

    let keepalive = spawn_keepalive(
        Arc::clone(&writer),
        relay.ping_period(),
        cancel.clone(),
        connection_id.clone(),
    );

    debug!(connection = %connection_id, "Connection opened");
    let mut deadline = Instant::now() + pong_wait;

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(connection = %connection_id, "Connection cancelled by shutdown");
                break;
            }
            next = tokio::time::timeout_at(deadline, reader.next()) => next,
        };

        let message = match next {
            Err(_) => {
                info!(connection = %connection_id, "Read deadline exceeded, closing connection");
                break;
            }
            Ok(None) => {
                debug!(connection = %connection_id, "Connection stream ended");
                break;
            }
            Ok(Some(Err(e))) => {
                warn!(connection = %connection_id, error = %e, "Failed to read frame");
                break;
            }
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Text(text) => handle_frame(&state, &writer, &text, &connection_id).await,
            Message::Binary(bytes) => {
                debug!(connection = %connection_id, len = bytes.len(), "Ignoring binary frame");
            }
            Message::Pong(_) => deadline = Instant::now() + pong_wait,
            // the websocket layer answers pings on its own
            Message::Ping(_) => {}
            Message::Close(frame) => {
                match frame.map(|f| f.code) {
                    None
                    | Some(close_code::NORMAL)
                    | Some(close_code::AWAY)
                    | Some(CLOSE_ABNORMAL) => {
                        debug!(connection = %connection_id, "Connection closed by peer");
                    }
                    Some(code) => {
                        warn!(connection = %connection_id, close_code = code, "Unexpected close code");
                    }
                }
                break;
            }
        }
    }

    cancel.cancel();
    if let Err(e) = keepalive.await {
        error!(connection = %connection_id, error = %e, "Keepalive task failed");
    }
    if let Err(e) = writer.close().await {
        debug!(connection = %connection_id, error = %e, "Close frame not sent");
    }
    debug!(connection = %connection_id, "Connection closed");
}

fn spawn_keepalive<W>(
    writer: Arc<ConnectionWriter<W>>,
    period: std::time::Duration,
    cancel: CancellationToken,
    connection_id: String,
) -> JoinHandle<()>
where
    W: Sink<Message> + Unpin + Send + 'static,
    W::Error: Display,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    // the read deadline takes care of dead peers
                    if let Err(e) = writer.ping().await {
                        warn!(connection = %connection_id, error = %e, "Failed to send ping");
                    }
                }
            }
        }
    })
}

async fn handle_frame<W>(
    state: &Arc<AppState>,
    writer: &Arc<ConnectionWriter<W>>,
    text: &str,
    connection_id: &str,
) where
    W: Sink<Message> + Unpin + Send + 'static,
    W::Error: Display,
{
    let envelope: UpdateEnvelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(connection = %connection_id, error = %e, "Dropping malformed frame");
            return;
        }
    };

    if let Disposition::Replied(reply) =
        process_envelope(state, writer, envelope, unix_now()).await
    {
        if let Err(e) = writer.reply(reply).await {
            warn!(connection = %connection_id, reply = %reply, error = %e, "Failed to send reply");
        }
    }
}

/// Validate one envelope and either answer it or start relaying it.
///
/// The returned [`Disposition::Replied`] reply has not been written yet;
/// the `"relay"` acknowledgment is written by the publishing subtask.
pub async fn process_envelope<W>(
    state: &Arc<AppState>,
    writer: &Arc<ConnectionWriter<W>>,
    envelope: UpdateEnvelope,
    now: i64,
) -> Disposition
where
    W: Sink<Message> + Unpin + Send + 'static,
    W::Error: Display,
{
    if envelope.is_ping() {
        return Disposition::Replied(Reply::Pong);
    }

    let code = match check(state.store.as_ref(), &envelope.code).await {
        Ok(Verdict::Accepted(code)) => code,
        Ok(Verdict::Superseded { current, presented }) => {
            info!(
                code = %presented.code,
                current = %current.code,
                "Rejecting update for superseded access code"
            );
            return Disposition::Replied(Reply::Expired);
        }
        Ok(Verdict::Unknown) => {
            debug!(code = %envelope.code, "Rejecting update for unknown access code");
            return Disposition::Replied(Reply::Invalid);
        }
        Err(e) => {
            error!(code = %envelope.code, error = %e, "Failed to validate access code");
            return Disposition::Replied(Reply::Invalid);
        }
    };

    let first_use = code.is_unused();
    if let Err(e) = state.store.mark_used(&code.code, now).await {
        error!(code = %code.code, error = %e, "Failed to mark access code as used");
    }

    let bus = Arc::clone(&state.bus);
    let writer = Arc::clone(writer);
    Disposition::Relaying(tokio::spawn(async move {
        if first_use {
            if let Err(e) = bus.publish(&DeliveryEvent::hide_code()).await {
                error!(code = %code.code, error = %e, "Failed to publish hide-code event");
            }
        }

        let kind = envelope.kind.clone();
        match bus.publish(&DeliveryEvent::from_update(envelope)).await {
            Ok(()) => {
                if let Err(e) = writer.reply(Reply::Relay).await {
                    warn!(code = %code.code, error = %e, "Failed to acknowledge relay");
                }
            }
            Err(e) => error!(code = %code.code, kind = %kind, error = %e, "Failed to relay update"),
        }
    }))
}
