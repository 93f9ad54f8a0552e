//! Per-connection read and write loops.
//!
//! The read loop only consumes inbound frames and hands them to the chat
//! layer; the write loop only drains the connection's private queue and
//! emits heartbeat pings. Neither holds any shared lock while blocked.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::config::Config;
use crate::conn::connection::Connection;
use crate::conn::registry::{ConnectionEvents, ConnectionRegistry};
use crate::ws::transport::{Frame, TransportReader, TransportWriter};

pub(crate) fn spawn_connection(
    conn: Arc<Connection>,
    reader: Box<dyn TransportReader>,
    writer: Box<dyn TransportWriter>,
    outbound_rx: mpsc::Receiver<Frame>,
    registry: Arc<ConnectionRegistry>,
    events: Arc<dyn ConnectionEvents>,
    config: Arc<Config>,
) {
    tokio::spawn(write_loop(conn.clone(), writer, outbound_rx, config.clone()));
    tokio::spawn(read_loop(conn, reader, registry, events, config));
}

/// Drains the outbound queue and emits heartbeat pings. Every write is
/// bounded by the write deadline; a stalled transport is abandoned, never
/// waited on indefinitely.
async fn write_loop(
    conn: Arc<Connection>,
    mut writer: Box<dyn TransportWriter>,
    mut outbound_rx: mpsc::Receiver<Frame>,
    config: Arc<Config>,
) {
    let write_timeout = config.write_timeout();
    let mut heartbeat = interval(config.heartbeat_interval());
    // Skip the immediate first tick.
    heartbeat.tick().await;

    loop {
        tokio::select! {
            maybe = outbound_rx.recv() => match maybe {
                Some(frame) => {
                    match timeout(write_timeout, writer.send_frame(frame)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            tracing::debug!(conn_id = %conn.id(), error = %e, "write failed");
                            break;
                        }
                        Err(_) => {
                            tracing::warn!(conn_id = %conn.id(), "write deadline exceeded");
                            break;
                        }
                    }
                }
                None => {
                    let _ = timeout(write_timeout, writer.send_frame(Frame::Close)).await;
                    break;
                }
            },
            _ = heartbeat.tick() => {
                conn.health().record_ping();
                match timeout(write_timeout, writer.send_frame(Frame::Ping(Vec::new()))).await {
                    Ok(Ok(())) => {
                        tracing::trace!(conn_id = %conn.id(), "heartbeat ping sent");
                    }
                    _ => {
                        tracing::debug!(conn_id = %conn.id(), "heartbeat write failed");
                        break;
                    }
                }
            }
            _ = conn.cancel_token().cancelled() => {
                let _ = timeout(write_timeout, writer.send_frame(Frame::Close)).await;
                break;
            }
        }
    }

    let _ = timeout(write_timeout, writer.close()).await;
    conn.cancel_token().cancel();
}

/// Consumes inbound frames until error, close, idle timeout, or
/// cancellation, then funnels teardown into the registry's unregister path.
/// The idle deadline re-arms on every frame, pongs included.
async fn read_loop(
    conn: Arc<Connection>,
    mut reader: Box<dyn TransportReader>,
    registry: Arc<ConnectionRegistry>,
    events: Arc<dyn ConnectionEvents>,
    config: Arc<Config>,
) {
    let read_timeout = config.read_timeout();

    loop {
        let next = tokio::select! {
            _ = conn.cancel_token().cancelled() => break,
            res = timeout(read_timeout, reader.next_frame()) => res,
        };

        match next {
            Err(_) => {
                tracing::debug!(conn_id = %conn.id(), "idle read deadline exceeded");
                break;
            }
            Ok(Err(e)) => {
                tracing::debug!(conn_id = %conn.id(), error = %e, "read failed");
                break;
            }
            Ok(Ok(None)) | Ok(Ok(Some(Frame::Close))) => {
                tracing::debug!(conn_id = %conn.id(), "peer closed");
                break;
            }
            Ok(Ok(Some(Frame::Text(text)))) => {
                conn.health().record_activity();
                events.on_message(&conn, text).await;
            }
            Ok(Ok(Some(Frame::Pong(_)))) => {
                conn.health().record_pong();
            }
            Ok(Ok(Some(Frame::Ping(data)))) => {
                let _ = conn.enqueue(Frame::Pong(data));
            }
        }
    }

    conn.cancel_token().cancel();
    registry.unregister(conn.id()).await;
}
