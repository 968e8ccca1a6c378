//! Receive loop (component R).
//!
//! One `tokio::spawn`ed task per connection, started by
//! [`crate::connection::Connection::connect_as_server`]. Decodes frames one
//! at a time, assembles fragmented messages, answers control frames inline,
//! and hands completed messages to the event queue and the event emitter.
//! Restructured from the teacher's `read.rs::poll_messages` (a hand-rolled
//! `Stream::poll_next`) into a plain `async fn` loop, per the design notes'
//! explicit call for that shape.

use crate::compression::Compressor;
use crate::config::CompressionMode;
use crate::connection::Shared;
use crate::error::Error;
use crate::frame::{decode_frame, Frame, OpCode};
use crate::message::{Message, MessageEvent};
use crate::payload::{build_close_payload, parse_close_payload, CloseCode};
use crate::state::ConnectionState;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf};

enum Flow {
    Continue,
    Stop,
}

/// Outcome of racing the next frame read against `shared.shutdown`, so a
/// local close against an unresponsive peer reclaims this task instead of
/// leaving it parked on a read that may never return.
enum Step {
    Frame(Result<Frame, Error>),
    Shutdown,
}

struct FragmentBuffer {
    opcode: OpCode,
    rsv1: bool,
    buffer: Vec<u8>,
}

pub(crate) async fn run<S>(mut read_half: ReadHalf<S>, shared: Arc<Shared<S>>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut decompressor = Compressor::new(shared.config.compression);
    let mut fragment: Option<FragmentBuffer> = None;
    let compression_negotiated = shared.config.compression != CompressionMode::None;

    loop {
        let step = tokio::select! {
            biased;
            _ = shared.shutdown.notified() => Step::Shutdown,
            result = decode_frame(
                &mut read_half,
                true,
                compression_negotiated,
                shared.config.max_frame_size,
            ) => Step::Frame(result),
        };

        let frame = match step {
            Step::Shutdown => break,
            Step::Frame(Ok(frame)) => frame,
            Step::Frame(Err(err)) => {
                handle_fatal_error(&shared, err).await;
                break;
            }
        };

        match dispatch(&shared, &mut fragment, &mut decompressor, frame).await {
            Ok(Flow::Continue) => continue,
            Ok(Flow::Stop) => break,
            Err(err) => {
                handle_fatal_error(&shared, err).await;
                break;
            }
        }
    }

    shared.exit_receiving.notify_waiters();
}

async fn dispatch<S>(
    shared: &Arc<Shared<S>>,
    fragment: &mut Option<FragmentBuffer>,
    decompressor: &mut Compressor,
    frame: Frame,
) -> Result<Flow, Error>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    match frame.opcode {
        OpCode::Ping => {
            let mut writer = shared.writer.lock().await;
            let _ = writer.send_control(OpCode::Pong, frame.payload).await;
            Ok(Flow::Continue)
        }

        OpCode::Pong => {
            shared.receive_pong.notify_waiters();
            Ok(Flow::Continue)
        }

        OpCode::Close => {
            handle_close(shared, frame).await?;
            Ok(Flow::Stop)
        }

        OpCode::Text | OpCode::Binary => {
            if fragment.is_some() {
                return Err(Error::InterleavedDataFrame);
            }
            if frame.fin {
                finish_message(shared, decompressor, frame.opcode, frame.rsv1, frame.payload)
                    .await?;
            } else {
                *fragment = Some(FragmentBuffer {
                    opcode: frame.opcode,
                    rsv1: frame.rsv1,
                    buffer: frame.payload,
                });
            }
            Ok(Flow::Continue)
        }

        OpCode::Continuation => {
            let buf = fragment.as_mut().ok_or(Error::UnexpectedContinuation)?;
            buf.buffer.extend_from_slice(&frame.payload);
            if buf.buffer.len() > shared.config.max_message_size {
                return Err(Error::MaxMessageSizeExceeded(
                    buf.buffer.len(),
                    shared.config.max_message_size,
                ));
            }
            if frame.fin {
                let done = fragment.take().expect("checked above");
                finish_message(shared, decompressor, done.opcode, done.rsv1, done.buffer).await?;
            }
            Ok(Flow::Continue)
        }
    }
}

async fn finish_message<S>(
    shared: &Arc<Shared<S>>,
    decompressor: &mut Compressor,
    opcode: OpCode,
    rsv1: bool,
    payload: Vec<u8>,
) -> Result<(), Error>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let bytes = if rsv1 {
        decompressor.decompress(&payload)?
    } else {
        payload
    };

    if bytes.len() > shared.config.max_message_size {
        return Err(Error::MaxMessageSizeExceeded(
            bytes.len(),
            shared.config.max_message_size,
        ));
    }

    let message = match opcode {
        OpCode::Text => Message::Text(String::from_utf8(bytes)?),
        OpCode::Binary => Message::Binary(bytes),
        _ => unreachable!("finish_message only called for Text/Binary"),
    };

    let event = MessageEvent::new(message);
    if let Err(cap) = shared.queue.enqueue(event.clone()) {
        return Err(Error::QueueFull(cap));
    }
    shared.emitter.emit_message(event).await
}

/// Handles an inbound Close frame. If this connection hasn't already
/// initiated its own close, this is the peer's opening move: reply in
/// kind (unless the received code is one of the three RFC-reserved codes,
/// which must never be echoed back) and finish closing. If the connection
/// was already `CloseSent`, this frame *is* the peer's reply to our own
/// close — no further frame goes out.
async fn handle_close<S>(shared: &Arc<Shared<S>>, frame: Frame) -> Result<(), Error>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (code, reason) = parse_close_payload(&frame.payload)?
        .unwrap_or((CloseCode::NO_STATUS_RECEIVED, String::new()));

    let mut writer = shared.writer.lock().await; // send_lock
    let should_reply = {
        let mut guard = shared.state.lock().await; // conn_lock, nested per lock order
        let was_open = guard.value == ConnectionState::Open;
        // Mirrors Connection::close_with: Open moves through CloseSent on
        // its way to Closed, per the state table, even though the reply
        // (if any) and the final transition happen in the same handler.
        if was_open {
            guard.value = ConnectionState::CloseSent;
        }
        was_open && !code.is_reserved()
    };

    if should_reply {
        let echo_code = if code.is_reserved() {
            CloseCode::NORMAL
        } else {
            code
        };
        if let Ok(payload) = build_close_payload(echo_code, "") {
            let _ = writer.send_control(OpCode::Close, payload).await;
        }
    }
    drop(writer);

    let hook = {
        let mut guard = shared.state.lock().await;
        guard.value = ConnectionState::Closed;
        guard.close_hook.take()
    };
    if let Some(hook) = hook {
        hook();
    }

    shared.emitter.emit_close(true, code, reason).await
}

/// A protocol or I/O error ends the connection unilaterally: best-effort
/// send a Close frame carrying the error's mapped status code (never for
/// Usage errors, which `Error::close_code` reports as `None` and which
/// shouldn't reach this function in the first place since they're not
/// raised by the wire-facing path), transition to `Closed`, and report
/// both `OnError` and `OnClose` with `was_clean = false`.
async fn handle_fatal_error<S>(shared: &Arc<Shared<S>>, err: Error)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    log::warn!("closing connection after receive error: {err}");
    shared.emitter.emit_error(err.to_string()).await;
    let code = err.close_code().unwrap_or(CloseCode::ABNORMAL);

    {
        let mut writer = shared.writer.lock().await;
        if !code.is_reserved() {
            if let Ok(payload) = build_close_payload(code, "") {
                let _ = writer.send_control(OpCode::Close, payload).await;
            }
        }
    }

    let hook = {
        let mut guard = shared.state.lock().await;
        guard.value = ConnectionState::Closed;
        guard.close_hook.take()
    };
    if let Some(hook) = hook {
        hook();
    }

    // Terminal handler — a panic here was already reported through
    // on_error by the emitter; there is nowhere further to escalate to.
    let _ = shared.emitter.emit_close(false, code, String::new()).await;
}
