// Copyright 2025 JsBind Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Newline-delimited JSON server over a byte stream (stdin/stdout in the CLI).
//!
//! Each input line is a `Request` envelope; each output line is either the
//! matching `Response` or a `BridgeEvent`. Requests are forwarded to the
//! bridge as they arrive and answered as they complete, so responses may
//! come back out of order; the `id` correlates them.
//!
//! Function references the peer passes in (any id it likes) are filed with a
//! forwarding callback. When JavaScript calls one, the server writes a
//! `functionInvoked` event and the call returns `null` without waiting for
//! the peer. Events raised while a request runs are written before that
//! request's response.
//!
//! Lines longer than the configured limit are discarded without being
//! buffered whole and answered with an `InvalidRequest` error carrying id 0.

use futures_util::stream::{FuturesUnordered, StreamExt};
use jsbind_common::transport::{JsonLineCodec, MAX_MESSAGE_SIZE};
use jsbind_common::{
    Argument, BridgeError, BridgeEvent, BridgeMessage, FunctionInvocation, Request, Response, Result,
};
use serde_json::Value as JsonValue;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::host::BridgeHandle;

pub struct StdioServer {
    bridge: BridgeHandle,
    max_line_length: usize,
}

impl StdioServer {
    pub fn new(bridge: BridgeHandle) -> Self {
        Self {
            bridge,
            max_line_length: MAX_MESSAGE_SIZE,
        }
    }

    /// Caps the length of one request line, newline excluded.
    pub fn with_max_line_length(mut self, max_line_length: usize) -> Self {
        self.max_line_length = max_line_length;
        self
    }

    pub fn bridge(&self) -> &BridgeHandle {
        &self.bridge
    }

    /// Serves requests from `reader` until it reaches end of input and every
    /// in-flight request has been answered.
    ///
    /// A line that does not decode is answered with an error response
    /// carrying id 0.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = Vec::new();
        let mut overflowed = false;
        let (events_tx, mut events) = mpsc::unbounded_channel::<FunctionInvocation>();
        let mut in_flight = FuturesUnordered::new();
        let mut reading = true;

        loop {
            if !reading && in_flight.is_empty() {
                break;
            }

            tokio::select! {
                frame = read_frame(&mut reader, &mut line, &mut overflowed, self.max_line_length), if reading => {
                    match frame? {
                        Frame::Line => {
                            let request = std::mem::take(&mut line);
                            if !request.trim_ascii().is_empty() {
                                match JsonLineCodec::decode_request(&request) {
                                    Ok(request) => {
                                        self.prepare(&request.message, &events_tx);
                                        in_flight.push(self.handle(request));
                                    }
                                    Err(e) => {
                                        tracing::warn!("Discarding malformed request line: {}", e);
                                        write_error(&mut writer, &e).await?;
                                    }
                                }
                            }
                        }
                        Frame::TooLong => {
                            tracing::warn!("Discarding oversized request line");
                            let e = BridgeError::InvalidRequest(format!(
                                "Request line exceeds the {} byte limit",
                                self.max_line_length
                            ));
                            write_error(&mut writer, &e).await?;
                        }
                        Frame::Eof => {
                            tracing::debug!("End of input, {} request(s) still in flight", in_flight.len());
                            reading = false;
                        }
                    }
                }
                Some(response) = in_flight.next(), if !in_flight.is_empty() => {
                    drain_events(&mut events, &mut writer).await?;
                    write_line(&mut writer, &JsonLineCodec::encode_response(&response)?).await?;
                }
                Some(invocation) = events.recv() => {
                    write_event(&mut writer, invocation).await?;
                }
            }
        }

        drain_events(&mut events, &mut writer).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Files forwarding callbacks for new peer function references. The
    /// bridge drops them again on `removeReference`.
    fn prepare(&self, message: &BridgeMessage, events: &mpsc::UnboundedSender<FunctionInvocation>) {
        let BridgeMessage::Invoke(request) = message else {
            return;
        };
        let functions = self.bridge.functions();
        for argument in &request.arguments {
            let Argument::FunctionReference { reference_id } = argument else {
                continue;
            };
            if functions.contains(reference_id) {
                continue;
            }
            let events = events.clone();
            let id = reference_id.clone();
            let forward = move |arguments: Vec<JsonValue>| {
                let _ = events.send(FunctionInvocation::new(id.clone(), arguments));
                Ok(JsonValue::Null)
            };
            if functions.insert(reference_id.clone(), forward).is_err() {
                tracing::debug!("Function reference '{}' was registered concurrently", reference_id);
            }
        }
    }

    async fn handle(&self, request: Request) -> Response {
        let id = request.id;
        Response::from_result(id, self.bridge.send(request.message).await)
    }
}

enum Frame {
    Line,
    TooLong,
    Eof,
}

/// Reads up to the next newline into `line`, keeping at most `max_length`
/// bytes of it. A longer line is consumed and reported as [`Frame::TooLong`].
///
/// Cancel safe while `line` and `overflowed` outlive the future: consumed
/// bytes are recorded in them before the next await.
async fn read_frame<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    line: &mut Vec<u8>,
    overflowed: &mut bool,
    max_length: usize,
) -> std::io::Result<Frame> {
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            if std::mem::take(overflowed) {
                line.clear();
                return Ok(Frame::TooLong);
            }
            return Ok(if line.is_empty() { Frame::Eof } else { Frame::Line });
        }

        let newline = available.iter().position(|&b| b == b'\n');
        let chunk = match newline {
            Some(i) => &available[..i],
            None => available,
        };
        if !*overflowed {
            if line.len() + chunk.len() > max_length {
                *overflowed = true;
                line.clear();
            } else {
                line.extend_from_slice(chunk);
            }
        }
        let used = newline.map_or(chunk.len(), |i| i + 1);
        reader.consume(used);

        if newline.is_some() {
            if std::mem::take(overflowed) {
                return Ok(Frame::TooLong);
            }
            return Ok(Frame::Line);
        }
    }
}

async fn write_error<W: AsyncWrite + Unpin>(writer: &mut W, error: &BridgeError) -> Result<()> {
    write_line(writer, &JsonLineCodec::encode_response(&Response::from_error(0, error))?).await
}

async fn drain_events<W: AsyncWrite + Unpin>(
    events: &mut mpsc::UnboundedReceiver<FunctionInvocation>,
    writer: &mut W,
) -> Result<()> {
    while let Ok(invocation) = events.try_recv() {
        write_event(writer, invocation).await?;
    }
    Ok(())
}

async fn write_event<W: AsyncWrite + Unpin>(writer: &mut W, invocation: FunctionInvocation) -> Result<()> {
    let line = JsonLineCodec::encode_event(&BridgeEvent::FunctionInvoked(invocation))?;
    write_line(writer, &line).await
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &[u8]) -> Result<()> {
    writer.write_all(line).await?;
    writer.flush().await?;
    Ok(())
}
