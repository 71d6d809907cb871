use std::fmt;
use std::io;
use std::time::{Duration, Instant};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};
use tracing::{Span, debug, field, info, instrument, trace, warn};
use trapper_core::{
    Frame, LengthLimit, MeasurementBatch, ProtocolError, SenderData, ServerReply,
    protocol::{
        DEFAULT_PORT, HEADER_SIZE, LEGACY_MAX_PAYLOAD, LENGTH_FIELD_SIZE, MAGIC, PREAMBLE_SIZE,
        decode_length,
    },
};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);
const RESPONSE_TERMINATOR: u8 = b'\r';
/// Most reply bytes kept; the largest legacy frame fits exactly.
pub const MAX_REPLY_SIZE: usize = HEADER_SIZE + LEGACY_MAX_PAYLOAD;

#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Server host name or IP address.
    pub server: String,
    pub port: u16,
    /// Host name the items are filed under on the server.
    pub host: String,
    pub connect_timeout: Duration,
    /// How long to wait for the server's reply after the frame is written.
    pub response_timeout: Duration,
    pub length_limit: LengthLimit,
    /// Attach the capture time to every item.
    pub include_clock: bool,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            server: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            host: "trapper".to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            length_limit: LengthLimit::Legacy,
            include_clock: false,
        }
    }
}

/// Where a send was in the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Connecting,
    HeaderSent,
    LengthSent,
    PayloadSent,
    AwaitingResponse,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Connecting => "connecting",
            Stage::HeaderSent => "header sent",
            Stage::LengthSent => "length sent",
            Stage::PayloadSent => "payload sent",
            Stage::AwaitingResponse => "awaiting response",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("payload of {size} bytes exceeds the {max} byte frame limit")]
    OversizedPayload { size: usize, max: usize },

    #[error("failed to encode payload: {0}")]
    Encoding(#[source] ProtocolError),

    #[error("connection to {addr} failed ({stage}): {source}")]
    ConnectionFailed {
        addr: String,
        stage: Stage,
        #[source]
        source: io::Error,
    },

    #[error("no response from {addr} within {timeout:?}")]
    TimedOut { addr: String, timeout: Duration },

    #[error("{addr} closed the connection without responding")]
    PeerClosed { addr: String },
}

impl From<ProtocolError> for SendError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::OversizedPayload { size, max } => SendError::OversizedPayload { size, max },
            other => SendError::Encoding(other),
        }
    }
}

/// What the server answered.
#[derive(Debug, Clone)]
pub struct Acknowledgment {
    /// Reply text up to the terminator; the JSON body for framed replies.
    pub text: String,
    /// Decoded reply when the server answered with a trapper frame or JSON.
    pub reply: Option<ServerReply>,
    /// Time from the end of the write to the end of the reply.
    pub elapsed: Duration,
}

impl Acknowledgment {
    fn from_raw(raw: &[u8], elapsed: Duration) -> Self {
        let text = match Frame::from_bytes(raw) {
            Ok(frame) => String::from_utf8_lossy(frame.payload()).into_owned(),
            // cut-off frame: show what arrived of the body, not the binary header
            Err(_) if raw.starts_with(&MAGIC) => {
                String::from_utf8_lossy(&raw[raw.len().min(HEADER_SIZE)..]).into_owned()
            }
            Err(_) => String::from_utf8_lossy(raw).into_owned(),
        };

        Self {
            text,
            reply: ServerReply::parse(raw).ok(),
            elapsed,
        }
    }
}

/// Pushes measurement batches to a trapper server, one connection per batch.
///
/// Each call to [`TrapperSender::send`] is a self-contained exchange: connect,
/// write the frame, wait for the reply, close. Nothing is kept between calls
/// and nothing is retried.
#[derive(Debug, Clone)]
pub struct TrapperSender {
    config: SenderConfig,
}

impl TrapperSender {
    pub fn new(config: SenderConfig) -> Self {
        Self { config }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.config.server, self.config.port)
    }

    /// JSON body for a batch.
    pub fn payload(&self, batch: &MeasurementBatch) -> Result<String, SendError> {
        let mut data = SenderData::new(&self.config.host, batch);
        if self.config.include_clock {
            data = data.with_clock(batch);
        }

        Ok(data.to_json()?)
    }

    #[instrument(
        name = "trapper_send",
        skip_all,
        fields(
            addr = %self.addr(),
            items = batch.len(),
            payload_bytes = field::Empty,
            payload = field::Empty,
        )
    )]
    pub async fn send(&self, batch: &MeasurementBatch) -> Result<Acknowledgment, SendError> {
        let payload = match self.payload(batch) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Batch not sent");
                return Err(e);
            }
        };

        let payload_bytes = payload.len();
        let span = Span::current();
        span.record("payload_bytes", payload_bytes);
        span.record("payload", field::display(&payload));

        let frame = match Frame::new(payload, self.config.length_limit) {
            Ok(frame) => frame,
            Err(e) => {
                let e = SendError::from(e);
                warn!(error = %e, payload_bytes, "Batch not sent");
                return Err(e);
            }
        };

        let result = self.exchange(&frame).await;

        match &result {
            Ok(ack) => info!(
                response = %ack.text,
                elapsed_ms = ack.elapsed.as_millis() as u64,
                "Batch acknowledged"
            ),
            Err(e) => warn!(error = %e, "Batch not acknowledged"),
        }

        if let Some(reply) = result.as_ref().ok().and_then(|ack| ack.reply.as_ref()) {
            if !reply.is_success() {
                warn!(response = %reply.response, info = ?reply.info, "Server did not report success");
            }
        }

        result
    }

    async fn exchange(&self, frame: &Frame) -> Result<Acknowledgment, SendError> {
        let addr = self.addr();
        let mut stream = self.connect(&addr).await?;

        let result = self.transmit(&mut stream, frame, &addr).await;

        // single close point for every outcome past connect
        if let Err(e) = stream.shutdown().await {
            debug!(error = %e, "Socket shutdown failed");
        }
        drop(stream);
        trace!("Connection closed");

        result
    }

    async fn connect(&self, addr: &str) -> Result<TcpStream, SendError> {
        let connect = TcpStream::connect((self.config.server.as_str(), self.config.port));

        let source = match timeout(self.config.connect_timeout, connect).await {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(error = %e, "Failed to disable Nagle");
                }
                trace!("Connected");
                return Ok(stream);
            }
            Ok(Err(e)) => e,
            Err(_) => io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
        };

        Err(SendError::ConnectionFailed {
            addr: addr.to_owned(),
            stage: Stage::Connecting,
            source,
        })
    }

    async fn transmit(
        &self,
        stream: &mut TcpStream,
        frame: &Frame,
        addr: &str,
    ) -> Result<Acknowledgment, SendError> {
        let failed = |stage, source| SendError::ConnectionFailed {
            addr: addr.to_owned(),
            stage,
            source,
        };

        stream
            .write_all(&frame.preamble())
            .await
            .map_err(|e| failed(Stage::Connecting, e))?;
        trace!(stage = %Stage::HeaderSent);

        stream
            .write_all(frame.length_field())
            .await
            .map_err(|e| failed(Stage::HeaderSent, e))?;
        trace!(stage = %Stage::LengthSent);

        stream
            .write_all(frame.payload())
            .await
            .map_err(|e| failed(Stage::LengthSent, e))?;
        stream
            .flush()
            .await
            .map_err(|e| failed(Stage::LengthSent, e))?;
        trace!(stage = %Stage::PayloadSent, bytes = frame.wire_len());

        self.await_response(stream, addr).await
    }

    async fn await_response(
        &self,
        stream: &mut TcpStream,
        addr: &str,
    ) -> Result<Acknowledgment, SendError> {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.config.response_timeout;

        let mut buf: Vec<u8> = Vec::with_capacity(128);
        let mut tmp = [0u8; 512];

        loop {
            let read = match tokio::time::timeout_at(deadline, stream.read(&mut tmp)).await {
                Ok(read) => read,
                Err(_) if buf.is_empty() => {
                    return Err(SendError::TimedOut {
                        addr: addr.to_owned(),
                        timeout: self.config.response_timeout,
                    });
                }
                Err(_) => {
                    warn!(bytes = buf.len(), "Reply still open at deadline, keeping partial text");
                    break;
                }
            };

            let n = match read {
                Ok(0) if buf.is_empty() => {
                    return Err(SendError::PeerClosed {
                        addr: addr.to_owned(),
                    });
                }
                Ok(0) => break,
                Ok(n) => n,
                Err(source) if buf.is_empty() => {
                    return Err(SendError::ConnectionFailed {
                        addr: addr.to_owned(),
                        stage: Stage::AwaitingResponse,
                        source,
                    });
                }
                Err(e) => {
                    warn!(error = %e, "Reply interrupted, keeping partial text");
                    break;
                }
            };

            buf.extend_from_slice(&tmp[..n]);

            if let Some(end) = reply_end(&buf) {
                buf.truncate(end);
                break;
            }

            if buf.len() >= MAX_REPLY_SIZE {
                warn!(limit = MAX_REPLY_SIZE, "Reply too long, keeping the first bytes");
                buf.truncate(MAX_REPLY_SIZE);
                break;
            }
        }

        Ok(Acknowledgment::from_raw(&buf, started.elapsed()))
    }
}

/// Length of a complete reply at the start of `buf`, if one has arrived.
///
/// Framed replies are complete once their declared payload is in; anything
/// else ends at the first carriage return.
fn reply_end(buf: &[u8]) -> Option<usize> {
    if buf.len() < MAGIC.len() && MAGIC.starts_with(buf) {
        return None;
    }

    if buf.starts_with(&MAGIC) {
        if buf.len() < HEADER_SIZE {
            return None;
        }

        let mut length = [0u8; LENGTH_FIELD_SIZE];
        length.copy_from_slice(&buf[PREAMBLE_SIZE..HEADER_SIZE]);

        let total = usize::try_from(decode_length(&length))
            .ok()
            .and_then(|len| len.checked_add(HEADER_SIZE))?;

        return (buf.len() >= total).then_some(total);
    }

    buf.iter().position(|&b| b == RESPONSE_TERMINATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_reply_ends_at_carriage_return() {
        assert_eq!(reply_end(b"OK"), None);
        assert_eq!(reply_end(b"OK\r"), Some(2));
        assert_eq!(reply_end(b"OK\r\nmore"), Some(2));
    }

    #[test]
    fn framed_reply_waits_for_declared_length() {
        let bytes = Frame::new(b"{\"response\":\"success\"}".to_vec(), LengthLimit::Legacy)
            .unwrap()
            .to_bytes();

        assert_eq!(reply_end(&bytes[..2]), None);
        assert_eq!(reply_end(&bytes[..10]), None);
        assert_eq!(reply_end(&bytes[..bytes.len() - 1]), None);
        assert_eq!(reply_end(&bytes), Some(bytes.len()));
    }

    #[test]
    fn carriage_return_inside_a_frame_is_payload() {
        let bytes = Frame::new(vec![b'\r'; 13], LengthLimit::Legacy)
            .unwrap()
            .to_bytes();

        assert_eq!(reply_end(&bytes[..HEADER_SIZE + 1]), None);
        assert_eq!(reply_end(&bytes), Some(bytes.len()));
    }

    #[test]
    fn oversize_maps_to_its_own_error() {
        let err = SendError::from(ProtocolError::OversizedPayload {
            size: 70_000,
            max: 65_535,
        });
        assert!(matches!(
            err,
            SendError::OversizedPayload {
                size: 70_000,
                max: 65_535
            }
        ));
    }

    #[test]
    fn acknowledgment_unwraps_framed_text() {
        let body = r#"{"response":"success","info":"processed: 1; failed: 0; total: 1"}"#;
        let raw = Frame::new(body.as_bytes().to_vec(), LengthLimit::Legacy)
            .unwrap()
            .to_bytes();

        let ack = Acknowledgment::from_raw(&raw, Duration::ZERO);
        assert_eq!(ack.text, body);
        assert_eq!(ack.reply.and_then(|r| r.processed()).map(|p| p.total), Some(1));
    }

    #[test]
    fn cut_off_frame_keeps_body_without_header() {
        let body = r#"{"response":"success"}"#;
        let raw = Frame::new(body.as_bytes().to_vec(), LengthLimit::Legacy)
            .unwrap()
            .to_bytes();

        let ack = Acknowledgment::from_raw(&raw[..HEADER_SIZE + 10], Duration::ZERO);
        assert_eq!(ack.text, &body[..10]);
        assert!(ack.reply.is_none());

        let ack = Acknowledgment::from_raw(&raw[..8], Duration::ZERO);
        assert_eq!(ack.text, "");
    }
}
