//! Line-oriented console transport
//!
//! A [`Transport`] is one exclusively owned connection to a device console.
//! The TCP implementation refuses every telnet option the far end offers and
//! strips negotiation bytes from the data stream, which is all a GNS3
//! console needs.

use std::io::ErrorKind;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::errors::ExecError;
use crate::models::batch::DeviceEndpoint;

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

const READ_CHUNK: usize = 4096;

/// Exclusive connection to one device console
#[async_trait]
pub trait Transport: Send {
    /// Write raw bytes
    async fn write_all(&mut self, data: &[u8]) -> Result<(), ExecError>;

    /// Read until `pattern` matches, returning everything up to and including
    /// the match. Bytes after the match stay buffered.
    async fn read_until(&mut self, pattern: &Regex, timeout: Duration) -> Result<String, ExecError>;

    /// Return whatever is buffered or already readable, without waiting
    async fn drain(&mut self) -> Result<String, ExecError>;

    /// Close the connection
    async fn close(&mut self) -> Result<(), ExecError>;
}

/// Opens transports to device endpoints
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        endpoint: &DeviceEndpoint,
        timeout: Duration,
    ) -> Result<Box<dyn Transport>, ExecError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum DecodeState {
    #[default]
    Data,
    Iac,
    Option(u8),
    Sub,
    SubIac,
}

/// Incremental telnet stream decoder
///
/// Separates application data from negotiation and produces the refusals to
/// send back. Negotiation sequences may be split across reads.
#[derive(Debug, Default)]
pub struct TelnetDecoder {
    state: DecodeState,
}

impl TelnetDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; data goes to `data`, refusals to `replies`
    pub fn feed(&mut self, input: &[u8], data: &mut Vec<u8>, replies: &mut Vec<u8>) {
        for &byte in input {
            self.state = match (self.state, byte) {
                (DecodeState::Data, IAC) => DecodeState::Iac,
                (DecodeState::Data, b) => {
                    data.push(b);
                    DecodeState::Data
                }
                (DecodeState::Iac, IAC) => {
                    data.push(IAC);
                    DecodeState::Data
                }
                (DecodeState::Iac, cmd @ (DO | DONT | WILL | WONT)) => DecodeState::Option(cmd),
                (DecodeState::Iac, SB) => DecodeState::Sub,
                (DecodeState::Iac, _) => DecodeState::Data,
                (DecodeState::Option(cmd), option) => {
                    match cmd {
                        DO => replies.extend_from_slice(&[IAC, WONT, option]),
                        WILL => replies.extend_from_slice(&[IAC, DONT, option]),
                        _ => {}
                    }
                    DecodeState::Data
                }
                (DecodeState::Sub, IAC) => DecodeState::SubIac,
                (DecodeState::Sub, _) => DecodeState::Sub,
                (DecodeState::SubIac, SE) => DecodeState::Data,
                (DecodeState::SubIac, _) => DecodeState::Sub,
            };
        }
    }
}

/// Append decodable UTF-8 from `pending` to `out`
///
/// An incomplete sequence at the end of `pending` is kept for the next read;
/// invalid bytes become U+FFFD.
pub fn decode_utf8(pending: &mut Vec<u8>, out: &mut String) {
    loop {
        match std::str::from_utf8(pending) {
            Ok(valid) => {
                out.push_str(valid);
                pending.clear();
                return;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                out.push_str(&String::from_utf8_lossy(&pending[..valid]));
                match e.error_len() {
                    None => {
                        pending.drain(..valid);
                        return;
                    }
                    Some(len) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        pending.drain(..valid + len);
                    }
                }
            }
        }
    }
}

/// Telnet console over TCP
pub struct TcpTransport {
    stream: TcpStream,
    decoder: TelnetDecoder,
    pending: Vec<u8>,
    buffer: String,
    closed: bool,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            decoder: TelnetDecoder::new(),
            pending: Vec::new(),
            buffer: String::new(),
            closed: false,
        }
    }

    async fn absorb(&mut self, raw: &[u8]) -> Result<(), ExecError> {
        let mut replies = Vec::new();
        self.decoder.feed(raw, &mut self.pending, &mut replies);
        decode_utf8(&mut self.pending, &mut self.buffer);
        if !replies.is_empty() {
            trace!("Refusing {} bytes of telnet negotiation", replies.len());
            self.stream.write_all(&replies).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn write_all(&mut self, data: &[u8]) -> Result<(), ExecError> {
        self.stream.write_all(data).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn read_until(
        &mut self,
        pattern: &Regex,
        timeout: Duration,
    ) -> Result<String, ExecError> {
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            if let Some(end) = pattern.find(&self.buffer).map(|m| m.end()) {
                let rest = self.buffer.split_off(end);
                return Ok(std::mem::replace(&mut self.buffer, rest));
            }

            match tokio::time::timeout_at(deadline, self.stream.read(&mut chunk)).await {
                Ok(Ok(0)) => {
                    return Err(ExecError::TransportError(
                        "Connection closed by remote host".to_string(),
                    ))
                }
                Ok(Ok(n)) => self.absorb(&chunk[..n]).await?,
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    return Err(ExecError::PatternNotDetected(format!(
                        "'{}' not seen within {}s",
                        pattern.as_str(),
                        timeout.as_secs_f64()
                    )))
                }
            }
        }
    }

    async fn drain(&mut self) -> Result<String, ExecError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.stream.try_read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => self.absorb(&chunk[..n]).await?,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(std::mem::take(&mut self.buffer))
    }

    async fn close(&mut self) -> Result<(), ExecError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.stream.shutdown().await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Connector dialing device consoles over TCP
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(
        &self,
        endpoint: &DeviceEndpoint,
        timeout: Duration,
    ) -> Result<Box<dyn Transport>, ExecError> {
        let addr = (endpoint.host.as_str(), endpoint.port);
        match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                stream.set_nodelay(true)?;
                debug!(
                    "Connected to '{}' at {}:{}",
                    endpoint.device_name, endpoint.host, endpoint.port
                );
                Ok(Box::new(TcpTransport::new(stream)))
            }
            Ok(Err(e)) => Err(ExecError::TransportError(format!(
                "Unable to connect to {}:{}: {}",
                endpoint.host, endpoint.port, e
            ))),
            Err(_) => Err(ExecError::TransportError(format!(
                "Connection to {}:{} timed out after {}s",
                endpoint.host,
                endpoint.port,
                timeout.as_secs()
            ))),
        }
    }
}
