use std::fmt;

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use serde::Serialize;
use tracing::{debug, trace};

use crate::error::{ClientError, TransportError};
use crate::wire::{Frame, parse_frame_line};

/// Logical operations exposed by the generation server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    JunitVersion,
    Session,
    StopSession,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Self::JunitVersion => "/junitVersion",
            Self::Session => "/session",
            Self::StopSession => "/session/stop",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

#[derive(Debug, Clone)]
pub struct Transport {
    http: reqwest::Client,
    base_url: String,
}

impl Transport {
    pub fn new(host: &str, port: u16) -> Result<Self, TransportError> {
        // Loopback only: never route through an environment proxy.
        let http = reqwest::Client::builder()
            .no_proxy()
            .build()
            .map_err(TransportError::Client)?;
        Ok(Self {
            http,
            base_url: format!("http://{host}:{port}"),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base_url, endpoint.path())
    }

    /// Sends `body` and returns the response once headers arrive, without
    /// looking at the status code.
    pub async fn send<B>(&self, endpoint: Endpoint, body: &B) -> Result<reqwest::Response, TransportError>
    where
        B: Serialize + ?Sized,
    {
        debug!(%endpoint, "sending request");
        self.http
            .post(self.url(endpoint))
            .json(body)
            .send()
            .await
            .map_err(|source| TransportError::Connect { endpoint, source })
    }

    /// Sends `body` and requires a success status. The response body is
    /// dropped, which releases the connection.
    pub async fn post<B>(&self, endpoint: Endpoint, body: &B) -> Result<(), TransportError>
    where
        B: Serialize + ?Sized,
    {
        let response = self.send(endpoint, body).await?;
        ensure_success(endpoint, &response)?;
        Ok(())
    }

    /// Sends `body` and hands back the response body as a stream of frames.
    /// Dropping the returned stream tears the connection down.
    pub async fn open_stream<B>(&self, endpoint: Endpoint, body: &B) -> Result<FrameStream, TransportError>
    where
        B: Serialize + ?Sized,
    {
        let response = self.send(endpoint, body).await?;
        ensure_success(endpoint, &response)?;
        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed();
        Ok(FrameStream::new(endpoint, chunks))
    }
}

fn ensure_success(endpoint: Endpoint, response: &reqwest::Response) -> Result<(), TransportError> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(TransportError::Status { endpoint, status })
    }
}

/// Splits a byte stream into lines on `\n`, across chunk boundaries.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
    }

    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        let newline_index = self.pending.iter().position(|byte| *byte == b'\n')?;
        let mut line = self.pending.drain(..=newline_index).collect::<Vec<_>>();
        line.pop();
        if matches!(line.last(), Some(b'\r')) {
            line.pop();
        }
        Some(line)
    }

    /// Whatever is left after the last newline once the stream has ended.
    pub fn take_remainder(&mut self) -> Option<Vec<u8>> {
        let mut rest = std::mem::take(&mut self.pending);
        if matches!(rest.last(), Some(b'\r')) {
            rest.pop();
        }
        if rest.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            Some(rest)
        }
    }
}

pub struct FrameStream {
    endpoint: Endpoint,
    chunks: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>,
    lines: LineBuffer,
    exhausted: bool,
}

impl FrameStream {
    pub fn new(
        endpoint: Endpoint,
        chunks: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>,
    ) -> Self {
        Self {
            endpoint,
            chunks,
            lines: LineBuffer::default(),
            exhausted: false,
        }
    }

    /// Next frame in wire order, `Ok(None)` at end of stream. Blank lines
    /// are skipped.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>, ClientError> {
        loop {
            while let Some(line) = self.lines.next_line() {
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                trace!(endpoint = %self.endpoint, bytes = line.len(), "frame line");
                return parse_frame_line(&line).map(Some);
            }
            if self.exhausted {
                return match self.lines.take_remainder() {
                    Some(rest) => parse_frame_line(&rest).map(Some),
                    None => Ok(None),
                };
            }
            match self.chunks.next().await {
                Some(Ok(chunk)) => self.lines.push(&chunk),
                Some(Err(source)) => {
                    return Err(TransportError::Read {
                        endpoint: self.endpoint,
                        source,
                    }
                    .into());
                }
                None => self.exhausted = true,
            }
        }
    }
}

#[cfg(test)]
#[path = "../tests/unit/transport_tests.rs"]
mod tests;
