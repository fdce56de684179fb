// ABOUTME: Demultiplexing of framed container log streams into stdout and stderr
// ABOUTME: Parses 8-byte frame headers across arbitrary chunk boundaries

use crate::runtime::RuntimeError;
use futures::{Stream, StreamExt};
use thiserror::Error;

/// Frame header: selector byte, three zero bytes, big-endian u32 payload length.
pub const HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StreamSelector {
    Stdin = 0,
    Stdout = 1,
    Stderr = 2,
    /// Error raised by the runtime itself rather than the process
    System = 3,
}

impl TryFrom<u8> for StreamSelector {
    type Error = DemuxError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Stdin),
            1 => Ok(Self::Stdout),
            2 => Ok(Self::Stderr),
            3 => Ok(Self::System),
            other => Err(DemuxError::UnknownSelector(other)),
        }
    }
}

#[derive(Error, Debug)]
pub enum DemuxError {
    #[error("Log stream transport failed: {0}")]
    Transport(#[from] RuntimeError),

    #[error("Unknown stream selector {0} in log frame")]
    UnknownSelector(u8),

    #[error("Runtime reported an error in the log stream: {0}")]
    System(String),

    #[error("Truncated log frame: expected {expected} bytes, stream ended after {received}")]
    Truncated { expected: usize, received: usize },
}

pub type Result<T> = std::result::Result<T, DemuxError>;

/// Separated output of one container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DemuxedOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Incremental frame parser.
///
/// Chunks are fed as they arrive; complete frames are routed immediately and
/// a partial frame is held until more bytes arrive or the stream ends.
#[derive(Debug, Default)]
pub struct OutputDemuxer {
    pending: Vec<u8>,
    output: DemuxedOutput,
}

impl OutputDemuxer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split a whole framed stream. Any error discards the partial output.
    pub async fn split<S>(mut stream: S) -> Result<DemuxedOutput>
    where
        S: Stream<Item = std::result::Result<Vec<u8>, RuntimeError>> + Unpin,
    {
        let mut demuxer = Self::new();
        while let Some(chunk) = stream.next().await {
            demuxer.feed(&chunk?)?;
        }
        demuxer.finish()
    }

    pub fn split_bytes(data: &[u8]) -> Result<DemuxedOutput> {
        let mut demuxer = Self::new();
        demuxer.feed(data)?;
        demuxer.finish()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Result<()> {
        self.pending.extend_from_slice(chunk);

        let mut offset = 0;
        while self.pending.len() - offset >= HEADER_LEN {
            let header = &self.pending[offset..offset + HEADER_LEN];
            let selector = StreamSelector::try_from(header[0])?;
            let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;

            let end = offset + HEADER_LEN + len;
            if self.pending.len() < end {
                break;
            }

            let payload = &self.pending[offset + HEADER_LEN..end];
            match selector {
                StreamSelector::Stdin | StreamSelector::Stdout => {
                    self.output.stdout.extend_from_slice(payload)
                }
                StreamSelector::Stderr => self.output.stderr.extend_from_slice(payload),
                StreamSelector::System => {
                    return Err(DemuxError::System(
                        String::from_utf8_lossy(payload).into_owned(),
                    ))
                }
            }
            offset = end;
        }

        self.pending.drain(..offset);
        Ok(())
    }

    /// Finish the stream, failing if it stopped inside a frame.
    pub fn finish(self) -> Result<DemuxedOutput> {
        if self.pending.is_empty() {
            return Ok(self.output);
        }

        let expected = if self.pending.len() < HEADER_LEN {
            HEADER_LEN
        } else {
            let h = &self.pending;
            HEADER_LEN + u32::from_be_bytes([h[4], h[5], h[6], h[7]]) as usize
        };

        Err(DemuxError::Truncated {
            expected,
            received: self.pending.len(),
        })
    }
}

/// Encode `payload` as one or more frames for `selector`.
pub fn encode_frame(selector: StreamSelector, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    if payload.is_empty() {
        out.push(selector as u8);
        out.extend_from_slice(&[0; 7]);
        return out;
    }
    for part in payload.chunks(u32::MAX as usize) {
        out.push(selector as u8);
        out.extend_from_slice(&[0, 0, 0]);
        out.extend_from_slice(&(part.len() as u32).to_be_bytes());
        out.extend_from_slice(part);
    }
    out
}
