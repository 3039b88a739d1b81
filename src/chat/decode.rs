use super::ChatError;
use crate::provider::{Frame, ProviderKind};

/// Longest line kept while waiting for its newline.
const MAX_LINE_BYTES: usize = 1 << 20;

/// Incremental decoder from raw body bytes to text fragments.
///
/// - Splits on `\n` at the byte level, so a UTF-8 sequence cut by a network
///   read is put back together before it is decoded
/// - Keeps an unterminated trailing line until the next `push`
/// - Hands complete lines to the provider's line parser
///
/// A line longer than `MAX_LINE_BYTES` is reported once and then skipped up
/// to its newline.
#[derive(Debug)]
pub struct FrameDecoder {
    provider: ProviderKind,
    buf: Vec<u8>,
    /// Bytes of `buf` already known to hold no newline.
    scanned: usize,
    discarding: bool,
    max_line: usize,
}

impl FrameDecoder {
    pub fn new(provider: ProviderKind) -> Self {
        Self {
            provider,
            buf: Vec::new(),
            scanned: 0,
            discarding: false,
            max_line: MAX_LINE_BYTES,
        }
    }

    /// Feed one network chunk. Returns the fragments and per-frame errors of
    /// every line completed by it, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<String, ChatError>> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();
        let mut start = 0;

        while let Some(i) = self.buf[self.scanned..].iter().position(|&b| b == b'\n') {
            let end = self.scanned + i;
            if self.discarding {
                self.discarding = false;
            } else {
                self.decode_line(&self.buf[start..end], &mut out);
            }
            start = end + 1;
            self.scanned = start;
        }

        self.buf.drain(..start);
        self.scanned = self.buf.len();

        if self.buf.len() > self.max_line {
            if !self.discarding {
                tracing::warn!(provider = %self.provider, limit = self.max_line, "dropping oversized frame");
                out.push(Err(ChatError::OversizedFrame { limit: self.max_line }));
                self.discarding = true;
            }
            self.buf.clear();
            self.scanned = 0;
        }

        out
    }

    /// The body has ended; decode whatever is left without a newline.
    pub fn finish(&mut self) -> Vec<Result<String, ChatError>> {
        let mut out = Vec::new();
        let line = std::mem::take(&mut self.buf);
        self.scanned = 0;
        if !std::mem::take(&mut self.discarding) && !line.is_empty() {
            self.decode_line(&line, &mut out);
        }
        out
    }

    /// Bytes held back waiting for their newline.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    fn decode_line(&self, line: &[u8], out: &mut Vec<Result<String, ChatError>>) {
        let line = String::from_utf8_lossy(line);
        let line = line.strip_suffix('\r').unwrap_or(&line);

        match self.provider.parse_line(line) {
            Ok(Frame::Delta(text)) => out.push(Ok(text)),
            Ok(Frame::Sentinel) => tracing::debug!(provider = %self.provider, "end-of-stream sentinel"),
            Ok(Frame::Ignored) => {}
            Err(e) => out.push(Err(e)),
        }
    }
}
