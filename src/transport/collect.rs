//! Accumulates the raw bytes libcurl hands back during a transfer.

use std::mem;

use curl::easy::{Handler, WriteError};

use super::parse::trim_crlf;

/// Capture target installed on every easy handle.
///
/// libcurl may deliver several head blocks for one transfer: a `100
/// Continue` before the real response, or one block per hop when it
/// follows redirects itself. Each new status line discards whatever was
/// captured so far, so after `perform` only the final hop remains.
pub(crate) struct Collector {
    head: Vec<Vec<u8>>,
    body: Vec<u8>,
}

impl Collector {
    pub(crate) fn new() -> Self {
        Self {
            head: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Moves the captured head lines and body out, leaving the collector
    /// empty for reuse.
    pub(crate) fn take(&mut self) -> (Vec<Vec<u8>>, Vec<u8>) {
        (mem::take(&mut self.head), mem::take(&mut self.body))
    }
}

impl Handler for Collector {
    fn write(&mut self, data: &[u8]) -> Result<usize, WriteError> {
        self.body.extend_from_slice(data);
        Ok(data.len())
    }

    fn header(&mut self, data: &[u8]) -> bool {
        if is_status_line(data) {
            self.head.clear();
            self.body.clear();
        }
        if !trim_crlf(data).is_empty() {
            self.head.push(data.to_vec());
        }
        true
    }
}

fn is_status_line(line: &[u8]) -> bool {
    line.len() >= 5 && line[..5].eq_ignore_ascii_case(b"HTTP/")
}
