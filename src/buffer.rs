//! Request and response buffering
//!
//! Requests are line framed: one request line, header lines, then an empty
//! line. The response is collected in memory so the 16-byte status header
//! can carry the final length, then flushed in one piece.

use std::io::{BufRead, Write};

/// Protocol status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Ok = 200,
    BadRequest = 400,
    Forbidden = 403,
    NotFound = 404,
    TooLarge = 413,
    TimeLimit = 452,
    BackendError = 502,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseHeaderKind {
    Off,
    Fixed16,
}

/// Hard cap on header lines per request, against runaway clients.
const MAX_REQUEST_LINES: usize = 1000;

/// Reads line-framed requests off a connection.
pub struct InputBuffer<R> {
    reader: R,
}

impl<R: BufRead> InputBuffer<R> {
    pub fn new(reader: R) -> InputBuffer<R> {
        InputBuffer { reader }
    }

    /// The next request as its lines, without terminators. `None` on a
    /// clean EOF before any line, an empty vec on an empty request.
    pub fn read_request(&mut self) -> std::io::Result<Option<Vec<String>>> {
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            let n = self.reader.read_line(&mut line)?;
            if n == 0 {
                if lines.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(lines));
            }
            while line.ends_with('\n') || line.ends_with('\r') {
                line.pop();
            }
            if line.is_empty() {
                return Ok(Some(lines));
            }
            if lines.len() >= MAX_REQUEST_LINES {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "request too long",
                ));
            }
            lines.push(line);
        }
    }
}

/// Collects one response body plus its status.
pub struct OutputBuffer {
    body: Vec<u8>,
    code: ResponseCode,
    error_message: Option<String>,
    pub response_header: ResponseHeaderKind,
    pub max_size: usize,
}

impl OutputBuffer {
    pub fn new(max_size: usize) -> OutputBuffer {
        OutputBuffer {
            body: Vec::new(),
            code: ResponseCode::Ok,
            error_message: None,
            response_header: ResponseHeaderKind::Off,
            max_size,
        }
    }

    pub fn body_mut(&mut self) -> &mut Vec<u8> {
        &mut self.body
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn code(&self) -> ResponseCode {
        self.code
    }

    /// Record a failure. The first one wins; later ones only log.
    pub fn set_error(&mut self, code: ResponseCode, message: &str) {
        if self.error_message.is_some() {
            tracing::debug!("suppressing secondary error {:?}: {}", code, message);
            return;
        }
        tracing::info!("request failed with {:?}: {}", code, message);
        self.code = code;
        self.error_message = Some(message.to_string());
    }

    pub fn has_error(&self) -> bool {
        self.error_message.is_some()
    }

    /// Write the response to the client and reset for the next request.
    ///
    /// Hard errors replace the body with a single error line; the cap and
    /// time-limit statuses keep the bytes buffered so far.
    pub fn flush<W: Write>(&mut self, writer: &mut W) -> std::io::Result<()> {
        let payload: &[u8] = match (&self.error_message, self.code) {
            (Some(_), ResponseCode::TooLarge) | (Some(_), ResponseCode::TimeLimit) => &self.body,
            (Some(message), _) => {
                self.body = format!("{}\n", message).into_bytes();
                &self.body
            }
            (None, _) => &self.body,
        };
        if self.response_header == ResponseHeaderKind::Fixed16 {
            let header = format!("{:03} {:011}\n", self.code as u16, payload.len());
            debug_assert_eq!(header.len(), 16);
            writer.write_all(header.as_bytes())?;
        }
        writer.write_all(payload)?;
        writer.flush()?;

        self.body.clear();
        self.code = ResponseCode::Ok;
        self.error_message = None;
        self.response_header = ResponseHeaderKind::Off;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_request_lines() {
        let mut input = InputBuffer::new(Cursor::new("GET hosts\r\nColumns: name\n\nGET status\n"));
        assert_eq!(
            input.read_request().unwrap().unwrap(),
            vec!["GET hosts", "Columns: name"]
        );
        assert_eq!(input.read_request().unwrap().unwrap(), vec!["GET status"]);
        assert!(input.read_request().unwrap().is_none());
    }

    #[test]
    fn test_fixed16_header_shape() {
        let mut out = OutputBuffer::new(1024);
        out.response_header = ResponseHeaderKind::Fixed16;
        out.body_mut().extend_from_slice(b"h1;0\n");
        let mut wire = Vec::new();
        out.flush(&mut wire).unwrap();
        assert_eq!(&wire[..16], b"200 00000000005\n");
        assert_eq!(&wire[16..], b"h1;0\n");
    }

    #[test]
    fn test_error_replaces_body() {
        let mut out = OutputBuffer::new(1024);
        out.response_header = ResponseHeaderKind::Fixed16;
        out.body_mut().extend_from_slice(b"partial");
        out.set_error(ResponseCode::BadRequest, "unknown header");
        let mut wire = Vec::new();
        out.flush(&mut wire).unwrap();
        let text = String::from_utf8(wire).unwrap();
        assert!(text.starts_with("400 "));
        assert!(text.ends_with("unknown header\n"));
    }

    #[test]
    fn test_cap_error_keeps_partial_body() {
        let mut out = OutputBuffer::new(4);
        out.body_mut().extend_from_slice(b"h1;0\n");
        out.set_error(ResponseCode::TooLarge, "response too large");
        let mut wire = Vec::new();
        out.flush(&mut wire).unwrap();
        assert_eq!(wire, b"h1;0\n");
    }

    #[test]
    fn test_first_error_wins() {
        let mut out = OutputBuffer::new(1024);
        out.set_error(ResponseCode::NotFound, "no such table");
        out.set_error(ResponseCode::BadRequest, "later");
        assert_eq!(out.code(), ResponseCode::NotFound);
    }
}
