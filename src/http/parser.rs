use crate::http::READ_BUFFER_SIZE;
use crate::http::request::{Method, Request};

/// Result of scanning the read buffer for one CRLF-terminated line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStatus {
    /// A complete line terminated by CR LF.
    Ok,
    /// A CR or LF that is not part of a CR LF pair.
    Bad,
    /// The buffer ran out before a terminator was seen.
    Open,
}

/// Which part of the request the parser expects next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    RequestLine,
    Header,
    Content,
}

/// Outcome of reading and serving a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpCode {
    /// The request is incomplete, more bytes are needed.
    NoRequest,
    /// A complete request has been parsed.
    GetRequest,
    /// The request is malformed or unsupported.
    BadRequest,
    /// The target does not exist.
    NoResource,
    /// The target exists but may not be served.
    ForbiddenRequest,
    /// The target is a readable regular file, ready to send.
    FileRequest,
    /// The server failed while building the response.
    InternalError,
    /// The peer went away before the request could be served.
    ClosedConnection,
}

/// Scans `buf` from `checked` looking for a CR LF pair.
///
/// Returns the classification together with the index scanning should
/// resume from: one past the LF for [`LineStatus::Ok`], the offending byte
/// for [`LineStatus::Bad`], and the first unterminated byte for
/// [`LineStatus::Open`]. The buffer is never modified, so scanning the same
/// bytes from the same position always gives the same answer.
pub fn parse_line(buf: &[u8], checked: usize) -> (LineStatus, usize) {
    let mut i = checked;

    while i < buf.len() {
        match buf[i] {
            b'\r' => {
                if i + 1 == buf.len() {
                    return (LineStatus::Open, i);
                }
                if buf[i + 1] == b'\n' {
                    return (LineStatus::Ok, i + 2);
                }
                return (LineStatus::Bad, i);
            }
            b'\n' => {
                if i > 0 && buf[i - 1] == b'\r' {
                    return (LineStatus::Ok, i + 1);
                }
                return (LineStatus::Bad, i);
            }
            _ => i += 1,
        }
    }

    (LineStatus::Open, buf.len())
}

/// Incremental HTTP request parser.
///
/// The parser is fed the whole filled part of the connection's read buffer
/// on every call and remembers how far it got, so bytes arriving across
/// several reads are handled without copying.
#[derive(Debug)]
pub struct RequestParser {
    state: CheckState,
    checked_idx: usize,
    start_line: usize,
    request: Request,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestParser {
    pub fn new() -> Self {
        Self {
            state: CheckState::RequestLine,
            checked_idx: 0,
            start_line: 0,
            request: Request::default(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn state(&self) -> CheckState {
        self.state
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Index of the first byte not yet consumed by the parser.
    pub fn checked_idx(&self) -> usize {
        self.checked_idx
    }

    /// Advances the state machine over `buf`.
    ///
    /// Returns [`HttpCode::NoRequest`] until a full request has arrived,
    /// then [`HttpCode::GetRequest`]. Malformed input yields
    /// [`HttpCode::BadRequest`].
    pub fn parse(&mut self, buf: &[u8]) -> HttpCode {
        loop {
            if self.state == CheckState::Content {
                return self.parse_content(buf);
            }

            let (status, next) = parse_line(buf, self.checked_idx);
            match status {
                LineStatus::Open => {
                    self.checked_idx = next;
                    return HttpCode::NoRequest;
                }
                LineStatus::Bad => return HttpCode::BadRequest,
                LineStatus::Ok => {}
            }

            let line = &buf[self.start_line..next - 2];
            self.checked_idx = next;
            self.start_line = next;

            let code = match self.state {
                CheckState::RequestLine => self.parse_request_line(line),
                CheckState::Header => self.parse_headers(line),
                CheckState::Content => unreachable!("content is handled before line scanning"),
            };

            if code != HttpCode::NoRequest {
                return code;
            }
        }
    }

    fn parse_request_line(&mut self, line: &[u8]) -> HttpCode {
        let Ok(text) = std::str::from_utf8(line) else {
            return HttpCode::BadRequest;
        };

        let Some((method, rest)) = text.split_once(is_blank) else {
            return HttpCode::BadRequest;
        };
        let Some((target, version)) = rest.trim_start_matches(is_blank).split_once(is_blank)
        else {
            return HttpCode::BadRequest;
        };
        let version = version.trim_start_matches(is_blank);

        let Some(method) = Method::from_token(method) else {
            return HttpCode::BadRequest;
        };
        if !version.eq_ignore_ascii_case("HTTP/1.1") {
            return HttpCode::BadRequest;
        }
        let Some(url) = normalize_target(target) else {
            return HttpCode::BadRequest;
        };

        self.request.method = method;
        self.request.url = url;
        self.request.version = version.to_string();
        self.state = CheckState::Header;

        HttpCode::NoRequest
    }

    fn parse_headers(&mut self, line: &[u8]) -> HttpCode {
        if line.is_empty() {
            if self.request.content_length > 0 {
                self.state = CheckState::Content;
                return HttpCode::NoRequest;
            }
            return HttpCode::GetRequest;
        }

        let Some((name, value)) = std::str::from_utf8(line)
            .ok()
            .and_then(|text| text.split_once(':'))
        else {
            tracing::trace!("skipping unparsable header line");
            return HttpCode::NoRequest;
        };
        let name = name.trim();
        let value = value.trim_matches(is_blank);

        if name.eq_ignore_ascii_case("Connection") {
            self.request.keep_alive = value.eq_ignore_ascii_case("keep-alive");
        } else if name.eq_ignore_ascii_case("Content-Length") {
            if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
                return HttpCode::BadRequest;
            }
            match value.parse::<usize>() {
                Ok(len) if len <= READ_BUFFER_SIZE => self.request.content_length = len,
                _ => return HttpCode::BadRequest,
            }
        } else if name.eq_ignore_ascii_case("Host") {
            self.request.host = Some(value.to_string());
        } else {
            tracing::trace!(header = name, "skipping unknown header");
        }

        HttpCode::NoRequest
    }

    fn parse_content(&self, buf: &[u8]) -> HttpCode {
        if buf.len() >= self.checked_idx + self.request.content_length {
            HttpCode::GetRequest
        } else {
            HttpCode::NoRequest
        }
    }
}

fn is_blank(c: char) -> bool {
    c == ' ' || c == '\t'
}

/// Reduces a request target to the path part used for file lookup.
///
/// Absolute-form targets (`http://host/path`) lose their scheme and
/// authority, and any query string is dropped. Returns `None` when no
/// absolute path remains, including an absolute-form target that names
/// only a host.
fn normalize_target(target: &str) -> Option<String> {
    let is_absolute_form = target
        .get(..7)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("http://"));

    let path = if is_absolute_form {
        // The authority must be followed by a path of its own.
        let rest = &target[7..];
        let path_start = rest.find(['/', '?', '#'])?;
        if !rest[path_start..].starts_with('/') {
            return None;
        }
        url::Url::parse(target).ok()?.path().to_string()
    } else {
        match target.split_once('?') {
            Some((path, _query)) => path.to_string(),
            None => target.to_string(),
        }
    };

    path.starts_with('/').then_some(path)
}
