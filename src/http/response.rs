use crate::http::parser::HttpCode;

/// HTTP status codes the server answers with.
///
/// - `Ok` (200): File served
/// - `BadRequest` (400): Malformed or unsupported request
/// - `Forbidden` (403): Target exists but may not be served
/// - `NotFound` (404): Target does not exist
/// - `InternalServerError` (500): Response could not be built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK
    Ok,
    /// 400 Bad Request
    BadRequest,
    /// 403 Forbidden
    Forbidden,
    /// 404 Not Found
    NotFound,
    /// 500 Internal Server Error
    InternalServerError,
}

impl StatusCode {
    /// Maps a final request outcome to the status it is answered with.
    ///
    /// Returns `None` for outcomes that do not produce a response
    /// (`NoRequest`, `GetRequest`, `ClosedConnection`).
    pub fn from_outcome(code: HttpCode) -> Option<Self> {
        match code {
            HttpCode::FileRequest => Some(StatusCode::Ok),
            HttpCode::BadRequest => Some(StatusCode::BadRequest),
            HttpCode::ForbiddenRequest => Some(StatusCode::Forbidden),
            HttpCode::NoResource => Some(StatusCode::NotFound),
            HttpCode::InternalError => Some(StatusCode::InternalServerError),
            HttpCode::NoRequest | HttpCode::GetRequest | HttpCode::ClosedConnection => None,
        }
    }

    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use lantern::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// assert_eq!(StatusCode::NotFound.as_u16(), 404);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::BadRequest => 400,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::InternalServerError => 500,
        }
    }

    /// Returns the standard HTTP reason phrase for this status code.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::InternalServerError => "Internal Server Error",
        }
    }

    fn detail(&self) -> &'static str {
        match self {
            StatusCode::Ok => "",
            StatusCode::BadRequest => {
                "Your request has bad syntax or is inherently impossible to satisfy."
            }
            StatusCode::Forbidden => "You do not have permission to get file from this server.",
            StatusCode::NotFound => "The requested file was not found on this server.",
            StatusCode::InternalServerError => {
                "There was an unusual problem serving the requested file."
            }
        }
    }

    pub fn is_error(&self) -> bool {
        *self != StatusCode::Ok
    }
}

/// Renders the canned HTML page sent with an error status.
pub fn error_page(status: StatusCode) -> String {
    format!(
        "<html><head><title>{code} {reason}</title></head>\
         <body><h1>{reason}</h1><p>{detail}</p></body></html>\n",
        code = status.as_u16(),
        reason = status.reason_phrase(),
        detail = status.detail(),
    )
}
