/// HTTP request methods.
///
/// All of these are recognized on the request line, but only GET is
/// served. Any other method is answered with 400 Bad Request once the
/// request has been read in full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    /// GET - Retrieve a resource
    #[default]
    GET,
    /// POST - Create or submit data
    POST,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// PUT - Replace a resource
    PUT,
    /// DELETE - Delete a resource
    DELETE,
    /// TRACE - Loop-back test
    TRACE,
    /// OPTIONS - Describe communication options
    OPTIONS,
    /// CONNECT - Establish a tunnel
    CONNECT,
    /// PATCH - Partial modification of a resource
    PATCH,
}

impl Method {
    /// Parses an HTTP method token.
    ///
    /// Matching is case-insensitive.
    ///
    /// # Example
    ///
    /// ```
    /// # use lantern::http::request::Method;
    /// assert_eq!(Method::from_token("GET"), Some(Method::GET));
    /// assert_eq!(Method::from_token("get"), Some(Method::GET));
    /// assert_eq!(Method::from_token("BREW"), None);
    /// ```
    pub fn from_token(s: &str) -> Option<Self> {
        const METHODS: [(&str, Method); 9] = [
            ("GET", Method::GET),
            ("POST", Method::POST),
            ("HEAD", Method::HEAD),
            ("PUT", Method::PUT),
            ("DELETE", Method::DELETE),
            ("TRACE", Method::TRACE),
            ("OPTIONS", Method::OPTIONS),
            ("CONNECT", Method::CONNECT),
            ("PATCH", Method::PATCH),
        ];

        METHODS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(s))
            .map(|(_, method)| *method)
    }
}

/// The parts of a request the server acts on.
///
/// Filled in incrementally by the
/// [`RequestParser`](crate::http::parser::RequestParser) as the request
/// line and headers arrive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    /// The HTTP method
    pub method: Method,
    /// Target path with any scheme, authority and query string removed
    pub url: String,
    /// Protocol version as sent by the client
    pub version: String,
    /// Value of the `Host` header, if any
    pub host: Option<String>,
    /// Declared body length from `Content-Length`
    pub content_length: usize,
    /// Whether the client asked for `Connection: keep-alive`
    pub keep_alive: bool,
}

impl Request {
    /// Whether the server can actually serve this request.
    pub fn is_supported(&self) -> bool {
        self.method == Method::GET
    }
}
