//! The mutable HTTP message model.
//!
//! An [`HttpMessage`] holds the start line and the ordered header section of
//! one request or response. Sessions build one from tokenizer events and hand
//! owned clones to the consumer, which may then edit and [`serialize`] them
//! back into wire format.
//!
//! [`serialize`]: HttpMessage::serialize

use bytes::{BufMut, Bytes, BytesMut};

use crate::ensure;
use crate::protocol::Error;

/// Version written by [`HttpMessage::serialize`], whatever the parsed message used.
const HTTP_VERSION: &[u8] = b"HTTP/1.1";

const CRLF: &[u8] = b"\r\n";

/// Whether a message is a request or a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Request,
    Response,
}

/// One header field. The value is always present, possibly empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderField {
    name: Vec<u8>,
    value: Vec<u8>,
}

impl HeaderField {
    pub fn name(&self) -> &[u8] {
        &self.name
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub(crate) fn append_name(&mut self, bytes: &[u8]) {
        self.name.extend_from_slice(bytes);
    }

    pub(crate) fn append_value(&mut self, bytes: &[u8]) {
        self.value.extend_from_slice(bytes);
    }
}

/// A request or response head: start line plus header fields in insertion order.
///
/// A message with a non-zero status code is a response, otherwise it is a
/// request once a method is set.
///
/// ```
/// use http_tap::HttpMessage;
///
/// let mut message = HttpMessage::request("GET", "/");
/// message.insert_header("Host", "example.com").unwrap();
///
/// assert_eq!(message.serialize().unwrap(), &b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n"[..]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpMessage {
    method: Option<Vec<u8>>,
    url: Option<Vec<u8>>,
    status: Option<Vec<u8>>,
    status_code: u16,
    fields: Vec<HeaderField>,
}

impl HttpMessage {
    /// Creates an empty message with neither start line nor header fields.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(method: impl AsRef<[u8]>, url: impl AsRef<[u8]>) -> Self {
        Self { method: Some(method.as_ref().to_vec()), url: Some(url.as_ref().to_vec()), ..Self::default() }
    }

    pub fn response(status_code: u16, status: impl AsRef<[u8]>) -> Self {
        Self { status: Some(status.as_ref().to_vec()), status_code, ..Self::default() }
    }

    pub fn kind(&self) -> Option<MessageKind> {
        if self.status_code != 0 {
            Some(MessageKind::Response)
        } else if self.method.is_some() {
            Some(MessageKind::Request)
        } else {
            None
        }
    }

    pub fn method(&self) -> Option<&[u8]> {
        self.method.as_deref()
    }

    pub fn url(&self) -> Option<&[u8]> {
        self.url.as_deref()
    }

    /// The reason phrase of a response.
    pub fn status(&self) -> Option<&[u8]> {
        self.status.as_deref()
    }

    /// The status code of a response, `0` for requests.
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn headers(&self) -> &[HeaderField] {
        &self.fields
    }

    pub fn set_method(&mut self, method: impl AsRef<[u8]>) -> Result<(), Error> {
        let method = method.as_ref();
        ensure!(!method.is_empty(), Error::null_argument("method"));
        self.method = Some(method.to_vec());
        Ok(())
    }

    pub fn set_url(&mut self, url: impl AsRef<[u8]>) -> Result<(), Error> {
        let url = url.as_ref();
        ensure!(!url.is_empty(), Error::null_argument("url"));
        self.url = Some(url.to_vec());
        Ok(())
    }

    /// Sets the reason phrase. An empty phrase is valid.
    pub fn set_status(&mut self, status: impl AsRef<[u8]>) {
        self.status = Some(status.as_ref().to_vec());
    }

    /// Sets the status code; `0` turns the message back into a request.
    pub fn set_status_code(&mut self, status_code: u16) -> Result<(), Error> {
        ensure!(status_code <= 999, Error::invalid_argument(format!("status code {status_code} has more than three digits")));
        self.status_code = status_code;
        Ok(())
    }

    /// Adds a field named `name` with an empty value.
    ///
    /// Fails if a field with the same name, compared case-insensitively, exists.
    pub fn add_header(&mut self, name: impl AsRef<[u8]>) -> Result<(), Error> {
        let name = name.as_ref();
        ensure!(!name.is_empty(), Error::null_argument("name"));
        ensure!(
            !self.fields.iter().any(|field| field.name.eq_ignore_ascii_case(name)),
            Error::invalid_argument(format!("header field {} already exists", String::from_utf8_lossy(name)))
        );

        self.fields.push(HeaderField { name: name.to_vec(), value: Vec::new() });
        Ok(())
    }

    /// Replaces the value of the field named exactly `name`.
    ///
    /// The field must have been added with [`add_header`](Self::add_header) first.
    pub fn set_header(&mut self, name: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<(), Error> {
        let name = name.as_ref();
        ensure!(!name.is_empty(), Error::null_argument("name"));

        match self.fields.iter_mut().find(|field| field.name == name) {
            Some(field) => {
                field.value.clear();
                field.value.extend_from_slice(value.as_ref());
                Ok(())
            }
            None => Err(Error::invalid_argument(format!("no header field named {}", String::from_utf8_lossy(name)))),
        }
    }

    /// Adds a field and sets its value in one step.
    pub fn insert_header(&mut self, name: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<(), Error> {
        let name = name.as_ref();
        self.add_header(name)?;
        self.set_header(name, value)
    }

    /// Returns the value of the field named exactly `name`.
    ///
    /// The slice carries its own length, values may contain any byte.
    pub fn get_header(&self, name: impl AsRef<[u8]>) -> Option<&[u8]> {
        let name = name.as_ref();
        self.fields.iter().find(|field| field.name == name).map(HeaderField::value)
    }

    /// Removes the first field whose name matches case-insensitively.
    ///
    /// The remaining fields keep their relative order.
    pub fn remove_header(&mut self, name: impl AsRef<[u8]>) -> Result<(), Error> {
        let name = name.as_ref();
        ensure!(!name.is_empty(), Error::null_argument("name"));

        match self.fields.iter().position(|field| field.name.eq_ignore_ascii_case(name)) {
            Some(index) => {
                self.fields.remove(index);
                Ok(())
            }
            None => Err(Error::invalid_argument(format!("no header field named {}", String::from_utf8_lossy(name)))),
        }
    }

    /// Serializes the start line and header section, including the blank
    /// line that terminates it. No body bytes are written.
    ///
    /// A non-zero status code selects the status line even when method and
    /// url are set too.
    pub fn serialize(&self) -> Result<Bytes, Error> {
        let fields_len: usize = self.fields.iter().map(|field| field.name.len() + field.value.len() + 4).sum();
        let mut dst = BytesMut::with_capacity(64 + fields_len);

        match (self.kind(), &self.method, &self.url) {
            (Some(MessageKind::Response), _, _) => {
                dst.put_slice(HTTP_VERSION);
                dst.put_u8(b' ');
                dst.put_slice(self.status_code.to_string().as_bytes());
                dst.put_u8(b' ');
                dst.put_slice(self.status.as_deref().unwrap_or_default());
            }
            (Some(MessageKind::Request), Some(method), Some(url)) => {
                dst.put_slice(method);
                dst.put_u8(b' ');
                dst.put_slice(url);
                dst.put_u8(b' ');
                dst.put_slice(HTTP_VERSION);
            }
            _ => return Err(Error::invalid_argument("message has neither a request line nor a status line")),
        }
        dst.put_slice(CRLF);

        for field in &self.fields {
            dst.put_slice(&field.name);
            dst.put_slice(b": ");
            dst.put_slice(&field.value);
            dst.put_slice(CRLF);
        }
        dst.put_slice(CRLF);

        Ok(dst.freeze())
    }

    pub(crate) fn append_url(&mut self, bytes: &[u8]) {
        self.url.get_or_insert_with(Vec::new).extend_from_slice(bytes);
    }

    pub(crate) fn append_status(&mut self, bytes: &[u8]) {
        self.status.get_or_insert_with(Vec::new).extend_from_slice(bytes);
    }

    pub(crate) fn open_field(&mut self) -> &mut HeaderField {
        self.fields.push(HeaderField::default());
        let last = self.fields.len() - 1;
        &mut self.fields[last]
    }

    pub(crate) fn current_field(&mut self) -> Option<&mut HeaderField> {
        self.fields.last_mut()
    }
}
