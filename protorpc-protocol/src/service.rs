//! Services, method descriptors and name normalization.
//!
//! A service lists its methods once, at registration, and dispatches calls
//! by descriptor. Names are matched in their camel-cased canonical form, so
//! `arith_service.add` and `ArithService.Add` reach the same method.

use crate::error::ProtocolError;
use crate::message::Message;
use std::fmt;

/// Normalizes an identifier into its canonical camel-cased form.
///
/// A leading `_` becomes `X`. An `_` followed by a lowercase letter is
/// dropped and the letter starts a new word. Digits and `.` are copied as
/// they are. Every other character starts a word: it is upper-cased when it
/// is a lowercase letter and the run of lowercase letters after it is kept.
pub fn camel_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 1);
    let mut chars = s.chars().peekable();

    if s.starts_with('_') {
        out.push('X');
        chars.next();
    }

    while let Some(c) = chars.next() {
        let next_is_lower = chars.peek().is_some_and(|n| n.is_ascii_lowercase());
        if c == '_' && next_is_lower {
            continue;
        }
        if c.is_ascii_digit() || c == '.' {
            out.push(c);
            continue;
        }
        out.push(c.to_ascii_uppercase());
        while let Some(&n) = chars.peek() {
            if !n.is_ascii_lowercase() {
                break;
            }
            out.push(n);
            chars.next();
        }
    }

    out
}

/// Describes one method of a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    service: String,
    method: String,
    input_type: &'static str,
    output_type: &'static str,
}

impl MethodDescriptor {
    /// Describes `service.method`, taking `Req` and returning `Resp`.
    pub fn new<Req: Message, Resp: Message>(
        service: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
            input_type: Req::type_name(),
            output_type: Resp::type_name(),
        }
    }

    /// Service name as declared.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Method name as declared.
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn input_type(&self) -> &'static str {
        self.input_type
    }

    pub fn output_type(&self) -> &'static str {
        self.output_type
    }

    /// Canonical service name, e.g. `ArithService`.
    pub fn service_name(&self) -> String {
        camel_case(&self.service)
    }

    /// Canonical method name, e.g. `ArithService.Add`.
    pub fn canonical_name(&self) -> String {
        format!("{}.{}", camel_case(&self.service), camel_case(&self.method))
    }

    /// Returns whether `Req`/`Resp` are the types this method expects.
    pub fn accepts<Req: Message, Resp: Message>(&self) -> bool {
        self.input_type == Req::type_name() && self.output_type == Resp::type_name()
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.service, self.method)
    }
}

/// Outcome of a dispatched call: an encoded response body, or an
/// application error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    /// Encoded response; `None` is sent as an empty message.
    pub body: Option<Vec<u8>>,
    /// Application error text; empty on success.
    pub error: String,
}

impl Reply {
    pub fn ok(body: Vec<u8>) -> Self {
        Self {
            body: Some(body),
            error: String::new(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            body: None,
            error: text.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_empty()
    }
}

/// Error returned by a service method. Its text reaches the caller as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ServiceError(String);

impl ServiceError {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn text(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ServiceError {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for ServiceError {
    fn from(text: String) -> Self {
        Self(text)
    }
}

/// A named set of methods served by a server.
pub trait Service: Send + Sync + 'static {
    /// Service name as declared; normalized with [`camel_case`] on
    /// registration.
    fn name(&self) -> &str;

    /// Every method this service answers.
    fn methods(&self) -> Vec<MethodDescriptor>;

    /// Runs `method` on an encoded request.
    ///
    /// An `Err` means the request could not be handled at all (undecodable
    /// body, unknown method); application failures belong in
    /// [`Reply::error`].
    fn call_method(&self, method: &MethodDescriptor, request: &[u8])
        -> Result<Reply, ProtocolError>;
}

/// Decodes `request`, runs `handler` and encodes its outcome.
pub fn invoke<Req, Resp, F>(request: &[u8], handler: F) -> Result<Reply, ProtocolError>
where
    Req: Message,
    Resp: Message,
    F: FnOnce(Req) -> Result<Resp, ServiceError>,
{
    let req = Req::decode(request)?;
    match handler(req) {
        Ok(resp) => Ok(Reply::ok(resp.encode()?)),
        Err(e) => Ok(Reply::error(e.to_string())),
    }
}

/// Error for a descriptor that `service` does not implement.
pub fn unknown_method(service: &str, method: &MethodDescriptor) -> ProtocolError {
    ProtocolError::UnknownMethod {
        service: service.to_string(),
        method: method.method().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[test]
    fn test_camel_case() {
        let cases = [
            ("", ""),
            (".add", ".Add"),
            ("a.add", "A.Add"),
            ("abc_aa_bb", "AbcAaBb"),
            ("_my_field_name_2", "XMyFieldName_2"),
            ("ArithService.Add", "ArithService.Add"),
            ("arith_service.add", "ArithService.Add"),
            ("file_service.get_file_list", "FileService.GetFileList"),
            ("echo2x", "Echo2X"),
            ("__a", "XA"),
        ];
        for (input, expected) in cases {
            assert_eq!(camel_case(input), expected, "camel_case({input:?})");
        }
    }

    #[test]
    fn test_camel_case_is_idempotent_on_canonical_names() {
        for name in ["ArithService.Div", "EchoService.Echo", "XMyFieldName_2"] {
            assert_eq!(camel_case(name), name);
        }
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Num {
        v: i64,
    }

    #[test]
    fn test_descriptor_names() {
        let desc = MethodDescriptor::new::<Num, Num>("arith_service", "add");
        assert_eq!(desc.service(), "arith_service");
        assert_eq!(desc.method(), "add");
        assert_eq!(desc.service_name(), "ArithService");
        assert_eq!(desc.canonical_name(), "ArithService.Add");
        assert_eq!(desc.to_string(), "arith_service.add");
        assert!(desc.accepts::<Num, Num>());
        assert!(!desc.accepts::<Num, serde_json::Value>());
    }

    #[test]
    fn test_invoke_ok() {
        let reply = invoke::<Num, Num, _>(br#"{"v":20}"#, |n| Ok(Num { v: n.v * 2 })).unwrap();
        assert!(reply.is_ok());
        assert_eq!(reply.body.as_deref(), Some(&br#"{"v":40}"#[..]));
    }

    #[test]
    fn test_invoke_application_error() {
        let reply =
            invoke::<Num, Num, _>(b"", |_| Err(ServiceError::from("divide by zero"))).unwrap();
        assert!(!reply.is_ok());
        assert_eq!(reply.error, "divide by zero");
        assert!(reply.body.is_none());
    }

    #[test]
    fn test_invoke_bad_request() {
        let result = invoke::<Num, Num, _>(b"not json", |n| Ok(n));
        assert!(matches!(result, Err(ProtocolError::Json(_))));
    }
}
