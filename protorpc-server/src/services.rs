//! Built-in demo services: arithmetic and echo.

use protorpc_protocol::service::unknown_method;
use protorpc_protocol::{invoke, MethodDescriptor, ProtocolError, Reply, Service, ServiceError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArithRequest {
    pub a: i32,
    pub b: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArithResponse {
    pub c: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EchoRequest {
    pub msg: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoResponse {
    pub msg: String,
}

/// Integer arithmetic: `add`, `mul`, `div` and `error`, which always fails.
#[derive(Debug, Default)]
pub struct ArithService;

impl ArithService {
    pub const NAME: &'static str = "ArithService";

    pub fn add(&self, req: ArithRequest) -> Result<ArithResponse, ServiceError> {
        Ok(ArithResponse {
            c: req.a.wrapping_add(req.b),
        })
    }

    pub fn mul(&self, req: ArithRequest) -> Result<ArithResponse, ServiceError> {
        Ok(ArithResponse {
            c: req.a.wrapping_mul(req.b),
        })
    }

    pub fn div(&self, req: ArithRequest) -> Result<ArithResponse, ServiceError> {
        if req.b == 0 {
            return Err("divide by zero".into());
        }
        let c = req.a.checked_div(req.b).ok_or("integer overflow")?;
        Ok(ArithResponse { c })
    }

    pub fn error(&self, _req: ArithRequest) -> Result<ArithResponse, ServiceError> {
        Err("ArithError".into())
    }
}

impl Service for ArithService {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn methods(&self) -> Vec<MethodDescriptor> {
        ["add", "mul", "div", "error"]
            .into_iter()
            .map(|m| MethodDescriptor::new::<ArithRequest, ArithResponse>(Self::NAME, m))
            .collect()
    }

    fn call_method(&self, method: &MethodDescriptor, request: &[u8]) -> Result<Reply, ProtocolError> {
        match method.method() {
            "add" => invoke(request, |req| self.add(req)),
            "mul" => invoke(request, |req| self.mul(req)),
            "div" => invoke(request, |req| self.div(req)),
            "error" => invoke(request, |req| self.error(req)),
            _ => Err(unknown_method(Self::NAME, method)),
        }
    }
}

/// Sends the message back.
#[derive(Debug, Default)]
pub struct EchoService;

impl EchoService {
    pub const NAME: &'static str = "EchoService";
}

impl Service for EchoService {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn methods(&self) -> Vec<MethodDescriptor> {
        vec![MethodDescriptor::new::<EchoRequest, EchoResponse>(
            Self::NAME,
            "Echo",
        )]
    }

    fn call_method(&self, method: &MethodDescriptor, request: &[u8]) -> Result<Reply, ProtocolError> {
        match method.method() {
            "Echo" => invoke(request, |req: EchoRequest| {
                Ok::<_, ServiceError>(EchoResponse { msg: req.msg })
            }),
            _ => Err(unknown_method(Self::NAME, method)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protorpc_protocol::Message;

    #[test]
    fn test_arith() {
        let arith = ArithService;
        assert_eq!(arith.add(ArithRequest { a: 1, b: 2 }).unwrap().c, 3);
        assert_eq!(arith.mul(ArithRequest { a: 3, b: 4 }).unwrap().c, 12);
        assert_eq!(arith.div(ArithRequest { a: 13, b: 5 }).unwrap().c, 2);
        assert_eq!(
            arith.div(ArithRequest { a: 1, b: 0 }).unwrap_err().text(),
            "divide by zero"
        );
        assert_eq!(
            arith.div(ArithRequest { a: i32::MIN, b: -1 }).unwrap_err().text(),
            "integer overflow"
        );
        assert_eq!(
            arith.error(ArithRequest::default()).unwrap_err().text(),
            "ArithError"
        );
    }

    #[test]
    fn test_dispatch_by_descriptor() {
        let arith = ArithService;
        let methods = arith.methods();
        let div = methods.iter().find(|m| m.method() == "div").unwrap();
        assert_eq!(div.canonical_name(), "ArithService.Div");

        let request = ArithRequest { a: 1, b: 0 }.encode().unwrap();
        let reply = arith.call_method(div, &request).unwrap();
        assert_eq!(reply.error, "divide by zero");
        assert!(reply.body.is_none());
    }

    #[test]
    fn test_echo() {
        let echo = EchoService;
        let method = &echo.methods()[0];
        assert_eq!(method.canonical_name(), "EchoService.Echo");

        let request = EchoRequest {
            msg: "Hello Protobuf-RPC!".to_string(),
        }
        .encode()
        .unwrap();
        let reply = echo.call_method(method, &request).unwrap();
        let response = EchoResponse::decode(&reply.body.unwrap()).unwrap();
        assert_eq!(response.msg, "Hello Protobuf-RPC!");
    }

    #[test]
    fn test_unknown_descriptor() {
        let stray = MethodDescriptor::new::<ArithRequest, ArithResponse>("ArithService", "sqrt");
        assert!(matches!(
            ArithService.call_method(&stray, b"{}"),
            Err(ProtocolError::UnknownMethod { .. })
        ));
    }

    #[test]
    fn test_missing_fields_default() {
        assert_eq!(
            ArithRequest::decode(br#"{"a":5}"#).unwrap(),
            ArithRequest { a: 5, b: 0 }
        );
        assert_eq!(EchoRequest::decode(b"{}").unwrap(), EchoRequest::default());
    }
}
