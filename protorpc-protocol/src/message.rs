//! Typed request and response messages.

use crate::error::ProtocolError;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A value that can travel as a request or response body.
///
/// Any serde type with a `Default` is a message; bodies are JSON. An empty
/// body decodes to `Default::default()`.
pub trait Message: Sized + Send + Sync + 'static {
    fn encode(&self) -> Result<Vec<u8>, ProtocolError>;

    fn decode(buf: &[u8]) -> Result<Self, ProtocolError>;

    /// Name used to check a value against a method descriptor.
    fn type_name() -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl<T> Message for T
where
    T: Serialize + DeserializeOwned + Default + Send + Sync + 'static,
{
    fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }

    fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.is_empty() {
            return Ok(T::default());
        }
        Ok(serde_json::from_slice(buf)?)
    }
}
