//! Turning raw message bodies into typed events.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;

use crate::errors::DecodeError;

/// Converts a raw message body into a typed event.
pub trait BodyDecoder<E>: Send + Sync + 'static {
    fn decode(&self, body: Option<&str>) -> Result<E, DecodeError>;
}

/// Decodes message bodies as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl<E> BodyDecoder<E> for JsonDecoder
where
    E: DeserializeOwned,
{
    fn decode(&self, body: Option<&str>) -> Result<E, DecodeError> {
        let body = body.ok_or(DecodeError::NoBody)?;
        Ok(serde_json::from_str(body)?)
    }
}

/// Adapts a plain function into a [`BodyDecoder`].
pub struct FnDecoder<F, E> {
    decode_fn: F,
    _event: PhantomData<fn() -> E>,
}

impl<F, E> FnDecoder<F, E>
where
    F: Fn(Option<&str>) -> Result<E, DecodeError> + Send + Sync + 'static,
{
    pub fn new(decode_fn: F) -> Self {
        FnDecoder {
            decode_fn,
            _event: PhantomData,
        }
    }
}

impl<F, E> BodyDecoder<E> for FnDecoder<F, E>
where
    F: Fn(Option<&str>) -> Result<E, DecodeError> + Send + Sync + 'static,
    E: 'static,
{
    fn decode(&self, body: Option<&str>) -> Result<E, DecodeError> {
        (self.decode_fn)(body)
    }
}
