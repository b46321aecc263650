//! Messages
//!
//! A [`Message`] is a match type plus an opaque payload. The payload is a
//! [`Bytes`] so fan-out (service broadcast, exit notification to every link)
//! clones a refcount, never the data.

use crate::atom::{MatchType, EXIT};
use crate::errors::{Result, TypesError};
use crate::tag::ExitCode;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    ty: MatchType,
    payload: Bytes,
}

#[derive(Serialize, Deserialize)]
struct ExitBody {
    code: u8,
    reason: String,
}

impl Message {
    /// An empty message of type `ty`.
    pub fn new(ty: impl Into<MatchType>) -> Self {
        Self {
            ty: ty.into(),
            payload: Bytes::new(),
        }
    }

    pub fn from_bytes(ty: impl Into<MatchType>, payload: impl Into<Bytes>) -> Self {
        Self {
            ty: ty.into(),
            payload: payload.into(),
        }
    }

    /// Serialize `value` with bincode into a message of type `ty`.
    pub fn with<T: Serialize>(ty: impl Into<MatchType>, value: &T) -> Result<Self> {
        let ty = ty.into();
        let encoded = bincode::serialize(value).map_err(|e| TypesError::Encode {
            ty: ty.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            ty,
            payload: Bytes::from(encoded),
        })
    }

    /// Exit notification carrying `code` and a human-readable reason.
    pub fn exit(code: ExitCode, reason: impl Into<String>) -> Self {
        let body = ExitBody {
            code: code as u8,
            reason: reason.into(),
        };
        // A struct of u8 and String always serializes.
        let payload = bincode::serialize(&body).unwrap_or_default();
        Self {
            ty: EXIT,
            payload: Bytes::from(payload),
        }
    }

    pub fn ty(&self) -> MatchType {
        self.ty
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn is_exit(&self) -> bool {
        self.ty == EXIT
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        bincode::deserialize(&self.payload).map_err(|e| TypesError::Decode {
            ty: self.ty.to_string(),
            len: self.payload.len(),
            reason: e.to_string(),
        })
    }

    /// Code and reason of an exit message built by [`Message::exit`].
    pub fn exit_info(&self) -> Result<(ExitCode, String)> {
        let body: ExitBody = self.decode()?;
        let code = ExitCode::try_from(body.code)
            .map_err(|value| TypesError::InvalidExitCode { value })?;
        Ok((code, body.reason))
    }

    pub fn into_parts(self) -> (MatchType, Bytes) {
        (self.ty, self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::atom;

    #[test]
    fn test_typed_payload() {
        let msg = Message::with(atom("echo"), &(42u32, String::from("hi"))).unwrap();
        assert_eq!(msg.ty(), atom("echo"));
        let (n, s): (u32, String) = msg.decode().unwrap();
        assert_eq!(n, 42);
        assert_eq!(s, "hi");
    }

    #[test]
    fn test_decode_wrong_shape_is_an_error() {
        let msg = Message::from_bytes(1u64, vec![1u8]);
        let err = msg.decode::<(u64, u64)>().unwrap_err();
        assert!(matches!(err, TypesError::Decode { len: 1, .. }));
    }

    #[test]
    fn test_exit_info() {
        let msg = Message::exit(ExitCode::Exception, "boom");
        assert!(msg.is_exit());
        assert_eq!(
            msg.exit_info().unwrap(),
            (ExitCode::Exception, String::from("boom"))
        );
    }

    #[test]
    fn test_empty_message() {
        let msg = Message::new(atom("ping"));
        assert!(msg.is_empty());
        assert!(msg.exit_info().is_err());
    }

    #[test]
    fn test_clone_shares_payload() {
        let msg = Message::from_bytes(3u64, vec![0u8; 64]);
        let copy = msg.clone();
        assert_eq!(msg.payload().as_ptr(), copy.payload().as_ptr());
    }
}
