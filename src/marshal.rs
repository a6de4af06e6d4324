//! Signed context marshaling
//!
//! Exported context is stamped with the signer's key name and a timestamp under the
//! reserved `Signature` subject, serialized as `name=value` lines and signed. Import
//! verifies the signature against the stamped key before anything is applied.

use crate::config::SignatureSettings;
use crate::context::items::ContextItemSet;
use crate::coordinator::{ChangeTicket, ContextCoordinator};
use crate::error::ContextError;
use chrono::{DateTime, Local, TimeZone};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// Subject reserved for signature metadata.
pub const SIGNATURE_SUBJECT: &str = "Signature";
pub const SIGNATURE_KEY_ITEM: &str = "Signature.Key";
pub const SIGNATURE_TIME_ITEM: &str = "Signature.Time";
/// `yyyyMMddHHmmssz` with a numeric offset.
pub const SIGNATURE_TIME_FORMAT: &str = "%Y%m%d%H%M%S%z";

/// Signs and verifies marshaled context text.
pub trait DigitalSignature: Send + Sync {
    /// Name of the key this signer signs with.
    fn key_name(&self) -> &str;

    fn sign(&self, content: &str) -> Result<String, ContextError>;

    /// Whether `signature` is valid for `content` under the key named `key_name`.
    fn verify(&self, content: &str, signature: &str, key_name: &str) -> Result<bool, ContextError>;
}

/// Keyed BLAKE3 MAC, hex encoded.
pub struct Blake3Signature {
    key_name: String,
    key: [u8; 32],
}

impl Blake3Signature {
    const KEY_CONTEXT: &'static str = "ctxmed 2024 marshaled context signing key";

    pub fn new(key_name: impl Into<String>, key: [u8; 32]) -> Self {
        Self {
            key_name: key_name.into(),
            key,
        }
    }

    /// Build from a hex secret. A 32-byte secret is used as the key directly; any
    /// other length is stretched with BLAKE3 key derivation.
    pub fn from_secret(key_name: impl Into<String>, secret: &str) -> Result<Self, ContextError> {
        let bytes = hex::decode(secret.trim())
            .map_err(|e| ContextError::Config(format!("signature secret is not valid hex: {}", e)))?;
        if bytes.is_empty() {
            return Err(ContextError::Config("signature secret is empty".to_string()));
        }

        let key = match <[u8; 32]>::try_from(bytes.as_slice()) {
            Ok(key) => key,
            Err(_) => blake3::derive_key(Self::KEY_CONTEXT, &bytes),
        };
        Ok(Self::new(key_name, key))
    }

    pub fn from_settings(settings: &SignatureSettings) -> Result<Self, ContextError> {
        let secret = settings.secret.as_deref().ok_or_else(|| {
            ContextError::Config(format!(
                "no secret configured for signing key '{}'",
                settings.key_name
            ))
        })?;
        Self::from_secret(settings.key_name.clone(), secret)
    }

    fn tag(&self, content: &str) -> blake3::Hash {
        blake3::keyed_hash(&self.key, content.as_bytes())
    }
}

impl DigitalSignature for Blake3Signature {
    fn key_name(&self) -> &str {
        &self.key_name
    }

    fn sign(&self, content: &str) -> Result<String, ContextError> {
        Ok(self.tag(content).to_hex().to_string())
    }

    fn verify(&self, content: &str, signature: &str, key_name: &str) -> Result<bool, ContextError> {
        if !key_name.eq_ignore_ascii_case(&self.key_name) {
            return Ok(false);
        }

        let Ok(bytes) = hex::decode(signature.trim()) else {
            return Ok(false);
        };
        let Ok(bytes) = <[u8; 32]>::try_from(bytes.as_slice()) else {
            return Ok(false);
        };

        // Hash equality is constant time.
        Ok(self.tag(content) == blake3::Hash::from(bytes))
    }
}

/// Serialized context plus its detached signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedContext {
    pub body: String,
    pub signature: String,
}

/// Signs exports of, and verifies imports into, one coordinator's aggregate context.
pub struct ContextMarshaller {
    coordinator: Option<ContextCoordinator>,
    signer: Arc<dyn DigitalSignature>,
}

impl ContextMarshaller {
    pub fn new(coordinator: ContextCoordinator, signer: Arc<dyn DigitalSignature>) -> Self {
        Self {
            coordinator: Some(coordinator),
            signer,
        }
    }

    /// Marshaler that only signs and verifies item sets.
    pub fn detached(signer: Arc<dyn DigitalSignature>) -> Self {
        Self {
            coordinator: None,
            signer,
        }
    }

    /// Stamp and sign `items`.
    pub fn marshal(&self, items: &ContextItemSet) -> Result<SignedContext, ContextError> {
        self.marshal_at(items, Local::now())
    }

    /// Stamp and sign `items` with an explicit signing time.
    pub fn marshal_at<Tz>(&self, items: &ContextItemSet, time: DateTime<Tz>) -> Result<SignedContext, ContextError>
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        let mut stamped = items.clone();
        stamped.remove_subject(SIGNATURE_SUBJECT);
        stamped.set_item(SIGNATURE_KEY_ITEM, Some(self.signer.key_name()));
        stamped.set_item(
            SIGNATURE_TIME_ITEM,
            Some(time.format(SIGNATURE_TIME_FORMAT).to_string()),
        );

        let body = stamped.to_string();
        let signature = self.signer.sign(&body)?;
        Ok(SignedContext { body, signature })
    }

    /// Verify `body` against `signature` and return its items without the
    /// `Signature` subject.
    pub fn unmarshal(&self, body: &str, signature: &str) -> Result<ContextItemSet, ContextError> {
        let mut items = ContextItemSet::parse(body);
        let key_name = items
            .get_item(SIGNATURE_KEY_ITEM)
            .map(str::to_string)
            .ok_or_else(|| ContextError::InvalidSignature("missing Signature.Key".to_string()))?;

        if !self.signer.verify(body, signature, &key_name)? {
            warn!(key_name = %key_name, "Rejected marshaled context with a bad signature");
            return Err(ContextError::InvalidSignature(format!(
                "signature does not match key '{}'",
                key_name
            )));
        }

        items.remove_subject(SIGNATURE_SUBJECT);
        Ok(items)
    }

    /// Sign the coordinator's current aggregate context.
    pub fn marshal_context(&self) -> Result<SignedContext, ContextError> {
        let coordinator = self.coordinator()?;
        self.marshal(&coordinator.marshaled_context())
    }

    /// Verify and import a signed aggregate, committing it as one transaction.
    /// Nothing is applied when verification fails.
    pub fn unmarshal_context(&self, body: &str, signature: &str) -> Result<ChangeTicket, ContextError> {
        let coordinator = self.coordinator()?;
        let items = self.unmarshal(body, signature)?;
        Ok(coordinator.set_marshaled_context(&items, true))
    }

    fn coordinator(&self) -> Result<&ContextCoordinator, ContextError> {
        self.coordinator
            .as_ref()
            .ok_or_else(|| ContextError::Config("marshaller is not bound to a coordinator".to_string()))
    }
}
