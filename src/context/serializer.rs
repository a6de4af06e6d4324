//! Typed serializer registry for context item values.
//!
//! Serializers are keyed by the exact [`TypeId`] of the value they handle. A short,
//! ordered list of fallback serializers covers families of types (for example all
//! primitive integers) that share one textual form; they are consulted only when no
//! exact registration exists.

use crate::context::items::parse_hl7;
use crate::error::ContextError;
use chrono::{DateTime, Utc};
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// HL7 timestamp layout used for dates stored in context items.
pub const HL7_TIMESTAMP: &str = "%Y%m%d%H%M%S";

/// Converts one concrete value type to and from its context item text.
pub trait ContextSerializer: Send + Sync + 'static {
    type Value: Any;

    fn serialize(&self, value: &Self::Value) -> Result<String, ContextError>;

    fn deserialize(&self, text: &str) -> Result<Self::Value, ContextError>;
}

/// Serializer for a family of types, consulted after exact registrations.
pub trait FallbackSerializer: Send + Sync + 'static {
    /// Human readable description, used in diagnostics.
    fn describe(&self) -> &str;

    fn handles(&self, type_id: TypeId) -> bool;

    /// Returns `None` when `value` is not one of the handled types.
    fn serialize_any(&self, value: &dyn Any) -> Option<Result<String, ContextError>>;

    fn deserialize_any(&self, type_id: TypeId, text: &str)
        -> Result<Box<dyn Any>, ContextError>;
}

trait ErasedSerializer: Send + Sync {
    fn serialize_any(&self, value: &dyn Any) -> Option<Result<String, ContextError>>;

    fn deserialize_any(&self, text: &str) -> Result<Box<dyn Any>, ContextError>;
}

struct Erased<S>(S);

impl<S: ContextSerializer> ErasedSerializer for Erased<S> {
    fn serialize_any(&self, value: &dyn Any) -> Option<Result<String, ContextError>> {
        value
            .downcast_ref::<S::Value>()
            .map(|value| self.0.serialize(value))
    }

    fn deserialize_any(&self, text: &str) -> Result<Box<dyn Any>, ContextError> {
        Ok(Box::new(self.0.deserialize(text)?))
    }
}

/// Registry of context serializers. Owned by the caller and passed explicitly.
#[derive(Clone)]
pub struct SerializerRegistry {
    by_type: HashMap<TypeId, Arc<dyn ErasedSerializer>>,
    fallbacks: Vec<Arc<dyn FallbackSerializer>>,
}

impl Default for SerializerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl SerializerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            by_type: HashMap::new(),
            fallbacks: Vec::new(),
        }
    }

    /// Registry with serializers for `String`, `i64`, `bool`, `DateTime<Utc>` and a
    /// fallback for the remaining primitive integers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(StringSerializer);
        registry.register(I64Serializer);
        registry.register(BoolSerializer);
        registry.register(DateTimeSerializer);
        registry.register_fallback(IntegerFallback);
        registry
    }

    /// Register `serializer` for its value type. Returns true if it replaced an
    /// existing registration.
    pub fn register<S: ContextSerializer>(&mut self, serializer: S) -> bool {
        self.by_type
            .insert(TypeId::of::<S::Value>(), Arc::new(Erased(serializer)))
            .is_some()
    }

    /// Append a fallback serializer. Fallbacks are consulted in registration order.
    pub fn register_fallback<F: FallbackSerializer>(&mut self, fallback: F) {
        self.fallbacks.push(Arc::new(fallback));
    }

    /// Remove the exact registration for `T`. Returns true if one existed.
    pub fn remove<T: Any>(&mut self) -> bool {
        self.by_type.remove(&TypeId::of::<T>()).is_some()
    }

    /// True if a value of type `T` can be serialized.
    pub fn supports<T: Any>(&self) -> bool {
        let type_id = TypeId::of::<T>();
        self.by_type.contains_key(&type_id) || self.fallbacks.iter().any(|f| f.handles(type_id))
    }

    /// Fails with [`ContextError::NoSerializer`] when `T` is unsupported.
    pub fn require<T: Any>(&self) -> Result<(), ContextError> {
        if self.supports::<T>() {
            Ok(())
        } else {
            Err(no_serializer::<T>())
        }
    }

    pub fn serialize<T: Any>(&self, value: &T) -> Result<String, ContextError> {
        if let Some(serializer) = self.by_type.get(&TypeId::of::<T>()) {
            if let Some(result) = serializer.serialize_any(value) {
                return result;
            }
        }

        for fallback in &self.fallbacks {
            if let Some(result) = fallback.serialize_any(value) {
                return result;
            }
        }

        Err(no_serializer::<T>())
    }

    pub fn deserialize<T: Any>(&self, text: &str) -> Result<T, ContextError> {
        let type_id = TypeId::of::<T>();

        let boxed = if let Some(serializer) = self.by_type.get(&type_id) {
            serializer.deserialize_any(text)?
        } else if let Some(fallback) = self.fallbacks.iter().find(|f| f.handles(type_id)) {
            fallback.deserialize_any(type_id, text)?
        } else {
            return Err(no_serializer::<T>());
        };

        boxed.downcast::<T>().map(|value| *value).map_err(|_| {
            ContextError::Serialization(format!(
                "serializer produced a value that is not a {}",
                type_name::<T>()
            ))
        })
    }
}

fn no_serializer<T: Any>() -> ContextError {
    ContextError::NoSerializer {
        type_name: type_name::<T>().to_string(),
    }
}

fn parse_error<T>(text: &str) -> ContextError {
    ContextError::Serialization(format!("'{}' is not a valid {}", text, type_name::<T>()))
}

pub struct StringSerializer;

impl ContextSerializer for StringSerializer {
    type Value = String;

    fn serialize(&self, value: &String) -> Result<String, ContextError> {
        Ok(value.clone())
    }

    fn deserialize(&self, text: &str) -> Result<String, ContextError> {
        Ok(text.to_string())
    }
}

pub struct I64Serializer;

impl ContextSerializer for I64Serializer {
    type Value = i64;

    fn serialize(&self, value: &i64) -> Result<String, ContextError> {
        Ok(value.to_string())
    }

    fn deserialize(&self, text: &str) -> Result<i64, ContextError> {
        text.trim().parse().map_err(|_| parse_error::<i64>(text))
    }
}

pub struct BoolSerializer;

impl ContextSerializer for BoolSerializer {
    type Value = bool;

    fn serialize(&self, value: &bool) -> Result<String, ContextError> {
        Ok(value.to_string())
    }

    fn deserialize(&self, text: &str) -> Result<bool, ContextError> {
        match text.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" => Ok(false),
            _ => Err(parse_error::<bool>(text)),
        }
    }
}

/// HL7 timestamps, normalized to UTC.
pub struct DateTimeSerializer;

impl ContextSerializer for DateTimeSerializer {
    type Value = DateTime<Utc>;

    fn serialize(&self, value: &DateTime<Utc>) -> Result<String, ContextError> {
        Ok(value.format(HL7_TIMESTAMP).to_string())
    }

    fn deserialize(&self, text: &str) -> Result<DateTime<Utc>, ContextError> {
        parse_hl7(text).ok_or_else(|| parse_error::<DateTime<Utc>>(text))
    }
}

/// Decimal text for the primitive integer types without an exact registration.
pub struct IntegerFallback;

macro_rules! integer_fallback {
    ($($ty:ty),*) => {
        impl FallbackSerializer for IntegerFallback {
            fn describe(&self) -> &str {
                "primitive integers"
            }

            fn handles(&self, type_id: TypeId) -> bool {
                $(type_id == TypeId::of::<$ty>())||*
            }

            fn serialize_any(&self, value: &dyn Any) -> Option<Result<String, ContextError>> {
                $(
                    if let Some(value) = value.downcast_ref::<$ty>() {
                        return Some(Ok(value.to_string()));
                    }
                )*
                None
            }

            fn deserialize_any(
                &self,
                type_id: TypeId,
                text: &str,
            ) -> Result<Box<dyn Any>, ContextError> {
                $(
                    if type_id == TypeId::of::<$ty>() {
                        let value: $ty = text.trim().parse().map_err(|_| parse_error::<$ty>(text))?;
                        return Ok(Box::new(value));
                    }
                )*
                Err(ContextError::NoSerializer {
                    type_name: format!("{:?}", type_id),
                })
            }
        }
    };
}

integer_fallback!(i8, i16, i32, u8, u16, u32, u64, usize, isize);
