//! Context domain: item sets, serializers, surveys, subscribers, and managed slots.

pub mod items;
pub mod managed;
pub mod serializer;
pub mod subscriber;
pub mod survey;

pub use items::ContextItemSet;
pub use managed::{
    ContextBinding, ListenerId, ManagedContext, ManagedSlot, PlainBinding, SlotId,
    CONTEXT_CHANGED_EVENT,
};
pub use serializer::{ContextSerializer, FallbackSerializer, SerializerRegistry};
pub use subscriber::ContextSubscriber;
pub use survey::{ResponseState, SurveyOutcome, SurveyResponse, UNSPECIFIED_REASON};
