//! Envelopes carry decoded bodies from decoders to sinks.

use std::any::Any;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Type identifier derived from a stable name such as `"transfers.transfer"`.
///
/// Sinks compare it against [`Envelope::type_id`] before downcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvelopeTypeId(u64);

impl EnvelopeTypeId {
    pub fn new(type_name: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        type_name.hash(&mut hasher);
        EnvelopeTypeId(hasher.finish())
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

pub type TypeId = EnvelopeTypeId;

/// Implemented by every decoded body that travels in an envelope.
pub trait TypedBody: Send + Sync {
    fn envelope_type_id(&self) -> TypeId;
    fn as_any(&self) -> &dyn Any;
}

/// Decoded data plus the metadata sinks may filter on.
pub struct Envelope {
    /// Stable identifier, built by the decoder from the event position.
    pub id: String,
    pub type_id: TypeId,
    pub body: Box<dyn TypedBody>,
    pub metadata: HashMap<String, String>,
    /// Unix seconds at which the envelope was produced.
    pub created_at: i64,
}

impl Envelope {
    pub fn new(
        id: impl Into<String>,
        body: Box<dyn TypedBody>,
        metadata: HashMap<String, String>,
    ) -> Self {
        let type_id = body.envelope_type_id();
        Self {
            id: id.into(),
            type_id,
            body,
            metadata,
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.body.as_any().downcast_ref::<T>()
    }
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope")
            .field("id", &self.id)
            .field("type_id", &self.type_id)
            .field("metadata", &self.metadata)
            .field("created_at", &self.created_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ping(u32);

    impl TypedBody for Ping {
        fn envelope_type_id(&self) -> TypeId {
            TypeId::new("test.ping")
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_type_id_is_deterministic() {
        assert_eq!(TypeId::new("test.ping"), TypeId::new("test.ping"));
        assert_ne!(TypeId::new("test.ping"), TypeId::new("test.pong"));
    }

    #[test]
    fn test_downcast() {
        let envelope = Envelope::new("ping-1", Box::new(Ping(7)), HashMap::new());
        assert_eq!(envelope.type_id, TypeId::new("test.ping"));
        assert_eq!(envelope.downcast_ref::<Ping>().map(|p| p.0), Some(7));
        assert!(envelope.downcast_ref::<String>().is_none());
    }
}
