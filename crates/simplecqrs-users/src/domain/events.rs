//! Domain events for the user-management context.

use serde::{Deserialize, Serialize};
use simplecqrs_core::clock::Clock;
use simplecqrs_core::event::{DomainEvent, EventMetadata};
use uuid::Uuid;

/// Event type identifier for `UserCreated`.
pub const USER_CREATED_EVENT_TYPE: &str = "user.created";
/// Event type identifier for `NameChanged`.
pub const NAME_CHANGED_EVENT_TYPE: &str = "user.name_changed";
/// Event type identifier for `EmailChanged`.
pub const EMAIL_CHANGED_EVENT_TYPE: &str = "user.email_changed";
/// Event type identifier for `AgeChanged`.
pub const AGE_CHANGED_EVENT_TYPE: &str = "user.age_changed";

/// Emitted when a user is registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCreated {
    /// The initial name.
    pub name: String,
    /// The initial email address.
    pub email: String,
    /// The initial age.
    pub age: i32,
}

/// Emitted when a user's name changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameChanged {
    /// The new name.
    pub name: String,
}

/// Emitted when a user's email address changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailChanged {
    /// The new email address.
    pub email: String,
}

/// Emitted when a user's age changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeChanged {
    /// The new age.
    pub age: i32,
}

/// Event payload variants for the user-management context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserEventKind {
    /// A user has been registered.
    Created(UserCreated),
    /// A user's name has changed.
    NameChanged(NameChanged),
    /// A user's email address has changed.
    EmailChanged(EmailChanged),
    /// A user's age has changed.
    AgeChanged(AgeChanged),
}

/// Domain event envelope for the user-management context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: UserEventKind,
}

impl UserEvent {
    /// A new, not yet recorded event stamped with the clock's current time.
    #[must_use]
    pub fn new(kind: UserEventKind, correlation_id: Uuid, clock: &dyn Clock) -> Self {
        Self {
            metadata: EventMetadata::new(correlation_id, clock.now()),
            kind,
        }
    }

    /// The payload as JSON, for read models.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if the payload cannot be serialized.
    pub fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(&self.kind)
    }
}

impl DomainEvent for UserEvent {
    fn event_type(&self) -> &'static str {
        match &self.kind {
            UserEventKind::Created(_) => USER_CREATED_EVENT_TYPE,
            UserEventKind::NameChanged(_) => NAME_CHANGED_EVENT_TYPE,
            UserEventKind::EmailChanged(_) => EMAIL_CHANGED_EVENT_TYPE,
            UserEventKind::AgeChanged(_) => AGE_CHANGED_EVENT_TYPE,
        }
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut EventMetadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use simplecqrs_test_support::{FixedClock, fixed_now};

    use super::*;

    #[test]
    fn test_event_type_follows_kind() {
        let clock = FixedClock::default();
        let created = UserEvent::new(
            UserEventKind::Created(UserCreated {
                name: "Ada".into(),
                email: "ada@example.com".into(),
                age: 36,
            }),
            Uuid::nil(),
            &clock,
        );
        let aged = UserEvent::new(
            UserEventKind::AgeChanged(AgeChanged { age: 37 }),
            Uuid::nil(),
            &clock,
        );

        assert_eq!(created.event_type(), "user.created");
        assert_eq!(aged.event_type(), "user.age_changed");
    }

    #[test]
    fn test_new_event_is_unassigned_and_stamped_by_clock() {
        let correlation_id = Uuid::new_v4();
        let event = UserEvent::new(
            UserEventKind::NameChanged(NameChanged { name: "Ada".into() }),
            correlation_id,
            &FixedClock::default(),
        );

        assert_eq!(event.sequence_number(), 0);
        assert_eq!(event.created_at(), fixed_now());
        assert_eq!(event.metadata.correlation_id(), correlation_id);
    }

    #[test]
    fn test_payload_is_externally_tagged() {
        let event = UserEvent::new(
            UserEventKind::EmailChanged(EmailChanged {
                email: "ada@example.com".into(),
            }),
            Uuid::nil(),
            &FixedClock::default(),
        );

        let payload = event.payload().unwrap();

        assert_eq!(
            payload,
            serde_json::json!({ "EmailChanged": { "email": "ada@example.com" } })
        );
    }
}
