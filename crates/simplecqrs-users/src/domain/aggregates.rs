//! Aggregate root for the user-management context.

use simplecqrs_core::aggregate::{AggregateCore, AggregateRoot};
use simplecqrs_core::clock::Clock;
use simplecqrs_core::error::DomainError;
use uuid::Uuid;

use super::events::{AgeChanged, EmailChanged, NameChanged, UserCreated, UserEvent, UserEventKind};
use super::state::User;

/// The aggregate root for a user.
#[derive(Debug)]
pub struct UserAggregate {
    core: AggregateCore<User, UserEvent>,
}

fn require_text(value: &str, field: &str) -> Result<String, DomainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::Validation(format!("user {field} must not be empty")));
    }
    Ok(trimmed.to_owned())
}

fn require_age(age: i32) -> Result<i32, DomainError> {
    if age <= 0 {
        return Err(DomainError::Validation("user age must be greater than zero".into()));
    }
    Ok(age)
}

impl UserAggregate {
    /// Registers the user, producing a `UserCreated` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AlreadyExists` if the user has any history, and
    /// `DomainError::Validation` for a blank name or email or a non-positive
    /// age.
    pub fn create(
        &mut self,
        name: &str,
        email: &str,
        age: i32,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        if self.version() > 0 {
            return Err(DomainError::AlreadyExists(format!("user {}", self.id())));
        }
        let created = UserCreated {
            name: require_text(name, "name")?,
            email: require_text(email, "email")?,
            age: require_age(age)?,
        };

        self.record_change(UserEvent::new(
            UserEventKind::Created(created),
            correlation_id,
            clock,
        ));
        Ok(())
    }

    /// Renames the user. A name equal to the current one, ignoring case,
    /// records nothing.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` if the user was never created
    /// and `DomainError::Validation` for a blank name.
    pub fn change_name(
        &mut self,
        name: &str,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.require_existing()?;
        let name = require_text(name, "name")?;
        if name.to_lowercase() == self.state().name.to_lowercase() {
            return Ok(());
        }

        self.record_change(UserEvent::new(
            UserEventKind::NameChanged(NameChanged { name }),
            correlation_id,
            clock,
        ));
        Ok(())
    }

    /// Changes the email address. An address equal to the current one,
    /// ignoring case, records nothing.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` if the user was never created
    /// and `DomainError::Validation` for a blank address.
    pub fn change_email(
        &mut self,
        email: &str,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.require_existing()?;
        let email = require_text(email, "email")?;
        if email.to_lowercase() == self.state().email.to_lowercase() {
            return Ok(());
        }

        self.record_change(UserEvent::new(
            UserEventKind::EmailChanged(EmailChanged { email }),
            correlation_id,
            clock,
        ));
        Ok(())
    }

    /// Changes the age. The current age records nothing.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` if the user was never created
    /// and `DomainError::Validation` for a non-positive age.
    pub fn change_age(
        &mut self,
        age: i32,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.require_existing()?;
        let age = require_age(age)?;
        if age == self.state().age {
            return Ok(());
        }

        self.record_change(UserEvent::new(
            UserEventKind::AgeChanged(AgeChanged { age }),
            correlation_id,
            clock,
        ));
        Ok(())
    }

    fn require_existing(&self) -> Result<(), DomainError> {
        if self.version() == 0 {
            return Err(DomainError::AggregateNotFound(format!("user {}", self.id())));
        }
        Ok(())
    }
}

impl AggregateRoot for UserAggregate {
    type State = User;
    type Event = UserEvent;

    fn from_core(core: AggregateCore<User, UserEvent>) -> Self {
        Self { core }
    }

    fn core(&self) -> &AggregateCore<User, UserEvent> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AggregateCore<User, UserEvent> {
        &mut self.core
    }

    fn apply(&mut self, event: &UserEvent) {
        let user = self.core.state_mut();
        match &event.kind {
            UserEventKind::Created(payload) => {
                user.name.clone_from(&payload.name);
                user.email.clone_from(&payload.email);
                user.age = payload.age;
            }
            UserEventKind::NameChanged(payload) => user.name.clone_from(&payload.name),
            UserEventKind::EmailChanged(payload) => user.email.clone_from(&payload.email),
            UserEventKind::AgeChanged(payload) => user.age = payload.age,
        }
    }
}
