//! Application events.
//!
//! Event types are matched by name along an explicit supertype chain rather
//! than through runtime type information, so a listener declared for
//! [`EventType::context_event`] receives every lifecycle event.

use std::any::Any;
use std::fmt;

use chrono::{DateTime, Utc};

/// Name of the root event type.
pub const APPLICATION_EVENT: &str = "ApplicationEvent";

/// Name of the generic payload event type.
pub const PAYLOAD_APPLICATION_EVENT: &str = "PayloadApplicationEvent";

/// A named event type and its supertypes, nearest first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventType {
    name: String,
    supertypes: Vec<String>,
}

impl EventType {
    /// The root type every event is assignable to.
    #[must_use]
    pub fn root() -> Self {
        Self {
            name: APPLICATION_EVENT.into(),
            supertypes: Vec::new(),
        }
    }

    /// Declares a subtype of `parent`.
    #[must_use]
    pub fn new(name: impl Into<String>, parent: &Self) -> Self {
        let mut supertypes = Vec::with_capacity(parent.supertypes.len() + 1);
        supertypes.push(parent.name.clone());
        supertypes.extend(parent.supertypes.iter().cloned());
        Self {
            name: name.into(),
            supertypes,
        }
    }

    /// Supertype of all container lifecycle events.
    #[must_use]
    pub fn context_event() -> Self {
        Self::new("ApplicationContextEvent", &Self::root())
    }

    /// Published once the container has been refreshed.
    #[must_use]
    pub fn context_refreshed() -> Self {
        Self::new("ContextRefreshedEvent", &Self::context_event())
    }

    /// Published when the container is started.
    #[must_use]
    pub fn context_started() -> Self {
        Self::new("ContextStartedEvent", &Self::context_event())
    }

    /// Published when the container is stopped.
    #[must_use]
    pub fn context_stopped() -> Self {
        Self::new("ContextStoppedEvent", &Self::context_event())
    }

    /// Published when the container is closed.
    #[must_use]
    pub fn context_closed() -> Self {
        Self::new("ContextClosedEvent", &Self::context_event())
    }

    /// Supertype of all payload events regardless of payload type.
    #[must_use]
    pub fn payload() -> Self {
        Self::new(PAYLOAD_APPLICATION_EVENT, &Self::root())
    }

    /// Payload event carrying a `T`.
    #[must_use]
    pub fn payload_of<T: ?Sized>() -> Self {
        Self::new(
            format!("{PAYLOAD_APPLICATION_EVENT}<{}>", std::any::type_name::<T>()),
            &Self::payload(),
        )
    }

    /// Type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Supertype names, nearest first.
    #[must_use]
    pub fn supertypes(&self) -> &[String] {
        &self.supertypes
    }

    /// Returns `true` if an event of this type may be delivered as `other`.
    #[must_use]
    pub fn is_assignable_to(&self, other: &Self) -> bool {
        self.name == other.name || self.supertypes.iter().any(|s| *s == other.name)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// An event delivered to listeners.
pub trait ApplicationEvent: Any + Send + Sync + fmt::Debug {
    /// The resolved type of this event.
    fn event_type(&self) -> EventType;

    /// Type name of the object the event originated from.
    fn source_type(&self) -> Option<&str> {
        None
    }

    /// When the event happened.
    fn timestamp(&self) -> DateTime<Utc>;

    /// Downcasting hook for listeners.
    fn as_any(&self) -> &dyn Any;
}

/// Container lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextEventKind {
    /// Definitions resolved and validated.
    Refreshed,
    /// Container started.
    Started,
    /// Container stopped.
    Stopped,
    /// Container closed.
    Closed,
}

/// A container lifecycle event.
#[derive(Debug, Clone)]
pub struct ContextEvent {
    kind: ContextEventKind,
    context_id: String,
    timestamp: DateTime<Utc>,
}

impl ContextEvent {
    /// Source type reported by lifecycle events.
    pub const SOURCE_TYPE: &'static str = "ApplicationContext";

    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(kind: ContextEventKind, context_id: impl Into<String>) -> Self {
        Self {
            kind,
            context_id: context_id.into(),
            timestamp: Utc::now(),
        }
    }

    /// Which transition happened.
    #[must_use]
    pub const fn kind(&self) -> ContextEventKind {
        self.kind
    }

    /// Identifier of the container that published the event.
    #[must_use]
    pub fn context_id(&self) -> &str {
        &self.context_id
    }
}

impl ApplicationEvent for ContextEvent {
    fn event_type(&self) -> EventType {
        match self.kind {
            ContextEventKind::Refreshed => EventType::context_refreshed(),
            ContextEventKind::Started => EventType::context_started(),
            ContextEventKind::Stopped => EventType::context_stopped(),
            ContextEventKind::Closed => EventType::context_closed(),
        }
    }

    fn source_type(&self) -> Option<&str> {
        Some(Self::SOURCE_TYPE)
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// An arbitrary payload published as an event.
#[derive(Debug, Clone)]
pub struct PayloadApplicationEvent<T> {
    payload: T,
    source_type: Option<String>,
    timestamp: DateTime<Utc>,
}

impl<T: Send + Sync + fmt::Debug + 'static> PayloadApplicationEvent<T> {
    /// Wraps a payload.
    #[must_use]
    pub fn new(payload: T) -> Self {
        Self {
            payload,
            source_type: None,
            timestamp: Utc::now(),
        }
    }

    /// Records the publishing object's type name.
    #[must_use]
    pub fn with_source_type(mut self, source_type: impl Into<String>) -> Self {
        self.source_type = Some(source_type.into());
        self
    }

    /// The wrapped payload.
    #[must_use]
    pub const fn payload(&self) -> &T {
        &self.payload
    }
}

impl<T: Send + Sync + fmt::Debug + 'static> ApplicationEvent for PayloadApplicationEvent<T> {
    fn event_type(&self) -> EventType {
        EventType::payload_of::<T>()
    }

    fn source_type(&self) -> Option<&str> {
        self.source_type.as_deref()
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
