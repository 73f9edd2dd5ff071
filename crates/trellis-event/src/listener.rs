//! Listener contract and listener beans.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use trellis_common::error::Result;
use trellis_common::types::LOWEST_PRECEDENCE;

use crate::event::{ApplicationEvent, EventType};

/// Receives events it declares support for.
pub trait ApplicationListener: Send + Sync {
    /// Handles one event.
    ///
    /// # Errors
    ///
    /// Returns an error if handling fails; without an error handler the
    /// failure propagates out of the multicast.
    fn on_application_event(&self, event: &dyn ApplicationEvent) -> Result<()>;

    /// Returns `true` if events of this type should be delivered.
    fn supports_event_type(&self, event_type: &EventType) -> bool;

    /// Returns `true` if events from this source type should be delivered.
    fn supports_source_type(&self, source_type: Option<&str>) -> bool {
        let _ = source_type;
        true
    }

    /// Delivery priority; lower runs first.
    fn order(&self) -> i32 {
        LOWEST_PRECEDENCE
    }

    /// Whether the listener may run on a task executor.
    fn supports_async_execution(&self) -> bool {
        true
    }

    /// Name used in logs and startup steps.
    fn listener_name(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

type Handler = dyn Fn(&dyn ApplicationEvent) -> Result<()> + Send + Sync;

/// Listener backed by a closure and a declared event type.
pub struct FnListener {
    name: String,
    event_type: EventType,
    order: i32,
    asynchronous: bool,
    handler: Box<Handler>,
}

impl fmt::Debug for FnListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnListener")
            .field("name", &self.name)
            .field("event_type", &self.event_type)
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

impl FnListener {
    /// Creates a listener for `event_type` and its subtypes.
    pub fn new(
        name: impl Into<String>,
        event_type: EventType,
        handler: impl Fn(&dyn ApplicationEvent) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            event_type,
            order: LOWEST_PRECEDENCE,
            asynchronous: true,
            handler: Box::new(handler),
        }
    }

    /// Sets the delivery priority.
    #[must_use]
    pub const fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Forces delivery on the publishing thread.
    #[must_use]
    pub const fn synchronous(mut self) -> Self {
        self.asynchronous = false;
        self
    }

    /// The declared event type.
    #[must_use]
    pub const fn event_type(&self) -> &EventType {
        &self.event_type
    }
}

impl ApplicationListener for FnListener {
    fn on_application_event(&self, event: &dyn ApplicationEvent) -> Result<()> {
        (self.handler)(event)
    }

    fn supports_event_type(&self, event_type: &EventType) -> bool {
        event_type.is_assignable_to(&self.event_type)
    }

    fn order(&self) -> i32 {
        self.order
    }

    fn supports_async_execution(&self) -> bool {
        self.asynchronous
    }

    fn listener_name(&self) -> String {
        self.name.clone()
    }
}

/// Looks named listener beans up.
pub trait ListenerBeanResolver: Send + Sync {
    /// Resolves a listener bean; `Ok(None)` if no bean has that name.
    ///
    /// # Errors
    ///
    /// Returns an error if the bean exists but cannot be produced.
    fn resolve_listener(&self, bean_name: &str) -> Result<Option<Arc<dyn ApplicationListener>>>;

    /// Whether the bean is a singleton and may be cached.
    fn is_singleton(&self, bean_name: &str) -> bool;
}

/// Factory producing a listener bean instance.
pub type ListenerFactory = Arc<dyn Fn() -> Result<Arc<dyn ApplicationListener>> + Send + Sync>;

struct ListenerBean {
    factory: ListenerFactory,
    singleton: bool,
    instance: Mutex<Option<Arc<dyn ApplicationListener>>>,
}

/// Table of named listener factories.
///
/// Singletons are created once and shared; other beans are created on every
/// resolution.
#[derive(Default)]
pub struct ListenerBeanTable {
    beans: RwLock<HashMap<String, Arc<ListenerBean>>>,
}

impl fmt::Debug for ListenerBeanTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerBeanTable")
            .field("beans", &self.beans.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ListenerBeanTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a named listener factory, replacing any previous one.
    pub fn register(&self, bean_name: impl Into<String>, singleton: bool, factory: ListenerFactory) {
        let bean = Arc::new(ListenerBean {
            factory,
            singleton,
            instance: Mutex::new(None),
        });
        let _ = self.beans.write().insert(bean_name.into(), bean);
    }

    /// Removes a named listener factory.
    pub fn remove(&self, bean_name: &str) -> bool {
        self.beans.write().remove(bean_name).is_some()
    }

    /// Returns `true` if a factory is registered under the name.
    #[must_use]
    pub fn contains(&self, bean_name: &str) -> bool {
        self.beans.read().contains_key(bean_name)
    }
}

impl ListenerBeanResolver for ListenerBeanTable {
    fn resolve_listener(&self, bean_name: &str) -> Result<Option<Arc<dyn ApplicationListener>>> {
        let Some(bean) = self.beans.read().get(bean_name).cloned() else {
            return Ok(None);
        };
        if !bean.singleton {
            return (bean.factory)().map(Some);
        }
        let mut instance = bean.instance.lock();
        if let Some(existing) = instance.as_ref() {
            return Ok(Some(Arc::clone(existing)));
        }
        let created = (bean.factory)()?;
        *instance = Some(Arc::clone(&created));
        Ok(Some(created))
    }

    fn is_singleton(&self, bean_name: &str) -> bool {
        self.beans
            .read()
            .get(bean_name)
            .is_some_and(|bean| bean.singleton)
    }
}
