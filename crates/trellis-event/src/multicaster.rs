//! Listener registration and event dispatch.
//!
//! Registration state (listener instances and listener bean names) lives
//! behind one mutex. Matching listeners are cached per (event type, source
//! type) in a concurrent map that is read without taking that mutex; every
//! registration change clears the whole cache.

use std::fmt;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use indexmap::IndexSet;
use parking_lot::{Mutex, RwLock};
use trellis_common::error::{Result, TrellisError};

use crate::event::{ApplicationEvent, EventType};
use crate::executor::{ErrorHandler, TaskExecutor};
use crate::listener::{ApplicationListener, ListenerBeanResolver};
use crate::startup::ApplicationStartup;

type ListenerRef = Arc<dyn ApplicationListener>;

/// Step name recorded around every listener invocation.
pub const INVOKE_LISTENER_STEP: &str = "trellis.event.invoke-listener";

fn same_listener(a: &ListenerRef, b: &ListenerRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

#[derive(Default)]
struct Registrations {
    listeners: Vec<ListenerRef>,
    listener_beans: IndexSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    event_type: EventType,
    source_type: Option<String>,
}

/// Cached filtered view; singletons are kept as instances, other listener
/// beans by name so they are re-resolved on each dispatch.
#[derive(Default)]
struct CachedRetriever {
    resolved: OnceLock<(Vec<ListenerRef>, Vec<String>)>,
}

/// Delivers events to registered listeners.
pub struct SimpleApplicationEventMulticaster {
    registrations: Mutex<Registrations>,
    cache: DashMap<CacheKey, Arc<CachedRetriever>>,
    bean_resolver: RwLock<Option<Arc<dyn ListenerBeanResolver>>>,
    executor: Option<Arc<dyn TaskExecutor>>,
    error_handler: Option<Arc<dyn ErrorHandler>>,
    startup: Option<Arc<dyn ApplicationStartup>>,
}

impl fmt::Debug for SimpleApplicationEventMulticaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registrations = self.registrations.lock();
        f.debug_struct("SimpleApplicationEventMulticaster")
            .field("listeners", &registrations.listeners.len())
            .field("listener_beans", &registrations.listener_beans)
            .field("cached_keys", &self.cache.len())
            .field("executor", &self.executor.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for SimpleApplicationEventMulticaster {
    fn default() -> Self {
        Self::new()
    }
}

impl SimpleApplicationEventMulticaster {
    /// Creates a multicaster dispatching on the publishing thread.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registrations: Mutex::new(Registrations::default()),
            cache: DashMap::new(),
            bean_resolver: RwLock::new(None),
            executor: None,
            error_handler: None,
            startup: None,
        }
    }

    /// Dispatches listeners that allow it through `executor`.
    #[must_use]
    pub fn with_task_executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Routes listener failures to `handler` instead of propagating them.
    #[must_use]
    pub fn with_error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = Some(handler);
        self
    }

    /// Records a startup step around every listener invocation.
    #[must_use]
    pub fn with_startup(mut self, startup: Arc<dyn ApplicationStartup>) -> Self {
        self.startup = Some(startup);
        self
    }

    /// Sets the resolver used for listener bean names.
    pub fn set_listener_bean_resolver(&self, resolver: Arc<dyn ListenerBeanResolver>) {
        let _guard = self.registrations.lock();
        *self.bean_resolver.write() = Some(resolver);
        self.cache.clear();
    }

    /// Adds a listener instance. Adding the same instance twice is a no-op.
    pub fn add_application_listener(&self, listener: ListenerRef) {
        let mut registrations = self.registrations.lock();
        if !registrations
            .listeners
            .iter()
            .any(|existing| same_listener(existing, &listener))
        {
            registrations.listeners.push(listener);
        }
        self.cache.clear();
    }

    /// Adds a listener by bean name.
    pub fn add_application_listener_bean(&self, bean_name: impl Into<String>) {
        let mut registrations = self.registrations.lock();
        let _ = registrations.listener_beans.insert(bean_name.into());
        self.cache.clear();
    }

    /// Removes a listener instance.
    pub fn remove_application_listener(&self, listener: &ListenerRef) {
        let mut registrations = self.registrations.lock();
        registrations
            .listeners
            .retain(|existing| !same_listener(existing, listener));
        self.cache.clear();
    }

    /// Removes a listener bean name.
    pub fn remove_application_listener_bean(&self, bean_name: &str) {
        let mut registrations = self.registrations.lock();
        let _ = registrations.listener_beans.shift_remove(bean_name);
        self.cache.clear();
    }

    /// Removes every listener instance and bean name.
    pub fn remove_all_listeners(&self) {
        let mut registrations = self.registrations.lock();
        registrations.listeners.clear();
        registrations.listener_beans.clear();
        self.cache.clear();
    }

    /// Number of cached (event type, source type) entries.
    #[must_use]
    pub fn cached_entry_count(&self) -> usize {
        self.cache.len()
    }

    /// Listeners that would receive `event`, in delivery order.
    ///
    /// # Errors
    ///
    /// Returns an error if a listener bean cannot be resolved.
    pub fn application_listeners(
        &self,
        event: &dyn ApplicationEvent,
        event_type: &EventType,
    ) -> Result<Vec<ListenerRef>> {
        let source_type = event.source_type().map(str::to_string);
        let key = CacheKey {
            event_type: event_type.clone(),
            source_type: source_type.clone(),
        };

        let existing = self.cache.get(&key).map(|entry| Arc::clone(entry.value()));
        let (existing, fresh) = match existing {
            Some(existing) => (Some(existing), None),
            None => match self.cache.entry(key) {
                Entry::Occupied(occupied) => (Some(Arc::clone(occupied.get())), None),
                Entry::Vacant(vacant) => {
                    let retriever = Arc::new(CachedRetriever::default());
                    let _ = vacant.insert(Arc::clone(&retriever));
                    (None, Some(retriever))
                }
            },
        };

        if let Some(existing) = existing {
            if let Some((instances, bean_names)) = existing.resolved.get() {
                tracing::trace!(event_type = %event_type, "listener cache hit");
                return self.materialize(instances, bean_names);
            }
        }
        self.retrieve(event_type, source_type.as_deref(), fresh.as_deref())
    }

    fn resolver(&self) -> Result<Arc<dyn ListenerBeanResolver>> {
        self.bean_resolver.read().clone().ok_or_else(|| {
            TrellisError::config("listener beans are registered but no listener bean resolver is set")
        })
    }

    fn materialize(&self, instances: &[ListenerRef], bean_names: &[String]) -> Result<Vec<ListenerRef>> {
        let mut all = instances.to_vec();
        if bean_names.is_empty() {
            return Ok(all);
        }
        let resolver = self.resolver()?;
        for name in bean_names {
            if let Some(listener) = resolver.resolve_listener(name)? {
                all.push(listener);
            }
        }
        all.sort_by_key(|listener| listener.order());
        Ok(all)
    }

    fn retrieve(
        &self,
        event_type: &EventType,
        source_type: Option<&str>,
        retriever: Option<&CachedRetriever>,
    ) -> Result<Vec<ListenerRef>> {
        let (listeners, listener_beans) = {
            let registrations = self.registrations.lock();
            (
                registrations.listeners.clone(),
                registrations.listener_beans.clone(),
            )
        };

        let supports = |listener: &ListenerRef| {
            listener.supports_event_type(event_type) && listener.supports_source_type(source_type)
        };

        let mut all: Vec<ListenerRef> = listeners.into_iter().filter(|l| supports(l)).collect();
        let mut cached_instances = all.clone();
        let mut cached_beans = Vec::new();

        if !listener_beans.is_empty() {
            let resolver = self.resolver()?;
            for name in &listener_beans {
                let Some(listener) = resolver.resolve_listener(name)? else {
                    tracing::trace!(bean = %name, "listener bean disappeared");
                    continue;
                };
                if all.iter().any(|existing| same_listener(existing, &listener)) || !supports(&listener) {
                    continue;
                }
                if resolver.is_singleton(name) {
                    cached_instances.push(Arc::clone(&listener));
                } else {
                    cached_beans.push(name.clone());
                }
                all.push(listener);
            }
        }

        all.sort_by_key(|listener| listener.order());
        if let Some(retriever) = retriever {
            let entry = if cached_beans.is_empty() {
                (all.clone(), cached_beans)
            } else {
                cached_instances.sort_by_key(|listener| listener.order());
                (cached_instances, cached_beans)
            };
            let _ = retriever.resolved.set(entry);
        }
        Ok(all)
    }

    /// Delivers an event to every matching listener.
    ///
    /// With no executor, listeners run in order on the calling thread and the
    /// first failure aborts the multicast unless an error handler is set.
    /// Listeners that allow it are handed to the executor when one is set;
    /// a rejected task runs on the calling thread instead.
    ///
    /// # Errors
    ///
    /// Returns the first synchronous listener failure when no error handler
    /// is set, or an error if listener beans cannot be resolved.
    pub fn multicast_event(
        &self,
        event: Arc<dyn ApplicationEvent>,
        event_type: Option<&EventType>,
    ) -> Result<()> {
        let resolved_type = event_type.cloned().unwrap_or_else(|| event.event_type());
        let listeners = self.application_listeners(event.as_ref(), &resolved_type)?;
        tracing::debug!(
            event_type = %resolved_type,
            listeners = listeners.len(),
            "multicasting event"
        );

        for listener in listeners {
            let invocation = Invocation {
                listener,
                event: Arc::clone(&event),
                event_type: resolved_type.clone(),
                error_handler: self.error_handler.clone(),
                startup: self.startup.clone(),
            };
            match &self.executor {
                Some(executor) if invocation.listener.supports_async_execution() => {
                    let task = Box::new(move || {
                        if let Err(err) = invocation.run() {
                            tracing::error!(error = %err, "asynchronous listener failed");
                        }
                    });
                    if let Err(rejected) = executor.execute(task) {
                        tracing::debug!("task executor rejected listener, invoking locally");
                        rejected();
                    }
                }
                _ => invocation.run()?,
            }
        }
        Ok(())
    }
}

struct Invocation {
    listener: ListenerRef,
    event: Arc<dyn ApplicationEvent>,
    event_type: EventType,
    error_handler: Option<Arc<dyn ErrorHandler>>,
    startup: Option<Arc<dyn ApplicationStartup>>,
}

impl Invocation {
    fn run(self) -> Result<()> {
        let result = match &self.startup {
            Some(startup) => {
                let mut step = startup.start(INVOKE_LISTENER_STEP);
                step.tag("event", format!("{:?}", self.event));
                step.tag("eventType", self.event_type.to_string());
                step.tag("listener", self.listener.listener_name());
                let result = self.listener.on_application_event(self.event.as_ref());
                step.end();
                result
            }
            None => self.listener.on_application_event(self.event.as_ref()),
        };
        match (result, &self.error_handler) {
            (Err(err), Some(handler)) => {
                handler.handle_error(&err);
                Ok(())
            }
            (result, _) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::event::{ContextEvent, ContextEventKind, PayloadApplicationEvent};
    use crate::listener::{FnListener, ListenerBeanTable};

    fn recording(name: &str, event_type: EventType, log: &Arc<Mutex<Vec<String>>>) -> ListenerRef {
        let log = Arc::clone(log);
        let label = name.to_string();
        Arc::new(FnListener::new(name, event_type, move |_| {
            log.lock().push(label.clone());
            Ok(())
        }))
    }

    fn refreshed() -> Arc<dyn ApplicationEvent> {
        Arc::new(ContextEvent::new(ContextEventKind::Refreshed, "test"))
    }

    #[test]
    fn listeners_filtered_by_type_and_sorted_by_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let multicaster = SimpleApplicationEventMulticaster::new();
        multicaster.add_application_listener(recording("late", EventType::context_event(), &log));
        multicaster.add_application_listener(Arc::new(
            FnListener::new("early", EventType::context_refreshed(), {
                let log = Arc::clone(&log);
                move |_| {
                    log.lock().push("early".into());
                    Ok(())
                }
            })
            .with_order(-10),
        ));
        multicaster.add_application_listener(recording("closed", EventType::context_closed(), &log));

        multicaster.multicast_event(refreshed(), None).unwrap();
        assert_eq!(*log.lock(), vec!["early", "late"]);
    }

    #[test]
    fn adding_listener_invalidates_cache() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let multicaster = SimpleApplicationEventMulticaster::new();
        multicaster.add_application_listener(recording("first", EventType::root(), &log));
        multicaster.multicast_event(refreshed(), None).unwrap();
        assert_eq!(multicaster.cached_entry_count(), 1);

        multicaster.add_application_listener(recording("second", EventType::context_refreshed(), &log));
        assert_eq!(multicaster.cached_entry_count(), 0);
        multicaster.multicast_event(refreshed(), None).unwrap();
        assert_eq!(*log.lock(), vec!["first", "first", "second"]);
    }

    #[test]
    fn removal_and_duplicate_registration() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let multicaster = SimpleApplicationEventMulticaster::new();
        let listener = recording("only", EventType::root(), &log);
        multicaster.add_application_listener(Arc::clone(&listener));
        multicaster.add_application_listener(Arc::clone(&listener));
        multicaster.multicast_event(refreshed(), None).unwrap();
        multicaster.remove_application_listener(&listener);
        multicaster.multicast_event(refreshed(), None).unwrap();
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn explicit_event_type_overrides_resolved_type() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let multicaster = SimpleApplicationEventMulticaster::new();
        multicaster.add_application_listener(recording("closed", EventType::context_closed(), &log));
        multicaster
            .multicast_event(refreshed(), Some(&EventType::context_closed()))
            .unwrap();
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn listener_beans_require_resolver() {
        let multicaster = SimpleApplicationEventMulticaster::new();
        multicaster.add_application_listener_bean("audit");
        assert!(multicaster.multicast_event(refreshed(), None).is_err());
    }

    #[test]
    fn prototype_listener_beans_are_resolved_per_dispatch() {
        let created = Arc::new(AtomicUsize::new(0));
        let log = Arc::new(Mutex::new(Vec::new()));
        let table = Arc::new(ListenerBeanTable::new());
        let counter = Arc::clone(&created);
        let sink = Arc::clone(&log);
        table.register(
            "audit",
            false,
            Arc::new(move || {
                let _ = counter.fetch_add(1, Ordering::SeqCst);
                Ok(recording("audit", EventType::root(), &sink))
            }),
        );

        let multicaster = SimpleApplicationEventMulticaster::new();
        multicaster.set_listener_bean_resolver(table);
        multicaster.add_application_listener_bean("audit");
        multicaster.multicast_event(refreshed(), None).unwrap();
        multicaster.multicast_event(refreshed(), None).unwrap();

        assert_eq!(log.lock().len(), 2);
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failures_propagate_unless_handled() {
        let failing: ListenerRef = Arc::new(FnListener::new("boom", EventType::root(), |event| {
            Err(TrellisError::Listener {
                listener: "boom".into(),
                event_type: event.event_type().to_string(),
                message: "refused".into(),
            })
        }));
        let plain = SimpleApplicationEventMulticaster::new();
        plain.add_application_listener(Arc::clone(&failing));
        assert!(plain.multicast_event(refreshed(), None).is_err());

        let handled = SimpleApplicationEventMulticaster::new()
            .with_error_handler(Arc::new(crate::executor::LoggingErrorHandler));
        handled.add_application_listener(failing);
        assert!(handled.multicast_event(refreshed(), None).is_ok());
    }

    #[test]
    fn invocations_are_instrumented() {
        let startup = crate::startup::BufferingApplicationStartup::new(8);
        let multicaster =
            SimpleApplicationEventMulticaster::new().with_startup(Arc::new(startup.clone()));
        let log = Arc::new(Mutex::new(Vec::new()));
        multicaster.add_application_listener(recording("l", EventType::payload(), &log));
        multicaster
            .multicast_event(Arc::new(PayloadApplicationEvent::new("hi".to_string())), None)
            .unwrap();
        let steps = startup.steps();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].name, INVOKE_LISTENER_STEP);
        assert!(steps[0].tags.iter().any(|(k, v)| k == "listener" && v == "l"));
    }
}
