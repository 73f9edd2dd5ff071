//! Startup instrumentation.
//!
//! A step marks one phase of container bootstrap (parsing configuration
//! classes, invoking a listener). Steps nest: a step started while another
//! is open records it as its parent.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// One instrumented phase.
pub trait StartupStep: Send {
    /// Step name, e.g. `trellis.context.refresh`.
    fn name(&self) -> &str;

    /// Unique id within its startup.
    fn id(&self) -> u64;

    /// Id of the enclosing step, if any.
    fn parent_id(&self) -> Option<u64>;

    /// Attaches a key/value tag.
    fn tag(&mut self, key: &str, value: String);

    /// Ends the step.
    fn end(self: Box<Self>);
}

/// Creates startup steps.
pub trait ApplicationStartup: Send + Sync {
    /// Starts a new step.
    fn start(&self, name: &str) -> Box<dyn StartupStep>;
}

#[derive(Debug)]
struct NoopStep {
    name: String,
}

impl StartupStep for NoopStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> u64 {
        0
    }

    fn parent_id(&self) -> Option<u64> {
        None
    }

    fn tag(&mut self, _key: &str, _value: String) {}

    fn end(self: Box<Self>) {}
}

/// Records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultApplicationStartup;

impl ApplicationStartup for DefaultApplicationStartup {
    fn start(&self, name: &str) -> Box<dyn StartupStep> {
        Box::new(NoopStep { name: name.into() })
    }
}

/// Emits each step as a `tracing` span.
#[derive(Debug, Default)]
pub struct TracingApplicationStartup {
    next_id: AtomicU64,
}

impl TracingApplicationStartup {
    /// Creates a startup with ids starting at 1.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
        }
    }
}

struct TracingStep {
    id: u64,
    name: String,
    span: tracing::Span,
    started: DateTime<Utc>,
}

impl StartupStep for TracingStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> u64 {
        self.id
    }

    fn parent_id(&self) -> Option<u64> {
        None
    }

    fn tag(&mut self, key: &str, value: String) {
        self.span.in_scope(|| tracing::debug!(tag = key, value = %value, "startup step tag"));
    }

    fn end(self: Box<Self>) {
        let elapsed_ms = (Utc::now() - self.started).num_milliseconds();
        self.span
            .in_scope(|| tracing::debug!(elapsed_ms, "startup step ended"));
    }
}

impl ApplicationStartup for TracingApplicationStartup {
    fn start(&self, name: &str) -> Box<dyn StartupStep> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let span = tracing::debug_span!("startup_step", step = %name, id);
        Box::new(TracingStep {
            id,
            name: name.into(),
            span,
            started: Utc::now(),
        })
    }
}

/// A finished or still-open step captured by [`BufferingApplicationStartup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    /// Step id.
    pub id: u64,
    /// Enclosing step id.
    pub parent_id: Option<u64>,
    /// Step name.
    pub name: String,
    /// Tags in insertion order.
    pub tags: Vec<(String, String)>,
    /// Start time.
    pub started: DateTime<Utc>,
    /// End time, once ended.
    pub ended: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Buffer {
    next_id: u64,
    open: Vec<u64>,
    records: Vec<StepRecord>,
}

/// Keeps step records in memory, up to a capacity.
#[derive(Clone)]
pub struct BufferingApplicationStartup {
    capacity: usize,
    buffer: Arc<Mutex<Buffer>>,
}

impl fmt::Debug for BufferingApplicationStartup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferingApplicationStartup")
            .field("capacity", &self.capacity)
            .field("recorded", &self.buffer.lock().records.len())
            .finish()
    }
}

impl BufferingApplicationStartup {
    /// Creates a buffer keeping at most `capacity` records.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buffer: Arc::new(Mutex::new(Buffer::default())),
        }
    }

    /// Snapshot of the recorded steps in start order.
    #[must_use]
    pub fn steps(&self) -> Vec<StepRecord> {
        self.buffer.lock().records.clone()
    }

    /// Removes and returns the ended steps.
    pub fn drain_ended(&self) -> Vec<StepRecord> {
        let mut buffer = self.buffer.lock();
        let (ended, open): (Vec<_>, Vec<_>) = buffer
            .records
            .drain(..)
            .partition(|record| record.ended.is_some());
        buffer.records = open;
        ended
    }
}

struct BufferedStep {
    id: u64,
    parent_id: Option<u64>,
    name: String,
    buffer: Arc<Mutex<Buffer>>,
}

impl BufferedStep {
    fn update(&self, apply: impl FnOnce(&mut StepRecord)) {
        let mut buffer = self.buffer.lock();
        if let Some(record) = buffer.records.iter_mut().find(|r| r.id == self.id) {
            apply(record);
        }
    }
}

impl StartupStep for BufferedStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> u64 {
        self.id
    }

    fn parent_id(&self) -> Option<u64> {
        self.parent_id
    }

    fn tag(&mut self, key: &str, value: String) {
        self.update(|record| record.tags.push((key.to_string(), value)));
    }

    fn end(self: Box<Self>) {
        self.update(|record| record.ended = Some(Utc::now()));
        self.buffer.lock().open.retain(|id| *id != self.id);
    }
}

impl ApplicationStartup for BufferingApplicationStartup {
    fn start(&self, name: &str) -> Box<dyn StartupStep> {
        let mut buffer = self.buffer.lock();
        buffer.next_id += 1;
        let id = buffer.next_id;
        let parent_id = buffer.open.last().copied();
        buffer.open.push(id);
        if buffer.records.len() < self.capacity {
            buffer.records.push(StepRecord {
                id,
                parent_id,
                name: name.to_string(),
                tags: Vec::new(),
                started: Utc::now(),
                ended: None,
            });
        } else {
            tracing::trace!(step = name, "startup buffer full, step not recorded");
        }
        Box::new(BufferedStep {
            id,
            parent_id,
            name: name.to_string(),
            buffer: Arc::clone(&self.buffer),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffered_steps_nest_and_carry_tags() {
        let startup = BufferingApplicationStartup::new(16);
        let outer = startup.start("outer");
        let mut inner = startup.start("inner");
        inner.tag("classCount", "3".into());
        assert_eq!(inner.parent_id(), Some(outer.id()));
        inner.end();
        outer.end();

        let steps = startup.steps();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].name, "inner");
        assert_eq!(steps[1].parent_id, Some(steps[0].id));
        assert_eq!(steps[1].tags, vec![("classCount".to_string(), "3".to_string())]);
        assert!(steps.iter().all(|s| s.ended.is_some()));
    }

    #[test]
    fn buffer_respects_capacity_and_drains_ended() {
        let startup = BufferingApplicationStartup::new(1);
        startup.start("kept").end();
        let open = startup.start("dropped");
        assert_eq!(startup.steps().len(), 1);
        assert_eq!(startup.drain_ended().len(), 1);
        assert!(startup.steps().is_empty());
        open.end();
    }

    #[test]
    fn default_and_tracing_steps_are_usable() {
        let mut step = DefaultApplicationStartup.start("noop");
        step.tag("k", "v".into());
        assert_eq!(step.name(), "noop");
        step.end();

        let tracing_startup = TracingApplicationStartup::new();
        let first = tracing_startup.start("a");
        let second = tracing_startup.start("b");
        assert_eq!(first.id() + 1, second.id());
        first.end();
        second.end();
    }
}
