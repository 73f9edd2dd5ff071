//! Buffering and grouping of deferred import selectors.
//!
//! Deferred selectors found while parsing a batch are buffered, sorted once
//! by priority, and split into groupings. A grouping is keyed by the group
//! name its selectors declare, or by the selector itself when none is
//! declared. Groupings are processed in first-seen order and each keeps the
//! sorted order of its selectors.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;
use trellis_common::error::Result;
use trellis_core::metadata::ClassMetadata;
use trellis_core::order::{resolve_order, sort_by_order};

use crate::configuration_class::ConfigurationClass;
use crate::context::ContainerContext;
use crate::imports::{
    DefaultDeferredImportGroup, DeferredImportGroup, DeferredImportSelector, ExclusionFilter,
    GroupEntry,
};

/// One deferred selector and the configuration class that imported it.
#[derive(Clone)]
pub struct DeferredImportSelectorHolder {
    configuration_class: Rc<RefCell<ConfigurationClass>>,
    selector_class: String,
    selector: Rc<dyn DeferredImportSelector>,
}

impl fmt::Debug for DeferredImportSelectorHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredImportSelectorHolder")
            .field("configuration_class", &self.configuration_class.borrow().name())
            .field("selector_class", &self.selector_class)
            .finish_non_exhaustive()
    }
}

impl DeferredImportSelectorHolder {
    /// Pairs a selector with its importing configuration class.
    #[must_use]
    pub fn new(
        configuration_class: Rc<RefCell<ConfigurationClass>>,
        selector_class: impl Into<String>,
        selector: Rc<dyn DeferredImportSelector>,
    ) -> Self {
        Self {
            configuration_class,
            selector_class: selector_class.into(),
            selector,
        }
    }

    fn metadata(&self) -> Arc<ClassMetadata> {
        Arc::clone(self.configuration_class.borrow().metadata())
    }
}

/// Sorts holders by selector priority. Equal priorities keep registration order.
///
/// A selector's own order wins over an `@Order` on its class.
pub fn sort_holders(holders: &mut Vec<DeferredImportSelectorHolder>, context: &ContainerContext) {
    let source = context.metadata_source();
    let mut keyed: Vec<(i32, DeferredImportSelectorHolder)> = holders
        .drain(..)
        .map(|holder| {
            let declared = source.read(&holder.selector_class).ok();
            let order = resolve_order(holder.selector.order(), declared.as_deref());
            (order, holder)
        })
        .collect();
    sort_by_order(&mut keyed, |(order, _)| *order);
    holders.extend(keyed.into_iter().map(|(_, holder)| holder));
}

/// Collects deferred selectors until the batch is parsed.
#[derive(Debug)]
pub struct DeferredImportSelectorHandler {
    pending: Option<Vec<DeferredImportSelectorHolder>>,
}

impl Default for DeferredImportSelectorHandler {
    fn default() -> Self {
        Self {
            pending: Some(Vec::new()),
        }
    }
}

impl DeferredImportSelectorHandler {
    /// Creates a handler that buffers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers a holder. While the deferred pass runs nothing is buffered and
    /// the holder is handed back for immediate processing.
    pub fn handle(
        &mut self,
        holder: DeferredImportSelectorHolder,
    ) -> Option<DeferredImportSelectorHolder> {
        match &mut self.pending {
            Some(pending) => {
                pending.push(holder);
                None
            }
            None => Some(holder),
        }
    }

    /// Takes every buffered holder and marks the deferred pass as running.
    pub fn begin(&mut self) -> Vec<DeferredImportSelectorHolder> {
        self.pending.take().unwrap_or_default()
    }

    /// Ends the deferred pass; later selectors are buffered again.
    pub fn finish(&mut self) {
        self.pending = Some(Vec::new());
    }

    /// Returns `true` while the deferred pass runs.
    #[must_use]
    pub const fn is_processing(&self) -> bool {
        self.pending.is_none()
    }

    /// Number of buffered holders.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.as_ref().map_or(0, Vec::len)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum GroupKey {
    Declared(String),
    Selector(usize),
}

/// The selectors sharing one group, and the group folding their imports.
pub struct DeferredImportSelectorGrouping {
    group: Box<dyn DeferredImportGroup>,
    holders: Vec<DeferredImportSelectorHolder>,
}

impl fmt::Debug for DeferredImportSelectorGrouping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredImportSelectorGrouping")
            .field("holders", &self.holders)
            .finish_non_exhaustive()
    }
}

impl DeferredImportSelectorGrouping {
    fn new(group: Box<dyn DeferredImportGroup>) -> Self {
        Self {
            group,
            holders: Vec::new(),
        }
    }

    fn add(&mut self, holder: DeferredImportSelectorHolder) {
        self.holders.push(holder);
    }

    /// Selectors of this grouping, in processing order.
    #[must_use]
    pub fn holders(&self) -> &[DeferredImportSelectorHolder] {
        &self.holders
    }

    /// The default filter combined with every selector's own filter.
    #[must_use]
    pub fn candidate_filter(&self) -> ExclusionFilter {
        self.holders
            .iter()
            .filter_map(|holder| holder.selector.exclusion_filter())
            .fold(ExclusionFilter::default_filter(), |merged, filter| {
                merged.or(&filter)
            })
    }

    /// Feeds every selector to the group and returns its final imports.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a selector or the group.
    pub fn imports(&mut self) -> Result<Vec<GroupEntry>> {
        for holder in &self.holders {
            let metadata = holder.metadata();
            self.group.process(&metadata, holder.selector.as_ref())?;
        }
        self.group.select_imports()
    }
}

/// Splits sorted holders into groupings.
#[derive(Debug, Default)]
pub struct DeferredImportSelectorGroupingHandler {
    groupings: IndexMap<GroupKey, DeferredImportSelectorGrouping>,
    configuration_classes: HashMap<String, Rc<RefCell<ConfigurationClass>>>,
    anonymous_groups: usize,
}

impl DeferredImportSelectorGroupingHandler {
    /// Creates a handler without groupings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a holder to the grouping of its declared group, creating the
    /// group on first use.
    ///
    /// # Errors
    ///
    /// Returns a plugin error if a declared group has no factory.
    pub fn register(
        &mut self,
        holder: DeferredImportSelectorHolder,
        context: &ContainerContext,
    ) -> Result<()> {
        let key = match holder.selector.import_group() {
            Some(name) => GroupKey::Declared(name),
            None => {
                self.anonymous_groups += 1;
                GroupKey::Selector(self.anonymous_groups)
            }
        };
        if !self.groupings.contains_key(&key) {
            let group: Box<dyn DeferredImportGroup> = match &key {
                GroupKey::Declared(name) => context.plugins().import_group(name, context)?,
                GroupKey::Selector(_) => Box::new(DefaultDeferredImportGroup::new()),
            };
            tracing::debug!(group = ?key, selector = %holder.selector_class, "deferred import group created");
            let _ = self
                .groupings
                .insert(key.clone(), DeferredImportSelectorGrouping::new(group));
        }

        let metadata = holder.metadata();
        let _ = self
            .configuration_classes
            .insert(metadata.name.clone(), Rc::clone(&holder.configuration_class));
        if let Some(grouping) = self.groupings.get_mut(&key) {
            grouping.add(holder);
        }
        Ok(())
    }

    /// Number of groupings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groupings.len()
    }

    /// Returns `true` if nothing was registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groupings.is_empty()
    }

    /// Groupings in creation order, plus the importing configuration
    /// classes keyed by class name.
    #[must_use]
    pub fn into_parts(
        self,
    ) -> (
        Vec<DeferredImportSelectorGrouping>,
        HashMap<String, Rc<RefCell<ConfigurationClass>>>,
    ) {
        (
            self.groupings.into_values().collect(),
            self.configuration_classes,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use trellis_core::registry::SimpleBeanDefinitionRegistry;

    use super::*;
    use crate::imports::ImportSelector;
    use crate::plugin::PluginRegistry;

    struct Selector {
        imports: Vec<&'static str>,
        group: Option<&'static str>,
        order: Option<i32>,
        excluded: Option<&'static str>,
    }

    impl Selector {
        fn new(imports: &[&'static str]) -> Self {
            Self {
                imports: imports.to_vec(),
                group: None,
                order: None,
                excluded: None,
            }
        }
    }

    impl ImportSelector for Selector {
        fn select_imports(&self, _importing: &ClassMetadata) -> Result<Vec<String>> {
            Ok(self.imports.iter().map(ToString::to_string).collect())
        }

        fn exclusion_filter(&self) -> Option<ExclusionFilter> {
            self.excluded
                .map(|excluded| ExclusionFilter::new(move |name| name == excluded))
        }
    }

    impl DeferredImportSelector for Selector {
        fn import_group(&self) -> Option<String> {
            self.group.map(ToString::to_string)
        }

        fn order(&self) -> Option<i32> {
            self.order
        }
    }

    fn context(plugins: PluginRegistry) -> ContainerContext {
        let index = trellis_descriptor::index_from_sources([(
            "a.tcd",
            "package com.a\n@Order(1) class Early {}\nclass Late {}\n",
        )])
        .unwrap();
        ContainerContext::new(
            SimpleBeanDefinitionRegistry::new().into_shared(),
            Rc::new(index),
        )
        .with_plugins(plugins)
    }

    fn holder(class: &str, selector_class: &str, selector: Selector) -> DeferredImportSelectorHolder {
        let metadata = Arc::new(ClassMetadata::new(class));
        DeferredImportSelectorHolder::new(
            Rc::new(RefCell::new(ConfigurationClass::new(metadata, None))),
            selector_class,
            Rc::new(selector),
        )
    }

    #[test]
    fn handler_buffers_until_processing_starts() {
        let mut handler = DeferredImportSelectorHandler::new();
        assert!(handler.handle(holder("com.a.A", "com.a.S", Selector::new(&[]))).is_none());
        assert_eq!(handler.pending(), 1);

        let taken = handler.begin();
        assert_eq!(taken.len(), 1);
        assert!(handler.is_processing());
        assert!(handler.handle(holder("com.a.B", "com.a.S", Selector::new(&[]))).is_some());

        handler.finish();
        assert!(!handler.is_processing());
        assert_eq!(handler.pending(), 0);
    }

    #[test]
    fn sorting_prefers_explicit_then_annotated_order() {
        let context = context(PluginRegistry::empty());
        let mut explicit = Selector::new(&[]);
        explicit.order = Some(0);
        let mut holders = vec![
            holder("com.a.One", "com.a.Late", Selector::new(&[])),
            holder("com.a.Two", "com.a.Early", Selector::new(&[])),
            holder("com.a.Three", "com.a.Unknown", explicit),
        ];
        sort_holders(&mut holders, &context);
        let order: Vec<_> = holders
            .iter()
            .map(|h| h.configuration_class.borrow().name().to_string())
            .collect();
        assert_eq!(order, vec!["com.a.Three", "com.a.Two", "com.a.One"]);
    }

    struct CountingGroup {
        processed: Rc<Cell<usize>>,
        inner: DefaultDeferredImportGroup,
    }

    impl DeferredImportGroup for CountingGroup {
        fn process(
            &mut self,
            metadata: &Arc<ClassMetadata>,
            selector: &dyn DeferredImportSelector,
        ) -> Result<()> {
            self.processed.set(self.processed.get() + 1);
            self.inner.process(metadata, selector)
        }

        fn select_imports(&mut self) -> Result<Vec<GroupEntry>> {
            self.inner.select_imports()
        }
    }

    #[test]
    fn declared_groups_share_one_group_instance() {
        let processed = Rc::new(Cell::new(0));
        let counter = Rc::clone(&processed);
        let mut plugins = PluginRegistry::empty();
        plugins.register_import_group("shared", move |_| {
            Ok(Box::new(CountingGroup {
                processed: Rc::clone(&counter),
                inner: DefaultDeferredImportGroup::new(),
            }) as Box<dyn DeferredImportGroup>)
        });
        let context = context(plugins);

        let mut first = Selector::new(&["com.a.X", "com.a.Y"]);
        first.group = Some("shared");
        first.excluded = Some("com.a.Hidden");
        let mut second = Selector::new(&["com.a.Y", "com.a.Z"]);
        second.group = Some("shared");

        let mut handler = DeferredImportSelectorGroupingHandler::new();
        handler.register(holder("com.a.A", "com.a.S1", first), &context).unwrap();
        handler.register(holder("com.a.B", "com.a.S2", Selector::new(&["com.a.W"])), &context).unwrap();
        handler.register(holder("com.a.C", "com.a.S3", second), &context).unwrap();
        assert_eq!(handler.len(), 2);

        let (mut groupings, classes) = handler.into_parts();
        assert_eq!(classes.len(), 3);
        let shared = &mut groupings[0];
        assert!(shared.candidate_filter().matches("com.a.Hidden"));
        assert!(shared.candidate_filter().matches("trellis.stereotype.Component"));
        assert!(!shared.candidate_filter().matches("com.a.X"));

        let imports: Vec<_> = shared
            .imports()
            .unwrap()
            .into_iter()
            .map(|entry| (entry.metadata.name.clone(), entry.import_class_name))
            .collect();
        assert_eq!(
            imports,
            vec![
                ("com.a.A".to_string(), "com.a.X".to_string()),
                ("com.a.A".to_string(), "com.a.Y".to_string()),
                ("com.a.C".to_string(), "com.a.Z".to_string()),
            ]
        );
        assert_eq!(processed.get(), 2);
    }

    #[test]
    fn undeclared_groups_are_per_selector() {
        let context = context(PluginRegistry::empty());
        let mut handler = DeferredImportSelectorGroupingHandler::new();
        handler.register(holder("com.a.A", "com.a.S", Selector::new(&["com.a.X"])), &context).unwrap();
        handler.register(holder("com.a.B", "com.a.S", Selector::new(&["com.a.X"])), &context).unwrap();
        assert_eq!(handler.len(), 2);
    }

    #[test]
    fn declared_group_without_factory_is_a_plugin_error() {
        let context = context(PluginRegistry::empty());
        let mut selector = Selector::new(&[]);
        selector.group = Some("missing");
        let mut handler = DeferredImportSelectorGroupingHandler::new();
        let err = handler
            .register(holder("com.a.A", "com.a.S", selector), &context)
            .unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
