//! Discovery of configuration classes.
//!
//! [`ConfigurationClassParser`] walks each root class and everything it
//! reaches: member classes, property sources, component scans, imports,
//! imported resources, bean methods, interfaces and superclasses. Deferred
//! import selectors are collected across the whole batch and run once the
//! last root has been parsed.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use trellis_common::config::TrellisConfig;
use trellis_common::constants::{
    BEAN, COMPONENT, COMPONENT_SCAN, COMPONENT_SCANS, DEFAULT_RESOURCE_READER,
    DEFERRED_IMPORT_SELECTOR, IMPORT, IMPORT_BEAN_DEFINITION_REGISTRAR, IMPORT_RESOURCE,
    IMPORT_SELECTOR, PROPERTY_SOURCE, PROPERTY_SOURCES,
};
use trellis_common::error::{Result, TrellisError};
use trellis_common::types::is_jdk_type;
use trellis_core::definition::BeanDefinitionHolder;
use trellis_core::metadata::{ClassMetadata, MergedAnnotations, MethodMetadata, MethodOrder};
use trellis_core::order::{resolve_order, sort_by_order};
use trellis_core::source::{MetadataSource, is_assignable};

use crate::component_scan::ComponentScanAnnotationParser;
use crate::condition::{ConditionEvaluator, ConfigurationPhase};
use crate::configuration_class::ConfigurationClass;
use crate::context::ContainerContext;
use crate::deferred::{
    DeferredImportSelectorGroupingHandler, DeferredImportSelectorHandler,
    DeferredImportSelectorHolder, sort_holders,
};
use crate::import_stack::ImportStack;
use crate::imports::ExclusionFilter;
use crate::plugin::ImportKind;
use crate::problem::{Problem, ProblemReporter};
use crate::property_source::{PropertySourceDescriptor, PropertySourceProcessor};
use crate::utils::{check_configuration_class_candidate, is_configuration_candidate};

/// A configuration class shared between the resolved set and pending work.
pub type SharedConfigurationClass = Rc<RefCell<ConfigurationClass>>;

enum ImportCandidate {
    Plugin(ImportKind),
    Configuration(Arc<ClassMetadata>),
}

/// Parses configuration classes into [`ConfigurationClass`] models.
#[derive(Debug)]
pub struct ConfigurationClassParser {
    context: ContainerContext,
    conditions: ConditionEvaluator,
    component_scans: ComponentScanAnnotationParser,
    property_sources: PropertySourceProcessor,
    configuration_classes: IndexMap<String, SharedConfigurationClass>,
    known_superclasses: IndexMap<String, String>,
    import_stack: ImportStack,
    problems: ProblemReporter,
    deferred: DeferredImportSelectorHandler,
}

impl ConfigurationClassParser {
    /// Creates a parser with default scan settings.
    #[must_use]
    pub fn new(context: ContainerContext) -> Self {
        Self::with_config(context, TrellisConfig::default())
    }

    /// Creates a parser whose component scans apply the given defaults.
    #[must_use]
    pub fn with_config(context: ContainerContext, config: TrellisConfig) -> Self {
        Self {
            conditions: ConditionEvaluator::new(context.clone()),
            component_scans: ComponentScanAnnotationParser::new(context.clone(), config),
            property_sources: PropertySourceProcessor::new(),
            configuration_classes: IndexMap::new(),
            known_superclasses: IndexMap::new(),
            import_stack: ImportStack::new(),
            problems: ProblemReporter::new(),
            deferred: DeferredImportSelectorHandler::new(),
            context,
        }
    }

    /// Parses every root, then runs the deferred import pass once.
    ///
    /// # Errors
    ///
    /// Returns [`TrellisError::Parse`] naming the root whose processing
    /// failed, or the import failure raised underneath it.
    pub fn parse(&mut self, candidates: &[BeanDefinitionHolder]) -> Result<()> {
        for holder in candidates {
            let definition = &holder.definition;
            let class_name = definition
                .metadata
                .as_ref()
                .map(|metadata| metadata.name.clone())
                .or_else(|| definition.class_name.clone())
                .unwrap_or_default();
            let metadata = match (&definition.metadata, &definition.class_name) {
                (Some(metadata), _) => Ok(Arc::clone(metadata)),
                (None, Some(class_name)) => self.context.metadata_source().read(class_name),
                (None, None) => Err(TrellisError::config(format!(
                    "bean definition '{}' declares no class",
                    holder.name
                ))),
            };
            metadata
                .and_then(|metadata| self.parse_metadata(metadata, &holder.name))
                .map_err(|err| wrap_parse_error(&class_name, err))?;
        }
        self.process_deferred_import_selectors()
    }

    /// Checks every parsed class and reports all problems found so far.
    ///
    /// # Errors
    ///
    /// Returns [`TrellisError::Problems`] if any problem was recorded.
    pub fn validate(&mut self) -> Result<()> {
        let source = self.context.shared_metadata_source();
        for configuration_class in self.configuration_classes.values() {
            configuration_class
                .borrow()
                .validate(source.as_ref(), &mut self.problems);
        }
        self.problems.check()
    }

    /// Parsed classes in resolution order.
    #[must_use]
    pub fn configuration_classes(&self) -> Vec<SharedConfigurationClass> {
        self.configuration_classes.values().cloned().collect()
    }

    /// The parsed class with the given name.
    #[must_use]
    pub fn configuration_class(&self, class_name: &str) -> Option<SharedConfigurationClass> {
        self.configuration_classes.get(class_name).cloned()
    }

    /// Who imported whom.
    #[must_use]
    pub const fn import_registry(&self) -> &ImportStack {
        &self.import_stack
    }

    /// Mutable access to the import index, for forgetting skipped importers.
    pub const fn import_registry_mut(&mut self) -> &mut ImportStack {
        &mut self.import_stack
    }

    /// Problems recorded during traversal.
    #[must_use]
    pub const fn problems(&self) -> &ProblemReporter {
        &self.problems
    }

    /// Property sources added to the environment, in order.
    #[must_use]
    pub fn property_source_names(&self) -> &[String] {
        self.property_sources.names()
    }

    /// The collaborators the parser works with.
    #[must_use]
    pub const fn context(&self) -> &ContainerContext {
        &self.context
    }

    fn parse_metadata(&mut self, metadata: Arc<ClassMetadata>, bean_name: &str) -> Result<()> {
        let root = ConfigurationClass::new(metadata, Some(bean_name.to_string()));
        self.process_configuration_class(
            Rc::new(RefCell::new(root)),
            &ExclusionFilter::default_filter(),
        )
    }

    fn process_configuration_class(
        &mut self,
        configuration_class: SharedConfigurationClass,
        filter: &ExclusionFilter,
    ) -> Result<()> {
        let metadata = Arc::clone(configuration_class.borrow().metadata());
        if self.conditions.should_skip(
            metadata.as_ref(),
            Some(ConfigurationPhase::ParseConfiguration),
        )? {
            tracing::debug!(class = %metadata.name, "configuration class skipped by condition");
            return Ok(());
        }

        let name = metadata.name.clone();
        if let Some(existing) = self.configuration_classes.get(&name).cloned() {
            if configuration_class.borrow().is_imported() {
                if existing.borrow().is_imported() {
                    existing
                        .borrow_mut()
                        .merge_imported_by(&configuration_class.borrow());
                }
                tracing::trace!(class = %name, "configuration class already known");
                return Ok(());
            }
            tracing::debug!(class = %name, "explicit registration replaces imported configuration class");
            let _ = self.configuration_classes.shift_remove(&name);
            self.known_superclasses.retain(|_, owner| *owner != name);
        }

        tracing::debug!(class = %name, imported = configuration_class.borrow().is_imported(), "processing configuration class");
        let mut current = Some(metadata);
        while let Some(source) = current {
            current = self.do_process_configuration_class(&configuration_class, &source, filter)?;
        }
        let _ = self.configuration_classes.insert(name, configuration_class);
        Ok(())
    }

    /// One pass over `source`, which is the class itself or one of its
    /// superclasses. Returns the next superclass to visit.
    fn do_process_configuration_class(
        &mut self,
        configuration_class: &SharedConfigurationClass,
        source: &Arc<ClassMetadata>,
        filter: &ExclusionFilter,
    ) -> Result<Option<Arc<ClassMetadata>>> {
        let reader = self.context.shared_metadata_source();
        let class_metadata = Arc::clone(configuration_class.borrow().metadata());

        if MergedAnnotations::from_element(class_metadata.as_ref(), reader.as_ref())
            .is_present(COMPONENT)
        {
            self.process_member_classes(configuration_class, source, filter)?;
        }

        let merged = MergedAnnotations::from_element(source.as_ref(), reader.as_ref());

        for attributes in merged.repeatable(PROPERTY_SOURCE, PROPERTY_SOURCES) {
            let descriptor = PropertySourceDescriptor::from_attributes(&attributes);
            self.property_sources.process(&descriptor, &self.context)?;
        }

        let scans = merged.repeatable(COMPONENT_SCAN, COMPONENT_SCANS);
        if !scans.is_empty()
            && !self
                .conditions
                .should_skip(source.as_ref(), Some(ConfigurationPhase::RegisterBean))?
        {
            for scan in &scans {
                let scanned = self.component_scans.parse(scan, &source.name)?;
                self.parse_scanned(scanned, reader.as_ref())?;
            }
        }

        let imports = self.collect_imports(source);
        self.process_imports(configuration_class, source, imports, filter, true)?;

        if let Some(import_resource) = merged.get(IMPORT_RESOURCE) {
            let reader_name = import_resource
                .class_names("reader")
                .into_iter()
                .next()
                .unwrap_or_else(|| DEFAULT_RESOURCE_READER.to_string());
            let mut locations = import_resource.strings("locations");
            locations.extend(import_resource.strings("value"));
            for location in locations {
                let resolved = self
                    .context
                    .environment()
                    .resolve_required_placeholders(&location)?;
                configuration_class
                    .borrow_mut()
                    .add_imported_resource(resolved, reader_name.clone());
            }
        }

        for method in self.retrieve_bean_methods(source) {
            configuration_class.borrow_mut().add_bean_method(method);
        }
        self.process_interfaces(configuration_class, source)?;

        if let Some(superclass) = source.user_superclass() {
            if !self.known_superclasses.contains_key(superclass) && !filter.matches(superclass) {
                let _ = self
                    .known_superclasses
                    .insert(superclass.to_string(), class_metadata.name.clone());
                tracing::trace!(class = %class_metadata.name, superclass, "descending into superclass");
                return Ok(Some(reader.read(superclass)?));
            }
        }
        Ok(None)
    }

    fn parse_scanned(
        &mut self,
        scanned: Vec<BeanDefinitionHolder>,
        reader: &dyn MetadataSource,
    ) -> Result<()> {
        for holder in scanned {
            let BeanDefinitionHolder {
                name, definition, ..
            } = holder;
            let mut candidate = match definition.originating.clone() {
                Some(originating) => *originating,
                None => definition,
            };
            if !check_configuration_class_candidate(&mut candidate, reader)? {
                continue;
            }
            let metadata = match (&candidate.metadata, &candidate.class_name) {
                (Some(metadata), _) => Arc::clone(metadata),
                (None, Some(class_name)) => reader.read(class_name)?,
                (None, None) => continue,
            };
            tracing::debug!(class = %metadata.name, bean = %name, "scanned configuration candidate");
            self.parse_metadata(metadata, &name)?;
        }
        Ok(())
    }

    fn process_member_classes(
        &mut self,
        configuration_class: &SharedConfigurationClass,
        source: &ClassMetadata,
        filter: &ExclusionFilter,
    ) -> Result<()> {
        let reader = self.context.shared_metadata_source();
        let class_metadata = Arc::clone(configuration_class.borrow().metadata());

        let mut candidates = Vec::new();
        for member in &source.member_classes {
            if filter.matches(member) {
                continue;
            }
            match reader.read(member) {
                Ok(metadata) => {
                    if is_configuration_candidate(&metadata, reader.as_ref())
                        && metadata.name != class_metadata.name
                    {
                        candidates.push(metadata);
                    }
                }
                Err(err) => {
                    tracing::trace!(member = %member, error = %err, "member class not readable, skipped");
                }
            }
        }
        sort_by_order(&mut candidates, |metadata| {
            resolve_order(None, Some(metadata.as_ref()))
        });

        for candidate in candidates {
            if self.import_stack.contains(&class_metadata.name) {
                self.problems.error(Problem::CircularImport {
                    class_name: class_metadata.name.clone(),
                    chain: self.import_stack.chain_to(&class_metadata.name),
                    location: class_metadata.source_location(),
                });
                continue;
            }
            self.import_stack.push(&class_metadata);
            let member = ConfigurationClass::imported(candidate, &class_metadata);
            let result = self.process_configuration_class(Rc::new(RefCell::new(member)), filter);
            let _ = self.import_stack.pop();
            result?;
        }
        Ok(())
    }

    /// `@Import` values reachable from a class, meta-annotations first.
    fn collect_imports(&self, source: &ClassMetadata) -> Vec<String> {
        let mut imports = IndexSet::new();
        let mut visited = HashSet::new();
        self.collect_imports_into(source, &mut imports, &mut visited);
        imports.into_iter().collect()
    }

    fn collect_imports_into(
        &self,
        source: &ClassMetadata,
        imports: &mut IndexSet<String>,
        visited: &mut HashSet<String>,
    ) {
        if !visited.insert(source.name.clone()) {
            return;
        }
        let reader = self.context.metadata_source();
        let default_filter = ExclusionFilter::default_filter();
        for annotation in &source.annotations {
            let type_name = annotation.type_name.as_str();
            if type_name == IMPORT || is_jdk_type(type_name) || default_filter.matches(type_name) {
                continue;
            }
            match reader.read(type_name) {
                Ok(annotation_type) => self.collect_imports_into(&annotation_type, imports, visited),
                Err(err) => {
                    tracing::trace!(annotation = type_name, error = %err, "annotation type not readable, ignored");
                }
            }
        }
        for annotation in source.annotations.iter().filter(|a| a.type_name == IMPORT) {
            for class_name in annotation.attributes.class_names("value") {
                let _ = imports.insert(class_name);
            }
        }
    }

    fn process_imports(
        &mut self,
        configuration_class: &SharedConfigurationClass,
        current: &Arc<ClassMetadata>,
        candidates: Vec<String>,
        filter: &ExclusionFilter,
        check_circular: bool,
    ) -> Result<()> {
        if candidates.is_empty() {
            return Ok(());
        }
        let class_metadata = Arc::clone(configuration_class.borrow().metadata());
        if check_circular && self.import_stack.is_chained_import_on_stack(&class_metadata.name) {
            self.problems.error(Problem::CircularImport {
                class_name: class_metadata.name.clone(),
                chain: self.import_stack.chain_to(&class_metadata.name),
                location: class_metadata.source_location(),
            });
            return Ok(());
        }

        self.import_stack.push(&class_metadata);
        let result = self.process_import_candidates(configuration_class, current, candidates, filter);
        let _ = self.import_stack.pop();
        result.map_err(|err| {
            if is_store_error(&err) {
                err
            } else {
                TrellisError::Import {
                    class_name: class_metadata.name.clone(),
                    source: Box::new(err),
                }
            }
        })
    }

    fn process_import_candidates(
        &mut self,
        configuration_class: &SharedConfigurationClass,
        current: &Arc<ClassMetadata>,
        candidates: Vec<String>,
        filter: &ExclusionFilter,
    ) -> Result<()> {
        let context = self.context.clone();
        let plugins = context.plugins();
        let mut filter = filter.clone();

        for candidate in candidates {
            if filter.matches(&candidate) {
                tracing::trace!(class = %candidate, "import excluded by filter");
                continue;
            }
            match self.classify(&candidate)? {
                ImportCandidate::Plugin(ImportKind::Selector) => {
                    let selector = plugins.import_selector(&candidate, &context)?;
                    if let Some(selector_filter) = selector.exclusion_filter() {
                        filter = filter.or(&selector_filter);
                    }
                    let selected = selector.select_imports(current)?;
                    tracing::debug!(selector = %candidate, imports = ?selected, "import selector applied");
                    self.process_imports(configuration_class, current, selected, &filter, false)?;
                }
                ImportCandidate::Plugin(ImportKind::DeferredSelector) => {
                    let selector = plugins.deferred_import_selector(&candidate, &context)?;
                    if let Some(selector_filter) = selector.exclusion_filter() {
                        filter = filter.or(&selector_filter);
                    }
                    let holder = DeferredImportSelectorHolder::new(
                        Rc::clone(configuration_class),
                        candidate.clone(),
                        selector,
                    );
                    self.handle_deferred(holder)?;
                }
                ImportCandidate::Plugin(ImportKind::Registrar) => {
                    let registrar = plugins.registrar(&candidate, &context)?;
                    configuration_class.borrow_mut().add_registrar(
                        registrar,
                        candidate.clone(),
                        Arc::clone(current),
                    );
                }
                ImportCandidate::Configuration(metadata) => {
                    self.import_stack.register_import(current, &metadata.name);
                    let importer = Arc::clone(configuration_class.borrow().metadata());
                    let imported = ConfigurationClass::imported(metadata, &importer);
                    self.process_configuration_class(Rc::new(RefCell::new(imported)), &filter)?;
                }
            }
        }
        Ok(())
    }

    /// Plugins are recognised by name first; only unknown names are read.
    fn classify(&self, class_name: &str) -> Result<ImportCandidate> {
        if let Some(kind) = self.context.plugins().import_kind(class_name) {
            return Ok(ImportCandidate::Plugin(kind));
        }
        let reader = self.context.metadata_source();
        let metadata = reader.read(class_name)?;
        let capabilities = [
            (DEFERRED_IMPORT_SELECTOR, "deferred import selector"),
            (IMPORT_SELECTOR, "import selector"),
            (IMPORT_BEAN_DEFINITION_REGISTRAR, "import bean definition registrar"),
        ];
        for (capability, kind) in capabilities {
            if is_assignable(reader, &metadata.name, capability) {
                return Err(TrellisError::Plugin {
                    kind,
                    class_name: class_name.to_string(),
                    message: "no factory registered".into(),
                });
            }
        }
        Ok(ImportCandidate::Configuration(metadata))
    }

    fn handle_deferred(&mut self, holder: DeferredImportSelectorHolder) -> Result<()> {
        if let Some(holder) = self.deferred.handle(holder) {
            let mut handler = DeferredImportSelectorGroupingHandler::new();
            handler.register(holder, &self.context)?;
            self.process_group_imports(handler)?;
        }
        Ok(())
    }

    fn process_deferred_import_selectors(&mut self) -> Result<()> {
        let mut holders = self.deferred.begin();
        let result = if holders.is_empty() {
            Ok(())
        } else {
            tracing::debug!(count = holders.len(), "processing deferred import selectors");
            sort_holders(&mut holders, &self.context);
            let mut handler = DeferredImportSelectorGroupingHandler::new();
            holders
                .into_iter()
                .try_for_each(|holder| handler.register(holder, &self.context))
                .and_then(|()| self.process_group_imports(handler))
        };
        self.deferred.finish();
        result
    }

    fn process_group_imports(&mut self, handler: DeferredImportSelectorGroupingHandler) -> Result<()> {
        let (groupings, importers) = handler.into_parts();
        for mut grouping in groupings {
            let filter = grouping.candidate_filter();
            for entry in grouping.imports()? {
                let importer = importers.get(&entry.metadata.name).cloned().ok_or_else(|| {
                    TrellisError::NotFound {
                        kind: "importing configuration class",
                        id: entry.metadata.name.clone(),
                    }
                })?;
                let current = Arc::clone(importer.borrow().metadata());
                self.process_imports(
                    &importer,
                    &current,
                    vec![entry.import_class_name],
                    &filter,
                    false,
                )?;
            }
        }
        Ok(())
    }

    /// `@Bean` methods of a class, in declaration order when it can be
    /// recovered from a structural read.
    fn retrieve_bean_methods(&self, metadata: &ClassMetadata) -> Vec<MethodMetadata> {
        let reader = self.context.metadata_source();
        let is_bean = |method: &&MethodMetadata| {
            MergedAnnotations::from_element(*method, reader).is_present(BEAN)
        };
        let mut bean_methods: Vec<MethodMetadata> =
            metadata.methods.iter().filter(is_bean).cloned().collect();

        if bean_methods.len() > 1 && metadata.method_order == MethodOrder::Unspecified {
            if let Some(structural) = reader.read_structural(&metadata.name) {
                let declared: Vec<&MethodMetadata> =
                    structural.methods.iter().filter(is_bean).collect();
                if declared.len() >= bean_methods.len() {
                    let mut remaining = bean_methods.clone();
                    let mut selected = Vec::with_capacity(bean_methods.len());
                    for declared_method in declared {
                        if let Some(position) = remaining
                            .iter()
                            .position(|method| method.name == declared_method.name)
                        {
                            selected.push(remaining.remove(position));
                        }
                    }
                    if selected.len() == bean_methods.len() {
                        bean_methods = selected;
                    }
                }
            }
        }
        bean_methods
    }

    fn process_interfaces(
        &self,
        configuration_class: &SharedConfigurationClass,
        source: &ClassMetadata,
    ) -> Result<()> {
        let reader = self.context.metadata_source();
        for interface in &source.interfaces {
            if is_jdk_type(interface) || ExclusionFilter::default_filter().matches(interface) {
                continue;
            }
            let metadata = reader.read(interface)?;
            for method in self.retrieve_bean_methods(&metadata) {
                if !method.is_abstract {
                    configuration_class.borrow_mut().add_bean_method(method);
                }
            }
            self.process_interfaces(configuration_class, &metadata)?;
        }
        Ok(())
    }
}

const fn is_store_error(err: &TrellisError) -> bool {
    matches!(
        err,
        TrellisError::Parse { .. }
            | TrellisError::Import { .. }
            | TrellisError::BeanDefinitionOverride { .. }
    )
}

fn wrap_parse_error(class_name: &str, err: TrellisError) -> TrellisError {
    if is_store_error(&err) {
        err
    } else {
        TrellisError::Parse {
            class_name: class_name.to_string(),
            source: Box::new(err),
        }
    }
}
