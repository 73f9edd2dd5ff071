//! Container facade: registration, scanning, refresh and lifecycle events.

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use trellis_common::config::TrellisConfig;
use trellis_common::error::{Result, TrellisError};
use trellis_core::environment::{Environment, StandardEnvironment};
use trellis_core::registry::{SharedRegistry, SimpleBeanDefinitionRegistry};
use trellis_core::resource::{DefaultResourceLoader, ResourceLoader};
use trellis_core::source::MetadataSource;
use trellis_event::event::{ApplicationEvent, ContextEvent, ContextEventKind};
use trellis_event::executor::TaskExecutor;
use trellis_event::listener::{
    ApplicationListener, ListenerBeanResolver, ListenerBeanTable, ListenerFactory,
};
use trellis_event::multicaster::SimpleApplicationEventMulticaster;
use trellis_event::startup::{ApplicationStartup, DefaultApplicationStartup};

use crate::context::ContainerContext;
use crate::graph::DependencyGraph;
use crate::plugin::PluginRegistry;
use crate::processor::{ConfigurationClassPostProcessor, ProcessingReport};
use crate::reader::AnnotatedBeanDefinitionReader;
use crate::scanner::ClassPathBeanDefinitionScanner;

/// Step recorded around a whole refresh.
pub const REFRESH_STEP: &str = "trellis.context.refresh";

/// Default container identifier.
pub const DEFAULT_CONTAINER_ID: &str = "trellis";

/// Lifecycle state of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    /// Accepting registrations.
    Created,
    /// Refreshed and active.
    Active,
    /// Closed; no further refresh is possible.
    Closed,
    /// A refresh failed; the container never becomes active.
    Failed,
}

/// Builder for configuring a container before registering classes.
pub struct ContainerBuilder {
    id: String,
    config: TrellisConfig,
    metadata_source: Rc<dyn MetadataSource>,
    plugins: PluginRegistry,
    environment: Option<Rc<dyn Environment>>,
    resource_loader: Option<Rc<dyn ResourceLoader>>,
    startup: Arc<dyn ApplicationStartup>,
    task_executor: Option<Arc<dyn TaskExecutor>>,
}

impl fmt::Debug for ContainerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerBuilder")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("plugins", &self.plugins)
            .finish_non_exhaustive()
    }
}

impl ContainerBuilder {
    /// Creates a builder reading class metadata from the given source.
    #[must_use]
    pub fn new(metadata_source: Rc<dyn MetadataSource>) -> Self {
        Self {
            id: DEFAULT_CONTAINER_ID.to_string(),
            config: TrellisConfig::default(),
            metadata_source,
            plugins: PluginRegistry::with_defaults(),
            environment: None,
            resource_loader: None,
            startup: Arc::new(DefaultApplicationStartup),
            task_executor: None,
        }
    }

    /// Sets the identifier carried by lifecycle events.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets the container configuration.
    #[must_use]
    pub fn config(mut self, config: TrellisConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the plugin factories.
    #[must_use]
    pub fn plugins(mut self, plugins: PluginRegistry) -> Self {
        self.plugins = plugins;
        self
    }

    /// Uses an environment instead of one built from the configuration.
    #[must_use]
    pub fn environment(mut self, environment: Rc<dyn Environment>) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Uses a resource loader instead of one rooted at the working directory.
    #[must_use]
    pub fn resource_loader(mut self, resource_loader: Rc<dyn ResourceLoader>) -> Self {
        self.resource_loader = Some(resource_loader);
        self
    }

    /// Records bootstrap steps on the given startup.
    #[must_use]
    pub fn startup(mut self, startup: Arc<dyn ApplicationStartup>) -> Self {
        self.startup = startup;
        self
    }

    /// Hands asynchronous-capable listeners to an executor.
    #[must_use]
    pub fn task_executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.task_executor = Some(executor);
        self
    }

    /// Builds an empty container.
    #[must_use]
    pub fn build(self) -> AnnotationConfigContainer {
        let environment = self
            .environment
            .unwrap_or_else(|| Rc::new(StandardEnvironment::from_config(&self.config)));
        let resource_loader = self
            .resource_loader
            .unwrap_or_else(|| Rc::new(DefaultResourceLoader::new(".")));
        let registry: SharedRegistry = SimpleBeanDefinitionRegistry::new()
            .with_overriding(self.config.allow_bean_definition_overriding)
            .with_environment(Rc::clone(&environment))
            .with_resource_loader(Rc::clone(&resource_loader))
            .into_shared();
        let context = ContainerContext::new(registry, self.metadata_source)
            .with_environment(environment)
            .with_resource_loader(resource_loader)
            .with_plugins(self.plugins);

        let mut multicaster =
            SimpleApplicationEventMulticaster::new().with_startup(Arc::clone(&self.startup));
        if let Some(executor) = self.task_executor {
            multicaster = multicaster.with_task_executor(executor);
        }
        let listener_beans = Arc::new(ListenerBeanTable::new());
        let resolver = Arc::clone(&listener_beans) as Arc<dyn ListenerBeanResolver>;
        multicaster.set_listener_bean_resolver(resolver);

        AnnotationConfigContainer {
            id: self.id,
            reader: AnnotatedBeanDefinitionReader::new(context.clone()),
            context,
            config: self.config,
            startup: self.startup,
            multicaster: Arc::new(multicaster),
            listener_beans,
            state: ContainerState::Created,
            report: None,
            initialization_order: Vec::new(),
        }
    }
}

/// A container resolving annotated configuration classes into bean
/// definitions.
pub struct AnnotationConfigContainer {
    id: String,
    context: ContainerContext,
    config: TrellisConfig,
    reader: AnnotatedBeanDefinitionReader,
    startup: Arc<dyn ApplicationStartup>,
    multicaster: Arc<SimpleApplicationEventMulticaster>,
    listener_beans: Arc<ListenerBeanTable>,
    state: ContainerState,
    report: Option<ProcessingReport>,
    initialization_order: Vec<String>,
}

impl fmt::Debug for AnnotationConfigContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnotationConfigContainer")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl AnnotationConfigContainer {
    /// Creates a builder.
    #[must_use]
    pub fn builder(metadata_source: Rc<dyn MetadataSource>) -> ContainerBuilder {
        ContainerBuilder::new(metadata_source)
    }

    /// Container identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ContainerState {
        self.state
    }

    /// Returns `true` between a successful refresh and close.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == ContainerState::Active
    }

    /// Collaborators shared with conditions and plugins.
    #[must_use]
    pub const fn context(&self) -> &ContainerContext {
        &self.context
    }

    /// The bean definition registry.
    #[must_use]
    pub const fn registry(&self) -> &SharedRegistry {
        self.context.registry()
    }

    /// The event multicaster.
    #[must_use]
    pub fn multicaster(&self) -> Arc<SimpleApplicationEventMulticaster> {
        Arc::clone(&self.multicaster)
    }

    /// Registered definition names in registration order.
    #[must_use]
    pub fn bean_definition_names(&self) -> Vec<String> {
        self.registry().borrow().bean_definition_names()
    }

    /// Outcome of the last refresh.
    #[must_use]
    pub const fn report(&self) -> Option<&ProcessingReport> {
        self.report.as_ref()
    }

    /// Bean names with `@DependsOn` targets first, as resolved by refresh.
    #[must_use]
    pub fn initialization_order(&self) -> &[String] {
        &self.initialization_order
    }

    /// Registers component classes.
    ///
    /// # Errors
    ///
    /// Returns an error if the container was refreshed or closed, or a class
    /// cannot be registered.
    pub fn register(&self, class_names: &[impl AsRef<str>]) -> Result<Vec<String>> {
        self.assert_accepting("register")?;
        self.reader.register(class_names)
    }

    /// Registers one component class under an explicit name.
    ///
    /// # Errors
    ///
    /// See [`AnnotationConfigContainer::register`].
    pub fn register_bean(&self, class_name: &str, name: &str) -> Result<Option<String>> {
        self.assert_accepting("register")?;
        self.reader.register_bean(class_name, Some(name))
    }

    /// Scans packages for components and returns the number registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the container was refreshed or closed, or the
    /// scan fails.
    pub fn scan(&self, base_packages: &[impl AsRef<str>]) -> Result<usize> {
        self.assert_accepting("scan")?;
        let step = self.startup.start("trellis.context.base-packages.scan");
        let scanner =
            ClassPathBeanDefinitionScanner::from_config(self.context.clone(), &self.config)?;
        let count = scanner.scan(base_packages)?;
        step.end();
        Ok(count)
    }

    /// Resolves every configuration class, checks the depends-on graph and
    /// publishes a refreshed event.
    ///
    /// The container becomes active only when every step succeeds. Any
    /// failure leaves it [`ContainerState::Failed`], which refuses further
    /// refreshes.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is not freshly created, processing
    /// fails, depends-on declarations form a cycle, or a refreshed-event
    /// listener fails.
    pub fn refresh(&mut self) -> Result<&ProcessingReport> {
        self.assert_accepting("refresh")?;
        let mut step = self.startup.start(REFRESH_STEP);
        tracing::info!(container = %self.id, "refreshing container");

        let (report, order) = match self.resolve() {
            Ok(resolved) => resolved,
            Err(err) => {
                step.tag("outcome", "failed".to_string());
                step.end();
                return Err(self.fail(err));
            }
        };
        step.tag("beanDefinitionCount", order.len().to_string());
        step.end();

        if let Err(err) = self.multicaster.multicast_event(
            Arc::new(ContextEvent::new(ContextEventKind::Refreshed, self.id.clone())),
            None,
        ) {
            return Err(self.fail(err));
        }

        self.initialization_order = order;
        self.state = ContainerState::Active;
        tracing::info!(
            container = %self.id,
            definitions = self.initialization_order.len(),
            "container refreshed"
        );
        Ok(self.report.insert(report))
    }

    fn resolve(&self) -> Result<(ProcessingReport, Vec<String>)> {
        let report =
            ConfigurationClassPostProcessor::new(self.context.clone(), self.config.clone())
                .with_startup(Arc::clone(&self.startup))
                .process()?;
        let order = DependencyGraph::depends_on(&*self.registry().borrow()).resolve_order()?;
        Ok((report, order))
    }

    fn fail(&mut self, err: TrellisError) -> TrellisError {
        tracing::error!(container = %self.id, error = %err, "refresh failed");
        self.state = ContainerState::Failed;
        err
    }

    /// Publishes a closed event and marks the container closed.
    ///
    /// Closing a container that is not active is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if a closed-event listener fails.
    pub fn close(&mut self) -> Result<()> {
        if self.state != ContainerState::Active {
            tracing::debug!(container = %self.id, state = ?self.state, "close ignored");
            return Ok(());
        }
        tracing::info!(container = %self.id, "closing container");
        self.state = ContainerState::Closed;
        self.multicaster.multicast_event(
            Arc::new(ContextEvent::new(ContextEventKind::Closed, self.id.clone())),
            None,
        )
    }

    /// Adds a listener instance.
    pub fn add_listener(&self, listener: Arc<dyn ApplicationListener>) {
        self.multicaster.add_application_listener(listener);
    }

    /// Adds a named listener bean produced by a factory.
    pub fn add_listener_bean(&self, bean_name: &str, singleton: bool, factory: ListenerFactory) {
        self.listener_beans.register(bean_name, singleton, factory);
        self.multicaster.add_application_listener_bean(bean_name);
    }

    /// Removes a named listener bean.
    pub fn remove_listener_bean(&self, bean_name: &str) {
        let _ = self.listener_beans.remove(bean_name);
        self.multicaster.remove_application_listener_bean(bean_name);
    }

    /// Publishes an application event to every matching listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is not active or a listener fails.
    pub fn publish_event(&self, event: Arc<dyn ApplicationEvent>) -> Result<()> {
        if !self.is_active() {
            return Err(TrellisError::config(format!(
                "container '{}' is not active; events can only be published after refresh",
                self.id
            )));
        }
        self.multicaster.multicast_event(event, None)
    }

    fn assert_accepting(&self, operation: &str) -> Result<()> {
        match self.state {
            ContainerState::Created => Ok(()),
            ContainerState::Active => Err(TrellisError::config(format!(
                "cannot {operation}: container '{}' has already been refreshed",
                self.id
            ))),
            ContainerState::Closed => Err(TrellisError::config(format!(
                "cannot {operation}: container '{}' is closed",
                self.id
            ))),
            ContainerState::Failed => Err(TrellisError::config(format!(
                "cannot {operation}: container '{}' failed to refresh",
                self.id
            ))),
        }
    }
}
