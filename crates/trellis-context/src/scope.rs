//! Scope resolution and scoped-proxy definitions.

use std::fmt;

use trellis_common::constants::{SCOPE, SCOPE_SINGLETON, SCOPED_PROXY_FACTORY, SCOPED_TARGET_PREFIX};
use trellis_common::error::Result;
use trellis_common::types::ScopedProxyMode;
use trellis_core::definition::{BeanDefinition, BeanDefinitionHolder, DefinitionOrigin};
use trellis_core::metadata::{AnnotatedElement, MergedAnnotations};
use trellis_core::registry::BeanDefinitionRegistry;
use trellis_core::source::MetadataSource;

/// Resolved scope name and proxy mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeMetadata {
    /// Scope name.
    pub scope_name: String,
    /// How the scoped bean is exposed.
    pub proxy_mode: ScopedProxyMode,
}

impl Default for ScopeMetadata {
    fn default() -> Self {
        Self {
            scope_name: SCOPE_SINGLETON.to_string(),
            proxy_mode: ScopedProxyMode::No,
        }
    }
}

impl fmt::Display for ScopeMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.scope_name, self.proxy_mode)
    }
}

/// Reads `@Scope`, resolving `DEFAULT` proxy modes to a configured default.
#[derive(Debug, Clone, Copy)]
pub struct AnnotationScopeMetadataResolver {
    default_proxy_mode: ScopedProxyMode,
}

impl Default for AnnotationScopeMetadataResolver {
    fn default() -> Self {
        Self::new(ScopedProxyMode::No)
    }
}

impl AnnotationScopeMetadataResolver {
    /// Creates a resolver; a `DEFAULT` default is treated as `NO`.
    #[must_use]
    pub const fn new(default_proxy_mode: ScopedProxyMode) -> Self {
        let default_proxy_mode = match default_proxy_mode {
            ScopedProxyMode::Default => ScopedProxyMode::No,
            other => other,
        };
        Self { default_proxy_mode }
    }

    /// Resolves the scope of an annotated element.
    ///
    /// Elements without `@Scope` are singletons without a proxy.
    #[must_use]
    pub fn resolve(&self, element: &dyn AnnotatedElement, source: &dyn MetadataSource) -> ScopeMetadata {
        let merged = MergedAnnotations::from_element(element, source);
        let Some(attributes) = merged.get(SCOPE) else {
            return ScopeMetadata::default();
        };
        let scope_name = attributes
            .string("value")
            .or_else(|| attributes.string("scopeName"))
            .filter(|name| !name.is_empty())
            .unwrap_or(SCOPE_SINGLETON)
            .to_string();
        let proxy_mode = match attributes
            .string("proxyMode")
            .and_then(ScopedProxyMode::from_constant)
            .unwrap_or_default()
        {
            ScopedProxyMode::Default => self.default_proxy_mode,
            other => other,
        };
        ScopeMetadata {
            scope_name,
            proxy_mode,
        }
    }

    /// Resolves the scope of a definition from its class metadata.
    #[must_use]
    pub fn resolve_definition(
        &self,
        definition: &BeanDefinition,
        source: &dyn MetadataSource,
    ) -> ScopeMetadata {
        definition
            .metadata
            .as_ref()
            .map_or_else(ScopeMetadata::default, |metadata| {
                self.resolve(metadata.as_ref(), source)
            })
    }
}

/// Name the target of a scoped proxy is registered under.
#[must_use]
pub fn target_bean_name(name: &str) -> String {
    format!("{SCOPED_TARGET_PREFIX}{name}")
}

/// Wraps a definition in a scoped proxy when its scope asks for one.
///
/// The target is registered right away under `scopedTarget.<name>` and is
/// neither autowirable nor primary; the returned holder carries the proxy
/// definition under the original name.
///
/// # Errors
///
/// Returns an error if the target cannot be registered.
pub fn apply_scoped_proxy_mode(
    scope: &ScopeMetadata,
    holder: BeanDefinitionHolder,
    registry: &mut dyn BeanDefinitionRegistry,
) -> Result<BeanDefinitionHolder> {
    if matches!(scope.proxy_mode, ScopedProxyMode::No | ScopedProxyMode::Default) {
        return Ok(holder);
    }
    create_scoped_proxy(holder, registry, scope.proxy_mode == ScopedProxyMode::TargetClass)
}

/// Registers the target of a scoped proxy and returns the proxy holder.
///
/// # Errors
///
/// Returns an error if the target cannot be registered.
pub fn create_scoped_proxy(
    holder: BeanDefinitionHolder,
    registry: &mut dyn BeanDefinitionRegistry,
    proxy_target_class: bool,
) -> Result<BeanDefinitionHolder> {
    let BeanDefinitionHolder {
        name,
        definition: mut target,
        aliases,
    } = holder;
    let target_name = target_bean_name(&name);

    let mut proxy = BeanDefinition::new(SCOPED_PROXY_FACTORY);
    proxy.origin = DefinitionOrigin::ScopedProxy;
    proxy.source.clone_from(&target.source);
    proxy.role = target.role;
    proxy.primary = target.primary;
    proxy.autowire_candidate = target.autowire_candidate;
    proxy.set_attribute("targetBeanName", target_name.clone());
    proxy.set_attribute("proxyTargetClass", proxy_target_class.to_string());

    target.autowire_candidate = false;
    target.primary = false;
    proxy.originating = Some(Box::new(target.clone()));
    tracing::debug!(bean = %name, target = %target_name, "registering scoped proxy target");
    registry.register_bean_definition(&target_name, target)?;

    Ok(BeanDefinitionHolder {
        name,
        definition: proxy,
        aliases,
    })
}
