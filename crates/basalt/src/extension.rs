//! Statically linked extensions.
//!
//! Extensions are described up front and resolved once at startup: every
//! dependency must be present within its version bounds and the graph must
//! be acyclic. Extensions are then built in dependency order and each one
//! registers its handlers.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use tracing::info;

use crate::dispatcher::DispatcherBuilder;

/// Error type for extension resolution.
#[derive(Debug, thiserror::Error)]
pub enum ExtensionError {
    #[error("Extension {0} is registered twice")]
    Duplicate(String),

    #[error("Extension {extension} requires {dependency}, which is not registered")]
    MissingDependency {
        extension: String,
        dependency: String,
    },

    #[error("Extension {extension} requires {dependency} >= {required}, found {found}")]
    TooOld {
        extension: String,
        dependency: String,
        required: ExtensionVersion,
        found: ExtensionVersion,
    },

    #[error("Extension {extension} requires {dependency} <= {allowed}, found {found}")]
    TooNew {
        extension: String,
        dependency: String,
        allowed: ExtensionVersion,
        found: ExtensionVersion,
    },

    #[error("Invalid version '{version}' in {extension}")]
    InvalidVersion { extension: String, version: String },

    #[error("Dependency cycle between: {}", .0.join(", "))]
    Cycle(Vec<String>),
}

/// Dotted numeric version, e.g. `1.2.0`. Missing components compare as zero.
#[derive(Debug, Clone, Eq)]
pub struct ExtensionVersion(Vec<u32>);

impl ExtensionVersion {
    fn component(&self, index: usize) -> u32 {
        self.0.get(index).copied().unwrap_or(0)
    }
}

impl FromStr for ExtensionVersion {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .split('.')
            .map(str::parse)
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

impl Ord for ExtensionVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        (0..len)
            .map(|i| self.component(i).cmp(&other.component(i)))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for ExtensionVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ExtensionVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl fmt::Display for ExtensionVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u32::to_string).collect();
        f.write_str(&parts.join("."))
    }
}

/// A requirement on another extension.
#[derive(Debug, Clone)]
pub struct Dependency {
    pub id: String,
    pub min_version: Option<String>,
    pub max_version: Option<String>,
}

impl Dependency {
    /// Depend on any version of `id`.
    #[must_use]
    pub fn on(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            min_version: None,
            max_version: None,
        }
    }

    #[must_use]
    pub fn min(mut self, version: impl Into<String>) -> Self {
        self.min_version = Some(version.into());
        self
    }

    #[must_use]
    pub fn max(mut self, version: impl Into<String>) -> Self {
        self.max_version = Some(version.into());
        self
    }
}

/// A built extension.
pub trait Extension: Send + Sync {
    /// Register handlers with the dispatcher.
    fn register(&self, dispatcher: &mut DispatcherBuilder);
}

/// Builds an extension instance.
pub type ExtensionFactory = fn() -> Box<dyn Extension>;

/// Static description of an extension.
pub struct ExtensionDescriptor {
    pub id: String,
    pub version: String,
    pub dependencies: Vec<Dependency>,
    pub factory: ExtensionFactory,
}

impl ExtensionDescriptor {
    #[must_use]
    pub fn new(id: impl Into<String>, version: impl Into<String>, factory: ExtensionFactory) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            dependencies: Vec::new(),
            factory,
        }
    }

    #[must_use]
    pub fn depends_on(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }
}

impl fmt::Debug for ExtensionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionDescriptor")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

/// Extensions known to the server, in registration order.
#[derive(Debug, Default)]
pub struct ExtensionRegistry {
    descriptors: Vec<ExtensionDescriptor>,
}

fn parse_version(extension: &str, version: &str) -> Result<ExtensionVersion, ExtensionError> {
    version
        .parse()
        .map_err(|_| ExtensionError::InvalidVersion {
            extension: extension.to_string(),
            version: version.to_string(),
        })
}

impl ExtensionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: ExtensionDescriptor) -> &mut Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Check every dependency and order extensions so dependencies come
    /// first. Ties keep registration order.
    ///
    /// # Errors
    ///
    /// Returns an error for duplicate IDs, missing or out-of-range
    /// dependencies, unparsable versions and cycles.
    pub fn resolve(&self) -> Result<Vec<&ExtensionDescriptor>, ExtensionError> {
        let mut index = HashMap::new();
        let mut versions = Vec::with_capacity(self.descriptors.len());
        for (i, descriptor) in self.descriptors.iter().enumerate() {
            if index.insert(descriptor.id.as_str(), i).is_some() {
                return Err(ExtensionError::Duplicate(descriptor.id.clone()));
            }
            versions.push(parse_version(&descriptor.id, &descriptor.version)?);
        }

        // dependents[i] lists extensions that must come after i
        let mut dependents = vec![Vec::new(); self.descriptors.len()];
        let mut in_degree = vec![0usize; self.descriptors.len()];

        for (i, descriptor) in self.descriptors.iter().enumerate() {
            for dependency in &descriptor.dependencies {
                let Some(&target) = index.get(dependency.id.as_str()) else {
                    return Err(ExtensionError::MissingDependency {
                        extension: descriptor.id.clone(),
                        dependency: dependency.id.clone(),
                    });
                };
                check_bounds(descriptor, dependency, &versions[target])?;
                dependents[target].push(i);
                in_degree[i] += 1;
            }
        }

        let mut ready: BTreeSet<usize> = (0..self.descriptors.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.descriptors.len());

        while let Some(next) = ready.pop_first() {
            order.push(next);
            for &dependent in &dependents[next] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() < self.descriptors.len() {
            let stuck = (0..self.descriptors.len())
                .filter(|&i| in_degree[i] > 0)
                .map(|i| self.descriptors[i].id.clone())
                .collect();
            return Err(ExtensionError::Cycle(stuck));
        }

        Ok(order.into_iter().map(|i| &self.descriptors[i]).collect())
    }

    /// Resolve, build every extension in order and let it register its
    /// handlers. Returns the IDs in load order.
    ///
    /// # Errors
    ///
    /// Returns an error if resolution fails; nothing is built in that case.
    pub fn load(&self, dispatcher: &mut DispatcherBuilder) -> Result<Vec<String>, ExtensionError> {
        let order = self.resolve()?;
        let mut loaded = Vec::with_capacity(order.len());
        for descriptor in order {
            let extension = (descriptor.factory)();
            extension.register(dispatcher);
            info!(id = %descriptor.id, version = %descriptor.version, "Loaded extension");
            loaded.push(descriptor.id.clone());
        }
        Ok(loaded)
    }
}

fn check_bounds(
    descriptor: &ExtensionDescriptor,
    dependency: &Dependency,
    found: &ExtensionVersion,
) -> Result<(), ExtensionError> {
    if let Some(min) = &dependency.min_version {
        let required = parse_version(&descriptor.id, min)?;
        if *found < required {
            return Err(ExtensionError::TooOld {
                extension: descriptor.id.clone(),
                dependency: dependency.id.clone(),
                required,
                found: found.clone(),
            });
        }
    }
    if let Some(max) = &dependency.max_version {
        let allowed = parse_version(&descriptor.id, max)?;
        if *found > allowed {
            return Err(ExtensionError::TooNew {
                extension: descriptor.id.clone(),
                dependency: dependency.id.clone(),
                allowed,
                found: found.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl Extension for Noop {
        fn register(&self, _dispatcher: &mut DispatcherBuilder) {}
    }

    fn noop() -> Box<dyn Extension> {
        Box::new(Noop)
    }

    fn ids(order: &[&ExtensionDescriptor]) -> Vec<String> {
        order.iter().map(|d| d.id.clone()).collect()
    }

    #[test]
    fn test_version_ordering() {
        let v = |s: &str| s.parse::<ExtensionVersion>().unwrap();
        assert!(v("1.10") > v("1.9"));
        assert_eq!(v("1.0"), v("1.0.0"));
        assert!(v("2") > v("1.99.99"));
        assert_eq!(v("1.2.3").to_string(), "1.2.3");
        assert!("1.x".parse::<ExtensionVersion>().is_err());
    }

    #[test]
    fn test_dependencies_load_first() {
        let mut registry = ExtensionRegistry::new();
        registry
            .register(
                ExtensionDescriptor::new("chat", "1.0", noop)
                    .depends_on(Dependency::on("core").min("1.0")),
            )
            .register(ExtensionDescriptor::new("core", "1.2.0", noop))
            .register(ExtensionDescriptor::new("metrics", "0.1", noop));

        // chat waits for core, then keeps its place ahead of metrics
        let order = registry.resolve().unwrap();
        assert_eq!(ids(&order), ["core", "chat", "metrics"]);

        let mut builder = DispatcherBuilder::new();
        assert_eq!(
            registry.load(&mut builder).unwrap(),
            ["core", "chat", "metrics"]
        );
    }

    #[test]
    fn test_resolution_errors() {
        let mut missing = ExtensionRegistry::new();
        missing.register(
            ExtensionDescriptor::new("chat", "1.0", noop).depends_on(Dependency::on("core")),
        );
        assert!(matches!(
            missing.resolve(),
            Err(ExtensionError::MissingDependency { .. })
        ));

        let mut duplicate = ExtensionRegistry::new();
        duplicate
            .register(ExtensionDescriptor::new("core", "1.0", noop))
            .register(ExtensionDescriptor::new("core", "2.0", noop));
        assert!(matches!(
            duplicate.resolve(),
            Err(ExtensionError::Duplicate(id)) if id == "core"
        ));

        let mut too_old = ExtensionRegistry::new();
        too_old
            .register(ExtensionDescriptor::new("core", "1.0", noop))
            .register(
                ExtensionDescriptor::new("chat", "1.0", noop)
                    .depends_on(Dependency::on("core").min("1.1")),
            );
        assert!(matches!(too_old.resolve(), Err(ExtensionError::TooOld { .. })));

        let mut too_new = ExtensionRegistry::new();
        too_new
            .register(ExtensionDescriptor::new("core", "3.0", noop))
            .register(
                ExtensionDescriptor::new("chat", "1.0", noop)
                    .depends_on(Dependency::on("core").max("2")),
            );
        assert!(matches!(too_new.resolve(), Err(ExtensionError::TooNew { .. })));

        let mut invalid = ExtensionRegistry::new();
        invalid.register(ExtensionDescriptor::new("core", "one", noop));
        assert!(matches!(
            invalid.resolve(),
            Err(ExtensionError::InvalidVersion { .. })
        ));
    }

    #[test]
    fn test_cycle_is_reported() {
        let mut registry = ExtensionRegistry::new();
        registry
            .register(ExtensionDescriptor::new("a", "1", noop).depends_on(Dependency::on("b")))
            .register(ExtensionDescriptor::new("b", "1", noop).depends_on(Dependency::on("a")))
            .register(ExtensionDescriptor::new("c", "1", noop));

        match registry.resolve() {
            Err(ExtensionError::Cycle(stuck)) => assert_eq!(stuck, ["a", "b"]),
            other => panic!("expected cycle, got {other:?}"),
        }
    }
}
