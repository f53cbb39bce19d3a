//! Stage construction by name.
//!
//! The orchestrator never builds stages itself; it asks an injected
//! [`StageFactory`]. [`StageRegistry`] is the map-backed implementation.

use super::Stage;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Builds the stage registered under a name.
pub trait StageFactory: Send + Sync {
    /// Returns the stage for `name`, or `None` if it cannot be built.
    fn create_stage(&self, name: &str) -> Option<Arc<dyn Stage>>;
}

impl<F> StageFactory for F
where
    F: Fn(&str) -> Option<Arc<dyn Stage>> + Send + Sync,
{
    fn create_stage(&self, name: &str) -> Option<Arc<dyn Stage>> {
        self(name)
    }
}

/// Constructor function type for stages.
pub type StageConstructor = Box<dyn Fn() -> Arc<dyn Stage> + Send + Sync>;

/// Map from stage name to constructor.
#[derive(Default)]
pub struct StageRegistry {
    constructors: HashMap<String, StageConstructor>,
}

impl StageRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructor, replacing any previous one for `name`.
    pub fn register(&mut self, name: impl Into<String>, constructor: StageConstructor) {
        self.constructors.insert(name.into(), constructor);
    }

    /// Registers a constructor (builder style).
    #[must_use]
    pub fn with_stage(mut self, name: impl Into<String>, constructor: StageConstructor) -> Self {
        self.register(name, constructor);
        self
    }

    /// Registers a single shared instance that every lookup returns.
    #[must_use]
    pub fn with_instance(self, stage: Arc<dyn Stage>) -> Self {
        let name = stage.name().to_string();
        self.with_stage(name, Box::new(move || Arc::clone(&stage)))
    }

    /// Returns true if a constructor is registered for `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Registered stage names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.keys().cloned().collect();
        names.sort();
        names
    }
}

impl StageFactory for StageRegistry {
    fn create_stage(&self, name: &str) -> Option<Arc<dyn Stage>> {
        self.constructors.get(name).map(|constructor| constructor())
    }
}

impl fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageRegistry")
            .field("stages", &self.names())
            .finish()
    }
}
