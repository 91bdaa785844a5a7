//! Registered process variants.

use std::collections::BTreeMap;
use std::fmt;

use super::{DEFAULT_OUTPUT_CEILING, LaunchSpec, ProcessAction};

/// Key of the built-in variant that spawns an OS command.
pub const OS_COMMAND_KIND: &str = "os_command";

/// Builds an unstarted action from a launch and the buffer ceiling.
pub type ActionFactory = fn(LaunchSpec, usize) -> ProcessAction;

/// Closed set of process variants a template may name in its `kind`.
///
/// Variants are registered explicitly at startup; templates naming any
/// other key fail to load.
#[derive(Clone)]
pub struct ActionKinds {
    factories: BTreeMap<String, ActionFactory>,
    ceiling: usize,
}

impl fmt::Debug for ActionKinds {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ActionKinds")
            .field("kinds", &self.factories.keys().collect::<Vec<_>>())
            .field("ceiling", &self.ceiling)
            .finish()
    }
}

impl Default for ActionKinds {
    fn default() -> Self {
        Self::builtin(DEFAULT_OUTPUT_CEILING)
    }
}

impl ActionKinds {
    /// Registers the built-in variants with the given buffer ceiling.
    #[must_use]
    pub fn builtin(ceiling: usize) -> Self {
        Self {
            factories: BTreeMap::new(),
            ceiling,
        }
        .with_kind(OS_COMMAND_KIND, ProcessAction::new)
    }

    /// Adds or replaces a variant.
    #[must_use]
    pub fn with_kind(mut self, key: impl Into<String>, factory: ActionFactory) -> Self {
        self.factories.insert(key.into(), factory);
        self
    }

    /// Returns `true` when `key` names a registered variant.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.factories.contains_key(key)
    }

    /// Registered keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Output buffer ceiling applied to created actions.
    #[must_use]
    pub const fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Creates an unstarted action of the given variant.
    #[must_use]
    pub fn create(&self, key: &str, launch: LaunchSpec) -> Option<ProcessAction> {
        self.factories
            .get(key)
            .map(|factory| factory(launch, self.ceiling))
    }
}
