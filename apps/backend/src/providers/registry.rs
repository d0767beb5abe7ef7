//! How to register a provider
//!
//! 1) Implement `ActionProvider` for your type in its module.
//! 2) Add a `ProviderFactory` entry to the static list with stable `name`
//!    and `version`.
//! 3) Keep ordering stable; avoid side effects in constructors.
//! 4) Determinism: same seed and same spec must produce the same behavior.

use std::sync::Arc;

use crate::config::AutomatedSeatSpec;
use crate::providers::{ActionProvider, RandomProvider, ScriptedProvider, TitForTatProvider};

/// Factory definition for constructing provider implementations.
pub struct ProviderFactory {
    pub name: &'static str,
    pub version: &'static str,
    pub make: fn(&AutomatedSeatSpec) -> Arc<dyn ActionProvider>,
}

static PROVIDER_FACTORIES: &[ProviderFactory] = &[
    ProviderFactory {
        name: RandomProvider::NAME,
        version: RandomProvider::VERSION,
        make: make_random,
    },
    ProviderFactory {
        name: TitForTatProvider::NAME,
        version: TitForTatProvider::VERSION,
        make: make_tit_for_tat,
    },
    ProviderFactory {
        name: ScriptedProvider::NAME,
        version: ScriptedProvider::VERSION,
        make: make_scripted,
    },
];

/// Returns the statically registered provider factories.
pub fn registered_providers() -> &'static [ProviderFactory] {
    PROVIDER_FACTORIES
}

/// Construct a provider from an automated seat spec, or `None` for an
/// unknown provider name.
pub fn create_provider(spec: &AutomatedSeatSpec) -> Option<Arc<dyn ActionProvider>> {
    PROVIDER_FACTORIES
        .iter()
        .find(|f| f.name == spec.provider)
        .map(|f| (f.make)(spec))
}

fn make_random(spec: &AutomatedSeatSpec) -> Arc<dyn ActionProvider> {
    Arc::new(RandomProvider::new(spec.seed))
}

fn make_tit_for_tat(_spec: &AutomatedSeatSpec) -> Arc<dyn ActionProvider> {
    Arc::new(TitForTatProvider::new())
}

fn make_scripted(spec: &AutomatedSeatSpec) -> Arc<dyn ActionProvider> {
    Arc::new(ScriptedProvider::new(
        spec.script.clone(),
        spec.chat_script.clone(),
    ))
}
