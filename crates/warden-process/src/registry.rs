use std::{collections::BTreeMap, sync::Arc};

use crate::{
    GameKey,
    descriptor::{GameConfig, GameDescriptor},
};

/// Read-only set of validated game descriptors, keyed by lowercase key.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    games: BTreeMap<GameKey, Arc<GameDescriptor>>,
}

impl Registry {
    /// Builds the registry from raw config entries.
    ///
    /// Invalid entries are logged and left out; the build itself never fails.
    pub fn build(configs: impl IntoIterator<Item = (String, GameConfig)>) -> Self {
        let mut games = BTreeMap::new();

        for (raw_key, cfg) in configs {
            let descriptor = match GameDescriptor::from_config(&raw_key, cfg) {
                Ok(d) => d,
                Err(e) => {
                    tracing::error!(game = %raw_key, error = %e, "skipping game config");
                    continue;
                }
            };

            if games.contains_key(&descriptor.key) {
                tracing::warn!(
                    game = %raw_key,
                    key = %descriptor.key,
                    "duplicate game key after lowercasing; keeping the first entry"
                );
                continue;
            }

            tracing::info!(
                game = %descriptor.key,
                startup_secs = descriptor.startup_time.as_secs_f64(),
                shutdown_secs = descriptor.shutdown_time.as_secs_f64(),
                "registered game server"
            );
            games.insert(descriptor.key.clone(), Arc::new(descriptor));
        }

        Self { games }
    }

    pub fn lookup(&self, key: &str) -> Option<&Arc<GameDescriptor>> {
        self.games.get(&GameKey::new(key))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<GameDescriptor>> {
        self.games.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &GameKey> {
        self.games.keys()
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }
}
