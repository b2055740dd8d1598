//! Plugin runtime (spec.md §4.3): the capability-table contract plugins
//! implement, the loader strategy that materializes them from a name or
//! path, and the registry the bot keeps them in.
//!
//! DESIGN NOTES §9 "Dynamic dispatch over events": rather than a virtual
//! base class with one override per event, a plugin here is a table of
//! `Option<Box<dyn Fn(...)>>`-shaped handlers built by whichever loader
//! resolved it; a loader fills in only the handlers the plugin source
//! actually exports, and `Plugin::dispatch` no-ops on the rest.

pub mod facade;
pub mod js;
pub mod native;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::PluginError;
use crate::event::Event;

pub use facade::{BotFacade, TimerHandle, TimerKind, TimerSink};

/// The three named-map configuration surfaces every plugin exposes
/// (spec.md §3 "Plugin"): options/templates/paths.
#[derive(Debug, Clone, Default)]
pub struct PluginMaps {
    pub options: BTreeMap<String, String>,
    pub templates: BTreeMap<String, String>,
    pub paths: BTreeMap<String, String>,
}

/// Identity strings carried by every loaded plugin (spec.md §3 "Plugin").
#[derive(Debug, Clone, Default)]
pub struct PluginInfo {
    pub id: String,
    pub author: String,
    pub license: String,
    pub summary: String,
    pub version: String,
}

/// The capability set a loaded plugin exposes: one handler per event kind,
/// plus the lifecycle triple. Handlers run on the main loop with a
/// `&BotFacade` for callbacks (spec.md §4.3); they must not block.
/// Not `Send`: a JS-backed plugin owns a `boa_engine::Context`, whose GC'd
/// values are `Rc`-based. This is fine because the whole bot runs on a
/// single-threaded `tokio` runtime (spec.md §4.1/§5 "single-threaded
/// cooperative reactor") via `LocalSet`/`spawn_local`, so plugins are never
/// moved across threads.
pub trait Plugin {
    fn info(&self) -> &PluginInfo;
    fn maps(&self) -> &PluginMaps;
    fn maps_mut(&mut self) -> &mut PluginMaps;

    fn on_load(&mut self, facade: &BotFacade) -> Result<(), PluginError>;
    fn on_reload(&mut self, facade: &BotFacade) -> Result<(), PluginError>;
    fn on_unload(&mut self, facade: &BotFacade);

    /// Dispatches one event to whichever handler matches `event.handler_name()`.
    /// Errors are logged by the caller (spec.md §7: "caught, logged at
    /// warning... do not propagate into the loop") — this trait itself
    /// returns a `Result` only so a loader can report it once, not so it
    /// escapes into the reactor.
    fn dispatch(&mut self, event: &Event, facade: &BotFacade) -> Result<(), PluginError>;

    /// Invoked when one of this plugin's `Irccd.Timer` callbacks fires
    /// (spec.md §4.3(d)). Native plugins have no timer ABI symbol, so the
    /// default is a no-op; the JS loader overrides it to re-enter the
    /// script context and call the registered callback.
    fn fire_timer(&mut self, _timer_id: u64, _facade: &BotFacade) {}
}

/// Strategy for materializing a `Plugin` given an id and a search path
/// (spec.md §4.3 "PluginLoader"). The runtime holds an ordered list;
/// resolution picks the first loader whose `locate` succeeds.
pub trait PluginLoader {
    /// Human-readable name for log messages (`"javascript"`, `"native"`).
    fn name(&self) -> &'static str;

    /// Finds the plugin source/binary for `id` under one of `search_paths`,
    /// returning the resolved path if this loader can handle it.
    fn locate(&self, id: &str, search_paths: &[PathBuf]) -> Option<PathBuf>;

    /// Loads the plugin at `path`, already known to satisfy `locate`.
    fn load(
        &self,
        id: &str,
        path: &Path,
        maps: PluginMaps,
    ) -> Result<Box<dyn Plugin>, PluginError>;
}

/// Ordered list of loaders plus the configured search paths, used to
/// resolve a bare plugin id to a loaded `Plugin` (`plugin-load`/`plugin-reload`).
pub struct LoaderChain {
    loaders: Vec<Box<dyn PluginLoader>>,
    search_paths: Vec<PathBuf>,
}

impl LoaderChain {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        LoaderChain { loaders: Vec::new(), search_paths }
    }

    /// The two mandatory loaders (spec.md §4.3), installed in the order the
    /// bot checks `<id>.js` before `<id>.so`/`.dll`/`.dylib`.
    pub fn with_defaults(search_paths: Vec<PathBuf>) -> Self {
        let mut chain = LoaderChain::new(search_paths);
        chain.push(Box::new(js::JsLoader::new()));
        chain.push(Box::new(native::NativeLoader::new()));
        chain
    }

    pub fn push(&mut self, loader: Box<dyn PluginLoader>) {
        self.loaders.push(loader);
    }

    /// Resolves `id` (or an explicit `location` override from config) to
    /// a loaded plugin via the first loader that locates it.
    pub fn resolve(
        &self,
        id: &str,
        explicit_location: Option<&Path>,
        maps: PluginMaps,
    ) -> Result<Box<dyn Plugin>, PluginError> {
        if let Some(path) = explicit_location {
            for loader in &self.loaders {
                if loader.locate(id, &[path.parent().unwrap_or(path).to_path_buf()]).as_deref() == Some(path)
                    || path.exists()
                {
                    return loader.load(id, path, maps);
                }
            }
            return Err(PluginError::NotFound(id.to_string()));
        }

        for loader in &self.loaders {
            if let Some(path) = loader.locate(id, &self.search_paths) {
                return loader.load(id, &path, maps);
            }
        }

        Err(PluginError::NotFound(id.to_string()))
    }
}

/// The bot's loaded-plugin table (spec.md §3 "Plugin" lifecycle). Owns
/// every `Plugin` trait object; `id` uniqueness is enforced at `insert`.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Box<dyn Plugin>>,
    /// Registration order, independent of the `BTreeMap`'s sorted iteration,
    /// so dispatch honors spec.md §4.3 "stable order (registration order)".
    order: Vec<String>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.plugins.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&dyn Plugin> {
        self.plugins.get(id).map(|b| b.as_ref())
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut dyn Plugin> {
        self.plugins.get_mut(id).map(|b| b.as_mut())
    }

    pub fn insert(&mut self, id: String, plugin: Box<dyn Plugin>) -> Result<(), PluginError> {
        if self.plugins.contains_key(&id) {
            return Err(PluginError::AlreadyExists(id));
        }
        self.order.push(id.clone());
        self.plugins.insert(id, plugin);
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Result<Box<dyn Plugin>, PluginError> {
        let plugin = self.plugins.remove(id).ok_or_else(|| PluginError::NotFound(id.to_string()))?;
        self.order.retain(|existing| existing != id);
        Ok(plugin)
    }

    /// Every loaded plugin's id, in registration order (spec.md §4.3).
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Dispatches `event` to every loaded plugin in registration order.
    /// Caller is expected to have already consulted the rule engine per
    /// plugin; `skip` filters out plugins the rule engine dropped.
    pub fn dispatch_all(
        &mut self,
        event: &Event,
        facade: &BotFacade,
        mut skip: impl FnMut(&str) -> bool,
    ) {
        for id in self.order.clone() {
            if skip(&id) {
                tracing::debug!(plugin = %id, event = event.handler_name(), "rule engine dropped event");
                continue;
            }
            let Some(plugin) = self.plugins.get_mut(&id) else { continue };
            if let Err(err) = plugin.dispatch(event, facade) {
                tracing::warn!(plugin = %id, error = %err, "plugin handler raised an error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop(PluginInfo, PluginMaps);

    impl Plugin for Noop {
        fn info(&self) -> &PluginInfo {
            &self.0
        }
        fn maps(&self) -> &PluginMaps {
            &self.1
        }
        fn maps_mut(&mut self) -> &mut PluginMaps {
            &mut self.1
        }
        fn on_load(&mut self, _facade: &BotFacade) -> Result<(), PluginError> {
            Ok(())
        }
        fn on_reload(&mut self, _facade: &BotFacade) -> Result<(), PluginError> {
            Ok(())
        }
        fn on_unload(&mut self, _facade: &BotFacade) {}
        fn dispatch(&mut self, _event: &Event, _facade: &BotFacade) -> Result<(), PluginError> {
            Ok(())
        }
    }

    fn noop(id: &str) -> Box<dyn Plugin> {
        Box::new(Noop(PluginInfo { id: id.to_string(), ..Default::default() }, PluginMaps::default()))
    }

    #[test]
    fn duplicate_id_rejected() {
        let mut registry = PluginRegistry::new();
        registry.insert("a".into(), noop("a")).unwrap();
        assert!(matches!(registry.insert("a".into(), noop("a")), Err(PluginError::AlreadyExists(_))));
    }

    #[test]
    fn remove_unknown_errors() {
        let mut registry = PluginRegistry::new();
        assert!(matches!(registry.remove("nope"), Err(PluginError::NotFound(_))));
    }

    #[test]
    fn ids_preserve_registration_order() {
        let mut registry = PluginRegistry::new();
        registry.insert("b".into(), noop("b")).unwrap();
        registry.insert("a".into(), noop("a")).unwrap();
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["b", "a"]);
    }
}
