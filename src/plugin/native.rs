//! Native plugin loader (spec.md §4.3 "Native loader"): locates
//! `<id>.so`/`.dll`/`.dylib` and resolves a fixed C-linkage symbol set.
//! Missing symbols are tolerated and treated as no-op handlers, matching
//! the spec's guarantee that a native plugin need only export the handlers
//! it cares about.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};

use super::{BotFacade, Plugin, PluginInfo, PluginLoader, PluginMaps};
use crate::error::PluginError;
use crate::event::Event;

#[cfg(target_os = "windows")]
const EXTENSION: &str = "dll";
#[cfg(target_os = "macos")]
const EXTENSION: &str = "dylib";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const EXTENSION: &str = "so";

/// One fixed-position C ABI event handler: `(server, a0, a1, a2, a3)` as
/// null-terminated UTF-8 C strings, unused trailing args passed as `""`.
/// This generalizes every `onXxx` event shape into one signature so the
/// symbol table stays small and a plugin author only fills in what it uses.
type EventFn = unsafe extern "C" fn(*const c_char, *const c_char, *const c_char, *const c_char, *const c_char);
type LifecycleFn = unsafe extern "C" fn();
type OptionGetFn = unsafe extern "C" fn(*const c_char) -> *const c_char;
type OptionSetFn = unsafe extern "C" fn(*const c_char, *const c_char);
/// Returns a `'static` C string owned by the plugin; absent symbols leave
/// the corresponding identity string empty (spec.md §3 "Plugin").
type InfoFn = unsafe extern "C" fn() -> *const c_char;

pub struct NativeLoader;

impl NativeLoader {
    pub fn new() -> Self {
        NativeLoader
    }
}

impl Default for NativeLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginLoader for NativeLoader {
    fn name(&self) -> &'static str {
        "native"
    }

    fn locate(&self, id: &str, search_paths: &[PathBuf]) -> Option<PathBuf> {
        for dir in search_paths {
            let candidate = dir.join(format!("{id}.{EXTENSION}"));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }

    fn load(&self, id: &str, path: &Path, maps: PluginMaps) -> Result<Box<dyn Plugin>, PluginError> {
        // SAFETY: the loaded object is trusted plugin content, per spec.md
        // §1 scope (plugins are not sandboxed from the host process).
        let library = unsafe { Library::new(path) }
            .map_err(|e| PluginError::ExecError(format!("{}: {e}", path.display())))?;

        let mut handlers = NativeHandlers::default();
        unsafe {
            handlers.on_command = find_event_fn(&library, "irccd_onCommand");
            handlers.on_connect = find_event_fn(&library, "irccd_onConnect");
            handlers.on_disconnect = find_event_fn(&library, "irccd_onDisconnect");
            handlers.on_invite = find_event_fn(&library, "irccd_onInvite");
            handlers.on_join = find_event_fn(&library, "irccd_onJoin");
            handlers.on_kick = find_event_fn(&library, "irccd_onKick");
            handlers.on_me = find_event_fn(&library, "irccd_onMe");
            handlers.on_message = find_event_fn(&library, "irccd_onMessage");
            handlers.on_mode = find_event_fn(&library, "irccd_onMode");
            handlers.on_names = find_event_fn(&library, "irccd_onNames");
            handlers.on_nick = find_event_fn(&library, "irccd_onNick");
            handlers.on_notice = find_event_fn(&library, "irccd_onNotice");
            handlers.on_part = find_event_fn(&library, "irccd_onPart");
            handlers.on_topic = find_event_fn(&library, "irccd_onTopic");
            handlers.on_whois = find_event_fn(&library, "irccd_onWhois");
            handlers.on_load = find_lifecycle_fn(&library, "irccd_onLoad");
            handlers.on_reload = find_lifecycle_fn(&library, "irccd_onReload");
            handlers.on_unload = find_lifecycle_fn(&library, "irccd_onUnload");
            handlers.get_option = find_get_fn(&library, "irccd_get_option");
            handlers.set_option = find_set_fn(&library, "irccd_set_option");
        }

        let info = unsafe {
            PluginInfo {
                id: id.to_string(),
                author: read_info_str(&library, "irccd_author"),
                license: read_info_str(&library, "irccd_license"),
                summary: read_info_str(&library, "irccd_summary"),
                version: read_info_str(&library, "irccd_version"),
            }
        };

        Ok(Box::new(NativePlugin { info, maps, handlers, _library: library }))
    }
}

/// Resolves an optional `irccd_{author,license,summary,version}` symbol and
/// reads its returned C string. Missing symbols, or a null return, yield an
/// empty string (spec.md §3 identity strings are never required).
unsafe fn read_info_str(library: &Library, symbol: &str) -> String {
    let Some(f) = (unsafe { find_info_fn(library, symbol) }) else { return String::new() };
    let ptr = unsafe { f() };
    if ptr.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

unsafe fn find_info_fn(library: &Library, symbol: &str) -> Option<InfoFn> {
    unsafe { library.get::<InfoFn>(symbol.as_bytes()).ok().map(|sym: Symbol<InfoFn>| *sym) }
}

unsafe fn find_event_fn(library: &Library, symbol: &str) -> Option<EventFn> {
    unsafe {
        library.get::<EventFn>(symbol.as_bytes()).ok().map(|sym: Symbol<EventFn>| *sym)
    }
}

unsafe fn find_lifecycle_fn(library: &Library, symbol: &str) -> Option<LifecycleFn> {
    unsafe {
        library.get::<LifecycleFn>(symbol.as_bytes()).ok().map(|sym: Symbol<LifecycleFn>| *sym)
    }
}

unsafe fn find_get_fn(library: &Library, symbol: &str) -> Option<OptionGetFn> {
    unsafe {
        library.get::<OptionGetFn>(symbol.as_bytes()).ok().map(|sym: Symbol<OptionGetFn>| *sym)
    }
}

unsafe fn find_set_fn(library: &Library, symbol: &str) -> Option<OptionSetFn> {
    unsafe {
        library.get::<OptionSetFn>(symbol.as_bytes()).ok().map(|sym: Symbol<OptionSetFn>| *sym)
    }
}

#[derive(Default)]
struct NativeHandlers {
    on_command: Option<EventFn>,
    on_connect: Option<EventFn>,
    on_disconnect: Option<EventFn>,
    on_invite: Option<EventFn>,
    on_join: Option<EventFn>,
    on_kick: Option<EventFn>,
    on_me: Option<EventFn>,
    on_message: Option<EventFn>,
    on_mode: Option<EventFn>,
    on_names: Option<EventFn>,
    on_nick: Option<EventFn>,
    on_notice: Option<EventFn>,
    on_part: Option<EventFn>,
    on_topic: Option<EventFn>,
    on_whois: Option<EventFn>,
    on_load: Option<LifecycleFn>,
    on_reload: Option<LifecycleFn>,
    on_unload: Option<LifecycleFn>,
    get_option: Option<OptionGetFn>,
    set_option: Option<OptionSetFn>,
}

struct NativePlugin {
    info: PluginInfo,
    maps: PluginMaps,
    handlers: NativeHandlers,
    /// Kept alive for the plugin's lifetime; symbols borrow from it.
    _library: Library,
}

fn cstr(value: &str) -> CString {
    CString::new(value).unwrap_or_else(|_| CString::new("").unwrap())
}

fn call_event(f: Option<EventFn>, a0: &str, a1: &str, a2: &str, a3: &str, a4: &str) {
    let Some(f) = f else { return };
    let (c0, c1, c2, c3, c4) = (cstr(a0), cstr(a1), cstr(a2), cstr(a3), cstr(a4));
    unsafe { f(c0.as_ptr(), c1.as_ptr(), c2.as_ptr(), c3.as_ptr(), c4.as_ptr()) };
}

impl Plugin for NativePlugin {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    fn maps(&self) -> &PluginMaps {
        &self.maps
    }

    fn maps_mut(&mut self) -> &mut PluginMaps {
        &mut self.maps
    }

    fn on_load(&mut self, _facade: &BotFacade) -> Result<(), PluginError> {
        for (key, value) in &self.maps.options {
            if let Some(set) = self.handlers.set_option {
                let (k, v) = (cstr(key), cstr(value));
                unsafe { set(k.as_ptr(), v.as_ptr()) };
            }
        }
        if let Some(f) = self.handlers.on_load {
            unsafe { f() };
        }
        Ok(())
    }

    fn on_reload(&mut self, _facade: &BotFacade) -> Result<(), PluginError> {
        if let Some(f) = self.handlers.on_reload {
            unsafe { f() };
        }
        Ok(())
    }

    fn on_unload(&mut self, _facade: &BotFacade) {
        if let Some(f) = self.handlers.on_unload {
            unsafe { f() };
        }
    }

    fn dispatch(&mut self, event: &Event, _facade: &BotFacade) -> Result<(), PluginError> {
        let server = event.server();
        match event {
            Event::Connect { .. } => call_event(self.handlers.on_connect, server, "", "", "", ""),
            Event::Disconnect { .. } => call_event(self.handlers.on_disconnect, server, "", "", "", ""),
            Event::Invite { origin, channel, .. } => {
                call_event(self.handlers.on_invite, server, origin, channel, "", "")
            }
            Event::Join { origin, channel, .. } => call_event(self.handlers.on_join, server, origin, channel, "", ""),
            Event::Kick { origin, channel, target, reason, .. } => {
                call_event(self.handlers.on_kick, server, origin, channel, target, reason)
            }
            Event::Me { origin, channel, message, .. } => {
                call_event(self.handlers.on_me, server, origin, channel, message, "")
            }
            Event::Message { origin, channel, message, .. } => {
                call_event(self.handlers.on_message, server, origin, channel, message, "")
            }
            Event::Mode { origin, channel, mode, .. } => {
                call_event(self.handlers.on_mode, server, origin, channel, mode, "")
            }
            Event::Names { channel, .. } => call_event(self.handlers.on_names, server, channel, "", "", ""),
            Event::Nick { origin, nickname, .. } => call_event(self.handlers.on_nick, server, origin, nickname, "", ""),
            Event::Notice { origin, message, .. } => call_event(self.handlers.on_notice, server, origin, message, "", ""),
            Event::Part { origin, channel, reason, .. } => {
                call_event(self.handlers.on_part, server, origin, channel, reason, "")
            }
            Event::Topic { origin, channel, topic, .. } => {
                call_event(self.handlers.on_topic, server, origin, channel, topic, "")
            }
            Event::Whois { nickname, username, hostname, realname } => {
                call_event(self.handlers.on_whois, server, nickname, username, hostname, realname)
            }
            Event::Command { origin, channel, message, .. } => {
                call_event(self.handlers.on_command, server, origin, channel, message, "")
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locate_misses_when_no_file() {
        let loader = NativeLoader::new();
        assert!(loader.locate("nope", &[PathBuf::from("/nonexistent")]).is_none());
    }
}
