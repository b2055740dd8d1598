//! Javascript plugin loader (spec.md §4.3 "Javascript loader"): locates
//! `<id>.js`, instantiates an embedded `boa_engine` context, installs the
//! `Irccd.*` host API, and binds the script's exported `onXxx` globals as
//! the handler table.
//!
//! DESIGN NOTES §9 "Embedded ECMAScript": every call from Rust into the
//! script (load/reload/unload/dispatch/timer) goes through
//! [`JsPlugin::enter`], a scoped guard that makes the calling plugin's
//! façade and id available to the native host functions for exactly the
//! duration of that call (via a thread-local, safe because the whole bot
//! runs on one OS thread, §4.1/§5) and translates an uncaught script
//! exception into a logged warning instead of letting it escape into the
//! reactor.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use boa_engine::object::ObjectInitializer;
use boa_engine::property::Attribute;
use boa_engine::{Context, JsArgs, JsError, JsResult, JsValue, NativeFunction, Source, js_string};

use super::{BotFacade, Plugin, PluginInfo, PluginLoader, PluginMaps, TimerKind};
use crate::error::PluginError;
use crate::event::Event;

thread_local! {
    static CURRENT: RefCell<Option<(*const BotFacade, String)>> = const { RefCell::new(None) };
}

/// RAII guard installing `(facade, plugin_id)` for the thread-local host
/// functions to read, for the duration of one call into the script.
struct ScopedEntry;

impl ScopedEntry {
    fn enter(facade: &BotFacade, plugin_id: &str) -> Self {
        CURRENT.with(|cell| {
            *cell.borrow_mut() = Some((facade as *const BotFacade, plugin_id.to_string()));
        });
        ScopedEntry
    }
}

impl Drop for ScopedEntry {
    fn drop(&mut self) {
        CURRENT.with(|cell| *cell.borrow_mut() = None);
    }
}

/// Runs `body` with the current call's facade, or returns `undefined` if
/// invoked outside of a scoped entry (shouldn't happen in practice, since
/// every script entry point goes through `JsPlugin::enter`).
fn with_current<R>(default: R, body: impl FnOnce(&BotFacade, &str) -> R) -> R {
    CURRENT.with(|cell| match &*cell.borrow() {
        // SAFETY: the pointer is only live between `ScopedEntry::enter` and
        // its `Drop`, which brackets every synchronous call into the
        // script; the script cannot retain it past that call.
        Some((ptr, id)) => body(unsafe { &**ptr }, id),
        None => default,
    })
}

fn arg_str(args: &[JsValue], index: usize, context: &mut Context) -> String {
    args.get_or_undefined(index).to_string(context).map(|s| s.to_std_string_escaped()).unwrap_or_default()
}

pub struct JsLoader;

impl JsLoader {
    pub fn new() -> Self {
        JsLoader
    }
}

impl Default for JsLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginLoader for JsLoader {
    fn name(&self) -> &'static str {
        "javascript"
    }

    fn locate(&self, id: &str, search_paths: &[PathBuf]) -> Option<PathBuf> {
        for dir in search_paths {
            let candidate = dir.join(format!("{id}.js"));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }

    fn load(&self, id: &str, path: &Path, maps: PluginMaps) -> Result<Box<dyn Plugin>, PluginError> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| PluginError::ExecError(format!("{}: {e}", path.display())))?;

        let mut context = Context::default();
        let timers: Rc<RefCell<HashMap<u64, JsValue>>> = Rc::new(RefCell::new(HashMap::new()));
        install_host_api(&mut context, timers.clone())
            .map_err(|e| PluginError::ExecError(format!("installing host API: {}", error_message(&e, &mut context))))?;

        context
            .eval(Source::from_bytes(&source))
            .map_err(|e| PluginError::ExecError(format!("{}: {}", path.display(), error_message(&e, &mut context))))?;

        let info = read_info(&mut context, id);

        Ok(Box::new(JsPlugin { info, maps, context, timers }))
    }
}

fn error_message(err: &JsError, context: &mut Context) -> String {
    err.to_opaque(context).display().to_string()
}

/// Reads the script's declared `info = { author, license, summary, version }`
/// global (spec.md §3 "Plugin" identity strings; grounded on
/// `examples/original_source/lib/irccd/cmd-plugin-info.cpp`'s
/// `plugin->info().{author,license,summary,version}`). Any field the script
/// omits, or the whole object if the script never declares `info`, is left
/// as an empty string.
fn read_info(context: &mut Context, id: &str) -> PluginInfo {
    let mut info = PluginInfo { id: id.to_string(), ..Default::default() };

    let Ok(value) = context.global_object().get(js_string!("info"), context) else { return info };
    let Some(object) = value.as_object() else { return info };

    let field = |context: &mut Context, name: &str| -> String {
        object
            .get(js_string!(name), context)
            .ok()
            .filter(|v| !v.is_undefined())
            .and_then(|v| v.to_string(context).ok())
            .map(|s| s.to_std_string_escaped())
            .unwrap_or_default()
    };

    info.author = field(context, "author");
    info.license = field(context, "license");
    info.summary = field(context, "summary");
    info.version = field(context, "version");
    info
}

/// Installs `Irccd`, `Irccd.Server`, `Irccd.Logger`, `Irccd.File`,
/// `Irccd.Directory`, `Irccd.System`, `Irccd.Timer`, `Irccd.Unicode`,
/// `Irccd.Util`, `Irccd.Plugin` (spec.md §4.3). Every native function reads
/// the calling plugin's façade through [`with_current`].
fn install_host_api(context: &mut Context, timers: Rc<RefCell<HashMap<u64, JsValue>>>) -> JsResult<()> {
    let server = ObjectInitializer::new(context)
        .function(NativeFunction::from_fn_ptr(server_list), js_string!("list"), 0)
        .function(NativeFunction::from_fn_ptr(server_send), js_string!("send"), 2)
        .function(NativeFunction::from_fn_ptr(server_message), js_string!("message"), 3)
        .function(NativeFunction::from_fn_ptr(server_notice), js_string!("notice"), 3)
        .function(NativeFunction::from_fn_ptr(server_me), js_string!("me"), 3)
        .function(NativeFunction::from_fn_ptr(server_join), js_string!("join"), 3)
        .function(NativeFunction::from_fn_ptr(server_part), js_string!("part"), 3)
        .function(NativeFunction::from_fn_ptr(server_kick), js_string!("kick"), 4)
        .function(NativeFunction::from_fn_ptr(server_invite), js_string!("invite"), 3)
        .function(NativeFunction::from_fn_ptr(server_mode), js_string!("mode"), 3)
        .function(NativeFunction::from_fn_ptr(server_names), js_string!("names"), 2)
        .function(NativeFunction::from_fn_ptr(server_topic), js_string!("topic"), 3)
        .function(NativeFunction::from_fn_ptr(server_whois), js_string!("whois"), 2)
        .function(NativeFunction::from_fn_ptr(server_nick), js_string!("nick"), 2)
        .build();

    let logger = ObjectInitializer::new(context)
        .function(NativeFunction::from_fn_ptr(logger_info), js_string!("info"), 1)
        .function(NativeFunction::from_fn_ptr(logger_warning), js_string!("warning"), 1)
        .function(NativeFunction::from_fn_ptr(logger_debug), js_string!("debug"), 1)
        .build();

    let file = ObjectInitializer::new(context)
        .function(NativeFunction::from_fn_ptr(file_read), js_string!("read"), 1)
        .function(NativeFunction::from_fn_ptr(file_write), js_string!("write"), 2)
        .function(NativeFunction::from_fn_ptr(file_exists), js_string!("exists"), 1)
        .build();

    let directory = ObjectInitializer::new(context)
        .function(NativeFunction::from_fn_ptr(directory_list), js_string!("list"), 1)
        .build();

    let system = ObjectInitializer::new(context)
        .function(NativeFunction::from_fn_ptr(system_name), js_string!("name"), 0)
        .function(NativeFunction::from_fn_ptr(system_uptime), js_string!("uptime"), 0)
        .build();

    let unicode = ObjectInitializer::new(context)
        .function(NativeFunction::from_fn_ptr(unicode_is_letter), js_string!("isLetter"), 1)
        .function(NativeFunction::from_fn_ptr(unicode_is_digit), js_string!("isDigit"), 1)
        .function(NativeFunction::from_fn_ptr(unicode_is_space), js_string!("isSpace"), 1)
        .build();

    let util = ObjectInitializer::new(context)
        .function(NativeFunction::from_fn_ptr(util_format), js_string!("format"), 2)
        .build();

    let plugin = ObjectInitializer::new(context)
        .function(NativeFunction::from_fn_ptr(plugin_info), js_string!("info"), 0)
        .build();

    let timer_start = {
        let timers = timers.clone();
        NativeFunction::from_copy_closure_with_captures(
            move |_this, args, captured, context| {
                let kind = if arg_str(args, 0, context) == "single" { TimerKind::Single } else { TimerKind::Periodic };
                let delay = args.get_or_undefined(1).to_uint32(context).unwrap_or(1000) as u64;
                let callback = args.get_or_undefined(2).clone();
                let id = with_current(0u64, |facade, plugin_id| {
                    facade.start_timer(plugin_id, kind, delay).id
                });
                captured.borrow_mut().insert(id, callback);
                Ok(JsValue::from(id as f64))
            },
            timers,
        )
    };

    let timer_clear = {
        let timers = timers.clone();
        NativeFunction::from_copy_closure_with_captures(
            move |_this, args, captured, context| {
                let id = args.get_or_undefined(0).to_uint32(context).unwrap_or(0) as u64;
                captured.borrow_mut().remove(&id);
                Ok(JsValue::undefined())
            },
            timers,
        )
    };

    let timer = ObjectInitializer::new(context)
        .function(timer_start, js_string!("start"), 3)
        .function(timer_clear, js_string!("clear"), 1)
        .build();

    let irccd = ObjectInitializer::new(context)
        .property(js_string!("Server"), server, Attribute::all())
        .property(js_string!("Logger"), logger, Attribute::all())
        .property(js_string!("File"), file, Attribute::all())
        .property(js_string!("Directory"), directory, Attribute::all())
        .property(js_string!("System"), system, Attribute::all())
        .property(js_string!("Timer"), timer, Attribute::all())
        .property(js_string!("Unicode"), unicode, Attribute::all())
        .property(js_string!("Util"), util, Attribute::all())
        .property(js_string!("Plugin"), plugin, Attribute::all())
        .build();

    context.register_global_property(js_string!("Irccd"), irccd, Attribute::all())?;
    Ok(())
}

fn server_list(_this: &JsValue, _args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let ids = with_current(Vec::new(), |facade, _| facade.server_ids());
    let values: Vec<JsValue> = ids.into_iter().map(|id| JsValue::from(js_string!(id.as_str()))).collect();
    Ok(JsValue::from(boa_engine::object::builtins::JsArray::from_iter(values, context)))
}

fn server_send(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let server = arg_str(args, 0, context);
    let raw = arg_str(args, 1, context);
    let _ = with_current(Ok(()), |facade, _| facade.send(&server, &raw)).ok();
    Ok(JsValue::undefined())
}

fn server_message(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let (server, target, msg) = (arg_str(args, 0, context), arg_str(args, 1, context), arg_str(args, 2, context));
    let _ = with_current((), |facade, _| { let _ = facade.message(&server, &target, &msg); });
    Ok(JsValue::undefined())
}

fn server_notice(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let (server, target, msg) = (arg_str(args, 0, context), arg_str(args, 1, context), arg_str(args, 2, context));
    let _ = with_current((), |facade, _| { let _ = facade.notice(&server, &target, &msg); });
    Ok(JsValue::undefined())
}

fn server_me(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let (server, target, msg) = (arg_str(args, 0, context), arg_str(args, 1, context), arg_str(args, 2, context));
    let _ = with_current((), |facade, _| { let _ = facade.me(&server, &target, &msg); });
    Ok(JsValue::undefined())
}

fn server_join(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let (server, channel) = (arg_str(args, 0, context), arg_str(args, 1, context));
    let key = if args.get_or_undefined(2).is_undefined() { None } else { Some(arg_str(args, 2, context)) };
    let _ = with_current((), |facade, _| { let _ = facade.join(&server, &channel, key.as_deref()); });
    Ok(JsValue::undefined())
}

fn server_part(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let (server, channel) = (arg_str(args, 0, context), arg_str(args, 1, context));
    let reason = if args.get_or_undefined(2).is_undefined() { None } else { Some(arg_str(args, 2, context)) };
    let _ = with_current((), |facade, _| { let _ = facade.part(&server, &channel, reason.as_deref()); });
    Ok(JsValue::undefined())
}

fn server_kick(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let (server, channel, target) =
        (arg_str(args, 0, context), arg_str(args, 1, context), arg_str(args, 2, context));
    let reason = if args.get_or_undefined(3).is_undefined() { None } else { Some(arg_str(args, 3, context)) };
    let _ = with_current((), |facade, _| { let _ = facade.kick(&server, &channel, &target, reason.as_deref()); });
    Ok(JsValue::undefined())
}

fn server_invite(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let (server, target, channel) =
        (arg_str(args, 0, context), arg_str(args, 1, context), arg_str(args, 2, context));
    let _ = with_current((), |facade, _| { let _ = facade.invite(&server, &target, &channel); });
    Ok(JsValue::undefined())
}

fn server_mode(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let (server, target, mode) = (arg_str(args, 0, context), arg_str(args, 1, context), arg_str(args, 2, context));
    let _ = with_current((), |facade, _| { let _ = facade.mode(&server, &target, &mode, &[]); });
    Ok(JsValue::undefined())
}

fn server_names(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let (server, channel) = (arg_str(args, 0, context), arg_str(args, 1, context));
    let _ = with_current((), |facade, _| { let _ = facade.names(&server, &channel); });
    Ok(JsValue::undefined())
}

fn server_topic(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let (server, channel, topic) = (arg_str(args, 0, context), arg_str(args, 1, context), arg_str(args, 2, context));
    let _ = with_current((), |facade, _| { let _ = facade.topic(&server, &channel, &topic); });
    Ok(JsValue::undefined())
}

fn server_whois(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let (server, target) = (arg_str(args, 0, context), arg_str(args, 1, context));
    let _ = with_current((), |facade, _| { let _ = facade.whois(&server, &target); });
    Ok(JsValue::undefined())
}

fn server_nick(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let (server, nickname) = (arg_str(args, 0, context), arg_str(args, 1, context));
    let _ = with_current((), |facade, _| { let _ = facade.nick(&server, &nickname); });
    Ok(JsValue::undefined())
}

fn logger_info(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let msg = arg_str(args, 0, context);
    with_current((), |facade, plugin| facade.log_info(plugin, &msg));
    Ok(JsValue::undefined())
}

fn logger_warning(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let msg = arg_str(args, 0, context);
    with_current((), |facade, plugin| facade.log_warning(plugin, &msg));
    Ok(JsValue::undefined())
}

fn logger_debug(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let msg = arg_str(args, 0, context);
    with_current((), |facade, plugin| facade.log_debug(plugin, &msg));
    Ok(JsValue::undefined())
}

fn file_read(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let path = arg_str(args, 0, context);
    let content = with_current(None, |facade, _| facade.file_read(Path::new(&path)).ok());
    Ok(match content {
        Some(c) => JsValue::from(js_string!(c.as_str())),
        None => JsValue::null(),
    })
}

fn file_write(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let (path, content) = (arg_str(args, 0, context), arg_str(args, 1, context));
    let ok = with_current(false, |facade, _| facade.file_write(Path::new(&path), &content).is_ok());
    Ok(JsValue::from(ok))
}

fn file_exists(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let path = arg_str(args, 0, context);
    let exists = with_current(false, |facade, _| facade.file_exists(Path::new(&path)));
    Ok(JsValue::from(exists))
}

fn directory_list(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let path = arg_str(args, 0, context);
    let entries = with_current(Vec::new(), |facade, _| facade.directory_list(Path::new(&path)).unwrap_or_default());
    let values: Vec<JsValue> = entries.into_iter().map(|e| JsValue::from(js_string!(e.as_str()))).collect();
    Ok(JsValue::from(boa_engine::object::builtins::JsArray::from_iter(values, context)))
}

fn system_name(_this: &JsValue, _args: &[JsValue], _context: &mut Context) -> JsResult<JsValue> {
    Ok(JsValue::from(js_string!(std::env::consts::OS)))
}

fn system_uptime(_this: &JsValue, _args: &[JsValue], _context: &mut Context) -> JsResult<JsValue> {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    Ok(JsValue::from(secs as f64))
}

fn unicode_is_letter(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let s = arg_str(args, 0, context);
    Ok(JsValue::from(s.chars().next().is_some_and(char::is_alphabetic)))
}

fn unicode_is_digit(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let s = arg_str(args, 0, context);
    Ok(JsValue::from(s.chars().next().is_some_and(|c| c.is_ascii_digit())))
}

fn unicode_is_space(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let s = arg_str(args, 0, context);
    Ok(JsValue::from(s.chars().next().is_some_and(char::is_whitespace)))
}

/// `Irccd.Util.format(text, keywords)`: bridges to [`crate::template::format`]
/// (spec.md §6 "Template substitution"), accepting a plain JS object of
/// keyword -> value pairs.
fn util_format(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let text = arg_str(args, 0, context);
    let mut owned: HashMap<String, String> = HashMap::new();

    if let Some(obj) = args.get_or_undefined(1).as_object() {
        let keys = obj.own_property_keys(context)?;
        for key in keys {
            if let Some(key_str) = key.as_string() {
                let value = obj.get(key.clone(), context).unwrap_or(JsValue::undefined());
                let value_str = value.to_string(context).map(|s| s.to_std_string_escaped()).unwrap_or_default();
                owned.insert(key_str.to_std_string_escaped(), value_str);
            }
        }
    }

    let keywords: HashMap<&str, String> = owned.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
    let subst = crate::template::Subst { keywords, flags: crate::template::SubstFlags::default() };
    Ok(JsValue::from(js_string!(crate::template::format(&text, &subst).as_str())))
}

fn plugin_info(_this: &JsValue, _args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let id = with_current(String::new(), |_, plugin_id| plugin_id.to_string());
    let obj = ObjectInitializer::new(context).property(js_string!("name"), js_string!(id.as_str()), Attribute::all()).build();
    Ok(JsValue::from(obj))
}

struct JsPlugin {
    info: PluginInfo,
    maps: PluginMaps,
    context: Context,
    timers: Rc<RefCell<HashMap<u64, JsValue>>>,
}

impl JsPlugin {
    /// Calls the global function `name` (if present and callable) with
    /// `args`, inside a [`ScopedEntry`] so the host API can reach `facade`.
    /// An uncaught script exception is logged, never propagated (DESIGN
    /// NOTES §9).
    fn call(&mut self, name: &str, args: &[JsValue], facade: &BotFacade) {
        let _entry = ScopedEntry::enter(facade, &self.info.id);

        let global = self.context.global_object();
        let Ok(value) = global.get(js_string!(name), &mut self.context) else { return };
        let Some(function) = value.as_object().filter(|o| o.is_callable()) else { return };

        if let Err(err) = function.call(&JsValue::undefined(), args, &mut self.context) {
            let message = error_message(&err, &mut self.context);
            facade.log_warning(&self.info.id, &format!("uncaught exception in {name}: {message}"));
        }
    }
}

fn js_string_arg(value: &str) -> JsValue {
    JsValue::from(js_string!(value))
}

impl Plugin for JsPlugin {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    fn maps(&self) -> &PluginMaps {
        &self.maps
    }

    fn maps_mut(&mut self) -> &mut PluginMaps {
        &mut self.maps
    }

    fn on_load(&mut self, facade: &BotFacade) -> Result<(), PluginError> {
        self.call("onLoad", &[], facade);
        Ok(())
    }

    fn on_reload(&mut self, facade: &BotFacade) -> Result<(), PluginError> {
        self.call("onReload", &[], facade);
        Ok(())
    }

    fn on_unload(&mut self, facade: &BotFacade) {
        self.call("onUnload", &[], facade);
    }

    fn dispatch(&mut self, event: &Event, facade: &BotFacade) -> Result<(), PluginError> {
        let server = js_string_arg(event.server());

        match event {
            Event::Connect { .. } => self.call("onConnect", &[server], facade),
            Event::Disconnect { .. } => self.call("onDisconnect", &[server], facade),
            Event::Invite { origin, channel, .. } => {
                self.call("onInvite", &[server, js_string_arg(origin), js_string_arg(channel)], facade)
            }
            Event::Join { origin, channel, .. } => {
                self.call("onJoin", &[server, js_string_arg(origin), js_string_arg(channel)], facade)
            }
            Event::Kick { origin, channel, target, reason, .. } => self.call(
                "onKick",
                &[server, js_string_arg(origin), js_string_arg(channel), js_string_arg(target), js_string_arg(reason)],
                facade,
            ),
            Event::Me { origin, channel, message, .. } => self.call(
                "onMe",
                &[server, js_string_arg(origin), js_string_arg(channel), js_string_arg(message)],
                facade,
            ),
            Event::Message { origin, channel, message, .. } => self.call(
                "onMessage",
                &[server, js_string_arg(origin), js_string_arg(channel), js_string_arg(message)],
                facade,
            ),
            Event::Mode { origin, channel, mode, .. } => self.call(
                "onMode",
                &[server, js_string_arg(origin), js_string_arg(channel), js_string_arg(mode)],
                facade,
            ),
            Event::Names { channel, names, .. } => {
                let list: Vec<JsValue> = names.iter().map(|n| js_string_arg(n)).collect();
                let array = boa_engine::object::builtins::JsArray::from_iter(list, &mut self.context);
                self.call("onNames", &[server, js_string_arg(channel), JsValue::from(array)], facade)
            }
            Event::Nick { origin, nickname, .. } => {
                self.call("onNick", &[server, js_string_arg(origin), js_string_arg(nickname)], facade)
            }
            Event::Notice { origin, message, .. } => {
                self.call("onNotice", &[server, js_string_arg(origin), js_string_arg(message)], facade)
            }
            Event::Part { origin, channel, reason, .. } => self.call(
                "onPart",
                &[server, js_string_arg(origin), js_string_arg(channel), js_string_arg(reason)],
                facade,
            ),
            Event::Topic { origin, channel, topic, .. } => self.call(
                "onTopic",
                &[server, js_string_arg(origin), js_string_arg(channel), js_string_arg(topic)],
                facade,
            ),
            Event::Whois { nickname, username, hostname, realname } => self.call(
                "onWhois",
                &[server, js_string_arg(nickname), js_string_arg(username), js_string_arg(hostname), js_string_arg(realname)],
                facade,
            ),
            Event::Command { origin, channel, message, .. } => self.call(
                "onCommand",
                &[server, js_string_arg(origin), js_string_arg(channel), js_string_arg(message)],
                facade,
            ),
        }

        Ok(())
    }

    fn fire_timer(&mut self, timer_id: u64, facade: &BotFacade) {
        let callback = self.timers.borrow().get(&timer_id).cloned();
        let Some(callback) = callback else { return };

        let _entry = ScopedEntry::enter(facade, &self.info.id);
        if let Some(function) = callback.as_object().filter(|o| o.is_callable())
            && let Err(err) = function.call(&JsValue::undefined(), &[], &mut self.context)
        {
            let message = error_message(&err, &mut self.context);
            facade.log_warning(&self.info.id, &format!("uncaught exception in timer callback: {message}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locate_misses_when_no_file() {
        let loader = JsLoader::new();
        assert!(loader.locate("nope", &[PathBuf::from("/nonexistent")]).is_none());
    }

    #[test]
    fn loads_and_dispatches_a_trivial_plugin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("echo.js");
        std::fs::write(
            &path,
            r#"
            let lastMessage = "";
            function onMessage(server, origin, channel, message) {
                lastMessage = message;
                Irccd.Server.message(server, channel, origin + " said " + message);
            }
            "#,
        )
        .unwrap();

        let loader = JsLoader::new();
        let mut plugin = loader.load("echo", &path, PluginMaps::default()).unwrap();

        let servers: crate::server::SharedServerTable =
            std::sync::Arc::new(std::sync::RwLock::new(std::collections::BTreeMap::new()));
        let facade = BotFacade::new(servers, crate::logging::default_logger(), std::sync::Arc::new(NullSink));

        let event = Event::Message {
            server: "libera".into(),
            origin: "jean".into(),
            channel: "#test".into(),
            message: "hi".into(),
        };
        plugin.dispatch(&event, &facade).unwrap();
    }

    struct NullSink;
    impl super::super::facade::TimerSink for NullSink {
        fn fire(&self, _plugin: &str, _timer_id: u64) {}
    }
}
