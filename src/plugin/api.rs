//! The Host API surface injected into every plugin's interpreter.
//!
//! Installed as a global `plugin` table of Rust closures. Every function
//! takes the instance's opaque handle as its first argument and validates it
//! before anything else; capability-gated functions then check the
//! allow-list declared at `register`. Guest code never holds a host
//! reference beyond that handle.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use mlua::{Function, Lua, Value, Variadic};
use serde::Deserialize;

use crate::buffer::{expand_buffer_tokens, plugin_buffer_name};
use crate::host::HostEnv;

use super::convert::{format_values, json_to_lua};
use super::instance::{Descriptor, LoadAbort, PluginState};
use super::manager::SharedRegistry;

/// Options accepted by `plugin.http` as a JSON string. When several body
/// kinds are present the precedence is JSON > form > raw.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HttpOpts {
    headers: HashMap<String, String>,
    params: HashMap<String, String>,
    form: HashMap<String, String>,
    json: Option<serde_json::Value>,
    body: Option<String>,
    content_type: Option<String>,
}

enum HttpBody {
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
    Raw(String),
    None,
}

impl HttpOpts {
    fn into_body(self) -> HttpBody {
        if let Some(json) = self.json {
            HttpBody::Json(json)
        } else if !self.form.is_empty() {
            HttpBody::Form(self.form.into_iter().collect())
        } else if let Some(body) = self.body {
            HttpBody::Raw(body)
        } else {
            HttpBody::None
        }
    }
}

fn guest_err(message: String) -> mlua::Error {
    mlua::Error::RuntimeError(message)
}

/// Install the `plugin` table into a fresh interpreter.
pub(crate) fn install(
    lua: &Lua,
    state: &Rc<RefCell<PluginState>>,
    registry: &Rc<RefCell<SharedRegistry>>,
    env: &HostEnv,
) -> mlua::Result<()> {
    let api = lua.create_table()?;

    // plugin.register(handle, descriptor_json [, capabilities]) -> handle
    {
        let state = Rc::clone(state);
        let registry = Rc::clone(registry);
        let env = env.clone();
        api.set(
            "register",
            lua.create_function(
                move |_, (handle, descriptor, caps): (String, String, Option<Vec<String>>)| {
                    {
                        let st = state.borrow();
                        st.check_handle(&handle)?;
                        st.check_open("register")?;
                    }
                    let descriptor: Descriptor = serde_json::from_str(&descriptor)
                        .map_err(|e| guest_err(format!("register: {e}")))?;
                    if descriptor.name.is_empty() {
                        return Err(guest_err("register: descriptor name is empty".into()));
                    }
                    if registry.borrow().plugin_names.contains(&descriptor.name) {
                        return Err(mlua::Error::external(LoadAbort::DuplicateName(
                            descriptor.name.clone(),
                        )));
                    }
                    let caps = caps.unwrap_or_default();
                    // An absent or empty list leaves any prior grant
                    // untouched; the first register keeps legacy
                    // unrestricted access.
                    let granted = if caps.is_empty() {
                        None
                    } else {
                        let subject = format!("API functions {}", caps.join(", "));
                        if !env.consent.confirm(&descriptor.name, &subject) {
                            return Err(mlua::Error::external(LoadAbort::ConsentDenied {
                                plugin: descriptor.name.clone(),
                                subject,
                            }));
                        }
                        Some(caps.into_iter().collect())
                    };
                    let mut st = state.borrow_mut();
                    if granted.is_some() {
                        st.allowed = granted;
                    }
                    st.descriptor = Some(descriptor);
                    Ok(handle)
                },
            )?,
        )?;
    }

    // plugin.print(handle, message) -> handle
    {
        let state = Rc::clone(state);
        let registry = Rc::clone(registry);
        let env = env.clone();
        api.set(
            "print",
            lua.create_function(move |_, (handle, message): (String, String)| {
                let plugin = {
                    let st = state.borrow();
                    st.check_handle(&handle)?;
                    st.check_allowed("print")?;
                    st.plugin_name()
                };
                if !registry.borrow().muted.contains(&plugin) {
                    env.output.print(&plugin, &message);
                }
                Ok(handle)
            })?,
        )?;
    }

    // plugin.format(handle, fmt, ...) -> string
    {
        let state = Rc::clone(state);
        api.set(
            "format",
            lua.create_function(
                move |_, (handle, fmt, args): (String, String, Variadic<Value>)| {
                    state.borrow().check_handle(&handle)?;
                    Ok(format_values(&fmt, &args))
                },
            )?,
        )?;
    }

    // plugin.read(handle, buffer) -> value | nil
    {
        let state = Rc::clone(state);
        let env = env.clone();
        api.set(
            "read",
            lua.create_function(move |lua, (handle, name): (String, String)| {
                let plugin = {
                    let st = state.borrow();
                    st.check_handle(&handle)?;
                    st.check_allowed("read")?;
                    st.plugin_name()
                };
                match env.buffers.read(&plugin_buffer_name(&plugin, &name)) {
                    Some(value) => Ok(Value::String(lua.create_string(&value)?)),
                    None => Ok(Value::Nil),
                }
            })?,
        )?;
    }

    // plugin.write(handle, buffer, value) -> handle
    {
        let state = Rc::clone(state);
        let env = env.clone();
        api.set(
            "write",
            lua.create_function(move |_, (handle, name, value): (String, String, String)| {
                let plugin = {
                    let st = state.borrow();
                    st.check_handle(&handle)?;
                    st.check_allowed("write")?;
                    st.plugin_name()
                };
                env.buffers.write(&plugin_buffer_name(&plugin, &name), &value);
                Ok(handle)
            })?,
        )?;
    }

    // plugin.prompt(handle, buffer, message) -> response
    {
        let state = Rc::clone(state);
        let env = env.clone();
        api.set(
            "prompt",
            lua.create_function(move |_, (handle, name, message): (String, String, String)| {
                let plugin = {
                    let st = state.borrow();
                    st.check_handle(&handle)?;
                    st.check_allowed("prompt")?;
                    st.plugin_name()
                };
                let response = env
                    .prompter
                    .prompt(&message)
                    .map_err(|e| guest_err(format!("prompt: {e}")))?;
                let response = expand_buffer_tokens(&response, env.buffers.as_ref());
                env.buffers
                    .write(&plugin_buffer_name(&plugin, &name), &response);
                Ok(response)
            })?,
        )?;
    }

    // plugin.hook(handle, hook_name, callback) -> handle
    {
        let state = Rc::clone(state);
        let registry = Rc::clone(registry);
        let env = env.clone();
        api.set(
            "hook",
            lua.create_function(
                move |_, (handle, hook_name, callback): (String, String, Function)| {
                    let plugin = {
                        let st = state.borrow();
                        st.check_handle(&handle)?;
                        st.check_open("hook")?;
                        st.check_allowed("hook")?;
                        st.require_registered("hook")?
                    };
                    let subject = format!("hook '{hook_name}'");
                    if !env.consent.confirm(&plugin, &subject) {
                        return Err(mlua::Error::external(LoadAbort::ConsentDenied {
                            plugin,
                            subject,
                        }));
                    }
                    let registered = {
                        let mut st = state.borrow_mut();
                        let callbacks = st.hooks.entry(hook_name.clone()).or_default();
                        // Re-registering the same function is a no-op.
                        if callbacks.iter().any(|f| *f == callback) {
                            false
                        } else {
                            callbacks.push(callback);
                            true
                        }
                    };
                    if registered && !registry.borrow().muted.contains(&plugin) {
                        env.output
                            .print(&plugin, &format!("hook registered: {hook_name}"));
                    }
                    Ok(handle)
                },
            )?,
        )?;
    }

    // plugin.command(handle, local_name) -> handle
    {
        let state = Rc::clone(state);
        let registry = Rc::clone(registry);
        api.set(
            "command",
            lua.create_function(move |lua, (handle, local): (String, String)| {
                let plugin = {
                    let st = state.borrow();
                    st.check_handle(&handle)?;
                    st.check_open("command")?;
                    st.check_allowed("command")?;
                    st.require_registered("command")?
                };
                let qualified = format!("{plugin}.{local}");
                if registry.borrow().commands.contains_key(&qualified)
                    || state.borrow().commands.contains_key(&local)
                {
                    return Err(guest_err(format!("command {qualified:?} already exists")));
                }
                // Bind the implementation now; it is never re-resolved.
                let callback = match lua.globals().get::<Value>(local.as_str())? {
                    Value::Function(f) => f,
                    _ => {
                        return Err(guest_err(format!("command: function {local:?} not found")));
                    }
                };
                state.borrow_mut().commands.insert(local, callback);
                Ok(handle)
            })?,
        )?;
    }

    // plugin.http(handle, method, url [, opts_json]) -> body, status
    {
        let state = Rc::clone(state);
        api.set(
            "http",
            lua.create_function(
                move |lua, (handle, method, url, opts): (String, String, String, Option<String>)| {
                    {
                        let st = state.borrow();
                        st.check_handle(&handle)?;
                        st.check_allowed("http")?;
                    }
                    let opts: HttpOpts = match opts {
                        Some(raw) => serde_json::from_str(&raw)
                            .map_err(|e| guest_err(format!("http opts: {e}")))?,
                        None => HttpOpts::default(),
                    };
                    let mut request = ureq::request(&method.to_uppercase(), &url);
                    for (key, value) in &opts.params {
                        request = request.query(key, value);
                    }
                    if let Some(content_type) = &opts.content_type {
                        request = request.set("Content-Type", content_type);
                    }
                    for (key, value) in &opts.headers {
                        request = request.set(key, value);
                    }
                    let result = match opts.into_body() {
                        HttpBody::Json(json) => request.send_json(json),
                        HttpBody::Form(pairs) => {
                            let pairs: Vec<(&str, &str)> = pairs
                                .iter()
                                .map(|(k, v)| (k.as_str(), v.as_str()))
                                .collect();
                            request.send_form(&pairs)
                        }
                        HttpBody::Raw(body) => request.send_string(&body),
                        HttpBody::None => request.call(),
                    };
                    // Non-2xx responses still carry a usable body and status.
                    let response = match result {
                        Ok(response) => response,
                        Err(ureq::Error::Status(_, response)) => response,
                        Err(e) => return Err(guest_err(format!("http: {e}"))),
                    };
                    let status = response.status();
                    let is_json = response
                        .header("Content-Type")
                        .unwrap_or_default()
                        .contains("application/json");
                    let text = response
                        .into_string()
                        .map_err(|e| guest_err(format!("http body: {e}")))?;
                    let body = if is_json {
                        match serde_json::from_str::<serde_json::Value>(&text) {
                            Ok(parsed) => json_to_lua(lua, &parsed)?,
                            Err(_) => Value::String(lua.create_string(&text)?),
                        }
                    } else {
                        Value::String(lua.create_string(&text)?)
                    };
                    Ok((body, status))
                },
            )?,
        )?;
    }

    // plugin.gen(handle, buffer, prompt) -> reply
    {
        let state = Rc::clone(state);
        let env = env.clone();
        api.set(
            "gen",
            lua.create_function(move |_, (handle, name, prompt): (String, String, String)| {
                let plugin = {
                    let st = state.borrow();
                    st.check_handle(&handle)?;
                    st.check_allowed("gen")?;
                    st.plugin_name()
                };
                let target = plugin_buffer_name(&plugin, &name);
                let reply = env
                    .generator
                    .generate(&target, &prompt)
                    .map_err(|e| guest_err(format!("gen: {e}")))?;
                env.buffers.write(&target, &reply);
                Ok(reply)
            })?,
        )?;
    }

    // plugin.socat(handle, buffer, ...) -> output
    {
        let state = Rc::clone(state);
        let env = env.clone();
        api.set(
            "socat",
            lua.create_function(
                move |_, (handle, name, args): (String, String, Variadic<String>)| {
                    let plugin = {
                        let st = state.borrow();
                        st.check_handle(&handle)?;
                        st.check_allowed("socat")?;
                        st.plugin_name()
                    };
                    env.pipes
                        .socat(&plugin_buffer_name(&plugin, &name), &args)
                        .map_err(|e| guest_err(format!("socat: {e}")))
                },
            )?,
        )?;
    }

    // plugin.pipe(handle, buffer, command, ...) -> output
    {
        let state = Rc::clone(state);
        let env = env.clone();
        api.set(
            "pipe",
            lua.create_function(
                move |_, (handle, name, command, args): (String, String, String, Variadic<String>)| {
                    let plugin = {
                        let st = state.borrow();
                        st.check_handle(&handle)?;
                        st.check_allowed("pipe")?;
                        st.plugin_name()
                    };
                    env.pipes
                        .pipe(&plugin_buffer_name(&plugin, &name), &command, &args)
                        .map_err(|e| guest_err(format!("pipe: {e}")))
                },
            )?,
        )?;
    }

    lua.globals().set("plugin", api)
}
