//! Host functions exposed to scripts.
//!
//! Every execution gets its own [`HostContext`] holding the message being
//! processed and handles to the stage's collaborators. Each host function is
//! registered for every arity up to [`MAX_HOST_ARGS`] with untyped parameters
//! so that argument problems are reported by [`parse_args`] instead of failing
//! function resolution. A failing host function logs the error and returns `()`.

use crate::args::{parse_args, ArgSlot};
use crate::conversion::json_to_dynamic;
use crate::http::{self, FetchRequest};
use crate::output::OutputChannels;
use parking_lot::Mutex;
use rhai::{Dynamic, Engine, Map, INT};
use sb_error::HostError;
use sb_traits::{Cache, ResourceProvider};
use sb_types::Message;
use serde_json::Value;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, error};

/// Highest arity each host function is registered for.
pub const MAX_HOST_ARGS: usize = 8;

type HostFn = fn(&HostContext, &[Dynamic]) -> Result<Dynamic, HostError>;

const HOST_FUNCTIONS: &[(&str, HostFn)] = &[
    ("fetch", HostContext::fetch),
    ("getMeta", HostContext::get_meta),
    ("setMeta", HostContext::set_meta),
    ("setRoot", HostContext::set_root),
    ("getRoot", HostContext::get_root),
    ("getCacheRes", HostContext::get_cache_res),
    ("setCacheRes", HostContext::set_cache_res),
    ("getCache", HostContext::get_cache),
    ("setCache", HostContext::set_cache),
    ("benthos_output", HostContext::benthos_output),
];

/// State shared by the host functions of one script execution.
pub(crate) struct HostContext {
    message: Arc<Mutex<Message>>,
    cache_res: Arc<Vec<String>>,
    resources: Arc<dyn ResourceProvider>,
    http: reqwest::Client,
    outputs: Option<Arc<OutputChannels>>,
    runtime: Handle,
}

impl HostContext {
    pub(crate) fn new(
        message: Arc<Mutex<Message>>,
        cache_res: Arc<Vec<String>>,
        resources: Arc<dyn ResourceProvider>,
        http: reqwest::Client,
        outputs: Option<Arc<OutputChannels>>,
        runtime: Handle,
    ) -> Self {
        Self {
            message,
            cache_res,
            resources,
            http,
            outputs,
            runtime,
        }
    }

    fn fetch(&self, args: &[Dynamic]) -> Result<Dynamic, HostError> {
        let mut request = FetchRequest {
            url: String::new(),
            headers: String::new(),
            method: "GET".to_string(),
            payload: String::new(),
        };
        parse_args(
            args,
            &mut [
                ArgSlot::Str(&mut request.url),
                ArgSlot::Str(&mut request.headers),
                ArgSlot::Str(&mut request.method),
                ArgSlot::Str(&mut request.payload),
            ],
        )?;

        let response = self.runtime.block_on(http::fetch(&self.http, &request))?;

        let mut result = Map::new();
        result.insert("status".into(), Dynamic::from(INT::from(response.status)));
        result.insert("body".into(), Dynamic::from(response.body));
        Ok(result.into())
    }

    fn get_meta(&self, args: &[Dynamic]) -> Result<Dynamic, HostError> {
        let mut key = String::new();
        parse_args(args, &mut [ArgSlot::Str(&mut key)])?;

        self.message
            .lock()
            .meta_get_str(&key)
            .map(Dynamic::from)
            .ok_or(HostError::NotFound)
    }

    fn set_meta(&self, args: &[Dynamic]) -> Result<Dynamic, HostError> {
        let mut key = String::new();
        let mut value = String::new();
        parse_args(args, &mut [ArgSlot::Str(&mut key), ArgSlot::Str(&mut value)])?;

        let mut message = self.message.lock();
        if value.is_empty() {
            message.meta_delete(&key);
        } else {
            message.meta_set(key, value);
        }
        Ok(Dynamic::UNIT)
    }

    fn set_root(&self, args: &[Dynamic]) -> Result<Dynamic, HostError> {
        let mut value = Value::Null;
        parse_args(args, &mut [ArgSlot::Value(&mut value)])?;

        self.message.lock().set_structured(value);
        Ok(Dynamic::UNIT)
    }

    fn get_root(&self, args: &[Dynamic]) -> Result<Dynamic, HostError> {
        parse_args(args, &mut [])?;

        let value = self
            .message
            .lock()
            .as_structured()
            .map_err(|e| HostError::Payload(e.to_string()))?;
        Ok(json_to_dynamic(&value))
    }

    fn get_cache_res(&self, args: &[Dynamic]) -> Result<Dynamic, HostError> {
        let mut res = String::new();
        let mut key = String::new();
        parse_args(args, &mut [ArgSlot::Str(&mut res), ArgSlot::Str(&mut key)])?;

        self.ensure_cache_permitted(&res)?;
        self.cache_get(&res, &key)
    }

    fn set_cache_res(&self, args: &[Dynamic]) -> Result<Dynamic, HostError> {
        let mut res = String::new();
        let mut key = String::new();
        let mut value = String::new();
        parse_args(
            args,
            &mut [
                ArgSlot::Str(&mut res),
                ArgSlot::Str(&mut key),
                ArgSlot::Str(&mut value),
            ],
        )?;

        self.ensure_cache_permitted(&res)?;
        self.cache_set(&res, &key, value)
    }

    fn get_cache(&self, args: &[Dynamic]) -> Result<Dynamic, HostError> {
        let mut key = String::new();
        parse_args(args, &mut [ArgSlot::Str(&mut key)])?;

        let res = self.default_cache()?;
        self.cache_get(res, &key)
    }

    fn set_cache(&self, args: &[Dynamic]) -> Result<Dynamic, HostError> {
        let mut key = String::new();
        let mut value = String::new();
        parse_args(args, &mut [ArgSlot::Str(&mut key), ArgSlot::Str(&mut value)])?;

        let res = self.default_cache()?;
        self.cache_set(res, &key, value)
    }

    fn benthos_output(&self, args: &[Dynamic]) -> Result<Dynamic, HostError> {
        let outputs = self.outputs.as_ref().ok_or(HostError::NotInOutputStage)?;

        let mut name = String::new();
        let mut value = String::new();
        parse_args(args, &mut [ArgSlot::Str(&mut name), ArgSlot::Str(&mut value)])?;

        outputs.dispatch(&self.runtime, &name, value)?;
        Ok(Dynamic::UNIT)
    }

    fn ensure_cache_permitted(&self, res: &str) -> Result<(), HostError> {
        if self.cache_res.iter().any(|name| name == res) {
            Ok(())
        } else {
            Err(HostError::CacheNotPermitted(res.to_string()))
        }
    }

    fn default_cache(&self) -> Result<&str, HostError> {
        self.cache_res
            .first()
            .map(String::as_str)
            .ok_or(HostError::NoCacheConfigured)
    }

    fn lookup_cache(&self, res: &str) -> Option<Arc<dyn Cache>> {
        let cache = self.resources.cache(res);
        if cache.is_none() {
            debug!(cache = %res, "Cache resource is not registered");
        }
        cache
    }

    fn cache_get(&self, res: &str, key: &str) -> Result<Dynamic, HostError> {
        let cache = self.lookup_cache(res).ok_or(HostError::NotFound)?;
        match self.runtime.block_on(cache.get(key)) {
            Ok(value) => Ok(Dynamic::from(String::from_utf8_lossy(&value).into_owned())),
            Err(e) => {
                debug!(cache = %res, key = %key, error = %e, "Cache read failed");
                Err(HostError::NotFound)
            }
        }
    }

    fn cache_set(&self, res: &str, key: &str, value: String) -> Result<Dynamic, HostError> {
        let cache = self.lookup_cache(res).ok_or(HostError::NotSet)?;
        match self.runtime.block_on(cache.set(key, value.into_bytes(), None)) {
            Ok(()) => Ok(Dynamic::UNIT),
            Err(e) => {
                debug!(cache = %res, key = %key, error = %e, "Cache write failed");
                Err(HostError::NotSet)
            }
        }
    }
}

/// Registers every host function on `engine`, bound to `ctx`.
pub(crate) fn register_host_functions(engine: &mut Engine, ctx: &Arc<HostContext>) {
    for &(name, function) in HOST_FUNCTIONS {
        register_host_fn(engine, name, function, ctx);
    }
}

macro_rules! register_arity {
    ($engine:expr, $name:expr, $function:expr, $ctx:expr; $($arg:ident),*) => {{
        let ctx = Arc::clone($ctx);
        let function = $function;
        let name = $name;
        $engine.register_fn(name, move |$($arg: Dynamic),*| -> Dynamic {
            invoke(&ctx, name, function, &[$($arg),*])
        });
    }};
}

fn register_host_fn(
    engine: &mut Engine,
    name: &'static str,
    function: HostFn,
    ctx: &Arc<HostContext>,
) {
    register_arity!(engine, name, function, ctx;);
    register_arity!(engine, name, function, ctx; a);
    register_arity!(engine, name, function, ctx; a, b);
    register_arity!(engine, name, function, ctx; a, b, c);
    register_arity!(engine, name, function, ctx; a, b, c, d);
    register_arity!(engine, name, function, ctx; a, b, c, d, e);
    register_arity!(engine, name, function, ctx; a, b, c, d, e, f);
    register_arity!(engine, name, function, ctx; a, b, c, d, e, f, g);
    register_arity!(engine, name, function, ctx; a, b, c, d, e, f, g, h);
}

fn invoke(ctx: &HostContext, name: &str, function: HostFn, args: &[Dynamic]) -> Dynamic {
    match function(ctx, args) {
        Ok(value) => value,
        Err(e) => {
            error!(function = name, error = %e, "Host function failed");
            Dynamic::UNIT
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sb_error::ArgError;
    use sb_resources::{MemoryCache, Resources};
    use serde_json::json;
    use tokio::runtime::Runtime;

    fn context(runtime: &Runtime, message: Message, caches: &[&str]) -> HostContext {
        let resources = Resources::new()
            .with_cache("primary", MemoryCache::new())
            .with_cache("secondary", MemoryCache::new());
        HostContext::new(
            Arc::new(Mutex::new(message)),
            Arc::new(caches.iter().map(|c| c.to_string()).collect()),
            Arc::new(resources),
            reqwest::Client::new(),
            None,
            runtime.handle().clone(),
        )
    }

    fn string(s: &str) -> Dynamic {
        Dynamic::from(s.to_string())
    }

    #[test]
    fn test_meta_round_trip_and_delete() {
        let runtime = Runtime::new().unwrap();
        let ctx = context(&runtime, Message::empty(), &[]);

        ctx.set_meta(&[string("k"), string("v")]).unwrap();
        let value = ctx.get_meta(&[string("k")]).unwrap();
        assert_eq!(value.into_string().unwrap(), "v");

        ctx.set_meta(&[string("k"), string("")]).unwrap();
        assert!(matches!(ctx.get_meta(&[string("k")]), Err(HostError::NotFound)));
    }

    #[test]
    fn test_get_meta_missing_argument_type() {
        let runtime = Runtime::new().unwrap();
        let ctx = context(&runtime, Message::empty(), &[]);

        let err = ctx.get_meta(&[Dynamic::from(1_i64)]).unwrap_err();
        assert!(matches!(err, HostError::Arg(ArgError::UnsupportedType { .. })));
    }

    #[test]
    fn test_root_copy_is_detached() {
        let runtime = Runtime::new().unwrap();
        let ctx = context(&runtime, Message::new(r#"{"a":1}"#), &[]);

        let root = ctx.get_root(&[]).unwrap();
        let mut map = root.cast::<Map>();
        map.insert("a".into(), Dynamic::from(2_i64));

        assert_eq!(ctx.message.lock().as_structured().unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_get_root_unparsable_payload() {
        let runtime = Runtime::new().unwrap();
        let ctx = context(&runtime, Message::new("not json"), &[]);

        assert!(matches!(ctx.get_root(&[]), Err(HostError::Payload(_))));
    }

    #[test]
    fn test_cache_round_trip() {
        let runtime = Runtime::new().unwrap();
        let ctx = context(&runtime, Message::empty(), &["primary", "secondary"]);

        ctx.set_cache_res(&[string("secondary"), string("k"), string("v")])
            .unwrap();
        let value = ctx.get_cache_res(&[string("secondary"), string("k")]).unwrap();
        assert_eq!(value.into_string().unwrap(), "v");

        // getCache targets the first configured cache
        assert!(matches!(ctx.get_cache(&[string("k")]), Err(HostError::NotFound)));
        ctx.set_cache(&[string("k"), string("w")]).unwrap();
        assert_eq!(ctx.get_cache(&[string("k")]).unwrap().into_string().unwrap(), "w");
    }

    #[test]
    fn test_cache_not_permitted() {
        let runtime = Runtime::new().unwrap();
        let ctx = context(&runtime, Message::empty(), &["primary"]);

        let err = ctx
            .get_cache_res(&[string("secondary"), string("k")])
            .unwrap_err();
        assert_eq!(err.to_string(), "not cache res: secondary");
    }

    #[test]
    fn test_default_cache_requires_configuration() {
        let runtime = Runtime::new().unwrap();
        let ctx = context(&runtime, Message::empty(), &[]);

        assert!(matches!(
            ctx.set_cache(&[string("k"), string("v")]),
            Err(HostError::NoCacheConfigured)
        ));
    }

    #[test]
    fn test_permitted_but_unregistered_cache() {
        let runtime = Runtime::new().unwrap();
        let ctx = context(&runtime, Message::empty(), &["ghost"]);

        assert!(matches!(ctx.get_cache(&[string("k")]), Err(HostError::NotFound)));
        assert!(matches!(
            ctx.set_cache(&[string("k"), string("v")]),
            Err(HostError::NotSet)
        ));
    }

    #[test]
    fn test_output_unavailable_in_processor() {
        let runtime = Runtime::new().unwrap();
        let ctx = context(&runtime, Message::empty(), &[]);

        assert!(matches!(
            ctx.benthos_output(&[string("sink"), string("v")]),
            Err(HostError::NotInOutputStage)
        ));
    }

    #[test]
    fn test_failures_become_unit_in_scripts() {
        let runtime = Runtime::new().unwrap();
        let ctx = Arc::new(context(&runtime, Message::empty(), &[]));

        let mut engine = Engine::new();
        register_host_functions(&mut engine, &ctx);

        let result: bool = engine
            .eval(
                r#"
                let missing = getMeta("nope");
                let wrong = getMeta(1, 2, 3, 4, 5, 6, 7, 8);
                setMeta("seen", "yes");
                type_of(missing) == "()" && type_of(wrong) == "()"
                "#,
            )
            .unwrap();

        assert!(result);
        assert_eq!(
            ctx.message.lock().meta_get_str("seen").as_deref(),
            Some("yes")
        );
    }
}
