//! Service registry and method resolution.
//!
//! Handlers are plain structs; each exposes methods through an explicit table
//! of `(name, parameter shape) -> fn(&T, &[Value])`. Resolution picks the
//! entry whose shape fits the runtime argument kinds most specifically.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use svcrelay_core::error::{Result, RelayError};

use crate::dispatch::deferred::Deferred;
use crate::dispatch::fault::Fault;

/// What a handler method hands back.
#[derive(Debug)]
pub enum Reply {
    /// Result available now (may be `null`).
    Value(Value),
    /// Result arrives later through the deferred.
    Deferred(Deferred),
}

impl Reply {
    /// Serialize any value into an immediate reply.
    pub fn json<T: Serialize>(value: T) -> std::result::Result<Self, Fault> {
        serde_json::to_value(value)
            .map(Reply::Value)
            .map_err(|e| Fault::system(RelayError::Encoding(format!("reply serialize failed: {e}"))))
    }
}

/// Handler method signature.
pub type MethodFn<T> = fn(&T, &[Value]) -> std::result::Result<Reply, Fault>;

/// Failure raised through the invocation layer. Exactly one level wraps the
/// handler's own fault.
#[derive(Debug)]
pub enum InvokeError {
    /// The handler returned an error.
    Target(Fault),
    /// The handler panicked.
    Panicked(String),
}

impl InvokeError {
    /// Strip the invocation wrapper.
    pub fn into_fault(self) -> Fault {
        match self {
            InvokeError::Target(f) => f,
            InvokeError::Panicked(msg) => Fault::system(RelayError::HandlerPanic(msg)),
        }
    }
}

/// Runtime kind of a JSON argument, as matched against a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Any,
    Null,
    Bool,
    Integer,
    Number,
    String,
    Array,
    Object,
}

impl ParamKind {
    /// Kind of a concrete argument.
    pub fn of(v: &Value) -> Self {
        match v {
            Value::Null => ParamKind::Null,
            Value::Bool(_) => ParamKind::Bool,
            Value::Number(n) if n.is_i64() || n.is_u64() => ParamKind::Integer,
            Value::Number(_) => ParamKind::Number,
            Value::String(_) => ParamKind::String,
            Value::Array(_) => ParamKind::Array,
            Value::Object(_) => ParamKind::Object,
        }
    }

    /// Match score for `arg` against this parameter; `None` if incompatible.
    fn score(self, arg: ParamKind) -> Option<u32> {
        match (self, arg) {
            (p, a) if p == a => Some(2),
            (ParamKind::Number, ParamKind::Integer) => Some(1),
            (ParamKind::Any, _) => Some(0),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ParamKind::Any => "any",
            ParamKind::Null => "null",
            ParamKind::Bool => "bool",
            ParamKind::Integer => "integer",
            ParamKind::Number => "number",
            ParamKind::String => "string",
            ParamKind::Array => "array",
            ParamKind::Object => "object",
        }
    }
}

fn shape_of(args: &[Value]) -> String {
    args.iter()
        .map(|a| ParamKind::of(a).as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

type ErasedFn = dyn Fn(&[Value]) -> std::result::Result<Reply, Fault> + Send + Sync;

/// A resolved method bound to its handler instance.
#[derive(Clone)]
pub struct Callable {
    name: Arc<str>,
    call: Arc<ErasedFn>,
}

impl Callable {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke through the indirection layer: handler errors come back wrapped
    /// as `Target`, panics as `Panicked`.
    pub fn invoke(&self, args: &[Value]) -> std::result::Result<Reply, InvokeError> {
        match catch_unwind(AssertUnwindSafe(|| (self.call)(args))) {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(fault)) => Err(InvokeError::Target(fault)),
            Err(panic) => Err(InvokeError::Panicked(panic_message(panic.as_ref()))),
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable").field("name", &self.name).finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

struct MethodEntry {
    params: Vec<ParamKind>,
    callable: Callable,
}

/// Method table of one registration.
#[derive(Default)]
pub struct MethodTable {
    entries: Vec<MethodEntry>,
}

impl MethodTable {
    /// Best-matching callable for `method` given the runtime kinds of `args`.
    pub fn resolve(&self, target: &str, method: &str, args: &[Value]) -> Result<Callable> {
        let kinds: Vec<ParamKind> = args.iter().map(ParamKind::of).collect();

        let mut best: Option<(u32, &MethodEntry)> = None;
        let mut tied = false;
        for entry in self
            .entries
            .iter()
            .filter(|e| &*e.callable.name == method && e.params.len() == kinds.len())
        {
            let score = entry
                .params
                .iter()
                .zip(&kinds)
                .map(|(p, a)| p.score(*a))
                .sum::<Option<u32>>();
            let Some(score) = score else { continue };
            match best {
                Some((top, _)) if score < top => {}
                Some((top, _)) if score == top => tied = true,
                _ => {
                    best = Some((score, entry));
                    tied = false;
                }
            }
        }

        match best {
            Some(_) if tied => Err(RelayError::AmbiguousMethod {
                target: target.to_string(),
                method: method.to_string(),
                shape: shape_of(args),
            }),
            Some((_, entry)) => Ok(entry.callable.clone()),
            None => Err(RelayError::NoSuchMethod {
                target: target.to_string(),
                method: method.to_string(),
                shape: shape_of(args),
            }),
        }
    }

    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.iter().map(|e| e.callable.name()).collect();
        names.dedup();
        names
    }
}

/// Registry record binding a target name to a handler and its logging context.
pub struct HandlerRegistration {
    target: String,
    logging_context: String,
    methods: MethodTable,
}

impl HandlerRegistration {
    pub fn builder<T: Send + Sync + 'static>(target: impl Into<String>, instance: Arc<T>) -> RegistrationBuilder<T> {
        let target = target.into();
        RegistrationBuilder {
            logging_context: target.to_lowercase(),
            target,
            instance,
            methods: MethodTable::default(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn logging_context(&self) -> &str {
        &self.logging_context
    }

    pub fn resolve(&self, method: &str, args: &[Value]) -> Result<Callable> {
        self.methods.resolve(&self.target, method, args)
    }

    pub fn methods(&self) -> &MethodTable {
        &self.methods
    }
}

pub struct RegistrationBuilder<T> {
    target: String,
    logging_context: String,
    instance: Arc<T>,
    methods: MethodTable,
}

impl<T: Send + Sync + 'static> RegistrationBuilder<T> {
    pub fn logging_context(mut self, ctx: impl Into<String>) -> Self {
        self.logging_context = ctx.into();
        self
    }

    /// Add one overload of `name` accepting `params`.
    pub fn method(mut self, name: &str, params: &[ParamKind], f: MethodFn<T>) -> Self {
        let instance = Arc::clone(&self.instance);
        self.methods.entries.push(MethodEntry {
            params: params.to_vec(),
            callable: Callable {
                name: Arc::from(name),
                call: Arc::new(move |args: &[Value]| f(&instance, args)),
            },
        });
        self
    }

    pub fn build(self) -> HandlerRegistration {
        HandlerRegistration {
            target: self.target,
            logging_context: self.logging_context,
            methods: self.methods,
        }
    }
}

/// Decode positional argument `index` into `T`.
///
/// Resolution has already checked the JSON kind; this covers the finer
/// conversions (range, struct shape) and reports them as lookup failures.
pub fn arg<T: DeserializeOwned>(args: &[Value], method: &str, index: usize) -> std::result::Result<T, Fault> {
    let raw = args.get(index).ok_or_else(|| {
        Fault::system(RelayError::BadArgument {
            method: method.to_string(),
            index,
            reason: "missing".into(),
        })
    })?;
    serde_json::from_value(raw.clone()).map_err(|e| {
        Fault::system(RelayError::BadArgument {
            method: method.to_string(),
            index,
            reason: e.to_string(),
        })
    })
}

/// Target name -> registration.
#[derive(Default)]
pub struct ServiceRegistry {
    services: DashMap<String, Arc<HandlerRegistration>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
        }
    }

    pub fn register(&self, registration: HandlerRegistration) {
        let target = registration.target().to_string();
        if self.services.insert(target.clone(), Arc::new(registration)).is_some() {
            tracing::warn!(%target, "service registration replaced");
        }
    }

    pub fn lookup(&self, target: &str) -> Result<Arc<HandlerRegistration>> {
        self.services
            .get(target)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| RelayError::UnknownService(target.to_string()))
    }

    pub fn registered_services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}
