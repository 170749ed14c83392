use serde_json::Value;

use crate::dispatch::{arg, Fault, Reply};

/// Echo service. Proves routing and the immediate path.
#[derive(Debug, Default)]
pub struct EchoService;

impl EchoService {
    pub const TARGET: &'static str = "Echo";

    pub fn new() -> Self {
        Self
    }

    /// `say(string) -> string`
    pub fn say(&self, args: &[Value]) -> Result<Reply, Fault> {
        let text: String = arg(args, "say", 0)?;
        Ok(Reply::Value(Value::String(text)))
    }

    /// `echo(any) -> any`
    pub fn echo(&self, args: &[Value]) -> Result<Reply, Fault> {
        Ok(Reply::Value(args.first().cloned().unwrap_or(Value::Null)))
    }
}
