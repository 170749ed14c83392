use std::time::Duration;

use serde_json::Value;

use crate::dispatch::{arg, Deferred, Fault, Reply};

/// Upper bound on a requested delay.
const MAX_DELAY_MS: u64 = 60_000;

/// Timer service. Results arrive through the deferred path.
#[derive(Debug, Default)]
pub struct TimerService;

impl TimerService {
    pub const TARGET: &'static str = "Timer";

    pub fn new() -> Self {
        Self
    }

    /// `after(integer ms, any value)`: resolves with `value` after `ms`.
    pub fn after(&self, args: &[Value]) -> Result<Reply, Fault> {
        let delay = delay_arg(args, "after")?;
        let value = args.get(1).cloned().unwrap_or(Value::Null);
        let deferred = Deferred::spawn(async move {
            tokio::time::sleep(delay).await;
            Ok(value)
        })?;
        Ok(Reply::Deferred(deferred))
    }

    /// `fail_after(integer ms, string message)`: rejects after `ms`.
    pub fn fail_after(&self, args: &[Value]) -> Result<Reply, Fault> {
        let delay = delay_arg(args, "fail_after")?;
        let message: String = arg(args, "fail_after", 1)?;
        let deferred = Deferred::spawn(async move {
            tokio::time::sleep(delay).await;
            Err(Fault::rejected(message))
        })?;
        Ok(Reply::Deferred(deferred))
    }
}

fn delay_arg(args: &[Value], method: &str) -> Result<Duration, Fault> {
    let ms: u64 = arg(args, method, 0)?;
    if ms > MAX_DELAY_MS {
        return Err(Fault::rejected(format!(
            "delay {ms}ms exceeds {MAX_DELAY_MS}ms"
        )));
    }
    Ok(Duration::from_millis(ms))
}
