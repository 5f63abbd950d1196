//! Iterative Fibonacci calculator.

use serde_json::{Map, Value, json};

use gemini_chat_core::types::ToolValue;

use crate::{Tool, ToolContext, ToolError};

/// Largest index whose Fibonacci number fits in a `u64`.
pub const MAX_INDEX: u64 = 93;

pub struct FibonacciTool;

/// `fib(0) = 0`, `fib(1) = 1`. `None` once the value overflows `u64`.
pub fn fibonacci(n: u64) -> Option<u64> {
    if n > MAX_INDEX {
        return None;
    }
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 0..n {
        // `b` runs one step ahead of the result and may wrap on the last step.
        let next = a.wrapping_add(b);
        a = b;
        b = next;
    }
    Some(a)
}

/// Accept `5` and `5.0`; the model declares `n` as a NUMBER.
fn parse_index(value: Option<&Value>) -> Result<u64, ToolError> {
    let value = value.ok_or_else(|| ToolError::InvalidArgument("missing required argument 'n'".into()))?;
    if let Some(n) = value.as_u64() {
        return Ok(n);
    }
    match value.as_f64() {
        Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => Ok(f as u64),
        _ => Err(ToolError::InvalidArgument(format!(
            "'n' must be a non-negative integer, got {value}"
        ))),
    }
}

impl Tool for FibonacciTool {
    fn name(&self) -> &str {
        "fibonacci"
    }

    fn description(&self) -> &str {
        "Calculates the nth Fibonacci number."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "OBJECT",
            "properties": {
                "n": {
                    "type": "NUMBER",
                    "description": "The position in the Fibonacci sequence (0-based index)."
                }
            },
            "required": ["n"]
        })
    }

    fn execute(&self, args: &Map<String, Value>, _context: &ToolContext) -> Result<ToolValue, ToolError> {
        let n = parse_index(args.get("n"))?;
        fibonacci(n)
            .map(ToolValue::Integer)
            .ok_or_else(|| ToolError::InvalidArgument(format!("fibonacci({n}) overflows; n must be at most {MAX_INDEX}")))
    }
}
