//! Arithmetic tools, handy for exercising the agent loop without a graph.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{number_arg, Tool};

fn binary_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "a": { "type": "number", "description": "First number" },
            "b": { "type": "number", "description": "Second number" }
        },
        "required": ["a", "b"]
    })
}

/// Return the sum of a and b.
pub struct AddNumbers;

#[async_trait]
impl Tool for AddNumbers {
    fn name(&self) -> &str {
        "add_numbers"
    }

    fn description(&self) -> &str {
        "Return the sum of a and b."
    }

    fn parameters_schema(&self) -> Value {
        binary_schema()
    }

    async fn execute(&self, args: Value) -> anyhow::Result<Value> {
        let (a, b) = (number_arg(&args, "a")?, number_arg(&args, "b")?);
        let result = a + b;
        tracing::info!("Adding {} + {} = {}", a, b, result);
        Ok(json!(result))
    }
}

/// Return the difference a - b.
pub struct SubtractNumbers;

#[async_trait]
impl Tool for SubtractNumbers {
    fn name(&self) -> &str {
        "subtract_numbers"
    }

    fn description(&self) -> &str {
        "Return the difference a - b."
    }

    fn parameters_schema(&self) -> Value {
        binary_schema()
    }

    async fn execute(&self, args: Value) -> anyhow::Result<Value> {
        let (a, b) = (number_arg(&args, "a")?, number_arg(&args, "b")?);
        let result = a - b;
        tracing::info!("Subtracting {} - {} = {}", a, b, result);
        Ok(json!(result))
    }
}

/// Return the product of a and b.
pub struct MultiplyNumbers;

#[async_trait]
impl Tool for MultiplyNumbers {
    fn name(&self) -> &str {
        "multiply_numbers"
    }

    fn description(&self) -> &str {
        "Return the product of a and b."
    }

    fn parameters_schema(&self) -> Value {
        binary_schema()
    }

    async fn execute(&self, args: Value) -> anyhow::Result<Value> {
        let (a, b) = (number_arg(&args, "a")?, number_arg(&args, "b")?);
        let result = a * b;
        tracing::info!("Multiplying {} * {} = {}", a, b, result);
        Ok(json!(result))
    }
}

/// Return a / b, or null on division by zero.
pub struct DivideNumbers;

#[async_trait]
impl Tool for DivideNumbers {
    fn name(&self) -> &str {
        "divide_numbers"
    }

    fn description(&self) -> &str {
        "Return the division a / b. Returns null if b is zero."
    }

    fn parameters_schema(&self) -> Value {
        binary_schema()
    }

    async fn execute(&self, args: Value) -> anyhow::Result<Value> {
        let (a, b) = (number_arg(&args, "a")?, number_arg(&args, "b")?);
        if b == 0.0 {
            tracing::warn!("Division by zero: {} / {}", a, b);
            return Ok(Value::Null);
        }
        let result = a / b;
        tracing::info!("Dividing {} / {} = {}", a, b, result);
        Ok(json!(result))
    }
}
