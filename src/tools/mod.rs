//! Tool system for the agent.
//!
//! Tools are registered by name in a [`ToolRegistry`]; the agent looks them
//! up when the model requests a call.

mod arithmetic;
mod authors;
mod citations;
mod graph;
mod methods;

pub use arithmetic::{AddNumbers, DivideNumbers, MultiplyNumbers, SubtractNumbers};
pub use authors::{AuthorCoauthors, AuthorPapers, PaperAuthors};
pub use citations::{PaperCitationChain, PaperCitationsIn, PaperCitationsOut};
pub use graph::{GraphClient, GraphError, SearchNodes};
pub use methods::{CategoryPapers, MethodPapers, PaperMethods};

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

/// A callable tool.
///
/// Implementations may be invoked concurrently and retried after a failure
/// or timeout, so `execute` should be safe to repeat.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments object.
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, args: Value) -> anyhow::Result<Value>;
}

/// Name and description of a registered tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

/// Lookup from tool name to tool.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the four arithmetic tools.
    pub fn with_arithmetic() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(AddNumbers));
        registry.register(Arc::new(SubtractNumbers));
        registry.register(Arc::new(MultiplyNumbers));
        registry.register(Arc::new(DivideNumbers));
        registry
    }

    /// Register the knowledge-graph tools backed by `client`.
    pub fn register_graph_tools(&mut self, client: Arc<GraphClient>) {
        self.register(Arc::new(SearchNodes::new(client.clone())));
        self.register(Arc::new(AuthorPapers::new(client.clone())));
        self.register(Arc::new(PaperAuthors::new(client.clone())));
        self.register(Arc::new(AuthorCoauthors::new(client.clone())));
        self.register(Arc::new(PaperCitationsOut::new(client.clone())));
        self.register(Arc::new(PaperCitationsIn::new(client.clone())));
        self.register(Arc::new(PaperCitationChain::new(client.clone())));
        self.register(Arc::new(MethodPapers::new(client.clone())));
        self.register(Arc::new(PaperMethods::new(client.clone())));
        self.register(Arc::new(CategoryPapers::new(client)));
    }

    /// Add a tool, replacing any tool already registered under the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn list_tools(&self) -> Vec<ToolInfo> {
        self.tools
            .values()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
            })
            .collect()
    }

    /// Function-calling schemas in the OpenAI `tools` format.
    pub fn get_tool_schemas(&self) -> Vec<Value> {
        self.tools
            .values()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name(),
                        "description": t.description(),
                        "parameters": t.parameters_schema(),
                    }
                })
            })
            .collect()
    }
}

/// Read a required numeric argument.
pub(crate) fn number_arg(args: &Value, key: &str) -> anyhow::Result<f64> {
    args[key]
        .as_f64()
        .ok_or_else(|| anyhow::anyhow!("Missing or non-numeric '{}' argument", key))
}
