//! Method and category traversals.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::graph::{
    bounded_limit, node_projection, paper_listing_schema, paper_order, properties_arg,
    required_str, rows_to_value, GraphClient, PAPER_DEFAULT_PROPERTIES,
};
use super::Tool;

fn paper_listing_query(args: &Value, id_key: &str, pattern: &str) -> anyhow::Result<(String, Value)> {
    let node_id = required_str(args, id_key)?;
    let limit = bounded_limit(args, 50, 200)?;
    let props = properties_arg(args, &PAPER_DEFAULT_PROPERTIES)?;
    let order = paper_order(args, "paper", "date")?;

    let statement = format!(
        "MATCH {pattern} \
         RETURN {} \
         ORDER BY {order} \
         LIMIT $limit",
        node_projection("paper", &props)
    );
    let mut params = json!({ "limit": limit });
    params[id_key] = json!(node_id);
    Ok((statement, params))
}

const METHOD_PAPERS_PATTERN: &str = "(method:Method {nodeId: $method_node_id})<-[:HAS_METHOD]-(paper:Paper)";

const CATEGORY_PAPERS_PATTERN: &str = "(category:Category {nodeId: $category_node_id})<-[:CATEGORY|MAIN_CATEGORY]-(method:Method)<-[:HAS_METHOD]-(paper:Paper)";

/// Papers that use one method.
pub struct MethodPapers {
    client: Arc<GraphClient>,
}

impl MethodPapers {
    pub fn new(client: Arc<GraphClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for MethodPapers {
    fn name(&self) -> &str {
        "method_papers"
    }

    fn description(&self) -> &str {
        "Find papers that use a specific method (Method <- HAS_METHOD <- Paper), e.g. to \
         explore applications of a technique or track its adoption over time."
    }

    fn parameters_schema(&self) -> Value {
        paper_listing_schema(
            "method_node_id",
            "Unique node identifier (nodeId) for the method, as returned by search_nodes",
            "date",
        )
    }

    async fn execute(&self, args: Value) -> anyhow::Result<Value> {
        let (statement, params) = paper_listing_query(&args, "method_node_id", METHOD_PAPERS_PATTERN)?;
        Ok(rows_to_value(self.client.run_query(&statement, params).await?))
    }
}

/// Papers in one research category, through the methods filed under it.
pub struct CategoryPapers {
    client: Arc<GraphClient>,
}

impl CategoryPapers {
    pub fn new(client: Arc<GraphClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for CategoryPapers {
    fn name(&self) -> &str {
        "category_papers"
    }

    fn description(&self) -> &str {
        "Find papers in a research category (Category <- CATEGORY|MAIN_CATEGORY <- Method <- \
         HAS_METHOD <- Paper), e.g. recent work in 'Image Generation Models'."
    }

    fn parameters_schema(&self) -> Value {
        paper_listing_schema(
            "category_node_id",
            "Unique node identifier (nodeId) for the category, as returned by search_nodes",
            "date",
        )
    }

    async fn execute(&self, args: Value) -> anyhow::Result<Value> {
        let (statement, params) =
            paper_listing_query(&args, "category_node_id", CATEGORY_PAPERS_PATTERN)?;
        Ok(rows_to_value(self.client.run_query(&statement, params).await?))
    }
}

const METHOD_DEFAULT_PROPERTIES: [&str; 4] = ["name", "description", "introducedYear", "numberPapers"];

/// Methods used by one paper.
pub struct PaperMethods {
    client: Arc<GraphClient>,
}

impl PaperMethods {
    pub fn new(client: Arc<GraphClient>) -> Self {
        Self { client }
    }

    fn build_query(args: &Value) -> anyhow::Result<(String, Value)> {
        let paper_node_id = required_str(args, "paper_node_id")?;
        let props = properties_arg(args, &METHOD_DEFAULT_PROPERTIES)?;
        let statement = format!(
            "MATCH (paper:Paper {{nodeId: $paper_node_id}})-[:HAS_METHOD]->(method:Method) \
             RETURN {}",
            node_projection("method", &props)
        );
        Ok((statement, json!({ "paper_node_id": paper_node_id })))
    }
}

#[async_trait]
impl Tool for PaperMethods {
    fn name(&self) -> &str {
        "paper_methods"
    }

    fn description(&self) -> &str {
        "List the methods used in a paper (Paper -> HAS_METHOD -> Method)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "paper_node_id": {
                    "type": "string",
                    "description": "Unique node identifier (nodeId) for the paper, as returned by search_nodes"
                },
                "return_properties": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Available: name, description, introducedYear, numberPapers"
                }
            },
            "required": ["paper_node_id"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<Value> {
        let (statement, params) = Self::build_query(&args)?;
        Ok(rows_to_value(self.client.run_query(&statement, params).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_papers_bind_the_method_id() {
        let (statement, params) = paper_listing_query(
            &json!({"method_node_id": "m1", "order_by": "citationCount", "limit": 10}),
            "method_node_id",
            METHOD_PAPERS_PATTERN,
        )
        .unwrap();
        assert!(statement.starts_with("MATCH (method:Method {nodeId: $method_node_id})<-[:HAS_METHOD]-(paper:Paper)"));
        assert!(statement.contains("ORDER BY paper.citationCount DESC"));
        assert_eq!(params["method_node_id"], "m1");
        assert_eq!(params["limit"], 10);
    }

    #[test]
    fn category_papers_go_through_methods() {
        let (statement, params) =
            paper_listing_query(&json!({"category_node_id": "c1"}), "category_node_id", CATEGORY_PAPERS_PATTERN)
                .unwrap();
        assert!(statement.contains("<-[:CATEGORY|MAIN_CATEGORY]-(method:Method)<-[:HAS_METHOD]-(paper:Paper)"));
        assert!(statement.contains("RETURN paper.nodeId AS nodeId"));
        assert!(statement.contains("ORDER BY paper.date DESC"));
        assert_eq!(params["category_node_id"], "c1");
    }

    #[test]
    fn paper_methods_return_method_ids() {
        let (statement, _) = PaperMethods::build_query(&json!({"paper_node_id": "p1"})).unwrap();
        assert!(statement.ends_with(
            "RETURN method.nodeId AS nodeId, method.name AS name, method.description AS description, \
             method.introducedYear AS introducedYear, method.numberPapers AS numberPapers"
        ));
    }
}
