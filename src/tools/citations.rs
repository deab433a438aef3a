//! Citation traversals over `(:Paper)-[:CITES]->(:Paper)`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::graph::{
    bounded_limit, node_projection, paper_listing_schema, paper_order, properties_arg,
    required_str, rows_to_value, GraphClient, PAPER_DEFAULT_PROPERTIES, PAPER_PROPERTIES_HINT,
};
use super::Tool;

const PAPER_NODE_ID: &str = "Unique node identifier (nodeId) for the paper, as returned by search_nodes";

/// Which side of the `CITES` edge the starting paper is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// The paper's references
    Out,
    /// Papers citing the paper
    In,
}

fn one_hop_query(direction: Direction, args: &Value) -> anyhow::Result<(String, Value)> {
    let paper_node_id = required_str(args, "paper_node_id")?;
    let limit = bounded_limit(args, 50, 200)?;
    let props = properties_arg(args, &PAPER_DEFAULT_PROPERTIES)?;
    let (pattern, var, default_order) = match direction {
        Direction::Out => ("-[:CITES]->(cited:Paper)", "cited", "citationCount"),
        Direction::In => ("<-[:CITES]-(citing:Paper)", "citing", "date"),
    };
    let order = paper_order(args, var, default_order)?;

    let statement = format!(
        "MATCH (paper:Paper {{nodeId: $paper_node_id}}){pattern} \
         RETURN {} \
         ORDER BY {order} \
         LIMIT $limit",
        node_projection(var, &props)
    );
    Ok((statement, json!({ "paper_node_id": paper_node_id, "limit": limit })))
}

/// Papers cited by one paper.
pub struct PaperCitationsOut {
    client: Arc<GraphClient>,
}

impl PaperCitationsOut {
    pub fn new(client: Arc<GraphClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for PaperCitationsOut {
    fn name(&self) -> &str {
        "paper_citations_out"
    }

    fn description(&self) -> &str {
        "Find the papers a specific paper cites (Paper -> CITES -> Paper): its references and \
         the prior work it builds on."
    }

    fn parameters_schema(&self) -> Value {
        paper_listing_schema("paper_node_id", PAPER_NODE_ID, "citationCount")
    }

    async fn execute(&self, args: Value) -> anyhow::Result<Value> {
        let (statement, params) = one_hop_query(Direction::Out, &args)?;
        Ok(rows_to_value(self.client.run_query(&statement, params).await?))
    }
}

/// Papers citing one paper.
pub struct PaperCitationsIn {
    client: Arc<GraphClient>,
}

impl PaperCitationsIn {
    pub fn new(client: Arc<GraphClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for PaperCitationsIn {
    fn name(&self) -> &str {
        "paper_citations_in"
    }

    fn description(&self) -> &str {
        "Find the papers that cite a specific paper (Paper <- CITES <- Paper), e.g. to measure \
         its impact or find later work built on it."
    }

    fn parameters_schema(&self) -> Value {
        paper_listing_schema("paper_node_id", PAPER_NODE_ID, "date")
    }

    async fn execute(&self, args: Value) -> anyhow::Result<Value> {
        let (statement, params) = one_hop_query(Direction::In, &args)?;
        Ok(rows_to_value(self.client.run_query(&statement, params).await?))
    }
}

/// Multi-hop citation neighbourhood of one paper.
pub struct PaperCitationChain {
    client: Arc<GraphClient>,
}

impl PaperCitationChain {
    pub fn new(client: Arc<GraphClient>) -> Self {
        Self { client }
    }

    fn build_query(args: &Value) -> anyhow::Result<(String, Value)> {
        let paper_node_id = required_str(args, "paper_node_id")?;
        let max_depth = args["max_depth"].as_u64().unwrap_or(2);
        if !(1..=4).contains(&max_depth) {
            return Err(anyhow::anyhow!("'max_depth' must be between 1 and 4"));
        }
        let limit = bounded_limit(args, 50, 200)?;
        let props = properties_arg(args, &PAPER_DEFAULT_PROPERTIES)?;

        // variable-length bounds cannot be parameters, max_depth is range-checked above
        let pattern = match required_str(args, "direction")? {
            "forward" => format!("<-[:CITES*1..{max_depth}]-"),
            "backward" => format!("-[:CITES*1..{max_depth}]->"),
            "both" => format!("-[:CITES*1..{max_depth}]-"),
            other => return Err(anyhow::anyhow!("Unsupported direction: {}", other)),
        };

        let statement = format!(
            "MATCH path = (paper:Paper {{nodeId: $paper_node_id}}){pattern}(related:Paper) \
             WHERE paper <> related \
             WITH DISTINCT related, MIN(LENGTH(path)) AS depth \
             RETURN {}, depth \
             ORDER BY depth ASC, related.citationCount DESC \
             LIMIT $limit",
            node_projection("related", &props)
        );
        Ok((statement, json!({ "paper_node_id": paper_node_id, "limit": limit })))
    }
}

#[async_trait]
impl Tool for PaperCitationChain {
    fn name(&self) -> &str {
        "paper_citation_chain"
    }

    fn description(&self) -> &str {
        "Traverse citation chains from a paper: 'forward' follows papers citing it (impact), \
         'backward' follows its references (lineage), 'both' explores the whole neighbourhood. \
         Each result carries its depth in hops. Depth above 3 can be very slow."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "paper_node_id": { "type": "string", "description": PAPER_NODE_ID },
                "direction": { "type": "string", "enum": ["forward", "backward", "both"] },
                "max_depth": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 4,
                    "description": "Maximum number of citation hops (default: 2)"
                },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 200,
                    "description": "Maximum total papers across all depths (default: 50)"
                },
                "return_properties": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": PAPER_PROPERTIES_HINT
                }
            },
            "required": ["paper_node_id", "direction"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<Value> {
        let (statement, params) = Self::build_query(&args)?;
        let rows = self.client.run_query(&statement, params).await?;
        let papers = rows
            .into_iter()
            .map(|mut row| {
                let depth = row.get("depth").cloned().unwrap_or(Value::Null);
                row.insert("path_length".to_string(), depth);
                Value::Object(row)
            })
            .collect();
        Ok(Value::Array(papers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_citations_default_to_citation_order() {
        let (statement, params) = one_hop_query(Direction::Out, &json!({"paper_node_id": "p1"})).unwrap();
        assert!(statement.contains("-[:CITES]->(cited:Paper)"));
        assert!(statement.contains("RETURN cited.nodeId AS nodeId, cited.title AS title"));
        assert!(statement.contains("ORDER BY cited.citationCount DESC"));
        assert_eq!(params["limit"], 50);
    }

    #[test]
    fn inbound_citations_default_to_newest_first() {
        let (statement, _) = one_hop_query(Direction::In, &json!({"paper_node_id": "p1"})).unwrap();
        assert!(statement.contains("<-[:CITES]-(citing:Paper)"));
        assert!(statement.contains("ORDER BY citing.date DESC"));
    }

    #[test]
    fn chain_direction_sets_the_edge_pattern() {
        let (forward, _) = PaperCitationChain::build_query(
            &json!({"paper_node_id": "p1", "direction": "forward", "max_depth": 3}),
        )
        .unwrap();
        assert!(forward.contains("<-[:CITES*1..3]-(related:Paper)"));
        assert!(forward.contains(", depth ORDER BY depth ASC"));

        let (both, _) =
            PaperCitationChain::build_query(&json!({"paper_node_id": "p1", "direction": "both"})).unwrap();
        assert!(both.contains("-[:CITES*1..2]-(related:Paper)"));
    }

    #[test]
    fn chain_rejects_deep_or_unknown_traversals() {
        assert!(PaperCitationChain::build_query(
            &json!({"paper_node_id": "p1", "direction": "forward", "max_depth": 5})
        )
        .is_err());
        assert!(PaperCitationChain::build_query(
            &json!({"paper_node_id": "p1", "direction": "sideways"})
        )
        .is_err());
    }
}
