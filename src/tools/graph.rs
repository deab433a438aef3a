//! Knowledge-graph tools over the Neo4j HTTP transactional API.
//!
//! The [`GraphClient`] is constructed once by the caller, shared by the graph
//! tools through an `Arc`, and closed explicitly on shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

use super::Tool;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("graph client is closed")]
    Closed,

    #[error("graph request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("graph endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("query failed ({code}): {message}")]
    Query { code: String, message: String },

    #[error("invalid property name: {0}")]
    InvalidProperty(String),
}

/// Handle to a Neo4j database reached over HTTP.
pub struct GraphClient {
    http: reqwest::Client,
    endpoint: String,
    username: String,
    password: String,
    closed: AtomicBool,
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Debug, Deserialize)]
struct TxResult {
    columns: Vec<String>,
    data: Vec<TxRow>,
}

#[derive(Debug, Deserialize)]
struct TxRow {
    row: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct TxError {
    code: String,
    message: String,
}

impl GraphClient {
    pub fn new(
        uri: &str,
        username: impl Into<String>,
        password: impl Into<String>,
        database: &str,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: format!("{}/db/{}/tx/commit", uri.trim_end_matches('/'), database),
            username: username.into(),
            password: password.into(),
            closed: AtomicBool::new(false),
        }
    }

    /// Run a trivial query to check the database is reachable.
    pub async fn verify_connectivity(&self) -> Result<(), GraphError> {
        self.run_query("RETURN 1 AS ok", json!({})).await.map(|_| ())
    }

    /// Run a read query and return one JSON object per row.
    pub async fn run_query(
        &self,
        statement: &str,
        parameters: Value,
    ) -> Result<Vec<Map<String, Value>>, GraphError> {
        if self.is_closed() {
            return Err(GraphError::Closed);
        }

        let body = json!({
            "statements": [{ "statement": statement, "parameters": parameters }]
        });
        let response = self
            .http
            .post(&self.endpoint)
            .basic_auth(&self.username, Some(&self.password))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GraphError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let tx: TxResponse = response.json().await?;
        rows_from_response(tx)
    }

    /// Refuse further queries. Requests already sent are not interrupted.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::info!("Graph client closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

fn rows_from_response(tx: TxResponse) -> Result<Vec<Map<String, Value>>, GraphError> {
    if let Some(err) = tx.errors.into_iter().next() {
        return Err(GraphError::Query {
            code: err.code,
            message: err.message,
        });
    }
    let rows = tx
        .results
        .into_iter()
        .next()
        .map(|result| {
            result
                .data
                .into_iter()
                .map(|row| result.columns.iter().cloned().zip(row.row).collect())
                .collect()
        })
        .unwrap_or_default();
    Ok(rows)
}

/// Property names are spliced into Cypher, so only plain identifiers pass.
fn validate_properties(props: &[String]) -> Result<(), GraphError> {
    for prop in props {
        let mut chars = prop.chars();
        let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(GraphError::InvalidProperty(prop.clone()));
        }
    }
    Ok(())
}

pub(super) fn string_list_arg(args: &Value, key: &str) -> Option<Vec<String>> {
    args[key].as_array().map(|items| {
        items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    })
}

pub(super) fn bounded_limit(args: &Value, default: u64, max: u64) -> anyhow::Result<u64> {
    let limit = args["limit"].as_u64().unwrap_or(default);
    if limit == 0 || limit > max {
        return Err(anyhow::anyhow!("'limit' must be between 1 and {}", max));
    }
    Ok(limit)
}

pub(super) fn required_str<'a>(args: &'a Value, key: &str) -> anyhow::Result<&'a str> {
    args[key]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("Missing '{}' argument", key))
}

/// Requested properties, or `default` when none were given. Validated.
pub(super) fn properties_arg(args: &Value, default: &[&str]) -> Result<Vec<String>, GraphError> {
    let props = string_list_arg(args, "return_properties")
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| default.iter().map(|p| p.to_string()).collect());
    validate_properties(&props)?;
    Ok(props)
}

/// `var.nodeId AS nodeId` followed by one column per property.
pub(super) fn node_projection(var: &str, props: &[String]) -> String {
    std::iter::once(format!("{var}.nodeId AS nodeId"))
        .chain(props.iter().map(|p| format!("{var}.{p} AS {p}")))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Sort clause for the `date` / `citationCount` choice of the paper listings.
pub(super) fn paper_order(args: &Value, var: &str, default: &str) -> anyhow::Result<String> {
    match args["order_by"].as_str().unwrap_or(default) {
        "date" => Ok(format!("{var}.date DESC")),
        "citationCount" => Ok(format!("{var}.citationCount DESC")),
        other => Err(anyhow::anyhow!("Unsupported order_by: {}", other)),
    }
}

pub(super) fn rows_to_value(rows: Vec<Map<String, Value>>) -> Value {
    Value::Array(rows.into_iter().map(Value::Object).collect())
}

pub(super) const PAPER_DEFAULT_PROPERTIES: [&str; 3] = ["title", "date", "citationCount"];

pub(super) const PAPER_PROPERTIES_HINT: &str =
    "Properties to return for each paper. Available: title, date, citationCount, abstract, hasURL, hasArXivId";

/// Shared JSON schema for `{<id_key>, limit, return_properties, order_by}` paper listings.
pub(super) fn paper_listing_schema(id_key: &str, id_description: &str, default_order: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            id_key: { "type": "string", "description": id_description },
            "limit": {
                "type": "integer",
                "minimum": 1,
                "maximum": 200,
                "description": "Maximum number of papers to return (default: 50)"
            },
            "return_properties": {
                "type": "array",
                "items": { "type": "string" },
                "description": PAPER_PROPERTIES_HINT
            },
            "order_by": {
                "type": "string",
                "enum": ["date", "citationCount"],
                "description": format!(
                    "Sort by date (newest first) or citation count (highest first). Default: {}",
                    default_order
                )
            }
        },
        "required": [id_key]
    })
}

const NODE_TYPES: [&str; 5] = ["Paper", "Author", "Category", "Method", "Task"];

fn search_index(node_type: &str) -> Option<&'static str> {
    match node_type {
        "Paper" => Some("paper_title_search"),
        "Author" => Some("author_search"),
        "Category" => Some("category_search"),
        "Method" => Some("method_search"),
        "Task" => Some("task_search"),
        _ => None,
    }
}

/// Properties `search_nodes` may return for each node type.
fn valid_properties(node_type: &str) -> &'static [&'static str] {
    match node_type {
        "Paper" => &["title", "date", "citationCount", "abstract", "hasURL", "hasArXivId"],
        "Author" => &["name", "hIndex"],
        "Method" => &[
            "name",
            "description",
            "numberPapers",
            "introducedYear",
            "codeSnippet",
            "source",
        ],
        "Task" => &["name", "description"],
        _ => &["name"],
    }
}

fn default_properties(node_type: &str) -> &'static [&'static str] {
    match node_type {
        "Paper" => &["title", "date", "citationCount"],
        "Author" => &["name", "hIndex"],
        "Method" => &["name", "description", "numberPapers"],
        "Task" => &["name", "description"],
        _ => &["name"],
    }
}

/// Full-text search over one node type, ranked by relevance.
pub struct SearchNodes {
    client: Arc<GraphClient>,
}

impl SearchNodes {
    pub fn new(client: Arc<GraphClient>) -> Self {
        Self { client }
    }

    fn build_query(args: &Value) -> anyhow::Result<(String, Value, String)> {
        let node_type = required_str(args, "node_type")?;
        let index = search_index(node_type)
            .ok_or_else(|| anyhow::anyhow!("No index found for node type: {}", node_type))?;
        let search_query = required_str(args, "search_query")?;
        let limit = bounded_limit(args, 20, 50)?;
        let props = properties_arg(args, default_properties(node_type))?;

        let valid = valid_properties(node_type);
        let invalid: Vec<&str> = props
            .iter()
            .map(String::as_str)
            .filter(|p| !valid.contains(p))
            .collect();
        if !invalid.is_empty() {
            return Err(anyhow::anyhow!(
                "Invalid properties for {}: {:?}. Valid options: {:?}",
                node_type,
                invalid,
                valid
            ));
        }

        let statement = format!(
            "CALL db.index.fulltext.queryNodes($index_name, $search_query) \
             YIELD node, score \
             RETURN {}, score \
             ORDER BY score DESC \
             LIMIT $limit",
            node_projection("node", &props)
        );
        let params = json!({
            "index_name": index,
            "search_query": search_query,
            "limit": limit,
        });
        Ok((statement, params, node_type.to_string()))
    }
}

#[async_trait]
impl Tool for SearchNodes {
    fn name(&self) -> &str {
        "search_nodes"
    }

    fn description(&self) -> &str {
        "Search for nodes in the knowledge graph using full-text search with relevance scoring. \
         Supports boolean operators (AND, OR, NOT), wildcards (*) and quoted phrases. Returns \
         exact property values (e.g. paper titles) and the nodeId that the traversal tools take."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "node_type": {
                    "type": "string",
                    "enum": NODE_TYPES,
                    "description": "The type of node to search for"
                },
                "search_query": {
                    "type": "string",
                    "description": "Full-text query, e.g. 'transformer attention', 'hinton', 'BERT*'"
                },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 50,
                    "description": "Maximum number of results (default: 20)"
                },
                "return_properties": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Properties to return. Paper: title, date, citationCount, abstract, hasURL, hasArXivId | Author: name, hIndex | Category: name | Method: name, description, numberPapers, introducedYear, codeSnippet, source | Task: name, description"
                }
            },
            "required": ["node_type", "search_query"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<Value> {
        let (statement, params, node_type) = Self::build_query(&args)?;
        let rows = self.client.run_query(&statement, params).await?;
        let nodes: Vec<Value> = rows
            .into_iter()
            .map(|mut row| {
                let score = row.remove("score").unwrap_or(Value::Null);
                row.insert("node_type".to_string(), json!(node_type));
                row.insert("relevance_score".to_string(), score);
                Value::Object(row)
            })
            .collect();
        Ok(Value::Array(nodes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_returns_node_ids_for_traversal_tools() {
        let (statement, params, node_type) = SearchNodes::build_query(&json!({
            "node_type": "Author",
            "search_query": "hinton"
        }))
        .unwrap();
        assert_eq!(node_type, "Author");
        assert_eq!(params["index_name"], "author_search");
        assert_eq!(params["limit"], 20);
        assert!(statement.contains("RETURN node.nodeId AS nodeId, node.name AS name, node.hIndex AS hIndex, score"));
    }

    #[test]
    fn search_rejects_unknown_type_and_bad_limit() {
        assert!(SearchNodes::build_query(&json!({"node_type": "Venue", "search_query": "x"})).is_err());
        assert!(SearchNodes::build_query(
            &json!({"node_type": "Paper", "search_query": "x", "limit": 51})
        )
        .is_err());
    }

    #[test]
    fn search_only_returns_properties_of_the_node_type() {
        let err = SearchNodes::build_query(&json!({
            "node_type": "Author",
            "search_query": "x",
            "return_properties": ["name", "abstract"]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("Invalid properties for Author"));

        let (statement, _, _) = SearchNodes::build_query(&json!({
            "node_type": "Paper",
            "search_query": "attention",
            "return_properties": ["title", "hasArXivId"]
        }))
        .unwrap();
        assert!(statement.contains("node.nodeId AS nodeId, node.title AS title, node.hasArXivId AS hasArXivId"));
    }

    #[test]
    fn property_names_cannot_inject_cypher() {
        let err = properties_arg(
            &json!({"return_properties": ["title} DETACH DELETE node //"]}),
            &PAPER_DEFAULT_PROPERTIES,
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid property name"));
    }

    #[test]
    fn paper_order_accepts_date_or_citations() {
        assert_eq!(paper_order(&json!({}), "paper", "date").unwrap(), "paper.date DESC");
        assert_eq!(
            paper_order(&json!({"order_by": "citationCount"}), "cited", "date").unwrap(),
            "cited.citationCount DESC"
        );
        assert!(paper_order(&json!({"order_by": "title"}), "paper", "date").is_err());
    }

    #[test]
    fn transaction_rows_become_objects() {
        let tx: TxResponse = serde_json::from_value(json!({
            "results": [{"columns": ["name", "score"], "data": [{"row": ["Ada", 1.5]}]}],
            "errors": []
        }))
        .unwrap();
        let rows = rows_from_response(tx).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "Ada");
        assert_eq!(rows[0]["score"], 1.5);
    }

    #[test]
    fn transaction_errors_surface() {
        let tx: TxResponse = serde_json::from_value(json!({
            "results": [],
            "errors": [{"code": "Neo.ClientError.Statement.SyntaxError", "message": "bad"}]
        }))
        .unwrap();
        assert!(matches!(rows_from_response(tx), Err(GraphError::Query { .. })));
    }

    #[tokio::test]
    async fn closed_client_refuses_queries() {
        let client = GraphClient::new("http://127.0.0.1:1", "neo4j", "pw", "neo4j");
        client.close();
        assert!(client.is_closed());
        assert!(matches!(
            client.run_query("RETURN 1", json!({})).await,
            Err(GraphError::Closed)
        ));
    }
}
