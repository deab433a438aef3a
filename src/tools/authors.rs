//! Author traversals: an author's papers, a paper's authors, and coauthors.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::graph::{
    bounded_limit, node_projection, properties_arg, required_str, rows_to_value, GraphClient,
    PAPER_DEFAULT_PROPERTIES, PAPER_PROPERTIES_HINT,
};
use super::Tool;

const AUTHOR_NODE_ID: &str = "Unique node identifier (nodeId) for the author, as returned by search_nodes";

/// Papers written by one author.
pub struct AuthorPapers {
    client: Arc<GraphClient>,
}

impl AuthorPapers {
    pub fn new(client: Arc<GraphClient>) -> Self {
        Self { client }
    }

    fn build_query(args: &Value) -> anyhow::Result<(String, Value)> {
        let author_node_id = required_str(args, "author_node_id")?;
        let limit = bounded_limit(args, 50, 200)?;
        let props = properties_arg(args, &PAPER_DEFAULT_PROPERTIES)?;

        let mut params = json!({ "author_node_id": author_node_id, "limit": limit });
        let mut conditions = vec!["author.nodeId = $author_node_id".to_string()];
        if let Some(from) = args["date_from"].as_str() {
            conditions.push("paper.date >= $date_from".to_string());
            params["date_from"] = json!(from);
        }
        if let Some(to) = args["date_to"].as_str() {
            conditions.push("paper.date <= $date_to".to_string());
            params["date_to"] = json!(to);
        }

        let order = match args["order_by"].as_str().unwrap_or("date_desc") {
            "date_desc" => "paper.date DESC",
            "date_asc" => "paper.date ASC",
            "citation_count" => "paper.citationCount DESC",
            other => return Err(anyhow::anyhow!("Unsupported order_by: {}", other)),
        };

        let statement = format!(
            "MATCH (author:Author)<-[:HAS_AUTHOR]-(paper:Paper) \
             WHERE {} \
             RETURN {} \
             ORDER BY {order} \
             LIMIT $limit",
            conditions.join(" AND "),
            node_projection("paper", &props)
        );
        Ok((statement, params))
    }
}

#[async_trait]
impl Tool for AuthorPapers {
    fn name(&self) -> &str {
        "author_papers"
    }

    fn description(&self) -> &str {
        "Find all papers authored by a specific author (Author <- HAS_AUTHOR <- Paper), \
         ordered by date or citation count, optionally filtered by a date range."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "author_node_id": { "type": "string", "description": AUTHOR_NODE_ID },
                "limit": { "type": "integer", "minimum": 1, "maximum": 200 },
                "return_properties": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": PAPER_PROPERTIES_HINT
                },
                "order_by": { "type": "string", "enum": ["date_desc", "date_asc", "citation_count"] },
                "date_from": { "type": "string", "description": "YYYY-MM-DD or YYYY" },
                "date_to": { "type": "string", "description": "YYYY-MM-DD or YYYY" }
            },
            "required": ["author_node_id"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<Value> {
        let (statement, params) = Self::build_query(&args)?;
        let rows = self.client.run_query(&statement, params).await?;
        Ok(rows_to_value(rows))
    }
}

const PAPER_AUTHORS_QUERY: &str = "MATCH (paper:Paper {nodeId: $paper_node_id})-[:HAS_AUTHOR]->(author:Author) \
     RETURN author.nodeId AS nodeId, author.name AS name, author.hIndex AS hIndex \
     ORDER BY author.hIndex DESC";

/// Authors of one paper, highest h-index first.
pub struct PaperAuthors {
    client: Arc<GraphClient>,
}

impl PaperAuthors {
    pub fn new(client: Arc<GraphClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for PaperAuthors {
    fn name(&self) -> &str {
        "paper_authors"
    }

    fn description(&self) -> &str {
        "List the authors of a paper (Paper -> HAS_AUTHOR -> Author) with their nodeId, name \
         and hIndex, highest hIndex first."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "paper_node_id": {
                    "type": "string",
                    "description": "nodeId of the paper, as returned by search_nodes"
                }
            },
            "required": ["paper_node_id"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<Value> {
        let paper_node_id = required_str(&args, "paper_node_id")?;
        let rows = self
            .client
            .run_query(PAPER_AUTHORS_QUERY, json!({ "paper_node_id": paper_node_id }))
            .await?;
        Ok(rows_to_value(rows))
    }
}

const COAUTHORS_QUERY: &str = "MATCH (author:Author {nodeId: $author_node_id})<-[:HAS_AUTHOR]-(paper:Paper)-[:HAS_AUTHOR]->(coauthor:Author) \
     WHERE author <> coauthor \
     WITH coauthor, COUNT(paper) AS collaboration_count, \
          MIN(paper.date) AS first_collaboration, MAX(paper.date) AS last_collaboration \
     WHERE collaboration_count >= $min_collaborations \
     RETURN coauthor.nodeId AS nodeId, coauthor.name AS name, coauthor.hIndex AS hIndex, \
            collaboration_count, first_collaboration, last_collaboration \
     ORDER BY collaboration_count DESC, last_collaboration DESC \
     LIMIT $limit";

/// Collaborators of one author, most frequent first.
pub struct AuthorCoauthors {
    client: Arc<GraphClient>,
}

impl AuthorCoauthors {
    pub fn new(client: Arc<GraphClient>) -> Self {
        Self { client }
    }

    fn build_params(args: &Value) -> anyhow::Result<Value> {
        let author_node_id = required_str(args, "author_node_id")?;
        let limit = bounded_limit(args, 20, 200)?;
        let min_collaborations = args["min_collaborations"].as_u64().unwrap_or(1);
        if min_collaborations == 0 {
            return Err(anyhow::anyhow!("'min_collaborations' must be at least 1"));
        }
        Ok(json!({
            "author_node_id": author_node_id,
            "limit": limit,
            "min_collaborations": min_collaborations,
        }))
    }
}

#[async_trait]
impl Tool for AuthorCoauthors {
    fn name(&self) -> &str {
        "author_coauthors"
    }

    fn description(&self) -> &str {
        "Find an author's collaborators (Author <- HAS_AUTHOR <- Paper -> HAS_AUTHOR -> Author). \
         Returns nodeId, name, hIndex, collaboration_count and the first and last collaboration \
         dates, most frequent collaborators first."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "author_node_id": { "type": "string", "description": AUTHOR_NODE_ID },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 200,
                    "description": "Maximum number of coauthors to return (default: 20)"
                },
                "min_collaborations": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Minimum number of co-authored papers (default: 1)"
                }
            },
            "required": ["author_node_id"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<Value> {
        let params = Self::build_params(&args)?;
        let rows = self.client.run_query(COAUTHORS_QUERY, params).await?;
        Ok(rows_to_value(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn author_papers_builds_date_filters_and_order() {
        let (statement, params) = AuthorPapers::build_query(&json!({
            "author_node_id": "https://example.org/author/1",
            "order_by": "citation_count",
            "date_from": "2019",
            "return_properties": ["title"]
        }))
        .unwrap();
        assert!(statement.contains("paper.date >= $date_from"));
        assert!(!statement.contains("$date_to"));
        assert!(statement.contains("ORDER BY paper.citationCount DESC"));
        assert!(statement.contains("RETURN paper.nodeId AS nodeId, paper.title AS title"));
        assert_eq!(params["date_from"], "2019");
        assert_eq!(params["limit"], 50);
    }

    #[test]
    fn author_papers_rejects_spliced_properties() {
        assert!(AuthorPapers::build_query(&json!({
            "author_node_id": "a",
            "return_properties": ["title, paper.secret"]
        }))
        .is_err());
    }

    #[test]
    fn paper_authors_ranks_by_h_index() {
        assert!(PAPER_AUTHORS_QUERY.contains("author.hIndex AS hIndex"));
        assert!(PAPER_AUTHORS_QUERY.ends_with("ORDER BY author.hIndex DESC"));
    }

    #[test]
    fn coauthor_params_default_and_validate() {
        let params = AuthorCoauthors::build_params(&json!({"author_node_id": "a"})).unwrap();
        assert_eq!(params["limit"], 20);
        assert_eq!(params["min_collaborations"], 1);
        assert!(AuthorCoauthors::build_params(&json!({"author_node_id": "a", "min_collaborations": 0})).is_err());
        assert!(AuthorCoauthors::build_params(&json!({"limit": 5})).is_err());
    }
}
