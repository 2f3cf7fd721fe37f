//! aggtree JSON-RPC Server
//!
//! Line-delimited JSON-RPC 2.0 over stdin/stdout: one request per line,
//! one response per line, nothing for notifications.
//!
//! Methods:
//! - initialize: server info
//! - tree/load, tree/export: persisted node list in and out
//! - tree/apply, tree/undo: recorded edits and single-step undo
//! - tree/traverse, tree/visible_columns: display projections
//! - formula/compile, formula/generate, formula/functions: formula tooling
//!
//! Environment:
//! - AGGTREE_HIERARCHY: path of a persisted hierarchy to load at startup
//! - RUST_LOG: log filter for stderr output (default `info`)

use aggtree_core::NodeId;
use aggtree_formula::{Operation, UsedAttribute};
use aggtree_hierarchy::{visible_columns, AttributeNode, Command, Editor, Hierarchy, ROOT_ID};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::env;
use std::fs;
use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;

const SERVER_NAME: &str = "aggtree";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
const HIERARCHY_ENV: &str = "AGGTREE_HIERARCHY";

const PARSE_ERROR: i32 = -32700;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;

#[derive(Debug, Deserialize)]
struct RpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<JsonValue>,
    method: String,
    #[serde(default)]
    params: Option<JsonValue>,
}

#[derive(Debug, Serialize)]
struct RpcResponse {
    jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
struct RpcError {
    code: i32,
    message: String,
}

impl RpcError {
    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: INVALID_PARAMS,
            message: message.into(),
        }
    }
}

#[derive(Deserialize)]
struct LoadParams {
    nodes: Vec<AttributeNode>,
}

#[derive(Deserialize)]
struct ApplyParams {
    command: Command,
}

#[derive(Deserialize)]
struct RootParams {
    #[serde(default)]
    root: Option<NodeId>,
}

#[derive(Deserialize)]
struct CompileParams {
    formula: String,
    #[serde(default)]
    aggregation: Option<NodeId>,
}

#[derive(Deserialize)]
struct GenerateParams {
    operation: Operation,
    #[serde(default)]
    attributes: Vec<UsedAttribute>,
}

#[derive(Deserialize)]
struct FunctionsParams {
    #[serde(default)]
    category: Option<String>,
}

/// Initial tree: the file named by `AGGTREE_HIERARCHY`, else an empty root
fn initial_hierarchy() -> Hierarchy {
    let Ok(path) = env::var(HIERARCHY_ENV) else {
        return Hierarchy::default();
    };
    let loaded = fs::read_to_string(&path)
        .map_err(|e| e.to_string())
        .and_then(|json| Hierarchy::from_json(&json).map_err(|e| e.to_string()));
    match loaded {
        Ok(tree) => {
            tracing::info!(path = path.as_str(), nodes = tree.len(), "hierarchy loaded");
            tree
        }
        Err(e) => {
            tracing::warn!(path = path.as_str(), "could not load hierarchy: {}", e);
            Hierarchy::default()
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let mut editor = Editor::new(initial_hierarchy());
    tracing::info!(version = SERVER_VERSION, "aggtree server started");

    let stdin = io::stdin();
    let mut reader = io::BufReader::new(stdin.lock());

    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => {
                tracing::info!("client disconnected (EOF)");
                break;
            }
            Ok(_) => {
                let Some(response) = handle_line(&mut editor, &line) else {
                    continue;
                };
                let mut stdout = io::stdout().lock();
                if let Err(e) = writeln!(stdout, "{}", response).and_then(|_| stdout.flush()) {
                    tracing::error!("error writing response: {}", e);
                    break;
                }
            }
            Err(e) => {
                tracing::error!("error reading input: {}", e);
                break;
            }
        }
    }

    tracing::info!("server shutting down");
}

/// Handle one input line, returning the encoded response if one is due
fn handle_line(editor: &mut Editor, line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let request: RpcRequest = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!("error parsing request: {}", e);
            return Some(encode(&RpcResponse {
                jsonrpc: "2.0".to_string(),
                id: None,
                result: None,
                error: Some(RpcError {
                    code: PARSE_ERROR,
                    message: format!("Parse error: {}", e),
                }),
            }));
        }
    };

    tracing::debug!(method = request.method.as_str(), "processing");
    let response = handle_request(editor, &request);

    // Notifications get no response
    if request.id.is_none() {
        return None;
    }
    Some(encode(&response))
}

fn encode(response: &RpcResponse) -> String {
    serde_json::to_string(response).unwrap_or_else(|e| {
        json!({
            "jsonrpc": "2.0",
            "error": { "code": -32603, "message": format!("Internal error: {}", e) }
        })
        .to_string()
    })
}

fn handle_request(editor: &mut Editor, request: &RpcRequest) -> RpcResponse {
    let params = &request.params;
    let result = match request.method.as_str() {
        "initialize" => handle_initialize(),
        "initialized" | "ping" => Ok(json!({})),

        "tree/load" => tree_load(editor, params),
        "tree/export" => to_json(editor.tree().to_nodes()).map(|nodes| json!({ "nodes": nodes })),
        "tree/apply" => tree_apply(editor, params),
        "tree/undo" => Ok(json!({ "undone": editor.undo() })),
        "tree/traverse" => tree_traverse(editor, params),
        "tree/visible_columns" => tree_visible_columns(editor, params),

        "formula/compile" => formula_compile(editor, params),
        "formula/generate" => formula_generate(editor, params),
        "formula/functions" => formula_functions(editor, params),

        _ => Err(RpcError {
            code: METHOD_NOT_FOUND,
            message: format!("Method not found: {}", request.method),
        }),
    };

    match result {
        Ok(r) => RpcResponse {
            jsonrpc: "2.0".to_string(),
            id: request.id.clone(),
            result: Some(r),
            error: None,
        },
        Err(e) => RpcResponse {
            jsonrpc: "2.0".to_string(),
            id: request.id.clone(),
            result: None,
            error: Some(e),
        },
    }
}

fn parse_params<T: DeserializeOwned>(params: &Option<JsonValue>) -> Result<T, RpcError> {
    let raw = params.clone().unwrap_or_else(|| json!({}));
    serde_json::from_value(raw).map_err(|e| RpcError::invalid_params(format!("Invalid params: {}", e)))
}

fn to_json<T: Serialize>(value: T) -> Result<JsonValue, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError {
        code: -32603,
        message: format!("Internal error: {}", e),
    })
}

fn handle_initialize() -> Result<JsonValue, RpcError> {
    Ok(json!({
        "serverInfo": {
            "name": SERVER_NAME,
            "version": SERVER_VERSION,
            "description": "Hierarchical attribute aggregation"
        },
        "methods": [
            "tree/load", "tree/export", "tree/apply", "tree/undo",
            "tree/traverse", "tree/visible_columns",
            "formula/compile", "formula/generate", "formula/functions"
        ]
    }))
}

fn tree_load(editor: &mut Editor, params: &Option<JsonValue>) -> Result<JsonValue, RpcError> {
    let LoadParams { nodes } = parse_params(params)?;
    let tree = Hierarchy::from_nodes(nodes).map_err(|e| RpcError::invalid_params(e.to_string()))?;
    let count = tree.len();
    editor.replace_tree(tree);
    Ok(json!({ "ok": true, "nodes": count }))
}

fn tree_apply(editor: &mut Editor, params: &Option<JsonValue>) -> Result<JsonValue, RpcError> {
    let ApplyParams { command } = parse_params(params)?;
    let warnings = editor.apply(command);
    Ok(json!({ "warnings": warnings, "history": editor.log().len() }))
}

fn tree_traverse(editor: &Editor, params: &Option<JsonValue>) -> Result<JsonValue, RpcError> {
    let RootParams { root } = parse_params(params)?;
    let root = root.unwrap_or(ROOT_ID);
    let view = editor
        .tree()
        .traverse(root)
        .ok_or_else(|| RpcError::invalid_params(format!("Unknown node: {}", root)))?;
    to_json(view)
}

fn tree_visible_columns(editor: &Editor, params: &Option<JsonValue>) -> Result<JsonValue, RpcError> {
    let RootParams { root } = parse_params(params)?;
    let root = root.unwrap_or(ROOT_ID);
    let view = editor
        .tree()
        .traverse(root)
        .ok_or_else(|| RpcError::invalid_params(format!("Unknown node: {}", root)))?;
    to_json(visible_columns(&view))
}

/// Formula errors are results, not protocol errors
fn formula_compile(editor: &Editor, params: &Option<JsonValue>) -> Result<JsonValue, RpcError> {
    let CompileParams { formula, aggregation } = parse_params(params)?;
    let compiled = match aggregation {
        Some(id) => editor.compile_for(id, &formula),
        None => editor.engine().compile(&formula),
    };
    match compiled {
        Ok(c) => Ok(json!({ "formula": c.formula, "exec": c.exec_source(), "nodes": c.nodes })),
        Err(e) => to_json(e),
    }
}

fn formula_generate(editor: &Editor, params: &Option<JsonValue>) -> Result<JsonValue, RpcError> {
    let GenerateParams { operation, attributes } = parse_params(params)?;
    to_json(editor.engine().generate(operation, &attributes).to_result())
}

fn formula_functions(editor: &Editor, params: &Option<JsonValue>) -> Result<JsonValue, RpcError> {
    let FunctionsParams { category } = parse_params(params)?;
    to_json(editor.engine().registry().list_functions(category.as_deref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(editor: &mut Editor, method: &str, params: JsonValue) -> JsonValue {
        let line = json!({"jsonrpc": "2.0", "id": 1, "method": method, "params": params}).to_string();
        let out = handle_line(editor, &line).expect("request with id gets a response");
        serde_json::from_str(&out).unwrap()
    }

    fn loaded() -> Editor {
        let mut editor = Editor::new(Hierarchy::default());
        let response = call(&mut editor, "tree/load", json!({"nodes": [
            {"id": 0, "name": "root", "type": "root", "related": [1, 3]},
            {"id": 1, "name": "total", "type": "aggregation", "related": [2],
             "info": {"operation": "sum", "formula": "$(a)", "exec": "r => r[\"a\"]",
                      "usedAttributes": [{"id": 2, "name": "a"}]}},
            {"id": 2, "name": "a", "type": "attribute"},
            {"id": 3, "name": "b", "type": "attribute"}
        ]}));
        assert_eq!(response["result"]["ok"], true);
        editor
    }

    #[test]
    fn test_parse_error() {
        let mut editor = Editor::new(Hierarchy::default());
        let out: JsonValue = serde_json::from_str(&handle_line(&mut editor, "{not json").unwrap()).unwrap();
        assert_eq!(out["error"]["code"], PARSE_ERROR);
    }

    #[test]
    fn test_unknown_method() {
        let mut editor = Editor::new(Hierarchy::default());
        let out = call(&mut editor, "tree/frobnicate", json!({}));
        assert_eq!(out["error"]["code"], METHOD_NOT_FOUND);
    }

    #[test]
    fn test_notification_gets_no_response() {
        let mut editor = Editor::new(Hierarchy::default());
        let line = json!({"jsonrpc": "2.0", "method": "initialized"}).to_string();
        assert!(handle_line(&mut editor, &line).is_none());
        assert!(handle_line(&mut editor, "   ").is_none());
    }

    #[test]
    fn test_apply_and_undo_round_trip() {
        let mut editor = loaded();
        let out = call(&mut editor, "tree/apply", json!({
            "command": {"change": "relationshipNode", "source": 3, "target": 1}
        }));
        assert_eq!(out["result"]["history"], 1);
        let view = call(&mut editor, "tree/traverse", json!({"root": 1}));
        assert_eq!(view["result"]["children"].as_array().unwrap().len(), 2);

        let out = call(&mut editor, "tree/undo", json!(null));
        assert_eq!(out["result"]["undone"], true);
        let nodes = call(&mut editor, "tree/export", json!({}));
        let root = &nodes["result"]["nodes"][0];
        assert_eq!(root["related"], json!([1, 3]));

        let out = call(&mut editor, "tree/undo", json!(null));
        assert_eq!(out["result"]["undone"], false);
    }

    #[test]
    fn test_invalid_load_is_rejected() {
        let mut editor = Editor::new(Hierarchy::default());
        let out = call(&mut editor, "tree/load", json!({"nodes": [{"id": 1, "name": "a", "type": "attribute"}]}));
        assert_eq!(out["error"]["code"], INVALID_PARAMS);
    }

    #[test]
    fn test_visible_columns() {
        let mut editor = loaded();
        let out = call(&mut editor, "tree/visible_columns", json!({}));
        assert_eq!(out["result"], json!(["b", "a"]));
    }

    #[test]
    fn test_compile_reports_formula_errors_as_results() {
        let mut editor = loaded();
        let ok = call(&mut editor, "formula/compile", json!({"formula": "$(a) * 2", "aggregation": 1}));
        assert_eq!(ok["result"]["formula"], "r[\"a\"] * 2");
        assert_eq!(ok["result"]["nodes"], json!(["a"]));

        let bad = call(&mut editor, "formula/compile", json!({"formula": "$(b)", "aggregation": 1}));
        assert_eq!(bad["result"]["error"], "AttributeNotFound");

        let bad = call(&mut editor, "formula/compile", json!({"formula": "madeup(1)"}));
        assert_eq!(bad["result"]["error"], "VariableNotDeclared");
    }

    #[test]
    fn test_generate() {
        let mut editor = Editor::new(Hierarchy::default());
        let out = call(&mut editor, "formula/generate", json!({
            "operation": "sum",
            "attributes": [{"id": 1, "name": "a"}, {"id": 2, "name": "b"}]
        }));
        assert_eq!(out["result"], json!({
            "valid": true,
            "formula": "$(a) + $(b)",
            "exec": "r => r[\"a\"] + r[\"b\"]"
        }));
    }

    #[test]
    fn test_functions_by_category() {
        let mut editor = Editor::new(Hierarchy::default());
        let out = call(&mut editor, "formula/functions", json!({"category": "date"}));
        let list = out["result"].as_array().unwrap();
        assert!(!list.is_empty());
        assert!(list.iter().all(|f| f["category"] == "date"));
    }
}
