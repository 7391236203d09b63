//! MCP server implementation.
//!
//! This module provides the main MCP server that handles tool discovery and
//! execution over stdio or HTTP.

use crate::catalog::build_catalog;
use crate::error::McpError;
use crate::executor::{ToolOutcome, Toolbox};
use crate::http_transport::HttpServer;
use crate::protocol::*;
use serde_json::{Value, json};
use std::io::{BufRead, Write};
use std::sync::Arc;
use tether_core::{CrmConfig, McpConfig, Transport};
use tether_storage::StorageClient;
use tokio::sync::mpsc;

use crate::tools::ToolRegistry;

/// The MCP server.
#[derive(Clone)]
pub struct McpServer {
    config: McpConfig,
    tools: ToolRegistry,
    toolbox: Arc<Toolbox>,
}

impl McpServer {
    /// Create a server with the full CRM catalog registered.
    pub fn new(config: McpConfig, storage: Arc<dyn StorageClient>, crm: CrmConfig) -> Self {
        let mut tools = ToolRegistry::new();
        for tool in build_catalog() {
            tools.register(tool);
        }
        tracing::info!(tool_count = tools.len(), "registered tool catalog");

        Self {
            config,
            tools,
            toolbox: Arc::new(Toolbox::new(storage, crm)),
        }
    }

    /// Start the MCP server on the configured transport.
    pub async fn run(&self) -> Result<(), McpError> {
        match self.config.transport {
            Transport::Stdio => self.run_stdio().await,
            Transport::Http => self.run_http().await,
        }
    }

    /// Run the server with stdio transport: one JSON-RPC message per line.
    async fn run_stdio(&self) -> Result<(), McpError> {
        tracing::info!("starting MCP server with stdio transport");

        let stdin = std::io::stdin();
        let stdout = std::io::stdout();
        let mut stdout_lock = stdout.lock();

        for line in stdin.lock().lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<JsonRpcRequest>(&line) {
                Ok(request) => self.handle_request(request).await,
                Err(e) => JsonRpcResponse::error(None, -32700, format!("Parse error: {}", e)),
            };
            let response_json = serde_json::to_string(&response)?;

            writeln!(stdout_lock, "{}", response_json)?;
            stdout_lock.flush()?;
        }

        Ok(())
    }

    /// Run the server with HTTP transport.
    pub async fn run_http(&self) -> Result<(), McpError> {
        tracing::info!(
            host = %self.config.host,
            port = self.config.port,
            "starting MCP server with HTTP transport"
        );

        let (request_tx, mut request_rx) =
            mpsc::channel::<(JsonRpcRequest, mpsc::Sender<JsonRpcResponse>)>(100);

        let server = self.clone();
        tokio::spawn(async move {
            while let Some((request, response_tx)) = request_rx.recv().await {
                let response = server.handle_request(request).await;
                let _ = response_tx.send(response).await;
            }
        });

        let http_server = HttpServer::new(&self.config.host, self.config.port, request_tx);
        http_server.run().await
    }

    /// Handle a JSON-RPC request.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone();

        match request.method.as_str() {
            "initialize" => self.handle_initialize(id),
            "initialized" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => self.handle_list_tools(id),
            "tools/call" => self.handle_call_tool(id, request.params).await,
            "shutdown" => self.handle_shutdown(id),
            _ => JsonRpcResponse::error(
                id,
                -32601,
                format!("Method not found: {}", request.method),
            ),
        }
    }

    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        let result = json!({
            "protocolVersion": "2024-11-05",
            "serverInfo": {
                "name": "tether-mcp",
                "version": env!("CARGO_PKG_VERSION")
            },
            "capabilities": {
                "tools": {
                    "listChanged": false
                }
            }
        });
        JsonRpcResponse::success(id, result)
    }

    fn handle_list_tools(&self, id: Option<Value>) -> JsonRpcResponse {
        let tools: Vec<_> = self
            .tools
            .list()
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "inputSchema": t.input_schema,
                    "annotations": t.annotations
                })
            })
            .collect();

        JsonRpcResponse::success(id, json!({ "tools": tools }))
    }

    async fn handle_call_tool(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: CallToolParams = match params {
            Some(p) => match serde_json::from_value(p) {
                Ok(params) => params,
                Err(e) => {
                    return JsonRpcResponse::error(id, -32602, format!("Invalid params: {}", e));
                }
            },
            None => return JsonRpcResponse::error(id, -32602, "Missing params"),
        };

        let Some(tool) = self.tools.get(&params.name) else {
            return JsonRpcResponse::error(id, -32602, format!("Tool not found: {}", params.name));
        };

        match self.toolbox.execute(tool, &params.arguments).await {
            Ok(outcome) => JsonRpcResponse::success(id, outcome_to_response(outcome)),
            Err(err) => {
                tracing::warn!(tool = %params.name, error = %err, "tool call failed");
                let content = vec![ToolContent::Text {
                    text: err.to_string(),
                }];
                JsonRpcResponse::success(id, json!({ "content": content, "isError": true }))
            }
        }
    }

    fn handle_shutdown(&self, id: Option<Value>) -> JsonRpcResponse {
        tracing::info!("MCP server shutdown requested");
        JsonRpcResponse::success(id, json!(null))
    }
}

/// Render a successful tool outcome as MCP call-tool content.
fn outcome_to_response(outcome: ToolOutcome) -> Value {
    let mut content = vec![ToolContent::Text {
        text: outcome.summary,
    }];
    if let Some(result) = outcome.result {
        content.push(ToolContent::Json { json: result });
    }
    json!({ "content": content, "isError": false })
}
