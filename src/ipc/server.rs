//! JSON Lines server over stdin/stdout
//!
//! Requests are handled one at a time: each line is answered before the next
//! one is read.

use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::dispatch::{DispatchResponse, Dispatcher};
use crate::error::Result;
use crate::handlers::ToolDefinition;
use crate::ledger::OperationRecord;

use super::messages::{Methods, Request, Response, RpcError};

/// Default number of records returned by `history`
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Upper bound on `history` limit
pub const MAX_HISTORY_LIMIT: usize = 1000;

/// Name under which `history` is listed by `tools/list` and accepted by `tools/call`
pub const HISTORY_TOOL: &str = "get_automation_history";

fn history_tool_definition() -> ToolDefinition {
    ToolDefinition {
        name: HISTORY_TOOL.to_string(),
        description: "Recent tool calls from the history ledger, newest first. Reading history is not recorded."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "limit": {
                    "type": "integer",
                    "minimum": 0,
                    "maximum": MAX_HISTORY_LIMIT,
                    "description": "Number of records (default: 20)"
                },
                "tool": {"type": "string", "description": "Only records for this tool"}
            },
            "additionalProperties": false
        }),
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct HistoryParams {
    limit: Option<usize>,
    tool: Option<String>,
}

fn decode_params<T: for<'de> Deserialize<'de> + Default>(params: Value) -> std::result::Result<T, RpcError> {
    if params.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(params).map_err(|e| RpcError::invalid_params(e.to_string()))
}

/// History row with parameters and result decoded back into JSON
pub fn history_entry(record: &OperationRecord) -> Value {
    json!({
        "id": record.id,
        "timestamp": record.timestamp,
        "tool_name": record.tool_name,
        "parameters": record.parameters_value(),
        "result": record.result_value(),
        "success": record.success,
        "duration_ms": record.duration_ms,
    })
}

pub struct Server {
    dispatcher: Arc<Dispatcher>,
}

impl Server {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Serve stdin/stdout until stdin closes.
    pub async fn serve_stdio(&self) -> Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.serve(stdin, stdout).await
    }

    /// Answer each request line on `reader` with one response line on `writer`.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        log::info!("Serving {} tools over stdio", self.dispatcher.registry().len());

        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }

            let response = match std::str::from_utf8(&buf) {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => self.handle_line(line.trim()).await,
                Err(e) => {
                    log::warn!("Request line is not UTF-8: {}", e);
                    Response::error(0, RpcError::parse_error(format!("Parse error: {}", e)))
                }
            };
            let mut out = serde_json::to_string(&response)?;
            out.push('\n');
            writer.write_all(out.as_bytes()).await?;
            writer.flush().await?;
        }

        log::info!("Input closed, server stopping");
        Ok(())
    }

    /// Parse and answer one raw request line.
    pub async fn handle_line(&self, line: &str) -> Response {
        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("Unparseable request: {}", e);
                return Response::error(0, RpcError::parse_error(format!("Parse error: {}", e)));
            }
        };

        let id = value.get("id").and_then(Value::as_u64).unwrap_or(0);
        match serde_json::from_value::<Request>(value) {
            Ok(request) => self.handle(request).await,
            Err(e) => Response::error(id, RpcError::invalid_request(format!("Invalid request: {}", e))),
        }
    }

    /// Route a request to its method.
    pub async fn handle(&self, request: Request) -> Response {
        log::debug!("Request {} {}", request.id, request.method);
        let outcome = match request.method.as_str() {
            Methods::TOOLS_LIST => Ok(self.tools_list()),
            Methods::TOOLS_CALL => self.tools_call(request.params).await,
            Methods::HISTORY => self.history(request.params),
            other => Err(RpcError::method_not_found(other)),
        };

        match outcome {
            Ok(result) => Response::success(request.id, result),
            Err(error) => Response::error(request.id, error),
        }
    }

    fn serves_history_tool(&self) -> bool {
        !self.dispatcher.registry().contains(HISTORY_TOOL)
    }

    fn tools_list(&self) -> Value {
        let mut tools = self.dispatcher.registry().definitions();
        if self.serves_history_tool() {
            tools.push(history_tool_definition());
        }
        json!({ "tools": tools })
    }

    async fn tools_call(&self, params: Value) -> std::result::Result<Value, RpcError> {
        let params: CallParams = serde_json::from_value(params)
            .map_err(|e| RpcError::invalid_params(format!("tools/call: {}", e)))?;

        if params.name == HISTORY_TOOL && self.serves_history_tool() {
            let start = Instant::now();
            let result = self.history(params.arguments)?;
            let response = DispatchResponse {
                success: true,
                result,
                duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                record_id: None,
                ledger_error: None,
            };
            return serde_json::to_value(response).map_err(|e| RpcError::internal_error(e.to_string()));
        }

        let response = self.dispatcher.dispatch(&params.name, params.arguments).await?;
        serde_json::to_value(response).map_err(|e| RpcError::internal_error(e.to_string()))
    }

    fn history(&self, params: Value) -> std::result::Result<Value, RpcError> {
        let params: HistoryParams = decode_params(params)?;
        let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        if limit > MAX_HISTORY_LIMIT {
            return Err(RpcError::invalid_params(format!(
                "limit must be at most {}, got {}",
                MAX_HISTORY_LIMIT, limit
            )));
        }

        let ledger = self.dispatcher.ledger();
        let records = match &params.tool {
            Some(tool) => ledger.query_tool(tool, limit),
            None => ledger.query(limit),
        }
        .map_err(|e| RpcError::storage_failure(e.to_string()))?;

        Ok(json!({
            "count": records.len(),
            "records": records.iter().map(history_entry).collect::<Vec<_>>(),
        }))
    }
}
