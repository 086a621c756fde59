//! MCP surface (rmcp server over stdio).
//!
//! KubeServer lists the four kubectl tools with JSON input schemas and routes
//! `tools/call` to the `Dispatcher`.
//!
//!   unknown tool / bad arguments  -> JSON-RPC `invalid_params` error
//!   kubectl exit 0                -> CallToolResult::success(stdout)
//!   kubectl failure               -> CallToolResult::error(diagnostic), isError = true
//!
use std::sync::Arc;

use rmcp::ServerHandler;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, ErrorData as McpError, Implementation,
    JsonObject, ListToolsResult, PaginatedRequestParam, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::{RequestContext, RoleServer};
use serde_json::{Value, json};

use crate::kube::{CommandRunner, Dispatcher, KubectlRunner, ToolName, ToolResult};

const INSTRUCTIONS: &str = "Kubernetes access through kubectl.\n\
- kubectl_apply: apply a YAML manifest (mutates the cluster)\n\
- kubectl_get: list resources of a kind, or one resource by name\n\
- kubectl_describe: detailed view of one named resource\n\
- kubectl_delete: delete the resources in a YAML manifest (irreversible)\n\
Supported kinds: pod, deployment, service, node, namespace.";

/// MCP server handler wrapping a dispatcher.
pub struct KubeServer<R = KubectlRunner> {
    dispatcher: Arc<Dispatcher<R>>,
}

impl<R> Clone for KubeServer<R> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }
}

impl<R: CommandRunner> KubeServer<R> {
    pub fn new(dispatcher: Dispatcher<R>) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
        }
    }

    /// Route one tool call. Protocol-level rejections are returned as `Err`;
    /// kubectl failures are a successful response with `isError` set.
    pub async fn handle_call(&self, request: CallToolRequestParam) -> Result<CallToolResult, McpError> {
        let name: &str = &request.name;
        let result = self
            .dispatcher
            .call(name, request.arguments.as_ref())
            .await
            .map_err(|e| {
                tracing::warn!(tool = name, "rejected: {e}");
                McpError::invalid_params(e.to_string(), Some(json!({ "tool": name })))
            })?;
        Ok(to_call_result(result))
    }
}

fn to_call_result(result: ToolResult) -> CallToolResult {
    let content = vec![Content::text(result.text().to_string())];
    if result.is_success() {
        CallToolResult::success(content)
    } else {
        CallToolResult::error(content)
    }
}

/// Tool listing, in registry order.
pub fn tools() -> Vec<Tool> {
    ToolName::variants()
        .iter()
        .map(|t| Tool::new(t.as_str(), description(*t), input_schema(*t)))
        .collect()
}

fn description(tool: ToolName) -> &'static str {
    match tool {
        ToolName::Apply => "Apply a Kubernetes manifest from YAML content (kubectl apply -f)",
        ToolName::Get => "Get Kubernetes resources (kubectl get)",
        ToolName::Describe => "Describe a Kubernetes resource (kubectl describe)",
        ToolName::Delete => "Delete Kubernetes resources from YAML content (kubectl delete -f)",
    }
}

fn input_schema(tool: ToolName) -> Arc<JsonObject> {
    let kinds = "pod, deployment, service, node or namespace (plural and short forms accepted)";
    let manifest = if tool == ToolName::Apply {
        "YAML manifest content to apply"
    } else {
        "YAML manifest content identifying the resources to delete"
    };
    let schema = match tool {
        ToolName::Apply | ToolName::Delete => json!({
            "type": "object",
            "properties": {
                "yaml_content": {
                    "type": "string",
                    "description": manifest
                },
                "namespace": {
                    "type": "string",
                    "description": "Namespace override (optional)"
                }
            },
            "required": ["yaml_content"]
        }),
        ToolName::Get => json!({
            "type": "object",
            "properties": {
                "resource_type": {
                    "type": "string",
                    "description": format!("Type of resource to get: {kinds}")
                },
                "namespace": {
                    "type": "string",
                    "description": "Namespace to query (ignored for nodes and namespaces; defaults to the current namespace)"
                },
                "name": {
                    "type": "string",
                    "description": "Specific resource name (optional)"
                }
            },
            "required": ["resource_type"]
        }),
        ToolName::Describe => json!({
            "type": "object",
            "properties": {
                "resource_type": {
                    "type": "string",
                    "description": format!("Type of resource to describe: {kinds}")
                },
                "name": {
                    "type": "string",
                    "description": "Name of the resource to describe"
                },
                "namespace": {
                    "type": "string",
                    "description": "Namespace of the resource (ignored for nodes and namespaces)"
                }
            },
            "required": ["resource_type", "name"]
        }),
    };
    Arc::new(match schema {
        Value::Object(map) => map,
        _ => JsonObject::new(),
    })
}

impl<R: CommandRunner> ServerHandler for KubeServer<R> {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(INSTRUCTIONS.to_string()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Implementation::default()
            },
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult::with_all_items(tools()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        self.handle_call(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KubectlCommand, Settings};
    use crate::kube::testing::{RecordingRunner, exit};
    use rmcp::model::ErrorCode;
    use std::path::PathBuf;

    fn server(runner: RecordingRunner) -> KubeServer<RecordingRunner> {
        let settings = Arc::new(Settings {
            kubectl: KubectlCommand::default(),
            kubeconfig: PathBuf::from("/kc"),
            context: None,
            timeout: None,
        });
        KubeServer::new(Dispatcher::new(settings, runner))
    }

    fn call(name: &'static str, args: Value) -> CallToolRequestParam {
        CallToolRequestParam {
            name: name.into(),
            arguments: args.as_object().cloned(),
        }
    }

    fn as_json(result: &CallToolResult) -> Value {
        serde_json::to_value(result).unwrap()
    }

    #[test]
    fn lists_exactly_four_tools() {
        let names: Vec<String> = tools().iter().map(|t| t.name.to_string()).collect();
        assert_eq!(
            names,
            vec!["kubectl_apply", "kubectl_get", "kubectl_describe", "kubectl_delete"]
        );
    }

    #[test]
    fn schemas_declare_required_fields() {
        let all = tools();
        let required = |i: usize| all[i].input_schema.get("required").cloned().unwrap();
        assert_eq!(required(0), json!(["yaml_content"]));
        assert_eq!(required(1), json!(["resource_type"]));
        assert_eq!(required(2), json!(["resource_type", "name"]));
        assert_eq!(required(3), json!(["yaml_content"]));
    }

    #[test]
    fn info_enables_tools() {
        let info = server(RecordingRunner::ok("")).get_info();
        assert!(info.capabilities.tools.is_some());
        assert!(info.instructions.unwrap().contains("kubectl_apply"));
        assert_eq!(info.server_info.name, "kube-mcp");
    }

    #[tokio::test]
    async fn success_carries_stdout() {
        let s = server(RecordingRunner::ok("deployment.apps/web created\n"));
        let res = s
            .handle_call(call("kubectl_apply", json!({"yaml_content": "kind: Deployment\n"})))
            .await
            .unwrap();
        let v = as_json(&res);
        assert_eq!(v["content"][0]["text"], json!("deployment.apps/web created\n"));
        assert_ne!(v["isError"], json!(true));
    }

    #[tokio::test]
    async fn kubectl_failure_is_error_result() {
        let runner = RecordingRunner::new(|_| {
            Ok(exit(1, "", "error: the server doesn't have a resource type \"pods\"\n"))
        });
        let res = server(runner)
            .handle_call(call("kubectl_get", json!({"resource_type": "pods"})))
            .await
            .unwrap();
        let v = as_json(&res);
        assert_eq!(v["isError"], json!(true));
        assert!(v["content"][0]["text"].as_str().unwrap().contains("doesn't have a resource type"));
    }

    #[tokio::test]
    async fn unknown_tool_is_invalid_params() {
        let runner = RecordingRunner::ok("");
        let err = server(runner.clone())
            .handle_call(call("kubectl_logs", json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
        assert!(err.message.contains("unknown tool: kubectl_logs"));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_arguments_object_is_invalid_params() {
        let err = server(RecordingRunner::ok(""))
            .handle_call(CallToolRequestParam {
                name: "kubectl_describe".into(),
                arguments: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
        assert!(err.message.contains("resource_type"));
    }
}
