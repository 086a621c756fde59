/*!
Tool vocabulary: which tools exist, which resource kinds they accept, and
how wire arguments become a typed `ToolRequest`.

Tools:
  kubectl_apply    { yaml_content, namespace? }
  kubectl_get      { resource_type, namespace?, name? }
  kubectl_describe { resource_type, name, namespace? }
  kubectl_delete   { yaml_content, namespace? }

Helpers:
  - ToolName::variants() / from_wire()
  - ResourceKind::from_str_ci() / kubectl_name() / is_namespaced()
  - ToolRequest::from_call()
*/

use std::fmt;

use serde_json::{Map, Value};

use super::DispatchError;

/// The four registered tools, by wire name.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ToolName {
    Apply,
    Get,
    Describe,
    Delete,
}

impl ToolName {
    /// All tools in listing order.
    pub const fn variants() -> &'static [ToolName] {
        &[
            ToolName::Apply,
            ToolName::Get,
            ToolName::Describe,
            ToolName::Delete,
        ]
    }

    /// Exact (case-sensitive) wire name lookup.
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "kubectl_apply" => Some(ToolName::Apply),
            "kubectl_get" => Some(ToolName::Get),
            "kubectl_describe" => Some(ToolName::Describe),
            "kubectl_delete" => Some(ToolName::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::Apply => "kubectl_apply",
            ToolName::Get => "kubectl_get",
            ToolName::Describe => "kubectl_describe",
            ToolName::Delete => "kubectl_delete",
        }
    }

    /// Mutating tools change cluster state.
    pub fn is_mutating(&self) -> bool {
        matches!(self, ToolName::Apply | ToolName::Delete)
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource kinds accepted by `kubectl_get` / `kubectl_describe`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ResourceKind {
    Pod,
    Deployment,
    Service,
    Node,
    Namespace,
}

impl ResourceKind {
    /// Case-insensitive parse accepting singular, plural and kubectl short names.
    pub fn from_str_ci(s: &str) -> Option<Self> {
        let norm = s.trim().to_ascii_lowercase();
        match norm.as_str() {
            "pod" | "pods" | "po" => Some(ResourceKind::Pod),
            "deployment" | "deployments" | "deploy" => Some(ResourceKind::Deployment),
            "service" | "services" | "svc" => Some(ResourceKind::Service),
            "node" | "nodes" | "no" => Some(ResourceKind::Node),
            "namespace" | "namespaces" | "ns" => Some(ResourceKind::Namespace),
            _ => None,
        }
    }

    /// Canonical resource name passed to kubectl.
    pub fn kubectl_name(&self) -> &'static str {
        match self {
            ResourceKind::Pod => "pods",
            ResourceKind::Deployment => "deployments",
            ResourceKind::Service => "services",
            ResourceKind::Node => "nodes",
            ResourceKind::Namespace => "namespaces",
        }
    }

    /// Nodes and namespaces are cluster-scoped; `-n` is never passed for them.
    pub fn is_namespaced(&self) -> bool {
        !matches!(self, ResourceKind::Node | ResourceKind::Namespace)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Pod => "pod",
            ResourceKind::Deployment => "deployment",
            ResourceKind::Service => "service",
            ResourceKind::Node => "node",
            ResourceKind::Namespace => "namespace",
        };
        f.write_str(s)
    }
}

/// Arguments shared by apply and delete.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ManifestArgs {
    pub yaml_content: String,
    pub namespace: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GetArgs {
    pub kind: ResourceKind,
    pub name: Option<String>,
    pub namespace: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DescribeArgs {
    pub kind: ResourceKind,
    pub name: String,
    pub namespace: Option<String>,
}

/// A validated tool call. Constructing one through this type means the tool
/// is known and its required arguments are present.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ToolRequest {
    Apply(ManifestArgs),
    Get(GetArgs),
    Describe(DescribeArgs),
    Delete(ManifestArgs),
}

impl ToolRequest {
    /// Parse a raw tool call as it arrives off the wire.
    pub fn from_call(name: &str, arguments: Option<&Map<String, Value>>) -> Result<Self, DispatchError> {
        let tool = ToolName::from_wire(name)
            .ok_or_else(|| DispatchError::UnknownTool(name.to_string()))?;
        let empty = Map::new();
        let args = arguments.unwrap_or(&empty);

        let request = match tool {
            ToolName::Apply => ToolRequest::Apply(manifest_args(args)?),
            ToolName::Delete => ToolRequest::Delete(manifest_args(args)?),
            ToolName::Get => ToolRequest::Get(GetArgs {
                kind: resource_kind(args)?,
                name: optional_ident(args, "name")?,
                namespace: optional_ident(args, "namespace")?,
            }),
            ToolName::Describe => ToolRequest::Describe(DescribeArgs {
                kind: resource_kind(args)?,
                name: required_ident(args, "name")?,
                namespace: optional_ident(args, "namespace")?,
            }),
        };
        Ok(request)
    }

    pub fn tool(&self) -> ToolName {
        match self {
            ToolRequest::Apply(_) => ToolName::Apply,
            ToolRequest::Get(_) => ToolName::Get,
            ToolRequest::Describe(_) => ToolName::Describe,
            ToolRequest::Delete(_) => ToolName::Delete,
        }
    }
}

fn manifest_args(args: &Map<String, Value>) -> Result<ManifestArgs, DispatchError> {
    Ok(ManifestArgs {
        yaml_content: required("yaml_content", raw_str(args, "yaml_content")?)?,
        namespace: optional_ident(args, "namespace")?,
    })
}

fn resource_kind(args: &Map<String, Value>) -> Result<ResourceKind, DispatchError> {
    let raw = required_ident(args, "resource_type")?;
    ResourceKind::from_str_ci(&raw).ok_or_else(|| DispatchError::InvalidArgument {
        param: "resource_type",
        reason: format!("unsupported resource type: {raw}"),
    })
}

fn required(key: &'static str, value: Option<String>) -> Result<String, DispatchError> {
    value.ok_or_else(|| DispatchError::InvalidArgument {
        param: key,
        reason: format!("{key} is required"),
    })
}

fn required_ident(args: &Map<String, Value>, key: &'static str) -> Result<String, DispatchError> {
    required(key, optional_ident(args, key)?)
}

/// Identifier parameter (name, namespace, kind): trimmed, blank counts as absent.
///
/// Values starting with `-` are rejected so they can never be read by
/// kubectl as a flag (`--kubeconfig=...`, `--as=...`).
fn optional_ident(args: &Map<String, Value>, key: &'static str) -> Result<Option<String>, DispatchError> {
    let Some(raw) = raw_str(args, key)? else {
        return Ok(None);
    };
    let ident = raw.trim();
    if ident.starts_with('-') {
        return Err(DispatchError::InvalidArgument {
            param: key,
            reason: format!("{key} must not start with '-': {ident}"),
        });
    }
    Ok(Some(ident.to_string()))
}

/// String parameter exactly as sent. Missing, null and blank values are absent.
fn raw_str(args: &Map<String, Value>, key: &'static str) -> Result<Option<String>, DispatchError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(DispatchError::InvalidArgument {
            param: key,
            reason: format!("{key} must be a string, got {}", json_type(other)),
        }),
    }
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/* --------------------------------- Tests ---------------------------------- */
