//! Dispatcher: typed request -> kubectl invocation -> result.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};

use super::request::{ResourceKind, ToolRequest};
use super::runner::{CommandOutput, CommandRunner, Invocation, KubectlRunner, RunError};
use super::DispatchError;
use crate::config::Settings;

/// Outcome of one tool call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ToolResult {
    Success {
        /// kubectl stdout, unchanged.
        payload: String,
        /// stderr text kept when stdout was empty ("No resources found ...").
        notice: Option<String>,
    },
    Failure {
        detail: String,
        exit_code: Option<i32>,
    },
}

impl ToolResult {
    pub fn from_output(program: &str, out: CommandOutput) -> Self {
        if out.success() {
            let notice = if out.stdout.is_empty() {
                Some(out.stderr.trim().to_string()).filter(|s| !s.is_empty())
            } else {
                None
            };
            return ToolResult::Success {
                payload: out.stdout,
                notice,
            };
        }

        let detail = if !out.stderr.trim().is_empty() {
            out.stderr
        } else if !out.stdout.trim().is_empty() {
            out.stdout
        } else {
            match out.exit_code {
                Some(code) => format!("{program} exited with status {code}"),
                None => format!("{program} was terminated by a signal"),
            }
        };
        ToolResult::Failure {
            detail,
            exit_code: out.exit_code,
        }
    }

    pub fn from_run_error(err: &RunError) -> Self {
        ToolResult::Failure {
            detail: err.to_string(),
            exit_code: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolResult::Success { .. })
    }

    /// Text shown to the caller.
    pub fn text(&self) -> &str {
        match self {
            ToolResult::Success { payload, notice } => {
                if !payload.is_empty() {
                    payload.as_str()
                } else {
                    notice.as_deref().unwrap_or("(no output)")
                }
            }
            ToolResult::Failure { detail, .. } => detail.as_str(),
        }
    }
}

/// Build the exact kubectl invocation for a request.
pub fn build_invocation(settings: &Settings, request: &ToolRequest) -> Invocation {
    let mut args = settings.global_args();
    let mut stdin = None;

    match request {
        ToolRequest::Apply(m) | ToolRequest::Delete(m) => {
            let verb = if matches!(request, ToolRequest::Apply(_)) {
                "apply"
            } else {
                "delete"
            };
            args.extend([verb, "-f", "-"].map(String::from));
            push_namespace(&mut args, m.namespace.as_deref());
            stdin = Some(m.yaml_content.clone());
        }
        ToolRequest::Get(g) => {
            args.push("get".to_string());
            args.push(g.kind.kubectl_name().to_string());
            push_scoped_namespace(&mut args, g.kind, g.namespace.as_deref());
            push_positional(&mut args, g.name.as_deref());
        }
        ToolRequest::Describe(d) => {
            args.push("describe".to_string());
            args.push(d.kind.kubectl_name().to_string());
            push_scoped_namespace(&mut args, d.kind, d.namespace.as_deref());
            push_positional(&mut args, Some(&d.name));
        }
    }

    Invocation {
        program: settings.kubectl.program.clone(),
        args,
        stdin,
    }
}

fn push_namespace(args: &mut Vec<String>, namespace: Option<&str>) {
    if let Some(ns) = namespace {
        args.push(format!("--namespace={ns}"));
    }
}

/// Resource names go after `--` so kubectl never parses them as flags.
fn push_positional(args: &mut Vec<String>, name: Option<&str>) {
    if let Some(name) = name {
        args.push("--".to_string());
        args.push(name.to_string());
    }
}

fn push_scoped_namespace(args: &mut Vec<String>, kind: ResourceKind, namespace: Option<&str>) {
    if kind.is_namespaced() {
        push_namespace(args, namespace);
    } else if let Some(ns) = namespace {
        tracing::debug!("ignoring namespace '{ns}' for cluster-scoped {kind}");
    }
}

/// Routes tool calls to kubectl. Holds only read-only state.
pub struct Dispatcher<R = KubectlRunner> {
    settings: Arc<Settings>,
    runner: R,
}

impl Dispatcher<KubectlRunner> {
    /// Dispatcher backed by real kubectl processes, honouring the configured timeout.
    pub fn from_settings(settings: Arc<Settings>) -> Self {
        let runner = KubectlRunner::new(settings.timeout);
        Self::new(settings, runner)
    }
}

impl<R: CommandRunner> Dispatcher<R> {
    pub fn new(settings: Arc<Settings>, runner: R) -> Self {
        Self { settings, runner }
    }

    /// Parse a wire call and run it. Rejections never reach the runner.
    pub async fn call(
        &self,
        name: &str,
        arguments: Option<&Map<String, Value>>,
    ) -> Result<ToolResult, DispatchError> {
        let request = ToolRequest::from_call(name, arguments)?;
        Ok(self.dispatch(&request).await)
    }

    pub async fn dispatch(&self, request: &ToolRequest) -> ToolResult {
        let invocation = build_invocation(&self.settings, request);
        let tool = request.tool();
        if tool.is_mutating() {
            tracing::info!(%tool, "running: {invocation}");
        } else {
            tracing::debug!(%tool, "running: {invocation}");
        }

        let started = Instant::now();
        let result = match self.runner.run(&invocation).await {
            Ok(out) => ToolResult::from_output(&invocation.program, out),
            Err(e) => {
                tracing::error!(%tool, "{e}");
                ToolResult::from_run_error(&e)
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            ToolResult::Success { .. } => tracing::debug!(%tool, elapsed_ms, "ok"),
            ToolResult::Failure { exit_code, .. } => {
                tracing::warn!(%tool, elapsed_ms, exit_code = ?exit_code, "kubectl failed")
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KubectlCommand;
    use crate::kube::testing::{RecordingRunner, exit};
    use crate::kube::ToolName;
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const MANIFEST: &str = "apiVersion: v1\nkind: Pod\nmetadata:\n  name: web\n";

    fn settings() -> Arc<Settings> {
        Arc::new(Settings {
            kubectl: KubectlCommand::default(),
            kubeconfig: PathBuf::from("/home/me/.kube/config"),
            context: None,
            timeout: None,
        })
    }

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    fn argv(inv: &Invocation) -> Vec<&str> {
        inv.args.iter().map(String::as_str).collect()
    }

    #[tokio::test]
    async fn each_tool_maps_to_one_invocation_shape() {
        let cases = [
            (
                ToolName::Apply,
                json!({"yaml_content": MANIFEST, "namespace": "dev"}),
                vec!["--kubeconfig", "/home/me/.kube/config", "apply", "-f", "-", "--namespace=dev"],
                Some(MANIFEST),
            ),
            (
                ToolName::Get,
                json!({"resource_type": "pod", "namespace": "default"}),
                vec!["--kubeconfig", "/home/me/.kube/config", "get", "pods", "--namespace=default"],
                None,
            ),
            (
                ToolName::Describe,
                json!({"resource_type": "svc", "name": "api"}),
                vec!["--kubeconfig", "/home/me/.kube/config", "describe", "services", "--", "api"],
                None,
            ),
            (
                ToolName::Delete,
                json!({"yaml_content": MANIFEST}),
                vec!["--kubeconfig", "/home/me/.kube/config", "delete", "-f", "-"],
                Some(MANIFEST),
            ),
        ];

        for (tool, raw, expected_args, expected_stdin) in cases {
            let runner = RecordingRunner::ok("done\n");
            let d = Dispatcher::new(settings(), runner.clone());
            let res = d.call(tool.as_str(), Some(&args(raw))).await.unwrap();
            assert!(res.is_success(), "{tool}");

            let calls = runner.calls();
            assert_eq!(calls.len(), 1, "{tool}");
            assert_eq!(calls[0].program, "kubectl");
            assert_eq!(argv(&calls[0]), expected_args, "{tool}");
            assert_eq!(calls[0].stdin.as_deref(), expected_stdin, "{tool}");
        }
    }

    #[tokio::test]
    async fn unknown_tool_spawns_nothing() {
        let runner = RecordingRunner::ok("");
        let d = Dispatcher::new(settings(), runner.clone());
        let err = d.call("kubectl_exec", None).await.unwrap_err();
        assert!(matches!(err, DispatchError::UnknownTool(_)));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn invalid_argument_spawns_nothing() {
        let runner = RecordingRunner::ok("");
        let d = Dispatcher::new(settings(), runner.clone());
        let err = d
            .call("kubectl_apply", Some(&args(json!({"namespace": "dev"}))))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidArgument { .. }));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn flag_like_names_spawn_nothing() {
        let runner = RecordingRunner::ok("");
        let d = Dispatcher::new(settings(), runner.clone());
        for (tool, name) in [
            ("kubectl_get", "--kubeconfig=/attacker/kc"),
            ("kubectl_get", "--as=system:admin"),
            ("kubectl_describe", "--kubeconfig=/attacker/kc"),
            ("kubectl_describe", "--as=system:admin"),
        ] {
            let err = d
                .call(tool, Some(&args(json!({"resource_type": "pod", "name": name}))))
                .await
                .unwrap_err();
            assert!(
                matches!(err, DispatchError::InvalidArgument { param: "name", .. }),
                "{tool} {name}"
            );
        }
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn names_follow_end_of_options_marker() {
        let req = ToolRequest::from_call(
            "kubectl_get",
            Some(&args(json!({"resource_type": "pod", "name": "web-0", "namespace": "dev"}))),
        )
        .unwrap();
        let inv = build_invocation(&settings(), &req);
        assert_eq!(
            argv(&inv),
            vec!["--kubeconfig", "/home/me/.kube/config", "get", "pods", "--namespace=dev", "--", "web-0"]
        );
    }

    #[tokio::test]
    async fn empty_listing_is_success_with_notice() {
        let runner = RecordingRunner::new(|_| {
            Ok(exit(0, "", "No resources found in default namespace.\n"))
        });
        let d = Dispatcher::new(settings(), runner);
        let res = d
            .call(
                "kubectl_get",
                Some(&args(json!({"resource_type": "pod", "namespace": "default"}))),
            )
            .await
            .unwrap();
        assert_eq!(
            res,
            ToolResult::Success {
                payload: String::new(),
                notice: Some("No resources found in default namespace.".to_string()),
            }
        );
        assert_eq!(res.text(), "No resources found in default namespace.");
    }

    #[tokio::test]
    async fn apply_success_returns_stdout_unchanged() {
        let stdout = "pod/web created\n";
        let d = Dispatcher::new(settings(), RecordingRunner::ok(stdout));
        let res = d
            .call("kubectl_apply", Some(&args(json!({"yaml_content": MANIFEST}))))
            .await
            .unwrap();
        assert_eq!(res.text(), stdout);
    }

    #[tokio::test]
    async fn malformed_manifest_surfaces_kubectl_stderr() {
        let stderr = "error: error parsing STDIN: error converting YAML to JSON: yaml: line 2: mapping values are not allowed in this context\n";
        let runner = RecordingRunner::new(move |_| Ok(exit(1, "", stderr)));
        let d = Dispatcher::new(settings(), runner.clone());
        let res = d
            .call("kubectl_apply", Some(&args(json!({"yaml_content": "kind: : :\n  bad"}))))
            .await
            .unwrap();
        assert_eq!(
            res,
            ToolResult::Failure {
                detail: stderr.to_string(),
                exit_code: Some(1),
            }
        );
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn describe_missing_resource_fails() {
        let stderr = "Error from server (NotFound): pods \"does-not-exist\" not found\n";
        let runner = RecordingRunner::new(move |_| Ok(exit(1, "", stderr)));
        let d = Dispatcher::new(settings(), runner);
        let res = d
            .call(
                "kubectl_describe",
                Some(&args(json!({"resource_type": "pod", "name": "does-not-exist"}))),
            )
            .await
            .unwrap();
        assert!(!res.is_success());
        assert_eq!(res.text(), stderr);
    }

    #[tokio::test]
    async fn second_delete_fails() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let runner = RecordingRunner::new(move |_| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(exit(0, "pod \"web\" deleted\n", ""))
            } else {
                Ok(exit(1, "", "Error from server (NotFound): pods \"web\" not found\n"))
            }
        });
        let d = Dispatcher::new(settings(), runner);
        let call = args(json!({"yaml_content": MANIFEST}));

        assert!(d.call("kubectl_delete", Some(&call)).await.unwrap().is_success());
        let second = d.call("kubectl_delete", Some(&call)).await.unwrap();
        assert!(!second.is_success());
        assert!(second.text().contains("NotFound"));
    }

    #[tokio::test]
    async fn repeated_reads_are_identical() {
        let runner = RecordingRunner::ok("NAME   READY\nweb    1/1\n");
        let d = Dispatcher::new(settings(), runner.clone());
        let call = args(json!({"resource_type": "deployment", "name": "web", "namespace": "dev"}));
        let first = d.call("kubectl_describe", Some(&call)).await.unwrap();
        let second = d.call("kubectl_describe", Some(&call)).await.unwrap();
        assert_eq!(first, second);
        let calls = runner.calls();
        assert_eq!(calls[0], calls[1]);
    }

    #[tokio::test]
    async fn spawn_error_becomes_failure() {
        let runner = RecordingRunner::new(|inv| {
            Err(RunError::Spawn {
                program: inv.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory"),
            })
        });
        let d = Dispatcher::new(settings(), runner);
        let res = d
            .call("kubectl_get", Some(&args(json!({"resource_type": "nodes"}))))
            .await
            .unwrap();
        assert_eq!(
            res,
            ToolResult::Failure {
                detail: "failed to start 'kubectl': No such file or directory".to_string(),
                exit_code: None,
            }
        );
    }

    #[test]
    fn failure_falls_back_to_stdout_then_status() {
        let res = ToolResult::from_output("kubectl", exit(2, "boom on stdout", "  \n"));
        assert_eq!(res.text(), "boom on stdout");

        let res = ToolResult::from_output("kubectl", exit(2, "", ""));
        assert_eq!(res.text(), "kubectl exited with status 2");

        let res = ToolResult::from_output(
            "kubectl",
            CommandOutput {
                exit_code: None,
                ..Default::default()
            },
        );
        assert_eq!(res.text(), "kubectl was terminated by a signal");
    }

    #[test]
    fn cluster_scoped_kinds_drop_namespace_and_context_is_passed() {
        let s = Settings {
            kubectl: KubectlCommand::parse("minikube kubectl --").unwrap(),
            kubeconfig: PathBuf::from("/kc"),
            context: Some("minikube".to_string()),
            timeout: None,
        };
        let req = ToolRequest::from_call(
            "kubectl_get",
            Some(&args(json!({"resource_type": "ns", "namespace": "kube-system", "name": "default"}))),
        )
        .unwrap();
        let inv = build_invocation(&s, &req);
        assert_eq!(inv.program, "minikube");
        assert_eq!(
            argv(&inv),
            vec!["kubectl", "--", "--kubeconfig", "/kc", "--context", "minikube", "get", "namespaces", "--", "default"]
        );
    }
}
