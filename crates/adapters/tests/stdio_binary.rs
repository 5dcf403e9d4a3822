use anyhow::Context as _;
use serde_json::{Value, json};
use std::io::{BufRead as _, BufReader, Write as _};
use std::process::{ChildStdin, Command, Stdio};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use toolbridge_test_support::KillOnDrop;

const JIRA_BIN: &str = env!("CARGO_BIN_EXE_toolbridge-jira");

struct StdioSession {
    child: KillOnDrop,
    stdin: ChildStdin,
    lines: mpsc::Receiver<String>,
}

impl StdioSession {
    fn spawn() -> anyhow::Result<Self> {
        let mut child = Command::new(JIRA_BIN)
            .env("JIRA_BASE_URL", "http://127.0.0.1:9")
            .env("JIRA_EMAIL", "me@example.com")
            .env("JIRA_API_TOKEN", "tok")
            .env_remove("RUST_LOG")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .context("spawn toolbridge-jira")?;
        let stdin = child.stdin.take().context("child stdin")?;
        let stdout = child.stdout.take().context("child stdout")?;

        let (tx, lines) = mpsc::channel();
        std::thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            child: KillOnDrop(child),
            stdin,
            lines,
        })
    }

    fn send(&mut self, msg: &Value) -> anyhow::Result<()> {
        writeln!(self.stdin, "{msg}")?;
        self.stdin.flush()?;
        Ok(())
    }

    /// Send a request and wait for the response with the same id.
    fn request(&mut self, id: u64, method: &str, params: Value) -> anyhow::Result<Value> {
        self.send(&json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}))?;
        loop {
            let line = self
                .lines
                .recv_timeout(Duration::from_secs(10))
                .with_context(|| format!("no response to {method}"))?;
            let msg: Value = serde_json::from_str(&line).context("response is JSON")?;
            if msg.get("id") == Some(&json!(id)) {
                return Ok(msg);
            }
        }
    }

    fn initialize(&mut self) -> anyhow::Result<Value> {
        let resp = self.request(
            1,
            "initialize",
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "stdio-test", "version": "0.0.0"}
            }),
        )?;
        self.send(&json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))?;
        Ok(resp)
    }
}

#[test]
fn initialize_and_list_tools() -> anyhow::Result<()> {
    let mut s = StdioSession::spawn()?;

    let init = s.initialize()?;
    assert_eq!(init["result"]["serverInfo"]["name"], "toolbridge-jira");
    assert!(init["result"]["capabilities"]["tools"].is_object());

    let list = s.request(2, "tools/list", json!({}))?;
    let tools = list["result"]["tools"].as_array().context("tools array")?;
    let names: Vec<&str> = tools.iter().filter_map(|t| t["name"].as_str()).collect();
    assert!(names.contains(&"search_issues"));
    assert!(names.contains(&"create_issue"));

    let create = tools
        .iter()
        .find(|t| t["name"] == "create_issue")
        .context("create_issue")?;
    assert_eq!(create["inputSchema"]["type"], "object");
    assert!(
        create["inputSchema"]["required"]
            .as_array()
            .is_some_and(|r| r.contains(&json!("project_key")))
    );
    assert_eq!(create["annotations"]["readOnlyHint"], false);
    Ok(())
}

#[test]
fn protocol_errors_for_unknown_tool_and_bad_arguments() -> anyhow::Result<()> {
    let mut s = StdioSession::spawn()?;
    s.initialize()?;

    let resp = s.request(2, "tools/call", json!({"name": "delete_everything", "arguments": {}}))?;
    assert_eq!(resp["error"]["code"], -32601);

    let resp = s.request(3, "tools/call", json!({"name": "get_issue", "arguments": {}}))?;
    assert_eq!(resp["error"]["code"], -32602);
    Ok(())
}

#[test]
fn upstream_failure_is_an_error_result_not_a_crash() -> anyhow::Result<()> {
    let mut s = StdioSession::spawn()?;
    s.initialize()?;

    // Port 9 (discard) is not listening, so this is a transport failure.
    let resp = s.request(2, "tools/call", json!({"name": "get_myself", "arguments": {}}))?;
    assert_eq!(resp["result"]["isError"], true);
    let text = resp["result"]["content"][0]["text"].as_str().context("text block")?;
    let envelope: Value = serde_json::from_str(text)?;
    assert_eq!(envelope["success"], false);
    assert!(envelope["error"].as_str().is_some_and(|e| e.starts_with("HTTP transport error")));

    // The process is still serving.
    let list = s.request(3, "tools/list", json!({}))?;
    assert!(list["result"]["tools"].is_array());
    Ok(())
}

#[test]
fn missing_credentials_fail_before_serving() -> anyhow::Result<()> {
    let output = Command::new(JIRA_BIN)
        .env_remove("JIRA_BASE_URL")
        .env_remove("JIRA_EMAIL")
        .env_remove("JIRA_API_TOKEN")
        .stdin(Stdio::null())
        .output()
        .context("run toolbridge-jira")?;
    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("--jira-base-url"));
    Ok(())
}

#[cfg(unix)]
#[test]
fn sigterm_stops_the_adapter_with_exit_code_zero() -> anyhow::Result<()> {
    let mut s = StdioSession::spawn()?;
    s.initialize()?;

    // stdin stays open, so only the signal can end the process.
    let pid = s.child.0.id().to_string();
    let kill = Command::new("kill").args(["-TERM", &pid]).status()?;
    assert!(kill.success());

    let deadline = Instant::now() + Duration::from_secs(10);
    let status = loop {
        if let Some(status) = s.child.0.try_wait()? {
            break status;
        }
        anyhow::ensure!(Instant::now() < deadline, "adapter still running after SIGTERM");
        std::thread::sleep(Duration::from_millis(50));
    };
    assert_eq!(status.code(), Some(0));
    Ok(())
}
