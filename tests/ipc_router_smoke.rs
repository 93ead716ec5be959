use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_assessmapd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn assessmapd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn send_line(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    line: &str,
) -> serde_json::Value {
    writeln!(stdin, "{}", line).expect("write request");
    stdin.flush().expect("flush request");
    let mut out = String::new();
    reader.read_line(&mut out).expect("read response line");
    serde_json::from_str(out.trim()).expect("parse response json")
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({ "id": id, "method": method, "params": params });
    let value = send_line(stdin, reader, &payload.to_string());
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

fn error_code(value: &serde_json::Value) -> &str {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("assessmap-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["ok"], json!(true));
    assert!(health["result"]["workspacePath"].is_null());

    // Every data method needs a workspace first.
    let early = request(
        &mut stdin,
        &mut reader,
        "2",
        "vis.data",
        json!({ "courseIds": [] }),
    );
    assert_eq!(error_code(&early), "no_workspace");

    let selected = request(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(selected["ok"], json!(true));
    assert!(workspace.join("assessmap.sqlite3").exists());

    for (id, method, params) in [
        ("4", "setup.get", json!({})),
        ("5", "vis.init", json!({ "userId": 7 })),
        ("6", "vis.data", json!({ "courseIds": [] })),
        ("7", "vis.courses", json!({ "allCourses": [], "selected": [] })),
        ("8", "vis.search", json!({ "query": "" })),
        ("9", "vis.chart", json!({ "courseIds": [] })),
    ] {
        let resp = request(&mut stdin, &mut reader, id, method, params);
        assert_eq!(resp["ok"], json!(true), "{} failed: {}", method, resp);
    }

    let unknown = send_line(
        &mut stdin,
        &mut reader,
        &json!({ "id": "10", "method": "vis.nope", "params": {} }).to_string(),
    );
    assert_eq!(error_code(&unknown), "not_implemented");

    let bad = send_line(&mut stdin, &mut reader, "{not json");
    assert_eq!(bad["ok"], json!(false));
    assert_eq!(error_code(&bad), "bad_json");

    // The daemon keeps serving after a bad line.
    let again = request(&mut stdin, &mut reader, "11", "health", json!({}));
    let expected = workspace.to_string_lossy().to_string();
    assert_eq!(
        again["result"]["workspacePath"].as_str(),
        Some(expected.as_str())
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn malformed_params_are_rejected() {
    let workspace = temp_dir("assessmap-router-params");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let missing = request(&mut stdin, &mut reader, "2", "vis.data", json!({}));
    assert_eq!(error_code(&missing), "bad_params");

    let not_ints = request(
        &mut stdin,
        &mut reader,
        "3",
        "vis.data",
        json!({ "courseIds": ["abc"] }),
    );
    assert_eq!(error_code(&not_ints), "bad_params");

    let no_user = request(&mut stdin, &mut reader, "4", "vis.init", json!({}));
    assert_eq!(error_code(&no_user), "bad_params");

    let no_path = request(&mut stdin, &mut reader, "5", "workspace.select", json!({}));
    assert_eq!(error_code(&no_path), "bad_params");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
