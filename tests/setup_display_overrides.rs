use rusqlite::Connection;
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

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(value["ok"], json!(true), "{} failed: {}", method, value);
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

#[test]
fn defaults_are_reported_per_section() {
    let workspace = temp_dir("assessmap-setup-defaults");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let setup = request_ok(&mut stdin, &mut reader, "2", "setup.get", json!({}));
    assert_eq!(setup["display"]["courseNameMaxChars"], json!(17));
    assert_eq!(setup["display"]["ellipsis"], json!("..."));
    assert_eq!(
        setup["display"]["noCoursesMessage"],
        json!("There are no courses to display, select some")
    );
    assert_eq!(setup["selection"]["initialCourseLimit"], json!(10));
    assert_eq!(setup["selection"]["searchLimit"], json!(15));
    assert_eq!(setup["chart"]["width"].as_f64(), Some(900.0));
    assert_eq!(setup["chart"]["xTicks"], json!(10));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn display_overrides_flow_into_collected_data() {
    let workspace = temp_dir("assessmap-setup-display");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let conn = Connection::open(workspace.join("assessmap.sqlite3")).expect("open db");
    conn.execute_batch(
        "INSERT INTO courses(id, fullname, shortname) VALUES(1, 'Introduction to Biology', 'BIO');
         INSERT INTO grade_categories(id, courseid, parent, aggregation) VALUES(10, 1, NULL, 10);
         INSERT INTO grade_items(id, courseid, itemtype, iteminstance) VALUES(100, 1, 'course', 10);
         INSERT INTO course_modules(id, course, modname, instance, name) VALUES(5, 1, 'assign', 5, 'Essay');
         INSERT INTO assign(id, duedate) VALUES(5, 1000);
         INSERT INTO grade_items(id, courseid, categoryid, itemtype, itemmodule, iteminstance, aggregationcoef)
             VALUES(101, 1, 10, 'mod', 'assign', 5, 3);",
    )
    .expect("seed");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "setup.update",
        json!({
            "section": "display",
            "patch": {
                "courseNameMaxChars": 5,
                "ellipsis": "~",
                "moduleLabels": { "assign": "Coursework" }
            }
        }),
    );

    let data = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "vis.data",
        json!({ "courseIds": [1] }),
    );
    assert_eq!(data["assessment_data"][0]["course"], json!("Intro~"));
    assert_eq!(data["moduledata"][0]["langstring"], json!("Coursework"));

    let setup = request_ok(&mut stdin, &mut reader, "4", "setup.get", json!({}));
    assert_eq!(setup["display"]["courseNameMaxChars"], json!(5));
    // Fields not in the patch keep their defaults.
    assert_eq!(
        setup["display"]["noCoursesMessage"],
        json!("There are no courses to display, select some")
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn invalid_patches_are_rejected_and_nothing_is_saved() {
    let workspace = temp_dir("assessmap-setup-invalid");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    for (id, params) in [
        ("2", json!({ "section": "display", "patch": { "bogus": 1 } })),
        ("3", json!({ "section": "selection", "patch": { "searchLimit": 0 } })),
        ("4", json!({ "section": "chart", "patch": { "width": "wide" } })),
        ("5", json!({ "section": "nope", "patch": {} })),
        ("6", json!({ "section": "display" })),
    ] {
        let resp = request(&mut stdin, &mut reader, id, "setup.update", params);
        assert_eq!(resp["ok"], json!(false));
        assert_eq!(resp["error"]["code"], json!("bad_params"));
    }

    let setup = request_ok(&mut stdin, &mut reader, "7", "setup.get", json!({}));
    assert_eq!(setup["selection"]["searchLimit"], json!(15));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
