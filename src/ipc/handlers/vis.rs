use crate::chart::{self, TimeWindow};
use crate::collect;
use crate::config::{self, VisSettings};
use crate::courses;
use crate::ipc::error::{err, ok, vis_err};
use crate::ipc::types::{AppState, Request};
use crate::lms::SqliteLms;
use rusqlite::Connection;
use serde_json::json;

fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn load_settings(conn: &Connection, req: &Request) -> Result<VisSettings, serde_json::Value> {
    config::load(conn).map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))
}

// Ids arrive as JSON integers or integer strings.
fn as_id(v: &serde_json::Value) -> Option<i64> {
    v.as_i64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse::<i64>().ok()))
}

fn id_list(req: &Request, key: &str) -> Result<Vec<i64>, serde_json::Value> {
    let Some(raw) = req.params.get(key) else {
        return Err(err(&req.id, "bad_params", format!("missing {}", key), None));
    };
    let Some(arr) = raw.as_array() else {
        return Err(err(
            &req.id,
            "bad_params",
            format!("{} must be an array of course ids", key),
            None,
        ));
    };
    arr.iter()
        .map(|v| {
            as_id(v).ok_or_else(|| {
                err(
                    &req.id,
                    "bad_params",
                    format!("{} must contain integers", key),
                    Some(json!({ "value": v })),
                )
            })
        })
        .collect()
}

fn optional_i64(req: &Request, key: &str) -> Result<Option<i64>, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => as_id(v)
            .map(Some)
            .ok_or_else(|| err(&req.id, "bad_params", format!("{} must be an integer", key), None)),
    }
}

fn required_i64(req: &Request, key: &str) -> Result<i64, serde_json::Value> {
    optional_i64(req, key)?
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

fn handle_vis_data(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let course_ids = match id_list(req, "courseIds") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let settings = match load_settings(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let lms = SqliteLms::new(conn);
    match collect::collect_courses(&lms, &settings.display, &course_ids) {
        Ok(dataset) => {
            tracing::debug!(
                courses = dataset.totalcourses,
                records = dataset.assessment_data.len(),
                "vis data collected"
            );
            ok(&req.id, json!(dataset))
        }
        Err(e) => {
            tracing::warn!(code = %e.code, "vis data request failed: {}", e.message);
            vis_err(&req.id, e)
        }
    }
}

fn handle_vis_courses(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let all_courses = match id_list(req, "allCourses") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let selected = match id_list(req, "selected") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let user_id = match optional_i64(req, "userId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let settings = match load_settings(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let lms = SqliteLms::new(conn);
    let list = match courses::list_courses(&lms, &all_courses, &selected, &settings.display) {
        Ok(list) => list,
        Err(e) => return vis_err(&req.id, e),
    };
    if let Some(uid) = user_id {
        if let Err(e) = courses::save_selection(conn, uid, &selected) {
            return vis_err(&req.id, e);
        }
    }
    ok(&req.id, json!(list))
}

fn handle_vis_search(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let query = req
        .params
        .get("query")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let user_id = match optional_i64(req, "userId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let settings = match load_settings(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let lms = SqliteLms::new(conn);
    match courses::search(&lms, user_id, &query, &settings.selection) {
        Ok(found) => ok(&req.id, json!(found)),
        Err(e) => vis_err(&req.id, e),
    }
}

fn handle_vis_init(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let user_id = match required_i64(req, "userId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let settings = match load_settings(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let lms = SqliteLms::new(conn);
    match courses::initial_selection(&lms, conn, user_id, &settings.selection) {
        Ok(sel) => ok(&req.id, json!(sel)),
        Err(e) => vis_err(&req.id, e),
    }
}

fn handle_vis_chart(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let course_ids = match id_list(req, "courseIds") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let window = match (optional_i64(req, "from"), optional_i64(req, "to")) {
        (Ok(from), Ok(to)) => TimeWindow { from, to },
        (Err(e), _) | (_, Err(e)) => return e,
    };
    for (key, bound) in [("from", window.from), ("to", window.to)] {
        if let Some(ts) = bound {
            if !chart::is_representable(ts) {
                return err(
                    &req.id,
                    "bad_params",
                    format!("{} is outside the supported date range", key),
                    Some(json!({ "field": key, "value": ts })),
                );
            }
        }
    }
    let highlight = req.params.get("highlight").and_then(|v| v.as_str());
    let settings = match load_settings(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let lms = SqliteLms::new(conn);
    let dataset = match collect::collect_courses(&lms, &settings.display, &course_ids) {
        Ok(d) => d,
        Err(e) => return vis_err(&req.id, e),
    };
    let listing = match courses::list_courses(&lms, &course_ids, &course_ids, &settings.display) {
        Ok(l) => l,
        Err(e) => return vis_err(&req.id, e),
    };
    let model = chart::build(
        &dataset,
        &listing,
        window,
        highlight,
        &settings.chart,
        &settings.display,
    );
    ok(&req.id, json!(model))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "vis.init" => Some(handle_vis_init(state, req)),
        "vis.data" => Some(handle_vis_data(state, req)),
        "vis.courses" => Some(handle_vis_courses(state, req)),
        "vis.search" => Some(handle_vis_search(state, req)),
        "vis.chart" => Some(handle_vis_chart(state, req)),
        _ => None,
    }
}
