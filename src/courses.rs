use crate::config::{DisplaySettings, SelectionSettings};
use crate::db;
use crate::error::VisError;
use crate::lms::LmsSource;
use crate::modules::truncate_course_name;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;

/// Preference name the last chosen course ids are stored under.
pub const SELECTION_PREF: &str = "assessmap_selected_courses";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseListing {
    pub courseid: i64,
    pub coursename: String,
    pub selected: bool,
    pub shortname: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseMatch {
    pub courseid: i64,
    pub coursename: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialSelection {
    pub course_ids: Vec<i64>,
    pub all_ids: Vec<i64>,
}

/// Names for `all_courses`, flagging the ones in `selected`. Unknown ids are
/// listed with an empty name rather than failing.
pub fn list_courses<S: LmsSource + ?Sized>(
    lms: &S,
    all_courses: &[i64],
    selected: &[i64],
    display: &DisplaySettings,
) -> Result<Vec<CourseListing>, VisError> {
    let mut out = Vec::with_capacity(all_courses.len());
    for &course_id in all_courses {
        let name = lms
            .find_course(course_id)?
            .map(|c| c.fullname)
            .unwrap_or_default();
        let shortname =
            truncate_course_name(&name, display.course_name_max_chars, &display.ellipsis);
        out.push(CourseListing {
            courseid: course_id,
            coursename: name,
            selected: selected.contains(&course_id),
            shortname,
        });
    }
    Ok(out)
}

/// Blank queries list the user's own courses; anything else searches all
/// courses, capped at the configured limit.
pub fn search<S: LmsSource + ?Sized>(
    lms: &S,
    user_id: Option<i64>,
    query: &str,
    selection: &SelectionSettings,
) -> Result<Vec<CourseMatch>, VisError> {
    let query = query.trim();
    let courses = if query.is_empty() {
        match user_id {
            Some(uid) => lms.enrolled_courses(uid)?,
            None => Vec::new(),
        }
    } else {
        lms.search_courses(query, selection.search_limit)?
    };
    Ok(courses
        .into_iter()
        .map(|c| CourseMatch {
            courseid: c.id,
            coursename: c.fullname,
        })
        .collect())
}

pub fn load_selection(conn: &Connection, user_id: i64) -> Result<Option<Vec<i64>>, VisError> {
    let raw = db::user_pref_get_json(conn, user_id, SELECTION_PREF).map_err(VisError::db)?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    let Some(arr) = raw.as_array() else {
        tracing::warn!(user_id, "stored course selection is not a list, ignored");
        return Ok(None);
    };
    Ok(Some(arr.iter().filter_map(|v| v.as_i64()).collect()))
}

pub fn save_selection(conn: &Connection, user_id: i64, course_ids: &[i64]) -> Result<(), VisError> {
    db::user_pref_set_json(conn, user_id, SELECTION_PREF, &json!(course_ids))
        .map_err(|e| VisError::new("db_update_failed", e.to_string()))
}

/// The selection a fresh page starts with: the stored one, else the newest
/// enrolments up to the configured limit (which is then stored).
pub fn initial_selection<S: LmsSource + ?Sized>(
    lms: &S,
    conn: &Connection,
    user_id: i64,
    selection: &SelectionSettings,
) -> Result<InitialSelection, VisError> {
    let ids = match load_selection(conn, user_id)? {
        Some(ids) => ids,
        None => {
            let ids: Vec<i64> = lms
                .enrolled_courses(user_id)?
                .into_iter()
                .take(selection.initial_course_limit)
                .map(|c| c.id)
                .collect();
            save_selection(conn, user_id, &ids)?;
            ids
        }
    };
    Ok(InitialSelection {
        all_ids: ids.clone(),
        course_ids: ids,
    })
}
