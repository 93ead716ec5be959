use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "assessmap.sqlite3";

/// Opens (creating if needed) the workspace database. LMS snapshot tables are
/// created empty so a fresh workspace answers every query; the host fills them.
pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id INTEGER PRIMARY KEY,
            fullname TEXT NOT NULL,
            shortname TEXT NOT NULL DEFAULT '',
            timecreated INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_categories(
            id INTEGER PRIMARY KEY,
            courseid INTEGER NOT NULL,
            parent INTEGER,
            aggregation INTEGER NOT NULL,
            FOREIGN KEY(courseid) REFERENCES courses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_categories_course ON grade_categories(courseid)",
        [],
    )?;

    // itemtype: 'course' | 'category' | 'mod' | 'manual'.
    // Course and category items point at their category through iteminstance;
    // mod/manual items sit inside categoryid.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_items(
            id INTEGER PRIMARY KEY,
            courseid INTEGER NOT NULL,
            categoryid INTEGER,
            itemtype TEXT NOT NULL,
            itemmodule TEXT,
            iteminstance INTEGER,
            itemnumber INTEGER NOT NULL DEFAULT 0,
            gradetype INTEGER NOT NULL DEFAULT 1,
            aggregationcoef REAL NOT NULL DEFAULT 0,
            aggregationcoef2 REAL NOT NULL DEFAULT 0,
            sortorder INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(courseid) REFERENCES courses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_items_course ON grade_items(courseid)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_items_module ON grade_items(itemmodule, iteminstance)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS course_modules(
            id INTEGER PRIMARY KEY,
            course INTEGER NOT NULL,
            modname TEXT NOT NULL,
            instance INTEGER NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY(course) REFERENCES courses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_course_modules_course ON course_modules(course)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assign(
            id INTEGER PRIMARY KEY,
            duedate INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS forum(
            id INTEGER PRIMARY KEY,
            duedate INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS data(
            id INTEGER PRIMARY KEY,
            assesstimefinish INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS quiz(
            id INTEGER PRIMARY KEY,
            timeclose INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS user_enrolments(
            userid INTEGER NOT NULL,
            courseid INTEGER NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY(userid, courseid),
            FOREIGN KEY(courseid) REFERENCES courses(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS user_preferences(
            userid INTEGER NOT NULL,
            name TEXT NOT NULL,
            value_json TEXT NOT NULL,
            PRIMARY KEY(userid, name)
        )",
        [],
    )?;

    Ok(conn)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, value.to_string()),
    )?;
    Ok(())
}

pub fn user_pref_get_json(
    conn: &Connection,
    user_id: i64,
    name: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM user_preferences WHERE userid = ? AND name = ?",
            (user_id, name),
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn user_pref_set_json(
    conn: &Connection,
    user_id: i64,
    name: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO user_preferences(userid, name, value_json) VALUES(?, ?, ?)
         ON CONFLICT(userid, name) DO UPDATE SET value_json = excluded.value_json",
        (user_id, name, value.to_string()),
    )?;
    Ok(())
}
