use crate::db;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettingsSection {
    Display,
    Selection,
    Chart,
}

impl SettingsSection {
    pub const ALL: [SettingsSection; 3] = [
        SettingsSection::Display,
        SettingsSection::Selection,
        SettingsSection::Chart,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "display" => Some(Self::Display),
            "selection" => Some(Self::Selection),
            "chart" => Some(Self::Chart),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Display => "display",
            Self::Selection => "selection",
            Self::Chart => "chart",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::Display => "vis.display",
            Self::Selection => "vis.selection",
            Self::Chart => "vis.chart",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplaySettings {
    pub course_name_max_chars: usize,
    pub ellipsis: String,
    /// Module type -> label shown in the legend. Missing types use the
    /// built-in plugin name.
    pub module_labels: BTreeMap<String, String>,
    pub no_courses_message: String,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            course_name_max_chars: 17,
            ellipsis: "...".to_string(),
            module_labels: BTreeMap::new(),
            no_courses_message: "There are no courses to display, select some".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionSettings {
    pub initial_course_limit: usize,
    pub search_limit: usize,
}

impl Default for SelectionSettings {
    fn default() -> Self {
        Self {
            initial_course_limit: 10,
            search_limit: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSettings {
    pub width: f64,
    pub margin_top: f64,
    pub margin_right: f64,
    pub margin_bottom: f64,
    pub margin_left: f64,
    pub row_height: f64,
    pub min_radius: f64,
    pub max_radius: f64,
    pub legend_radius: f64,
    pub legend_start: f64,
    pub legend_width: f64,
    pub x_ticks: usize,
}

impl Default for ChartSettings {
    fn default() -> Self {
        Self {
            width: 900.0,
            margin_top: 50.0,
            margin_right: 120.0,
            margin_bottom: 100.0,
            margin_left: 135.0,
            row_height: 60.0,
            min_radius: 2.0,
            max_radius: 30.0,
            legend_radius: 8.0,
            legend_start: 40.0,
            legend_width: 100.0,
            x_ticks: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VisSettings {
    pub display: DisplaySettings,
    pub selection: SelectionSettings,
    pub chart: ChartSettings,
}

pub fn default_section(section: SettingsSection) -> Value {
    let v = match section {
        SettingsSection::Display => serde_json::to_value(DisplaySettings::default()),
        SettingsSection::Selection => serde_json::to_value(SelectionSettings::default()),
        SettingsSection::Chart => serde_json::to_value(ChartSettings::default()),
    };
    v.unwrap_or_else(|_| Value::Object(Map::new()))
}

fn parse_string_max(v: &Value, key: &str, max: usize) -> Result<String, String> {
    let Some(s) = v.as_str() else {
        return Err(format!("{} must be a string", key));
    };
    if s.chars().count() > max {
        return Err(format!("{} must be at most {} characters", key, max));
    }
    Ok(s.to_string())
}

fn parse_count(v: &Value, key: &str, min: u64, max: u64) -> Result<u64, String> {
    match v.as_u64() {
        Some(n) if (min..=max).contains(&n) => Ok(n),
        _ => Err(format!("{} must be an integer in {}..={}", key, min, max)),
    }
}

fn parse_length(v: &Value, key: &str) -> Result<f64, String> {
    match v.as_f64() {
        Some(n) if n.is_finite() && (0.0..=10_000.0).contains(&n) => Ok(n),
        _ => Err(format!("{} must be a number in 0..=10000", key)),
    }
}

/// Validates and applies `patch` onto `current`. Unknown keys are rejected.
pub fn merge_section_patch(
    section: SettingsSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal settings object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match section {
            SettingsSection::Display => match k.as_str() {
                "courseNameMaxChars" => {
                    obj.insert(k.clone(), Value::from(parse_count(v, k, 1, 200)?));
                }
                "ellipsis" => {
                    obj.insert(k.clone(), Value::String(parse_string_max(v, k, 10)?));
                }
                "noCoursesMessage" => {
                    obj.insert(k.clone(), Value::String(parse_string_max(v, k, 200)?));
                }
                "moduleLabels" => {
                    let Some(labels) = v.as_object() else {
                        return Err("moduleLabels must be an object".to_string());
                    };
                    let mut out = Map::new();
                    for (ty, label) in labels {
                        out.insert(ty.clone(), Value::String(parse_string_max(label, ty, 80)?));
                    }
                    obj.insert(k.clone(), Value::Object(out));
                }
                _ => return Err(format!("unknown display field: {}", k)),
            },
            SettingsSection::Selection => match k.as_str() {
                "initialCourseLimit" | "searchLimit" => {
                    obj.insert(k.clone(), Value::from(parse_count(v, k, 1, 500)?));
                }
                _ => return Err(format!("unknown selection field: {}", k)),
            },
            SettingsSection::Chart => match k.as_str() {
                "xTicks" => {
                    obj.insert(k.clone(), Value::from(parse_count(v, k, 1, 100)?));
                }
                "width" | "marginTop" | "marginRight" | "marginBottom" | "marginLeft"
                | "rowHeight" | "minRadius" | "maxRadius" | "legendRadius" | "legendStart"
                | "legendWidth" => {
                    obj.insert(k.clone(), Value::from(parse_length(v, k)?));
                }
                _ => return Err(format!("unknown chart field: {}", k)),
            },
        }
    }
    Ok(())
}

pub fn load_section(conn: &rusqlite::Connection, section: SettingsSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Best-effort apply: a stale saved value must not block the daemon.
            if let Err(msg) = merge_section_patch(section, &mut current, saved_obj) {
                tracing::warn!(section = section.name(), "ignoring saved settings: {}", msg);
                current = default_section(section);
            }
        }
    }
    Ok(current)
}

pub fn load(conn: &rusqlite::Connection) -> anyhow::Result<VisSettings> {
    Ok(VisSettings {
        display: serde_json::from_value(load_section(conn, SettingsSection::Display)?)?,
        selection: serde_json::from_value(load_section(conn, SettingsSection::Selection)?)?,
        chart: serde_json::from_value(load_section(conn, SettingsSection::Chart)?)?,
    })
}
