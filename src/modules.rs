use crate::config::DisplaySettings;
use crate::grades::WeightMap;
use crate::lms::{CourseSummary, GradableActivity};
use serde::Serialize;

/// Activity kinds that carry a due date the map can place on the time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModuleKind {
    Assign,
    Forum,
    Data,
    Quiz,
}

impl ModuleKind {
    pub fn parse(modname: &str) -> Option<Self> {
        match modname {
            "assign" => Some(Self::Assign),
            "forum" => Some(Self::Forum),
            "data" => Some(Self::Data),
            "quiz" => Some(Self::Quiz),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Assign => "assign",
            Self::Forum => "forum",
            Self::Data => "data",
            Self::Quiz => "quiz",
        }
    }

    pub fn plugin_name(self) -> &'static str {
        match self {
            Self::Assign => "Assignment",
            Self::Forum => "Forum",
            Self::Data => "Database",
            Self::Quiz => "Quiz",
        }
    }

    pub fn due_date_rule(self) -> &'static DueDateRule {
        match self {
            Self::Assign => &ASSIGN_DUE,
            Self::Forum => &FORUM_DUE,
            Self::Data => &DATA_DUE,
            Self::Quiz => &QUIZ_DUE,
        }
    }
}

/// Where a kind keeps its due date: `table.column`, keyed by instance id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueDateRule {
    pub table: &'static str,
    pub column: &'static str,
}

impl DueDateRule {
    pub fn select_sql(&self) -> String {
        format!("SELECT {} FROM {} WHERE id = ?", self.column, self.table)
    }
}

static ASSIGN_DUE: DueDateRule = DueDateRule {
    table: "assign",
    column: "duedate",
};
static FORUM_DUE: DueDateRule = DueDateRule {
    table: "forum",
    column: "duedate",
};
static DATA_DUE: DueDateRule = DueDateRule {
    table: "data",
    column: "assesstimefinish",
};
static QUIZ_DUE: DueDateRule = DueDateRule {
    table: "quiz",
    column: "timeclose",
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssessmentRecord {
    #[serde(rename = "duedate")]
    pub due_date: i64,
    #[serde(rename = "course")]
    pub course_display_name: String,
    pub shortname: String,
    #[serde(rename = "courseid")]
    pub course_id: i64,
    #[serde(rename = "modulename")]
    pub module_type: String,
    #[serde(rename = "name")]
    pub module_name: String,
    #[serde(rename = "cmid")]
    pub cm_id: String,
    #[serde(rename = "instanceid")]
    pub instance_id: i64,
    #[serde(rename = "weight")]
    pub weight_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleTypeMetadata {
    #[serde(rename = "type")]
    pub module_type: String,
    #[serde(rename = "langstring")]
    pub display_label: String,
}

pub fn round_2dp(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Course names longer than `max_chars` are clipped for the axis labels.
pub fn truncate_course_name(name: &str, max_chars: usize, ellipsis: &str) -> String {
    if name.chars().count() <= max_chars {
        return name.to_string();
    }
    let mut out: String = name.chars().take(max_chars).collect();
    out.push_str(ellipsis);
    out
}

pub fn module_metadata(kind: ModuleKind, display: &DisplaySettings) -> ModuleTypeMetadata {
    let label = display
        .module_labels
        .get(kind.as_str())
        .cloned()
        .unwrap_or_else(|| kind.plugin_name().to_string());
    ModuleTypeMetadata {
        module_type: kind.as_str().to_string(),
        display_label: label,
    }
}

/// Builds the record for one activity, or `None` when it has no grade item,
/// no positive weight, or no due date.
pub fn extract(
    activity: &GradableActivity,
    course: &CourseSummary,
    weights: &WeightMap,
    display: &DisplaySettings,
) -> Option<AssessmentRecord> {
    let Some(item_id) = activity.grade_item_id else {
        tracing::debug!(cm_id = activity.cm_id, "no primary grade item, skipped");
        return None;
    };
    let weight = weights.get(&item_id).copied().unwrap_or(0.0);
    let weight_percent = round_2dp(weight * 100.0);
    if weight_percent <= 0.0 {
        return None;
    }
    let due_date = activity.due_date?;

    Some(AssessmentRecord {
        due_date,
        course_display_name: truncate_course_name(
            &course.fullname,
            display.course_name_max_chars,
            &display.ellipsis,
        ),
        shortname: course.shortname.clone(),
        course_id: course.id,
        module_type: activity.kind.as_str().to_string(),
        module_name: activity.name.clone(),
        cm_id: activity.cm_id.to_string(),
        instance_id: activity.instance_id,
        weight_percent,
    })
}
