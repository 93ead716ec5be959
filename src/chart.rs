use crate::collect::CollectedDataset;
use crate::config::{ChartSettings, DisplaySettings};
use crate::courses::CourseListing;
use crate::modules::AssessmentRecord;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

const DAY_SECS: i64 = 86_400;
const BUBBLE_OPACITY: f64 = 0.8;
const DIMMED_OPACITY: f64 = 0.05;

/// d3 `schemeTableau10`.
pub const TABLEAU10: [&str; 10] = [
    "#4e79a7", "#f28e2c", "#e15759", "#76b7b2", "#59a14f", "#edc949", "#af7aa1", "#ff9da7",
    "#9c755f", "#bab0ab",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeWindow {
    pub from: Option<i64>,
    pub to: Option<i64>,
}

impl TimeWindow {
    /// Slider semantics: both ends exclusive.
    fn contains(&self, t: i64) -> bool {
        self.from.map(|f| t > f).unwrap_or(true) && self.to.map(|e| t < e).unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AxisTick {
    pub position: f64,
    pub value: i64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRow {
    pub course_id: i64,
    pub y: f64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bubble {
    pub cm_id: String,
    pub course_id: i64,
    pub module_type: String,
    pub cx: f64,
    pub cy: f64,
    pub r: f64,
    pub color: String,
    pub css_class: String,
    pub opacity: f64,
    pub tooltip: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegendEntry {
    pub module_type: String,
    pub label: String,
    pub cx: f64,
    pub cy: f64,
    pub r: f64,
    pub label_x: f64,
    pub label_y: f64,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartModel {
    pub empty: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub total_width: f64,
    pub total_height: f64,
    pub plot_width: f64,
    pub plot_height: f64,
    pub translate_x: f64,
    pub translate_y: f64,
    pub x_domain: [i64; 2],
    pub x_ticks: Vec<AxisTick>,
    pub rows: Vec<CourseRow>,
    pub bubbles: Vec<Bubble>,
    pub legend: Vec<LegendEntry>,
}

/// Linear time scale over a domain widened outward to whole UTC days.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeScale {
    pub start: i64,
    pub end: i64,
    pub width: f64,
}

impl TimeScale {
    pub fn nice(min: i64, max: i64, width: f64) -> Self {
        let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
        let start = lo.div_euclid(DAY_SECS).saturating_mul(DAY_SECS);
        let mut end = hi.div_euclid(DAY_SECS).saturating_mul(DAY_SECS);
        if end < hi {
            end = end.saturating_add(DAY_SECS);
        }
        if end <= start {
            end = start.saturating_add(DAY_SECS);
        }
        Self { start, end, width }
    }

    fn span(&self) -> i128 {
        self.end as i128 - self.start as i128
    }

    pub fn x(&self, t: i64) -> f64 {
        let span = self.span();
        if span <= 0 {
            return 0.0;
        }
        (t as i128 - self.start as i128) as f64 / span as f64 * self.width
    }

    pub fn ticks(&self, count: usize) -> Vec<AxisTick> {
        let count = count.max(1) as i128;
        let span = self.span();
        (0..=count)
            .map(|i| {
                // Stays within [start, end], so it fits back into i64.
                let value = (self.start as i128 + span * i / count) as i64;
                AxisTick {
                    position: self.x(value),
                    value,
                    label: format_date(value, "%B %d"),
                }
            })
            .collect()
    }
}

/// Whether `ts` can be shown as a calendar date.
pub fn is_representable(ts: i64) -> bool {
    DateTime::<Utc>::from_timestamp(ts, 0).is_some()
}

/// Point scale with outer padding 1: course i sits at step * (i + 1).
pub fn course_position(index: usize, count: usize, height: f64) -> f64 {
    let step = height / (count as f64 + 1.0);
    step * (index as f64 + 1.0)
}

pub fn radius(weight_percent: f64, settings: &ChartSettings) -> f64 {
    settings.min_radius + (weight_percent / 100.0) * (settings.max_radius - settings.min_radius)
}

pub fn color_for(module_type: &str, module_names: &[String]) -> &'static str {
    let idx = module_names
        .iter()
        .position(|m| m == module_type)
        .unwrap_or(module_names.len());
    TABLEAU10[idx % TABLEAU10.len()]
}

fn format_date(ts: i64, fmt: &str) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|d| d.format(fmt).to_string())
        .unwrap_or_default()
}

pub fn tooltip(record: &AssessmentRecord) -> String {
    format!(
        "Course: {} <br> Module: {}<br> Due: {}<br> Percent of grade: {}%",
        record.course_display_name,
        record.module_name,
        format_date(record.due_date, "%A, %B %-d, %Y"),
        record.weight_percent
    )
}

fn empty_model(settings: &ChartSettings, message: &str) -> ChartModel {
    ChartModel {
        empty: true,
        message: Some(message.to_string()),
        total_width: settings.width
            + settings.margin_left
            + settings.margin_right
            + settings.legend_width,
        total_height: settings.margin_top + settings.margin_bottom,
        plot_width: settings.width,
        plot_height: 0.0,
        translate_x: settings.margin_left,
        translate_y: settings.margin_top,
        x_domain: [0, 0],
        x_ticks: Vec::new(),
        rows: Vec::new(),
        bubbles: Vec::new(),
        legend: Vec::new(),
    }
}

/// Lays out `dataset`. `courses` supplies the axis labels; `highlight` dims
/// every bubble whose type differs.
pub fn build(
    dataset: &CollectedDataset,
    courses: &[CourseListing],
    window: TimeWindow,
    highlight: Option<&str>,
    settings: &ChartSettings,
    display: &DisplaySettings,
) -> ChartModel {
    if dataset.courseids.is_empty() {
        return empty_model(settings, &display.no_courses_message);
    }

    let legend_step = settings.legend_radius * 2.0 + 10.0;
    let graph_height = settings.row_height * dataset.totalcourses as f64;
    let legend_height = dataset.moduledata.len() as f64 * legend_step;
    let plot_height = graph_height.max(legend_height);

    let scale = TimeScale::nice(
        window.from.unwrap_or(dataset.mindate),
        window.to.unwrap_or(dataset.maxdate),
        settings.width,
    );

    let labels: HashMap<i64, &str> = courses
        .iter()
        .map(|c| (c.courseid, c.shortname.as_str()))
        .collect();
    let rows: Vec<CourseRow> = dataset
        .courseids
        .iter()
        .enumerate()
        .map(|(i, id)| CourseRow {
            course_id: *id,
            y: course_position(i, dataset.courseids.len(), plot_height),
            label: labels
                .get(id)
                .map(|s| s.to_string())
                .unwrap_or_else(|| id.to_string()),
        })
        .collect();
    let row_y: HashMap<i64, f64> = rows.iter().map(|r| (r.course_id, r.y)).collect();

    let bubbles = dataset
        .assessment_data
        .iter()
        .filter(|rec| window.contains(rec.due_date))
        .map(|rec| {
            let dimmed = highlight.map(|h| h != rec.module_type).unwrap_or(false);
            Bubble {
                cm_id: rec.cm_id.clone(),
                course_id: rec.course_id,
                module_type: rec.module_type.clone(),
                cx: scale.x(rec.due_date),
                cy: row_y.get(&rec.course_id).copied().unwrap_or(0.0),
                r: radius(rec.weight_percent, settings),
                color: color_for(&rec.module_type, &dataset.modulenames).to_string(),
                css_class: format!("bubbles {}", rec.module_type),
                opacity: if dimmed { DIMMED_OPACITY } else { BUBBLE_OPACITY },
                tooltip: tooltip(rec),
            }
        })
        .collect();

    let legend = dataset
        .moduledata
        .iter()
        .enumerate()
        .map(|(i, meta)| {
            let cx = settings.width + settings.legend_start;
            let cy = i as f64 * legend_step;
            LegendEntry {
                module_type: meta.module_type.clone(),
                label: meta.display_label.clone(),
                cx,
                cy,
                r: settings.legend_radius,
                label_x: cx + settings.legend_radius * 2.0,
                label_y: cy + settings.legend_radius / 2.0,
                color: color_for(&meta.module_type, &dataset.modulenames).to_string(),
            }
        })
        .collect();

    ChartModel {
        empty: false,
        message: None,
        total_width: settings.width
            + settings.margin_left
            + settings.margin_right
            + settings.legend_width,
        total_height: plot_height + settings.margin_top + settings.margin_bottom,
        plot_width: settings.width,
        plot_height,
        translate_x: settings.margin_left,
        translate_y: settings.margin_top,
        x_domain: [scale.start, scale.end],
        x_ticks: scale.ticks(settings.x_ticks),
        rows,
        bubbles,
        legend,
    }
}
