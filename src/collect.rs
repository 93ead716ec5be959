use crate::config::DisplaySettings;
use crate::error::VisError;
use crate::grades::{self, WeightMap};
use crate::lms::LmsSource;
use crate::modules::{self, AssessmentRecord, ModuleTypeMetadata};
use serde::Serialize;
use std::collections::HashSet;

/// Wire shape consumed by the bubble chart. Flat lists only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectedDataset {
    pub mindate: i64,
    pub maxdate: i64,
    pub totalcourses: usize,
    pub courseids: Vec<i64>,
    pub modulenames: Vec<String>,
    pub moduledata: Vec<ModuleTypeMetadata>,
    pub assessment_data: Vec<AssessmentRecord>,
}

/// Accumulates one request's worth of courses. Not reused across requests.
pub struct DataCollection<'a, S: LmsSource + ?Sized> {
    lms: &'a S,
    display: &'a DisplaySettings,
    records: Vec<AssessmentRecord>,
    course_ids: Vec<i64>,
    min_date: i64,
    max_date: i64,
    seen_types: HashSet<String>,
    module_meta: Vec<ModuleTypeMetadata>,
}

impl<'a, S: LmsSource + ?Sized> DataCollection<'a, S> {
    pub fn new(lms: &'a S, display: &'a DisplaySettings) -> Self {
        Self {
            lms,
            display,
            records: Vec::new(),
            course_ids: Vec::new(),
            min_date: 0,
            max_date: 0,
            seen_types: HashSet::new(),
            module_meta: Vec::new(),
        }
    }

    pub fn collect_course(&mut self, course_id: i64) -> Result<(), VisError> {
        if self.course_ids.contains(&course_id) {
            return Err(VisError::duplicate_course(course_id));
        }

        let course = self.lms.course(course_id)?;
        let weights: WeightMap = self
            .lms
            .grade_tree(course_id)?
            .map(|root| grades::resolve(&root))
            .unwrap_or_default();
        let activities = self.lms.gradable_activities(course_id)?;

        let mut kept = 0usize;
        for activity in &activities {
            let Some(record) = modules::extract(activity, &course, &weights, self.display) else {
                continue;
            };
            self.track_date_range(record.due_date);
            if self.seen_types.insert(record.module_type.clone()) {
                self.module_meta
                    .push(modules::module_metadata(activity.kind, self.display));
            }
            self.records.push(record);
            kept += 1;
        }
        tracing::debug!(
            course_id,
            activities = activities.len(),
            kept,
            "collected course"
        );

        self.course_ids.push(course_id);
        Ok(())
    }

    /// A bound of 0 is unset and always takes the first real value.
    fn track_date_range(&mut self, due_date: i64) {
        if due_date < self.min_date || self.min_date == 0 {
            self.min_date = due_date;
        }
        if due_date > self.max_date || self.max_date == 0 {
            self.max_date = due_date;
        }
    }

    pub fn into_dataset(self) -> CollectedDataset {
        CollectedDataset {
            mindate: self.min_date,
            maxdate: self.max_date,
            totalcourses: self.course_ids.len(),
            courseids: self.course_ids,
            modulenames: self
                .module_meta
                .iter()
                .map(|m| m.module_type.clone())
                .collect(),
            moduledata: self.module_meta,
            assessment_data: self.records,
        }
    }
}

/// Collects every course in order. Any failure aborts the whole request.
pub fn collect_courses<S: LmsSource + ?Sized>(
    lms: &S,
    display: &DisplaySettings,
    course_ids: &[i64],
) -> Result<CollectedDataset, VisError> {
    let mut collection = DataCollection::new(lms, display);
    for &course_id in course_ids {
        collection.collect_course(course_id)?;
    }
    Ok(collection.into_dataset())
}
