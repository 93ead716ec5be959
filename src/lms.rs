use crate::error::VisError;
use crate::grades::{Aggregation, GradeCategory, GradeItem, GradeNode, GradeType};
use crate::modules::ModuleKind;
use rusqlite::{Connection, OptionalExtension};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq)]
pub struct CourseSummary {
    pub id: i64,
    pub fullname: String,
    pub shortname: String,
}

/// A graded course module with its lookups already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct GradableActivity {
    pub cm_id: i64,
    pub instance_id: i64,
    pub kind: ModuleKind,
    pub name: String,
    /// The module's main grade item (item number 0), if it has one.
    pub grade_item_id: Option<i64>,
    /// `None` when the kind's due-date field is unset.
    pub due_date: Option<i64>,
}

pub trait LmsSource {
    fn find_course(&self, course_id: i64) -> Result<Option<CourseSummary>, VisError>;

    /// Root grade category of the course, or `None` when the course has no
    /// gradebook yet.
    fn grade_tree(&self, course_id: i64) -> Result<Option<GradeCategory>, VisError>;

    /// Graded modules of a supported kind, in course-module order.
    fn gradable_activities(&self, course_id: i64) -> Result<Vec<GradableActivity>, VisError>;

    /// Active enrolments, newest course first.
    fn enrolled_courses(&self, user_id: i64) -> Result<Vec<CourseSummary>, VisError>;

    fn search_courses(&self, query: &str, limit: usize) -> Result<Vec<CourseSummary>, VisError>;

    fn course(&self, course_id: i64) -> Result<CourseSummary, VisError> {
        self.find_course(course_id)?
            .ok_or_else(|| VisError::course_not_found(course_id))
    }
}

pub struct SqliteLms<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteLms<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

#[derive(Debug, Clone)]
struct ItemRow {
    item: GradeItem,
    category_id: Option<i64>,
    item_type: String,
    instance: Option<i64>,
    sort_order: i64,
}

struct TreeBuilder {
    aggregation: HashMap<i64, i64>,
    subcategories: HashMap<i64, Vec<i64>>,
    category_items: HashMap<i64, ItemRow>,
    leaf_items: HashMap<i64, Vec<ItemRow>>,
    visited: HashSet<i64>,
}

impl TreeBuilder {
    fn build(&mut self, category_id: i64, own_item: GradeItem) -> GradeCategory {
        self.visited.insert(category_id);
        let aggregation = self
            .aggregation
            .get(&category_id)
            .copied()
            .map(Aggregation::from_code)
            .unwrap_or(Aggregation::Unsupported(-1));

        let mut children: Vec<(i64, i64, GradeNode)> = Vec::new();
        for row in self.leaf_items.remove(&category_id).unwrap_or_default() {
            children.push((row.sort_order, row.item.id, GradeNode::Item(row.item)));
        }
        for sub_id in self.subcategories.remove(&category_id).unwrap_or_default() {
            if self.visited.contains(&sub_id) {
                tracing::debug!(category = sub_id, "grade category cycle, subtree skipped");
                continue;
            }
            let Some(row) = self.category_items.remove(&sub_id) else {
                tracing::debug!(category = sub_id, "grade category without its item, skipped");
                continue;
            };
            let sub = self.build(sub_id, row.item.clone());
            children.push((row.sort_order, row.item.id, GradeNode::Category(sub)));
        }
        children.sort_by_key(|(sort, id, _)| (*sort, *id));

        GradeCategory {
            item: own_item,
            aggregation,
            children: children.into_iter().map(|(_, _, n)| n).collect(),
        }
    }
}

fn course_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CourseSummary> {
    Ok(CourseSummary {
        id: row.get(0)?,
        fullname: row.get(1)?,
        shortname: row.get(2)?,
    })
}

impl SqliteLms<'_> {
    fn due_date(&self, kind: ModuleKind, instance: i64) -> Result<Option<i64>, VisError> {
        let rule = kind.due_date_rule();
        let raw: Option<Option<i64>> = self
            .conn
            .query_row(&rule.select_sql(), [instance], |r| r.get(0))
            .optional()?;
        // Unset timestamps are stored as 0.
        Ok(raw.flatten().filter(|t| *t != 0))
    }
}

impl LmsSource for SqliteLms<'_> {
    fn find_course(&self, course_id: i64) -> Result<Option<CourseSummary>, VisError> {
        let course = self
            .conn
            .query_row(
                "SELECT id, fullname, shortname FROM courses WHERE id = ?",
                [course_id],
                course_from_row,
            )
            .optional()?;
        Ok(course)
    }

    fn grade_tree(&self, course_id: i64) -> Result<Option<GradeCategory>, VisError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, parent, aggregation FROM grade_categories WHERE courseid = ?")?;
        let categories = stmt
            .query_map([course_id], |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, Option<i64>>(1)?,
                    r.get::<_, i64>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT id, categoryid, itemtype, iteminstance, gradetype,
                    aggregationcoef, aggregationcoef2, sortorder
             FROM grade_items
             WHERE courseid = ?",
        )?;
        let items = stmt
            .query_map([course_id], |r| {
                Ok(ItemRow {
                    item: GradeItem {
                        id: r.get(0)?,
                        grade_type: GradeType::from_code(r.get(4)?),
                        coef: r.get::<_, Option<f64>>(5)?.unwrap_or(0.0),
                        coef2: r.get::<_, Option<f64>>(6)?.unwrap_or(0.0),
                    },
                    category_id: r.get(1)?,
                    item_type: r.get(2)?,
                    instance: r.get(3)?,
                    sort_order: r.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut builder = TreeBuilder {
            aggregation: HashMap::new(),
            subcategories: HashMap::new(),
            category_items: HashMap::new(),
            leaf_items: HashMap::new(),
            visited: HashSet::new(),
        };
        for (id, parent, aggregation) in categories {
            builder.aggregation.insert(id, aggregation);
            if let Some(p) = parent {
                builder.subcategories.entry(p).or_default().push(id);
            }
        }

        let mut course_item: Option<ItemRow> = None;
        for row in items {
            match row.item_type.as_str() {
                "course" => course_item = Some(row),
                "category" => {
                    if let Some(cat) = row.instance {
                        builder.category_items.insert(cat, row);
                    }
                }
                _ => {
                    if let Some(cat) = row.category_id {
                        builder.leaf_items.entry(cat).or_default().push(row);
                    }
                }
            }
        }

        let Some(course_item) = course_item else {
            return Ok(None);
        };
        let Some(root_id) = course_item.instance else {
            return Ok(None);
        };
        Ok(Some(builder.build(root_id, course_item.item)))
    }

    fn gradable_activities(&self, course_id: i64) -> Result<Vec<GradableActivity>, VisError> {
        let mut stmt = self.conn.prepare(
            "SELECT cm.id, cm.instance, cm.modname, cm.name,
                    (SELECT gi.id FROM grade_items gi
                      WHERE gi.courseid = cm.course
                        AND gi.itemtype = 'mod'
                        AND gi.itemmodule = cm.modname
                        AND gi.iteminstance = cm.instance
                        AND gi.itemnumber = 0
                      ORDER BY gi.id LIMIT 1) AS grade_item_id
             FROM course_modules cm
             WHERE cm.course = ?
               AND EXISTS (SELECT 1 FROM grade_items g2
                            WHERE g2.courseid = cm.course
                              AND g2.itemtype = 'mod'
                              AND g2.itemmodule = cm.modname
                              AND g2.iteminstance = cm.instance)
             ORDER BY cm.id",
        )?;
        let rows = stmt
            .query_map([course_id], |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, i64>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, Option<i64>>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Vec::with_capacity(rows.len());
        for (cm_id, instance_id, modname, name, grade_item_id) in rows {
            let Some(kind) = ModuleKind::parse(&modname) else {
                continue;
            };
            let due_date = self.due_date(kind, instance_id)?;
            out.push(GradableActivity {
                cm_id,
                instance_id,
                kind,
                name,
                grade_item_id,
                due_date,
            });
        }
        Ok(out)
    }

    fn enrolled_courses(&self, user_id: i64) -> Result<Vec<CourseSummary>, VisError> {
        let mut stmt = self.conn.prepare(
            "SELECT c.id, c.fullname, c.shortname
             FROM user_enrolments ue
             JOIN courses c ON c.id = ue.courseid
             WHERE ue.userid = ? AND ue.active = 1
             ORDER BY c.timecreated DESC, c.id DESC",
        )?;
        let courses = stmt
            .query_map([user_id], course_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(courses)
    }

    fn search_courses(&self, query: &str, limit: usize) -> Result<Vec<CourseSummary>, VisError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, fullname, shortname
             FROM courses
             WHERE instr(lower(fullname), lower(?1)) > 0
                OR instr(lower(shortname), lower(?1)) > 0
             ORDER BY fullname, id
             LIMIT ?2",
        )?;
        let courses = stmt
            .query_map((query, limit as i64), course_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(courses)
    }
}
