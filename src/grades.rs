use std::collections::BTreeMap;

/// Grade item id -> fraction (0..=1) of the final course grade.
pub type WeightMap = BTreeMap<i64, f64>;

const AGGREGATE_WEIGHTED_MEAN: i64 = 10;
const AGGREGATE_SUM: i64 = 13;

/// Sum categories are defined to total 100 percent.
const SUM_TOTAL_WEIGHT: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    WeightedMean,
    /// "Natural" weighting: coef2 already holds each child's share.
    Sum,
    Unsupported(i64),
}

impl Aggregation {
    pub fn from_code(code: i64) -> Self {
        match code {
            AGGREGATE_WEIGHTED_MEAN => Aggregation::WeightedMean,
            AGGREGATE_SUM => Aggregation::Sum,
            other => Aggregation::Unsupported(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradeType {
    None,
    Value,
    Scale,
    Text,
}

impl GradeType {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => GradeType::None,
            2 => GradeType::Scale,
            3 => GradeType::Text,
            _ => GradeType::Value,
        }
    }

    pub fn is_excluded(self) -> bool {
        self == GradeType::None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradeItem {
    pub id: i64,
    pub grade_type: GradeType,
    pub coef: f64,
    pub coef2: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradeCategory {
    /// The category's own grade item; its coefficients apply at the parent level.
    pub item: GradeItem,
    pub aggregation: Aggregation,
    pub children: Vec<GradeNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GradeNode {
    Category(GradeCategory),
    Item(GradeItem),
}

impl GradeNode {
    pub fn item(&self) -> &GradeItem {
        match self {
            GradeNode::Category(c) => &c.item,
            GradeNode::Item(i) => i,
        }
    }
}

// Negative, NaN and infinite coefficients count as 0.
fn clean_coef(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 {
        v
    } else {
        0.0
    }
}

fn total_weight(category: &GradeCategory) -> f64 {
    match category.aggregation {
        Aggregation::Sum => SUM_TOTAL_WEIGHT,
        Aggregation::WeightedMean => category
            .children
            .iter()
            .map(GradeNode::item)
            .filter(|it| !it.grade_type.is_excluded())
            .map(|it| clean_coef(it.coef))
            .sum(),
        Aggregation::Unsupported(_) => 0.0,
    }
}

fn child_weight(aggregation: Aggregation, item: &GradeItem, total: f64, multiplier: f64) -> f64 {
    match aggregation {
        Aggregation::Sum => clean_coef(item.coef2) * multiplier,
        Aggregation::WeightedMean => {
            let coef = clean_coef(item.coef);
            if coef == 0.0 || total <= 0.0 {
                0.0
            } else {
                (coef / total) * multiplier
            }
        }
        Aggregation::Unsupported(_) => 0.0,
    }
}

fn warn_on_unbalanced_sum(category: &GradeCategory) {
    let sum: f64 = category
        .children
        .iter()
        .map(GradeNode::item)
        .filter(|it| !it.grade_type.is_excluded())
        .map(|it| clean_coef(it.coef2))
        .sum();
    if !category.children.is_empty() && (sum - 1.0).abs() > 1e-6 {
        tracing::debug!(
            category_item = category.item.id,
            coef2_total = sum,
            "natural weights do not total 100%"
        );
    }
}

fn resolve_into(category: &GradeCategory, multiplier: f64, out: &mut WeightMap) {
    match category.aggregation {
        Aggregation::Unsupported(code) => {
            tracing::debug!(
                category_item = category.item.id,
                aggregation = code,
                "unsupported aggregation, subtree weighted 0"
            );
        }
        Aggregation::Sum => warn_on_unbalanced_sum(category),
        Aggregation::WeightedMean => {}
    }

    let total = total_weight(category);
    for child in &category.children {
        let item = child.item();
        if item.grade_type.is_excluded() {
            continue;
        }
        let weight = child_weight(category.aggregation, item, total, multiplier);
        out.insert(item.id, weight);
        if let GradeNode::Category(sub) = child {
            resolve_into(sub, weight, out);
        }
    }
}

/// Walks the grading tree top-down and returns every gradable item's share of
/// the course total. The root category itself is not part of the map.
pub fn resolve(root: &GradeCategory) -> WeightMap {
    let mut out = WeightMap::new();
    resolve_into(root, 1.0, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: i64, coef: f64) -> GradeNode {
        GradeNode::Item(GradeItem {
            id,
            grade_type: GradeType::Value,
            coef,
            coef2: 0.0,
        })
    }

    fn natural(id: i64, coef2: f64) -> GradeNode {
        GradeNode::Item(GradeItem {
            id,
            grade_type: GradeType::Value,
            coef: 0.0,
            coef2,
        })
    }

    fn excluded(id: i64, coef: f64) -> GradeNode {
        GradeNode::Item(GradeItem {
            id,
            grade_type: GradeType::None,
            coef,
            coef2: coef,
        })
    }

    fn category(id: i64, aggregation: Aggregation, children: Vec<GradeNode>) -> GradeCategory {
        GradeCategory {
            item: GradeItem {
                id,
                grade_type: GradeType::Value,
                coef: 0.0,
                coef2: 0.0,
            },
            aggregation,
            children,
        }
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "expected {} got {}", b, a);
    }

    #[test]
    fn flat_weighted_mean_splits_by_coefficient() {
        let root = category(
            1,
            Aggregation::WeightedMean,
            vec![item(10, 50.0), item(11, 30.0), item(12, 20.0)],
        );
        let w = resolve(&root);
        assert_eq!(w.len(), 3);
        assert_close(w[&10], 0.5);
        assert_close(w[&11], 0.3);
        assert_close(w[&12], 0.2);
    }

    #[test]
    fn weighted_mean_children_sum_to_incoming_multiplier() {
        let sub = category(
            20,
            Aggregation::WeightedMean,
            vec![item(21, 1.0), item(22, 2.0), item(23, 7.0)],
        );
        let mut sub_node = sub.clone();
        sub_node.item.coef = 40.0;
        let root = category(
            1,
            Aggregation::WeightedMean,
            vec![GradeNode::Category(sub_node), item(30, 60.0)],
        );
        let w = resolve(&root);
        assert_close(w[&20], 0.4);
        assert_close(w[&21] + w[&22] + w[&23], w[&20]);
        assert_close(w[&23], 0.28);
    }

    #[test]
    fn sum_category_nested_in_weighted_mean_compounds() {
        let mut sub = category(20, Aggregation::Sum, vec![natural(21, 0.4), natural(22, 0.6)]);
        sub.item.coef = 50.0;
        let root = category(
            1,
            Aggregation::WeightedMean,
            vec![GradeNode::Category(sub), item(30, 50.0)],
        );
        let w = resolve(&root);
        assert_close(w[&20], 0.5);
        assert_close(w[&21], 0.2);
        assert_close(w[&22], 0.3);
        assert_close(w[&21] + w[&22], w[&20]);
    }

    #[test]
    fn all_zero_coefficients_yield_zero_without_nan() {
        let root = category(
            1,
            Aggregation::WeightedMean,
            vec![item(10, 0.0), item(11, 0.0)],
        );
        let w = resolve(&root);
        assert_eq!(w[&10], 0.0);
        assert_eq!(w[&11], 0.0);
        assert!(w.values().all(|v| v.is_finite()));
    }

    #[test]
    fn excluded_items_never_appear_and_do_not_count_towards_total() {
        let root = category(
            1,
            Aggregation::WeightedMean,
            vec![item(10, 50.0), excluded(11, 50.0)],
        );
        let w = resolve(&root);
        assert!(!w.contains_key(&11));
        assert_close(w[&10], 1.0);
    }

    #[test]
    fn negative_and_nan_coefficients_count_as_zero() {
        let root = category(
            1,
            Aggregation::WeightedMean,
            vec![item(10, -5.0), item(11, f64::NAN), item(12, 10.0)],
        );
        let w = resolve(&root);
        assert_eq!(w[&10], 0.0);
        assert_eq!(w[&11], 0.0);
        assert_close(w[&12], 1.0);
    }

    #[test]
    fn unsupported_aggregation_zeroes_the_whole_subtree() {
        let mut sub = category(20, Aggregation::Unsupported(0), vec![item(21, 10.0)]);
        sub.item.coef = 100.0;
        let root = category(1, Aggregation::WeightedMean, vec![GradeNode::Category(sub)]);
        let w = resolve(&root);
        assert_close(w[&20], 1.0);
        assert_eq!(w[&21], 0.0);
    }

    #[test]
    fn empty_and_all_excluded_trees_resolve_to_empty_map() {
        assert!(resolve(&category(1, Aggregation::WeightedMean, vec![])).is_empty());
        let root = category(1, Aggregation::Sum, vec![excluded(10, 1.0)]);
        assert!(resolve(&root).is_empty());
    }

    #[test]
    fn resolving_twice_is_identical() {
        let root = category(
            1,
            Aggregation::Sum,
            vec![natural(10, 0.25), natural(11, 0.75)],
        );
        assert_eq!(resolve(&root), resolve(&root));
    }

    #[test]
    fn aggregation_codes_decode() {
        assert_eq!(Aggregation::from_code(10), Aggregation::WeightedMean);
        assert_eq!(Aggregation::from_code(13), Aggregation::Sum);
        assert_eq!(Aggregation::from_code(2), Aggregation::Unsupported(2));
        assert!(GradeType::from_code(0).is_excluded());
        assert!(!GradeType::from_code(1).is_excluded());
    }
}
