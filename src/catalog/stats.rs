use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::model::{ColumnRecord, Shape};

/// Records on one level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LevelCount {
    /// Level name as stored, empty for unspecified.
    pub level: String,
    pub count: usize,
}

/// Summary statistics over a sequence of records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stats {
    pub total: usize,
    /// Only shapes that occur; see [`Stats::count`] for a zero default.
    pub count_by_shape: BTreeMap<Shape, usize>,
    /// Mean height rounded to whole millimetres, 0 when empty.
    pub average_height: f64,
    pub min_height: f64,
    pub max_height: f64,
    pub count_by_level: Vec<LevelCount>,
}

impl Stats {
    #[must_use]
    pub fn count(&self, shape: Shape) -> usize {
        self.count_by_shape.get(&shape).copied().unwrap_or(0)
    }
}

/// Computes statistics fresh from `records`.
pub fn summarize<'a, I>(records: I) -> Stats
where
    I: IntoIterator<Item = &'a ColumnRecord>,
{
    let mut total = 0;
    let mut count_by_shape = BTreeMap::new();
    let mut sum = 0.0;
    let mut min_height = f64::INFINITY;
    let mut max_height = f64::NEG_INFINITY;
    let mut seen: Vec<&ColumnRecord> = Vec::new();

    for record in records {
        total += 1;
        *count_by_shape.entry(record.shape()).or_insert(0) += 1;
        sum += record.height();
        min_height = min_height.min(record.height());
        max_height = max_height.max(record.height());
        seen.push(record);
    }

    if total == 0 {
        return Stats {
            total,
            count_by_shape,
            average_height: 0.0,
            min_height: 0.0,
            max_height: 0.0,
            count_by_level: Vec::new(),
        };
    }

    Stats {
        total,
        count_by_shape,
        average_height: (sum / total as f64).round(),
        min_height,
        max_height,
        count_by_level: count_levels(seen),
    }
}

pub(crate) fn count_levels<'a, I>(records: I) -> Vec<LevelCount>
where
    I: IntoIterator<Item = &'a ColumnRecord>,
{
    let mut levels: Vec<LevelCount> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for record in records {
        match positions.get(record.level()) {
            Some(&position) => levels[position].count += 1,
            None => {
                positions.insert(record.level(), levels.len());
                levels.push(LevelCount {
                    level: record.level().to_string(),
                    count: 1,
                });
            }
        }
    }

    levels
}
