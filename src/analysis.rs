use std::{collections::BTreeMap, fmt};

use crate::preprocess::Dataset;

/// The four AG News categories, by 0-based label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NewsCategory {
    World,
    Sports,
    Business,
    SciTech,
}

impl NewsCategory {
    pub const ALL: [NewsCategory; 4] = [
        NewsCategory::World,
        NewsCategory::Sports,
        NewsCategory::Business,
        NewsCategory::SciTech,
    ];

    pub fn from_label(label: i64) -> Option<Self> {
        match label {
            0 => Some(NewsCategory::World),
            1 => Some(NewsCategory::Sports),
            2 => Some(NewsCategory::Business),
            3 => Some(NewsCategory::SciTech),
            _ => None,
        }
    }

    pub fn label(self) -> i64 {
        self as i64
    }
}

impl fmt::Display for NewsCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NewsCategory::World => "World",
            NewsCategory::Sports => "Sports",
            NewsCategory::Business => "Business",
            NewsCategory::SciTech => "Sci/Tech",
        };
        f.write_str(name)
    }
}

/// Per-label counts of a dataset, rendered as a horizontal text bar chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelDistribution {
    counts: BTreeMap<i64, usize>,
    total: usize,
}

impl LabelDistribution {
    const BAR_WIDTH: usize = 40;

    pub fn from_dataset(dataset: &Dataset) -> Self {
        Self {
            counts: dataset.label_counts(),
            total: dataset.len(),
        }
    }

    pub fn counts(&self) -> &BTreeMap<i64, usize> {
        &self.counts
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Fraction of examples carrying `label`; 0.0 for an empty dataset.
    pub fn share(&self, label: i64) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.counts.get(&label).copied().unwrap_or(0) as f64 / self.total as f64
    }
}

impl fmt::Display for LabelDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let max = self.counts.values().copied().max().unwrap_or(0);
        for (&label, &count) in &self.counts {
            let name = NewsCategory::from_label(label)
                .map(|c| c.to_string())
                .unwrap_or_else(|| format!("label {}", label));
            let width = if max == 0 {
                0
            } else {
                (count * Self::BAR_WIDTH + max - 1) / max
            };
            writeln!(
                f,
                "{: <10} {: >2} {:>8} {:>6.1}% {}",
                name,
                label,
                count,
                self.share(label) * 100.0,
                "#".repeat(width)
            )?;
        }
        write!(f, "{: <10} {: >2} {:>8}", "total", "", self.total)
    }
}
