//! Column reductions for step and exit logging.

use ab_core::ColumnData;

/// A reduction over every element of one agent variable.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Reduction {
    Mean,
    Min,
    Max,
    Sum,
    /// Population standard deviation.
    StdDev,
}

impl Reduction {
    pub fn name(self) -> &'static str {
        match self {
            Reduction::Mean   => "mean",
            Reduction::Min    => "min",
            Reduction::Max    => "max",
            Reduction::Sum    => "sum",
            Reduction::StdDev => "std",
        }
    }

    /// `None` for an empty column (except `Sum`, which is `0`).
    pub fn apply(self, column: &ColumnData) -> Option<f64> {
        let n = column.len();
        let values = (0..n).filter_map(|i| column.get(i)).map(|v| v.as_f64());
        match self {
            Reduction::Sum => Some(values.sum()),
            _ if n == 0 => None,
            Reduction::Mean => Some(values.sum::<f64>() / n as f64),
            Reduction::Min => values.reduce(f64::min),
            Reduction::Max => values.reduce(f64::max),
            Reduction::StdDev => {
                let values: Vec<f64> = values.collect();
                let mean = values.iter().sum::<f64>() / n as f64;
                let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
                Some(var.sqrt())
            }
        }
    }
}

impl std::fmt::Display for Reduction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
