use std::fmt;
use std::io::{self, Write};

use rayon::prelude::*;

use crate::stats::{Stats, StatsMap};

/// Final per-key results in ascending byte-wise key order.
#[derive(Debug, Clone)]
pub struct Report {
    rows: Vec<(String, Stats)>,
}

impl Report {
    pub fn new(stats: StatsMap) -> Self {
        let mut rows: Vec<_> = stats
            .into_iter()
            .filter(|(_, s)| s.count() > 0)
            .collect();
        rows.par_sort_unstable_by(|a, b| a.0.cmp(&b.0));
        Report { rows }
    }

    pub fn rows(&self) -> &[(String, Stats)] {
        &self.rows
    }

    pub fn write_to<W: Write>(&self, mut out: W) -> io::Result<()> {
        write!(out, "{self}")?;
        out.flush()
    }
}

impl fmt::Display for Report {
    /// One `<key>: <min>/<mean>/<max>` line per key, two decimals each.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, stats) in &self.rows {
            if let Some(mean) = stats.mean() {
                let (min, max) = (stats.min(), stats.max());
                writeln!(f, "{key}: {min:.2}/{mean:.2}/{max:.2}")?;
            }
        }
        Ok(())
    }
}
