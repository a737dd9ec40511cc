//! Cell counts, phase timings and throughput.

use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::Serialize;
use tracing::info;
use crate::domain::LevelHierarchy;
use crate::io::write_json;
use crate::orchestrator::{SolveKind, StepTiming};

/// Cells per level, summed over every box, and their total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellCounts {
    pub per_level: Vec<u64>,
    pub total: u64,
}

impl CellCounts {
    pub fn of<const D: usize>(hierarchy: &LevelHierarchy<D>) -> Self {
        let per_level: Vec<u64> = hierarchy.levels().iter().map(|boxes| boxes.num_pts()).collect();
        let total = per_level.iter().sum();
        Self { per_level, total }
    }

    pub fn log(&self) {
        for (level, cells) in self.per_level.iter().enumerate() {
            info!("level {} has {} cells", level, cells);
        }
        info!("total cells: {}", self.total);
    }
}

/// Seconds per cell per repeat.
pub fn throughput(elapsed: Duration, repeats: usize, total_cells: u64) -> f64 {
    let work = repeats as f64 * total_cells as f64;
    if work > 0.0 {
        elapsed.as_secs_f64() / work
    } else {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseReport {
    pub kind: SolveKind,
    pub lev_min: usize,
    pub lev_max: usize,
    pub repeats: usize,
    pub seconds: f64,
    pub seconds_per_cell: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseReport {
    pub source: PathBuf,
    pub cells: CellCounts,
    pub setup_seconds: f64,
    pub phases: Vec<PhaseReport>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub cases: Vec<CaseReport>,
    /// Largest velocity, pressure and coefficient storage held at once.
    pub peak_field_bytes: usize,
}

pub struct PerformanceReporter;

impl PerformanceReporter {
    /// Logs one finished case and returns its report.
    pub fn case(source: &Path, cells: CellCounts, setup: Duration, timings: &[StepTiming]) -> CaseReport {
        info!("projector setup time was {:.6}s", setup.as_secs_f64());
        let phases = timings
            .iter()
            .map(|t| {
                let per_cell = throughput(t.elapsed, t.repeats, cells.total);
                info!(
                    "{} proj time per cell ({} repeat(s)): {:.6e}s",
                    t.kind, t.repeats, per_cell
                );
                PhaseReport {
                    kind: t.kind,
                    lev_min: t.range.lev_min,
                    lev_max: t.range.lev_max,
                    repeats: t.repeats,
                    seconds: t.elapsed.as_secs_f64(),
                    seconds_per_cell: per_cell,
                }
            })
            .collect();
        CaseReport { source: source.to_path_buf(), cells, setup_seconds: setup.as_secs_f64(), phases }
    }

    pub fn write(report: &RunReport, path: &Path) -> std::io::Result<()> {
        write_json(path, report)
    }
}
