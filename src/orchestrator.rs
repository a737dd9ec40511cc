//! Turns the level count into a plan of solve ranges and runs it.

use std::fmt;
use std::time::{Duration, Instant};
use serde::Serialize;
use tracing::{debug, info, info_span};
use crate::config::RunConfig;
use crate::domain::{LevelHierarchy, MultiField};
use crate::error::DriverError;
use crate::init::VelocityPressureInitializer;
use crate::solver::{EllipticProjector, LevelFields, LevelRange, ProjectCall};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SolveKind {
    /// The whole of a one-level hierarchy.
    Single,
    /// The finest level on its own.
    Level,
    /// Composite correction across the finest levels.
    Sync,
    /// Every level at once, after hierarchy preparation.
    Full,
}

impl fmt::Display for SolveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SolveKind::Single => "single",
            SolveKind::Level => "level",
            SolveKind::Sync => "sync",
            SolveKind::Full => "full",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolveStep {
    pub kind: SolveKind,
    pub range: LevelRange,
    pub repeats: usize,
    pub prepare_hierarchy: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolvePlan {
    pub steps: Vec<SolveStep>,
}

/// Hierarchies deeper than this get one full solve instead of widening ranges.
pub const MAX_WIDENING_LEVELS: usize = 3;

impl SolvePlan {
    /// Up to three levels: ranges widening from the finest level down to
    /// level 0, one solve each; with at most two levels the last solve is
    /// repeated `nrep` times. Deeper hierarchies: one prepared full solve.
    pub fn for_levels(num_levels: usize, nrep: usize) -> Self {
        let steps = match num_levels {
            0 => Vec::new(),
            1 => vec![SolveStep {
                kind: SolveKind::Single,
                range: LevelRange::new(0, 0),
                repeats: nrep,
                prepare_hierarchy: false,
            }],
            n if n <= MAX_WIDENING_LEVELS => {
                let finest = n - 1;
                (0..n)
                    .map(|k| SolveStep {
                        kind: if k == 0 { SolveKind::Level } else { SolveKind::Sync },
                        range: LevelRange::new(finest - k, finest),
                        repeats: if n == 2 && k == finest { nrep } else { 1 },
                        prepare_hierarchy: false,
                    })
                    .collect()
            }
            n => vec![SolveStep {
                kind: SolveKind::Full,
                range: LevelRange::new(0, n - 1),
                repeats: 1,
                prepare_hierarchy: true,
            }],
        };
        Self { steps }
    }
}

/// Wall time spent in the solver for one plan step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepTiming {
    pub kind: SolveKind,
    pub range: LevelRange,
    pub repeats: usize,
    pub elapsed: Duration,
}

pub struct ProjectionOrchestrator<'a, const D: usize> {
    config: &'a RunConfig,
    hierarchy: &'a LevelHierarchy<D>,
    initializer: VelocityPressureInitializer,
}

impl<'a, const D: usize> ProjectionOrchestrator<'a, D> {
    pub fn new(config: &'a RunConfig, hierarchy: &'a LevelHierarchy<D>) -> Self {
        Self {
            config,
            hierarchy,
            initializer: VelocityPressureInitializer::new(config.stencil, config.coord_sys),
        }
    }

    pub fn initializer(&self) -> &VelocityPressureInitializer {
        &self.initializer
    }

    fn call(&self, range: LevelRange) -> ProjectCall<D> {
        ProjectCall {
            range,
            coarse_geometry: *self.hierarchy.domain(0),
            // terrain and full stencils ignore h
            spacing: [1.0; D],
            tol: self.config.tol,
        }
    }

    /// Runs every step in order. Fields are re-initialized before every
    /// solve; only the prepare and solve calls are timed.
    pub fn execute<P: EllipticProjector<D>>(
        &self,
        plan: &SolvePlan,
        projector: &mut P,
        fields: &mut LevelFields<D>,
        coefficients: &[MultiField<D>],
    ) -> Result<Vec<StepTiming>, DriverError> {
        let mut timings = Vec::with_capacity(plan.steps.len());
        for step in &plan.steps {
            let _span = info_span!("solve_step", kind = %step.kind, range = %step.range).entered();
            let mut elapsed = Duration::ZERO;
            if step.prepare_hierarchy {
                let start = Instant::now();
                projector.prepare_hierarchy()?;
                elapsed += start.elapsed();
            }
            let call = self.call(step.range);
            for rep in 0..step.repeats {
                self.initializer.apply(fields, self.hierarchy)?;
                let start = Instant::now();
                projector.project(fields, coefficients, &call)?;
                elapsed += start.elapsed();
                debug!(rep, "solve finished");
            }
            for (level, velocity) in fields.velocity.iter().enumerate() {
                for comp in 0..D {
                    debug!(level, comp, norm = velocity.norm_inf(comp), "velocity after solve");
                }
            }
            info!(
                "{} proj time ({} repeat(s), levels {}) was {:.6}s",
                step.kind,
                step.repeats,
                step.range,
                elapsed.as_secs_f64()
            );
            timings.push(StepTiming { kind: step.kind, range: step.range, repeats: step.repeats, elapsed });
        }
        Ok(timings)
    }
}
