use crate::coefficients::scale_by_radius;
use crate::config::{CoordSys, StencilKind};
use crate::domain::index_box::fmt_int_vect;
use crate::domain::{IntVect, LevelHierarchy};
use crate::error::FieldError;
use crate::solver::LevelFields;

/// Value placed at the probe cell.
pub const PROBE_VALUE: f64 = 3.0;
/// Offset of the probe cell from the low corner of its grid, per axis.
pub const PROBE_OFFSET: i64 = 2;

/// Where a probe goes: first grid of `level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSite {
    pub level: usize,
    pub grid: usize,
}

/// Resets velocity and pressure to the reproducible test pattern.
#[derive(Debug, Clone, Copy)]
pub struct VelocityPressureInitializer {
    stencil: StencilKind,
    coord_sys: CoordSys,
}

impl VelocityPressureInitializer {
    pub fn new(stencil: StencilKind, coord_sys: CoordSys) -> Self {
        Self { stencil, coord_sys }
    }

    /// Probe sites for a hierarchy of `num_levels` levels.
    pub fn probe_sites(&self, num_levels: usize) -> Vec<ProbeSite> {
        let first = |level| ProbeSite { level, grid: 0 };
        match num_levels {
            0 => Vec::new(),
            1 => vec![first(0)],
            2 if self.stencil == StencilKind::Cross => vec![first(1), first(0)],
            2 => vec![first(1)],
            3 => vec![first(1)],
            n => vec![first(n - 1)],
        }
    }

    pub fn apply<const D: usize>(
        &self,
        fields: &mut LevelFields<D>,
        hierarchy: &LevelHierarchy<D>,
    ) -> Result<(), FieldError> {
        for velocity in &mut fields.velocity {
            velocity.set_val(0.0);
        }
        for pressure in &mut fields.pressure {
            pressure.set_val(0.0);
        }
        for site in self.probe_sites(hierarchy.num_levels()) {
            let bx = hierarchy
                .boxes(site.level)
                .get(site.grid)
                .ok_or(FieldError::EmptyLevel { level: site.level })?;
            let p = bx.lo + IntVect::<D>::repeat(PROBE_OFFSET);
            if !bx.contains(&p) {
                return Err(FieldError::PointOutsideGrid {
                    level: site.level,
                    grid: site.grid,
                    point: fmt_int_vect(&p),
                });
            }
            fields.velocity[site.level].set(site.grid, &p, 0, PROBE_VALUE)?;
        }
        self.scale_radial_velocity(fields, hierarchy);
        Ok(())
    }

    /// r-z only: axis-1 velocity times the radial coordinate, one ghost row
    /// below each grid included.
    fn scale_radial_velocity<const D: usize>(&self, fields: &mut LevelFields<D>, hierarchy: &LevelHierarchy<D>) {
        if self.coord_sys == CoordSys::Rz && self.stencil == StencilKind::Cross && D == 2 {
            for (level, velocity) in fields.velocity.iter_mut().enumerate() {
                scale_by_radius(velocity, hierarchy, level, 1, 1);
            }
        }
    }
}
