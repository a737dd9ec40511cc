//! Per-level coefficient ("rhoinv") fields for each stencil topology.
//!
//! Level 0 carries the base values; every finer level is rescaled by the
//! cumulative refinement ratio so that the diagonal metric terms follow the
//! anisotropic change of mesh spacing.

use crate::config::{CoordSys, StencilKind};
use crate::domain::index_box::IntVect;
use crate::domain::{Centering, LevelHierarchy, MultiField};
use crate::error::{ConfigError, DriverError};
use tracing::{debug, warn};

/// Multiplicative factor for each component at cumulative ratio `r`.
/// Cross fields are isotropic and never rescaled.
pub fn rescale_factors<const D: usize>(stencil: StencilKind, r: &IntVect<D>) -> Vec<f64> {
    let r: Vec<f64> = r.iter().map(|&v| v as f64).collect();
    match (stencil, D) {
        (StencilKind::Cross, _) => vec![1.0],
        (StencilKind::Terrain, 2) => vec![r[0] / r[1], r[1] / r[0], 1.0],
        (StencilKind::Terrain, 3) => vec![
            r[0] / (r[1] * r[2]),
            r[1] / (r[0] * r[2]),
            r[2] / (r[0] * r[1]),
            1.0 / r[1],
            1.0 / r[0],
        ],
        (StencilKind::Full, 2) => vec![r[0] / r[1], r[1] / r[0]],
        (StencilKind::Full, 3) => vec![
            r[0] / (r[1] * r[2]),
            r[1] / (r[0] * r[2]),
            r[2] / (r[0] * r[1]),
        ],
        _ => unreachable!("only 2 and 3 dimensional stencils are built"),
    }
}

pub struct CoefficientFieldBuilder {
    stencil: StencilKind,
    coord_sys: CoordSys,
}

impl CoefficientFieldBuilder {
    pub fn new(stencil: StencilKind, coord_sys: CoordSys) -> Self {
        Self { stencil, coord_sys }
    }

    /// One field per level. `density`, when given, replaces the unit fill of
    /// the single snapshot level by its reciprocal.
    pub fn build<const D: usize>(
        &self,
        hierarchy: &LevelHierarchy<D>,
        density: Option<&MultiField<D>>,
    ) -> Result<Vec<MultiField<D>>, DriverError> {
        if density.is_some() && self.stencil != StencilKind::Cross {
            return Err(ConfigError::DensityNeedsCross.into());
        }
        let ncomp = self.stencil.coefficient_components(D);
        let mut fields = Vec::with_capacity(hierarchy.num_levels());
        for level in 0..hierarchy.num_levels() {
            let mut rhoinv = MultiField::new(hierarchy.boxes(level), Centering::Cell, ncomp, 0);
            match (self.stencil, density) {
                (StencilKind::Terrain, _) => {
                    rhoinv.set_val(1.0);
                    rhoinv.set_val_comps(0.0, D, D - 1)?;
                }
                (StencilKind::Cross, Some(rho)) if level == 0 => {
                    rhoinv.copy_from(rho)?;
                    rhoinv.invert(1.0, 0, 1)?;
                }
                _ => rhoinv.set_val(1.0),
            }
            fields.push(rhoinv);
        }
        self.rescale(hierarchy, &mut fields)?;
        if self.coord_sys == CoordSys::Rz {
            if self.stencil == StencilKind::Cross && D == 2 {
                for (level, rhoinv) in fields.iter_mut().enumerate() {
                    scale_by_radius(rhoinv, hierarchy, level, 0, 0);
                }
            } else {
                warn!("r-z coordinates need a 2D cross stencil; running cartesian");
            }
        }
        Ok(fields)
    }

    fn rescale<const D: usize>(
        &self,
        hierarchy: &LevelHierarchy<D>,
        fields: &mut [MultiField<D>],
    ) -> Result<(), DriverError> {
        if self.stencil == StencilKind::Cross {
            return Ok(());
        }
        let mut rat = IntVect::<D>::repeat(1);
        for level in 1..fields.len() {
            if let Some(ratio) = hierarchy.ratio(level - 1) {
                rat = rat.component_mul(ratio);
            }
            let factors = rescale_factors(self.stencil, &rat);
            debug!(level, ?factors, "rescaling coefficients");
            for (comp, factor) in factors.into_iter().enumerate() {
                if factor != 1.0 {
                    fields[level].mult(factor, comp, 1)?;
                }
            }
        }
        Ok(())
    }
}

/// Multiplies component `comp` on the valid cells, plus `extra_low` ghost
/// rows below each grid along axis 1, by the radial coordinate (i + 1/2) h
/// of the cell, h = 1 / domain length along axis 0.
pub fn scale_by_radius<const D: usize>(
    field: &mut MultiField<D>,
    hierarchy: &LevelHierarchy<D>,
    level: usize,
    comp: usize,
    extra_low: i64,
) {
    let h = 1.0 / hierarchy.domain(level).length(0) as f64;
    let extra_low = extra_low.min(field.ngrow());
    for grid in 0..field.num_grids() {
        let block = field.block_mut(grid);
        let mut span = block.valid;
        span.lo[1] -= extra_low;
        for p in span.points() {
            let x = (p[0] as f64 + 0.5) * h;
            let v = block.get(&p, comp);
            block.set(&p, comp, v * x);
        }
    }
}
