pub mod direct;

use std::fmt;
use std::ops::RangeInclusive;
use crate::boundary::BoundaryTable;
use crate::config::{CoordSys, StencilKind};
use crate::domain::{Centering, IndexBox, LevelHierarchy, MultiField};
use crate::error::ProjectionError;

/// Velocity and pressure on every level, owned by the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelFields<const D: usize> {
    /// Cell-centered, `D` components, one ghost layer.
    pub velocity: Vec<MultiField<D>>,
    /// Node-centered scalar, one ghost layer.
    pub pressure: Vec<MultiField<D>>,
}

impl<const D: usize> LevelFields<D> {
    pub fn allocate(hierarchy: &LevelHierarchy<D>) -> Self {
        let velocity = hierarchy
            .levels()
            .iter()
            .map(|boxes| MultiField::new(boxes, Centering::Cell, D, 1))
            .collect();
        let pressure = hierarchy
            .levels()
            .iter()
            .map(|boxes| MultiField::new(boxes, Centering::Node, 1, 1))
            .collect();
        Self { velocity, pressure }
    }

    pub fn nbytes(&self) -> usize {
        self.velocity.iter().chain(&self.pressure).map(MultiField::nbytes).sum()
    }
}

/// Inclusive span of levels a solve acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelRange {
    pub lev_min: usize,
    pub lev_max: usize,
}

impl LevelRange {
    pub fn new(lev_min: usize, lev_max: usize) -> Self {
        Self { lev_min, lev_max }
    }

    pub fn levels(&self) -> RangeInclusive<usize> {
        self.lev_min..=self.lev_max
    }

    pub fn check(&self, num_levels: usize) -> Result<(), ProjectionError> {
        if self.lev_min > self.lev_max || self.lev_max >= num_levels {
            return Err(ProjectionError::InvalidRange {
                lev_min: self.lev_min,
                lev_max: self.lev_max,
                levels: num_levels,
            });
        }
        Ok(())
    }
}

impl fmt::Display for LevelRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.lev_min, self.lev_max)
    }
}

/// Everything a projector is built from.
#[derive(Debug, Clone)]
pub struct ProjectorSetup<'a, const D: usize> {
    pub hierarchy: &'a LevelHierarchy<D>,
    /// Domain of the finest level.
    pub domain: IndexBox<D>,
    pub base_level: usize,
    pub finest_level: usize,
    pub max_level: usize,
    pub boundary: BoundaryTable<D>,
    pub stencil: StencilKind,
    pub verbosity: i32,
}

impl<'a, const D: usize> ProjectorSetup<'a, D> {
    pub fn new(
        hierarchy: &'a LevelHierarchy<D>,
        boundary: BoundaryTable<D>,
        stencil: StencilKind,
        verbosity: i32,
    ) -> Self {
        let finest = hierarchy.finest_level();
        Self {
            hierarchy,
            domain: *hierarchy.domain(finest),
            base_level: 0,
            finest_level: finest,
            max_level: finest,
            boundary,
            stencil,
            verbosity,
        }
    }
}

/// Arguments of one projection.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectCall<const D: usize> {
    pub range: LevelRange,
    /// Level 0 domain.
    pub coarse_geometry: IndexBox<D>,
    /// Level 0 mesh spacing; terrain and full stencils ignore it.
    pub spacing: [f64; D],
    pub tol: f64,
}

/// The elliptic projection solver driven by the harness.
///
/// Fields are lent for the duration of one call; implementations may
/// change their values but never their layout.
pub trait EllipticProjector<const D: usize> {
    fn set_coord_sys(&mut self, coord_sys: CoordSys);

    /// Builds whatever per-hierarchy state a full multi-level solve needs.
    fn prepare_hierarchy(&mut self) -> Result<(), ProjectionError>;

    fn project(
        &mut self,
        fields: &mut LevelFields<D>,
        coefficients: &[MultiField<D>],
        call: &ProjectCall<D>,
    ) -> Result<(), ProjectionError>;
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::index_box::{int_vect, BoxArray};

    #[test]
    fn test_range_checks() {
        assert!(LevelRange::new(0, 1).check(2).is_ok());
        assert!(LevelRange::new(1, 1).check(2).is_ok());
        assert!(LevelRange::new(0, 2).check(2).is_err());
        assert!(LevelRange::new(2, 1).check(3).is_err());
        assert_eq!(LevelRange::new(1, 3).to_string(), "1..=3");
    }

    #[test]
    fn test_allocate_shapes() {
        let domain = IndexBox::new(int_vect([0, 0]), int_vect([7, 7])).unwrap();
        let h = LevelHierarchy::new(vec![BoxArray::new(vec![domain])], vec![], vec![domain]).unwrap();
        let fields = LevelFields::allocate(&h);
        assert_eq!(fields.velocity[0].ncomp(), 2);
        assert_eq!(fields.velocity[0].centering(), Centering::Cell);
        assert_eq!(fields.pressure[0].centering(), Centering::Node);
        assert_eq!(fields.pressure[0].block(0).valid.num_pts(), 81);
    }
}
