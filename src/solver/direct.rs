//! Reference projector: a direct sparse solve per grid.
//!
//! Each grid of each level in the range is projected on its own, as an
//! approximate projection: the nodal pressure solves `L p = Gᵀ u`, where
//! `G` is the corner-averaged cell gradient and `L` the bilinear
//! finite-element stiffness weighted by the per-axis coefficient `S`, and
//! the velocity is corrected by `u -= S G p`. Grid faces inside the domain
//! and outflow faces hold `p = 0`; other domain faces are natural. There is
//! no coarse/fine coupling, so a composite range is a sequence of
//! independent level solves. The operator is Cartesian: an r-z coordinate
//! system is recorded and logged but does not change the discretization.

use std::collections::BTreeMap;
use rsparse::data::{Sprs, Trpl};
use rsparse::lusol;
use tracing::{debug, warn};
use crate::boundary::{BoundaryTable, RegType};
use crate::config::{CoordSys, StencilKind};
use crate::domain::{IndexBox, IntVect, LevelHierarchy, MultiField};
use crate::error::ProjectionError;
use crate::solver::{EllipticProjector, LevelFields, ProjectCall, ProjectorSetup};

pub struct DirectProjector<const D: usize> {
    hierarchy: LevelHierarchy<D>,
    boundary: BoundaryTable<D>,
    stencil: StencilKind,
    verbosity: i32,
    coord_sys: CoordSys,
}

impl<const D: usize> DirectProjector<D> {
    pub fn construct(setup: &ProjectorSetup<'_, D>) -> Result<Self, ProjectionError> {
        let finest = setup.hierarchy.finest_level();
        if setup.base_level != 0 || setup.finest_level != finest || setup.max_level < setup.finest_level {
            return Err(ProjectionError::Setup(format!(
                "levels {}..={} (max {}) for a hierarchy with finest level {}",
                setup.base_level, setup.finest_level, setup.max_level, finest
            )));
        }
        if setup.domain != *setup.hierarchy.domain(finest) {
            return Err(ProjectionError::Setup("domain is not the finest level's domain".to_string()));
        }
        Ok(Self {
            hierarchy: setup.hierarchy.clone(),
            boundary: setup.boundary,
            stencil: setup.stencil,
            verbosity: setup.verbosity,
            coord_sys: CoordSys::Cartesian,
        })
    }
}

impl<const D: usize> EllipticProjector<D> for DirectProjector<D> {
    fn set_coord_sys(&mut self, coord_sys: CoordSys) {
        self.coord_sys = coord_sys;
    }

    fn prepare_hierarchy(&mut self) -> Result<(), ProjectionError> {
        // Per-grid operators are assembled on demand.
        Ok(())
    }

    fn project(
        &mut self,
        fields: &mut LevelFields<D>,
        coefficients: &[MultiField<D>],
        call: &ProjectCall<D>,
    ) -> Result<(), ProjectionError> {
        call.range.check(self.hierarchy.num_levels())?;
        if self.verbosity >= 2 {
            debug!(range = %call.range, coord_sys = ?self.coord_sys, "direct projection");
        }
        for level in call.range.levels() {
            let rat = self.hierarchy.cumulative_ratio(level);
            let scale: [f64; D] = std::array::from_fn(|d| match self.stencil {
                StencilKind::Cross => rat[d] as f64 / call.spacing[d],
                // spacing is folded into the coefficients
                StencilKind::Terrain | StencilKind::Full => 1.0,
            });
            let domain = self.hierarchy.domain(level);
            for (grid, cells) in self.hierarchy.boxes(level).iter().enumerate() {
                let op = GridOperator::new(*cells, domain, &self.boundary, self.stencil, scale);
                op.project(fields, &coefficients[level], level, grid, call.tol)?;
            }
        }
        Ok(())
    }
}

fn corner_sign(corner: usize, axis: usize) -> f64 {
    if (corner >> axis) & 1 == 1 { 1.0 } else { -1.0 }
}

/// One-dimensional bilinear element mass on the unit interval.
fn mass_1d(a: usize, b: usize) -> f64 {
    if a == b { 1.0 / 3.0 } else { 1.0 / 6.0 }
}

fn stiffness_1d(a: usize, b: usize) -> f64 {
    if a == b { 1.0 } else { -1.0 }
}

fn corner_node<const D: usize>(cell: &IntVect<D>, corner: usize) -> IntVect<D> {
    IntVect::<D>::from_fn(|d, _| cell[d] + ((corner >> d) & 1) as i64)
}

struct GridOperator<const D: usize> {
    cells: IndexBox<D>,
    nodes: IndexBox<D>,
    /// Unknown number of every node; `None` where `p = 0` is imposed.
    unknowns: Vec<Option<usize>>,
    count: usize,
    /// Row 0 replaced by `p = 0` when no node is fixed.
    pinned: bool,
    /// Inverse spacing per axis.
    scale: [f64; D],
    /// Per-axis gradient weight, corner averaging included.
    weight: [f64; D],
    axis_comp: [usize; D],
}

impl<const D: usize> GridOperator<D> {
    fn new(
        cells: IndexBox<D>,
        domain: &IndexBox<D>,
        boundary: &BoundaryTable<D>,
        stencil: StencilKind,
        scale: [f64; D],
    ) -> Self {
        let nodes = cells.nodes();
        let mut unknowns = Vec::with_capacity(nodes.num_pts() as usize);
        let mut count = 0;
        for n in nodes.points() {
            let fixed = (0..D).any(|d| {
                let face = if n[d] == nodes.lo[d] {
                    Some((false, n[d] == domain.lo[d]))
                } else if n[d] == nodes.hi[d] {
                    Some((true, n[d] == domain.hi[d] + 1))
                } else {
                    None
                };
                match face {
                    Some((high, true)) => boundary.get(d, high) == RegType::Outflow,
                    Some((_, false)) => true,
                    None => false,
                }
            });
            if fixed {
                unknowns.push(None);
            } else {
                unknowns.push(Some(count));
                count += 1;
            }
        }
        let pinned = count > 0 && unknowns.iter().all(Option::is_some);
        let average = 2f64.powi(1 - D as i32);
        let axis_comp = std::array::from_fn(|d| match stencil {
            StencilKind::Cross => 0,
            StencilKind::Terrain | StencilKind::Full => d,
        });
        Self {
            cells,
            nodes,
            unknowns,
            count,
            pinned,
            scale,
            weight: std::array::from_fn(|d| scale[d] * average),
            axis_comp,
        }
    }

    fn unknown(&self, node: &IntVect<D>) -> Option<usize> {
        self.unknowns[self.nodes.offset(node)]
    }

    /// `Gᵀ u` at every unknown.
    fn divergence(&self, velocity: &MultiField<D>, grid: usize) -> Vec<f64> {
        let u = velocity.block(grid);
        let mut b = vec![0.0; self.count];
        for c in self.cells.points() {
            for corner in 0..1 << D {
                let Some(row) = self.unknown(&corner_node(&c, corner)) else { continue };
                for d in 0..D {
                    b[row] += self.weight[d] * corner_sign(corner, d) * u.get(&c, d);
                }
            }
        }
        b
    }

    /// Bilinear element stiffness, summed over the cells of the grid.
    fn assemble(&self, coefficients: &MultiField<D>, grid: usize) -> BTreeMap<(usize, usize), f64> {
        let sigma = coefficients.block(grid);
        let mut entries = BTreeMap::new();
        for c in self.cells.points() {
            let w: [f64; D] =
                std::array::from_fn(|d| sigma.get(&c, self.axis_comp[d]) * self.scale[d] * self.scale[d]);
            for ci in 0..1 << D {
                let Some(row) = self.unknown(&corner_node(&c, ci)) else { continue };
                if self.pinned && row == 0 {
                    continue;
                }
                for cj in 0..1 << D {
                    let Some(col) = self.unknown(&corner_node(&c, cj)) else { continue };
                    let value: f64 = (0..D)
                        .map(|d| {
                            let bit = |corner: usize, axis: usize| (corner >> axis) & 1;
                            let across: f64 = (0..D)
                                .filter(|&e| e != d)
                                .map(|e| mass_1d(bit(ci, e), bit(cj, e)))
                                .product();
                            w[d] * stiffness_1d(bit(ci, d), bit(cj, d)) * across
                        })
                        .sum();
                    *entries.entry((row, col)).or_insert(0.0) += value;
                }
            }
        }
        if self.pinned {
            entries.insert((0, 0), 1.0);
        }
        entries
    }

    fn solve(
        &self,
        entries: &BTreeMap<(usize, usize), f64>,
        rhs: &mut [f64],
        level: usize,
        grid: usize,
    ) -> Result<(), ProjectionError> {
        let n = self.count;
        let mut trpl_mat = Trpl::<f64> {
            m: n,
            n,
            p: Vec::with_capacity(entries.len()),
            i: Vec::with_capacity(entries.len()),
            x: Vec::with_capacity(entries.len()),
        };
        for (&(row, col), &value) in entries {
            trpl_mat.i.push(row);
            trpl_mat.p.push(col as isize);
            trpl_mat.x.push(value);
        }
        let mut sprs_mat = Sprs::<f64>::new();
        sprs_mat.from_trpl(&trpl_mat);
        lusol(&sprs_mat, rhs, 1, 1e-10).map_err(|e| ProjectionError::SparseSolve {
            level,
            grid,
            reason: e.to_string(),
        })
    }

    fn project(
        &self,
        fields: &mut LevelFields<D>,
        coefficients: &MultiField<D>,
        level: usize,
        grid: usize,
        tol: f64,
    ) -> Result<(), ProjectionError> {
        let pressure = fields.pressure[level].block_mut(grid);
        pressure.data.fill(0.0);
        if self.count == 0 {
            return Ok(());
        }
        let mut rhs = self.divergence(&fields.velocity[level], grid);
        if self.pinned {
            rhs[0] = 0.0;
        }
        let b = rhs.clone();
        let entries = self.assemble(coefficients, grid);
        self.solve(&entries, &mut rhs, level, grid)?;
        let residual = system_residual(&entries, &rhs, &b);
        let scale = max_abs(&b).max(1.0);
        if residual > tol * scale {
            warn!(level, grid, residual, tol, "pressure solve left residual above tolerance");
        }
        for node in self.nodes.points() {
            if let Some(k) = self.unknown(&node) {
                pressure.set(&node, 0, rhs[k]);
            }
        }

        let pressure = fields.pressure[level].block(grid);
        let sigma = coefficients.block(grid);
        let u = fields.velocity[level].block_mut(grid);
        for c in self.cells.points() {
            for d in 0..D {
                let grad: f64 = (0..1 << D)
                    .map(|corner| corner_sign(corner, d) * pressure.get(&corner_node(&c, corner), 0))
                    .sum::<f64>()
                    * self.weight[d];
                let corrected = u.get(&c, d) - sigma.get(&c, self.axis_comp[d]) * grad;
                u.set(&c, d, corrected);
            }
        }

        let div_before = max_abs(&b);
        let div_after = max_abs(&self.divergence(&fields.velocity[level], grid));
        debug!(level, grid, residual, div_before, div_after, "grid projected");
        Ok(())
    }
}

fn max_abs(v: &[f64]) -> f64 {
    v.iter().fold(0.0f64, |m, x| m.max(x.abs()))
}

/// `max |A x - b|` over the rows of a triplet map.
fn system_residual(entries: &BTreeMap<(usize, usize), f64>, x: &[f64], b: &[f64]) -> f64 {
    let mut ax = vec![0.0; b.len()];
    for (&(row, col), &value) in entries {
        ax[row] += value * x[col];
    }
    ax.iter().zip(b).fold(0.0f64, |m, (l, r)| m.max((l - r).abs()))
}
