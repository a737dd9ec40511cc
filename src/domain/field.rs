use nalgebra::DMatrix;
use crate::domain::index_box::{fmt_int_vect, BoxArray, IndexBox, IntVect};
use crate::error::FieldError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Centering {
    Cell,
    Node,
}

/// Storage for one grid: rows are points of `region` in column-major
/// order, columns are components.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldBlock<const D: usize> {
    pub region: IndexBox<D>,
    pub valid: IndexBox<D>,
    pub data: DMatrix<f64>,
}

impl<const D: usize> FieldBlock<D> {
    pub fn get(&self, p: &IntVect<D>, comp: usize) -> f64 {
        self.data[(self.region.offset(p), comp)]
    }

    pub fn set(&mut self, p: &IntVect<D>, comp: usize, value: f64) {
        let row = self.region.offset(p);
        self.data[(row, comp)] = value;
    }
}

/// A field defined over every grid of one level.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiField<const D: usize> {
    boxes: BoxArray<D>,
    centering: Centering,
    ncomp: usize,
    ngrow: i64,
    blocks: Vec<FieldBlock<D>>,
}

impl<const D: usize> MultiField<D> {
    /// Zero-filled field over `boxes` (given in cell indices) with `ngrow` ghost layers.
    pub fn new(boxes: &BoxArray<D>, centering: Centering, ncomp: usize, ngrow: i64) -> Self {
        let blocks = boxes
            .iter()
            .map(|cells| {
                let valid = match centering {
                    Centering::Cell => *cells,
                    Centering::Node => cells.nodes(),
                };
                let region = valid.grow(ngrow);
                FieldBlock {
                    region,
                    valid,
                    data: DMatrix::<f64>::zeros(region.num_pts() as usize, ncomp),
                }
            })
            .collect();
        Self { boxes: boxes.clone(), centering, ncomp, ngrow, blocks }
    }

    pub fn boxes(&self) -> &BoxArray<D> {
        &self.boxes
    }

    pub fn ncomp(&self) -> usize {
        self.ncomp
    }

    pub fn ngrow(&self) -> i64 {
        self.ngrow
    }

    pub fn num_grids(&self) -> usize {
        self.blocks.len()
    }

    pub fn block(&self, grid: usize) -> &FieldBlock<D> {
        &self.blocks[grid]
    }

    pub fn block_mut(&mut self, grid: usize) -> &mut FieldBlock<D> {
        &mut self.blocks[grid]
    }

    fn check_comps(&self, comp: usize, n: usize) -> Result<(), FieldError> {
        if comp + n > self.ncomp {
            return Err(FieldError::ComponentRange { start: comp, end: comp + n, ncomp: self.ncomp });
        }
        Ok(())
    }

    /// Sets every component, ghosts included.
    pub fn set_val(&mut self, value: f64) {
        for block in &mut self.blocks {
            block.data.fill(value);
        }
    }

    /// Sets components `comp..comp + n`, ghosts included.
    pub fn set_val_comps(&mut self, value: f64, comp: usize, n: usize) -> Result<(), FieldError> {
        self.check_comps(comp, n)?;
        for block in &mut self.blocks {
            block.data.columns_mut(comp, n).fill(value);
        }
        Ok(())
    }

    /// Scales components `comp..comp + n` on the valid region.
    pub fn mult(&mut self, factor: f64, comp: usize, n: usize) -> Result<(), FieldError> {
        self.check_comps(comp, n)?;
        for block in &mut self.blocks {
            for p in block.valid.points() {
                let row = block.region.offset(&p);
                for c in comp..comp + n {
                    block.data[(row, c)] *= factor;
                }
            }
        }
        Ok(())
    }

    /// Replaces components `comp..comp + n` on the valid region by `numerator / value`.
    pub fn invert(&mut self, numerator: f64, comp: usize, n: usize) -> Result<(), FieldError> {
        self.check_comps(comp, n)?;
        for (grid, block) in self.blocks.iter_mut().enumerate() {
            for p in block.valid.points() {
                let row = block.region.offset(&p);
                for c in comp..comp + n {
                    let v = block.data[(row, c)];
                    if v == 0.0 {
                        return Err(FieldError::ZeroInversion { grid });
                    }
                    block.data[(row, c)] = numerator / v;
                }
            }
        }
        Ok(())
    }

    /// Copies the valid region of `src` into this field. Both must share
    /// boxes and centering; `src` supplies the leading components.
    pub fn copy_from(&mut self, src: &MultiField<D>) -> Result<(), FieldError> {
        if src.boxes != self.boxes || src.centering != self.centering {
            return Err(FieldError::LayoutMismatch(format!(
                "{} grids ({:?}) vs {} grids ({:?})",
                src.num_grids(),
                src.centering,
                self.num_grids(),
                self.centering
            )));
        }
        self.check_comps(0, src.ncomp)?;
        for (dst, from) in self.blocks.iter_mut().zip(&src.blocks) {
            for p in dst.valid.points() {
                let (r_dst, r_src) = (dst.region.offset(&p), from.region.offset(&p));
                for c in 0..src.ncomp {
                    dst.data[(r_dst, c)] = from.data[(r_src, c)];
                }
            }
        }
        Ok(())
    }

    pub fn set(&mut self, grid: usize, p: &IntVect<D>, comp: usize, value: f64) -> Result<(), FieldError> {
        self.check_comps(comp, 1)?;
        self.checked_block(grid, p)?;
        self.blocks[grid].set(p, comp, value);
        Ok(())
    }

    fn checked_block(&self, grid: usize, p: &IntVect<D>) -> Result<&FieldBlock<D>, FieldError> {
        match self.blocks.get(grid) {
            Some(block) if block.region.contains(p) => Ok(block),
            _ => Err(FieldError::PointOutsideGrid { level: 0, grid, point: fmt_int_vect(p) }),
        }
    }

    /// Max-norm of one component over the valid regions.
    pub fn norm_inf(&self, comp: usize) -> f64 {
        self.blocks
            .iter()
            .flat_map(|block| block.valid.points().map(move |p| block.get(&p, comp).abs()))
            .fold(0.0, f64::max)
    }

    pub fn nbytes(&self) -> usize {
        self.blocks.iter().map(|b| b.data.len() * std::mem::size_of::<f64>()).sum()
    }
}

#[cfg(test)]
impl<const D: usize> MultiField<D> {
    pub fn centering(&self) -> Centering {
        self.centering
    }

    pub fn get(&self, grid: usize, p: &IntVect<D>, comp: usize) -> Result<f64, FieldError> {
        let block = self.checked_block(grid, p)?;
        self.check_comps(comp, 1)?;
        Ok(block.get(p, comp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::index_box::int_vect;
    use approx::assert_relative_eq;

    fn two_grids() -> BoxArray<2> {
        BoxArray::new(vec![
            IndexBox::new(int_vect([0, 0]), int_vect([3, 3])).unwrap(),
            IndexBox::new(int_vect([4, 0]), int_vect([7, 1])).unwrap(),
        ])
    }

    #[test]
    fn test_allocation_shapes() {
        let cells = MultiField::new(&two_grids(), Centering::Cell, 3, 0);
        assert_eq!(cells.block(0).data.nrows(), 16);
        assert_eq!(cells.block(0).data.ncols(), 3);

        let nodes = MultiField::new(&two_grids(), Centering::Node, 1, 1);
        // 5x5 nodes grown by one layer
        assert_eq!(nodes.block(0).data.nrows(), 49);
        assert_eq!(nodes.block(1).valid.num_pts(), 15);
    }

    #[test]
    fn test_set_val_comps_and_mult() {
        let mut f = MultiField::new(&two_grids(), Centering::Cell, 3, 0);
        f.set_val(1.0);
        f.set_val_comps(0.0, 2, 1).unwrap();
        f.mult(4.0, 0, 1).unwrap();
        let p = int_vect([5, 1]);
        assert_relative_eq!(f.get(1, &p, 0).unwrap(), 4.0);
        assert_relative_eq!(f.get(1, &p, 1).unwrap(), 1.0);
        assert_relative_eq!(f.get(1, &p, 2).unwrap(), 0.0);
        assert!(f.mult(2.0, 2, 2).is_err());
    }

    #[test]
    fn test_invert_and_copy() {
        let boxes = two_grids();
        let mut density = MultiField::new(&boxes, Centering::Cell, 1, 0);
        density.set_val(4.0);
        density.set(0, &int_vect([1, 1]), 0, 0.5).unwrap();

        let mut rhoinv = MultiField::new(&boxes, Centering::Cell, 1, 0);
        rhoinv.copy_from(&density).unwrap();
        rhoinv.invert(1.0, 0, 1).unwrap();
        assert_relative_eq!(rhoinv.get(0, &int_vect([1, 1]), 0).unwrap(), 2.0);
        assert_relative_eq!(rhoinv.get(1, &int_vect([7, 1]), 0).unwrap(), 0.25);

        let mut zero = MultiField::new(&boxes, Centering::Cell, 1, 0);
        assert_eq!(zero.invert(1.0, 0, 1), Err(FieldError::ZeroInversion { grid: 0 }));
    }

    #[test]
    fn test_copy_layout_mismatch() {
        let src = MultiField::new(&two_grids(), Centering::Node, 1, 0);
        let mut dst = MultiField::new(&two_grids(), Centering::Cell, 1, 0);
        assert!(matches!(dst.copy_from(&src), Err(FieldError::LayoutMismatch(_))));
    }

    #[test]
    fn test_get_outside_grid() {
        let f = MultiField::new(&two_grids(), Centering::Cell, 1, 1);
        assert!(f.get(0, &int_vect([-1, -1]), 0).is_ok());
        assert!(f.get(0, &int_vect([-2, 0]), 0).is_err());
        assert!(f.get(5, &int_vect([0, 0]), 0).is_err());
    }

    #[test]
    fn test_norm_ignores_ghosts() {
        let mut f = MultiField::new(&two_grids(), Centering::Cell, 1, 1);
        f.set(0, &int_vect([-1, 0]), 0, 100.0).unwrap();
        f.set(1, &int_vect([6, 1]), 0, -3.0).unwrap();
        assert_relative_eq!(f.norm_inf(0), 3.0);
    }
}
