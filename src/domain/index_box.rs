use nalgebra::SVector;
use crate::error::FieldError;

/// Integer index vector in `D` dimensions.
pub type IntVect<const D: usize> = SVector<i64, D>;

#[cfg(test)]
pub fn int_vect<const D: usize>(values: [i64; D]) -> IntVect<D> {
    IntVect::<D>::from(values)
}

pub fn fmt_int_vect<const D: usize>(v: &IntVect<D>) -> String {
    format!("{:?}", v.as_slice())
}

/// Rectangular region of index space, `lo` and `hi` both inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexBox<const D: usize> {
    pub lo: IntVect<D>,
    pub hi: IntVect<D>,
}

impl<const D: usize> IndexBox<D> {
    pub fn new(lo: IntVect<D>, hi: IntVect<D>) -> Result<Self, FieldError> {
        if (0..D).any(|d| hi[d] < lo[d]) {
            return Err(FieldError::InvalidBox(format!(
                "hi {} below lo {}",
                fmt_int_vect(&hi),
                fmt_int_vect(&lo)
            )));
        }
        Ok(Self { lo, hi })
    }

    pub fn length(&self, axis: usize) -> i64 {
        self.hi[axis] - self.lo[axis] + 1
    }

    pub fn num_pts(&self) -> u64 {
        (0..D).map(|d| self.length(d) as u64).product()
    }

    pub fn contains(&self, p: &IntVect<D>) -> bool {
        (0..D).all(|d| p[d] >= self.lo[d] && p[d] <= self.hi[d])
    }

    pub fn contains_box(&self, other: &IndexBox<D>) -> bool {
        self.contains(&other.lo) && self.contains(&other.hi)
    }

    pub fn intersects(&self, other: &IndexBox<D>) -> bool {
        (0..D).all(|d| self.lo[d] <= other.hi[d] && other.lo[d] <= self.hi[d])
    }

    pub fn grow(&self, n: i64) -> Self {
        let shift = IntVect::<D>::repeat(n);
        Self { lo: self.lo - shift, hi: self.hi + shift }
    }

    /// Cell-centered refinement: every cell becomes `ratio` cells per axis.
    pub fn refine(&self, ratio: &IntVect<D>) -> Self {
        let one = IntVect::<D>::repeat(1);
        Self {
            lo: self.lo.component_mul(ratio),
            hi: (self.hi + one).component_mul(ratio) - one,
        }
    }

    /// Node-centered image: the corners of every cell.
    pub fn nodes(&self) -> Self {
        Self { lo: self.lo, hi: self.hi + IntVect::<D>::repeat(1) }
    }

    /// Column-major offset of `p`, axis 0 fastest.
    pub fn offset(&self, p: &IntVect<D>) -> usize {
        let mut offset = 0i64;
        let mut stride = 1i64;
        for d in 0..D {
            offset += (p[d] - self.lo[d]) * stride;
            stride *= self.length(d);
        }
        offset as usize
    }

    pub fn points(&self) -> BoxPoints<D> {
        BoxPoints { bx: *self, next: Some(self.lo) }
    }
}

/// Column-major walk over every point of a box.
pub struct BoxPoints<const D: usize> {
    bx: IndexBox<D>,
    next: Option<IntVect<D>>,
}

impl<const D: usize> Iterator for BoxPoints<D> {
    type Item = IntVect<D>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        let mut p = current;
        let mut advanced = false;
        for d in 0..D {
            if p[d] < self.bx.hi[d] {
                p[d] += 1;
                advanced = true;
                break;
            }
            p[d] = self.bx.lo[d];
        }
        self.next = if advanced { Some(p) } else { None };
        Some(current)
    }
}

/// Ordered collection of boxes making up one level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxArray<const D: usize> {
    boxes: Vec<IndexBox<D>>,
}

impl<const D: usize> BoxArray<D> {
    pub fn new(boxes: Vec<IndexBox<D>>) -> Self {
        Self { boxes }
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&IndexBox<D>> {
        self.boxes.get(i)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, IndexBox<D>> {
        self.boxes.iter()
    }

    pub fn num_pts(&self) -> u64 {
        self.boxes.iter().map(IndexBox::num_pts).sum()
    }

    /// Smallest box enclosing every box of the array.
    pub fn minimal_box(&self) -> Option<IndexBox<D>> {
        let first = self.boxes.first()?;
        Some(self.boxes.iter().skip(1).fold(*first, |acc, b| IndexBox {
            lo: IntVect::<D>::from_fn(|d, _| acc.lo[d].min(b.lo[d])),
            hi: IntVect::<D>::from_fn(|d, _| acc.hi[d].max(b.hi[d])),
        }))
    }

    pub fn is_disjoint(&self) -> bool {
        self.boxes.iter().enumerate().all(|(i, a)| {
            self.boxes[i + 1..].iter().all(|b| !a.intersects(b))
        })
    }
}
