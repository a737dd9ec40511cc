use crate::domain::index_box::{fmt_int_vect, BoxArray, IndexBox, IntVect};
use crate::error::HierarchyError;

/// Levels ordered coarsest to finest.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelHierarchy<const D: usize> {
    levels: Vec<BoxArray<D>>,
    ratios: Vec<IntVect<D>>,
    domains: Vec<IndexBox<D>>,
}

impl<const D: usize> LevelHierarchy<D> {
    pub fn new(
        levels: Vec<BoxArray<D>>,
        ratios: Vec<IntVect<D>>,
        domains: Vec<IndexBox<D>>,
    ) -> Result<Self, HierarchyError> {
        if levels.is_empty() {
            return Err(HierarchyError::Invalid("hierarchy has no levels".to_string()));
        }
        if domains.len() != levels.len() {
            return Err(HierarchyError::Invalid(format!(
                "{} domains for {} levels",
                domains.len(),
                levels.len()
            )));
        }
        if ratios.len() != levels.len() - 1 {
            return Err(HierarchyError::Invalid(format!(
                "{} refinement ratios for {} levels",
                ratios.len(),
                levels.len()
            )));
        }
        for (l, ratio) in ratios.iter().enumerate() {
            if ratio.iter().any(|&r| r <= 0) {
                return Err(HierarchyError::Invalid(format!(
                    "ratio {} from level {} is not strictly positive",
                    fmt_int_vect(ratio),
                    l
                )));
            }
        }
        for (l, (boxes, domain)) in levels.iter().zip(&domains).enumerate() {
            if boxes.is_empty() {
                return Err(HierarchyError::Invalid(format!("level {} has no boxes", l)));
            }
            if !boxes.is_disjoint() {
                return Err(HierarchyError::Invalid(format!("boxes on level {} overlap", l)));
            }
            if let Some(outside) = boxes.iter().find(|b| !domain.contains_box(b)) {
                return Err(HierarchyError::Invalid(format!(
                    "box {}..{} on level {} leaves its domain",
                    fmt_int_vect(&outside.lo),
                    fmt_int_vect(&outside.hi),
                    l
                )));
            }
            if l > 0 {
                let image = domains[l - 1].refine(&ratios[l - 1]);
                if !boxes.iter().all(|b| image.contains_box(b)) {
                    return Err(HierarchyError::Invalid(format!(
                        "level {} is not covered by the refined domain of level {}",
                        l,
                        l - 1
                    )));
                }
            }
        }
        Ok(Self { levels, ratios, domains })
    }

    /// A single level whose domain is the minimal box around `boxes`.
    pub fn single_level(boxes: BoxArray<D>) -> Result<Self, HierarchyError> {
        let domain = boxes
            .minimal_box()
            .ok_or_else(|| HierarchyError::Invalid("snapshot has no boxes".to_string()))?;
        Self::new(vec![boxes], Vec::new(), vec![domain])
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn finest_level(&self) -> usize {
        self.levels.len() - 1
    }

    pub fn boxes(&self, level: usize) -> &BoxArray<D> {
        &self.levels[level]
    }

    pub fn levels(&self) -> &[BoxArray<D>] {
        &self.levels
    }

    pub fn ratio(&self, level: usize) -> Option<&IntVect<D>> {
        self.ratios.get(level)
    }

    pub fn domain(&self, level: usize) -> &IndexBox<D> {
        &self.domains[level]
    }

    /// Product of the ratios below `level`; unit on level 0.
    pub fn cumulative_ratio(&self, level: usize) -> IntVect<D> {
        self.ratios[..level]
            .iter()
            .fold(IntVect::<D>::repeat(1), |acc, r| acc.component_mul(r))
    }
}
