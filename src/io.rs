use crate::domain::index_box::{BoxArray, IndexBox, IntVect};
use crate::domain::{Centering, LevelHierarchy, MultiField};
use crate::error::HierarchyError;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;

// --- On-disk layouts ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BoxSpec {
    pub lo: Vec<i64>,
    pub hi: Vec<i64>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct LevelSpec {
    pub domain: BoxSpec,
    pub boxes: Vec<BoxSpec>,
    /// Ratio to the next finer level; absent on the finest.
    #[serde(default)]
    pub ratio: Option<Vec<i64>>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct HierarchyDescription {
    pub levels: Vec<LevelSpec>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct GridValues {
    #[serde(flatten)]
    pub bx: BoxSpec,
    /// Valid-region values, axis 0 fastest, one component after another.
    pub values: Vec<f64>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct FieldSnapshot {
    pub ncomp: usize,
    pub grids: Vec<GridValues>,
}

fn int_vect_from<const D: usize>(values: &[i64], what: &str) -> Result<IntVect<D>, String> {
    if values.len() != D {
        return Err(format!("{} has {} entries, expected {}", what, values.len(), D));
    }
    Ok(IntVect::<D>::from_column_slice(values))
}

impl BoxSpec {
    #[cfg(test)]
    pub fn from_box<const D: usize>(bx: &IndexBox<D>) -> Self {
        Self { lo: bx.lo.iter().copied().collect(), hi: bx.hi.iter().copied().collect() }
    }

    pub fn to_box<const D: usize>(&self) -> Result<IndexBox<D>, String> {
        let lo = int_vect_from::<D>(&self.lo, "box lo")?;
        let hi = int_vect_from::<D>(&self.hi, "box hi")?;
        IndexBox::new(lo, hi).map_err(|e| e.to_string())
    }
}

fn open(path: &Path) -> Result<BufReader<File>, HierarchyError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| HierarchyError::Io { path: path.to_path_buf(), source })
}

fn parse_error(path: &Path, reason: String) -> HierarchyError {
    HierarchyError::Parse { path: path.to_path_buf(), reason }
}

// --- Readers ---

/// Reads a hierarchy description: per level a domain, its boxes and the
/// ratio to the next finer level.
pub fn read_hierarchy<const D: usize>(path: &Path) -> Result<LevelHierarchy<D>, HierarchyError> {
    let reader = open(path)?;
    let description: HierarchyDescription =
        serde_json::from_reader(reader).map_err(|e| parse_error(path, e.to_string()))?;
    let (levels, ratios, domains) =
        unpack_description::<D>(&description).map_err(|reason| parse_error(path, reason))?;
    LevelHierarchy::new(levels, ratios, domains)
}

type Unpacked<const D: usize> = (Vec<BoxArray<D>>, Vec<IntVect<D>>, Vec<IndexBox<D>>);

fn unpack_description<const D: usize>(description: &HierarchyDescription) -> Result<Unpacked<D>, String> {
    let nlev = description.levels.len();
    let mut levels = Vec::with_capacity(nlev);
    let mut ratios = Vec::with_capacity(nlev.saturating_sub(1));
    let mut domains = Vec::with_capacity(nlev);
    for (l, spec) in description.levels.iter().enumerate() {
        domains.push(spec.domain.to_box::<D>()?);
        let boxes = spec
            .boxes
            .iter()
            .map(BoxSpec::to_box::<D>)
            .collect::<Result<Vec<_>, _>>()?;
        levels.push(BoxArray::new(boxes));
        match (&spec.ratio, l + 1 < nlev) {
            (Some(r), true) => ratios.push(int_vect_from::<D>(r, "ratio")?),
            (None, true) => return Err(format!("level {} is missing its refinement ratio", l)),
            (Some(_), false) => return Err(format!("finest level {} must not carry a ratio", l)),
            (None, false) => {}
        }
    }
    Ok((levels, ratios, domains))
}

/// Reads a cell-centered field snapshot without ghost cells.
pub fn read_field_snapshot<const D: usize>(path: &Path) -> Result<MultiField<D>, HierarchyError> {
    let reader = open(path)?;
    let snapshot: FieldSnapshot =
        serde_json::from_reader(reader).map_err(|e| parse_error(path, e.to_string()))?;
    field_from_snapshot(&snapshot).map_err(|reason| parse_error(path, reason))
}

fn field_from_snapshot<const D: usize>(snapshot: &FieldSnapshot) -> Result<MultiField<D>, String> {
    let boxes = snapshot
        .grids
        .iter()
        .map(|g| g.bx.to_box::<D>())
        .collect::<Result<Vec<_>, _>>()?;
    let mut field = MultiField::new(&BoxArray::new(boxes), Centering::Cell, snapshot.ncomp, 0);
    for (grid, values) in snapshot.grids.iter().enumerate() {
        let block = field.block_mut(grid);
        if values.values.len() != block.data.len() {
            return Err(format!(
                "grid {} holds {} values, expected {}",
                grid,
                values.values.len(),
                block.data.len()
            ));
        }
        block.data.as_mut_slice().copy_from_slice(&values.values);
    }
    Ok(field)
}

// --- Writers ---

/// Writes the valid region of a ghost-free cell field as a snapshot.
#[cfg(test)]
pub fn write_field_snapshot<const D: usize>(path: &Path, field: &MultiField<D>) -> io::Result<()> {
    if field.ngrow() != 0 || field.centering() != Centering::Cell {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "snapshots hold ghost-free cell-centered fields only",
        ));
    }
    let grids = (0..field.num_grids())
        .map(|grid| {
            let block = field.block(grid);
            GridValues { bx: BoxSpec::from_box(&block.valid), values: block.data.as_slice().to_vec() }
        })
        .collect();
    write_json(path, &FieldSnapshot { ncomp: field.ncomp(), grids })
}

/// Pretty-prints `value` to `path`, creating parent directories.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    if let Some(parent_dir) = path.parent() {
        if !parent_dir.as_os_str().is_empty() {
            fs::create_dir_all(parent_dir)?;
        }
    }
    let json_string = serde_json::to_string_pretty(value)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("Failed to serialize JSON: {}", e)))?;
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(json_string.as_bytes())?;
    writer.flush()?;
    info!("Wrote {}", path.display());
    Ok(())
}
