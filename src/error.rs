use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("stencil must be cross, terrain, or full (got {0:?})")]
    UnknownStencil(String),

    #[error("stencil must be given: cross, terrain, or full")]
    MissingStencil,

    #[error("unknown boundary type {value:?} for {key}")]
    UnknownBoundary { key: String, value: String },

    #[error("unsupported spatial dimension {0}; only 2 and 3 are built")]
    UnsupportedDimension(usize),

    #[error("denfile needs cross stencil")]
    DensityNeedsCross,

    #[error("can't use denfile and file spec")]
    DensityWithFileList,

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("cannot read inputs: {0}")]
    Inputs(String),
}

#[derive(Error, Debug)]
pub enum HierarchyError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("invalid hierarchy: {0}")]
    Invalid(String),
}

impl HierarchyError {
    /// Open failures only cost the current test case; everything else is fatal.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, HierarchyError::Io { .. })
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    #[error("invalid box: {0}")]
    InvalidBox(String),

    #[error("component range {start}..{end} exceeds {ncomp} components")]
    ComponentRange { start: usize, end: usize, ncomp: usize },

    #[error("field layouts differ: {0}")]
    LayoutMismatch(String),

    #[error("point {point} lies outside grid {grid} on level {level}")]
    PointOutsideGrid { level: usize, grid: usize, point: String },

    #[error("level {level} has no grids to place a probe in")]
    EmptyLevel { level: usize },

    #[error("cannot invert zero value in grid {grid}")]
    ZeroInversion { grid: usize },
}

#[derive(Error, Debug)]
pub enum ProjectionError {
    #[error("invalid level range {lev_min}..={lev_max} for {levels} levels")]
    InvalidRange {
        lev_min: usize,
        lev_max: usize,
        levels: usize,
    },

    #[error("sparse solve failed on level {level}, grid {grid}: {reason}")]
    SparseSolve {
        level: usize,
        grid: usize,
        reason: String,
    },

    #[error("projector setup does not match its hierarchy: {0}")]
    Setup(String),

    #[error("field error: {0}")]
    Field(#[from] FieldError),
}

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("hierarchy error: {0}")]
    Hierarchy(#[from] HierarchyError),

    #[error("field error: {0}")]
    Field(#[from] FieldError),

    #[error("projection error: {0}")]
    Projection(#[from] ProjectionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
