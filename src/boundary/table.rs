use std::fmt;
use std::str::FromStr;
use crate::error::ConfigError;

/// Physical boundary type of one domain face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegType {
    RefWall,
    Inflow,
    Outflow,
    Periodic,
}

impl FromStr for RegType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "refWall" | "refwall" | "wall" => Ok(RegType::RefWall),
            "inflow" => Ok(RegType::Inflow),
            "outflow" => Ok(RegType::Outflow),
            "periodic" => Ok(RegType::Periodic),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for RegType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegType::RefWall => "refWall",
            RegType::Inflow => "inflow",
            RegType::Outflow => "outflow",
            RegType::Periodic => "periodic",
        };
        f.write_str(name)
    }
}

/// Low and high side of one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceBoundary(pub RegType, pub RegType);

impl FaceBoundary {
    pub fn side(&self, high: bool) -> RegType {
        if high { self.1 } else { self.0 }
    }
}

/// Resolved `bcall` / `bc{axis}{side}` settings for up to three axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryConfig {
    faces: [FaceBoundary; 3],
}

fn parse_named(key: &str, value: &str) -> Result<RegType, ConfigError> {
    value.parse().map_err(|value| ConfigError::UnknownBoundary { key: key.to_string(), value })
}

impl BoundaryConfig {
    /// `overrides[axis][side]` replaces the `all` value for that face.
    pub fn resolve(all: &str, overrides: [[Option<&str>; 2]; 3]) -> Result<Self, ConfigError> {
        let fallback = parse_named("bcall", all)?;
        let mut faces = [FaceBoundary(fallback, fallback); 3];
        for (axis, sides) in overrides.iter().enumerate() {
            let mut resolved = [fallback; 2];
            for (side, name) in sides.iter().enumerate() {
                if let Some(name) = name {
                    resolved[side] = parse_named(&format!("bc{}{}", axis, side), name)?;
                }
            }
            faces[axis] = FaceBoundary(resolved[0], resolved[1]);
        }
        Ok(Self { faces })
    }

    #[cfg(test)]
    pub fn uniform(reg: RegType) -> Self {
        Self { faces: [FaceBoundary(reg, reg); 3] }
    }

    /// Table for the first `D` axes.
    pub fn table<const D: usize>(&self) -> BoundaryTable<D> {
        BoundaryTable { faces: std::array::from_fn(|axis| self.faces[axis]) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryTable<const D: usize> {
    pub faces: [FaceBoundary; D],
}

impl<const D: usize> BoundaryTable<D> {
    pub fn get(&self, axis: usize, high: bool) -> RegType {
        self.faces[axis].side(high)
    }
}
