use crate::boundary::BoundaryConfig;
use crate::error::ConfigError;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Topology of the discrete elliptic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StencilKind {
    Cross,
    Terrain,
    Full,
}

impl StencilKind {
    /// Components of the coefficient field this stencil consumes.
    pub fn coefficient_components(self, dim: usize) -> usize {
        match self {
            StencilKind::Cross => 1,
            StencilKind::Terrain => 2 * dim - 1,
            StencilKind::Full => dim,
        }
    }
}

impl FromStr for StencilKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cross" => Ok(StencilKind::Cross),
            "terrain" => Ok(StencilKind::Terrain),
            "full" => Ok(StencilKind::Full),
            other => Err(ConfigError::UnknownStencil(other.to_string())),
        }
    }
}

impl fmt::Display for StencilKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StencilKind::Cross => "cross",
            StencilKind::Terrain => "terrain",
            StencilKind::Full => "full",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordSys {
    Cartesian,
    /// Axisymmetric, axis 0 radial.
    Rz,
}

/// Where the test cases come from.
#[derive(Debug, Clone, PartialEq)]
pub enum CaseInput {
    /// One case: a single-level hierarchy taken from a density snapshot.
    Density(PathBuf),
    /// One case per hierarchy description file.
    Files(Vec<PathBuf>),
}

/// Inputs as written by the user, before validation.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RawConfig {
    pub dim: usize,
    pub bcall: String,
    pub bc00: Option<String>,
    pub bc01: Option<String>,
    pub bc10: Option<String>,
    pub bc11: Option<String>,
    pub bc20: Option<String>,
    pub bc21: Option<String>,
    pub stencil: Option<String>,
    pub tol: f64,
    pub nrep: usize,
    pub pcode: i32,
    pub coordsys: i32,
    pub denfile: Option<PathBuf>,
    #[serde(deserialize_with = "one_or_many")]
    pub file: Vec<PathBuf>,
    pub sleep: u64,
    pub report: Option<PathBuf>,
    pub log: String,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            dim: 2,
            bcall: "refWall".to_string(),
            bc00: None,
            bc01: None,
            bc10: None,
            bc11: None,
            bc20: None,
            bc21: None,
            stencil: None,
            tol: 2.0e-10,
            nrep: 1,
            pcode: 4,
            coordsys: 0,
            denfile: None,
            file: Vec::new(),
            sleep: 0,
            report: None,
            log: "info".to_string(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(PathBuf),
    Many(Vec<PathBuf>),
}

/// `"file": "a.json"` and `"file": ["a.json", "b.json"]` are both accepted.
fn one_or_many<'de, De: Deserializer<'de>>(deserializer: De) -> Result<Vec<PathBuf>, De::Error> {
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(path) => vec![path],
        OneOrMany::Many(paths) => paths,
    })
}

/// Parses a `key=value` command-line override. The value is read as JSON
/// when it parses, otherwise kept as a plain string.
pub fn parse_override(arg: &str) -> Result<(String, Value), String> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {:?}", arg))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in {:?}", arg));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

impl RawConfig {
    /// Reads an optional JSON inputs file, then applies the overrides.
    /// Every `file` override adds to one list that replaces the file's own.
    pub fn load(inputs: Option<&Path>, overrides: &[(String, Value)]) -> Result<Self, ConfigError> {
        let mut table = match inputs {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| ConfigError::Inputs(format!("{}: {}", path.display(), e)))?;
                match serde_json::from_str::<Value>(&text) {
                    Ok(Value::Object(map)) => map,
                    Ok(_) => return Err(ConfigError::Inputs(format!("{}: expected a JSON object", path.display()))),
                    Err(e) => return Err(ConfigError::Inputs(format!("{}: {}", path.display(), e))),
                }
            }
            None => Map::new(),
        };
        let mut files = Vec::new();
        for (key, value) in overrides {
            match (key.as_str(), value) {
                ("file", Value::Array(items)) => files.extend(items.iter().cloned()),
                ("file", item) => files.push(item.clone()),
                _ => {
                    table.insert(key.clone(), value.clone());
                }
            }
        }
        if !files.is_empty() {
            table.insert("file".to_string(), Value::Array(files));
        }
        serde_json::from_value(Value::Object(table)).map_err(|e| ConfigError::Inputs(e.to_string()))
    }
}

/// Validated run settings, built once and shared by reference.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub dim: usize,
    pub boundary: BoundaryConfig,
    pub stencil: StencilKind,
    pub tol: f64,
    pub nrep: usize,
    pub pcode: i32,
    pub coord_sys: CoordSys,
    pub input: CaseInput,
    pub sleep: Duration,
    pub report: Option<PathBuf>,
    pub log_level: tracing::Level,
}

fn invalid(key: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue { key: key.to_string(), reason: reason.into() }
}

impl RunConfig {
    pub fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        if raw.dim != 2 && raw.dim != 3 {
            return Err(ConfigError::UnsupportedDimension(raw.dim));
        }
        let boundary = BoundaryConfig::resolve(
            &raw.bcall,
            [
                [raw.bc00.as_deref(), raw.bc01.as_deref()],
                [raw.bc10.as_deref(), raw.bc11.as_deref()],
                [raw.bc20.as_deref(), raw.bc21.as_deref()],
            ],
        )?;
        let stencil: StencilKind = raw.stencil.as_deref().ok_or(ConfigError::MissingStencil)?.parse()?;
        if !(raw.tol.is_finite() && raw.tol > 0.0) {
            return Err(invalid("tol", format!("{} is not a positive tolerance", raw.tol)));
        }
        if raw.nrep == 0 {
            return Err(invalid("nrep", "at least one repetition is needed"));
        }
        let coord_sys = match raw.coordsys {
            0 => CoordSys::Cartesian,
            1 => CoordSys::Rz,
            other => return Err(invalid("coordsys", format!("{} is neither 0 (cartesian) nor 1 (rz)", other))),
        };
        let input = match raw.denfile.filter(|p| !p.as_os_str().is_empty()) {
            Some(_) if stencil != StencilKind::Cross => return Err(ConfigError::DensityNeedsCross),
            Some(_) if !raw.file.is_empty() => return Err(ConfigError::DensityWithFileList),
            Some(path) => CaseInput::Density(path),
            None => CaseInput::Files(raw.file),
        };
        let log_level = raw
            .log
            .parse::<tracing::Level>()
            .map_err(|_| invalid("log", format!("unknown level {:?}", raw.log)))?;
        Ok(Self {
            dim: raw.dim,
            boundary,
            stencil,
            tol: raw.tol,
            nrep: raw.nrep,
            pcode: raw.pcode,
            coord_sys,
            input,
            sleep: Duration::from_secs(raw.sleep),
            report: raw.report,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::RegType;
    use std::fs;
    use tempfile::tempdir;

    fn raw(stencil: &str) -> RawConfig {
        RawConfig { stencil: Some(stencil.to_string()), ..RawConfig::default() }
    }

    #[test]
    fn test_defaults() {
        let cfg = RunConfig::from_raw(raw("cross")).unwrap();
        assert_eq!(cfg.dim, 2);
        assert_eq!(cfg.nrep, 1);
        assert_eq!(cfg.pcode, 4);
        assert_eq!(cfg.tol, 2.0e-10);
        assert_eq!(cfg.coord_sys, CoordSys::Cartesian);
        assert_eq!(cfg.input, CaseInput::Files(vec![]));
        assert_eq!(cfg.boundary, BoundaryConfig::uniform(RegType::RefWall));
    }

    #[test]
    fn test_component_counts() {
        for dim in [2, 3] {
            assert_eq!(StencilKind::Cross.coefficient_components(dim), 1);
            assert_eq!(StencilKind::Terrain.coefficient_components(dim), 2 * dim - 1);
            assert_eq!(StencilKind::Full.coefficient_components(dim), dim);
        }
    }

    #[test]
    fn test_stencil_required_and_checked() {
        assert_eq!(RunConfig::from_raw(RawConfig::default()), Err(ConfigError::MissingStencil));
        assert_eq!(
            RunConfig::from_raw(raw("diagonal")),
            Err(ConfigError::UnknownStencil("diagonal".to_string()))
        );
    }

    #[test]
    fn test_density_needs_cross() {
        let mut r = raw("terrain");
        r.denfile = Some(PathBuf::from("rho.json"));
        assert_eq!(RunConfig::from_raw(r), Err(ConfigError::DensityNeedsCross));
    }

    #[test]
    fn test_density_excludes_file_list() {
        let mut r = raw("cross");
        r.denfile = Some(PathBuf::from("rho.json"));
        r.file = vec![PathBuf::from("grids.json")];
        assert_eq!(RunConfig::from_raw(r), Err(ConfigError::DensityWithFileList));
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut r = raw("full");
        r.dim = 4;
        assert_eq!(RunConfig::from_raw(r), Err(ConfigError::UnsupportedDimension(4)));
        let mut r = raw("full");
        r.nrep = 0;
        assert!(RunConfig::from_raw(r).is_err());
        let mut r = raw("full");
        r.tol = -1.0;
        assert!(RunConfig::from_raw(r).is_err());
        let mut r = raw("full");
        r.coordsys = 7;
        assert!(RunConfig::from_raw(r).is_err());
    }

    #[test]
    fn test_load_with_overrides() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("inputs.json");
        fs::write(&path, r#"{ "stencil": "terrain", "nrep": 2, "file": ["a.json", "b.json"], "bc11": "outflow" }"#)?;
        let overrides = ["nrep=5", "stencil=full", "tol=1e-8"].map(|a| parse_override(a).unwrap());
        let raw = RawConfig::load(Some(&path), &overrides)?;
        assert_eq!(raw.nrep, 5);
        assert_eq!(raw.stencil.as_deref(), Some("full"));
        assert_eq!(raw.tol, 1e-8);
        assert_eq!(raw.file.len(), 2);

        let cfg = RunConfig::from_raw(raw)?;
        assert_eq!(cfg.boundary.table::<2>().get(1, true), RegType::Outflow);
        assert_eq!(cfg.boundary.table::<2>().get(1, false), RegType::RefWall);
        Ok(())
    }

    #[test]
    fn test_load_rejects_unknown_key() {
        let err = RawConfig::load(None, &[parse_override("tolerance=1").unwrap()]).unwrap_err();
        assert!(matches!(err, ConfigError::Inputs(_)));
        assert!(parse_override("novalue").is_err());
        assert!(parse_override("=3").is_err());
    }

    #[test]
    fn test_parse_override_values() {
        assert_eq!(parse_override("nrep=3").unwrap(), ("nrep".to_string(), Value::from(3)));
        assert_eq!(parse_override("bcall=outflow").unwrap(), ("bcall".to_string(), Value::from("outflow")));
        assert_eq!(
            parse_override("file=[\"a.json\"]").unwrap().1,
            Value::Array(vec![Value::from("a.json")])
        );
    }

    #[test]
    fn test_single_file_override() -> Result<(), Box<dyn std::error::Error>> {
        let overrides = ["stencil=cross", "file=grids.json"].map(|a| parse_override(a).unwrap());
        let raw = RawConfig::load(None, &overrides)?;
        assert_eq!(raw.file, vec![PathBuf::from("grids.json")]);
        assert_eq!(RunConfig::from_raw(raw)?.input, CaseInput::Files(vec![PathBuf::from("grids.json")]));
        Ok(())
    }

    #[test]
    fn test_repeated_file_overrides_append() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("inputs.json");
        fs::write(&path, r#"{ "stencil": "cross", "file": "old.json" }"#)?;
        let only_inputs = RawConfig::load(Some(&path), &[])?;
        assert_eq!(only_inputs.file, vec![PathBuf::from("old.json")]);

        let overrides = ["file=a.json", "file=[\"b.json\", \"c.json\"]"].map(|a| parse_override(a).unwrap());
        let raw = RawConfig::load(Some(&path), &overrides)?;
        assert_eq!(raw.file, ["a.json", "b.json", "c.json"].map(PathBuf::from).to_vec());
        Ok(())
    }
}
