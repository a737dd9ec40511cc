//! Runs every requested test case: load, build, initialize, project, report.

use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn};
use crate::coefficients::CoefficientFieldBuilder;
use crate::config::{CaseInput, CoordSys, RunConfig, StencilKind};
use crate::domain::{LevelHierarchy, MultiField};
use crate::error::{DriverError, FieldError, HierarchyError, ProjectionError};
use crate::io::{read_field_snapshot, read_hierarchy};
use crate::orchestrator::{ProjectionOrchestrator, SolvePlan};
use crate::report::{CaseReport, CellCounts, PerformanceReporter, RunReport};
use crate::solver::{EllipticProjector, LevelFields, ProjectorSetup};

/// Runs all cases of `config`, building one projector per case with
/// `factory`. Cases whose input cannot be opened are skipped.
pub fn run<const D: usize, P, F>(config: &RunConfig, mut factory: F) -> Result<RunReport, DriverError>
where
    P: EllipticProjector<D>,
    F: FnMut(&ProjectorSetup<'_, D>) -> Result<P, ProjectionError>,
{
    let mut report = RunReport::default();
    match &config.input {
        CaseInput::Density(path) => {
            info!("density file is {}", path.display());
            let loaded = read_field_snapshot::<D>(path).and_then(|density| {
                let hierarchy = LevelHierarchy::single_level(density.boxes().clone())?;
                Ok((hierarchy, density))
            });
            if let Some((hierarchy, density)) = skip_unreadable(path, loaded)? {
                run_case(config, path, &hierarchy, Some(&density), &mut factory, &mut report)?;
            }
        }
        CaseInput::Files(paths) => {
            if paths.is_empty() {
                warn!("no hierarchy files given; nothing to do");
            }
            for (k, path) in paths.iter().enumerate() {
                info!("file {} is {}", k, path.display());
                if let Some(hierarchy) = skip_unreadable(path, read_hierarchy::<D>(path))? {
                    run_case(config, path, &hierarchy, None, &mut factory, &mut report)?;
                }
            }
        }
    }
    // Single process: every worker's storage is already visible here.
    info!("peak field storage: {} bytes", report.peak_field_bytes);
    Ok(report)
}

fn skip_unreadable<T>(path: &Path, loaded: Result<T, HierarchyError>) -> Result<Option<T>, DriverError> {
    match loaded {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_recoverable() => {
            warn!("skipping {}: {}", path.display(), e);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn log_norms<const D: usize>(name: &str, fields: &[MultiField<D>]) {
    for (level, field) in fields.iter().enumerate() {
        for comp in 0..field.ncomp() {
            debug!(level, comp, norm = field.norm_inf(comp), "{} norm", name);
        }
    }
}

fn run_case<const D: usize, P, F>(
    config: &RunConfig,
    source: &Path,
    hierarchy: &LevelHierarchy<D>,
    density: Option<&MultiField<D>>,
    factory: &mut F,
    report: &mut RunReport,
) -> Result<(), DriverError>
where
    P: EllipticProjector<D>,
    F: FnMut(&ProjectorSetup<'_, D>) -> Result<P, ProjectionError>,
{
    let _span = info_span!("test_case", source = %source.display()).entered();
    let mut fields = LevelFields::allocate(hierarchy);
    let orchestrator = ProjectionOrchestrator::new(config, hierarchy);
    match orchestrator.initializer().apply(&mut fields, hierarchy) {
        Ok(()) => {}
        // grid too small to hold the probe
        Err(e @ FieldError::PointOutsideGrid { .. }) => {
            warn!("skipping {}: {}", source.display(), e);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }
    let coefficients = CoefficientFieldBuilder::new(config.stencil, config.coord_sys).build(hierarchy, density)?;
    log_norms("rhoinv", &coefficients);
    log_norms("pressure", &fields.pressure);
    log_norms("velocity", &fields.velocity);

    let cells = CellCounts::of(hierarchy);
    cells.log();

    let setup = ProjectorSetup::new(hierarchy, config.boundary.table::<D>(), config.stencil, config.pcode);
    let start = Instant::now();
    let mut projector = factory(&setup)?;
    let setup_time: Duration = start.elapsed();
    if config.coord_sys == CoordSys::Rz && config.stencil == StencilKind::Cross && D == 2 {
        projector.set_coord_sys(CoordSys::Rz);
    }

    let plan = SolvePlan::for_levels(hierarchy.num_levels(), config.nrep);
    let timings = orchestrator.execute(&plan, &mut projector, &mut fields, &coefficients)?;

    let bytes = fields.nbytes() + coefficients.iter().map(MultiField::nbytes).sum::<usize>();
    report.peak_field_bytes = report.peak_field_bytes.max(bytes);
    let case: CaseReport = PerformanceReporter::case(source, cells, setup_time, &timings);
    report.cases.push(case);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawConfig;
    use crate::domain::index_box::{int_vect, BoxArray, IndexBox};
    use crate::domain::Centering;
    use crate::error::ConfigError;
    use crate::io::write_field_snapshot;
    use crate::orchestrator::SolveKind;
    use crate::solver::direct::DirectProjector;
    use crate::solver::recording::RecordingProjector;
    use crate::solver::ProjectCall;
    use std::cell::RefCell;
    use std::fs;
    use std::path::PathBuf;
    use std::rc::Rc;
    use tempfile::tempdir;

    const ONE_LEVEL: &str = r#"{
        "levels": [ { "domain": { "lo": [0, 0], "hi": [7, 7] },
                      "boxes": [ { "lo": [0, 0], "hi": [7, 7] } ] } ]
    }"#;

    const TWO_LEVEL: &str = r#"{
        "levels": [
            { "domain": { "lo": [0, 0], "hi": [7, 7] },
              "boxes": [ { "lo": [0, 0], "hi": [7, 7] } ],
              "ratio": [2, 2] },
            { "domain": { "lo": [0, 0], "hi": [15, 15] },
              "boxes": [ { "lo": [4, 4], "hi": [11, 11] } ] }
        ]
    }"#;

    /// Counts factory and solve calls through shared handles.
    #[derive(Default)]
    struct Tally {
        built: usize,
        solves: usize,
        coord_sys: Option<CoordSys>,
        coefficient_max: Vec<f64>,
    }

    struct TallyProjector {
        inner: RecordingProjector<2>,
        tally: Rc<RefCell<Tally>>,
    }

    impl EllipticProjector<2> for TallyProjector {
        fn set_coord_sys(&mut self, coord_sys: CoordSys) {
            self.tally.borrow_mut().coord_sys = Some(coord_sys);
        }

        fn prepare_hierarchy(&mut self) -> Result<(), ProjectionError> {
            self.inner.prepare_hierarchy()
        }

        fn project(
            &mut self,
            fields: &mut LevelFields<2>,
            coefficients: &[MultiField<2>],
            call: &ProjectCall<2>,
        ) -> Result<(), ProjectionError> {
            let mut tally = self.tally.borrow_mut();
            tally.solves += 1;
            tally.coefficient_max = coefficients.iter().map(|c| c.norm_inf(0)).collect();
            self.inner.project(fields, coefficients, call)
        }
    }

    fn tally_factory(
        tally: &Rc<RefCell<Tally>>,
    ) -> impl FnMut(&ProjectorSetup<'_, 2>) -> Result<TallyProjector, ProjectionError> {
        let tally = Rc::clone(tally);
        move |_setup| {
            tally.borrow_mut().built += 1;
            Ok(TallyProjector { inner: RecordingProjector::default(), tally: Rc::clone(&tally) })
        }
    }

    fn raw(stencil: &str) -> RawConfig {
        RawConfig { stencil: Some(stencil.to_string()), ..RawConfig::default() }
    }

    fn configure_and_run(raw: RawConfig, tally: &Rc<RefCell<Tally>>) -> Result<RunReport, DriverError> {
        let config = RunConfig::from_raw(raw)?;
        run::<2, _, _>(&config, tally_factory(tally))
    }

    #[test]
    fn test_density_with_terrain_never_solves() {
        let tally = Rc::new(RefCell::new(Tally::default()));
        let mut r = raw("terrain");
        r.denfile = Some(PathBuf::from("rho.json"));
        let err = configure_and_run(r, &tally).unwrap_err();
        assert!(matches!(err, DriverError::Config(ConfigError::DensityNeedsCross)));
        assert_eq!(tally.borrow().built, 0);
        assert_eq!(tally.borrow().solves, 0);
    }

    #[test]
    fn test_density_with_file_list_never_solves() {
        let tally = Rc::new(RefCell::new(Tally::default()));
        let mut r = raw("cross");
        r.denfile = Some(PathBuf::from("rho.json"));
        r.file = vec![PathBuf::from("grids.json")];
        let err = configure_and_run(r, &tally).unwrap_err();
        assert!(matches!(err, DriverError::Config(ConfigError::DensityWithFileList)));
        assert_eq!(tally.borrow().solves, 0);
    }

    #[test]
    fn test_missing_file_is_skipped() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let good = dir.path().join("one.json");
        fs::write(&good, ONE_LEVEL)?;
        let tally = Rc::new(RefCell::new(Tally::default()));
        let mut r = raw("cross");
        r.file = vec![dir.path().join("missing.json"), good.clone()];
        r.nrep = 3;
        let report = configure_and_run(r, &tally)?;
        assert_eq!(report.cases.len(), 1);
        assert_eq!(report.cases[0].source, good);
        assert_eq!(report.cases[0].cells.total, 64);
        assert_eq!(report.cases[0].phases[0].repeats, 3);
        assert_eq!(tally.borrow().built, 1);
        assert_eq!(tally.borrow().solves, 3);
        assert!(report.peak_field_bytes > 0);
        Ok(())
    }

    #[test]
    fn test_grid_too_small_for_probe_is_skipped() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let tiny = dir.path().join("tiny.json");
        let good = dir.path().join("good.json");
        fs::write(&tiny, ONE_LEVEL.replace("[7, 7]", "[1, 1]"))?;
        fs::write(&good, ONE_LEVEL)?;
        let tally = Rc::new(RefCell::new(Tally::default()));
        let mut r = raw("cross");
        r.file = vec![tiny, good.clone()];
        let report = configure_and_run(r, &tally)?;
        assert_eq!(report.cases.len(), 1);
        assert_eq!(report.cases[0].source, good);
        assert_eq!(tally.borrow().built, 1);
        assert_eq!(tally.borrow().solves, 1);
        Ok(())
    }

    #[test]
    fn test_malformed_file_is_fatal() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let bad = dir.path().join("bad.json");
        fs::write(&bad, "{ \"levels\": 3 }")?;
        let tally = Rc::new(RefCell::new(Tally::default()));
        let mut r = raw("cross");
        r.file = vec![bad];
        assert!(matches!(configure_and_run(r, &tally), Err(DriverError::Hierarchy(HierarchyError::Parse { .. }))));
        assert_eq!(tally.borrow().solves, 0);
        Ok(())
    }

    #[test]
    fn test_density_snapshot_inverted() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("rho.json");
        let boxes = BoxArray::new(vec![
            IndexBox::new(int_vect([0, 0]), int_vect([7, 3]))?,
            IndexBox::new(int_vect([0, 4]), int_vect([7, 7]))?,
        ]);
        let mut rho = MultiField::new(&boxes, Centering::Cell, 1, 0);
        rho.set_val(4.0);
        write_field_snapshot(&path, &rho)?;

        let tally = Rc::new(RefCell::new(Tally::default()));
        let mut r = raw("cross");
        r.denfile = Some(path);
        let report = configure_and_run(r, &tally)?;
        assert_eq!(report.cases[0].cells.per_level, vec![64]);
        assert_eq!(tally.borrow().coefficient_max, vec![0.25]);
        Ok(())
    }

    #[test]
    fn test_rz_tells_projector() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("one.json");
        fs::write(&path, ONE_LEVEL)?;
        let tally = Rc::new(RefCell::new(Tally::default()));
        let mut r = raw("cross");
        r.file = vec![path];
        r.coordsys = 1;
        configure_and_run(r, &tally)?;
        assert_eq!(tally.borrow().coord_sys, Some(CoordSys::Rz));
        Ok(())
    }

    #[test]
    fn test_direct_projector_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let one = dir.path().join("one.json");
        let two = dir.path().join("two.json");
        fs::write(&one, ONE_LEVEL)?;
        fs::write(&two, TWO_LEVEL)?;
        let mut r = raw("full");
        r.file = vec![one, two];
        r.nrep = 2;
        r.bcall = "outflow".to_string();
        let config = RunConfig::from_raw(r)?;
        let report = run::<2, _, _>(&config, DirectProjector::<2>::construct)?;
        assert_eq!(report.cases.len(), 2);
        assert_eq!(report.cases[1].cells.total, 64 + 64);
        let kinds: Vec<_> = report.cases[1].phases.iter().map(|p| (p.kind, p.repeats)).collect();
        assert_eq!(kinds, vec![(SolveKind::Level, 1), (SolveKind::Sync, 2)]);
        Ok(())
    }
}
