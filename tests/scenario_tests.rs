//! Integration tests for the built-in lpjml_magpie scenario.
//!
//! Each test resolves the embedded template under one flag combination and
//! checks the run-control and output sections of the resulting manifest.

use simconf::engine::{Engine, Resolution, ResolutionFailure};
use simconf::error::ErrorCode;
use simconf::manifest::ResolvedValue;
use simconf::scenario;
use simconf::validator::Rule;

fn resolve(flags: &[&str]) -> Result<Resolution, ResolutionFailure> {
    let document = scenario::lpjml_magpie().expect("embedded scenario parses");
    let mut builder = document.flag_builder();
    for raw in flags {
        builder = builder.assign(raw).expect("valid assignment");
    }
    let flags = builder.build().expect("valid flag set");
    Engine::default().resolve_document(&document, &flags, None)
}

fn text<'a>(resolution: &'a Resolution, key: &str) -> &'a str {
    resolution
        .manifest
        .get(key)
        .and_then(ResolvedValue::as_text)
        .unwrap_or_else(|| panic!("{} is not text", key))
}

#[test]
fn test_cru4_spinup_run() {
    let res = resolve(&["climate=CRU4"]).expect("CRU4 spinup resolves");
    let run = res.manifest.run();

    assert_eq!(run.nspinup, 7000);
    assert_eq!(run.firstyear, 1901);
    assert_eq!(run.lastyear, 1901);
    assert!(!run.restart);
    assert!(run.write_restart);
    assert!(res.manifest.outputs().is_empty());
    assert_eq!(text(&res, "radiation"), "CLOUDINESS");
    assert!(
        text(&res, "write_restart_filename").ends_with("CRU_4/restart_1901_nv_stdfire.lpj")
    );
    assert!(res.warnings.is_empty());
}

#[test]
fn test_cru4_restart_run() {
    let res = resolve(&["climate=CRU4", "FROM_RESTART"]).expect("CRU4 restart resolves");
    let run = res.manifest.run();

    assert_eq!(run.nspinup, 390);
    assert_eq!((run.firstyear, run.lastyear), (1901, 2018));
    assert!(res.manifest.is_restart());
    assert_eq!(run.restart_year, Some(1900));
    assert_eq!(res.manifest.outputs().len(), 20);
    assert_eq!(res.manifest.get("landuse").and_then(|v| v.as_text()), Some("ALL_CROPS"));
}

#[test]
fn test_climate_selects_exactly_one_radiation_branch() {
    let cru = resolve(&["climate=CRU4"]).unwrap();
    let gcm = resolve(&["climate=HADGEM", "pathway=RCP8p5"]).unwrap();

    assert_eq!(text(&cru, "radiation"), "CLOUDINESS");
    assert_eq!(text(&gcm, "radiation"), "RADIATION");
    for res in [&cru, &gcm] {
        let count = res
            .manifest
            .entries()
            .iter()
            .filter(|e| e.key == "radiation")
            .count();
        assert_eq!(count, 1);
    }
}

#[test]
fn test_noco2_implies_restart_and_subdirectory() {
    let res = resolve(&["climate=CRU4", "NOCO2"]).expect("NOCO2 resolves");

    assert!(res.manifest.is_restart());
    assert_eq!(res.manifest.outputs().len(), 20);
    let dir = res.manifest.output_dir().expect("output dir");
    assert!(dir.ends_with("CRU_4/noco2"), "unexpected dir {}", dir);
    assert!(text(&res, "restart_filename").ends_with("noco2/../restart_1901_nv_stdfire.lpj"));
}

#[test]
fn test_output_paths_follow_output_macro() {
    let res = resolve(&["climate=CRU4", "NOCO2"]).unwrap();
    let dir = res.manifest.output_dir().unwrap().to_string();

    let grid = &res.manifest.outputs()[0];
    assert_eq!(grid.id, "GRID");
    assert_eq!(grid.path, format!("{}/grid.bin", dir));
    assert!(res.manifest.outputs().iter().all(|o| o.path.starts_with(&dir)));
}

#[test]
fn test_gridbased_suffix() {
    let pft = resolve(&["climate=CRU4", "FROM_RESTART"]).unwrap();
    let grid = resolve(&["climate=CRU4", "FROM_RESTART", "WITH_GRIDBASED"]).unwrap();

    let harvest = |res: &Resolution| {
        res.manifest
            .outputs()
            .iter()
            .find(|o| o.id == "PFT_HARVESTC")
            .map(|o| o.path.clone())
            .unwrap()
    };
    assert!(harvest(&pft).ends_with("pft_harvest.pft.bin"));
    assert!(harvest(&grid).ends_with("pft_harvest.grid.bin"));
    assert_eq!(text(&grid, "pft_output_scaled"), "GRIDBASED");
}

#[test]
fn test_duplicate_outputs_are_warnings() {
    let res = resolve(&["climate=CRU4", "FROM_RESTART"]).unwrap();
    let duplicates: Vec<_> = res
        .warnings
        .iter()
        .filter(|w| w.rule == Rule::DuplicateOutput)
        .collect();

    assert_eq!(duplicates.len(), 4);
    assert!(duplicates.iter().any(|w| w.message.contains("CFT_TRANSP_B")));
    assert!(duplicates.iter().all(|w| w.fields.len() == 2));
}

#[test]
fn test_gcm_pathway_directory() {
    let res = resolve(&["climate=HADGEM", "pathway=RCP6p0"]).unwrap();
    assert!(res.manifest.output_dir().unwrap().ends_with("HadGEM2-ES/rcp6p0_autofert"));
    assert_eq!((res.manifest.firstyear(), res.manifest.lastyear()), (1951, 1951));

    let noco2 = resolve(&["climate=HADGEM", "pathway=RCP6p0", "NOCO2"]).unwrap();
    assert!(noco2.manifest.output_dir().unwrap().ends_with("HadGEM2-ES/rcp6p0/noco2"));
    assert_eq!(noco2.manifest.lastyear(), 2099);
}

#[test]
fn test_checkpoint_file() {
    let res = resolve(&["climate=CRU4", "FROM_RESTART", "CHECKPOINT"]).unwrap();
    assert_eq!(
        res.manifest.run().checkpoint_filename.as_deref(),
        Some("restart/restart_checkpoint.lpj")
    );
    assert!(resolve(&["climate=CRU4"]).unwrap().manifest.run().checkpoint_filename.is_none());
}

#[test]
fn test_missing_climate_fails_on_output_macro() {
    let failure = resolve(&[]).expect_err("no climate selected");
    assert_eq!(failure.errors.len(), 1);
    assert_eq!(failure.errors[0].code(), ErrorCode::UndefinedMacro);
}

#[test]
fn test_gcm_without_pathway_fails() {
    let failure = resolve(&["climate=IPSL"]).expect_err("no pathway selected");
    assert_eq!(failure.errors[0].code(), ErrorCode::UndefinedMacro);
}

#[test]
fn test_resolution_is_deterministic() {
    let flags = ["climate=MIROC", "pathway=RCP2p6", "FROM_RESTART", "WITH_GRIDBASED"];
    let first = resolve(&flags).unwrap();
    let second = resolve(&flags).unwrap();

    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first.manifest).unwrap(),
        serde_json::to_string(&second.manifest).unwrap()
    );
}

#[test]
fn test_manifest_document_key_order() {
    let res = resolve(&["climate=CRU4"]).unwrap();
    let document = res.manifest.to_document();
    let keys: Vec<&String> = document.as_object().unwrap().keys().collect();

    assert_eq!(keys[0], "sim_name");
    let pftpar = keys.iter().position(|k| *k == "pftpar").unwrap();
    let input = keys.iter().position(|k| *k == "input").unwrap();
    let nspinup = keys.iter().position(|k| *k == "nspinup").unwrap();
    assert!(pftpar < input && input < nspinup);
}
