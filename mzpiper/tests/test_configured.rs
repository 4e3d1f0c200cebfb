use std::fs;
use std::path::PathBuf;

use figment::{
    providers::{Format, Toml},
    Figment,
};

use mzpiper::{MZPiper, OutputLayout};

#[test_log::test]
#[test_log(default_log_filter = "debug")]
fn test_configured_scenario() {
    let mut config = Figment::new();
    config = config.merge(Toml::file_exact("tests/data/scenario.toml"));
    let mut driver: MZPiper = config.extract().unwrap();
    assert_eq!(driver.k, 1);
    assert!(!driver.skip_weights);
    assert_eq!(driver.layout, OutputLayout::Long);
    assert!(driver.group_file.is_none());

    let outpath = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join("configured_scenario.tsv");
    driver.output_file = outpath.clone();
    driver.main().unwrap();

    let text = fs::read_to_string(&outpath).unwrap();
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(
        lines,
        [
            "Raw file\tPeptideID\tIntensity\tWeight",
            "A\t_PEPTIDEK_2\t100\t1",
            "B\t_PEPTIDEK_2\t90\t1",
        ]
    );
}

#[test_log::test]
fn test_configured_defaults() {
    let config = Figment::new().merge(Toml::string(r#"input_dir = "tests/data/scenario""#));
    let driver: MZPiper = config.extract().unwrap();
    assert_eq!(driver.k, 10);
    assert_eq!(driver.thresh, 0.0);
    assert!(driver.skip_weights);
    assert!(!driver.tims_ms);
    assert_eq!(driver.output_file, PathBuf::from("-"));
}

#[test_log::test]
fn test_configured_gzip_wide() {
    let config = Figment::new()
        .merge(Toml::file_exact("tests/data/scenario.toml"))
        .merge(Toml::string("layout = \"wide\"\nk = 2"));
    let mut driver: MZPiper = config.extract().unwrap();
    let outpath = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join("configured_scenario.tsv.gz");
    driver.output_file = outpath.clone();
    driver.main().unwrap();

    let handle = fs::File::open(&outpath).unwrap();
    let mut reader = flate2::read::GzDecoder::new(handle);
    let mut text = String::new();
    std::io::Read::read_to_string(&mut reader, &mut text).unwrap();
    assert_eq!(text, "PeptideID\tA\tB\n_PEPTIDEK_2\t100\t90\n");
}
