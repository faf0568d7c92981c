use std::path::Path;

use revgeo_config::{AppConfig, GridConfig};
use revgeo_frontend::errors::FrontendError;
use revgeo_frontend::pipeline::BuildOptions;
use revgeo_frontend::{run_build, run_query};
use revgeo_io::IoError;

const INPUT: &str = "\
Bavaria\t4\t9.0,47.0\t13.0,47.0\t13.0,50.0\t9.0,50.0
Munich\t8\t11.5,48.0\t11.7,48.0\t11.7,48.2\t11.5,48.2
Speck\t8\t10.0,48.0\t10.001,48.0\t10.001,48.001
this line is not a record
";

/// 中欧 10°x10° 区域，0.01° 一个像素。
fn regional_config() -> AppConfig {
    AppConfig {
        grid: GridConfig {
            x_range: 10.0,
            y_range: 10.0,
            x_shift: -5.0,
            y_shift: 55.0,
            resolution: 0.01,
        },
        ..AppConfig::default()
    }
}

fn build(dir: &Path, image: bool) -> (revgeo_frontend::pipeline::BuildReport, BuildOptions) {
    let input = dir.join("regions.tsv");
    std::fs::write(&input, INPUT).expect("write input");
    let options = BuildOptions {
        input,
        output: dir.join("regions.idx"),
        image: image.then(|| dir.join("regions.png")),
    };
    let report = run_build(&regional_config(), &options).expect("build");
    (report, options)
}

#[test]
fn nested_regions_resolve_to_label_chains() {
    let dir = tempfile::tempdir().expect("temp dir");
    let (report, options) = build(dir.path(), false);

    assert_eq!(report.read.lines, 4);
    assert_eq!(report.read.malformed, 1);
    assert_eq!(report.read.created, 2);
    assert_eq!(report.read.filtered, 1);
    assert_eq!(report.levels.len(), 2);
    assert_eq!(report.levels[0].level, 4);
    assert_eq!(report.levels[1].with_parent, 1);
    assert_eq!(report.summary.width, 1000);
    assert_eq!(report.summary.height, 1000);
    assert_eq!(report.summary.entity_count, 3);

    let points = [(11.6, 48.1), (11.6, 49.5), (14.5, 48.0), (0.0, 0.0)];
    let (answers, entities) = run_query(&options.output, &points).expect("query");
    assert_eq!(entities, 3);
    assert_eq!(answers[0].labels, vec!["Munich", "Bavaria"]);
    assert_eq!(answers[1].labels, vec!["Bavaria"]);
    assert!(answers[2].labels.is_empty());
    assert!(answers[3].labels.is_empty());
    assert_eq!(answers[0].to_string(), " 11.6000  48.1000||Munich||Bavaria");
}

#[test]
fn rebuilding_produces_identical_bytes() {
    let first = tempfile::tempdir().expect("temp dir");
    let second = tempfile::tempdir().expect("temp dir");
    let (_, a) = build(first.path(), false);
    let (_, b) = build(second.path(), false);
    assert_eq!(
        std::fs::read(a.output).expect("first index"),
        std::fs::read(b.output).expect("second index")
    );
}

#[cfg(feature = "visualize")]
#[test]
fn visualization_is_written_next_to_the_index() {
    let dir = tempfile::tempdir().expect("temp dir");
    let (_, options) = build(dir.path(), true);
    let image = options.image.expect("image path");
    assert!(image.metadata().expect("png exists").len() > 0);
}

#[test]
fn grid_that_is_not_a_resolution_multiple_still_resolves_interior_points() {
    let dir = tempfile::tempdir().expect("temp dir");
    let input = dir.path().join("box.tsv");
    std::fs::write(&input, "Box\t4\t9.0,0.5\t9.9,0.5\t9.9,9.5\t9.0,9.5\n").expect("write input");
    let config = AppConfig {
        grid: GridConfig {
            x_range: 10.0,
            y_range: 10.0,
            x_shift: 0.0,
            y_shift: 10.0,
            resolution: 0.3,
        },
        ..AppConfig::default()
    };
    let options = BuildOptions {
        input,
        output: dir.path().join("box.idx"),
        image: None,
    };
    let report = run_build(&config, &options).expect("build");
    assert_eq!(report.summary.width, 33);

    let points = [(9.05, 5.0), (9.45, 5.0), (9.85, 5.0), (8.5, 5.0)];
    let (answers, _) = run_query(&options.output, &points).expect("query");
    assert_eq!(answers[0].labels, vec!["Box"]);
    assert_eq!(answers[1].labels, vec!["Box"]);
    assert_eq!(answers[2].labels, vec!["Box"]);
    assert!(answers[3].labels.is_empty());
}

#[test]
fn missing_input_fails_without_output() {
    let dir = tempfile::tempdir().expect("temp dir");
    let options = BuildOptions {
        input: dir.path().join("absent.tsv"),
        output: dir.path().join("regions.idx"),
        image: None,
    };
    let err = run_build(&regional_config(), &options).unwrap_err();
    assert!(matches!(err, FrontendError::Io(IoError::ReadError { .. })));
    assert!(!options.output.exists());
}

#[test]
fn invalid_config_is_rejected_before_reading() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut config = regional_config();
    config.grid.resolution = 0.0;
    let options = BuildOptions {
        input: dir.path().join("absent.tsv"),
        output: dir.path().join("regions.idx"),
        image: None,
    };
    assert!(matches!(
        run_build(&config, &options),
        Err(FrontendError::Config(_))
    ));
}
