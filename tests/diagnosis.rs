use std::path::{Path, PathBuf};

use assert_approx_eq::assert_approx_eq;
use image::{Rgb, RgbImage};
use retinopathy_rust_lib::image_io::get_fundus_files_in_dir;
use retinopathy_rust_lib::output::write_diagnosis_json;
use retinopathy_rust_lib::{
    AnalysisMode, Analyzer, Config, DiagnosisSource, LearnedModelAdapter, LesionLabel, RetinopathyError,
    SeverityStage,
};

const BACKGROUND: Rgb<u8> = Rgb([128, 128, 128]);

fn save(image: &RgbImage, dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    image.save(&path).unwrap();
    path
}

/// 5 x 4 grid of large black spots on a flat background
fn spotted_fundus() -> RgbImage {
    let mut image = RgbImage::from_pixel(200, 160, BACKGROUND);
    for row in 0..4 {
        for col in 0..5 {
            let (x0, y0) = (col * 40 + 7, row * 40 + 7);
            for y in y0..y0 + 26 {
                for x in x0..x0 + 26 {
                    image.put_pixel(x, y, Rgb([0, 0, 0]));
                }
            }
        }
    }
    image
}

#[test]
fn flat_image_is_graded_healthy_and_overlay_written() {
    let dir = tempfile::tempdir().unwrap();
    let path = save(&RgbImage::from_pixel(90, 70, BACKGROUND), dir.path(), "flat.png");
    let analyzer = Analyzer::new(Config::default()).unwrap();

    let result = analyzer.diagnose(&path).unwrap();
    assert_eq!(result.stage, SeverityStage::NoDR);
    assert_approx_eq!(result.confidence, 0.98);
    assert_eq!(result.source, DiagnosisSource::Heuristic);
    assert!(result.annotations.is_empty());

    let overlay_path = result.segmentation_path.expect("overlay path");
    assert_eq!(overlay_path, dir.path().join("segmented_flat.png"));
    let overlay = image::open(&overlay_path).unwrap();
    assert_eq!((overlay.width(), overlay.height()), (90, 70));
    let dims = result.image_dimensions.unwrap();
    assert_eq!((dims.width, dims.height), (90, 70));
}

#[test]
fn hemorrhage_annotations_are_capped() {
    let dir = tempfile::tempdir().unwrap();
    let path = save(&spotted_fundus(), dir.path(), "spots.png");
    let analyzer = Analyzer::new(Config::default()).unwrap();

    let result = analyzer.diagnose(&path).unwrap();
    let counts = result.lesion_counts.unwrap();
    assert_eq!(counts.hemorrhages, 20);
    assert_eq!(counts.exudates, 0);
    // Few exudates route to Moderate however many hemorrhages there are
    assert_eq!(result.stage, SeverityStage::ModerateNPDR);

    let hemorrhages = result
        .annotations
        .iter()
        .filter(|a| a.label == LesionLabel::Hemorrhage)
        .count();
    assert_eq!(hemorrhages, 15);
    assert_eq!(result.annotations.len(), 15);
    assert!((0.0..=1.0).contains(&result.confidence));
}

#[test]
fn repeated_runs_are_identical() {
    let dir = tempfile::tempdir().unwrap();
    let path = save(&spotted_fundus(), dir.path(), "repeat.png");
    let analyzer = Analyzer::new(Config::default()).unwrap();

    let first = analyzer.diagnose(&path).unwrap();
    let second = analyzer.diagnose(&path).unwrap();
    assert_eq!(first.stage, second.stage);
    assert_eq!(first.confidence, second.confidence);
    assert_eq!(first.annotations, second.annotations);
}

#[test]
fn malformed_weights_never_surface_as_errors() {
    let dir = tempfile::tempdir().unwrap();
    let weights = dir.path().join("dr_model.onnx");
    std::fs::write(&weights, b"this is not an onnx graph").unwrap();
    let path = save(&spotted_fundus(), dir.path(), "eye.png");

    let config = Config {
        weights_path: Some(weights.to_string_lossy().into_owned()),
        ..Config::default()
    };
    let analyzer = Analyzer::new(config).unwrap();

    let result = analyzer.diagnose(&path).unwrap();
    assert_eq!(result.source, DiagnosisSource::Heuristic);
    assert!(SeverityStage::ALL.contains(&result.stage));
    assert!(result.segmentation_path.unwrap().exists());
}

#[test]
fn explicit_disabled_adapter_uses_heuristic() {
    let dir = tempfile::tempdir().unwrap();
    let path = save(&spotted_fundus(), dir.path(), "eye.png");
    let analyzer = Analyzer::with_model(Config::default(), LearnedModelAdapter::disabled()).unwrap();

    assert_eq!(analyzer.diagnose(&path).unwrap().source, DiagnosisSource::Heuristic);
}

#[test]
fn unreadable_input_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corrupt.jpg");
    std::fs::write(&path, b"\xff\xd8 truncated").unwrap();
    let analyzer = Analyzer::new(Config::default()).unwrap();

    assert!(matches!(analyzer.diagnose(&path), Err(RetinopathyError::ImageUnreadable { .. })));
}

#[test]
fn simulation_depends_only_on_name_length() {
    let config = Config { mode: AnalysisMode::Simulation, ..Config::default() };
    let analyzer = Analyzer::new(config).unwrap();

    let a = analyzer.diagnose("scan_0001.png").unwrap();
    let b = analyzer.diagnose("/other/dir/scan_9999.png").unwrap();
    assert_eq!(a.stage, b.stage);
    assert_eq!(a.confidence, b.confidence);
    assert!((0.85..=0.99).contains(&a.confidence));
    assert!(a.details.contains("Simulated"));
}

#[test]
fn batch_records_survive_same_stem_images() {
    let scans = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    for sub in ["left", "right"] {
        std::fs::create_dir_all(scans.path().join(sub)).unwrap();
    }
    save(&RgbImage::from_pixel(60, 40, BACKGROUND), &scans.path().join("left"), "eye.png");
    save(&spotted_fundus(), &scans.path().join("right"), "eye.png");

    let analyzer = Analyzer::new(Config::default()).unwrap();
    let images = get_fundus_files_in_dir(scans.path(), "segmented_").unwrap();
    assert_eq!(images.len(), 2);

    let records: Vec<PathBuf> = images
        .iter()
        .map(|image| {
            let result = analyzer.diagnose(image).unwrap();
            write_diagnosis_json(&result, out.path(), image, scans.path()).unwrap()
        })
        .collect();

    assert_ne!(records[0], records[1]);
    let left: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&records[0]).unwrap()).unwrap();
    let right: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&records[1]).unwrap()).unwrap();
    assert_eq!(left["stage"], "NoDR");
    assert_eq!(right["stage"], "ModerateNPDR");
}
