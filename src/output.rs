use std::fs;
use std::path::{Path, PathBuf};
use csv::Writer;

use crate::errors::Result;
use crate::pipeline::DiagnosisResult;

/// Outcome of one image in a batch run
pub struct BatchEntry {
    pub image_path: PathBuf,
    pub outcome: std::result::Result<DiagnosisResult, String>,
}

/// Location of the JSON record for `image_path`: its path relative to
/// `input_root`, extension kept, under `<output_dir>/json/`. Images outside
/// `input_root` fall back to their file name.
pub fn record_path_for(output_dir: &Path, image_path: &Path, input_root: &Path) -> PathBuf {
    let relative = image_path
        .strip_prefix(input_root)
        .ok()
        .filter(|rel| rel.file_name().is_some())
        .map(Path::to_path_buf)
        .or_else(|| image_path.file_name().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("image"));

    let mut record = output_dir.join("json").join(relative).into_os_string();
    record.push(".json");
    PathBuf::from(record)
}

/// Write one diagnosis as pretty JSON, see [`record_path_for`]
pub fn write_diagnosis_json<P: AsRef<Path>>(
    result: &DiagnosisResult,
    output_dir: P,
    image_path: &Path,
    input_root: &Path,
) -> Result<PathBuf> {
    let output_path = record_path_for(output_dir.as_ref(), image_path, input_root);

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(result)?;
    fs::write(&output_path, json)?;

    Ok(output_path)
}

/// Write the batch summary CSV, one row per input image
pub fn write_summary_csv<P: AsRef<Path>>(entries: &[BatchEntry], output_dir: P) -> Result<PathBuf> {
    let output_path = output_dir.as_ref().join("summary.csv");

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut writer = Writer::from_path(&output_path)?;

    writer.write_record([
        "Image",
        "Diagnosis",
        "Stage_Index",
        "Confidence",
        "Source",
        "Hemorrhages",
        "Exudates",
        "Annotations",
        "Segmentation_Path",
        "Error",
    ])?;

    for entry in entries {
        let image = entry.image_path.display().to_string();
        match &entry.outcome {
            Ok(result) => {
                let (hemorrhages, exudates) = result
                    .lesion_counts
                    .map(|c| (c.hemorrhages.to_string(), c.exudates.to_string()))
                    .unwrap_or_default();
                let segmentation = result
                    .segmentation_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();

                writer.write_record([
                    image,
                    result.diagnosis.clone(),
                    result.stage.index().to_string(),
                    format!("{:.6}", result.confidence),
                    format!("{:?}", result.source),
                    hemorrhages,
                    exudates,
                    result.annotations.len().to_string(),
                    segmentation,
                    String::new(),
                ])?;
            }
            Err(message) => {
                let mut row = vec![image];
                row.extend(std::iter::repeat(String::new()).take(8));
                row.push(message.clone());
                writer.write_record(&row)?;
            }
        }
    }

    writer.flush()?;

    Ok(output_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::SeverityStage;
    use crate::pipeline::DiagnosisSource;

    fn sample_result() -> DiagnosisResult {
        DiagnosisResult {
            stage: SeverityStage::MildNPDR,
            diagnosis: SeverityStage::MildNPDR.display_name().to_string(),
            confidence: 0.92,
            details: "Heuristic grading".to_string(),
            source: DiagnosisSource::Heuristic,
            lesion_counts: None,
            segmentation_path: None,
            annotations: Vec::new(),
            image_dimensions: None,
        }
    }

    #[test]
    fn json_record_is_written_under_json_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_diagnosis_json(
            &sample_result(),
            dir.path(),
            Path::new("/in/eye_7.png"),
            Path::new("/in"),
        )
        .unwrap();

        assert_eq!(path, dir.path().join("json").join("eye_7.png.json"));
        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value["stage"], "MildNPDR");
        assert_eq!(value["source"], "heuristic");
        assert_eq!(value["diagnosis"], "Mild Nonproliferative DR");
    }

    #[test]
    fn same_stem_images_get_distinct_records() {
        let dir = tempfile::tempdir().unwrap();
        let root = Path::new("/scans");
        let images = [
            Path::new("/scans/left/eye.png"),
            Path::new("/scans/right/eye.png"),
            Path::new("/scans/right/eye.jpg"),
        ];

        let paths: Vec<PathBuf> = images
            .iter()
            .map(|image| write_diagnosis_json(&sample_result(), dir.path(), image, root).unwrap())
            .collect();

        assert_eq!(paths[0], dir.path().join("json/left/eye.png.json"));
        assert_eq!(paths[1], dir.path().join("json/right/eye.png.json"));
        assert_eq!(paths[2], dir.path().join("json/right/eye.jpg.json"));
        assert!(paths.iter().all(|p| p.is_file()));
    }

    #[test]
    fn image_outside_root_uses_its_file_name() {
        let out = Path::new("/out");
        assert_eq!(
            record_path_for(out, Path::new("/elsewhere/eye.png"), Path::new("/scans")),
            PathBuf::from("/out/json/eye.png.json")
        );
        // Single-file input: the root is the file itself
        assert_eq!(
            record_path_for(out, Path::new("/scans/eye.png"), Path::new("/scans/eye.png")),
            PathBuf::from("/out/json/eye.png.json")
        );
    }

    #[test]
    fn summary_has_a_row_per_image_including_failures() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![
            BatchEntry { image_path: PathBuf::from("a.png"), outcome: Ok(sample_result()) },
            BatchEntry { image_path: PathBuf::from("b.png"), outcome: Err("unreadable".to_string()) },
        ];

        let path = write_summary_csv(&entries, dir.path()).unwrap();
        let mut reader = csv::Reader::from_path(path).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();

        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][1], "Mild Nonproliferative DR");
        assert_eq!(&rows[1][9], "unreadable");
    }
}
