use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use tempfile::TempDir;

use asl_mlp::dataset::{build_xy, load_samples, stratified_split, FEATURE_COUNT};
use asl_mlp::feedforward::Net;
use asl_mlp::{run, BrowserModel, Error, TrainConfig};

/// Landmarks of `letter`: a per-letter bump on a few coordinates plus small noise.
fn landmarks(letter: char, k: usize) -> Vec<f64> {
    let offset = (letter as usize - 'A' as usize) % 8;
    (0..FEATURE_COUNT)
        .map(|f| {
            let base = if f % 8 == offset { 1.0 } else { 0.0 };
            base + ((k * 17 + f) as f64 * 0.37).sin() * 0.05
        })
        .collect()
}

fn rows(letters: &[char], per_letter: usize) -> Vec<Value> {
    let mut out = Vec::new();
    for k in 0..per_letter {
        for &letter in letters {
            out.push(json!({
                "label": letter.to_string(),
                "x": landmarks(letter, k),
                "t": 1_732_450_000_000u64 + (k as u64) * 40,
            }));
        }
    }
    out
}

fn write_dataset(dir: &TempDir, rows: &[Value]) -> PathBuf {
    let path = dir.path().join("asl_dataset.json");
    fs::write(&path, serde_json::to_string(rows).unwrap()).unwrap();
    path
}

fn config(dataset: &Path, output: &Path) -> TrainConfig {
    TrainConfig {
        dataset: dataset.to_path_buf(),
        output: output.to_path_buf(),
        epochs: 8,
        batch_size: 16,
        patience: 3,
        ..TrainConfig::default()
    }
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn exports_one_output_per_label() {
    let dir = TempDir::new().unwrap();
    let dataset = write_dataset(&dir, &rows(&['A', 'B', 'C', 'D'], 10));
    let output = dir.path().join("models").join("nested").join("weights.json");

    let summary = run(&config(&dataset, &output)).unwrap();
    assert_eq!(summary.labels, vec!["A", "B", "C", "D"]);
    assert_eq!(summary.train_samples + summary.val_samples, 40);
    assert_eq!(summary.val_samples, 8);
    assert!(output.exists());

    let json = read_json(&output);
    assert_eq!(json["model_type"], "mlp");
    assert_eq!(json["input_size"], 63);
    assert_eq!(json["labels"], json!(["A", "B", "C", "D"]));

    let layers = json["layers"].as_array().unwrap();
    assert_eq!(layers.len(), 3);
    let sizes: Vec<(u64, u64)> = layers
        .iter()
        .map(|l| {
            (
                l["input_size"].as_u64().unwrap(),
                l["output_size"].as_u64().unwrap(),
            )
        })
        .collect();
    assert_eq!(sizes, vec![(63, 128), (128, 64), (64, 4)]);
    assert_eq!(layers[0]["activation"], "relu");
    assert_eq!(layers[1]["activation"], "relu");
    assert_eq!(layers[2]["activation"], "linear");
    assert_eq!(layers[2]["weights"].as_array().unwrap().len(), 64);
    assert_eq!(layers[2]["weights"][0].as_array().unwrap().len(), 4);
    assert_eq!(layers[2]["biases"].as_array().unwrap().len(), 4);
}

#[test]
fn report_lists_every_label() {
    let dir = TempDir::new().unwrap();
    let dataset = write_dataset(&dir, &rows(&['A', 'B', 'C'], 10));
    let output = dir.path().join("weights.json");

    let summary = run(&config(&dataset, &output)).unwrap();
    let text = summary.to_string();

    assert!(text.contains("Validation accuracy: "));
    assert!(text.contains("Validation loss: "));
    assert!(text.contains("Classification report:"));
    assert!(text.contains("Confusion matrix (rows=true, cols=pred):"));
    assert!(text.contains(&format!(
        "Exported browser model JSON to: {}",
        output.display()
    )));
    assert_eq!(summary.confusion.classes(), 3);
    assert_eq!(summary.confusion.total(), summary.val_samples);
    assert_eq!(summary.report.per_class.len(), 3);
}

#[test]
fn motion_letters_need_the_flag() {
    let dir = TempDir::new().unwrap();
    let dataset = write_dataset(&dir, &rows(&['A', 'B', 'J', 'Z'], 6));

    let output = dir.path().join("without.json");
    let summary = run(&config(&dataset, &output)).unwrap();
    assert_eq!(summary.labels, vec!["A", "B"]);
    assert_eq!(read_json(&output)["labels"], json!(["A", "B"]));

    let output = dir.path().join("with.json");
    let summary = run(&TrainConfig {
        include_jz: true,
        ..config(&dataset, &output)
    })
    .unwrap();
    assert_eq!(summary.labels, vec!["A", "B", "J", "Z"]);
    assert_eq!(read_json(&output)["layers"][2]["output_size"], 4);
}

#[test]
fn malformed_rows_are_dropped() {
    let dir = TempDir::new().unwrap();
    let mut data = rows(&['A', 'B'], 5);
    data.push(json!({"label": "A", "x": vec![0.1; 62]}));
    data.push(json!({"label": "B", "x": vec![0.1; 64]}));
    data.push(json!({"label": "AB", "x": vec![0.1; 63]}));
    data.push(json!({"label": null, "x": vec![0.1; 63]}));
    data.push(json!({"x": vec![0.1; 63]}));
    data.push(json!({"label": "C", "x": "not a list"}));
    data.push(json!(["A", 1, 2]));
    data.push(json!({"label": " c ", "x": landmarks('C', 0)}));
    data.push(json!({"label": "c", "x": landmarks('C', 1)}));
    let dataset = write_dataset(&dir, &data);

    let samples = load_samples(&dataset, false).unwrap();
    assert_eq!(samples.len(), 12);
    assert!(samples.iter().all(|s| s.x.len() == FEATURE_COUNT));
    assert_eq!(samples.iter().filter(|s| s.label == 'C').count(), 2);

    let output = dir.path().join("weights.json");
    let summary = run(&config(&dataset, &output)).unwrap();
    assert_eq!(summary.labels, vec!["A", "B", "C"]);
}

#[test]
fn same_seed_same_partition() {
    let dir = TempDir::new().unwrap();
    let dataset = write_dataset(&dir, &rows(&['A', 'B', 'C', 'E'], 9));

    let samples = load_samples(&dataset, false).unwrap();
    let (arrays, _) = build_xy(&samples).unwrap();
    let first = stratified_split(&arrays.targets, 0.2, 42).unwrap();
    let second = stratified_split(&arrays.targets, 0.2, 42).unwrap();
    assert_eq!(first, second);

    let a = run(&config(&dataset, &dir.path().join("a.json"))).unwrap();
    let b = run(&config(&dataset, &dir.path().join("b.json"))).unwrap();
    assert_eq!(a.train_samples, b.train_samples);
    assert_eq!(a.confusion, b.confusion);
    assert_eq!(
        read_json(&dir.path().join("a.json")),
        read_json(&dir.path().join("b.json"))
    );
}

#[test]
fn exported_model_predicts_like_the_network() {
    let dir = TempDir::new().unwrap();
    let dataset = write_dataset(&dir, &rows(&['A', 'B', 'C'], 8));
    let output = dir.path().join("weights.json");
    run(&config(&dataset, &output)).unwrap();

    let model = BrowserModel::from_file(&output).unwrap();

    // Rebuild the network from the exported layers, back in per-neuron order
    let mut coeffs = Vec::new();
    let mut geometry = vec![model.input_size];
    for layer in &model.layers {
        geometry.push(layer.output_size);
        for neuron in 0..layer.output_size {
            coeffs.extend(layer.weights.iter().map(|row| row[neuron]));
            coeffs.push(layer.biases[neuron]);
        }
    }
    let mut net = Net::new(&geometry, Some(coeffs.into_boxed_slice())).unwrap();

    let mut outputs = vec![0.0; net.outputs_count()];
    for letter in ['A', 'B', 'C'] {
        for k in 0..4 {
            let x = landmarks(letter, 100 + k);
            net.process(&x, &mut outputs).unwrap();
            let expected = model.labels[Net::argmax(&outputs)].as_str();
            assert_eq!(model.predict(&x).unwrap(), expected);
        }
    }
}

#[test]
fn missing_dataset_is_reported() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.json");
    let err = run(&config(&missing, &dir.path().join("out.json"))).unwrap_err();
    assert!(matches!(err, Error::DatasetNotFound(ref p) if p == &missing));
    assert!(err.to_string().contains("nope.json"));
}

#[test]
fn malformed_json_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.json");
    fs::write(&path, "[{\"label\": \"A\", ").unwrap();
    let err = run(&config(&path, &dir.path().join("out.json"))).unwrap_err();
    assert!(matches!(err, Error::Json(_)));
}

#[test]
fn top_level_object_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("object.json");
    fs::write(&path, r#"{"label": "A"}"#).unwrap();
    let err = run(&config(&path, &dir.path().join("out.json"))).unwrap_err();
    assert_eq!(err.to_string(), "Dataset must be a JSON array of samples");
}

#[test]
fn nothing_left_after_filtering() {
    let dir = TempDir::new().unwrap();
    let dataset = write_dataset(&dir, &rows(&['J', 'Z'], 3));
    let err = run(&config(&dataset, &dir.path().join("out.json"))).unwrap_err();
    assert_eq!(err.to_string(), "No valid samples found after filtering");
}

#[test]
fn single_label_is_rejected() {
    let dir = TempDir::new().unwrap();
    let dataset = write_dataset(&dir, &rows(&['A'], 5));
    let output = dir.path().join("out.json");
    let err = run(&config(&dataset, &output)).unwrap_err();
    assert_eq!(err.to_string(), "Need at least 2 distinct labels to train");
    assert!(!output.exists());
}

#[test]
fn singleton_label_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut data = rows(&['A', 'B'], 4);
    data.extend(rows(&['C'], 1));
    let dataset = write_dataset(&dir, &data);
    let err = run(&config(&dataset, &dir.path().join("out.json"))).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Label 'C' has only 1 sample(s). Add more samples for stratified split."
    );
}

#[test]
fn bad_config_fails_before_reading() {
    let dir = TempDir::new().unwrap();
    let err = run(&TrainConfig {
        epochs: 0,
        ..config(&dir.path().join("nope.json"), &dir.path().join("out.json"))
    })
    .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}
