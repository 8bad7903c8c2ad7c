use happyml::graph::persistence::{load_parameter, parameter_path, save_parameter};
use happyml::tensor::io::{load_tensor_f32, save_tensor};
use happyml::tensor::leaves::F32Tensor;
use happyml::tensor::{materialize, Tensor};
use happyml::types::BitWidth;
use std::rc::Rc;

fn scratch_dir(label: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("happyml_tensor_roundtrip_{label}"));
    let _ = std::fs::create_dir_all(&dir);
    dir
}

#[test]
fn multi_channel_tensor_round_trips_through_the_wire_format() {
    let original =
        F32Tensor::from_channel_major(2, 2, 3, (0..12).map(|v| v as f32).collect()).unwrap();
    let mut buf = Vec::new();
    save_tensor(&original, &mut buf).unwrap();
    let mut cursor = std::io::Cursor::new(buf);
    let loaded = load_tensor_f32(&mut cursor).unwrap();
    assert_eq!(loaded.shape(), original.shape());
    for ch in 0..3 {
        for r in 0..2 {
            for c in 0..2 {
                assert_eq!(loaded.value(r, c, ch), original.value(r, c, ch));
            }
        }
    }
}

#[test]
fn half_precision_materialization_survives_an_io_round_trip() {
    let original: happyml::TensorRef =
        Rc::new(F32Tensor::from_channel_major(1, 3, 1, vec![1.0 / 3.0, -2.0, 0.125]).unwrap());
    let half = materialize(&original, BitWidth::Bits16).unwrap();
    let mut buf = Vec::new();
    save_tensor(half.as_ref(), &mut buf).unwrap();
    let mut cursor = std::io::Cursor::new(buf);
    let loaded = load_tensor_f32(&mut cursor).unwrap();
    for i in 0..3 {
        assert!((loaded.value(0, i, 0) - half.value(0, i, 0)).abs() < 1e-6);
    }
}

#[test]
fn parameter_directory_round_trips_a_named_tensor() {
    let dir = scratch_dir("parameter");
    let tensor: happyml::TensorRef =
        Rc::new(F32Tensor::from_channel_major(2, 2, 1, vec![1.0, 2.0, 3.0, 4.0]).unwrap());
    save_parameter(&dir, 7, "weights", &tensor).unwrap();
    assert!(parameter_path(&dir, 7, "weights").exists());
    let loaded = load_parameter(&dir, 7, "weights").unwrap();
    assert_eq!(loaded.shape(), tensor.shape());
    assert_eq!(loaded.value(1, 1, 0), 4.0);
}

#[test]
fn missing_parameter_file_is_reported_as_a_typed_error() {
    let dir = scratch_dir("missing_parameter");
    let result = load_parameter(&dir, 99, "weights");
    assert!(matches!(result, Err(happyml::HappyMlError::MissingParameter(_))));
}
