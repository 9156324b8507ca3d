use rashscan::inference::{ModelLoader, OnnxModelLoader};
use rashscan::{ErrorKind, ImageSource, InferenceContext, PipelineError, RuntimeConfig};

#[test]
fn test_garbage_model_file_fails_to_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.onnx");
    std::fs::write(&path, b"definitely not a protobuf").unwrap();

    let loader = OnnxModelLoader::new(RuntimeConfig::default());
    let err = loader.load(&path).err().unwrap();
    assert!(matches!(err, PipelineError::ModelLoadError(_)));
    assert_eq!(err.status_code(), 503);
}

#[test]
fn test_context_reports_missing_model() {
    let dir = tempfile::tempdir().unwrap();
    let context = InferenceContext::builder()
        .with_model_path(dir.path().join("absent.onnx"))
        .with_labels_path(dir.path().join("absent.json"))
        .build()
        .unwrap();

    let err = context
        .predict(ImageSource::Bytes(b"\x89PNG\r\n\x1a\n"))
        .unwrap_err();
    assert!(matches!(err, PipelineError::ModelNotFound(_)));
    assert_eq!(err.kind(), ErrorKind::Server);
    assert!(context.status().labels_degraded);
}

#[test]
fn test_hash_mismatch_is_rejected_before_loading() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.onnx");
    std::fs::write(&path, b"weights").unwrap();

    let context = InferenceContext::builder()
        .with_model_path(&path)
        .with_expected_sha256("0".repeat(64))
        .build()
        .unwrap();

    let err = context.model().unwrap_err();
    assert!(matches!(err, PipelineError::ModelLoadError(_)));
    assert!(err.to_string().contains("hash mismatch"));
}
