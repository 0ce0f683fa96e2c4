// In tests/persistence_tests.rs

use component_extraction::{
    Algorithm, ApplyOptions, ComponentExtractor, Dataset, DecompositionError, FastIcaConfig, GhaConfig, Kernel,
    KernelPcaConfig, Model, PcaConfig, SelectionPolicy, StopHandle, SvdConfig, Transformation,
};
use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tempfile::tempdir;

fn generate_random_data(n_records: usize, n_fields: usize, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Array2::from_shape_fn((n_records, n_fields), |(_, j)| rng.gen_range(-1.0..1.0) * (j + 1) as f64 + j as f64)
}

fn dataset(seed: u64) -> Dataset {
    Dataset::from_numeric(&["a", "b", "c"], generate_random_data(40, 3, seed)).unwrap()
}

#[test]
fn test_saved_models_apply_identically_after_load() {
    let dir = tempdir().unwrap();
    let ds = dataset(1);
    let stop = StopHandle::new();
    let algorithms = [
        Algorithm::Pca(PcaConfig {
            policy: SelectionPolicy::Threshold(0.8),
        }),
        Algorithm::Svd(SvdConfig::default()),
        Algorithm::FastIca(FastIcaConfig {
            row_norm: true,
            ..Default::default()
        }),
        Algorithm::Gha(GhaConfig::default()),
        Algorithm::KernelPca(KernelPcaConfig {
            kernel: Kernel::Anova { gamma: 0.5, degree: 2.0 },
            number_of_components: Some(4),
        }),
    ];
    for (i, algorithm) in algorithms.iter().enumerate() {
        let fitted = algorithm.fit(&ds, &stop).unwrap();
        let path = dir.path().join(format!("model_{}.bin", i));
        fitted.model.save(&path).unwrap();
        let loaded = Model::load(&path).unwrap();

        assert_eq!(loaded.kind(), fitted.model.kind());
        assert_eq!(loaded.field_names(), fitted.model.field_names());
        assert_eq!(loaded.report(), fitted.model.report());
        let before = fitted.model.apply(&ds, &ApplyOptions::default(), &stop).unwrap();
        let after = loaded.apply(&ds, &ApplyOptions::default(), &stop).unwrap();
        assert_eq!(before.dataset, after.dataset, "{:?}", loaded.kind());
    }
}

#[test]
fn test_default_policy_survives_round_trip() {
    let dir = tempdir().unwrap();
    let ds = dataset(2);
    let mut fitted = PcaConfig::default().fit(&ds, &StopHandle::new()).unwrap();
    fitted.model.set_policy(SelectionPolicy::Fixed(1)).unwrap();
    let path = dir.path().join("pca.bin");
    fitted.model.save(&path).unwrap();

    let loaded = Model::load(&path).unwrap();
    assert_eq!(loaded.as_linear().unwrap().policy(), SelectionPolicy::Fixed(1));
    let applied = loaded.apply(&ds, &ApplyOptions::default(), &StopHandle::new()).unwrap();
    assert_eq!(applied.n_components, 1);
}

#[test]
fn test_load_missing_file_is_persistence_error() {
    let dir = tempdir().unwrap();
    let err = Model::load(dir.path().join("absent.bin")).unwrap_err();
    assert!(matches!(err, DecompositionError::Persistence(_)));
}

#[test]
fn test_load_garbage_is_persistence_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("garbage.bin");
    std::fs::write(&path, b"definitely not a model").unwrap();
    let err = Model::load(&path).unwrap_err();
    assert!(matches!(err, DecompositionError::Persistence(_)));
}

#[test]
fn test_config_round_trips_through_json() {
    let algorithm = Algorithm::KernelPca(KernelPcaConfig {
        kernel: Kernel::GaussianCombination {
            sigma1: 1.0,
            sigma2: 2.0,
            sigma3: 4.0,
        },
        number_of_components: None,
    });
    let json = serde_json::to_string_pretty(&algorithm).unwrap();
    let back: Algorithm = serde_json::from_str(&json).unwrap();
    assert_eq!(back, algorithm);

    let parsed: Algorithm = serde_json::from_str(
        r#"{"fast_ica": {"policy": {"fixed": 2}, "algorithm_type": "parallel", "function": "exp",
            "alpha": 1.0, "row_norm": false, "max_iteration": 50, "tolerance": 0.001, "seed": 3}}"#,
    )
    .unwrap();
    assert!(parsed.validate().is_ok());
    assert!(matches!(parsed, Algorithm::FastIca(FastIcaConfig { max_iteration: 50, .. })));
}
