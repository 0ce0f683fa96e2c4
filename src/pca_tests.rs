use crate::algorithm::ComponentExtractor;
use crate::dataset::{Dataset, Field};
use crate::diagnostics::row_orthonormality_error;
use crate::error::DecompositionError;
use crate::model::{ApplyOptions, Model, OutputOptions, Transformation};
use crate::pca::PcaConfig;
use crate::selection::{SelectionPolicy, SoftWarning};
use crate::stop::StopHandle;

use approx::assert_abs_diff_eq;
use ndarray::{array, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Correlated test data: a few latent factors mixed into `n_fields` fields plus noise.
fn generate_random_data(n_records: usize, n_fields: usize, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let n_latent = 2.min(n_fields);
    let loadings = Array2::from_shape_fn((n_latent, n_fields), |_| rng.gen_range(-2.0..2.0));
    let latent = Array2::from_shape_fn((n_records, n_latent), |_| rng.gen_range(-1.0..1.0));
    let noise = Array2::from_shape_fn((n_records, n_fields), |_| rng.gen_range(-0.1..0.1));
    latent.dot(&loadings) + noise + 5.0
}

fn field_names(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("f{}", i)).collect()
}

fn dataset(data: Array2<f64>) -> Dataset {
    let names = field_names(data.ncols());
    Dataset::from_numeric(names.as_slice(), data).unwrap()
}

fn fit_linear(config: PcaConfig, data: &Array2<f64>) -> crate::model::LinearModel {
    config
        .fit_matrix(field_names(data.ncols()), data.view(), &StopHandle::new())
        .unwrap()
        .0
}

#[test]
fn test_components_ranked_descending() {
    let data = generate_random_data(60, 5, 7);
    let model = fit_linear(PcaConfig::default(), &data);
    let importances = model.importances();
    assert_eq!(importances.len(), 5);
    for pair in importances.windows(2) {
        assert!(pair[0] >= pair[1], "importances not descending: {:?}", importances);
    }
}

#[test]
fn test_eigenvalues_sum_to_total_variance() {
    let data = generate_random_data(40, 4, 11);
    let model = fit_linear(PcaConfig::default(), &data);
    let total: f64 = model.importances().iter().sum();
    let variances: f64 = data.var_axis(Axis(0), 1.0).sum();
    assert_abs_diff_eq!(total, variances, epsilon = 1e-9);
}

#[test]
fn test_weight_vectors_are_orthonormal() {
    let data = generate_random_data(50, 6, 3);
    let model = fit_linear(PcaConfig::default(), &data);
    let basis = model.projection_basis(6).reversed_axes();
    assert!(row_orthonormality_error(&basis.view()) < 1e-9);
}

#[test]
fn test_cumulative_table_ends_at_one() {
    let data = generate_random_data(30, 4, 5);
    let model = fit_linear(PcaConfig::default(), &data);
    let table = model.cumulative_importance();
    for pair in table.cumulative.windows(2) {
        assert!(pair[1] >= pair[0] - 1e-15);
    }
    assert_abs_diff_eq!(*table.cumulative.last().unwrap(), 1.0, epsilon = 1e-12);
}

#[test]
fn test_round_trip_with_all_components() {
    let data = generate_random_data(25, 4, 21);
    let model = fit_linear(PcaConfig::default(), &data);
    let scores = model.transform_matrix(data.view(), 4, &StopHandle::new()).unwrap();
    let reconstructed = model.reconstruct(scores.view()).unwrap();
    for (orig, back) in data.iter().zip(reconstructed.iter()) {
        assert!((orig - back).abs() <= 1e-6 * orig.abs().max(1.0));
    }
}

#[test]
fn test_end_to_end_fixed_two_components() {
    let data = generate_random_data(100, 4, 42);
    let ds = dataset(data);
    let config = PcaConfig {
        policy: SelectionPolicy::Fixed(2),
    };
    let stop = StopHandle::new();
    let fitted = config.fit(&ds, &stop).unwrap();
    assert!(fitted.warnings.is_empty());

    let first = fitted.model.apply(&ds, &ApplyOptions::default(), &stop).unwrap();
    assert_eq!(first.n_components, 2);
    assert_eq!(
        first.dataset.regular_field_names(),
        vec!["pc_1".to_string(), "pc_2".to_string()]
    );
    assert_eq!(first.dataset.n_records(), 100);

    let second = fitted.model.apply(&ds, &ApplyOptions::default(), &stop).unwrap();
    assert_eq!(first.dataset, second.dataset);
}

#[test]
fn test_first_component_captures_dominant_direction() {
    // Points along y = 2x with tiny orthogonal jitter.
    let data = array![[1.0, 2.0], [2.0, 4.01], [3.0, 5.99], [4.0, 8.0], [5.0, 10.02], [6.0, 11.98]];
    let model = fit_linear(PcaConfig::default(), &data);
    let w = model.components()[0].weights();
    let expected = 1.0 / 5.0f64.sqrt();
    assert_abs_diff_eq!(w[0].abs(), expected, epsilon = 1e-3);
    assert_abs_diff_eq!(w[1].abs(), 2.0 * expected, epsilon = 1e-3);
    assert!(model.cumulative_importance().proportions[0] > 0.999);
}

#[test]
fn test_threshold_policy_selects_prefix() {
    let data = generate_random_data(80, 5, 9);
    let model = fit_linear(
        PcaConfig {
            policy: SelectionPolicy::Threshold(0.9),
        },
        &data,
    );
    let table = model.cumulative_importance();
    let mut warnings = Vec::new();
    let k = model.resolve_count(&model.policy(), &mut warnings).unwrap();
    assert_eq!(k, table.count_for_threshold(0.9));
    assert!(k >= 1 && k < 5);
    // two latent factors carry nearly all the variance
    assert!(k <= 2);
}

#[test]
fn test_fixed_count_is_capped_with_warning() {
    let data = generate_random_data(20, 3, 1);
    let ds = dataset(data);
    let fitted = PcaConfig {
        policy: SelectionPolicy::Fixed(7),
    }
    .fit(&ds, &StopHandle::new())
    .unwrap();
    assert!(fitted
        .warnings
        .contains(&SoftWarning::ComponentCountCapped { requested: 7, available: 3 }));
    let applied = fitted.model.apply(&ds, &ApplyOptions::default(), &StopHandle::new()).unwrap();
    assert_eq!(applied.n_components, 3);
    assert_eq!(applied.warnings.len(), 1);
}

#[test]
fn test_apply_rejects_different_fields() {
    let data = generate_random_data(20, 3, 2);
    let fitted = PcaConfig::default().fit(&dataset(data), &StopHandle::new()).unwrap();
    let other = Dataset::from_numeric(&["f1", "f2"], Array2::zeros((4, 2))).unwrap();
    let err = fitted
        .model
        .apply(&other, &ApplyOptions::default(), &StopHandle::new())
        .unwrap_err();
    match err {
        DecompositionError::ShapeMismatch { expected, found, .. } => {
            assert_eq!(expected, 3);
            assert_eq!(found, 2);
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_apply_uses_training_means() {
    let train = array![[0.0, 0.0], [2.0, 0.0], [0.0, 2.0], [2.0, 2.0]];
    let fitted = PcaConfig::default().fit(&dataset(train), &StopHandle::new()).unwrap();
    // The training centroid maps to the origin of component space.
    let centroid = dataset(array![[1.0, 1.0]]);
    let applied = fitted
        .model
        .apply(&centroid, &ApplyOptions::default(), &StopHandle::new())
        .unwrap();
    for v in applied.dataset.values().iter() {
        assert_abs_diff_eq!(*v, 0.0, epsilon = 1e-12);
    }
}

#[test]
fn test_special_fields_pass_through() {
    let ds = Dataset::new(
        vec![
            Field::special("id", "id"),
            Field::regular("a"),
            Field::regular("b"),
            Field::special("label", "label").nominal(),
        ],
        array![[10.0, 1.0, 2.0, 0.0], [11.0, 2.0, 1.0, 1.0], [12.0, 3.0, 3.5, 0.0]],
    )
    .unwrap();
    let fitted = PcaConfig::default().fit(&ds, &StopHandle::new()).unwrap();
    let options = ApplyOptions {
        policy: Some(SelectionPolicy::Fixed(1)),
        output: OutputOptions {
            keep_original_fields: true,
        },
    };
    let applied = fitted.model.apply(&ds, &options, &StopHandle::new()).unwrap();
    let names: Vec<&str> = applied.dataset.fields().iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["id", "a", "b", "label", "pc_1"]);
    assert_eq!(applied.dataset.column("id").unwrap(), array![10.0, 11.0, 12.0]);
}

#[test]
fn test_missing_values_fail_before_fit() {
    let ds = Dataset::from_numeric(&["a", "b"], array![[1.0, 2.0], [f64::NAN, 1.0]]).unwrap();
    let err = PcaConfig::default().fit(&ds, &StopHandle::new()).unwrap_err();
    assert!(matches!(err, DecompositionError::Precondition(_)));
}

#[test]
fn test_stopped_before_fit() {
    let stop = StopHandle::new();
    stop.request_stop();
    let data = generate_random_data(10, 3, 4);
    let err = PcaConfig::default().fit(&dataset(data), &stop).unwrap_err();
    assert!(err.is_stopped());
}

#[test]
fn test_apply_checks_stop_across_chunks() {
    let data = generate_random_data(2_500, 3, 8);
    let ds = dataset(data);
    let fitted = PcaConfig::default().fit(&ds, &StopHandle::new()).unwrap();
    let stop = StopHandle::new();
    stop.request_stop();
    assert!(fitted
        .model
        .apply(&ds, &ApplyOptions::default(), &stop)
        .unwrap_err()
        .is_stopped());
}

#[test]
fn test_variance_table_display() {
    let data = generate_random_data(30, 3, 6);
    let fitted = PcaConfig::default().fit(&dataset(data), &StopHandle::new()).unwrap();
    let Model::Linear(model) = &fitted.model else {
        panic!("PCA must produce a linear model");
    };
    let text = model.to_string();
    assert!(text.starts_with("PCA model: 3 fields, 3 components"));
    assert_eq!(text.lines().count(), 5);
}
