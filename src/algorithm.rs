//! Algorithm selection: one capability trait implemented by every
//! extractor config, and a tagged union to pick one at the call site.

use log::info;
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::error::Result;
use crate::fastica::FastIcaConfig;
use crate::gha::GhaConfig;
use crate::kernel_pca::KernelPcaConfig;
use crate::model::{ApplyOptions, Model, OutputOptions, Transformation};
use crate::pca::PcaConfig;
use crate::selection::SoftWarning;
use crate::stop::StopHandle;
use crate::svd::SvdConfig;

/// A freshly fitted model and the soft warnings raised while fitting it.
#[derive(Debug, Clone)]
pub struct Fitted {
    pub model: Model,
    pub warnings: Vec<SoftWarning>,
}

/// Learns a transformation model from the regular fields of a dataset.
pub trait ComponentExtractor {
    /// Fits on every record of `dataset`. Fails with a precondition error
    /// before any computation when the regular fields are not all numeric
    /// and complete.
    fn fit(&self, dataset: &Dataset, stop: &StopHandle) -> Result<Fitted>;
}

/// Which extractor to run, with its configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    Pca(PcaConfig),
    Svd(SvdConfig),
    FastIca(FastIcaConfig),
    Gha(GhaConfig),
    KernelPca(KernelPcaConfig),
}

impl Algorithm {
    pub fn validate(&self) -> Result<()> {
        match self {
            Algorithm::Pca(c) => c.validate(),
            Algorithm::Svd(c) => c.validate(),
            Algorithm::FastIca(c) => c.validate(),
            Algorithm::Gha(c) => c.validate(),
            Algorithm::KernelPca(c) => c.validate(),
        }
    }

    /// Fits on `dataset` and applies the new model to the same records.
    pub fn fit_transform(
        &self,
        dataset: &Dataset,
        output: OutputOptions,
        stop: &StopHandle,
    ) -> Result<(Dataset, Model, Vec<SoftWarning>)> {
        let Fitted { model, mut warnings } = self.fit(dataset, stop)?;
        let options = ApplyOptions { policy: None, output };
        let applied = model.apply(dataset, &options, stop)?;
        warnings.extend(applied.warnings);
        info!(
            "{} fit_transform produced {} output fields for {} records.",
            model.kind(),
            applied.n_components,
            applied.dataset.n_records()
        );
        Ok((applied.dataset, model, warnings))
    }
}

impl ComponentExtractor for Algorithm {
    fn fit(&self, dataset: &Dataset, stop: &StopHandle) -> Result<Fitted> {
        match self {
            Algorithm::Pca(c) => c.fit(dataset, stop),
            Algorithm::Svd(c) => c.fit(dataset, stop),
            Algorithm::FastIca(c) => c.fit(dataset, stop),
            Algorithm::Gha(c) => c.fit(dataset, stop),
            Algorithm::KernelPca(c) => c.fit(dataset, stop),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AlgorithmKind;
    use crate::selection::SelectionPolicy;
    use ndarray::array;

    fn small() -> Dataset {
        Dataset::from_numeric(
            &["a", "b", "c"],
            array![[1.0, 2.0, 0.5], [2.0, 3.5, 1.0], [3.0, 6.5, 1.2], [4.0, 8.0, 2.5], [5.0, 9.5, 2.0]],
        )
        .unwrap()
    }

    #[test]
    fn selector_dispatches_to_each_kind() {
        let algorithms = [
            (Algorithm::Pca(PcaConfig::default()), AlgorithmKind::Pca),
            (Algorithm::Svd(SvdConfig::default()), AlgorithmKind::Svd),
            (Algorithm::FastIca(FastIcaConfig::default()), AlgorithmKind::FastIca),
            (Algorithm::Gha(GhaConfig::default()), AlgorithmKind::Gha),
            (Algorithm::KernelPca(KernelPcaConfig::default()), AlgorithmKind::KernelPca),
        ];
        for (algorithm, kind) in algorithms {
            let fitted = algorithm.fit(&small(), &StopHandle::new()).unwrap();
            assert_eq!(fitted.model.kind(), kind);
        }
    }

    #[test]
    fn fit_transform_names_output_fields() {
        let algorithm = Algorithm::Pca(PcaConfig {
            policy: SelectionPolicy::Fixed(2),
        });
        let (out, model, warnings) = algorithm
            .fit_transform(&small(), OutputOptions::default(), &StopHandle::new())
            .unwrap();
        assert!(warnings.is_empty());
        assert_eq!(out.regular_field_names(), vec!["pc_1".to_string(), "pc_2".to_string()]);
        assert_eq!(model.field_names().len(), 3);
    }

    #[test]
    fn selector_config_round_trips_through_json() {
        let algorithm = Algorithm::Gha(GhaConfig {
            learning_rate: 0.005,
            ..GhaConfig::default()
        });
        let json = serde_json::to_string(&algorithm).unwrap();
        assert!(json.starts_with(r#"{"gha":"#));
        let back: Algorithm = serde_json::from_str(&json).unwrap();
        assert_eq!(back, algorithm);
    }

    #[test]
    fn invalid_config_is_rejected_before_fit() {
        let algorithm = Algorithm::FastIca(FastIcaConfig {
            alpha: 3.0,
            ..FastIcaConfig::default()
        });
        assert!(algorithm.validate().is_err());
        assert!(algorithm.fit(&small(), &StopHandle::new()).is_err());
    }
}
