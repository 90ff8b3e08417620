//! Epidemiological model seam
//!
//! The simulation itself is an external collaborator: the engine only
//! depends on the narrow contract that a model maps a climate-forcing
//! ensemble to a dataset with the same time/realization/location axes
//! plus the derived suitability field. [`GaussianNicheModel`] is a small
//! reference implementation used by the synthetic demo pipeline and
//! tests; production models plug in behind the same trait.

use anyhow::Result;
use polars::prelude::*;

use crate::dataset::{EnsembleDataset, FIELD_SUITABILITY};
use crate::error::EngineError;

/// A callable mapping climate forcing to transmission suitability.
pub trait SuitabilityModel {
    fn name(&self) -> &str;

    /// Produce a dataset with the same axes as `climate` plus
    /// `portion_suitable`.
    fn run(&self, climate: &EnsembleDataset) -> Result<EnsembleDataset>;
}

/// Reference niche model: suitability responds to daily mean temperature
/// as a Gaussian around a thermal optimum, scaled to days/year.
#[derive(Debug, Clone)]
pub struct GaussianNicheModel {
    pub temperature_field: String,
    /// Thermal optimum (degrees C).
    pub optimum: f64,
    /// Niche breadth (degrees C).
    pub breadth: f64,
}

impl Default for GaussianNicheModel {
    fn default() -> Self {
        Self {
            temperature_field: "temperature".to_string(),
            optimum: 26.0,
            breadth: 4.0,
        }
    }
}

impl SuitabilityModel for GaussianNicheModel {
    fn name(&self) -> &str {
        "gaussian_niche"
    }

    fn run(&self, climate: &EnsembleDataset) -> Result<EnsembleDataset> {
        climate.require_field(&self.temperature_field)?;

        let temperatures = climate
            .frame()
            .column(&self.temperature_field)
            .map_err(|_| EngineError::missing_field(climate.name(), &self.temperature_field))?
            .f64()?;

        // Nulls propagate transparently; they are never turned into NaN
        let suitability: Vec<Option<f64>> = temperatures
            .into_iter()
            .map(|opt| {
                opt.map(|t| {
                    let z = (t - self.optimum) / self.breadth;
                    365.0 * libm::exp(-0.5 * z * z)
                })
            })
            .collect();

        let mut frame = climate.frame().clone();
        frame.with_column(Series::new(FIELD_SUITABILITY.into(), suitability))?;
        let frame = frame.drop(&self.temperature_field)?;

        EnsembleDataset::new(
            format!("{}_{}", climate.name(), self.name()),
            frame,
            climate.member_ids().clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{COL_REALIZATION, COL_TIME, COL_YEAR};
    use approx::assert_relative_eq;
    use rustc_hash::FxHashMap;

    #[test]
    fn test_niche_model_keeps_axes_and_adds_suitability() {
        let frame = df![
            COL_TIME => &[0i64, 1],
            COL_YEAR => &[2025i32, 2025],
            COL_REALIZATION => &[0i64, 0],
            "temperature" => &[26.0, 30.0],
        ]
        .unwrap();
        let climate = EnsembleDataset::new("forcing", frame, FxHashMap::default()).unwrap();

        let model = GaussianNicheModel::default();
        let suitability = model.run(&climate).unwrap();

        assert_eq!(suitability.times().unwrap(), climate.times().unwrap());
        assert_eq!(
            suitability.realizations().unwrap(),
            climate.realizations().unwrap()
        );
        let values = suitability
            .frame()
            .column(FIELD_SUITABILITY)
            .unwrap()
            .f64()
            .unwrap();
        // At the optimum the full year is suitable
        assert_relative_eq!(values.get(0).unwrap(), 365.0);
        assert!(values.get(1).unwrap() < 365.0);
    }

    #[test]
    fn test_missing_temperature_field() {
        let frame = df![
            COL_TIME => &[0i64],
            COL_YEAR => &[2025i32],
            COL_REALIZATION => &[0i64],
            "pressure" => &[1000.0],
        ]
        .unwrap();
        let climate = EnsembleDataset::new("forcing", frame, FxHashMap::default()).unwrap();
        let err = GaussianNicheModel::default().run(&climate).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::MissingField { .. })
        ));
    }
}
