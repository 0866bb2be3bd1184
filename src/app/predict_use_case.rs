use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::app::ports::ModelPort;
use crate::error::PipelineError;
use crate::observability::metrics;

/// Form field name and the model predictor it feeds
const FIELD_PREDICTORS: [(&str, &str); 4] = [
    ("region", "region"),
    ("race", "race"),
    ("education", "education"),
    ("age", "ten_year_age_groups"),
];

fn form_field(predictor: &str) -> &str {
    FIELD_PREDICTORS
        .iter()
        .find(|(_, p)| *p == predictor)
        .map(|(f, _)| *f)
        .unwrap_or(predictor)
}

/// One demographic profile from the prediction form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub region: String,
    pub race: String,
    pub education: String,
    pub age: String,
}

impl PredictionRequest {
    fn value(&self, field: &str) -> &str {
        match field {
            "region" => &self.region,
            "race" => &self.race,
            "education" => &self.education,
            _ => &self.age,
        }
    }

    /// Values keyed by predictor name
    fn predictor_values(&self) -> HashMap<String, String> {
        FIELD_PREDICTORS
            .iter()
            .map(|(field, predictor)| (predictor.to_string(), self.value(field).trim().to_string()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResponse {
    pub probability: f64,
    /// probability rounded to two decimals for display
    pub rounded: f64,
    pub threshold: f64,
    pub explanation: String,
}

/// A request the model cannot score, phrased for the person filling the form
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{field}: {message}")]
pub struct ValidationFailure {
    pub field: String,
    pub message: String,
}

impl ValidationFailure {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum PredictError {
    #[error("invalid request: {0}")]
    Invalid(ValidationFailure),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Scores prediction form submissions against the current model
pub struct PredictUseCase {
    models: Box<dyn ModelPort>,
    threshold: f64,
}

impl PredictUseCase {
    pub fn new(models: Box<dyn ModelPort>, threshold: f64) -> Self {
        Self { models, threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn execute(&self, request: &PredictionRequest) -> Result<PredictionResponse, PredictError> {
        for (field, _) in FIELD_PREDICTORS {
            if request.value(field).trim().is_empty() {
                metrics::model::prediction_rejected(field);
                return Err(PredictError::Invalid(ValidationFailure::new(
                    field,
                    format!("please select a {}", field),
                )));
            }
        }

        let model = self.models.current_model()?;
        let probability = match model.predict(&request.predictor_values()) {
            Ok(p) => p,
            Err(PipelineError::UnseenLevel { field, value }) => {
                let field = form_field(&field);
                metrics::model::prediction_rejected(field);
                debug!(field, value = %value, "rejected unseen level");
                return Err(PredictError::Invalid(ValidationFailure::new(
                    field,
                    format!("selected {} level not present in training data", field),
                )));
            }
            Err(e) => return Err(e.into()),
        };

        metrics::model::prediction_served();
        info!(probability, "served prediction");
        Ok(PredictionResponse {
            probability,
            rounded: (probability * 100.0).round() / 100.0,
            threshold: self.threshold,
            explanation: format!(
                "Estimated probability that this group's share of maternal deaths exceeds {}%: {:.1}%",
                self.threshold * 100.0,
                probability * 100.0
            ),
        })
    }

    /// Levels the current model accepts, keyed by form field
    pub fn levels(&self) -> Result<BTreeMap<String, Vec<String>>, PredictError> {
        let model = self.models.current_model()?;
        Ok(model
            .levels()
            .into_iter()
            .map(|(predictor, levels)| (form_field(&predictor).to_string(), levels))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::FixedModel;
    use crate::model::{fit, FitOptions};
    use crate::pipeline::ingestion::RawTable;
    use std::sync::Arc;

    fn use_case() -> PredictUseCase {
        let mut rows = Vec::new();
        for (i, region) in ["Northeast", "South"].iter().enumerate() {
            for (j, race) in ["Asian", "White"].iter().enumerate() {
                for (k, education) in ["unknown", "Doctorate"].iter().enumerate() {
                    for (l, age) in ["15-24", "25-34"].iter().enumerate() {
                        for rep in 0..3 {
                            let y = usize::from((i + j + k + l + rep) % 3 == 0);
                            rows.push(vec![
                                region.to_string(),
                                race.to_string(),
                                education.to_string(),
                                age.to_string(),
                                y.to_string(),
                            ]);
                        }
                    }
                }
            }
        }
        let table = RawTable::new(
            ["region", "race", "education", "ten_year_age_groups", "mortality_binary"]
                .iter()
                .map(|h| h.to_string())
                .collect(),
            rows,
        );
        let predictors: Vec<String> = FIELD_PREDICTORS.iter().map(|(_, p)| p.to_string()).collect();
        let model = fit(&table, "mortality_binary", &predictors, &FitOptions::default()).unwrap();
        PredictUseCase::new(Box::new(FixedModel(Arc::new(model))), 0.01)
    }

    fn request(education: &str) -> PredictionRequest {
        PredictionRequest {
            region: "northeast".to_string(),
            race: "White".to_string(),
            education: education.to_string(),
            age: "15-24".to_string(),
        }
    }

    #[test]
    fn test_scores_known_profile() {
        let response = use_case().execute(&request("unknown")).unwrap();
        assert!((0.0..=1.0).contains(&response.probability));
        assert!((response.rounded - response.probability).abs() <= 0.005);
        assert_eq!(response.threshold, 0.01);
        assert!(response.explanation.contains("exceeds 1%"));
    }

    #[test]
    fn test_unseen_level_is_a_validation_failure() {
        match use_case().execute(&request("Associate degree")) {
            Err(PredictError::Invalid(failure)) => {
                assert_eq!(failure.field, "education");
                assert_eq!(failure.message, "selected education level not present in training data");
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn test_blank_field_is_a_validation_failure() {
        let mut req = request("unknown");
        req.age = "  ".to_string();
        match use_case().execute(&req) {
            Err(PredictError::Invalid(failure)) => assert_eq!(failure.field, "age"),
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn test_levels_use_form_field_names() {
        let levels = use_case().levels().unwrap();
        assert_eq!(levels["age"], vec!["15-24", "25-34"]);
        assert_eq!(levels["region"], vec!["Northeast", "South"]);
        assert!(!levels.contains_key("ten_year_age_groups"));
    }
}
