pub mod ports;
pub mod predict_use_case;

pub use predict_use_case::{
    PredictError, PredictUseCase, PredictionRequest, PredictionResponse, ValidationFailure,
};
