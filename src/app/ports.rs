use std::sync::Arc;

use crate::error::Result;
use crate::model::{FittedModel, ModelCache};

/// Source of the model that serves predictions
pub trait ModelPort: Send + Sync {
    fn current_model(&self) -> Result<Arc<FittedModel>>;
}

impl ModelPort for ModelCache {
    fn current_model(&self) -> Result<Arc<FittedModel>> {
        self.get()
    }
}

/// A model fitted up front and never refreshed
pub struct FixedModel(pub Arc<FittedModel>);

impl ModelPort for FixedModel {
    fn current_model(&self) -> Result<Arc<FittedModel>> {
        Ok(Arc::clone(&self.0))
    }
}
