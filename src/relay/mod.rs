use std::sync::Arc;

use crate::relay::cache::ResultCache;
use crate::relay::model::SpeechModel;
use crate::relay::pool::InferencePool;
use crate::relay::translate::TextTranslator;

pub mod cache;
pub mod languages;
pub mod model;
pub mod pipeline;
pub mod pool;
pub mod scratch;
pub mod translate;
pub mod types;

/// Long-lived context shared by every request handler. Built once at startup,
/// no process-wide singletons.
#[derive(Clone)]
pub struct AppState {
    pub model: Arc<dyn SpeechModel>,
    pub pool: Arc<InferencePool>,
    pub cache: ResultCache,
    pub translator: Arc<dyn TextTranslator>,
    pub settings: Arc<RuntimeSettings>,
}

#[derive(Debug)]
pub struct RuntimeSettings {
    pub model_name: String,
    pub device: String,
    pub gpu_available: bool,
    pub cache_ttl: u64,
}
