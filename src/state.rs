use crate::config::Config;
use crate::search::SearchLimits;
use crate::store::DocumentStore;

pub struct AppState {
    pub store: DocumentStore,
    pub limits: SearchLimits,
    pub page_size: usize,
}

impl AppState {
    pub fn new(store: DocumentStore, config: &Config) -> Self {
        Self {
            store,
            limits: config.search_limits(),
            page_size: config.search.page_size.max(1),
        }
    }
}
