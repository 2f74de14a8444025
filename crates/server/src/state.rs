use axum::extract::FromRef;
use dispatch::{Dispatcher, EventProcessor};
use std::sync::Arc;
use storage::Db;

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub processor: Arc<EventProcessor>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub verify_token: String,
    pub app_secret: Option<String>,
}

impl FromRef<AppState> for Db {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}


impl AppState {
    pub fn new(
        db: Db,
        dispatcher: Arc<dyn Dispatcher>,
        verify_token: String,
        app_secret: Option<String>,
    ) -> Self {
        let stores = Arc::new(db.clone());
        let processor = Arc::new(EventProcessor::new(
            stores.clone(),
            stores.clone(),
            stores,
            dispatcher.clone(),
        ));
        Self {
            db,
            processor,
            dispatcher,
            verify_token,
            app_secret,
        }
    }
}
