use std::sync::Arc;

use murmur_db::Database;

use crate::delivery::Delivery;
use crate::profiles::ProfileDirectory;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub delivery: Delivery,
    pub profiles: Arc<dyn ProfileDirectory>,
}
