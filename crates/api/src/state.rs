use std::sync::Arc;

use meetbridge_config::Settings;
use meetbridge_core::{Corrector, SttFactory, Suggester, Translator};

/// Process-wide dependencies, constructed once at startup and injected into
/// every session. The core holds no global state beyond this.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub stt_factory: Arc<dyn SttFactory>,
    pub translator: Arc<dyn Translator>,
    pub suggester: Arc<dyn Suggester>,
    pub corrector: Arc<dyn Corrector>,
}
