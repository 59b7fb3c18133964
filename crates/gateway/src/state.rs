use std::sync::Arc;

use teamsync_bridge::BridgeService;

/// Shared state handed to every handler.
pub struct GatewayState {
    pub bridge: Arc<BridgeService>,
    pub version: &'static str,
}

impl GatewayState {
    pub fn new(bridge: Arc<BridgeService>) -> Arc<Self> {
        Arc::new(Self {
            bridge,
            version: env!("CARGO_PKG_VERSION"),
        })
    }
}
