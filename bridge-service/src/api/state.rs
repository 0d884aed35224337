use crate::service::BridgeFlow;
use std::sync::Arc;

/// Shared state handed to every handler.
pub struct ApiState {
    pub flow: Arc<BridgeFlow>,
}

impl ApiState {
    pub fn new(flow: Arc<BridgeFlow>) -> Self {
        Self { flow }
    }
}
