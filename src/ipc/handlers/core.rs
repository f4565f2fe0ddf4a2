use serde_json::json;

use crate::ipc::error::ok;
use crate::ipc::types::{AppState, Request};

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => {
            let result = json!({
                "version": env!("CARGO_PKG_VERSION"),
                "orgId": state.session.as_ref().map(|s| s.org_id),
            });
            Some(ok(&req.id, result))
        }
        _ => None,
    }
}
