//! Branch selection after the orchestrator

use super::TurnState;

/// Where the turn goes after the orchestrator has run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Abort,
    Retrieve,
    Respond,
}

/// Pure routing function. The error check takes precedence over tool requests.
pub fn route(state: &TurnState) -> Route {
    if state.terminated_with_error() {
        Route::Abort
    } else if !state.pending_tool_requests().is_empty() {
        Route::Retrieve
    } else {
        Route::Respond
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::turn::testing::turn_request;
    use crate::turn::{StateUpdate, ToolRequest};
    use serde_json::json;

    fn tool_request() -> ToolRequest {
        ToolRequest {
            id: "call-1".to_string(),
            name: "load_patient_docs".to_string(),
            input: json!({}),
        }
    }

    #[test]
    fn test_fresh_state_responds() {
        let state = TurnState::new(turn_request("Hallo"));
        assert_eq!(route(&state), Route::Respond);
    }

    #[test]
    fn test_pending_requests_retrieve() {
        let mut state = TurnState::new(turn_request("Hallo"));
        state.apply(StateUpdate::new().with_pending_tool_requests(vec![tool_request()]));
        assert_eq!(route(&state), Route::Retrieve);
    }

    #[test]
    fn test_error_wins_over_requests() {
        let mut state = TurnState::new(turn_request("Hallo"));
        state.apply(
            StateUpdate::new()
                .with_pending_tool_requests(vec![tool_request()])
                .terminate(),
        );
        assert_eq!(route(&state), Route::Abort);
    }
}
