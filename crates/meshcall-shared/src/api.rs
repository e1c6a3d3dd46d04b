//! Request and response bodies of the group call REST API.
//!
//! Request fields are optional on the wire so the server can answer a
//! missing field with a 400 instead of a generic deserialization failure.

use serde::{Deserialize, Serialize};

use crate::models::{CallSession, Participant};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCallRequest {
    pub user_id: Option<String>,
    pub chat_id: Option<String>,
}

/// Body of the join and leave routes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipRequest {
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListCallsQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallResponse {
    pub call: CallSession,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallsResponse {
    pub calls: Vec<CallSession>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantsResponse {
    pub participants: Vec<Participant>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requests_use_camel_case() {
        let req: CreateCallRequest =
            serde_json::from_str(r#"{"userId":"u1","chatId":"c1"}"#).unwrap();
        assert_eq!(req.user_id.as_deref(), Some("u1"));
        assert_eq!(req.chat_id.as_deref(), Some("c1"));

        let req: MembershipRequest = serde_json::from_str("{}").unwrap();
        assert!(req.user_id.is_none());
    }
}
