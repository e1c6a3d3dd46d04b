//! HTTP client of the group call REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use meshcall_shared::api::{
    CallResponse, CallsResponse, CreateCallRequest, ErrorResponse, MembershipRequest,
    ParticipantsResponse,
};
use meshcall_shared::{
    CallDirectory, CallId, CallSession, ChatId, DirectoryError, Participant, ParticipantId,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// [`CallDirectory`] backed by a meshcall server's `/api/group-calls` routes.
#[derive(Clone)]
pub struct HttpCallDirectory {
    base_url: String,
    client: reqwest::Client,
}

impl HttpCallDirectory {
    pub fn new(server_url: &str) -> Result<Self, DirectoryError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;
        Ok(Self {
            base_url: calls_base(server_url),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, url: String) -> Result<T, DirectoryError> {
        debug!(url = %url, "GET");
        let resp = self.client.get(&url).send().await.map_err(unavailable)?;
        decode(resp).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        url: String,
        body: &B,
    ) -> Result<T, DirectoryError> {
        debug!(url = %url, "POST");
        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(unavailable)?;
        decode(resp).await
    }
}

fn calls_base(server_url: &str) -> String {
    format!("{}/api/group-calls", server_url.trim_end_matches('/'))
}

fn unavailable(e: reqwest::Error) -> DirectoryError {
    DirectoryError::Unavailable(e.to_string())
}

/// Map a response status and body onto the directory error taxonomy.
fn classify(status: StatusCode, body: &str) -> DirectoryError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map(|e| e.error)
        .unwrap_or_else(|_| format!("server answered {status}"));

    if status == StatusCode::NOT_FOUND {
        DirectoryError::CallNotFound(message)
    } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        DirectoryError::Unavailable(message)
    } else {
        DirectoryError::Rejected(message)
    }
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, DirectoryError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(classify(status, &body));
    }
    resp.json::<T>()
        .await
        .map_err(|e| DirectoryError::Rejected(format!("invalid server response: {e}")))
}

#[async_trait]
impl CallDirectory for HttpCallDirectory {
    async fn participants(&self, call_id: &CallId) -> Result<Vec<Participant>, DirectoryError> {
        let resp: ParticipantsResponse = self
            .get(self.url(&format!("/{call_id}/participants")))
            .await?;
        Ok(resp.participants)
    }

    async fn create_call(
        &self,
        chat_id: &ChatId,
        creator: &ParticipantId,
    ) -> Result<CallSession, DirectoryError> {
        let body = CreateCallRequest {
            user_id: Some(creator.to_string()),
            chat_id: Some(chat_id.as_str().to_string()),
        };
        let resp: CallResponse = self.post(self.url(""), &body).await?;
        Ok(resp.call)
    }

    async fn join(&self, call_id: &CallId, user: &ParticipantId) -> Result<(), DirectoryError> {
        let body = MembershipRequest {
            user_id: Some(user.to_string()),
        };
        let _: serde_json::Value = self.post(self.url(&format!("/{call_id}/join")), &body).await?;
        Ok(())
    }

    async fn leave(&self, call_id: &CallId, user: &ParticipantId) -> Result<(), DirectoryError> {
        let body = MembershipRequest {
            user_id: Some(user.to_string()),
        };
        let _: serde_json::Value = self
            .post(self.url(&format!("/{call_id}/leave")), &body)
            .await?;
        Ok(())
    }

    async fn calls_for(&self, user: &ParticipantId) -> Result<Vec<CallSession>, DirectoryError> {
        debug!(user = %user.short(), "Listing calls");
        let resp = self
            .client
            .get(self.url(""))
            .query(&[("userId", user.as_str())])
            .send()
            .await
            .map_err(unavailable)?;
        let calls: CallsResponse = decode(resp).await?;
        Ok(calls.calls)
    }
}
