use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use shared::{
    domain::{MessageId, RoomId},
    protocol::{EditMessageRequest, Message, NewMessage, UploadResponse},
};

/// A file staged locally for the two-phase "store, then publish" workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedFile {
    pub filename: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Request/response surface of the remote message API.
///
/// Implementations report transport or status failures as errors; callers map
/// them into the [`ChatError`](crate::error::ChatError) taxonomy.
#[async_trait]
pub trait MessageApi: Send + Sync {
    /// Fetches the full ordered snapshot for a room.
    async fn fetch_messages(&self, room: &RoomId) -> Result<Vec<Message>>;
    /// Creates a message; the remote assigns the ID.
    async fn create_message(&self, draft: &NewMessage) -> Result<Message>;
    /// Replaces the text of an existing message.
    async fn update_message(&self, id: &MessageId, text: &str) -> Result<Message>;
    async fn delete_message(&self, id: &MessageId) -> Result<()>;
    /// Stores a raw file and returns its locator.
    async fn upload_file(&self, file: &SelectedFile) -> Result<String>;
}

pub struct HttpApi {
    http: Client,
    base_url: String,
}

impl HttpApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl MessageApi for HttpApi {
    async fn fetch_messages(&self, room: &RoomId) -> Result<Vec<Message>> {
        let messages: Vec<Message> = self
            .http
            .get(format!("{}/messages/{room}", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(messages)
    }

    async fn create_message(&self, draft: &NewMessage) -> Result<Message> {
        let created: Message = self
            .http
            .post(format!("{}/messages", self.base_url))
            .json(draft)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(created)
    }

    async fn update_message(&self, id: &MessageId, text: &str) -> Result<Message> {
        let updated: Message = self
            .http
            .put(format!("{}/messages/{id}", self.base_url))
            .json(&EditMessageRequest {
                text: text.to_string(),
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(updated)
    }

    async fn delete_message(&self, id: &MessageId) -> Result<()> {
        self.http
            .delete(format!("{}/messages/{id}", self.base_url))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn upload_file(&self, file: &SelectedFile) -> Result<String> {
        let mut part =
            reqwest::multipart::Part::bytes(file.bytes.clone()).file_name(file.filename.clone());
        if let Some(mime) = &file.mime_type {
            part = part
                .mime_str(mime)
                .with_context(|| format!("invalid mime type: {mime}"))?;
        }
        let form = reqwest::multipart::Form::new().part("file", part);
        let response: UploadResponse = self
            .http
            .post(format!("{}/upload", self.base_url))
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.locator)
    }
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
