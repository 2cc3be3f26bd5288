use anyhow::{Result, Context};
use async_trait::async_trait;
use google_gmail1::api::{Label, ModifyMessageRequest, Scope};
use google_gmail1::{Gmail, hyper, hyper_rustls, oauth2};
use log::{info, debug};

use crate::config::GmailConfig;
use crate::gateway::{
    BatchResponse, GatewayError, LabelModification, MailGateway, MessageDetail, MessagePage, RemoteLabel,
};

const USER_ID: &str = "me";

pub struct GmailGateway {
    hub: Gmail<hyper_rustls::HttpsConnector<hyper::client::HttpConnector>>,
}

impl GmailGateway {
    pub async fn new(config: &GmailConfig) -> Result<Self> {
        info!("Connecting to Gmail API via OAuth2");

        // Read OAuth2 client credentials from file
        let secret = oauth2::read_application_secret(&config.credentials_path)
            .await
            .context("Unable to read OAuth2 client credentials file")?;

        // Scope::Modify covers reading messages and changing their labels
        let auth = oauth2::InstalledFlowAuthenticator::builder(
            secret,
            oauth2::InstalledFlowReturnMethod::HTTPRedirect,
        )
        .persist_tokens_to_disk(&config.token_cache_path)
        .build()
        .await
        .context("Unable to create OAuth2 authenticator")?;

        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()?
            .https_or_http()
            .enable_http1()
            .build();

        let client = hyper::Client::builder().build(connector);

        let hub = Gmail::new(client, auth);

        info!("✅ Gmail API connection established successfully");

        Ok(GmailGateway { hub })
    }

    async fn fetch_detail(&self, message_id: &str) -> Result<MessageDetail, GatewayError> {
        debug!("Retrieving email metadata for ID: {}", message_id);

        let (_, message) = self.hub
            .users()
            .messages_get(USER_ID, message_id)
            .format("metadata")
            .add_metadata_headers("From")
            .add_metadata_headers("Subject")
            .add_scope(Scope::Modify)
            .doit()
            .await
            .map_err(classify_error)?;

        let headers = message
            .payload
            .and_then(|payload| payload.headers)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|header| match (header.name, header.value) {
                (Some(name), Some(value)) => Some((name, value)),
                _ => None,
            })
            .collect();

        Ok(MessageDetail {
            headers,
            snippet: message.snippet,
            internal_date_millis: message.internal_date,
            label_ids: message.label_ids.unwrap_or_default(),
        })
    }
}

/// Map a Gmail client error onto the transient/permanent split
fn classify_error(error: google_gmail1::Error) -> GatewayError {
    match error {
        google_gmail1::Error::Failure(response) => {
            let status = response.status();
            GatewayError::from_status(status.as_u16(), format!("HTTP {}", status))
        }
        google_gmail1::Error::BadRequest(body) => {
            let message = body
                .pointer("/error/message")
                .and_then(|m| m.as_str())
                .unwrap_or("bad request")
                .to_string();
            match body.pointer("/error/code").and_then(|c| c.as_u64()) {
                Some(code) => GatewayError::from_status(code as u16, message),
                None => GatewayError::permanent(message),
            }
        }
        other => GatewayError::permanent(other.to_string()),
    }
}

#[async_trait]
impl MailGateway for GmailGateway {
    async fn list_messages(&self, page_token: Option<&str>, page_size: u32) -> Result<MessagePage, GatewayError> {
        let mut call = self.hub
            .users()
            .messages_list(USER_ID)
            .max_results(page_size)
            .add_scope(Scope::Modify);
        if let Some(token) = page_token {
            call = call.page_token(token);
        }

        let (_, response) = call.doit().await.map_err(classify_error)?;

        let ids: Vec<String> = response
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|msg| msg.id)
            .collect();

        debug!("Listed {} message id(s)", ids.len());

        Ok(MessagePage {
            ids,
            next_page_token: response.next_page_token,
        })
    }

    /// google-gmail1 exposes no batch endpoint, so the ids are fetched one GET
    /// at a time; pacing between batches still applies at the caller
    async fn get_message_batch(&self, ids: &[String]) -> BatchResponse {
        let mut responses = Vec::with_capacity(ids.len());
        for id in ids {
            let detail = self.fetch_detail(id).await;
            responses.push((id.clone(), detail));
        }
        responses
    }

    async fn modify_message(&self, id: &str, modification: &LabelModification) -> Result<(), GatewayError> {
        let request = ModifyMessageRequest {
            add_label_ids: Some(modification.add_label_ids.clone()).filter(|ids| !ids.is_empty()),
            remove_label_ids: Some(modification.remove_label_ids.clone()).filter(|ids| !ids.is_empty()),
        };

        self.hub
            .users()
            .messages_modify(request, USER_ID, id)
            .add_scope(Scope::Modify)
            .doit()
            .await
            .map_err(classify_error)?;

        Ok(())
    }

    async fn list_labels(&self) -> Result<Vec<RemoteLabel>, GatewayError> {
        let (_, response) = self.hub
            .users()
            .labels_list(USER_ID)
            .add_scope(Scope::Modify)
            .doit()
            .await
            .map_err(classify_error)?;

        Ok(response
            .labels
            .unwrap_or_default()
            .into_iter()
            .filter_map(|label| match (label.id, label.name) {
                (Some(id), Some(name)) => Some(RemoteLabel { id, name }),
                _ => None,
            })
            .collect())
    }

    async fn create_label(&self, name: &str) -> Result<RemoteLabel, GatewayError> {
        let request = Label {
            name: Some(name.to_string()),
            label_list_visibility: Some("labelShow".to_string()),
            message_list_visibility: Some("show".to_string()),
            ..Default::default()
        };

        let (_, label) = self.hub
            .users()
            .labels_create(request, USER_ID)
            .add_scope(Scope::Modify)
            .doit()
            .await
            .map_err(classify_error)?;

        let id = label
            .id
            .ok_or_else(|| GatewayError::permanent(format!("created label '{}' has no ID", name)))?;

        Ok(RemoteLabel {
            id,
            name: label.name.unwrap_or_else(|| name.to_string()),
        })
    }
}
