// Scripted mail gateway shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tokio::time::Instant;

use mailsieve::email::MessageRecord;
use mailsieve::gateway::{
    BatchResponse, GatewayError, LabelModification, MailGateway, MessageDetail, MessagePage, RemoteLabel,
};

#[derive(Default)]
struct FakeState {
    /// Listing pages keyed by the token that requests them ("" for the first page)
    pages: HashMap<String, MessagePage>,
    details: HashMap<String, MessageDetail>,
    failing_ids: HashSet<String>,
    labels: Vec<RemoteLabel>,
    fail_label_listing: bool,
    modify_script: VecDeque<Result<(), GatewayError>>,

    list_calls: usize,
    batch_calls: Vec<Vec<String>>,
    batch_instants: Vec<Instant>,
    modify_calls: Vec<(String, LabelModification)>,
    modify_instants: Vec<Instant>,
    create_calls: Vec<String>,
}

#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<FakeState>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mailbox of `pages` pages holding `per_page` unread messages each
    pub fn with_pages(pages: usize, per_page: usize) -> Self {
        let gateway = FakeGateway::new();
        for page in 0..pages {
            let ids: Vec<String> = (0..per_page).map(|n| format!("msg-{}-{}", page, n)).collect();
            for id in &ids {
                gateway.add_detail(id, detail(&format!("sender{}@example.com", page), "Hello", &["INBOX", "UNREAD"]));
            }
            let token = if page == 0 { String::new() } else { format!("page-{}", page) };
            let next = (page + 1 < pages).then(|| format!("page-{}", page + 1));
            gateway.lock().pages.insert(token, MessagePage { ids, next_page_token: next });
        }
        gateway
    }

    pub fn add_detail(&self, id: &str, detail: MessageDetail) {
        self.lock().details.insert(id.to_string(), detail);
    }

    pub fn fail_id(&self, id: &str) {
        self.lock().failing_ids.insert(id.to_string());
    }

    pub fn add_label(&self, id: &str, name: &str) {
        self.lock().labels.push(RemoteLabel {
            id: id.to_string(),
            name: name.to_string(),
        });
    }

    pub fn fail_label_listing(&self) {
        self.lock().fail_label_listing = true;
    }

    /// Results returned by the next modify calls, in order; success once exhausted
    pub fn script_modify(&self, results: Vec<Result<(), GatewayError>>) {
        self.lock().modify_script.extend(results);
    }

    pub fn list_calls(&self) -> usize {
        self.lock().list_calls
    }

    pub fn batch_calls(&self) -> Vec<Vec<String>> {
        self.lock().batch_calls.clone()
    }

    pub fn batch_instants(&self) -> Vec<Instant> {
        self.lock().batch_instants.clone()
    }

    pub fn modify_calls(&self) -> Vec<(String, LabelModification)> {
        self.lock().modify_calls.clone()
    }

    pub fn modify_instants(&self) -> Vec<Instant> {
        self.lock().modify_instants.clone()
    }

    pub fn create_calls(&self) -> Vec<String> {
        self.lock().create_calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl MailGateway for FakeGateway {
    async fn list_messages(&self, page_token: Option<&str>, _page_size: u32) -> Result<MessagePage, GatewayError> {
        let mut state = self.lock();
        state.list_calls += 1;
        Ok(state.pages.get(page_token.unwrap_or("")).cloned().unwrap_or_default())
    }

    async fn get_message_batch(&self, ids: &[String]) -> BatchResponse {
        let mut state = self.lock();
        state.batch_calls.push(ids.to_vec());
        state.batch_instants.push(Instant::now());
        ids.iter()
            .map(|id| {
                let response = if state.failing_ids.contains(id) {
                    Err(GatewayError::from_status(404, "not found"))
                } else {
                    state
                        .details
                        .get(id)
                        .cloned()
                        .ok_or_else(|| GatewayError::from_status(404, "not found"))
                };
                (id.clone(), response)
            })
            .collect()
    }

    async fn modify_message(&self, id: &str, modification: &LabelModification) -> Result<(), GatewayError> {
        let mut state = self.lock();
        state.modify_calls.push((id.to_string(), modification.clone()));
        state.modify_instants.push(Instant::now());
        state.modify_script.pop_front().unwrap_or(Ok(()))
    }

    async fn list_labels(&self) -> Result<Vec<RemoteLabel>, GatewayError> {
        let state = self.lock();
        if state.fail_label_listing {
            return Err(GatewayError::from_status(403, "insufficient permissions"));
        }
        Ok(state.labels.clone())
    }

    async fn create_label(&self, name: &str) -> Result<RemoteLabel, GatewayError> {
        let mut state = self.lock();
        state.create_calls.push(name.to_string());
        let label = RemoteLabel {
            id: format!("Label_{}", state.labels.len() + 1),
            name: name.to_string(),
        };
        state.labels.push(label.clone());
        Ok(label)
    }
}

pub fn detail(from: &str, subject: &str, labels: &[&str]) -> MessageDetail {
    MessageDetail {
        headers: vec![
            ("From".to_string(), from.to_string()),
            ("Subject".to_string(), subject.to_string()),
        ],
        snippet: Some(format!("{} ...", subject)),
        internal_date_millis: Some(Utc::now().timestamp_millis()),
        label_ids: labels.iter().map(|l| l.to_string()).collect(),
    }
}

pub fn record(id: &str, sender: &str, subject: &str, received_at: DateTime<Utc>) -> MessageRecord {
    MessageRecord {
        external_id: id.to_string(),
        sender: Some(sender.to_string()),
        subject: Some(subject.to_string()),
        snippet: None,
        received_at,
        is_read: false,
        labels: vec!["INBOX".to_string(), "UNREAD".to_string()],
    }
}
