//! Shared test fixtures: scripted providers and event helpers

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use manifold::{
    Choice, Error, Event, EventStream, FinishReason, Message, Provider, Request, RequestContext,
    Response, Role, Usage,
};
use reqwest::StatusCode;
use tokio::sync::mpsc;

/// What a scripted provider does when called
pub enum Behavior {
    /// Succeed with the given assistant text
    Text(String),
    /// Always fail with the given HTTP status
    FailStatus(u16),
    /// Fail the first `n` calls with the status, then succeed with the text
    FailFirst(u32, u16, String),
    /// Never respond
    Hang,
}

/// In-process provider with scripted behavior
pub struct ScriptedProvider {
    name: String,
    models: Vec<String>,
    behavior: Behavior,
    calls: AtomicU32,
}

impl ScriptedProvider {
    pub fn text(name: &str, models: &[&str], text: &str) -> Arc<Self> {
        Self::with_behavior(name, models, Behavior::Text(text.to_owned()))
    }

    pub fn failing(name: &str, status: u16) -> Arc<Self> {
        Self::with_behavior(name, &[], Behavior::FailStatus(status))
    }

    pub fn fail_first(name: &str, failures: u32, status: u16, text: &str) -> Arc<Self> {
        Self::with_behavior(name, &[], Behavior::FailFirst(failures, status, text.to_owned()))
    }

    pub fn hanging(name: &str) -> Arc<Self> {
        Self::with_behavior(name, &[], Behavior::Hang)
    }

    pub fn with_behavior(name: &str, models: &[&str], behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_owned(),
            models: models.iter().map(|&m| m.to_owned()).collect(),
            behavior,
            calls: AtomicU32::new(0),
        })
    }

    /// Number of calls received so far
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }

    fn next_text(&self) -> Result<String, Error> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        match &self.behavior {
            Behavior::Text(text) => Ok(text.clone()),
            Behavior::FailStatus(status) => Err(api_error(&self.name, *status)),
            Behavior::FailFirst(failures, status, text) => {
                if call <= *failures {
                    Err(api_error(&self.name, *status))
                } else {
                    Ok(text.clone())
                }
            }
            Behavior::Hang => unreachable!("hang handled before next_text"),
        }
    }

    fn response(&self, model: &str, text: &str) -> Response {
        Response {
            id: "resp_1".into(),
            object: "chat.completion".into(),
            created: 1,
            model: model.to_owned(),
            provider: self.name.clone(),
            choices: vec![Choice {
                index: 0,
                message: Some(Message::assistant(text)),
                delta: None,
                finish_reason: Some(FinishReason::Stop),
            }],
            usage: Some(Usage {
                prompt_tokens: 1,
                completion_tokens: 1,
                total_tokens: 2,
            }),
        }
    }
}

fn api_error(provider: &str, status: u16) -> Error {
    let status = StatusCode::from_u16(status).unwrap();
    manifold::ApiError::from_status(provider, status, "scripted failure", None).into()
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn models(&self) -> Vec<String> {
        self.models.clone()
    }

    fn supports_tools(&self) -> bool {
        true
    }

    async fn complete(&self, _: &RequestContext, request: &Request) -> Result<Response, Error> {
        if matches!(self.behavior, Behavior::Hang) {
            self.calls.fetch_add(1, Ordering::Relaxed);
            return std::future::pending().await;
        }
        let text = self.next_text()?;
        Ok(self.response(&request.model, &text))
    }

    async fn stream(&self, ctx: &RequestContext, request: &Request) -> Result<EventStream, Error> {
        if matches!(self.behavior, Behavior::Hang) {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let (tx, rx) = mpsc::channel(1);
            let ctx = ctx.clone();
            tokio::spawn(async move {
                ctx.canceled().await;
                let _ = tx.send(Event::Error { error: Error::Canceled }).await;
            });
            return Ok(rx);
        }

        let text = self.next_text()?;
        let response = self.response(&request.model, &text);

        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            // Split the text into two content deltas to exercise assembly
            let midpoint = text.len() / 2;
            for fragment in [&text[..midpoint], &text[midpoint..]] {
                if fragment.is_empty() {
                    continue;
                }
                if tx
                    .send(Event::ContentDelta { text: fragment.to_owned() })
                    .await
                    .is_err()
                {
                    return;
                }
            }
            let _ = tx.send(Event::Done { response }).await;
        });

        Ok(rx)
    }
}

/// Drain a stream to close, returning every event
pub async fn drain(mut stream: EventStream) -> Vec<Event> {
    let mut events = Vec::new();
    while let Some(event) = stream.recv().await {
        events.push(event);
    }
    events
}

/// Concatenated text of all content deltas in a drained stream
pub fn concat_content(events: &[Event]) -> String {
    events
        .iter()
        .filter_map(|event| match event {
            Event::ContentDelta { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

/// The terminal Done response of a drained stream
pub fn done_response(events: &[Event]) -> &Response {
    match events.last() {
        Some(Event::Done { response }) => response,
        other => panic!("expected Done terminator, got {other:?}"),
    }
}

/// Assert the assistant role is consistent in a final response
pub fn assert_assistant(response: &Response) {
    let message = response.choices[0].message.as_ref().unwrap();
    assert_eq!(message.role, Role::Assistant);
}
