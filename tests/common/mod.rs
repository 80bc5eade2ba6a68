#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use usage_watch::client::UsageSource;
use usage_watch::error::FetchError;
use usage_watch::models::{Service, SessionIdentity, UsageReport, UsageSample};
use usage_watch::notify::NotificationSink;

pub fn at(hour: u32, minute: u32, second: u32) -> Option<DateTime<Utc>> {
    Some(Utc.with_ymd_and_hms(2025, 1, 1, hour, minute, second).unwrap())
}

pub fn sample(percentage: f64, reset_at: Option<DateTime<Utc>>) -> UsageSample {
    UsageSample::new(percentage, reset_at)
}

pub fn claude_report(five_hour: f64, seven_day: f64, reset_at: Option<DateTime<Utc>>) -> UsageReport {
    let mut report = UsageReport::empty(Service::Claude);
    report
        .samples
        .push((SessionIdentity::ClaudeFiveHour, sample(five_hour, reset_at)));
    report
        .samples
        .push((SessionIdentity::ClaudeSevenDay, sample(seven_day, None)));
    report
}

/// Plays back a fixed list of responses, then repeats the last one
pub struct ScriptedSource {
    service: Service,
    credential: Option<String>,
    responses: Arc<Mutex<VecDeque<Result<UsageReport, FetchError>>>>,
    calls: Arc<AtomicU32>,
}

impl ScriptedSource {
    pub fn new(service: Service, responses: Vec<Result<UsageReport, FetchError>>) -> Self {
        Self {
            service,
            credential: Some("test-credential".to_string()),
            responses: Arc::new(Mutex::new(responses.into())),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn without_credential(mut self) -> Self {
        self.credential = None;
        self
    }

    pub fn calls(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.calls)
    }

    pub fn responses(&self) -> Arc<Mutex<VecDeque<Result<UsageReport, FetchError>>>> {
        Arc::clone(&self.responses)
    }
}

#[async_trait]
impl UsageSource for ScriptedSource {
    fn service(&self) -> Service {
        self.service
    }

    fn credential(&self) -> Option<&str> {
        self.credential.as_deref()
    }

    fn update_credential(&mut self, credential: Option<String>) {
        self.credential = credential;
    }

    async fn fetch(&mut self) -> Result<UsageReport, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut responses = self.responses.lock().unwrap();
        if responses.len() > 1 {
            responses.pop_front().unwrap()
        } else {
            responses
                .front()
                .cloned()
                .unwrap_or(Err(FetchError::Network("script exhausted".to_string())))
        }
    }
}

/// Collects every notification instead of showing it
#[derive(Clone, Default)]
pub struct RecordingSink {
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingSink {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, title: &str, body: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string()));
        Ok(())
    }
}
