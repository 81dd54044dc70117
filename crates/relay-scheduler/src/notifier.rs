// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! ntfy-compatible push notifications. Best-effort: a failed send is logged,
//! never propagated — a notification failure must not prevent the task or
//! reminder from being recorded as fired.

pub struct Notifier {
    client: reqwest::Client,
    url: Option<String>,
}

impl Notifier {
    pub fn new(url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }

    pub async fn send(&self, title: &str, message: &str) {
        let Some(url) = &self.url else { return };
        let result = self
            .client
            .post(url)
            .header("Title", title)
            .body(message.to_string())
            .send()
            .await;
        if let Err(e) = result {
            tracing::warn!(error = %e, "ntfy notification failed");
        }
    }
}
