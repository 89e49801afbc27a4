//! Shared fixtures for the integration tests.
//!
//! Every harness runs against its own wiremock `MockServer` and its own
//! temporary cache directory.

#![allow(dead_code, reason = "not every test binary uses every helper")]

use std::sync::Arc;

use pushreg::{
    ChannelPrompter, Config, LocationSource, PermissionGateway, PermissionKind, PromptRequest,
    Runtime, StaticTokenProvider, SubscriberProfile,
};
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TENANT: &str = "T1";
pub const ROUTING_ID: &str = "C1";
pub const TOKEN: &str = "tok-abc";

/// A runtime wired to a mock directory.
pub struct Harness {
    pub server: MockServer,
    pub runtime: Runtime,
    pub tokens: StaticTokenProvider,
    pub prompter: ChannelPrompter,
    pub prompts: Option<UnboundedReceiver<PromptRequest>>,
    pub cache_dir: TempDir,
}

/// Options for [`harness_with`].
#[derive(Default)]
pub struct HarnessOptions {
    pub force_local_reset: Option<bool>,
    pub location_source: Option<Arc<dyn LocationSource>>,
    pub background_separate: bool,
}

pub async fn harness() -> Harness {
    harness_with(HarnessOptions::default()).await
}

pub async fn harness_with(options: HarnessOptions) -> Harness {
    let server = MockServer::start().await;
    let cache_dir = TempDir::new().unwrap();

    let mut config = Config {
        server_url: server.uri(),
        tenant_id: Some(TENANT.to_string()),
        request_timeout_secs: 5,
        location_interval_secs: 3600,
        location_fastest_interval_secs: 60,
        cache_dir: Some(cache_dir.path().to_path_buf()),
        ..Config::default()
    };
    if let Some(force) = options.force_local_reset {
        config.force_local_reset = force;
    }

    let tokens = StaticTokenProvider::new(TOKEN);
    let (prompter, prompts) = ChannelPrompter::new(options.background_separate);

    let mut builder = Runtime::builder(config)
        .token_provider(Arc::new(tokens.clone()))
        .prompter(Arc::new(prompter.clone()));
    if let Some(source) = options.location_source {
        builder = builder.location_source(source);
    }
    let runtime = builder.build().unwrap();

    Harness {
        server,
        runtime,
        tokens,
        prompter,
        prompts: Some(prompts),
        cache_dir,
    }
}

impl Harness {
    /// Answers every prompt with the given per-domain decisions.
    ///
    /// The task ends when the runtime is dropped; it yields the number of
    /// prompts it answered.
    pub fn answer_prompts(&mut self, notifications: bool, location: bool) -> JoinHandle<usize> {
        let mut prompts = self.prompts.take().expect("prompts already taken");
        let prompter = self.prompter.clone();
        let gateway: Arc<PermissionGateway> = Arc::clone(self.runtime.permissions());
        tokio::spawn(async move {
            let mut answered = 0;
            while let Some(request) = prompts.recv().await {
                let granted = match request.kind {
                    PermissionKind::Notification => notifications,
                    _ => location,
                };
                prompter.reply(&gateway, request, granted);
                answered += 1;
            }
            answered
        })
    }
}

/// The profile from the reference scenario.
pub fn sample_profile() -> SubscriberProfile {
    SubscriberProfile::new("u1")
        .with_interests(["sports"])
        .with_position(32.0, 34.7)
}

/// Mounts the tenant lookup, expecting exactly `times` calls.
pub async fn mount_client_id(server: &MockServer, times: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/applications/{TENANT}/client-id")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"clientId": ROUTING_ID, "appId": TENANT})),
        )
        .expect(times)
        .mount(server)
        .await;
}

/// Mounts a successful device registration, expecting `times` calls.
pub async fn mount_register(server: &MockServer, times: u64) {
    Mock::given(method("POST"))
        .and(path("/devices/register"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"ok": true})))
        .expect(times)
        .mount(server)
        .await;
}

/// Mounts a successful location update.
pub async fn mount_update_location(server: &MockServer) {
    Mock::given(method("PUT"))
        .and(path("/devices/update-location"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}
