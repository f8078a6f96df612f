//! Shared fixtures for scenario tests: a recording fake [`Publisher`] and a
//! helper to stand up a temp-file-backed [`Store`] plus [`Coordinator`]
//! without a live broker connection.

use std::sync::Mutex;

use async_trait::async_trait;
use whc_coordinator::{Coordinator, Publisher};
use whc_store::Store;

/// Records every outbound message instead of sending it anywhere, so
/// scenario tests can assert on exactly what the controller would have
/// published.
#[derive(Default)]
pub struct RecordingPublisher {
    pub to_client: Mutex<Vec<(String, String)>>,
    pub to_robot: Mutex<Vec<String>>,
    pub to_delivery: Mutex<Vec<String>>,
}

impl RecordingPublisher {
    pub fn client_messages_for(&self, uid: &str) -> Vec<String> {
        self.to_client
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == uid)
            .map(|(_, body)| body.clone())
            .collect()
    }

    pub fn robot_messages(&self) -> Vec<String> {
        self.to_robot.lock().unwrap().clone()
    }

    pub fn delivery_messages(&self) -> Vec<String> {
        self.to_delivery.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn send_to_client(&self, uid: &str, body: String) {
        self.to_client.lock().unwrap().push((uid.to_string(), body));
    }

    async fn send_to_robot(&self, body: String) {
        self.to_robot.lock().unwrap().push(body);
    }

    async fn send_to_delivery(&self, body: String) {
        self.to_delivery.lock().unwrap().push(body);
    }
}

/// A [`Coordinator`] wired to a throwaway SQLite file and a
/// [`RecordingPublisher`], plus the `TempDir` that must outlive it.
pub struct TestRig {
    pub coordinator: Coordinator<RecordingPublisher>,
    _dir: tempfile::TempDir,
}

impl TestRig {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("whc.db");
        let store = Store::connect(path.to_str().unwrap()).await.expect("connect store");
        Self { coordinator: Coordinator::new(store, RecordingPublisher::default()), _dir: dir }
    }

    pub fn publisher(&self) -> &RecordingPublisher {
        self.coordinator.publisher()
    }
}
