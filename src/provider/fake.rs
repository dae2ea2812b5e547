//! In-process provider for tests

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;

use crate::settings::Settings;

use super::Destination;
use super::Error;
use super::Result;
use super::RuleProvider;

/// Provider keeping its rules in memory, with switches to make calls fail
#[derive(Debug, Default)]
pub struct FakeProvider {
    /// Live rules: rule ID to (address, destination)
    rules: Mutex<HashMap<String, (String, String)>>,

    /// Destination addresses
    destinations: Mutex<Vec<Destination>>,

    /// Used to hand out rule IDs
    next_rule: AtomicUsize,

    /// Number of create calls, failed ones included
    create_calls: AtomicUsize,

    /// Number of delete calls, failed ones included
    delete_calls: AtomicUsize,

    /// Make create calls fail
    fail_create: AtomicBool,

    /// Make delete calls fail
    fail_delete: AtomicBool,

    /// Time a delete call takes
    delete_delay: Mutex<Duration>,

    /// Make connection tests fail
    fail_connection: AtomicBool,

    /// API token of the last connection test
    tested_token: Mutex<Option<String>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn fail_connection(&self, fail: bool) {
        self.fail_connection.store(fail, Ordering::SeqCst);
    }

    pub fn tested_token(&self) -> Option<String> {
        self.tested_token.lock().unwrap().clone()
    }

    pub fn delay_delete(&self, delay: Duration) {
        *self.delete_delay.lock().unwrap() = delay;
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn has_rule(&self, rule_id: &str) -> bool {
        self.rules.lock().unwrap().contains_key(rule_id)
    }

    pub fn rule_count(&self) -> usize {
        self.rules.lock().unwrap().len()
    }
}

#[async_trait]
impl RuleProvider for FakeProvider {
    async fn create_rule(
        &self,
        _settings: &Settings,
        address: &str,
        destination: &str,
    ) -> Result<String> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Error::Api("Rule creation refused".to_string()));
        }

        let rule_id = format!("rule-{}", self.next_rule.fetch_add(1, Ordering::SeqCst) + 1);

        self.rules.lock().unwrap().insert(
            rule_id.clone(),
            (address.to_string(), destination.to_string()),
        );

        Ok(rule_id)
    }

    async fn delete_rule(&self, _settings: &Settings, rule_id: &str) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delete_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(Error::Api("Rule deletion refused".to_string()));
        }

        self.rules
            .lock()
            .unwrap()
            .remove(rule_id)
            .map(|_| ())
            .ok_or_else(|| Error::Api("Rule not found".to_string()))
    }

    async fn list_destinations(&self, _settings: &Settings) -> Result<Vec<Destination>> {
        Ok(self.destinations.lock().unwrap().clone())
    }

    async fn create_destination(&self, _settings: &Settings, email: &str) -> Result<()> {
        let mut destinations = self.destinations.lock().unwrap();

        let destination = Destination {
            id: format!("destination-{}", destinations.len() + 1),
            email: email.to_string(),
            verified: None,
        };

        destinations.push(destination);

        Ok(())
    }

    async fn delete_destination(&self, _settings: &Settings, destination_id: &str) -> Result<()> {
        let mut destinations = self.destinations.lock().unwrap();

        let before = destinations.len();
        destinations.retain(|destination| destination.id != destination_id);

        if destinations.len() == before {
            Err(Error::Api("Destination not found".to_string()))
        } else {
            Ok(())
        }
    }

    async fn test_connection(&self, settings: &Settings) -> Result<()> {
        *self.tested_token.lock().unwrap() = Some(settings.api_token.clone());

        if self.fail_connection.load(Ordering::SeqCst) {
            return Err(Error::Api("Invalid API token".to_string()));
        }

        Ok(())
    }
}
