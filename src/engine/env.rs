//! In-memory collaborators bundled for tests and the simulator.

use super::core::Services;
use crate::auth::{Credential, StaticAuthorizer};
use crate::clock::ManualClock;
use crate::config::ProtocolConfig;
use crate::events::EventCollector;
use crate::settlement::InMemoryVault;
use crate::types::Timestamp;

#[derive(Debug)]
pub struct InMemoryEnv {
    pub clock: ManualClock,
    pub vault: InMemoryVault,
    pub events: EventCollector,
    pub authorizer: StaticAuthorizer,
}

impl InMemoryEnv {
    pub fn new(config: &ProtocolConfig, start: Timestamp, admin: Credential) -> Self {
        Self {
            clock: ManualClock::new(start),
            vault: InMemoryVault::new(),
            events: EventCollector::new(config.max_events),
            authorizer: StaticAuthorizer::new(admin),
        }
    }

    pub fn services(&mut self) -> Services<'_> {
        Services {
            clock: &self.clock,
            vault: &mut self.vault,
            events: &mut self.events,
            authorizer: &self.authorizer,
        }
    }
}
