use std::sync::RwLock;

use secrecy::SecretString;
use tracing::info;

/// Bearer-token session shared by every request of one client.
///
/// A 401 from the collaborator clears the token; until a new one is installed every call
/// fails locally without reaching the network.
#[derive(Debug, Default)]
pub struct Session {
    token: RwLock<Option<SecretString>>,
}

impl Session {
    pub fn new(token: Option<SecretString>) -> Self {
        Self { token: RwLock::new(token) }
    }

    pub fn install(&self, token: SecretString) {
        match self.token.write() {
            Ok(mut slot) => *slot = Some(token),
            Err(poisoned) => *poisoned.into_inner() = Some(token),
        }
        info!(event_name = "remote.session_installed", "bearer token installed");
    }

    pub fn clear(&self) {
        match self.token.write() {
            Ok(mut slot) => *slot = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }

    pub fn bearer(&self) -> Option<SecretString> {
        match self.token.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.bearer().is_some()
    }
}
