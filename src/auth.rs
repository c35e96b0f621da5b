// 12.0 auth.rs: admin capability check. start and every fee change present a Credential,
// the Authorizer decides whether it carries admin rights. how credentials are issued is not
// this crate's concern.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::types::AccountId;

// Proof an account offers when asking for an admin action
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Credential {
    pub holder: AccountId,
    pub token: String,
}

impl Credential {
    pub fn new(holder: AccountId, token: impl Into<String>) -> Self {
        Self {
            holder,
            token: token.into(),
        }
    }
}

pub trait Authorizer {
    fn verify(&self, credential: &Credential) -> bool;
}

// Fixed set of admin credentials
#[derive(Debug, Default, Clone)]
pub struct StaticAuthorizer {
    admins: HashSet<Credential>,
}

impl StaticAuthorizer {
    pub fn new(admin: Credential) -> Self {
        let mut authorizer = Self::default();
        authorizer.grant(admin);
        authorizer
    }

    pub fn grant(&mut self, credential: Credential) {
        self.admins.insert(credential);
    }

    pub fn revoke(&mut self, credential: &Credential) -> bool {
        self.admins.remove(credential)
    }
}

impl Authorizer for StaticAuthorizer {
    fn verify(&self, credential: &Credential) -> bool {
        self.admins.contains(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_granted_credentials_pass() {
        let admin = Credential::new(AccountId(1), "root");
        let mut auth = StaticAuthorizer::new(admin.clone());

        assert!(auth.verify(&admin));
        assert!(!auth.verify(&Credential::new(AccountId(1), "guess")));
        assert!(!auth.verify(&Credential::new(AccountId(2), "root")));

        assert!(auth.revoke(&admin));
        assert!(!auth.verify(&admin));
    }
}
