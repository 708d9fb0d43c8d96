// 9.3 identity.rs: the only thing the engine needs from the user directory is KYC status.

use crate::types::UserId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KycStatus {
    Unverified,
    Pending,
    Verified,
    Rejected,
}

pub trait CustomerDirectory: Send + Sync {
    /// None when the user is unknown.
    fn kyc_status(&self, user_id: UserId) -> Option<KycStatus>;
}

#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    users: RwLock<HashMap<UserId, KycStatus>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_kyc(&self, user_id: UserId, status: KycStatus) {
        self.users
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id, status);
    }

    pub fn verified(users: impl IntoIterator<Item = UserId>) -> Self {
        let directory = Self::new();
        for user in users {
            directory.set_kyc(user, KycStatus::Verified);
        }
        directory
    }
}

impl CustomerDirectory for InMemoryDirectory {
    fn kyc_status(&self, user_id: UserId) -> Option<KycStatus> {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user_id)
            .copied()
    }
}
