use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// Identity of whoever issued a call. Resolving sessions into a `Requester`
/// happens outside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Requester {
    #[default]
    Anonymous,
    User(UserId),
}

impl Requester {
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Requester::Anonymous => None,
            Requester::User(id) => Some(*id),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Requester::Anonymous)
    }
}

impl From<UserId> for Requester {
    fn from(id: UserId) -> Self {
        Requester::User(id)
    }
}

impl From<Option<UserId>> for Requester {
    fn from(id: Option<UserId>) -> Self {
        id.map_or(Requester::Anonymous, Requester::User)
    }
}
