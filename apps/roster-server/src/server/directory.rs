use std::{collections::HashMap, sync::Arc};

use roster_core::UserId;
use tokio::sync::RwLock;

/// Account status and display attributes as reported by the user directory.
#[derive(Debug, Clone)]
pub(crate) struct UserAccount {
    pub(crate) user_id: UserId,
    pub(crate) display_name: String,
    pub(crate) active: bool,
}

/// In-memory user directory. The wider account system lives outside this
/// core; the gateway only ever asks "does this user exist, is it active,
/// what should it be called".
#[derive(Clone, Default)]
pub(crate) struct UserDirectory {
    accounts: Arc<RwLock<HashMap<UserId, UserAccount>>>,
}

impl UserDirectory {
    pub(crate) fn from_accounts(accounts: HashMap<UserId, UserAccount>) -> Self {
        Self {
            accounts: Arc::new(RwLock::new(accounts)),
        }
    }

    pub(crate) async fn lookup(&self, user_id: UserId) -> Option<UserAccount> {
        self.accounts.read().await.get(&user_id).cloned()
    }

    pub(crate) async fn upsert(&self, account: UserAccount) {
        self.accounts.write().await.insert(account.user_id, account);
    }
}
