use crate::model::Account;

/// Client-side cache of account records. The server owns the data; the
/// registry is only ever refreshed wholesale or patched in place after a
/// mutation the server has already confirmed.
#[derive(Debug, Default)]
pub struct AccountRegistry {
    accounts: Vec<Account>,
}

impl AccountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    pub fn get(&self, uid: &str) -> Option<&Account> {
        self.accounts.iter().find(|account| account.uid == uid)
    }

    /// Full replace from a successful server load. Callers keep the old
    /// list untouched when the load fails; there is no partial merge.
    pub fn replace_all(&mut self, accounts: Vec<Account>) {
        self.accounts = accounts;
    }

    /// Confirm-then-apply: patch the single matching record after the
    /// server call succeeded. Returns false when the uid is unknown.
    pub fn apply(&mut self, uid: &str, patch: impl FnOnce(&mut Account)) -> bool {
        match self.accounts.iter_mut().find(|account| account.uid == uid) {
            Some(account) => {
                patch(account);
                true
            }
            None => false,
        }
    }

    /// Drop the local record after a confirmed delete.
    pub fn remove(&mut self, uid: &str) -> bool {
        let before = self.accounts.len();
        self.accounts.retain(|account| account.uid != uid);
        self.accounts.len() != before
    }

    pub fn clear(&mut self) {
        self.accounts.clear();
    }

    /// Pure projection: case-insensitive substring match on nickname or
    /// substring match on uid, both against the same term. Never mutates
    /// the underlying list.
    pub fn filter<'a>(&'a self, term: &str) -> Vec<&'a Account> {
        if term.is_empty() {
            return self.accounts.iter().collect();
        }
        let needle = term.to_lowercase();
        self.accounts
            .iter()
            .filter(|account| {
                let nickname_hit = account
                    .nickname
                    .as_deref()
                    .is_some_and(|nickname| nickname.to_lowercase().contains(&needle));
                nickname_hit || account.uid.contains(term)
            })
            .collect()
    }
}
