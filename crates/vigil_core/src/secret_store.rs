//! In-memory account store. Pure data, no I/O and no time dependency;
//! durable persistence is a collaborator's job (see `ports::AccountRepository`).

use std::collections::HashMap;
use std::sync::RwLock;

use crate::entities::{Account, AccountId, Session};
use crate::error::Error;

#[derive(Default)]
pub struct SecretStore {
    accounts: RwLock<HashMap<AccountId, Account>>,
}

impl SecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &AccountId) -> Result<Account, Error> {
        self.accounts
            .read()
            .expect("secret store lock poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| Error::AccountNotFound(id.clone()))
    }

    /// Insert or replace an account. Validation happens when the account is
    /// built from its record (`MaFileRecord::into_account`), so only
    /// well-formed accounts can reach the store.
    pub fn put(&self, account: Account) -> AccountId {
        let id = account.id.clone();
        self.accounts
            .write()
            .expect("secret store lock poisoned")
            .insert(id.clone(), account);
        id
    }

    pub fn remove(&self, id: &AccountId) -> Result<Account, Error> {
        self.accounts
            .write()
            .expect("secret store lock poisoned")
            .remove(id)
            .ok_or_else(|| Error::AccountNotFound(id.clone()))
    }

    /// All accounts, ordered by id for stable listings.
    pub fn list(&self) -> Vec<Account> {
        let mut accounts: Vec<Account> = self
            .accounts
            .read()
            .expect("secret store lock poisoned")
            .values()
            .cloned()
            .collect();
        accounts.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        accounts
    }

    /// Replace (or clear) the session of a stored account.
    pub fn update_session(&self, id: &AccountId, session: Option<Session>) -> Result<(), Error> {
        let mut accounts = self.accounts.write().expect("secret store lock poisoned");
        let account = accounts
            .get_mut(id)
            .ok_or_else(|| Error::AccountNotFound(id.clone()))?;
        account.session = session;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Session;
    use serde_json::Map;

    fn account(name: &str) -> Account {
        Account {
            id: AccountId::new(name),
            account_name: name.to_string(),
            steam_id: "76561197960287930".to_string(),
            secrets: None,
            device_id: "android:device".to_string(),
            session: None,
            extra: Map::new(),
        }
    }

    #[test]
    fn test_put_get_remove() {
        let store = SecretStore::new();
        let id = store.put(account("TestUser"));

        let got = store.get(&id).unwrap();
        assert_eq!(got.account_name, "TestUser");

        store.remove(&id).unwrap();
        assert!(matches!(store.get(&id), Err(Error::AccountNotFound(_))));
    }

    #[test]
    fn test_get_unknown_account() {
        let store = SecretStore::new();
        let missing = AccountId::new("nobody");
        assert!(matches!(store.get(&missing), Err(Error::AccountNotFound(_))));
    }

    #[test]
    fn test_put_replaces_existing() {
        let store = SecretStore::new();
        store.put(account("TestUser"));

        let mut updated = account("TestUser");
        updated.device_id = "android:other".to_string();
        store.put(updated);

        assert_eq!(store.list().len(), 1);
        let got = store.get(&AccountId::new("testuser")).unwrap();
        assert_eq!(got.device_id, "android:other");
    }

    #[test]
    fn test_list_is_sorted() {
        let store = SecretStore::new();
        store.put(account("zeta"));
        store.put(account("alpha"));

        let names: Vec<String> = store.list().into_iter().map(|a| a.account_name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_update_session() {
        let store = SecretStore::new();
        let id = store.put(account("TestUser"));

        store
            .update_session(
                &id,
                Some(Session::new("acc".to_string(), "ref".to_string(), 42)),
            )
            .unwrap();
        assert_eq!(
            store.get(&id).unwrap().session.unwrap().access_token,
            "acc"
        );

        store.update_session(&id, None).unwrap();
        assert!(store.get(&id).unwrap().session.is_none());

        let missing = AccountId::new("nobody");
        assert!(store.update_session(&missing, None).is_err());
    }
}
