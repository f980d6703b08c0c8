use anyhow::Result;
use rand::Rng;
use tracing::info;

use crate::storage::{self, Store};

const USER_ID_PREFIX: &str = "user-";
const USER_ID_LEN: usize = 13;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Anonymous, self-assigned handle for the local user. Not an authenticated account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub display_name: Option<String>,
}

/// Issues the identity lazily and keeps it in the local store.
pub struct IdentityProvider {
    store: Store,
    current: Option<Identity>,
}

impl IdentityProvider {
    /// Loads a previously persisted identity, if any. Never creates one.
    pub fn load(store: Store) -> Result<Self> {
        let current = match store.get(storage::USER_ID_KEY)? {
            Some(user_id) if !user_id.trim().is_empty() => Some(Identity {
                user_id,
                display_name: store
                    .get(storage::USERNAME_KEY)?
                    .filter(|name| !name.trim().is_empty()),
            }),
            _ => None,
        };
        Ok(Self { store, current })
    }

    pub fn current(&self) -> Option<&Identity> {
        self.current.as_ref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.current.as_ref().map(|identity| identity.user_id.as_str())
    }

    pub fn display_name(&self) -> Option<&str> {
        self.current
            .as_ref()
            .and_then(|identity| identity.display_name.as_deref())
    }

    /// Returns the identity, generating and persisting a user id on first use.
    pub fn ensure(&mut self) -> Result<&Identity> {
        let identity = match self.current.take() {
            Some(identity) => identity,
            None => {
                let user_id = generate_user_id();
                self.store.set(storage::USER_ID_KEY, &user_id)?;
                info!(user_id = %user_id, "identity: issued anonymous user id");
                Identity {
                    user_id,
                    display_name: self.store.get(storage::USERNAME_KEY)?,
                }
            }
        };
        Ok(self.current.insert(identity))
    }

    pub fn set_display_name(&mut self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(());
        }
        if self.display_name() == Some(name) {
            return Ok(());
        }
        self.store.set(storage::USERNAME_KEY, name)?;
        self.ensure()?;
        if let Some(identity) = self.current.as_mut() {
            identity.display_name = Some(name.to_string());
        }
        Ok(())
    }

    pub fn clear_display_name(&mut self) -> Result<()> {
        self.store.remove(storage::USERNAME_KEY)?;
        if let Some(identity) = self.current.as_mut() {
            identity.display_name = None;
        }
        Ok(())
    }
}

pub fn generate_user_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..USER_ID_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{USER_ID_PREFIX}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_created_lazily_and_persisted() {
        let store = Store::in_memory().unwrap();
        let mut provider = IdentityProvider::load(store.clone()).unwrap();
        assert!(provider.current().is_none());
        assert_eq!(store.get(storage::USER_ID_KEY).unwrap(), None);

        let user_id = provider.ensure().unwrap().user_id.clone();
        assert!(user_id.starts_with("user-"));
        assert_eq!(user_id.len(), USER_ID_PREFIX.len() + USER_ID_LEN);

        let again = provider.ensure().unwrap().user_id.clone();
        assert_eq!(user_id, again);

        let reloaded = IdentityProvider::load(store).unwrap();
        assert_eq!(reloaded.user_id(), Some(user_id.as_str()));
    }

    #[test]
    fn display_name_round_trips_through_store() {
        let store = Store::in_memory().unwrap();
        let mut provider = IdentityProvider::load(store.clone()).unwrap();
        provider.set_display_name("  Ada  ").unwrap();
        assert_eq!(provider.display_name(), Some("Ada"));
        assert!(provider.user_id().is_some());

        let reloaded = IdentityProvider::load(store.clone()).unwrap();
        assert_eq!(reloaded.display_name(), Some("Ada"));

        provider.clear_display_name().unwrap();
        assert_eq!(provider.display_name(), None);
        let reloaded = IdentityProvider::load(store).unwrap();
        assert_eq!(reloaded.display_name(), None);
    }

    #[test]
    fn blank_display_name_is_ignored() {
        let store = Store::in_memory().unwrap();
        let mut provider = IdentityProvider::load(store).unwrap();
        provider.set_display_name("   ").unwrap();
        assert!(provider.current().is_none());
    }
}
