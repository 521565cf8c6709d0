use async_trait::async_trait;
use models::User;

use crate::errors::StoreError;

/// Storage abstraction used by the directory service.
///
/// Mutations must be atomic with respect to their own existence check:
/// `create_user` fails with `AlreadyExists` when the name is taken,
/// `update_user`/`delete_user` fail with `NotFound` when it is absent.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn lookup_user_by_name(&self, username: &str) -> Result<User, StoreError>;
    async fn lookup_user_names(&self, search: &str, page: i64, page_size: i64) -> Result<Vec<String>, StoreError>;
    async fn create_user(&self, user: User) -> Result<(), StoreError>;
    async fn update_user(&self, user: User) -> Result<(), StoreError>;
    async fn delete_user(&self, username: &str) -> Result<(), StoreError>;
    async fn lookup_role_names(&self) -> Result<Vec<String>, StoreError>;
}

/// Simple in-memory store for tests and isolated setups
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Mutex, MutexGuard};

    use models::Role;

    use crate::storage::NameIndex;

    #[derive(Default)]
    pub struct InMemoryDirectoryStore {
        users: Mutex<HashMap<String, User>>,
        names: NameIndex,
        roles: Vec<Role>,
    }

    impl InMemoryDirectoryStore {
        /// Start from the given users and role catalog.
        pub fn seeded(users: impl IntoIterator<Item = User>, roles: impl IntoIterator<Item = Role>) -> Self {
            let users: HashMap<String, User> = users.into_iter().map(|u| (u.username.clone(), u)).collect();
            let names = NameIndex::new();
            names.rebuild(users.keys());
            Self { users: Mutex::new(users), names, roles: roles.into_iter().collect() }
        }

        fn users(&self) -> MutexGuard<'_, HashMap<String, User>> {
            self.users.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
        }
    }

    #[async_trait]
    impl DirectoryStore for InMemoryDirectoryStore {
        async fn lookup_user_by_name(&self, username: &str) -> Result<User, StoreError> {
            self.users().get(username).cloned().ok_or_else(|| StoreError::user_not_found(username))
        }

        async fn lookup_user_names(&self, search: &str, page: i64, page_size: i64) -> Result<Vec<String>, StoreError> {
            Ok(self.names.lookup_names(search, page, page_size))
        }

        async fn create_user(&self, user: User) -> Result<(), StoreError> {
            let mut users = self.users();
            if users.contains_key(&user.username) {
                return Err(StoreError::AlreadyExists(format!("user '{}'", user.username)));
            }
            users.insert(user.username.clone(), user);
            self.names.rebuild(users.keys());
            Ok(())
        }

        async fn update_user(&self, user: User) -> Result<(), StoreError> {
            let mut users = self.users();
            match users.get_mut(&user.username) {
                Some(slot) => {
                    *slot = user;
                    Ok(())
                }
                None => Err(StoreError::user_not_found(&user.username)),
            }
        }

        async fn delete_user(&self, username: &str) -> Result<(), StoreError> {
            let mut users = self.users();
            users.remove(username).ok_or_else(|| StoreError::user_not_found(username))?;
            self.names.rebuild(users.keys());
            Ok(())
        }

        async fn lookup_role_names(&self) -> Result<Vec<String>, StoreError> {
            Ok(self.roles.iter().map(|r| r.name.clone()).collect())
        }
    }
}
