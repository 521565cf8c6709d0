use std::sync::Arc;

use models::{validate_user, User};
use tracing::{debug, info, instrument, warn};

use super::errors::DirectoryError;
use super::repository::DirectoryStore;
use crate::errors::StoreError;

fn internal(e: StoreError) -> DirectoryError {
    DirectoryError::Internal(e.to_string())
}

/// Directory business service independent of the web framework.
///
/// Performs no locking of its own; the pre-checks below give the caller a
/// precise outcome, while the store's atomic mutations settle races.
pub struct DirectoryService<S: DirectoryStore + ?Sized> {
    store: Arc<S>,
}

impl<S: DirectoryStore + ?Sized> Clone for DirectoryService<S> {
    fn clone(&self) -> Self {
        Self { store: Arc::clone(&self.store) }
    }
}

impl<S: DirectoryStore + ?Sized> DirectoryService<S> {
    pub fn new(store: Arc<S>) -> Self { Self { store } }

    /// Create a user whose name is not yet taken; echoes the input on success.
    ///
    /// # Examples
    /// ```
    /// use service::directory::{repository::mock::InMemoryDirectoryStore, DirectoryError, DirectoryService};
    /// use models::User;
    /// use std::sync::Arc;
    /// let svc = DirectoryService::new(Arc::new(InMemoryDirectoryStore::default()));
    /// let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
    /// let created = rt.block_on(svc.create_user(User::new("bob"))).unwrap();
    /// assert_eq!(created.username, "bob");
    /// let again = rt.block_on(svc.create_user(User::new("bob")));
    /// assert_eq!(again, Err(DirectoryError::AlreadyExists));
    /// ```
    #[instrument(skip(self, user), fields(username = %user.username))]
    pub async fn create_user(&self, user: User) -> Result<User, DirectoryError> {
        validate_user(&user).map_err(|e| DirectoryError::Invalid(e.to_string()))?;
        match self.store.lookup_user_by_name(&user.username).await {
            Ok(_) => {
                debug!("user exists");
                return Err(DirectoryError::AlreadyExists);
            }
            Err(StoreError::NotFound(_)) => {}
            Err(e) => return Err(internal(e)),
        }
        self.store.create_user(user.clone()).await.map_err(|e| match e {
            StoreError::AlreadyExists(_) => DirectoryError::AlreadyExists,
            other => internal(other),
        })?;
        info!("user_created");
        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn read_user(&self, name: &str) -> Result<User, DirectoryError> {
        match self.store.lookup_user_by_name(name).await {
            Ok(user) => Ok(user),
            Err(StoreError::NotFound(msg)) => Err(DirectoryError::Unknown(msg)),
            Err(e) => Err(internal(e)),
        }
    }

    /// Replace every field of an existing user; echoes the input on success.
    #[instrument(skip(self, user), fields(username = %user.username))]
    pub async fn update_user(&self, user: User) -> Result<User, DirectoryError> {
        validate_user(&user).map_err(|e| DirectoryError::Invalid(e.to_string()))?;
        match self.store.lookup_user_by_name(&user.username).await {
            Ok(_) => {}
            Err(StoreError::NotFound(_)) => return Err(DirectoryError::Unknown("No Such User".into())),
            Err(e) => return Err(internal(e)),
        }
        self.store.update_user(user.clone()).await.map_err(|e| match e {
            StoreError::NotFound(_) => DirectoryError::Unknown("No Such User".into()),
            other => internal(other),
        })?;
        info!("user_updated");
        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn delete_user(&self, name: &str) -> Result<(), DirectoryError> {
        match self.store.lookup_user_by_name(name).await {
            Ok(_) => {}
            Err(StoreError::NotFound(msg)) => return Err(DirectoryError::Unknown(msg)),
            Err(e) => return Err(internal(e)),
        }
        self.store.delete_user(name).await.map_err(|e| match e {
            StoreError::NotFound(msg) => DirectoryError::Unknown(msg),
            other => internal(other),
        })?;
        info!("user_deleted");
        Ok(())
    }

    /// All names, or up to `page_size` names containing `search`.
    /// Store failures yield an empty list.
    pub async fn list_users(&self, search: &str, page: i64, page_size: i64) -> Vec<String> {
        self.store.lookup_user_names(search, page, page_size).await.unwrap_or_else(|e| {
            warn!(error = %e, search, "user listing failed; returning no names");
            Vec::new()
        })
    }

    pub async fn read_roles(&self) -> Result<Vec<String>, DirectoryError> {
        self.store.lookup_role_names().await.map_err(internal)
    }
}
