use std::{
    collections::HashMap,
    fs::File,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use models::{Role, User};
use tokio::{
    fs,
    sync::{OnceCell, RwLock},
};
use tracing::{debug, info, warn};

use super::{codec, index::NameIndex, lock::StoreLock};
use crate::directory::repository::DirectoryStore;
use crate::errors::StoreError;

/// Where the store keeps its tables and how writers coordinate.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub users_file: PathBuf,
    pub roles_file: PathBuf,
    pub lock_file: PathBuf,
    pub lock_retries: u32,
    pub lock_backoff: Duration,
}

impl StoreConfig {
    /// Both tables disabled; everything lives in memory only.
    pub fn in_memory() -> Self {
        Self {
            users_file: PathBuf::from(configs::NO_PERSISTENCE),
            roles_file: PathBuf::from(configs::NO_PERSISTENCE),
            lock_file: configs::default_lock_file(),
            lock_retries: 0,
            lock_backoff: Duration::ZERO,
        }
    }
}

impl From<&configs::StorageConfig> for StoreConfig {
    fn from(cfg: &configs::StorageConfig) -> Self {
        Self {
            users_file: PathBuf::from(&cfg.users_file),
            roles_file: PathBuf::from(&cfg.roles_file),
            lock_file: cfg.lock_path(),
            lock_retries: cfg.lock_retries,
            lock_backoff: Duration::from_millis(cfg.lock_backoff_ms),
        }
    }
}

/// True for the `NONE` path that switches persistence off.
pub fn is_sentinel(path: &Path) -> bool {
    path.to_str().is_some_and(|s| s.trim().eq_ignore_ascii_case(configs::NO_PERSISTENCE))
}

struct Tables {
    users: RwLock<HashMap<String, User>>,
    names: NameIndex,
    roles: Vec<Role>,
}

enum Mutation {
    Insert(User),
    Replace(User),
    Remove(String),
}

/// How to put the user map back after a failed write.
enum Undo {
    Forget(String),
    Restore(User),
}

impl Tables {
    /// Existence check, in-memory change, file rewrite and index rebuild under
    /// one write guard. Memory is reverted when the rewrite fails.
    async fn apply(&self, config: Arc<StoreConfig>, mutation: Mutation) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        let (op, undo) = match mutation {
            Mutation::Insert(user) => {
                if users.contains_key(&user.username) {
                    return Err(StoreError::AlreadyExists(format!("user '{}'", user.username)));
                }
                let key = user.username.clone();
                users.insert(key.clone(), user);
                ("create", Undo::Forget(key))
            }
            Mutation::Replace(user) => {
                let Some(slot) = users.get_mut(&user.username) else {
                    return Err(StoreError::user_not_found(&user.username));
                };
                ("update", Undo::Restore(std::mem::replace(slot, user)))
            }
            Mutation::Remove(username) => {
                let Some(removed) = users.remove(&username) else {
                    return Err(StoreError::user_not_found(&username));
                };
                ("delete", Undo::Restore(removed))
            }
        };
        if let Err(e) = persist(config, &users).await {
            match undo {
                Undo::Forget(key) => {
                    warn!(username = %key, error = %e, op, "mutation rolled back");
                    users.remove(&key);
                }
                Undo::Restore(previous) => {
                    warn!(username = %previous.username, error = %e, op, "mutation rolled back");
                    users.insert(previous.username.clone(), previous);
                }
            }
            return Err(e);
        }
        self.names.rebuild(users.keys());
        Ok(())
    }
}

/// Rewrite the whole user table from `users`.
async fn persist(config: Arc<StoreConfig>, users: &HashMap<String, User>) -> Result<(), StoreError> {
    if is_sentinel(&config.users_file) {
        return Ok(());
    }
    let mut sorted: Vec<&User> = users.values().collect();
    sorted.sort_unstable_by(|a, b| a.username.cmp(&b.username));
    let content = codec::encode_users(sorted);

    let path = config.users_file.clone();
    let started = Instant::now();
    tokio::task::spawn_blocking(move || write_locked(&config, &content))
        .await
        .map_err(|e| StoreError::Task(e.to_string()))??;
    info!(path = %path.display(), users = users.len(), elapsed = ?started.elapsed(), "user table written");
    Ok(())
}

/// Flat-file record store.
///
/// Tables are read once, on first use, and served from memory afterwards.
/// Every mutation holds the user-map write lock across the existence check,
/// the in-memory change, the full rewrite of the user file and the index
/// rebuild, so check-then-act is atomic within the process. Mutations run on
/// their own task: dropping the caller's future never stops one half way.
/// Writes across processes are serialized by the advisory [`StoreLock`].
pub struct CsvRecordStore {
    config: Arc<StoreConfig>,
    tables: OnceCell<Arc<Tables>>,
}

impl CsvRecordStore {
    pub fn new(config: StoreConfig) -> Self {
        Self { config: Arc::new(config), tables: OnceCell::new() }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Force the lazy load. A failure is returned, not cached; the next call retries.
    pub async fn warm_up(&self) -> Result<(), StoreError> {
        self.tables().await.map(|_| ())
    }

    pub fn is_loaded(&self) -> bool {
        self.tables.initialized()
    }

    async fn tables(&self) -> Result<&Arc<Tables>, StoreError> {
        self.tables.get_or_try_init(|| async { self.load().await.map(Arc::new) }).await
    }

    async fn load(&self) -> Result<Tables, StoreError> {
        let started = Instant::now();
        let users = self.load_users().await?;
        let roles = self.load_roles().await?;
        let names = NameIndex::new();
        names.rebuild(users.keys());
        debug!(elapsed = ?started.elapsed(), "store loaded");
        Ok(Tables { users: RwLock::new(users), names, roles })
    }

    async fn load_users(&self) -> Result<HashMap<String, User>, StoreError> {
        let path = &self.config.users_file;
        info!(path = %path.display(), "reading user table");
        let mut users = HashMap::new();
        if is_sentinel(path) {
            return Ok(users);
        }
        let text = fs::read_to_string(path).await.map_err(|e| StoreError::io(path, e))?;
        let (rows, malformed) = codec::decode_users(&text);
        for bad in &malformed {
            warn!(path = %path.display(), line = bad.line, reason = %bad.reason, "skipping malformed user row");
        }
        for user in rows {
            let username = user.username.clone();
            if users.insert(username.clone(), user).is_some() {
                warn!(path = %path.display(), %username, "duplicate user row; later row wins");
            }
        }
        info!(users = users.len(), skipped = malformed.len(), "user table loaded");
        Ok(users)
    }

    async fn load_roles(&self) -> Result<Vec<Role>, StoreError> {
        let path = &self.config.roles_file;
        info!(path = %path.display(), "reading role table");
        if is_sentinel(path) {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(path).await.map_err(|e| StoreError::io(path, e))?;
        let roles = codec::decode_roles(&text);
        info!(roles = roles.len(), "role table loaded");
        Ok(roles)
    }

    async fn mutate(&self, mutation: Mutation) -> Result<(), StoreError> {
        let tables = Arc::clone(self.tables().await?);
        let config = Arc::clone(&self.config);
        tokio::spawn(async move { tables.apply(config, mutation).await })
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    pub async fn lookup_user_by_name(&self, username: &str) -> Result<User, StoreError> {
        let tables = self.tables().await?;
        let users = tables.users.read().await;
        users.get(username).cloned().ok_or_else(|| StoreError::user_not_found(username))
    }

    /// Insert `user` unless its username is taken.
    pub async fn insert_if_absent(&self, user: User) -> Result<(), StoreError> {
        self.mutate(Mutation::Insert(user)).await
    }

    /// Replace the stored record with the same username.
    pub async fn replace_if_present(&self, user: User) -> Result<(), StoreError> {
        self.mutate(Mutation::Replace(user)).await
    }

    pub async fn remove_if_present(&self, username: &str) -> Result<(), StoreError> {
        self.mutate(Mutation::Remove(username.to_string())).await
    }

    pub async fn lookup_user_names(&self, search: &str, page: i64, page_size: i64) -> Result<Vec<String>, StoreError> {
        let tables = self.tables().await?;
        Ok(tables.names.lookup_names(search, page, page_size))
    }

    /// Role catalog as loaded; never changes at runtime.
    pub async fn lookup_role_names(&self) -> Result<Vec<String>, StoreError> {
        let tables = self.tables().await?;
        Ok(tables.roles.iter().map(|r| r.name.clone()).collect())
    }

    pub async fn user_count(&self) -> Result<usize, StoreError> {
        let tables = self.tables().await?;
        let users = tables.users.read().await;
        Ok(users.len())
    }
}

/// Truncate and rewrite the data file while holding the advisory lock.
fn write_locked(config: &StoreConfig, content: &str) -> Result<(), StoreError> {
    let _lock = StoreLock::acquire(&config.lock_file, config.lock_retries, config.lock_backoff)?;
    let path = &config.users_file;
    let mut file = File::create(path).map_err(|e| StoreError::io(path, e))?;
    file.write_all(content.as_bytes()).map_err(|e| StoreError::io(path, e))?;
    file.sync_all().map_err(|e| StoreError::io(path, e))?;
    Ok(())
}

#[async_trait]
impl DirectoryStore for CsvRecordStore {
    async fn lookup_user_by_name(&self, username: &str) -> Result<User, StoreError> { self.lookup_user_by_name(username).await }
    async fn lookup_user_names(&self, search: &str, page: i64, page_size: i64) -> Result<Vec<String>, StoreError> {
        self.lookup_user_names(search, page, page_size).await
    }
    async fn create_user(&self, user: User) -> Result<(), StoreError> { self.insert_if_absent(user).await }
    async fn update_user(&self, user: User) -> Result<(), StoreError> { self.replace_if_present(user).await }
    async fn delete_user(&self, username: &str) -> Result<(), StoreError> { self.remove_if_present(username).await }
    async fn lookup_role_names(&self) -> Result<Vec<String>, StoreError> { self.lookup_role_names().await }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    struct Fixture {
        dir: PathBuf,
        config: StoreConfig,
    }

    impl Fixture {
        async fn new(users: &str, roles: &str) -> anyhow::Result<Self> {
            let dir = std::env::temp_dir().join(format!("csv_store_{}", Uuid::new_v4()));
            fs::create_dir_all(&dir).await?;
            let config = StoreConfig {
                users_file: dir.join("users.csv"),
                roles_file: dir.join("roles.csv"),
                lock_file: dir.join("userstore.lock"),
                lock_retries: 0,
                lock_backoff: Duration::ZERO,
            };
            fs::write(&config.users_file, users).await?;
            fs::write(&config.roles_file, roles).await?;
            Ok(Self { dir, config })
        }

        fn store(&self) -> CsvRecordStore {
            CsvRecordStore::new(self.config.clone())
        }

        async fn cleanup(self) {
            let _ = fs::remove_dir_all(&self.dir).await;
        }
    }

    const USERS: &str = "username,password,enabled,roles,claim1,claim2\n\
                         bob,pw,false,user,,\n\
                         alice,pw,true,admin:user,c1,c2\n";

    #[tokio::test]
    async fn loads_lazily_and_serves_from_memory() -> anyhow::Result<()> {
        let fx = Fixture::new(USERS, "name\nadmin\nuser\n").await?;
        let store = fx.store();
        assert!(!store.is_loaded());

        let alice = store.lookup_user_by_name("alice").await?;
        assert!(store.is_loaded());
        assert!(alice.enabled);
        assert_eq!(alice.roles, vec!["admin", "user"]);
        assert_eq!(store.lookup_role_names().await?, vec!["admin", "user"]);

        // the file is not re-read after the first load
        fs::remove_file(&fx.config.users_file).await?;
        assert_eq!(store.lookup_user_names("", -1, -1).await?, vec!["alice", "bob"]);
        assert!(matches!(store.lookup_user_by_name("carol").await, Err(StoreError::NotFound(_))));
        fx.cleanup().await;
        Ok(())
    }

    #[tokio::test]
    async fn missing_file_fails_load_without_caching() -> anyhow::Result<()> {
        let fx = Fixture::new(USERS, "name\n").await?;
        fs::remove_file(&fx.config.users_file).await?;
        let store = fx.store();
        assert!(matches!(store.warm_up().await, Err(StoreError::Io { .. })));
        assert!(!store.is_loaded());

        fs::write(&fx.config.users_file, USERS).await?;
        store.warm_up().await?;
        assert_eq!(store.user_count().await?, 2);
        fx.cleanup().await;
        Ok(())
    }

    #[tokio::test]
    async fn malformed_rows_are_skipped() -> anyhow::Result<()> {
        let fx = Fixture::new("username,password,enabled,roles,claim1,claim2\nbroken\nok,pw,true,,,\n", "name\n").await?;
        let store = fx.store();
        assert_eq!(store.lookup_user_names("", -1, -1).await?, vec!["ok"]);
        fx.cleanup().await;
        Ok(())
    }

    #[tokio::test]
    async fn mutations_rewrite_the_file() -> anyhow::Result<()> {
        let fx = Fixture::new(USERS, "name\n").await?;
        let store = fx.store();

        let mut carol = User::new("carol");
        carol.roles = vec!["user".into()];
        store.insert_if_absent(carol.clone()).await?;
        assert!(matches!(store.insert_if_absent(carol.clone()).await, Err(StoreError::AlreadyExists(_))));

        carol.enabled = true;
        store.replace_if_present(carol.clone()).await?;
        store.remove_if_present("bob").await?;
        assert!(matches!(store.remove_if_present("bob").await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.replace_if_present(User::new("nobody")).await, Err(StoreError::NotFound(_))));

        let text = fs::read_to_string(&fx.config.users_file).await?;
        assert_eq!(
            text,
            "username,password,enabled,roles,claim1,claim2\nalice,pw,true,admin:user,c1,c2\ncarol,,true,user,,\n"
        );

        // a fresh store sees the same state
        let reopened = fx.store();
        assert_eq!(reopened.lookup_user_names("", -1, -1).await?, vec!["alice", "carol"]);
        assert!(reopened.lookup_user_by_name("carol").await?.enabled);
        fx.cleanup().await;
        Ok(())
    }

    #[tokio::test]
    async fn failed_write_rolls_back_memory() -> anyhow::Result<()> {
        let fx = Fixture::new(USERS, "name\n").await?;
        let store = fx.store();
        store.warm_up().await?;

        let held = StoreLock::acquire(&fx.config.lock_file, 0, Duration::ZERO)?;
        let err = store.insert_if_absent(User::new("carol")).await.unwrap_err();
        assert!(matches!(err, StoreError::LockContended(_)));
        assert!(matches!(store.lookup_user_by_name("carol").await, Err(StoreError::NotFound(_))));

        let mut bob = store.lookup_user_by_name("bob").await?;
        bob.enabled = true;
        assert!(store.replace_if_present(bob).await.is_err());
        assert!(!store.lookup_user_by_name("bob").await?.enabled);

        assert!(store.remove_if_present("alice").await.is_err());
        assert_eq!(store.lookup_user_names("", -1, -1).await?, vec!["alice", "bob"]);
        drop(held);

        store.insert_if_absent(User::new("carol")).await?;
        assert_eq!(store.user_count().await?, 3);
        fx.cleanup().await;
        Ok(())
    }

    #[tokio::test]
    async fn sentinel_paths_keep_everything_in_memory() -> anyhow::Result<()> {
        let store = CsvRecordStore::new(StoreConfig::in_memory());
        assert!(store.lookup_role_names().await?.is_empty());
        store.insert_if_absent(User::new("zed")).await?;
        store.insert_if_absent(User::new("amy")).await?;
        assert_eq!(store.lookup_user_names("", -1, -1).await?, vec!["amy", "zed"]);
        store.remove_if_present("zed").await?;
        assert_eq!(store.lookup_user_names("", -1, -1).await?, vec!["amy"]);
        assert!(is_sentinel(Path::new("none")));
        assert!(!is_sentinel(Path::new("users.csv")));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn dropped_caller_still_completes_the_mutation() -> anyhow::Result<()> {
        let fx = Fixture::new(USERS, "name\n").await?;
        let mut config = fx.config.clone();
        config.lock_retries = 20;
        config.lock_backoff = Duration::from_millis(20);
        let store = Arc::new(CsvRecordStore::new(config));
        store.warm_up().await?;

        let held = StoreLock::acquire(&fx.config.lock_file, 0, Duration::ZERO)?;
        let caller = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.insert_if_absent(User::new("carol")).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        caller.abort();
        let _ = caller.await;
        drop(held);

        // queued behind carol's write guard, so it runs after that mutation settles
        store.insert_if_absent(User::new("dave")).await?;

        assert!(store.lookup_user_by_name("carol").await.is_ok());
        assert_eq!(store.lookup_user_names("", -1, -1).await?, vec!["alice", "bob", "carol", "dave"]);
        let text = fs::read_to_string(&fx.config.users_file).await?;
        assert!(text.lines().any(|l| l.starts_with("carol,")));
        fx.cleanup().await;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_file_backed_creates_write_one_row() -> anyhow::Result<()> {
        let fx = Fixture::new(USERS, "name\n").await?;
        let mut config = fx.config.clone();
        config.lock_retries = 50;
        config.lock_backoff = Duration::from_millis(5);
        let store = Arc::new(CsvRecordStore::new(config));

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let mut u = User::new("race");
                u.claim1 = i.to_string();
                store.insert_if_absent(u).await
            }));
        }
        let mut created = 0;
        let mut conflicts = 0;
        for h in handles {
            match h.await? {
                Ok(()) => created += 1,
                Err(StoreError::AlreadyExists(_)) => conflicts += 1,
                Err(e) => return Err(e.into()),
            }
        }
        assert_eq!((created, conflicts), (1, 15));

        let text = fs::read_to_string(&fx.config.users_file).await?;
        assert_eq!(text.lines().filter(|l| l.starts_with("race,")).count(), 1);
        assert_eq!(store.lookup_user_names("", -1, -1).await?, vec!["alice", "bob", "race"]);
        fx.cleanup().await;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creates_of_one_name_admit_exactly_one() -> anyhow::Result<()> {
        let store = Arc::new(CsvRecordStore::new(StoreConfig::in_memory()));
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let mut u = User::new("race");
                u.claim1 = i.to_string();
                store.insert_if_absent(u).await
            }));
        }
        let mut created = 0;
        for h in handles {
            if h.await?.is_ok() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(store.lookup_user_names("", -1, -1).await?, vec!["race"]);
        Ok(())
    }
}
