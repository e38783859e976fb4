//! JSON-backed account directory.
//!
//! The whole `login -> account` map is read before and written after every
//! mutation. There is no file locking: the store assumes a single writer at
//! a time, and two concurrent admin sessions can overwrite each other.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::StoreError;

/// Password given to every new account. Users must change it on first access.
pub const DEFAULT_PASSWORD: &str = "12345";
pub const BOOTSTRAP_LOGIN: &str = "admin";
pub const BOOTSTRAP_AGENT: &str = "Admin Master";

const HASH_SCHEME: &str = "sha256";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            other => Err(format!("unknown role '{other}' (expected admin or user)")),
        }
    }
}

fn default_first_access() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAccount {
    /// `sha256$<salt>$<hex digest>`, or a legacy plaintext value.
    pub password: String,
    #[serde(default)]
    pub role: Role,
    #[serde(rename = "primeiro_acesso", default = "default_first_access")]
    pub first_access: bool,
    #[serde(rename = "agente", default)]
    pub agent: String,
}

impl UserAccount {
    fn new(password: &str, role: Role, agent: &str) -> Self {
        Self {
            password: hash_password(password),
            role,
            first_access: true,
            agent: agent.to_string(),
        }
    }

    pub fn password_matches(&self, candidate: &str) -> bool {
        let mut parts = self.password.splitn(3, '$');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(HASH_SCHEME), Some(salt), Some(digest)) => decode_hex(digest)
                .map_or(false, |stored| {
                    constant_time_eq(&stored, &digest_bytes(salt, candidate))
                }),
            _ => self.password == candidate,
        }
    }
}

pub type Accounts = BTreeMap<String, UserAccount>;

fn digest_bytes(salt: &str, password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

fn salted_digest(salt: &str, password: &str) -> String {
    digest_bytes(salt, password)
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}

/// Compares every byte regardless of where the first difference is.
fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    left.len() == right.len()
        && left
            .iter()
            .zip(right)
            .fold(0u8, |diff, (a, b)| diff | (a ^ b))
            == 0
}

pub fn hash_password(password: &str) -> String {
    let salt = Uuid::new_v4().simple().to_string();
    let digest = salted_digest(&salt, password);
    format!("{HASH_SCHEME}${salt}${digest}")
}

/// Login suggested for an agent discovered in the exports: lower case, spaces
/// become dots, hyphens are dropped, and a counter is appended on collision.
pub fn suggest_login(agent: &str, accounts: &Accounts) -> String {
    let base = agent.trim().to_lowercase().replace(' ', ".").replace('-', "");
    let mut login = base.clone();
    let mut counter = 1;
    while accounts.contains_key(&login) {
        login = format!("{base}{counter}");
        counter += 1;
    }
    login
}

#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the account map. A missing file is bootstrapped with a single
    /// admin account using [`DEFAULT_PASSWORD`].
    pub fn load(&self) -> Result<Accounts, StoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return self.bootstrap();
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_str(&contents).map_err(|source| {
            tracing::error!(path = %self.path.display(), "credential file is corrupt: {source}");
            StoreError::Corrupt {
                path: self.path.clone(),
                source,
            }
        })
    }

    fn bootstrap(&self) -> Result<Accounts, StoreError> {
        let mut accounts = Accounts::new();
        accounts.insert(
            BOOTSTRAP_LOGIN.to_string(),
            UserAccount::new(DEFAULT_PASSWORD, Role::Admin, BOOTSTRAP_AGENT),
        );
        self.save(&accounts)?;
        tracing::info!(
            path = %self.path.display(),
            "created credential file with bootstrap account '{BOOTSTRAP_LOGIN}'"
        );
        Ok(accounts)
    }

    /// Rewrites the whole file, pretty-printed with four-space indents.
    fn save(&self, accounts: &Accounts) -> Result<(), StoreError> {
        let mut buffer = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        accounts.serialize(&mut serializer)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&self.path, buffer).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }

    /// Fails closed: an unreadable store rejects every login.
    pub fn verify(&self, login: &str, password: &str) -> bool {
        match self.load() {
            Ok(accounts) => accounts
                .get(login)
                .map_or(false, |account| account.password_matches(password)),
            Err(err) => {
                tracing::error!("cannot verify '{login}': {err}");
                false
            }
        }
    }

    pub fn lookup(&self, login: &str) -> Option<UserAccount> {
        match self.load() {
            Ok(mut accounts) => accounts.remove(login),
            Err(err) => {
                tracing::error!("cannot look up '{login}': {err}");
                None
            }
        }
    }

    /// Sets a new password and clears the first-access flag. Returns `false`
    /// when the login does not exist.
    pub fn change_password(&self, login: &str, new_password: &str) -> Result<bool, StoreError> {
        let mut accounts = self.load()?;
        let Some(account) = accounts.get_mut(login) else {
            return Ok(false);
        };
        account.password = hash_password(new_password);
        account.first_access = false;
        self.save(&accounts)?;
        tracing::info!("password changed for '{login}'");
        Ok(true)
    }

    /// Admin reset: sets a new password and forces another first access.
    pub fn reset_password(&self, login: &str, new_password: &str) -> Result<(), StoreError> {
        let mut accounts = self.load()?;
        let account = accounts
            .get_mut(login)
            .ok_or_else(|| StoreError::UnknownLogin(login.to_string()))?;
        account.password = hash_password(new_password);
        account.first_access = true;
        self.save(&accounts)?;
        tracing::info!("password reset for '{login}'");
        Ok(())
    }

    /// Creates a user-role account for an agent found in the exports. Returns
    /// `false` without touching the store when the login already exists.
    pub fn create_from_discovery(&self, login: &str, agent: &str) -> Result<bool, StoreError> {
        let mut accounts = self.load()?;
        if accounts.contains_key(login) {
            return Ok(false);
        }
        accounts.insert(
            login.to_string(),
            UserAccount::new(DEFAULT_PASSWORD, Role::User, agent),
        );
        self.save(&accounts)?;
        tracing::info!("created account '{login}' for agent {agent}");
        Ok(true)
    }

    pub fn create_manual(&self, login: &str, agent: &str, role: Role) -> Result<(), StoreError> {
        let login = login.trim();
        let agent = agent.trim();
        if login.is_empty() || agent.is_empty() {
            return Err(StoreError::MissingField);
        }

        let mut accounts = self.load()?;
        if accounts.contains_key(login) {
            return Err(StoreError::DuplicateLogin(login.to_string()));
        }
        accounts.insert(
            login.to_string(),
            UserAccount::new(DEFAULT_PASSWORD, role, agent),
        );
        self.save(&accounts)?;
        tracing::info!("created {} account '{login}'", role.as_str());
        Ok(())
    }

    pub fn delete(&self, login: &str, requesting_admin: &str) -> Result<(), StoreError> {
        if login == requesting_admin {
            return Err(StoreError::SelfDelete);
        }

        let mut accounts = self.load()?;
        if accounts.remove(login).is_none() {
            return Err(StoreError::UnknownLogin(login.to_string()));
        }
        self.save(&accounts)?;
        tracing::info!("'{requesting_admin}' deleted account '{login}'");
        Ok(())
    }

    /// Creates an account for every agent name that no user-role account is
    /// linked to yet. Returns the logins created, in agent-name order.
    pub fn sync_agents<I, S>(&self, agents: I) -> Result<Vec<String>, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let accounts = self.load()?;
        let linked: Vec<&str> = accounts
            .values()
            .filter(|account| account.role == Role::User)
            .map(|account| account.agent.as_str())
            .collect();

        let mut pending: Vec<String> = agents
            .into_iter()
            .map(|agent| agent.as_ref().trim().to_string())
            .filter(|agent| !agent.is_empty() && !linked.contains(&agent.as_str()))
            .collect();
        pending.sort();
        pending.dedup();

        let mut created = Vec::new();
        for agent in pending {
            let current = self.load()?;
            let login = suggest_login(&agent, &current);
            if self.create_from_discovery(&login, &agent)? {
                created.push(login);
            }
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> CredentialStore {
        CredentialStore::new(dir.path().join("users.json"))
    }

    #[test]
    fn bootstraps_a_single_admin() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let accounts = store.load().unwrap();
        assert_eq!(accounts.len(), 1);
        let admin = &accounts[BOOTSTRAP_LOGIN];
        assert_eq!(admin.role, Role::Admin);
        assert!(admin.first_access);
        assert!(store.verify(BOOTSTRAP_LOGIN, DEFAULT_PASSWORD));
        assert!(store.path().exists());
    }

    #[test]
    fn persisted_file_uses_the_documented_keys() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.load().unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        let admin = &raw["admin"];
        assert_eq!(admin["role"], "admin");
        assert_eq!(admin["primeiro_acesso"], true);
        assert_eq!(admin["agente"], BOOTSTRAP_AGENT);
        assert!(admin["password"].as_str().unwrap().starts_with("sha256$"));
    }

    #[test]
    fn accepts_legacy_plaintext_passwords() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(
            store.path(),
            r#"{"ana": {"password": "segredo", "role": "user", "primeiro_acesso": false, "agente": "Ana"}}"#,
        )
        .unwrap();

        assert!(store.verify("ana", "segredo"));
        assert!(!store.verify("ana", "12345"));
        assert!(!store.verify("bia", "segredo"));
    }

    #[test]
    fn hashed_passwords_compare_digest_bytes() {
        let account = UserAccount::new("segredo", Role::User, "Ana");
        assert!(account.password_matches("segredo"));
        assert!(!account.password_matches("segredo "));

        let truncated = UserAccount {
            password: account.password[..account.password.len() - 2].to_string(),
            ..account.clone()
        };
        assert!(!truncated.password_matches("segredo"));

        let not_hex = UserAccount {
            password: "sha256$salt$zz".to_string(),
            ..account
        };
        assert!(!not_hex.password_matches("segredo"));

        assert_eq!(decode_hex("0aff"), Some(vec![0x0a, 0xff]));
        assert!(constant_time_eq(&[1, 2], &[1, 2]));
        assert!(!constant_time_eq(&[1, 2], &[1, 3]));
        assert!(!constant_time_eq(&[1], &[1, 2]));
    }

    #[test]
    fn change_password_clears_first_access() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        assert!(store.change_password(BOOTSTRAP_LOGIN, "nova-senha").unwrap());
        let admin = store.lookup(BOOTSTRAP_LOGIN).unwrap();
        assert!(!admin.first_access);
        assert!(store.verify(BOOTSTRAP_LOGIN, "nova-senha"));
        assert!(!store.verify(BOOTSTRAP_LOGIN, DEFAULT_PASSWORD));
        assert!(!store.change_password("ghost", "x").unwrap());
    }

    #[test]
    fn reset_forces_first_access_again() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.create_manual("ana", "Ana", Role::User).unwrap();
        store.change_password("ana", "minha").unwrap();

        store.reset_password("ana", "temp").unwrap();
        let ana = store.lookup("ana").unwrap();
        assert!(ana.first_access);
        assert!(store.verify("ana", "temp"));
        assert!(matches!(
            store.reset_password("ghost", "x"),
            Err(StoreError::UnknownLogin(_))
        ));
    }

    #[test]
    fn discovery_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        assert!(store.create_from_discovery("ana.souza", "Ana Souza").unwrap());
        store.change_password("ana.souza", "changed").unwrap();
        assert!(!store.create_from_discovery("ana.souza", "Someone Else").unwrap());

        let ana = store.lookup("ana.souza").unwrap();
        assert_eq!(ana.agent, "Ana Souza");
        assert!(!ana.first_access);
    }

    #[test]
    fn manual_creation_rejects_blanks_and_duplicates() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        assert!(matches!(
            store.create_manual(" ", "Ana", Role::User),
            Err(StoreError::MissingField)
        ));
        assert!(matches!(
            store.create_manual("ana", "", Role::User),
            Err(StoreError::MissingField)
        ));

        store.create_manual("ana", "Ana", Role::User).unwrap();
        let before = store.lookup("ana").unwrap();
        assert!(matches!(
            store.create_manual("ana", "Outra Ana", Role::Admin),
            Err(StoreError::DuplicateLogin(login)) if login == "ana"
        ));
        assert_eq!(store.lookup("ana").unwrap(), before);
    }

    #[test]
    fn delete_refuses_self() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.create_manual("ana", "Ana", Role::User).unwrap();

        assert!(matches!(
            store.delete(BOOTSTRAP_LOGIN, BOOTSTRAP_LOGIN),
            Err(StoreError::SelfDelete)
        ));
        assert!(store.lookup(BOOTSTRAP_LOGIN).is_some());

        store.delete("ana", BOOTSTRAP_LOGIN).unwrap();
        assert!(store.lookup("ana").is_none());
        assert!(matches!(
            store.delete("ana", BOOTSTRAP_LOGIN),
            Err(StoreError::UnknownLogin(_))
        ));
    }

    #[test]
    fn corrupt_file_locks_everyone_out_and_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(store.path(), "{ not json").unwrap();

        assert!(!store.verify(BOOTSTRAP_LOGIN, DEFAULT_PASSWORD));
        assert!(store.lookup(BOOTSTRAP_LOGIN).is_none());
        assert!(matches!(
            store.create_manual("ana", "Ana", Role::User),
            Err(StoreError::Corrupt { .. })
        ));
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "{ not json");
    }

    #[test]
    fn suggests_logins_with_collision_suffix() {
        let mut accounts = Accounts::new();
        assert_eq!(suggest_login("Ana Maria Souza-Lima", &accounts), "ana.maria.souzalima");

        accounts.insert("ana.souza".into(), UserAccount::new("x", Role::User, "A"));
        accounts.insert("ana.souza1".into(), UserAccount::new("x", Role::User, "B"));
        assert_eq!(suggest_login("Ana Souza", &accounts), "ana.souza2");
    }

    #[test]
    fn sync_creates_accounts_for_unlinked_agents() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.create_manual("bia", "Bia Lima", Role::User).unwrap();

        let created = store
            .sync_agents(["Ana Souza", "Bia Lima", " ", "Ana Souza", "Caio"])
            .unwrap();
        assert_eq!(created, vec!["ana.souza".to_string(), "caio".to_string()]);

        let again = store.sync_agents(["Ana Souza", "Caio"]).unwrap();
        assert!(again.is_empty());
        assert!(store.verify("caio", DEFAULT_PASSWORD));
    }
}
