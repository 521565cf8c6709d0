//! Line format of the user and role tables.
//!
//! ```text
//! username,password,enabled,roles,claim1,claim2
//! alice,pw,true,admin:user,c1,c2
//! ```

use models::user::{FIELD_SEPARATOR, ROLE_SEPARATOR};
use models::{Role, User};

pub const USER_HEADER: &str = "username,password,enabled,roles,claim1,claim2";
pub const ROLE_HEADER: &str = "name";

const USERNAME: usize = 0;
const PASSWORD: usize = 1;
const ENABLED: usize = 2;
const ROLES: usize = 3;
const CLAIM1: usize = 4;
const CLAIM2: usize = 5;
const USER_COLUMNS: usize = 6;

const ROLE_NAME: usize = 0;

/// A data row that was skipped while decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedRow {
    /// 1-based line number in the file.
    pub line: usize,
    pub reason: String,
}

pub fn encode_user(user: &User) -> String {
    let roles = user.roles.join(&ROLE_SEPARATOR.to_string());
    let sep = FIELD_SEPARATOR;
    format!(
        "{}{sep}{}{sep}{}{sep}{}{sep}{}{sep}{}",
        user.username, user.password, user.enabled, roles, user.claim1, user.claim2
    )
}

/// Header line followed by one line per user, in the order given.
pub fn encode_users<'a, I>(users: I) -> String
where
    I: IntoIterator<Item = &'a User>,
{
    let mut out = String::with_capacity(256);
    out.push_str(USER_HEADER);
    out.push('\n');
    for user in users {
        out.push_str(&encode_user(user));
        out.push('\n');
    }
    out
}

pub fn decode_user(row: &str) -> Result<User, String> {
    let cols: Vec<&str> = row.split(FIELD_SEPARATOR).collect();
    if cols.len() != USER_COLUMNS {
        return Err(format!("expected {USER_COLUMNS} columns, found {}", cols.len()));
    }
    if cols[USERNAME].is_empty() {
        return Err("empty username".into());
    }
    let enabled = cols[ENABLED]
        .parse::<bool>()
        .map_err(|_| format!("enabled must be true or false, found '{}'", cols[ENABLED]))?;
    let roles = cols[ROLES]
        .split(ROLE_SEPARATOR)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect();
    Ok(User {
        username: cols[USERNAME].to_string(),
        password: cols[PASSWORD].to_string(),
        enabled,
        roles,
        claim1: cols[CLAIM1].to_string(),
        claim2: cols[CLAIM2].to_string(),
    })
}

/// Non-blank lines with their 1-based line numbers, header removed.
fn data_rows(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim_end_matches('\r')))
        .filter(|(_, l)| !l.trim().is_empty())
        .skip(1)
}

/// Decode the user table; rows that do not parse are returned separately.
pub fn decode_users(text: &str) -> (Vec<User>, Vec<MalformedRow>) {
    let mut users = Vec::new();
    let mut malformed = Vec::new();
    for (line, row) in data_rows(text) {
        match decode_user(row) {
            Ok(u) => users.push(u),
            Err(reason) => malformed.push(MalformedRow { line, reason }),
        }
    }
    (users, malformed)
}

pub fn decode_roles(text: &str) -> Vec<Role> {
    data_rows(text)
        .filter_map(|(_, row)| row.split(FIELD_SEPARATOR).nth(ROLE_NAME))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(Role::new)
        .collect()
}
