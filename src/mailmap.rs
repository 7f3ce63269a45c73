// src/mailmap.rs

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::warn;

pub const EMAIL_DOMAIN: &str = "gentoo.org";

/// Accounts whose commits belong to another user, as `(account, owner)`
const PINNED_IDENTITIES: &[(&str, &str)] = &[("root", "infra"), ("cvsroot", "infra")];

/// One entry of the developer registry
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub username: String,
    pub fullname: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Name and address a commit author is mapped to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

pub fn load_registry(path: &Path) -> Result<Vec<User>> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Maps every username and alias to its identity
pub fn build_mailmap(users: &[User]) -> BTreeMap<String, Identity> {
    build_mailmap_with_pins(users, PINNED_IDENTITIES)
}

fn build_mailmap_with_pins(users: &[User], pins: &[(&str, &str)]) -> BTreeMap<String, Identity> {
    let mut mailmap = BTreeMap::new();
    for user in users {
        let identity = Identity {
            name: user.fullname.clone(),
            email: format!("{}@{}", user.username, EMAIL_DOMAIN),
        };
        mailmap.insert(user.username.clone(), identity.clone());
        for alias in &user.aliases {
            mailmap.insert(alias.clone(), identity.clone());
        }
    }

    for (account, owner) in pins {
        match mailmap.get(*owner).cloned() {
            Some(identity) => {
                mailmap.insert(account.to_string(), identity);
            }
            None => warn!("cannot pin {} to unknown user {}", account, owner),
        }
    }
    mailmap
}
