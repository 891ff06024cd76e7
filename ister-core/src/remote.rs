//! Remote references in a validated template.
//!
//! Everything the install will need from the network is fetched here, before the first
//! destructive step, so an unreachable key server cannot leave a half-installed disk.

use crate::errors::{InstallError, Result};
use crate::source::fetch_text;
use crate::template::{ImageSourceKind, InstallTemplate};
use anyhow::Context;
use std::collections::HashMap;

/// SSH public keys by username, fetched once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedKeys {
    keys: HashMap<String, String>,
}

impl ResolvedKeys {
    pub fn get(&self, username: &str) -> Option<&str> {
        self.keys.get(username).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl FromIterator<(String, String)> for ResolvedKeys {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}

/// Download a remote source image. Not supported: always fails.
pub fn obtain_remote_image(location: &str) -> Result<()> {
    log::error!("remote image {} requested", location);
    Err(InstallError::RemoteImage.into())
}

pub fn resolve_remote_refs(template: &InstallTemplate) -> Result<ResolvedKeys> {
    if template.source_kind == ImageSourceKind::Remote {
        obtain_remote_image(&template.source_location)?;
    }

    let mut keys = ResolvedKeys::default();
    for user in &template.users {
        let Some(url) = user.key.as_deref() else {
            continue;
        };
        let key = fetch_text(url)
            .with_context(|| format!("Unable to fetch ssh key for {} from {}", user.username, url))?;
        log::info!("fetched ssh key for {}", user.username);
        keys.keys.insert(user.username.clone(), key);
    }
    Ok(keys)
}
