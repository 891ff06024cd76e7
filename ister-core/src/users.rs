//! User provisioning on the installed system.
//!
//! Account creation and key installation run with the process root switched to the target
//! so that `useradd` and passwd lookups see the installed system's databases.

use crate::errors::Result;
use crate::remote::ResolvedKeys;
use crate::template::UserSpec;
use anyhow::Context;
use ister_hal::{AccountOps, AccountSpec, RootGuard, RootOps};
use nix::unistd::{chown, Gid, Uid};
use std::fs::{self, DirBuilder, OpenOptions};
use std::io::Write;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::Path;

pub fn provision_users<H>(
    hal: &H,
    users: &[UserSpec],
    keys: &ResolvedKeys,
    target: &Path,
) -> Result<()>
where
    H: AccountOps + RootOps + ?Sized,
{
    for user in users {
        create_account(hal, user, target)?;
        if let Some(key) = keys.get(&user.username) {
            add_user_key(hal, &user.username, key, target)?;
        }
        if user.sudo {
            setup_sudo(&user.username, target)?;
        }
    }
    Ok(())
}

fn create_account<H>(hal: &H, user: &UserSpec, target: &Path) -> Result<()>
where
    H: AccountOps + RootOps + ?Sized,
{
    let guard = RootGuard::enter(hal, target).context("Unable to setup chroot to create users")?;
    hal.create_account(&AccountSpec {
        username: user.username.clone(),
        uid: user.uid,
    })
    .with_context(|| format!("Failed to create account {}", user.username))?;
    guard
        .restore()
        .context("Unable to restore real root after chroot")?;
    log::info!("created account {}", user.username);
    Ok(())
}

fn add_user_key<H>(hal: &H, username: &str, key: &str, target: &Path) -> Result<()>
where
    H: AccountOps + RootOps + ?Sized,
{
    let guard = RootGuard::enter(hal, target).context("Unable to setup chroot to add ssh key")?;
    install_key(hal, &guard, username, key)
        .with_context(|| format!("Unable to add {}'s ssh key to authorized keys", username))?;
    guard
        .restore()
        .context("Unable to restore real root after chroot")?;
    log::info!("installed ssh key for {}", username);
    Ok(())
}

fn install_key<H>(hal: &H, guard: &RootGuard<'_, H>, username: &str, key: &str) -> Result<()>
where
    H: AccountOps + RootOps + ?Sized,
{
    let ssh_dir = guard.resolve(format!("/home/{}/.ssh", username));
    DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(&ssh_dir)?;
    fs::set_permissions(&ssh_dir, fs::Permissions::from_mode(0o700))?;

    let ids = hal.lookup_user(username)?;
    let (uid, gid) = (Some(Uid::from_raw(ids.uid)), Some(Gid::from_raw(ids.gid)));
    chown(&ssh_dir, uid, gid)?;

    let authorized = ssh_dir.join("authorized_keys");
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o600)
        .open(&authorized)?;
    file.write_all(key.as_bytes())?;
    chown(&authorized, uid, gid)?;
    Ok(())
}

/// Drop-in granting `username` sudo with their own password. Refuses to overwrite.
pub fn setup_sudo(username: &str, target: &Path) -> Result<()> {
    let path = target.join("etc/sudoers.d").join(username);
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o440)
        .open(&path)
        .with_context(|| format!("Unable to add sudoer conf file for {}", username))?;
    file.write_all(format!("{} ALL=(ALL) ALL", username).as_bytes())
        .with_context(|| format!("Unable to add sudoer conf file for {}", username))?;
    log::info!("granted sudo to {}", username);
    Ok(())
}
