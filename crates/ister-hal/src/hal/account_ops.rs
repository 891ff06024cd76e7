//! Account management (useradd, passwd lookups).
//!
//! These run against whatever root the process currently has, so callers scope them with a
//! [`crate::RootGuard`] when targeting the installed system.

use crate::HalResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSpec {
    pub username: String,
    pub uid: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserIds {
    pub uid: u32,
    pub gid: u32,
}

pub trait AccountOps {
    /// Create a user with a same-named primary group, a home directory and an empty password.
    fn create_account(&self, spec: &AccountSpec) -> HalResult<()>;

    fn lookup_user(&self, username: &str) -> HalResult<UserIds>;
}
