//! Child environment assembly
//!
//! Variables travel as raw `OsString`s so values that are not UTF-8 reach the
//! child unchanged.

use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// Ordered variable list with last-write-wins semantics on duplicate keys
///
/// Keys are compared byte for byte, so case matters. A replaced key keeps the
/// position of its first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildEnv {
    vars: Vec<(OsString, OsString)>,
}

impl ChildEnv {
    /// Start from `vars`, dropping every key that begins with `reserved_prefix`
    pub fn inherit<I, K, V>(vars: I, reserved_prefix: &str) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        let mut env = Self::default();
        for (key, value) in vars {
            let key = key.into();
            if !key.as_bytes().starts_with(reserved_prefix.as_bytes()) {
                env.set(key, value);
            }
        }
        env
    }

    /// Set `key`, replacing any earlier value
    pub fn set(&mut self, key: impl Into<OsString>, value: impl Into<OsString>) {
        let key = key.into();
        let value = value.into();
        match self.vars.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.vars.push((key, value)),
        }
    }

    /// Current value of `key`
    pub fn get(&self, key: impl AsRef<OsStr>) -> Option<&OsStr> {
        let key = key.as_ref();
        self.vars
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_os_str())
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// True when no variables are set
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Iterate in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&OsStr, &OsStr)> {
        self.vars.iter().map(|(k, v)| (k.as_os_str(), v.as_os_str()))
    }

    /// Consume into `(key, value)` pairs
    pub fn into_vec(self) -> Vec<(OsString, OsString)> {
        self.vars
    }
}

/// Supervisor environment, byte for byte
pub fn current_vars() -> impl Iterator<Item = (OsString, OsString)> {
    std::env::vars_os()
}

/// Environment for a child rooted at `root`
///
/// Order of precedence, lowest first: inherited variables (minus the reserved
/// prefix), `HOME=<root>`, `TERM=<term>`, then `overrides`. Overrides are
/// applied in key order so the result does not depend on map iteration.
pub fn build_child_env<I, K, V>(
    inherited: I,
    reserved_prefix: &str,
    root: &Path,
    term: &str,
    overrides: &HashMap<String, String>,
) -> ChildEnv
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<OsString>,
    V: Into<OsString>,
{
    let mut env = ChildEnv::inherit(inherited, reserved_prefix);
    env.set("HOME", root.as_os_str());
    env.set("TERM", term);

    let mut keys: Vec<&String> = overrides.keys().collect();
    keys.sort();
    for key in keys {
        env.set(key, &overrides[key]);
    }
    env
}
