//! smb.conf-style share table.
//!
//! Format:
//!
//! ```text
//! [global]
//! workgroup = NAS
//!
//! [Public]
//! path = /share/CACHEDEV1_DATA/Public
//! valid users = admin, @staff
//! invalid users = guest
//!
//! [home]
//! path = /share/homes/%U
//! ```
//!
//! Section names are case-insensitive. `%U` in `path` expands to the username.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::ShareConfigError;
use crate::model::Identity;

/// One exported share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Share {
    pub name: String,
    pub path: String,
    pub valid_users: Vec<String>,
    pub invalid_users: Vec<String>,
}

impl Share {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            path: String::new(),
            valid_users: Vec::new(),
            invalid_users: Vec::new(),
        }
    }

    /// Physical location of `relative` inside this share for `username`.
    pub fn physical_path(&self, relative: &Path, username: &str) -> PathBuf {
        let root = PathBuf::from(self.path.replace("%U", username));
        if relative.as_os_str().is_empty() {
            root
        } else {
            root.join(relative)
        }
    }

    pub fn allows(&self, identity: &Identity) -> bool {
        if self
            .invalid_users
            .iter()
            .any(|entry| user_matches(entry, identity))
        {
            return false;
        }
        self.valid_users.is_empty()
            || self
                .valid_users
                .iter()
                .any(|entry| user_matches(entry, identity))
    }
}

fn user_matches(entry: &str, identity: &Identity) -> bool {
    match entry.strip_prefix('@').or_else(|| entry.strip_prefix('+')) {
        Some(group) => identity
            .groups
            .iter()
            .any(|g| g.eq_ignore_ascii_case(group)),
        None => entry.eq_ignore_ascii_case(&identity.username),
    }
}

/// Parsed share configuration.
#[derive(Debug, Clone, Default)]
pub struct ShareTable {
    shares: HashMap<String, Share>,
}

impl ShareTable {
    /// Read and parse the configuration at `path`.
    pub fn load(path: &Path) -> Result<Self, ShareConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ShareConfigError::new(path, 0, format!("cannot read file: {}", e)))?;
        Self::parse(path, &text)
    }

    /// Parse configuration text. `path` is only used in error reports.
    pub fn parse(path: &Path, text: &str) -> Result<Self, ShareConfigError> {
        let mut shares = HashMap::new();
        // (section, header line) of the section being filled
        let mut current: Option<(Share, usize)> = None;
        let mut in_global = false;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(header) = line.strip_prefix('[') {
                let name = header
                    .strip_suffix(']')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .ok_or_else(|| {
                        ShareConfigError::new(path, line_no, "malformed section header")
                    })?;

                if let Some((share, header_line)) = current.take() {
                    insert_share(path, &mut shares, share, header_line)?;
                }

                if name.eq_ignore_ascii_case("global") {
                    in_global = true;
                } else {
                    in_global = false;
                    current = Some((Share::new(name), line_no));
                }
                continue;
            }

            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| ShareConfigError::new(path, line_no, "line is not `key = value`"))?;
            let key = normalize_key(key);
            let value = value.trim();
            if key.is_empty() {
                return Err(ShareConfigError::new(path, line_no, "empty key"));
            }

            match current.as_mut() {
                Some((share, _)) => match key.as_str() {
                    "path" => share.path = value.to_string(),
                    "valid users" => share.valid_users = split_users(value),
                    "invalid users" => share.invalid_users = split_users(value),
                    _ => {}
                },
                None if in_global => {}
                None => {
                    return Err(ShareConfigError::new(
                        path,
                        line_no,
                        "parameter outside of any section",
                    ))
                }
            }
        }

        if let Some((share, header_line)) = current.take() {
            insert_share(path, &mut shares, share, header_line)?;
        }

        Ok(Self { shares })
    }

    pub fn get(&self, name: &str) -> Option<&Share> {
        self.shares.get(&name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.shares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }
}

fn insert_share(
    path: &Path,
    shares: &mut HashMap<String, Share>,
    share: Share,
    header_line: usize,
) -> Result<(), ShareConfigError> {
    if share.path.is_empty() {
        return Err(ShareConfigError::new(
            path,
            header_line,
            format!("share [{}] has no path", share.name),
        ));
    }
    shares.insert(share.name.to_ascii_lowercase(), share);
    Ok(())
}

fn normalize_key(key: &str) -> String {
    key.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}

fn split_users(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
