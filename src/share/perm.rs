use std::path::PathBuf;

use super::{split_logical, AccessPolicy, PermissionGate, ShareConfigError, ShareTable};
use crate::model::Identity;

/// Access policy backed by the share user lists in an smb.conf-style file.
#[derive(Debug, Clone)]
pub struct SharePermissions {
    config_path: PathBuf,
}

impl SharePermissions {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }
}

impl AccessPolicy for SharePermissions {
    fn gate(&self, identity: &Identity) -> Result<Box<dyn PermissionGate>, ShareConfigError> {
        let table = ShareTable::load(&self.config_path).map_err(|e| {
            tracing::error!("Can't parse share configuration: {}", e);
            e
        })?;
        Ok(Box::new(ShareGate::new(table, identity.clone())))
    }
}

/// Access decisions for one identity against a parsed share table.
#[derive(Debug)]
pub struct ShareGate {
    table: ShareTable,
    identity: Identity,
}

impl ShareGate {
    pub fn new(table: ShareTable, identity: Identity) -> Self {
        Self { table, identity }
    }
}

impl PermissionGate for ShareGate {
    fn has_access(&self, logical: &str) -> Result<bool, ShareConfigError> {
        let allowed = split_logical(logical)
            .and_then(|(share, _)| self.table.get(share))
            .is_some_and(|share| share.allows(&self.identity));
        Ok(allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UserType;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const CONF: &str = "[Public]\npath = /share/Public\n\n\
                        [Private]\npath = /share/Private\nvalid users = admin\n";

    #[test]
    fn test_gate_decisions() {
        let table = ShareTable::parse(Path::new("smb.conf"), CONF).unwrap();
        let gate = ShareGate::new(table, Identity::new(500, "bob", UserType::Local));

        assert!(gate.has_access("/Public/a.pdf").unwrap());
        assert!(!gate.has_access("/Private/a.pdf").unwrap());
        assert!(!gate.has_access("/Unknown/a.pdf").unwrap());
        assert!(!gate.has_access("/Public/../Private/a.pdf").unwrap());
    }

    #[test]
    fn test_gate_construction_fails_on_broken_config() {
        let tmp = TempDir::new().unwrap();
        let conf = tmp.path().join("smb.conf");
        fs::write(&conf, "garbage\n").unwrap();

        let policy = SharePermissions::new(&conf);
        let err = policy
            .gate(&Identity::new(0, "admin", UserType::Local))
            .err()
            .unwrap();
        assert_eq!(err.line, 1);
    }
}
