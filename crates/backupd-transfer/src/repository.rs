use std::fmt;
use std::path::{Path, PathBuf};

use backupd_core::types::RemoteTarget;

/// One concrete repository: where it lives and how to open it.
#[derive(Clone, PartialEq, Eq)]
pub struct Repository {
    location: String,
    password_file: PathBuf,
    /// Extra environment for the tool, e.g. cloud credentials.
    env: Vec<(String, String)>,
}

impl Repository {
    /// Repository `repo_name` on a locally mounted device.
    pub fn local(mount_point: &Path, repo_name: &str, password_file: &Path) -> Self {
        Self {
            location: mount_point.join(repo_name).display().to_string(),
            password_file: password_file.to_path_buf(),
            env: Vec::new(),
        }
    }

    /// Repository `repo_name` under a remote endpoint, carrying its credentials.
    pub fn remote(target: &RemoteTarget, repo_name: &str, password_file: &Path) -> Self {
        Self {
            location: format!("{}{repo_name}", target.endpoint_root()),
            password_file: password_file.to_path_buf(),
            env: target.credentials(),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn password_file(&self) -> &Path {
        &self.password_file
    }

    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.location)
    }
}

// Credential values stay out of logs.
impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&str> = self.env.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("Repository")
            .field("location", &self.location)
            .field("password_file", &self.password_file)
            .field("env", &keys)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use backupd_core::types::RemoteKind;

    use super::*;

    fn remote(path: &str) -> RemoteTarget {
        RemoteTarget {
            kind: RemoteKind::S3Compatible,
            path: path.to_string(),
            key_id: "AKIA123".to_string(),
            key: "hunter2".to_string(),
        }
    }

    #[test]
    fn local_joins_mount_and_name() {
        let repo = Repository::local(Path::new("/mnt/a"), "photos", Path::new("/etc/pw"));
        assert_eq!(repo.location(), "/mnt/a/photos");
        assert!(repo.env().is_empty());
    }

    #[test]
    fn remote_normalises_trailing_slash() {
        let pw = Path::new("/etc/pw");
        let a = Repository::remote(&remote("s3.example.com/bucket"), "photos", pw);
        let b = Repository::remote(&remote("s3.example.com/bucket/"), "photos", pw);
        assert_eq!(a.location(), "s3:s3.example.com/bucket/photos");
        assert_eq!(a.location(), b.location());
        assert_eq!(a.env()[0], ("AWS_ACCESS_KEY_ID".to_string(), "AKIA123".to_string()));
    }

    #[test]
    fn debug_hides_credentials() {
        let repo = Repository::remote(&remote("host/bucket"), "photos", Path::new("/pw"));
        let shown = format!("{repo:?}");
        assert!(shown.contains("AWS_SECRET_ACCESS_KEY"));
        assert!(!shown.contains("hunter2"));
    }
}
