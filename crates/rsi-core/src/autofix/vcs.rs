//! Version-control collaborator
//!
//! The pipeline needs six operations from version control: a clean check,
//! staging, committing with an identity, reverting the last commit, a hard
//! reset, and restoring a single path from HEAD. [`GitRepository`] provides
//! them on top of `git2`.

use crate::config::GitConfig;
use crate::error::{Result, RsiError};
use git2::build::CheckoutBuilder;
use git2::{Commit, Repository, ResetType, Signature, StatusOptions};
use std::path::{Path, PathBuf};

/// Author and committer for automated commits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
}

impl From<&GitConfig> for CommitIdentity {
    fn from(config: &GitConfig) -> Self {
        Self {
            name: config.author_name.clone(),
            email: config.author_email.clone(),
        }
    }
}

/// Result of reverting the most recent commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reverted {
    /// The commit that was undone
    pub reverted: String,
    /// The inverse commit that undid it
    pub commit: String,
}

pub trait VersionControl: Send + Sync {
    /// True when nothing outside the ignored state directory is modified or untracked
    fn is_clean(&self) -> Result<bool>;

    fn stage(&self, paths: &[PathBuf]) -> Result<()>;

    /// Commit the index and return the new commit id
    fn commit(&self, message: &str, identity: &CommitIdentity) -> Result<String>;

    /// Create an inverse commit of HEAD
    fn revert_last_commit(&self, identity: &CommitIdentity) -> Result<Reverted>;

    /// Drop every uncommitted change to tracked files
    fn hard_reset(&self) -> Result<()>;

    /// Restore one path to its HEAD content; paths absent from HEAD are removed
    fn checkout_path(&self, path: &Path) -> Result<()>;
}

/// `git2` implementation rooted at a working tree.
///
/// `git2::Repository` is not `Sync`, so the repository is reopened per call.
#[derive(Debug, Clone)]
pub struct GitRepository {
    root: PathBuf,
    ignored_prefixes: Vec<String>,
}

impl GitRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ignored_prefixes: Vec::new(),
        }
    }

    /// Leave a directory (usually the engine's own state directory) out of the clean check
    pub fn ignoring(mut self, dir: &Path) -> Self {
        let relative = self.relative(dir);
        let mut prefix = relative.to_string_lossy().replace('\\', "/");
        if !prefix.is_empty() {
            if !prefix.ends_with('/') {
                prefix.push('/');
            }
            self.ignored_prefixes.push(prefix);
        }
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn open(&self) -> Result<Repository> {
        Ok(Repository::open(&self.root)?)
    }

    fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }

    fn is_ignored(&self, path: &str) -> bool {
        self.ignored_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()) || prefix.trim_end_matches('/') == path)
    }

    fn head_commit(repo: &Repository) -> Result<Commit<'_>> {
        Ok(repo.head()?.peel_to_commit()?)
    }

    fn commit_index(
        repo: &Repository,
        message: &str,
        identity: &CommitIdentity,
    ) -> Result<String> {
        let signature = Signature::now(&identity.name, &identity.email)?;
        let mut index = repo.index()?;
        let tree_id = index.write_tree()?;
        let tree = repo.find_tree(tree_id)?;

        let parents = match repo.head() {
            Ok(head) => vec![head.peel_to_commit()?],
            Err(_) => Vec::new(),
        };
        let parent_refs: Vec<&Commit<'_>> = parents.iter().collect();

        let oid = repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &parent_refs,
        )?;
        Ok(oid.to_string())
    }
}

impl VersionControl for GitRepository {
    fn is_clean(&self) -> Result<bool> {
        let repo = self.open()?;
        let mut options = StatusOptions::new();
        options
            .include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);

        let statuses = repo.statuses(Some(&mut options))?;
        let dirty: Vec<String> = statuses
            .iter()
            .filter_map(|entry| entry.path().map(str::to_string))
            .filter(|path| !self.is_ignored(path))
            .collect();

        if !dirty.is_empty() {
            tracing::debug!("Working tree has {} modified path(s): {:?}", dirty.len(), dirty);
        }
        Ok(dirty.is_empty())
    }

    fn stage(&self, paths: &[PathBuf]) -> Result<()> {
        let repo = self.open()?;
        let mut index = repo.index()?;
        for path in paths {
            let relative = self.relative(path);
            if self.root.join(&relative).exists() {
                index.add_path(&relative)?;
            } else {
                index.remove_path(&relative)?;
            }
        }
        index.write()?;
        Ok(())
    }

    fn commit(&self, message: &str, identity: &CommitIdentity) -> Result<String> {
        let repo = self.open()?;
        Self::commit_index(&repo, message, identity)
    }

    fn revert_last_commit(&self, identity: &CommitIdentity) -> Result<Reverted> {
        let repo = self.open()?;
        let head = Self::head_commit(&repo)?;
        let reverted = head.id().to_string();

        repo.revert(&head, None)?;
        if repo.index()?.has_conflicts() {
            repo.cleanup_state()?;
            return Err(RsiError::Git(git2::Error::from_str(&format!(
                "reverting {} produced conflicts",
                reverted
            ))));
        }

        let message = format!(
            "Revert \"{}\"\n\nThis reverts commit {}.",
            head.summary().unwrap_or_default(),
            reverted
        );
        let commit = Self::commit_index(&repo, &message, identity)?;
        repo.cleanup_state()?;

        tracing::info!("Reverted commit {} with {}", reverted, commit);
        Ok(Reverted { reverted, commit })
    }

    fn hard_reset(&self) -> Result<()> {
        let repo = self.open()?;
        let head = Self::head_commit(&repo)?;
        repo.reset(head.as_object(), ResetType::Hard, None)?;
        Ok(())
    }

    fn checkout_path(&self, path: &Path) -> Result<()> {
        let repo = self.open()?;
        let relative = self.relative(path);
        let head = Self::head_commit(&repo)?;

        if head.tree()?.get_path(&relative).is_ok() {
            repo.reset_default(Some(head.as_object()), [relative.as_path()])?;
            let mut checkout = CheckoutBuilder::new();
            checkout.force().path(relative.as_path());
            repo.checkout_head(Some(&mut checkout))?;
        } else {
            let mut index = repo.index()?;
            if index.get_path(&relative, 0).is_some() {
                index.remove_path(&relative)?;
                index.write()?;
            }
            let absolute = self.root.join(&relative);
            if absolute.exists() {
                std::fs::remove_file(&absolute)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn identity() -> CommitIdentity {
        CommitIdentity {
            name: "Test".to_string(),
            email: "test@localhost".to_string(),
        }
    }

    fn repo_with_file(dir: &tempfile::TempDir) -> GitRepository {
        Repository::init(dir.path()).unwrap();
        fs::write(dir.path().join("app.ts"), "const a = 1;\n").unwrap();
        let git = GitRepository::new(dir.path());
        git.stage(&[PathBuf::from("app.ts")]).unwrap();
        git.commit("initial", &identity()).unwrap();
        git
    }

    #[test]
    fn fresh_commit_leaves_tree_clean() {
        let dir = tempfile::tempdir().unwrap();
        let git = repo_with_file(&dir);
        assert!(git.is_clean().unwrap());

        fs::write(dir.path().join("new.ts"), "x").unwrap();
        assert!(!git.is_clean().unwrap());
    }

    #[test]
    fn state_directory_is_not_dirt() {
        let dir = tempfile::tempdir().unwrap();
        let git = repo_with_file(&dir).ignoring(&dir.path().join(".rsi"));
        fs::create_dir_all(dir.path().join(".rsi")).unwrap();
        fs::write(dir.path().join(".rsi/change-ledger.json"), "[]").unwrap();
        assert!(git.is_clean().unwrap());
    }

    #[test]
    fn checkout_path_restores_head_content() {
        let dir = tempfile::tempdir().unwrap();
        let git = repo_with_file(&dir);
        let file = dir.path().join("app.ts");
        fs::write(&file, "broken").unwrap();

        git.checkout_path(&file).unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "const a = 1;\n");
        assert!(git.is_clean().unwrap());
    }

    #[test]
    fn checkout_path_removes_files_unknown_to_head() {
        let dir = tempfile::tempdir().unwrap();
        let git = repo_with_file(&dir);
        let file = dir.path().join("scratch.ts");
        fs::write(&file, "tmp").unwrap();

        git.checkout_path(&file).unwrap();
        assert!(!file.exists());
    }

    #[test]
    fn revert_creates_inverse_commit() {
        let dir = tempfile::tempdir().unwrap();
        let git = repo_with_file(&dir);
        let file = dir.path().join("app.ts");

        fs::write(&file, "const a = 2;\n").unwrap();
        git.stage(&[file.clone()]).unwrap();
        let change = git.commit("fix(rsi): bump", &identity()).unwrap();

        let reverted = git.revert_last_commit(&identity()).unwrap();
        assert_eq!(reverted.reverted, change);
        assert_ne!(reverted.commit, change);
        assert_eq!(fs::read_to_string(&file).unwrap(), "const a = 1;\n");
        assert!(git.is_clean().unwrap());

        let repo = Repository::open(dir.path()).unwrap();
        let head = repo.head().unwrap().peel_to_commit().unwrap();
        assert!(head.message().unwrap().starts_with("Revert \"fix(rsi): bump\""));
    }

    #[test]
    fn hard_reset_discards_tracked_edits() {
        let dir = tempfile::tempdir().unwrap();
        let git = repo_with_file(&dir);
        fs::write(dir.path().join("app.ts"), "edited").unwrap();

        git.hard_reset().unwrap();
        assert!(git.is_clean().unwrap());
    }
}
