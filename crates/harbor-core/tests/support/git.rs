use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

const GIT_ENV_OVERRIDES: [&str; 4] = [
    "GIT_DIR",
    "GIT_WORK_TREE",
    "GIT_INDEX_FILE",
    "GIT_COMMON_DIR",
];

pub fn git_command() -> Command {
    let mut cmd = Command::new("git");
    for key in GIT_ENV_OVERRIDES {
        cmd.env_remove(key);
    }
    cmd
}

pub fn git(dir: &Path, args: &[&str]) {
    let output = git_command()
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to invoke git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

pub fn git_stdout(dir: &Path, args: &[&str]) -> String {
    let output = git_command()
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to invoke git");
    assert!(output.status.success(), "git {args:?} failed");
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A local checkout on `master` plus a bare repository standing in for
/// the Heroku remote, both seeded with the same initial commit.
pub struct DeployRepo {
    _dir: TempDir,
    pub work: PathBuf,
    pub remote: PathBuf,
}

impl DeployRepo {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let work = dir.path().join("work");
        let remote = dir.path().join("remote.git");
        std::fs::create_dir(&work).unwrap();

        git(&work, &["init", "-q"]);
        git(&work, &["config", "user.email", "deploy@example.com"]);
        git(&work, &["config", "user.name", "Deploy Tests"]);
        git(&work, &["checkout", "-q", "-b", "master"]);
        std::fs::write(work.join("app.txt"), "v1\n").unwrap();
        git(&work, &["add", "."]);
        git(&work, &["commit", "-q", "-m", "initial"]);

        git(dir.path(), &["init", "-q", "--bare", "remote.git"]);
        let remote_str = remote.to_str().unwrap().to_string();
        git(&work, &["push", "-q", &remote_str, "master:master"]);

        Self {
            _dir: dir,
            work,
            remote,
        }
    }

    /// The remote URL the platform hands out for this app.
    pub fn git_url(&self) -> String {
        self.remote.to_str().unwrap().to_string()
    }

    /// Commit `count` new migration files on the local master, leaving
    /// the remote behind.
    pub fn add_migrations(&self, count: usize) {
        let migrate_dir = self.work.join("db").join("migrate");
        std::fs::create_dir_all(&migrate_dir).unwrap();
        for i in 0..count {
            std::fs::write(
                migrate_dir.join(format!("00{i}_create_things.rb")),
                "class CreateThings\nend\n",
            )
            .unwrap();
        }
        git(&self.work, &["add", "."]);
        git(&self.work, &["commit", "-q", "-m", "add migrations"]);
    }

    pub fn head_revision(&self) -> String {
        git_stdout(&self.work, &["rev-parse", "master"])
    }

    pub fn remote_names(&self) -> Vec<String> {
        git_stdout(&self.work, &["remote"])
            .lines()
            .map(str::to_string)
            .collect()
    }
}
