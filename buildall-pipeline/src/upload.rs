//! Upload with label selection and linear-backoff retries.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use buildall_core::{process, version, Label, PrereleaseExclusions, ProcessError, RecipeVariant};

use crate::error::UploadError;

/// Default number of upload attempts.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// One invocation of the upload tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub file: PathBuf,
    pub username: String,
    pub labels: Vec<String>,
    pub force: bool,
}

/// The external upload collaborator.
pub trait UploadCli {
    fn upload(&self, request: &UploadRequest) -> Result<(), ProcessError>;
}

/// `anaconda upload`. The token is handed in once at construction.
#[derive(Debug, Clone)]
pub struct AnacondaCli {
    anaconda: PathBuf,
    token: Option<String>,
}

impl AnacondaCli {
    pub fn new(anaconda: impl Into<PathBuf>, token: Option<String>) -> Self {
        Self {
            anaconda: anaconda.into(),
            token,
        }
    }

    fn command(&self, request: &UploadRequest) -> Command {
        let mut cmd = Command::new(&self.anaconda);
        if let Some(token) = &self.token {
            cmd.arg("-t").arg(token);
        }
        cmd.args(["upload", "--no-progress", "-u"])
            .arg(&request.username)
            .arg(&request.file);
        for label in &request.labels {
            cmd.arg("-l").arg(label);
        }
        if request.force {
            cmd.arg("--force");
        }
        cmd
    }
}

impl UploadCli for AnacondaCli {
    fn upload(&self, request: &UploadRequest) -> Result<(), ProcessError> {
        let output = process::run_captured(&mut self.command(request))?;
        tracing::debug!("{}", String::from_utf8_lossy(&output.stdout).trim());
        Ok(())
    }
}

/// Pick the labels to upload `variant` under.
///
/// 1. Not forced, pre-release version, not excluded → `dev`
/// 2. `dev` requested → `dev` (requires `force`)
/// 3. `extra.upload` set → exactly those labels
/// 4. `main`
pub fn select_labels(
    variant: &RecipeVariant,
    force: bool,
    dev: bool,
    exclusions: &PrereleaseExclusions,
) -> Result<Vec<String>, UploadError> {
    if !force && version::is_prerelease(&variant.version) && !exclusions.contains(&variant.name) {
        return Ok(vec![Label::Dev.to_string()]);
    }
    if dev {
        if !force {
            return Err(UploadError::DevRequiresForce);
        }
        return Ok(vec![Label::Dev.to_string()]);
    }
    if let Some(labels) = variant.extra.upload_labels() {
        return Ok(labels);
    }
    Ok(vec![Label::Main.to_string()])
}

/// Wraps an [`UploadCli`] with label selection and retries.
///
/// After failed attempt `n` (1-based) it sleeps `n` seconds; no sleep
/// follows the last attempt.
pub struct UploadRetrier {
    cli: Box<dyn UploadCli>,
    exclusions: PrereleaseExclusions,
    max_retries: u32,
    sleeper: Box<dyn Fn(Duration)>,
}

impl UploadRetrier {
    pub fn new(cli: Box<dyn UploadCli>, exclusions: PrereleaseExclusions) -> Self {
        Self {
            cli,
            exclusions,
            max_retries: DEFAULT_MAX_RETRIES,
            sleeper: Box::new(std::thread::sleep),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Replace the backoff sleep (tests record instead of sleeping).
    pub fn with_sleeper(mut self, sleeper: impl Fn(Duration) + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    /// Upload the artifact of `variant` to `username`. Returns the labels used.
    pub fn upload(
        &self,
        variant: &RecipeVariant,
        username: &str,
        force: bool,
        dev: bool,
    ) -> Result<Vec<String>, UploadError> {
        let file = variant.output_path.clone();
        if !file.is_file() {
            return Err(UploadError::FileNotFound { path: file });
        }
        let labels = select_labels(variant, force, dev, &self.exclusions)?;
        let request = UploadRequest {
            file,
            username: username.to_string(),
            labels,
            force,
        };

        let attempts = self.max_retries.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            tracing::info!(
                "uploading {} to {username} [{}] (attempt {attempt}/{attempts})",
                request.file.display(),
                request.labels.join(","),
            );
            match self.cli.upload(&request) {
                Ok(()) => return Ok(request.labels),
                Err(err) if attempt >= attempts => {
                    return Err(UploadError::Exhausted {
                        path: request.file,
                        attempts,
                        source: err,
                    });
                }
                Err(err) => {
                    let backoff = Duration::from_secs(u64::from(attempt));
                    tracing::warn!(error = %err, "upload failed, retrying in {}s", backoff.as_secs());
                    (self.sleeper)(backoff);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::fs;
    use std::path::Path;
    use std::rc::Rc;

    use buildall_core::{BuildId, ExtraConfig, RenderedMeta};
    use tempfile::TempDir;

    /// Fails the first `failures` calls, then succeeds.
    struct FlakyCli {
        failures: u32,
        calls: Rc<RefCell<Vec<UploadRequest>>>,
    }

    impl UploadCli for FlakyCli {
        fn upload(&self, request: &UploadRequest) -> Result<(), ProcessError> {
            let mut calls = self.calls.borrow_mut();
            calls.push(request.clone());
            if calls.len() as u32 <= self.failures {
                return Err(ProcessError::Failed {
                    command: "anaconda upload".to_string(),
                    status: "exit status: 1".to_string(),
                    stderr: "502 Bad Gateway".to_string(),
                });
            }
            Ok(())
        }
    }

    fn variant(version: &str, output: &Path) -> RecipeVariant {
        RecipeVariant {
            build_id: BuildId::from("20190101000000000"),
            name: "openmm".to_string(),
            version: version.to_string(),
            output_path: output.to_path_buf(),
            skip: false,
            extra: ExtraConfig::default(),
            channels: vec![],
            meta: RenderedMeta::Final {
                recipe_dir: PathBuf::from("recipes/openmm"),
            },
        }
    }

    fn artifact(tmp: &TempDir) -> PathBuf {
        let path = tmp.path().join("openmm-7.3.1-py37_0.tar.bz2");
        fs::write(&path, b"pkg").unwrap();
        path
    }

    fn retrier(failures: u32) -> (UploadRetrier, Rc<RefCell<Vec<UploadRequest>>>, Rc<RefCell<Vec<Duration>>>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let sleeps = Rc::new(RefCell::new(Vec::new()));
        let recorded = sleeps.clone();
        let retrier = UploadRetrier::new(
            Box::new(FlakyCli {
                failures,
                calls: calls.clone(),
            }),
            PrereleaseExclusions::default(),
        )
        .with_sleeper(move |d| recorded.borrow_mut().push(d));
        (retrier, calls, sleeps)
    }

    #[test]
    fn prerelease_goes_to_dev() {
        let v = variant("7.4.0rc1", Path::new("x"));
        let labels = select_labels(&v, false, false, &PrereleaseExclusions::default()).unwrap();
        assert_eq!(labels, ["dev"]);
    }

    #[test]
    fn excluded_prerelease_falls_through() {
        let v = variant("7.4.0rc1", Path::new("x"));
        let exclusions: PrereleaseExclusions = ["openmm".to_string()].into_iter().collect();
        assert_eq!(select_labels(&v, false, false, &exclusions).unwrap(), ["main"]);
    }

    #[test]
    fn forced_prerelease_uses_extra_labels() {
        let mut v = variant("7.4.0rc1", Path::new("x"));
        v.extra.upload = Some("rc,beta".to_string());
        let labels = select_labels(&v, true, false, &PrereleaseExclusions::default()).unwrap();
        assert_eq!(labels, ["rc", "beta"]);
    }

    #[test]
    fn blank_extra_upload_falls_back_to_main() {
        let mut v = variant("7.3.1", Path::new("x"));
        v.extra.upload = Some(" , ".to_string());
        let labels = select_labels(&v, false, false, &PrereleaseExclusions::default()).unwrap();
        assert_eq!(labels, ["main"]);
    }

    #[test]
    fn dev_requires_force() {
        let v = variant("7.3.1", Path::new("x"));
        let err = select_labels(&v, false, true, &PrereleaseExclusions::default()).unwrap_err();
        assert!(matches!(err, UploadError::DevRequiresForce));
        let labels = select_labels(&v, true, true, &PrereleaseExclusions::default()).unwrap();
        assert_eq!(labels, ["dev"]);
    }

    #[test]
    fn plain_release_goes_to_main() {
        let v = variant("7.3.1", Path::new("x"));
        let labels = select_labels(&v, false, false, &PrereleaseExclusions::default()).unwrap();
        assert_eq!(labels, ["main"]);
    }

    #[test]
    fn missing_file_fails_before_any_attempt() {
        let tmp = TempDir::new().unwrap();
        let (retrier, calls, _) = retrier(0);
        let err = retrier
            .upload(&variant("7.3.1", &tmp.path().join("gone.tar.bz2")), "omnia", false, false)
            .unwrap_err();
        assert!(matches!(err, UploadError::FileNotFound { .. }));
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn three_failures_then_success() {
        let tmp = TempDir::new().unwrap();
        let (retrier, calls, sleeps) = retrier(3);
        let labels = retrier
            .upload(&variant("7.3.1", &artifact(&tmp)), "omnia", false, false)
            .unwrap();
        assert_eq!(labels, ["main"]);
        assert_eq!(calls.borrow().len(), 4);
        assert_eq!(
            *sleeps.borrow(),
            [Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(3)]
        );
    }

    #[test]
    fn exhaustion_returns_last_failure() {
        let tmp = TempDir::new().unwrap();
        let (retrier, calls, sleeps) = retrier(u32::MAX);
        let retrier = retrier.with_max_retries(2);
        let err = retrier
            .upload(&variant("7.3.1", &artifact(&tmp)), "omnia", false, false)
            .unwrap_err();
        match err {
            UploadError::Exhausted { attempts, source, .. } => {
                assert_eq!(attempts, 2);
                assert!(source.to_string().contains("502"));
            }
            other => panic!("expected exhausted, got {other:?}"),
        }
        assert_eq!(calls.borrow().len(), 2);
        assert_eq!(*sleeps.borrow(), [Duration::from_secs(1)]);
    }

    #[test]
    fn zero_retries_still_attempts_once() {
        let tmp = TempDir::new().unwrap();
        let (retrier, calls, _) = retrier(0);
        let retrier = retrier.with_max_retries(0);
        retrier
            .upload(&variant("7.3.1", &artifact(&tmp)), "omnia", true, false)
            .unwrap();
        assert_eq!(calls.borrow().len(), 1);
        assert!(calls.borrow()[0].force);
    }

    #[test]
    fn anaconda_command_line() {
        let cli = AnacondaCli::new("anaconda", Some("tok".to_string()));
        let request = UploadRequest {
            file: PathBuf::from("/bld/openmm.tar.bz2"),
            username: "omnia".to_string(),
            labels: vec!["rc".to_string(), "beta".to_string()],
            force: true,
        };
        assert_eq!(
            process::describe(&cli.command(&request)),
            "anaconda -t *** upload --no-progress -u omnia /bld/openmm.tar.bz2 -l rc -l beta --force"
        );
        let anonymous = AnacondaCli::new("anaconda", None);
        assert!(process::describe(&anonymous.command(&request)).starts_with("anaconda upload"));
    }
}
