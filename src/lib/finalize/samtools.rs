//! Post-processing with an external `samtools` executable.

use std::ffi::OsString;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result, bail};
use log::info;

use super::PostProcessor;

/// Runs `samtools sort`, `samtools merge` and `samtools index`.
///
/// Each invocation runs in the configured working directory. With a log
/// directory, stdout and stderr of every step go to
/// `<log_dir>/samtools.<step>.<target file name>.log`; without one, stderr is
/// captured and included in the error when a step fails.
#[derive(Debug, Clone)]
pub struct SamtoolsPostProcessor {
    executable: PathBuf,
    working_dir: Option<PathBuf>,
    log_dir: Option<PathBuf>,
}

impl Default for SamtoolsPostProcessor {
    fn default() -> Self {
        Self { executable: PathBuf::from("samtools"), working_dir: None, log_dir: None }
    }
}

impl SamtoolsPostProcessor {
    /// Uses `samtools` from the `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the executable to run.
    #[must_use]
    pub fn executable<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.executable = path.into();
        self
    }

    /// Set the working directory of every invocation.
    #[must_use]
    pub fn working_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.working_dir = Some(path.into());
        self
    }

    /// Redirect the output of every invocation to a log file in `path`.
    #[must_use]
    pub fn log_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.log_dir = Some(path.into());
        self
    }

    /// Arguments for `samtools sort`.
    #[must_use]
    pub fn sort_args(input: &Path, output: &Path, threads: usize) -> Vec<OsString> {
        vec![
            "sort".into(),
            "-@".into(),
            threads.to_string().into(),
            "-o".into(),
            output.into(),
            input.into(),
        ]
    }

    /// Arguments for `samtools merge`.
    #[must_use]
    pub fn merge_args(output: &Path, inputs: &[PathBuf], threads: usize) -> Vec<OsString> {
        let mut args: Vec<OsString> =
            vec!["merge".into(), "-f".into(), "-@".into(), threads.to_string().into(), output.into()];
        args.extend(inputs.iter().map(OsString::from));
        args
    }

    /// Arguments for `samtools index`.
    #[must_use]
    pub fn index_args(file: &Path, threads: usize) -> Vec<OsString> {
        vec!["index".into(), "-@".into(), threads.to_string().into(), file.into()]
    }

    /// Path of the log file for a step, if logging to files.
    #[must_use]
    pub fn log_path(&self, step: &str, target: &Path) -> Option<PathBuf> {
        let name = target.file_name().map_or_else(|| "output".into(), |n| n.to_string_lossy());
        self.log_dir.as_ref().map(|dir| dir.join(format!("samtools.{step}.{name}.log")))
    }

    fn run(&self, step: &str, target: &Path, args: Vec<OsString>) -> Result<()> {
        let mut command = Command::new(&self.executable);
        command.args(&args);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        info!(
            "Running {} {}",
            self.executable.display(),
            args.iter().map(|a| a.to_string_lossy()).collect::<Vec<_>>().join(" ")
        );

        let (status, stderr) = if let Some(log_path) = self.log_path(step, target) {
            let log = File::create(&log_path)
                .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;
            let log_err = log.try_clone().context("Failed to duplicate log file handle")?;
            let status = command
                .stdout(Stdio::from(log))
                .stderr(Stdio::from(log_err))
                .status()
                .with_context(|| format!("Failed to run {}", self.executable.display()))?;
            (status, format!("see {}", log_path.display()))
        } else {
            let output = command
                .stdout(Stdio::null())
                .output()
                .with_context(|| format!("Failed to run {}", self.executable.display()))?;
            (output.status, String::from_utf8_lossy(&output.stderr).trim().to_string())
        };

        if !status.success() {
            bail!("samtools {step} exited with {status}: {stderr}");
        }
        Ok(())
    }
}

impl PostProcessor for SamtoolsPostProcessor {
    fn sort(&self, input: &Path, output: &Path, threads: usize) -> Result<()> {
        self.run("sort", output, Self::sort_args(input, output, threads))
    }

    fn merge(&self, output: &Path, inputs: &[PathBuf], threads: usize) -> Result<()> {
        self.run("merge", output, Self::merge_args(output, inputs, threads))
    }

    fn index(&self, file: &Path, threads: usize) -> Result<()> {
        self.run("index", file, Self::index_args(file, threads))
    }
}
