// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Running external executables.
//!
//! Every call blocks its worker thread until the tool exits; tools such as
//! `awimager` are internally parallel and the invoker doesn't try to second
//! guess them. Where a tool writes its logs and which directory it runs in are
//! explicit per [`ToolCall`]; nothing here changes the process-wide working
//! directory, because many calls run concurrently.

mod env;
mod error;
#[cfg(test)]
mod tests;

pub use env::{resolve_environment, Environment};
pub use error::ToolError;

use std::{
    collections::HashMap,
    ffi::{OsStr, OsString},
    fmt::Display,
    fs::OpenOptions,
    path::{Path, PathBuf},
    process::Command,
    sync::{Arc, Mutex},
};

use log::{debug, info};

/// A single invocation of an external executable.
#[derive(Debug, Clone)]
pub struct ToolCall {
    executable: OsString,
    args: Vec<OsString>,
    init_script: Option<PathBuf>,
    working_dir: Option<PathBuf>,
    log_file: Option<PathBuf>,
}

impl ToolCall {
    pub fn new<S: AsRef<OsStr>>(executable: S) -> ToolCall {
        ToolCall {
            executable: executable.as_ref().to_os_string(),
            args: vec![],
            init_script: None,
            working_dir: None,
            log_file: None,
        }
    }

    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> ToolCall {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> ToolCall
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Run the tool in the environment left behind by sourcing this script.
    pub fn init_script<P: Into<PathBuf>>(mut self, script: Option<P>) -> ToolCall {
        self.init_script = script.map(Into::into);
        self
    }

    pub fn working_dir<P: Into<PathBuf>>(mut self, dir: P) -> ToolCall {
        self.working_dir = Some(dir.into());
        self
    }

    /// Append the tool's stdout and stderr to this file rather than inheriting
    /// ours.
    pub fn log_file<P: Into<PathBuf>>(mut self, path: P) -> ToolCall {
        self.log_file = Some(path.into());
        self
    }

    pub fn executable(&self) -> &OsStr {
        &self.executable
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }
}

impl Display for ToolCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.executable.to_string_lossy())?;
        for a in &self.args {
            write!(f, " {}", a.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Runs [`ToolCall`]s. Environments resolved from initialisation scripts are
/// cached, so each script is only sourced once per run.
#[derive(Debug, Default)]
pub struct ToolInvoker {
    dry_run: bool,
    env_cache: Mutex<HashMap<PathBuf, Option<Arc<Environment>>>>,
}

impl ToolInvoker {
    pub fn new() -> ToolInvoker {
        ToolInvoker::default()
    }

    /// Log calls instead of running them.
    pub fn dry_run(mut self, dry_run: bool) -> ToolInvoker {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn environment(&self, script: &Path) -> Result<Option<Arc<Environment>>, ToolError> {
        if let Some(env) = self.env_cache.lock().unwrap().get(script) {
            return Ok(env.clone());
        }
        // Sourcing happens outside of the lock; if two workers race, both
        // resolve the same environment and one result wins.
        let env = resolve_environment(script)?.map(Arc::new);
        self.env_cache
            .lock()
            .unwrap()
            .insert(script.to_path_buf(), env.clone());
        Ok(env)
    }

    /// Run the tool to completion. A non-zero exit is an error.
    pub fn run(&self, call: &ToolCall) -> Result<(), ToolError> {
        let executable = call.executable.to_string_lossy().to_string();
        if self.dry_run {
            info!("(dry run) {call}");
            return Ok(());
        }

        let mut cmd = Command::new(&call.executable);
        cmd.args(&call.args);
        if let Some(script) = call.init_script.as_deref() {
            if let Some(env) = self.environment(script)? {
                cmd.env_clear();
                cmd.envs(env.iter());
            }
        }
        if let Some(dir) = call.working_dir.as_deref() {
            cmd.current_dir(dir);
        }
        if let Some(path) = call.log_file.as_deref() {
            let log_err = |source| ToolError::LogFile {
                path: path.to_path_buf(),
                source,
            };
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(log_err)?;
            cmd.stdout(file.try_clone().map_err(log_err)?);
            cmd.stderr(file);
        }

        debug!("Running {call}");
        let status = cmd.status().map_err(|source| ToolError::Spawn {
            executable: executable.clone(),
            source,
        })?;
        if status.success() {
            Ok(())
        } else {
            Err(ToolError::NonZeroExit {
                executable,
                exit_code: status.code(),
            })
        }
    }
}
