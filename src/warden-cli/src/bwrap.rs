//! Bubblewrap execution boundary.
//!
//! The rendered directives are written NUL-separated to an anonymous
//! temporary file passed as `--args FD`; the filter program, when present,
//! goes to a second one passed as `--seccomp FD`. Both files belong to a
//! [`HandOff`] and are closed once the child has exited.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::process::Command;

use tracing::debug;
use warden_policy::{BoundaryError, ExecutionBoundary, Invocation};

/// Runs commands through the `bwrap` executable.
#[derive(Debug, Clone)]
pub struct BwrapBoundary {
    program: String,
}

impl BwrapBoundary {
    /// Boundary using `program`, resolved on `PATH` when it has no slash.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Absolute path of the engine executable.
    pub fn locate(&self) -> Result<PathBuf, BoundaryError> {
        which::which(&self.program)
            .map_err(|e| BoundaryError::EngineNotFound(format!("{}: {e}", self.program)))
    }
}

/// Temporary artifacts backing one hand-off.
///
/// The files are unlinked as soon as they are created and live only as open
/// descriptors, so nothing is left in the temp dir even when warden is
/// killed while the child runs.
struct HandOff {
    args: File,
    filter: Option<File>,
}

impl HandOff {
    fn prepare(invocation: &Invocation) -> Result<Self, BoundaryError> {
        let stream = invocation.policy.to_nul_stream();
        let args = write_artifact(&stream)?;
        let filter = invocation
            .filter
            .as_ref()
            .map(|program| write_artifact(program.as_bytes()))
            .transpose()?;
        debug!(
            args_bytes = stream.len(),
            filter_bytes = invocation.filter.as_ref().map(|f| f.len()),
            "prepared hand-off artifacts"
        );
        Ok(Self { args, filter })
    }

    /// Close the artifacts once the child has exited.
    fn release(self) {
        drop(self);
        debug!("released hand-off artifacts");
    }
}

fn write_artifact(bytes: &[u8]) -> Result<File, BoundaryError> {
    let mut file = tempfile::tempfile()?;
    file.write_all(bytes)?;
    file.flush()?;
    file.seek(SeekFrom::Start(0))?;
    Ok(file)
}

#[cfg(unix)]
impl ExecutionBoundary for BwrapBoundary {
    fn name(&self) -> &str {
        "bwrap"
    }

    fn check_available(&self) -> Result<(), BoundaryError> {
        self.locate().map(|_| ())
    }

    fn hand_off(&self, invocation: &Invocation) -> Result<i32, BoundaryError> {
        use std::os::fd::AsRawFd;
        use std::os::unix::process::{CommandExt, ExitStatusExt};

        let program = self.locate()?;
        let handoff = HandOff::prepare(invocation)?;

        let mut inherited = vec![handoff.args.as_raw_fd()];
        let mut cmd = Command::new(&program);
        cmd.arg("--args").arg(inherited[0].to_string());
        if let Some(filter) = &handoff.filter {
            let fd = filter.as_raw_fd();
            inherited.push(fd);
            cmd.arg("--seccomp").arg(fd.to_string());
        }
        cmd.arg("--").args(&invocation.command);

        // SAFETY: only fcntl runs between fork and exec, which is
        // async-signal-safe. The descriptors stay open in the parent until
        // the child has exited.
        unsafe {
            cmd.pre_exec(move || {
                for &fd in &inherited {
                    let flags = libc::fcntl(fd, libc::F_GETFD);
                    if flags == -1 || libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) == -1 {
                        return Err(std::io::Error::last_os_error());
                    }
                }
                Ok(())
            });
        }

        debug!(
            program = %program.display(),
            channels = ?invocation.channel_mode(),
            command = ?invocation.command,
            "handing off to bubblewrap"
        );

        let status = cmd.status().map_err(|source| BoundaryError::Spawn {
            program: program.display().to_string(),
            source,
        });
        handoff.release();
        let status = status?;

        let code = status
            .code()
            .or_else(|| status.signal().map(|sig| 128 + sig))
            .unwrap_or(1);
        debug!(code, "sandboxed command exited");
        Ok(code)
    }
}

#[cfg(not(unix))]
impl ExecutionBoundary for BwrapBoundary {
    fn name(&self) -> &str {
        "bwrap"
    }

    fn check_available(&self) -> Result<(), BoundaryError> {
        Err(BoundaryError::EngineNotFound(
            "bubblewrap is only available on Linux".to_string(),
        ))
    }

    fn hand_off(&self, _invocation: &Invocation) -> Result<i32, BoundaryError> {
        self.check_available().map(|_| 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use warden_policy::{Directive, FilterProgram, RenderedPolicy};

    fn invocation(filter: Option<FilterProgram>) -> Invocation {
        Invocation::new(
            RenderedPolicy {
                directives: vec![
                    Directive::Raw("--unshare-all".to_string()),
                    Directive::Raw("--die-with-parent".to_string()),
                ],
            },
            filter,
            vec!["true".to_string()],
        )
    }

    #[test]
    fn test_artifacts_hold_channels() {
        let invocation = invocation(Some(FilterProgram::new(vec![1, 2, 3, 4, 5, 6, 7, 8])));
        let mut handoff = HandOff::prepare(&invocation).unwrap();

        let mut args = Vec::new();
        handoff.args.read_to_end(&mut args).unwrap();
        assert_eq!(args, b"--unshare-all\0--die-with-parent\0".to_vec());

        let mut program = Vec::new();
        handoff.filter.as_mut().unwrap().read_to_end(&mut program).unwrap();
        assert_eq!(program, vec![1, 2, 3, 4, 5, 6, 7, 8]);

        handoff.release();
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_artifacts_leave_nothing_on_disk() {
        use std::os::fd::AsRawFd;

        let invocation = invocation(Some(FilterProgram::new(vec![0; 8])));
        let handoff = HandOff::prepare(&invocation).unwrap();

        let files = std::iter::once(&handoff.args).chain(handoff.filter.as_ref());
        for file in files {
            let link = std::fs::read_link(format!("/proc/self/fd/{}", file.as_raw_fd())).unwrap();
            assert!(
                link.to_string_lossy().ends_with("(deleted)"),
                "{} still linked",
                link.display()
            );
        }
        handoff.release();
    }

    #[test]
    fn test_no_filter_artifact_without_program() {
        let handoff = HandOff::prepare(&invocation(None)).unwrap();
        assert!(handoff.filter.is_none());
        handoff.release();
    }

    #[test]
    fn test_missing_engine() {
        let boundary = BwrapBoundary::new("warden-test-no-such-engine");
        assert!(matches!(
            boundary.check_available(),
            Err(BoundaryError::EngineNotFound(_))
        ));
    }
}
