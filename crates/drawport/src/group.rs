//! Engine processes run in a process group of their own, so teardown also reaches whatever they
//! started (browser helpers, the X server behind `xvfb-run`).

use tokio::process::{Child, Command};

/// Makes the spawned process the leader of a new process group.
pub(crate) fn isolate(command: &mut Command) -> &mut Command {
    #[cfg(unix)]
    command.process_group(0);
    command
}

/// The process group led by a spawned engine. Dropping it kills whatever is left in the group.
#[derive(Debug)]
pub(crate) struct ProcessGroup {
    id: Option<u32>,
}

impl ProcessGroup {
    /// Must be called before `child` is reaped.
    pub(crate) fn of(child: &Child) -> Self {
        Self { id: child.id() }
    }

    /// Sends SIGKILL to every process in the group. Only the first call signals.
    pub(crate) fn kill(&mut self) {
        if let Some(id) = self.id.take() {
            kill_group(id);
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn kill_group(id: u32) {
    let Ok(pgid) = libc::pid_t::try_from(id) else {
        return;
    };
    if pgid <= 1 {
        return;
    }
    // SAFETY: killpg takes plain integers; a group that no longer exists yields ESRCH.
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            tracing::warn!(pgid, "failed to kill engine process group: {err}");
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_id: u32) {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::process::Stdio;

    #[tokio::test]
    async fn kill_reaches_the_group_leader_once() {
        let mut command = Command::new("/bin/sh");
        command
            .args(["-c", "sleep 30"])
            .stdin(Stdio::null())
            .kill_on_drop(true);
        let mut child = isolate(&mut command).spawn().expect("spawn sh");
        let mut group = ProcessGroup::of(&child);

        group.kill();
        group.kill();
        let status = tokio::time::timeout(std::time::Duration::from_secs(5), child.wait())
            .await
            .expect("leader exits after the group is killed")
            .expect("wait");
        assert_eq!(status.signal(), Some(libc::SIGKILL));
        assert!(group.id.is_none());
    }
}
