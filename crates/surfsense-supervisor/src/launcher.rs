//! Building the command line for each child process

use std::path::PathBuf;

use tokio::process::Command;

use crate::child_spec::ChildRole;

/// Produces the command that starts a child in a given role
pub trait ChildLauncher: Send + Sync {
    fn command(&self, role: ChildRole) -> Command;
}

/// Starts children by re-running this executable with a hidden subcommand
#[derive(Debug, Clone)]
pub struct SelfExecLauncher {
    program: PathBuf,
}

impl SelfExecLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl ChildLauncher for SelfExecLauncher {
    fn command(&self, role: ChildRole) -> Command {
        let mut command = Command::new(&self.program);
        command.arg(role.subcommand());
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_command_line() {
        let launcher = SelfExecLauncher::new("/opt/surfsense/bin/surfsense");
        let command = launcher.command(ChildRole::Scheduler);
        let std = command.as_std();

        assert_eq!(std.get_program(), "/opt/surfsense/bin/surfsense");
        let args: Vec<_> = std.get_args().collect();
        assert_eq!(args, ["beat"]);
    }
}
