//! Node launch planning
//!
//! Decides how a node is started: in a visible local terminal, in a detached
//! local screen session, or through the starter script on a remote host.

use std::process::Stdio;

use dashmap::DashMap;
use tokio::process::Command;

use nm_core::error::NmError;

use crate::locality::LocalityResolver;
use crate::subsystem::{ScreenHandler, SshHandler};
use crate::terminal::TerminalLocator;

/// Pager used to show session logs
pub const LESS: &str = "/usr/bin/less -fKLnQrSU";

/// Script used on remote hosts to start new nodes
pub const STARTER_SCRIPT: &str = "rosrun node_manager remote_nm.py";

/// Wrapper that restarts a node when it exits
pub const RESPAWN_SCRIPT: &str = "rosrun node_manager respawn";

/// Host label of nodes launched without an explicit host
const LOCAL_HOST: &str = "localhost";

/// A node to be started
#[derive(Debug, Clone, Default)]
pub struct NodeLaunch {
    /// Fully qualified node name
    pub node: String,
    /// Target host, empty for this machine
    pub host: String,
    /// Command line of the node
    pub argv: Vec<String>,
    /// Open a terminal window for the node if possible
    pub visible: bool,
    /// Restart the node when it exits
    pub respawn: bool,
    /// Remote user, defaults to the ssh configuration
    pub user: Option<String>,
}

/// How a node will be started
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchPlan {
    /// Local terminal window, a complete command line
    Terminal { command: String },
    /// Local detached screen session, named after `host`
    Screen { host: String, args: Vec<String> },
    /// Starter script run over ssh
    Remote { host: String, args: Vec<String> },
}

/// Plans and starts nodes, remembering where each node went
pub struct StartHandler {
    /// Host each node was last started on
    started: DashMap<String, String>,
}

impl StartHandler {
    /// Create a new start handler
    pub fn new() -> Self {
        Self {
            started: DashMap::new(),
        }
    }

    /// Decide how to start `launch`.
    ///
    /// Uses the current locality classification; a host whose resolution is
    /// still pending is planned as remote.
    pub fn plan(
        &self,
        launch: &NodeLaunch,
        locality: &LocalityResolver,
        terminal: &TerminalLocator,
        screen: &ScreenHandler,
    ) -> LaunchPlan {
        let mut argv: Vec<String> = Vec::new();
        if launch.respawn {
            argv.extend(RESPAWN_SCRIPT.split_whitespace().map(str::to_string));
        }
        argv.extend(launch.argv.iter().cloned());

        if locality.is_local(&launch.host) {
            if launch.visible {
                let command = terminal.terminal_cmd(argv.as_slice(), &launch.node);
                if !command.is_empty() {
                    return LaunchPlan::Terminal { command };
                }
                tracing::debug!("No terminal for {}, starting detached", launch.node);
            }
            let host = if launch.host.is_empty() {
                LOCAL_HOST.to_string()
            } else {
                launch.host.clone()
            };
            let args = screen.launch_args(&host, &launch.node, argv.as_slice());
            return LaunchPlan::Screen { host, args };
        }

        let mut args: Vec<String> = STARTER_SCRIPT
            .split_whitespace()
            .map(str::to_string)
            .collect();
        args.push("--node".to_string());
        args.push(launch.node.clone());
        args.push("--".to_string());
        args.extend(argv);
        LaunchPlan::Remote {
            host: launch.host.clone(),
            args,
        }
    }

    /// Execute a plan.
    ///
    /// Local plans are spawned and left running; remote plans wait for the
    /// starter script to return.
    pub async fn start(
        &self,
        launch: &NodeLaunch,
        plan: &LaunchPlan,
        screen: &ScreenHandler,
        ssh: &SshHandler,
    ) -> Result<(), NmError> {
        match plan {
            LaunchPlan::Terminal { command } => {
                Command::new("sh")
                    .arg("-c")
                    .arg(command)
                    .stdin(Stdio::null())
                    .spawn()?;
            }
            LaunchPlan::Screen { host, args } => {
                screen.write_config(host, &launch.node)?;
                if let Some((program, rest)) = args.split_first() {
                    Command::new(program)
                        .args(rest)
                        .stdin(Stdio::null())
                        .spawn()?;
                }
            }
            LaunchPlan::Remote { host, args } => {
                ssh.exec(host, launch.user.as_deref(), args.as_slice()).await?;
            }
        }

        let host = match plan {
            LaunchPlan::Remote { host, .. } | LaunchPlan::Screen { host, .. } => host.clone(),
            LaunchPlan::Terminal { .. } => LOCAL_HOST.to_string(),
        };
        tracing::info!("Started {} on {}", launch.node, host);
        self.started.insert(launch.node.clone(), host);
        Ok(())
    }

    /// Host a node was last started on
    pub fn host_of(&self, node: &str) -> Option<String> {
        self.started.get(node).map(|r| r.value().clone())
    }

    /// Number of nodes started
    pub fn len(&self) -> usize {
        self.started.len()
    }

    /// Check if no node was started
    pub fn is_empty(&self) -> bool {
        self.started.is_empty()
    }
}

impl Default for StartHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locality::SystemLookup;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use tokio::runtime::Handle;

    fn resolver() -> LocalityResolver {
        LocalityResolver::new(
            Arc::new(SystemLookup::with_local_addresses(vec![])),
            Handle::current(),
        )
    }

    fn launch(host: &str, visible: bool) -> NodeLaunch {
        NodeLaunch {
            node: "/talker".to_string(),
            host: host.to_string(),
            argv: vec!["rosrun".into(), "pkg".into(), "talker".into()],
            visible,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_local_without_terminal_uses_screen() {
        let starter = StartHandler::new();
        let terminal = TerminalLocator::new(vec![PathBuf::from("/nonexistent/xterm")]);
        let screen = ScreenHandler::new(Path::new("/tmp/nm"));

        let plan = starter.plan(&launch("127.0.0.1", true), &resolver(), &terminal, &screen);
        match plan {
            LaunchPlan::Screen { host, args } => {
                assert_eq!(host, "127.0.0.1");
                assert_eq!(args[0], "screen");
                assert!(args.contains(&"127.0.0.1__talker".to_string()));
                assert_eq!(&args[args.len() - 3..], &["rosrun", "pkg", "talker"]);
            }
            other => panic!("unexpected plan {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_remote_literal_uses_starter_script() {
        let starter = StartHandler::new();
        let terminal = TerminalLocator::new(vec![]);
        let screen = ScreenHandler::new(Path::new("/tmp/nm"));

        let mut node = launch("10.20.30.40", true);
        node.respawn = true;
        let plan = starter.plan(&node, &resolver(), &terminal, &screen);
        assert_eq!(
            plan,
            LaunchPlan::Remote {
                host: "10.20.30.40".to_string(),
                args: [
                    "rosrun", "node_manager", "remote_nm.py", "--node", "/talker", "--",
                    "rosrun", "node_manager", "respawn", "rosrun", "pkg", "talker",
                ]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            }
        );
    }

    #[tokio::test]
    async fn test_empty_host_is_local() {
        let starter = StartHandler::new();
        let terminal = TerminalLocator::new(vec![]);
        let screen = ScreenHandler::new(Path::new("/tmp/nm"));
        let plan = starter.plan(&launch("", false), &resolver(), &terminal, &screen);
        match plan {
            LaunchPlan::Screen { host, args } => {
                assert_eq!(host, "localhost");
                assert!(args.contains(&"localhost__talker".to_string()));
            }
            other => panic!("unexpected plan {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_start_remote_records_host() {
        let starter = StartHandler::new();
        let screen = ScreenHandler::new(Path::new("/tmp/nm"));
        let ssh = SshHandler::new(PathBuf::from("true"), std::time::Duration::from_secs(1));
        let node = launch("robot", false);
        let plan = LaunchPlan::Remote {
            host: "robot".to_string(),
            args: vec!["echo".to_string()],
        };

        starter.start(&node, &plan, &screen, &ssh).await.unwrap();
        assert_eq!(starter.host_of("/talker").as_deref(), Some("robot"));
        assert_eq!(starter.len(), 1);
    }
}
