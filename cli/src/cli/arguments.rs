use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use hosted::config::UpdatePolicy;
use hosted::config::tree::tree_to_json;
use hosted::restart::AbortService;
use hosted::{Device, Node, NodeContext, NodeEnvironment};
use log::{error, info};
use serde_json::{Map, Value};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

const SHELL_PROMPT: &str = "syncer> ";

#[derive(Parser, Debug, Clone)]
#[command(name = "hosted", about, author, version, long_about = None, propagate_version = true)]
pub struct HostedArguments {
    #[arg(short = 's', long = "socket", env = "SYNCER_SOCKET", help = "Path to the device daemon socket")]
    pub(crate) socket: Option<PathBuf>,
    #[arg(short = 'v', long = "verbose", help = "Enable verbose logging")]
    pub(crate) verbose: bool,
    #[command(subcommand)]
    pub(crate) command: Option<HostedCommands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum HostedCommands {
    #[clap(name = "shell", about = "Read commands from stdin and forward them to the device daemon (default)")]
    Shell,
    #[clap(name = "send", about = "Send a raw command line to the device daemon")]
    Send {
        #[arg(required = true, num_args = 1..)]
        command: Vec<String>,
    },
    #[clap(name = "event", about = "Send key=value fields to the device daemon as a JSON object")]
    Event {
        #[arg(required = true, num_args = 1.., value_parser = parse_field)]
        fields: Vec<(String, Value)>,
    },
    #[clap(name = "screen", about = "Turn the screen on or off")]
    Screen { state: ScreenState },
    #[clap(name = "reboot", about = "Reboot the device")]
    Reboot,
    #[clap(name = "restart", about = "Restart the content service")]
    Restart,
    #[clap(name = "verify-cache", about = "Ask the daemon to verify its cache")]
    VerifyCache,
    #[clap(name = "peer", about = "Send a datagram to the peer process")]
    Peer {
        #[arg(short = 'n', long = "node", env = "NODE", help = "Node identity used as address prefix")]
        node: String,
        #[arg(short = 'p', long = "path", help = "Path segments below the node, may be repeated")]
        path: Vec<String>,
        data: String,
    },
    #[clap(name = "watch", about = "Load the node configuration and follow changes until interrupted")]
    Watch {
        #[arg(short = 'd', long = "dir", default_value = ".", help = "Directory holding node.json and config.json")]
        dir: PathBuf,
        #[arg(short = 'r', long = "restart-on-failure", help = "Restart the service when a reload fails")]
        restart_on_failure: bool,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenState {
    On,
    Off,
}

/// Parse `key=value`. The value is taken as JSON when it parses, else as a string.
fn parse_field(field: &str) -> Result<(String, Value), String> {
    let (key, value) = field.split_once('=').ok_or_else(|| format!("expected key=value, got '{field}'"))?;
    if key.trim().is_empty() {
        return Err(format!("empty key in '{field}'"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

impl HostedArguments {
    fn device(&self) -> Device {
        match &self.socket {
            Some(path) => Device::new(path.clone()),
            None => Device::from_env(),
        }
    }

    pub async fn handle_arguments(&self) -> Result<()> {
        let command = self.command.clone().unwrap_or(HostedCommands::Shell);
        match command {
            HostedCommands::Shell => self.shell().await?,
            HostedCommands::Send { command } => self.device().send_raw(&command.join(" ")),
            HostedCommands::Event { fields } => {
                let fields: Map<String, Value> = fields.into_iter().collect();
                self.device().send_upstream(&fields);
            }
            HostedCommands::Screen { state } => self.device().screen(state == ScreenState::On),
            HostedCommands::Reboot => self.device().reboot(),
            HostedCommands::Restart => self.device().restart_service(),
            HostedCommands::VerifyCache => self.device().verify_cache(),
            HostedCommands::Peer { node, path, data } => {
                let node = Node::new(node, std::env::temp_dir())?;
                match path.split_first() {
                    None => node.send(&data)?,
                    Some((first, rest)) => {
                        let sender = rest.iter().fold(node.path(first), |sender, segment| sender.path(segment));
                        sender.send(&data)?;
                    }
                }
            }
            HostedCommands::Watch { dir, restart_on_failure } => self.watch(dir, restart_on_failure).await?,
        }
        Ok(())
    }

    /// Stdin is read on a blocking thread. Ctrl-C keeps its default action
    /// and ends the process.
    async fn shell(&self) -> Result<()> {
        let mut device = self.device();
        tokio::task::spawn_blocking(move || run_shell(io::stdin().lock(), io::stdout(), &mut device)).await??;
        Ok(())
    }

    async fn watch(&self, dir: PathBuf, restart_on_failure: bool) -> Result<()> {
        let mut env = NodeEnvironment::from_env()?.with_node_dir(dir);
        if let Some(socket) = &self.socket {
            env.syncer_socket = socket.clone();
        }
        let policy = if restart_on_failure { UpdatePolicy::Restart } else { UpdatePolicy::KeepLastGood };
        let context = NodeContext::init_with(env, Arc::new(AbortService), policy)?;
        info!("Current config: {}", tree_to_json(&context.config().snapshot()));

        tokio::signal::ctrl_c().await?;
        info!("Interrupted, stopping");
        Ok(())
    }
}

/// Forward every line of `input` to the daemon until EOF, prompting on `output`.
fn run_shell(input: impl BufRead, mut output: impl Write, device: &mut Device) -> io::Result<()> {
    let mut lines = input.lines();
    loop {
        write!(output, "{SHELL_PROMPT}")?;
        output.flush()?;
        match lines.next() {
            Some(Ok(line)) => device.send_raw(&line),
            Some(Err(e)) if e.kind() == io::ErrorKind::InvalidData => error!("Failed to read command: {}", e),
            Some(Err(e)) => return Err(e),
            None => break,
        }
    }
    writeln!(output)
}
