use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use tokio::time::Instant;

use fleetctl::fleet::{Node, NodeRegistry};
use fleetctl::remote::{BoxFuture, CommandOutput, RemoteBackend, RemoteCommand, TransportError};

/// Simulated state of one node: a tiny Docker plus a filesystem.
#[derive(Debug, Clone, Default)]
pub struct FakeNode {
    /// Container name -> running.
    pub containers: BTreeMap<String, bool>,
    pub images: BTreeSet<String>,
    /// Remote path -> contents.
    pub files: BTreeMap<String, String>,
    /// Container name -> accumulated output.
    pub logs: BTreeMap<String, String>,

    /// Every call fails at the transport level.
    pub unreachable: bool,
    /// The next N calls fail at the transport level.
    pub transport_failures: u32,
    /// The next N `docker stop` calls report a zombie and leave the
    /// container running.
    pub zombie_stops: u32,
    /// The next N `docker rm -f` calls report success but leave the
    /// container in place; `docker kill` is ignored meanwhile.
    pub stubborn_kills: u32,
    /// `docker run` fails.
    pub start_fails: bool,
    /// Calls that never reached the node.
    pub transport_attempts: u32,
}

/// One command that reached a node.
#[derive(Debug, Clone)]
pub struct JournalEntry {
    pub node: String,
    pub argv: Vec<String>,
    pub at: Instant,
}

impl JournalEntry {
    pub fn line(&self) -> String {
        self.argv.join(" ")
    }

    pub fn starts_with(&self, prefix: &[&str]) -> bool {
        self.argv.len() >= prefix.len() && self.argv.iter().zip(prefix).all(|(a, p)| a == p)
    }
}

/// In-memory fleet that interprets the commands the orchestrator issues.
///
/// Clones share state, so a test keeps one handle and gives another to the
/// orchestrator.
#[derive(Debug, Clone, Default)]
pub struct FakeFleet {
    nodes: Arc<Mutex<BTreeMap<String, FakeNode>>>,
    journal: Arc<Mutex<Vec<JournalEntry>>>,
}

/// Successful commands print on stdout; failures, like Docker's, on stderr.
fn out(code: i32, text: impl Into<String>) -> CommandOutput {
    if code == 0 {
        CommandOutput::new(code, text, "")
    } else {
        CommandOutput::new(code, "", text)
    }
}

fn no_such_container(name: &str) -> CommandOutput {
    out(1, format!("Error response from daemon: No such container: {name}\n"))
}

impl FakeFleet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every node of `registry` reachable, its image loaded and its runtime
    /// config file present but empty of the tunable.
    pub fn provisioned(registry: &NodeRegistry) -> Self {
        let fleet = Self::new();
        for node in registry.all() {
            fleet.with_node(&node.id, |n| {
                n.images.insert(node.image.clone());
                n.files
                    .insert(node.runtime_config.clone(), "# runtime configuration\n".to_string());
            });
        }
        fleet
    }

    /// Mutate the simulated node `id`, creating it if needed.
    pub fn with_node<R>(&self, id: &str, f: impl FnOnce(&mut FakeNode) -> R) -> R {
        let mut nodes = self.nodes.lock().unwrap();
        f(nodes.entry(id.to_string()).or_default())
    }

    pub fn snapshot(&self, id: &str) -> FakeNode {
        self.with_node(id, |n| n.clone())
    }

    pub fn set_running(&self, id: &str, name: &str) {
        self.with_node(id, |n| {
            n.containers.insert(name.to_string(), true);
            n.logs
                .entry(name.to_string())
                .or_insert_with(|| format!("{name}: processing chunk\n"));
        });
    }

    pub fn set_stopped(&self, id: &str, name: &str) {
        self.with_node(id, |n| {
            n.containers.insert(name.to_string(), false);
        });
    }

    /// Every node's managed container running.
    pub fn run_all(&self, registry: &NodeRegistry) {
        for node in registry.all() {
            self.set_running(&node.id, &node.process_name);
        }
    }

    pub fn set_unreachable(&self, id: &str, unreachable: bool) {
        self.with_node(id, |n| n.unreachable = unreachable);
    }

    pub fn put_file(&self, id: &str, path: &str, contents: &str) {
        self.with_node(id, |n| {
            n.files.insert(path.to_string(), contents.to_string());
        });
    }

    pub fn file(&self, id: &str, path: &str) -> Option<String> {
        self.with_node(id, |n| n.files.get(path).cloned())
    }

    /// `None` when absent, otherwise whether it runs.
    pub fn container(&self, id: &str, name: &str) -> Option<bool> {
        self.with_node(id, |n| n.containers.get(name).copied())
    }

    pub fn has_image(&self, id: &str, image: &str) -> bool {
        self.with_node(id, |n| n.images.contains(image))
    }

    pub fn journal(&self) -> Vec<JournalEntry> {
        self.journal.lock().unwrap().clone()
    }

    /// Commands that reached `id`, as space-joined lines.
    pub fn commands_for(&self, id: &str) -> Vec<String> {
        self.journal()
            .into_iter()
            .filter(|e| e.node == id)
            .map(|e| e.line())
            .collect()
    }

    /// Number of commands on `id` whose argv starts with `prefix`.
    pub fn count(&self, id: &str, prefix: &[&str]) -> usize {
        self.journal()
            .iter()
            .filter(|e| e.node == id && e.starts_with(prefix))
            .count()
    }

    /// Whether any node received a command starting with `prefix`.
    pub fn any(&self, prefix: &[&str]) -> bool {
        self.journal().iter().any(|e| e.starts_with(prefix))
    }

    fn reach(&self, node: &Node) -> Result<(), TransportError> {
        self.with_node(&node.id, |n| {
            if n.unreachable {
                n.transport_attempts += 1;
                return Err(TransportError::new(format!(
                    "ssh: connect to host {} port {}: Connection refused",
                    node.host, node.port
                )));
            }
            if n.transport_failures > 0 {
                n.transport_failures -= 1;
                n.transport_attempts += 1;
                return Err(TransportError::new(format!(
                    "ssh: connect to host {} port {}: Connection timed out",
                    node.host, node.port
                )));
            }
            Ok(())
        })
    }

    fn record(&self, node: &Node, argv: Vec<String>) {
        self.journal.lock().unwrap().push(JournalEntry {
            node: node.id.clone(),
            argv,
            at: Instant::now(),
        });
    }

    fn interpret(&self, node: &Node, command: &RemoteCommand) -> CommandOutput {
        let argv: Vec<String> = command.argv().into_iter().map(str::to_string).collect();
        self.record(node, argv.clone());
        let args: Vec<&str> = argv.iter().map(String::as_str).collect();
        let stdin = command
            .stdin_bytes()
            .map(|b| String::from_utf8_lossy(b).into_owned());

        self.with_node(&node.id, |n| match args.as_slice() {
            ["docker", "inspect", "--type", "container", "--format", _, name] => {
                match n.containers.get(*name) {
                    Some(running) => out(0, format!("{running}\n")),
                    None => out(1, format!("Error: No such object: {name}\n")),
                }
            }
            ["docker", "stop", "-t", _, name] => match n.containers.get(*name).copied() {
                None => no_such_container(name),
                Some(true) if n.zombie_stops > 0 => {
                    n.zombie_stops -= 1;
                    out(
                        1,
                        format!(
                            "Error response from daemon: cannot stop container: {name}: tried to kill container, but did not receive an exit event\n"
                        ),
                    )
                }
                Some(_) => {
                    n.containers.insert(name.to_string(), false);
                    out(0, format!("{name}\n"))
                }
            },
            ["docker", "kill", "--signal", "KILL", name] => match n.containers.get(*name).copied() {
                None => no_such_container(name),
                Some(false) => out(
                    1,
                    format!("Error response from daemon: Cannot kill container: {name}: container is not running\n"),
                ),
                Some(true) => {
                    if n.stubborn_kills == 0 {
                        n.containers.insert(name.to_string(), false);
                    }
                    out(0, format!("{name}\n"))
                }
            },
            ["docker", "rm", "-f", name] => {
                if !n.containers.contains_key(*name) {
                    return no_such_container(name);
                }
                if n.stubborn_kills > 0 {
                    n.stubborn_kills -= 1;
                } else {
                    n.containers.remove(*name);
                }
                out(0, format!("{name}\n"))
            }
            ["docker", "rm", name] => match n.containers.get(*name).copied() {
                None => no_such_container(name),
                Some(true) => out(
                    1,
                    format!(
                        "Error response from daemon: You cannot remove a running container {name}. Stop the container before attempting removal or force remove\n"
                    ),
                ),
                Some(false) => {
                    n.containers.remove(*name);
                    out(0, format!("{name}\n"))
                }
            },
            ["docker", "logs", "--timestamps", name] => {
                if n.containers.contains_key(*name) {
                    out(0, n.logs.get(*name).cloned().unwrap_or_default())
                } else {
                    no_such_container(name)
                }
            }
            ["docker", "load", "-i", archive] => {
                if n.files.contains_key(*archive) {
                    n.images.insert(node.image.clone());
                    out(0, format!("Loaded image: {}\n", node.image))
                } else {
                    out(1, format!("open {archive}: no such file or directory\n"))
                }
            }
            ["docker", "image", "inspect", "--format", _, image] => {
                if n.images.contains(*image) {
                    out(0, "sha256:0123456789abcdef\n")
                } else {
                    out(1, format!("Error response from daemon: No such image: {image}\n"))
                }
            }
            ["docker", "rmi", "-f", image] => {
                if n.images.remove(*image) {
                    out(0, format!("Untagged: {image}\n"))
                } else {
                    out(1, format!("Error response from daemon: No such image: {image}\n"))
                }
            }
            ["docker", "run", "-d", "--name", name, .., image] => {
                if n.start_fails {
                    out(125, "docker: Error response from daemon: failed to create task for container\n")
                } else if n.containers.contains_key(*name) {
                    out(
                        125,
                        format!("docker: Error response from daemon: Conflict. The container name \"/{name}\" is already in use\n"),
                    )
                } else if !n.images.contains(*image) {
                    out(125, format!("Unable to find image '{image}' locally\n"))
                } else {
                    n.containers.insert(name.to_string(), true);
                    n.logs
                        .insert(name.to_string(), format!("{name}: started from {image}\n"));
                    out(0, "4f3c2b1a0e9d\n")
                }
            }
            ["mkdir", "-p", "--", _] => out(0, ""),
            ["cat", "--", path] => match n.files.get(*path) {
                Some(contents) => out(0, contents.clone()),
                None => out(1, format!("cat: {path}: No such file or directory\n")),
            },
            ["tee", "--", path] => {
                let contents = stdin.clone().unwrap_or_default();
                n.files.insert(path.to_string(), contents.clone());
                out(0, contents)
            }
            other => out(127, format!("bash: {}: command not found\n", other.join(" "))),
        })
    }
}

impl RemoteBackend for FakeFleet {
    fn execute<'a>(
        &'a self,
        node: &'a Node,
        command: &'a RemoteCommand,
    ) -> BoxFuture<'a, Result<CommandOutput, TransportError>> {
        Box::pin(async move {
            self.reach(node)?;
            Ok(self.interpret(node, command))
        })
    }

    fn copy<'a>(
        &'a self,
        local: &'a Path,
        node: &'a Node,
        remote_path: &'a str,
    ) -> BoxFuture<'a, Result<CommandOutput, TransportError>> {
        Box::pin(async move {
            self.reach(node)?;
            self.record(
                node,
                vec![
                    "scp".to_string(),
                    local.display().to_string(),
                    remote_path.to_string(),
                ],
            );
            self.with_node(&node.id, |n| {
                n.files
                    .insert(remote_path.to_string(), format!("archive of {}", local.display()));
            });
            Ok(out(0, ""))
        })
    }
}
