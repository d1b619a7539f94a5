// src/process/docker.rs

//! Docker CLI command builders, one per runtime operation.

use std::time::Duration;

use crate::fleet::Node;
use crate::remote::RemoteCommand;

fn docker() -> RemoteCommand {
    RemoteCommand::new("docker")
}

pub fn inspect_running(name: &str) -> RemoteCommand {
    docker().args([
        "inspect",
        "--type",
        "container",
        "--format",
        "{{.State.Running}}",
        name,
    ])
}

pub fn stop(name: &str, timeout: Duration) -> RemoteCommand {
    docker()
        .args(["stop", "-t"])
        .arg(timeout.as_secs().to_string())
        .arg(name)
}

pub fn kill(name: &str) -> RemoteCommand {
    docker().args(["kill", "--signal", "KILL", name])
}

pub fn remove(name: &str) -> RemoteCommand {
    docker().args(["rm", name])
}

pub fn force_remove(name: &str) -> RemoteCommand {
    docker().args(["rm", "-f", name])
}

pub fn logs(name: &str) -> RemoteCommand {
    docker().args(["logs", "--timestamps", name])
}

pub fn load_image(archive: &str) -> RemoteCommand {
    docker().args(["load", "-i", archive])
}

pub fn inspect_image(image: &str) -> RemoteCommand {
    docker().args(["image", "inspect", "--format", "{{.Id}}", image])
}

pub fn remove_image(image: &str) -> RemoteCommand {
    docker().args(["rmi", "-f", image])
}

/// `docker run -d` for the node's managed container with its isolation
/// options and the runtime config file mounted read-only.
pub fn run(node: &Node, name: &str, config_file: &str) -> RemoteCommand {
    let opts = &node.run;
    let mut cmd = docker().args(["run", "-d", "--name", name]);

    if let Some(ref cpus) = opts.cpuset_cpus {
        cmd = cmd.arg("--cpuset-cpus").arg(cpus);
    }
    if let Some(ref mems) = opts.cpuset_mems {
        cmd = cmd.arg("--cpuset-mems").arg(mems);
    }
    if let Some(ref gpus) = opts.gpus {
        cmd = cmd.arg("--gpus").arg(gpus);
    }
    for device in &opts.devices {
        cmd = cmd.arg("--device").arg(device);
    }
    if let Some(ref network) = opts.network {
        cmd = cmd.arg("--network").arg(network);
    }
    for env in &opts.env {
        cmd = cmd.arg("-e").arg(env);
    }
    for mount in &opts.mounts {
        cmd = cmd.arg("-v").arg(mount);
    }
    cmd = cmd
        .arg("-v")
        .arg(format!("{}:{}:ro", config_file, opts.config_mount));

    cmd.args(opts.extra_args.iter().cloned()).arg(&node.image)
}

pub fn make_dir(path: &str) -> RemoteCommand {
    RemoteCommand::new("mkdir").args(["-p", "--", path])
}

pub fn read_file(path: &str) -> RemoteCommand {
    RemoteCommand::new("cat").args(["--", path])
}

pub fn write_file(path: &str, contents: &str) -> RemoteCommand {
    RemoteCommand::new("tee")
        .args(["--", path])
        .stdin(contents.as_bytes().to_vec())
}
