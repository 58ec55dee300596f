use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use uuid::Uuid;

use super::{CommandOutput, Connector, RemoteSession, StreamKind};
use crate::config::ServerConfig;
use crate::defaults;
use crate::error::{Error, Result, TargetDetails};
use crate::utils::shell;

/// Opens OpenSSH master connections.
///
/// The master owns the one authenticated connection; `ssh` and `sftp`
/// invocations made by the session attach to it through a control socket.
#[derive(Debug, Clone)]
pub struct OpenSshConnector {
    pub ssh_program: String,
    pub sftp_program: String,
}

impl Default for OpenSshConnector {
    fn default() -> Self {
        Self {
            ssh_program: "ssh".to_string(),
            sftp_program: "sftp".to_string(),
        }
    }
}

pub struct OpenSshSession {
    ssh_program: String,
    sftp_program: String,
    destination: String,
    port: u16,
    control_path: PathBuf,
    master: Option<Child>,
}

impl Connector for OpenSshConnector {
    type Session = OpenSshSession;

    fn connect(&self, server: &ServerConfig) -> Result<OpenSshSession> {
        if let Some(key) = server.private_key.as_deref().filter(|k| !k.is_empty()) {
            if !Path::new(key).exists() {
                return Err(Error::ssh_identity_file_not_found(&server.host, key));
            }
        }

        let control_path = control_socket_path();
        let target = target_details(server);

        let (program, args) = master_command(&self.ssh_program, server, &control_path);
        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        if let Some(password) = &server.password {
            cmd.env("SSHPASS", password);
        }

        log_status!("ssh", "Connecting to {}@{}:{}", server.username, server.host, server.port);

        let mut master = cmd.spawn().map_err(|e| {
            let err = Error::ssh_connect_failed(target.clone(), -1, format!("{}: {}", program, e));
            if server.password.is_some() {
                err.with_hint("Password authentication requires sshpass on PATH; use server.privateKey instead")
            } else {
                err
            }
        })?;

        let mut session = OpenSshSession {
            ssh_program: self.ssh_program.clone(),
            sftp_program: self.sftp_program.clone(),
            destination: destination(server),
            port: server.port,
            control_path,
            master: None,
        };

        // The control socket appears once authentication has completed.
        loop {
            match master.try_wait() {
                Ok(Some(status)) => {
                    let mut stderr = String::new();
                    if let Some(mut pipe) = master.stderr.take() {
                        let _ = pipe.read_to_string(&mut stderr);
                    }
                    let _ = std::fs::remove_file(&session.control_path);
                    return Err(connect_failure(
                        target,
                        status.code().unwrap_or(-1),
                        stderr,
                        server.password.is_some(),
                    ));
                }
                Ok(None) => {}
                Err(e) => {
                    let _ = master.kill();
                    let _ = master.wait();
                    return Err(Error::ssh_connect_failed(target, -1, e.to_string()));
                }
            }

            if session.control_path.exists() && session.master_alive() {
                break;
            }
            thread::sleep(Duration::from_millis(100));
        }

        if let Some(pipe) = master.stderr.take() {
            drain(pipe);
        }
        session.master = Some(master);
        log_status!("ssh", "Connected to {}", server.host);
        Ok(session)
    }
}

impl OpenSshSession {
    /// Fails when the master process is gone, so nothing is sent without it.
    fn ensure_master(&mut self) -> std::result::Result<(), String> {
        let Some(master) = self.master.as_mut() else {
            return Err("session is closed".to_string());
        };
        match master.try_wait() {
            Ok(None) => Ok(()),
            Ok(Some(status)) => {
                self.master = None;
                let _ = std::fs::remove_file(&self.control_path);
                Err(format!(
                    "master connection exited with code {}",
                    status.code().unwrap_or(-1)
                ))
            }
            Err(e) => Err(e.to_string()),
        }
    }

    fn master_alive(&self) -> bool {
        Command::new(&self.ssh_program)
            .args(control_args(&self.control_path))
            .args(["-O", "check", self.destination.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

impl RemoteSession for OpenSshSession {
    fn upload(&mut self, local_path: &Path, remote_path: &str) -> Result<()> {
        let local = local_path.to_string_lossy().to_string();
        log_status!("deploy", "Uploading {} -> {}:{}", local, self.destination, remote_path);

        self.ensure_master()
            .map_err(|e| Error::upload_failed(&local, remote_path, e))?;

        let mut child = Command::new(&self.sftp_program)
            .args(sftp_args(&self.control_path, self.port, &self.destination))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::upload_failed(&local, remote_path, e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(sftp_batch(&local, remote_path).as_bytes())
                .map_err(|e| Error::upload_failed(&local, remote_path, e.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| Error::upload_failed(&local, remote_path, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let detail = if stderr.is_empty() {
                format!("sftp exited with code {}", output.status.code().unwrap_or(-1))
            } else {
                stderr
            };
            return Err(Error::upload_failed(&local, remote_path, detail));
        }

        Ok(())
    }

    fn exec(
        &mut self,
        command: &str,
        sink: &mut dyn FnMut(StreamKind, &str),
    ) -> Result<CommandOutput> {
        self.ensure_master()
            .map_err(|e| Error::remote_command_dispatch_failed(command, e))?;

        let mut child = Command::new(&self.ssh_program)
            .args(exec_args(&self.control_path, &self.destination, command))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::remote_command_dispatch_failed(command, e.to_string()))?;

        let (tx, rx) = mpsc::channel::<(StreamKind, String)>();
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_line_reader(stdout, StreamKind::Stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_line_reader(stderr, StreamKind::Stderr, tx.clone()));
        }
        drop(tx);

        let mut output = CommandOutput::default();
        for (stream, line) in rx {
            sink(stream, &line);
            let buffer = match stream {
                StreamKind::Stdout => &mut output.stdout,
                StreamKind::Stderr => &mut output.stderr,
            };
            buffer.push_str(&line);
            buffer.push('\n');
        }
        for reader in readers {
            let _ = reader.join();
        }

        let status = child
            .wait()
            .map_err(|e| Error::remote_command_dispatch_failed(command, e.to_string()))?;
        output.exit_code = status.code().unwrap_or(-1);

        // 255 is also what ssh returns for its own failures.
        if output.exit_code == 255 && !self.master_alive() {
            let detail = if output.stderr.trim().is_empty() {
                "connection to master lost".to_string()
            } else {
                output.stderr.trim().to_string()
            };
            return Err(Error::remote_command_dispatch_failed(command, detail));
        }

        Ok(output)
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut master) = self.master.take() else {
            return Ok(());
        };

        let exit_requested = Command::new(&self.ssh_program)
            .args(control_args(&self.control_path))
            .args(["-O", "exit", self.destination.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false);

        if !exit_requested {
            let _ = master.kill();
        }
        let result = master
            .wait()
            .map(|_| ())
            .map_err(|e| Error::internal_io(e.to_string(), Some("stop ssh master".to_string())));

        if self.control_path.exists() {
            let _ = std::fs::remove_file(&self.control_path);
        }

        log_status!("ssh", "Closed connection to {}", self.destination);
        result
    }
}

impl Drop for OpenSshSession {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn spawn_line_reader<R: Read + Send + 'static>(
    pipe: R,
    stream: StreamKind,
    tx: mpsc::Sender<(StreamKind, String)>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let reader = BufReader::new(pipe);
        for line in reader.split(b'\n') {
            match line {
                Ok(bytes) => {
                    let text = String::from_utf8_lossy(&bytes).trim_end_matches('\r').to_string();
                    if tx.send((stream, text)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    })
}

/// Keep reading the master's stderr so it never blocks on a full pipe.
fn drain<R: Read + Send + 'static>(mut pipe: R) {
    thread::spawn(move || {
        let _ = std::io::copy(&mut pipe, &mut std::io::sink());
    });
}

fn destination(server: &ServerConfig) -> String {
    format!("{}@{}", server.username, server.host)
}

fn target_details(server: &ServerConfig) -> TargetDetails {
    TargetDetails {
        host: server.host.clone(),
        port: server.port,
        username: server.username.clone(),
    }
}

fn control_socket_path() -> PathBuf {
    // Unix socket paths are short (~104 bytes on macOS).
    let id = Uuid::new_v4().simple().to_string();
    std::env::temp_dir().join(format!("apex-deploy-{}.sock", &id[..12]))
}

fn control_args(control_path: &Path) -> Vec<String> {
    vec![
        "-o".to_string(),
        format!("ControlPath={}", control_path.display()),
    ]
}

/// Options for clients that must ride on the master. Multiplexed clients never
/// run `ProxyCommand`, so `false` only fires if ssh tries a direct connection.
fn client_args(control_path: &Path) -> Vec<String> {
    let mut args = control_args(control_path);
    args.extend([
        "-o".to_string(),
        "ControlMaster=no".to_string(),
        "-o".to_string(),
        "ProxyCommand=false".to_string(),
    ]);
    args
}

/// Program and arguments that start the master connection in the foreground.
fn master_command(ssh_program: &str, server: &ServerConfig, control_path: &Path) -> (String, Vec<String>) {
    let mut args = Vec::new();

    if let Some(key) = server.private_key.as_deref().filter(|k| !k.is_empty()) {
        args.extend([
            "-i".to_string(),
            key.to_string(),
            "-o".to_string(),
            "IdentitiesOnly=yes".to_string(),
        ]);
    }

    if server.port != defaults::default_ssh_port() {
        args.push("-p".to_string());
        args.push(server.port.to_string());
    }

    if server.password.is_some() {
        args.extend(["-o".to_string(), "NumberOfPasswordPrompts=1".to_string()]);
    } else {
        args.extend(["-o".to_string(), "BatchMode=yes".to_string()]);
    }

    if let Some(timeout) = server.connect_timeout {
        args.extend(["-o".to_string(), format!("ConnectTimeout={}", timeout)]);
    }

    args.extend([
        "-o".to_string(),
        "StrictHostKeyChecking=accept-new".to_string(),
        "-o".to_string(),
        "ControlMaster=yes".to_string(),
    ]);
    args.extend(control_args(control_path));
    args.push("-N".to_string());
    args.push(destination(server));

    if server.password.is_some() {
        let mut wrapped = vec!["-e".to_string(), ssh_program.to_string()];
        wrapped.extend(args);
        ("sshpass".to_string(), wrapped)
    } else {
        (ssh_program.to_string(), args)
    }
}

fn exec_args(control_path: &Path, destination: &str, command: &str) -> Vec<String> {
    let mut args = client_args(control_path);
    args.extend([
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        "-T".to_string(),
        destination.to_string(),
        "--".to_string(),
        command.to_string(),
    ]);
    args
}

fn sftp_args(control_path: &Path, port: u16, destination: &str) -> Vec<String> {
    let mut args = vec!["-b".to_string(), "-".to_string()];
    args.extend(client_args(control_path));
    if port != defaults::default_ssh_port() {
        args.push("-P".to_string());
        args.push(port.to_string());
    }
    args.push(destination.to_string());
    args
}

/// Every directory above `remote_path`, outermost first.
fn remote_ancestors(remote_path: &str) -> Vec<&str> {
    remote_path
        .match_indices('/')
        .map(|(i, _)| &remote_path[..i])
        .filter(|dir| !dir.is_empty())
        .collect()
}

/// `-mkdir` lines ignore errors, so existing directories are fine.
fn sftp_batch(local_path: &str, remote_path: &str) -> String {
    let mut batch = String::new();
    for dir in remote_ancestors(remote_path) {
        batch.push_str(&format!("-mkdir {}\n", shell::quote_sftp_path(dir)));
    }
    batch.push_str(&format!(
        "put {} {}\n",
        shell::quote_sftp_path(local_path),
        shell::quote_sftp_path(remote_path)
    ));
    batch
}

/// sshpass exits with 5 when the password was rejected.
const SSHPASS_BAD_PASSWORD: i32 = 5;

fn connect_failure(target: TargetDetails, exit_code: i32, stderr: String, via_sshpass: bool) -> Error {
    let stderr = stderr.trim().to_string();
    let lowered = stderr.to_lowercase();
    if lowered.contains("permission denied")
        || lowered.contains("authentication failed")
        || (via_sshpass && exit_code == SSHPASS_BAD_PASSWORD)
    {
        Error::ssh_auth_failed(target, exit_code, stderr)
    } else {
        Error::ssh_connect_failed(target, exit_code, stderr)
    }
}
