//! SSH implementation of the remote execution traits
//!
//! libssh2 is blocking, so every call is moved onto tokio's blocking pool.
//! The session handle is reference counted and cheap to clone into those
//! closures.

use async_trait::async_trait;
use ssh2::{CheckResult, KnownHostFileKind, Session, Sftp};
use std::io::{ErrorKind, Read};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::command::{CommandOutput, RemoteExecutionGateway, RemoteSession};
use crate::config::{ConverterConfig, ServerProfile};
use crate::error::ConversionError;
use crate::retry::RetryPolicy;
use crate::secrets::{resolve_credential, SecretResolver};

pub struct SshRemoteGateway {
    config: Arc<ConverterConfig>,
    secrets: Arc<dyn SecretResolver>,
    retry: RetryPolicy,
}

impl SshRemoteGateway {
    pub fn new(config: Arc<ConverterConfig>, secrets: Arc<dyn SecretResolver>) -> Self {
        let retry = RetryPolicy::from_settings(&config.retry);
        Self {
            config,
            secrets,
            retry,
        }
    }

    async fn connect_once(&self, profile_name: &str) -> Result<SshSession, ConversionError> {
        info!("Trying to establish connection with {} server...", profile_name);
        let profile = self.config.server_profile(profile_name)?.clone();

        let credentials = &self.config.credentials;
        let username = resolve_credential(
            self.secrets.as_ref(),
            "server_username",
            credentials.server_username.as_deref(),
        )
        .await
        .map_err(|e| ConversionError::from_secret(profile_name, e))?;
        let password = resolve_credential(
            self.secrets.as_ref(),
            "server_password",
            credentials.server_password.as_deref(),
        )
        .await
        .map_err(|e| ConversionError::from_secret(profile_name, e))?;

        let known_hosts = self.config.known_hosts_file();
        let session = tokio::task::spawn_blocking(move || {
            open_session(&profile, &username, &password, known_hosts.as_deref())
        })
        .await
        .map_err(|e| ConversionError::connection(profile_name, e))?
        .map_err(|e| {
            warn!("Connection not established with {} server", profile_name);
            ConversionError::connection(profile_name, e)
        })?;

        info!("Connection established with {} server", profile_name);
        Ok(SshSession {
            profile: profile_name.to_string(),
            session,
            sftp: None,
        })
    }
}

#[async_trait]
impl RemoteExecutionGateway for SshRemoteGateway {
    async fn connect(&self, profile_name: &str) -> Result<Box<dyn RemoteSession>, ConversionError> {
        let session = self
            .retry
            .execute_when("Server connection", ConversionError::is_retryable, || {
                self.connect_once(profile_name)
            })
            .await?;
        Ok(Box::new(session))
    }
}

fn open_session(
    profile: &ServerProfile,
    username: &str,
    password: &str,
    known_hosts: Option<&Path>,
) -> Result<Session, String> {
    let tcp = TcpStream::connect((profile.host.as_str(), profile.port)).map_err(|e| e.to_string())?;
    let mut session = Session::new().map_err(|e| e.to_string())?;
    session.set_tcp_stream(tcp);
    session.handshake().map_err(|e| e.to_string())?;

    verify_host_key(&session, &profile.host, profile.port, known_hosts)?;

    session
        .userauth_password(username, password)
        .map_err(|e| e.to_string())?;
    if !session.authenticated() {
        return Err("authentication rejected".to_string());
    }
    Ok(session)
}

/// Trust on first use: unknown hosts are accepted for this session only, a changed key is refused.
/// The known hosts file is read, never written.
fn verify_host_key(
    session: &Session,
    host: &str,
    port: u16,
    known_hosts_path: Option<&Path>,
) -> Result<(), String> {
    let mut known_hosts = session.known_hosts().map_err(|e| e.to_string())?;
    if let Some(path) = known_hosts_path.filter(|path| path.exists()) {
        known_hosts
            .read_file(path, KnownHostFileKind::OpenSSH)
            .map_err(|e| format!("reading {}: {}", path.display(), e))?;
    }

    let (key, key_type) = session
        .host_key()
        .ok_or_else(|| "server presented no host key".to_string())?;

    match host_key_decision(known_hosts.check_port(host, port, key), host)? {
        HostKeyDecision::Trusted => Ok(()),
        HostKeyDecision::AcceptForSession => {
            warn!("Host key for {} is not known, accepting it", host);
            known_hosts
                .add(&known_hosts_entry(host, port), key, "added by ca-to-us", key_type.into())
                .map_err(|e| e.to_string())
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum HostKeyDecision {
    Trusted,
    AcceptForSession,
}

fn host_key_decision(check: CheckResult, host: &str) -> Result<HostKeyDecision, String> {
    match check {
        CheckResult::Match => Ok(HostKeyDecision::Trusted),
        CheckResult::NotFound => Ok(HostKeyDecision::AcceptForSession),
        CheckResult::Mismatch => Err(format!("host key for {host} does not match known hosts")),
        CheckResult::Failure => Err(format!("host key check for {host} failed")),
    }
}

fn known_hosts_entry(host: &str, port: u16) -> String {
    if port == 22 {
        host.to_string()
    } else {
        format!("[{host}]:{port}")
    }
}

struct SshSession {
    profile: String,
    session: Session,
    sftp: Option<Sftp>,
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn upload_file(&mut self, local_path: &Path, remote_path: &str) -> Result<(), ConversionError> {
        info!("Uploading {} to {} on server", local_path.display(), remote_path);
        let session = self.session.clone();
        let sftp = self.sftp.take();
        let local: PathBuf = local_path.to_path_buf();
        let remote = remote_path.to_string();

        let (sftp, result) = tokio::task::spawn_blocking(move || {
            let sftp = match sftp {
                Some(sftp) => sftp,
                None => match session.sftp() {
                    Ok(sftp) => sftp,
                    Err(e) => return (None, Err(e.to_string())),
                },
            };
            let result = copy_to_remote(&sftp, &local, &remote);
            (Some(sftp), result)
        })
        .await
        .map_err(ConversionError::unexpected)?;

        self.sftp = sftp;
        result.map_err(|message| {
            warn!("Problem while uploading file to the server: {}", message);
            ConversionError::Transfer {
                local: local_path.display().to_string(),
                message,
            }
        })?;
        info!("File uploaded to server");
        Ok(())
    }

    async fn execute_command(&mut self, command: &str) -> Result<CommandOutput, ConversionError> {
        info!("Executing remote command on {}", self.profile);
        let session = self.session.clone();
        let command = command.to_string();

        tokio::task::spawn_blocking(move || run_command(&session, &command))
            .await
            .map_err(ConversionError::unexpected)?
            .map_err(|message| ConversionError::Execution { message })
    }

    async fn close(self: Box<Self>) {
        info!("Closing client connection...");
        let SshSession {
            profile,
            session,
            sftp,
        } = *self;

        let closed = tokio::task::spawn_blocking(move || {
            drop(sftp);
            session.disconnect(None, "conversion finished", None)
        })
        .await;

        match closed {
            Ok(Ok(())) => info!("Client connection to {} closed", profile),
            Ok(Err(e)) => warn!("Error closing connection to {}: {}", profile, e),
            Err(e) => warn!("Error closing connection to {}: {}", profile, e),
        }
    }
}

fn copy_to_remote(sftp: &Sftp, local: &Path, remote: &str) -> Result<(), String> {
    let mut source = std::fs::File::open(local).map_err(|e| e.to_string())?;
    let mut target = sftp.create(Path::new(remote)).map_err(|e| e.to_string())?;
    std::io::copy(&mut source, &mut target).map_err(|e| e.to_string())?;
    Ok(())
}

fn run_command(session: &Session, command: &str) -> Result<CommandOutput, String> {
    let mut channel = session.channel_session().map_err(|e| e.to_string())?;
    channel.exec(command).map_err(|e| e.to_string())?;

    // Both streams are drained together so a full stderr window cannot stall stdout.
    session.set_blocking(false);
    let drained = {
        let mut stdout_stream = channel.stream(0);
        let mut stderr_stream = channel.stderr();
        read_interleaved(&mut stdout_stream, &mut stderr_stream, || channel.eof())
    };
    session.set_blocking(true);
    let (stdout, stderr) = drained.map_err(|e| e.to_string())?;

    channel.wait_close().map_err(|e| e.to_string())?;
    let exit_status = channel.exit_status().ok();
    Ok(CommandOutput::from_streams(
        exit_status,
        &String::from_utf8_lossy(&stdout),
        &String::from_utf8_lossy(&stderr),
    ))
}

/// Read two non-blocking streams alternately until both are exhausted and
/// `finished` confirms the end of input.
fn read_interleaved<O: Read, E: Read>(
    stdout: &mut O,
    stderr: &mut E,
    mut finished: impl FnMut() -> bool,
) -> std::io::Result<(Vec<u8>, Vec<u8>)> {
    let mut out = Vec::new();
    let mut err = Vec::new();
    let mut buffer = [0u8; 8192];

    loop {
        let from_stdout = read_available(stdout, &mut buffer, &mut out)?;
        let from_stderr = read_available(stderr, &mut buffer, &mut err)?;

        if from_stdout == StreamPoll::Exhausted && from_stderr == StreamPoll::Exhausted && finished() {
            return Ok((out, err));
        }
        if from_stdout != StreamPoll::Data && from_stderr != StreamPoll::Data {
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, PartialEq, Eq)]
enum StreamPoll {
    Data,
    Pending,
    Exhausted,
}

fn read_available<R: Read>(
    reader: &mut R,
    buffer: &mut [u8],
    sink: &mut Vec<u8>,
) -> std::io::Result<StreamPoll> {
    match reader.read(buffer) {
        Ok(0) => Ok(StreamPoll::Exhausted),
        Ok(n) => {
            sink.extend_from_slice(&buffer[..n]);
            Ok(StreamPoll::Data)
        }
        Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => {
            Ok(StreamPoll::Pending)
        }
        Err(e) => Err(e),
    }
}
