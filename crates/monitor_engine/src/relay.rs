use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use monitor_logging::{monitor_debug, monitor_info, monitor_warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

use crate::RelayError;

/// Upload sink for downloaded files.
#[async_trait::async_trait]
pub trait Relay: Send + Sync {
    async fn upload(&self, local_path: &Path, remote_folder: &str) -> Result<(), RelayError>;
}

#[derive(Debug, Clone)]
pub struct FtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
}

impl FtpSettings {
    pub fn new(host: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 21,
            username: username.into(),
            password: password.into(),
            connect_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(60),
        }
    }
}

/// Passive-mode FTP uploader. One control connection per upload.
#[derive(Debug, Clone)]
pub struct FtpRelay {
    settings: FtpSettings,
}

impl FtpRelay {
    pub fn new(settings: FtpSettings) -> Self {
        Self { settings }
    }
}

#[async_trait::async_trait]
impl Relay for FtpRelay {
    async fn upload(&self, local_path: &Path, remote_folder: &str) -> Result<(), RelayError> {
        let file_name = local_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| RelayError::MalformedReply("local path has no file name".into()))?;
        let content = tokio::fs::read(local_path).await?;

        let mut session = ControlSession::connect(&self.settings).await?;
        session.login(&self.settings.username, &self.settings.password).await?;
        session.command("TYPE I", &[200]).await?;
        session.change_folder(remote_folder).await;

        let data_addr = session.passive().await?;
        let mut data = timeout(self.settings.connect_timeout, TcpStream::connect(data_addr))
            .await
            .map_err(|_| RelayError::Timeout(self.settings.connect_timeout))??;

        session.command(&format!("STOR {file_name}"), &[125, 150]).await?;
        timeout(self.settings.command_timeout, async {
            data.write_all(&content).await?;
            data.shutdown().await
        })
        .await
        .map_err(|_| RelayError::Timeout(self.settings.command_timeout))??;
        drop(data);

        session.expect_reply("STOR", &[226, 250]).await?;
        monitor_info!(
            "[FTP] Uploaded {file_name} ({} bytes) to {}:{}",
            content.len(),
            self.settings.host,
            self.settings.port
        );
        session.quit().await;
        Ok(())
    }
}

struct ControlSession {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    peer: SocketAddr,
    command_timeout: Duration,
}

impl ControlSession {
    async fn connect(settings: &FtpSettings) -> Result<Self, RelayError> {
        let stream = timeout(
            settings.connect_timeout,
            TcpStream::connect((settings.host.as_str(), settings.port)),
        )
        .await
        .map_err(|_| RelayError::Timeout(settings.connect_timeout))??;
        let peer = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();
        let mut session = Self {
            reader: BufReader::new(reader),
            writer,
            peer,
            command_timeout: settings.command_timeout,
        };
        session.expect_reply("connect", &[220]).await?;
        Ok(session)
    }

    async fn login(&mut self, username: &str, password: &str) -> Result<(), RelayError> {
        let (code, _) = self.command(&format!("USER {username}"), &[230, 331]).await?;
        if code == 331 {
            self.send(&format!("PASS {password}")).await?;
            self.expect_reply("PASS", &[202, 230]).await?;
        }
        Ok(())
    }

    /// CWD into the folder, creating it when missing. Falls back to the
    /// login directory when neither works.
    async fn change_folder(&mut self, folder: &str) {
        let folder = folder.trim();
        if folder.is_empty() {
            return;
        }
        if self.command(&format!("CWD {folder}"), &[250]).await.is_ok() {
            return;
        }
        monitor_debug!("[FTP] Folder {folder} missing, creating it");
        let created = self.command(&format!("MKD {folder}"), &[257]).await.is_ok()
            && self.command(&format!("CWD {folder}"), &[250]).await.is_ok();
        if !created {
            monitor_warn!("[FTP] Could not enter {folder}, uploading to the login directory");
        }
    }

    async fn passive(&mut self) -> Result<SocketAddr, RelayError> {
        let (_, text) = self.command("PASV", &[227]).await?;
        let addr = parse_pasv_reply(&text)?;
        // Servers behind NAT often advertise an unroutable address.
        if addr.ip().is_unspecified() || (addr.ip().is_private() && !self.peer.ip().is_loopback()) {
            return Ok(SocketAddr::new(self.peer.ip(), addr.port()));
        }
        Ok(SocketAddr::V4(addr))
    }

    async fn quit(&mut self) {
        if self.send("QUIT").await.is_ok() {
            let _ = self.read_reply().await;
        }
    }

    async fn command(&mut self, line: &str, accepted: &[u16]) -> Result<(u16, String), RelayError> {
        self.send(line).await?;
        let verb = line.split_whitespace().next().unwrap_or(line);
        self.expect_reply(verb, accepted).await
    }

    async fn send(&mut self, line: &str) -> Result<(), RelayError> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn expect_reply(&mut self, command: &str, accepted: &[u16]) -> Result<(u16, String), RelayError> {
        let (code, text) = self.read_reply().await?;
        if accepted.contains(&code) {
            Ok((code, text))
        } else {
            Err(RelayError::Rejected {
                command: command.to_string(),
                reply: format!("{code} {text}"),
            })
        }
    }

    /// Read one reply, following `NNN-` continuation lines up to the closing
    /// `NNN ` line.
    async fn read_reply(&mut self) -> Result<(u16, String), RelayError> {
        let limit = self.command_timeout;
        timeout(limit, read_reply(&mut self.reader))
            .await
            .map_err(|_| RelayError::Timeout(limit))?
    }
}

async fn read_reply(reader: &mut BufReader<OwnedReadHalf>) -> Result<(u16, String), RelayError> {
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Err(RelayError::MalformedReply("connection closed".into()));
    }
    let (code, separator, text) = split_reply_line(&line)?;
    if separator != '-' {
        return Ok((code, text.to_string()));
    }

    let mut text = text.to_string();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Err(RelayError::MalformedReply("connection closed mid-reply".into()));
        }
        if let Ok((end_code, ' ', tail)) = split_reply_line(&line) {
            if end_code == code {
                text.push('\n');
                text.push_str(tail);
                return Ok((code, text));
            }
        }
        text.push('\n');
        text.push_str(line.trim_end());
    }
}

fn split_reply_line(line: &str) -> Result<(u16, char, &str), RelayError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let malformed = || RelayError::MalformedReply(line.to_string());
    let code = line.get(..3).ok_or_else(malformed)?;
    let code: u16 = code.parse().map_err(|_| malformed())?;
    let separator = line[3..].chars().next().unwrap_or(' ');
    let text = line.get(4..).unwrap_or_default();
    Ok((code, separator, text))
}

/// Extract the data address from `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)`.
fn parse_pasv_reply(text: &str) -> Result<std::net::SocketAddrV4, RelayError> {
    let malformed = || RelayError::MalformedReply(text.to_string());
    let start = text.find('(').ok_or_else(malformed)?;
    let end = text[start..].find(')').ok_or_else(malformed)? + start;
    let numbers: Vec<u8> = text[start + 1..end]
        .split(',')
        .map(|n| n.trim().parse::<u8>())
        .collect::<Result<_, _>>()
        .map_err(|_| malformed())?;
    let [a, b, c, d, p1, p2] = numbers[..] else {
        return Err(malformed());
    };
    let port = (u16::from(p1) << 8) | u16::from(p2);
    Ok(std::net::SocketAddrV4::new(Ipv4Addr::new(a, b, c, d), port))
}

/// Retries a relay a fixed number of times with a pause in between.
pub struct RetryingRelay {
    inner: Arc<dyn Relay>,
    attempts: u32,
    pause: Duration,
}

impl RetryingRelay {
    pub const DEFAULT_ATTEMPTS: u32 = 3;

    pub fn new(inner: Arc<dyn Relay>) -> Self {
        Self {
            inner,
            attempts: Self::DEFAULT_ATTEMPTS,
            pause: Duration::from_secs(2),
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }
}

#[async_trait::async_trait]
impl Relay for RetryingRelay {
    async fn upload(&self, local_path: &Path, remote_folder: &str) -> Result<(), RelayError> {
        let mut attempt = 1;
        loop {
            match self.inner.upload(local_path, remote_folder).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt >= self.attempts => {
                    return Err(RelayError::Exhausted {
                        attempts: attempt,
                        last: Box::new(err),
                    });
                }
                Err(err) => {
                    monitor_warn!(
                        "[FTP] Upload attempt {attempt}/{} failed: {err}",
                        self.attempts
                    );
                    attempt += 1;
                    sleep(self.pause).await;
                }
            }
        }
    }
}
