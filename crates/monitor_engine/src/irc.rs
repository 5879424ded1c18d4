use std::sync::Arc;
use std::time::Duration;

use monitor_core::RunStatistics;
use monitor_logging::{monitor_debug, monitor_info, monitor_warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;

use crate::ConnectionError;

pub const DEFAULT_IRC_SERVER: &str = "irc.torrentleech.org";
pub const DEFAULT_IRC_PORT: u16 = 7021;
pub const DEFAULT_IRC_CHANNEL: &str = "#tlannounces";

#[derive(Debug, Clone)]
pub struct IrcSettings {
    pub server: String,
    pub port: u16,
    pub use_tls: bool,
    /// When false the server certificate is accepted without checking its
    /// chain or hostname. Handshake signatures are still verified.
    pub verify_tls: bool,
    pub nickname: String,
    pub password: Option<String>,
    pub channel: String,
    pub connect_timeout: Duration,
    /// Budget for registration and channel join after the socket is up.
    pub registration_timeout: Duration,
    /// Silence longer than this is treated as a dead connection.
    pub idle_timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl IrcSettings {
    pub fn new(nickname: impl Into<String>) -> Self {
        Self {
            server: DEFAULT_IRC_SERVER.to_string(),
            port: DEFAULT_IRC_PORT,
            use_tls: true,
            verify_tls: true,
            nickname: nickname.into(),
            password: None,
            channel: DEFAULT_IRC_CHANNEL.to_string(),
            connect_timeout: Duration::from_secs(30),
            registration_timeout: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(300),
            initial_backoff: Duration::from_secs(3),
            max_backoff: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrcState {
    Disconnected,
    Connecting,
    Joined,
    Listening,
    Stopped,
}

/// Byte stream the session runs over: plain TCP, TLS, or an in-memory pipe.
pub trait IrcStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> IrcStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, settings: &IrcSettings) -> Result<Box<dyn IrcStream>, ConnectionError>;
}

/// TCP connector with optional TLS, verified against the webpki roots
/// unless `verify_tls` is off.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

#[async_trait::async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, settings: &IrcSettings) -> Result<Box<dyn IrcStream>, ConnectionError> {
        let tcp = TcpStream::connect((settings.server.as_str(), settings.port)).await?;
        tcp.set_nodelay(true)?;
        if !settings.use_tls {
            return Ok(Box::new(tcp));
        }

        let config = tls_config(settings.verify_tls)?;
        let name = ServerName::try_from(settings.server.clone())
            .map_err(|err| ConnectionError::Tls(err.to_string()))?;
        let stream = TlsConnector::from(Arc::new(config))
            .connect(name, tcp)
            .await
            .map_err(|err| ConnectionError::Tls(err.to_string()))?;
        Ok(Box::new(stream))
    }
}

fn tls_config(verify: bool) -> Result<ClientConfig, ConnectionError> {
    let provider = Arc::new(tokio_rustls::rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|err| ConnectionError::Tls(err.to_string()))?;

    if !verify {
        monitor_warn!("[IRC] TLS certificate verification is disabled");
        return Ok(builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
            .with_no_client_auth());
    }

    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    Ok(builder.with_root_certificates(roots).with_no_client_auth())
}

#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, tokio_rustls::rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// One parsed protocol line. The trailing parameter, if any, is the last
/// entry of `params`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcMessage {
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

impl IrcMessage {
    /// Nickname part of the prefix (`nick!user@host`).
    pub fn nick(&self) -> Option<&str> {
        self.prefix
            .as_deref()
            .map(|prefix| prefix.split('!').next().unwrap_or(prefix))
    }

    fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }
}

pub fn parse_message(line: &str) -> Option<IrcMessage> {
    let mut rest = line.trim_end_matches(['\r', '\n']);
    let prefix = match rest.strip_prefix(':') {
        Some(stripped) => {
            let (prefix, tail) = stripped.split_once(' ')?;
            rest = tail;
            Some(prefix.to_string())
        }
        None => None,
    };

    let rest = rest.trim_start();
    let (head, trailing) = match rest.split_once(" :") {
        Some((head, trailing)) => (head, Some(trailing)),
        None => match rest.strip_prefix(':') {
            Some(trailing) => ("", Some(trailing)),
            None => (rest, None),
        },
    };

    let mut words = head.split_whitespace();
    let command = words.next()?.to_ascii_uppercase();
    let mut params: Vec<String> = words.map(str::to_string).collect();
    if let Some(trailing) = trailing {
        params.push(trailing.to_string());
    }

    Some(IrcMessage {
        prefix,
        command,
        params,
    })
}

/// Long-lived announce channel listener with reconnect and backoff.
pub struct IrcClient {
    settings: IrcSettings,
    connector: Arc<dyn Connector>,
    stats: Arc<RunStatistics>,
    state_tx: watch::Sender<IrcState>,
}

impl IrcClient {
    pub fn new(settings: IrcSettings, connector: Arc<dyn Connector>, stats: Arc<RunStatistics>) -> Self {
        let (state_tx, _) = watch::channel(IrcState::Disconnected);
        Self {
            settings,
            connector,
            stats,
            state_tx,
        }
    }

    pub fn settings(&self) -> &IrcSettings {
        &self.settings
    }

    pub fn state(&self) -> IrcState {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<IrcState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, state: IrcState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    /// Run until `cancel` fires, handing every channel message to `on_message`
    /// as the raw protocol line.
    pub async fn run<F>(&self, cancel: CancellationToken, mut on_message: F)
    where
        F: FnMut(String) + Send,
    {
        let mut backoff = self.settings.initial_backoff;

        while !cancel.is_cancelled() {
            self.set_state(IrcState::Connecting);
            monitor_info!(
                "[IRC] Connecting to {}:{} (tls: {})",
                self.settings.server,
                self.settings.port,
                self.settings.use_tls
            );

            let mut joined = false;
            match self.session(&cancel, &mut on_message, &mut joined).await {
                Ok(()) => break,
                Err(err) => {
                    self.stats.record_connection_error();
                    monitor_warn!("[IRC] Connection lost: {err}");
                }
            }
            self.set_state(IrcState::Disconnected);

            if joined {
                backoff = self.settings.initial_backoff;
            }
            monitor_info!("[IRC] Reconnecting in {}s", backoff.as_secs_f32());
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(self.settings.max_backoff);
        }

        self.set_state(IrcState::Stopped);
        monitor_info!("[IRC] Stopped");
    }

    /// One connection lifetime. `Ok` only when cancelled.
    async fn session<F>(
        &self,
        cancel: &CancellationToken,
        on_message: &mut F,
        joined: &mut bool,
    ) -> Result<(), ConnectionError>
    where
        F: FnMut(String) + Send,
    {
        let settings = &self.settings;
        let stream = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            connected = timeout(settings.connect_timeout, self.connector.connect(settings)) => {
                connected.map_err(|_| ConnectionError::ConnectTimeout(settings.connect_timeout))??
            }
        };
        self.stats.record_connection();

        let (reader, mut writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(reader);
        let mut nickname = settings.nickname.clone();

        if let Some(password) = settings.password.as_deref().filter(|p| !p.is_empty()) {
            send_line(&mut writer, &format!("PASS {password}")).await?;
        }
        send_line(&mut writer, &format!("NICK {nickname}")).await?;
        send_line(&mut writer, &format!("USER {nickname} 0 * :{nickname}")).await?;

        let deadline = sleep_until(Instant::now() + settings.registration_timeout);
        tokio::pin!(deadline);
        let mut listening = false;
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let read = tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = send_line(&mut writer, "QUIT :shutting down").await;
                    return Ok(());
                }
                _ = &mut deadline, if !*joined => {
                    return Err(ConnectionError::RegistrationTimeout(settings.registration_timeout));
                }
                read = timeout(settings.idle_timeout, reader.read_until(b'\n', &mut buf)) => read,
            };

            let count = read.map_err(|_| ConnectionError::Idle(settings.idle_timeout))??;
            if count == 0 {
                return Err(ConnectionError::Closed);
            }

            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\r', '\n']);
            let Some(message) = parse_message(line) else {
                continue;
            };

            match message.command.as_str() {
                "PING" => {
                    let token = message.param(0).unwrap_or_default();
                    send_line(&mut writer, &format!("PONG :{token}")).await?;
                }
                "001" => {
                    monitor_info!("[IRC] Registered as {nickname}, joining {}", settings.channel);
                    send_line(&mut writer, &format!("JOIN {}", settings.channel)).await?;
                }
                "433" => {
                    nickname.push('_');
                    monitor_warn!("[IRC] Nickname in use, retrying as {nickname}");
                    send_line(&mut writer, &format!("NICK {nickname}")).await?;
                }
                "464" | "465" | "474" => {
                    let reason = message.params.last().cloned().unwrap_or_default();
                    return Err(ConnectionError::Refused(format!("{} {reason}", message.command)));
                }
                "ERROR" => {
                    let reason = message.params.last().cloned().unwrap_or_default();
                    return Err(ConnectionError::Refused(reason));
                }
                "JOIN" => {
                    let own = message.nick().is_some_and(|n| n.eq_ignore_ascii_case(&nickname));
                    let channel = message.param(0).unwrap_or_default();
                    if own && channel.eq_ignore_ascii_case(&settings.channel) && !*joined {
                        *joined = true;
                        self.set_state(IrcState::Joined);
                        monitor_info!("[IRC] Joined {}", settings.channel);
                    }
                }
                "366" => {
                    if !*joined {
                        *joined = true;
                        self.set_state(IrcState::Joined);
                        monitor_info!("[IRC] Joined {}", settings.channel);
                    }
                    if !listening {
                        listening = true;
                        self.set_state(IrcState::Listening);
                        monitor_info!("[IRC] Listening for announcements");
                    }
                }
                "PRIVMSG" => {
                    let target = message.param(0).unwrap_or_default();
                    if *joined && target.eq_ignore_ascii_case(&settings.channel) {
                        if !listening {
                            listening = true;
                            self.set_state(IrcState::Listening);
                        }
                        on_message(line.to_string());
                    }
                }
                other => monitor_debug!("[IRC] {other}: {line}"),
            }
        }
    }
}

async fn send_line<W>(writer: &mut W, line: &str) -> Result<(), ConnectionError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\r\n").await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unverified_tls_accepts_any_server_certificate() {
        let provider = Arc::new(tokio_rustls::rustls::crypto::ring::default_provider());
        let verifier = AcceptAnyCertificate(provider);
        let cert = CertificateDer::from(vec![0u8; 4]);
        let name = ServerName::try_from("irc.torrentleech.org").unwrap();

        assert!(verifier
            .verify_server_cert(&cert, &[], &name, &[], UnixTime::now())
            .is_ok());
        assert!(!verifier.supported_verify_schemes().is_empty());
        assert!(tls_config(false).is_ok());
        assert!(tls_config(true).is_ok());
    }

    #[test]
    fn parses_prefix_command_and_trailing() {
        let message =
            parse_message(":bot!tl@host PRIVMSG #tlannounces :New Torrent Announcement: x").unwrap();
        assert_eq!(message.prefix.as_deref(), Some("bot!tl@host"));
        assert_eq!(message.nick(), Some("bot"));
        assert_eq!(message.command, "PRIVMSG");
        assert_eq!(
            message.params,
            vec!["#tlannounces".to_string(), "New Torrent Announcement: x".to_string()]
        );
    }

    #[test]
    fn parses_ping_without_prefix() {
        let message = parse_message("PING :irc.example.org\r\n").unwrap();
        assert_eq!(message.prefix, None);
        assert_eq!(message.command, "PING");
        assert_eq!(message.params, vec!["irc.example.org".to_string()]);
    }

    #[test]
    fn rejects_empty_line() {
        assert_eq!(parse_message(""), None);
        assert_eq!(parse_message(":onlyprefix"), None);
    }
}
