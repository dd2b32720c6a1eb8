use super::codec::{read_sentence, write_sentence, Reply, ReplyKind};
use crate::domain::{normalize, Domain, DomainSet};
use crate::error::RouterApiError;
use crate::router::{RouterApi, StaticDnsEntry};
use std::net::IpAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, BufStream};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// A logged-in RouterOS API session.
pub struct RouterOsClient<S> {
    stream: BufStream<S>,
    timeout: Duration,
}

impl RouterOsClient<TcpStream> {
    pub async fn connect(
        host: &str,
        port: u16,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<Self, RouterApiError> {
        let addr = format!("{}:{}", host, port);
        let stream = tokio::time::timeout(timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| RouterApiError::Timeout {
                operation: format!("connect to {}", addr),
            })?
            .map_err(|source| RouterApiError::Connect {
                addr: addr.clone(),
                source,
            })?;

        let mut client = Self::new(stream, timeout);
        client.login(username, password).await?;
        info!("Logged in to {} as {}", addr, username);
        Ok(client)
    }
}

impl<S> RouterOsClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, timeout: Duration) -> Self {
        Self {
            stream: BufStream::new(stream),
            timeout,
        }
    }

    /// Sends one command and collects its `!re` replies up to `!done`.
    pub async fn command(&mut self, words: &[String]) -> Result<Vec<Reply>, RouterApiError> {
        tokio::time::timeout(self.timeout, exchange(&mut self.stream, words))
            .await
            .map_err(|_| RouterApiError::Timeout {
                operation: words_label(words),
            })?
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Result<(), RouterApiError> {
        let words = vec![
            "/login".to_string(),
            format!("=name={}", username),
            format!("=password={}", password),
        ];
        let replies = self.command(&words).await.map_err(|e| match e {
            RouterApiError::Trap { message, .. } => RouterApiError::Login(message),
            other => other,
        })?;

        // Pre-6.43 routers answer with an MD5 challenge instead of a session.
        if replies.iter().any(|r| r.get("ret").is_some()) {
            return Err(RouterApiError::Login(
                "router requested legacy challenge login, which is not supported".to_string(),
            ));
        }
        Ok(())
    }
}

async fn exchange<S>(
    stream: &mut BufStream<S>,
    words: &[String],
) -> Result<Vec<Reply>, RouterApiError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    debug!("-> {:?}", words);
    write_sentence(stream, words).await?;

    let mut rows = Vec::new();
    let mut trap: Option<String> = None;
    loop {
        let reply = Reply::parse(read_sentence(stream).await?)?;
        match reply.kind {
            ReplyKind::Re => rows.push(reply),
            // a trap is followed by !done; keep the first message
            ReplyKind::Trap => {
                trap.get_or_insert_with(|| {
                    reply.get("message").unwrap_or("unknown error").to_string()
                });
            }
            ReplyKind::Fatal => {
                return Err(RouterApiError::Fatal(
                    reply.get("message").unwrap_or("").to_string(),
                ))
            }
            ReplyKind::Done => {
                if let Some(message) = trap {
                    return Err(RouterApiError::Trap {
                        command: words_label(words),
                        message,
                    });
                }
                if !reply.attributes.is_empty() {
                    rows.push(reply);
                }
                return Ok(rows);
            }
        }
    }
}

fn words_label(words: &[String]) -> String {
    words.first().cloned().unwrap_or_else(|| "command".to_string())
}

#[async_trait::async_trait]
impl<S> RouterApi for RouterOsClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn list_dns_cache(&mut self) -> Result<DomainSet, RouterApiError> {
        let replies = self
            .command(&[
                "/ip/dns/cache/all/print".to_string(),
                "=.proplist=name,type".to_string(),
                "?type=A".to_string(),
                "?type=CNAME".to_string(),
                "?#|".to_string(),
            ])
            .await?;

        Ok(replies
            .iter()
            .filter_map(|r| r.get("name"))
            .filter_map(|name| normalize(name).ok())
            .collect())
    }

    async fn list_static_entries(&mut self) -> Result<Vec<StaticDnsEntry>, RouterApiError> {
        let replies = self
            .command(&[
                "/ip/dns/static/print".to_string(),
                "=.proplist=name,address".to_string(),
            ])
            .await?;

        // regexp entries have no name and never collide with a plain domain
        Ok(replies
            .iter()
            .filter_map(|r| {
                let domain = normalize(r.get("name")?).ok()?;
                let address = r.get("address").and_then(|a| a.parse::<IpAddr>().ok());
                Some(StaticDnsEntry { domain, address })
            })
            .collect())
    }

    async fn add_static_entry(
        &mut self,
        domain: &Domain,
        ip: IpAddr,
        comment: &str,
    ) -> Result<(), RouterApiError> {
        self.command(&[
            "/ip/dns/static/add".to_string(),
            format!("=name={}", domain),
            format!("=address={}", ip),
            format!("=comment={}", comment),
            "=disabled=no".to_string(),
        ])
        .await?;
        Ok(())
    }

    async fn flush_dns_cache(&mut self) -> Result<(), RouterApiError> {
        self.command(&["/ip/dns/cache/flush".to_string()]).await?;
        Ok(())
    }
}
