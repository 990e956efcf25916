//! Minimal IMAP client
//!
//! Just enough of RFC 3501 for the placement checker: implicit-TLS
//! connect, LOGIN, EXAMINE, SEARCH SUBJECT, LOGOUT. Folders are opened
//! read-only so probing never changes message flags.

use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::{debug, trace};

/// Tagged command completion status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Status {
    Ok,
    No,
    Bad,
}

/// One authenticated IMAP session over implicit TLS
pub(crate) struct ImapSession {
    reader: BufReader<ReadHalf<TlsStream<TcpStream>>>,
    writer: WriteHalf<TlsStream<TcpStream>>,
    tag_seq: u32,
}

impl ImapSession {
    /// Connect and consume the server greeting
    pub(crate) async fn connect(host: &str, port: u16) -> Result<Self> {
        let tcp = TcpStream::connect((host, port))
            .await
            .with_context(|| format!("IMAP connect to {}:{} failed", host, port))?;

        let connector = TlsConnector::from(tls_config()?);
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| anyhow!("Invalid IMAP host name: {}", host))?;
        let tls = connector
            .connect(server_name, tcp)
            .await
            .with_context(|| format!("TLS handshake with {} failed", host))?;

        let (read_half, write_half) = tokio::io::split(tls);
        let mut session = Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            tag_seq: 0,
        };

        let greeting = session.read_line().await?;
        if !greeting.starts_with("* OK") {
            return Err(anyhow!("Unexpected IMAP greeting: {}", greeting));
        }

        Ok(session)
    }

    pub(crate) async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let (status, _) = self
            .command(&format!("LOGIN {} {}", quote(username), quote(password)))
            .await?;
        if status != Status::Ok {
            return Err(anyhow!("IMAP login rejected for {}", username));
        }
        Ok(())
    }

    /// Whether a folder holds a message with the marker in its subject
    ///
    /// A folder the server refuses to open (absent promotions tab, renamed
    /// junk folder) is a non-match, not an error.
    pub(crate) async fn folder_contains_subject(
        &mut self,
        folder: &str,
        marker: &str,
    ) -> Result<bool> {
        let (status, _) = self.command(&format!("EXAMINE {}", quote(folder))).await?;
        if status != Status::Ok {
            debug!("Folder {} not selectable, treating as non-match", folder);
            return Ok(false);
        }

        let (status, untagged) = self
            .command(&format!("SEARCH SUBJECT {}", quote(marker)))
            .await?;
        if status != Status::Ok {
            return Err(anyhow!("SEARCH failed in folder {}", folder));
        }

        Ok(untagged.iter().any(|line| search_has_hits(line)))
    }

    /// Best-effort logout; errors are ignored by callers
    pub(crate) async fn logout(&mut self) -> Result<()> {
        let _ = self.command("LOGOUT").await?;
        Ok(())
    }

    /// Send one command and collect untagged lines until its completion
    async fn command(&mut self, cmd: &str) -> Result<(Status, Vec<String>)> {
        self.tag_seq += 1;
        let tag = format!("a{:03}", self.tag_seq);

        trace!("IMAP >> {} {}", tag, cmd);
        self.writer
            .write_all(format!("{} {}\r\n", tag, cmd).as_bytes())
            .await?;
        self.writer.flush().await?;

        let prefix = format!("{} ", tag);
        let mut untagged = Vec::new();

        // Bounded so a misbehaving server cannot hold the session forever
        for _ in 0..10_000 {
            let line = self.read_line().await?;
            if let Some(completion) = line.strip_prefix(&prefix) {
                return Ok((parse_status(completion)?, untagged));
            }
            untagged.push(line);
        }

        Err(anyhow!("IMAP response for {} never completed", tag))
    }

    async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(anyhow!("IMAP connection closed by server"));
        }
        let line = line.trim_end_matches(['\r', '\n']).to_string();
        trace!("IMAP << {}", line);
        Ok(line)
    }
}

fn tls_config() -> Result<Arc<ClientConfig>> {
    let mut roots = RootCertStore::empty();
    for cert in
        rustls_native_certs::load_native_certs().context("Failed to load native root certs")?
    {
        let _ = roots.add(cert);
    }

    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

/// IMAP quoted-string form
fn quote(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

fn parse_status(completion: &str) -> Result<Status> {
    let word = completion.split_whitespace().next().unwrap_or("");
    match word {
        "OK" => Ok(Status::Ok),
        "NO" => Ok(Status::No),
        "BAD" => Ok(Status::Bad),
        other => Err(anyhow!("Unrecognized IMAP completion: {}", other)),
    }
}

/// True when an untagged `* SEARCH` line lists at least one sequence number
fn search_has_hits(line: &str) -> bool {
    line.strip_prefix("* SEARCH")
        .map(|rest| rest.split_whitespace().any(|t| t.parse::<u32>().is_ok()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_escapes_specials() {
        assert_eq!(quote("INBOX"), "\"INBOX\"");
        assert_eq!(quote("Junk Email"), "\"Junk Email\"");
        assert_eq!(quote("odd\"name"), "\"odd\\\"name\"");
        assert_eq!(quote("back\\slash"), "\"back\\\\slash\"");
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status("OK EXAMINE completed").unwrap(), Status::Ok);
        assert_eq!(parse_status("NO no such folder").unwrap(), Status::No);
        assert_eq!(parse_status("BAD parse error").unwrap(), Status::Bad);
        assert!(parse_status("HUH").is_err());
    }

    #[test]
    fn test_search_has_hits() {
        assert!(search_has_hits("* SEARCH 4 12 983"));
        assert!(!search_has_hits("* SEARCH"));
        assert!(!search_has_hits("* 3 EXISTS"));
        assert!(!search_has_hits("a001 OK SEARCH completed"));
    }
}
