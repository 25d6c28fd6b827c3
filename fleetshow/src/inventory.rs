//! Host list, command script and per-host output artifacts.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use log::warn;
use secrecy::SecretString;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::error::{ConfigError, Result, ValidationError};

/// Validated identity and credential for one device.
#[derive(Debug, Clone)]
pub struct HostRecord {
    /// Device management address.
    pub address: Ipv4Addr,

    /// Login username.
    pub username: String,

    /// Login password, also used to answer the shell-entry password prompt.
    pub credential: SecretString,
}

impl HostRecord {
    /// Parse one `address,username,credential` entry.
    pub fn parse(line: &str) -> std::result::Result<Self, ValidationError> {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let [address, username, credential] = fields.as_slice() else {
            return Err(ValidationError::FieldCount {
                found: fields.len(),
            });
        };

        let address: Ipv4Addr =
            address
                .parse()
                .map_err(|_| ValidationError::InvalidAddress {
                    address: address.to_string(),
                })?;

        Ok(Self {
            address,
            username: username.to_string(),
            credential: SecretString::from(credential.to_string()),
        })
    }
}

/// A host-list line that was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedLine {
    /// 1-based line number.
    pub line: usize,
    pub reason: ValidationError,
}

/// Parsed host list.
#[derive(Debug, Clone, Default)]
pub struct HostList {
    /// Valid entries with their 1-based line numbers, in file order.
    pub hosts: Vec<(usize, HostRecord)>,

    /// Lines that failed validation.
    pub rejected: Vec<RejectedLine>,
}

impl HostList {
    /// Parse host-list text. Blank and `#` lines are ignored; invalid lines
    /// are recorded and reported, never fatal.
    pub fn parse(text: &str) -> Self {
        let mut list = HostList::default();
        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if is_ignored(line) {
                continue;
            }
            match HostRecord::parse(line) {
                Ok(record) => list.hosts.push((index + 1, record)),
                Err(reason) => {
                    warn!("host list line {}: {}, skipping this host", index + 1, reason);
                    list.rejected.push(RejectedLine {
                        line: index + 1,
                        reason,
                    });
                }
            }
        }
        list
    }

    /// Read and parse a host-list file.
    pub async fn load(path: &Path) -> Result<Self> {
        Ok(Self::parse(&read_input(path).await?))
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// Ordered list of commands to run on every device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandScript {
    commands: Vec<String>,
}

impl CommandScript {
    /// Parse script text: one command per line, blank and `#` lines ignored.
    pub fn parse(text: &str) -> Self {
        let commands = text
            .lines()
            .map(str::trim)
            .filter(|line| !is_ignored(line))
            .map(str::to_string)
            .collect();
        Self { commands }
    }

    /// Read and parse a command-script file.
    pub async fn load(path: &Path) -> Result<Self> {
        Ok(Self::parse(&read_input(path).await?))
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

fn is_ignored(line: &str) -> bool {
    line.is_empty() || line.starts_with('#')
}

async fn read_input(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path).await.map_err(|source| {
        ConfigError::Read {
            path: path.to_path_buf(),
            source,
        }
        .into()
    })
}

/// File name of the artifact for `address`.
pub fn artifact_name(address: Ipv4Addr) -> String {
    format!("output_{}.txt", address)
}

/// Whether `name` follows the artifact naming convention.
pub fn is_artifact_name(name: &str) -> bool {
    name.len() > "output_.txt".len() && name.starts_with("output_") && name.ends_with(".txt")
}

/// Append-only capture file for one host.
///
/// Captures are written back to back with no delimiter between commands.
#[derive(Debug)]
pub struct OutputArtifact {
    path: PathBuf,
    file: Option<File>,
}

impl OutputArtifact {
    /// Artifact for `address` inside `dir`. The file is created on first append.
    pub fn new(dir: &Path, address: Ipv4Addr) -> Self {
        Self {
            path: dir.join(artifact_name(address)),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one capture and flush it to disk.
    pub async fn append(&mut self, text: &str) -> Result<()> {
        if self.file.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            self.file = Some(file);
        }
        if let Some(file) = self.file.as_mut() {
            file.write_all(text.as_bytes()).await?;
            file.flush().await?;
        }
        Ok(())
    }

    /// Whether anything has been written yet.
    pub fn is_created(&self) -> bool {
        self.file.is_some()
    }
}
