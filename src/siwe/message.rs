//! EIP-4361 message parsing
//!
//! ```text
//! ${domain} wants you to sign in with your Ethereum account:
//! ${address}
//!
//! ${statement}
//!
//! URI: ${uri}
//! Version: ${version}
//! Chain ID: ${chain-id}
//! Nonce: ${nonce}
//! Issued At: ${issued-at}
//! Expiration Time: ${expiration-time}
//! Not Before: ${not-before}
//! Request ID: ${request-id}
//! Resources:
//! - ${resources[0]}
//! ```

use alloy_primitives::Address;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const PREAMBLE_SUFFIX: &str = " wants you to sign in with your Ethereum account:";
const SUPPORTED_VERSION: &str = "1";
const MIN_NONCE_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("message is missing required field: {0}")]
    MissingField(&'static str),

    #[error("message header is not a SIWE preamble")]
    InvalidHeader,

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid chain id: {0}")]
    InvalidChainId(String),

    #[error("unsupported version: {0}")]
    UnsupportedVersion(String),

    #[error("nonce must be at least {MIN_NONCE_LEN} alphanumeric characters")]
    InvalidNonce,

    #[error("invalid timestamp in {field}: {value}")]
    InvalidTimestamp { field: &'static str, value: String },

    #[error("duplicate field: {0}")]
    DuplicateField(&'static str),

    #[error("unexpected line: {0}")]
    UnexpectedLine(String),
}

/// A parsed Sign-In-With-Ethereum message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiweMessage {
    pub domain: String,
    pub address: Address,
    pub statement: Option<String>,
    pub uri: String,
    pub version: String,
    pub chain_id: u64,
    pub nonce: String,
    pub issued_at: DateTime<Utc>,
    pub expiration_time: Option<DateTime<Utc>>,
    pub not_before: Option<DateTime<Utc>>,
    pub request_id: Option<String>,
    pub resources: Vec<String>,
}

impl SiweMessage {
    /// True once `now` has reached the declared expiration time
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration_time.is_some_and(|exp| now >= exp)
    }

    /// True while `now` is before the declared not-before time
    pub fn is_not_yet_valid(&self, now: DateTime<Utc>) -> bool {
        self.not_before.is_some_and(|nbf| now < nbf)
    }
}

fn parse_timestamp(field: &'static str, value: &str) -> Result<DateTime<Utc>, MessageError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| MessageError::InvalidTimestamp {
            field,
            value: value.to_string(),
        })
}

fn set_once<T>(slot: &mut Option<T>, field: &'static str, value: T) -> Result<(), MessageError> {
    if slot.is_some() {
        return Err(MessageError::DuplicateField(field));
    }
    *slot = Some(value);
    Ok(())
}

impl FromStr for SiweMessage {
    type Err = MessageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut lines = s.lines().peekable();

        let header = lines.next().ok_or(MessageError::MissingField("domain"))?;
        let domain = header
            .strip_suffix(PREAMBLE_SUFFIX)
            .filter(|d| !d.is_empty())
            .ok_or(MessageError::InvalidHeader)?;

        let address_line = lines
            .next()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .ok_or(MessageError::MissingField("address"))?;
        // EIP-55 checksum is part of the message grammar
        let address = Address::parse_checksummed(address_line, None)
            .map_err(|_| MessageError::InvalidAddress(address_line.to_string()))?;

        // Optional single-line statement between the blank separators
        let mut statement = None;
        while let Some(line) = lines.peek() {
            if line.is_empty() {
                lines.next();
                continue;
            }
            if !line.starts_with("URI: ") {
                statement = Some(line.to_string());
                lines.next();
            }
            break;
        }

        let mut uri = None;
        let mut version = None;
        let mut chain_id = None;
        let mut nonce = None;
        let mut issued_at = None;
        let mut expiration_time = None;
        let mut not_before = None;
        let mut request_id = None;
        let mut resources = Vec::new();

        while let Some(line) = lines.next() {
            if line.is_empty() {
                continue;
            }

            if line == "Resources:" {
                for resource in lines.by_ref() {
                    if resource.is_empty() {
                        continue;
                    }
                    let item = resource
                        .strip_prefix("- ")
                        .ok_or_else(|| MessageError::UnexpectedLine(resource.to_string()))?;
                    resources.push(item.to_string());
                }
                break;
            }

            let (key, value) = line
                .split_once(": ")
                .ok_or_else(|| MessageError::UnexpectedLine(line.to_string()))?;
            let value = value.trim();

            match key {
                "URI" => set_once(&mut uri, "URI", value.to_string())?,
                "Version" => set_once(&mut version, "Version", value.to_string())?,
                "Chain ID" => {
                    let id = value
                        .parse::<u64>()
                        .map_err(|_| MessageError::InvalidChainId(value.to_string()))?;
                    set_once(&mut chain_id, "Chain ID", id)?
                }
                "Nonce" => set_once(&mut nonce, "Nonce", value.to_string())?,
                "Issued At" => {
                    set_once(&mut issued_at, "Issued At", parse_timestamp("Issued At", value)?)?
                }
                "Expiration Time" => set_once(
                    &mut expiration_time,
                    "Expiration Time",
                    parse_timestamp("Expiration Time", value)?,
                )?,
                "Not Before" => set_once(
                    &mut not_before,
                    "Not Before",
                    parse_timestamp("Not Before", value)?,
                )?,
                "Request ID" => set_once(&mut request_id, "Request ID", value.to_string())?,
                _ => return Err(MessageError::UnexpectedLine(line.to_string())),
            }
        }

        let version = version.ok_or(MessageError::MissingField("Version"))?;
        if version != SUPPORTED_VERSION {
            return Err(MessageError::UnsupportedVersion(version));
        }

        let nonce = nonce.ok_or(MessageError::MissingField("Nonce"))?;
        if nonce.len() < MIN_NONCE_LEN || !nonce.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(MessageError::InvalidNonce);
        }

        Ok(Self {
            domain: domain.to_string(),
            address,
            statement,
            uri: uri.ok_or(MessageError::MissingField("URI"))?,
            version,
            chain_id: chain_id.ok_or(MessageError::MissingField("Chain ID"))?,
            nonce,
            issued_at: issued_at.ok_or(MessageError::MissingField("Issued At"))?,
            expiration_time,
            not_before,
            request_id,
            resources,
        })
    }
}

impl fmt::Display for SiweMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}{}", self.domain, PREAMBLE_SUFFIX)?;
        writeln!(f, "{}", self.address.to_checksum(None))?;
        writeln!(f)?;
        if let Some(statement) = &self.statement {
            writeln!(f, "{}", statement)?;
        }
        writeln!(f)?;
        writeln!(f, "URI: {}", self.uri)?;
        writeln!(f, "Version: {}", self.version)?;
        writeln!(f, "Chain ID: {}", self.chain_id)?;
        writeln!(f, "Nonce: {}", self.nonce)?;
        write!(
            f,
            "Issued At: {}",
            self.issued_at.to_rfc3339_opts(SecondsFormat::Millis, true)
        )?;
        if let Some(exp) = self.expiration_time {
            write!(
                f,
                "\nExpiration Time: {}",
                exp.to_rfc3339_opts(SecondsFormat::Millis, true)
            )?;
        }
        if let Some(nbf) = self.not_before {
            write!(
                f,
                "\nNot Before: {}",
                nbf.to_rfc3339_opts(SecondsFormat::Millis, true)
            )?;
        }
        if let Some(request_id) = &self.request_id {
            write!(f, "\nRequest ID: {}", request_id)?;
        }
        if !self.resources.is_empty() {
            write!(f, "\nResources:")?;
            for resource in &self.resources {
                write!(f, "\n- {}", resource)?;
            }
        }
        Ok(())
    }
}
