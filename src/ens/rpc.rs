//! ENS resolution over Ethereum JSON-RPC
//!
//! Plain `eth_call`s against the ENS registry and the name's resolver:
//!
//! - `resolver(bytes32)` on the registry finds the resolver contract for a node
//! - `addr(bytes32)` on the resolver gives the forward address
//! - `name(bytes32)` on the resolver of `<addr>.addr.reverse` gives the primary name,
//!   which is only trusted after it resolves forward to the same address

use alloy_primitives::{Address, B256, keccak256};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::ens::NameResolver;
use crate::error::ResolverError;
use crate::siwe::normalize_address;

/// Mainnet ENS registry
pub const DEFAULT_ENS_REGISTRY: &str = "0x00000000000C2E074eC69A0bFb2997BA6C7d2e1e";

const RESOLVER_SELECTOR: [u8; 4] = [0x01, 0x78, 0xb8, 0xbf];
const ADDR_SELECTOR: [u8; 4] = [0x3b, 0x3b, 0x57, 0xde];
const NAME_SELECTOR: [u8; 4] = [0x69, 0x1f, 0x34, 0x31];

/// EIP-137 namehash. Labels are lowercased; full UTS-46 normalisation is not applied.
pub fn namehash(name: &str) -> B256 {
    let mut node = B256::ZERO;
    if name.is_empty() {
        return node;
    }
    for label in name.rsplit('.') {
        let label_hash = keccak256(label.to_lowercase().as_bytes());
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(node.as_slice());
        buf[32..].copy_from_slice(label_hash.as_slice());
        node = keccak256(buf);
    }
    node
}

fn calldata(selector: [u8; 4], node: B256) -> Vec<u8> {
    let mut data = Vec::with_capacity(36);
    data.extend_from_slice(&selector);
    data.extend_from_slice(node.as_slice());
    data
}

/// First return word as an address; the zero address means unset
fn decode_address(ret: &[u8]) -> Result<Option<Address>, ResolverError> {
    if ret.is_empty() {
        return Ok(None);
    }
    if ret.len() < 32 {
        return Err(ResolverError::InvalidResponse(format!(
            "address word is {} bytes",
            ret.len()
        )));
    }
    let address = Address::from_slice(&ret[12..32]);
    Ok((address != Address::ZERO).then_some(address))
}

/// ABI-encoded dynamic `string` return value; empty means unset
fn decode_string(ret: &[u8]) -> Result<Option<String>, ResolverError> {
    if ret.is_empty() {
        return Ok(None);
    }
    let invalid = |what: &str| ResolverError::InvalidResponse(format!("bad string encoding: {}", what));

    let word = |at: usize| -> Result<usize, ResolverError> {
        let end = at.checked_add(32).ok_or_else(|| invalid("offset overflow"))?;
        let bytes = ret.get(at..end).ok_or_else(|| invalid("truncated"))?;
        if bytes[..24].iter().any(|b| *b != 0) {
            return Err(invalid("word overflows usize"));
        }
        let mut be = [0u8; 8];
        be.copy_from_slice(&bytes[24..32]);
        Ok(u64::from_be_bytes(be) as usize)
    };

    let offset = word(0)?;
    let len = word(offset)?;
    let start = offset + 32;
    let end = start
        .checked_add(len)
        .ok_or_else(|| invalid("length overflow"))?;
    let raw = ret.get(start..end).ok_or_else(|| invalid("length past end"))?;
    let name = String::from_utf8(raw.to_vec()).map_err(|_| invalid("not utf-8"))?;
    Ok((!name.is_empty()).then_some(name))
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Clone)]
pub struct RpcNameResolver {
    client: Client,
    endpoint: Url,
    registry: Address,
}

impl RpcNameResolver {
    pub fn new(rpc_url: &str, registry: &str, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(rpc_url).context("Invalid RPC_URL")?;
        if endpoint.scheme() != "https" && endpoint.scheme() != "http" {
            bail!("RPC_URL must be http(s), got {}", endpoint.scheme());
        }
        let registry = Address::from_str(registry).context("Invalid ENS registry address")?;

        let client = Client::builder()
            .timeout(timeout)
            .user_agent("siwe-referral/0.1")
            .build()
            .context("Failed to create JSON-RPC client")?;

        info!(
            "ENS resolver using registry {} via {}",
            registry,
            endpoint.host_str().unwrap_or("<no host>")
        );

        Ok(Self {
            client,
            endpoint,
            registry,
        })
    }

    async fn eth_call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>, ResolverError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": [
                { "to": to.to_string(), "data": format!("0x{}", hex::encode(data)) },
                "latest"
            ],
        });

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| ResolverError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ResolverError::Unavailable(format!(
                "RPC endpoint returned {}",
                response.status()
            )));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| ResolverError::InvalidResponse(e.to_string()))?;

        if let Some(err) = body.error {
            // A revert means the contract does not implement the call
            if err.message.to_lowercase().contains("revert") {
                debug!("eth_call reverted: {}", err.message);
                return Ok(Vec::new());
            }
            return Err(ResolverError::Unavailable(format!(
                "RPC error {}: {}",
                err.code, err.message
            )));
        }

        let result = body
            .result
            .ok_or_else(|| ResolverError::InvalidResponse("missing result".to_string()))?;
        hex::decode(result.trim_start_matches("0x"))
            .map_err(|e| ResolverError::InvalidResponse(e.to_string()))
    }

    async fn resolver_for(&self, node: B256) -> Result<Option<Address>, ResolverError> {
        let ret = self
            .eth_call(self.registry, calldata(RESOLVER_SELECTOR, node))
            .await?;
        decode_address(&ret)
    }

    async fn forward(&self, name: &str) -> Result<Option<Address>, ResolverError> {
        let node = namehash(name);
        let Some(resolver) = self.resolver_for(node).await? else {
            return Ok(None);
        };
        let ret = self.eth_call(resolver, calldata(ADDR_SELECTOR, node)).await?;
        decode_address(&ret)
    }
}

#[async_trait]
impl NameResolver for RpcNameResolver {
    async fn resolve_name(&self, name: &str) -> Result<Option<String>, ResolverError> {
        Ok(self.forward(name).await?.map(|a| normalize_address(&a)))
    }

    async fn lookup_address(&self, address: &str) -> Result<Option<String>, ResolverError> {
        let parsed = Address::from_str(address)
            .map_err(|e| ResolverError::InvalidResponse(format!("bad address {}: {}", address, e)))?;
        let reverse_name = format!("{}.addr.reverse", hex::encode(parsed.as_slice()));
        let node = namehash(&reverse_name);

        let Some(resolver) = self.resolver_for(node).await? else {
            return Ok(None);
        };
        let ret = self.eth_call(resolver, calldata(NAME_SELECTOR, node)).await?;
        let Some(name) = decode_string(&ret)? else {
            return Ok(None);
        };

        // Anyone can set any reverse name; only accept it if it points back here
        match self.forward(&name).await? {
            Some(forward) if forward == parsed => Ok(Some(name)),
            _ => {
                debug!(address = %address, name = %name, "Reverse name does not resolve back");
                Ok(None)
            }
        }
    }
}
