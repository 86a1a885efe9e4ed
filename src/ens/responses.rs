//! ENS response bodies shared by the identity query endpoint and login rejections

use serde_json::{Value, json};

const ENS_APP_URL: &str = "https://app.ens.domains/";

pub fn ens_url(name: &str) -> String {
    format!("{}{}", ENS_APP_URL, name)
}

pub fn ens_resolved(ens: &str, address: &str) -> Value {
    json!({
        "success": true,
        "message": "ENS name resolved successfully",
        "ens": ens,
        "address": address,
        "ensUrl": ens_url(ens),
    })
}

pub fn reverse_ens_found(address: &str, ens: &str) -> Value {
    json!({
        "success": true,
        "message": "Reverse ENS lookup successful",
        "address": address,
        "ens": ens,
        "ensUrl": ens_url(ens),
    })
}

pub fn ens_not_resolved(ens: &str) -> Value {
    json!({
        "success": false,
        "error": "ENS name does not resolve",
        "ens": ens,
        "suggestion": "Please verify the ENS name is correct and properly configured",
    })
}

pub fn ens_mismatch(ens: &str, expected_address: &str, resolved_address: &str) -> Value {
    json!({
        "success": false,
        "error": "ENS does not resolve to signer address",
        "ens": ens,
        "expectedAddress": expected_address,
        "resolvedAddress": resolved_address,
        "suggestion": "The ENS name resolves to a different address than the one signing",
    })
}

pub fn reverse_ens_missing(address: &str) -> Value {
    json!({
        "success": false,
        "error": "Reverse ENS lookup returned no name for address",
        "address": address,
        "suggestion": format!("Set up reverse resolution at {}", ENS_APP_URL),
    })
}

pub fn reverse_ens_mismatch(address: &str, expected_ens: &str, reverse_ens: &str) -> Value {
    json!({
        "success": false,
        "error": "Reverse ENS name does not match provided ENS",
        "address": address,
        "expectedEns": expected_ens,
        "reverseEns": reverse_ens,
        "suggestion": "The reverse ENS lookup returned a different name",
    })
}

/// Generic metadata when the query names neither a name nor an address
pub fn ens_info(ens: Option<&str>, reverse_resolution_required: bool) -> Value {
    json!({
        "message": "ENS domain information",
        "ensProvided": ens.is_some(),
        "ens": ens,
        "ensUrl": ens.map(ens_url).unwrap_or_else(|| ENS_APP_URL.to_string()),
        "reverseResolutionRequired": reverse_resolution_required,
    })
}
