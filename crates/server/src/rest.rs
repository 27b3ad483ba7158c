//! Unauthenticated REST discovery (C4): retrieve controller metadata and
//! its RSA public key before the WebSocket handshake begins.
//!
//! Grounded on the Python reference's `RestClient`: the `apiKey` endpoint
//! wraps its real payload in a single-quoted pseudo-JSON string, and the
//! public-key endpoint returns a certificate-armored PEM that actually
//! holds a SubjectPublicKeyInfo.

use serde::Deserialize;

use crate::error::{BridgeError, Result};

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(rename = "LL")]
    ll: EnvelopeBody<T>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeBody<T> {
    control: String,
    #[serde(rename = "Code")]
    code: String,
    value: T,
}

#[derive(Debug, Deserialize)]
struct ApiKeyInfo {
    snr: String,
    #[serde(default)]
    local: bool,
    #[serde(default)]
    address: String,
    #[serde(rename = "httpsStatus", default)]
    https_status: u8,
}

/// Controller metadata derived from `/jdev/cfg/apiKey`, reduced to what the
/// handshake and socket address need.
#[derive(Debug, Clone)]
pub struct MiniserverInfo {
    pub serial: String,
    pub ws_base_url: String,
}

fn check_envelope<T>(expected_control: &str, envelope: Envelope<T>) -> Result<T> {
    if envelope.ll.control != expected_control {
        return Err(BridgeError::Envelope(format!(
            "expected control {expected_control:?}, got {:?}",
            envelope.ll.control
        )));
    }
    if envelope.ll.code != "200" {
        return Err(BridgeError::Envelope(format!(
            "non-200 code for {expected_control:?}: {}",
            envelope.ll.code
        )));
    }
    Ok(envelope.ll.value)
}

/// `GET /jdev/cfg/apiKey`. The envelope's `value` is a JSON object encoded
/// as a string with single quotes in place of double quotes.
pub async fn get_info(client: &reqwest::Client, host: &str) -> Result<MiniserverInfo> {
    let url = format!("http://{host}/jdev/cfg/apiKey");
    let body = client.get(&url).send().await?.text().await?;
    let envelope: Envelope<String> = serde_json::from_str(&body)
        .map_err(|e| BridgeError::Envelope(format!("invalid apiKey envelope: {e}")))?;
    let raw_value = check_envelope("dev/cfg/apiKey", envelope)?;
    let fixed = raw_value.replace('\'', "\"");
    let info: ApiKeyInfo = serde_json::from_str(&fixed)
        .map_err(|e| BridgeError::Envelope(format!("invalid apiKey payload: {e}")))?;

    let effective_host = if info.local {
        let dashed_ip = info.address.replace('.', "-");
        let serial_no_colons = info.snr.replace(':', "");
        format!("{dashed_ip}.{serial_no_colons}.dyndns.loxonecloud.com")
    } else {
        host.to_string()
    };

    let scheme = if info.https_status == 1 { "wss" } else { "ws" };

    Ok(MiniserverInfo {
        serial: info.snr,
        ws_base_url: format!("{scheme}://{effective_host}"),
    })
}

/// `GET /jdev/sys/getPublicKey`. Rewrites the certificate armor to a
/// public-key armor so `rsa`'s PEM decoder accepts it.
pub async fn get_public_key(client: &reqwest::Client, host: &str) -> Result<String> {
    let url = format!("http://{host}/jdev/sys/getPublicKey");
    let body = client.get(&url).send().await?.text().await?;
    let envelope: Envelope<String> = serde_json::from_str(&body)
        .map_err(|e| BridgeError::Envelope(format!("invalid getPublicKey envelope: {e}")))?;
    let pem = check_envelope("dev/sys/getPublicKey", envelope)?;
    Ok(loxone_core::crypto::certificate_armor_to_public_key(&pem))
}
