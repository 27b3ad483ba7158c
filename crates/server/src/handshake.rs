//! The ordered key-exchange → authentication → subscription sequence
//! (C5). Each step sends one outbound text command and expects one TEXT or
//! FILE frame in response; any mismatch aborts the connection attempt.

use rand::RngCore;
use serde::Deserialize;

use loxone_core::crypto::{self, HashAlg};
use loxone_core::frame::Identifier;

use crate::error::{BridgeError, Result};
use crate::transport::Socket;

const CLIENT_ID: &str = "a17a9b2e-6e3b-4a0e-9e4b-2f7a5c8d9e10";
const CLIENT_NAME: &str = "loxone-bridge";
const PERMISSION_WEB: u32 = 0x2;

#[derive(Debug, Deserialize)]
struct WsEnvelope<T> {
    #[serde(rename = "LL")]
    ll: WsBody<T>,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct WsBody<T> {
    control: String,
    #[serde(alias = "Code")]
    code: String,
    #[serde(default)]
    value: Option<T>,
}

#[derive(Debug, Deserialize)]
struct GetKey2Value {
    key: String,
    salt: String,
    #[serde(rename = "hashAlg")]
    hash_alg: String,
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

async fn expect_identifier(socket: &mut Socket, step: &'static str, expected: Identifier) -> Result<Vec<u8>> {
    let header = socket.recv_header().await?;
    if header.identifier != expected {
        return Err(BridgeError::HandshakeRejected {
            step,
            reason: format!("expected {expected:?}, got {:?}", header.identifier),
        });
    }
    socket.recv_body().await
}

fn parse_envelope<T: serde::de::DeserializeOwned>(
    step: &'static str,
    body: &[u8],
    expected_control: Option<&str>,
) -> Result<Option<T>> {
    let text = loxone_core::frame::decode_text(body)?;
    let envelope: WsEnvelope<T> = serde_json::from_str(text)
        .map_err(|e| BridgeError::HandshakeRejected { step, reason: format!("invalid json: {e}") })?;
    if let Some(expected) = expected_control {
        if envelope.ll.control != expected {
            return Err(BridgeError::HandshakeRejected {
                step,
                reason: format!("unexpected control {:?}", envelope.ll.control),
            });
        }
    }
    if envelope.ll.code != "200" {
        return Err(BridgeError::HandshakeRejected {
            step,
            reason: format!("non-200 code {:?}", envelope.ll.code),
        });
    }
    Ok(envelope.ll.value)
}

/// Session material negotiated during the handshake, plus the raw
/// structure document bytes retrieved at H4.
pub struct HandshakeOutcome {
    pub aes_key_hex: String,
    pub aes_iv_hex: String,
    pub structure_json: String,
}

pub async fn perform(socket: &mut Socket, user: &str, password: &str, public_key_pem: &str) -> Result<HandshakeOutcome> {
    let (aes_key_hex, aes_iv_hex) = crypto::generate_session_material();

    // H1: key exchange.
    let sealed = crypto::seal_session(&aes_key_hex, &aes_iv_hex, public_key_pem)?;
    socket.send_text(&format!("jdev/sys/keyexchange/{sealed}")).await?;
    let body = expect_identifier(socket, "H1", Identifier::Text).await?;
    let _: Option<serde_json::Value> = parse_envelope("H1", &body, None)?;

    // H2: key + salt + hash algorithm for the password hash.
    let control = format!("jdev/sys/getkey2/{user}");
    socket.send_text(&control).await?;
    let body = expect_identifier(socket, "H2", Identifier::Text).await?;
    let getkey2: GetKey2Value = parse_envelope("H2", &body, Some(&control))?
        .ok_or_else(|| BridgeError::HandshakeRejected { step: "H2", reason: "missing value".into() })?;
    let hash_alg = HashAlg::parse(&getkey2.hash_alg).map_err(|e| BridgeError::HandshakeRejected {
        step: "H2",
        reason: e.to_string(),
    })?;
    let user_hash = crypto::calculate_hash(user, password, hash_alg, &getkey2.key, &getkey2.salt)?;

    // H3: exchange the hash for a JWT, wrapped in an AES-encrypted command.
    let nonce = random_hex(2);
    let token_command =
        format!("salt/{nonce}/jdev/sys/getjwt/{user_hash}/{user}/{PERMISSION_WEB}/{CLIENT_ID}/{CLIENT_NAME}");
    let encrypted = crypto::encrypt_command(&aes_key_hex, &aes_iv_hex, &token_command)?;
    socket.send_text(&format!("jdev/sys/enc/{encrypted}")).await?;
    let body = expect_identifier(socket, "H3", Identifier::Text).await?;
    let _: Option<serde_json::Value> = parse_envelope("H3", &body, None)?;

    // H4: fetch the structure document.
    socket.send_text("data/LoxAPP3.json").await?;
    let header = socket.recv_header().await?;
    if header.identifier != Identifier::File {
        return Err(BridgeError::HandshakeRejected {
            step: "H4",
            reason: format!("expected FILE, got {:?}", header.identifier),
        });
    }
    let structure_body = socket.recv_body().await?;
    let structure_json = loxone_core::frame::decode_text(&structure_body)?.to_string();

    // H5: subscribe to live value-state updates.
    socket.send_text("jdev/sps/enablebinstatusupdate").await?;
    let body = expect_identifier(socket, "H5", Identifier::Text).await?;
    let value: Option<String> = parse_envelope("H5", &body, Some("jdev/sps/enablebinstatusupdate"))?;
    if value.as_deref() != Some("1") {
        return Err(BridgeError::HandshakeRejected {
            step: "H5",
            reason: format!("unexpected subscription value {value:?}"),
        });
    }

    Ok(HandshakeOutcome { aes_key_hex, aes_iv_hex, structure_json })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope_body(control: &str, code: &str, value: &str) -> Vec<u8> {
        format!(r#"{{"LL":{{"control":"{control}","code":"{code}","value":{value}}}}}"#).into_bytes()
    }

    #[test]
    fn non_200_code_aborts_before_the_next_step() {
        // H2's getkey2 reply reporting a rejected login: perform() must
        // never reach H3's getjwt exchange when this happens.
        let body = envelope_body("jdev/sys/getkey2/alice", "401", r#""ignored""#);
        let result: Result<Option<serde_json::Value>> =
            parse_envelope("H2", &body, Some("jdev/sys/getkey2/alice"));
        assert!(matches!(result, Err(BridgeError::HandshakeRejected { step: "H2", .. })));
    }

    #[test]
    fn control_mismatch_aborts() {
        let body = envelope_body("jdev/sys/getkey2/alice", "200", r#""ignored""#);
        let result: Result<Option<serde_json::Value>> =
            parse_envelope("H2", &body, Some("jdev/sys/getkey2/bob"));
        assert!(matches!(result, Err(BridgeError::HandshakeRejected { step: "H2", .. })));
    }

    #[test]
    fn matching_200_envelope_yields_its_value() {
        let body = envelope_body("jdev/sps/enablebinstatusupdate", "200", r#""1""#);
        let value: Option<String> =
            parse_envelope("H5", &body, Some("jdev/sps/enablebinstatusupdate")).unwrap();
        assert_eq!(value.as_deref(), Some("1"));
    }

    #[test]
    fn unchecked_control_still_enforces_the_code() {
        // H1 and H3 pass `None` for expected_control since their reflected
        // control string embeds the whole encrypted payload, but a non-200
        // code must still abort.
        let body = envelope_body("jdev/sys/keyexchange/anything", "500", "null");
        let result: Result<Option<serde_json::Value>> = parse_envelope("H1", &body, None);
        assert!(result.is_err());
    }
}
