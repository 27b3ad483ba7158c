//! The WebSocket half-socket: connects to `ws[s]://<host>/ws/rfc6455` and
//! exposes message-at-a-time send/recv so [`loxone_core::frame`] can decode
//! without ever touching the socket itself.
//!
//! `Socket` drives the sequential handshake; once the connection is live,
//! [`Socket::split`] hands the supervisor a sink/stream pair so the
//! keepalive and ingest tasks can write and read concurrently without a
//! write lock (the transport's own framing already serializes writes).

use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};

use loxone_core::frame::{self, Header, ParsedHeader};

use crate::error::{BridgeError, Result};

type RawStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct Socket {
    stream: RawStream,
}

/// Accepts any certificate. Only used when the operator has explicitly set
/// `insecure_skip_verify`, for controllers that present a self-signed
/// certificate on the LAN.
#[derive(Debug)]
struct AcceptAnyCertificate;

impl rustls::client::danger::ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

fn insecure_connector() -> Connector {
    let mut config = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate))
        .with_no_client_auth();
    config.alpn_protocols.clear();
    Connector::Rustls(Arc::new(config))
}

async fn recv_raw(stream: &mut (impl StreamExt<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin)) -> Result<Vec<u8>> {
    match stream.next().await {
        Some(Ok(Message::Binary(bytes))) => Ok(bytes),
        Some(Ok(Message::Text(text))) => Ok(text.into_bytes()),
        Some(Ok(Message::Close(frame))) => {
            let code = frame.map(|f| u16::from(f.code)).unwrap_or(1006);
            tracing::debug!(code, "server closed socket");
            Err(BridgeError::SocketClosed { code })
        }
        Some(Ok(_)) => Box::pin(recv_raw(stream)).await,
        Some(Err(e)) => Err(BridgeError::WebSocket(e)),
        None => Err(BridgeError::SocketClosed { code: 1006 }),
    }
}

async fn recv_header(stream: &mut (impl StreamExt<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin)) -> Result<Header> {
    loop {
        let message = recv_raw(stream).await?;
        match frame::parse_header(&message)? {
            ParsedHeader::Estimation => continue,
            ParsedHeader::Header(header) => return Ok(header),
        }
    }
}

impl Socket {
    pub async fn connect(ws_url: &str, insecure_skip_verify: bool) -> Result<Self> {
        let connector = insecure_skip_verify.then(insecure_connector);
        let (stream, _response) =
            tokio_tungstenite::connect_async_tls_with_config(ws_url, None, false, connector)
                .await?;
        Ok(Socket { stream })
    }

    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        self.stream.send(Message::Text(text.to_string())).await?;
        Ok(())
    }

    pub async fn recv_header(&mut self) -> Result<Header> {
        recv_header(&mut self.stream).await
    }

    pub async fn recv_body(&mut self) -> Result<Vec<u8>> {
        recv_raw(&mut self.stream).await
    }

    /// Split the live socket into independent read/write halves for the
    /// ingest and keepalive tasks.
    pub fn split(self) -> (Reader, Writer) {
        let (sink, stream) = self.stream.split();
        (Reader { stream }, Writer { sink })
    }
}

pub struct Reader {
    stream: SplitStream<RawStream>,
}

impl Reader {
    pub async fn recv_header(&mut self) -> Result<Header> {
        recv_header(&mut self.stream).await
    }

    pub async fn recv_body(&mut self) -> Result<Vec<u8>> {
        recv_raw(&mut self.stream).await
    }
}

pub struct Writer {
    sink: SplitSink<RawStream, Message>,
}

impl Writer {
    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        self.sink.send(Message::Text(text.to_string())).await?;
        Ok(())
    }

    pub async fn send_keepalive(&mut self) -> Result<()> {
        self.send_text(frame::KEEPALIVE_MESSAGE).await
    }
}

#[cfg(test)]
mod tests {
    use futures_util::stream;
    use tokio_tungstenite::tungstenite::protocol::{CloseFrame, frame::coding::CloseCode};

    use super::*;

    fn ok(message: Message) -> std::result::Result<Message, tokio_tungstenite::tungstenite::Error> {
        Ok(message)
    }

    #[tokio::test]
    async fn clean_close_reports_code_1000() {
        let mut messages = stream::iter(vec![ok(Message::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "bye".into(),
        })))]);
        let error = recv_raw(&mut messages).await.unwrap_err();
        assert!(matches!(error, BridgeError::SocketClosed { code: 1000 }));
        assert!(error.is_clean_close());
    }

    #[tokio::test]
    async fn abnormal_close_reports_its_own_code() {
        let mut messages = stream::iter(vec![ok(Message::Close(Some(CloseFrame {
            code: CloseCode::Away,
            reason: "restarting".into(),
        })))]);
        let error = recv_raw(&mut messages).await.unwrap_err();
        assert!(matches!(error, BridgeError::SocketClosed { code: 1001 }));
        assert!(!error.is_clean_close());
    }

    #[tokio::test]
    async fn stream_end_without_a_close_frame_is_not_a_clean_close() {
        let mut messages = stream::iter(Vec::<std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>::new());
        let error = recv_raw(&mut messages).await.unwrap_err();
        assert!(matches!(error, BridgeError::SocketClosed { code: 1006 }));
        assert!(!error.is_clean_close());
    }

    #[tokio::test]
    async fn ping_frames_are_skipped_and_the_next_real_message_is_returned() {
        let mut messages = stream::iter(vec![ok(Message::Ping(Vec::new())), ok(Message::Binary(vec![1, 2, 3]))]);
        let body = recv_raw(&mut messages).await.unwrap();
        assert_eq!(body, vec![1, 2, 3]);
    }
}
