//! Header exchange request-response protocol.
//!
//! Messages are protobuf encoded and snappy framed; one request and one
//! response per stream.

use std::io;
use std::io::{Read, Write};
use std::time::Duration;

use async_trait::async_trait;
use containers::{Hash, SignedHeader};
use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use libp2p::request_response::{
    Behaviour as RequestResponse, Codec, Config, Event, ProtocolSupport,
};
use prost::Message;
use snap::read::FrameDecoder;
use snap::write::FrameEncoder;

/// Most headers a single range request may ask for.
pub const MAX_REQUEST_HEADERS: u64 = 512;

/// Upper bound on an encoded request or response.
pub const MAX_MESSAGE_SIZE: u64 = 16 << 20;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub const HEADER_EX_VERSION: &str = "v0.0.3";

pub fn header_ex_protocol(network: &str) -> String {
    format!("/{network}/header-ex/{HEADER_EX_VERSION}")
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HeaderExProtocol(pub String);

impl AsRef<str> for HeaderExProtocol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderRequest {
    Head,
    ByHash(Hash),
    /// `amount` consecutive headers starting at height `from`.
    Range { from: u64, amount: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderResponse {
    Headers(Vec<SignedHeader>),
    NotFound,
    Invalid,
}

#[derive(Clone, PartialEq, Message)]
struct HeaderRequestMessage {
    #[prost(bytes = "vec", tag = "1")]
    hash: Vec<u8>,
    #[prost(uint64, tag = "2")]
    origin: u64,
    #[prost(uint64, tag = "3")]
    amount: u64,
}

const STATUS_OK: u32 = 0;
const STATUS_NOT_FOUND: u32 = 1;
const STATUS_INVALID: u32 = 2;

#[derive(Clone, PartialEq, Message)]
struct HeaderResponseMessage {
    #[prost(message, repeated, tag = "1")]
    headers: Vec<SignedHeader>,
    #[prost(uint32, tag = "2")]
    status: u32,
}

fn invalid_data(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

#[derive(Clone, Default)]
pub struct HeaderExCodec;

impl HeaderExCodec {
    fn compress(data: &[u8]) -> io::Result<Vec<u8>> {
        let mut encoder = FrameEncoder::new(Vec::new());
        encoder.write_all(data)?;
        encoder
            .into_inner()
            .map_err(|e| io::Error::other(format!("snappy framing failed: {e}")))
    }

    fn decompress(data: &[u8]) -> io::Result<Vec<u8>> {
        let mut decoder = FrameDecoder::new(data).take(MAX_MESSAGE_SIZE);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;
        Ok(decompressed)
    }

    pub fn encode_request(request: &HeaderRequest) -> io::Result<Vec<u8>> {
        let message = match request {
            HeaderRequest::Head => HeaderRequestMessage {
                hash: Vec::new(),
                origin: 0,
                amount: 1,
            },
            HeaderRequest::ByHash(hash) => HeaderRequestMessage {
                hash: hash.to_vec(),
                origin: 0,
                amount: 1,
            },
            HeaderRequest::Range { from, amount } => HeaderRequestMessage {
                hash: Vec::new(),
                origin: *from,
                amount: *amount,
            },
        };
        Self::compress(&message.encode_to_vec())
    }

    pub fn decode_request(data: &[u8]) -> io::Result<HeaderRequest> {
        let bytes = Self::decompress(data)?;
        let message = HeaderRequestMessage::decode(bytes.as_slice())
            .map_err(|e| invalid_data(format!("header request decode failed: {e}")))?;

        if !message.hash.is_empty() {
            let hash = Hash::try_from(message.hash.as_slice())
                .map_err(|e| invalid_data(format!("bad hash in header request: {e}")))?;
            return Ok(HeaderRequest::ByHash(hash));
        }
        if message.origin == 0 {
            return Ok(HeaderRequest::Head);
        }
        if message.amount == 0 || message.amount > MAX_REQUEST_HEADERS {
            return Err(invalid_data(format!(
                "header range amount {} outside 1..={MAX_REQUEST_HEADERS}",
                message.amount
            )));
        }
        Ok(HeaderRequest::Range {
            from: message.origin,
            amount: message.amount,
        })
    }

    pub fn encode_response(response: &HeaderResponse) -> io::Result<Vec<u8>> {
        let message = match response {
            HeaderResponse::Headers(headers) => HeaderResponseMessage {
                headers: headers.clone(),
                status: STATUS_OK,
            },
            HeaderResponse::NotFound => HeaderResponseMessage {
                headers: Vec::new(),
                status: STATUS_NOT_FOUND,
            },
            HeaderResponse::Invalid => HeaderResponseMessage {
                headers: Vec::new(),
                status: STATUS_INVALID,
            },
        };
        Self::compress(&message.encode_to_vec())
    }

    pub fn decode_response(data: &[u8]) -> io::Result<HeaderResponse> {
        let bytes = Self::decompress(data)?;
        let message = HeaderResponseMessage::decode(bytes.as_slice())
            .map_err(|e| invalid_data(format!("header response decode failed: {e}")))?;

        match message.status {
            STATUS_OK => Ok(HeaderResponse::Headers(message.headers)),
            STATUS_NOT_FOUND => Ok(HeaderResponse::NotFound),
            STATUS_INVALID => Ok(HeaderResponse::Invalid),
            other => Err(invalid_data(format!("unknown header response status {other}"))),
        }
    }
}

async fn read_limited<T>(io: &mut T) -> io::Result<Vec<u8>>
where
    T: AsyncRead + Unpin + Send,
{
    let mut data = Vec::new();
    io.take(MAX_MESSAGE_SIZE).read_to_end(&mut data).await?;
    Ok(data)
}

#[async_trait]
impl Codec for HeaderExCodec {
    type Protocol = HeaderExProtocol;
    type Request = HeaderRequest;
    type Response = HeaderResponse;

    async fn read_request<T>(
        &mut self,
        _protocol: &Self::Protocol,
        io: &mut T,
    ) -> io::Result<Self::Request>
    where
        T: AsyncRead + Unpin + Send,
    {
        let data = read_limited(io).await?;
        Self::decode_request(&data)
    }

    async fn read_response<T>(
        &mut self,
        _protocol: &Self::Protocol,
        io: &mut T,
    ) -> io::Result<Self::Response>
    where
        T: AsyncRead + Unpin + Send,
    {
        let data = read_limited(io).await?;
        Self::decode_response(&data)
    }

    async fn write_request<T>(
        &mut self,
        _protocol: &Self::Protocol,
        io: &mut T,
        request: Self::Request,
    ) -> io::Result<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        let data = Self::encode_request(&request)?;
        io.write_all(&data).await?;
        io.close().await
    }

    async fn write_response<T>(
        &mut self,
        _protocol: &Self::Protocol,
        io: &mut T,
        response: Self::Response,
    ) -> io::Result<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        let data = Self::encode_response(&response)?;
        io.write_all(&data).await?;
        io.close().await
    }
}

pub type ReqResp = RequestResponse<HeaderExCodec>;

pub type ReqRespMessage = Event<HeaderRequest, HeaderResponse>;

pub fn build(network: &str) -> ReqResp {
    let protocols = [(
        HeaderExProtocol(header_ex_protocol(network)),
        ProtocolSupport::Full,
    )];
    RequestResponse::with_codec(
        HeaderExCodec,
        protocols,
        Config::default().with_request_timeout(REQUEST_TIMEOUT),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use containers::testing::{TEST_CHAIN_ID, TestProposer};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case::head(HeaderRequest::Head)]
    #[case::by_hash(HeaderRequest::ByHash(Hash::digest(b"header")))]
    #[case::range(HeaderRequest::Range { from: 10, amount: 64 })]
    fn request_survives_the_wire(#[case] request: HeaderRequest) {
        let bytes = HeaderExCodec::encode_request(&request).unwrap();
        assert_eq!(HeaderExCodec::decode_request(&bytes).unwrap(), request);
    }

    #[test]
    fn rejects_oversized_range() {
        let bytes = HeaderExCodec::encode_request(&HeaderRequest::Range {
            from: 1,
            amount: MAX_REQUEST_HEADERS + 1,
        })
        .unwrap();
        assert_eq!(
            HeaderExCodec::decode_request(&bytes).unwrap_err().kind(),
            io::ErrorKind::InvalidData
        );
    }

    #[test]
    fn response_carries_headers_and_status() {
        let headers = TestProposer::new(1).chain(TEST_CHAIN_ID, 1, 3);
        let bytes = HeaderExCodec::encode_response(&HeaderResponse::Headers(headers.clone())).unwrap();
        assert_eq!(
            HeaderExCodec::decode_response(&bytes).unwrap(),
            HeaderResponse::Headers(headers)
        );

        let bytes = HeaderExCodec::encode_response(&HeaderResponse::NotFound).unwrap();
        assert_eq!(HeaderExCodec::decode_response(&bytes).unwrap(), HeaderResponse::NotFound);
    }

    #[test]
    fn protocol_is_scoped_by_network() {
        assert_eq!(header_ex_protocol("rollup-1"), "/rollup-1/header-ex/v0.0.3");
    }
}
