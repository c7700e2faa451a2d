use libp2p::gossipsub::{DataTransform, Message, RawMessage, TopicHash};
use snap::raw::{Decoder, Encoder, decompress_len};
use std::io;

/// Upper bound on a decompressed gossip payload.
pub const MAX_GOSSIP_SIZE: usize = 1 << 20;

/// Raw snappy compression of gossip payloads.
#[derive(Debug, Default, Clone, Copy)]
pub struct Compressor;

impl DataTransform for Compressor {
    fn inbound_transform(&self, raw_message: RawMessage) -> Result<Message, io::Error> {
        let len = decompress_len(&raw_message.data)?;
        if len > MAX_GOSSIP_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("gossip payload of {len} bytes exceeds {MAX_GOSSIP_SIZE}"),
            ));
        }

        let data = Decoder::new().decompress_vec(&raw_message.data)?;

        Ok(Message {
            topic: raw_message.topic,
            data,
            sequence_number: raw_message.sequence_number,
            source: raw_message.source,
        })
    }

    fn outbound_transform(&self, _topic: &TopicHash, data: Vec<u8>) -> Result<Vec<u8>, io::Error> {
        Ok(Encoder::new().compress_vec(&data)?)
    }
}
