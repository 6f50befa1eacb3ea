// Copyright ⓒ 2025 Peter Morgan <peter.james.morgan@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Record batches (magic 2), as returned in a fetch response

use std::io::{Read as _, Write as _};

use bytes::{Buf as _, BufMut as _, Bytes, BytesMut};
use crc::{CRC_32_ISCSI, Crc};
use flate2::{read::GzDecoder, write::GzEncoder};
use tracing::{debug, error};

use crate::{
    Decode as _, Encode as _, Error, Result,
    primitive::{VarInt, VarLong, decode_varint_bytes, encode_varint_bytes},
    split,
};

pub const MAGIC: i8 = 2;

/// base offset and batch length
const LOG_OVERHEAD: usize = 12;

const CASTAGNOLI: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

const COMPRESSION_MASK: i16 = 0b111;
const TIMESTAMP_LOG_APPEND_TIME: i16 = 0b1000;
const TRANSACTIONAL: i16 = 0b1_0000;
const CONTROL: i16 = 0b10_0000;

const XERIAL_MAGIC: &[u8] = b"\x82SNAPPY\0";

/// magic, version and compatible version
const XERIAL_HEADER: usize = 16;

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Snappy,
    Lz4,
    Zstd,
}

impl TryFrom<i16> for Compression {
    type Error = Error;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value & COMPRESSION_MASK {
            0 => Ok(Self::None),
            1 => Ok(Self::Gzip),
            2 => Ok(Self::Snappy),
            3 => Ok(Self::Lz4),
            4 => Ok(Self::Zstd),
            otherwise => Err(Error::UnknownCompressionType(otherwise)),
        }
    }
}

impl From<Compression> for i16 {
    fn from(value: Compression) -> Self {
        match value {
            Compression::None => 0,
            Compression::Gzip => 1,
            Compression::Snappy => 2,
            Compression::Lz4 => 3,
            Compression::Zstd => 4,
        }
    }
}

impl Compression {
    fn inflate(&self, deflated: Bytes) -> Result<Bytes> {
        let mut inflated = Vec::new();

        match self {
            Self::None => return Ok(deflated),

            Self::Gzip => _ = GzDecoder::new(&deflated[..]).read_to_end(&mut inflated)?,

            Self::Snappy if deflated.starts_with(XERIAL_MAGIC) => {
                let mut blocks = deflated.slice(XERIAL_HEADER.min(deflated.len())..);

                while blocks.has_remaining() {
                    let length = i32::decode(&mut blocks).and_then(|length| {
                        usize::try_from(length).map_err(Into::into)
                    })?;

                    let block = split(&mut blocks, length)?;

                    inflated.extend(
                        snap::raw::Decoder::new()
                            .decompress_vec(&block[..])
                            .inspect_err(|err| error!(?err))?,
                    );
                }
            }

            Self::Snappy => {
                inflated = snap::raw::Decoder::new()
                    .decompress_vec(&deflated[..])
                    .inspect_err(|err| error!(?err))?
            }

            Self::Lz4 => _ = lz4::Decoder::new(&deflated[..])?.read_to_end(&mut inflated)?,

            Self::Zstd => inflated = zstd::stream::decode_all(&deflated[..])?,
        }

        Ok(Bytes::from(inflated))
    }

    fn deflate(&self, inflated: Bytes) -> Result<Bytes> {
        match self {
            Self::None => Ok(inflated),

            Self::Gzip => {
                let mut gz = GzEncoder::new(Vec::new(), flate2::Compression::default());
                gz.write_all(&inflated[..])?;
                gz.finish().map(Bytes::from).map_err(Into::into)
            }

            Self::Snappy => snap::raw::Encoder::new()
                .compress_vec(&inflated[..])
                .map(Bytes::from)
                .map_err(Into::into),

            Self::Lz4 => {
                let mut lz4 = lz4::EncoderBuilder::new().build(Vec::new())?;
                lz4.write_all(&inflated[..])?;

                let (deflated, result) = lz4.finish();
                result.map(|()| Bytes::from(deflated)).map_err(Into::into)
            }

            Self::Zstd => zstd::stream::encode_all(&inflated[..], 0)
                .map(Bytes::from)
                .map_err(Into::into),
        }
    }
}

#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Header {
    pub key: Bytes,
    pub value: Option<Bytes>,
}

/// A record with an absolute offset and timestamp
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Record {
    pub offset: i64,
    pub timestamp: i64,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
    pub headers: Vec<Header>,
}

impl Record {
    pub fn new(offset: i64) -> Self {
        Self {
            offset,
            ..Default::default()
        }
    }

    pub fn timestamp(self, timestamp: i64) -> Self {
        Self { timestamp, ..self }
    }

    pub fn key(self, key: Option<Bytes>) -> Self {
        Self { key, ..self }
    }

    pub fn value(self, value: Option<Bytes>) -> Self {
        Self { value, ..self }
    }

    pub fn header(mut self, header: Header) -> Self {
        self.headers.push(header);
        self
    }

    fn decode(encoded: &mut Bytes, batch: &Batch) -> Result<Self> {
        let length = VarInt::decode(encoded)
            .and_then(|length| usize::try_from(length.0).map_err(Into::into))?;

        let mut encoded = split(encoded, length)?;

        let _attributes = i8::decode(&mut encoded)?;
        let timestamp_delta = VarLong::decode(&mut encoded)?.0;
        let offset_delta = VarInt::decode(&mut encoded)?.0;
        let key = decode_varint_bytes(&mut encoded)?;
        let value = decode_varint_bytes(&mut encoded)?;

        let headers = (0..VarInt::decode(&mut encoded)?.0)
            .map(|_| {
                decode_varint_bytes(&mut encoded)
                    .and_then(|key| key.ok_or(Error::NullValue("header key")))
                    .and_then(|key| {
                        decode_varint_bytes(&mut encoded).map(|value| Header { key, value })
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let timestamp = if batch.attributes & TIMESTAMP_LOG_APPEND_TIME == 0 {
            batch
                .base_timestamp
                .checked_add(timestamp_delta)
                .ok_or(Error::Overflow("timestamp"))?
        } else {
            batch.max_timestamp
        };

        let offset = batch
            .base_offset
            .checked_add(i64::from(offset_delta))
            .ok_or(Error::Overflow("offset"))?;

        Ok(Self {
            offset,
            timestamp,
            key,
            value,
            headers,
        })
    }

    fn encode(&self, batch: &Batch, encoded: &mut BytesMut) -> Result<()> {
        let mut record = BytesMut::new();

        0i8.encode(&mut record)?;
        VarLong(self.timestamp - batch.base_timestamp).encode(&mut record)?;
        i32::try_from(self.offset - batch.base_offset)
            .map_err(Error::from)
            .and_then(|offset_delta| VarInt(offset_delta).encode(&mut record))?;
        encode_varint_bytes(self.key.as_ref(), &mut record)?;
        encode_varint_bytes(self.value.as_ref(), &mut record)?;

        i32::try_from(self.headers.len())
            .map_err(Error::from)
            .and_then(|count| VarInt(count).encode(&mut record))?;

        for header in &self.headers {
            encode_varint_bytes(Some(&header.key), &mut record)?;
            encode_varint_bytes(header.value.as_ref(), &mut record)?;
        }

        i32::try_from(record.len())
            .map_err(Error::from)
            .and_then(|length| VarInt(length).encode(encoded))?;

        encoded.put_slice(&record[..]);
        Ok(())
    }
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Batch {
    pub base_offset: i64,
    pub partition_leader_epoch: i32,
    pub attributes: i16,
    pub last_offset_delta: i32,
    pub base_timestamp: i64,
    pub max_timestamp: i64,
    pub producer_id: i64,
    pub producer_epoch: i16,
    pub base_sequence: i32,
    pub records: Vec<Record>,
}

impl Default for Batch {
    fn default() -> Self {
        Self {
            base_offset: 0,
            partition_leader_epoch: -1,
            attributes: 0,
            last_offset_delta: 0,
            base_timestamp: 0,
            max_timestamp: 0,
            producer_id: -1,
            producer_epoch: -1,
            base_sequence: -1,
            records: vec![],
        }
    }
}

impl Batch {
    /// A batch containing these records, which must be in offset order
    pub fn with_records(records: Vec<Record>) -> Result<Self> {
        let base_offset = records.first().map_or(0, |record| record.offset);
        let last_offset = records.last().map_or(base_offset, |record| record.offset);

        Ok(Self {
            base_offset,
            last_offset_delta: i32::try_from(last_offset - base_offset)?,
            base_timestamp: records
                .iter()
                .map(|record| record.timestamp)
                .min()
                .unwrap_or_default(),
            max_timestamp: records
                .iter()
                .map(|record| record.timestamp)
                .max()
                .unwrap_or_default(),
            records,
            ..Default::default()
        })
    }

    pub fn compression(self, compression: Compression) -> Self {
        Self {
            attributes: (self.attributes & !COMPRESSION_MASK) | i16::from(compression),
            ..self
        }
    }

    pub fn compression_type(&self) -> Result<Compression> {
        Compression::try_from(self.attributes)
    }

    pub fn is_control(&self) -> bool {
        self.attributes & CONTROL == CONTROL
    }

    pub fn is_transactional(&self) -> bool {
        self.attributes & TRANSACTIONAL == TRANSACTIONAL
    }

    /// The offset of the last record in this batch, including any records
    /// removed by compaction
    pub fn last_offset(&self) -> i64 {
        self.base_offset
            .saturating_add(i64::from(self.last_offset_delta))
    }

    /// Decode all complete batches, a partial trailing batch is ignored
    pub fn decode_all(mut encoded: Bytes) -> Result<Vec<Self>> {
        let mut batches = vec![];

        while encoded.remaining() >= LOG_OVERHEAD {
            let batch_length = i32::from_be_bytes([encoded[8], encoded[9], encoded[10], encoded[11]]);
            let size = usize::try_from(batch_length).map(|length| length + LOG_OVERHEAD)?;

            if encoded.remaining() < size {
                debug!(size, remaining = encoded.remaining(), "partial batch");
                break;
            }

            batches.push(Self::decode(encoded.split_to(size))?);
        }

        Ok(batches)
    }

    fn decode(mut encoded: Bytes) -> Result<Self> {
        let base_offset = i64::decode(&mut encoded)?;
        let _batch_length = i32::decode(&mut encoded)?;
        let partition_leader_epoch = i32::decode(&mut encoded)?;

        let magic = i8::decode(&mut encoded)?;
        if magic != MAGIC {
            return Err(Error::UnsupportedMagic(magic));
        }

        let expected = encoded.try_get_u32()?;
        let computed = CASTAGNOLI.checksum(&encoded[..]);
        if expected != computed {
            return Err(Error::Crc { expected, computed });
        }

        let mut batch = Self {
            base_offset,
            partition_leader_epoch,
            attributes: i16::decode(&mut encoded)?,
            last_offset_delta: i32::decode(&mut encoded)?,
            base_timestamp: i64::decode(&mut encoded)?,
            max_timestamp: i64::decode(&mut encoded)?,
            producer_id: i64::decode(&mut encoded)?,
            producer_epoch: i16::decode(&mut encoded)?,
            base_sequence: i32::decode(&mut encoded)?,
            records: vec![],
        };

        if batch
            .base_offset
            .checked_add(i64::from(batch.last_offset_delta))
            .is_none()
        {
            return Err(Error::Overflow("last offset"));
        }

        let count = i32::decode(&mut encoded)?;

        if batch.is_control() {
            debug!(base_offset, count, "control batch");
            return Ok(batch);
        }

        let mut inflated = batch.compression_type()?.inflate(encoded)?;

        batch.records = (0..count)
            .map(|_| Record::decode(&mut inflated, &batch))
            .collect::<Result<Vec<_>>>()?;

        Ok(batch)
    }

    /// Encode this batch, compressing the records and computing the CRC
    pub fn encode(&self) -> Result<Bytes> {
        let records = {
            let mut records = BytesMut::new();

            for record in &self.records {
                record.encode(self, &mut records)?;
            }

            self.compression_type()?.deflate(records.freeze())?
        };

        let mut crc_covered = BytesMut::new();
        self.attributes.encode(&mut crc_covered)?;
        self.last_offset_delta.encode(&mut crc_covered)?;
        self.base_timestamp.encode(&mut crc_covered)?;
        self.max_timestamp.encode(&mut crc_covered)?;
        self.producer_id.encode(&mut crc_covered)?;
        self.producer_epoch.encode(&mut crc_covered)?;
        self.base_sequence.encode(&mut crc_covered)?;
        i32::try_from(self.records.len())
            .map_err(Error::from)
            .and_then(|count| count.encode(&mut crc_covered))?;
        crc_covered.put_slice(&records[..]);

        let mut encoded = BytesMut::new();
        self.base_offset.encode(&mut encoded)?;

        // partition leader epoch, magic and crc precede the crc covered section
        i32::try_from(4 + 1 + 4 + crc_covered.len())
            .map_err(Error::from)
            .and_then(|batch_length| batch_length.encode(&mut encoded))?;

        self.partition_leader_epoch.encode(&mut encoded)?;
        MAGIC.encode(&mut encoded)?;
        encoded.put_u32(CASTAGNOLI.checksum(&crc_covered[..]));
        encoded.put_slice(&crc_covered[..]);

        Ok(encoded.freeze())
    }
}

#[cfg(test)]
mod tests {
    use bytes::BufMut as _;
    use pretty_assertions::assert_eq;

    use super::*;

    fn records() -> Vec<Record> {
        vec![
            Record::new(10)
                .timestamp(1_700_000_000_000)
                .key(Some(Bytes::from_static(b"k0")))
                .value(Some(Bytes::from_static(b"v0"))),
            Record::new(11)
                .timestamp(1_700_000_000_005)
                .value(Some(Bytes::from_static(b"v1")))
                .header(Header {
                    key: Bytes::from_static(b"h"),
                    value: None,
                }),
            Record::new(12).timestamp(1_700_000_000_003),
        ]
    }

    #[test]
    fn uncompressed() -> Result<()> {
        let batch = Batch::with_records(records())?;
        assert_eq!(10, batch.base_offset);
        assert_eq!(12, batch.last_offset());
        assert_eq!(1_700_000_000_000, batch.base_timestamp);
        assert_eq!(1_700_000_000_005, batch.max_timestamp);

        let decoded = Batch::decode_all(batch.encode()?)?;
        assert_eq!(vec![batch], decoded);
        Ok(())
    }

    #[test]
    fn gzip_then_zstd_in_one_frame() -> Result<()> {
        let gzip = Batch::with_records(records())?.compression(Compression::Gzip);
        let zstd = Batch::with_records(vec![Record::new(13).value(Some(Bytes::from_static(b"v")))])?
            .compression(Compression::Zstd);

        let mut frame = BytesMut::new();
        frame.put(gzip.encode()?);
        frame.put(zstd.encode()?);

        let decoded = Batch::decode_all(frame.freeze())?;
        assert_eq!(2, decoded.len());
        assert_eq!(Compression::Gzip, decoded[0].compression_type()?);
        assert_eq!(records(), decoded[0].records);
        assert_eq!(13, decoded[1].records[0].offset);
        Ok(())
    }

    #[test]
    fn partial_trailing_batch_is_ignored() -> Result<()> {
        let first = Batch::with_records(records())?.encode()?;
        let second = Batch::with_records(vec![Record::new(13)])?.encode()?;

        let mut frame = BytesMut::new();
        frame.put(first);
        frame.put(second.slice(..second.len() - 3));

        let decoded = Batch::decode_all(frame.freeze())?;
        assert_eq!(1, decoded.len());
        assert_eq!(12, decoded[0].last_offset());
        Ok(())
    }

    #[test]
    fn crc_mismatch() -> Result<()> {
        let mut encoded = BytesMut::from(&Batch::with_records(records())?.encode()?[..]);
        let last = encoded.len() - 1;
        encoded[last] ^= 0xff;

        assert!(matches!(
            Batch::decode_all(encoded.freeze()),
            Err(Error::Crc { .. })
        ));
        Ok(())
    }

    #[test]
    fn base_offset_overflow() -> Result<()> {
        let mut encoded = BytesMut::from(&Batch::with_records(records())?.encode()?[..]);

        // the base offset is outside the crc
        encoded[..8].copy_from_slice(&i64::MAX.to_be_bytes());

        assert!(matches!(
            Batch::decode_all(encoded.freeze()),
            Err(Error::Overflow(_))
        ));
        Ok(())
    }

    #[test]
    fn control_batch_has_no_records() -> Result<()> {
        let mut batch = Batch::with_records(vec![Record::new(5).key(Some(Bytes::from_static(
            &[0, 0, 0, 0],
        )))])?;
        batch.attributes |= CONTROL | TRANSACTIONAL;

        let decoded = Batch::decode_all(batch.encode()?)?;
        assert!(decoded[0].is_control());
        assert!(decoded[0].is_transactional());
        assert!(decoded[0].records.is_empty());
        assert_eq!(5, decoded[0].last_offset());
        Ok(())
    }

    #[test]
    fn log_append_time() -> Result<()> {
        let mut batch = Batch::with_records(records())?;
        batch.attributes |= TIMESTAMP_LOG_APPEND_TIME;
        batch.max_timestamp = 1_800_000_000_000;

        let decoded = Batch::decode_all(batch.encode()?)?;
        assert!(
            decoded[0]
                .records
                .iter()
                .all(|record| record.timestamp == 1_800_000_000_000)
        );
        Ok(())
    }
}
