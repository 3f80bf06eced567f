/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::str::FromStr;
use std::sync::Arc;

use crate::metric::TxContext;
use crate::{
    Metric, MetricName, MetricRecord, MetricType, MetricValue, OpCode, RecordIdent, WireError,
};

mod reader;
pub(crate) use reader::FrameReader;

mod writer;
pub(crate) use writer::FrameWriter;

/// opcode(1) + byte order(1) + total size(4) + count(4)
pub const FRAME_HEADER_SIZE: usize = 10;

// lower bound of an encoded record, used to cap preallocation
const MIN_RECORD_SIZE: usize = 4 + 1 + 1 + 4 + 8 + 4 + 1;

const TOKEN_FLAG_NAME: u8 = 0;
const TOKEN_FLAG_TOKEN: u8 = 1;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(u8)]
pub enum ByteOrder {
    Little = 0,
    #[default]
    Big = 1,
}

impl ByteOrder {
    pub const fn native() -> Self {
        if cfg!(target_endian = "little") {
            ByteOrder::Little
        } else {
            ByteOrder::Big
        }
    }
}

impl TryFrom<u8> for ByteOrder {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ByteOrder::Little),
            1 => Ok(ByteOrder::Big),
            n => Err(WireError::InvalidByteOrder(n)),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FrameHeader {
    pub opcode: OpCode,
    pub order: ByteOrder,
    pub total_size: u32,
    pub count: u32,
}

impl FrameHeader {
    pub fn parse(data: &[u8]) -> Result<Self, WireError> {
        if data.len() < FRAME_HEADER_SIZE {
            return Err(WireError::MalformedFrame("truncated header"));
        }
        let (opcode, order) = parse_marker(data)?;
        let mut r = FrameReader::new(&data[2..FRAME_HEADER_SIZE], order);
        let total_size = r.u32()?;
        let count = r.u32()?;
        if (total_size as usize) < FRAME_HEADER_SIZE {
            return Err(WireError::MalformedFrame("declared length too small"));
        }
        Ok(FrameHeader {
            opcode,
            order,
            total_size,
            count,
        })
    }
}

fn parse_marker(data: &[u8]) -> Result<(OpCode, ByteOrder), WireError> {
    let opcode = OpCode::try_from(data[0])?;
    if !opcode.is_metric_frame() {
        return Err(WireError::UnexpectedOpcode(opcode));
    }
    let order = ByteOrder::try_from(data[1])?;
    Ok((opcode, order))
}

/// Length of the frame at the head of `data`, or `None` if it is not complete yet
pub(crate) fn peek_frame_len(data: &[u8]) -> Result<Option<usize>, WireError> {
    if data.len() < 6 {
        return Ok(None);
    }
    let (_, order) = parse_marker(data)?;
    let total = FrameReader::new(&data[2..6], order).u32()? as usize;
    if total < FRAME_HEADER_SIZE {
        return Err(WireError::MalformedFrame("declared length too small"));
    }
    if data.len() < total {
        Ok(None)
    } else {
        Ok(Some(total))
    }
}

pub fn opcode_of(data: &[u8]) -> Result<OpCode, WireError> {
    let Some(b) = data.first() else {
        return Err(WireError::MalformedFrame("empty data"));
    };
    OpCode::try_from(*b)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetricFrame {
    pub header: FrameHeader,
    pub records: Vec<MetricRecord>,
}

pub fn encode(opcode: OpCode, order: ByteOrder, records: &[MetricRecord]) -> Vec<u8> {
    let mut w = FrameWriter::with_capacity(FRAME_HEADER_SIZE + records.len() * 64, order);
    w.put_u8(opcode as u8);
    w.put_u8(order as u8);
    w.put_u32(0);
    w.put_u32(records.len() as u32);
    for record in records {
        encode_record(&mut w, record);
    }
    let total = w.len() as u32;
    w.set_u32(2, total);
    w.into_vec()
}

pub fn encode_metrics(opcode: OpCode, order: ByteOrder, metrics: &[Metric]) -> Vec<u8> {
    let records: Vec<MetricRecord> = metrics.iter().map(|m| m.to_record()).collect();
    encode(opcode, order, &records)
}

fn encode_record(w: &mut FrameWriter, record: &MetricRecord) {
    let size_offset = w.len();
    w.put_u32(0);
    let start = w.len();

    w.put_u8(record.metric_type as u8);
    match &record.ident {
        RecordIdent::Token(token) => {
            w.put_u8(TOKEN_FLAG_TOKEN);
            w.put_i64(*token);
        }
        RecordIdent::Name(name) => {
            w.put_u8(TOKEN_FLAG_NAME);
            w.put_len_bytes(name.fqn().as_bytes());
        }
    }
    w.put_i64(record.timestamp);
    match &record.value {
        MetricValue::Long(v) => w.put_i64(*v),
        MetricValue::Text(s) => w.put_len_bytes(s.as_bytes()),
        MetricValue::Bytes(b) => w.put_len_bytes(b),
    }
    match &record.tx {
        Some(tx) => {
            w.put_u8(1);
            w.put_i64(tx.tx_id);
            w.put_i32(tx.qualifier);
            w.put_i32(tx.thread_id);
        }
        None => w.put_u8(0),
    }

    let size = (w.len() - start) as u32;
    w.set_u32(size_offset, size);
}

pub fn decode(data: &[u8]) -> Result<MetricFrame, WireError> {
    let header = FrameHeader::parse(data)?;
    let total = header.total_size as usize;
    if data.len() < total {
        return Err(WireError::MalformedFrame(
            "frame shorter than declared length",
        ));
    }

    let mut r = FrameReader::new(&data[FRAME_HEADER_SIZE..total], header.order);
    let max_count = r.remaining() / MIN_RECORD_SIZE;
    let mut records = Vec::with_capacity((header.count as usize).min(max_count));
    for _ in 0..header.count {
        let size = r.u32()? as usize;
        let body = r.take(size)?;
        let record = decode_record(body, header.order)?;
        records.push(record);
    }
    if r.remaining() > 0 {
        return Err(WireError::MalformedFrame("declared length mismatch"));
    }

    Ok(MetricFrame { header, records })
}

fn decode_record(body: &[u8], order: ByteOrder) -> Result<MetricRecord, WireError> {
    let mut r = FrameReader::new(body, order);
    let metric_type = MetricType::try_from(r.u8()?)?;
    let ident = match r.u8()? {
        TOKEN_FLAG_TOKEN => RecordIdent::Token(r.i64()?),
        TOKEN_FLAG_NAME => {
            let fqn = r.len_string()?;
            RecordIdent::Name(Arc::new(MetricName::from_str(&fqn)?))
        }
        _ => return Err(WireError::MalformedFrame("invalid token flag")),
    };
    let timestamp = r.i64()?;
    let value = match metric_type {
        MetricType::LongCounter
        | MetricType::LongGauge
        | MetricType::DeltaCounter
        | MetricType::DeltaGauge => MetricValue::Long(r.i64()?),
        MetricType::Error | MetricType::String => MetricValue::Text(r.len_string()?),
        MetricType::Blob | MetricType::Pdu => MetricValue::Bytes(r.len_bytes()?.to_vec()),
    };
    let tx = match r.u8()? {
        0 => None,
        1 => Some(TxContext {
            tx_id: r.i64()?,
            qualifier: r.i32()?,
            thread_id: r.i32()?,
        }),
        _ => return Err(WireError::MalformedFrame("invalid tx flag")),
    };
    if r.remaining() > 0 {
        return Err(WireError::MalformedFrame("record size mismatch"));
    }

    Ok(MetricRecord {
        ident,
        metric_type,
        timestamp,
        value,
        tx,
    })
}
