/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::str::FromStr;
use std::sync::Arc;

use hex_literal::hex;

use g3_apm_proto::codec::{self, FRAME_HEADER_SIZE};
use g3_apm_proto::metric::TxContext;
use g3_apm_proto::{
    ByteOrder, Metric, MetricName, MetricType, MetricValue, OpCode, RecordIdent, WireError,
};

const ONE_GAUGE_BE: &[u8] = &hex!(
    "00 01 0000002a 00000001"
    "0000001c 01 00 00000005 682f612f6e 0000000000000002 0000000000000001 00"
);

fn name(s: &str) -> Arc<MetricName> {
    Arc::new(MetricName::from_str(s).unwrap())
}

#[test]
fn byte_exact_layout() {
    let m = Metric::new(name("h/a/n"), MetricType::LongGauge, MetricValue::Long(1), 2).unwrap();
    let data = codec::encode_metrics(OpCode::SendMetric, ByteOrder::Big, &[m.clone()]);
    assert_eq!(data.as_slice(), ONE_GAUGE_BE);

    let frame = codec::decode(ONE_GAUGE_BE).unwrap();
    assert_eq!(frame.header.opcode, OpCode::SendMetric);
    assert_eq!(frame.header.order, ByteOrder::Big);
    assert_eq!(frame.header.total_size as usize, ONE_GAUGE_BE.len());
    assert_eq!(frame.records, vec![m.to_record()]);
}

#[test]
fn mixed_batch_keeps_order() {
    let metrics = vec![
        Metric::new(name("h/a/cpu/util"), MetricType::LongCounter, MetricValue::Long(-5), 10)
            .unwrap(),
        Metric::new(name("h/a/log/err"), MetricType::Error, MetricValue::Text("oops".into()), 11)
            .unwrap()
            .with_token(9),
        Metric::new(name("h/a/blob"), MetricType::Blob, MetricValue::Bytes(vec![0, 1, 2]), 12)
            .unwrap()
            .with_tx(TxContext {
                tx_id: 77,
                qualifier: -1,
                thread_id: 3,
            }),
        Metric::new(name("h/a/snmp/trap"), MetricType::Pdu, MetricValue::Bytes(Vec::new()), 13)
            .unwrap(),
    ];
    for order in [ByteOrder::Little, ByteOrder::Big] {
        let data = codec::encode_metrics(OpCode::SendMetricDirect, order, &metrics);
        let frame = codec::decode(&data).unwrap();
        assert_eq!(frame.header.count, 4);
        let expected: Vec<_> = metrics.iter().map(|m| m.to_record()).collect();
        assert_eq!(frame.records, expected);
        assert_eq!(frame.records[1].ident, RecordIdent::Token(9));
    }
}

#[test]
fn declared_length_mismatch() {
    let mut data = ONE_GAUGE_BE.to_vec();
    data[5] += 1;
    assert_eq!(
        codec::decode(&data),
        Err(WireError::MalformedFrame(
            "frame shorter than declared length"
        ))
    );

    let mut data = ONE_GAUGE_BE.to_vec();
    data[5] -= 1;
    assert!(matches!(
        codec::decode(&data),
        Err(WireError::MalformedFrame(_))
    ));
}

#[test]
fn bad_markers() {
    let mut data = ONE_GAUGE_BE.to_vec();
    data[1] = 2;
    assert_eq!(codec::decode(&data), Err(WireError::InvalidByteOrder(2)));

    data[1] = 1;
    data[0] = 0x7f;
    assert_eq!(codec::decode(&data), Err(WireError::UnknownOpcode(0x7f)));

    let data = hex!("07 0000000000000001");
    assert_eq!(
        codec::decode(&data[..]).map(|f| f.header),
        Err(WireError::MalformedFrame("truncated header"))
    );
    let data = hex!("07 0000000000000001 00");
    assert_eq!(
        codec::decode(&data[..]).map(|f| f.header),
        Err(WireError::UnexpectedOpcode(OpCode::Ping))
    );
}

#[test]
fn stream_peek() {
    let mut stream = ONE_GAUGE_BE.to_vec();
    stream.extend_from_slice(&hex!("0b 07 000000000000000c"));

    let len = g3_apm_proto::peek_message_len(&stream).unwrap().unwrap();
    assert_eq!(len, ONE_GAUGE_BE.len());
    let rest = &stream[len..];
    assert_eq!(g3_apm_proto::peek_message_len(rest), Ok(Some(1)));
    assert_eq!(g3_apm_proto::peek_message_len(&rest[1..]), Ok(Some(9)));
    assert_eq!(g3_apm_proto::peek_message_len(&rest[1..5]), Ok(None));
    assert_eq!(g3_apm_proto::peek_message_len(&[]), Ok(None));
    assert!(FRAME_HEADER_SIZE < len);
}
