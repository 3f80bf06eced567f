/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use hex_literal::hex;

use g3_apm_mux::{
    HttpMagic, MatchResult, MuxConfig, MuxError, ProtocolMatcher, ProtocolSwitch, SwitchOutcome,
    SwitchState, WireMagic, XmlTagMatcher,
};

struct Fallback;

impl ProtocolMatcher for Fallback {
    fn protocol(&self) -> &str {
        "text"
    }
}

struct CountingMagic {
    inner: HttpMagic,
    calls: AtomicUsize,
}

impl ProtocolMatcher for CountingMagic {
    fn protocol(&self) -> &str {
        self.inner.protocol()
    }

    fn match_magic(&self, magic1: u8, magic2: u8) -> bool {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.inner.match_magic(magic1, magic2)
    }
}

fn switch() -> ProtocolSwitch<dyn ProtocolMatcher> {
    let switch: ProtocolSwitch<dyn ProtocolMatcher> = ProtocolSwitch::new(MuxConfig::default());
    switch.register(Arc::new(WireMagic::new("wire"))).unwrap();
    switch
        .register(Arc::new(XmlTagMatcher::new("xml", &["metric", "metrics"])))
        .unwrap();
    switch.register(Arc::new(HttpMagic::new("http"))).unwrap();
    switch.set_default(Some(Arc::new(Fallback)));
    switch
}

fn protocol_of(outcome: Result<SwitchOutcome<dyn ProtocolMatcher>, MuxError>) -> String {
    match outcome.unwrap() {
        SwitchOutcome::Matched(h) => h.protocol().to_string(),
        SwitchOutcome::Fallback(h) => format!("fallback:{}", h.protocol()),
        SwitchOutcome::NeedMoreData => "pending".to_string(),
    }
}

#[test]
fn detect_each() {
    let switch = switch();
    let cases: &[(&[u8], &str)] = &[
        (&hex!("00 01 0000000a 00000000"), "wire"),
        (&hex!("07 0000000000000001"), "wire"),
        (b"<?xml version=\"1.0\"?><metrics>", "xml"),
        (b"GET /stats HTTP/1.1\r\n\r\n", "http"),
        (b"h/a/cpu LONG_GAUGE 1\n", "fallback:text"),
    ];
    for (data, expected) in cases {
        let mut state = SwitchState::default();
        assert_eq!(protocol_of(switch.inspect(&mut state, data)), *expected);
    }
}

#[test]
fn wait_for_more() {
    let switch = switch();
    let mut state = SwitchState::default();
    assert_eq!(protocol_of(switch.inspect(&mut state, b"<")), "pending");
    assert_eq!(protocol_of(switch.inspect(&mut state, b"<?xml ver")), "pending");
    assert!(state.has_failed("wire"));
    assert!(state.has_failed("http"));
    assert!(!state.has_failed("xml"));
    assert_eq!(
        protocol_of(switch.inspect(&mut state, b"<?xml version=\"1.0\"?><metric/>")),
        "xml"
    );
}

#[test]
fn byte_budget() {
    let mut config = MuxConfig::default();
    config.set_byte_budget(64);
    let switch: ProtocolSwitch<dyn ProtocolMatcher> = ProtocolSwitch::new(config);
    switch
        .register(Arc::new(XmlTagMatcher::new("xml", &["metric"])))
        .unwrap();

    let mut data = b"<?xml ".to_vec();
    data.resize(63, b' ');
    let mut state = SwitchState::default();
    assert_eq!(protocol_of(switch.inspect(&mut state, &data)), "pending");

    data.push(b' ');
    assert_eq!(
        switch.inspect(&mut state, &data).err(),
        Some(MuxError::NoMatchingProtocol(64))
    );

    switch.set_default(Some(Arc::new(Fallback)));
    assert_eq!(
        protocol_of(switch.inspect(&mut state, &data)),
        "fallback:text"
    );
}

#[test]
fn cached_by_signature() {
    let switch: ProtocolSwitch<dyn ProtocolMatcher> = ProtocolSwitch::new(MuxConfig::default());
    let http = Arc::new(CountingMagic {
        inner: HttpMagic::new("http"),
        calls: AtomicUsize::new(0),
    });
    switch.register(http.clone()).unwrap();
    assert_eq!(
        switch.register(Arc::new(HttpMagic::new("http"))),
        Err(MuxError::DuplicateProtocol("http".to_string()))
    );

    let request = b"GET /stats HTTP/1.1\r\n\r\n";
    let first = match switch.inspect(&mut SwitchState::default(), request) {
        Ok(SwitchOutcome::Matched(h)) => h,
        _ => panic!("not matched"),
    };
    let second = match switch.inspect(&mut SwitchState::default(), request) {
        Ok(SwitchOutcome::Matched(h)) => h,
        _ => panic!("not matched"),
    };
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(http.calls.load(Ordering::Relaxed), 1);
    assert_eq!(switch.cached_count(), 1);

    assert!(switch.deregister("http").is_some());
    assert_eq!(switch.cached_count(), 0);
    assert!(switch.protocols().is_empty());
    assert!(matches!(
        switch.inspect(&mut SwitchState::default(), request),
        Err(MuxError::NoMatchingProtocol(_))
    ));
}

#[test]
fn content_match_result() {
    let xml = XmlTagMatcher::new("xml", &["metric"]);
    let config = MuxConfig::default();
    assert_eq!(
        xml.match_content(b"<metric fqn=\"h/a/n\"/>", &config),
        MatchResult::Matched
    );
    assert_eq!(xml.match_content(b"GET /", &config), MatchResult::Mismatch);
}
