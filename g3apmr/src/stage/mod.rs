/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use bytes::Bytes;

use crate::session::ArcSession;

mod mux;
pub use mux::MuxStage;

mod wire;
pub use wire::{AgentStage, WireFramer};

mod text;
pub use text::{LineFramer, TextStage};

mod xml;
pub use xml::XmlStage;

mod http;
pub use http::HttpStatsStage;

mod protocol;
pub use protocol::{
    HttpProtocol, ProtocolRegistry, StreamProtocol, TextProtocol, WireProtocol, XmlProtocol,
    build_registry, protocol_by_name,
};

pub enum StageAction {
    Continue,
    /// Replace the whole stage list, the bytes are fed again to the new list
    Rewire(StageList, Bytes),
    Close,
}

impl StageAction {
    fn describe(&self) -> &'static str {
        match self {
            StageAction::Continue => "continue",
            StageAction::Rewire(_, _) => "rewire",
            StageAction::Close => "close",
        }
    }
}

/// One step of the per connection processing chain
///
/// A stage takes a chunk of input and pushes zero or more outputs for the next
/// stage. The last stage in a list consumes its input.
pub trait Stage: Send {
    fn name(&self) -> &'static str;

    fn on_message(
        &mut self,
        session: &ArcSession,
        data: Bytes,
        out: &mut Vec<Bytes>,
    ) -> StageAction;
}

#[derive(Default)]
pub struct StageList {
    stages: Vec<Box<dyn Stage>>,
}

impl StageList {
    pub fn new() -> Self {
        StageList::default()
    }

    pub fn with<S: Stage + 'static>(mut self, stage: S) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Pass received bytes down the chain
    pub fn feed(&mut self, session: &ArcSession, data: Bytes) -> StageAction {
        let mut input = vec![data];
        for stage in self.stages.iter_mut() {
            let mut output = Vec::new();
            for item in input.drain(..) {
                match stage.on_message(session, item, &mut output) {
                    StageAction::Continue => {}
                    action => {
                        log::debug!(
                            "{}: stage {} asked to {}",
                            session.peer(),
                            stage.name(),
                            action.describe()
                        );
                        return action;
                    }
                }
            }
            if output.is_empty() {
                break;
            }
            input = output;
        }
        StageAction::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use crate::session::Session;

    struct Splitter;

    impl Stage for Splitter {
        fn name(&self) -> &'static str {
            "splitter"
        }

        fn on_message(
            &mut self,
            _session: &ArcSession,
            data: Bytes,
            out: &mut Vec<Bytes>,
        ) -> StageAction {
            for part in data.split(|c| *c == b',') {
                out.push(Bytes::copy_from_slice(part));
            }
            StageAction::Continue
        }
    }

    struct Collector(Arc<std::sync::Mutex<Vec<Bytes>>>);

    impl Stage for Collector {
        fn name(&self) -> &'static str {
            "collector"
        }

        fn on_message(
            &mut self,
            _session: &ArcSession,
            data: Bytes,
            _out: &mut Vec<Bytes>,
        ) -> StageAction {
            if data.as_ref() == b"quit" {
                return StageAction::Close;
            }
            self.0.lock().unwrap().push(data);
            StageAction::Continue
        }
    }

    #[test]
    fn chained() {
        let (sender, _receiver) = mpsc::channel(1);
        let session = Arc::new(Session::new_stream(
            1,
            SocketAddr::from(([127, 0, 0, 1], 1)),
            sender,
        ));
        let collected = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut list = StageList::new()
            .with(Splitter)
            .with(Collector(collected.clone()));
        assert_eq!(list.names(), ["splitter", "collector"]);

        assert!(matches!(
            list.feed(&session, Bytes::from_static(b"a,b")),
            StageAction::Continue
        ));
        assert_eq!(collected.lock().unwrap().len(), 2);
        assert!(matches!(
            list.feed(&session, Bytes::from_static(b"c,quit,d")),
            StageAction::Close
        ));
        assert_eq!(collected.lock().unwrap().len(), 3);
    }
}
