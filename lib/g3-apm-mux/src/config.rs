/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

/// Bounds of the xml prolog scan
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct XmlScanLimit {
    pub(crate) max_events: usize,
    pub(crate) max_tags: usize,
}

impl Default for XmlScanLimit {
    fn default() -> Self {
        XmlScanLimit {
            max_events: 10,
            max_tags: 3,
        }
    }
}

impl XmlScanLimit {
    pub fn set_max_events(&mut self, n: usize) {
        self.max_events = n;
    }

    #[inline]
    pub fn max_events(&self) -> usize {
        self.max_events
    }

    pub fn set_max_tags(&mut self, n: usize) {
        self.max_tags = n;
    }

    #[inline]
    pub fn max_tags(&self) -> usize {
        self.max_tags
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MuxConfig {
    byte_budget: usize,
    xml_limit: XmlScanLimit,
}

impl Default for MuxConfig {
    fn default() -> Self {
        MuxConfig {
            byte_budget: 1024,
            xml_limit: XmlScanLimit::default(),
        }
    }
}

impl MuxConfig {
    pub fn set_byte_budget(&mut self, size: usize) {
        self.byte_budget = size;
    }

    /// Max bytes to buffer before giving up on protocol detection
    #[inline]
    pub fn byte_budget(&self) -> usize {
        self.byte_budget
    }

    #[inline]
    pub fn xml_limit(&self) -> &XmlScanLimit {
        &self.xml_limit
    }

    #[inline]
    pub fn xml_limit_mut(&mut self) -> &mut XmlScanLimit {
        &mut self.xml_limit
    }
}
