/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use bytes::{BufMut, BytesMut};

use super::ByteOrder;

pub(crate) struct FrameWriter {
    buf: BytesMut,
    order: ByteOrder,
}

impl FrameWriter {
    pub(crate) fn with_capacity(capacity: usize, order: ByteOrder) -> Self {
        FrameWriter {
            buf: BytesMut::with_capacity(capacity),
            order,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn put_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub(crate) fn put_u32(&mut self, v: u32) {
        match self.order {
            ByteOrder::Little => self.buf.put_u32_le(v),
            ByteOrder::Big => self.buf.put_u32(v),
        }
    }

    pub(crate) fn put_i32(&mut self, v: i32) {
        match self.order {
            ByteOrder::Little => self.buf.put_i32_le(v),
            ByteOrder::Big => self.buf.put_i32(v),
        }
    }

    pub(crate) fn put_i64(&mut self, v: i64) {
        match self.order {
            ByteOrder::Little => self.buf.put_i64_le(v),
            ByteOrder::Big => self.buf.put_i64(v),
        }
    }

    pub(crate) fn put_len_bytes(&mut self, b: &[u8]) {
        self.put_u32(b.len() as u32);
        self.buf.put_slice(b);
    }

    /// Overwrite a u32 value at `offset`, which must have been written before
    pub(crate) fn set_u32(&mut self, offset: usize, v: u32) {
        let b = match self.order {
            ByteOrder::Little => v.to_le_bytes(),
            ByteOrder::Big => v.to_be_bytes(),
        };
        self.buf[offset..offset + 4].copy_from_slice(&b);
    }

    pub(crate) fn into_vec(self) -> Vec<u8> {
        self.buf.to_vec()
    }
}
