/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use super::ByteOrder;
use crate::WireError;

pub(crate) struct FrameReader<'a> {
    data: &'a [u8],
    offset: usize,
    order: ByteOrder,
}

macro_rules! read_int {
    ($name:ident, $t:ty, $size:literal) => {
        pub(crate) fn $name(&mut self) -> Result<$t, WireError> {
            let b = self.take($size)?;
            let mut a = [0u8; $size];
            a.copy_from_slice(b);
            match self.order {
                ByteOrder::Little => Ok(<$t>::from_le_bytes(a)),
                ByteOrder::Big => Ok(<$t>::from_be_bytes(a)),
            }
        }
    };
}

impl<'a> FrameReader<'a> {
    pub(crate) fn new(data: &'a [u8], order: ByteOrder) -> Self {
        FrameReader {
            data,
            offset: 0,
            order,
        }
    }

    #[inline]
    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    pub(crate) fn skip(&mut self, len: usize) -> Result<(), WireError> {
        self.take(len).map(|_| ())
    }

    pub(crate) fn take(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        if self.remaining() < len {
            return Err(WireError::MalformedFrame("truncated data"));
        }
        let b = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(b)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, WireError> {
        let b = self.take(1)?;
        Ok(b[0])
    }

    read_int!(u32, u32, 4);
    read_int!(i32, i32, 4);
    read_int!(i64, i64, 8);

    /// Read a u32 length prefixed byte string
    pub(crate) fn len_bytes(&mut self) -> Result<&'a [u8], WireError> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    pub(crate) fn len_string(&mut self) -> Result<String, WireError> {
        let b = self.len_bytes()?;
        std::str::from_utf8(b)
            .map(|s| s.to_string())
            .map_err(|_| WireError::InvalidUtf8)
    }
}
