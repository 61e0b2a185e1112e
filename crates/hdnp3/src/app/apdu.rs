// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! APDU (application fragment) serialize and parse.
//!
//! ```text
//! +---------+----------+------+------+----------------+
//! | control | function | IIN1 | IIN2 | object data... |
//! +---------+----------+------+------+----------------+
//!              IIN present iff function is a response
//! ```

use super::control::AppControl;
use super::function::FunctionCode;
use super::iin::Iin;
use super::ObjectError;

/// One application fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Apdu {
    /// Control octet.
    pub control: AppControl,
    /// Function code.
    pub function: FunctionCode,
    /// Internal indications; `Some` iff `function` is a response.
    pub iin: Option<Iin>,
    /// Raw object data (headers + objects).
    pub objects: Vec<u8>,
}

impl Apdu {
    /// A single-fragment request.
    #[must_use]
    pub fn request(function: FunctionCode, seq: u8) -> Self {
        Self {
            control: AppControl::request(seq),
            function,
            iin: None,
            objects: Vec::new(),
        }
    }

    /// A single-fragment solicited response.
    #[must_use]
    pub fn response(seq: u8, iin: Iin) -> Self {
        Self {
            control: AppControl::response(seq),
            function: FunctionCode::Response,
            iin: Some(iin),
            objects: Vec::new(),
        }
    }

    /// A single-fragment unsolicited response (CON set).
    #[must_use]
    pub fn unsolicited(seq: u8, iin: Iin) -> Self {
        Self {
            control: AppControl::unsolicited(seq),
            function: FunctionCode::UnsolicitedResponse,
            iin: Some(iin),
            objects: Vec::new(),
        }
    }

    /// Append raw object data.
    #[must_use]
    pub fn with_objects(mut self, objects: Vec<u8>) -> Self {
        self.objects = objects;
        self
    }

    /// Serialize to wire format.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let iin_len = if self.function.is_response() { 2 } else { 0 };
        let mut out = Vec::with_capacity(2 + iin_len + self.objects.len());
        out.push(self.control.encode());
        out.push(self.function.as_u8());
        if self.function.is_response() {
            let iin = self.iin.unwrap_or_default();
            out.push(iin.iin1);
            out.push(iin.iin2);
        }
        out.extend_from_slice(&self.objects);
        out
    }

    /// Parse a fragment.
    ///
    /// An unknown function code is *not* an error here; the handler answers
    /// it with IIN2.NO_FUNC_CODE_SUPPORT.
    ///
    /// # Errors
    ///
    /// `TooShort` for fewer than 2 octets (4 for responses).
    pub fn parse(buf: &[u8]) -> Result<Self, ObjectError> {
        if buf.len() < 2 {
            return Err(ObjectError::TooShort);
        }
        let control = AppControl::decode(buf[0]);
        let function = FunctionCode::from_u8(buf[1]);

        let (iin, objects_at) = if function.is_response() {
            if buf.len() < 4 {
                return Err(ObjectError::TooShort);
            }
            (Some(Iin::from_bytes(buf[2], buf[3])), 4)
        } else {
            (None, 2)
        };

        Ok(Self {
            control,
            function,
            iin,
            objects: buf[objects_at..].to_vec(),
        })
    }
}
