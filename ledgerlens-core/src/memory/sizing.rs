//! Value size estimation
//!
//! The primary estimate is the length of the value's JSON encoding, counted
//! without allocating the encoded string. Values JSON cannot represent (maps
//! with composite keys, custom serializers that reject JSON) fall back to a
//! structural walk over the same `Serialize` impl that sums per-field costs.

use serde::ser::{self, Serialize};
use std::fmt;
use std::io;

/// Estimate the byte cost of a value
pub fn estimate_size<T: Serialize + ?Sized>(value: &T) -> usize {
    let mut counter = ByteCounter(0);
    match serde_json::to_writer(&mut counter, value) {
        Ok(()) => counter.0,
        Err(_) => structural_size(value),
    }
}

/// Recursive estimate that never fails on representable Rust data
pub fn structural_size<T: Serialize + ?Sized>(value: &T) -> usize {
    let mut estimator = SizeEstimator { total: 0 };
    match value.serialize(&mut estimator) {
        Ok(()) => estimator.total,
        // A Serialize impl that errors on purpose still gets a nonzero cost
        Err(_) => estimator.total.max(std::mem::size_of_val(value)),
    }
}

struct ByteCounter(usize);

impl io::Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug)]
struct EstimateError(String);

impl fmt::Display for EstimateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for EstimateError {}

impl ser::Error for EstimateError {
    fn custom<M: fmt::Display>(msg: M) -> Self {
        EstimateError(msg.to_string())
    }
}

struct SizeEstimator {
    total: usize,
}

const SCALAR: usize = 8;
const CONTAINER: usize = 2;

impl<'a> ser::Serializer for &'a mut SizeEstimator {
    type Ok = ();
    type Error = EstimateError;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    fn serialize_bool(self, _: bool) -> Result<(), EstimateError> {
        self.total += 4;
        Ok(())
    }

    fn serialize_i8(self, _: i8) -> Result<(), EstimateError> {
        self.total += SCALAR;
        Ok(())
    }

    fn serialize_i16(self, _: i16) -> Result<(), EstimateError> {
        self.total += SCALAR;
        Ok(())
    }

    fn serialize_i32(self, _: i32) -> Result<(), EstimateError> {
        self.total += SCALAR;
        Ok(())
    }

    fn serialize_i64(self, _: i64) -> Result<(), EstimateError> {
        self.total += SCALAR;
        Ok(())
    }

    fn serialize_i128(self, _: i128) -> Result<(), EstimateError> {
        self.total += 2 * SCALAR;
        Ok(())
    }

    fn serialize_u8(self, _: u8) -> Result<(), EstimateError> {
        self.total += SCALAR;
        Ok(())
    }

    fn serialize_u16(self, _: u16) -> Result<(), EstimateError> {
        self.total += SCALAR;
        Ok(())
    }

    fn serialize_u32(self, _: u32) -> Result<(), EstimateError> {
        self.total += SCALAR;
        Ok(())
    }

    fn serialize_u64(self, _: u64) -> Result<(), EstimateError> {
        self.total += SCALAR;
        Ok(())
    }

    fn serialize_u128(self, _: u128) -> Result<(), EstimateError> {
        self.total += 2 * SCALAR;
        Ok(())
    }

    fn serialize_f32(self, _: f32) -> Result<(), EstimateError> {
        self.total += SCALAR;
        Ok(())
    }

    fn serialize_f64(self, _: f64) -> Result<(), EstimateError> {
        self.total += SCALAR;
        Ok(())
    }

    fn serialize_char(self, _: char) -> Result<(), EstimateError> {
        self.total += 4;
        Ok(())
    }

    fn serialize_str(self, v: &str) -> Result<(), EstimateError> {
        self.total += v.len() + 2;
        Ok(())
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<(), EstimateError> {
        self.total += v.len();
        Ok(())
    }

    fn serialize_none(self) -> Result<(), EstimateError> {
        self.total += 4;
        Ok(())
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<(), EstimateError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<(), EstimateError> {
        self.total += 4;
        Ok(())
    }

    fn serialize_unit_struct(self, _: &'static str) -> Result<(), EstimateError> {
        self.total += 4;
        Ok(())
    }

    fn serialize_unit_variant(
        self,
        _: &'static str,
        _: u32,
        variant: &'static str,
    ) -> Result<(), EstimateError> {
        self.total += variant.len() + 2;
        Ok(())
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        value: &T,
    ) -> Result<(), EstimateError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        _: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<(), EstimateError> {
        self.total += variant.len() + CONTAINER;
        value.serialize(self)
    }

    fn serialize_seq(self, _: Option<usize>) -> Result<Self, EstimateError> {
        self.total += CONTAINER;
        Ok(self)
    }

    fn serialize_tuple(self, _: usize) -> Result<Self, EstimateError> {
        self.total += CONTAINER;
        Ok(self)
    }

    fn serialize_tuple_struct(self, _: &'static str, _: usize) -> Result<Self, EstimateError> {
        self.total += CONTAINER;
        Ok(self)
    }

    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        variant: &'static str,
        _: usize,
    ) -> Result<Self, EstimateError> {
        self.total += variant.len() + 2 * CONTAINER;
        Ok(self)
    }

    fn serialize_map(self, _: Option<usize>) -> Result<Self, EstimateError> {
        self.total += CONTAINER;
        Ok(self)
    }

    fn serialize_struct(self, _: &'static str, _: usize) -> Result<Self, EstimateError> {
        self.total += CONTAINER;
        Ok(self)
    }

    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        variant: &'static str,
        _: usize,
    ) -> Result<Self, EstimateError> {
        self.total += variant.len() + 2 * CONTAINER;
        Ok(self)
    }
}

impl<'a> ser::SerializeSeq for &'a mut SizeEstimator {
    type Ok = ();
    type Error = EstimateError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), EstimateError> {
        self.total += 1;
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<(), EstimateError> {
        Ok(())
    }
}

impl<'a> ser::SerializeTuple for &'a mut SizeEstimator {
    type Ok = ();
    type Error = EstimateError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), EstimateError> {
        self.total += 1;
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<(), EstimateError> {
        Ok(())
    }
}

impl<'a> ser::SerializeTupleStruct for &'a mut SizeEstimator {
    type Ok = ();
    type Error = EstimateError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), EstimateError> {
        self.total += 1;
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<(), EstimateError> {
        Ok(())
    }
}

impl<'a> ser::SerializeTupleVariant for &'a mut SizeEstimator {
    type Ok = ();
    type Error = EstimateError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), EstimateError> {
        self.total += 1;
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<(), EstimateError> {
        Ok(())
    }
}

impl<'a> ser::SerializeMap for &'a mut SizeEstimator {
    type Ok = ();
    type Error = EstimateError;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), EstimateError> {
        self.total += 1;
        key.serialize(&mut **self)
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), EstimateError> {
        self.total += 1;
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<(), EstimateError> {
        Ok(())
    }
}

impl<'a> ser::SerializeStruct for &'a mut SizeEstimator {
    type Ok = ();
    type Error = EstimateError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), EstimateError> {
        self.total += key.len() + 4;
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<(), EstimateError> {
        Ok(())
    }
}

impl<'a> ser::SerializeStructVariant for &'a mut SizeEstimator {
    type Ok = ();
    type Error = EstimateError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), EstimateError> {
        self.total += key.len() + 4;
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<(), EstimateError> {
        Ok(())
    }
}
