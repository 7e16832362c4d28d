//! Serde pass that fails on NaN and infinite floats.
//!
//! `serde_json` writes non-finite numbers as `null`, which silently changes
//! the value on the wire. Walking the value first turns that into an error
//! naming where the number sits (`samples[1]`, `reading.celsius`).

use std::fmt::Display;

use serde::ser::{self, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub(super) enum FiniteError {
    #[error("{0}")]
    Custom(String),

    #[error("non-finite number {value} at {} has no JSON representation", render_path(.path))]
    NonFinite {
        value: f64,
        // Innermost segment first; pushed while unwinding
        path: Vec<Segment>,
    },
}

#[derive(Debug)]
pub(super) enum Segment {
    Field(&'static str),
    Index(usize),
}

impl FiniteError {
    fn within(mut self, segment: Segment) -> Self {
        if let FiniteError::NonFinite { path, .. } = &mut self {
            path.push(segment);
        }
        self
    }
}

impl ser::Error for FiniteError {
    fn custom<T: Display>(msg: T) -> Self {
        FiniteError::Custom(msg.to_string())
    }
}

fn render_path(path: &[Segment]) -> String {
    if path.is_empty() {
        return "top level".to_string();
    }
    let mut rendered = String::new();
    for segment in path.iter().rev() {
        match segment {
            Segment::Field(name) => {
                if !rendered.is_empty() {
                    rendered.push('.');
                }
                rendered.push_str(name);
            }
            Segment::Index(index) => rendered.push_str(&format!("[{index}]")),
        }
    }
    rendered
}

/// Fail if any float inside `value` is NaN or infinite
pub(super) fn check<T: Serialize + ?Sized>(value: &T) -> Result<(), FiniteError> {
    value.serialize(FiniteCheck)
}

fn float(value: f64) -> Result<(), FiniteError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(FiniteError::NonFinite {
            value,
            path: Vec::new(),
        })
    }
}

struct FiniteCheck;

/// Compound state: position of the next element and the enclosing variant
struct Walk {
    index: usize,
    variant: Option<&'static str>,
}

impl Walk {
    fn new() -> Self {
        Walk {
            index: 0,
            variant: None,
        }
    }

    fn variant(variant: &'static str) -> Self {
        Walk {
            index: 0,
            variant: Some(variant),
        }
    }

    fn locate(&self, error: FiniteError, segment: Segment) -> FiniteError {
        let error = error.within(segment);
        match self.variant {
            Some(variant) => error.within(Segment::Field(variant)),
            None => error,
        }
    }

    fn element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), FiniteError> {
        let index = self.index;
        self.index += 1;
        value
            .serialize(FiniteCheck)
            .map_err(|e| self.locate(e, Segment::Index(index)))
    }

    fn field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), FiniteError> {
        value
            .serialize(FiniteCheck)
            .map_err(|e| self.locate(e, Segment::Field(key)))
    }
}

impl ser::Serializer for FiniteCheck {
    type Ok = ();
    type Error = FiniteError;
    type SerializeSeq = Walk;
    type SerializeTuple = Walk;
    type SerializeTupleStruct = Walk;
    type SerializeTupleVariant = Walk;
    type SerializeMap = Walk;
    type SerializeStruct = Walk;
    type SerializeStructVariant = Walk;

    fn serialize_bool(self, _v: bool) -> Result<(), FiniteError> {
        Ok(())
    }

    fn serialize_i8(self, _v: i8) -> Result<(), FiniteError> {
        Ok(())
    }

    fn serialize_i16(self, _v: i16) -> Result<(), FiniteError> {
        Ok(())
    }

    fn serialize_i32(self, _v: i32) -> Result<(), FiniteError> {
        Ok(())
    }

    fn serialize_i64(self, _v: i64) -> Result<(), FiniteError> {
        Ok(())
    }

    fn serialize_i128(self, _v: i128) -> Result<(), FiniteError> {
        Ok(())
    }

    fn serialize_u8(self, _v: u8) -> Result<(), FiniteError> {
        Ok(())
    }

    fn serialize_u16(self, _v: u16) -> Result<(), FiniteError> {
        Ok(())
    }

    fn serialize_u32(self, _v: u32) -> Result<(), FiniteError> {
        Ok(())
    }

    fn serialize_u64(self, _v: u64) -> Result<(), FiniteError> {
        Ok(())
    }

    fn serialize_u128(self, _v: u128) -> Result<(), FiniteError> {
        Ok(())
    }

    fn serialize_f32(self, v: f32) -> Result<(), FiniteError> {
        float(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> Result<(), FiniteError> {
        float(v)
    }

    fn serialize_char(self, _v: char) -> Result<(), FiniteError> {
        Ok(())
    }

    fn serialize_str(self, _v: &str) -> Result<(), FiniteError> {
        Ok(())
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<(), FiniteError> {
        Ok(())
    }

    fn serialize_none(self) -> Result<(), FiniteError> {
        Ok(())
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<(), FiniteError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<(), FiniteError> {
        Ok(())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<(), FiniteError> {
        Ok(())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
    ) -> Result<(), FiniteError> {
        Ok(())
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<(), FiniteError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<(), FiniteError> {
        value
            .serialize(self)
            .map_err(|e| e.within(Segment::Field(variant)))
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Walk, FiniteError> {
        Ok(Walk::new())
    }

    fn serialize_tuple(self, _len: usize) -> Result<Walk, FiniteError> {
        Ok(Walk::new())
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Walk, FiniteError> {
        Ok(Walk::new())
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Walk, FiniteError> {
        Ok(Walk::variant(variant))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Walk, FiniteError> {
        Ok(Walk::new())
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Walk, FiniteError> {
        Ok(Walk::new())
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Walk, FiniteError> {
        Ok(Walk::variant(variant))
    }
}

impl ser::SerializeSeq for Walk {
    type Ok = ();
    type Error = FiniteError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), FiniteError> {
        self.element(value)
    }

    fn end(self) -> Result<(), FiniteError> {
        Ok(())
    }
}

impl ser::SerializeTuple for Walk {
    type Ok = ();
    type Error = FiniteError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), FiniteError> {
        self.element(value)
    }

    fn end(self) -> Result<(), FiniteError> {
        Ok(())
    }
}

impl ser::SerializeTupleStruct for Walk {
    type Ok = ();
    type Error = FiniteError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), FiniteError> {
        self.element(value)
    }

    fn end(self) -> Result<(), FiniteError> {
        Ok(())
    }
}

impl ser::SerializeTupleVariant for Walk {
    type Ok = ();
    type Error = FiniteError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), FiniteError> {
        self.element(value)
    }

    fn end(self) -> Result<(), FiniteError> {
        Ok(())
    }
}

impl ser::SerializeMap for Walk {
    type Ok = ();
    type Error = FiniteError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), FiniteError> {
        key.serialize(FiniteCheck)
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), FiniteError> {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> Result<(), FiniteError> {
        Ok(())
    }
}

impl ser::SerializeStruct for Walk {
    type Ok = ();
    type Error = FiniteError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), FiniteError> {
        self.field(key, value)
    }

    fn end(self) -> Result<(), FiniteError> {
        Ok(())
    }
}

impl ser::SerializeStructVariant for Walk {
    type Ok = ();
    type Error = FiniteError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), FiniteError> {
        self.field(key, value)
    }

    fn end(self) -> Result<(), FiniteError> {
        Ok(())
    }
}
