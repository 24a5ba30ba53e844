//! Tuple model: field types, values, schemas and records.

use crate::api::PageId;
use std::cmp::Ordering;
use std::fmt;
use std::slice;
use thiserror::Error;

/// Maximum number of bytes stored for a text field.
pub const STRING_LEN: usize = 128;

const INT_WIDTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Text,
}

impl Type {
    /// Number of bytes a field of this type occupies on a page.
    pub fn byte_len(&self) -> usize {
        match self {
            Type::Int => INT_WIDTH,
            Type::Text => INT_WIDTH + STRING_LEN,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "INT"),
            Type::Text => write!(f, "TEXT"),
        }
    }
}

/// Comparison operators usable between two fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEq,
    GreaterThan,
    GreaterThanOrEq,
    /// Substring match for text, equality for integers.
    Like,
}

impl CompareOp {
    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Equals | CompareOp::Like => ordering == Ordering::Equal,
            CompareOp::NotEquals => ordering != Ordering::Equal,
            CompareOp::LessThan => ordering == Ordering::Less,
            CompareOp::LessThanOrEq => ordering != Ordering::Greater,
            CompareOp::GreaterThan => ordering == Ordering::Greater,
            CompareOp::GreaterThanOrEq => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            CompareOp::Equals => "=",
            CompareOp::NotEquals => "<>",
            CompareOp::LessThan => "<",
            CompareOp::LessThanOrEq => "<=",
            CompareOp::GreaterThan => ">",
            CompareOp::GreaterThanOrEq => ">=",
            CompareOp::Like => "LIKE",
        };
        f.write_str(symbol)
    }
}

/// A typed value stored in a tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Int(i32),
    Text(String),
}

impl Field {
    pub fn field_type(&self) -> Type {
        match self {
            Field::Int(_) => Type::Int,
            Field::Text(_) => Type::Text,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Field::Int(v) => Some(*v),
            Field::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Field::Text(s) => Some(s),
            Field::Int(_) => None,
        }
    }

    /// Evaluates `self <op> other`. Fields of different types never match.
    pub fn compare(&self, op: CompareOp, other: &Field) -> bool {
        match (self, other) {
            (Field::Int(a), Field::Int(b)) => op.accepts(a.cmp(b)),
            (Field::Text(a), Field::Text(b)) if op == CompareOp::Like => a.contains(b.as_str()),
            (Field::Text(a), Field::Text(b)) => op.accepts(a.as_str().cmp(b.as_str())),
            _ => false,
        }
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            Field::Int(v) => buf.extend_from_slice(&v.to_le_bytes()),
            Field::Text(s) => {
                let stored = truncate_to_boundary(s, STRING_LEN);
                buf.extend_from_slice(&(stored.len() as u32).to_le_bytes());
                buf.extend_from_slice(stored.as_bytes());
                buf.resize(buf.len() + STRING_LEN - stored.len(), 0);
            }
        }
    }
}

fn truncate_to_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

impl From<i32> for Field {
    fn from(value: i32) -> Self {
        Field::Int(value)
    }
}

impl From<&str> for Field {
    fn from(value: &str) -> Self {
        Field::Text(value.to_string())
    }
}

impl From<String> for Field {
    fn from(value: String) -> Self {
        Field::Text(value)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Int(v) => write!(f, "{}", v),
            Field::Text(s) => f.write_str(s),
        }
    }
}

/// One column of a [`TupleDesc`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TdItem {
    pub name: String,
    pub field_type: Type,
}

/// The schema of a tuple: an ordered list of named, typed fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TupleDesc {
    items: Vec<TdItem>,
}

impl TupleDesc {
    pub fn new<S: Into<String>>(fields: impl IntoIterator<Item = (S, Type)>) -> Self {
        let items = fields
            .into_iter()
            .map(|(name, field_type)| TdItem { name: name.into(), field_type })
            .collect();
        Self { items }
    }

    /// Builds a schema with anonymous fields.
    pub fn from_types(types: &[Type]) -> Self {
        Self::new(types.iter().map(|t| (String::new(), *t)))
    }

    pub fn num_fields(&self) -> usize {
        self.items.len()
    }

    pub fn field_name(&self, index: usize) -> Option<&str> {
        self.items.get(index).map(|item| item.name.as_str())
    }

    pub fn field_type(&self, index: usize) -> Option<Type> {
        self.items.get(index).map(|item| item.field_type)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.items.iter().position(|item| item.name == name)
    }

    /// Size in bytes of a serialized tuple with this schema.
    pub fn byte_len(&self) -> usize {
        self.items.iter().map(|item| item.field_type.byte_len()).sum()
    }

    /// Structural equality on the type sequence only, ignoring names.
    pub fn same_types(&self, other: &TupleDesc) -> bool {
        self.items.len() == other.items.len()
            && self
                .items
                .iter()
                .zip(&other.items)
                .all(|(a, b)| a.field_type == b.field_type)
    }

    pub fn iter(&self) -> slice::Iter<'_, TdItem> {
        self.items.iter()
    }
}

impl fmt::Display for TupleDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}({})", item.name, item.field_type)?;
        }
        Ok(())
    }
}

/// Location of a stored tuple: its page and slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: u16,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("tuple has {actual} fields, schema expects {expected}")]
    ArityMismatch { expected: usize, actual: usize },
    #[error("field {index} is {actual}, schema expects {expected}")]
    TypeMismatch { index: usize, expected: Type, actual: Type },
    #[error("record is {actual} bytes, schema needs {expected}")]
    Truncated { expected: usize, actual: usize },
    #[error("text length {0} exceeds the maximum of {max}", max = STRING_LEN)]
    TextTooLong(usize),
    #[error("text field is not valid UTF-8")]
    InvalidUtf8,
    #[error("slot {0} points outside the page")]
    SlotOutOfBounds(u16),
}

/// A record: an ordered list of fields matching some [`TupleDesc`].
///
/// Fields may be reassigned in place but a tuple never changes arity.
#[derive(Debug, Clone)]
pub struct Tuple {
    fields: Vec<Field>,
    record_id: Option<RecordId>,
}

impl Tuple {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields, record_id: None }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    /// Replaces the field at `index`.
    ///
    /// # Panics
    /// If `index` is not smaller than the tuple's arity.
    pub fn set_field(&mut self, index: usize, field: Field) {
        self.fields[index] = field;
    }

    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    /// Where the tuple is stored, if it was read from a page.
    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, record_id: Option<RecordId>) {
        self.record_id = record_id;
    }

    /// Checks arity and field types against `desc`.
    pub fn check_schema(&self, desc: &TupleDesc) -> Result<(), CodecError> {
        if self.fields.len() != desc.num_fields() {
            return Err(CodecError::ArityMismatch {
                expected: desc.num_fields(),
                actual: self.fields.len(),
            });
        }
        for (index, (field, item)) in self.fields.iter().zip(desc.iter()).enumerate() {
            if field.field_type() != item.field_type {
                return Err(CodecError::TypeMismatch {
                    index,
                    expected: item.field_type,
                    actual: field.field_type(),
                });
            }
        }
        Ok(())
    }

    /// Encodes the tuple into its fixed-width page representation.
    pub fn serialize(&self, desc: &TupleDesc) -> Result<Vec<u8>, CodecError> {
        self.check_schema(desc)?;
        let mut bytes = Vec::with_capacity(desc.byte_len());
        for field in &self.fields {
            field.encode_into(&mut bytes);
        }
        Ok(bytes)
    }

    pub fn deserialize(bytes: &[u8], desc: &TupleDesc) -> Result<Self, CodecError> {
        if bytes.len() < desc.byte_len() {
            return Err(CodecError::Truncated {
                expected: desc.byte_len(),
                actual: bytes.len(),
            });
        }
        let mut fields = Vec::with_capacity(desc.num_fields());
        let mut offset = 0;
        for item in desc.iter() {
            let mut raw = [0u8; INT_WIDTH];
            raw.copy_from_slice(&bytes[offset..offset + INT_WIDTH]);
            match item.field_type {
                Type::Int => fields.push(Field::Int(i32::from_le_bytes(raw))),
                Type::Text => {
                    let len = u32::from_le_bytes(raw) as usize;
                    if len > STRING_LEN {
                        return Err(CodecError::TextTooLong(len));
                    }
                    let start = offset + INT_WIDTH;
                    let text = String::from_utf8(bytes[start..start + len].to_vec())
                        .map_err(|_| CodecError::InvalidUtf8)?;
                    fields.push(Field::Text(text));
                }
            }
            offset += item.field_type.byte_len();
        }
        Ok(Self::new(fields))
    }
}

/// Tuples compare by field values only; the record id is not part of identity.
impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Eq for Tuple {}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str("\t")?;
            }
            write!(f, "{}", field)?;
        }
        Ok(())
    }
}
